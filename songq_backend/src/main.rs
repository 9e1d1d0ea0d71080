extern crate env_logger;
#[macro_use]
extern crate log;

use clap::{Parser, Subcommand};
use env_logger::Env;

use songq::command_handler::{handle_queue_command, QueueCommand};
use songq::player;
use songq_config::Configuration;
use songq_store::Queue;

#[derive(Parser)]
#[command(name = "songq", version, about = "Persistent song request queue")]
struct Cli {
    /// Settings database
    #[arg(long, default_value = "configuration.db")]
    config: String,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    #[command(flatten)]
    Queue(QueueCommand),
    /// Play queued songs until Ctrl-C
    Play,
}

#[tokio::main(flavor = "current_thread")]
async fn main() {
    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();
    if let Err(e) = run(Cli::parse()).await {
        error!("{e:#}");
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let config = Configuration::new(&cli.config)?;
    let settings = config.get_settings();
    let queue = Queue::open(&settings.queue_settings)?;
    match cli.command {
        Commands::Queue(command) => {
            let output = handle_queue_command(&queue, settings.user_limit, command)?;
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
        Commands::Play => {
            info!("Starting songq player {}.", env!("CARGO_PKG_VERSION"));
            let stop = async {
                _ = tokio::signal::ctrl_c().await;
                info!("CTRL-c signal received.");
            };
            player::play(&queue, &settings.player_settings, stop).await?;
        }
    }
    queue.close()?;
    Ok(())
}
