use std::{future::Future, time::Duration};

use anyhow::Result;
use api_models::settings::PlayerSettings;
use log::info;
use songq_store::Queue;

/// Consumes the queue until `stop` completes, holding each song for its
/// duration plus the configured pause between songs. Returns the number of
/// songs played.
pub async fn play<F>(queue: &Queue, settings: &PlayerSettings, stop: F) -> Result<usize>
where
    F: Future<Output = ()>,
{
    tokio::pin!(stop);
    let poll_interval = Duration::from_millis(settings.poll_interval_ms);
    let pause = Duration::from_secs(settings.playback_delay_secs);
    let mut played = 0;
    while let Some(song) = queue.next_song(poll_interval, &mut stop).await? {
        info!("Now playing {}", song.info_string());
        played += 1;
        tokio::select! {
            () = &mut stop => break,
            () = tokio::time::sleep(song.song.duration + pause) => {}
        }
    }
    info!("Player stopped after {played} songs");
    Ok(played)
}
