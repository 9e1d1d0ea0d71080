use std::time::Duration;

use anyhow::{bail, Result};
use api_models::song::{NewSong, QueuedSong};
use clap::Subcommand;
use log::{debug, info};
use serde_json::{json, Value};
use songq_store::{Queue, QueueError};

#[derive(Subcommand, Debug, Clone)]
pub enum QueueCommand {
    /// Add a song to the end of the queue
    Enqueue {
        title: String,
        #[arg(long = "user")]
        user_id: String,
        #[arg(long = "url")]
        song_url: String,
        #[arg(long = "thumbnail", default_value = "")]
        thumbnail_url: String,
        #[arg(long = "duration", default_value_t = 0)]
        duration_secs: u64,
        /// Skip the per-user pending song limit
        #[arg(long)]
        admin: bool,
    },
    /// Take the song at the head of the queue
    Dequeue,
    /// Show the song at the head of the queue
    Peek,
    List {
        #[arg(long, default_value_t = 0)]
        offset: usize,
        #[arg(long, default_value_t = 25)]
        limit: usize,
    },
    Remove {
        id: u64,
    },
    /// Change the payload of a queued song
    Update {
        id: u64,
        #[arg(long)]
        title: Option<String>,
        #[arg(long = "url")]
        song_url: Option<String>,
        #[arg(long = "thumbnail")]
        thumbnail_url: Option<String>,
    },
    /// Move a pending song to a position, 1 being the head
    Move {
        id: u64,
        position: usize,
    },
    /// Look a song up by slot id or slug
    Find {
        key: String,
    },
    /// Show the most recently dequeued song
    Last,
    Stats {
        #[arg(long = "user")]
        user_id: String,
    },
    /// Flush pending store writes to disk
    Gc,
}

/// Runs one queue command and returns its result as JSON.
///
/// `user_limit` caps the pending songs a non-admin user may have queued, zero
/// disables the cap.
pub fn handle_queue_command(queue: &Queue, user_limit: usize, command: QueueCommand) -> Result<Value> {
    debug!("Received command {command:?}");
    let result = match command {
        QueueCommand::Enqueue {
            title,
            user_id,
            song_url,
            thumbnail_url,
            duration_secs,
            admin,
        } => {
            let song = NewSong {
                user_id,
                title,
                song_url,
                thumbnail_url,
                duration: Duration::from_secs(duration_secs),
            };
            let limit = if admin { 0 } else { user_limit };
            let Some(queued) = enqueue_within_limit(queue, &song, limit)? else {
                bail!("User {} already has {limit} pending songs", song.user_id);
            };
            info!("Queued {}", queued.info_string());
            json!(queued)
        }
        QueueCommand::Dequeue => json!(queue.update(|tx| tx.dequeue())?),
        QueueCommand::Peek => json!(queue.view(|tx| tx.peek())?),
        QueueCommand::List { offset, limit } => {
            let (count, songs) = queue.view(|tx| Ok((tx.count()?, tx.list(offset, limit)?)))?;
            json!({ "count": count, "songs": songs })
        }
        QueueCommand::Remove { id } => {
            queue.update(|tx| tx.remove(id))?;
            json!({ "removed": id })
        }
        QueueCommand::Update {
            id,
            title,
            song_url,
            thumbnail_url,
        } => {
            let updated = queue.update(|tx| {
                let mut song = tx.find_by_id(id)?.song;
                if let Some(title) = &title {
                    song.title.clone_from(title);
                }
                if let Some(song_url) = &song_url {
                    song.song_url.clone_from(song_url);
                }
                if let Some(thumbnail_url) = &thumbnail_url {
                    song.thumbnail_url.clone_from(thumbnail_url);
                }
                tx.update(id, song)?;
                tx.find_by_id(id)
            })?;
            json!(updated)
        }
        QueueCommand::Move { id, position } => {
            let Some(new_position) = position.checked_sub(1) else {
                bail!("Positions start at 1");
            };
            let moved = queue.update(|tx| {
                let slug = tx.find_by_id(id)?.slug;
                tx.move_song(id, new_position)?;
                tx.find_by_slug(&slug)
            })?;
            info!("Moved {} to position {position}", moved.info_string());
            json!(moved)
        }
        QueueCommand::Find { key } => {
            let song = match key.parse::<u64>() {
                Ok(id) => queue.view(|tx| tx.find_by_id(id))?,
                Err(_) => queue.view(|tx| tx.find_by_slug(&key))?,
            };
            json!(song)
        }
        QueueCommand::Last => json!(queue.view(|tx| tx.last_dequeued())?),
        QueueCommand::Stats { user_id } => {
            let (stats, pending) =
                queue.view(|tx| Ok((tx.user_stats(&user_id)?.unwrap_or_default(), tx.count_by_user(&user_id)?)))?;
            json!({ "user_id": user_id, "pending": pending, "stats": stats })
        }
        QueueCommand::Gc => json!({ "flushed_bytes": queue.gc()? }),
    };
    Ok(result)
}

/// Enqueues `song` unless its user already has `limit` pending songs. The check
/// and the insert share one transaction.
fn enqueue_within_limit(
    queue: &Queue,
    song: &NewSong,
    limit: usize,
) -> Result<Option<QueuedSong>, QueueError> {
    queue.update(|tx| {
        if limit > 0 && tx.count_by_user(&song.user_id)? >= limit {
            return Ok(None);
        }
        let id = tx.enqueue(song.clone())?;
        tx.find_by_id(id).map(Some)
    })
}
