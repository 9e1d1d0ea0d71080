use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Song payload as submitted by a user, before it gets a place in the queue.
#[derive(Debug, Clone, Eq, PartialEq, Hash, Serialize, Deserialize, Default)]
pub struct NewSong {
    pub user_id: String,
    pub title: String,
    pub song_url: String,
    pub thumbnail_url: String,
    pub duration: Duration,
}

/// A song that has been given a slot in the queue.
///
/// `dequeued_at` stays `None` while the song is pending. Dequeued songs are kept
/// around so the last played entry can still be looked up.
#[derive(Debug, Clone, Eq, PartialEq, Serialize, Deserialize)]
pub struct QueuedSong {
    #[serde(flatten)]
    pub song: NewSong,
    pub id: u64,
    pub slug: String,
    pub queued_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dequeued_at: Option<DateTime<Utc>>,
}

impl QueuedSong {
    #[must_use]
    pub const fn is_pending(&self) -> bool {
        self.dequeued_at.is_none()
    }

    #[must_use]
    pub fn to_json_string_bytes(&self) -> Vec<u8> {
        serde_json::to_vec(self).unwrap_or_default()
    }

    #[must_use]
    pub fn info_string(&self) -> String {
        let minutes = self.song.duration.as_secs() / 60;
        let seconds = self.song.duration.as_secs() % 60;
        format!("[{}] {} ({minutes}:{seconds:02})", self.slug, self.song.title)
    }
}

#[cfg(test)]
mod test {
    use std::time::Duration;

    use chrono::Utc;

    use super::{NewSong, QueuedSong};

    #[test]
    fn should_flatten_song_fields_in_json() {
        let queued = QueuedSong {
            song: NewSong {
                user_id: "42".to_string(),
                title: "title".to_string(),
                song_url: "https://example.com/v".to_string(),
                thumbnail_url: String::new(),
                duration: Duration::from_secs(125),
            },
            id: 3,
            slug: "neko".to_string(),
            queued_at: Utc::now(),
            dequeued_at: None,
        };
        let json: serde_json::Value = serde_json::from_slice(&queued.to_json_string_bytes()).unwrap();
        assert_eq!(json["title"], "title");
        assert_eq!(json["slug"], "neko");
        assert!(json.get("dequeued_at").is_none());
        assert!(queued.is_pending());
        assert_eq!(queued.info_string(), "[neko] title (2:05)");
    }
}
