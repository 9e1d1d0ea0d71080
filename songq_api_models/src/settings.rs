use serde::{Deserialize, Serialize};
use validator::Validate;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Validate)]
pub struct Settings {
    #[validate]
    #[serde(default)]
    pub queue_settings: QueueSettings,
    #[validate]
    #[serde(default)]
    pub player_settings: PlayerSettings,
    /// Max pending songs per non-admin user. Zero disables the limit.
    #[serde(default = "default_user_limit")]
    pub user_limit: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Validate)]
pub struct QueueSettings {
    #[validate(length(min = 1))]
    pub db_path: String,
    #[validate(range(min = 1))]
    pub id_lease_size: u64,
    pub commit_retries: u32,
    pub retry_backoff_ms: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Validate)]
pub struct PlayerSettings {
    #[validate(range(min = 1))]
    pub poll_interval_ms: u64,
    pub playback_delay_secs: u64,
}

const fn default_user_limit() -> usize {
    1
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            queue_settings: QueueSettings::default(),
            player_settings: PlayerSettings::default(),
            user_limit: default_user_limit(),
        }
    }
}

impl Default for QueueSettings {
    fn default() -> Self {
        Self {
            db_path: "queuedata".to_string(),
            id_lease_size: 100,
            commit_retries: 5,
            retry_backoff_ms: 10,
        }
    }
}

impl QueueSettings {
    /// Settings for a throwaway store that lives only as long as the process.
    #[must_use]
    pub fn in_memory() -> Self {
        Self {
            db_path: ":memory:".to_string(),
            ..Default::default()
        }
    }
}

impl Default for PlayerSettings {
    fn default() -> Self {
        Self {
            poll_interval_ms: 1000,
            playback_delay_secs: 30,
        }
    }
}

#[cfg(test)]
mod test {
    use validator::Validate;

    use super::Settings;

    #[test]
    fn should_fill_missing_sections_with_defaults() {
        let settings: Settings = serde_json::from_str(r#"{"queue_settings":{"db_path":"q","id_lease_size":10,"commit_retries":1,"retry_backoff_ms":5}}"#).unwrap();
        assert_eq!(settings.queue_settings.db_path, "q");
        assert_eq!(settings.player_settings.poll_interval_ms, 1000);
        assert_eq!(settings.user_limit, 1);
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn should_reject_zero_lease_size() {
        let mut settings = Settings::default();
        settings.queue_settings.id_lease_size = 0;
        assert!(settings.validate().is_err());
    }
}
