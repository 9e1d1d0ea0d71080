use std::sync::{PoisonError, RwLock};

use anyhow::{Context, Result};
use api_models::{settings::Settings, validator::Validate};
use log::{error, info};
use sled::Db;

const SETTINGS_KEY: &str = "settings";

pub struct Configuration {
    db: Db,
    settings: RwLock<Settings>,
}

impl Configuration {
    /// Opens the settings db at `path`. Missing or unreadable settings fall back
    /// to defaults, which are written back on first run.
    pub fn new(path: &str) -> Result<Self> {
        let db = sled::open(path).with_context(|| format!("Failed to open configuration db at {path}"))?;
        let settings = match db.get(SETTINGS_KEY)? {
            Some(data) => serde_json::from_slice::<Settings>(&data).unwrap_or_else(|e| {
                error!("Failed to deserialize settings from DB: {e}. Falling back to default.");
                Settings::default()
            }),
            None => {
                let settings = Settings::default();
                db.insert(SETTINGS_KEY, serde_json::to_vec(&settings)?)?;
                db.flush()?;
                info!("Stored default settings in {path}");
                settings
            }
        };
        Ok(Self {
            db,
            settings: RwLock::new(settings),
        })
    }

    pub fn get_settings(&self) -> Settings {
        self.settings.read().unwrap_or_else(PoisonError::into_inner).clone()
    }

    pub fn save_settings(&self, settings: &Settings) -> Result<()> {
        settings.validate().context("Invalid settings")?;
        self.db.insert(SETTINGS_KEY, serde_json::to_vec(settings)?)?;
        self.db.flush()?;
        *self.settings.write().unwrap_or_else(PoisonError::into_inner) = settings.clone();
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use api_models::settings::Settings;

    use super::Configuration;

    fn db_path(dir: &tempfile::TempDir) -> String {
        dir.path().join("configuration.db").to_string_lossy().into_owned()
    }

    #[test]
    fn should_start_with_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = Configuration::new(&db_path(&dir)).unwrap();
        assert_eq!(config.get_settings(), Settings::default());
        assert_eq!(config.get_settings().user_limit, 1);
    }

    #[test]
    fn should_persist_saved_settings() {
        let dir = tempfile::tempdir().unwrap();
        let mut settings = Settings::default();
        settings.user_limit = 3;
        settings.queue_settings.db_path = "elsewhere".to_string();
        {
            let config = Configuration::new(&db_path(&dir)).unwrap();
            config.save_settings(&settings).unwrap();
        }
        let config = Configuration::new(&db_path(&dir)).unwrap();
        assert_eq!(config.get_settings(), settings);
    }

    #[test]
    fn should_reject_invalid_settings() {
        let dir = tempfile::tempdir().unwrap();
        let config = Configuration::new(&db_path(&dir)).unwrap();
        let mut settings = Settings::default();
        settings.queue_settings.id_lease_size = 0;
        assert!(config.save_settings(&settings).is_err());
        assert_eq!(config.get_settings(), Settings::default());
    }

    #[test]
    fn should_fall_back_to_defaults_on_bad_data() {
        let dir = tempfile::tempdir().unwrap();
        let path = db_path(&dir);
        {
            let db = sled::open(&path).unwrap();
            db.insert("settings", b"not json".to_vec()).unwrap();
            db.flush().unwrap();
        }
        let config = Configuration::new(&path).unwrap();
        assert_eq!(config.get_settings(), Settings::default());
    }
}
