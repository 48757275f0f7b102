use std::path::{Path, PathBuf};

use anyhow::Context;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

/// Json struct for instance settings.
#[derive(Serialize, Deserialize, Clone)]
pub struct Settings {
    /// Discord OAuth application ID
    pub client_id: String,

    /// Discord OAuth application secret
    pub client_secret: String,

    /// OAuth redirect, must match the application configuration
    pub redirect_uri: String,

    /// Where the browser is sent after a successful login
    pub frontend_url: String,

    /// Guild that participants must be a member of
    pub server: String,

    /// Snowflakes allowed to use admin operations
    pub admins: Vec<String>,

    /// Event start, unix seconds
    pub start_time: i64,

    /// Set once by the start trigger; pairing never reruns while set
    #[serde(default)]
    pub is_started: bool,

    /// Username of the admin who triggered the start
    #[serde(default)]
    pub started_by: Option<String>,

    pub web_port: Option<u16>,

    pub db_file: PathBuf,

    /// Root directory for uploaded artwork files
    pub artwork_dir: PathBuf,
}

impl Settings {
    /// A settings file skeleton to be filled in by hand.
    pub fn template() -> Self {
        Settings {
            client_id: "FILL_THIS".to_owned(),
            client_secret: "FILL_THIS".to_owned(),
            redirect_uri: "http://localhost:8080/callback".to_owned(),
            frontend_url: "http://localhost:5173/profile".to_owned(),
            server: "FILL_THIS".to_owned(),
            admins: vec![],
            start_time: 0,
            is_started: false,
            started_by: None,
            web_port: None,
            db_file: PathBuf::from("artswap.db"),
            artwork_dir: PathBuf::from("artwork"),
        }
    }
}

/// Durable settings handle. Reads are served from memory; point writes
/// (`mark_started`) are saved back to the settings file immediately.
pub struct ConfigStore {
    path: Option<PathBuf>,
    inner: RwLock<Settings>,
}

impl ConfigStore {
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read settings file {}", path.display()))?;
        let settings: Settings = serde_json::from_str(&raw)
            .with_context(|| format!("failed to parse settings file {}", path.display()))?;

        Ok(ConfigStore {
            path: Some(path.to_owned()),
            inner: RwLock::new(settings),
        })
    }

    /// A store that is never written back to disk, for tests.
    pub fn ephemeral(settings: Settings) -> Self {
        ConfigStore {
            path: None,
            inner: RwLock::new(settings),
        }
    }

    pub async fn snapshot(&self) -> Settings {
        self.inner.read().await.clone()
    }

    pub async fn is_admin(&self, snowflake: &str) -> bool {
        self.inner
            .read()
            .await
            .admins
            .iter()
            .any(|admin| admin == snowflake)
    }

    /// Flips the event to started and records who did it. Persisted before
    /// returning, so a restart cannot rerun the pairing.
    pub async fn mark_started(&self, by: &str) -> anyhow::Result<()> {
        let mut settings = self.inner.write().await;
        settings.is_started = true;
        settings.started_by = Some(by.to_owned());
        self.save(&settings)
    }

    fn save(&self, settings: &Settings) -> anyhow::Result<()> {
        if let Some(path) = &self.path {
            let raw = serde_json::to_string_pretty(settings)?;
            std::fs::write(path, raw)
                .with_context(|| format!("failed to save settings file {}", path.display()))?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_mark_started_is_sticky() {
        let store = ConfigStore::ephemeral(Settings::template());
        assert!(!store.snapshot().await.is_started);

        store.mark_started("admin_user").await.unwrap();

        let snapshot = store.snapshot().await;
        assert!(snapshot.is_started);
        assert_eq!(snapshot.started_by.as_deref(), Some("admin_user"));
    }

    #[tokio::test]
    async fn test_admin_allow_list() {
        let mut settings = Settings::template();
        settings.admins = vec!["123".to_owned(), "456".to_owned()];
        let store = ConfigStore::ephemeral(settings);

        assert!(store.is_admin("123").await);
        assert!(!store.is_admin("789").await);
    }
}
