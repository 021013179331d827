use anyhow::Result;
use eino_engine::storage::JsonFileStorage;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Process-wide override of the answer service base URL.
pub const API_BASE_ENV: &str = "EINO_API_BASE";

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(default)]
pub struct Config {
    pub server_url: String,
    pub markdown: bool,
    pub send_conversation_id: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data_dir: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server_url: "http://localhost:8080".to_string(),
            markdown: true,
            send_conversation_id: false,
            data_dir: None,
        }
    }
}

impl Config {
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::config_path()?)
    }

    /// Reads the config at `path`, writing the defaults there first if it is missing.
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            let config = Self::default();
            config.save_to(path)?;
            return Ok(config);
        }

        let content = std::fs::read_to_string(path)?;
        let config: Config = serde_json::from_str(&content)?;
        Ok(config)
    }

    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::config_path()?)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Base URL of the answer service, honouring `EINO_API_BASE`.
    pub fn api_base(&self) -> String {
        self.api_base_with(std::env::var(API_BASE_ENV).ok())
    }

    fn api_base_with(&self, env_override: Option<String>) -> String {
        env_override
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
            .unwrap_or_else(|| self.server_url.clone())
    }

    /// Directory holding conversations and the log file.
    pub fn data_dir(&self) -> Result<PathBuf> {
        match &self.data_dir {
            Some(dir) => Ok(dir.clone()),
            None => Ok(JsonFileStorage::default_dir()?),
        }
    }

    fn config_path() -> Result<PathBuf> {
        let home = dirs::home_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find home directory"))?;
        Ok(home.join(".config").join("eino").join("config.json"))
    }
}
