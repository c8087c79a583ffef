use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::api::HttpChatApi;
use crate::error::ConfigError;
use crate::storage::FileStore;

#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub base_url: String,
    pub data_dir: PathBuf,
    pub local_participant_uuid: String,
    pub request_timeout: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            base_url: HttpChatApi::DEFAULT_BASE_URL.to_string(),
            data_dir: FileStore::default_dir(),
            local_participant_uuid: Self::DEFAULT_PARTICIPANT.to_string(),
            request_timeout: HttpChatApi::DEFAULT_TIMEOUT,
        }
    }
}

/// On-disk layout, every key optional.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct ConfigFile {
    base_url: Option<String>,
    data_dir: Option<PathBuf>,
    me: Option<String>,
    request_timeout_secs: Option<u64>,
}

impl Config {
    pub const DEFAULT_PARTICIPANT: &'static str = "you";
    pub const ENV_BASE_URL: &'static str = "TRIBECHAT_BASE_URL";
    pub const ENV_DATA_DIR: &'static str = "TRIBECHAT_DATA_DIR";
    pub const ENV_ME: &'static str = "TRIBECHAT_ME";

    /// `$XDG_CONFIG_HOME/tribechat/config.toml` or the platform equivalent.
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("tribechat").join("config.toml"))
    }

    /// Defaults, then the config file, then the environment.
    ///
    /// An explicit `path` must exist; the default location may be absent.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = Self::default();

        match path {
            Some(path) => config.apply_file(&read(path)?)?,
            None => {
                if let Some(path) = Self::default_path().filter(|p| p.exists()) {
                    config.apply_file(&read(&path)?)?;
                }
            }
        }

        config.apply_env(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    pub fn from_toml(data: &str) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        config.apply_file(data)?;
        config.validate()?;
        Ok(config)
    }

    fn apply_file(&mut self, data: &str) -> Result<(), ConfigError> {
        let file: ConfigFile = toml::from_str(data)?;
        if let Some(base_url) = file.base_url {
            self.base_url = base_url;
        }
        if let Some(data_dir) = file.data_dir {
            self.data_dir = data_dir;
        }
        if let Some(me) = file.me {
            self.local_participant_uuid = me;
        }
        if let Some(secs) = file.request_timeout_secs {
            self.request_timeout = Duration::from_secs(secs);
        }
        Ok(())
    }

    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        if let Some(base_url) = get(Self::ENV_BASE_URL) {
            self.base_url = base_url;
        }
        if let Some(data_dir) = get(Self::ENV_DATA_DIR) {
            self.data_dir = PathBuf::from(data_dir);
        }
        if let Some(me) = get(Self::ENV_ME) {
            self.local_participant_uuid = me;
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let ok = reqwest::Url::parse(&self.base_url)
            .map(|url| matches!(url.scheme(), "http" | "https"))
            .unwrap_or(false);
        if !ok {
            return Err(ConfigError::InvalidBaseUrl(self.base_url.clone()));
        }
        Ok(())
    }
}

fn read(path: &Path) -> Result<String, ConfigError> {
    std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.display().to_string(),
        source,
    })
}
