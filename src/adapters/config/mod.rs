use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Bump this when adding new fields with non-trivial defaults.
/// When a loaded config has a lower version, it is re-saved to disk
/// so that users see the new keys in their `config.toml`.
const CURRENT_CONFIG_VERSION: u32 = 1;

const MIN_FETCH_TIMEOUT_SECS: u64 = 1;
const MAX_FETCH_TIMEOUT_SECS: u64 = 300;

fn default_db_path() -> PathBuf {
    PathBuf::from("agent_os.db")
}

fn default_export_dir() -> PathBuf {
    PathBuf::from(".")
}

fn default_fetch_timeout_secs() -> u64 {
    30
}

fn default_openai_base_url() -> String {
    "https://api.openai.com".to_string()
}

fn default_anthropic_base_url() -> String {
    "https://api.anthropic.com".to_string()
}

fn default_anthropic_version() -> String {
    "2023-06-01".to_string()
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to parse {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
    #[error("failed to write {path}: {source}")]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to serialize settings: {0}")]
    Serialize(#[from] toml::ser::Error),
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct Settings {
    pub config_version: u32,
    #[serde(default = "default_db_path")]
    pub db_path: PathBuf,
    pub log_file: Option<PathBuf>,
    #[serde(default = "default_export_dir")]
    pub export_dir: PathBuf,
    #[serde(default = "default_fetch_timeout_secs")]
    pub fetch_timeout_secs: u64,
    #[serde(default = "default_openai_base_url")]
    pub openai_base_url: String,
    #[serde(default = "default_anthropic_base_url")]
    pub anthropic_base_url: String,
    #[serde(default = "default_anthropic_version")]
    pub anthropic_version: String,
    #[serde(default)]
    pub api_keys: HashMap<String, String>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            config_version: 0,
            db_path: default_db_path(),
            log_file: None,
            export_dir: default_export_dir(),
            fetch_timeout_secs: default_fetch_timeout_secs(),
            openai_base_url: default_openai_base_url(),
            anthropic_base_url: default_anthropic_base_url(),
            anthropic_version: default_anthropic_version(),
            api_keys: HashMap::new(),
        }
    }
}

impl Settings {
    fn global_config_dir() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".agent-os")
    }

    pub fn global_config_path() -> PathBuf {
        Self::global_config_dir().join("config.toml")
    }

    /// Reads settings from `path`. A missing file yields defaults at the current version.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Ok(Self {
                config_version: CURRENT_CONFIG_VERSION,
                ..Self::default()
            });
        }

        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Re-saves an older config so new fields (with their defaults) appear on disk.
    /// Returns whether the file was rewritten.
    pub fn upgrade_if_needed(&mut self, path: &Path) -> Result<bool, ConfigError> {
        if !path.exists() || self.config_version >= CURRENT_CONFIG_VERSION {
            return Ok(false);
        }
        self.config_version = CURRENT_CONFIG_VERSION;
        self.save(path)?;
        Ok(true)
    }

    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|source| ConfigError::Write {
                path: parent.to_path_buf(),
                source,
            })?;
        }
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content).map_err(|source| ConfigError::Write {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Applies process-level overrides. The caller supplies the variables so that
    /// nothing below the runtime reads the environment.
    pub fn apply_env_overrides<I>(&mut self, vars: I)
    where
        I: IntoIterator<Item = (String, String)>,
    {
        for (name, value) in vars {
            match name.as_str() {
                "OPENAI_API_KEY" => self.set_api_key("openai", &value),
                "ANTHROPIC_API_KEY" => self.set_api_key("anthropic", &value),
                "AGENT_OS_DB_PATH" if !value.trim().is_empty() => {
                    self.db_path = PathBuf::from(value.trim());
                }
                "AGENT_OS_LOG_FILE" if !value.trim().is_empty() => {
                    self.log_file = Some(PathBuf::from(value.trim()));
                }
                "AGENT_OS_EXPORT_DIR" if !value.trim().is_empty() => {
                    self.export_dir = PathBuf::from(value.trim());
                }
                _ => {}
            }
        }
    }

    pub fn set_api_key(&mut self, provider: &str, key: &str) {
        let normalized_provider = provider.trim().to_ascii_lowercase();
        if normalized_provider.is_empty() {
            return;
        }
        let normalized_key = key.trim();
        if normalized_key.is_empty() {
            self.api_keys.remove(&normalized_provider);
        } else {
            self.api_keys
                .insert(normalized_provider, normalized_key.to_string());
        }
    }

    pub fn api_key_for_provider(&self, provider: &str) -> Option<&str> {
        self.api_keys
            .get(&provider.trim().to_ascii_lowercase())
            .map(|key| key.trim())
            .filter(|key| !key.is_empty())
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(
            self.fetch_timeout_secs
                .clamp(MIN_FETCH_TIMEOUT_SECS, MAX_FETCH_TIMEOUT_SECS),
        )
    }
}
