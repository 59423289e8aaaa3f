use anyhow::{Context, Result};
use directories::{ProjectDirs, UserDirs};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub api: ApiConfig,
    #[serde(default)]
    pub transfer: TransferConfig,
    #[serde(default)]
    pub preview: PreviewConfig,
    #[serde(default)]
    pub ui: UiConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_metadata_path")]
    pub metadata_path: String,
    #[serde(default = "default_link_path")]
    pub link_path: String,
    /// Overall request timeout; the HTTP client default applies when unset.
    #[serde(default)]
    pub timeout_secs: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransferConfig {
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_retry_delay_secs")]
    pub retry_delay_secs: u64,
    #[serde(default = "default_timeout_secs")]
    pub connect_timeout_secs: u64,
    #[serde(default = "default_timeout_secs")]
    pub read_timeout_secs: u64,
    #[serde(default = "default_speed_sample_interval_ms")]
    pub speed_sample_interval_ms: u64,
    #[serde(default = "default_progress_interval_ms")]
    pub progress_interval_ms: u64,
    /// Falls back to the user's download directory when unset.
    #[serde(default)]
    pub download_dir: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PreviewConfig {
    #[serde(default = "default_playable_fraction")]
    pub playable_fraction: f64,
    #[serde(default = "default_playable_min_bytes")]
    pub playable_min_bytes: u64,
    /// Media player launched on the partially buffered file, e.g. "mpv".
    #[serde(default)]
    pub player: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UiConfig {
    #[serde(default = "default_alert_duration_secs")]
    pub alert_duration_secs: u64,
}

// Default value functions
fn default_base_url() -> String {
    "https://fastapi-r708.onrender.com".to_string()
}
fn default_metadata_path() -> String {
    "/file".to_string()
}
fn default_link_path() -> String {
    "/link".to_string()
}
fn default_max_retries() -> u32 {
    2
}
fn default_retry_delay_secs() -> u64 {
    2
}
fn default_timeout_secs() -> u64 {
    15
}
fn default_speed_sample_interval_ms() -> u64 {
    1000
}
fn default_progress_interval_ms() -> u64 {
    250
}
fn default_playable_fraction() -> f64 {
    0.1
}
fn default_playable_min_bytes() -> u64 {
    10_000_000
}
fn default_alert_duration_secs() -> u64 {
    3
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            metadata_path: default_metadata_path(),
            link_path: default_link_path(),
            timeout_secs: None,
        }
    }
}

impl Default for TransferConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            retry_delay_secs: default_retry_delay_secs(),
            connect_timeout_secs: default_timeout_secs(),
            read_timeout_secs: default_timeout_secs(),
            speed_sample_interval_ms: default_speed_sample_interval_ms(),
            progress_interval_ms: default_progress_interval_ms(),
            download_dir: None,
        }
    }
}

impl Default for PreviewConfig {
    fn default() -> Self {
        Self {
            playable_fraction: default_playable_fraction(),
            playable_min_bytes: default_playable_min_bytes(),
            player: None,
        }
    }
}

impl Default for UiConfig {
    fn default() -> Self {
        Self {
            alert_duration_secs: default_alert_duration_secs(),
        }
    }
}

impl TransferConfig {
    pub fn retry_delay(&self) -> Duration {
        Duration::from_secs(self.retry_delay_secs)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    pub fn read_timeout(&self) -> Duration {
        Duration::from_secs(self.read_timeout_secs)
    }

    pub fn speed_sample_interval(&self) -> Duration {
        Duration::from_millis(self.speed_sample_interval_ms)
    }

    pub fn progress_interval(&self) -> Duration {
        Duration::from_millis(self.progress_interval_ms)
    }

    /// Configured download directory, else the platform download folder,
    /// else the current directory.
    pub fn resolved_download_dir(&self) -> PathBuf {
        if let Some(dir) = &self.download_dir {
            return dir.clone();
        }

        UserDirs::new()
            .and_then(|dirs| dirs.download_dir().map(Path::to_path_buf))
            .unwrap_or_else(|| std::env::current_dir().unwrap_or_default())
    }
}

impl UiConfig {
    pub fn alert_duration(&self) -> Duration {
        Duration::from_secs(self.alert_duration_secs)
    }
}

impl Config {
    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.api.base_url.trim().is_empty() {
            anyhow::bail!("api.base_url cannot be empty");
        }
        for (key, path) in [
            ("api.metadata_path", &self.api.metadata_path),
            ("api.link_path", &self.api.link_path),
        ] {
            if !path.starts_with('/') {
                anyhow::bail!("{} must start with '/'", key);
            }
        }

        if self.transfer.connect_timeout_secs == 0 || self.transfer.read_timeout_secs == 0 {
            anyhow::bail!("transfer timeouts must be greater than 0");
        }
        if self.transfer.speed_sample_interval_ms == 0 {
            anyhow::bail!("transfer.speed_sample_interval_ms must be greater than 0");
        }

        if !(0.0..=1.0).contains(&self.preview.playable_fraction) {
            anyhow::bail!("preview.playable_fraction must be between 0 and 1");
        }

        if !(3..=5).contains(&self.ui.alert_duration_secs) {
            anyhow::bail!("ui.alert_duration_secs must be between 3 and 5");
        }

        Ok(())
    }
}

pub struct ConfigManager {
    config_file: PathBuf,
    config: Config,
}

impl ConfigManager {
    /// Load the config from the platform config directory, creating a
    /// default one on first run
    pub fn new() -> Result<Self> {
        let project_dirs = ProjectDirs::from("", "", "sharefetch")
            .context("Failed to determine config directory")?;

        Self::load_from(project_dirs.config_dir().join("config.toml"))
    }

    /// Load the config from an explicit file, creating it with defaults if
    /// it does not exist
    pub fn load_from(config_file: PathBuf) -> Result<Self> {
        if let Some(config_dir) = config_file.parent() {
            if !config_dir.as_os_str().is_empty() && !config_dir.exists() {
                fs::create_dir_all(config_dir).with_context(|| {
                    format!("Failed to create config directory: {:?}", config_dir)
                })?;
            }
        }

        let config = if config_file.exists() {
            Self::load_config(&config_file)?
        } else {
            let default_config = Config::default();
            Self::save_config(&config_file, &default_config)?;
            default_config
        };

        Ok(Self {
            config_file,
            config,
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn config_mut(&mut self) -> &mut Config {
        &mut self.config
    }

    pub fn config_file(&self) -> &Path {
        &self.config_file
    }

    /// Save the current config to disk
    pub fn save(&self) -> Result<()> {
        Self::save_config(&self.config_file, &self.config)
    }

    /// Replace the current config with defaults and persist it
    pub fn reset(&mut self) -> Result<()> {
        self.config = Config::default();
        self.save()
    }

    pub fn validate(&self) -> Result<()> {
        self.config.validate()
    }

    /// Write a default config next to the active one for reference
    pub fn create_sample_config(&self) -> Result<PathBuf> {
        let sample_file = self.config_file.with_file_name("config.sample.toml");
        Self::save_config(&sample_file, &Config::default())?;
        Ok(sample_file)
    }

    fn load_config(config_file: &Path) -> Result<Config> {
        let content = fs::read_to_string(config_file)
            .with_context(|| format!("Failed to read config file: {:?}", config_file))?;

        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {:?}", config_file))?;

        Ok(config)
    }

    fn save_config(config_file: &Path, config: &Config) -> Result<()> {
        let content = toml::to_string_pretty(config).context("Failed to serialize config")?;

        fs::write(config_file, content)
            .with_context(|| format!("Failed to write config file: {:?}", config_file))?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_first_load_writes_defaults() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("nested").join("config.toml");

        let manager = ConfigManager::load_from(path.clone()).unwrap();
        assert!(path.exists());
        assert_eq!(manager.config().transfer.max_retries, 2);
        assert_eq!(manager.config().api.metadata_path, "/file");
        assert!(manager.validate().is_ok());
    }

    #[test]
    fn test_partial_file_keeps_defaults_for_missing_keys() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("config.toml");
        fs::write(&path, "[transfer]\nmax_retries = 5\n\n[preview]\nplayer = \"mpv\"\n").unwrap();

        let manager = ConfigManager::load_from(path).unwrap();
        let config = manager.config();
        assert_eq!(config.transfer.max_retries, 5);
        assert_eq!(config.transfer.retry_delay_secs, 2);
        assert_eq!(config.preview.player.as_deref(), Some("mpv"));
        assert_eq!(config.preview.playable_min_bytes, 10_000_000);
        assert_eq!(config.ui.alert_duration_secs, 3);
    }

    #[test]
    fn test_validation_rejects_bad_values() {
        let mut config = Config::default();
        config.ui.alert_duration_secs = 10;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.preview.playable_fraction = 1.5;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.api.link_path = "link".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_reset_restores_defaults() {
        let temp_dir = TempDir::new().unwrap();
        let mut manager = ConfigManager::load_from(temp_dir.path().join("config.toml")).unwrap();

        manager.config_mut().transfer.max_retries = 9;
        manager.save().unwrap();
        manager.reset().unwrap();

        let reloaded = ConfigManager::load_from(manager.config_file().to_path_buf()).unwrap();
        assert_eq!(reloaded.config().transfer.max_retries, 2);
    }
}
