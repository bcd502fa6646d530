//! Loading and saving the settings file

use std::fs;
use std::path::{Path, PathBuf};

use super::settings::Settings;
use crate::error::{HostError, HostResult};
use crate::tracing::span_names;

/// Environment variable overriding the configuration directory
pub const CONFIG_DIR_ENV: &str = "HOSTRUN_CONFIG_DIR";

/// Name of the settings file inside the configuration directory
pub const CONFIG_FILE_NAME: &str = "config.toml";

/// Reads and writes `config.toml` in a configuration directory
#[derive(Debug, Clone)]
pub struct ConfigManager {
    config_dir: PathBuf,
}

impl ConfigManager {
    /// Manager for the default directory
    ///
    /// `$HOSTRUN_CONFIG_DIR` wins over the platform configuration directory
    /// (`~/.config/hostrun` on Linux).
    ///
    /// # Errors
    ///
    /// Returns `HostError::Config` if no configuration directory can be
    /// determined.
    pub fn new() -> HostResult<Self> {
        if let Some(dir) = std::env::var_os(CONFIG_DIR_ENV).filter(|d| !d.is_empty()) {
            return Ok(Self::with_config_dir(PathBuf::from(dir)));
        }
        dirs::config_dir()
            .map(|dir| Self::with_config_dir(dir.join("hostrun")))
            .ok_or_else(|| HostError::Config("cannot determine configuration directory".into()))
    }

    /// Manager for an explicit directory
    #[must_use]
    pub const fn with_config_dir(config_dir: PathBuf) -> Self {
        Self { config_dir }
    }

    /// The configuration directory
    pub fn config_dir(&self) -> &Path {
        &self.config_dir
    }

    /// Full path of the settings file
    #[must_use]
    pub fn settings_path(&self) -> PathBuf {
        self.config_dir.join(CONFIG_FILE_NAME)
    }

    /// Loads the settings, falling back to defaults when the file is absent
    ///
    /// # Errors
    ///
    /// Returns `HostError::Io` if the file exists but cannot be read and
    /// `HostError::Config` if it does not parse or validate.
    pub fn load_settings(&self) -> HostResult<Settings> {
        let path = self.settings_path();
        let _span = crate::trace_operation_debug!(span_names::CONFIG_LOAD, path = %path.display())
            .entered();
        if !path.exists() {
            tracing::debug!("No settings file, using defaults");
            return Ok(Settings::default());
        }
        let content = fs::read_to_string(&path)?;
        let settings: Settings = toml::from_str(&content)
            .map_err(|e| HostError::Config(format!("{}: {e}", path.display())))?;
        settings.validate()?;
        Ok(settings)
    }

    /// Writes the settings, creating the directory if needed
    ///
    /// # Errors
    ///
    /// Returns `HostError::Config` if the settings are invalid or cannot be
    /// serialized, and `HostError::Io` if the file cannot be written.
    pub fn save_settings(&self, settings: &Settings) -> HostResult<()> {
        let path = self.settings_path();
        let _span = crate::trace_operation_debug!(span_names::CONFIG_SAVE, path = %path.display())
            .entered();
        settings.validate()?;
        let content = toml::to_string_pretty(settings)
            .map_err(|e| HostError::Config(format!("failed to serialize settings: {e}")))?;
        fs::create_dir_all(&self.config_dir)?;
        fs::write(&path, content)?;
        tracing::info!(hosts = settings.hosts.len(), "Settings saved");
        Ok(())
    }
}
