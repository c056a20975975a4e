//! Configuration file management for taketrack.
//!
//! Configuration lives in `~/.config/taketrack/taketrack.toml`. A default file is
//! written the first time taketrack runs; missing keys fall back to defaults.

use anyhow::{bail, Context};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Audio capture and playback configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AudioConfig {
    /// Capture device. Options:
    /// - "default" for system default device
    /// - numeric index (0, 1, 2, etc.) from `taketrack list-devices`
    /// - device name from `taketrack list-devices`
    #[serde(default = "default_device")]
    pub device: String,
    /// Playback device, chosen the same way as `device`
    #[serde(default = "default_device")]
    pub output_device: String,
    /// Capture sample rate in Hz, fixed for the whole session
    #[serde(default = "default_sample_rate")]
    pub sample_rate: u32,
    /// Samples per block read from the device
    #[serde(default = "default_block_size")]
    pub block_size: usize,
    /// Blocks buffered between capture and the session before capture has to wait
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
}

fn default_device() -> String {
    "default".to_string()
}

fn default_sample_rate() -> u32 {
    44100
}

fn default_block_size() -> usize {
    1024
}

fn default_queue_capacity() -> usize {
    10
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            device: default_device(),
            output_device: default_device(),
            sample_rate: default_sample_rate(),
            block_size: default_block_size(),
            queue_capacity: default_queue_capacity(),
        }
    }
}

/// Where sessions are saved and how they are exported.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SessionConfig {
    /// Root directory for numbered session directories; relative paths resolve against the working directory
    #[serde(default = "default_sessions_dir")]
    pub sessions_dir: PathBuf,
    /// Characters of chunk text kept in `takes.csv`
    #[serde(default = "default_preview_chars")]
    pub preview_chars: usize,
}

fn default_sessions_dir() -> PathBuf {
    PathBuf::from("sessions")
}

fn default_preview_chars() -> usize {
    32
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            sessions_dir: default_sessions_dir(),
            preview_chars: default_preview_chars(),
        }
    }
}

/// Complete application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct TakeTrackConfig {
    #[serde(default)]
    pub audio: AudioConfig,
    #[serde(default)]
    pub session: SessionConfig,
}

impl TakeTrackConfig {
    /// Loads configuration from the user's config directory, writing the
    /// default file first if there is none.
    ///
    /// # Errors
    /// - If the config directory cannot be determined or created
    /// - If the config file cannot be read or written
    /// - If the TOML is malformed or holds invalid values
    pub fn load() -> anyhow::Result<Self> {
        let config_path = get_config_path()?;
        if !config_path.exists() {
            tracing::info!("No configuration found, writing defaults to {}", config_path.display());
            Self::default().save_to(&config_path)?;
        }
        Self::load_from(&config_path)
    }

    /// Loads and validates configuration from `path`.
    ///
    /// # Errors
    /// - If the file cannot be read
    /// - If the TOML is malformed or holds invalid values
    pub fn load_from(path: &Path) -> anyhow::Result<Self> {
        let config_content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        let config: TakeTrackConfig = toml::from_str(&config_content)
            .with_context(|| format!("Failed to parse {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    /// Writes configuration to `path`.
    ///
    /// # Errors
    /// - If serialization fails
    /// - If the file cannot be written
    pub fn save_to(&self, path: &Path) -> anyhow::Result<()> {
        let config_content = toml::to_string_pretty(self)?;
        fs::write(path, config_content)
            .with_context(|| format!("Failed to write {}", path.display()))?;
        tracing::info!("Configuration saved");
        Ok(())
    }

    /// Rejects values the capture pipeline cannot run with.
    ///
    /// # Errors
    /// - If the sample rate, block size or queue capacity is zero
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.audio.sample_rate == 0 {
            bail!("audio.sample_rate must be greater than zero");
        }
        if self.audio.block_size == 0 {
            bail!("audio.block_size must be greater than zero");
        }
        if self.audio.queue_capacity == 0 {
            bail!("audio.queue_capacity must be greater than zero");
        }
        Ok(())
    }
}

/// Retrieves the path to the config file, creating its directory if needed.
///
/// # Errors
/// - If the home directory cannot be determined
/// - If the config directory cannot be created
pub fn get_config_path() -> anyhow::Result<PathBuf> {
    let home = dirs::home_dir().context("Could not find home directory")?;
    let config_dir = home.join(".config").join("taketrack");
    fs::create_dir_all(&config_dir)?;
    Ok(config_dir.join("taketrack.toml"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_keys_use_defaults() {
        let config: TakeTrackConfig = toml::from_str(
            r#"
            [audio]
            device = "USB Mic"
            "#,
        )
        .unwrap();
        assert_eq!(config.audio.device, "USB Mic");
        assert_eq!(config.audio.output_device, "default");
        assert_eq!(config.audio.sample_rate, 44100);
        assert_eq!(config.audio.block_size, 1024);
        assert_eq!(config.audio.queue_capacity, 10);
        assert_eq!(config.session, SessionConfig::default());
    }

    #[test]
    fn test_save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("taketrack.toml");
        let mut config = TakeTrackConfig::default();
        config.session.preview_chars = 12;
        config.save_to(&path).unwrap();
        assert_eq!(TakeTrackConfig::load_from(&path).unwrap(), config);
    }

    #[test]
    fn test_zero_values_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("taketrack.toml");
        fs::write(&path, "[audio]\nqueue_capacity = 0\n").unwrap();
        let err = TakeTrackConfig::load_from(&path).unwrap_err();
        assert!(err.to_string().contains("queue_capacity"));
    }
}
