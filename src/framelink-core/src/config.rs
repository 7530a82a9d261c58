use crate::paths::AppDirs;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

const CURRENT_CONFIG_VERSION: u32 = 1;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default = "default_config_version")]
    pub config_version: u32,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub host: HostConfig,
    /// Named streams the CLI can open with `--preset`.
    #[serde(default)]
    pub streams: BTreeMap<String, StreamPreset>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            config_version: default_config_version(),
            logging: LoggingConfig::default(),
            host: HostConfig::default(),
            streams: BTreeMap::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: LogLevel,
    #[serde(default = "default_max_log_files")]
    pub max_log_files: usize,
    #[serde(default = "default_stdout_enabled")]
    pub stdout: bool,
    /// Also write a daily-rolling log file.
    #[serde(default = "default_file_enabled")]
    pub file: bool,
    #[serde(default)]
    pub file_name: Option<String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            max_log_files: default_max_log_files(),
            stdout: default_stdout_enabled(),
            file: default_file_enabled(),
            file_name: None,
        }
    }
}

/// Limits applied by the plugin host.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostConfig {
    /// Maximum number of simultaneously open handles.
    #[serde(default = "default_max_streams")]
    pub max_streams: usize,
    /// Free-list bound of each stream's buffer pool.
    #[serde(default = "default_max_free_buffers")]
    pub max_free_buffers: usize,
    /// Timeout used by the CLI for blocking reads.
    #[serde(default = "default_timeout_ms")]
    pub default_timeout_ms: u64,
}

impl Default for HostConfig {
    fn default() -> Self {
        Self {
            max_streams: default_max_streams(),
            max_free_buffers: default_max_free_buffers(),
            default_timeout_ms: default_timeout_ms(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamPreset {
    /// Registered driver name, e.g. `video_src`.
    pub plugin: String,
    /// Passed to the driver verbatim.
    #[serde(default)]
    pub configuration: String,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    #[default]
    Info,
    Warn,
    Error,
}

impl LogLevel {
    pub fn as_filter_directive(&self) -> &'static str {
        match self {
            LogLevel::Trace => "trace",
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config at {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to parse config at {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
    #[error("config validation failed: {0}")]
    Validation(ValidationError),
    #[error("failed to prepare configuration directories: {0}")]
    Directories(#[from] crate::paths::DirsError),
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("unsupported config_version {found}, expected {expected}")]
    UnsupportedVersion { found: u32, expected: u32 },
    #[error("host.max_streams must be at least 1")]
    NoStreams,
    #[error("stream preset '{name}' has an empty plugin name")]
    EmptyPlugin { name: String },
    #[error("stream preset '{name}' configuration contains a NUL byte")]
    NulInConfiguration { name: String },
    #[error("unknown stream preset '{name}'")]
    UnknownPreset { name: String },
}

impl Config {
    pub fn load_or_default(dirs: &AppDirs) -> Result<Self, ConfigError> {
        dirs.ensure_exists()?;
        let path = Self::config_path(dirs);
        if !path.exists() {
            return Ok(Self::default());
        }
        Self::load(&path)
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config: Config = toml::from_str(&contents).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        config.validate().map_err(ConfigError::Validation)?;
        Ok(config)
    }

    pub fn config_path(dirs: &AppDirs) -> PathBuf {
        dirs.config_dir().join("config.toml")
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.config_version != CURRENT_CONFIG_VERSION {
            return Err(ValidationError::UnsupportedVersion {
                found: self.config_version,
                expected: CURRENT_CONFIG_VERSION,
            });
        }
        if self.host.max_streams == 0 {
            return Err(ValidationError::NoStreams);
        }
        for (name, preset) in &self.streams {
            if preset.plugin.trim().is_empty() {
                return Err(ValidationError::EmptyPlugin { name: name.clone() });
            }
            if preset.configuration.contains('\0') {
                return Err(ValidationError::NulInConfiguration { name: name.clone() });
            }
        }
        Ok(())
    }

    pub fn preset(&self, name: &str) -> Result<&StreamPreset, ValidationError> {
        self.streams
            .get(name)
            .ok_or_else(|| ValidationError::UnknownPreset {
                name: name.to_string(),
            })
    }
}

fn default_config_version() -> u32 {
    CURRENT_CONFIG_VERSION
}

fn default_log_level() -> LogLevel {
    LogLevel::Info
}

fn default_max_log_files() -> usize {
    7
}

fn default_stdout_enabled() -> bool {
    true
}

fn default_file_enabled() -> bool {
    true
}

fn default_max_streams() -> usize {
    1024
}

fn default_max_free_buffers() -> usize {
    crate::pool::DEFAULT_MAX_FREE_BUFFERS
}

fn default_timeout_ms() -> u64 {
    1000
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn defaults_are_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.logging.max_log_files, 7);
        assert!(config.logging.stdout);
        assert_eq!(config.logging.level, LogLevel::Info);
        assert_eq!(config.host.max_streams, 1024);
        assert_eq!(config.host.max_free_buffers, 8);
    }

    #[test]
    fn invalid_version_rejected() {
        let mut config = Config::default();
        config.config_version = CURRENT_CONFIG_VERSION + 1;
        let result = config.validate();
        assert!(matches!(
            result,
            Err(ValidationError::UnsupportedVersion { .. })
        ));
    }

    #[test]
    fn presets_parse_from_toml() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"
[logging]
level = "debug"

[host]
max_streams = 4

[streams.hd]
plugin = "video_src"
configuration = "width=1920;height=1080;format=rgb24"
"#
        )
        .unwrap();

        let config = Config::load(file.path()).expect("config should load");
        assert_eq!(config.logging.level, LogLevel::Debug);
        assert_eq!(config.host.max_streams, 4);
        assert_eq!(config.host.default_timeout_ms, 1000);
        let preset = config.preset("hd").unwrap();
        assert_eq!(preset.plugin, "video_src");
        assert_eq!(preset.configuration, "width=1920;height=1080;format=rgb24");
        assert!(matches!(
            config.preset("sd"),
            Err(ValidationError::UnknownPreset { .. })
        ));
    }

    #[test]
    fn empty_plugin_rejected() {
        let mut config = Config::default();
        config.streams.insert(
            "broken".into(),
            StreamPreset {
                plugin: " ".into(),
                configuration: String::new(),
            },
        );
        assert_eq!(
            config.validate(),
            Err(ValidationError::EmptyPlugin {
                name: "broken".into()
            })
        );
    }

    #[test]
    fn zero_stream_limit_rejected() {
        let mut config = Config::default();
        config.host.max_streams = 0;
        assert_eq!(config.validate(), Err(ValidationError::NoStreams));
    }
}
