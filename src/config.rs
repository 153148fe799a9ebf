//! Runtime configuration - TOML file with per-subsystem sections

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::errors::{ErrorKind, RuntimeError};
use crate::logging::{self, LogConfig, LogFormat};

/// File names searched by `RuntimeConfig::discover`, in order
pub const CONFIG_FILE_NAMES: [&str; 2] = ["cfish.toml", ".cfishrc"];

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RuntimeConfig {
    #[serde(default)]
    pub registry: RegistryConfig,

    #[serde(default)]
    pub sort: SortConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegistryConfig {
    /// Fixed slot count of the class registry; never grows
    #[serde(default = "default_registry_capacity")]
    pub capacity: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SortConfig {
    /// Accounted bytes fed into a sort engine before it spills a run
    #[serde(default = "default_mem_thresh")]
    pub mem_thresh: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_level")]
    pub level: String,

    #[serde(default = "default_false")]
    pub json: bool,

    #[serde(default = "default_false")]
    pub spans: bool,

    /// Directory for rotated log files; console output when absent
    #[serde(default)]
    pub directory: Option<String>,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            capacity: default_registry_capacity(),
        }
    }
}

impl Default for SortConfig {
    fn default() -> Self {
        Self {
            mem_thresh: default_mem_thresh(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_level(),
            json: false,
            spans: false,
            directory: None,
        }
    }
}

fn default_registry_capacity() -> usize { 256 }
fn default_mem_thresh() -> usize { u32::MAX as usize }
fn default_level() -> String { "info".to_string() }
fn default_false() -> bool { false }

impl RuntimeConfig {
    /// Load configuration from a TOML file
    pub fn load(path: &Path) -> Result<Self, RuntimeError> {
        let content = fs::read_to_string(path).map_err(|e| {
            RuntimeError::new(ErrorKind::ConfigRead {
                path: path.display().to_string(),
                reason: e.to_string(),
            })
        })?;

        Self::parse(&content)
    }

    /// Parse configuration from a TOML string
    pub fn parse(content: &str) -> Result<Self, RuntimeError> {
        toml::from_str(content).map_err(|e| {
            RuntimeError::new(ErrorKind::ConfigParse {
                reason: e.to_string(),
            })
        })
    }

    /// Find and load configuration from the current directory or its parents
    pub fn discover() -> Self {
        match std::env::current_dir() {
            Ok(dir) => Self::discover_from(&dir),
            Err(_) => Self::default(),
        }
    }

    /// Walk upward from `start` and load the first config file found
    pub fn discover_from(start: &Path) -> Self {
        let mut current: Option<PathBuf> = Some(start.to_path_buf());

        while let Some(dir) = current {
            for name in CONFIG_FILE_NAMES {
                let config_path = dir.join(name);
                if config_path.exists() {
                    match Self::load(&config_path) {
                        Ok(config) => return config,
                        Err(err) => {
                            logging::warn!(target: "runtime", error = %err, "ignoring config file");
                        }
                    }
                }
            }

            current = dir.parent().map(|p| p.to_path_buf());
        }

        Self::default()
    }

    /// Translate the logging section into a subscriber configuration
    pub fn log_config(&self) -> LogConfig {
        let mut config = LogConfig::default();
        if let Some(level) = logging::parse_level(&self.logging.level) {
            config.level = level;
        }
        if self.logging.json {
            config.format = LogFormat::Json;
        }
        config.span_events = self.logging.spans;
        if let Some(directory) = &self.logging.directory {
            config.output = logging::LogOutput::File {
                directory: directory.clone(),
                prefix: "cfish_runtime".to_string(),
            };
        }
        config
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logging::Level;

    #[test]
    fn defaults() {
        let config = RuntimeConfig::default();
        assert_eq!(config.registry.capacity, 256);
        assert_eq!(config.sort.mem_thresh, u32::MAX as usize);
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn parse_partial_sections() {
        let config = RuntimeConfig::parse(
            r#"
            [registry]
            capacity = 64

            [logging]
            level = "debug"
            json = true
            "#,
        )
        .expect("valid config");

        assert_eq!(config.registry.capacity, 64);
        assert_eq!(config.sort, SortConfig::default());
        let log = config.log_config();
        assert_eq!(log.level, Level::DEBUG);
        assert_eq!(log.format, LogFormat::Json);
    }

    #[test]
    fn parse_error_is_reported() {
        let err = RuntimeConfig::parse("[registry]\ncapacity = \"many\"").unwrap_err();
        assert!(matches!(err.kind, ErrorKind::ConfigParse { .. }));
    }

    #[test]
    fn discover_walks_parents() {
        let root = tempfile::tempdir().expect("tempdir");
        let nested = root.path().join("a").join("b");
        fs::create_dir_all(&nested).unwrap();
        fs::write(root.path().join("cfish.toml"), "[sort]\nmem_thresh = 1024\n").unwrap();

        let config = RuntimeConfig::discover_from(&nested);
        assert_eq!(config.sort.mem_thresh, 1024);
    }

    #[test]
    fn load_missing_file() {
        let err = RuntimeConfig::load(Path::new("/nonexistent/cfish.toml")).unwrap_err();
        assert!(matches!(err.kind, ErrorKind::ConfigRead { .. }));
    }
}
