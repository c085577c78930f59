//! Configuration loader utilities

use crate::{Config, ConfigBuilder, ConfigError, ConfigResult};
use std::path::{Path, PathBuf};

/// Configuration loader with common loading patterns
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load configuration from default locations, falling back to
    /// built-in defaults when no file exists
    pub fn load_default() -> ConfigResult<Config> {
        let mut builder = ConfigBuilder::new().add_defaults();

        for path in Self::default_config_paths() {
            if path.exists() {
                builder = builder.add_source_file(&path);
                break;
            }
        }

        builder.add_env_prefix("MONGOFERRY").build()
    }

    /// Load configuration from a specific file
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> ConfigResult<Config> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(ConfigError::Io {
                path: path.to_path_buf(),
                source: std::io::Error::new(
                    std::io::ErrorKind::NotFound,
                    "configuration file not found",
                ),
            });
        }
        ConfigBuilder::new()
            .add_defaults()
            .add_source_file(path)
            .add_env_prefix("MONGOFERRY")
            .build()
    }

    /// Save configuration to a file, format chosen by extension
    pub fn save_to_file<P: AsRef<Path>>(config: &Config, path: P) -> ConfigResult<()> {
        let path = path.as_ref();
        let content = match path.extension().and_then(|ext| ext.to_str()) {
            Some("yaml" | "yml") => {
                serde_yaml::to_string(config).map_err(|e| ConfigError::Serialization {
                    message: format!("failed to serialize to YAML: {e}"),
                })?
            }
            Some("json") => {
                serde_json::to_string_pretty(config).map_err(|e| ConfigError::Serialization {
                    message: format!("failed to serialize to JSON: {e}"),
                })?
            }
            _ => toml::to_string_pretty(config).map_err(|e| ConfigError::Serialization {
                message: format!("failed to serialize to TOML: {e}"),
            })?,
        };
        std::fs::write(path, content).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })
    }

    fn default_config_paths() -> Vec<PathBuf> {
        let mut paths = vec![PathBuf::from("mongoferry.toml"), PathBuf::from("mongoferry.yaml")];
        if let Some(home) = std::env::var_os("HOME") {
            let home = PathBuf::from(home);
            paths.push(home.join(".config/mongoferry/mongoferry.toml"));
            paths.push(home.join(".mongoferry.toml"));
        }
        paths
    }
}
