//! Configuration builder for flexible configuration loading

use crate::{Config, ConfigError, ConfigResult};
use config::{Environment, File, FileFormat};
use std::path::{Path, PathBuf};

/// Configuration builder layering defaults, files and environment
/// variables, later sources overriding earlier ones
#[derive(Debug, Default)]
pub struct ConfigBuilder {
    sources: Vec<ConfigSource>,
    env_prefix: Option<String>,
}

#[derive(Debug, Clone)]
enum ConfigSource {
    Defaults,
    File { path: PathBuf, format: FileFormat },
}

impl ConfigBuilder {
    /// Create a new configuration builder
    pub fn new() -> Self {
        Self::default()
    }

    /// Add default configuration values
    pub fn add_defaults(mut self) -> Self {
        self.sources.push(ConfigSource::Defaults);
        self
    }

    /// Add a configuration file source, format detected from the
    /// extension (TOML default)
    pub fn add_source_file<P: AsRef<Path>>(mut self, path: P) -> Self {
        let path = path.as_ref().to_path_buf();
        let format = Self::detect_format(&path);
        self.sources.push(ConfigSource::File { path, format });
        self
    }

    /// Add environment variable overrides with the given prefix,
    /// `__` separating nested keys (`MONGOFERRY__COPY__BATCH_SIZE`)
    pub fn add_env_prefix<S: Into<String>>(mut self, prefix: S) -> Self {
        self.env_prefix = Some(prefix.into());
        self
    }

    /// Build the configuration from all added sources
    pub fn build(self) -> ConfigResult<Config> {
        let mut inner = config::Config::builder();

        for source in &self.sources {
            match source {
                ConfigSource::Defaults => {
                    let defaults = serde_json::to_string(&Config::default()).map_err(|e| {
                        ConfigError::Serialization {
                            message: format!("failed to serialize defaults: {e}"),
                        }
                    })?;
                    inner = inner
                        .add_source(File::from_str(&defaults, FileFormat::Json).required(true));
                }
                ConfigSource::File { path, format } => {
                    inner = inner.add_source(File::from(path.clone()).format(*format));
                }
            }
        }

        if let Some(prefix) = &self.env_prefix {
            inner = inner.add_source(Environment::with_prefix(prefix).separator("__"));
        }

        let built = inner.build()?;
        Ok(built.try_deserialize()?)
    }

    fn detect_format(path: &Path) -> FileFormat {
        match path.extension().and_then(|ext| ext.to_str()) {
            Some("yaml" | "yml") => FileFormat::Yaml,
            Some("json") => FileFormat::Json,
            _ => FileFormat::Toml,
        }
    }
}
