//! Configuration file loading and error types.

use std::{fs, path::Path};

use crate::Config;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
    #[error("json: {0}")]
    Json(#[from] serde_json::Error),
    #[error("yaml: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("toml: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("unsupported config format: {0}")]
    UnsupportedFormat(String),
    #[error("validation: {0}")]
    Validation(String),
}

enum Format {
    Json,
    Yaml,
    Toml,
}

impl Format {
    fn from_extension(path: &Path) -> Result<Self, ConfigError> {
        match path.extension().and_then(|s| s.to_str()).unwrap_or("") {
            "json" | "jsonc" => Ok(Format::Json),
            "yaml" | "yml" => Ok(Format::Yaml),
            "toml" => Ok(Format::Toml),
            other => Err(ConfigError::UnsupportedFormat(other.to_string())),
        }
    }
}

/// Load a config file, dispatching on the file extension. JSON input may
/// carry comments (jsonc).
pub fn load_config(path: impl AsRef<Path>) -> Result<Config, ConfigError> {
    let path = path.as_ref();
    let format = Format::from_extension(path)?;
    let data = fs::read_to_string(path)?;
    match format {
        Format::Json => {
            let stripped = json_comments::StripComments::new(data.as_bytes());
            Ok(serde_json::from_reader(stripped)?)
        }
        Format::Yaml => Ok(serde_yaml::from_str(&data)?),
        Format::Toml => Ok(toml::from_str(&data)?),
    }
}
