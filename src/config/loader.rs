//! Configuration loading from disk.

use std::fs;
use std::path::Path;

use thiserror::Error;

use crate::config::schema::ProxyConfig;
use crate::config::validation::{validate_config, ValidationError};

/// Error type for configuration loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation failed: {}", join(.0))]
    Validation(Vec<ValidationError>),
}

fn join(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Load and validate configuration from a TOML file.
pub fn load_config(path: &Path) -> Result<ProxyConfig, ConfigError> {
    let content = fs::read_to_string(path)?;
    let config: ProxyConfig = toml::from_str(&content)?;

    validate_config(&config).map_err(ConfigError::Validation)?;

    tracing::debug!(path = %path.display(), "Configuration file loaded");
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::EvictionPolicy;
    use std::path::PathBuf;

    fn temp_file(contents: &str) -> PathBuf {
        let path = std::env::temp_dir().join(format!("proxy-config-{}.toml", uuid::Uuid::new_v4()));
        fs::write(&path, contents).unwrap();
        path
    }

    #[test]
    fn loads_valid_file() {
        let path = temp_file("[cache]\ncapacity = 5\neviction = \"mru\"\n");
        let config = load_config(&path);
        let _ = fs::remove_file(&path);

        let config = config.unwrap();
        assert_eq!(config.cache.capacity, 5);
        assert_eq!(config.cache.eviction, EvictionPolicy::Mru);
    }

    #[test]
    fn missing_file_is_io_error() {
        let path = std::env::temp_dir().join("proxy-config-does-not-exist.toml");
        assert!(matches!(load_config(&path), Err(ConfigError::Io(_))));
    }

    #[test]
    fn syntax_error_is_parse_error() {
        let path = temp_file("[cache\ncapacity = ");
        let result = load_config(&path);
        let _ = fs::remove_file(&path);
        assert!(matches!(result, Err(ConfigError::Parse(_))));
    }

    #[test]
    fn semantic_error_is_validation_error() {
        let path = temp_file("[cache]\ncapacity = 0\n[buffers]\nread_chunk = 0\n");
        let result = load_config(&path);
        let _ = fs::remove_file(&path);

        let error = result.unwrap_err();
        assert!(matches!(&error, ConfigError::Validation(errors) if errors.len() == 2));
        assert!(error.to_string().starts_with("Validation failed: "));
    }
}
