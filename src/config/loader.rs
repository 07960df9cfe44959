//! Configuration loading from disk.

use std::fs;
use std::path::Path;

use thiserror::Error;

use crate::config::schema::TraceConfig;
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

/// Parse and validate configuration from a TOML string.
pub fn parse_config(content: &str) -> Result<TraceConfig, ConfigError> {
    let config: TraceConfig = toml::from_str(content)?;
    validate_config(&config).map_err(ConfigError::Validation)?;
    Ok(config)
}

/// Load and validate configuration from a TOML file.
pub fn load_config(path: &Path) -> Result<TraceConfig, ConfigError> {
    let content = fs::read_to_string(path)?;
    parse_config(&content)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn loads_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
            [correlation]
            header = "x-correlation-id"
            mirror_header = ""

            [client]
            user_agent = "svc-a"
            "#
        )
        .unwrap();

        let config = load_config(file.path()).unwrap();
        assert_eq!(config.correlation.header, "x-correlation-id");
        assert!(config.correlation.mirror_header.is_empty());
        assert_eq!(config.client.user_agent, "svc-a");
    }

    #[test]
    fn missing_file_is_io_error() {
        let err = load_config(Path::new("/definitely/not/here.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::Io(_)));
    }

    #[test]
    fn validation_errors_are_joined() {
        let err = parse_config(
            r#"
            [listener]
            shutdown_timeout_secs = 0

            [correlation]
            header = "no spaces allowed"
            "#,
        )
        .unwrap_err();

        let text = err.to_string();
        assert!(text.starts_with("Validation failed: "));
        assert!(text.contains("listener.shutdown_timeout_secs"));
        assert!(text.contains("correlation.header"));
    }

    #[test]
    fn syntax_error_is_parse_error() {
        let err = parse_config("[logging\nverbose = true").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }
}
