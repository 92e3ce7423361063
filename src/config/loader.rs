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
    parse_config(&content)
}

/// Parse and validate configuration text.
pub fn parse_config(content: &str) -> Result<ProxyConfig, ConfigError> {
    let config: ProxyConfig = toml::from_str(content)?;
    validate_config(&config).map_err(ConfigError::Validation)?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_full_file() {
        let config = parse_config(
            r#"
            [listener]
            bind_address = "127.0.0.1:9000"

            [forward]
            trust_forward_header = true
            hostname = "edge"
            pass_host_header = true

            [timeouts]
            dial_ms = 250
            response_header_ms = 1000

            [streaming]
            collapse_window_ms = 10
            max_idle_per_host = 8

            [[routes]]
            name = "chat"
            host = "chat.example.com"
            path_prefix = "/ws"
            target = "ws://127.0.0.1:9001"
            priority = 10

            [observability]
            log_level = "debug"
            "#,
        )
        .unwrap();

        assert!(config.forward.pass_host_header);
        assert_eq!(config.timeouts.dial_ms, 250);
        assert_eq!(config.streaming.max_idle_per_host, 8);
        assert_eq!(config.routes[0].host.as_deref(), Some("chat.example.com"));
        assert_eq!(config.observability.log_level, "debug");
    }

    #[test]
    fn validation_failures_are_joined() {
        let err = parse_config(
            r#"
            [timeouts]
            dial_ms = 0
            response_header_ms = 0
            "#,
        )
        .unwrap_err();
        let message = err.to_string();
        assert!(message.contains("dial_ms"), "{message}");
        assert!(message.contains("response_header_ms"), "{message}");
    }

    #[test]
    fn syntax_errors_are_parse_errors() {
        assert!(matches!(
            parse_config("[listener"),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn missing_file_is_io_error() {
        assert!(matches!(
            load_config(Path::new("/nonexistent/forwarder.toml")),
            Err(ConfigError::Io(_))
        ));
    }
}
