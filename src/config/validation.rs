//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (timeouts > 0, addresses parse)
//! - Check that every route target is a usable backend URL
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: ProxyConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::collections::HashSet;
use std::net::SocketAddr;
use std::path::Path;

use thiserror::Error;

use crate::config::schema::ProxyConfig;
use crate::forward::{ForwardTarget, TargetError};

/// A single semantic problem in a configuration.
#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("listener.bind_address '{0}' is not a socket address")]
    BindAddress(String),

    #[error("listener.tls {field} '{path}' does not exist")]
    TlsFileMissing { field: &'static str, path: String },

    #[error("timeouts.{0} must be greater than zero")]
    ZeroTimeout(&'static str),

    #[error("route #{0} has an empty name")]
    EmptyRouteName(usize),

    #[error("route name '{0}' is used more than once")]
    DuplicateRoute(String),

    #[error("route '{route}': {source}")]
    InvalidTarget {
        route: String,
        #[source]
        source: TargetError,
    },
}

/// Check a parsed configuration.
pub fn validate_config(config: &ProxyConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.listener.bind_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::BindAddress(
            config.listener.bind_address.clone(),
        ));
    }

    if let Some(tls) = &config.listener.tls {
        for (field, path) in [("cert_path", &tls.cert_path), ("key_path", &tls.key_path)] {
            if !Path::new(path).exists() {
                errors.push(ValidationError::TlsFileMissing {
                    field,
                    path: path.clone(),
                });
            }
        }
    }

    if config.timeouts.dial_ms == 0 {
        errors.push(ValidationError::ZeroTimeout("dial_ms"));
    }
    if config.timeouts.response_header_ms == 0 {
        errors.push(ValidationError::ZeroTimeout("response_header_ms"));
    }

    let mut names = HashSet::new();
    for (index, route) in config.routes.iter().enumerate() {
        if route.name.trim().is_empty() {
            errors.push(ValidationError::EmptyRouteName(index));
        } else if !names.insert(route.name.as_str()) {
            errors.push(ValidationError::DuplicateRoute(route.name.clone()));
        }

        if let Err(source) = route.target.parse::<ForwardTarget>() {
            errors.push(ValidationError::InvalidTarget {
                route: route.name.clone(),
                source,
            });
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::schema::{RouteConfig, TlsConfig};

    fn route(name: &str, target: &str) -> RouteConfig {
        RouteConfig {
            name: name.to_string(),
            host: None,
            path_prefix: None,
            target: target.to_string(),
            priority: 0,
        }
    }

    #[test]
    fn default_config_is_valid() {
        assert!(validate_config(&ProxyConfig::default()).is_ok());
    }

    #[test]
    fn collects_every_problem() {
        let mut config = ProxyConfig::default();
        config.listener.bind_address = "not-an-address".into();
        config.timeouts.dial_ms = 0;
        config.routes = vec![
            route("api", "http://127.0.0.1:3000"),
            route("api", "ws://127.0.0.1:3001"),
            route("", "http://127.0.0.1:3002"),
            route("bad", "/relative"),
        ];

        let errors = validate_config(&config).unwrap_err();
        assert_eq!(errors.len(), 5, "{errors:?}");
        assert!(errors
            .iter()
            .any(|e| matches!(e, ValidationError::DuplicateRoute(name) if name == "api")));
        assert!(errors
            .iter()
            .any(|e| matches!(e, ValidationError::InvalidTarget { route, .. } if route == "bad")));
    }

    #[test]
    fn missing_tls_files_are_reported() {
        let mut config = ProxyConfig::default();
        config.listener.tls = Some(TlsConfig {
            cert_path: "/nonexistent/cert.pem".into(),
            key_path: "/nonexistent/key.pem".into(),
        });
        let errors = validate_config(&config).unwrap_err();
        assert_eq!(errors.len(), 2);
    }
}
