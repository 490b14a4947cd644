//! Configuration validation for Pitchmate services.
//!
//! Checks that required values are present and within valid ranges before a
//! service starts listening.

use thiserror::Error;

use crate::config::{AgentConfig, Config, NetworkConfig, ObservabilityConfig};

/// Configuration validation error.
#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("Invalid port {port}: must be between 1 and 65535")]
    InvalidPort { port: u16, field: String },

    #[error("Missing required field: {field}")]
    MissingField { field: String },

    #[error("Invalid value for {field}: {reason}")]
    InvalidValue { field: String, reason: String },

    #[error("Multiple validation errors: {0:?}")]
    Multiple(Vec<ValidationError>),
}

/// Result type for validation operations.
pub type ValidationResult<T> = Result<T, ValidationError>;

/// Trait for validatable configuration sections.
pub trait Validate {
    /// Validate this configuration section.
    fn validate(&self) -> ValidationResult<()>;
}

impl Config {
    /// Validate the entire configuration.
    pub fn validate(&self) -> ValidationResult<()> {
        let mut errors = Vec::new();

        if let Err(e) = self.network.validate() {
            errors.push(e);
        }

        if let Err(e) = self.agent.validate() {
            errors.push(e);
        }

        if let Err(e) = self.observability.validate() {
            errors.push(e);
        }

        if errors.is_empty() {
            Ok(())
        } else if errors.len() == 1 {
            Err(errors.remove(0))
        } else {
            Err(ValidationError::Multiple(errors))
        }
    }

    /// Load, apply environment overrides, and validate configuration.
    pub fn load_and_validate() -> anyhow::Result<Self> {
        let config = Self::load_with_env()?;
        config.validate().map_err(|e| anyhow::anyhow!("{}", e))?;
        Ok(config)
    }
}

impl Validate for NetworkConfig {
    fn validate(&self) -> ValidationResult<()> {
        if self.port == 0 {
            return Err(ValidationError::InvalidPort {
                port: self.port,
                field: "network.port".into(),
            });
        }

        if self.bind.parse::<std::net::IpAddr>().is_err() {
            return Err(ValidationError::InvalidValue {
                field: "network.bind".into(),
                reason: format!("'{}' is not an IP address", self.bind),
            });
        }

        Ok(())
    }
}

impl Validate for AgentConfig {
    fn validate(&self) -> ValidationResult<()> {
        if self.app_name.trim().is_empty() {
            return Err(ValidationError::MissingField {
                field: "agent.app_name".into(),
            });
        }

        if self.agent_name.trim().is_empty() {
            return Err(ValidationError::MissingField {
                field: "agent.agent_name".into(),
            });
        }

        if self.default_model.trim().is_empty() {
            return Err(ValidationError::MissingField {
                field: "agent.default_model".into(),
            });
        }

        if !(0.0..=2.0).contains(&self.temperature) {
            return Err(ValidationError::InvalidValue {
                field: "agent.temperature".into(),
                reason: "must be between 0.0 and 2.0".into(),
            });
        }

        if self.history_turns == 0 {
            return Err(ValidationError::InvalidValue {
                field: "agent.history_turns".into(),
                reason: "must be greater than 0".into(),
            });
        }

        if self.max_output_tokens <= 0 {
            return Err(ValidationError::InvalidValue {
                field: "agent.max_output_tokens".into(),
                reason: "must be greater than 0".into(),
            });
        }

        Ok(())
    }
}

impl Validate for ObservabilityConfig {
    fn validate(&self) -> ValidationResult<()> {
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.log_level.to_lowercase().as_str()) {
            return Err(ValidationError::InvalidValue {
                field: "observability.log_level".into(),
                reason: format!("must be one of: {}", valid_levels.join(", ")),
            });
        }

        let valid_formats = ["json", "pretty"];
        if !valid_formats.contains(&self.log_format.to_lowercase().as_str()) {
            return Err(ValidationError::InvalidValue {
                field: "observability.log_format".into(),
                reason: format!("must be one of: {}", valid_formats.join(", ")),
            });
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test]
    fn test_valid_default_config() {
        let config = Config::default();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_invalid_log_level() {
        let mut config = Config::default();
        config.observability.log_level = "invalid".into();
        let result = config.validate();
        assert!(result.is_err());
        if let Err(ValidationError::InvalidValue { field, .. }) = result {
            assert_eq!(field, "observability.log_level");
        }
    }

    #[test]
    fn test_zero_port() {
        let mut config = Config::default();
        config.network.port = 0;
        assert!(matches!(
            config.validate(),
            Err(ValidationError::InvalidPort { port: 0, .. })
        ));
    }

    #[test]
    fn test_invalid_bind_address() {
        let mut config = Config::default();
        config.network.bind = "localhost:80".into();
        assert!(config.validate().is_err());
    }

    #[test_case(-0.1 ; "below range")]
    #[test_case(2.5 ; "above range")]
    fn test_temperature_out_of_range(temperature: f64) {
        let mut config = Config::default();
        config.agent.temperature = temperature;
        let result = config.validate();
        if let Err(ValidationError::InvalidValue { field, .. }) = result {
            assert_eq!(field, "agent.temperature");
        } else {
            panic!("expected temperature validation error");
        }
    }

    #[test]
    fn test_empty_agent_name() {
        let mut config = Config::default();
        config.agent.agent_name = "  ".into();
        assert!(matches!(
            config.validate(),
            Err(ValidationError::MissingField { .. })
        ));
    }

    #[test]
    fn test_multiple_errors_collected() {
        let mut config = Config::default();
        config.network.port = 0;
        config.agent.history_turns = 0;
        config.observability.log_format = "xml".into();
        match config.validate() {
            Err(ValidationError::Multiple(errors)) => assert_eq!(errors.len(), 3),
            other => panic!("expected multiple errors, got {other:?}"),
        }
    }
}
