//! Configuration validation traits and utilities, following the same
//! per-domain `Validatable` convention across every domain module.

use crate::error::{ConfigError, ConfigResult};

pub trait Validatable {
    fn validate(&self) -> ConfigResult<()>;

    fn domain_name(&self) -> &'static str;

    fn validation_error(&self, message: impl Into<String>) -> ConfigError {
        ConfigError::DomainError {
            domain: self.domain_name().to_string(),
            message: message.into(),
        }
    }
}

pub fn validate_positive<T>(value: T, field_name: &str, domain: &str) -> ConfigResult<()>
where
    T: PartialOrd + Default + std::fmt::Display,
{
    if value <= T::default() {
        return Err(ConfigError::DomainError {
            domain: domain.to_string(),
            message: format!("{field_name} must be greater than 0, got {value}"),
        });
    }
    Ok(())
}

pub fn validate_port_range(port: u16, field_name: &str, domain: &str) -> ConfigResult<()> {
    if port == 0 {
        return Err(ConfigError::DomainError {
            domain: domain.to_string(),
            message: format!("{field_name} must not be 0"),
        });
    }
    Ok(())
}

pub fn validate_fraction(value: f64, field_name: &str, domain: &str) -> ConfigResult<()> {
    if !(0.0..=1.0).contains(&value) {
        return Err(ConfigError::DomainError {
            domain: domain.to_string(),
            message: format!("{field_name} must be between 0.0 and 1.0, got {value}"),
        });
    }
    Ok(())
}
