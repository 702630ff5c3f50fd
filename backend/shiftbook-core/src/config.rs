// src/config.rs
use serde::Deserialize;
use thiserror::Error;

use crate::schedule::{ScheduleRules, DEFAULT_MAX_YEAR, DEFAULT_MIN_YEAR};

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read configuration from environment: {0}")]
    Env(#[from] envy::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    // Server Configuration
    #[serde(default = "default_server_host")]
    pub server_host: String,
    #[serde(default = "default_server_port")]
    pub server_port: u16,
    pub cert_path: Option<String>,
    pub key_path: Option<String>,

    // Storage
    #[serde(default = "default_database_url")]
    pub database_url: String,

    // JWT Authentication
    pub jwt_secret: String,
    #[serde(default = "default_jwt_expiration_hours")]
    pub jwt_expiration_hours: u64,

    // Schedule rules
    #[serde(default = "default_min_year")]
    pub min_year: i32,
    #[serde(default = "default_max_year")]
    pub max_year: i32,
}

fn default_server_host() -> String {
    "127.0.0.1".to_string()
}

fn default_server_port() -> u16 {
    3000
}

fn default_database_url() -> String {
    "sqlite://shiftbook.db".to_string()
}

fn default_jwt_expiration_hours() -> u64 {
    24
}

fn default_min_year() -> i32 {
    DEFAULT_MIN_YEAR
}

fn default_max_year() -> i32 {
    DEFAULT_MAX_YEAR
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        // Load .env file if it exists
        dotenv::dotenv().ok();

        let config = envy::from_env::<Config>()?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.jwt_secret.trim().is_empty() {
            return Err(ConfigError::Invalid("JWT_SECRET must not be empty".to_string()));
        }
        if self.min_year > self.max_year {
            return Err(ConfigError::Invalid(format!(
                "MIN_YEAR ({}) is greater than MAX_YEAR ({})",
                self.min_year, self.max_year
            )));
        }
        if self.cert_path.is_some() != self.key_path.is_some() {
            return Err(ConfigError::Invalid(
                "CERT_PATH and KEY_PATH must be set together".to_string(),
            ));
        }
        Ok(())
    }

    pub fn jwt_secret_bytes(&self) -> &[u8] {
        self.jwt_secret.as_bytes()
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.server_host, self.server_port)
    }

    /// Certificate and key paths when TLS is configured.
    pub fn tls_paths(&self) -> Option<(&str, &str)> {
        match (&self.cert_path, &self.key_path) {
            (Some(cert), Some(key)) => Some((cert.as_str(), key.as_str())),
            _ => None,
        }
    }

    pub fn schedule_rules(&self) -> ScheduleRules {
        ScheduleRules {
            min_year: self.min_year,
            max_year: self.max_year,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn from_vars(vars: &[(&str, &str)]) -> Result<Config, ConfigError> {
        let config = envy::from_iter::<_, Config>(
            vars.iter()
                .map(|(k, v)| (k.to_string(), v.to_string())),
        )?;
        config.validate()?;
        Ok(config)
    }

    #[test]
    fn defaults_apply_when_only_secret_is_set() {
        let config = from_vars(&[("JWT_SECRET", "s3cret")]).unwrap();
        assert_eq!(config.bind_address(), "127.0.0.1:3000");
        assert_eq!(config.database_url, "sqlite://shiftbook.db");
        assert_eq!(config.jwt_expiration_hours, 24);
        assert_eq!(config.schedule_rules(), ScheduleRules::default());
        assert!(config.tls_paths().is_none());
    }

    #[test]
    fn missing_secret_is_an_error() {
        assert!(matches!(from_vars(&[]), Err(ConfigError::Env(_))));
        assert!(matches!(
            from_vars(&[("JWT_SECRET", "  ")]),
            Err(ConfigError::Invalid(_))
        ));
    }

    #[test]
    fn overrides_are_parsed() {
        let config = from_vars(&[
            ("JWT_SECRET", "s3cret"),
            ("SERVER_PORT", "8443"),
            ("MIN_YEAR", "2000"),
            ("MAX_YEAR", "2030"),
            ("CERT_PATH", "cert.pem"),
            ("KEY_PATH", "key.pem"),
        ])
        .unwrap();
        assert_eq!(config.server_port, 8443);
        assert_eq!(config.schedule_rules().min_year, 2000);
        assert_eq!(config.schedule_rules().max_year, 2030);
        assert_eq!(config.tls_paths(), Some(("cert.pem", "key.pem")));
    }

    #[test]
    fn inconsistent_settings_are_rejected() {
        assert!(matches!(
            from_vars(&[("JWT_SECRET", "s"), ("MIN_YEAR", "2050"), ("MAX_YEAR", "2040")]),
            Err(ConfigError::Invalid(_))
        ));
        assert!(matches!(
            from_vars(&[("JWT_SECRET", "s"), ("CERT_PATH", "cert.pem")]),
            Err(ConfigError::Invalid(_))
        ));
    }
}
