//! Configuration loading for the verification service
//!
//! Resolution priority order:
//! 1. Environment variables (`EKYC_*`, highest priority)
//! 2. TOML config file (path from `EKYC_CONFIG`, default `ekyc.toml`)
//! 3. Compiled defaults
//!
//! An environment override that cannot be parsed is a configuration
//! error, not a silent fallback.

use crate::{Error, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Service settings shared by all components
#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    /// SQLite database file path
    #[serde(default = "default_database_path")]
    pub database_path: PathBuf,

    /// HTTP bind address
    #[serde(default = "default_bind_address")]
    pub bind_address: String,

    /// Directory for uploaded document images, selfies and liveness videos
    #[serde(default = "default_upload_dir")]
    pub upload_dir: PathBuf,

    /// HMAC secret for verification tokens; also feeds field-cipher key derivation
    #[serde(default)]
    pub token_secret: String,

    /// Verification link lifetime in minutes
    #[serde(default = "default_token_ttl_minutes")]
    pub token_ttl_minutes: i64,

    /// Minimum applicant age for account opening
    #[serde(default = "default_min_age")]
    pub min_age: u32,

    /// Similarity threshold for the declared-name cross match
    #[serde(default = "default_name_match_threshold")]
    pub name_match_threshold: f64,

    /// Deadline in seconds for one recognition collaborator call
    #[serde(default = "default_collaborator_timeout_secs")]
    pub collaborator_timeout_secs: u64,
}

fn default_database_path() -> PathBuf {
    PathBuf::from("ekyc.db")
}

fn default_bind_address() -> String {
    "127.0.0.1:5730".to_string()
}

fn default_upload_dir() -> PathBuf {
    PathBuf::from("uploads")
}

fn default_token_ttl_minutes() -> i64 {
    30
}

fn default_min_age() -> u32 {
    18
}

fn default_name_match_threshold() -> f64 {
    0.8
}

fn default_collaborator_timeout_secs() -> u64 {
    30
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            database_path: default_database_path(),
            bind_address: default_bind_address(),
            upload_dir: default_upload_dir(),
            token_secret: String::new(),
            token_ttl_minutes: default_token_ttl_minutes(),
            min_age: default_min_age(),
            name_match_threshold: default_name_match_threshold(),
            collaborator_timeout_secs: default_collaborator_timeout_secs(),
        }
    }
}

/// Parse one `EKYC_*` override; an unparseable value is rejected
fn env_parsed<T: FromStr>(key: &str) -> Result<Option<T>> {
    match std::env::var(key) {
        Ok(raw) => raw
            .parse()
            .map(Some)
            .map_err(|_| Error::Config(format!("{} has unparseable value '{}'", key, raw))),
        Err(_) => Ok(None),
    }
}

impl Settings {
    /// Load settings using the documented priority order
    pub fn load() -> Result<Self> {
        let config_path = std::env::var("EKYC_CONFIG")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("ekyc.toml"));

        let mut settings = if config_path.exists() {
            Self::from_file(&config_path)?
        } else {
            Self::default()
        };

        settings.apply_env_overrides()?;
        Ok(settings)
    }

    /// Parse settings from a TOML file
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        toml::from_str(&content)
            .map_err(|e| Error::Config(format!("Failed to parse {}: {}", path.display(), e)))
    }

    /// Environment variables override file values
    fn apply_env_overrides(&mut self) -> Result<()> {
        if let Ok(v) = std::env::var("EKYC_DATABASE_PATH") {
            self.database_path = PathBuf::from(v);
        }
        if let Ok(v) = std::env::var("EKYC_BIND_ADDRESS") {
            self.bind_address = v;
        }
        if let Ok(v) = std::env::var("EKYC_UPLOAD_DIR") {
            self.upload_dir = PathBuf::from(v);
        }
        if let Ok(v) = std::env::var("EKYC_TOKEN_SECRET") {
            self.token_secret = v;
        }
        if let Some(v) = env_parsed("EKYC_TOKEN_TTL_MINUTES")? {
            self.token_ttl_minutes = v;
        }
        if let Some(v) = env_parsed("EKYC_MIN_AGE")? {
            self.min_age = v;
        }
        if let Some(v) = env_parsed("EKYC_NAME_MATCH_THRESHOLD")? {
            self.name_match_threshold = v;
        }
        if let Some(v) = env_parsed("EKYC_COLLABORATOR_TIMEOUT_SECS")? {
            self.collaborator_timeout_secs = v;
        }
        Ok(())
    }

    /// Reject configurations the service cannot run with
    ///
    /// A missing secret is an infrastructure fault at startup, not a
    /// per-request error.
    pub fn validate(&self) -> Result<()> {
        if self.token_secret.is_empty() {
            return Err(Error::Config(
                "token_secret must be set (EKYC_TOKEN_SECRET or config file)".to_string(),
            ));
        }
        if self.token_ttl_minutes <= 0 {
            return Err(Error::Config(
                "token_ttl_minutes must be positive".to_string(),
            ));
        }
        if self.collaborator_timeout_secs == 0 {
            return Err(Error::Config(
                "collaborator_timeout_secs must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    fn test_defaults() {
        let settings = Settings::default();
        assert_eq!(settings.token_ttl_minutes, 30);
        assert_eq!(settings.min_age, 18);
        assert!((settings.name_match_threshold - 0.8).abs() < f64::EPSILON);
        assert_eq!(settings.collaborator_timeout_secs, 30);
    }

    #[test]
    fn test_validate_rejects_empty_secret() {
        let settings = Settings::default();
        assert!(settings.validate().is_err());
    }

    #[test]
    fn test_validate_accepts_complete_settings() {
        let settings = Settings {
            token_secret: "test-secret".to_string(),
            ..Settings::default()
        };
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_zero_collaborator_timeout() {
        let settings = Settings {
            token_secret: "test-secret".to_string(),
            collaborator_timeout_secs: 0,
            ..Settings::default()
        };
        assert!(settings.validate().is_err());
    }

    #[test]
    fn test_from_file_parses_partial_config() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ekyc.toml");
        std::fs::write(&path, "token_secret = \"abc\"\ntoken_ttl_minutes = 15\n").unwrap();

        let settings = Settings::from_file(&path).unwrap();
        assert_eq!(settings.token_secret, "abc");
        assert_eq!(settings.token_ttl_minutes, 15);
        // Unspecified fields fall back to defaults
        assert_eq!(settings.min_age, 18);
    }

    #[test]
    #[serial]
    fn test_every_numeric_setting_has_an_env_override() {
        std::env::set_var("EKYC_TOKEN_TTL_MINUTES", "45");
        std::env::set_var("EKYC_MIN_AGE", "21");
        std::env::set_var("EKYC_NAME_MATCH_THRESHOLD", "0.9");
        std::env::set_var("EKYC_COLLABORATOR_TIMEOUT_SECS", "5");

        let mut settings = Settings::default();
        settings.apply_env_overrides().unwrap();

        std::env::remove_var("EKYC_TOKEN_TTL_MINUTES");
        std::env::remove_var("EKYC_MIN_AGE");
        std::env::remove_var("EKYC_NAME_MATCH_THRESHOLD");
        std::env::remove_var("EKYC_COLLABORATOR_TIMEOUT_SECS");

        assert_eq!(settings.token_ttl_minutes, 45);
        assert_eq!(settings.min_age, 21);
        assert!((settings.name_match_threshold - 0.9).abs() < f64::EPSILON);
        assert_eq!(settings.collaborator_timeout_secs, 5);
    }

    #[test]
    #[serial]
    fn test_unparseable_env_override_is_rejected() {
        std::env::set_var("EKYC_MIN_AGE", "eighteen");

        let mut settings = Settings::default();
        let result = settings.apply_env_overrides();

        std::env::remove_var("EKYC_MIN_AGE");

        match result {
            Err(Error::Config(msg)) => assert!(msg.contains("EKYC_MIN_AGE")),
            other => panic!("expected Config error, got {:?}", other),
        }
    }
}
