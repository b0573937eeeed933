//! Environment variable parsing with type safety.
//!
//! Provides a type-safe parser for Smokey environment variables with
//! validation, error collection, and source tracking.

use super::source::Sourced;
use std::env;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Errors that can occur during environment variable parsing.
#[derive(Debug, Error)]
pub enum EnvError {
    /// Invalid value for a variable.
    #[error("Invalid value for {var}: expected {expected}, got '{value}'")]
    InvalidValue {
        var: String,
        expected: String,
        value: String,
    },

    /// Value out of valid range.
    #[error("Value out of range for {var}: {value} (valid: {min}..={max})")]
    OutOfRange {
        var: String,
        value: String,
        min: String,
        max: String,
    },

    /// Invalid log level.
    #[error("Invalid log level for {var}: {value}")]
    InvalidLogLevel { var: String, value: String },
}

/// Type-safe environment variable parser.
///
/// Collects errors during parsing so all issues can be reported at once.
/// Variables are looked up as `<prefix><name>`; the cluster tooling this talks
/// to predates any common prefix, so each config section picks its own
/// (`AMBARI_`, `HDFS_`, ...).
pub struct EnvParser {
    prefix: &'static str,
    errors: Vec<EnvError>,
}

impl EnvParser {
    /// Create a parser for variables starting with `prefix`.
    pub fn with_prefix(prefix: &'static str) -> Self {
        Self {
            prefix,
            errors: Vec::new(),
        }
    }

    /// Switch to another prefix, keeping accumulated errors.
    pub fn set_prefix(&mut self, prefix: &'static str) {
        self.prefix = prefix;
    }

    /// Get all accumulated errors.
    pub fn errors(&self) -> &[EnvError] {
        &self.errors
    }

    /// Check if any errors occurred.
    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }

    /// Take ownership of errors.
    pub fn take_errors(&mut self) -> Vec<EnvError> {
        std::mem::take(&mut self.errors)
    }

    fn var_name(&self, name: &str) -> String {
        format!("{}{}", self.prefix, name)
    }

    /// Get a string value with default.
    pub fn get_string(&mut self, name: &str, default: &str) -> Sourced<String> {
        let var_name = self.var_name(name);
        match env::var(&var_name) {
            Ok(value) => Sourced::from_env(value, var_name),
            Err(_) => Sourced::default_value(default.to_string()),
        }
    }

    /// Get an optional string (None if not set or empty).
    pub fn get_optional_string(&mut self, name: &str) -> Sourced<Option<String>> {
        let var_name = self.var_name(name);
        match env::var(&var_name) {
            Ok(value) if value.is_empty() => Sourced::from_env(None, var_name),
            Ok(value) => Sourced::from_env(Some(value), var_name),
            Err(_) => Sourced::default_value(None),
        }
    }

    /// Get a u64 value with default and range validation.
    pub fn get_u64_range(&mut self, name: &str, default: u64, min: u64, max: u64) -> Sourced<u64> {
        let var_name = self.var_name(name);
        match env::var(&var_name) {
            Ok(value) => match value.trim().parse::<u64>() {
                Ok(n) if n >= min && n <= max => Sourced::from_env(n, var_name),
                Ok(n) => {
                    self.errors.push(EnvError::OutOfRange {
                        var: var_name.clone(),
                        value: n.to_string(),
                        min: min.to_string(),
                        max: max.to_string(),
                    });
                    Sourced::from_env(default, var_name)
                }
                Err(_) => {
                    self.errors.push(EnvError::InvalidValue {
                        var: var_name.clone(),
                        expected: "unsigned integer".to_string(),
                        value,
                    });
                    Sourced::default_value(default)
                }
            },
            Err(_) => Sourced::default_value(default),
        }
    }

    /// Get a TCP port.
    pub fn get_port(&mut self, name: &str, default: u16) -> Sourced<u16> {
        let sourced = self.get_u64_range(name, u64::from(default), 1, u64::from(u16::MAX));
        Sourced {
            value: u16::try_from(sourced.value).unwrap_or(default),
            source: sourced.source,
            env_var: sourced.env_var,
        }
    }

    /// Get a duration expressed in whole seconds.
    pub fn get_secs(&mut self, name: &str, default: u64, max: u64) -> Sourced<Duration> {
        let sourced = self.get_u64_range(name, default, 0, max);
        Sourced {
            value: Duration::from_secs(sourced.value),
            source: sourced.source,
            env_var: sourced.env_var,
        }
    }

    /// Get a path value with ~ expansion.
    pub fn get_optional_path(&mut self, name: &str) -> Sourced<Option<PathBuf>> {
        let var_name = self.var_name(name);
        match env::var(&var_name) {
            Ok(value) if value.is_empty() => Sourced::from_env(None, var_name),
            Ok(value) => Sourced::from_env(Some(expand_home(&value)), var_name),
            Err(_) => Sourced::default_value(None),
        }
    }

    /// Get a log level value with validation.
    pub fn get_log_level(&mut self, name: &str, default: &str) -> Sourced<String> {
        let var_name = self.var_name(name);
        match env::var(&var_name) {
            Ok(value) => {
                let lower = value.to_lowercase();
                match lower.as_str() {
                    "trace" | "debug" | "info" | "warn" | "error" | "off" => {
                        Sourced::from_env(lower, var_name)
                    }
                    _ => {
                        self.errors.push(EnvError::InvalidLogLevel {
                            var: var_name.clone(),
                            value: value.clone(),
                        });
                        Sourced::from_env(default.to_string(), var_name)
                    }
                }
            }
            Err(_) => Sourced::default_value(default.to_string()),
        }
    }
}

fn expand_home(value: &str) -> PathBuf {
    if let Some(stripped) = value.strip_prefix("~/")
        && let Some(home) = env::var_os("HOME")
    {
        return PathBuf::from(home).join(stripped);
    }
    PathBuf::from(value)
}

#[cfg(test)]
#[allow(unsafe_code)]
mod tests {
    use super::*;
    use crate::config::ConfigSource;
    use crate::config::env_test_lock;

    fn cleanup_env(vars: &[&str]) {
        for var in vars {
            // SAFETY: Tests are serialized via env_test_lock
            unsafe { env::remove_var(var) };
        }
    }

    fn set_env(key: &str, value: &str) {
        // SAFETY: Tests are serialized via env_test_lock
        unsafe { env::set_var(key, value) };
    }

    #[test]
    fn test_get_string_default_and_env() {
        let _guard = env_test_lock();
        let vars = ["SMKTEST_HOST"];
        cleanup_env(&vars);

        let mut parser = EnvParser::with_prefix("SMKTEST_");
        let result = parser.get_string("HOST", "sandbox");
        assert_eq!(result.value, "sandbox");
        assert_eq!(result.source, ConfigSource::Default);

        set_env("SMKTEST_HOST", "ambari.example.com");
        let result = parser.get_string("HOST", "sandbox");
        assert_eq!(result.value, "ambari.example.com");
        assert_eq!(result.env_var.as_deref(), Some("SMKTEST_HOST"));

        cleanup_env(&vars);
    }

    #[test]
    fn test_get_port_out_of_range_records_error() {
        let _guard = env_test_lock();
        let vars = ["SMKTEST_PORT_OOR"];
        cleanup_env(&vars);

        set_env("SMKTEST_PORT_OOR", "70000");
        let mut parser = EnvParser::with_prefix("SMKTEST_");
        let result = parser.get_port("PORT_OOR", 8080);
        assert_eq!(result.value, 8080);
        assert!(parser.has_errors());

        cleanup_env(&vars);
    }

    #[test]
    fn test_get_u64_invalid_uses_default() {
        let _guard = env_test_lock();
        let vars = ["SMKTEST_BAD_U64"];
        cleanup_env(&vars);

        set_env("SMKTEST_BAD_U64", "ten");
        let mut parser = EnvParser::with_prefix("SMKTEST_");
        let result = parser.get_u64_range("BAD_U64", 10, 0, 100);
        assert_eq!(result.value, 10);
        assert_eq!(parser.take_errors().len(), 1);
        assert!(!parser.has_errors());

        cleanup_env(&vars);
    }

    #[test]
    fn test_get_secs() {
        let _guard = env_test_lock();
        let vars = ["SMKTEST_TIMEOUT_SECS"];
        cleanup_env(&vars);

        set_env("SMKTEST_TIMEOUT_SECS", "42");
        let mut parser = EnvParser::with_prefix("SMKTEST_");
        let result = parser.get_secs("TIMEOUT_SECS", 60, 3600);
        assert_eq!(result.value, Duration::from_secs(42));

        cleanup_env(&vars);
    }

    #[test]
    fn test_get_log_level_invalid() {
        let _guard = env_test_lock();
        let vars = ["SMKTEST_LOG_LEVEL"];
        cleanup_env(&vars);

        set_env("SMKTEST_LOG_LEVEL", "verbose");
        let mut parser = EnvParser::with_prefix("SMKTEST_");
        let result = parser.get_log_level("LOG_LEVEL", "debug");
        assert!(parser.has_errors());
        assert_eq!(result.value, "debug");

        cleanup_env(&vars);
    }

    #[test]
    fn test_errors_survive_prefix_switch() {
        let _guard = env_test_lock();
        let vars = ["SMKA_PORT", "SMKB_PORT"];
        cleanup_env(&vars);

        set_env("SMKA_PORT", "x");
        set_env("SMKB_PORT", "y");
        let mut parser = EnvParser::with_prefix("SMKA_");
        parser.get_port("PORT", 1);
        parser.set_prefix("SMKB_");
        parser.get_port("PORT", 1);
        assert_eq!(parser.errors().len(), 2);

        cleanup_env(&vars);
    }

    #[test]
    fn test_get_optional_path_expands_home() {
        let _guard = env_test_lock();
        let vars = ["SMKTEST_KEY"];
        cleanup_env(&vars);

        set_env("SMKTEST_KEY", "/etc/smokey/id_rsa");
        let mut parser = EnvParser::with_prefix("SMKTEST_");
        let result = parser.get_optional_path("KEY");
        assert_eq!(result.value, Some(PathBuf::from("/etc/smokey/id_rsa")));

        cleanup_env(&vars);
    }
}
