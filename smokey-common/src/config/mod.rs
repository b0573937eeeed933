//! Configuration system for Smokey.
//!
//! All settings come from the environment, section by section, with the
//! variable names the cluster operators already export for their tooling
//! (`AMBARI_HOST`, `HDFS_NAMENODE_PORT`, ...). Parsing collects every problem
//! so a misconfigured run reports them all at once before touching the cluster.

pub mod env;
pub mod source;

pub use env::{EnvError, EnvParser};
pub use source::{ConfigSource, Sourced};

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Interval between polls of a cluster-manager request.
pub const CONVERGENCE_POLL_INTERVAL: Duration = Duration::from_secs(2);

/// Cluster-manager (Ambari) connection settings.
#[derive(Debug, Clone)]
pub struct AmbariConfig {
    /// `<schema>://<host>:<port>`
    pub base_url: String,
    pub user: String,
    pub password: String,
    pub cluster: String,
    pub request_timeout: Duration,
    /// Default bound on waiting for a state change to converge.
    pub polling_timeout: Duration,
    pub poll_interval: Duration,
}

impl Default for AmbariConfig {
    fn default() -> Self {
        Self {
            base_url: "http://sandbox:8080".to_string(),
            user: "raj_ops".to_string(),
            password: "raj_ops".to_string(),
            cluster: "Sandbox".to_string(),
            request_timeout: Duration::from_secs(10),
            polling_timeout: Duration::from_secs(60),
            poll_interval: CONVERGENCE_POLL_INTERVAL,
        }
    }
}

impl AmbariConfig {
    fn parse(parser: &mut EnvParser) -> Self {
        parser.set_prefix("AMBARI_");
        let schema = parser.get_string("SCHEMA", "http").value;
        let host = parser.get_string("HOST", "sandbox").value;
        let port = parser.get_port("PORT", 8080).value;
        Self {
            base_url: format!("{}://{}:{}", schema, host, port),
            user: parser.get_string("USER", "raj_ops").value,
            password: parser.get_string("PWD", "raj_ops").value,
            cluster: parser.get_string("CLUSTER", "Sandbox").value,
            request_timeout: parser.get_secs("REQUEST_TIMEOUT_SECS", 10, 600).value,
            polling_timeout: parser.get_secs("POLLING_TIMEOUT_SECS", 60, 7200).value,
            poll_interval: CONVERGENCE_POLL_INTERVAL,
        }
    }
}

/// Remote command execution settings.
#[derive(Debug, Clone)]
pub struct SshConfig {
    pub user: String,
    pub identity_file: Option<PathBuf>,
    pub connect_timeout: Duration,
}

impl Default for SshConfig {
    fn default() -> Self {
        Self {
            user: "smoketest".to_string(),
            identity_file: None,
            connect_timeout: Duration::from_secs(10),
        }
    }
}

impl SshConfig {
    fn parse(parser: &mut EnvParser) -> Self {
        parser.set_prefix("SMOKETEST_SSH_");
        Self {
            user: parser.get_string("USER", "smoketest").value,
            identity_file: parser.get_optional_path("KEY").value,
            connect_timeout: parser.get_secs("CONNECT_TIMEOUT_SECS", 10, 300).value,
        }
    }
}

/// WebHDFS settings for the filesystem verifiers.
#[derive(Debug, Clone)]
pub struct HdfsConfig {
    pub schema: String,
    pub port: u16,
    /// Remote directory all verifier files live under.
    pub smoketest_dir: String,
    pub file_size_mb: u64,
    /// SHA-256 (hex) of the DataNode reference file.
    pub datanode_known_checksum: Option<String>,
    pub request_timeout: Duration,
}

impl Default for HdfsConfig {
    fn default() -> Self {
        Self {
            schema: "http".to_string(),
            port: 50070,
            smoketest_dir: "/user/smoketest/hdfs_smoketest".to_string(),
            file_size_mb: 64,
            datanode_known_checksum: None,
            request_timeout: Duration::from_secs(10),
        }
    }
}

impl HdfsConfig {
    fn parse(parser: &mut EnvParser) -> Self {
        parser.set_prefix("HDFS_");
        Self {
            schema: parser.get_string("NAMENODE_SCHEMA", "http").value,
            port: parser.get_port("NAMENODE_PORT", 50070).value,
            smoketest_dir: parser
                .get_string("SMOKETEST_DIR", "/user/smoketest/hdfs_smoketest")
                .value,
            file_size_mb: parser.get_u64_range("SMOKETEST_FILE_SIZE_MB", 64, 0, 4096).value,
            datanode_known_checksum: parser.get_optional_string("DATANODE_KNOWN_CHECKSUM").value,
            request_timeout: parser.get_secs("REQUEST_TIMEOUT_SECS", 10, 600).value,
        }
    }

    /// Absolute remote path of a verifier file.
    pub fn file_path(&self, name: &str) -> String {
        format!("{}/{}", self.smoketest_dir.trim_end_matches('/'), name)
    }
}

/// Hive (beeline) settings.
#[derive(Debug, Clone)]
pub struct HiveConfig {
    pub zookeeper_quorum: String,
    pub database: String,
    pub query: String,
}

impl Default for HiveConfig {
    fn default() -> Self {
        Self {
            zookeeper_quorum: "sandbox:2181".to_string(),
            database: "foodmart".to_string(),
            query: "select * from customer limit 10;".to_string(),
        }
    }
}

impl HiveConfig {
    fn parse(parser: &mut EnvParser) -> Self {
        parser.set_prefix("HIVE_");
        let defaults = Self::default();
        Self {
            zookeeper_quorum: parser.get_string("ZOOKEEPER_QUORUM", &defaults.zookeeper_quorum).value,
            database: parser.get_string("DATABASE", &defaults.database).value,
            query: parser.get_string("QUERY", &defaults.query).value,
        }
    }
}

/// Ranger admin endpoint.
#[derive(Debug, Clone)]
pub struct RangerConfig {
    pub base_url: String,
    pub request_timeout: Duration,
}

impl Default for RangerConfig {
    fn default() -> Self {
        Self {
            base_url: "http://sandbox.hortonworks.com:6080/".to_string(),
            request_timeout: Duration::from_secs(10),
        }
    }
}

impl RangerConfig {
    fn parse(parser: &mut EnvParser) -> Self {
        parser.set_prefix("RANGER_");
        let schema = parser.get_string("SCHEMA", "http").value;
        let host = parser.get_string("HOST", "sandbox.hortonworks.com").value;
        let port = parser.get_port("PORT", 6080).value;
        Self {
            base_url: format!("{}://{}:{}/", schema, host, port),
            request_timeout: Duration::from_secs(10),
        }
    }
}

/// Logging settings from the environment; CLI flags override them.
#[derive(Debug, Clone)]
pub struct LogSettings {
    /// Level written to the per-test log file.
    pub file_level: String,
    pub log_dir: Option<PathBuf>,
}

impl LogSettings {
    fn parse(parser: &mut EnvParser) -> Self {
        parser.set_prefix("SMOKETEST_");
        Self {
            file_level: parser.get_log_level("LOG_LEVEL", "debug").value,
            log_dir: parser.get_optional_path("LOG_DIR").value,
        }
    }
}

/// Complete runtime configuration.
#[derive(Debug, Clone)]
pub struct SmokeyConfig {
    pub ambari: AmbariConfig,
    pub ssh: SshConfig,
    pub hdfs: HdfsConfig,
    pub hive: HiveConfig,
    pub ranger: RangerConfig,
    pub log: LogSettings,
}

/// One or more environment variables were invalid.
#[derive(Debug, Error)]
#[error("invalid configuration: {}", .errors.iter().map(|e| e.to_string()).collect::<Vec<_>>().join("; "))]
pub struct ConfigError {
    pub errors: Vec<EnvError>,
}

impl SmokeyConfig {
    /// Load every section from the environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut parser = EnvParser::with_prefix("");
        let config = Self {
            ambari: AmbariConfig::parse(&mut parser),
            ssh: SshConfig::parse(&mut parser),
            hdfs: HdfsConfig::parse(&mut parser),
            hive: HiveConfig::parse(&mut parser),
            ranger: RangerConfig::parse(&mut parser),
            log: LogSettings::parse(&mut parser),
        };
        if parser.has_errors() {
            return Err(ConfigError {
                errors: parser.take_errors(),
            });
        }
        Ok(config)
    }
}

#[cfg(test)]
pub(crate) fn env_test_lock() -> std::sync::MutexGuard<'static, ()> {
    use std::sync::{Mutex, OnceLock};

    static ENV_LOCK: OnceLock<Mutex<()>> = OnceLock::new();
    ENV_LOCK
        .get_or_init(|| Mutex::new(()))
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner())
}
