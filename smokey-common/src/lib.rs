//! Smokey - Hadoop cluster smoke tests.
//!
//! A smoke test checks that a cluster service keeps working while one instance
//! of one of its components is taken down: verify, disrupt, verify repeatedly,
//! restore, verify again. This crate holds the orchestration core and the thin
//! clients it drives (Ambari, SSH, WebHDFS, application runners, HTTP probes).

pub mod catalog;
pub mod cluster;
pub mod config;
pub mod disruption;
pub mod logging;
#[cfg(any(test, feature = "test-support"))]
pub mod mock;
pub mod orchestrator;
pub mod process;
pub mod readiness;
pub mod report;
pub mod resolver;
pub mod scenario;
pub mod ssh;
pub mod target;
pub mod types;
pub mod verification;
pub mod verifiers;

pub use catalog::{CatalogError, RunOverrides, ServiceTest, SmokeTestFactory, SmokeTestKind};
pub use cluster::{AmbariClient, ClusterError, ClusterManager, StateChange};
pub use config::{ConfigError, SmokeyConfig};
pub use disruption::{Disruptor, DisruptionError};
pub use logging::{LogConfig, LoggingGuards, init_logging};
pub use orchestrator::{Orchestrator, RunPhase, SmokeTestError};
pub use report::{RunOutcome, RunReport};
pub use resolver::{InstanceSelector, RoleFilter, SelectionError};
pub use scenario::{RangerScenario, ScenarioError};
pub use target::{DisruptionKind, TestTarget};
pub use types::{ComponentRef, ComponentState, HostState, InstanceLocation};
pub use verification::{CheckError, VerificationError, Verifier, VerifierSet};
