//! Disruption strategies: how an instance is taken out of service and brought back.

use crate::cluster::{ClusterError, ClusterManager, StateChange};
use crate::process::{ProcessControl, ProcessError, ProcessMatcher};
use crate::ssh::{CommandError, RemoteExecutor};
use crate::types::{HostState, InstanceLocation};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{info, warn};

/// The mechanism to take down or restore an instance failed.
#[derive(Debug, Error)]
pub enum DisruptionError {
    #[error("cluster manager: {0}")]
    Cluster(#[from] ClusterError),

    #[error("process: {0}")]
    Process(#[from] ProcessError),

    #[error("service command: {0}")]
    Command(#[from] CommandError),
}

/// Takes one instance out of service and restores it later.
#[async_trait]
pub trait Disruptor: Send + Sync {
    /// Short description for logs.
    fn describe(&self) -> String;

    async fn disrupt(&self, instance: &InstanceLocation) -> Result<(), DisruptionError>;

    async fn restore(&self, instance: &InstanceLocation) -> Result<(), DisruptionError>;
}

// ============================================================================
// Managed (cluster manager state change)
// ============================================================================

/// Stops and starts an instance through the cluster manager, blocking until
/// the manager reports convergence.
pub struct ManagedDisruption {
    cluster: Arc<dyn ClusterManager>,
    timeout: Option<Duration>,
}

impl ManagedDisruption {
    pub fn new(cluster: Arc<dyn ClusterManager>) -> Self {
        Self {
            cluster,
            timeout: None,
        }
    }

    /// Override the client's default convergence timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    async fn change(&self, instance: &InstanceLocation, state: HostState) -> Result<(), DisruptionError> {
        match self
            .cluster
            .change_state_and_wait(instance, state, self.timeout)
            .await?
        {
            StateChange::Converged => info!(%instance, %state, "State change converged"),
            StateChange::AlreadyInState => {
                warn!(%instance, %state, "No request tracked; instance reported already in target state")
            }
        }
        Ok(())
    }
}

#[async_trait]
impl Disruptor for ManagedDisruption {
    fn describe(&self) -> String {
        "managed".to_string()
    }

    async fn disrupt(&self, instance: &InstanceLocation) -> Result<(), DisruptionError> {
        self.change(instance, HostState::Installed).await
    }

    async fn restore(&self, instance: &InstanceLocation) -> Result<(), DisruptionError> {
        self.change(instance, HostState::Started).await
    }
}

// ============================================================================
// Service manager (`sudo service <name> stop|start`)
// ============================================================================

/// Stops and starts an OS service over remote execution.
pub struct ServiceDisruption {
    executor: Arc<dyn RemoteExecutor>,
    service: String,
}

impl ServiceDisruption {
    pub fn new(executor: Arc<dyn RemoteExecutor>, service: impl Into<String>) -> Self {
        Self {
            executor,
            service: service.into(),
        }
    }

    async fn action(&self, host: &str, action: &str) -> Result<(), DisruptionError> {
        let command = service_command(&self.service, action);
        self.executor.run(host, &command).await?.check(host, &command)?;
        info!(%host, service = %self.service, action, "Service action done");
        Ok(())
    }
}

/// `sudo service <name> <action>`
pub fn service_command(service: &str, action: &str) -> String {
    format!("sudo service {} {}", service, action)
}

#[async_trait]
impl Disruptor for ServiceDisruption {
    fn describe(&self) -> String {
        format!("service {}", self.service)
    }

    async fn disrupt(&self, instance: &InstanceLocation) -> Result<(), DisruptionError> {
        self.action(&instance.host, "stop").await
    }

    async fn restore(&self, instance: &InstanceLocation) -> Result<(), DisruptionError> {
        self.action(&instance.host, "start").await
    }
}

// ============================================================================
// Forceful (kill the process)
// ============================================================================

/// Kills the instance's process, then restores through another strategy once
/// the grace period has let the manager notice the process is gone. A start
/// issued before that is silently ignored by the manager.
pub struct ForcefulDisruption {
    process: ProcessControl,
    user: String,
    matcher: ProcessMatcher,
    grace: Duration,
    restart: Arc<dyn Disruptor>,
}

impl ForcefulDisruption {
    pub fn new(
        executor: Arc<dyn RemoteExecutor>,
        user: impl Into<String>,
        matcher: ProcessMatcher,
        grace: Duration,
        restart: Arc<dyn Disruptor>,
    ) -> Self {
        Self {
            process: ProcessControl::new(executor),
            user: user.into(),
            matcher,
            grace,
            restart,
        }
    }
}

#[async_trait]
impl Disruptor for ForcefulDisruption {
    fn describe(&self) -> String {
        format!("kill {} process '{}'", self.user, self.matcher)
    }

    async fn disrupt(&self, instance: &InstanceLocation) -> Result<(), DisruptionError> {
        let pid = self
            .process
            .find_pid(&instance.host, &self.user, &self.matcher)
            .await?;
        self.process.terminate(&instance.host, &self.user, pid).await?;
        Ok(())
    }

    async fn restore(&self, instance: &InstanceLocation) -> Result<(), DisruptionError> {
        info!(grace = ?self.grace, "Waiting for the manager to notice the process is gone");
        tokio::time::sleep(self.grace).await;
        self.restart.restore(instance).await
    }
}

// ============================================================================
// None
// ============================================================================

/// Leaves the instance alone; the run only validates current health.
pub struct NoDisruption;

#[async_trait]
impl Disruptor for NoDisruption {
    fn describe(&self) -> String {
        "none".to_string()
    }

    async fn disrupt(&self, instance: &InstanceLocation) -> Result<(), DisruptionError> {
        info!(%instance, "Disruption disabled, leaving instance running");
        Ok(())
    }

    async fn restore(&self, _instance: &InstanceLocation) -> Result<(), DisruptionError> {
        Ok(())
    }
}
