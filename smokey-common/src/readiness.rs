//! Readiness probes: is the component fully up before anything is disrupted?

use crate::cluster::{ClusterError, ClusterManager};
use crate::disruption::service_command;
use crate::ssh::{CommandError, RemoteExecutor};
use crate::types::ComponentRef;
use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, warn};

/// The probe itself could not run.
#[derive(Debug, Error)]
pub enum ReadinessError {
    #[error("cluster manager: {0}")]
    Cluster(#[from] ClusterError),

    #[error("remote command: {0}")]
    Command(#[from] CommandError),
}

#[async_trait]
pub trait ReadinessProbe: Send + Sync {
    async fn is_ready(&self) -> Result<bool, ReadinessError>;
}

/// Every instance started according to the cluster manager.
pub struct AmbariReadiness {
    cluster: Arc<dyn ClusterManager>,
    component: ComponentRef,
}

impl AmbariReadiness {
    pub fn new(cluster: Arc<dyn ClusterManager>, component: ComponentRef) -> Self {
        Self { cluster, component }
    }
}

#[async_trait]
impl ReadinessProbe for AmbariReadiness {
    async fn is_ready(&self) -> Result<bool, ReadinessError> {
        let state = self.cluster.component_state(&self.component).await?;
        let ready = state.all_started();
        debug!(
            component = %self.component,
            state = %state.state,
            started = state.started_count,
            total = state.total_count,
            ready,
            "Aggregate state"
        );
        Ok(ready)
    }
}

/// `sudo service <name> status` succeeds on every host.
pub struct ServiceStatusReadiness {
    executor: Arc<dyn RemoteExecutor>,
    service: String,
    hosts: Vec<String>,
}

impl ServiceStatusReadiness {
    pub fn new(executor: Arc<dyn RemoteExecutor>, service: impl Into<String>, hosts: Vec<String>) -> Self {
        Self {
            executor,
            service: service.into(),
            hosts,
        }
    }
}

#[async_trait]
impl ReadinessProbe for ServiceStatusReadiness {
    async fn is_ready(&self) -> Result<bool, ReadinessError> {
        let command = service_command(&self.service, "status");
        for host in &self.hosts {
            let output = self.executor.run(host, &command).await?;
            if !output.is_success() {
                warn!(%host, service = %self.service, status = output.status, "Service not running");
                return Ok(false);
            }
        }
        info!(service = %self.service, hosts = self.hosts.len(), "Service running on all hosts");
        Ok(true)
    }
}
