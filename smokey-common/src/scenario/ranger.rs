//! Can a NameNode restart while the Ranger admin is down?
//!
//! The NameNode's Ranger plugin polls the admin on startup, so a restart with
//! Ranger down takes far longer than usual. The scenario stops a Ranger admin,
//! bounces the standby NameNode with an extended convergence timeout, brings
//! Ranger back, and passes only if every Ranger admin is started at the end.

use crate::cluster::{ClusterError, ClusterManager};
use crate::disruption::{Disruptor, ManagedDisruption};
use crate::report::{ReportBuilder, RunOutcome, RunReport};
use crate::resolver::{AmbariResolver, InstanceSelector, SelectionError};
use crate::types::{ComponentRef, InstanceLocation};
use crate::verification::Verifier;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{Instrument, debug, error, info, info_span, warn};

/// Convergence bound for the NameNode start while Ranger is down.
pub const NAMENODE_START_TIMEOUT: Duration = Duration::from_secs(1800);

#[derive(Debug, Error)]
pub enum ScenarioError {
    #[error("cluster manager: {0}")]
    Cluster(#[from] ClusterError),

    #[error("instance selection failed: {0}")]
    Selection(#[from] SelectionError),
}

fn ranger_admin() -> ComponentRef {
    ComponentRef::new("RANGER", "RANGER_ADMIN")
}

fn namenode() -> ComponentRef {
    ComponentRef::new("HDFS", "NAMENODE")
}

pub struct RangerScenario {
    cluster: Arc<dyn ClusterManager>,
    namenode_timeout: Duration,
    ui_check: Option<Arc<dyn Verifier>>,
}

impl RangerScenario {
    pub fn new(cluster: Arc<dyn ClusterManager>) -> Self {
        Self {
            cluster,
            namenode_timeout: NAMENODE_START_TIMEOUT,
            ui_check: None,
        }
    }

    /// Also require the Ranger admin UI to answer once Ranger is back.
    pub fn with_ui_check(mut self, verifier: Arc<dyn Verifier>) -> Self {
        self.ui_check = Some(verifier);
        self
    }

    pub async fn run(self) -> Result<RunReport, ScenarioError> {
        let span = info_span!("smoketest", component = %ranger_admin());
        self.execute().instrument(span).await
    }

    async fn all_started(&self, component: &ComponentRef) -> Result<bool, ClusterError> {
        let state = self.cluster.component_state(component).await?;
        debug!(%component, started = state.started_count, total = state.total_count, "Aggregate state");
        Ok(state.all_started())
    }

    async fn standby_namenode(&self) -> Result<InstanceLocation, String> {
        let host = self
            .cluster
            .host_with_role(&namenode(), "standby")
            .await
            .map_err(|e| e.to_string())?
            .ok_or_else(|| "no standby NameNode".to_string())?;
        self.cluster
            .list_instances(&namenode())
            .await
            .map_err(|e| e.to_string())?
            .into_iter()
            .find(|i| i.host == host)
            .ok_or_else(|| format!("standby NameNode {} is not a known instance", host))
    }

    /// Stop then start the standby NameNode. Returns a failure description.
    async fn bounce_namenode(&self, managed: &ManagedDisruption) -> Option<String> {
        let instance = match self.standby_namenode().await {
            Ok(instance) => instance,
            Err(e) => return Some(e),
        };
        info!(%instance, "Stopping standby NameNode");
        if let Err(e) = managed.disrupt(&instance).await {
            return Some(format!("stopping NameNode {}: {}", instance, e));
        }
        info!(
            %instance,
            timeout = ?self.namenode_timeout,
            "Starting NameNode without Ranger; the Ranger plugin polls the admin for a long time first"
        );
        let slow = ManagedDisruption::new(self.cluster.clone()).with_timeout(self.namenode_timeout);
        if let Err(e) = slow.restore(&instance).await {
            return Some(format!("starting NameNode {}: {}", instance, e));
        }
        info!(%instance, "Started NameNode");
        None
    }

    async fn execute(self) -> Result<RunReport, ScenarioError> {
        let mut report = ReportBuilder::start(ranger_admin().to_string());
        info!("Starting Ranger smoke test: the NameNode must stop and start while Ranger admin is down");

        if !(self.all_started(&ranger_admin()).await? && self.all_started(&namenode()).await?) {
            error!("Not all Ranger admins and NameNodes in normal state. Aborting smoke test");
            return Ok(finish(
                report,
                RunOutcome::AbortedNotReady,
                Some("Ranger admin or NameNode not fully started".to_string()),
            ));
        }

        let selector = InstanceSelector::new(Arc::new(AmbariResolver::new(self.cluster.clone())));
        let ranger = selector.select(&ranger_admin()).await?;
        report.instance(ranger.to_string());

        let managed = ManagedDisruption::new(self.cluster.clone());
        info!(instance = %ranger, "Stopping Ranger admin");
        if let Err(e) = managed.disrupt(&ranger).await {
            return Ok(finish(
                report,
                RunOutcome::DisruptionFailed,
                Some(format!("stopping Ranger admin {}: {}", ranger, e)),
            ));
        }

        let namenode_failure = self.bounce_namenode(&managed).await;
        if let Some(failure) = &namenode_failure {
            error!(%failure, "NameNode restart failed; restoring Ranger anyway");
        }

        info!(instance = %ranger, "Starting the previously stopped Ranger admin");
        if let Err(e) = managed.restore(&ranger).await {
            return Ok(finish(
                report,
                RunOutcome::DisruptionFailed,
                Some(format!("restoring Ranger admin {}: {}", ranger, e)),
            ));
        }
        if let Some(failure) = namenode_failure {
            return Ok(finish(report, RunOutcome::DisruptionFailed, Some(failure)));
        }

        match self.all_started(&namenode()).await {
            Ok(started) => info!(started, "All NameNodes in normal state?"),
            Err(e) => warn!(error = %e, "Could not check NameNode state"),
        }
        if !self.all_started(&ranger_admin()).await? {
            return Ok(finish(
                report,
                RunOutcome::VerificationFailed,
                Some("Ranger admins not all started after restore".to_string()),
            ));
        }
        if let Some(check) = &self.ui_check
            && let Err(e) = check.verify().await
        {
            return Ok(finish(
                report,
                RunOutcome::VerificationFailed,
                Some(format!("{}: {}", check.name(), e)),
            ));
        }
        Ok(finish(report, RunOutcome::Success, None))
    }
}

fn finish(report: ReportBuilder, outcome: RunOutcome, failure: Option<String>) -> RunReport {
    let report = report.finish(outcome, failure);
    report.log();
    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::{MockClusterManager, ScriptedVerifier};
    use crate::types::{ComponentState, HostState};

    fn cluster() -> MockClusterManager {
        MockClusterManager::new()
            .with_instances(&ranger_admin(), &["r1"])
            .with_instances(&namenode(), &["nn1", "nn2"])
            .with_ha_state(&namenode(), "nn1", "active")
            .with_ha_state(&namenode(), "nn2", "standby")
    }

    #[tokio::test]
    async fn test_full_sequence() {
        let cluster = Arc::new(cluster());
        let report = RangerScenario::new(cluster.clone()).run().await.unwrap();

        assert_eq!(report.outcome, RunOutcome::Success);
        let changes: Vec<(String, HostState, Option<Duration>)> = cluster
            .state_changes()
            .into_iter()
            .map(|c| (c.instance.host, c.state, c.timeout))
            .collect();
        assert_eq!(
            changes,
            vec![
                ("r1".to_string(), HostState::Installed, None),
                ("nn2".to_string(), HostState::Installed, None),
                ("nn2".to_string(), HostState::Started, Some(NAMENODE_START_TIMEOUT)),
                ("r1".to_string(), HostState::Started, None),
            ]
        );
    }

    #[tokio::test]
    async fn test_not_ready_touches_nothing() {
        let cluster = Arc::new(cluster().with_component_state(
            &ranger_admin(),
            ComponentState {
                total_count: 1,
                started_count: 0,
                state: "INSTALLED".to_string(),
            },
        ));
        let report = RangerScenario::new(cluster.clone()).run().await.unwrap();
        assert_eq!(report.outcome, RunOutcome::AbortedNotReady);
        assert!(cluster.state_changes().is_empty());
    }

    #[tokio::test]
    async fn test_ranger_restored_when_namenode_start_fails() {
        // every start fails, so Ranger's restore fails too; it must still be attempted
        let cluster = Arc::new(cluster().failing_state_change(HostState::Started));
        let report = RangerScenario::new(cluster.clone()).run().await.unwrap();

        assert_eq!(report.outcome, RunOutcome::DisruptionFailed);
        let changes = cluster.state_changes();
        assert_eq!(changes.len(), 4);
        assert_eq!(changes[3].instance.host, "r1");
        assert_eq!(changes[3].state, HostState::Started);
    }

    #[tokio::test]
    async fn test_missing_standby_still_restores_ranger() {
        let cluster = Arc::new(
            MockClusterManager::new()
                .with_instances(&ranger_admin(), &["r1"])
                .with_instances(&namenode(), &["nn1"])
                .with_ha_state(&namenode(), "nn1", "active"),
        );
        let report = RangerScenario::new(cluster.clone()).run().await.unwrap();

        assert_eq!(report.outcome, RunOutcome::DisruptionFailed);
        assert_eq!(report.failure.as_deref(), Some("no standby NameNode"));
        let states: Vec<HostState> = cluster.state_changes().into_iter().map(|c| c.state).collect();
        assert_eq!(states, vec![HostState::Installed, HostState::Started]);
    }

    #[tokio::test]
    async fn test_ui_check_failure() {
        let cluster = Arc::new(cluster());
        let report = RangerScenario::new(cluster)
            .with_ui_check(Arc::new(ScriptedVerifier::failing_on("ranger-ui", 1)))
            .run()
            .await
            .unwrap();
        assert_eq!(report.outcome, RunOutcome::VerificationFailed);
    }
}
