//! In-process stand-ins for the cluster manager, remote hosts and verifiers.
//!
//! These never open sockets. They record what was asked of them so tests can
//! assert on the exact sequence of state changes and remote commands.

use crate::cluster::{ClusterError, ClusterManager, HaStates, StateChange};
use crate::ssh::{CommandError, CommandOutput, RemoteExecutor};
use crate::types::{ComponentRef, ComponentState, HostState, InstanceLocation};
use crate::verification::{CheckError, Verifier};
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

// ============================================================================
// Cluster manager
// ============================================================================

/// One state change the mock was asked to perform.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedStateChange {
    pub instance: InstanceLocation,
    pub state: HostState,
    pub timeout: Option<Duration>,
}

#[derive(Debug, Clone)]
struct MockComponent {
    instances: Vec<InstanceLocation>,
    state: ComponentState,
    ha: HaStates,
}

impl MockComponent {
    fn empty() -> Self {
        Self {
            instances: Vec::new(),
            state: ComponentState {
                total_count: 0,
                started_count: 0,
                state: "INSTALLED".to_string(),
            },
            ha: HaStates::new(),
        }
    }
}

/// Cluster manager backed by an in-memory topology.
///
/// Stopping an instance decrements the component's started count and
/// starting it increments the count again, so readiness follows the
/// disruption the way a real manager reports it.
#[derive(Debug, Default)]
pub struct MockClusterManager {
    components: Mutex<HashMap<ComponentRef, MockComponent>>,
    failing: HashSet<HostState>,
    unreachable: bool,
    changes: Mutex<Vec<RecordedStateChange>>,
}

impl MockClusterManager {
    pub fn new() -> Self {
        Self::default()
    }

    fn update(self, component: &ComponentRef, f: impl FnOnce(&mut MockComponent)) -> Self {
        {
            let mut components = lock(&self.components);
            f(components
                .entry(component.clone())
                .or_insert_with(MockComponent::empty));
        }
        self
    }

    /// Register running instances of `component` on `hosts`.
    pub fn with_instances(self, component: &ComponentRef, hosts: &[&str]) -> Self {
        let instances: Vec<InstanceLocation> = hosts
            .iter()
            .map(|host| InstanceLocation::new(*host, mock_path(component, host)))
            .collect();
        self.update(component, |c| {
            let count = u32::try_from(instances.len()).unwrap_or(u32::MAX);
            c.instances = instances;
            c.state = ComponentState {
                total_count: count,
                started_count: count,
                state: "STARTED".to_string(),
            };
        })
    }

    /// Override the aggregate state reported for `component`.
    pub fn with_component_state(self, component: &ComponentRef, state: ComponentState) -> Self {
        self.update(component, |c| c.state = state)
    }

    pub fn with_ha_state(self, component: &ComponentRef, host: &str, role: &str) -> Self {
        self.update(component, |c| {
            c.ha.insert(host.to_string(), role.to_string());
        })
    }

    /// Every request for `state` ends in a failed manager request.
    pub fn failing_state_change(mut self, state: HostState) -> Self {
        self.failing.insert(state);
        self
    }

    /// Every call fails as if the manager could not be reached.
    pub fn unreachable(mut self) -> Self {
        self.unreachable = true;
        self
    }

    /// The registered instance of `component` on `host`.
    pub fn instance(&self, component: &ComponentRef, host: &str) -> InstanceLocation {
        lock(&self.components)
            .get(component)
            .and_then(|c| c.instances.iter().find(|i| i.host == host).cloned())
            .unwrap_or_else(|| InstanceLocation::new(host, mock_path(component, host)))
    }

    /// State changes requested so far, in order.
    pub fn state_changes(&self) -> Vec<RecordedStateChange> {
        lock(&self.changes).clone()
    }

    fn check_reachable(&self, what: &str) -> Result<(), ClusterError> {
        if self.unreachable {
            return Err(ClusterError::Transport {
                url: format!("mock://{}", what),
                message: "connection refused".to_string(),
            });
        }
        Ok(())
    }

    fn component(&self, component: &ComponentRef) -> Result<MockComponent, ClusterError> {
        self.check_reachable(&component.to_string())?;
        lock(&self.components)
            .get(component)
            .cloned()
            .ok_or_else(|| ClusterError::Status {
                method: "GET".to_string(),
                url: format!("mock://{}", component),
                status: 404,
                body: "component not found".to_string(),
            })
    }
}

fn mock_path(component: &ComponentRef, host: &str) -> String {
    format!("mock://{}/{}", component, host)
}

#[async_trait]
impl ClusterManager for MockClusterManager {
    async fn component_state(&self, component: &ComponentRef) -> Result<ComponentState, ClusterError> {
        Ok(self.component(component)?.state)
    }

    async fn list_instances(
        &self,
        component: &ComponentRef,
    ) -> Result<Vec<InstanceLocation>, ClusterError> {
        Ok(self.component(component)?.instances)
    }

    async fn ha_states(&self, component: &ComponentRef) -> Result<HaStates, ClusterError> {
        Ok(self.component(component)?.ha)
    }

    async fn change_state_and_wait(
        &self,
        instance: &InstanceLocation,
        state: HostState,
        timeout: Option<Duration>,
    ) -> Result<StateChange, ClusterError> {
        self.check_reachable(&instance.path)?;
        lock(&self.changes).push(RecordedStateChange {
            instance: instance.clone(),
            state,
            timeout,
        });
        if self.failing.contains(&state) {
            return Err(ClusterError::RequestFailed {
                href: instance.path.clone(),
                status: "FAILED".to_string(),
            });
        }

        let mut components = lock(&self.components);
        if let Some(component) = components
            .values_mut()
            .find(|c| c.instances.iter().any(|i| i.path == instance.path))
        {
            let counts = &mut component.state;
            match state {
                HostState::Installed => {
                    counts.started_count = counts.started_count.saturating_sub(1);
                    counts.state = "INSTALLED".to_string();
                }
                HostState::Started => {
                    counts.started_count = (counts.started_count + 1).min(counts.total_count);
                    if counts.started_count == counts.total_count {
                        counts.state = "STARTED".to_string();
                    }
                }
            }
        }
        Ok(StateChange::Converged)
    }
}

// ============================================================================
// Remote executor
// ============================================================================

/// Remote executor answering from a script. Unscripted commands succeed with
/// empty output.
#[derive(Debug, Default)]
pub struct ScriptedRemoteExecutor {
    any_host: HashMap<String, CommandOutput>,
    per_host: HashMap<(String, String), CommandOutput>,
    unreachable: HashSet<String>,
    commands: Mutex<Vec<(String, String)>>,
}

impl ScriptedRemoteExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Answer `command` on any host with `output`.
    pub fn respond(mut self, command: &str, output: CommandOutput) -> Self {
        self.any_host.insert(command.to_string(), output);
        self
    }

    /// Answer `command` on `host` with `output`. Takes precedence over [`Self::respond`].
    pub fn respond_on(mut self, host: &str, command: &str, output: CommandOutput) -> Self {
        self.per_host
            .insert((host.to_string(), command.to_string()), output);
        self
    }

    /// Connections to `host` fail.
    pub fn unreachable(mut self, host: &str) -> Self {
        self.unreachable.insert(host.to_string());
        self
    }

    /// `(host, command)` pairs run so far, in order.
    pub fn commands(&self) -> Vec<(String, String)> {
        lock(&self.commands).clone()
    }
}

#[async_trait]
impl RemoteExecutor for ScriptedRemoteExecutor {
    async fn run(&self, host: &str, command: &str) -> Result<CommandOutput, CommandError> {
        if self.unreachable.contains(host) {
            return Err(CommandError::Connect {
                host: host.to_string(),
                message: "connection refused".to_string(),
            });
        }
        lock(&self.commands).push((host.to_string(), command.to_string()));
        let output = self
            .per_host
            .get(&(host.to_string(), command.to_string()))
            .or_else(|| self.any_host.get(command))
            .cloned()
            .unwrap_or_default();
        Ok(output)
    }
}

// ============================================================================
// Verifier
// ============================================================================

#[derive(Debug, Clone, Copy)]
enum Script {
    Pass,
    /// Fails functionally on exactly this call (1-based).
    FailOn(usize),
    /// Cannot run from this call (1-based) onwards.
    UnreachableFrom(usize),
}

/// Verifier with a scripted result per call.
#[derive(Debug)]
pub struct ScriptedVerifier {
    name: String,
    script: Script,
    calls: AtomicUsize,
}

impl ScriptedVerifier {
    fn with_script(name: &str, script: Script) -> Self {
        Self {
            name: name.to_string(),
            script,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn always_ok(name: &str) -> Self {
        Self::with_script(name, Script::Pass)
    }

    /// Fails on call `call` only; every other call passes.
    pub fn failing_on(name: &str, call: usize) -> Self {
        Self::with_script(name, Script::FailOn(call))
    }

    pub fn unreachable(name: &str) -> Self {
        Self::unreachable_from(name, 1)
    }

    /// Passes until call `call`, then can no longer run.
    pub fn unreachable_from(name: &str, call: usize) -> Self {
        Self::with_script(name, Script::UnreachableFrom(call))
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Verifier for ScriptedVerifier {
    fn name(&self) -> &str {
        &self.name
    }

    async fn verify(&self) -> Result<(), CheckError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        match self.script {
            Script::FailOn(n) if n == call => {
                Err(CheckError::failed(format!("scripted failure on call {}", call)))
            }
            Script::UnreachableFrom(n) if call >= n => {
                Err(CheckError::transport(format!("{} unreachable", self.name)))
            }
            _ => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_state_changes_track_started_count() {
        let dn = ComponentRef::new("HDFS", "DATANODE");
        let cluster = MockClusterManager::new().with_instances(&dn, &["dn1", "dn2"]);
        let instance = cluster.instance(&dn, "dn1");

        cluster
            .change_state_and_wait(&instance, HostState::Installed, None)
            .await
            .unwrap();
        assert!(!cluster.component_state(&dn).await.unwrap().all_started());

        cluster
            .change_state_and_wait(&instance, HostState::Started, None)
            .await
            .unwrap();
        assert!(cluster.component_state(&dn).await.unwrap().all_started());
    }

    #[tokio::test]
    async fn test_unreachable_cluster() {
        let cluster = MockClusterManager::new().unreachable();
        let err = cluster
            .component_state(&ComponentRef::new("HDFS", "NAMENODE"))
            .await
            .unwrap_err();
        assert!(matches!(err, ClusterError::Transport { .. }));
    }

    #[tokio::test]
    async fn test_executor_prefers_host_specific_response() {
        let executor = ScriptedRemoteExecutor::new()
            .respond("uptime", CommandOutput::success(["any"]))
            .respond_on("h2", "uptime", CommandOutput::success(["h2"]));
        assert_eq!(executor.run("h1", "uptime").await.unwrap().stdout, vec!["any"]);
        assert_eq!(executor.run("h2", "uptime").await.unwrap().stdout, vec!["h2"]);
        assert!(executor.run("h3", "other").await.unwrap().is_success());
    }

    #[tokio::test]
    async fn test_scripted_verifier_fails_once() {
        let verifier = ScriptedVerifier::failing_on("v", 2);
        assert!(verifier.verify().await.is_ok());
        assert!(verifier.verify().await.is_err());
        assert!(verifier.verify().await.is_ok());
        assert_eq!(verifier.calls(), 3);
    }
}
