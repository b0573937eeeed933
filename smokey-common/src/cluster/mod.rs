//! Cluster-manager access.
//!
//! The core only needs four things from the cluster manager: the aggregate
//! state of a component, where its instances run, which HA role each instance
//! currently holds, and a way to change one instance's desired state and wait
//! for the change to converge. [`ClusterManager`] is that contract;
//! [`ambari::AmbariClient`] implements it over the Ambari REST API.

pub mod ambari;

pub use ambari::AmbariClient;

use crate::types::{ComponentRef, ComponentState, HostState, InstanceLocation};
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::time::Duration;
use thiserror::Error;

/// Errors talking to the cluster manager.
#[derive(Debug, Error)]
pub enum ClusterError {
    /// The manager answered with an error status.
    #[error("{method} {url} returned HTTP {status}: {body}")]
    Status {
        method: String,
        url: String,
        status: u16,
        body: String,
    },

    /// The manager could not be reached.
    #[error("request to {url} failed: {message}")]
    Transport { url: String, message: String },

    /// The manager answered with something we could not interpret.
    #[error("unexpected response from {url}: {message}")]
    Decode { url: String, message: String },

    /// A state change did not converge in time. The request itself is not
    /// cancelled on the manager.
    #[error("state change {href} did not complete within {timeout:?}")]
    Timeout { href: String, timeout: Duration },

    /// A tracked request reached a terminal non-success status.
    #[error("state change {href} ended with status {status}")]
    RequestFailed { href: String, status: String },
}

/// Result of a state-change call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StateChange {
    /// The manager tracked the request to completion.
    Converged,
    /// The manager accepted the call without a trackable request, which it
    /// does when the instance is already in the requested state.
    AlreadyInState,
}

/// Host name to HA role (`active`, `standby`, ...).
pub type HaStates = BTreeMap<String, String>;

#[async_trait]
pub trait ClusterManager: Send + Sync {
    /// Aggregate started/total counts of a component.
    async fn component_state(&self, component: &ComponentRef) -> Result<ComponentState, ClusterError>;

    /// Every instance of a component.
    async fn list_instances(
        &self,
        component: &ComponentRef,
    ) -> Result<Vec<InstanceLocation>, ClusterError>;

    /// HA role per host. Hosts without a reported role are absent.
    async fn ha_states(&self, component: &ComponentRef) -> Result<HaStates, ClusterError>;

    /// Request `state` for one instance and block until the manager reports the
    /// request finished, or `timeout` (the client default when `None`) elapses.
    async fn change_state_and_wait(
        &self,
        instance: &InstanceLocation,
        state: HostState,
        timeout: Option<Duration>,
    ) -> Result<StateChange, ClusterError>;

    /// First host currently holding `role` (case-insensitive).
    async fn host_with_role(
        &self,
        component: &ComponentRef,
        role: &str,
    ) -> Result<Option<String>, ClusterError> {
        let states = self.ha_states(component).await?;
        Ok(states
            .into_iter()
            .find(|(_, r)| r.eq_ignore_ascii_case(role))
            .map(|(host, _)| host))
    }

    /// Host of the active NameNode, if one reports itself active.
    async fn active_namenode_host(&self) -> Result<Option<String>, ClusterError> {
        self.host_with_role(&ComponentRef::new("HDFS", "NAMENODE"), "active")
            .await
    }
}
