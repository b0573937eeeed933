//! Target resolution: where a component runs and which instance to disrupt.

use crate::cluster::{ClusterError, ClusterManager, HaStates};
use crate::types::{ComponentRef, InstanceLocation};
use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info};

#[derive(Debug, Error)]
pub enum SelectionError {
    /// Nothing left to choose from after filtering.
    #[error("no candidate instance of {component}: {reason}")]
    NoCandidates { component: String, reason: String },

    #[error("cluster manager: {0}")]
    Cluster(#[from] ClusterError),

    /// A host locator could not determine its host.
    #[error("locating host: {0}")]
    Locator(String),
}

/// Lists instances of a component and their HA roles.
#[async_trait]
pub trait TargetResolver: Send + Sync {
    async fn list_instances(
        &self,
        component: &ComponentRef,
    ) -> Result<Vec<InstanceLocation>, SelectionError>;

    async fn ha_states(&self, component: &ComponentRef) -> Result<HaStates, SelectionError>;
}

/// Resolves instances through the cluster manager.
pub struct AmbariResolver {
    cluster: Arc<dyn ClusterManager>,
}

impl AmbariResolver {
    pub fn new(cluster: Arc<dyn ClusterManager>) -> Self {
        Self { cluster }
    }
}

#[async_trait]
impl TargetResolver for AmbariResolver {
    async fn list_instances(
        &self,
        component: &ComponentRef,
    ) -> Result<Vec<InstanceLocation>, SelectionError> {
        Ok(self.cluster.list_instances(component).await?)
    }

    async fn ha_states(&self, component: &ComponentRef) -> Result<HaStates, SelectionError> {
        Ok(self.cluster.ha_states(component).await?)
    }
}

/// A fixed host list, for components the cluster manager does not know.
pub struct StaticHostResolver {
    hosts: Vec<String>,
}

impl StaticHostResolver {
    pub fn new(hosts: Vec<String>) -> Self {
        Self { hosts }
    }
}

#[async_trait]
impl TargetResolver for StaticHostResolver {
    async fn list_instances(
        &self,
        _component: &ComponentRef,
    ) -> Result<Vec<InstanceLocation>, SelectionError> {
        Ok(self.hosts.iter().map(InstanceLocation::host_only).collect())
    }

    async fn ha_states(&self, _component: &ComponentRef) -> Result<HaStates, SelectionError> {
        Ok(HaStates::new())
    }
}

/// Role-based candidate filter. Role names compare case-insensitively.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RoleFilter {
    /// Drop instances currently holding this role.
    Exclude(String),
    /// Keep only instances currently holding this role.
    Only(String),
}

impl RoleFilter {
    /// Whether an instance with `role` (if any) stays a candidate.
    pub fn keeps(&self, role: Option<&str>) -> bool {
        match self {
            Self::Exclude(excluded) => !role.is_some_and(|r| r.eq_ignore_ascii_case(excluded)),
            Self::Only(wanted) => role.is_some_and(|r| r.eq_ignore_ascii_case(wanted)),
        }
    }

    pub fn apply(&self, instances: Vec<InstanceLocation>, states: &HaStates) -> Vec<InstanceLocation> {
        instances
            .into_iter()
            .filter(|instance| self.keeps(states.get(&instance.host).map(String::as_str)))
            .collect()
    }
}

impl std::fmt::Display for RoleFilter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Exclude(role) => write!(f, "not {}", role),
            Self::Only(role) => write!(f, "only {}", role),
        }
    }
}

/// Pins selection to one instance computed at run time.
#[async_trait]
pub trait HostLocator: Send + Sync {
    async fn locate(
        &self,
        candidates: &[InstanceLocation],
    ) -> Result<InstanceLocation, SelectionError>;
}

/// Uniformly random choice.
pub fn select_one(candidates: &[InstanceLocation]) -> Option<&InstanceLocation> {
    fastrand::choice(candidates)
}

/// Chooses the single instance a run disrupts.
pub struct InstanceSelector {
    resolver: Arc<dyn TargetResolver>,
    role_filter: Option<RoleFilter>,
    locator: Option<Arc<dyn HostLocator>>,
}

impl InstanceSelector {
    pub fn new(resolver: Arc<dyn TargetResolver>) -> Self {
        Self {
            resolver,
            role_filter: None,
            locator: None,
        }
    }

    pub fn with_role_filter(mut self, filter: Option<RoleFilter>) -> Self {
        self.role_filter = filter;
        self
    }

    pub fn with_locator(mut self, locator: Option<Arc<dyn HostLocator>>) -> Self {
        self.locator = locator;
        self
    }

    pub async fn select(&self, component: &ComponentRef) -> Result<InstanceLocation, SelectionError> {
        let mut candidates = self.resolver.list_instances(component).await?;
        debug!(%component, count = candidates.len(), "Resolved instances");

        if let Some(filter) = &self.role_filter {
            let states = self.resolver.ha_states(component).await?;
            candidates = filter.apply(candidates, &states);
            debug!(%component, %filter, remaining = candidates.len(), "Applied role filter");
        }

        if candidates.is_empty() {
            return Err(SelectionError::NoCandidates {
                component: component.to_string(),
                reason: match &self.role_filter {
                    Some(filter) => format!("none left after filter '{}'", filter),
                    None => "no instances reported".to_string(),
                },
            });
        }

        let chosen = match &self.locator {
            Some(locator) => locator.locate(&candidates).await?,
            None => select_one(&candidates)
                .cloned()
                .ok_or_else(|| SelectionError::NoCandidates {
                    component: component.to_string(),
                    reason: "no instances reported".to_string(),
                })?,
        };
        info!(%component, instance = %chosen, "Selected instance");
        Ok(chosen)
    }
}
