//! Common types used across Smokey components.

use serde::{Deserialize, Serialize};

/// A component type as known to the cluster manager, e.g. `HDFS/NAMENODE`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ComponentRef {
    /// Owning service (`HDFS`). `None` for components outside the cluster manager.
    pub service: Option<String>,
    /// Component type name (`NAMENODE`).
    pub component: String,
}

impl ComponentRef {
    pub fn new(service: impl Into<String>, component: impl Into<String>) -> Self {
        Self {
            service: Some(service.into()),
            component: component.into(),
        }
    }

    /// A component with no owning service (a plain OS service).
    pub fn standalone(component: impl Into<String>) -> Self {
        Self {
            service: None,
            component: component.into(),
        }
    }

    pub fn service_name(&self) -> &str {
        self.service.as_deref().unwrap_or("")
    }
}

impl std::fmt::Display for ComponentRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.service {
            Some(service) => write!(f, "{}/{}", service, self.component),
            None => write!(f, "{}", self.component),
        }
    }
}

/// One running instance of a component: the host it runs on and the path the
/// cluster manager addresses it by.
///
/// Produced fresh by target resolution and consumed within the same run.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct InstanceLocation {
    pub host: String,
    /// Cluster-manager href for the host component. Empty for service-managed
    /// components, which are addressed by host alone.
    pub path: String,
}

impl InstanceLocation {
    pub fn new(host: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            path: path.into(),
        }
    }

    /// An instance addressed by host only.
    pub fn host_only(host: impl Into<String>) -> Self {
        Self::new(host, "")
    }
}

impl std::fmt::Display for InstanceLocation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.path.is_empty() {
            write!(f, "{}", self.host)
        } else {
            write!(f, "{} ({})", self.host, self.path)
        }
    }
}

/// Desired state of a host component in the cluster manager.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum HostState {
    /// Running.
    Started,
    /// Installed but not running; the cluster manager's "stopped".
    Installed,
}

impl HostState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Started => "STARTED",
            Self::Installed => "INSTALLED",
        }
    }
}

impl std::fmt::Display for HostState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Aggregate state of all instances of a component.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComponentState {
    pub total_count: u32,
    pub started_count: u32,
    pub state: String,
}

impl ComponentState {
    /// True when the aggregate flag is `STARTED` and every instance reports started.
    ///
    /// A started count that disagrees with the total in either direction is not
    /// treated as started.
    pub fn all_started(&self) -> bool {
        self.state == "STARTED" && self.total_count == self.started_count
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn state(total: u32, started: u32, flag: &str) -> ComponentState {
        ComponentState {
            total_count: total,
            started_count: started,
            state: flag.to_string(),
        }
    }

    #[test]
    fn test_all_started_matching_counts() {
        assert!(state(2, 2, "STARTED").all_started());
    }

    #[test]
    fn test_all_started_inconsistent_counts() {
        assert!(!state(2, 3, "STARTED").all_started());
        assert!(!state(2, 1, "STARTED").all_started());
    }

    #[test]
    fn test_all_started_wrong_state_flag() {
        assert!(!state(2, 2, "INSTALLED").all_started());
        assert!(!state(2, 2, "started").all_started());
    }

    #[test]
    fn test_component_ref_display() {
        assert_eq!(ComponentRef::new("HDFS", "NAMENODE").to_string(), "HDFS/NAMENODE");
        assert_eq!(ComponentRef::standalone("prometheus").to_string(), "prometheus");
    }

    #[test]
    fn test_instance_display() {
        assert_eq!(InstanceLocation::host_only("nn1").to_string(), "nn1");
        assert_eq!(
            InstanceLocation::new("nn1", "http://a/b").to_string(),
            "nn1 (http://a/b)"
        );
    }

    #[test]
    fn test_host_state_serde() {
        let json = serde_json::to_string(&HostState::Installed).unwrap();
        assert_eq!(json, "\"INSTALLED\"");
    }
}
