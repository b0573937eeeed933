//! What a smoke test exercises and how it disrupts it.

use crate::disruption::{Disruptor, ForcefulDisruption, NoDisruption};
use crate::process::ProcessMatcher;
use crate::resolver::RoleFilter;
use crate::ssh::RemoteExecutor;
use crate::types::ComponentRef;
use serde::Serialize;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

pub const DEFAULT_SETTLE_DELAY: Duration = Duration::from_secs(5);
pub const DEFAULT_VERIFY_INTERVAL: Duration = Duration::from_secs(2);
pub const DEFAULT_VERIFICATION_COUNT: u32 = 10;
pub const DEFAULT_KILL_GRACE: Duration = Duration::from_secs(30);

/// Invalid target definition.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TargetError {
    #[error("{component}: forceful disruption needs both a process user and a process pattern")]
    MissingProcessIdentity { component: String },

    #[error("unknown disruption type '{0}' (expected AMBARI, KILL or NOOP)")]
    UnknownDisruptionKind(String),
}

/// Command-line disruption selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub enum DisruptionKind {
    /// Stop through the component's manager (`AMBARI`).
    #[default]
    Managed,
    /// Kill the process (`KILL`).
    Forceful,
    /// Do not disrupt (`NOOP`).
    None,
}

impl FromStr for DisruptionKind {
    type Err = TargetError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "AMBARI" | "SERVICE" => Ok(Self::Managed),
            "KILL" => Ok(Self::Forceful),
            "NOOP" => Ok(Self::None),
            _ => Err(TargetError::UnknownDisruptionKind(s.to_string())),
        }
    }
}

impl std::fmt::Display for DisruptionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Managed => write!(f, "AMBARI"),
            Self::Forceful => write!(f, "KILL"),
            Self::None => write!(f, "NOOP"),
        }
    }
}

/// Resolved disruption plan of a target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DisruptionPlan {
    Managed,
    Forceful { user: String, matcher: ProcessMatcher },
    None,
}

/// Immutable description of one smoke test target.
#[derive(Debug, Clone)]
pub struct TestTarget {
    component: ComponentRef,
    plan: DisruptionPlan,
    settle_delay: Duration,
    role_filter: Option<RoleFilter>,
    verification_count: u32,
    verify_interval: Duration,
    kill_grace: Duration,
}

impl TestTarget {
    pub fn builder(component: ComponentRef) -> TestTargetBuilder {
        TestTargetBuilder {
            component,
            kind: DisruptionKind::default(),
            process_user: None,
            matcher: None,
            settle_delay: DEFAULT_SETTLE_DELAY,
            role_filter: None,
            verification_count: DEFAULT_VERIFICATION_COUNT,
            verify_interval: DEFAULT_VERIFY_INTERVAL,
            kill_grace: DEFAULT_KILL_GRACE,
        }
    }

    pub fn component(&self) -> &ComponentRef {
        &self.component
    }

    pub fn plan(&self) -> &DisruptionPlan {
        &self.plan
    }

    pub fn settle_delay(&self) -> Duration {
        self.settle_delay
    }

    pub fn role_filter(&self) -> Option<&RoleFilter> {
        self.role_filter.as_ref()
    }

    pub fn verification_count(&self) -> u32 {
        self.verification_count
    }

    pub fn verify_interval(&self) -> Duration {
        self.verify_interval
    }

    pub fn kill_grace(&self) -> Duration {
        self.kill_grace
    }

    /// The disruption strategy for this target. `managed` is the component's
    /// own stop/start mechanism; forceful disruption restarts through it.
    pub fn disruptor(
        &self,
        managed: Arc<dyn Disruptor>,
        executor: Arc<dyn RemoteExecutor>,
    ) -> Arc<dyn Disruptor> {
        match &self.plan {
            DisruptionPlan::Managed => managed,
            DisruptionPlan::Forceful { user, matcher } => Arc::new(ForcefulDisruption::new(
                executor,
                user.clone(),
                matcher.clone(),
                self.kill_grace,
                managed,
            )),
            DisruptionPlan::None => Arc::new(NoDisruption),
        }
    }
}

pub struct TestTargetBuilder {
    component: ComponentRef,
    kind: DisruptionKind,
    process_user: Option<String>,
    matcher: Option<ProcessMatcher>,
    settle_delay: Duration,
    role_filter: Option<RoleFilter>,
    verification_count: u32,
    verify_interval: Duration,
    kill_grace: Duration,
}

impl TestTargetBuilder {
    pub fn disruption(mut self, kind: DisruptionKind) -> Self {
        self.kind = kind;
        self
    }

    pub fn process(mut self, user: impl Into<String>, matcher: ProcessMatcher) -> Self {
        self.process_user = Some(user.into());
        self.matcher = Some(matcher);
        self
    }

    pub fn settle_delay(mut self, delay: Duration) -> Self {
        self.settle_delay = delay;
        self
    }

    pub fn role_filter(mut self, filter: Option<RoleFilter>) -> Self {
        self.role_filter = filter;
        self
    }

    pub fn verification_count(mut self, count: u32) -> Self {
        self.verification_count = count;
        self
    }

    pub fn verify_interval(mut self, interval: Duration) -> Self {
        self.verify_interval = interval;
        self
    }

    pub fn kill_grace(mut self, grace: Duration) -> Self {
        self.kill_grace = grace;
        self
    }

    pub fn build(self) -> Result<TestTarget, TargetError> {
        let plan = match self.kind {
            DisruptionKind::Managed => DisruptionPlan::Managed,
            DisruptionKind::None => DisruptionPlan::None,
            DisruptionKind::Forceful => match (self.process_user, self.matcher) {
                (Some(user), Some(matcher)) if !user.is_empty() && !matcher.pattern.is_empty() => {
                    DisruptionPlan::Forceful { user, matcher }
                }
                _ => {
                    return Err(TargetError::MissingProcessIdentity {
                        component: self.component.to_string(),
                    });
                }
            },
        };
        Ok(TestTarget {
            component: self.component,
            plan,
            settle_delay: self.settle_delay,
            role_filter: self.role_filter,
            verification_count: self.verification_count,
            verify_interval: self.verify_interval,
            kill_grace: self.kill_grace,
        })
    }
}
