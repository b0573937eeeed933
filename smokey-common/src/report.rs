//! Run outcome and the report the entry point prints and exits on.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::time::Instant;
use tracing::{error, info};

/// Terminal state of one run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum RunOutcome {
    Success,
    /// The component was not fully started; nothing was disrupted.
    AbortedNotReady,
    /// A verifier failed at some checkpoint.
    VerificationFailed,
    /// Taking the instance down or bringing it back failed.
    DisruptionFailed,
}

impl std::fmt::Display for RunOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Success => write!(f, "success"),
            Self::AbortedNotReady => write!(f, "aborted: not ready"),
            Self::VerificationFailed => write!(f, "verification failed"),
            Self::DisruptionFailed => write!(f, "disruption failed"),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub component: String,
    /// Disrupted instance, once one was selected.
    pub instance: Option<String>,
    pub outcome: RunOutcome,
    /// What failed and why, for every outcome except success.
    pub failure: Option<String>,
    pub started_at: DateTime<Utc>,
    pub duration_ms: u64,
}

impl RunReport {
    pub fn exit_code(&self) -> u8 {
        match self.outcome {
            RunOutcome::Success => 0,
            _ => 1,
        }
    }

    pub fn is_success(&self) -> bool {
        self.outcome == RunOutcome::Success
    }

    /// Log the terminal outcome with context.
    pub fn log(&self) {
        let instance = self.instance.as_deref().unwrap_or("-");
        match &self.failure {
            None => info!(
                component = %self.component,
                instance,
                duration_ms = self.duration_ms,
                "Smoke test finished successfully"
            ),
            Some(failure) => error!(
                component = %self.component,
                instance,
                outcome = %self.outcome,
                %failure,
                duration_ms = self.duration_ms,
                "Smoke test NOT OK"
            ),
        }
    }
}

/// Collects report fields while a run progresses.
pub(crate) struct ReportBuilder {
    component: String,
    instance: Option<String>,
    started_at: DateTime<Utc>,
    clock: Instant,
}

impl ReportBuilder {
    pub(crate) fn start(component: impl Into<String>) -> Self {
        Self {
            component: component.into(),
            instance: None,
            started_at: Utc::now(),
            clock: Instant::now(),
        }
    }

    pub(crate) fn instance(&mut self, instance: impl Into<String>) {
        self.instance = Some(instance.into());
    }

    pub(crate) fn finish(self, outcome: RunOutcome, failure: Option<String>) -> RunReport {
        RunReport {
            component: self.component,
            instance: self.instance,
            outcome,
            failure,
            started_at: self.started_at,
            duration_ms: u64::try_from(self.clock.elapsed().as_millis()).unwrap_or(u64::MAX),
        }
    }
}
