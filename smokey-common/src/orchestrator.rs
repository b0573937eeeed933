//! The smoke-test state machine.
//!
//! ```text
//! Idle -> CheckingReadiness -> PreVerifying -> Selecting -> Disrupting
//!      -> VerifyingUnderDisruption -> Restoring -> PostVerifying -> Done
//! ```
//!
//! Exactly one instance is disrupted per run, and once disruption succeeded the
//! instance is always restored before the run reports anything.

use crate::disruption::Disruptor;
use crate::readiness::{ReadinessError, ReadinessProbe};
use crate::report::{ReportBuilder, RunOutcome, RunReport};
use crate::resolver::{InstanceSelector, SelectionError};
use crate::target::TestTarget;
use crate::verification::{CheckFailure, VerifierSet};
use std::sync::Arc;
use thiserror::Error;
use tracing::{Instrument, debug, error, info, info_span, warn};

/// Where a run currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunPhase {
    Idle,
    CheckingReadiness,
    PreVerifying,
    Selecting,
    Disrupting,
    VerifyingUnderDisruption,
    Restoring,
    PostVerifying,
    Done(RunOutcome),
}

/// A run aborted without reaching a terminal outcome because an external
/// system could not be reached.
#[derive(Debug, Error)]
pub enum SmokeTestError {
    #[error("readiness check could not run: {0}")]
    Readiness(#[from] ReadinessError),

    #[error("instance selection failed: {0}")]
    Selection(#[from] SelectionError),

    /// A verifier could not execute. `restored` tells whether a disrupted
    /// instance was restored before aborting.
    #[error("{failure}")]
    Check { failure: CheckFailure, restored: bool },
}

pub struct Orchestrator {
    target: TestTarget,
    readiness: Arc<dyn ReadinessProbe>,
    selector: InstanceSelector,
    disruptor: Arc<dyn Disruptor>,
    verifiers: VerifierSet,
    phase: RunPhase,
}

impl Orchestrator {
    pub fn new(
        target: TestTarget,
        readiness: Arc<dyn ReadinessProbe>,
        selector: InstanceSelector,
        disruptor: Arc<dyn Disruptor>,
        verifiers: VerifierSet,
    ) -> Self {
        Self {
            target,
            readiness,
            selector,
            disruptor,
            verifiers,
            phase: RunPhase::Idle,
        }
    }

    pub fn target(&self) -> &TestTarget {
        &self.target
    }

    pub fn phase(&self) -> RunPhase {
        self.phase
    }

    fn enter(&mut self, phase: RunPhase) {
        debug!(from = ?self.phase, to = ?phase, "Phase transition");
        self.phase = phase;
    }

    fn done(&mut self, report: ReportBuilder, outcome: RunOutcome, failure: Option<String>) -> RunReport {
        self.enter(RunPhase::Done(outcome));
        let report = report.finish(outcome, failure);
        report.log();
        report
    }

    /// Execute the smoke test once.
    pub async fn run(mut self) -> Result<RunReport, SmokeTestError> {
        let span = info_span!("smoketest", component = %self.target.component());
        async move { self.execute().await }.instrument(span).await
    }

    async fn execute(&mut self) -> Result<RunReport, SmokeTestError> {
        let component = self.target.component().clone();
        let mut report = ReportBuilder::start(component.to_string());
        info!(
            disruption = %self.disruptor.describe(),
            verifiers = ?self.verifiers,
            "Starting smoke test"
        );

        self.enter(RunPhase::CheckingReadiness);
        if !self.readiness.is_ready().await? {
            error!("Not all instances in normal state. Aborting smoke test");
            return Ok(self.done(
                report,
                RunOutcome::AbortedNotReady,
                Some(format!("not all instances of {} are started", component)),
            ));
        }
        info!("All instances in normal state");

        self.enter(RunPhase::PreVerifying);
        if let Err(failure) = self.verifiers.verify_all().await {
            return self.verification_failed(report, failure, false);
        }
        info!("Verifiers OK. Starting disruption");

        self.enter(RunPhase::Selecting);
        let instance = self.selector.select(&component).await?;
        report.instance(instance.to_string());

        self.enter(RunPhase::Disrupting);
        info!(%instance, "Stopping instance");
        if let Err(e) = self.disruptor.disrupt(&instance).await {
            error!(%instance, error = %e, "Disruption failed");
            return Ok(self.done(
                report,
                RunOutcome::DisruptionFailed,
                Some(format!("disrupting {}: {}", instance, e)),
            ));
        }
        info!(%instance, "Stopped instance");

        self.enter(RunPhase::VerifyingUnderDisruption);
        tokio::time::sleep(self.target.settle_delay()).await;
        let mut failure: Option<CheckFailure> = None;
        let count = self.target.verification_count();
        for iteration in 1..=count {
            debug!(iteration, count, "Verification under disruption");
            if let Err(f) = self.verifiers.verify_all().await {
                error!(iteration, failure = %f, "Verification under disruption failed");
                failure = Some(f);
                break;
            }
            tokio::time::sleep(self.target.verify_interval()).await;
        }

        self.enter(RunPhase::Restoring);
        info!(%instance, "Starting the previously stopped instance");
        if let Err(e) = self.disruptor.restore(&instance).await {
            error!(%instance, error = %e, "Restoration failed; cluster left degraded");
            return Ok(self.done(
                report,
                RunOutcome::DisruptionFailed,
                Some(format!("restoring {}: {}", instance, e)),
            ));
        }
        info!(%instance, "Started instance");
        match self.readiness.is_ready().await {
            Ok(ready) => info!(ready, "All instances in normal state after restore?"),
            Err(e) => warn!(error = %e, "Could not check state after restore"),
        }

        if let Some(failure) = failure {
            return self.verification_failed(report, failure, true);
        }

        self.enter(RunPhase::PostVerifying);
        info!("Final check with the verifiers");
        if let Err(failure) = self.verifiers.verify_all().await {
            return self.verification_failed(report, failure, true);
        }

        Ok(self.done(report, RunOutcome::Success, None))
    }

    fn verification_failed(
        &mut self,
        report: ReportBuilder,
        failure: CheckFailure,
        restored: bool,
    ) -> Result<RunReport, SmokeTestError> {
        if failure.error.is_transport() {
            error!(%failure, "Check could not run; aborting");
            return Err(SmokeTestError::Check { failure, restored });
        }
        Ok(self.done(
            report,
            RunOutcome::VerificationFailed,
            Some(failure.to_string()),
        ))
    }
}
