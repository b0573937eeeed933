//! Verification units.
//!
//! A [`Verifier`] performs one self-contained functional check of the cluster
//! (write a file and read it back, submit a job and inspect its output, ...)
//! and either succeeds silently or explains what is broken. A [`VerifierSet`]
//! is the ordered collection a smoke test runs at every checkpoint.

use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, error, info};

/// The checked functionality is currently broken.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{cause}")]
pub struct VerificationError {
    pub cause: String,
}

impl VerificationError {
    pub fn new(cause: impl Into<String>) -> Self {
        Self {
            cause: cause.into(),
        }
    }
}

/// Why a check did not pass.
#[derive(Debug, Error)]
pub enum CheckError {
    /// The check ran and found the functionality broken.
    #[error("verification failed: {0}")]
    Verification(#[from] VerificationError),

    /// The check itself could not execute (endpoint unreachable, spawn
    /// failure, ...). Fatal to the run rather than a functional failure.
    #[error("check could not run: {0}")]
    Transport(String),
}

impl CheckError {
    pub fn failed(cause: impl Into<String>) -> Self {
        Self::Verification(VerificationError::new(cause))
    }

    pub fn transport(cause: impl std::fmt::Display) -> Self {
        Self::Transport(cause.to_string())
    }

    pub fn is_transport(&self) -> bool {
        matches!(self, Self::Transport(_))
    }
}

/// A single composable functional check.
#[async_trait]
pub trait Verifier: Send + Sync {
    /// Short name used in logs and reports.
    fn name(&self) -> &str;

    /// Run the check once.
    ///
    /// Implementations clean up any remote artifacts they create, including on
    /// the failure path where feasible.
    async fn verify(&self) -> Result<(), CheckError>;
}

/// A failed checkpoint: which verifier failed and why.
#[derive(Debug)]
pub struct CheckFailure {
    pub verifier: String,
    pub error: CheckError,
}

impl std::fmt::Display for CheckFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.verifier, self.error)
    }
}

/// Ordered, non-empty-by-convention sequence of verifiers, fixed at construction.
#[derive(Clone, Default)]
pub struct VerifierSet {
    verifiers: Vec<Arc<dyn Verifier>>,
}

impl VerifierSet {
    pub fn new(verifiers: Vec<Arc<dyn Verifier>>) -> Self {
        Self { verifiers }
    }

    pub fn single(verifier: Arc<dyn Verifier>) -> Self {
        Self::new(vec![verifier])
    }

    pub fn len(&self) -> usize {
        self.verifiers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.verifiers.is_empty()
    }

    pub fn names(&self) -> Vec<String> {
        self.verifiers.iter().map(|v| v.name().to_string()).collect()
    }

    /// Run every verifier in order. The first failure stops the checkpoint.
    pub async fn verify_all(&self) -> Result<(), CheckFailure> {
        for verifier in &self.verifiers {
            debug!(verifier = verifier.name(), "Running verifier");
            if let Err(error) = verifier.verify().await {
                error!(verifier = verifier.name(), %error, "Verifier status NOT OK");
                return Err(CheckFailure {
                    verifier: verifier.name().to_string(),
                    error,
                });
            }
            info!(verifier = verifier.name(), "Verifier OK");
        }
        Ok(())
    }
}

impl std::fmt::Debug for VerifierSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.names()).finish()
    }
}

impl FromIterator<Arc<dyn Verifier>> for VerifierSet {
    fn from_iter<I: IntoIterator<Item = Arc<dyn Verifier>>>(iter: I) -> Self {
        Self::new(iter.into_iter().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::ScriptedVerifier;

    #[tokio::test]
    async fn test_verify_all_passes_in_order() {
        let a = Arc::new(ScriptedVerifier::always_ok("a"));
        let b = Arc::new(ScriptedVerifier::always_ok("b"));
        let set = VerifierSet::new(vec![a.clone(), b.clone()]);

        set.verify_all().await.unwrap();
        assert_eq!(a.calls(), 1);
        assert_eq!(b.calls(), 1);
    }

    #[tokio::test]
    async fn test_first_failure_short_circuits() {
        let a = Arc::new(ScriptedVerifier::failing_on("a", 1));
        let b = Arc::new(ScriptedVerifier::always_ok("b"));
        let set = VerifierSet::new(vec![a.clone(), b.clone()]);

        let failure = set.verify_all().await.unwrap_err();
        assert_eq!(failure.verifier, "a");
        assert!(matches!(failure.error, CheckError::Verification(_)));
        assert_eq!(b.calls(), 0);
    }

    #[tokio::test]
    async fn test_transport_error_is_distinct() {
        let a = Arc::new(ScriptedVerifier::unreachable("a"));
        let set = VerifierSet::single(a);

        let failure = set.verify_all().await.unwrap_err();
        assert!(failure.error.is_transport());
        assert!(failure.to_string().starts_with("a: check could not run"));
    }

    #[test]
    fn test_names_and_len() {
        let set: VerifierSet = vec![
            Arc::new(ScriptedVerifier::always_ok("hdfs")) as Arc<dyn Verifier>,
            Arc::new(ScriptedVerifier::always_ok("spark")) as Arc<dyn Verifier>,
        ]
        .into_iter()
        .collect();
        assert_eq!(set.len(), 2);
        assert_eq!(set.names(), vec!["hdfs", "spark"]);
        assert_eq!(format!("{:?}", set), "[\"hdfs\", \"spark\"]");
    }
}
