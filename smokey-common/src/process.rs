//! Remote process discovery and termination for forceful disruption.
//!
//! Instead of piping `ps` through `grep` on the remote side, the full
//! `ps -u <user> -f` listing is fetched and matched locally, so the matching
//! rules are plain functions that can be tested without a host.

use crate::ssh::{CommandError, RemoteExecutor};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info};

/// No usable process id could be extracted.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown pid: {0}")]
pub struct UnknownPidError(pub String);

#[derive(Debug, Error)]
pub enum ProcessError {
    #[error(transparent)]
    Command(#[from] CommandError),

    #[error(transparent)]
    UnknownPid(#[from] UnknownPidError),
}

/// Second whitespace-delimited column of the first line.
pub fn pid_from_ps_output<S: AsRef<str>>(output: &[S]) -> Result<String, UnknownPidError> {
    let Some(first) = output.first() else {
        debug!("ps output was empty");
        return Err(UnknownPidError(
            "expected at least one line of ps output".to_string(),
        ));
    };
    let first = first.as_ref();
    match first.split_whitespace().nth(1) {
        Some(pid) => Ok(pid.to_string()),
        None => {
            debug!(line = first, "ps line has fewer than two columns");
            Err(UnknownPidError(format!(
                "expected at least two columns in '{}'",
                first
            )))
        }
    }
}

/// One row of `ps -f` output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessRow {
    pub uid: String,
    pub pid: u32,
    pub ppid: u32,
    pub c: String,
    pub stime: String,
    pub tty: String,
    pub time: String,
    /// Full command line, original spacing preserved.
    pub cmd: String,
}

impl ProcessRow {
    /// Parse a row. Returns `None` for the header and anything malformed.
    pub fn parse(line: &str) -> Option<Self> {
        let mut rest = line.trim_start();
        let mut fields = Vec::with_capacity(7);
        for _ in 0..7 {
            let end = rest.find(char::is_whitespace)?;
            fields.push(&rest[..end]);
            rest = rest[end..].trim_start();
        }
        if rest.is_empty() {
            return None;
        }
        Some(Self {
            uid: fields[0].to_string(),
            pid: fields[1].parse().ok()?,
            ppid: fields[2].parse().ok()?,
            c: fields[3].to_string(),
            stime: fields[4].to_string(),
            tty: fields[5].to_string(),
            time: fields[6].to_string(),
            cmd: rest.trim_end().to_string(),
        })
    }
}

/// Identifies one process by its command line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessMatcher {
    pub pattern: String,
    pub also_require: Option<String>,
    pub exclude: Option<String>,
}

impl ProcessMatcher {
    pub fn new(pattern: impl Into<String>) -> Self {
        Self {
            pattern: pattern.into(),
            also_require: None,
            exclude: None,
        }
    }

    pub fn requiring(mut self, text: impl Into<String>) -> Self {
        self.also_require = Some(text.into());
        self
    }

    pub fn excluding(mut self, text: impl Into<String>) -> Self {
        self.exclude = Some(text.into());
        self
    }

    pub fn matches(&self, cmd: &str) -> bool {
        cmd.contains(&self.pattern)
            && self.also_require.as_deref().is_none_or(|t| cmd.contains(t))
            && self.exclude.as_deref().is_none_or(|t| !cmd.contains(t))
    }

    /// Lines of a `ps -f` listing whose command matches, in listing order.
    pub fn matching_lines<'a, S: AsRef<str>>(&self, listing: &'a [S]) -> Vec<&'a str> {
        listing
            .iter()
            .map(AsRef::as_ref)
            .filter(|line| ProcessRow::parse(line).is_some_and(|row| self.matches(&row.cmd)))
            .collect()
    }

    /// Pid of the first matching process.
    pub fn find_pid<S: AsRef<str>>(&self, listing: &[S]) -> Result<u32, UnknownPidError> {
        let pid = pid_from_ps_output(&self.matching_lines(listing))?;
        pid.parse()
            .map_err(|_| UnknownPidError(format!("'{}' is not a process id", pid)))
    }
}

impl std::fmt::Display for ProcessMatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.pattern)?;
        if let Some(required) = &self.also_require {
            write!(f, " +{}", required)?;
        }
        if let Some(excluded) = &self.exclude {
            write!(f, " -{}", excluded)?;
        }
        Ok(())
    }
}

/// Finds and signals processes on remote hosts.
#[derive(Clone)]
pub struct ProcessControl {
    executor: Arc<dyn RemoteExecutor>,
}

impl ProcessControl {
    pub fn new(executor: Arc<dyn RemoteExecutor>) -> Self {
        Self { executor }
    }

    /// Pid of the first process owned by `user` on `host` that `matcher` accepts.
    pub async fn find_pid(
        &self,
        host: &str,
        user: &str,
        matcher: &ProcessMatcher,
    ) -> Result<u32, ProcessError> {
        let command = format!("ps -u {} -f", user);
        let output = self.executor.run(host, &command).await?.check(host, &command)?;
        let pid = matcher.find_pid(&output.stdout)?;
        info!(%host, %user, %matcher, pid, "Found process");
        Ok(pid)
    }

    /// Send SIGTERM to `pid` as `user`.
    pub async fn terminate(&self, host: &str, user: &str, pid: u32) -> Result<(), ProcessError> {
        let command = format!("sudo -u {} kill -TERM {}", user, pid);
        info!(%host, %user, pid, "Terminating process");
        self.executor.run(host, &command).await?.check(host, &command)?;
        Ok(())
    }
}
