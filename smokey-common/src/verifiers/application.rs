//! Verifiers that submit a cluster application and inspect its output.
//!
//! Each application is a local client command (`spark-submit`, `yarn jar`,
//! `beeline`) run with a timeout. A non-zero exit or output that does not look
//! like a successful run fails the check, and so does a client that does not
//! finish in time. A client that cannot be spawned means the check could not run.

use super::hdfs::{HdfsError, WebHdfsClient};
use crate::cluster::ClusterManager;
use crate::config::{HdfsConfig, HiveConfig};
use crate::verification::{CheckError, Verifier};
use async_trait::async_trait;
use regex::Regex;
use std::process::Stdio;
use std::sync::{Arc, LazyLock};
use std::time::Duration;
use thiserror::Error;
use tokio::process::Command;
use tracing::{debug, error, info};

/// Stack version the client tools expect.
pub const HDP_VERSION: &str = "2.5.0.0-1245";
const HDP_ROOT: &str = "/usr/hdp/current";
const MAPREDUCE_EXAMPLES_JAR: &str =
    "/usr/hdp/current/hadoop-mapreduce-client/hadoop-mapreduce-examples.jar";
const YARN_BIN: &str = "/usr/hdp/current/hadoop-yarn-client/bin/yarn";

pub const DEFAULT_APPLICATION_TIMEOUT: Duration = Duration::from_secs(60);
pub const MAPREDUCE_TIMEOUT: Duration = Duration::from_secs(120);

#[derive(Debug, Error)]
pub enum ApplicationError {
    #[error("could not start {program}: {message}")]
    Spawn { program: String, message: String },

    #[error("{program} did not finish within {timeout:?}")]
    Timeout { program: String, timeout: Duration },

    #[error("{program} exited with status {status}")]
    NonZeroExit { program: String, status: i32 },

    #[error("{application} returned unexpected output: {detail}")]
    UnexpectedOutput { application: String, detail: String },

    #[error("preparing HDFS: {0}")]
    Hdfs(#[from] HdfsError),
}

impl From<ApplicationError> for CheckError {
    fn from(err: ApplicationError) -> Self {
        match err {
            e @ ApplicationError::Spawn { .. } => CheckError::transport(e),
            ApplicationError::Hdfs(e) => e.into(),
            other => CheckError::failed(other.to_string()),
        }
    }
}

// ============================================================================
// Commands and runner
// ============================================================================

/// One client invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApplicationCommand {
    pub program: String,
    pub args: Vec<String>,
    /// Added to the inherited environment.
    pub env: Vec<(String, String)>,
    pub timeout: Duration,
}

impl ApplicationCommand {
    pub fn new<I, S>(program: impl Into<String>, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            program: program.into(),
            args: args.into_iter().map(Into::into).collect(),
            env: vec![("HDP_VERSION".to_string(), HDP_VERSION.to_string())],
            timeout: DEFAULT_APPLICATION_TIMEOUT,
        }
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

impl std::fmt::Display for ApplicationCommand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.program)?;
        for arg in &self.args {
            write!(f, " {}", arg)?;
        }
        Ok(())
    }
}

/// Captured output of a finished client.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ApplicationOutput {
    pub status: i32,
    pub stdout: String,
    pub stderr: String,
}

#[async_trait]
pub trait ApplicationRunner: Send + Sync {
    async fn run(&self, command: &ApplicationCommand) -> Result<ApplicationOutput, ApplicationError>;
}

/// Runs client commands as local subprocesses.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessRunner;

#[async_trait]
impl ApplicationRunner for ProcessRunner {
    async fn run(&self, command: &ApplicationCommand) -> Result<ApplicationOutput, ApplicationError> {
        info!(command = %command, timeout = ?command.timeout, "Running application");
        let child = Command::new(&command.program)
            .args(&command.args)
            .envs(command.env.iter().map(|(k, v)| (k.as_str(), v.as_str())))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| ApplicationError::Spawn {
                program: command.program.clone(),
                message: e.to_string(),
            })?;

        let output = tokio::time::timeout(command.timeout, child.wait_with_output())
            .await
            .map_err(|_| {
                error!(command = %command, "Application timed out");
                ApplicationError::Timeout {
                    program: command.program.clone(),
                    timeout: command.timeout,
                }
            })?
            .map_err(|e| ApplicationError::Spawn {
                program: command.program.clone(),
                message: e.to_string(),
            })?;

        let output = ApplicationOutput {
            status: output.status.code().unwrap_or(-1),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        };
        debug!(status = output.status, stdout = %output.stdout, stderr = %output.stderr, "Application finished");
        Ok(output)
    }
}

// ============================================================================
// Output checks
// ============================================================================

static SPARK_PI: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)^Pi is roughly 3\.14\d+$").expect("spark pi regex is valid"));
static MAPREDUCE_PI: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?m)^Estimated value of Pi is 3\.14\d+$").expect("mapreduce pi regex is valid")
});
static HDFS_TEST_ITERATION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?m)^Iteration\s+\d+\s+took\s+\d+\s+ms\s*$").expect("iteration regex is valid")
});
static JOB_COMPLETED: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"Job job_\d+_\d+ completed successfully").expect("job regex is valid")
});

const HDFS_TEST_ITERATIONS: usize = 10;

/// What a successful run prints.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputCheck {
    SparkPi,
    MapReducePi,
    /// Exactly ten `Iteration N took M ms` lines.
    SparkHdfsTest,
    /// `Job job_.. completed successfully` on either stream.
    JobCompleted,
    /// beeline reports a connection and never loses it.
    HiveConnected,
}

impl OutputCheck {
    pub fn check(&self, output: &ApplicationOutput) -> Result<(), String> {
        match self {
            Self::SparkPi => expect_match(&SPARK_PI, &output.stdout, "no 'Pi is roughly 3.14..' line"),
            Self::MapReducePi => expect_match(
                &MAPREDUCE_PI,
                &output.stdout,
                "no 'Estimated value of Pi is 3.14..' line",
            ),
            Self::SparkHdfsTest => {
                let iterations = HDFS_TEST_ITERATION.find_iter(&output.stdout).count();
                if iterations == HDFS_TEST_ITERATIONS {
                    Ok(())
                } else {
                    Err(format!(
                        "expected {} iterations, found {}",
                        HDFS_TEST_ITERATIONS, iterations
                    ))
                }
            }
            Self::JobCompleted => {
                if JOB_COMPLETED.is_match(&output.stderr) || JOB_COMPLETED.is_match(&output.stdout) {
                    Ok(())
                } else {
                    Err("job did not complete successfully".to_string())
                }
            }
            Self::HiveConnected => {
                if !output.stderr.contains("Connected to: Apache Hive") {
                    Err("beeline never connected".to_string())
                } else if output.stderr.contains("No current connection") {
                    Err("beeline lost its connection".to_string())
                } else {
                    Ok(())
                }
            }
        }
    }
}

fn expect_match(regex: &Regex, text: &str, missing: &str) -> Result<(), String> {
    if regex.is_match(text) {
        Ok(())
    } else {
        Err(missing.to_string())
    }
}

// ============================================================================
// Applications
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SparkVersion {
    V1,
    V2,
}

impl SparkVersion {
    pub fn client_dir(&self) -> &'static str {
        match self {
            Self::V1 => "spark-client",
            Self::V2 => "spark2-client",
        }
    }

    pub fn jar_dir(&self) -> &'static str {
        match self {
            Self::V1 => "lib",
            Self::V2 => "examples/jars",
        }
    }

    pub fn major(&self) -> &'static str {
        match self {
            Self::V1 => "1",
            Self::V2 => "2",
        }
    }

    /// The installed examples jar, falling back to the unversioned name.
    pub fn examples_jar(&self) -> String {
        let dir = format!("{}/{}/{}", HDP_ROOT, self.client_dir(), self.jar_dir());
        glob::glob(&format!("{}/spark-examples*.jar", dir))
            .ok()
            .and_then(|mut paths| paths.find_map(Result::ok))
            .map(|path| path.to_string_lossy().into_owned())
            .unwrap_or_else(|| format!("{}/spark-examples.jar", dir))
    }

    fn submit(&self, class: &str, jar: String, app_arg: &str) -> ApplicationCommand {
        ApplicationCommand::new(
            format!("{}/{}/bin/spark-submit", HDP_ROOT, self.client_dir()),
            [
                "--class",
                class,
                "--master",
                "yarn-client",
                "--num-executors",
                "3",
                "--driver-memory",
                "512m",
                "--executor-memory",
                "512m",
                "--executor-cores",
                "1",
            ]
            .into_iter()
            .map(str::to_string)
            .chain([jar, app_arg.to_string()]),
        )
        .env("SPARK_MAJOR_VERSION", self.major())
    }
}

/// A client command plus the check its output must pass.
#[derive(Debug, Clone)]
pub struct Application {
    pub name: String,
    pub command: ApplicationCommand,
    pub check: OutputCheck,
}

impl Application {
    pub fn spark_pi(version: SparkVersion) -> Self {
        Self {
            name: format!("spark{}-pi", version.major()),
            command: version.submit("org.apache.spark.examples.SparkPi", version.examples_jar(), "100"),
            check: OutputCheck::SparkPi,
        }
    }

    pub fn spark_hdfs_test(version: SparkVersion, input_file: &str) -> Self {
        Self {
            name: format!("spark{}-hdfs-test", version.major()),
            command: version.submit("org.apache.spark.examples.HdfsTest", version.examples_jar(), input_file),
            check: OutputCheck::SparkHdfsTest,
        }
    }

    fn yarn_jar(name: &str, args: &[&str], check: OutputCheck) -> Self {
        Self {
            name: name.to_string(),
            command: ApplicationCommand::new(
                YARN_BIN,
                ["jar", MAPREDUCE_EXAMPLES_JAR].into_iter().chain(args.iter().copied()),
            )
            .timeout(MAPREDUCE_TIMEOUT),
            check,
        }
    }

    pub fn mapreduce_pi() -> Self {
        Self::yarn_jar("mapreduce-pi", &["pi", "8", "1000"], OutputCheck::MapReducePi)
    }

    pub fn teragen(output_dir: &str) -> Self {
        Self::yarn_jar("teragen", &["teragen", "500000", output_dir], OutputCheck::JobCompleted)
    }

    pub fn terasort(input_dir: &str, output_dir: &str) -> Self {
        Self::yarn_jar("terasort", &["terasort", input_dir, output_dir], OutputCheck::JobCompleted)
    }

    /// beeline against the HiveServer2 instances registered in ZooKeeper.
    pub fn hive_query(config: &HiveConfig) -> Self {
        let url = format!(
            "jdbc:hive2://{}/;serviceDiscoveryMode=zooKeeper;zooKeeperNamespace=hiveserver2",
            config.zookeeper_quorum
        );
        Self {
            name: "hive".to_string(),
            command: ApplicationCommand::new(
                "beeline",
                [
                    "-u".to_string(),
                    url,
                    "-e".to_string(),
                    format!("use {}", config.database),
                    "-e".to_string(),
                    config.query.clone(),
                ],
            ),
            check: OutputCheck::HiveConnected,
        }
    }
}

// ============================================================================
// Verifier
// ============================================================================

/// HDFS paths removed before the applications run.
struct HdfsCleanup {
    cluster: Arc<dyn ClusterManager>,
    config: HdfsConfig,
    paths: Vec<String>,
}

/// Runs a sequence of applications; all must succeed.
pub struct ApplicationVerifier {
    name: String,
    runner: Arc<dyn ApplicationRunner>,
    applications: Vec<Application>,
    cleanup: Option<HdfsCleanup>,
}

impl ApplicationVerifier {
    pub fn new(name: impl Into<String>, runner: Arc<dyn ApplicationRunner>, applications: Vec<Application>) -> Self {
        Self {
            name: name.into(),
            runner,
            applications,
            cleanup: None,
        }
    }

    /// Recursively delete `paths` through the active NameNode before each run.
    pub fn with_hdfs_cleanup(
        mut self,
        cluster: Arc<dyn ClusterManager>,
        config: HdfsConfig,
        paths: Vec<String>,
    ) -> Self {
        self.cleanup = Some(HdfsCleanup {
            cluster,
            config,
            paths,
        });
        self
    }

    pub fn spark_pi(runner: Arc<dyn ApplicationRunner>, version: SparkVersion) -> Self {
        Self::new(
            format!("spark{}", version.major()),
            runner,
            vec![Application::spark_pi(version)],
        )
    }

    pub fn spark_hdfs_test(runner: Arc<dyn ApplicationRunner>, version: SparkVersion, config: &HdfsConfig) -> Self {
        Self::new(
            format!("spark{}-hdfs", version.major()),
            runner,
            vec![Application::spark_hdfs_test(
                version,
                &config.file_path("SparkHdfsTestInputFile.txt"),
            )],
        )
    }

    pub fn mapreduce_pi(runner: Arc<dyn ApplicationRunner>) -> Self {
        Self::new("mapreduce", runner, vec![Application::mapreduce_pi()])
    }

    /// TeraGen followed by TeraSort over fresh output directories.
    pub fn terasort(runner: Arc<dyn ApplicationRunner>, cluster: Arc<dyn ClusterManager>, config: HdfsConfig) -> Self {
        let gen_out = config.file_path("teragenout");
        let sort_out = config.file_path("terasortout");
        Self::new(
            "hdfs-mapreduce",
            runner,
            vec![
                Application::teragen(&gen_out),
                Application::terasort(&gen_out, &sort_out),
            ],
        )
        .with_hdfs_cleanup(cluster, config, vec![gen_out, sort_out])
    }

    pub fn hive(runner: Arc<dyn ApplicationRunner>, config: &HiveConfig) -> Self {
        Self::new("hive", runner, vec![Application::hive_query(config)])
    }

    async fn clean_hdfs(&self) -> Result<(), ApplicationError> {
        let Some(cleanup) = &self.cleanup else {
            return Ok(());
        };
        let client = WebHdfsClient::for_active_namenode(cleanup.cluster.as_ref(), &cleanup.config).await?;
        for path in &cleanup.paths {
            client.delete(path, true).await?;
        }
        Ok(())
    }

    async fn run_application(&self, application: &Application) -> Result<(), ApplicationError> {
        let output = self.runner.run(&application.command).await?;
        if output.status != 0 {
            error!(
                application = %application.name,
                status = output.status,
                stdout = %output.stdout,
                stderr = %output.stderr,
                "Application returned non zero exit code"
            );
            return Err(ApplicationError::NonZeroExit {
                program: application.command.program.clone(),
                status: output.status,
            });
        }
        application.check.check(&output).map_err(|detail| {
            error!(application = %application.name, stdout = %output.stdout, stderr = %output.stderr, "Unexpected output");
            ApplicationError::UnexpectedOutput {
                application: application.name.clone(),
                detail,
            }
        })
    }
}

#[async_trait]
impl Verifier for ApplicationVerifier {
    fn name(&self) -> &str {
        &self.name
    }

    async fn verify(&self) -> Result<(), CheckError> {
        self.clean_hdfs().await?;
        for application in &self.applications {
            info!(application = %application.name, "Verify by running application");
            self.run_application(application).await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    fn output(status: i32, stdout: &str, stderr: &str) -> ApplicationOutput {
        ApplicationOutput {
            status,
            stdout: stdout.to_string(),
            stderr: stderr.to_string(),
        }
    }

    /// Answers every command in order from a queue and records what ran.
    struct QueueRunner {
        results: Mutex<Vec<Result<ApplicationOutput, ApplicationError>>>,
        seen: Mutex<Vec<ApplicationCommand>>,
    }

    impl QueueRunner {
        fn new(results: Vec<Result<ApplicationOutput, ApplicationError>>) -> Self {
            Self {
                results: Mutex::new(results.into_iter().rev().collect()),
                seen: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl ApplicationRunner for QueueRunner {
        async fn run(&self, command: &ApplicationCommand) -> Result<ApplicationOutput, ApplicationError> {
            self.seen.lock().unwrap().push(command.clone());
            self.results.lock().unwrap().pop().unwrap_or_else(|| Ok(ApplicationOutput::default()))
        }
    }

    #[test]
    fn test_spark_pi_output() {
        let good = output(0, "noise\nPi is roughly 3.14159\nmore", "");
        assert!(OutputCheck::SparkPi.check(&good).is_ok());
        let bad = output(0, "Pi is roughly 2.71\n", "");
        assert!(OutputCheck::SparkPi.check(&bad).is_err());
    }

    #[test]
    fn test_mapreduce_pi_output() {
        let good = output(0, "Job Finished\nEstimated value of Pi is 3.14250000000000000000\n", "");
        assert!(OutputCheck::MapReducePi.check(&good).is_ok());
        assert!(OutputCheck::MapReducePi.check(&output(0, "", "")).is_err());
    }

    #[test]
    fn test_hdfs_test_needs_exactly_ten_iterations() {
        let lines = |n: usize| {
            (0..n)
                .map(|i| format!("Iteration {} took {} ms", i, 100 + i))
                .collect::<Vec<_>>()
                .join("\n")
        };
        assert!(OutputCheck::SparkHdfsTest.check(&output(0, &lines(10), "")).is_ok());
        assert!(OutputCheck::SparkHdfsTest.check(&output(0, &lines(9), "")).is_err());
        assert!(OutputCheck::SparkHdfsTest.check(&output(0, &lines(11), "")).is_err());
    }

    #[test]
    fn test_job_completed_on_either_stream() {
        let line = "INFO mapreduce.Job: Job job_1500000000000_0001 completed successfully";
        assert!(OutputCheck::JobCompleted.check(&output(0, "", line)).is_ok());
        assert!(OutputCheck::JobCompleted.check(&output(0, line, "")).is_ok());
        assert!(OutputCheck::JobCompleted.check(&output(0, "Job failed", "")).is_err());
    }

    #[test]
    fn test_hive_connection_check() {
        let connected = "Connecting to jdbc:hive2://zk\nConnected to: Apache Hive (version 1.2.1)\n";
        assert!(OutputCheck::HiveConnected.check(&output(0, "", connected)).is_ok());
        let lost = format!("{}No current connection\n", connected);
        assert!(OutputCheck::HiveConnected.check(&output(0, "", &lost)).is_err());
        assert!(OutputCheck::HiveConnected.check(&output(0, "", "Error: refused")).is_err());
    }

    #[test]
    fn test_hive_command_line() {
        let app = Application::hive_query(&HiveConfig::default());
        assert_eq!(app.command.program, "beeline");
        assert_eq!(
            app.command.args,
            vec![
                "-u",
                "jdbc:hive2://sandbox:2181/;serviceDiscoveryMode=zooKeeper;zooKeeperNamespace=hiveserver2",
                "-e",
                "use foodmart",
                "-e",
                "select * from customer limit 10;",
            ]
        );
        assert!(app.command.env.contains(&("HDP_VERSION".to_string(), HDP_VERSION.to_string())));
    }

    #[test]
    fn test_spark_versions() {
        let pi = Application::spark_pi(SparkVersion::V2);
        assert_eq!(pi.command.program, "/usr/hdp/current/spark2-client/bin/spark-submit");
        assert!(pi.command.args.iter().any(|a| a.starts_with("/usr/hdp/current/spark2-client/examples/jars/spark-examples")));
        assert!(pi.command.env.contains(&("SPARK_MAJOR_VERSION".to_string(), "2".to_string())));
        assert_eq!(pi.command.timeout, DEFAULT_APPLICATION_TIMEOUT);

        let v1 = Application::spark_pi(SparkVersion::V1);
        assert!(v1.command.args.iter().any(|a| a.starts_with("/usr/hdp/current/spark-client/lib/spark-examples")));
        assert_eq!(v1.command.args.last().map(String::as_str), Some("100"));
    }

    #[test]
    fn test_mapreduce_uses_longer_timeout() {
        let app = Application::teragen("/out");
        assert_eq!(app.command.timeout, MAPREDUCE_TIMEOUT);
        assert_eq!(app.command.to_string(), format!("{} jar {} teragen 500000 /out", YARN_BIN, MAPREDUCE_EXAMPLES_JAR));
    }

    #[tokio::test]
    async fn test_verifier_runs_applications_in_order() {
        let runner = Arc::new(QueueRunner::new(vec![
            Ok(output(0, "Job job_1_1 completed successfully", "")),
            Ok(output(0, "", "Job job_1_2 completed successfully")),
        ]));
        let verifier = ApplicationVerifier::new(
            "hdfs-mapreduce",
            runner.clone(),
            vec![Application::teragen("/a"), Application::terasort("/a", "/b")],
        );
        verifier.verify().await.unwrap();
        let seen = runner.seen.lock().unwrap();
        assert_eq!(seen.len(), 2);
        assert!(seen[1].args.contains(&"terasort".to_string()));
    }

    #[tokio::test]
    async fn test_non_zero_exit_is_verification_failure() {
        let runner = Arc::new(QueueRunner::new(vec![Ok(output(1, "Pi is roughly 3.1415", ""))]));
        let verifier = ApplicationVerifier::spark_pi(runner, SparkVersion::V1);
        let err = verifier.verify().await.unwrap_err();
        assert!(matches!(err, CheckError::Verification(_)));
    }

    #[tokio::test]
    async fn test_first_failure_stops_the_sequence() {
        let runner = Arc::new(QueueRunner::new(vec![Ok(output(0, "nothing", ""))]));
        let verifier = ApplicationVerifier::new(
            "hdfs-mapreduce",
            runner.clone(),
            vec![Application::teragen("/a"), Application::terasort("/a", "/b")],
        );
        assert!(verifier.verify().await.is_err());
        assert_eq!(runner.seen.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_timeout_is_verification_failure() {
        let runner = Arc::new(QueueRunner::new(vec![Err(ApplicationError::Timeout {
            program: "beeline".to_string(),
            timeout: DEFAULT_APPLICATION_TIMEOUT,
        })]));
        let verifier = ApplicationVerifier::hive(runner, &HiveConfig::default());
        let err = verifier.verify().await.unwrap_err();
        assert!(matches!(err, CheckError::Verification(_)));
    }

    #[test]
    fn test_spawn_failure_is_transport() {
        let err: CheckError = ApplicationError::Spawn {
            program: "spark-submit".to_string(),
            message: "No such file or directory".to_string(),
        }
        .into();
        assert!(err.is_transport());
    }

    #[tokio::test]
    async fn test_process_runner_missing_binary_is_spawn_error() {
        let command = ApplicationCommand::new("/nonexistent/smokey-client", Vec::<String>::new());
        let err = ProcessRunner.run(&command).await.unwrap_err();
        assert!(matches!(err, ApplicationError::Spawn { .. }));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_process_runner_captures_output_and_env() {
        let command = ApplicationCommand::new("sh", ["-c", "echo $HDP_VERSION; echo err >&2; exit 3"]);
        let output = ProcessRunner.run(&command).await.unwrap();
        assert_eq!(output.status, 3);
        assert_eq!(output.stdout.trim(), HDP_VERSION);
        assert_eq!(output.stderr.trim(), "err");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_process_runner_times_out() {
        let command = ApplicationCommand::new("sleep", ["5"]).timeout(Duration::from_millis(100));
        let err = ProcessRunner.run(&command).await.unwrap_err();
        assert!(matches!(err, ApplicationError::Timeout { .. }));
    }
}
