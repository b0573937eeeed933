//! Smokey - Hadoop cluster smoke tests
//!
//! One subcommand per component. Each run checks the component is healthy,
//! disrupts one of its instances, verifies the cluster keeps working, and
//! brings the instance back. Exit code 0 means the cluster coped.

#![forbid(unsafe_code)]

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use smokey_common::catalog::ServiceTest;
use smokey_common::config::LogSettings;
use smokey_common::process::ProcessMatcher;
use smokey_common::ssh::default_executor;
use smokey_common::verifiers::{HttpStatusVerifier, ProcessRunner};
use smokey_common::{
    AmbariClient, DisruptionKind, LogConfig, RangerScenario, RoleFilter, RunOverrides, RunReport,
    SmokeTestFactory, SmokeTestKind, SmokeyConfig, init_logging,
};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;
use tracing::error;

#[derive(Parser, Debug)]
#[command(name = "smokey")]
#[command(author, version, about = "Failover smoke tests for Hadoop clusters")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Show debug output on stdout
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Write the detailed log here instead of smoketest-<test>.log
    #[arg(long, global = true)]
    log_file: Option<PathBuf>,

    /// Print the final run report as JSON
    #[arg(long, global = true)]
    json: bool,
}

/// Options shared by every smoke test.
#[derive(Args, Debug, Clone)]
struct RunArgs {
    /// How to take the instance down: AMBARI, KILL or NOOP
    #[arg(short = 't', long = "type", default_value = "AMBARI")]
    kind: DisruptionKind,

    /// Wait after disruption before verifying (e.g. "15s")
    #[arg(long, value_parser = humantime::parse_duration)]
    settle_delay: Option<Duration>,

    /// Verifications while the instance is down
    #[arg(long)]
    verification_count: Option<u32>,

    /// Wait between verifications (e.g. "2s")
    #[arg(long, value_parser = humantime::parse_duration)]
    verify_interval: Option<Duration>,

    /// Wait after a KILL before restarting (e.g. "30s")
    #[arg(long, value_parser = humantime::parse_duration)]
    kill_grace: Option<Duration>,
}

impl RunArgs {
    fn overrides(&self) -> RunOverrides {
        RunOverrides {
            disruption: self.kind,
            role_filter: None,
            settle_delay: self.settle_delay,
            verification_count: self.verification_count,
            verify_interval: self.verify_interval,
            kill_grace: self.kill_grace,
        }
    }
}

/// Options for components the cluster manager tracks HA roles for.
#[derive(Args, Debug, Clone)]
struct ComponentArgs {
    #[command(flatten)]
    run: RunArgs,

    /// Never disrupt an instance holding this HA role
    #[arg(long, conflicts_with = "only_role")]
    skip_role: Option<String>,

    /// Only disrupt an instance holding this HA role
    #[arg(long)]
    only_role: Option<String>,
}

impl ComponentArgs {
    fn overrides(&self) -> RunOverrides {
        let role_filter = match (&self.skip_role, &self.only_role) {
            (Some(role), _) => Some(RoleFilter::Exclude(role.clone())),
            (None, Some(role)) => Some(RoleFilter::Only(role.clone())),
            (None, None) => None,
        };
        RunOverrides {
            role_filter,
            ..self.run.overrides()
        }
    }
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// HDFS NameNode
    Namenode(ComponentArgs),
    /// HDFS DataNode holding the reference file's first block
    Datanode(ComponentArgs),
    /// HDFS ZooKeeper failover controller
    Zkfc(ComponentArgs),
    /// HDFS JournalNode
    Journalnode(ComponentArgs),
    /// HiveServer2
    HiveServer(ComponentArgs),
    /// Hive metastore
    HiveMetastore(ComponentArgs),
    /// Spark 1 job history server
    Spark(ComponentArgs),
    /// Spark 2 job history server
    Spark2(ComponentArgs),
    /// MapReduce job history server
    Mapreduce(ComponentArgs),
    /// YARN ResourceManager
    YarnResourcemanager(ComponentArgs),
    /// ZooKeeper server
    Zookeeper(ComponentArgs),

    /// An OS service outside the cluster manager
    Service {
        /// Service name as known to `service`
        name: String,

        /// Hosts running the service
        #[arg(long, value_delimiter = ',', required = true)]
        hosts: Vec<String>,

        /// Process owner, for --type KILL
        #[arg(long, requires = "process_pattern")]
        process_user: Option<String>,

        /// Text identifying the process in `ps`, for --type KILL
        #[arg(long, requires = "process_user")]
        process_pattern: Option<String>,

        /// URL that must answer HTTP 200 throughout
        #[arg(long)]
        check_url: Option<String>,

        #[command(flatten)]
        run: RunArgs,
    },

    /// Restart the standby NameNode while Ranger admin is down
    Ranger {
        /// Also require the Ranger admin UI to answer afterwards
        #[arg(long)]
        check_ui: bool,
    },
}

impl Commands {
    /// Catalog entry and options for component smoke tests.
    fn component_test(&self) -> Option<(SmokeTestKind, &ComponentArgs)> {
        let test = match self {
            Self::Namenode(args) => (SmokeTestKind::NameNode, args),
            Self::Datanode(args) => (SmokeTestKind::DataNode, args),
            Self::Zkfc(args) => (SmokeTestKind::Zkfc, args),
            Self::Journalnode(args) => (SmokeTestKind::JournalNode, args),
            Self::HiveServer(args) => (SmokeTestKind::HiveServer, args),
            Self::HiveMetastore(args) => (SmokeTestKind::HiveMetastore, args),
            Self::Spark(args) => (SmokeTestKind::Spark, args),
            Self::Spark2(args) => (SmokeTestKind::Spark2, args),
            Self::Mapreduce(args) => (SmokeTestKind::MapReduce, args),
            Self::YarnResourcemanager(args) => (SmokeTestKind::YarnResourceManager, args),
            Self::Zookeeper(args) => (SmokeTestKind::ZooKeeper, args),
            Self::Service { .. } | Self::Ranger { .. } => return None,
        };
        Some(test)
    }

    /// Name used for the default log file.
    fn log_name(&self) -> String {
        match self {
            Self::Service { name, .. } => name.clone(),
            Self::Ranger { .. } => "ranger".to_string(),
            other => other
                .component_test()
                .map(|(kind, _)| kind.name().to_string())
                .unwrap_or_default(),
        }
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let config = match SmokeyConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("smokey: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let _logging_guards = match init_logging(&log_config(&cli, &config.log)) {
        Ok(guards) => guards,
        Err(e) => {
            eprintln!("smokey: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let runtime = match tokio::runtime::Builder::new_current_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(e) => {
            error!(error = %e, "Failed to start async runtime");
            return ExitCode::FAILURE;
        }
    };

    match runtime.block_on(run(&cli, config)) {
        Ok(report) => {
            if cli.json {
                match serde_json::to_string_pretty(&report) {
                    Ok(json) => println!("{}", json),
                    Err(e) => error!(error = %e, "Failed to serialize run report"),
                }
            }
            ExitCode::from(report.exit_code())
        }
        Err(e) => {
            error!("Smoke test could not complete: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

fn log_config(cli: &Cli, settings: &LogSettings) -> LogConfig {
    // keep stdout clean for the JSON report
    let mut log_config = LogConfig::for_component(&cli.command.log_name(), settings)
        .with_verbose(cli.verbose)
        .with_console_on_stderr(cli.json);
    if let Some(path) = &cli.log_file {
        log_config = log_config.with_log_file(path);
    }
    log_config
}

async fn run(cli: &Cli, config: SmokeyConfig) -> Result<RunReport> {
    let cluster = Arc::new(AmbariClient::new(config.ambari.clone()).context("Failed to create Ambari client")?);

    if let Commands::Ranger { check_ui } = &cli.command {
        let mut scenario = RangerScenario::new(cluster);
        if *check_ui {
            scenario = scenario.with_ui_check(Arc::new(HttpStatusVerifier::new(
                "ranger-ui",
                config.ranger.base_url.clone(),
            )));
        }
        return Ok(scenario.run().await?);
    }

    let executor = default_executor(&config.ssh);
    let factory = SmokeTestFactory::new(config, cluster, executor, Arc::new(ProcessRunner));

    let orchestrator = match &cli.command {
        Commands::Service {
            name,
            hosts,
            process_user,
            process_pattern,
            check_url,
            run,
        } => {
            let process = process_user
                .clone()
                .zip(process_pattern.clone())
                .map(|(user, pattern)| (user, ProcessMatcher::new(pattern)));
            let test = ServiceTest {
                service: name.clone(),
                hosts: hosts.clone(),
                process,
                check_url: check_url.clone(),
            };
            factory.build_service(test, &run.overrides())?
        }
        command => {
            let (kind, args) = command
                .component_test()
                .context("not a component smoke test")?;
            factory.build(kind, &args.overrides())?
        }
    };

    Ok(orchestrator.run().await?)
}
