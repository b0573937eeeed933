//! Predefined smoke tests.
//!
//! Each [`SmokeTestKind`] names a cluster component together with the process
//! that runs it, how long disruption takes to sink in, how often to verify, and
//! which verifiers prove the cluster still works without it. [`SmokeTestFactory`]
//! turns an entry plus command-line overrides into a ready [`Orchestrator`].

use crate::cluster::ClusterManager;
use crate::config::SmokeyConfig;
use crate::disruption::{Disruptor, ManagedDisruption, ServiceDisruption};
use crate::orchestrator::Orchestrator;
use crate::process::ProcessMatcher;
use crate::readiness::{AmbariReadiness, ServiceStatusReadiness};
use crate::resolver::{AmbariResolver, HostLocator, InstanceSelector, RoleFilter, StaticHostResolver};
use crate::ssh::RemoteExecutor;
use crate::target::{DisruptionKind, TargetError, TestTarget, TestTargetBuilder};
use crate::types::ComponentRef;
use crate::verification::{Verifier, VerifierSet};
use crate::verifiers::{
    ApplicationRunner, ApplicationVerifier, FirstBlockLocator, HdfsReadVerifier, HdfsWriteVerifier,
    HttpStatusVerifier, SparkVersion, YarnResourceManagerVerifier,
};
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

/// Reference file the DataNode test reads and pins its selection to.
pub const DATANODE_REFERENCE_FILE: &str = "hdfs_dn_test_file_with_known_md5.txt";

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("unknown smoke test '{0}'")]
    UnknownTest(String),

    #[error("invalid target: {0}")]
    Target(#[from] TargetError),

    #[error("the datanode smoke test needs HDFS_DATANODE_KNOWN_CHECKSUM")]
    MissingDatanodeChecksum,

    #[error("a service smoke test needs at least one host")]
    NoServiceHosts,

    #[error("role filters need HA roles, which service smoke tests do not have")]
    RoleFilterUnsupported,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SmokeTestKind {
    NameNode,
    DataNode,
    Zkfc,
    JournalNode,
    HiveServer,
    HiveMetastore,
    Spark,
    Spark2,
    MapReduce,
    YarnResourceManager,
    ZooKeeper,
}

impl SmokeTestKind {
    pub const ALL: [SmokeTestKind; 11] = [
        Self::NameNode,
        Self::DataNode,
        Self::Zkfc,
        Self::JournalNode,
        Self::HiveServer,
        Self::HiveMetastore,
        Self::Spark,
        Self::Spark2,
        Self::MapReduce,
        Self::YarnResourceManager,
        Self::ZooKeeper,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Self::NameNode => "namenode",
            Self::DataNode => "datanode",
            Self::Zkfc => "zkfc",
            Self::JournalNode => "journalnode",
            Self::HiveServer => "hive-server",
            Self::HiveMetastore => "hive-metastore",
            Self::Spark => "spark",
            Self::Spark2 => "spark2",
            Self::MapReduce => "mapreduce",
            Self::YarnResourceManager => "yarn-resourcemanager",
            Self::ZooKeeper => "zookeeper",
        }
    }

    pub fn entry(&self) -> CatalogEntry {
        use VerifierKind::*;
        let secs = Duration::from_secs;
        match self {
            Self::NameNode => CatalogEntry::new(("HDFS", "NAMENODE"), "hdfs", ProcessMatcher::new("NameNode"))
                .timing(secs(5), 2)
                .verifiers(&[
                    HdfsWrite("nn_smoketest_verifier_file.txt"),
                    TeraSort,
                    SparkHdfsTest(SparkVersion::V1),
                    SparkHdfsTest(SparkVersion::V2),
                ]),
            Self::DataNode => CatalogEntry::new(
                ("HDFS", "DATANODE"),
                "hdfs",
                ProcessMatcher::new("SecureDataNodeStarter"),
            )
            .timing(secs(15), 10)
            .verifiers(&[HdfsRead])
            .pinned_to_first_block(),
            Self::Zkfc => CatalogEntry::new(
                ("HDFS", "ZKFC"),
                "hdfs",
                ProcessMatcher::new("DFSZKFailoverController"),
            )
            .timing(secs(5), 2)
            .verifiers(&[
                HdfsWrite("zkfc_smoketest_verifier_file.txt"),
                TeraSort,
                SparkHdfsTest(SparkVersion::V1),
                SparkHdfsTest(SparkVersion::V2),
            ]),
            Self::JournalNode => CatalogEntry::new(
                ("HDFS", "JOURNALNODE"),
                "hdfs",
                ProcessMatcher::new("JournalNode"),
            )
            .timing(secs(5), 2)
            .verifiers(&[HdfsWrite("jn_smoketest_verifier_file.txt")]),
            Self::HiveServer => CatalogEntry::new(
                ("HIVE", "HIVE_SERVER"),
                "hive",
                ProcessMatcher::new("org.apache.hive.service.server.HiveServer2"),
            )
            .timing(secs(15), 10)
            .verifiers(&[Hive]),
            Self::HiveMetastore => CatalogEntry::new(
                ("HIVE", "HIVE_METASTORE"),
                "hive",
                ProcessMatcher::new("org.apache.hadoop.hive.metastore.HiveMetaStore"),
            )
            .timing(secs(15), 10)
            .verifiers(&[Hive]),
            Self::Spark => CatalogEntry::new(
                ("SPARK", "SPARK_JOBHISTORYSERVER"),
                "spark",
                ProcessMatcher::new("HistoryServer").excluding("spark2"),
            )
            .timing(secs(15), 10)
            .verifiers(&[SparkPi(SparkVersion::V1)]),
            Self::Spark2 => CatalogEntry::new(
                ("SPARK2", "SPARK2_JOBHISTORYSERVER"),
                "spark",
                ProcessMatcher::new("HistoryServer").requiring("spark2"),
            )
            .timing(secs(15), 10)
            .verifiers(&[SparkPi(SparkVersion::V2)]),
            Self::MapReduce => CatalogEntry::new(
                ("MAPREDUCE2", "HISTORYSERVER"),
                "mapred",
                ProcessMatcher::new("JobHistoryServer"),
            )
            .timing(secs(15), 10)
            .verifiers(&[MapReducePi]),
            Self::YarnResourceManager => CatalogEntry::new(
                ("YARN", "RESOURCEMANAGER"),
                "yarn",
                ProcessMatcher::new("resourcemanager"),
            )
            .timing(secs(5), 10)
            .verifiers(&[YarnResourceManager]),
            Self::ZooKeeper => CatalogEntry::new(
                ("ZOOKEEPER", "ZOOKEEPER_SERVER"),
                "zookeeper",
                ProcessMatcher::new("org.apache.zookeeper.server.quorum.QuorumPeerMain"),
            )
            .timing(secs(5), 1)
            .verifiers(&[
                Hive,
                HdfsWrite("nn_smoketest_verifier_file.txt"),
                TeraSort,
                SparkHdfsTest(SparkVersion::V1),
                SparkHdfsTest(SparkVersion::V2),
                YarnResourceManager,
            ]),
        }
    }
}

impl FromStr for SmokeTestKind {
    type Err = CatalogError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.name() == s)
            .ok_or_else(|| CatalogError::UnknownTest(s.to_string()))
    }
}

impl std::fmt::Display for SmokeTestKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Verifier recipe, instantiated against live clients at build time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VerifierKind {
    /// Round-trip a generated file with this name.
    HdfsWrite(&'static str),
    HdfsRead,
    TeraSort,
    SparkHdfsTest(SparkVersion),
    SparkPi(SparkVersion),
    MapReducePi,
    Hive,
    YarnResourceManager,
}

/// Static definition of one smoke test.
#[derive(Debug, Clone)]
pub struct CatalogEntry {
    pub component: ComponentRef,
    pub process_user: &'static str,
    pub matcher: ProcessMatcher,
    pub settle_delay: Duration,
    pub verification_count: u32,
    pub verifiers: Vec<VerifierKind>,
    /// Disrupt the DataNode holding the reference file's first block.
    pub pin_first_block: bool,
}

impl CatalogEntry {
    fn new(component: (&str, &str), process_user: &'static str, matcher: ProcessMatcher) -> Self {
        Self {
            component: ComponentRef::new(component.0, component.1),
            process_user,
            matcher,
            settle_delay: crate::target::DEFAULT_SETTLE_DELAY,
            verification_count: crate::target::DEFAULT_VERIFICATION_COUNT,
            verifiers: Vec::new(),
            pin_first_block: false,
        }
    }

    fn timing(mut self, settle_delay: Duration, verification_count: u32) -> Self {
        self.settle_delay = settle_delay;
        self.verification_count = verification_count;
        self
    }

    fn verifiers(mut self, verifiers: &[VerifierKind]) -> Self {
        self.verifiers = verifiers.to_vec();
        self
    }

    fn pinned_to_first_block(mut self) -> Self {
        self.pin_first_block = true;
        self
    }
}

/// Command-line adjustments applied on top of a catalog entry.
#[derive(Debug, Clone, Default)]
pub struct RunOverrides {
    pub disruption: DisruptionKind,
    pub role_filter: Option<RoleFilter>,
    pub settle_delay: Option<Duration>,
    pub verification_count: Option<u32>,
    pub verify_interval: Option<Duration>,
    pub kill_grace: Option<Duration>,
}

impl RunOverrides {
    fn apply(&self, builder: TestTargetBuilder) -> TestTargetBuilder {
        let mut builder = builder
            .disruption(self.disruption)
            .role_filter(self.role_filter.clone());
        if let Some(delay) = self.settle_delay {
            builder = builder.settle_delay(delay);
        }
        if let Some(count) = self.verification_count {
            builder = builder.verification_count(count);
        }
        if let Some(interval) = self.verify_interval {
            builder = builder.verify_interval(interval);
        }
        if let Some(grace) = self.kill_grace {
            builder = builder.kill_grace(grace);
        }
        builder
    }
}

/// A component managed by the OS service manager instead of the cluster manager.
#[derive(Debug, Clone)]
pub struct ServiceTest {
    pub service: String,
    pub hosts: Vec<String>,
    /// Needed only for forceful disruption.
    pub process: Option<(String, ProcessMatcher)>,
    /// Optional HTTP endpoint that must answer 200 throughout.
    pub check_url: Option<String>,
}

/// Builds orchestrators from catalog entries and live collaborators.
pub struct SmokeTestFactory {
    config: SmokeyConfig,
    cluster: Arc<dyn ClusterManager>,
    executor: Arc<dyn RemoteExecutor>,
    runner: Arc<dyn ApplicationRunner>,
}

impl SmokeTestFactory {
    pub fn new(
        config: SmokeyConfig,
        cluster: Arc<dyn ClusterManager>,
        executor: Arc<dyn RemoteExecutor>,
        runner: Arc<dyn ApplicationRunner>,
    ) -> Self {
        Self {
            config,
            cluster,
            executor,
            runner,
        }
    }

    fn verifier(&self, kind: VerifierKind) -> Result<Arc<dyn Verifier>, CatalogError> {
        let hdfs = &self.config.hdfs;
        Ok(match kind {
            VerifierKind::HdfsWrite(file) => {
                Arc::new(HdfsWriteVerifier::new(self.cluster.clone(), hdfs.clone(), file))
            }
            VerifierKind::HdfsRead => {
                let checksum = hdfs
                    .datanode_known_checksum
                    .clone()
                    .ok_or(CatalogError::MissingDatanodeChecksum)?;
                Arc::new(HdfsReadVerifier::new(
                    self.cluster.clone(),
                    hdfs.clone(),
                    hdfs.file_path(DATANODE_REFERENCE_FILE),
                    checksum,
                ))
            }
            VerifierKind::TeraSort => Arc::new(ApplicationVerifier::terasort(
                self.runner.clone(),
                self.cluster.clone(),
                hdfs.clone(),
            )),
            VerifierKind::SparkHdfsTest(version) => Arc::new(ApplicationVerifier::spark_hdfs_test(
                self.runner.clone(),
                version,
                hdfs,
            )),
            VerifierKind::SparkPi(version) => {
                Arc::new(ApplicationVerifier::spark_pi(self.runner.clone(), version))
            }
            VerifierKind::MapReducePi => Arc::new(ApplicationVerifier::mapreduce_pi(self.runner.clone())),
            VerifierKind::Hive => Arc::new(ApplicationVerifier::hive(self.runner.clone(), &self.config.hive)),
            VerifierKind::YarnResourceManager => {
                Arc::new(YarnResourceManagerVerifier::new(self.cluster.clone()))
            }
        })
    }

    /// Orchestrator for a cluster-managed component.
    pub fn build(&self, kind: SmokeTestKind, overrides: &RunOverrides) -> Result<Orchestrator, CatalogError> {
        let entry = kind.entry();
        let builder = TestTarget::builder(entry.component.clone())
            .process(entry.process_user, entry.matcher.clone())
            .settle_delay(entry.settle_delay)
            .verification_count(entry.verification_count);
        let target = overrides.apply(builder).build()?;

        let verifiers = entry
            .verifiers
            .iter()
            .map(|kind| self.verifier(*kind))
            .collect::<Result<VerifierSet, _>>()?;
        debug!(test = %kind, verifiers = ?verifiers, "Built verifiers");

        let locator: Option<Arc<dyn HostLocator>> = entry.pin_first_block.then(|| {
            Arc::new(FirstBlockLocator::new(
                self.cluster.clone(),
                self.config.hdfs.clone(),
                self.config.hdfs.file_path(DATANODE_REFERENCE_FILE),
            )) as Arc<dyn HostLocator>
        });
        let selector = InstanceSelector::new(Arc::new(AmbariResolver::new(self.cluster.clone())))
            .with_role_filter(target.role_filter().cloned())
            .with_locator(locator);

        let managed: Arc<dyn Disruptor> = Arc::new(ManagedDisruption::new(self.cluster.clone()));
        let disruptor = target.disruptor(managed, self.executor.clone());
        let readiness = Arc::new(AmbariReadiness::new(self.cluster.clone(), entry.component));

        Ok(Orchestrator::new(target, readiness, selector, disruptor, verifiers))
    }

    /// Orchestrator for an OS service on a fixed host list.
    pub fn build_service(&self, test: ServiceTest, overrides: &RunOverrides) -> Result<Orchestrator, CatalogError> {
        if test.hosts.is_empty() {
            return Err(CatalogError::NoServiceHosts);
        }
        if overrides.role_filter.is_some() {
            return Err(CatalogError::RoleFilterUnsupported);
        }
        let component = ComponentRef::standalone(test.service.clone());
        let mut builder = TestTarget::builder(component.clone());
        if let Some((user, matcher)) = test.process {
            builder = builder.process(user, matcher);
        }
        let target = overrides.apply(builder).build()?;

        let verifiers: VerifierSet = test
            .check_url
            .map(|url| Arc::new(HttpStatusVerifier::new(format!("{}-http", test.service), url)) as Arc<dyn Verifier>)
            .into_iter()
            .collect();

        let managed: Arc<dyn Disruptor> = Arc::new(ServiceDisruption::new(self.executor.clone(), test.service.clone()));
        let disruptor = target.disruptor(managed, self.executor.clone());
        let readiness = Arc::new(ServiceStatusReadiness::new(
            self.executor.clone(),
            test.service,
            test.hosts.clone(),
        ));
        let selector = InstanceSelector::new(Arc::new(StaticHostResolver::new(test.hosts)));

        Ok(Orchestrator::new(target, readiness, selector, disruptor, verifiers))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::{MockClusterManager, ScriptedRemoteExecutor};
    use crate::report::RunOutcome;
    use crate::target::DisruptionPlan;
    use crate::verifiers::ProcessRunner;

    fn factory(config: SmokeyConfig, cluster: Arc<MockClusterManager>) -> SmokeTestFactory {
        SmokeTestFactory::new(
            config,
            cluster,
            Arc::new(ScriptedRemoteExecutor::new()),
            Arc::new(ProcessRunner),
        )
    }

    fn config() -> SmokeyConfig {
        SmokeyConfig {
            ambari: Default::default(),
            ssh: Default::default(),
            hdfs: Default::default(),
            hive: Default::default(),
            ranger: Default::default(),
            log: crate::config::LogSettings {
                file_level: "debug".to_string(),
                log_dir: None,
            },
        }
    }

    #[test]
    fn test_names_round_trip() {
        for kind in SmokeTestKind::ALL {
            assert_eq!(kind.name().parse::<SmokeTestKind>().unwrap(), kind);
        }
        assert!("secondarynamenode".parse::<SmokeTestKind>().is_err());
    }

    #[test]
    fn test_catalog_entries() {
        let nn = SmokeTestKind::NameNode.entry();
        assert_eq!(nn.component.to_string(), "HDFS/NAMENODE");
        assert_eq!(nn.verification_count, 2);
        assert_eq!(nn.verifiers.len(), 4);

        let dn = SmokeTestKind::DataNode.entry();
        assert!(dn.pin_first_block);
        assert_eq!(dn.settle_delay, Duration::from_secs(15));

        let spark2 = SmokeTestKind::Spark2.entry();
        assert!(spark2.matcher.matches("java -cp /usr/hdp/current/spark2-historyserver org.apache.spark.deploy.history.HistoryServer"));
        let spark = SmokeTestKind::Spark.entry();
        assert!(!spark.matcher.matches("java -cp /usr/hdp/current/spark2-historyserver org.apache.spark.deploy.history.HistoryServer"));

        let zk = SmokeTestKind::ZooKeeper.entry();
        assert_eq!(zk.verification_count, 1);
        assert_eq!(zk.verifiers.len(), 6);
    }

    #[test]
    fn test_datanode_requires_known_checksum() {
        let cluster = Arc::new(MockClusterManager::new());
        let err = factory(config(), cluster)
            .build(SmokeTestKind::DataNode, &RunOverrides::default())
            .err()
            .unwrap();
        assert!(matches!(err, CatalogError::MissingDatanodeChecksum));
    }

    #[test]
    fn test_overrides_apply() {
        let cluster = Arc::new(MockClusterManager::new());
        let overrides = RunOverrides {
            disruption: DisruptionKind::Forceful,
            settle_delay: Some(Duration::from_secs(1)),
            verification_count: Some(3),
            kill_grace: Some(Duration::from_secs(45)),
            role_filter: Some(RoleFilter::Exclude("active".to_string())),
            ..Default::default()
        };
        let orchestrator = factory(config(), cluster)
            .build(SmokeTestKind::JournalNode, &overrides)
            .unwrap();
        let target = orchestrator.target();
        assert_eq!(target.settle_delay(), Duration::from_secs(1));
        assert_eq!(target.verification_count(), 3);
        assert_eq!(target.kill_grace(), Duration::from_secs(45));
        assert!(matches!(target.plan(), DisruptionPlan::Forceful { user, .. } if user == "hdfs"));
        assert_eq!(target.role_filter(), Some(&RoleFilter::Exclude("active".to_string())));
    }

    #[test]
    fn test_service_test_needs_hosts() {
        let cluster = Arc::new(MockClusterManager::new());
        let test = ServiceTest {
            service: "prometheus".to_string(),
            hosts: Vec::new(),
            process: None,
            check_url: None,
        };
        assert!(matches!(
            factory(config(), cluster).build_service(test, &RunOverrides::default()),
            Err(CatalogError::NoServiceHosts)
        ));
    }

    #[test]
    fn test_service_test_rejects_role_filter() {
        let cluster = Arc::new(MockClusterManager::new());
        let test = ServiceTest {
            service: "prometheus".to_string(),
            hosts: vec!["mon1".to_string(), "mon2".to_string()],
            process: None,
            check_url: None,
        };
        let overrides = RunOverrides {
            role_filter: Some(RoleFilter::Only("active".to_string())),
            ..Default::default()
        };
        assert!(matches!(
            factory(config(), cluster).build_service(test, &overrides),
            Err(CatalogError::RoleFilterUnsupported)
        ));
    }

    #[test]
    fn test_forceful_service_needs_process_identity() {
        let cluster = Arc::new(MockClusterManager::new());
        let test = ServiceTest {
            service: "prometheus".to_string(),
            hosts: vec!["mon1".to_string()],
            process: None,
            check_url: None,
        };
        let overrides = RunOverrides {
            disruption: DisruptionKind::Forceful,
            ..Default::default()
        };
        assert!(matches!(
            factory(config(), cluster).build_service(test, &overrides),
            Err(CatalogError::Target(_))
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_service_run_stops_and_starts() {
        let executor = Arc::new(ScriptedRemoteExecutor::new());
        let factory = SmokeTestFactory::new(
            config(),
            Arc::new(MockClusterManager::new()),
            executor.clone(),
            Arc::new(ProcessRunner),
        );
        let test = ServiceTest {
            service: "prometheus".to_string(),
            hosts: vec!["mon1".to_string()],
            process: None,
            check_url: None,
        };
        let overrides = RunOverrides {
            verification_count: Some(1),
            ..Default::default()
        };
        let report = factory
            .build_service(test, &overrides)
            .unwrap()
            .run()
            .await
            .unwrap();
        assert_eq!(report.outcome, RunOutcome::Success);

        let commands: Vec<String> = executor.commands().into_iter().map(|(_, c)| c).collect();
        assert_eq!(
            commands,
            vec![
                "sudo service prometheus status",
                "sudo service prometheus stop",
                "sudo service prometheus start",
                "sudo service prometheus status",
            ]
        );
    }
}
