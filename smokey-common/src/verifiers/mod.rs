//! Concrete verification units for Hadoop services.

pub mod application;
pub mod hdfs;
pub mod http;

pub use application::{
    Application, ApplicationCommand, ApplicationError, ApplicationOutput, ApplicationRunner, ApplicationVerifier,
    OutputCheck, ProcessRunner, SparkVersion,
};
pub use hdfs::{FirstBlockLocator, HdfsError, HdfsReadVerifier, HdfsWriteVerifier, WebHdfsClient};
pub use http::{HttpStatusVerifier, ProbeError, YarnResourceManagerVerifier};
