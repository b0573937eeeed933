//! WebHDFS client and the filesystem verifiers built on it.

use crate::cluster::{ClusterError, ClusterManager};
use crate::config::HdfsConfig;
use crate::resolver::{HostLocator, SelectionError};
use crate::types::InstanceLocation;
use crate::verification::{CheckError, Verifier};
use async_trait::async_trait;
use regex::Regex;
use reqwest::header::LOCATION;
use reqwest::{Method, StatusCode, redirect};
use serde::Deserialize;
use sha2::{Digest, Sha256};
use std::net::{IpAddr, Ipv4Addr};
use std::sync::{Arc, LazyLock};
use thiserror::Error;
use tracing::{debug, info, warn};

#[derive(Debug, Error)]
pub enum HdfsError {
    #[error("{op} {url} returned HTTP {status}: {body}")]
    Status {
        op: String,
        url: String,
        status: u16,
        body: String,
    },

    #[error("request to {url} failed: {message}")]
    Transport { url: String, message: String },

    #[error("{op} answered without a redirect location")]
    MissingRedirect { op: String },

    #[error("no block information for {file}")]
    NoBlockInfo { file: String },

    #[error("no block location in '{0}'")]
    NoBlockLocation(String),

    #[error("no active NameNode")]
    NoActiveNameNode,

    #[error("cluster manager: {0}")]
    Cluster(#[from] ClusterError),
}

impl HdfsError {
    /// Whether the filesystem could not be reached at all, as opposed to
    /// answering in a way that shows it is broken.
    pub fn is_transport(&self) -> bool {
        match self {
            Self::Transport { .. } => true,
            Self::Cluster(e) => matches!(e, ClusterError::Transport { .. }),
            _ => false,
        }
    }
}

impl From<HdfsError> for CheckError {
    fn from(err: HdfsError) -> Self {
        if err.is_transport() {
            CheckError::transport(err)
        } else {
            CheckError::failed(err.to_string())
        }
    }
}

#[derive(Debug, Deserialize)]
struct BooleanResponse {
    boolean: bool,
}

// ============================================================================
// Client
// ============================================================================

/// Minimal WebHDFS client against one NameNode. Redirects to DataNodes are
/// followed explicitly so both legs of a write carry the payload.
pub struct WebHdfsClient {
    http: reqwest::Client,
    base_url: String,
}

impl WebHdfsClient {
    pub fn new(base_url: impl Into<String>, config: &HdfsConfig) -> Result<Self, HdfsError> {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        let http = reqwest::Client::builder()
            .redirect(redirect::Policy::none())
            .danger_accept_invalid_certs(true)
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| HdfsError::Transport {
                url: base_url.clone(),
                message: e.to_string(),
            })?;
        Ok(Self { http, base_url })
    }

    /// Client for the NameNode on `host`, using the configured schema and port.
    pub fn for_namenode(host: &str, config: &HdfsConfig) -> Result<Self, HdfsError> {
        Self::new(format!("{}://{}:{}", config.schema, host, config.port), config)
    }

    /// Client for the currently active NameNode.
    pub async fn for_active_namenode(
        cluster: &dyn ClusterManager,
        config: &HdfsConfig,
    ) -> Result<Self, HdfsError> {
        let host = cluster
            .active_namenode_host()
            .await?
            .ok_or(HdfsError::NoActiveNameNode)?;
        debug!(%host, "Using active NameNode");
        Self::for_namenode(&host, config)
    }

    fn op_url(&self, path: &str, op: &str, extra: &str) -> String {
        format!("{}/webhdfs/v1{}?op={}{}", self.base_url, path, op, extra)
    }

    async fn send(
        &self,
        method: Method,
        url: &str,
        op: &str,
        body: Option<Vec<u8>>,
    ) -> Result<reqwest::Response, HdfsError> {
        let mut request = self.http.request(method, url);
        if let Some(body) = body {
            request = request.body(body);
        }
        let response = request.send().await.map_err(|e| HdfsError::Transport {
            url: url.to_string(),
            message: e.to_string(),
        })?;
        let status = response.status();
        if status.is_client_error() || status.is_server_error() {
            let body = response.text().await.unwrap_or_default();
            return Err(HdfsError::Status {
                op: op.to_string(),
                url: url.to_string(),
                status: status.as_u16(),
                body,
            });
        }
        Ok(response)
    }

    async fn redirect_target(&self, method: Method, url: &str, op: &str) -> Result<Option<String>, HdfsError> {
        let response = self.send(method, url, op, None).await?;
        if response.status() != StatusCode::TEMPORARY_REDIRECT {
            return Ok(None);
        }
        let location = response
            .headers()
            .get(LOCATION)
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| HdfsError::MissingRedirect { op: op.to_string() })?;
        Ok(Some(location.to_string()))
    }

    /// Write `data` to `path`, replacing any existing file.
    pub async fn create(&self, path: &str, data: Vec<u8>) -> Result<(), HdfsError> {
        info!(%path, bytes = data.len(), "Writing HDFS file");
        let url = self.op_url(path, "CREATE", "&overwrite=true");
        let location = self
            .redirect_target(Method::PUT, &url, "CREATE")
            .await?
            .ok_or_else(|| HdfsError::MissingRedirect {
                op: "CREATE".to_string(),
            })?;
        self.send(Method::PUT, &location, "CREATE", Some(data)).await?;
        Ok(())
    }

    /// Read the full contents of `path`.
    pub async fn open(&self, path: &str) -> Result<Vec<u8>, HdfsError> {
        info!(%path, "Reading HDFS file");
        let url = self.op_url(path, "OPEN", "");
        let target = self
            .redirect_target(Method::GET, &url, "OPEN")
            .await?
            .unwrap_or(url);
        let response = self.send(Method::GET, &target, "OPEN", None).await?;
        let bytes = response.bytes().await.map_err(|e| HdfsError::Transport {
            url: target.clone(),
            message: e.to_string(),
        })?;
        Ok(bytes.to_vec())
    }

    /// Delete `path`. Returns whether anything was deleted.
    pub async fn delete(&self, path: &str, recursive: bool) -> Result<bool, HdfsError> {
        info!(%path, recursive, "Deleting HDFS path");
        let url = self.op_url(path, "DELETE", &format!("&recursive={}", recursive));
        let response = self.send(Method::DELETE, &url, "DELETE", None).await?;
        let text = response.text().await.map_err(|e| HdfsError::Transport {
            url: url.clone(),
            message: e.to_string(),
        })?;
        Ok(serde_json::from_str::<BooleanResponse>(&text)
            .map(|r| r.boolean)
            .unwrap_or(false))
    }

    /// NameNode fsck report for `path` with rack information.
    pub async fn fsck(&self, path: &str) -> Result<String, HdfsError> {
        let url = format!(
            "{}/fsck?files=0&racks=1&blocks=0&path={}",
            self.base_url, path
        );
        let response = self.send(Method::GET, &url, "FSCK", None).await?;
        response.text().await.map_err(|e| HdfsError::Transport {
            url,
            message: e.to_string(),
        })
    }
}

// ============================================================================
// Payload and fsck parsing
// ============================================================================

/// Lowercase hex SHA-256.
pub fn sha256_hex(data: &[u8]) -> String {
    Sha256::digest(data)
        .iter()
        .map(|b| format!("{:02x}", b))
        .collect()
}

/// `size_mb` MiB of zeros followed by a single `1` byte.
pub fn smoketest_payload(size_mb: u64) -> Vec<u8> {
    let len = usize::try_from(size_mb.saturating_mul(1024 * 1024)).unwrap_or(usize::MAX - 1);
    let mut data = vec![0u8; len];
    data.push(b'1');
    data
}

/// The line following the report line for `file`, which describes its first block.
pub fn first_block_info(file: &str, report: &str) -> Result<String, HdfsError> {
    let pattern = format!(r"(?m)^{}.*\n(.*)\n", regex::escape(file));
    let regex = Regex::new(&pattern).map_err(|_| HdfsError::NoBlockInfo {
        file: file.to_string(),
    })?;
    regex
        .captures(report)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_string())
        .ok_or_else(|| HdfsError::NoBlockInfo {
            file: file.to_string(),
        })
}

static REPLICA_ADDRESS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(\d{1,3}\.\d{1,3}\.\d{1,3}\.\d{1,3}):").expect("replica address regex is valid")
});

/// First replica address (`a.b.c.d:port`) in a block line. Addresses embedded
/// in the block pool id (`BP-..-a.b.c.d-..`) are skipped.
pub fn first_block_address(block_info: &str) -> Result<Ipv4Addr, HdfsError> {
    REPLICA_ADDRESS
        .captures_iter(block_info)
        .filter_map(|c| c.get(1))
        .filter(|m| m.start() == 0 || block_info.as_bytes()[m.start() - 1] != b'-')
        .find_map(|m| m.as_str().parse().ok())
        .ok_or_else(|| HdfsError::NoBlockLocation(block_info.to_string()))
}

// ============================================================================
// Verifiers
// ============================================================================

/// Writes a generated file through the active NameNode, reads it back and
/// compares checksums. The file is always deleted afterwards.
pub struct HdfsWriteVerifier {
    cluster: Arc<dyn ClusterManager>,
    config: HdfsConfig,
    path: String,
}

impl HdfsWriteVerifier {
    pub fn new(cluster: Arc<dyn ClusterManager>, config: HdfsConfig, file_name: &str) -> Self {
        let path = config.file_path(file_name);
        Self {
            cluster,
            config,
            path,
        }
    }

    async fn round_trip(&self, client: &WebHdfsClient, checksum: &str) -> Result<(), CheckError> {
        let payload = smoketest_payload(self.config.file_size_mb);
        client.create(&self.path, payload).await?;
        let remote = sha256_hex(&client.open(&self.path).await?);
        if remote != checksum {
            return Err(CheckError::failed(format!(
                "local checksum {} did not match remote checksum {} for file {}",
                checksum, remote, self.path
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl Verifier for HdfsWriteVerifier {
    fn name(&self) -> &str {
        "hdfs-write"
    }

    async fn verify(&self) -> Result<(), CheckError> {
        info!("Verify HDFS by writing a file and comparing checksums");
        let client = WebHdfsClient::for_active_namenode(self.cluster.as_ref(), &self.config).await?;
        let checksum = sha256_hex(&smoketest_payload(self.config.file_size_mb));
        let result = self.round_trip(&client, &checksum).await;
        if let Err(e) = client.delete(&self.path, false).await {
            warn!(path = %self.path, error = %e, "Failed to clean up verifier file");
        }
        result
    }
}

/// Reads a reference file and compares it to its known checksum.
pub struct HdfsReadVerifier {
    cluster: Arc<dyn ClusterManager>,
    config: HdfsConfig,
    path: String,
    known_checksum: String,
}

impl HdfsReadVerifier {
    pub fn new(
        cluster: Arc<dyn ClusterManager>,
        config: HdfsConfig,
        path: impl Into<String>,
        known_checksum: impl Into<String>,
    ) -> Self {
        Self {
            cluster,
            config,
            path: path.into(),
            known_checksum: known_checksum.into().to_ascii_lowercase(),
        }
    }
}

#[async_trait]
impl Verifier for HdfsReadVerifier {
    fn name(&self) -> &str {
        "hdfs-read"
    }

    async fn verify(&self) -> Result<(), CheckError> {
        info!("Verify HDFS by reading a file with a known checksum");
        let client = WebHdfsClient::for_active_namenode(self.cluster.as_ref(), &self.config).await?;
        let remote = sha256_hex(&client.open(&self.path).await?);
        if remote != self.known_checksum {
            return Err(CheckError::failed(format!(
                "known checksum {} did not match remote checksum {} for file {}",
                self.known_checksum, remote, self.path
            )));
        }
        Ok(())
    }
}

/// Pins selection to the DataNode holding the first replica of the first block
/// of a reference file.
pub struct FirstBlockLocator {
    cluster: Arc<dyn ClusterManager>,
    config: HdfsConfig,
    path: String,
}

impl FirstBlockLocator {
    pub fn new(cluster: Arc<dyn ClusterManager>, config: HdfsConfig, path: impl Into<String>) -> Self {
        Self {
            cluster,
            config,
            path: path.into(),
        }
    }

    async fn block_address(&self) -> Result<Ipv4Addr, HdfsError> {
        let client = WebHdfsClient::for_active_namenode(self.cluster.as_ref(), &self.config).await?;
        let report = client.fsck(&self.path).await?;
        let block = first_block_info(&self.path, &report)?;
        first_block_address(&block)
    }
}

async fn resolves_to(host: &str, address: Ipv4Addr) -> bool {
    match tokio::net::lookup_host((host, 0)).await {
        Ok(mut addrs) => addrs.any(|a| a.ip() == IpAddr::V4(address)),
        Err(e) => {
            debug!(%host, error = %e, "Could not resolve host");
            false
        }
    }
}

#[async_trait]
impl HostLocator for FirstBlockLocator {
    async fn locate(
        &self,
        candidates: &[InstanceLocation],
    ) -> Result<InstanceLocation, SelectionError> {
        let address = self
            .block_address()
            .await
            .map_err(|e| SelectionError::Locator(e.to_string()))?;
        info!(file = %self.path, %address, "First block location");
        for candidate in candidates {
            if resolves_to(&candidate.host, address).await {
                return Ok(candidate.clone());
            }
        }
        Err(SelectionError::Locator(format!(
            "no candidate instance resolves to {}",
            address
        )))
    }
}
