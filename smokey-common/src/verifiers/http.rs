//! HTTP status probes for web UIs.

use crate::cluster::{ClusterError, ClusterManager};
use crate::types::ComponentRef;
use crate::verification::{CheckError, Verifier};
use async_trait::async_trait;
use reqwest::StatusCode;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, error, info};

pub const RESOURCEMANAGER_UI_PORT: u16 = 8088;
const PROBE_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Error)]
pub enum ProbeError {
    #[error("request to {url} failed: {message}")]
    Request { url: String, message: String },

    #[error("{url} returned HTTP {status}")]
    UnexpectedStatus { url: String, status: u16 },

    #[error("none of {count} endpoints returned HTTP 200")]
    NoHealthyEndpoint { count: usize },

    #[error("cluster manager: {0}")]
    Cluster(#[from] ClusterError),
}

impl From<ProbeError> for CheckError {
    fn from(err: ProbeError) -> Self {
        match err {
            e @ ProbeError::Request { .. } => CheckError::transport(e),
            ProbeError::Cluster(e @ ClusterError::Transport { .. }) => CheckError::transport(e),
            other => CheckError::failed(other.to_string()),
        }
    }
}

fn http_client(timeout: Duration) -> Result<reqwest::Client, ProbeError> {
    reqwest::Client::builder()
        .timeout(timeout)
        .danger_accept_invalid_certs(true)
        .build()
        .map_err(|e| ProbeError::Request {
            url: String::new(),
            message: e.to_string(),
        })
}

async fn probe(client: &reqwest::Client, url: &str) -> Result<(), ProbeError> {
    let response = client.get(url).send().await.map_err(|e| ProbeError::Request {
        url: url.to_string(),
        message: e.to_string(),
    })?;
    match response.status() {
        StatusCode::OK => Ok(()),
        status => Err(ProbeError::UnexpectedStatus {
            url: url.to_string(),
            status: status.as_u16(),
        }),
    }
}

/// Passes when a single URL answers HTTP 200.
pub struct HttpStatusVerifier {
    name: String,
    url: String,
    timeout: Duration,
}

impl HttpStatusVerifier {
    pub fn new(name: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            url: url.into(),
            timeout: PROBE_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

#[async_trait]
impl Verifier for HttpStatusVerifier {
    fn name(&self) -> &str {
        &self.name
    }

    async fn verify(&self) -> Result<(), CheckError> {
        info!(url = %self.url, "Verify HTTP status");
        let client = http_client(self.timeout)?;
        probe(&client, &self.url).await?;
        Ok(())
    }
}

/// Passes when at least one ResourceManager web UI answers HTTP 200. During a
/// failover only one of them is expected to.
pub struct YarnResourceManagerVerifier {
    cluster: Arc<dyn ClusterManager>,
    port: u16,
    timeout: Duration,
}

impl YarnResourceManagerVerifier {
    pub fn new(cluster: Arc<dyn ClusterManager>) -> Self {
        Self {
            cluster,
            port: RESOURCEMANAGER_UI_PORT,
            timeout: PROBE_TIMEOUT,
        }
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    async fn check(&self) -> Result<(), ProbeError> {
        let instances = self
            .cluster
            .list_instances(&ComponentRef::new("YARN", "RESOURCEMANAGER"))
            .await?;
        let urls: Vec<String> = instances
            .iter()
            .map(|i| format!("http://{}:{}", i.host, self.port))
            .collect();
        debug!(count = urls.len(), "Checking ResourceManager UIs");

        let client = http_client(self.timeout)?;
        for (n, url) in urls.iter().enumerate() {
            match probe(&client, url).await {
                Ok(()) => {
                    debug!(%url, "ResourceManager UI answered 200");
                    return Ok(());
                }
                Err(e) => debug!(index = n + 1, %url, error = %e, "ResourceManager UI not healthy"),
            }
        }
        error!(count = urls.len(), "No ResourceManager UI returned HTTP 200");
        Err(ProbeError::NoHealthyEndpoint { count: urls.len() })
    }
}

#[async_trait]
impl Verifier for YarnResourceManagerVerifier {
    fn name(&self) -> &str {
        "yarn-resourcemanager"
    }

    async fn verify(&self) -> Result<(), CheckError> {
        info!("Verify YARN ResourceManager status");
        Ok(self.check().await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockClusterManager;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn test_http_status_verifier() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/broken"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        HttpStatusVerifier::new("ranger-ui", format!("{}/", server.uri()))
            .verify()
            .await
            .unwrap();
        let err = HttpStatusVerifier::new("ranger-ui", format!("{}/broken", server.uri()))
            .verify()
            .await
            .unwrap_err();
        assert!(matches!(err, CheckError::Verification(_)));
    }

    #[tokio::test]
    async fn test_unreachable_url_is_transport() {
        let server = MockServer::start().await;
        let url = server.uri();
        drop(server);
        let err = HttpStatusVerifier::new("ui", url)
            .with_timeout(Duration::from_millis(500))
            .verify()
            .await
            .unwrap_err();
        assert!(err.is_transport());
    }

    fn resourcemanagers() -> Arc<MockClusterManager> {
        let rm = ComponentRef::new("YARN", "RESOURCEMANAGER");
        Arc::new(MockClusterManager::new().with_instances(&rm, &["127.0.0.1", "localhost"]))
    }

    #[tokio::test]
    async fn test_any_resourcemanager_answering_passes() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;
        YarnResourceManagerVerifier::new(resourcemanagers())
            .with_port(server.address().port())
            .verify()
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_no_resourcemanager_answering_fails() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;
        let err = YarnResourceManagerVerifier::new(resourcemanagers())
            .with_port(server.address().port())
            .verify()
            .await
            .unwrap_err();
        assert!(matches!(err, CheckError::Verification(_)));
    }
}
