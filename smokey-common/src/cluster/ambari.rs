//! Ambari REST client.

use super::{ClusterError, ClusterManager, HaStates, StateChange};
use crate::config::AmbariConfig;
use crate::types::{ComponentRef, ComponentState, HostState, InstanceLocation};
use async_trait::async_trait;
use reqwest::header::{CONTENT_TYPE, COOKIE, HeaderMap, HeaderName, HeaderValue, SET_COOKIE};
use reqwest::{Method, Response};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use std::time::Duration;
use tokio::sync::OnceCell;
use tracing::{debug, error, info, warn};

const API_BASE: &str = "api/v1/clusters";
const SESSION_COOKIE: &str = "AMBARISESSIONID";

// ============================================================================
// Wire models
// ============================================================================

#[derive(Debug, Deserialize)]
struct ComponentInfo {
    #[serde(default)]
    host_components: Vec<HostComponent>,
}

#[derive(Debug, Deserialize)]
struct HostComponent {
    href: String,
    #[serde(rename = "HostRoles")]
    host_roles: HostRoles,
}

#[derive(Debug, Deserialize)]
struct HostRoles {
    host_name: String,
    #[serde(default)]
    ha_state: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ComponentStateResponse {
    #[serde(rename = "ServiceComponentInfo")]
    info: ComponentState,
}

#[derive(Debug, Deserialize)]
struct NameNodeMetrics {
    #[serde(rename = "HostRoles")]
    host_roles: HostRoles,
    #[serde(default)]
    metrics: Option<Metrics>,
}

#[derive(Debug, Deserialize)]
struct Metrics {
    dfs: Option<DfsMetrics>,
}

#[derive(Debug, Deserialize)]
struct DfsMetrics {
    #[serde(rename = "FSNamesystem")]
    fs_namesystem: Option<FsNamesystem>,
}

#[derive(Debug, Deserialize)]
struct FsNamesystem {
    #[serde(rename = "HAState")]
    ha_state: Option<String>,
}

impl NameNodeMetrics {
    fn ha_state(self) -> Option<String> {
        self.metrics?.dfs?.fs_namesystem?.ha_state
    }
}

#[derive(Debug, Deserialize)]
struct RequestProgress {
    #[serde(rename = "Requests")]
    requests: RequestStatus,
}

#[derive(Debug, Deserialize)]
struct RequestStatus {
    request_status: String,
    #[serde(default)]
    progress_percent: f64,
}

/// Encode a request body the way Ambari's state-change endpoint expects it:
/// JSON, then JSON-encoded again as a string.
pub fn encode_escaped_json(value: &serde_json::Value) -> Result<String, serde_json::Error> {
    serde_json::to_string(&serde_json::to_string(value)?)
}

/// Extract the session id from one `Set-Cookie` header value.
pub fn session_id_from_set_cookie(header: &str) -> Option<&str> {
    header
        .split(';')
        .next()?
        .trim()
        .strip_prefix(SESSION_COOKIE)?
        .strip_prefix('=')
        .filter(|id| !id.is_empty())
}

fn is_terminal_failure(status: &str) -> bool {
    matches!(status, "FAILED" | "ABORTED" | "TIMEDOUT")
}

// ============================================================================
// Client
// ============================================================================

/// Session-holding Ambari client.
///
/// Authenticates on first use and reuses the session cookie for every later
/// call. TLS certificates are not verified.
pub struct AmbariClient {
    http: reqwest::Client,
    config: AmbariConfig,
    session: OnceCell<String>,
}

impl AmbariClient {
    pub fn new(config: AmbariConfig) -> Result<Self, ClusterError> {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers.insert(
            HeaderName::from_static("x-requested-by"),
            HeaderValue::from_static("smoketest"),
        );
        let http = reqwest::Client::builder()
            .default_headers(headers)
            .danger_accept_invalid_certs(true)
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| ClusterError::Transport {
                url: config.base_url.clone(),
                message: e.to_string(),
            })?;
        Ok(Self {
            http,
            config,
            session: OnceCell::new(),
        })
    }

    pub fn config(&self) -> &AmbariConfig {
        &self.config
    }

    /// Absolute URL for `path`. Hrefs returned by Ambari are already absolute.
    pub fn url(&self, path: &str) -> String {
        if path.starts_with("http") {
            path.to_string()
        } else {
            format!(
                "{}/{}/{}",
                self.config.base_url.trim_end_matches('/'),
                API_BASE,
                path
            )
        }
    }

    fn component_path(&self, component: &ComponentRef) -> String {
        format!(
            "{}/services/{}/components/{}",
            self.config.cluster,
            component.service_name(),
            component.component
        )
    }

    async fn session_id(&self) -> Result<&str, ClusterError> {
        self.session
            .get_or_try_init(|| self.login())
            .await
            .map(String::as_str)
    }

    async fn login(&self) -> Result<String, ClusterError> {
        let url = self.url("");
        debug!(%url, user = %self.config.user, "Opening Ambari session");
        let response = self
            .http
            .get(&url)
            .basic_auth(&self.config.user, Some(&self.config.password))
            .send()
            .await
            .map_err(|e| transport(&url, e))?;
        let session = response
            .headers()
            .get_all(SET_COOKIE)
            .iter()
            .filter_map(|value| value.to_str().ok())
            .find_map(session_id_from_set_cookie)
            .map(str::to_string);
        check_status(Method::GET, &url, response).await?;
        session.ok_or_else(|| ClusterError::Decode {
            url,
            message: format!("no {} cookie in login response", SESSION_COOKIE),
        })
    }

    /// Issue a request and return the body of a successful response.
    async fn send(
        &self,
        method: Method,
        path: &str,
        body: Option<String>,
    ) -> Result<String, ClusterError> {
        let session = self.session_id().await?;
        let url = self.url(path);
        info!(%method, %path, "Calling Ambari API");
        let mut request = self
            .http
            .request(method.clone(), &url)
            .header(COOKIE, format!("{}={}", SESSION_COOKIE, session));
        if let Some(body) = body {
            debug!(%body, "Request body");
            request = request.body(body);
        }
        let response = request.send().await.map_err(|e| transport(&url, e))?;
        check_status(method, &url, response).await
    }

    /// GET `path` and decode the JSON body.
    pub async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T, ClusterError> {
        let body = self.send(Method::GET, path, None).await?;
        serde_json::from_str(&body).map_err(|e| ClusterError::Decode {
            url: self.url(path),
            message: e.to_string(),
        })
    }

    async fn component_info(&self, component: &ComponentRef) -> Result<ComponentInfo, ClusterError> {
        info!(%component, "Getting component info");
        self.get_json(&format!(
            "{}?fields=host_components",
            self.component_path(component)
        ))
        .await
    }

    async fn namenode_ha_states(&self, component: &ComponentRef) -> Result<HaStates, ClusterError> {
        let info = self.component_info(component).await?;
        let mut states = HaStates::new();
        for host_component in info.host_components {
            let metrics: NameNodeMetrics = self
                .get_json(&format!(
                    "{}?fields=metrics/dfs/FSNamesystem/HAState",
                    host_component.href
                ))
                .await?;
            let host = metrics.host_roles.host_name.clone();
            if let Some(state) = metrics.ha_state() {
                states.insert(host, state);
            }
        }
        Ok(states)
    }

    async fn wait_for_request(&self, href: &str, timeout: Duration) -> Result<(), ClusterError> {
        let poll = async {
            loop {
                let progress: RequestProgress = self.get_json(href).await?;
                let status = progress.requests;
                if status.request_status == "COMPLETED" {
                    info!(%href, "Finished waiting for completion");
                    return Ok(());
                }
                if is_terminal_failure(&status.request_status) {
                    return Err(ClusterError::RequestFailed {
                        href: href.to_string(),
                        status: status.request_status,
                    });
                }
                info!(
                    progress = status.progress_percent,
                    status = %status.request_status,
                    "Waiting for completion"
                );
                tokio::time::sleep(self.config.poll_interval).await;
            }
        };
        match tokio::time::timeout(timeout, poll).await {
            Ok(result) => result,
            Err(_) => {
                error!(%href, ?timeout, "Timeout waiting for request completion");
                Err(ClusterError::Timeout {
                    href: href.to_string(),
                    timeout,
                })
            }
        }
    }
}

fn transport(url: &str, err: reqwest::Error) -> ClusterError {
    ClusterError::Transport {
        url: url.to_string(),
        message: err.to_string(),
    }
}

async fn check_status(method: Method, url: &str, response: Response) -> Result<String, ClusterError> {
    let status = response.status();
    let body = response.text().await.map_err(|e| transport(url, e))?;
    debug!(%url, status = status.as_u16(), %body, "Ambari response");
    if status.as_u16() >= 400 {
        error!(%url, status = status.as_u16(), %body, "Ambari returned error status");
        return Err(ClusterError::Status {
            method: method.to_string(),
            url: url.to_string(),
            status: status.as_u16(),
            body,
        });
    }
    Ok(body)
}

#[async_trait]
impl ClusterManager for AmbariClient {
    async fn component_state(&self, component: &ComponentRef) -> Result<ComponentState, ClusterError> {
        info!(%component, "Getting component state");
        let response: ComponentStateResponse = self
            .get_json(&format!(
                "{}?fields=ServiceComponentInfo/total_count,ServiceComponentInfo/started_count,ServiceComponentInfo/state",
                self.component_path(component)
            ))
            .await?;
        debug!(
            state = %response.info.state,
            started = response.info.started_count,
            total = response.info.total_count,
            "Component state"
        );
        Ok(response.info)
    }

    async fn list_instances(
        &self,
        component: &ComponentRef,
    ) -> Result<Vec<InstanceLocation>, ClusterError> {
        let info = self.component_info(component).await?;
        Ok(info
            .host_components
            .into_iter()
            .map(|hc| InstanceLocation::new(hc.host_roles.host_name, hc.href))
            .collect())
    }

    async fn ha_states(&self, component: &ComponentRef) -> Result<HaStates, ClusterError> {
        if component.service_name() == "HDFS" && component.component == "NAMENODE" {
            return self.namenode_ha_states(component).await;
        }
        let info: ComponentInfo = self
            .get_json(&format!(
                "{}?fields=host_components/HostRoles/ha_state",
                self.component_path(component)
            ))
            .await?;
        Ok(info
            .host_components
            .into_iter()
            .filter_map(|hc| {
                let role = hc.host_roles.ha_state?;
                Some((hc.host_roles.host_name, role))
            })
            .collect())
    }

    async fn change_state_and_wait(
        &self,
        instance: &InstanceLocation,
        state: HostState,
        timeout: Option<Duration>,
    ) -> Result<StateChange, ClusterError> {
        let timeout = timeout.unwrap_or(self.config.polling_timeout);
        info!(path = %instance.path, %state, "Change state");
        let data = serde_json::json!({
            "RequestInfo": {
                "context": format!("Change state of {} via smokey (REST)", instance.path)
            },
            "Body": { "HostRoles": { "state": state.as_str() } }
        });
        let body = encode_escaped_json(&data).map_err(|e| ClusterError::Decode {
            url: self.url(&instance.path),
            message: e.to_string(),
        })?;
        let response = self.send(Method::PUT, &instance.path, Some(body)).await?;

        match serde_json::from_str::<serde_json::Value>(&response) {
            Ok(tracked) => {
                let href = tracked
                    .get("href")
                    .and_then(serde_json::Value::as_str)
                    .ok_or_else(|| ClusterError::Decode {
                        url: self.url(&instance.path),
                        message: format!("state change response has no request href: {}", tracked),
                    })?;
                self.wait_for_request(href, timeout).await?;
                Ok(StateChange::Converged)
            }
            Err(_) => {
                warn!(
                    path = %instance.path,
                    %state,
                    "State change accepted without a trackable request; assuming component already in target state"
                );
                Ok(StateChange::AlreadyInState)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{basic_auth, body_string_contains, header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    async fn client_for(server: &MockServer) -> AmbariClient {
        Mock::given(method("GET"))
            .and(path("/api/v1/clusters/"))
            .and(basic_auth("raj_ops", "raj_ops"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("set-cookie", "AMBARISESSIONID=s3ss10n; Path=/; HttpOnly"),
            )
            .expect(1)
            .mount(server)
            .await;

        AmbariClient::new(AmbariConfig {
            base_url: server.uri(),
            poll_interval: Duration::from_millis(10),
            ..AmbariConfig::default()
        })
        .unwrap()
    }

    fn nn() -> ComponentRef {
        ComponentRef::new("HDFS", "NAMENODE")
    }

    #[test]
    fn test_encode_escaped_json_is_double_encoded() {
        let value = serde_json::json!({"Body": {"HostRoles": {"state": "STARTED"}}});
        let encoded = encode_escaped_json(&value).unwrap();
        assert!(encoded.starts_with('"'));
        let once: String = serde_json::from_str(&encoded).unwrap();
        let twice: serde_json::Value = serde_json::from_str(&once).unwrap();
        assert_eq!(twice, value);
    }

    #[test]
    fn test_session_id_from_set_cookie() {
        assert_eq!(
            session_id_from_set_cookie("AMBARISESSIONID=abc123; Path=/; HttpOnly"),
            Some("abc123")
        );
        assert_eq!(session_id_from_set_cookie("JSESSIONID=abc"), None);
        assert_eq!(session_id_from_set_cookie("AMBARISESSIONID=; Path=/"), None);
    }

    #[test]
    fn test_url_resolution() {
        let client = AmbariClient::new(AmbariConfig::default()).unwrap();
        assert_eq!(
            client.url("Sandbox/services/HDFS"),
            "http://sandbox:8080/api/v1/clusters/Sandbox/services/HDFS"
        );
        assert_eq!(
            client.url("http://other:8080/api/v1/x"),
            "http://other:8080/api/v1/x"
        );
    }

    #[tokio::test]
    async fn test_component_state_reuses_session() {
        let server = MockServer::start().await;
        let client = client_for(&server).await;

        Mock::given(method("GET"))
            .and(path("/api/v1/clusters/Sandbox/services/HDFS/components/NAMENODE"))
            .and(header("cookie", "AMBARISESSIONID=s3ss10n"))
            .and(header("x-requested-by", "smoketest"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "ServiceComponentInfo": {
                    "total_count": 2,
                    "started_count": 2,
                    "state": "STARTED"
                }
            })))
            .expect(2)
            .mount(&server)
            .await;

        let first = client.component_state(&nn()).await.unwrap();
        assert!(first.all_started());
        let second = client.component_state(&nn()).await.unwrap();
        assert_eq!(second.total_count, 2);
    }

    #[tokio::test]
    async fn test_error_status_is_reported() {
        let server = MockServer::start().await;
        let client = client_for(&server).await;

        Mock::given(method("GET"))
            .and(path("/api/v1/clusters/Sandbox/services/HDFS/components/NAMENODE"))
            .respond_with(ResponseTemplate::new(404).set_body_string("{\"status\": 404}"))
            .mount(&server)
            .await;

        let err = client.component_state(&nn()).await.unwrap_err();
        assert!(matches!(err, ClusterError::Status { status: 404, .. }));
    }

    #[tokio::test]
    async fn test_list_instances() {
        let server = MockServer::start().await;
        let client = client_for(&server).await;

        Mock::given(method("GET"))
            .and(path("/api/v1/clusters/Sandbox/services/HDFS/components/NAMENODE"))
            .and(query_param("fields", "host_components"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "host_components": [
                    {"href": "http://a/nn1", "HostRoles": {"host_name": "nn1"}},
                    {"href": "http://a/nn2", "HostRoles": {"host_name": "nn2"}}
                ]
            })))
            .mount(&server)
            .await;

        let instances = client.list_instances(&nn()).await.unwrap();
        assert_eq!(
            instances,
            vec![
                InstanceLocation::new("nn1", "http://a/nn1"),
                InstanceLocation::new("nn2", "http://a/nn2"),
            ]
        );
    }

    #[tokio::test]
    async fn test_generic_ha_states() {
        let server = MockServer::start().await;
        let client = client_for(&server).await;
        let rm = ComponentRef::new("YARN", "RESOURCEMANAGER");

        Mock::given(method("GET"))
            .and(path("/api/v1/clusters/Sandbox/services/YARN/components/RESOURCEMANAGER"))
            .and(query_param("fields", "host_components/HostRoles/ha_state"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "host_components": [
                    {"href": "http://a/rm1", "HostRoles": {"host_name": "rm1", "ha_state": "ACTIVE"}},
                    {"href": "http://a/rm2", "HostRoles": {"host_name": "rm2", "ha_state": "STANDBY"}},
                    {"href": "http://a/rm3", "HostRoles": {"host_name": "rm3"}}
                ]
            })))
            .mount(&server)
            .await;

        let states = client.ha_states(&rm).await.unwrap();
        assert_eq!(states.len(), 2);
        assert_eq!(states["rm2"], "STANDBY");
    }

    #[tokio::test]
    async fn test_namenode_ha_states_from_metrics() {
        let server = MockServer::start().await;
        let client = client_for(&server).await;
        let uri = server.uri();

        Mock::given(method("GET"))
            .and(path("/api/v1/clusters/Sandbox/services/HDFS/components/NAMENODE"))
            .and(query_param("fields", "host_components"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "host_components": [
                    {"href": format!("{}/hc/nn1", uri), "HostRoles": {"host_name": "nn1"}},
                    {"href": format!("{}/hc/nn2", uri), "HostRoles": {"host_name": "nn2"}}
                ]
            })))
            .mount(&server)
            .await;
        for (host, state) in [("nn1", "standby"), ("nn2", "active")] {
            Mock::given(method("GET"))
                .and(path(format!("/hc/{}", host)))
                .and(query_param("fields", "metrics/dfs/FSNamesystem/HAState"))
                .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                    "HostRoles": {"host_name": host},
                    "metrics": {"dfs": {"FSNamesystem": {"HAState": state}}}
                })))
                .mount(&server)
                .await;
        }

        assert_eq!(
            client.active_namenode_host().await.unwrap().as_deref(),
            Some("nn2")
        );
    }

    #[tokio::test]
    async fn test_change_state_polls_until_completed() {
        let server = MockServer::start().await;
        let client = client_for(&server).await;
        let instance = InstanceLocation::new("nn1", format!("{}/hc/nn1", server.uri()));

        Mock::given(method("PUT"))
            .and(path("/hc/nn1"))
            .and(body_string_contains("\\\"state\\\":\\\"INSTALLED\\\""))
            .respond_with(ResponseTemplate::new(202).set_body_json(serde_json::json!({
                "href": format!("{}/requests/7", server.uri()),
                "Requests": {"id": 7, "status": "Accepted"}
            })))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/requests/7"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "Requests": {"request_status": "IN_PROGRESS", "progress_percent": 40.0}
            })))
            .up_to_n_times(2)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/requests/7"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "Requests": {"request_status": "COMPLETED", "progress_percent": 100.0}
            })))
            .mount(&server)
            .await;

        let result = client
            .change_state_and_wait(&instance, HostState::Installed, None)
            .await
            .unwrap();
        assert_eq!(result, StateChange::Converged);
    }

    #[tokio::test]
    async fn test_empty_success_body_means_already_in_state() {
        let server = MockServer::start().await;
        let client = client_for(&server).await;
        let instance = InstanceLocation::new("nn1", format!("{}/hc/nn1", server.uri()));

        Mock::given(method("PUT"))
            .and(path("/hc/nn1"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;

        let result = client
            .change_state_and_wait(&instance, HostState::Installed, None)
            .await
            .unwrap();
        assert_eq!(result, StateChange::AlreadyInState);
    }

    #[tokio::test]
    async fn test_json_body_without_href_is_decode_error() {
        let server = MockServer::start().await;
        let client = client_for(&server).await;
        let instance = InstanceLocation::new("nn1", format!("{}/hc/nn1", server.uri()));

        Mock::given(method("PUT"))
            .and(path("/hc/nn1"))
            .respond_with(ResponseTemplate::new(202).set_body_json(serde_json::json!({
                "Requests": {"id": 8, "status": "Accepted"}
            })))
            .mount(&server)
            .await;

        let err = client
            .change_state_and_wait(&instance, HostState::Installed, None)
            .await
            .unwrap_err();
        assert!(matches!(err, ClusterError::Decode { .. }));
    }

    #[tokio::test]
    async fn test_failed_request_fails_fast() {
        let server = MockServer::start().await;
        let client = client_for(&server).await;
        let instance = InstanceLocation::new("nn1", format!("{}/hc/nn1", server.uri()));

        Mock::given(method("PUT"))
            .and(path("/hc/nn1"))
            .respond_with(ResponseTemplate::new(202).set_body_json(serde_json::json!({
                "href": format!("{}/requests/8", server.uri())
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/requests/8"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "Requests": {"request_status": "ABORTED", "progress_percent": 10.0}
            })))
            .expect(1)
            .mount(&server)
            .await;

        let err = client
            .change_state_and_wait(&instance, HostState::Started, Some(Duration::from_secs(30)))
            .await
            .unwrap_err();
        assert!(matches!(err, ClusterError::RequestFailed { ref status, .. } if status == "ABORTED"));
    }

    #[tokio::test]
    async fn test_convergence_timeout() {
        let server = MockServer::start().await;
        let client = client_for(&server).await;
        let instance = InstanceLocation::new("nn1", format!("{}/hc/nn1", server.uri()));

        Mock::given(method("PUT"))
            .and(path("/hc/nn1"))
            .respond_with(ResponseTemplate::new(202).set_body_json(serde_json::json!({
                "href": format!("{}/requests/9", server.uri())
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/requests/9"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "Requests": {"request_status": "IN_PROGRESS", "progress_percent": 10.0}
            })))
            .mount(&server)
            .await;

        let err = client
            .change_state_and_wait(&instance, HostState::Started, Some(Duration::from_millis(100)))
            .await
            .unwrap_err();
        assert!(matches!(err, ClusterError::Timeout { .. }));
    }
}
