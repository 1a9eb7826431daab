//! PagerDuty integration: an `AlertingClient` that opens incidents through
//! the REST API with `From`-header attribution.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use opslink_core::{AlertingClient, CoreError, IncidentRequest};
use serde_json::{json, Value};

pub const DEFAULT_API_URL: &str = "https://api.pagerduty.com";
pub const DEFAULT_TIMEOUT_SECONDS: u64 = 30;

const USER_AGENT: &str = "opslink/pagerduty";
const ACCEPT_HEADER: &str = "application/vnd.pagerduty+json;version=2";

/// REST credentials. The API key is redacted from debug output.
#[derive(Clone)]
pub struct PagerDutyConfig {
    pub api_url: String,
    pub api_key: String,
    pub timeout: Duration,
}

impl PagerDutyConfig {
    pub fn from_settings(api_key: impl Into<String>) -> Result<Self, CoreError> {
        let api_key = api_key.into().trim().to_owned();
        if api_key.is_empty() {
            return Err(CoreError::Configuration(
                "pagerduty api key is empty; set OPSLINK_PAGERDUTY_API_KEY".to_owned(),
            ));
        }

        Ok(Self {
            api_url: DEFAULT_API_URL.to_owned(),
            api_key,
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECONDS),
        })
    }
}

impl fmt::Debug for PagerDutyConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PagerDutyConfig")
            .field("api_url", &self.api_url)
            .field("api_key", &"<redacted>")
            .field("timeout", &self.timeout)
            .finish()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallMethod {
    Get,
    Post,
}

/// One REST call; the optional `from_email` lands in the `From` header that
/// PagerDuty uses to attribute the incident to a person.
#[derive(Debug, Clone, PartialEq)]
pub struct ApiCall {
    pub method: CallMethod,
    pub path: String,
    pub from_email: Option<String>,
    pub body: Option<Value>,
}

impl ApiCall {
    pub fn get(path: impl Into<String>) -> Self {
        Self {
            method: CallMethod::Get,
            path: path.into(),
            from_email: None,
            body: None,
        }
    }

    pub fn post(path: impl Into<String>, body: Value, from_email: impl Into<String>) -> Self {
        Self {
            method: CallMethod::Post,
            path: path.into(),
            from_email: Some(from_email.into()),
            body: Some(body),
        }
    }
}

#[async_trait]
pub trait ApiTransport: Send + Sync {
    async fn execute(&self, call: ApiCall) -> Result<Value, CoreError>;
}

pub struct ReqwestApiTransport {
    api_url: String,
    api_key: String,
    client: reqwest::Client,
}

impl ReqwestApiTransport {
    pub fn new(config: &PagerDutyConfig) -> Result<Self, CoreError> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .user_agent(USER_AGENT)
            .build()
            .map_err(|error| {
                CoreError::Configuration(format!(
                    "failed to build pagerduty http client: {error}"
                ))
            })?;

        Ok(Self {
            api_url: config.api_url.trim_end_matches('/').to_owned(),
            api_key: config.api_key.clone(),
            client,
        })
    }
}

impl fmt::Debug for ReqwestApiTransport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReqwestApiTransport")
            .field("api_url", &self.api_url)
            .field("api_key", &"<redacted>")
            .finish()
    }
}

#[async_trait]
impl ApiTransport for ReqwestApiTransport {
    async fn execute(&self, call: ApiCall) -> Result<Value, CoreError> {
        let url = format!("{}/{}", self.api_url, call.path.trim_start_matches('/'));
        let mut builder = match call.method {
            CallMethod::Get => self.client.get(&url),
            CallMethod::Post => self.client.post(&url),
        };
        builder = builder
            .header("Authorization", format!("Token token={}", self.api_key))
            .header("Accept", ACCEPT_HEADER);
        if let Some(from_email) = &call.from_email {
            builder = builder.header("From", from_email);
        }
        if let Some(body) = &call.body {
            builder = builder.json(body);
        }

        let response = builder.send().await.map_err(|error| {
            CoreError::Integration(format!("failed to call pagerduty at {url}: {error}"))
        })?;
        let status = response.status();
        let body = response.text().await.map_err(|error| {
            CoreError::Integration(format!(
                "failed to read pagerduty response from {url}: {error}"
            ))
        })?;
        if !status.is_success() {
            return Err(CoreError::Integration(format!(
                "pagerduty returned HTTP {status}: {}",
                truncate_for_error(&body)
            )));
        }

        if body.trim().is_empty() {
            return Ok(json!({}));
        }
        serde_json::from_str(&body).map_err(|error| {
            CoreError::Integration(format!(
                "pagerduty returned an undecodable body: {error}: {}",
                truncate_for_error(&body)
            ))
        })
    }
}

/// Opens incidents against a fixed service and escalation policy; both ride
/// in on the request so the caller owns the routing decision.
pub struct PagerDutyClient {
    transport: Arc<dyn ApiTransport>,
}

impl PagerDutyClient {
    pub fn new(config: &PagerDutyConfig) -> Result<Self, CoreError> {
        let transport = ReqwestApiTransport::new(config)?;
        Ok(Self::with_transport(Arc::new(transport)))
    }

    pub fn with_transport(transport: Arc<dyn ApiTransport>) -> Self {
        Self { transport }
    }
}

#[async_trait]
impl AlertingClient for PagerDutyClient {
    async fn health_check(&self) -> Result<(), CoreError> {
        self.transport.execute(ApiCall::get("/abilities")).await?;
        Ok(())
    }

    async fn create_incident(&self, request: IncidentRequest) -> Result<(), CoreError> {
        let body = json!({
            "incident": {
                "type": "incident",
                "title": request.title,
                "service": {"id": request.service_id, "type": "service_reference"},
                "escalation_policy": {
                    "id": request.escalation_policy_id,
                    "type": "escalation_policy_reference"
                },
                "body": {"type": "incident_body", "details": request.body},
            }
        });

        self.transport
            .execute(ApiCall::post("/incidents", body, request.from_email))
            .await?;
        Ok(())
    }
}

fn truncate_for_error(body: &str) -> String {
    const MAX_LEN: usize = 200;
    if body.chars().count() <= MAX_LEN {
        body.to_owned()
    } else {
        format!("{}...", body.chars().take(MAX_LEN).collect::<String>())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;

    use tokio::sync::Mutex;

    #[derive(Debug, Default)]
    struct StubTransport {
        calls: Mutex<Vec<ApiCall>>,
        responses: Mutex<VecDeque<Result<Value, CoreError>>>,
    }

    impl StubTransport {
        async fn push_response(&self, response: Result<Value, CoreError>) {
            self.responses.lock().await.push_back(response);
        }

        async fn calls(&self) -> Vec<ApiCall> {
            self.calls.lock().await.clone()
        }
    }

    #[async_trait]
    impl ApiTransport for StubTransport {
        async fn execute(&self, call: ApiCall) -> Result<Value, CoreError> {
            self.calls.lock().await.push(call);
            let mut responses = self.responses.lock().await;
            if let Some(response) = responses.pop_front() {
                return response;
            }

            Err(CoreError::Integration(
                "stub transport has no more queued responses".to_owned(),
            ))
        }
    }

    fn incident() -> IncidentRequest {
        IncidentRequest {
            title: "[OPS-9] printer on fire".to_owned(),
            body: "Paged by Sam\nThread: https://acme.slack.com/archives/C1/p1001".to_owned(),
            service_id: "SVC1".to_owned(),
            escalation_policy_id: "EP1".to_owned(),
            from_email: "sam@acme.io".to_owned(),
        }
    }

    #[tokio::test]
    async fn incidents_carry_routing_refs_and_the_from_email() {
        let transport = Arc::new(StubTransport::default());
        transport
            .push_response(Ok(json!({"incident": {"id": "P1"}})))
            .await;

        let client = PagerDutyClient::with_transport(transport.clone());
        client
            .create_incident(incident())
            .await
            .expect("incident should open");

        let calls = transport.calls().await;
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].method, CallMethod::Post);
        assert_eq!(calls[0].path, "/incidents");
        assert_eq!(calls[0].from_email.as_deref(), Some("sam@acme.io"));

        let body = calls[0].body.as_ref().expect("incident body");
        assert_eq!(body["incident"]["title"], "[OPS-9] printer on fire");
        assert_eq!(body["incident"]["service"]["id"], "SVC1");
        assert_eq!(body["incident"]["service"]["type"], "service_reference");
        assert_eq!(body["incident"]["escalation_policy"]["id"], "EP1");
        assert!(body["incident"]["body"]["details"]
            .as_str()
            .expect("details")
            .contains("Paged by Sam"));
    }

    #[tokio::test]
    async fn transport_failures_surface_unchanged() {
        let transport = Arc::new(StubTransport::default());
        transport
            .push_response(Err(CoreError::Integration(
                "pagerduty returned HTTP 402: account limit".to_owned(),
            )))
            .await;

        let client = PagerDutyClient::with_transport(transport.clone());
        let error = client
            .create_incident(incident())
            .await
            .expect_err("transport failure should propagate");

        assert!(error.to_string().contains("HTTP 402"));
    }

    #[tokio::test]
    async fn health_check_probes_abilities() {
        let transport = Arc::new(StubTransport::default());
        transport.push_response(Ok(json!({"abilities": []}))).await;

        let client = PagerDutyClient::with_transport(transport.clone());
        client.health_check().await.expect("probe should succeed");

        let calls = transport.calls().await;
        assert_eq!(calls[0].method, CallMethod::Get);
        assert_eq!(calls[0].path, "/abilities");
        assert!(calls[0].from_email.is_none());
    }

    #[test]
    fn config_rejects_a_blank_key_and_redacts_debug_output() {
        let error = PagerDutyConfig::from_settings(" ").expect_err("blank key should be rejected");
        assert!(error.to_string().contains("OPSLINK_PAGERDUTY_API_KEY"));

        let config = PagerDutyConfig::from_settings("pd-secret").expect("should build config");
        let printed = format!("{config:?}");
        assert!(printed.contains("<redacted>"));
        assert!(!printed.contains("pd-secret"));
    }
}
