use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use opslink_core::CoreError;
use serde::de::DeserializeOwned;
use serde_json::Value;

pub const DEFAULT_TIMEOUT_SECONDS: u64 = 30;

const USER_AGENT: &str = "opslink/jira";

/// Connection settings for a Jira Cloud site. The API token is redacted from
/// debug output.
#[derive(Clone)]
pub struct JiraConfig {
    pub base_url: String,
    pub email: String,
    pub api_token: String,
    pub timeout: Duration,
}

impl JiraConfig {
    pub fn from_settings(
        base_url: impl Into<String>,
        email: impl Into<String>,
        api_token: impl Into<String>,
    ) -> Result<Self, CoreError> {
        let base_url = base_url.into().trim().trim_end_matches('/').to_owned();
        let email = email.into().trim().to_owned();
        let api_token = api_token.into().trim().to_owned();

        if base_url.is_empty() {
            return Err(CoreError::Configuration(
                "jira base url is empty; set jira.base_url in the config file".to_owned(),
            ));
        }
        if !base_url.starts_with("http://") && !base_url.starts_with("https://") {
            return Err(CoreError::Configuration(format!(
                "jira base url {base_url:?} must start with http:// or https://"
            )));
        }
        if email.is_empty() {
            return Err(CoreError::Configuration(
                "jira account email is empty; set OPSLINK_JIRA_EMAIL".to_owned(),
            ));
        }
        if api_token.is_empty() {
            return Err(CoreError::Configuration(
                "jira api token is empty; set OPSLINK_JIRA_API_TOKEN".to_owned(),
            ));
        }

        Ok(Self {
            base_url,
            email,
            api_token,
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECONDS),
        })
    }
}

impl fmt::Debug for JiraConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JiraConfig")
            .field("base_url", &self.base_url)
            .field("email", &self.email)
            .field("api_token", &"<redacted>")
            .field("timeout", &self.timeout)
            .finish()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RestMethod {
    Get,
    Post,
    Put,
}

impl RestMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Post => "POST",
            Self::Put => "PUT",
        }
    }
}

/// One REST call, described independently of any HTTP client so tests can
/// capture and inspect it.
#[derive(Debug, Clone, PartialEq)]
pub struct RestRequest {
    pub method: RestMethod,
    pub path: String,
    pub query: Vec<(String, String)>,
    pub body: Option<Value>,
}

impl RestRequest {
    pub fn get(path: impl Into<String>) -> Self {
        Self {
            method: RestMethod::Get,
            path: path.into(),
            query: Vec::new(),
            body: None,
        }
    }

    pub fn post(path: impl Into<String>, body: Value) -> Self {
        Self {
            method: RestMethod::Post,
            path: path.into(),
            query: Vec::new(),
            body: Some(body),
        }
    }

    pub fn put(path: impl Into<String>, body: Value) -> Self {
        Self {
            method: RestMethod::Put,
            path: path.into(),
            query: Vec::new(),
            body: Some(body),
        }
    }

    pub fn with_query(mut self, key: &str, value: impl Into<String>) -> Self {
        self.query.push((key.to_owned(), value.into()));
        self
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RestResponse {
    pub status: u16,
    pub body: String,
}

impl RestResponse {
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn decode<T: DeserializeOwned>(&self) -> Result<T, CoreError> {
        serde_json::from_str(&self.body).map_err(|error| {
            CoreError::Integration(format!(
                "jira returned an undecodable body: {error}: {}",
                truncate_for_error(&self.body)
            ))
        })
    }
}

/// Transport seam under the Jira client; production uses reqwest, tests queue
/// canned responses.
#[async_trait]
pub trait RestTransport: Send + Sync {
    async fn execute(&self, request: RestRequest) -> Result<RestResponse, CoreError>;
}

pub struct ReqwestRestTransport {
    base_url: String,
    email: String,
    api_token: String,
    client: reqwest::Client,
}

impl ReqwestRestTransport {
    pub fn new(config: &JiraConfig) -> Result<Self, CoreError> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .user_agent(USER_AGENT)
            .build()
            .map_err(|error| {
                CoreError::Configuration(format!("failed to build jira http client: {error}"))
            })?;

        Ok(Self {
            base_url: config.base_url.trim_end_matches('/').to_owned(),
            email: config.email.clone(),
            api_token: config.api_token.clone(),
            client,
        })
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }
}

impl fmt::Debug for ReqwestRestTransport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReqwestRestTransport")
            .field("base_url", &self.base_url)
            .field("email", &self.email)
            .field("api_token", &"<redacted>")
            .finish()
    }
}

#[async_trait]
impl RestTransport for ReqwestRestTransport {
    async fn execute(&self, request: RestRequest) -> Result<RestResponse, CoreError> {
        let url = self.endpoint(&request.path);
        let mut builder = match request.method {
            RestMethod::Get => self.client.get(&url),
            RestMethod::Post => self.client.post(&url),
            RestMethod::Put => self.client.put(&url),
        };
        builder = builder.basic_auth(&self.email, Some(&self.api_token));
        if !request.query.is_empty() {
            builder = builder.query(&request.query);
        }
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }

        let response = builder.send().await.map_err(|error| {
            CoreError::Integration(format!("failed to call jira at {url}: {error}"))
        })?;
        let status = response.status().as_u16();
        let body = response.text().await.map_err(|error| {
            CoreError::Integration(format!("failed to read jira response from {url}: {error}"))
        })?;

        Ok(RestResponse::new(status, body))
    }
}

pub(crate) fn truncate_for_error(body: &str) -> String {
    const MAX_LEN: usize = 200;
    if body.chars().count() <= MAX_LEN {
        body.to_owned()
    } else {
        format!("{}...", body.chars().take(MAX_LEN).collect::<String>())
    }
}
