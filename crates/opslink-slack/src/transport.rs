use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use opslink_core::CoreError;
use serde_json::Value;

pub const DEFAULT_API_URL: &str = "https://slack.com/api";
pub const DEFAULT_TIMEOUT_SECONDS: u64 = 30;

const USER_AGENT: &str = "opslink/slack";

/// Bot credentials for the Slack Web API. The token is redacted from debug
/// output.
#[derive(Clone)]
pub struct SlackConfig {
    pub api_url: String,
    pub bot_token: String,
    pub timeout: Duration,
}

impl SlackConfig {
    pub fn from_settings(bot_token: impl Into<String>) -> Result<Self, CoreError> {
        let bot_token = bot_token.into().trim().to_owned();
        if bot_token.is_empty() {
            return Err(CoreError::Configuration(
                "slack bot token is empty; set OPSLINK_SLACK_BOT_TOKEN".to_owned(),
            ));
        }

        Ok(Self {
            api_url: DEFAULT_API_URL.to_owned(),
            bot_token,
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECONDS),
        })
    }
}

impl fmt::Debug for SlackConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SlackConfig")
            .field("api_url", &self.api_url)
            .field("bot_token", &"<redacted>")
            .field("timeout", &self.timeout)
            .finish()
    }
}

/// Transport seam under the Slack client. `call` returns the raw response
/// envelope; interpreting `ok`/`error` is the caller's job.
#[async_trait]
pub trait WebTransport: Send + Sync {
    async fn call(&self, method: &str, args: Value) -> Result<Value, CoreError>;
}

pub struct ReqwestWebTransport {
    api_url: String,
    bot_token: String,
    client: reqwest::Client,
}

impl ReqwestWebTransport {
    pub fn new(config: &SlackConfig) -> Result<Self, CoreError> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .user_agent(USER_AGENT)
            .build()
            .map_err(|error| {
                CoreError::Configuration(format!("failed to build slack http client: {error}"))
            })?;

        Ok(Self {
            api_url: config.api_url.trim_end_matches('/').to_owned(),
            bot_token: config.bot_token.clone(),
            client,
        })
    }
}

impl fmt::Debug for ReqwestWebTransport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReqwestWebTransport")
            .field("api_url", &self.api_url)
            .field("bot_token", &"<redacted>")
            .finish()
    }
}

#[async_trait]
impl WebTransport for ReqwestWebTransport {
    async fn call(&self, method: &str, args: Value) -> Result<Value, CoreError> {
        let url = format!("{}/{}", self.api_url, method);
        let form = form_fields(method, &args)?;

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.bot_token)
            .form(&form)
            .send()
            .await
            .map_err(|error| {
                CoreError::Integration(format!("failed to call slack {method}: {error}"))
            })?;
        let status = response.status();
        let body = response.text().await.map_err(|error| {
            CoreError::Integration(format!("failed to read slack {method} response: {error}"))
        })?;
        if !status.is_success() {
            return Err(CoreError::Integration(format!(
                "slack {method} returned HTTP {status}: {}",
                truncate_for_error(&body)
            )));
        }

        serde_json::from_str(&body).map_err(|error| {
            CoreError::Integration(format!(
                "slack {method} returned an undecodable body: {error}: {}",
                truncate_for_error(&body)
            ))
        })
    }
}

// The Web API takes form-encoded arguments for every method; nested values
// such as blocks and views travel as JSON-encoded strings.
fn form_fields(method: &str, args: &Value) -> Result<Vec<(String, String)>, CoreError> {
    let Some(map) = args.as_object() else {
        return Err(CoreError::Integration(format!(
            "slack {method} arguments must be a JSON object"
        )));
    };

    let mut fields = Vec::with_capacity(map.len());
    for (key, value) in map {
        let rendered = match value {
            Value::Null => continue,
            Value::String(text) => text.clone(),
            Value::Bool(flag) => flag.to_string(),
            Value::Number(number) => number.to_string(),
            other => serde_json::to_string(other).map_err(|error| {
                CoreError::Integration(format!(
                    "failed to encode slack {method} argument {key}: {error}"
                ))
            })?,
        };
        fields.push((key.clone(), rendered));
    }
    Ok(fields)
}

pub(crate) fn truncate_for_error(body: &str) -> String {
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
    use serde_json::json;

    #[test]
    fn config_rejects_a_blank_token() {
        let error = SlackConfig::from_settings("  ").expect_err("blank token should be rejected");
        assert!(error.to_string().contains("OPSLINK_SLACK_BOT_TOKEN"));
    }

    #[test]
    fn debug_output_redacts_the_token() {
        let config = SlackConfig::from_settings("xoxb-secret").expect("should build config");
        let printed = format!("{config:?}");
        assert!(printed.contains("<redacted>"));
        assert!(!printed.contains("xoxb-secret"));
    }

    #[test]
    fn form_encoding_stringifies_nested_values_and_drops_nulls() {
        let fields = form_fields(
            "chat.postMessage",
            &json!({
                "channel": "C1",
                "thread_ts": null,
                "mrkdwn": true,
                "blocks": [{"type": "section"}],
            }),
        )
        .expect("object arguments should encode");

        assert!(fields.contains(&("channel".to_owned(), "C1".to_owned())));
        assert!(fields.contains(&("mrkdwn".to_owned(), "true".to_owned())));
        assert!(fields.contains(&(
            "blocks".to_owned(),
            "[{\"type\":\"section\"}]".to_owned()
        )));
        assert!(!fields.iter().any(|(key, _)| key == "thread_ts"));
    }

    #[test]
    fn non_object_arguments_are_rejected() {
        let error = form_fields("chat.postMessage", &json!(["not", "an", "object"]))
            .expect_err("arrays should be rejected");
        assert!(error.to_string().contains("must be a JSON object"));
    }
}
