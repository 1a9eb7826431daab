use std::sync::Arc;

use async_trait::async_trait;
use opslink_core::{ChatClient, ChatProfile, CoreError, MessageRef, OutboundMessage};
use serde::Deserialize;
use serde_json::{json, Value};

use crate::transport::{ReqwestWebTransport, SlackConfig, WebTransport};

/// Slack Web API client. API-level `ok: false` envelopes surface as errors
/// here; the transport only reports HTTP and wire failures.
pub struct SlackClient {
    transport: Arc<dyn WebTransport>,
}

impl SlackClient {
    pub fn new(config: &SlackConfig) -> Result<Self, CoreError> {
        let transport = ReqwestWebTransport::new(config)?;
        Ok(Self::with_transport(Arc::new(transport)))
    }

    pub fn with_transport(transport: Arc<dyn WebTransport>) -> Self {
        Self { transport }
    }

    async fn call(&self, method: &str, args: Value) -> Result<Value, CoreError> {
        let envelope = self.transport.call(method, args).await?;
        accept(method, envelope)
    }
}

fn accept(method: &str, envelope: Value) -> Result<Value, CoreError> {
    if envelope.get("ok").and_then(Value::as_bool) == Some(true) {
        return Ok(envelope);
    }
    let error = envelope
        .get("error")
        .and_then(Value::as_str)
        .unwrap_or("unknown error");
    Err(CoreError::Integration(format!(
        "slack {method} failed: {error}"
    )))
}

fn decode<T: serde::de::DeserializeOwned>(method: &str, envelope: Value) -> Result<T, CoreError> {
    serde_json::from_value(envelope).map_err(|error| {
        CoreError::Integration(format!(
            "slack {method} returned an unexpected envelope: {error}"
        ))
    })
}

#[async_trait]
impl ChatClient for SlackClient {
    async fn health_check(&self) -> Result<(), CoreError> {
        self.call("auth.test", json!({})).await?;
        Ok(())
    }

    async fn post_message(&self, message: OutboundMessage) -> Result<MessageRef, CoreError> {
        let envelope = self
            .call(
                "chat.postMessage",
                json!({
                    "channel": message.channel,
                    "text": message.text,
                    "thread_ts": message.thread_ts,
                    "blocks": message.blocks,
                }),
            )
            .await?;
        let posted: PostedPayload = decode("chat.postMessage", envelope)?;
        Ok(MessageRef::new(posted.channel, posted.ts))
    }

    async fn update_message(
        &self,
        target: &MessageRef,
        text: &str,
        blocks: Option<Value>,
    ) -> Result<(), CoreError> {
        self.call(
            "chat.update",
            json!({
                "channel": target.channel,
                "ts": target.ts,
                "text": text,
                "blocks": blocks,
            }),
        )
        .await?;
        Ok(())
    }

    async fn delete_message(&self, target: &MessageRef) -> Result<(), CoreError> {
        self.call(
            "chat.delete",
            json!({"channel": target.channel, "ts": target.ts}),
        )
        .await?;
        Ok(())
    }

    async fn post_ephemeral(
        &self,
        channel: &str,
        user_id: &str,
        text: &str,
    ) -> Result<(), CoreError> {
        self.call(
            "chat.postEphemeral",
            json!({"channel": channel, "user": user_id, "text": text}),
        )
        .await?;
        Ok(())
    }

    async fn open_modal(&self, trigger_id: &str, view: Value) -> Result<(), CoreError> {
        self.call("views.open", json!({"trigger_id": trigger_id, "view": view}))
            .await?;
        Ok(())
    }

    async fn publish_home(&self, user_id: &str, view: Value) -> Result<(), CoreError> {
        self.call("views.publish", json!({"user_id": user_id, "view": view}))
            .await?;
        Ok(())
    }

    async fn permalink(&self, target: &MessageRef) -> Result<String, CoreError> {
        let envelope = self
            .call(
                "chat.getPermalink",
                json!({"channel": target.channel, "message_ts": target.ts}),
            )
            .await?;
        envelope
            .get("permalink")
            .and_then(Value::as_str)
            .map(str::to_owned)
            .ok_or_else(|| {
                CoreError::Integration(
                    "slack chat.getPermalink returned no permalink".to_owned(),
                )
            })
    }

    async fn user_profile(&self, user_id: &str) -> Result<Option<ChatProfile>, CoreError> {
        let envelope = self
            .transport
            .call("users.info", json!({"user": user_id}))
            .await?;
        if envelope.get("ok").and_then(Value::as_bool) != Some(true) {
            let error = envelope
                .get("error")
                .and_then(Value::as_str)
                .unwrap_or("unknown error");
            if error == "user_not_found" || error == "users_not_found" {
                return Ok(None);
            }
            return Err(CoreError::Integration(format!(
                "slack users.info failed: {error}"
            )));
        }

        let payload: UserEnvelope = decode("users.info", envelope)?;
        Ok(Some(payload.user.into_profile()))
    }
}

#[derive(Debug, Deserialize)]
struct PostedPayload {
    channel: String,
    ts: String,
}

#[derive(Debug, Deserialize)]
struct UserEnvelope {
    user: UserPayload,
}

#[derive(Debug, Deserialize)]
struct UserPayload {
    id: String,
    #[serde(default)]
    real_name: Option<String>,
    #[serde(default)]
    profile: Option<ProfilePayload>,
}

#[derive(Debug, Default, Deserialize)]
struct ProfilePayload {
    #[serde(default)]
    email: Option<String>,
    #[serde(default)]
    display_name: Option<String>,
    #[serde(default)]
    real_name: Option<String>,
}

impl UserPayload {
    fn into_profile(self) -> ChatProfile {
        let profile = self.profile.unwrap_or_default();
        ChatProfile {
            id: self.id,
            email: profile.email,
            display_name: profile.display_name,
            real_name: profile.real_name.or(self.real_name),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;

    use tokio::sync::Mutex;

    #[derive(Debug, Default)]
    struct StubTransport {
        calls: Mutex<Vec<(String, Value)>>,
        responses: Mutex<VecDeque<Value>>,
    }

    impl StubTransport {
        async fn push_response(&self, value: Value) {
            self.responses.lock().await.push_back(value);
        }

        async fn calls(&self) -> Vec<(String, Value)> {
            self.calls.lock().await.clone()
        }
    }

    #[async_trait]
    impl WebTransport for StubTransport {
        async fn call(&self, method: &str, args: Value) -> Result<Value, CoreError> {
            self.calls.lock().await.push((method.to_owned(), args));
            let mut responses = self.responses.lock().await;
            if let Some(response) = responses.pop_front() {
                return Ok(response);
            }

            Err(CoreError::Integration(
                "stub transport has no more queued responses".to_owned(),
            ))
        }
    }

    #[tokio::test]
    async fn post_message_returns_the_minted_ref() {
        let transport = Arc::new(StubTransport::default());
        transport
            .push_response(json!({"ok": true, "channel": "C1", "ts": "111.22"}))
            .await;

        let client = SlackClient::with_transport(transport.clone());
        let message = OutboundMessage {
            channel: "C1".to_owned(),
            thread_ts: Some("100.1".to_owned()),
            text: "hello".to_owned(),
            blocks: None,
        };
        let posted = client.post_message(message).await.expect("post should succeed");

        assert_eq!(posted, MessageRef::new("C1", "111.22"));

        let calls = transport.calls().await;
        assert_eq!(calls[0].0, "chat.postMessage");
        assert_eq!(calls[0].1["channel"], "C1");
        assert_eq!(calls[0].1["thread_ts"], "100.1");
    }

    #[tokio::test]
    async fn api_errors_carry_the_slack_error_code() {
        let transport = Arc::new(StubTransport::default());
        transport
            .push_response(json!({"ok": false, "error": "channel_not_found"}))
            .await;

        let client = SlackClient::with_transport(transport.clone());
        let error = client
            .post_ephemeral("C-missing", "U1", "psst")
            .await
            .expect_err("an ok=false envelope should be an error");

        assert!(error.to_string().contains("channel_not_found"));
    }

    #[tokio::test]
    async fn unknown_users_read_as_none_but_other_failures_do_not() {
        let transport = Arc::new(StubTransport::default());
        transport
            .push_response(json!({"ok": false, "error": "user_not_found"}))
            .await;
        transport
            .push_response(json!({"ok": false, "error": "ratelimited"}))
            .await;

        let client = SlackClient::with_transport(transport.clone());
        let missing = client
            .user_profile("U-ghost")
            .await
            .expect("user_not_found should not be an error");
        assert!(missing.is_none());

        client
            .user_profile("U-throttled")
            .await
            .expect_err("other api errors should surface");
    }

    #[tokio::test]
    async fn user_profiles_fall_back_to_the_top_level_real_name() {
        let transport = Arc::new(StubTransport::default());
        transport
            .push_response(json!({
                "ok": true,
                "user": {
                    "id": "U7",
                    "real_name": "Sam Doe",
                    "profile": {"email": "sam@acme.io", "display_name": ""}
                }
            }))
            .await;

        let client = SlackClient::with_transport(transport.clone());
        let profile = client
            .user_profile("U7")
            .await
            .expect("lookup should succeed")
            .expect("known user should resolve");

        assert_eq!(profile.email.as_deref(), Some("sam@acme.io"));
        assert_eq!(profile.best_name(), Some("Sam Doe"));
    }

    #[tokio::test]
    async fn permalink_is_read_from_the_envelope() {
        let transport = Arc::new(StubTransport::default());
        transport
            .push_response(json!({
                "ok": true,
                "permalink": "https://acme.slack.com/archives/C1/p10001"
            }))
            .await;

        let client = SlackClient::with_transport(transport.clone());
        let link = client
            .permalink(&MessageRef::new("C1", "100.1"))
            .await
            .expect("permalink should resolve");

        assert_eq!(link, "https://acme.slack.com/archives/C1/p10001");

        let calls = transport.calls().await;
        assert_eq!(calls[0].1["message_ts"], "100.1");
    }
}
