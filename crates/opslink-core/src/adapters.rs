use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::actor::ActorDirectory;
use crate::config::ModuleConfig;
use crate::error::CoreError;
use crate::identity::RequestIdentity;
use crate::render::RenderState;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IssueStatus {
    pub name: String,
    pub category: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackerIssue {
    pub key: String,
    pub summary: String,
    #[serde(default)]
    pub description: Option<String>,
    pub status: IssueStatus,
    #[serde(default)]
    pub resolution: Option<String>,
    #[serde(default)]
    pub assignee_id: Option<String>,
    #[serde(default)]
    pub priority: Option<String>,
    #[serde(default)]
    pub labels: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewIssue {
    pub project_key: String,
    pub issue_type: String,
    pub summary: String,
    pub description: String,
    #[serde(default)]
    pub labels: Vec<String>,
    #[serde(default)]
    pub priority: Option<String>,
    #[serde(default)]
    pub component: Option<String>,
}

// Field edit with set-if-some semantics; absent fields are left untouched.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct IssueEdit {
    #[serde(default)]
    pub assignee_account_id: Option<String>,
    #[serde(default)]
    pub reporter_account_id: Option<String>,
    #[serde(default)]
    pub parent_key: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransitionRequest {
    pub transition_id: String,
    #[serde(default)]
    pub resolution_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackerTransition {
    pub id: String,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackerResolution {
    pub id: String,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackerComponent {
    pub id: String,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackerPriority {
    pub id: String,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackerUser {
    pub account_id: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub display_name: Option<String>,
}

#[async_trait]
pub trait TrackerClient: Send + Sync {
    async fn health_check(&self) -> Result<(), CoreError>;
    async fn create_issue(&self, request: NewIssue) -> Result<TrackerIssue, CoreError>;
    async fn issue(&self, key: &str) -> Result<TrackerIssue, CoreError>;
    async fn edit_issue(&self, key: &str, edit: IssueEdit) -> Result<(), CoreError>;
    async fn search_issues(&self, jql: &str, limit: usize) -> Result<Vec<TrackerIssue>, CoreError>;
    async fn transitions(&self, key: &str) -> Result<Vec<TrackerTransition>, CoreError>;
    async fn transition_issue(
        &self,
        key: &str,
        request: TransitionRequest,
    ) -> Result<(), CoreError>;
    async fn resolutions(&self) -> Result<Vec<TrackerResolution>, CoreError>;
    async fn components(&self, project_key: &str) -> Result<Vec<TrackerComponent>, CoreError>;
    async fn priorities(&self) -> Result<Vec<TrackerPriority>, CoreError>;
    async fn user_by_email(&self, email: &str) -> Result<Option<TrackerUser>, CoreError>;
    async fn issue_property(
        &self,
        key: &str,
        property: &str,
    ) -> Result<Option<Value>, CoreError>;
    async fn set_issue_property(
        &self,
        key: &str,
        property: &str,
        value: Value,
    ) -> Result<(), CoreError>;
    async fn add_comment(&self, key: &str, body: &str) -> Result<(), CoreError>;
    fn browse_url(&self, key: &str) -> String;
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MessageRef {
    pub channel: String,
    pub ts: String,
}

impl MessageRef {
    pub fn new(channel: impl Into<String>, ts: impl Into<String>) -> Self {
        Self {
            channel: channel.into(),
            ts: ts.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutboundMessage {
    pub channel: String,
    #[serde(default)]
    pub thread_ts: Option<String>,
    pub text: String,
    #[serde(default)]
    pub blocks: Option<Value>,
}

impl OutboundMessage {
    pub fn text(channel: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            channel: channel.into(),
            thread_ts: None,
            text: text.into(),
            blocks: None,
        }
    }

    pub fn thread_reply(
        identity: &RequestIdentity,
        text: impl Into<String>,
    ) -> Self {
        Self {
            channel: identity.channel().to_owned(),
            thread_ts: Some(identity.thread_ts().to_owned()),
            text: text.into(),
            blocks: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatProfile {
    pub id: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub real_name: Option<String>,
}

impl ChatProfile {
    pub fn best_name(&self) -> Option<&str> {
        self.display_name
            .as_deref()
            .filter(|name| !name.is_empty())
            .or_else(|| self.real_name.as_deref().filter(|name| !name.is_empty()))
    }
}

#[async_trait]
pub trait ChatClient: Send + Sync {
    async fn health_check(&self) -> Result<(), CoreError>;
    async fn post_message(&self, message: OutboundMessage) -> Result<MessageRef, CoreError>;
    async fn update_message(
        &self,
        target: &MessageRef,
        text: &str,
        blocks: Option<Value>,
    ) -> Result<(), CoreError>;
    async fn delete_message(&self, target: &MessageRef) -> Result<(), CoreError>;
    async fn post_ephemeral(
        &self,
        channel: &str,
        user_id: &str,
        text: &str,
    ) -> Result<(), CoreError>;
    async fn open_modal(&self, trigger_id: &str, view: Value) -> Result<(), CoreError>;
    async fn publish_home(&self, user_id: &str, view: Value) -> Result<(), CoreError>;
    async fn permalink(&self, target: &MessageRef) -> Result<String, CoreError>;
    async fn user_profile(&self, user_id: &str) -> Result<Option<ChatProfile>, CoreError>;
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IncidentRequest {
    pub title: String,
    pub body: String,
    pub service_id: String,
    pub escalation_policy_id: String,
    pub from_email: String,
}

#[async_trait]
pub trait AlertingClient: Send + Sync {
    async fn health_check(&self) -> Result<(), CoreError>;
    async fn create_incident(&self, request: IncidentRequest) -> Result<(), CoreError>;
}

// Thread surface contract. Implementations translate a RenderState into the
// platform's message shape; they carry no decision logic of their own.
#[async_trait]
pub trait ThreadRenderer: Send + Sync {
    // Updates `current` in place when present, otherwise posts the action
    // message into the thread; returns the message that now shows the view.
    async fn render_thread(
        &self,
        identity: &RequestIdentity,
        current: Option<&MessageRef>,
        view: &RenderState,
    ) -> Result<MessageRef, CoreError>;

    // Platform view payload for the intake modal. The identity token rides
    // along as opaque metadata and comes back on submission.
    fn intake_view(&self, identity: &RequestIdentity) -> Value;
}

// Read-only capability bundle handed to handlers and flows. Everything a
// handler may touch arrives through here; there is no global state.
#[derive(Clone)]
pub struct Capabilities {
    pub tracker: Arc<dyn TrackerClient>,
    pub chat: Arc<dyn ChatClient>,
    pub alerting: Arc<dyn AlertingClient>,
    pub renderer: Arc<dyn ThreadRenderer>,
    pub directory: Arc<ActorDirectory>,
    pub config: Arc<ModuleConfig>,
}
