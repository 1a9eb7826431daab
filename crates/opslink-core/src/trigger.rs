use serde::{Deserialize, Serialize};

use crate::action::RequestAction;
use crate::adapters::TrackerIssue;
use crate::identity::RequestIdentity;
use crate::sidecar::SidecarProperties;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TriggerOrigin {
    Chat,
    Tracker,
}

// Typed trigger payloads. The intake boundary parses vendor wire shapes into
// these; nothing below the boundary touches raw payload JSON.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum TriggerEvent {
    ChatAction(ChatActionTrigger),
    ModalSubmission(ModalSubmissionTrigger),
    ThreadReply(ThreadReplyTrigger),
    TicketChanged(TicketChangedTrigger),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatActionTrigger {
    pub action: RequestAction,
    pub identity: RequestIdentity,
    pub user_id: String,
    // The message carrying the clicked element, not the thread root.
    pub message_ts: String,
    #[serde(default)]
    pub trigger_id: Option<String>,
    #[serde(default)]
    pub value: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModalSubmissionTrigger {
    // Identity token echoed back through the modal's private metadata.
    pub token: String,
    pub user_id: String,
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub priority: Option<String>,
    #[serde(default)]
    pub component: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThreadReplyTrigger {
    pub identity: RequestIdentity,
    pub user_id: String,
    pub text: String,
    pub ts: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TicketChangedTrigger {
    pub issue_key: String,
    pub changed: Vec<ChangedField>,
    #[serde(default)]
    pub actor_account_id: Option<String>,
    #[serde(default)]
    pub issue: Option<TrackerIssue>,
    #[serde(default)]
    pub properties: Option<SidecarProperties>,
}

impl TriggerEvent {
    pub fn action(&self) -> RequestAction {
        match self {
            Self::ChatAction(trigger) => trigger.action,
            Self::ModalSubmission(_) => RequestAction::Create,
            Self::ThreadReply(_) => RequestAction::RelayComment,
            Self::TicketChanged(_) => RequestAction::TicketChanged,
        }
    }

    pub fn origin(&self) -> TriggerOrigin {
        match self {
            Self::ChatAction(_) | Self::ModalSubmission(_) | Self::ThreadReply(_) => {
                TriggerOrigin::Chat
            }
            Self::TicketChanged(_) => TriggerOrigin::Tracker,
        }
    }

    pub fn chat_user_id(&self) -> Option<&str> {
        match self {
            Self::ChatAction(trigger) => Some(&trigger.user_id),
            Self::ModalSubmission(trigger) => Some(&trigger.user_id),
            Self::ThreadReply(trigger) => Some(&trigger.user_id),
            Self::TicketChanged(_) => None,
        }
    }
}

// Ticket fields whose edits are worth reacting to; everything else in a
// webhook changelog is noise.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangedField {
    Status,
    Summary,
    Description,
    Assignee,
}

impl ChangedField {
    pub fn from_field_id(field: &str) -> Option<Self> {
        match field.trim().to_ascii_lowercase().as_str() {
            "status" => Some(Self::Status),
            "summary" => Some(Self::Summary),
            "description" => Some(Self::Description),
            "assignee" => Some(Self::Assignee),
            _ => None,
        }
    }
}
