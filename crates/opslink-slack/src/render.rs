use std::sync::Arc;

use async_trait::async_trait;
use opslink_core::{
    action::ids, ActionButton, ChatClient, CoreError, MessageRef, OutboundMessage, RenderState,
    RequestAction, RequestIdentity, ThreadRenderer,
};
use serde_json::{json, Value};

pub const DEFAULT_PRIORITY_OPTIONS: &[&str] = &["Highest", "High", "Medium", "Low"];

// Block and action ids baked into the intake modal; the submission parser
// reads values back out under the same names.
pub(crate) mod intake {
    pub const TITLE_BLOCK: &str = "title";
    pub const DESCRIPTION_BLOCK: &str = "description";
    pub const PRIORITY_BLOCK: &str = "priority";
    pub const COMPONENT_BLOCK: &str = "component";
    pub const FIELD_ACTION: &str = "value";
}

/// Paints request state into the thread as Block Kit and builds the intake
/// modal. All chat traffic goes through the injected client.
pub struct SlackThreadRenderer {
    chat: Arc<dyn ChatClient>,
    priority_options: Vec<String>,
}

impl SlackThreadRenderer {
    pub fn new(chat: Arc<dyn ChatClient>) -> Self {
        let options = DEFAULT_PRIORITY_OPTIONS
            .iter()
            .map(|option| (*option).to_owned())
            .collect();
        Self::with_priorities(chat, options)
    }

    pub fn with_priorities(chat: Arc<dyn ChatClient>, priority_options: Vec<String>) -> Self {
        Self {
            chat,
            priority_options,
        }
    }
}

#[async_trait]
impl ThreadRenderer for SlackThreadRenderer {
    async fn render_thread(
        &self,
        identity: &RequestIdentity,
        current: Option<&MessageRef>,
        view: &RenderState,
    ) -> Result<MessageRef, CoreError> {
        let text = fallback_text(view);
        let blocks = blocks_for(view);

        match current {
            Some(target) => {
                self.chat.update_message(target, &text, Some(blocks)).await?;
                Ok(target.clone())
            }
            None => {
                self.chat
                    .post_message(OutboundMessage {
                        channel: identity.channel().to_owned(),
                        thread_ts: Some(identity.thread_ts().to_owned()),
                        text,
                        blocks: Some(blocks),
                    })
                    .await
            }
        }
    }

    fn intake_view(&self, identity: &RequestIdentity) -> Value {
        let options: Vec<Value> = self
            .priority_options
            .iter()
            .map(|name| {
                json!({
                    "text": {"type": "plain_text", "text": name},
                    "value": name,
                })
            })
            .collect();

        json!({
            "type": "modal",
            "callback_id": ids::CREATE,
            "private_metadata": identity.token(),
            "title": {"type": "plain_text", "text": "New request"},
            "submit": {"type": "plain_text", "text": "File"},
            "close": {"type": "plain_text", "text": "Cancel"},
            "blocks": [
                {
                    "type": "input",
                    "block_id": intake::TITLE_BLOCK,
                    "label": {"type": "plain_text", "text": "Title"},
                    "element": {"type": "plain_text_input", "action_id": intake::FIELD_ACTION},
                },
                {
                    "type": "input",
                    "block_id": intake::DESCRIPTION_BLOCK,
                    "optional": true,
                    "label": {"type": "plain_text", "text": "Details"},
                    "element": {
                        "type": "plain_text_input",
                        "action_id": intake::FIELD_ACTION,
                        "multiline": true,
                    },
                },
                {
                    "type": "input",
                    "block_id": intake::PRIORITY_BLOCK,
                    "optional": true,
                    "label": {"type": "plain_text", "text": "Priority"},
                    "element": {
                        "type": "static_select",
                        "action_id": intake::FIELD_ACTION,
                        "options": options,
                    },
                },
                {
                    "type": "input",
                    "block_id": intake::COMPONENT_BLOCK,
                    "optional": true,
                    "label": {"type": "plain_text", "text": "Component"},
                    "element": {"type": "plain_text_input", "action_id": intake::FIELD_ACTION},
                },
            ],
        })
    }
}

fn blocks_for(view: &RenderState) -> Value {
    let mut rendered = Vec::new();

    let headline = headline(view);
    if !headline.is_empty() {
        rendered.push(json!({
            "type": "section",
            "text": {"type": "mrkdwn", "text": headline}
        }));
    }

    // Slack caps a section at ten fields.
    for chunk in view.fields.chunks(10) {
        let fields: Vec<Value> = chunk
            .iter()
            .map(|field| {
                json!({
                    "type": "mrkdwn",
                    "text": format!("*{}:* {}", field.label, field.value)
                })
            })
            .collect();
        rendered.push(json!({"type": "section", "fields": fields}));
    }

    if !view.actions.is_empty() {
        let elements: Vec<Value> = view.actions.iter().map(button).collect();
        rendered.push(json!({"type": "actions", "elements": elements}));
    }

    Value::Array(rendered)
}

fn headline(view: &RenderState) -> String {
    match (view.icon.as_deref(), view.label.as_deref()) {
        (Some(icon), Some(label)) => format!("{icon} *{label}*"),
        (Some(icon), None) => icon.to_owned(),
        (None, Some(label)) => format!("*{label}*"),
        (None, None) => String::new(),
    }
}

fn button(action: &ActionButton) -> Value {
    let mut element = json!({
        "type": "button",
        "action_id": action.action.id(),
        "text": {"type": "plain_text", "text": action.action.label()},
    });
    if let Some(url) = &action.url {
        element["url"] = json!(url);
    }
    match action.action {
        RequestAction::Claim | RequestAction::Complete => element["style"] = json!("primary"),
        RequestAction::Cancel => element["style"] = json!("danger"),
        _ => {}
    }
    element
}

fn fallback_text(view: &RenderState) -> String {
    let icon = view.icon.as_deref().unwrap_or("");
    let label = view.label.as_deref().unwrap_or("");
    let text = format!("{icon} {label}");
    let trimmed = text.trim();
    if trimmed.is_empty() {
        "Request status".to_owned()
    } else {
        trimmed.to_owned()
    }
}
