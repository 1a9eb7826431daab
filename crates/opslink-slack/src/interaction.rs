use opslink_core::{
    ChatActionTrigger, ModalSubmissionTrigger, RequestAction, RequestIdentity, TriggerEvent,
};
use serde_json::Value;
use tracing::debug;

use crate::render::intake;

/// Parses a Slack interactivity payload (the decoded JSON from the `payload`
/// form field) into a trigger. Returns `None` for shapes nobody handles.
pub fn parse_interaction(payload: &Value) -> Option<TriggerEvent> {
    match payload.get("type").and_then(Value::as_str)? {
        "block_actions" => parse_block_actions(payload),
        "message_action" => parse_message_action(payload),
        "view_submission" => parse_view_submission(payload),
        other => {
            debug!(kind = other, "ignoring interaction type");
            None
        }
    }
}

fn parse_block_actions(payload: &Value) -> Option<TriggerEvent> {
    let user_id = payload.pointer("/user/id").and_then(Value::as_str)?;
    let (action, entry) = payload
        .get("actions")?
        .as_array()?
        .iter()
        .find_map(|entry| {
            let action = entry
                .get("action_id")
                .and_then(Value::as_str)
                .and_then(RequestAction::from_id)?;
            Some((action, entry))
        })?;

    let channel = payload
        .pointer("/channel/id")
        .or_else(|| payload.pointer("/container/channel_id"))
        .and_then(Value::as_str)?;
    let message = payload.get("message")?;
    let message_ts = message.get("ts").and_then(Value::as_str)?;
    // A click on a thread reply points at the root via thread_ts; a click on
    // the root itself has none.
    let thread_ts = message
        .get("thread_ts")
        .and_then(Value::as_str)
        .unwrap_or(message_ts);

    Some(TriggerEvent::ChatAction(ChatActionTrigger {
        action,
        identity: RequestIdentity::new(channel, thread_ts),
        user_id: user_id.to_owned(),
        message_ts: message_ts.to_owned(),
        trigger_id: payload
            .get("trigger_id")
            .and_then(Value::as_str)
            .map(str::to_owned),
        value: entry
            .get("value")
            .and_then(Value::as_str)
            .map(str::to_owned),
    }))
}

// Message shortcuts arrive with a callback id instead of an action id; the
// filing shortcut is how intake starts on an arbitrary thread.
fn parse_message_action(payload: &Value) -> Option<TriggerEvent> {
    let action = payload
        .get("callback_id")
        .and_then(Value::as_str)
        .and_then(RequestAction::from_id)?;
    let user_id = payload.pointer("/user/id").and_then(Value::as_str)?;
    let channel = payload.pointer("/channel/id").and_then(Value::as_str)?;
    let message = payload.get("message")?;
    let message_ts = message.get("ts").and_then(Value::as_str)?;
    let thread_ts = message
        .get("thread_ts")
        .and_then(Value::as_str)
        .unwrap_or(message_ts);

    Some(TriggerEvent::ChatAction(ChatActionTrigger {
        action,
        identity: RequestIdentity::new(channel, thread_ts),
        user_id: user_id.to_owned(),
        message_ts: message_ts.to_owned(),
        trigger_id: payload
            .get("trigger_id")
            .and_then(Value::as_str)
            .map(str::to_owned),
        value: None,
    }))
}

fn parse_view_submission(payload: &Value) -> Option<TriggerEvent> {
    let view = payload.get("view")?;
    if view.get("callback_id").and_then(Value::as_str) != Some(RequestAction::Create.id()) {
        return None;
    }

    let user_id = payload.pointer("/user/id").and_then(Value::as_str)?;
    let token = view
        .get("private_metadata")
        .and_then(Value::as_str)?
        .to_owned();
    let values = view.pointer("/state/values")?;

    Some(TriggerEvent::ModalSubmission(ModalSubmissionTrigger {
        token,
        user_id: user_id.to_owned(),
        title: input_value(values, intake::TITLE_BLOCK).unwrap_or_default(),
        description: input_value(values, intake::DESCRIPTION_BLOCK).unwrap_or_default(),
        priority: input_value(values, intake::PRIORITY_BLOCK),
        component: input_value(values, intake::COMPONENT_BLOCK),
    }))
}

fn input_value(values: &Value, block: &str) -> Option<String> {
    let element = values.get(block)?.get(intake::FIELD_ACTION)?;
    element
        .get("value")
        .and_then(Value::as_str)
        .or_else(|| {
            element
                .pointer("/selected_option/value")
                .and_then(Value::as_str)
        })
        .map(str::to_owned)
        .filter(|text| !text.trim().is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn claim_clicks_resolve_the_thread_root() {
        let payload = json!({
            "type": "block_actions",
            "user": {"id": "U2"},
            "trigger_id": "trig-9",
            "channel": {"id": "C1"},
            "message": {"ts": "900.1", "thread_ts": "100.1"},
            "actions": [{"action_id": "request.claim", "block_id": "b1"}]
        });

        let Some(TriggerEvent::ChatAction(trigger)) = parse_interaction(&payload) else {
            panic!("claim click should parse as a chat action");
        };
        assert_eq!(trigger.action, RequestAction::Claim);
        assert_eq!(trigger.identity, RequestIdentity::new("C1", "100.1"));
        assert_eq!(trigger.message_ts, "900.1");
        assert_eq!(trigger.user_id, "U2");
        assert_eq!(trigger.trigger_id.as_deref(), Some("trig-9"));
    }

    #[test]
    fn root_message_clicks_use_the_message_ts_as_root() {
        let payload = json!({
            "type": "block_actions",
            "user": {"id": "U2"},
            "container": {"channel_id": "C1"},
            "message": {"ts": "100.1"},
            "actions": [{"action_id": "request.create", "value": "go"}]
        });

        let Some(TriggerEvent::ChatAction(trigger)) = parse_interaction(&payload) else {
            panic!("root click should parse");
        };
        assert_eq!(trigger.identity, RequestIdentity::new("C1", "100.1"));
        assert_eq!(trigger.value.as_deref(), Some("go"));
    }

    #[test]
    fn unknown_action_ids_are_skipped() {
        let payload = json!({
            "type": "block_actions",
            "user": {"id": "U2"},
            "channel": {"id": "C1"},
            "message": {"ts": "900.1"},
            "actions": [{"action_id": "somebody.elses.button"}]
        });
        assert!(parse_interaction(&payload).is_none());
    }

    #[test]
    fn filing_shortcut_becomes_a_create_action() {
        let payload = json!({
            "type": "message_action",
            "callback_id": "request.create",
            "user": {"id": "U3"},
            "trigger_id": "trig-2",
            "channel": {"id": "C1"},
            "message": {"ts": "100.1"}
        });

        let Some(TriggerEvent::ChatAction(trigger)) = parse_interaction(&payload) else {
            panic!("shortcut should parse");
        };
        assert_eq!(trigger.action, RequestAction::Create);
        assert_eq!(trigger.trigger_id.as_deref(), Some("trig-2"));
    }

    #[test]
    fn modal_submissions_carry_the_token_and_field_values() {
        let payload = json!({
            "type": "view_submission",
            "user": {"id": "U4"},
            "view": {
                "callback_id": "request.create",
                "private_metadata": "C1||100.1",
                "state": {"values": {
                    "title": {"value": {"type": "plain_text_input", "value": "printer on fire"}},
                    "description": {"value": {"type": "plain_text_input", "value": null}},
                    "priority": {"value": {
                        "type": "static_select",
                        "selected_option": {"value": "High"}
                    }},
                    "component": {"value": {"type": "plain_text_input", "value": "  "}}
                }}
            }
        });

        let Some(TriggerEvent::ModalSubmission(trigger)) = parse_interaction(&payload) else {
            panic!("submission should parse");
        };
        assert_eq!(trigger.token, "C1||100.1");
        assert_eq!(trigger.title, "printer on fire");
        assert_eq!(trigger.description, "");
        assert_eq!(trigger.priority.as_deref(), Some("High"));
        assert!(trigger.component.is_none());
    }

    #[test]
    fn foreign_modals_and_other_types_are_ignored() {
        let foreign = json!({
            "type": "view_submission",
            "user": {"id": "U4"},
            "view": {"callback_id": "someone.elses.modal", "private_metadata": "x"}
        });
        assert!(parse_interaction(&foreign).is_none());

        let closed = json!({"type": "view_closed", "user": {"id": "U4"}});
        assert!(parse_interaction(&closed).is_none());

        assert!(parse_interaction(&json!({"no": "type"})).is_none());
    }
}
