use opslink_core::{RequestIdentity, ThreadReplyTrigger, TriggerEvent};
use serde_json::Value;
use tracing::debug;

/// What an Events API delivery asks of us: echo a handshake, run a trigger,
/// or nothing.
#[derive(Debug, Clone, PartialEq)]
pub enum SlackEvent {
    Challenge(String),
    Trigger(TriggerEvent),
    Ignored,
}

pub fn parse_event(payload: &Value) -> SlackEvent {
    match payload.get("type").and_then(Value::as_str) {
        Some("url_verification") => payload
            .get("challenge")
            .and_then(Value::as_str)
            .map(|challenge| SlackEvent::Challenge(challenge.to_owned()))
            .unwrap_or(SlackEvent::Ignored),
        Some("event_callback") => payload
            .get("event")
            .map(parse_callback)
            .unwrap_or(SlackEvent::Ignored),
        other => {
            debug!(kind = other.unwrap_or("<none>"), "ignoring event envelope");
            SlackEvent::Ignored
        }
    }
}

fn parse_callback(event: &Value) -> SlackEvent {
    if event.get("type").and_then(Value::as_str) != Some("message") {
        return SlackEvent::Ignored;
    }
    // Edits, joins and bot chatter carry a subtype or bot_id; relaying our
    // own posts back into the ticket would echo forever.
    if event.get("subtype").is_some() || event.get("bot_id").is_some() {
        return SlackEvent::Ignored;
    }

    let Some(user_id) = event.get("user").and_then(Value::as_str) else {
        return SlackEvent::Ignored;
    };
    let Some(channel) = event.get("channel").and_then(Value::as_str) else {
        return SlackEvent::Ignored;
    };
    let Some(ts) = event.get("ts").and_then(Value::as_str) else {
        return SlackEvent::Ignored;
    };
    // Only replies matter; a root message is not part of any request thread
    // until someone files it.
    let Some(thread_ts) = event.get("thread_ts").and_then(Value::as_str) else {
        return SlackEvent::Ignored;
    };
    if thread_ts == ts {
        return SlackEvent::Ignored;
    }

    SlackEvent::Trigger(TriggerEvent::ThreadReply(ThreadReplyTrigger {
        identity: RequestIdentity::new(channel, thread_ts),
        user_id: user_id.to_owned(),
        text: message_text(event),
        ts: ts.to_owned(),
    }))
}

/// Best-effort plain text of a message event: the `text` field when present,
/// otherwise rebuilt from rich-text block elements.
pub fn message_text(event: &Value) -> String {
    if let Some(text) = event.get("text").and_then(Value::as_str) {
        if !text.is_empty() {
            return text.to_owned();
        }
    }

    let mut out = String::new();
    if let Some(blocks) = event.get("blocks").and_then(Value::as_array) {
        for block in blocks {
            collect_rich_text(block, &mut out);
        }
    }
    out
}

fn collect_rich_text(value: &Value, out: &mut String) {
    match value.get("type").and_then(Value::as_str) {
        Some("text") => {
            if let Some(text) = value.get("text").and_then(Value::as_str) {
                out.push_str(text);
            }
        }
        Some("user") => {
            if let Some(id) = value.get("user_id").and_then(Value::as_str) {
                out.push_str("<@");
                out.push_str(id);
                out.push('>');
            }
        }
        Some("link") => {
            if let Some(text) = value
                .get("text")
                .or_else(|| value.get("url"))
                .and_then(Value::as_str)
            {
                out.push_str(text);
            }
        }
        Some("emoji") => {
            if let Some(name) = value.get("name").and_then(Value::as_str) {
                out.push(':');
                out.push_str(name);
                out.push(':');
            }
        }
        _ => {}
    }

    if let Some(elements) = value.get("elements").and_then(Value::as_array) {
        for element in elements {
            collect_rich_text(element, out);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn url_verification_echoes_the_challenge() {
        let payload = json!({"type": "url_verification", "challenge": "abc123"});
        assert_eq!(parse_event(&payload), SlackEvent::Challenge("abc123".to_owned()));
    }

    #[test]
    fn threaded_replies_become_relay_triggers() {
        let payload = json!({
            "type": "event_callback",
            "event": {
                "type": "message",
                "channel": "C1",
                "user": "U5",
                "text": "any update? cc <@U9>",
                "ts": "101.2",
                "thread_ts": "100.1"
            }
        });

        let SlackEvent::Trigger(TriggerEvent::ThreadReply(trigger)) = parse_event(&payload) else {
            panic!("threaded reply should parse as a trigger");
        };
        assert_eq!(trigger.identity, RequestIdentity::new("C1", "100.1"));
        assert_eq!(trigger.user_id, "U5");
        assert_eq!(trigger.text, "any update? cc <@U9>");
        assert_eq!(trigger.ts, "101.2");
    }

    #[test]
    fn root_messages_and_bot_chatter_are_ignored() {
        let root = json!({
            "type": "event_callback",
            "event": {"type": "message", "channel": "C1", "user": "U5", "text": "hi", "ts": "100.1"}
        });
        assert_eq!(parse_event(&root), SlackEvent::Ignored);

        let bot = json!({
            "type": "event_callback",
            "event": {
                "type": "message",
                "channel": "C1",
                "bot_id": "B1",
                "text": "Filed OPS-1",
                "ts": "101.2",
                "thread_ts": "100.1"
            }
        });
        assert_eq!(parse_event(&bot), SlackEvent::Ignored);

        let edit = json!({
            "type": "event_callback",
            "event": {
                "type": "message",
                "subtype": "message_changed",
                "channel": "C1",
                "ts": "101.3",
                "thread_ts": "100.1"
            }
        });
        assert_eq!(parse_event(&edit), SlackEvent::Ignored);
    }

    #[test]
    fn text_is_rebuilt_from_rich_text_blocks_when_missing() {
        let event = json!({
            "type": "message",
            "text": "",
            "blocks": [{
                "type": "rich_text",
                "elements": [{
                    "type": "rich_text_section",
                    "elements": [
                        {"type": "text", "text": "fix it "},
                        {"type": "user", "user_id": "U9"},
                        {"type": "text", "text": " "},
                        {"type": "emoji", "name": "fire"}
                    ]
                }]
            }]
        });

        assert_eq!(message_text(&event), "fix it <@U9> :fire:");
    }

    #[test]
    fn non_message_callbacks_are_ignored() {
        let reaction = json!({
            "type": "event_callback",
            "event": {"type": "reaction_added", "user": "U5"}
        });
        assert_eq!(parse_event(&reaction), SlackEvent::Ignored);
    }
}
