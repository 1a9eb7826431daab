use opslink_core::{ChangedField, SidecarProperties, TicketChangedTrigger};
use serde_json::Value;
use tracing::debug;

use crate::client::issue_from_webhook;

/// Parses a Jira issue webhook into a ticket-changed trigger. Returns `None`
/// for events that are not issue updates or that only touched fields nobody
/// reacts to.
pub fn parse_webhook(payload: &Value, property_key: &str) -> Option<TicketChangedTrigger> {
    let event = payload.get("webhookEvent").and_then(Value::as_str)?;
    if event != "jira:issue_updated" && event != "jira:issue_created" {
        debug!(event, "ignoring webhook event type");
        return None;
    }

    let issue_value = payload.get("issue")?;
    let issue_key = issue_value.get("key").and_then(Value::as_str)?.to_owned();

    let changed = changed_fields(payload.get("changelog"));
    if let Some(fields) = &changed {
        if fields.is_empty() {
            debug!(issue = issue_key, "webhook changelog touched no tracked fields");
            return None;
        }
    }

    let actor_account_id = payload
        .pointer("/user/accountId")
        .and_then(Value::as_str)
        .map(str::to_owned);
    let issue = issue_from_webhook(issue_value);
    let properties = inline_properties(issue_value, property_key);

    Some(TicketChangedTrigger {
        issue_key,
        changed: changed.unwrap_or_default(),
        actor_account_id,
        issue,
        properties,
    })
}

// A changelog with items that all map to untracked fields means the edit was
// noise; a missing changelog (e.g. a created event) stays conservative.
fn changed_fields(changelog: Option<&Value>) -> Option<Vec<ChangedField>> {
    let items = changelog?.get("items")?.as_array()?;
    Some(
        items
            .iter()
            .filter_map(|item| item.get("field").and_then(Value::as_str))
            .filter_map(ChangedField::from_field_id)
            .collect(),
    )
}

// Webhooks registered with property keys inline the sidecar either as a map
// keyed by property name or as a list of {key, value} entries.
fn inline_properties(issue: &Value, property_key: &str) -> Option<SidecarProperties> {
    let properties = issue.get("properties")?;
    let value = match properties {
        Value::Object(map) => map.get(property_key),
        Value::Array(entries) => entries
            .iter()
            .find(|entry| {
                entry.get("key").and_then(Value::as_str) == Some(property_key)
            })
            .and_then(|entry| entry.get("value")),
        _ => None,
    }?;

    SidecarProperties::from_value(value).ok()
}
