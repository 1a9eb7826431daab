use serde::{Deserialize, Serialize};

use crate::action::RequestAction;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionButton {
    pub action: RequestAction,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

impl ActionButton {
    pub fn new(action: RequestAction) -> Self {
        Self { action, url: None }
    }

    pub fn link(action: RequestAction, url: impl Into<String>) -> Self {
        Self {
            action,
            url: Some(url.into()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RenderField {
    pub label: String,
    pub value: String,
}

impl RenderField {
    pub fn new(label: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            value: value.into(),
        }
    }
}

// View model for the thread surface. Flows each contribute one of these and
// the orchestrator folds them into the single state that gets rendered.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct RenderState {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub icon: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub actions: Vec<ActionButton>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub fields: Vec<RenderField>,
}

impl RenderState {
    pub fn is_empty(&self) -> bool {
        self.icon.is_none()
            && self.label.is_none()
            && self.actions.is_empty()
            && self.fields.is_empty()
    }

    // Scalars: the first non-empty contribution wins. Lists: concatenated in
    // contribution order.
    pub fn merge(&mut self, other: RenderState) {
        if self.icon.as_deref().map_or(true, str::is_empty) {
            if let Some(icon) = other.icon.filter(|value| !value.is_empty()) {
                self.icon = Some(icon);
            }
        }
        if self.label.as_deref().map_or(true, str::is_empty) {
            if let Some(label) = other.label.filter(|value| !value.is_empty()) {
                self.label = Some(label);
            }
        }
        self.actions.extend(other.actions);
        self.fields.extend(other.fields);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn contribution(icon: Option<&str>, label: Option<&str>) -> RenderState {
        RenderState {
            icon: icon.map(str::to_owned),
            label: label.map(str::to_owned),
            actions: vec![],
            fields: vec![],
        }
    }

    #[test]
    fn merge_keeps_first_non_empty_scalars() {
        let mut merged = contribution(Some(":white_circle:"), None);
        merged.merge(contribution(Some(":warning:"), Some("To do")));

        assert_eq!(merged.icon.as_deref(), Some(":white_circle:"));
        assert_eq!(merged.label.as_deref(), Some("To do"));
    }

    #[test]
    fn merge_treats_empty_string_as_absent() {
        let mut merged = contribution(Some(""), Some(""));
        merged.merge(contribution(Some(":white_circle:"), Some("To do")));

        assert_eq!(merged.icon.as_deref(), Some(":white_circle:"));
        assert_eq!(merged.label.as_deref(), Some("To do"));
    }

    #[test]
    fn merge_concatenates_actions_and_fields_in_order() {
        let mut merged = RenderState {
            actions: vec![ActionButton::new(RequestAction::Claim)],
            fields: vec![RenderField::new("Reporter", "jane")],
            ..RenderState::default()
        };
        merged.merge(RenderState {
            actions: vec![
                ActionButton::new(RequestAction::Cancel),
                ActionButton::link(RequestAction::View, "https://tracker/browse/OPS-1"),
            ],
            fields: vec![RenderField::new("Priority", "High")],
            ..RenderState::default()
        });

        let actions: Vec<_> = merged.actions.iter().map(|button| button.action).collect();
        assert_eq!(
            actions,
            vec![
                RequestAction::Claim,
                RequestAction::Cancel,
                RequestAction::View
            ]
        );
        assert_eq!(merged.fields.len(), 2);
        assert_eq!(merged.actions[2].url.as_deref(), Some("https://tracker/browse/OPS-1"));
    }

    #[test]
    fn empty_render_state_reports_empty() {
        assert!(RenderState::default().is_empty());
        assert!(!contribution(Some(":warning:"), None).is_empty());
    }
}
