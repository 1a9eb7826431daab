use serde::{Deserialize, Serialize};

// Wired-in escape hatch for trackers whose resolution list has drifted away
// from the configured names. Resolution id 1 is "Done" on a stock install.
pub const FALLBACK_RESOLUTION_ID: &str = "1";
pub const FALLBACK_RESOLUTION_NAME: &str = "Done";

// Runtime settings the orchestration core needs. The binary builds this from
// the deployment configuration; tests build it directly.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModuleConfig {
    pub project_key: String,
    pub issue_type: String,
    pub property_key: String,
    pub epic_key: Option<String>,
    pub done_resolution: String,
    pub dismiss_resolution: String,
    pub start_transition_id: String,
    pub resolve_transition_id: String,
    pub notification_channel: Option<String>,
    pub page_priorities: Vec<String>,
    pub alert_service_id: String,
    pub alert_escalation_policy_id: String,
    pub alert_from_email: String,
}

impl ModuleConfig {
    pub fn priority_qualifies_for_page(&self, priority: Option<&str>) -> bool {
        let Some(priority) = priority else {
            return false;
        };
        self.page_priorities
            .iter()
            .any(|name| name.eq_ignore_ascii_case(priority))
    }
}

impl Default for ModuleConfig {
    fn default() -> Self {
        Self {
            project_key: "OPS".to_owned(),
            issue_type: "Task".to_owned(),
            property_key: "opslink-request".to_owned(),
            epic_key: None,
            done_resolution: "Done".to_owned(),
            dismiss_resolution: "Won't Do".to_owned(),
            start_transition_id: "21".to_owned(),
            resolve_transition_id: "31".to_owned(),
            notification_channel: None,
            page_priorities: vec!["Highest".to_owned(), "High".to_owned()],
            alert_service_id: String::new(),
            alert_escalation_policy_id: String::new(),
            alert_from_email: String::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn page_qualification_is_case_insensitive() {
        let config = ModuleConfig::default();

        assert!(config.priority_qualifies_for_page(Some("Highest")));
        assert!(config.priority_qualifies_for_page(Some("high")));
        assert!(!config.priority_qualifies_for_page(Some("Low")));
        assert!(!config.priority_qualifies_for_page(None));
    }
}
