use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RequestState {
    Todo,
    Claimed,
    Complete,
    Cancelled,
    Working,
    Error,
    Unknown,
}

impl RequestState {
    pub const fn as_key(self) -> &'static str {
        match self {
            Self::Todo => "todo",
            Self::Claimed => "claimed",
            Self::Complete => "complete",
            Self::Cancelled => "cancelled",
            Self::Working => "working",
            Self::Error => "error",
            Self::Unknown => "unknown",
        }
    }

    pub const fn label(self) -> &'static str {
        match self {
            Self::Todo => "To do",
            Self::Claimed => "Claimed",
            Self::Complete => "Complete",
            Self::Cancelled => "Cancelled",
            Self::Working => "Working",
            Self::Error => "Failed",
            Self::Unknown => "Unknown",
        }
    }

    pub const fn icon(self) -> &'static str {
        match self {
            Self::Todo => ":white_circle:",
            Self::Claimed => ":large_blue_circle:",
            Self::Complete => ":white_check_mark:",
            Self::Cancelled => ":no_entry_sign:",
            Self::Working => ":hourglass_flipping_sand:",
            Self::Error => ":warning:",
            Self::Unknown => ":grey_question:",
        }
    }

    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Complete | Self::Cancelled)
    }
}

// Derives the request state from the ticket's status category and resolution
// name. Trackers spell the category either as the display name ("To Do") or
// the category key ("new"); both are accepted. `Working` and `Error` are
// never derived here, they are applied around in-flight mutations.
pub fn derive_state(
    status_category: &str,
    resolution: Option<&str>,
    done_resolution: &str,
) -> RequestState {
    let category = status_category.trim().to_ascii_lowercase();
    match category.as_str() {
        "to do" | "new" => RequestState::Todo,
        "in progress" | "indeterminate" => RequestState::Claimed,
        "done" | "complete" => {
            match resolution.map(str::trim).filter(|name| !name.is_empty()) {
                None => RequestState::Complete,
                Some(name) if name.eq_ignore_ascii_case(done_resolution) => RequestState::Complete,
                Some(_) => RequestState::Cancelled,
            }
        }
        _ => RequestState::Unknown,
    }
}
