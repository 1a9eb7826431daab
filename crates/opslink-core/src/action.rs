use std::fmt;

use serde::{Deserialize, Serialize};

// Stable wire identifiers. These appear as interactive-element action ids on
// the chat surface and never change once shipped.
pub mod ids {
    pub const CREATE: &str = "request.create";
    pub const CLAIM: &str = "request.claim";
    pub const COMPLETE: &str = "request.complete";
    pub const CANCEL: &str = "request.cancel";
    pub const RELAY_COMMENT: &str = "request.relay_comment";
    pub const PAGE: &str = "request.page";
    pub const TICKET_CHANGED: &str = "request.ticket_changed";
    pub const VIEW: &str = "request.view";
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RequestAction {
    Create,
    Claim,
    Complete,
    Cancel,
    RelayComment,
    Page,
    TicketChanged,
    // Link-out button; carries a URL and has no handler.
    View,
}

impl RequestAction {
    pub const ALL: &'static [RequestAction] = &[
        RequestAction::Create,
        RequestAction::Claim,
        RequestAction::Complete,
        RequestAction::Cancel,
        RequestAction::RelayComment,
        RequestAction::Page,
        RequestAction::TicketChanged,
        RequestAction::View,
    ];

    pub const fn id(self) -> &'static str {
        match self {
            Self::Create => ids::CREATE,
            Self::Claim => ids::CLAIM,
            Self::Complete => ids::COMPLETE,
            Self::Cancel => ids::CANCEL,
            Self::RelayComment => ids::RELAY_COMMENT,
            Self::Page => ids::PAGE,
            Self::TicketChanged => ids::TICKET_CHANGED,
            Self::View => ids::VIEW,
        }
    }

    pub const fn label(self) -> &'static str {
        match self {
            Self::Create => "New request",
            Self::Claim => "Claim",
            Self::Complete => "Complete",
            Self::Cancel => "Cancel",
            Self::RelayComment => "Relay comment",
            Self::Page => "Page on-call",
            Self::TicketChanged => "Ticket changed",
            Self::View => "View ticket",
        }
    }

    pub fn from_id(id: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|action| action.id() == id)
    }
}

impl fmt::Display for RequestAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.id())
    }
}
