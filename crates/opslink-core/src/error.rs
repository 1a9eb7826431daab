use thiserror::Error;

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("{0}")]
    User(String),
    #[error("integration failure: {0}")]
    Integration(String),
    #[error("configuration drift: {0}")]
    ConfigurationDrift(String),
    #[error("malformed identity token: {0}")]
    MalformedIdentity(String),
    #[error("sidecar on {ticket} does not belong to the requesting thread")]
    ForeignSidecar { ticket: String },
    #[error("configuration error: {0}")]
    Configuration(String),
}

impl CoreError {
    // User variants carry text meant verbatim for the person who triggered
    // the operation; everything else is operator-facing.
    pub fn user_message(&self) -> Option<&str> {
        match self {
            Self::User(message) => Some(message),
            _ => None,
        }
    }
}
