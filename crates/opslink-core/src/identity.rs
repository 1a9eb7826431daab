use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::CoreError;

pub const TOKEN_DELIMITER: &str = "||";
// Tokens minted before the delimiter change are still in circulation as
// ticket labels and modal metadata; decoding keeps accepting them.
pub const LEGACY_TOKEN_DELIMITER: &str = "::";

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RequestIdentity {
    channel: String,
    thread_ts: String,
}

impl RequestIdentity {
    pub fn new(channel: impl Into<String>, thread_ts: impl Into<String>) -> Self {
        Self {
            channel: channel.into(),
            thread_ts: thread_ts.into(),
        }
    }

    pub fn channel(&self) -> &str {
        &self.channel
    }

    pub fn thread_ts(&self) -> &str {
        &self.thread_ts
    }

    pub fn is_complete(&self) -> bool {
        !self.channel.is_empty() && !self.thread_ts.is_empty()
    }

    pub fn token(&self) -> String {
        format!("{}{TOKEN_DELIMITER}{}", self.channel, self.thread_ts)
    }

    pub fn parse_token(token: &str) -> Result<Self, CoreError> {
        let (channel, thread_ts) = token
            .split_once(TOKEN_DELIMITER)
            .or_else(|| token.split_once(LEGACY_TOKEN_DELIMITER))
            .ok_or_else(|| CoreError::MalformedIdentity(format!("no delimiter in {token:?}")))?;

        if channel.is_empty() || thread_ts.is_empty() {
            return Err(CoreError::MalformedIdentity(format!(
                "empty channel or thread in {token:?}"
            )));
        }

        Ok(Self::new(channel, thread_ts))
    }
}

impl fmt::Display for RequestIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{TOKEN_DELIMITER}{}", self.channel, self.thread_ts)
    }
}
