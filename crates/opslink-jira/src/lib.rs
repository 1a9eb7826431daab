//! Jira Cloud integration: a `TrackerClient` over REST v2 plus the webhook
//! parser that turns issue events into triggers.

pub mod client;
pub mod transport;
pub mod webhook;

pub use client::JiraClient;
pub use transport::{
    JiraConfig, ReqwestRestTransport, RestMethod, RestRequest, RestResponse, RestTransport,
};
pub use webhook::parse_webhook;
