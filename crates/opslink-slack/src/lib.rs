//! Slack integration: the `ChatClient` over the Web API, the Block Kit
//! thread renderer, and the parsers that turn interactivity payloads and
//! event callbacks into typed triggers.

pub mod client;
pub mod event;
pub mod interaction;
pub mod render;
pub mod transport;

pub use client::SlackClient;
pub use event::{message_text, parse_event, SlackEvent};
pub use interaction::parse_interaction;
pub use render::{SlackThreadRenderer, DEFAULT_PRIORITY_OPTIONS};
pub use transport::{ReqwestWebTransport, SlackConfig, WebTransport};
