pub mod action;
pub mod actor;
pub mod adapters;
pub mod config;
pub mod error;
pub mod flow;
pub mod gate;
pub mod handlers;
pub mod identity;
pub mod orchestrator;
pub mod render;
pub mod request;
pub mod sidecar;
pub mod state;
pub mod test_support;
pub mod trigger;

pub use action::RequestAction;
pub use actor::{Actor, ActorDirectory, ActorSeed};
pub use adapters::{
    AlertingClient, Capabilities, ChatClient, ChatProfile, IncidentRequest, IssueEdit,
    IssueStatus, MessageRef, NewIssue, OutboundMessage, ThreadRenderer, TrackerClient,
    TrackerComponent, TrackerIssue, TrackerPriority, TrackerResolution, TrackerTransition,
    TrackerUser, TransitionRequest,
};
pub use config::ModuleConfig;
pub use error::CoreError;
pub use flow::{Flow, FlowDirective, ImmediateOutcome};
pub use gate::{FlowGate, GateHold, GatePolicy};
pub use identity::RequestIdentity;
pub use orchestrator::{Orchestrator, TriggerOutcome};
pub use render::{ActionButton, RenderField, RenderState};
pub use request::ServiceRequest;
pub use sidecar::SidecarProperties;
pub use state::{derive_state, RequestState};
pub use trigger::{
    ChangedField, ChatActionTrigger, ModalSubmissionTrigger, ThreadReplyTrigger,
    TicketChangedTrigger, TriggerEvent, TriggerOrigin,
};
