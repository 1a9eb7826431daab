use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::warn;

use crate::action::RequestAction;
use crate::adapters::Capabilities;
use crate::handlers::{
    self, CancelHandler, ChangeHandler, ClaimHandler, CommentHandler, CompleteHandler,
    CreateHandler, PageHandler,
};
use crate::render::{ActionButton, RenderField, RenderState};
use crate::request::ServiceRequest;
use crate::state::RequestState;
use crate::trigger::TriggerEvent;

// What the synchronous walk should do after a flow's immediate step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlowDirective {
    Continue,
    // Stop walking and dispatch nothing; the trigger is fully answered.
    HaltAll,
    // Stop walking but still dispatch the flows collected so far.
    FinishAfter,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ImmediateOutcome {
    pub directive: FlowDirective,
    pub response: Option<Value>,
}

impl ImmediateOutcome {
    pub fn proceed() -> Self {
        Self {
            directive: FlowDirective::Continue,
            response: None,
        }
    }

    pub fn respond(response: Value) -> Self {
        Self {
            directive: FlowDirective::Continue,
            response: Some(response),
        }
    }
}

impl Default for ImmediateOutcome {
    fn default() -> Self {
        Self::proceed()
    }
}

// One unit of orchestration. Flows declare which actions they care about,
// optionally answer the trigger synchronously, mutate the request in the
// background dispatch, and contribute to the rendered thread state.
#[async_trait]
pub trait Flow: Send + Sync {
    fn name(&self) -> &'static str;

    // Lower runs earlier, both in the synchronous walk and in dispatch.
    fn priority(&self) -> u8;

    fn handles(&self, action: RequestAction) -> bool;

    // Runs on the intake task while the trigger's HTTP exchange is still
    // open. Must not block; anything slow belongs in `handle`.
    fn immediate(&self, _trigger: &TriggerEvent) -> ImmediateOutcome {
        ImmediateOutcome::proceed()
    }

    // Background mutation step. None reports that the flow failed or could
    // not act; the cycle then drops its render contribution.
    async fn handle(
        &self,
        trigger: &TriggerEvent,
        request: ServiceRequest,
    ) -> Option<ServiceRequest>;

    fn render_contribution(&self, _request: &ServiceRequest) -> RenderState {
        RenderState::default()
    }
}

pub fn standard_flows(caps: &Capabilities) -> Vec<Arc<dyn Flow>> {
    vec![
        Arc::new(IntakeFlow::new(caps.clone())),
        Arc::new(LifecycleFlow::new(caps.clone())),
        Arc::new(RelayFlow::new(caps.clone())),
        Arc::new(EscalationFlow::new(caps.clone())),
    ]
}

// Files new requests: the create button opens the intake modal, the modal
// submission becomes a ticket.
pub struct IntakeFlow {
    caps: Capabilities,
}

impl IntakeFlow {
    pub fn new(caps: Capabilities) -> Self {
        Self { caps }
    }
}

#[async_trait]
impl Flow for IntakeFlow {
    fn name(&self) -> &'static str {
        "intake"
    }

    fn priority(&self) -> u8 {
        10
    }

    fn handles(&self, action: RequestAction) -> bool {
        action == RequestAction::Create
    }

    async fn handle(
        &self,
        trigger: &TriggerEvent,
        request: ServiceRequest,
    ) -> Option<ServiceRequest> {
        match trigger {
            TriggerEvent::ChatAction(action) => {
                if let Some(key) = request.ticket_key() {
                    let text = format!("This thread is already tracked as {key}.");
                    if let Err(error) = self
                        .caps
                        .chat
                        .post_ephemeral(action.identity.channel(), &action.user_id, &text)
                        .await
                    {
                        warn!(error = %error, "could not deliver duplicate-create notice");
                    }
                    return Some(request);
                }

                let Some(trigger_id) = action.trigger_id.as_deref() else {
                    warn!(
                        channel = action.identity.channel(),
                        "create action arrived without a modal trigger id"
                    );
                    return None;
                };
                let view = self.caps.renderer.intake_view(request.identity());
                if let Err(error) = self.caps.chat.open_modal(trigger_id, view).await {
                    warn!(error = %error, "intake modal failed to open");
                }
                Some(request)
            }
            TriggerEvent::ModalSubmission(submission) => {
                let handler = CreateHandler::new(self.caps.clone(), submission.clone());
                handlers::execute(&handler, request).await
            }
            _ => None,
        }
    }

    fn render_contribution(&self, request: &ServiceRequest) -> RenderState {
        let Some(ticket) = request.ticket() else {
            return RenderState::default();
        };

        let mut view = RenderState::default();
        view.fields.push(RenderField::new("Ticket", ticket.key.clone()));
        if let Some(reporter) = &request.reporter {
            if reporter.display_name().is_some() {
                view.fields
                    .push(RenderField::new("Requested by", reporter.display_label()));
            }
        }
        view.actions.push(ActionButton::link(
            RequestAction::View,
            self.caps.tracker.browse_url(&ticket.key),
        ));
        view
    }
}

// Drives the claim / complete / cancel transitions and absorbs ticket edits
// made directly in the tracker.
pub struct LifecycleFlow {
    caps: Capabilities,
}

impl LifecycleFlow {
    pub fn new(caps: Capabilities) -> Self {
        Self { caps }
    }
}

#[async_trait]
impl Flow for LifecycleFlow {
    fn name(&self) -> &'static str {
        "lifecycle"
    }

    fn priority(&self) -> u8 {
        20
    }

    fn handles(&self, action: RequestAction) -> bool {
        matches!(
            action,
            RequestAction::Claim
                | RequestAction::Complete
                | RequestAction::Cancel
                | RequestAction::TicketChanged
        )
    }

    // Swap the clicked buttons for a spinner right away; the dispatch will
    // repaint the real state when it lands.
    fn immediate(&self, trigger: &TriggerEvent) -> ImmediateOutcome {
        let TriggerEvent::ChatAction(_) = trigger else {
            return ImmediateOutcome::proceed();
        };
        ImmediateOutcome::respond(json!({
            "replace_original": true,
            "text": format!(
                "{} {}",
                RequestState::Working.icon(),
                RequestState::Working.label()
            ),
        }))
    }

    async fn handle(
        &self,
        trigger: &TriggerEvent,
        request: ServiceRequest,
    ) -> Option<ServiceRequest> {
        match trigger {
            TriggerEvent::ChatAction(action) => match action.action {
                RequestAction::Claim => {
                    let handler = ClaimHandler::new(self.caps.clone(), action.clone());
                    handlers::execute(&handler, request).await
                }
                RequestAction::Complete => {
                    let handler = CompleteHandler::new(self.caps.clone(), action.clone());
                    handlers::execute(&handler, request).await
                }
                RequestAction::Cancel => {
                    let handler = CancelHandler::new(self.caps.clone(), action.clone());
                    handlers::execute(&handler, request).await
                }
                _ => None,
            },
            TriggerEvent::TicketChanged(_) => handlers::execute(&ChangeHandler, request).await,
            _ => None,
        }
    }

    fn render_contribution(&self, request: &ServiceRequest) -> RenderState {
        request.lifecycle_view()
    }
}

// Mirrors thread chatter into the ticket's comment stream.
pub struct RelayFlow {
    caps: Capabilities,
}

impl RelayFlow {
    pub fn new(caps: Capabilities) -> Self {
        Self { caps }
    }
}

#[async_trait]
impl Flow for RelayFlow {
    fn name(&self) -> &'static str {
        "relay"
    }

    fn priority(&self) -> u8 {
        30
    }

    fn handles(&self, action: RequestAction) -> bool {
        action == RequestAction::RelayComment
    }

    async fn handle(
        &self,
        trigger: &TriggerEvent,
        request: ServiceRequest,
    ) -> Option<ServiceRequest> {
        let TriggerEvent::ThreadReply(reply) = trigger else {
            return None;
        };
        let handler = CommentHandler::new(self.caps.clone(), reply.clone());
        handlers::execute(&handler, request).await
    }
}

// Pages the on-call for requests whose priority warrants it.
pub struct EscalationFlow {
    caps: Capabilities,
}

impl EscalationFlow {
    pub fn new(caps: Capabilities) -> Self {
        Self { caps }
    }
}

#[async_trait]
impl Flow for EscalationFlow {
    fn name(&self) -> &'static str {
        "escalation"
    }

    fn priority(&self) -> u8 {
        40
    }

    fn handles(&self, action: RequestAction) -> bool {
        action == RequestAction::Page
    }

    async fn handle(
        &self,
        trigger: &TriggerEvent,
        request: ServiceRequest,
    ) -> Option<ServiceRequest> {
        let TriggerEvent::ChatAction(action) = trigger else {
            return None;
        };
        let handler = PageHandler::new(self.caps.clone(), action.clone());
        handlers::execute(&handler, request).await
    }

    fn render_contribution(&self, request: &ServiceRequest) -> RenderState {
        let mut view = RenderState::default();
        if request.last_applied() == Some(RequestAction::Page) {
            view.fields.push(RenderField::new("On-call", "paged"));
            return view;
        }

        let Some(ticket) = request.ticket() else {
            return view;
        };
        if !request.state().is_terminal()
            && self
                .caps
                .config
                .priority_qualifies_for_page(ticket.priority.as_deref())
        {
            view.actions.push(ActionButton::new(RequestAction::Page));
        }
        view
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::identity::RequestIdentity;
    use crate::test_support::test_capabilities;
    use crate::trigger::ChatActionTrigger;

    fn create_button(trigger_id: Option<&str>) -> TriggerEvent {
        TriggerEvent::ChatAction(ChatActionTrigger {
            action: RequestAction::Create,
            identity: RequestIdentity::new("C1", "100.1"),
            user_id: "U1".to_owned(),
            message_ts: "100.1".to_owned(),
            trigger_id: trigger_id.map(str::to_owned),
            value: None,
        })
    }

    #[tokio::test]
    async fn intake_flow_opens_modal_for_create_button() {
        let (caps, fixtures) = test_capabilities();
        let flow = IntakeFlow::new(caps);
        let request = ServiceRequest::new(RequestIdentity::new("C1", "100.1"));

        let result = flow.handle(&create_button(Some("trig-1")), request).await;
        assert!(result.is_some());
        let modals = fixtures.chat.modals();
        assert_eq!(modals.len(), 1);
        assert_eq!(modals[0].trigger_id, "trig-1");
    }

    #[tokio::test]
    async fn intake_flow_requires_trigger_id_for_modal() {
        let (caps, fixtures) = test_capabilities();
        let flow = IntakeFlow::new(caps);
        let request = ServiceRequest::new(RequestIdentity::new("C1", "100.1"));

        let result = flow.handle(&create_button(None), request).await;
        assert!(result.is_none());
        assert!(fixtures.chat.modals().is_empty());
    }

    #[tokio::test]
    async fn intake_flow_whispers_on_create_for_tracked_thread() {
        let (caps, fixtures) = test_capabilities();
        let identity = RequestIdentity::new("C1", "100.1");
        fixtures.tracker.seed_managed_issue("OPS-1", "To Do", &identity);
        let request = crate::request::lookup_by_identity(&caps, &identity)
            .await
            .expect("lookup")
            .expect("managed request");

        let flow = IntakeFlow::new(caps);
        let result = flow.handle(&create_button(Some("trig-1")), request).await;
        assert!(result.is_some());
        assert!(fixtures.chat.modals().is_empty());
        assert_eq!(fixtures.chat.ephemerals().len(), 1);
    }

    #[test]
    fn lifecycle_immediate_replaces_buttons_with_spinner() {
        let (caps, _fixtures) = test_capabilities();
        let flow = LifecycleFlow::new(caps);

        let outcome = flow.immediate(&TriggerEvent::ChatAction(ChatActionTrigger {
            action: RequestAction::Claim,
            identity: RequestIdentity::new("C1", "100.1"),
            user_id: "U1".to_owned(),
            message_ts: "100.2".to_owned(),
            trigger_id: None,
            value: None,
        }));

        assert_eq!(outcome.directive, FlowDirective::Continue);
        let response = outcome.response.expect("synchronous response");
        assert_eq!(response["replace_original"], true);
        assert!(response["text"]
            .as_str()
            .expect("text is a string")
            .contains("Working"));
    }

    #[test]
    fn lifecycle_immediate_ignores_webhooks() {
        let (caps, _fixtures) = test_capabilities();
        let flow = LifecycleFlow::new(caps);

        let outcome = flow.immediate(&TriggerEvent::TicketChanged(
            crate::trigger::TicketChangedTrigger {
                issue_key: "OPS-1".to_owned(),
                changed: vec![],
                actor_account_id: None,
                issue: None,
                properties: None,
            },
        ));
        assert_eq!(outcome, ImmediateOutcome::proceed());
    }

    #[tokio::test]
    async fn escalation_contribution_offers_page_only_when_qualifying() {
        let (caps, fixtures) = test_capabilities();
        let identity = RequestIdentity::new("C1", "100.1");
        fixtures.tracker.seed_managed_issue("OPS-1", "To Do", &identity);
        fixtures.tracker.set_priority("OPS-1", Some("Highest"));

        let flow = EscalationFlow::new(caps.clone());
        let request = crate::request::lookup_by_identity(&caps, &identity)
            .await
            .expect("lookup")
            .expect("managed request");

        let view = flow.render_contribution(&request);
        assert!(view
            .actions
            .iter()
            .any(|button| button.action == RequestAction::Page));

        fixtures.tracker.set_priority("OPS-1", Some("Low"));
        let request = crate::request::lookup_by_identity(&caps, &identity)
            .await
            .expect("lookup")
            .expect("managed request");
        let view = flow.render_contribution(&request);
        assert!(view.actions.is_empty());
    }

    #[tokio::test]
    async fn intake_contribution_links_out_to_the_ticket() {
        let (caps, fixtures) = test_capabilities();
        let identity = RequestIdentity::new("C1", "100.1");
        fixtures.tracker.seed_managed_issue("OPS-1", "To Do", &identity);

        let flow = IntakeFlow::new(caps.clone());
        let request = crate::request::lookup_by_identity(&caps, &identity)
            .await
            .expect("lookup")
            .expect("managed request");

        let view = flow.render_contribution(&request);
        assert!(view
            .fields
            .iter()
            .any(|field| field.label == "Ticket" && field.value == "OPS-1"));
        let link = view
            .actions
            .iter()
            .find(|button| button.action == RequestAction::View)
            .expect("view button");
        assert!(link.url.as_deref().expect("url").contains("OPS-1"));
    }
}
