use async_trait::async_trait;
use tracing::warn;

use crate::action::RequestAction;
use crate::actor::Actor;
use crate::adapters::{Capabilities, OutboundMessage};
use crate::error::CoreError;
use crate::identity::RequestIdentity;
use crate::request::{IntakeFields, ServiceRequest};
use crate::trigger::{ChatActionTrigger, ModalSubmissionTrigger, ThreadReplyTrigger};

// Per-action mutation in three phases. `pre_run` is synchronous and marks the
// request in flight; `run` performs the mutation and absorbs its own failures;
// `post_run` sends the follow-up notifications.
//
// `run` returning None means the trigger payload did not fit the handler and
// the cycle should drop the request. Domain failures never surface as None.
#[async_trait]
pub trait ActionHandler: Send + Sync {
    fn action(&self) -> RequestAction;

    fn pre_run(&self, mut request: ServiceRequest) -> ServiceRequest {
        request.set_working();
        request
    }

    async fn run(&self, request: ServiceRequest) -> Option<ServiceRequest>;

    async fn post_run(&self, request: ServiceRequest) -> ServiceRequest {
        request
    }
}

pub async fn execute(
    handler: &dyn ActionHandler,
    request: ServiceRequest,
) -> Option<ServiceRequest> {
    let request = handler.pre_run(request);
    let request = handler.run(request).await?;
    Some(handler.post_run(request).await)
}

// Failure policy shared by every handler. A user error is whispered back to
// whoever clicked and leaves the request as it was; anything else marks the
// request failed so the thread shows the warning state.
async fn absorb_failure(
    caps: &Capabilities,
    mut request: ServiceRequest,
    user_id: Option<&str>,
    error: CoreError,
) -> ServiceRequest {
    if let Some(message) = error.user_message() {
        if let Some(user_id) = user_id {
            if let Err(error) = caps
                .chat
                .post_ephemeral(request.identity().channel(), user_id, message)
                .await
            {
                warn!(error = %error, user_id, "could not deliver rejection message");
            }
        }
        request.recompute_state(&caps.config);
        return request;
    }

    warn!(
        error = %error,
        ticket = request.ticket_key().unwrap_or("unfiled"),
        "request mutation failed"
    );
    request.set_error(error.to_string());
    request
}

async fn post_thread_reply(caps: &Capabilities, identity: &RequestIdentity, text: &str) {
    if let Err(error) = caps
        .chat
        .post_message(OutboundMessage::thread_reply(identity, text))
        .await
    {
        warn!(error = %error, channel = identity.channel(), "thread reply failed");
    }
}

// Direct message to the reporter, skipped when the reporter acted themselves.
async fn dm_reporter(caps: &Capabilities, request: &ServiceRequest, actor_user_id: &str, text: &str) {
    let Some(reporter_id) = request
        .sidecar()
        .and_then(|sidecar| sidecar.reporter_id.clone())
    else {
        return;
    };
    if reporter_id == actor_user_id {
        return;
    }
    if let Err(error) = caps
        .chat
        .post_message(OutboundMessage::text(reporter_id, text))
        .await
    {
        warn!(error = %error, "reporter notification failed");
    }
}

pub struct CreateHandler {
    caps: Capabilities,
    trigger: ModalSubmissionTrigger,
}

impl CreateHandler {
    pub fn new(caps: Capabilities, trigger: ModalSubmissionTrigger) -> Self {
        Self { caps, trigger }
    }
}

#[async_trait]
impl ActionHandler for CreateHandler {
    fn action(&self) -> RequestAction {
        RequestAction::Create
    }

    async fn run(&self, request: ServiceRequest) -> Option<ServiceRequest> {
        if let Some(key) = request.ticket_key().map(str::to_owned) {
            let error = CoreError::User(format!("This thread is already tracked as {key}."));
            return Some(
                absorb_failure(&self.caps, request, Some(&self.trigger.user_id), error).await,
            );
        }

        let fields = IntakeFields {
            title: self.trigger.title.clone(),
            description: self.trigger.description.clone(),
            priority: self.trigger.priority.clone(),
            component: self.trigger.component.clone(),
        };
        let reporter = Actor::from_chat_user(self.trigger.user_id.clone());
        match ServiceRequest::create(&self.caps, request.identity().clone(), fields, reporter).await
        {
            Ok(created) => Some(created),
            Err(error) => {
                Some(absorb_failure(&self.caps, request, Some(&self.trigger.user_id), error).await)
            }
        }
    }

    async fn post_run(&self, request: ServiceRequest) -> ServiceRequest {
        if request.last_applied() != Some(RequestAction::Create) {
            return request;
        }
        let Some(ticket) = request.ticket() else {
            return request;
        };

        let url = self.caps.tracker.browse_url(&ticket.key);
        post_thread_reply(
            &self.caps,
            request.identity(),
            &format!("Filed <{url}|{}> for this thread.", ticket.key),
        )
        .await;

        if let Some(channel) = request
            .sidecar()
            .and_then(|sidecar| sidecar.notification_channel_id.clone())
        {
            let text = format!("New request <{url}|{}>: {}", ticket.key, ticket.summary);
            if let Err(error) = self
                .caps
                .chat
                .post_message(OutboundMessage::text(channel, text))
                .await
            {
                warn!(error = %error, ticket = %ticket.key, "notification channel post failed");
            }
        }
        request
    }
}

pub struct ClaimHandler {
    caps: Capabilities,
    trigger: ChatActionTrigger,
}

impl ClaimHandler {
    pub fn new(caps: Capabilities, trigger: ChatActionTrigger) -> Self {
        Self { caps, trigger }
    }
}

#[async_trait]
impl ActionHandler for ClaimHandler {
    fn action(&self) -> RequestAction {
        RequestAction::Claim
    }

    async fn run(&self, mut request: ServiceRequest) -> Option<ServiceRequest> {
        let claimer = Actor::from_chat_user(self.trigger.user_id.clone());
        match request.claim(&self.caps, claimer).await {
            Ok(()) => Some(request),
            Err(error) => {
                Some(absorb_failure(&self.caps, request, Some(&self.trigger.user_id), error).await)
            }
        }
    }

    async fn post_run(&self, request: ServiceRequest) -> ServiceRequest {
        if request.last_applied() != Some(RequestAction::Claim) {
            return request;
        }
        let label = request
            .claimer
            .as_ref()
            .map(Actor::display_label)
            .unwrap_or("someone")
            .to_owned();
        post_thread_reply(&self.caps, request.identity(), &format!("Claimed by {label}."))
            .await;
        if let Some(key) = request.ticket_key() {
            let text = format!("Your request {key} was claimed by {label}.");
            dm_reporter(&self.caps, &request, &self.trigger.user_id, &text).await;
        }
        request
    }
}

pub struct CompleteHandler {
    caps: Capabilities,
    trigger: ChatActionTrigger,
}

impl CompleteHandler {
    pub fn new(caps: Capabilities, trigger: ChatActionTrigger) -> Self {
        Self { caps, trigger }
    }
}

#[async_trait]
impl ActionHandler for CompleteHandler {
    fn action(&self) -> RequestAction {
        RequestAction::Complete
    }

    async fn run(&self, mut request: ServiceRequest) -> Option<ServiceRequest> {
        let closer = Actor::from_chat_user(self.trigger.user_id.clone());
        match request.complete(&self.caps, closer).await {
            Ok(()) => Some(request),
            Err(error) => {
                Some(absorb_failure(&self.caps, request, Some(&self.trigger.user_id), error).await)
            }
        }
    }

    async fn post_run(&self, request: ServiceRequest) -> ServiceRequest {
        if request.last_applied() != Some(RequestAction::Complete) {
            return request;
        }
        let label = request
            .closer
            .as_ref()
            .map(Actor::display_label)
            .unwrap_or("someone")
            .to_owned();
        post_thread_reply(
            &self.caps,
            request.identity(),
            &format!("Completed by {label}."),
        )
        .await;
        if let Some(key) = request.ticket_key() {
            let text = format!("Your request {key} was completed by {label}.");
            dm_reporter(&self.caps, &request, &self.trigger.user_id, &text).await;
        }
        request
    }
}

pub struct CancelHandler {
    caps: Capabilities,
    trigger: ChatActionTrigger,
}

impl CancelHandler {
    pub fn new(caps: Capabilities, trigger: ChatActionTrigger) -> Self {
        Self { caps, trigger }
    }
}

#[async_trait]
impl ActionHandler for CancelHandler {
    fn action(&self) -> RequestAction {
        RequestAction::Cancel
    }

    async fn run(&self, mut request: ServiceRequest) -> Option<ServiceRequest> {
        let closer = Actor::from_chat_user(self.trigger.user_id.clone());
        match request.cancel(&self.caps, closer).await {
            Ok(()) => Some(request),
            Err(error) => {
                Some(absorb_failure(&self.caps, request, Some(&self.trigger.user_id), error).await)
            }
        }
    }

    async fn post_run(&self, request: ServiceRequest) -> ServiceRequest {
        if request.last_applied() != Some(RequestAction::Cancel) {
            return request;
        }
        let label = request
            .closer
            .as_ref()
            .map(Actor::display_label)
            .unwrap_or("someone")
            .to_owned();
        post_thread_reply(
            &self.caps,
            request.identity(),
            &format!("Cancelled by {label}."),
        )
        .await;
        if let Some(key) = request.ticket_key() {
            let text = format!("Your request {key} was cancelled by {label}.");
            dm_reporter(&self.caps, &request, &self.trigger.user_id, &text).await;
        }
        request
    }
}

// Mirrors thread replies into the ticket. Deliberately silent in chat; the
// author is watching their own message post.
pub struct CommentHandler {
    caps: Capabilities,
    trigger: ThreadReplyTrigger,
}

impl CommentHandler {
    pub fn new(caps: Capabilities, trigger: ThreadReplyTrigger) -> Self {
        Self { caps, trigger }
    }
}

#[async_trait]
impl ActionHandler for CommentHandler {
    fn action(&self) -> RequestAction {
        RequestAction::RelayComment
    }

    // A relay never shows a spinner; the action message is not involved.
    fn pre_run(&self, request: ServiceRequest) -> ServiceRequest {
        request
    }

    async fn run(&self, mut request: ServiceRequest) -> Option<ServiceRequest> {
        let author = Actor::from_chat_user(self.trigger.user_id.clone());
        match request
            .relay_comment(&self.caps, author, &self.trigger.text)
            .await
        {
            Ok(()) => Some(request),
            Err(error) => Some(absorb_failure(&self.caps, request, None, error).await),
        }
    }
}

pub struct PageHandler {
    caps: Capabilities,
    trigger: ChatActionTrigger,
}

impl PageHandler {
    pub fn new(caps: Capabilities, trigger: ChatActionTrigger) -> Self {
        Self { caps, trigger }
    }
}

#[async_trait]
impl ActionHandler for PageHandler {
    fn action(&self) -> RequestAction {
        RequestAction::Page
    }

    async fn run(&self, mut request: ServiceRequest) -> Option<ServiceRequest> {
        let requester = Actor::from_chat_user(self.trigger.user_id.clone());
        match request
            .page(&self.caps, requester, self.trigger.value.as_deref())
            .await
        {
            Ok(()) => Some(request),
            Err(error) => {
                Some(absorb_failure(&self.caps, request, Some(&self.trigger.user_id), error).await)
            }
        }
    }

    async fn post_run(&self, request: ServiceRequest) -> ServiceRequest {
        if request.last_applied() != Some(RequestAction::Page) {
            return request;
        }
        post_thread_reply(
            &self.caps,
            request.identity(),
            "The on-call has been paged for this request.",
        )
        .await;
        request
    }
}

// Reacts to ticket edits made directly in the tracker. The fresh state was
// already derived while resolving the webhook; this handler only has to let
// the cycle re-render it. No chat announcements: the rendered action message
// is the notification.
pub struct ChangeHandler;

#[async_trait]
impl ActionHandler for ChangeHandler {
    fn action(&self) -> RequestAction {
        RequestAction::TicketChanged
    }

    fn pre_run(&self, request: ServiceRequest) -> ServiceRequest {
        request
    }

    async fn run(&self, request: ServiceRequest) -> Option<ServiceRequest> {
        Some(request)
    }
}
