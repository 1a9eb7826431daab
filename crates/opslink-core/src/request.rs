use tracing::warn;

use crate::action::RequestAction;
use crate::actor::Actor;
use crate::adapters::{
    Capabilities, IncidentRequest, IssueEdit, IssueStatus, MessageRef, NewIssue, TrackerIssue,
    TransitionRequest,
};
use crate::config::{ModuleConfig, FALLBACK_RESOLUTION_ID};
use crate::error::CoreError;
use crate::identity::RequestIdentity;
use crate::render::{ActionButton, RenderField, RenderState};
use crate::sidecar::SidecarProperties;
use crate::state::{derive_state, RequestState};
use crate::trigger::{TicketChangedTrigger, TriggerEvent};

pub const MAX_SUMMARY_CHARS: usize = 255;
const SUMMARY_ELLIPSIS: char = '…';

const NO_TICKET_REPLY: &str = "I can't find a ticket for this thread.";

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IntakeFields {
    pub title: String,
    pub description: String,
    pub priority: Option<String>,
    pub component: Option<String>,
}

// The aggregate root. Rebuilt from the tracker on every trigger; the only
// durable piece is the sidecar stored on the ticket. The ticket and sidecar
// are attached together or not at all.
#[derive(Debug, Clone, PartialEq)]
pub struct ServiceRequest {
    identity: RequestIdentity,
    ticket: Option<TrackerIssue>,
    sidecar: Option<SidecarProperties>,
    pub reporter: Option<Actor>,
    pub claimer: Option<Actor>,
    pub closer: Option<Actor>,
    state: RequestState,
    status_note: Option<String>,
    applied: Option<RequestAction>,
}

impl ServiceRequest {
    pub fn new(identity: RequestIdentity) -> Self {
        Self {
            identity,
            ticket: None,
            sidecar: None,
            reporter: None,
            claimer: None,
            closer: None,
            state: RequestState::Unknown,
            status_note: None,
            applied: None,
        }
    }

    pub fn identity(&self) -> &RequestIdentity {
        &self.identity
    }

    pub fn ticket(&self) -> Option<&TrackerIssue> {
        self.ticket.as_ref()
    }

    pub fn sidecar(&self) -> Option<&SidecarProperties> {
        self.sidecar.as_ref()
    }

    pub fn state(&self) -> RequestState {
        self.state
    }

    pub fn status_note(&self) -> Option<&str> {
        self.status_note.as_deref()
    }

    pub fn has_ticket(&self) -> bool {
        self.ticket.is_some()
    }

    // Which mutation this cycle actually applied, if any. Notification steps
    // key off this rather than the state, which a rejected run leaves as-is.
    pub fn last_applied(&self) -> Option<RequestAction> {
        self.applied
    }

    pub fn ticket_key(&self) -> Option<&str> {
        self.ticket.as_ref().map(|ticket| ticket.key.as_str())
    }

    // Gate subject: the ticket key once one exists, otherwise the identity
    // token so intake double-fires are caught too.
    pub fn gate_subject(&self) -> String {
        match self.ticket_key() {
            Some(key) => key.to_owned(),
            None => self.identity.token(),
        }
    }

    pub fn action_message(&self) -> Option<MessageRef> {
        let sidecar = self.sidecar.as_ref()?;
        let ts = sidecar.action_message_ts.as_deref()?;
        Some(MessageRef::new(self.identity.channel(), ts))
    }

    pub fn set_action_message_ts(&mut self, ts: impl Into<String>) {
        if let Some(sidecar) = &mut self.sidecar {
            sidecar.action_message_ts = Some(ts.into());
        }
    }

    pub fn set_working(&mut self) {
        if !self.state.is_terminal() {
            self.state = RequestState::Working;
        }
    }

    pub fn set_error(&mut self, note: impl Into<String>) {
        self.state = RequestState::Error;
        self.status_note = Some(note.into());
    }

    // Drops an optimistic Working marker by re-deriving from the ticket.
    pub fn recompute_state(&mut self, config: &ModuleConfig) {
        self.state = match &self.ticket {
            Some(issue) => derive_state(
                &issue.status.category,
                issue.resolution.as_deref(),
                &config.done_resolution,
            ),
            None => RequestState::Unknown,
        };
    }

    pub fn attach_ticket(
        &mut self,
        issue: TrackerIssue,
        sidecar: SidecarProperties,
        config: &ModuleConfig,
    ) -> Result<(), CoreError> {
        if !sidecar.matches(&self.identity) {
            return Err(CoreError::ForeignSidecar { ticket: issue.key });
        }
        self.seed_participants(&sidecar);
        self.sidecar = Some(sidecar);
        self.apply_issue(issue, config);
        Ok(())
    }

    pub fn apply_issue(&mut self, issue: TrackerIssue, config: &ModuleConfig) {
        self.state = derive_state(
            &issue.status.category,
            issue.resolution.as_deref(),
            &config.done_resolution,
        );
        self.ticket = Some(issue);
    }

    fn seed_participants(&mut self, sidecar: &SidecarProperties) {
        if self.reporter.is_none() {
            self.reporter = sidecar.reporter_id.clone().map(Actor::from_chat_user);
        }
        if self.claimer.is_none() {
            self.claimer = sidecar.claimer_id.clone().map(Actor::from_chat_user);
        }
        if self.closer.is_none() {
            self.closer = sidecar.closer_id.clone().map(Actor::from_chat_user);
        }
    }

    fn require_ticket_key(&self) -> Result<String, CoreError> {
        self.ticket
            .as_ref()
            .map(|ticket| ticket.key.clone())
            .ok_or_else(|| CoreError::User(NO_TICKET_REPLY.to_owned()))
    }

    pub async fn persist_sidecar(&self, caps: &Capabilities) -> Result<(), CoreError> {
        let (Some(ticket), Some(sidecar)) = (&self.ticket, &self.sidecar) else {
            return Ok(());
        };
        caps.tracker
            .set_issue_property(&ticket.key, &caps.config.property_key, sidecar.to_value()?)
            .await
    }

    // Files the ticket for a brand-new request. Base-issue creation and the
    // sidecar write must succeed; epic and reporter linkage are each wrapped
    // so their failure cannot lose the ticket.
    pub async fn create(
        caps: &Capabilities,
        identity: RequestIdentity,
        fields: IntakeFields,
        mut reporter: Actor,
    ) -> Result<ServiceRequest, CoreError> {
        if !identity.is_complete() {
            return Err(CoreError::MalformedIdentity(
                "cannot create a request without channel and thread".to_owned(),
            ));
        }

        let (summary, description) = normalize_summary(&fields.title, &fields.description);
        if summary.is_empty() {
            return Err(CoreError::User("A request needs a title.".to_owned()));
        }

        let priority = verify_priority(caps, fields.priority.as_deref()).await;
        let component = verify_component(caps, fields.component.as_deref()).await;

        let issue = caps
            .tracker
            .create_issue(NewIssue {
                project_key: caps.config.project_key.clone(),
                issue_type: caps.config.issue_type.clone(),
                summary,
                description,
                labels: vec![identity.token()],
                priority,
                component,
            })
            .await?;

        let mut sidecar = SidecarProperties::for_identity(&identity);
        sidecar.notification_channel_id = caps.config.notification_channel.clone();
        sidecar.reporter_id = reporter.chat_user_id.clone();
        caps.tracker
            .set_issue_property(&issue.key, &caps.config.property_key, sidecar.to_value()?)
            .await?;

        if let Some(epic_key) = &caps.config.epic_key {
            let edit = IssueEdit {
                parent_key: Some(epic_key.clone()),
                ..IssueEdit::default()
            };
            if let Err(error) = caps.tracker.edit_issue(&issue.key, edit).await {
                warn!(error = %error, ticket = %issue.key, "epic linkage failed");
            }
        }

        caps.directory.load_best_profile(&mut reporter).await;
        if let Some(account_id) = reporter.tracker_account_id.clone() {
            let edit = IssueEdit {
                reporter_account_id: Some(account_id),
                ..IssueEdit::default()
            };
            if let Err(error) = caps.tracker.edit_issue(&issue.key, edit).await {
                warn!(error = %error, ticket = %issue.key, "reporter linkage failed");
            }
        }

        let mut request = ServiceRequest::new(identity);
        request.attach_ticket(issue, sidecar, &caps.config)?;
        request.reporter = Some(reporter);
        request.applied = Some(RequestAction::Create);
        Ok(request)
    }

    pub async fn claim(&mut self, caps: &Capabilities, mut claimer: Actor) -> Result<(), CoreError> {
        let key = self.require_ticket_key()?;
        if self.state != RequestState::Todo {
            return Err(CoreError::User(format!(
                "This request can't be claimed; it is already {}.",
                self.state.label().to_lowercase()
            )));
        }

        caps.directory.load_best_profile(&mut claimer).await;
        let account_id = claimer.tracker_account_id.clone().ok_or_else(|| {
            CoreError::User(
                "I couldn't match your chat account to a tracker user, so the ticket can't be assigned to you."
                    .to_owned(),
            )
        })?;

        caps.tracker
            .edit_issue(
                &key,
                IssueEdit {
                    assignee_account_id: Some(account_id.clone()),
                    ..IssueEdit::default()
                },
            )
            .await?;
        verify_transition(caps, &key, &caps.config.start_transition_id).await;
        caps.tracker
            .transition_issue(
                &key,
                TransitionRequest {
                    transition_id: caps.config.start_transition_id.clone(),
                    resolution_id: None,
                },
            )
            .await?;

        if let Some(sidecar) = &mut self.sidecar {
            sidecar.claimer_id = claimer.chat_user_id.clone();
        }
        self.persist_sidecar(caps).await?;

        // Mirror the transition locally; the next webhook confirms it.
        if let Some(issue) = &mut self.ticket {
            issue.status = IssueStatus {
                name: "In Progress".to_owned(),
                category: "In Progress".to_owned(),
            };
            issue.assignee_id = Some(account_id);
        }
        self.state = RequestState::Claimed;
        self.status_note = None;
        self.claimer = Some(claimer);
        self.applied = Some(RequestAction::Claim);
        Ok(())
    }

    pub async fn complete(
        &mut self,
        caps: &Capabilities,
        mut closer: Actor,
    ) -> Result<(), CoreError> {
        let key = self.require_ticket_key()?;
        match self.state {
            RequestState::Claimed => {}
            RequestState::Todo => {
                return Err(CoreError::User(
                    "This request hasn't been claimed yet; claim it before completing.".to_owned(),
                ))
            }
            other => {
                return Err(CoreError::User(format!(
                    "This request can't be completed; it is {}.",
                    other.label().to_lowercase()
                )))
            }
        }

        let resolution_id = resolve_resolution_id(caps, &caps.config.done_resolution).await;
        verify_transition(caps, &key, &caps.config.resolve_transition_id).await;
        caps.tracker
            .transition_issue(
                &key,
                TransitionRequest {
                    transition_id: caps.config.resolve_transition_id.clone(),
                    resolution_id: Some(resolution_id),
                },
            )
            .await?;

        caps.directory.load_best_profile(&mut closer).await;
        if let Some(sidecar) = &mut self.sidecar {
            sidecar.closer_id = closer.chat_user_id.clone();
        }
        self.persist_sidecar(caps).await?;

        if let Some(issue) = &mut self.ticket {
            issue.status = IssueStatus {
                name: "Done".to_owned(),
                category: "Done".to_owned(),
            };
            issue.resolution = Some(caps.config.done_resolution.clone());
        }
        self.state = RequestState::Complete;
        self.status_note = None;
        self.closer = Some(closer);
        self.applied = Some(RequestAction::Complete);
        Ok(())
    }

    // Valid from both todo and claimed; a claimed-but-abandoned request must
    // still be dismissable.
    pub async fn cancel(&mut self, caps: &Capabilities, mut closer: Actor) -> Result<(), CoreError> {
        let key = self.require_ticket_key()?;
        if !matches!(self.state, RequestState::Todo | RequestState::Claimed) {
            return Err(CoreError::User(format!(
                "This request can't be cancelled; it is {}.",
                self.state.label().to_lowercase()
            )));
        }

        let resolution_id = resolve_resolution_id(caps, &caps.config.dismiss_resolution).await;
        verify_transition(caps, &key, &caps.config.resolve_transition_id).await;
        caps.tracker
            .transition_issue(
                &key,
                TransitionRequest {
                    transition_id: caps.config.resolve_transition_id.clone(),
                    resolution_id: Some(resolution_id),
                },
            )
            .await?;

        caps.directory.load_best_profile(&mut closer).await;
        if let Some(sidecar) = &mut self.sidecar {
            sidecar.closer_id = closer.chat_user_id.clone();
        }
        self.persist_sidecar(caps).await?;

        if let Some(issue) = &mut self.ticket {
            issue.status = IssueStatus {
                name: "Done".to_owned(),
                category: "Done".to_owned(),
            };
            issue.resolution = Some(caps.config.dismiss_resolution.clone());
        }
        self.state = RequestState::Cancelled;
        self.status_note = None;
        self.closer = Some(closer);
        self.applied = Some(RequestAction::Cancel);
        Ok(())
    }

    pub async fn relay_comment(
        &mut self,
        caps: &Capabilities,
        mut author: Actor,
        text: &str,
    ) -> Result<(), CoreError> {
        let key = self.require_ticket_key()?;
        let trimmed = text.trim();
        if trimmed.is_empty() {
            return Ok(());
        }

        caps.directory.load_best_profile(&mut author).await;
        let body = caps.directory.rewrite_mentions(trimmed).await;
        let body = format!(
            "{body}\n\n(relayed from chat, posted by {})",
            author.display_label()
        );
        caps.tracker.add_comment(&key, &body).await?;
        self.applied = Some(RequestAction::RelayComment);
        Ok(())
    }

    pub async fn page(
        &mut self,
        caps: &Capabilities,
        mut requester: Actor,
        note: Option<&str>,
    ) -> Result<(), CoreError> {
        let key = self.require_ticket_key()?;
        let (summary, priority) = match &self.ticket {
            Some(issue) => (issue.summary.clone(), issue.priority.clone()),
            None => (String::new(), None),
        };
        if !caps.config.priority_qualifies_for_page(priority.as_deref()) {
            return Err(CoreError::User(
                "This request's priority does not warrant paging the on-call.".to_owned(),
            ));
        }

        caps.directory.load_best_profile(&mut requester).await;

        let root = MessageRef::new(self.identity.channel(), self.identity.thread_ts());
        let permalink = match caps.chat.permalink(&root).await {
            Ok(link) => Some(link),
            Err(error) => {
                warn!(error = %error, ticket = %key, "permalink lookup failed");
                None
            }
        };

        let mut body = format!(
            "{summary}\n\nPaged by {} from the request thread.",
            requester.display_label()
        );
        if let Some(link) = permalink {
            body.push_str("\nThread: ");
            body.push_str(&link);
        }
        if let Some(note) = note.map(str::trim).filter(|note| !note.is_empty()) {
            body.push_str("\nNote: ");
            body.push_str(note);
        }

        caps.alerting
            .create_incident(IncidentRequest {
                title: format!("[{key}] {summary}"),
                body,
                service_id: caps.config.alert_service_id.clone(),
                escalation_policy_id: caps.config.alert_escalation_policy_id.clone(),
                from_email: requester
                    .email()
                    .map(str::to_owned)
                    .unwrap_or_else(|| caps.config.alert_from_email.clone()),
            })
            .await?;

        self.applied = Some(RequestAction::Page);
        Ok(())
    }

    pub async fn refresh(&mut self, caps: &Capabilities) -> Result<(), CoreError> {
        let key = self.require_ticket_key()?;
        let issue = caps.tracker.issue(&key).await?;
        self.apply_issue(issue, &caps.config);
        Ok(())
    }

    // Core view of the request: state icon and label plus the actions the
    // state affords. Flow contributions layer on top of this.
    pub fn lifecycle_view(&self) -> RenderState {
        let actions: Vec<ActionButton> = match self.state {
            RequestState::Todo => vec![
                ActionButton::new(RequestAction::Claim),
                ActionButton::new(RequestAction::Cancel),
            ],
            RequestState::Claimed => vec![
                ActionButton::new(RequestAction::Complete),
                ActionButton::new(RequestAction::Cancel),
            ],
            _ => vec![],
        };

        let mut fields = vec![];
        if self.state == RequestState::Claimed {
            if let Some(claimer) = &self.claimer {
                fields.push(RenderField::new("Claimed by", claimer.display_label()));
            }
        }
        if let Some(note) = &self.status_note {
            fields.push(RenderField::new("Note", note.clone()));
        }

        RenderState {
            icon: Some(self.state.icon().to_owned()),
            label: Some(self.state.label().to_owned()),
            actions,
            fields,
        }
    }
}

// Builds the request a trigger refers to. Chat triggers resolve through the
// identity-label search; tracker webhooks resolve through the sidecar.
pub async fn resolve_from_trigger(
    caps: &Capabilities,
    trigger: &TriggerEvent,
) -> Result<Option<ServiceRequest>, CoreError> {
    match trigger {
        TriggerEvent::ChatAction(action) => {
            let existing = lookup_by_identity(caps, &action.identity).await?;
            if action.action == RequestAction::Create {
                let identity = action.identity.clone();
                return Ok(Some(
                    existing.unwrap_or_else(|| ServiceRequest::new(identity)),
                ));
            }
            Ok(existing)
        }
        TriggerEvent::ModalSubmission(submission) => {
            let identity = RequestIdentity::parse_token(&submission.token)?;
            let existing = lookup_by_identity(caps, &identity).await?;
            Ok(Some(
                existing.unwrap_or_else(|| ServiceRequest::new(identity)),
            ))
        }
        TriggerEvent::ThreadReply(reply) => lookup_by_identity(caps, &reply.identity).await,
        TriggerEvent::TicketChanged(event) => from_ticket_event(caps, event).await,
    }
}

pub async fn lookup_by_identity(
    caps: &Capabilities,
    identity: &RequestIdentity,
) -> Result<Option<ServiceRequest>, CoreError> {
    if !identity.is_complete() {
        return Err(CoreError::MalformedIdentity(format!(
            "lookup with incomplete identity {identity}"
        )));
    }

    let jql = format!(
        "labels = \"{}\" AND project = \"{}\" ORDER BY created DESC",
        identity.token(),
        caps.config.project_key
    );
    let issues = caps.tracker.search_issues(&jql, 1).await?;
    let Some(issue) = issues.into_iter().next() else {
        return Ok(None);
    };

    let sidecar = match caps
        .tracker
        .issue_property(&issue.key, &caps.config.property_key)
        .await?
    {
        Some(value) => SidecarProperties::from_value(&value)?,
        // Labeled with our token but carrying no sidecar: somebody tampered
        // with the ticket. Refuse rather than guess.
        None => return Err(CoreError::ForeignSidecar { ticket: issue.key }),
    };

    let mut request = ServiceRequest::new(identity.clone());
    request.attach_ticket(issue, sidecar, &caps.config)?;
    Ok(Some(request))
}

async fn from_ticket_event(
    caps: &Capabilities,
    event: &TicketChangedTrigger,
) -> Result<Option<ServiceRequest>, CoreError> {
    let sidecar = match &event.properties {
        Some(sidecar) => sidecar.clone(),
        None => {
            match caps
                .tracker
                .issue_property(&event.issue_key, &caps.config.property_key)
                .await?
            {
                Some(value) => SidecarProperties::from_value(&value)?,
                None => return Ok(None),
            }
        }
    };

    let identity = sidecar.identity();
    if !identity.is_complete() {
        return Err(CoreError::MalformedIdentity(format!(
            "sidecar on {} lacks channel or thread",
            event.issue_key
        )));
    }

    let issue = match &event.issue {
        Some(issue) => issue.clone(),
        None => caps.tracker.issue(&event.issue_key).await?,
    };

    let mut request = ServiceRequest::new(identity);
    request.attach_ticket(issue, sidecar, &caps.config)?;
    Ok(Some(request))
}

// A configured transition id the issue no longer offers is logged and then
// attempted anyway; the tracker's own rejection carries the clearer message.
async fn verify_transition(caps: &Capabilities, key: &str, transition_id: &str) {
    match caps.tracker.transitions(key).await {
        Ok(available) => {
            if !available
                .iter()
                .any(|transition| transition.id == transition_id)
            {
                let drift = CoreError::ConfigurationDrift(format!(
                    "transition {transition_id} is not available on {key}"
                ));
                warn!(error = %drift, ticket = key, "configured transition missing");
            }
        }
        Err(error) => {
            warn!(error = %error, ticket = key, "transition listing failed");
        }
    }
}

async fn resolve_resolution_id(caps: &Capabilities, name: &str) -> String {
    match caps.tracker.resolutions().await {
        Ok(resolutions) => {
            if let Some(resolution) = resolutions
                .into_iter()
                .find(|resolution| resolution.name.eq_ignore_ascii_case(name))
            {
                return resolution.id;
            }
            let drift =
                CoreError::ConfigurationDrift(format!("resolution {name:?} not defined by tracker"));
            warn!(error = %drift, fallback = FALLBACK_RESOLUTION_ID, "falling back to default resolution");
        }
        Err(error) => {
            warn!(error = %error, fallback = FALLBACK_RESOLUTION_ID, "resolution listing failed; falling back to default resolution");
        }
    }
    FALLBACK_RESOLUTION_ID.to_owned()
}

async fn verify_priority(caps: &Capabilities, name: Option<&str>) -> Option<String> {
    let name = name.map(str::trim).filter(|name| !name.is_empty())?;
    match caps.tracker.priorities().await {
        Ok(priorities) => {
            match priorities
                .into_iter()
                .find(|priority| priority.name.eq_ignore_ascii_case(name))
            {
                Some(priority) => Some(priority.name),
                None => {
                    let drift = CoreError::ConfigurationDrift(format!(
                        "priority {name:?} not defined by tracker"
                    ));
                    warn!(error = %drift, "submitting without priority");
                    None
                }
            }
        }
        Err(error) => {
            warn!(error = %error, "priority listing failed; submitting without priority");
            None
        }
    }
}

async fn verify_component(caps: &Capabilities, name: Option<&str>) -> Option<String> {
    let name = name.map(str::trim).filter(|name| !name.is_empty())?;
    match caps.tracker.components(&caps.config.project_key).await {
        Ok(components) => {
            match components
                .into_iter()
                .find(|component| component.name.eq_ignore_ascii_case(name))
            {
                Some(component) => Some(component.name),
                None => {
                    let drift = CoreError::ConfigurationDrift(format!(
                        "component {name:?} not defined for project"
                    ));
                    warn!(error = %drift, "submitting without component");
                    None
                }
            }
        }
        Err(error) => {
            warn!(error = %error, "component listing failed; submitting without component");
            None
        }
    }
}

// Chat titles arrive messy: markup brackets, mention sigils, embedded
// newlines, and no length limit. The tracker caps summaries at 255 chars;
// what gets cut off is preserved at the head of the description.
pub fn normalize_summary(raw_title: &str, description: &str) -> (String, String) {
    let mut sanitized = String::with_capacity(raw_title.len());
    let mut last_was_space = true;
    for ch in raw_title.chars() {
        let ch = match ch {
            '\n' | '\r' | '\t' => ' ',
            '<' | '>' | '@' => continue,
            other => other,
        };
        if ch == ' ' {
            if last_was_space {
                continue;
            }
            last_was_space = true;
        } else {
            last_was_space = false;
        }
        sanitized.push(ch);
    }
    let sanitized = sanitized.trim_end().to_owned();

    if sanitized.chars().count() <= MAX_SUMMARY_CHARS {
        return (sanitized, description.to_owned());
    }

    let keep: String = sanitized.chars().take(MAX_SUMMARY_CHARS - 1).collect();
    let overflow: String = sanitized.chars().skip(MAX_SUMMARY_CHARS - 1).collect();
    let summary = format!("{keep}{SUMMARY_ELLIPSIS}");
    let description = if description.trim().is_empty() {
        format!("{SUMMARY_ELLIPSIS}{overflow}")
    } else {
        format!("{SUMMARY_ELLIPSIS}{overflow}\n\n{description}")
    };
    (summary, description)
}
