//! In-memory doubles for the adapter seams, compiled into the library so
//! dependent crates can drive the orchestrator in their own tests. Nothing
//! here talks to a network.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::actor::ActorDirectory;
use crate::adapters::{
    AlertingClient, Capabilities, ChatClient, ChatProfile, IncidentRequest, IssueEdit,
    IssueStatus, MessageRef, NewIssue, OutboundMessage, ThreadRenderer, TrackerClient,
    TrackerComponent, TrackerIssue, TrackerPriority, TrackerResolution, TrackerTransition,
    TrackerUser, TransitionRequest,
};
use crate::config::ModuleConfig;
use crate::error::CoreError;
use crate::identity::RequestIdentity;
use crate::render::RenderState;
use crate::sidecar::SidecarProperties;

pub fn seeded_issue(key: &str, status: &str) -> TrackerIssue {
    TrackerIssue {
        key: key.to_owned(),
        summary: format!("{key} summary"),
        description: None,
        status: IssueStatus {
            name: status.to_owned(),
            category: status.to_owned(),
        },
        resolution: None,
        assignee_id: None,
        priority: Some("High".to_owned()),
        labels: vec![],
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum TrackerCall {
    CreateIssue { key: String },
    FetchIssue { key: String },
    EditIssue { key: String, edit: IssueEdit },
    Search { jql: String },
    ListTransitions { key: String },
    Transition { key: String, request: TransitionRequest },
    GetProperty { key: String, property: String },
    SetProperty { key: String, property: String },
    AddComment { key: String },
}

#[derive(Default)]
struct TrackerState {
    issues: HashMap<String, TrackerIssue>,
    seeded_order: Vec<String>,
    properties: HashMap<(String, String), Value>,
    users_by_email: HashMap<String, TrackerUser>,
    resolutions: Vec<TrackerResolution>,
    components: Vec<TrackerComponent>,
    priorities: Vec<TrackerPriority>,
    comments: HashMap<String, Vec<String>>,
    calls: Vec<TrackerCall>,
    fail_next: HashSet<String>,
    next_key: u32,
}

pub struct MockTracker {
    state: Mutex<TrackerState>,
}

impl Default for MockTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl MockTracker {
    pub fn new() -> Self {
        let state = TrackerState {
            resolutions: vec![
                TrackerResolution {
                    id: "10000".to_owned(),
                    name: "Done".to_owned(),
                },
                TrackerResolution {
                    id: "10001".to_owned(),
                    name: "Won't Do".to_owned(),
                },
            ],
            components: vec![
                TrackerComponent {
                    id: "10100".to_owned(),
                    name: "Network".to_owned(),
                },
                TrackerComponent {
                    id: "10101".to_owned(),
                    name: "Laptops".to_owned(),
                },
            ],
            priorities: vec![
                TrackerPriority {
                    id: "1".to_owned(),
                    name: "Highest".to_owned(),
                },
                TrackerPriority {
                    id: "2".to_owned(),
                    name: "High".to_owned(),
                },
                TrackerPriority {
                    id: "3".to_owned(),
                    name: "Medium".to_owned(),
                },
                TrackerPriority {
                    id: "4".to_owned(),
                    name: "Low".to_owned(),
                },
            ],
            next_key: 100,
            ..TrackerState::default()
        };
        Self {
            state: Mutex::new(state),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, TrackerState> {
        self.state.lock().expect("mock tracker state poisoned")
    }

    fn fail_if_ordered(state: &mut TrackerState, method: &str) -> Result<(), CoreError> {
        if state.fail_next.remove(method) {
            return Err(CoreError::Integration(format!(
                "injected {method} failure"
            )));
        }
        Ok(())
    }

    // The named trait method fails once with an integration error.
    pub fn fail_next(&self, method: &str) {
        self.lock().fail_next.insert(method.to_owned());
    }

    pub fn seed_user(&self, user: TrackerUser) {
        let mut state = self.lock();
        if let Some(email) = user.email.clone() {
            state.users_by_email.insert(email, user);
        }
    }

    pub fn seed_issue(&self, issue: TrackerIssue) {
        let mut state = self.lock();
        state.seeded_order.push(issue.key.clone());
        state.issues.insert(issue.key.clone(), issue);
    }

    // Seeds a ticket that already belongs to the given thread: labeled with
    // the identity token and carrying a matching sidecar under the default
    // property key.
    pub fn seed_managed_issue(&self, key: &str, status: &str, identity: &RequestIdentity) {
        let mut issue = seeded_issue(key, status);
        issue.labels = vec![identity.token()];
        let sidecar = SidecarProperties::for_identity(identity);
        self.seed_issue(issue);
        self.lock().properties.insert(
            (key.to_owned(), ModuleConfig::default().property_key),
            sidecar.to_value().expect("sidecar serializes"),
        );
    }

    pub fn seed_managed_issue_with_reporter(
        &self,
        key: &str,
        status: &str,
        identity: &RequestIdentity,
        reporter_id: &str,
    ) {
        let mut issue = seeded_issue(key, status);
        issue.labels = vec![identity.token()];
        let mut sidecar = SidecarProperties::for_identity(identity);
        sidecar.reporter_id = Some(reporter_id.to_owned());
        self.seed_issue(issue);
        self.lock().properties.insert(
            (key.to_owned(), ModuleConfig::default().property_key),
            sidecar.to_value().expect("sidecar serializes"),
        );
    }

    pub fn set_priority(&self, key: &str, priority: Option<&str>) {
        let mut state = self.lock();
        if let Some(issue) = state.issues.get_mut(key) {
            issue.priority = priority.map(str::to_owned);
        }
    }

    pub fn clear_resolutions(&self) {
        self.lock().resolutions.clear();
    }

    pub fn property(&self, key: &str, property: &str) -> Option<Value> {
        self.lock()
            .properties
            .get(&(key.to_owned(), property.to_owned()))
            .cloned()
    }

    pub fn comments(&self, key: &str) -> Vec<String> {
        self.lock().comments.get(key).cloned().unwrap_or_default()
    }

    pub fn calls(&self) -> Vec<TrackerCall> {
        self.lock().calls.clone()
    }

    pub fn issue_count(&self) -> usize {
        self.lock().issues.len()
    }

    pub fn stored_issue(&self, key: &str) -> Option<TrackerIssue> {
        self.lock().issues.get(key).cloned()
    }
}

#[async_trait]
impl TrackerClient for MockTracker {
    async fn health_check(&self) -> Result<(), CoreError> {
        Ok(())
    }

    async fn create_issue(&self, request: NewIssue) -> Result<TrackerIssue, CoreError> {
        let mut state = self.lock();
        Self::fail_if_ordered(&mut state, "create_issue")?;
        let key = format!("{}-{}", request.project_key, state.next_key);
        state.next_key += 1;
        state.calls.push(TrackerCall::CreateIssue { key: key.clone() });

        let issue = TrackerIssue {
            key: key.clone(),
            summary: request.summary,
            description: Some(request.description),
            status: IssueStatus {
                name: "To Do".to_owned(),
                category: "To Do".to_owned(),
            },
            resolution: None,
            assignee_id: None,
            priority: request.priority,
            labels: request.labels,
        };
        state.seeded_order.push(key.clone());
        state.issues.insert(key, issue.clone());
        Ok(issue)
    }

    async fn issue(&self, key: &str) -> Result<TrackerIssue, CoreError> {
        let mut state = self.lock();
        state.calls.push(TrackerCall::FetchIssue {
            key: key.to_owned(),
        });
        Self::fail_if_ordered(&mut state, "issue")?;
        state
            .issues
            .get(key)
            .cloned()
            .ok_or_else(|| CoreError::Integration(format!("issue {key} not found")))
    }

    async fn edit_issue(&self, key: &str, edit: IssueEdit) -> Result<(), CoreError> {
        let mut state = self.lock();
        state.calls.push(TrackerCall::EditIssue {
            key: key.to_owned(),
            edit: edit.clone(),
        });
        Self::fail_if_ordered(&mut state, "edit_issue")?;

        let issue = state
            .issues
            .get_mut(key)
            .ok_or_else(|| CoreError::Integration(format!("issue {key} not found")))?;
        if let Some(assignee) = edit.assignee_account_id {
            issue.assignee_id = Some(assignee);
        }
        Ok(())
    }

    async fn search_issues(&self, jql: &str, limit: usize) -> Result<Vec<TrackerIssue>, CoreError> {
        let mut state = self.lock();
        state.calls.push(TrackerCall::Search {
            jql: jql.to_owned(),
        });
        Self::fail_if_ordered(&mut state, "search_issues")?;

        // Good enough for the label-lookup queries the core issues: match on
        // the first quoted literal.
        let Some(label) = jql.split('"').nth(1).map(str::to_owned) else {
            return Ok(vec![]);
        };
        let matches: Vec<TrackerIssue> = state
            .seeded_order
            .iter()
            .rev()
            .filter_map(|key| state.issues.get(key))
            .filter(|issue| issue.labels.iter().any(|candidate| *candidate == label))
            .take(limit)
            .cloned()
            .collect();
        Ok(matches)
    }

    async fn transitions(&self, key: &str) -> Result<Vec<TrackerTransition>, CoreError> {
        let mut state = self.lock();
        state.calls.push(TrackerCall::ListTransitions {
            key: key.to_owned(),
        });
        Self::fail_if_ordered(&mut state, "transitions")?;
        Ok(vec![
            TrackerTransition {
                id: "21".to_owned(),
                name: "Start Progress".to_owned(),
            },
            TrackerTransition {
                id: "31".to_owned(),
                name: "Resolve".to_owned(),
            },
        ])
    }

    async fn transition_issue(
        &self,
        key: &str,
        request: TransitionRequest,
    ) -> Result<(), CoreError> {
        let mut state = self.lock();
        state.calls.push(TrackerCall::Transition {
            key: key.to_owned(),
            request: request.clone(),
        });
        Self::fail_if_ordered(&mut state, "transition_issue")?;

        let resolution_name = request.resolution_id.as_deref().map(|id| {
            state
                .resolutions
                .iter()
                .find(|resolution| resolution.id == id)
                .map(|resolution| resolution.name.clone())
                .unwrap_or_else(|| "Done".to_owned())
        });
        let issue = state
            .issues
            .get_mut(key)
            .ok_or_else(|| CoreError::Integration(format!("issue {key} not found")))?;
        match request.transition_id.as_str() {
            "21" => {
                issue.status = IssueStatus {
                    name: "In Progress".to_owned(),
                    category: "In Progress".to_owned(),
                };
            }
            "31" => {
                issue.status = IssueStatus {
                    name: "Done".to_owned(),
                    category: "Done".to_owned(),
                };
                issue.resolution = resolution_name;
            }
            other => {
                return Err(CoreError::Integration(format!(
                    "unknown transition {other}"
                )));
            }
        }
        Ok(())
    }

    async fn resolutions(&self) -> Result<Vec<TrackerResolution>, CoreError> {
        let mut state = self.lock();
        Self::fail_if_ordered(&mut state, "resolutions")?;
        Ok(state.resolutions.clone())
    }

    async fn components(&self, _project_key: &str) -> Result<Vec<TrackerComponent>, CoreError> {
        let mut state = self.lock();
        Self::fail_if_ordered(&mut state, "components")?;
        Ok(state.components.clone())
    }

    async fn priorities(&self) -> Result<Vec<TrackerPriority>, CoreError> {
        let mut state = self.lock();
        Self::fail_if_ordered(&mut state, "priorities")?;
        Ok(state.priorities.clone())
    }

    async fn user_by_email(&self, email: &str) -> Result<Option<TrackerUser>, CoreError> {
        let mut state = self.lock();
        Self::fail_if_ordered(&mut state, "user_by_email")?;
        Ok(state.users_by_email.get(email).cloned())
    }

    async fn issue_property(
        &self,
        key: &str,
        property: &str,
    ) -> Result<Option<Value>, CoreError> {
        let mut state = self.lock();
        state.calls.push(TrackerCall::GetProperty {
            key: key.to_owned(),
            property: property.to_owned(),
        });
        Self::fail_if_ordered(&mut state, "issue_property")?;
        Ok(state
            .properties
            .get(&(key.to_owned(), property.to_owned()))
            .cloned())
    }

    async fn set_issue_property(
        &self,
        key: &str,
        property: &str,
        value: Value,
    ) -> Result<(), CoreError> {
        let mut state = self.lock();
        state.calls.push(TrackerCall::SetProperty {
            key: key.to_owned(),
            property: property.to_owned(),
        });
        Self::fail_if_ordered(&mut state, "set_issue_property")?;
        state
            .properties
            .insert((key.to_owned(), property.to_owned()), value);
        Ok(())
    }

    async fn add_comment(&self, key: &str, body: &str) -> Result<(), CoreError> {
        let mut state = self.lock();
        state.calls.push(TrackerCall::AddComment {
            key: key.to_owned(),
        });
        Self::fail_if_ordered(&mut state, "add_comment")?;
        state
            .comments
            .entry(key.to_owned())
            .or_default()
            .push(body.to_owned());
        Ok(())
    }

    fn browse_url(&self, key: &str) -> String {
        format!("https://tracker.example/browse/{key}")
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct EphemeralRecord {
    pub channel: String,
    pub user_id: String,
    pub text: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ModalRecord {
    pub trigger_id: String,
    pub view: Value,
}

#[derive(Debug, Clone, PartialEq)]
pub struct UpdateRecord {
    pub target: MessageRef,
    pub text: String,
    pub blocks: Option<Value>,
}

#[derive(Default)]
struct ChatState {
    profiles: HashMap<String, ChatProfile>,
    posts: Vec<OutboundMessage>,
    updates: Vec<UpdateRecord>,
    deletes: Vec<MessageRef>,
    ephemerals: Vec<EphemeralRecord>,
    modals: Vec<ModalRecord>,
    homes: Vec<(String, Value)>,
    profile_lookups: usize,
    fail_next: HashSet<String>,
    next_ts: u32,
}

#[derive(Default)]
pub struct MockChat {
    state: Mutex<ChatState>,
}

impl MockChat {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, ChatState> {
        self.state.lock().expect("mock chat state poisoned")
    }

    fn fail_if_ordered(state: &mut ChatState, method: &str) -> Result<(), CoreError> {
        if state.fail_next.remove(method) {
            return Err(CoreError::Integration(format!(
                "injected {method} failure"
            )));
        }
        Ok(())
    }

    pub fn fail_next(&self, method: &str) {
        self.lock().fail_next.insert(method.to_owned());
    }

    pub fn seed_profile(&self, profile: ChatProfile) {
        self.lock().profiles.insert(profile.id.clone(), profile);
    }

    pub fn posts(&self) -> Vec<OutboundMessage> {
        self.lock().posts.clone()
    }

    pub fn updates(&self) -> Vec<UpdateRecord> {
        self.lock().updates.clone()
    }

    pub fn ephemerals(&self) -> Vec<EphemeralRecord> {
        self.lock().ephemerals.clone()
    }

    pub fn modals(&self) -> Vec<ModalRecord> {
        self.lock().modals.clone()
    }

    pub fn profile_lookups(&self) -> usize {
        self.lock().profile_lookups
    }
}

#[async_trait]
impl ChatClient for MockChat {
    async fn health_check(&self) -> Result<(), CoreError> {
        Ok(())
    }

    async fn post_message(&self, message: OutboundMessage) -> Result<MessageRef, CoreError> {
        let mut state = self.lock();
        Self::fail_if_ordered(&mut state, "post_message")?;
        state.next_ts += 1;
        let target = MessageRef::new(message.channel.clone(), format!("900.{}", state.next_ts));
        state.posts.push(message);
        Ok(target)
    }

    async fn update_message(
        &self,
        target: &MessageRef,
        text: &str,
        blocks: Option<Value>,
    ) -> Result<(), CoreError> {
        let mut state = self.lock();
        Self::fail_if_ordered(&mut state, "update_message")?;
        state.updates.push(UpdateRecord {
            target: target.clone(),
            text: text.to_owned(),
            blocks,
        });
        Ok(())
    }

    async fn delete_message(&self, target: &MessageRef) -> Result<(), CoreError> {
        let mut state = self.lock();
        Self::fail_if_ordered(&mut state, "delete_message")?;
        state.deletes.push(target.clone());
        Ok(())
    }

    async fn post_ephemeral(
        &self,
        channel: &str,
        user_id: &str,
        text: &str,
    ) -> Result<(), CoreError> {
        let mut state = self.lock();
        Self::fail_if_ordered(&mut state, "post_ephemeral")?;
        state.ephemerals.push(EphemeralRecord {
            channel: channel.to_owned(),
            user_id: user_id.to_owned(),
            text: text.to_owned(),
        });
        Ok(())
    }

    async fn open_modal(&self, trigger_id: &str, view: Value) -> Result<(), CoreError> {
        let mut state = self.lock();
        Self::fail_if_ordered(&mut state, "open_modal")?;
        state.modals.push(ModalRecord {
            trigger_id: trigger_id.to_owned(),
            view,
        });
        Ok(())
    }

    async fn publish_home(&self, user_id: &str, view: Value) -> Result<(), CoreError> {
        let mut state = self.lock();
        Self::fail_if_ordered(&mut state, "publish_home")?;
        state.homes.push((user_id.to_owned(), view));
        Ok(())
    }

    async fn permalink(&self, target: &MessageRef) -> Result<String, CoreError> {
        let mut state = self.lock();
        Self::fail_if_ordered(&mut state, "permalink")?;
        Ok(format!(
            "https://chat.example/archives/{}/p{}",
            target.channel,
            target.ts.replace('.', "")
        ))
    }

    async fn user_profile(&self, user_id: &str) -> Result<Option<ChatProfile>, CoreError> {
        let mut state = self.lock();
        state.profile_lookups += 1;
        Self::fail_if_ordered(&mut state, "user_profile")?;
        Ok(state.profiles.get(user_id).cloned())
    }
}

#[derive(Default)]
struct AlertingState {
    incidents: Vec<IncidentRequest>,
    fail_next: bool,
}

#[derive(Default)]
pub struct MockAlerting {
    state: Mutex<AlertingState>,
}

impl MockAlerting {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_next(&self) {
        self.state
            .lock()
            .expect("mock alerting state poisoned")
            .fail_next = true;
    }

    pub fn incidents(&self) -> Vec<IncidentRequest> {
        self.state
            .lock()
            .expect("mock alerting state poisoned")
            .incidents
            .clone()
    }
}

#[async_trait]
impl AlertingClient for MockAlerting {
    async fn health_check(&self) -> Result<(), CoreError> {
        Ok(())
    }

    async fn create_incident(&self, request: IncidentRequest) -> Result<(), CoreError> {
        let mut state = self.state.lock().expect("mock alerting state poisoned");
        if state.fail_next {
            state.fail_next = false;
            return Err(CoreError::Integration(
                "injected create_incident failure".to_owned(),
            ));
        }
        state.incidents.push(request);
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RenderRecord {
    pub identity: RequestIdentity,
    pub current: Option<MessageRef>,
    pub view: RenderState,
    pub returned_ts: String,
}

#[derive(Default)]
struct RendererState {
    renders: Vec<RenderRecord>,
    next_ts: u32,
}

#[derive(Default)]
pub struct RecordingRenderer {
    state: Mutex<RendererState>,
}

impl RecordingRenderer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn renders(&self) -> Vec<RenderRecord> {
        self.state
            .lock()
            .expect("recording renderer state poisoned")
            .renders
            .clone()
    }
}

#[async_trait]
impl ThreadRenderer for RecordingRenderer {
    async fn render_thread(
        &self,
        identity: &RequestIdentity,
        current: Option<&MessageRef>,
        view: &RenderState,
    ) -> Result<MessageRef, CoreError> {
        let mut state = self
            .state
            .lock()
            .expect("recording renderer state poisoned");
        let ts = match current {
            Some(target) => target.ts.clone(),
            None => {
                state.next_ts += 1;
                format!("800.{}", state.next_ts)
            }
        };
        state.renders.push(RenderRecord {
            identity: identity.clone(),
            current: current.cloned(),
            view: view.clone(),
            returned_ts: ts.clone(),
        });
        Ok(MessageRef::new(identity.channel(), ts))
    }

    fn intake_view(&self, identity: &RequestIdentity) -> Value {
        json!({
            "type": "modal",
            "private_metadata": identity.token(),
        })
    }
}

pub struct Fixtures {
    pub tracker: Arc<MockTracker>,
    pub chat: Arc<MockChat>,
    pub alerting: Arc<MockAlerting>,
    pub renderer: Arc<RecordingRenderer>,
}

// Capability bundle over fresh mocks with the default module config. The
// fixtures keep concrete handles for seeding and asserting.
pub fn test_capabilities() -> (Capabilities, Fixtures) {
    let tracker = Arc::new(MockTracker::new());
    let chat = Arc::new(MockChat::new());
    let alerting = Arc::new(MockAlerting::new());
    let renderer = Arc::new(RecordingRenderer::new());
    let directory = Arc::new(ActorDirectory::new(tracker.clone(), chat.clone()));

    let caps = Capabilities {
        tracker: tracker.clone(),
        chat: chat.clone(),
        alerting: alerting.clone(),
        renderer: renderer.clone(),
        directory,
        config: Arc::new(ModuleConfig::default()),
    };
    let fixtures = Fixtures {
        tracker,
        chat,
        alerting,
        renderer,
    };
    (caps, fixtures)
}
