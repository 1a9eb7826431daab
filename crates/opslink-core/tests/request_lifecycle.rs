use std::sync::Arc;
use std::time::Duration;

use opslink_core::test_support::{test_capabilities, Fixtures, TrackerCall};
use opslink_core::{
    ChatActionTrigger, ChatProfile, FlowGate, ModalSubmissionTrigger, Orchestrator, RequestAction,
    RequestIdentity, RequestState, SidecarProperties, ThreadReplyTrigger, TicketChangedTrigger,
    TrackerUser, TriggerEvent,
};

// Background dispatch runs on a spawned task; poll until the observable side
// effect lands instead of guessing at sleeps.
async fn settled<F: Fn() -> bool>(check: F) {
    for _ in 0..400 {
        if check() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("background dispatch did not settle");
}

fn orchestrator_with_cooldown(
    cooldown: Duration,
) -> (Arc<Orchestrator>, Fixtures, RequestIdentity) {
    let (caps, fixtures) = test_capabilities();
    let orchestrator = Arc::new(Orchestrator::new(caps, Arc::new(FlowGate::new(cooldown))));
    (orchestrator, fixtures, RequestIdentity::new("C1", "100.1"))
}

fn seed_sam(fixtures: &Fixtures) {
    fixtures.chat.seed_profile(ChatProfile {
        id: "U-sam".to_owned(),
        email: Some("sam@example.com".to_owned()),
        display_name: Some("sam".to_owned()),
        real_name: None,
    });
    fixtures.tracker.seed_user(TrackerUser {
        account_id: "acct-sam".to_owned(),
        email: Some("sam@example.com".to_owned()),
        display_name: Some("Sam".to_owned()),
    });
}

fn claim_trigger(identity: &RequestIdentity, user: &str) -> TriggerEvent {
    TriggerEvent::ChatAction(ChatActionTrigger {
        action: RequestAction::Claim,
        identity: identity.clone(),
        user_id: user.to_owned(),
        message_ts: "100.2".to_owned(),
        trigger_id: None,
        value: None,
    })
}

fn transition_count(fixtures: &Fixtures) -> usize {
    fixtures
        .tracker
        .calls()
        .iter()
        .filter(|call| matches!(call, TrackerCall::Transition { .. }))
        .count()
}

#[tokio::test]
async fn intake_files_ticket_and_paints_the_thread() {
    let (orchestrator, fixtures, identity) = orchestrator_with_cooldown(Duration::ZERO);

    // Create button first: the modal opens and nothing is filed yet.
    let outcome = orchestrator.handle_trigger(TriggerEvent::ChatAction(ChatActionTrigger {
        action: RequestAction::Create,
        identity: identity.clone(),
        user_id: "U-reporter".to_owned(),
        message_ts: "100.1".to_owned(),
        trigger_id: Some("trig-1".to_owned()),
        value: None,
    }));
    assert!(outcome.dispatched);
    settled(|| !fixtures.chat.modals().is_empty()).await;
    assert_eq!(fixtures.tracker.issue_count(), 0);
    let modal = &fixtures.chat.modals()[0];
    assert_eq!(modal.view["private_metadata"], identity.token().as_str());

    // Modal submission files the ticket.
    let outcome = orchestrator.handle_trigger(TriggerEvent::ModalSubmission(
        ModalSubmissionTrigger {
            token: identity.token(),
            user_id: "U-reporter".to_owned(),
            title: "laptop will not boot".to_owned(),
            description: "spilled coffee".to_owned(),
            priority: Some("High".to_owned()),
            component: None,
        },
    ));
    assert!(outcome.dispatched);
    settled(|| !fixtures.renderer.renders().is_empty()).await;

    assert_eq!(fixtures.tracker.issue_count(), 1);
    let issue = fixtures
        .tracker
        .stored_issue("OPS-100")
        .expect("filed issue should be stored");
    assert_eq!(issue.summary, "laptop will not boot");
    assert!(issue.labels.contains(&identity.token()));

    // The sidecar rode along, including the action message from the render.
    let stored = fixtures
        .tracker
        .property("OPS-100", "opslink-request")
        .expect("sidecar should be persisted");
    let sidecar = SidecarProperties::from_value(&stored).expect("sidecar should decode");
    assert!(sidecar.matches(&identity));
    assert_eq!(sidecar.reporter_id.as_deref(), Some("U-reporter"));
    assert!(sidecar.action_message_ts.is_some());

    // The rendered view offers the to-do actions.
    let renders = fixtures.renderer.renders();
    assert_eq!(renders.len(), 1);
    let view = &renders[0].view;
    assert_eq!(view.label.as_deref(), Some(RequestState::Todo.label()));
    assert!(view
        .actions
        .iter()
        .any(|button| button.action == RequestAction::Claim));
    assert!(view
        .actions
        .iter()
        .any(|button| button.action == RequestAction::View));

    // And the thread heard about it.
    let posts = fixtures.chat.posts();
    assert!(posts
        .iter()
        .any(|message| message.thread_ts.is_some() && message.text.contains("OPS-100")));
}

#[tokio::test]
async fn claim_then_complete_walks_the_lifecycle() {
    let (orchestrator, fixtures, identity) = orchestrator_with_cooldown(Duration::ZERO);
    fixtures
        .tracker
        .seed_managed_issue_with_reporter("OPS-1", "To Do", &identity, "U-reporter");
    seed_sam(&fixtures);

    let outcome = orchestrator.handle_trigger(claim_trigger(&identity, "U-sam"));
    assert!(outcome.dispatched);
    // The synchronous walk already answered with the spinner swap.
    let response = outcome.response.expect("claim should answer synchronously");
    assert_eq!(response["replace_original"], true);

    settled(|| !fixtures.renderer.renders().is_empty()).await;
    let view = &fixtures.renderer.renders()[0].view;
    assert_eq!(view.label.as_deref(), Some(RequestState::Claimed.label()));
    assert!(view
        .actions
        .iter()
        .any(|button| button.action == RequestAction::Complete));

    // Reporter got a DM, thread got a reply.
    let posts = fixtures.chat.posts();
    assert!(posts.iter().any(|message| message.channel == "U-reporter"));
    assert!(posts
        .iter()
        .any(|message| message.thread_ts.is_some() && message.text.contains("Claimed by")));

    let outcome = orchestrator.handle_trigger(TriggerEvent::ChatAction(ChatActionTrigger {
        action: RequestAction::Complete,
        identity: identity.clone(),
        user_id: "U-sam".to_owned(),
        message_ts: "100.3".to_owned(),
        trigger_id: None,
        value: None,
    }));
    assert!(outcome.dispatched);
    settled(|| fixtures.renderer.renders().len() == 2).await;

    let view = &fixtures.renderer.renders()[1].view;
    assert_eq!(view.label.as_deref(), Some(RequestState::Complete.label()));
    // Terminal state: only the link-out remains.
    assert!(view
        .actions
        .iter()
        .all(|button| button.action == RequestAction::View));
    assert_eq!(transition_count(&fixtures), 2);
}

#[tokio::test]
async fn thread_replies_are_mirrored_into_the_ticket() {
    let (orchestrator, fixtures, identity) = orchestrator_with_cooldown(Duration::ZERO);
    fixtures.tracker.seed_managed_issue("OPS-1", "To Do", &identity);
    fixtures.chat.seed_profile(ChatProfile {
        id: "U-jane".to_owned(),
        email: None,
        display_name: Some("jane".to_owned()),
        real_name: None,
    });

    let outcome = orchestrator.handle_trigger(TriggerEvent::ThreadReply(ThreadReplyTrigger {
        identity: identity.clone(),
        user_id: "U-jane".to_owned(),
        text: "any movement on this?".to_owned(),
        ts: "100.9".to_owned(),
    }));
    assert!(outcome.dispatched);
    settled(|| !fixtures.tracker.comments("OPS-1").is_empty()).await;

    let comments = fixtures.tracker.comments("OPS-1");
    assert_eq!(comments.len(), 1);
    assert!(comments[0].contains("any movement on this?"));
    assert!(comments[0].contains("jane"));
}

#[tokio::test]
async fn tracker_side_cancellation_repaints_the_thread() {
    let (orchestrator, fixtures, identity) = orchestrator_with_cooldown(Duration::ZERO);
    fixtures.tracker.seed_managed_issue("OPS-1", "To Do", &identity);

    let mut issue = fixtures
        .tracker
        .stored_issue("OPS-1")
        .expect("seeded issue");
    issue.status.name = "Done".to_owned();
    issue.status.category = "Done".to_owned();
    issue.resolution = Some("Won't Do".to_owned());

    let outcome = orchestrator.handle_trigger(TriggerEvent::TicketChanged(TicketChangedTrigger {
        issue_key: "OPS-1".to_owned(),
        changed: vec![opslink_core::trigger::ChangedField::Status],
        actor_account_id: Some("acct-someone".to_owned()),
        issue: Some(issue),
        properties: Some(SidecarProperties::for_identity(&identity)),
    }));
    assert!(outcome.dispatched);
    assert!(outcome.response.is_none());
    settled(|| !fixtures.renderer.renders().is_empty()).await;

    let view = &fixtures.renderer.renders()[0].view;
    assert_eq!(view.label.as_deref(), Some(RequestState::Cancelled.label()));
    assert!(view
        .actions
        .iter()
        .all(|button| button.action == RequestAction::View));
    // Webhook cycles stay quiet in chat.
    assert!(fixtures.chat.posts().is_empty());
}

#[tokio::test(start_paused = true)]
async fn duplicate_click_is_dropped_while_the_first_is_held() {
    let (orchestrator, fixtures, identity) =
        orchestrator_with_cooldown(Duration::from_secs(10));
    fixtures.tracker.seed_managed_issue("OPS-1", "To Do", &identity);
    seed_sam(&fixtures);

    orchestrator.handle_trigger(claim_trigger(&identity, "U-sam"));
    settled(|| transition_count(&fixtures) == 1).await;

    // Second identical click lands inside the cooldown window.
    orchestrator.handle_trigger(claim_trigger(&identity, "U-sam"));
    let searches = |fixtures: &Fixtures| {
        fixtures
            .tracker
            .calls()
            .iter()
            .filter(|call| matches!(call, TrackerCall::Search { .. }))
            .count()
    };
    settled(|| searches(&fixtures) == 2).await;
    tokio::task::yield_now().await;

    assert_eq!(transition_count(&fixtures), 1);
    assert_eq!(fixtures.renderer.renders().len(), 1);

    // Once the hold lapses the same click is evaluated again and politely
    // rejected, since the request is no longer claimable.
    tokio::time::advance(Duration::from_secs(11)).await;
    orchestrator.handle_trigger(claim_trigger(&identity, "U-sam"));
    settled(|| !fixtures.chat.ephemerals().is_empty()).await;
    assert_eq!(transition_count(&fixtures), 1);
}

#[tokio::test]
async fn mismatched_sidecar_aborts_the_cycle() {
    let (orchestrator, fixtures, identity) = orchestrator_with_cooldown(Duration::ZERO);
    // Ticket labeled for this thread but carrying another thread's sidecar.
    fixtures
        .tracker
        .seed_managed_issue("OPS-1", "To Do", &RequestIdentity::new("C-other", "100.1"));
    let mut issue = fixtures
        .tracker
        .stored_issue("OPS-1")
        .expect("seeded issue");
    issue.labels = vec![identity.token()];
    fixtures.tracker.seed_issue(issue);
    seed_sam(&fixtures);

    orchestrator.handle_trigger(claim_trigger(&identity, "U-sam"));
    settled(|| {
        fixtures.tracker.calls().iter().any(
            |call| matches!(call, TrackerCall::GetProperty { .. }),
        )
    })
    .await;
    tokio::task::yield_now().await;

    // Resolution refused the foreign sidecar: nothing mutated, nothing drawn.
    assert_eq!(transition_count(&fixtures), 0);
    assert!(fixtures.renderer.renders().is_empty());
    assert!(fixtures.chat.posts().is_empty());
}

#[tokio::test]
async fn failed_transition_paints_the_error_state() {
    let (orchestrator, fixtures, identity) = orchestrator_with_cooldown(Duration::ZERO);
    fixtures.tracker.seed_managed_issue("OPS-1", "To Do", &identity);
    seed_sam(&fixtures);
    fixtures.tracker.fail_next("transition_issue");

    orchestrator.handle_trigger(claim_trigger(&identity, "U-sam"));
    settled(|| !fixtures.renderer.renders().is_empty()).await;

    let view = &fixtures.renderer.renders()[0].view;
    assert_eq!(view.icon.as_deref(), Some(RequestState::Error.icon()));
    assert!(view
        .fields
        .iter()
        .any(|field| field.label == "Note" && field.value.contains("injected")));
    // No success announcement went out.
    assert!(fixtures.chat.posts().is_empty());
}
