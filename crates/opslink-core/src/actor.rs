use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::adapters::{ChatClient, ChatProfile, TrackerClient, TrackerUser};

pub const UNKNOWN_ACTOR_LABEL: &str = "Unknown";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ActorOrigin {
    Chat,
    Tracker,
    Email,
}

// One human seen across both systems. Identifiers and raw profiles are kept
// side by side; accessors pick the best available value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
    pub origin: ActorOrigin,
    #[serde(default)]
    pub chat_user_id: Option<String>,
    #[serde(default)]
    pub tracker_account_id: Option<String>,
    #[serde(default)]
    pub email_hint: Option<String>,
    #[serde(default)]
    pub chat_profile: Option<ChatProfile>,
    #[serde(default)]
    pub tracker_user: Option<TrackerUser>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ActorSeed {
    pub email: Option<String>,
    pub chat_user_id: Option<String>,
    pub tracker_account_id: Option<String>,
    pub tracker_user: Option<TrackerUser>,
}

impl Actor {
    fn empty(origin: ActorOrigin) -> Self {
        Self {
            origin,
            chat_user_id: None,
            tracker_account_id: None,
            email_hint: None,
            chat_profile: None,
            tracker_user: None,
        }
    }

    pub fn from_chat_user(id: impl Into<String>) -> Self {
        Self {
            chat_user_id: Some(id.into()),
            ..Self::empty(ActorOrigin::Chat)
        }
    }

    pub fn from_tracker_account(id: impl Into<String>) -> Self {
        Self {
            tracker_account_id: Some(id.into()),
            ..Self::empty(ActorOrigin::Tracker)
        }
    }

    pub fn from_tracker_user(user: TrackerUser) -> Self {
        Self {
            tracker_account_id: Some(user.account_id.clone()),
            email_hint: user.email.clone(),
            tracker_user: Some(user),
            ..Self::empty(ActorOrigin::Tracker)
        }
    }

    pub fn from_email(email: impl Into<String>) -> Self {
        Self {
            email_hint: Some(email.into()),
            ..Self::empty(ActorOrigin::Email)
        }
    }

    // Seed priority: email, then chat user id, then tracker account id, then
    // a raw tracker user. None when the seed is entirely empty.
    pub fn from_seed(seed: ActorSeed) -> Option<Self> {
        if let Some(email) = seed.email.filter(|value| !value.is_empty()) {
            return Some(Self::from_email(email));
        }
        if let Some(id) = seed.chat_user_id.filter(|value| !value.is_empty()) {
            return Some(Self::from_chat_user(id));
        }
        if let Some(id) = seed.tracker_account_id.filter(|value| !value.is_empty()) {
            return Some(Self::from_tracker_account(id));
        }
        seed.tracker_user.map(Self::from_tracker_user)
    }

    pub fn email(&self) -> Option<&str> {
        self.chat_profile
            .as_ref()
            .and_then(|profile| profile.email.as_deref())
            .or_else(|| {
                self.tracker_user
                    .as_ref()
                    .and_then(|user| user.email.as_deref())
            })
            .or(self.email_hint.as_deref())
            .filter(|email| !email.is_empty())
    }

    pub fn display_name(&self) -> Option<&str> {
        self.chat_profile
            .as_ref()
            .and_then(ChatProfile::best_name)
            .or_else(|| {
                self.tracker_user
                    .as_ref()
                    .and_then(|user| user.display_name.as_deref())
                    .filter(|name| !name.is_empty())
            })
    }

    pub fn display_label(&self) -> &str {
        self.display_name().unwrap_or(UNKNOWN_ACTOR_LABEL)
    }

    pub fn is_resolved(&self) -> bool {
        self.chat_profile.is_some() || self.tracker_user.is_some()
    }
}

// Resolves actors against both systems with two process-wide caches, one per
// direction. Definitive lookups are cached, hits and misses alike; transport
// failures are not, so the next trigger retries. Cardinality is bounded by
// the organization's headcount, so there is no eviction.
pub struct ActorDirectory {
    tracker: Arc<dyn TrackerClient>,
    chat: Arc<dyn ChatClient>,
    tracker_users_by_email: RwLock<HashMap<String, Option<TrackerUser>>>,
    chat_profiles: RwLock<HashMap<String, Option<ChatProfile>>>,
}

impl ActorDirectory {
    pub fn new(tracker: Arc<dyn TrackerClient>, chat: Arc<dyn ChatClient>) -> Self {
        Self {
            tracker,
            chat,
            tracker_users_by_email: RwLock::new(HashMap::new()),
            chat_profiles: RwLock::new(HashMap::new()),
        }
    }

    pub async fn tracker_user_by_email(&self, email: &str) -> Option<TrackerUser> {
        if let Some(cached) = self
            .tracker_users_by_email
            .read()
            .expect("tracker user cache lock poisoned")
            .get(email)
        {
            return cached.clone();
        }

        let resolved = match self.tracker.user_by_email(email).await {
            Ok(user) => user,
            Err(error) => {
                warn!(error = %error, email, "tracker user lookup failed");
                return None;
            }
        };

        self.tracker_users_by_email
            .write()
            .expect("tracker user cache lock poisoned")
            .insert(email.to_owned(), resolved.clone());
        resolved
    }

    pub async fn chat_profile(&self, user_id: &str) -> Option<ChatProfile> {
        if let Some(cached) = self
            .chat_profiles
            .read()
            .expect("chat profile cache lock poisoned")
            .get(user_id)
        {
            return cached.clone();
        }

        let resolved = match self.chat.user_profile(user_id).await {
            Ok(profile) => profile,
            Err(error) => {
                warn!(error = %error, user_id, "chat profile lookup failed");
                return None;
            }
        };

        self.chat_profiles
            .write()
            .expect("chat profile cache lock poisoned")
            .insert(user_id.to_owned(), resolved.clone());
        resolved
    }

    // Loads whatever profiles the actor's identifiers allow, preferring the
    // actor's origin system. Idempotent; failures leave the actor unresolved.
    pub async fn load_best_profile(&self, actor: &mut Actor) -> bool {
        if actor.is_resolved() {
            return true;
        }

        if let Some(chat_user_id) = actor.chat_user_id.clone() {
            actor.chat_profile = self.chat_profile(&chat_user_id).await;
        }

        if actor.tracker_user.is_none() {
            if let Some(email) = actor.email().map(str::to_owned) {
                actor.tracker_user = self.tracker_user_by_email(&email).await;
            }
        }

        if let Some(user) = &actor.tracker_user {
            if actor.tracker_account_id.is_none() {
                actor.tracker_account_id = Some(user.account_id.clone());
            }
        }

        actor.is_resolved()
    }

    // Replaces `<@U123>` style mentions with the mentioned user's display
    // name so the text survives outside the chat platform.
    pub async fn rewrite_mentions(&self, text: &str) -> String {
        let mut out = String::with_capacity(text.len());
        let mut rest = text;

        while let Some(start) = rest.find("<@") {
            out.push_str(&rest[..start]);
            let tail = &rest[start + 2..];
            match tail.find('>') {
                Some(end) => {
                    let raw = &tail[..end];
                    // Mentions may carry a fallback label after a pipe.
                    let id = match raw.split_once('|') {
                        Some((id, _label)) => id,
                        None => raw,
                    };
                    let name = match self.chat_profile(id).await {
                        Some(profile) => profile
                            .best_name()
                            .map(str::to_owned)
                            .unwrap_or_else(|| id.to_owned()),
                        None => id.to_owned(),
                    };
                    out.push('@');
                    out.push_str(&name);
                    rest = &tail[end + 1..];
                }
                None => {
                    out.push_str(&rest[start..]);
                    rest = "";
                }
            }
        }

        out.push_str(rest);
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{MockChat, MockTracker};

    fn directory() -> (Arc<MockTracker>, Arc<MockChat>, ActorDirectory) {
        let tracker = Arc::new(MockTracker::new());
        let chat = Arc::new(MockChat::new());
        let directory = ActorDirectory::new(tracker.clone(), chat.clone());
        (tracker, chat, directory)
    }

    fn profile(id: &str, email: &str, display: &str) -> ChatProfile {
        ChatProfile {
            id: id.to_owned(),
            email: Some(email.to_owned()),
            display_name: Some(display.to_owned()),
            real_name: None,
        }
    }

    #[test]
    fn seed_priority_prefers_email_then_chat_then_tracker() {
        let seed = ActorSeed {
            email: Some("jane@example.com".to_owned()),
            chat_user_id: Some("U1".to_owned()),
            tracker_account_id: Some("acct-1".to_owned()),
            tracker_user: None,
        };
        let actor = Actor::from_seed(seed).expect("actor from seed");
        assert_eq!(actor.origin, ActorOrigin::Email);

        let seed = ActorSeed {
            email: None,
            chat_user_id: Some("U1".to_owned()),
            tracker_account_id: Some("acct-1".to_owned()),
            tracker_user: None,
        };
        let actor = Actor::from_seed(seed).expect("actor from seed");
        assert_eq!(actor.origin, ActorOrigin::Chat);

        let seed = ActorSeed {
            tracker_account_id: Some("acct-1".to_owned()),
            ..ActorSeed::default()
        };
        let actor = Actor::from_seed(seed).expect("actor from seed");
        assert_eq!(actor.origin, ActorOrigin::Tracker);

        assert_eq!(Actor::from_seed(ActorSeed::default()), None);
    }

    #[test]
    fn display_label_falls_back_to_unknown() {
        let actor = Actor::from_chat_user("U1");
        assert_eq!(actor.display_label(), UNKNOWN_ACTOR_LABEL);
    }

    #[tokio::test]
    async fn load_best_profile_chains_chat_profile_into_tracker_lookup() {
        let (tracker, chat, directory) = directory();
        chat.seed_profile(profile("U1", "jane@example.com", "jane"));
        tracker.seed_user(TrackerUser {
            account_id: "acct-jane".to_owned(),
            email: Some("jane@example.com".to_owned()),
            display_name: Some("Jane Doe".to_owned()),
        });

        let mut actor = Actor::from_chat_user("U1");
        assert!(directory.load_best_profile(&mut actor).await);
        assert_eq!(actor.display_name(), Some("jane"));
        assert_eq!(actor.tracker_account_id.as_deref(), Some("acct-jane"));
        assert_eq!(actor.email(), Some("jane@example.com"));
    }

    #[tokio::test]
    async fn load_best_profile_is_idempotent() {
        let (tracker, chat, directory) = directory();
        chat.seed_profile(profile("U1", "jane@example.com", "jane"));
        tracker.seed_user(TrackerUser {
            account_id: "acct-jane".to_owned(),
            email: Some("jane@example.com".to_owned()),
            display_name: None,
        });

        let mut actor = Actor::from_chat_user("U1");
        assert!(directory.load_best_profile(&mut actor).await);
        let snapshot = actor.clone();
        assert!(directory.load_best_profile(&mut actor).await);
        assert_eq!(actor, snapshot);
        assert_eq!(chat.profile_lookups(), 1);
    }

    #[tokio::test]
    async fn definitive_misses_are_cached() {
        let (_tracker, chat, directory) = directory();

        assert_eq!(directory.chat_profile("U404").await, None);
        assert_eq!(directory.chat_profile("U404").await, None);
        assert_eq!(chat.profile_lookups(), 1);
    }

    #[tokio::test]
    async fn lookup_failures_degrade_to_unresolved_and_are_not_cached() {
        let (tracker, _chat, directory) = directory();
        tracker.fail_next("user_by_email");

        assert_eq!(
            directory.tracker_user_by_email("jane@example.com").await,
            None
        );
        tracker.seed_user(TrackerUser {
            account_id: "acct-jane".to_owned(),
            email: Some("jane@example.com".to_owned()),
            display_name: None,
        });
        // The failed lookup was not cached as a miss.
        assert!(directory
            .tracker_user_by_email("jane@example.com")
            .await
            .is_some());
    }

    #[tokio::test]
    async fn rewrite_mentions_substitutes_display_names() {
        let (_tracker, chat, directory) = directory();
        chat.seed_profile(profile("U123", "jane@example.com", "jane"));

        let rewritten = directory
            .rewrite_mentions("ping <@U123> and <@U999|bob> please")
            .await;
        assert_eq!(rewritten, "ping @jane and @U999 please");
    }

    #[tokio::test]
    async fn rewrite_mentions_leaves_unterminated_mention_untouched() {
        let (_tracker, _chat, directory) = directory();

        let rewritten = directory.rewrite_mentions("broken <@U123").await;
        assert_eq!(rewritten, "broken <@U123");
    }
}
