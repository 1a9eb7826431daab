use std::collections::HashMap;
use std::sync::RwLock;
use std::time::Duration;

pub const GATE_WILDCARD: &str = "*";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GatePolicy {
    Allow,
    Deny,
}

// Receipt for an acquired hold. Releasing puts back whatever exact entry the
// hold displaced, so operator-set policies survive a handling cycle.
#[derive(Debug)]
pub struct GateHold {
    subject: String,
    action: String,
    prior: Option<GatePolicy>,
}

// Advisory concurrency gate over (subject, action) pairs, where the subject
// is a ticket key or, before a ticket exists, the identity token. Wildcard
// entries act as defaults; precedence is exact, then (subject, *), then
// (*, action), then (*, *), then Allow. Per process only: a multi-replica
// deployment shares nothing here.
#[derive(Debug)]
pub struct FlowGate {
    entries: RwLock<HashMap<(String, String), GatePolicy>>,
    cooldown: Duration,
}

impl FlowGate {
    pub fn new(cooldown: Duration) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            cooldown,
        }
    }

    pub fn cooldown(&self) -> Duration {
        self.cooldown
    }

    pub fn set(&self, subject: impl Into<String>, action: impl Into<String>, policy: GatePolicy) {
        self.entries
            .write()
            .expect("flow gate lock poisoned")
            .insert((subject.into(), action.into()), policy);
    }

    pub fn clear(&self, subject: &str, action: &str) {
        self.entries
            .write()
            .expect("flow gate lock poisoned")
            .remove(&(subject.to_owned(), action.to_owned()));
    }

    pub fn policy(&self, subject: &str, action: &str) -> GatePolicy {
        let entries = self.entries.read().expect("flow gate lock poisoned");
        effective_policy(&entries, subject, action)
    }

    // Atomic check-and-deny. Returns a hold when the effective policy allows
    // the pair, having flipped the exact entry to Deny; None means an
    // identical trigger is already in flight (or the pair is denied outright)
    // and the caller must drop the trigger.
    pub fn hold(&self, subject: &str, action: &str) -> Option<GateHold> {
        let mut entries = self.entries.write().expect("flow gate lock poisoned");
        if effective_policy(&entries, subject, action) == GatePolicy::Deny {
            return None;
        }

        let key = (subject.to_owned(), action.to_owned());
        let prior = entries.insert(key, GatePolicy::Deny);
        Some(GateHold {
            subject: subject.to_owned(),
            action: action.to_owned(),
            prior,
        })
    }

    pub fn release(&self, hold: GateHold) {
        let mut entries = self.entries.write().expect("flow gate lock poisoned");
        let key = (hold.subject, hold.action);
        match hold.prior {
            Some(policy) => {
                entries.insert(key, policy);
            }
            None => {
                entries.remove(&key);
            }
        }
    }
}

fn effective_policy(
    entries: &HashMap<(String, String), GatePolicy>,
    subject: &str,
    action: &str,
) -> GatePolicy {
    let lookups = [
        (subject, action),
        (subject, GATE_WILDCARD),
        (GATE_WILDCARD, action),
        (GATE_WILDCARD, GATE_WILDCARD),
    ];
    for (subject, action) in lookups {
        if let Some(policy) = entries.get(&(subject.to_owned(), action.to_owned())) {
            return *policy;
        }
    }
    GatePolicy::Allow
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gate() -> FlowGate {
        FlowGate::new(Duration::ZERO)
    }

    #[test]
    fn default_policy_is_allow() {
        assert_eq!(gate().policy("OPS-1", "request.claim"), GatePolicy::Allow);
    }

    #[test]
    fn hold_denies_identical_pair_until_release() {
        let gate = gate();

        let hold = gate.hold("OPS-1", "request.claim").expect("first hold");
        assert!(gate.hold("OPS-1", "request.claim").is_none());
        // Other pairs stay open.
        assert!(gate.hold("OPS-1", "request.cancel").is_some());
        assert!(gate.hold("OPS-2", "request.claim").is_some());

        gate.release(hold);
        assert!(gate.hold("OPS-1", "request.claim").is_some());
    }

    #[test]
    fn wildcard_precedence_exact_then_subject_then_action() {
        let gate = gate();
        gate.set(GATE_WILDCARD, GATE_WILDCARD, GatePolicy::Deny);
        assert_eq!(gate.policy("OPS-1", "request.claim"), GatePolicy::Deny);

        gate.set(GATE_WILDCARD, "request.claim", GatePolicy::Allow);
        assert_eq!(gate.policy("OPS-1", "request.claim"), GatePolicy::Allow);
        assert_eq!(gate.policy("OPS-1", "request.page"), GatePolicy::Deny);

        gate.set("OPS-1", GATE_WILDCARD, GatePolicy::Deny);
        assert_eq!(gate.policy("OPS-1", "request.claim"), GatePolicy::Deny);

        gate.set("OPS-1", "request.claim", GatePolicy::Allow);
        assert_eq!(gate.policy("OPS-1", "request.claim"), GatePolicy::Allow);
    }

    #[test]
    fn deny_default_blocks_hold() {
        let gate = gate();
        gate.set(GATE_WILDCARD, "request.page", GatePolicy::Deny);

        assert!(gate.hold("OPS-1", "request.page").is_none());
        assert!(gate.hold("OPS-1", "request.claim").is_some());
    }

    #[test]
    fn release_restores_displaced_exact_entry() {
        let gate = gate();
        gate.set("OPS-1", "request.claim", GatePolicy::Allow);

        let hold = gate.hold("OPS-1", "request.claim").expect("hold");
        let entries_denied = gate.policy("OPS-1", "request.claim");
        assert_eq!(entries_denied, GatePolicy::Deny);

        gate.release(hold);
        // The explicit Allow entry survives, not just the absence default.
        gate.set(GATE_WILDCARD, GATE_WILDCARD, GatePolicy::Deny);
        assert_eq!(gate.policy("OPS-1", "request.claim"), GatePolicy::Allow);
    }

    #[test]
    fn clear_removes_exact_entry() {
        let gate = gate();
        gate.set("OPS-1", "request.claim", GatePolicy::Deny);
        gate.clear("OPS-1", "request.claim");
        assert_eq!(gate.policy("OPS-1", "request.claim"), GatePolicy::Allow);
    }
}
