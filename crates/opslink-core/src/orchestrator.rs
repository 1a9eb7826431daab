use std::sync::Arc;

use serde_json::Value;
use tracing::{debug, info, warn};

use crate::adapters::Capabilities;
use crate::flow::{standard_flows, Flow, FlowDirective};
use crate::gate::FlowGate;
use crate::render::RenderState;
use crate::request::{resolve_from_trigger, ServiceRequest};
use crate::trigger::TriggerEvent;

// What the intake boundary gets back from the synchronous walk. `response`
// goes out on the open HTTP exchange; `dispatched` says whether a background
// cycle was started.
#[derive(Debug)]
pub struct TriggerOutcome {
    pub response: Option<Value>,
    pub dispatched: bool,
}

// Entry point for every trigger. Walks the flows synchronously in priority
// order, then runs at most one background dispatch for the flows that want
// the trigger. The dispatch owns resolution, gating, mutation, and the
// single render of the cycle.
pub struct Orchestrator {
    flows: Vec<Arc<dyn Flow>>,
    gate: Arc<FlowGate>,
    caps: Capabilities,
}

impl Orchestrator {
    pub fn new(caps: Capabilities, gate: Arc<FlowGate>) -> Self {
        let flows = standard_flows(&caps);
        Self::with_flows(caps, gate, flows)
    }

    pub fn with_flows(
        caps: Capabilities,
        gate: Arc<FlowGate>,
        mut flows: Vec<Arc<dyn Flow>>,
    ) -> Self {
        flows.sort_by_key(|flow| flow.priority());
        Self { flows, gate, caps }
    }

    pub fn gate(&self) -> &Arc<FlowGate> {
        &self.gate
    }

    pub fn handle_trigger(self: &Arc<Self>, trigger: TriggerEvent) -> TriggerOutcome {
        let action = trigger.action();
        let mut eligible: Vec<Arc<dyn Flow>> = Vec::new();
        let mut response: Option<Value> = None;

        for flow in &self.flows {
            if !flow.handles(action) {
                continue;
            }
            let outcome = flow.immediate(&trigger);
            if response.is_none() {
                response = outcome.response;
            }
            match outcome.directive {
                FlowDirective::Continue => eligible.push(flow.clone()),
                FlowDirective::FinishAfter => {
                    eligible.push(flow.clone());
                    break;
                }
                FlowDirective::HaltAll => {
                    eligible.clear();
                    break;
                }
            }
        }

        let dispatched = !eligible.is_empty();
        if dispatched {
            let orchestrator = self.clone();
            tokio::spawn(async move {
                orchestrator.dispatch(trigger, eligible).await;
            });
        } else {
            debug!(action = %action, "no flow took the trigger");
        }

        TriggerOutcome {
            response,
            dispatched,
        }
    }

    async fn dispatch(&self, trigger: TriggerEvent, flows: Vec<Arc<dyn Flow>>) {
        let action = trigger.action();
        let origin = trigger.origin();

        let request = match resolve_from_trigger(&self.caps, &trigger).await {
            Ok(Some(request)) => request,
            Ok(None) => {
                debug!(
                    action = %action,
                    origin = ?origin,
                    "trigger does not resolve to a managed request"
                );
                return;
            }
            Err(error) => {
                warn!(error = %error, action = %action, origin = ?origin, "trigger resolution failed");
                return;
            }
        };

        let subject = request.gate_subject();
        let Some(hold) = self.gate.hold(&subject, action.id()) else {
            info!(
                subject,
                action = action.id(),
                "dropping trigger, an identical one is in flight"
            );
            return;
        };

        // Flows run in priority order, each against the request as the
        // previous one left it. A failing flow forfeits its contribution but
        // does not stop the rest.
        let mut request = request;
        let mut failed: Vec<&'static str> = Vec::new();
        for flow in &flows {
            match flow.handle(&trigger, request.clone()).await {
                Some(updated) => request = updated,
                None => {
                    warn!(flow = flow.name(), action = action.id(), "flow did not complete");
                    failed.push(flow.name());
                }
            }
        }

        self.render(&request, &failed).await;

        let gate = Arc::clone(&self.gate);
        let cooldown = gate.cooldown();
        if cooldown.is_zero() {
            gate.release(hold);
        } else {
            tokio::spawn(async move {
                tokio::time::sleep(cooldown).await;
                gate.release(hold);
            });
        }
    }

    // One render per cycle: every flow contributes to the view, failed flows
    // excepted, and the merged state goes to the thread surface.
    async fn render(&self, request: &ServiceRequest, failed: &[&'static str]) {
        if !request.has_ticket() {
            return;
        }

        let mut view = RenderState::default();
        for flow in &self.flows {
            if failed.contains(&flow.name()) {
                continue;
            }
            view.merge(flow.render_contribution(request));
        }

        let current = request.action_message();
        let rendered = match self
            .caps
            .renderer
            .render_thread(request.identity(), current.as_ref(), &view)
            .await
        {
            Ok(rendered) => rendered,
            Err(error) => {
                warn!(
                    error = %error,
                    ticket = request.ticket_key().unwrap_or("unfiled"),
                    "thread render failed"
                );
                return;
            }
        };

        // A new action message appears on the first render of a fresh ticket;
        // remember it so later cycles repaint in place.
        let known = request
            .sidecar()
            .and_then(|sidecar| sidecar.action_message_ts.as_deref());
        if known != Some(rendered.ts.as_str()) {
            let mut updated = request.clone();
            updated.set_action_message_ts(rendered.ts);
            if let Err(error) = updated.persist_sidecar(&self.caps).await {
                warn!(error = %error, "could not persist the action message id");
            }
        }
    }
}
