use std::sync::Arc;
use std::time::Duration;

use opslink_app::AppState;
use opslink_config::OpslinkConfig;
use opslink_core::{
    ActorDirectory, AlertingClient, Capabilities, ChatClient, FlowGate, ModuleConfig, Orchestrator,
    TrackerClient,
};
use opslink_jira::{JiraClient, JiraConfig};
use opslink_pagerduty::{PagerDutyClient, PagerDutyConfig};
use opslink_slack::{SlackClient, SlackConfig, SlackThreadRenderer};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let config = opslink_config::load_from_env()?;
    let secrets = opslink_config::secrets_from_env()?;

    let tracker_config = JiraConfig::from_settings(
        &config.tracker.base_url,
        &secrets.jira_email,
        &secrets.jira_api_token,
    )?;
    let tracker = Arc::new(JiraClient::new(&tracker_config)?);

    let mut chat_config = SlackConfig::from_settings(&secrets.slack_bot_token)?;
    chat_config.api_url = config.chat.api_url.clone();
    let chat = Arc::new(SlackClient::new(&chat_config)?);

    let mut alerting_config = PagerDutyConfig::from_settings(&secrets.pagerduty_api_key)?;
    alerting_config.api_url = config.alerting.api_url.clone();
    let alerting = Arc::new(PagerDutyClient::new(&alerting_config)?);

    tracker.health_check().await?;
    chat.health_check().await?;
    // A paging outage degrades escalation but the bridge itself still works.
    if let Err(error) = alerting.health_check().await {
        warn!(error = %error, "alerting health check failed, paging is degraded");
    }

    let module_config = Arc::new(module_config_from(&config));
    let renderer = Arc::new(SlackThreadRenderer::new(chat.clone()));
    let directory = Arc::new(ActorDirectory::new(tracker.clone(), chat.clone()));

    let caps = Capabilities {
        tracker,
        chat,
        alerting,
        renderer,
        directory,
        config: module_config.clone(),
    };
    let gate = Arc::new(FlowGate::new(Duration::from_millis(config.gate.cooldown_ms)));
    let orchestrator = Arc::new(Orchestrator::new(caps, gate));

    info!(project = %module_config.project_key, "opslink ready");
    let state = AppState::new(orchestrator, module_config.property_key.clone());
    opslink_app::server::run(state, &config.server.bind_addr).await
}

fn module_config_from(config: &OpslinkConfig) -> ModuleConfig {
    ModuleConfig {
        project_key: config.tracker.project_key.clone(),
        issue_type: config.tracker.issue_type.clone(),
        property_key: config.tracker.property_key.clone(),
        epic_key: config.tracker.epic_key.clone(),
        done_resolution: config.tracker.done_resolution.clone(),
        dismiss_resolution: config.tracker.dismiss_resolution.clone(),
        start_transition_id: config.tracker.start_transition_id.clone(),
        resolve_transition_id: config.tracker.resolve_transition_id.clone(),
        notification_channel: config.chat.notification_channel.clone(),
        page_priorities: config.alerting.page_priorities.clone(),
        alert_service_id: config.alerting.service_id.clone(),
        alert_escalation_policy_id: config.alerting.escalation_policy_id.clone(),
        alert_from_email: config.alerting.from_email.clone(),
    }
}
