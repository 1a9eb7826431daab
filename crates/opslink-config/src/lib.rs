use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const ENV_OPSLINK_CONFIG: &str = "OPSLINK_CONFIG";
pub const ENV_SLACK_BOT_TOKEN: &str = "OPSLINK_SLACK_BOT_TOKEN";
pub const ENV_JIRA_EMAIL: &str = "OPSLINK_JIRA_EMAIL";
pub const ENV_JIRA_API_TOKEN: &str = "OPSLINK_JIRA_API_TOKEN";
pub const ENV_PAGERDUTY_API_KEY: &str = "OPSLINK_PAGERDUTY_API_KEY";

const DEFAULT_BIND_ADDR: &str = "127.0.0.1:8484";
const DEFAULT_PROJECT_KEY: &str = "OPS";
const DEFAULT_ISSUE_TYPE: &str = "Task";
const DEFAULT_PROPERTY_KEY: &str = "opslink-request";
const DEFAULT_DONE_RESOLUTION: &str = "Done";
const DEFAULT_DISMISS_RESOLUTION: &str = "Won't Do";
const DEFAULT_START_TRANSITION_ID: &str = "21";
const DEFAULT_RESOLVE_TRANSITION_ID: &str = "31";
const DEFAULT_CHAT_API_URL: &str = "https://slack.com/api";
const DEFAULT_ALERTING_API_URL: &str = "https://api.pagerduty.com";
const DEFAULT_PAGE_PRIORITIES: &[&str] = &["Highest", "High"];
const DEFAULT_GATE_COOLDOWN_MS: u64 = 0;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{0}")]
    Message(String),
}

impl ConfigError {
    fn configuration(message: impl Into<String>) -> Self {
        Self::Message(message.into())
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct OpslinkConfig {
    #[serde(default)]
    pub server: ServerConfigToml,
    #[serde(default)]
    pub tracker: TrackerConfigToml,
    #[serde(default)]
    pub chat: ChatConfigToml,
    #[serde(default)]
    pub alerting: AlertingConfigToml,
    #[serde(default)]
    pub gate: GateConfigToml,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ServerConfigToml {
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,
}

impl Default for ServerConfigToml {
    fn default() -> Self {
        Self {
            bind_addr: default_bind_addr(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TrackerConfigToml {
    // There is no sensible default site; a blank value fails fast when the
    // Jira client is built.
    #[serde(default)]
    pub base_url: String,
    #[serde(default = "default_project_key")]
    pub project_key: String,
    #[serde(default = "default_issue_type")]
    pub issue_type: String,
    #[serde(default = "default_property_key")]
    pub property_key: String,
    #[serde(default)]
    pub epic_key: Option<String>,
    #[serde(default = "default_done_resolution")]
    pub done_resolution: String,
    #[serde(default = "default_dismiss_resolution")]
    pub dismiss_resolution: String,
    #[serde(default = "default_start_transition_id")]
    pub start_transition_id: String,
    #[serde(default = "default_resolve_transition_id")]
    pub resolve_transition_id: String,
}

impl Default for TrackerConfigToml {
    fn default() -> Self {
        Self {
            base_url: String::new(),
            project_key: default_project_key(),
            issue_type: default_issue_type(),
            property_key: default_property_key(),
            epic_key: None,
            done_resolution: default_done_resolution(),
            dismiss_resolution: default_dismiss_resolution(),
            start_transition_id: default_start_transition_id(),
            resolve_transition_id: default_resolve_transition_id(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ChatConfigToml {
    #[serde(default = "default_chat_api_url")]
    pub api_url: String,
    #[serde(default)]
    pub notification_channel: Option<String>,
}

impl Default for ChatConfigToml {
    fn default() -> Self {
        Self {
            api_url: default_chat_api_url(),
            notification_channel: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AlertingConfigToml {
    #[serde(default = "default_alerting_api_url")]
    pub api_url: String,
    #[serde(default)]
    pub service_id: String,
    #[serde(default)]
    pub escalation_policy_id: String,
    #[serde(default)]
    pub from_email: String,
    #[serde(default = "default_page_priorities")]
    pub page_priorities: Vec<String>,
}

impl Default for AlertingConfigToml {
    fn default() -> Self {
        Self {
            api_url: default_alerting_api_url(),
            service_id: String::new(),
            escalation_policy_id: String::new(),
            from_email: String::new(),
            page_priorities: default_page_priorities(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct GateConfigToml {
    #[serde(default = "default_gate_cooldown_ms")]
    pub cooldown_ms: u64,
}

impl Default for GateConfigToml {
    fn default() -> Self {
        Self {
            cooldown_ms: default_gate_cooldown_ms(),
        }
    }
}

fn default_bind_addr() -> String {
    DEFAULT_BIND_ADDR.to_owned()
}

fn default_project_key() -> String {
    DEFAULT_PROJECT_KEY.to_owned()
}

fn default_issue_type() -> String {
    DEFAULT_ISSUE_TYPE.to_owned()
}

fn default_property_key() -> String {
    DEFAULT_PROPERTY_KEY.to_owned()
}

fn default_done_resolution() -> String {
    DEFAULT_DONE_RESOLUTION.to_owned()
}

fn default_dismiss_resolution() -> String {
    DEFAULT_DISMISS_RESOLUTION.to_owned()
}

fn default_start_transition_id() -> String {
    DEFAULT_START_TRANSITION_ID.to_owned()
}

fn default_resolve_transition_id() -> String {
    DEFAULT_RESOLVE_TRANSITION_ID.to_owned()
}

fn default_chat_api_url() -> String {
    DEFAULT_CHAT_API_URL.to_owned()
}

fn default_alerting_api_url() -> String {
    DEFAULT_ALERTING_API_URL.to_owned()
}

fn default_page_priorities() -> Vec<String> {
    DEFAULT_PAGE_PRIORITIES
        .iter()
        .map(|name| (*name).to_owned())
        .collect()
}

fn default_gate_cooldown_ms() -> u64 {
    DEFAULT_GATE_COOLDOWN_MS
}

pub fn load_from_env() -> Result<OpslinkConfig, ConfigError> {
    let path = config_path_from_env()?;
    load_from_path(path)
}

pub fn load_from_path(path: impl AsRef<Path>) -> Result<OpslinkConfig, ConfigError> {
    load_or_create_config(path.as_ref())
}

pub fn default_config_path() -> Result<PathBuf, ConfigError> {
    let home = resolve_home_dir().ok_or_else(|| {
        ConfigError::configuration("Unable to resolve home directory from HOME or USERPROFILE")
    })?;

    Ok(home.join(".config").join("opslink").join("config.toml"))
}

fn config_path_from_env() -> Result<PathBuf, ConfigError> {
    match std::env::var(ENV_OPSLINK_CONFIG) {
        Ok(raw) => {
            if raw.trim().is_empty() {
                default_config_path()
            } else {
                Ok(raw.into())
            }
        }
        Err(std::env::VarError::NotPresent) => default_config_path(),
        Err(_) => Err(ConfigError::configuration(
            "OPSLINK_CONFIG contained invalid UTF-8",
        )),
    }
}

fn resolve_home_dir() -> Option<PathBuf> {
    std::env::var("HOME")
        .ok()
        .map(|value| value.trim().to_owned())
        .filter(|value| !value.is_empty())
        .map(PathBuf::from)
        .or_else(|| {
            std::env::var("USERPROFILE")
                .ok()
                .map(|value| value.trim().to_owned())
                .filter(|value| !value.is_empty())
                .map(PathBuf::from)
        })
}

fn load_or_create_config(path: &Path) -> Result<OpslinkConfig, ConfigError> {
    let raw = match std::fs::read_to_string(path) {
        Ok(raw) => raw,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
            if let Some(parent) = path.parent() {
                if !parent.as_os_str().is_empty() {
                    std::fs::create_dir_all(parent).map_err(|err| {
                        ConfigError::configuration(format!(
                            "Failed to create parent directory {} for OPSLINK_CONFIG: {err}",
                            parent.display()
                        ))
                    })?;
                }
            }

            let default_config = OpslinkConfig::default();
            persist_config(path, &default_config)?;

            toml::to_string_pretty(&default_config).map_err(|err| {
                ConfigError::configuration(format!(
                    "Failed to serialize default OPSLINK_CONFIG: {err}"
                ))
            })?
        }
        Err(err) => {
            return Err(ConfigError::configuration(format!(
                "Failed to read OPSLINK_CONFIG from {}: {err}",
                path.display()
            )));
        }
    };

    let mut config: OpslinkConfig = toml::from_str(&raw).map_err(|err| {
        ConfigError::configuration(format!(
            "Failed to parse OPSLINK_CONFIG from {}: {err}",
            path.display()
        ))
    })?;

    let changed = normalize_config(&mut config);
    if changed {
        persist_config(path, &config)?;
    }

    Ok(config)
}

fn persist_config(path: &Path, config: &OpslinkConfig) -> Result<(), ConfigError> {
    let rendered = toml::to_string_pretty(config).map_err(|err| {
        ConfigError::configuration(format!(
            "Failed to serialize OPSLINK_CONFIG for {}: {err}",
            path.display()
        ))
    })?;

    std::fs::write(path, rendered.as_bytes()).map_err(|err| {
        ConfigError::configuration(format!(
            "Failed to write OPSLINK_CONFIG to {}: {err}",
            path.display()
        ))
    })
}

fn normalize_config(config: &mut OpslinkConfig) -> bool {
    let mut changed = false;

    changed |= normalize_non_empty_string(&mut config.server.bind_addr, default_bind_addr());

    changed |= normalize_trimmed_string(&mut config.tracker.base_url);
    changed |= normalize_non_empty_string(&mut config.tracker.project_key, default_project_key());
    changed |= normalize_non_empty_string(&mut config.tracker.issue_type, default_issue_type());
    changed |=
        normalize_non_empty_string(&mut config.tracker.property_key, default_property_key());
    changed |= normalize_optional_string(&mut config.tracker.epic_key);
    changed |= normalize_non_empty_string(
        &mut config.tracker.done_resolution,
        default_done_resolution(),
    );
    changed |= normalize_non_empty_string(
        &mut config.tracker.dismiss_resolution,
        default_dismiss_resolution(),
    );
    changed |= normalize_non_empty_string(
        &mut config.tracker.start_transition_id,
        default_start_transition_id(),
    );
    changed |= normalize_non_empty_string(
        &mut config.tracker.resolve_transition_id,
        default_resolve_transition_id(),
    );

    changed |= normalize_non_empty_string(&mut config.chat.api_url, default_chat_api_url());
    changed |= normalize_optional_string(&mut config.chat.notification_channel);

    changed |=
        normalize_non_empty_string(&mut config.alerting.api_url, default_alerting_api_url());
    changed |= normalize_trimmed_string(&mut config.alerting.service_id);
    changed |= normalize_trimmed_string(&mut config.alerting.escalation_policy_id);
    changed |= normalize_trimmed_string(&mut config.alerting.from_email);
    changed |= normalize_string_vec(&mut config.alerting.page_priorities);
    if config.alerting.page_priorities.is_empty() {
        config.alerting.page_priorities = default_page_priorities();
        changed = true;
    }

    changed
}

fn normalize_non_empty_string(value: &mut String, default: String) -> bool {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        if *value != default {
            *value = default;
            return true;
        }
        return false;
    }

    if trimmed != value {
        *value = trimmed.to_owned();
        return true;
    }
    false
}

fn normalize_trimmed_string(value: &mut String) -> bool {
    let trimmed = value.trim();
    if trimmed != value {
        *value = trimmed.to_owned();
        return true;
    }
    false
}

fn normalize_optional_string(value: &mut Option<String>) -> bool {
    match value {
        Some(inner) => {
            let trimmed = inner.trim();
            if trimmed.is_empty() {
                *value = None;
                return true;
            }
            if trimmed != inner {
                *inner = trimmed.to_owned();
                return true;
            }
            false
        }
        None => false,
    }
}

fn normalize_string_vec(values: &mut Vec<String>) -> bool {
    let mut changed = false;
    let mut kept = Vec::with_capacity(values.len());
    for value in values.iter() {
        let trimmed = value.trim();
        if trimmed.is_empty() {
            changed = true;
            continue;
        }
        if trimmed != value {
            changed = true;
        }
        kept.push(trimmed.to_owned());
    }
    if changed {
        *values = kept;
    }
    changed
}

/// Credentials pulled from the environment at startup; never written to the
/// config file and redacted from debug output.
#[derive(Clone)]
pub struct Secrets {
    pub slack_bot_token: String,
    pub jira_email: String,
    pub jira_api_token: String,
    pub pagerduty_api_key: String,
}

impl fmt::Debug for Secrets {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Secrets")
            .field("slack_bot_token", &"<redacted>")
            .field("jira_email", &self.jira_email)
            .field("jira_api_token", &"<redacted>")
            .field("pagerduty_api_key", &"<redacted>")
            .finish()
    }
}

pub fn secrets_from_env() -> Result<Secrets, ConfigError> {
    Ok(Secrets {
        slack_bot_token: require_env(ENV_SLACK_BOT_TOKEN)?,
        jira_email: require_env(ENV_JIRA_EMAIL)?,
        jira_api_token: require_env(ENV_JIRA_API_TOKEN)?,
        pagerduty_api_key: require_env(ENV_PAGERDUTY_API_KEY)?,
    })
}

fn require_env(name: &str) -> Result<String, ConfigError> {
    match std::env::var(name) {
        Ok(value) => {
            let trimmed = value.trim();
            if trimmed.is_empty() {
                return Err(ConfigError::configuration(format!("{name} is set but empty")));
            }
            Ok(trimmed.to_owned())
        }
        Err(std::env::VarError::NotPresent) => {
            Err(ConfigError::configuration(format!("{name} is not set")))
        }
        Err(_) => Err(ConfigError::configuration(format!(
            "{name} contained invalid UTF-8"
        ))),
    }
}
