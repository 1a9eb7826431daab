use std::sync::Arc;

use async_trait::async_trait;
use opslink_core::{
    CoreError, IssueEdit, IssueStatus, NewIssue, TrackerClient, TrackerComponent, TrackerIssue,
    TrackerPriority, TrackerResolution, TrackerTransition, TrackerUser, TransitionRequest,
};
use serde::Deserialize;
use serde_json::{json, Value};

use crate::transport::{
    truncate_for_error, JiraConfig, ReqwestRestTransport, RestMethod, RestRequest, RestResponse,
    RestTransport,
};

const ISSUE_FIELDS: &str = "summary,description,status,resolution,assignee,priority,labels";

/// Jira Cloud REST v2 client. Everything goes through the transport seam, so
/// tests swap in a stub and production gets reqwest.
pub struct JiraClient {
    transport: Arc<dyn RestTransport>,
    browse_base: String,
}

impl JiraClient {
    pub fn new(config: &JiraConfig) -> Result<Self, CoreError> {
        let transport = ReqwestRestTransport::new(config)?;
        Ok(Self::with_transport(Arc::new(transport), &config.base_url))
    }

    pub fn with_transport(transport: Arc<dyn RestTransport>, base_url: &str) -> Self {
        Self {
            transport,
            browse_base: base_url.trim_end_matches('/').to_owned(),
        }
    }

    async fn call(&self, request: RestRequest) -> Result<RestResponse, CoreError> {
        let method = request.method;
        let path = request.path.clone();
        let response = self.transport.execute(request).await?;
        if !response.is_success() {
            return Err(http_error(method, &path, &response));
        }
        Ok(response)
    }

    async fn call_json<T: serde::de::DeserializeOwned>(
        &self,
        request: RestRequest,
    ) -> Result<T, CoreError> {
        self.call(request).await?.decode()
    }
}

fn http_error(method: RestMethod, path: &str, response: &RestResponse) -> CoreError {
    CoreError::Integration(format!(
        "jira {} {} returned HTTP {}: {}",
        method.as_str(),
        path,
        response.status,
        truncate_for_error(&response.body)
    ))
}

#[async_trait]
impl TrackerClient for JiraClient {
    async fn health_check(&self) -> Result<(), CoreError> {
        self.call(RestRequest::get("/rest/api/2/myself")).await?;
        Ok(())
    }

    async fn create_issue(&self, request: NewIssue) -> Result<TrackerIssue, CoreError> {
        let mut fields = json!({
            "project": {"key": request.project_key},
            "issuetype": {"name": request.issue_type},
            "summary": request.summary,
            "description": request.description,
            "labels": request.labels,
        });
        if let Some(priority) = &request.priority {
            fields["priority"] = json!({"name": priority});
        }
        if let Some(component) = &request.component {
            fields["components"] = json!([{"name": component}]);
        }

        let created: CreatedPayload = self
            .call_json(RestRequest::post(
                "/rest/api/2/issue",
                json!({"fields": fields}),
            ))
            .await?;
        // The create response only carries id/key; fetch the issue so callers
        // see the status and defaults Jira filled in.
        self.issue(&created.key).await
    }

    async fn issue(&self, key: &str) -> Result<TrackerIssue, CoreError> {
        let payload: IssuePayload = self
            .call_json(
                RestRequest::get(format!("/rest/api/2/issue/{key}"))
                    .with_query("fields", ISSUE_FIELDS),
            )
            .await?;
        Ok(payload.into_issue())
    }

    async fn edit_issue(&self, key: &str, edit: IssueEdit) -> Result<(), CoreError> {
        let mut fields = serde_json::Map::new();
        if let Some(account_id) = edit.assignee_account_id {
            fields.insert("assignee".to_owned(), json!({"accountId": account_id}));
        }
        if let Some(account_id) = edit.reporter_account_id {
            fields.insert("reporter".to_owned(), json!({"accountId": account_id}));
        }
        if let Some(parent_key) = edit.parent_key {
            fields.insert("parent".to_owned(), json!({"key": parent_key}));
        }
        if fields.is_empty() {
            return Ok(());
        }

        self.call(RestRequest::put(
            format!("/rest/api/2/issue/{key}"),
            json!({"fields": fields}),
        ))
        .await?;
        Ok(())
    }

    async fn search_issues(&self, jql: &str, limit: usize) -> Result<Vec<TrackerIssue>, CoreError> {
        let payload: SearchPayload = self
            .call_json(
                RestRequest::get("/rest/api/2/search")
                    .with_query("jql", jql)
                    .with_query("maxResults", limit.to_string())
                    .with_query("fields", ISSUE_FIELDS),
            )
            .await?;
        Ok(payload
            .issues
            .into_iter()
            .map(IssuePayload::into_issue)
            .collect())
    }

    async fn transitions(&self, key: &str) -> Result<Vec<TrackerTransition>, CoreError> {
        let payload: TransitionsPayload = self
            .call_json(RestRequest::get(format!(
                "/rest/api/2/issue/{key}/transitions"
            )))
            .await?;
        Ok(payload
            .transitions
            .into_iter()
            .map(|entry| TrackerTransition {
                id: entry.id,
                name: entry.name,
            })
            .collect())
    }

    async fn transition_issue(&self, key: &str, request: TransitionRequest) -> Result<(), CoreError> {
        let mut body = json!({"transition": {"id": request.transition_id}});
        if let Some(resolution_id) = request.resolution_id {
            body["fields"] = json!({"resolution": {"id": resolution_id}});
        }

        self.call(RestRequest::post(
            format!("/rest/api/2/issue/{key}/transitions"),
            body,
        ))
        .await?;
        Ok(())
    }

    async fn resolutions(&self) -> Result<Vec<TrackerResolution>, CoreError> {
        let payload: Vec<IdNamePayload> =
            self.call_json(RestRequest::get("/rest/api/2/resolution")).await?;
        Ok(payload
            .into_iter()
            .map(|entry| TrackerResolution {
                id: entry.id,
                name: entry.name,
            })
            .collect())
    }

    async fn components(&self, project_key: &str) -> Result<Vec<TrackerComponent>, CoreError> {
        let payload: Vec<IdNamePayload> = self
            .call_json(RestRequest::get(format!(
                "/rest/api/2/project/{project_key}/components"
            )))
            .await?;
        Ok(payload
            .into_iter()
            .map(|entry| TrackerComponent {
                id: entry.id,
                name: entry.name,
            })
            .collect())
    }

    async fn priorities(&self) -> Result<Vec<TrackerPriority>, CoreError> {
        let payload: Vec<IdNamePayload> =
            self.call_json(RestRequest::get("/rest/api/2/priority")).await?;
        Ok(payload
            .into_iter()
            .map(|entry| TrackerPriority {
                id: entry.id,
                name: entry.name,
            })
            .collect())
    }

    async fn user_by_email(&self, email: &str) -> Result<Option<TrackerUser>, CoreError> {
        let trimmed = email.trim();
        let mut users: Vec<UserPayload> = self
            .call_json(RestRequest::get("/rest/api/2/user/search").with_query("query", trimmed))
            .await?;

        // Jira hides addresses for users who opted out of email visibility;
        // an exact match wins, a lone hit is still taken as authoritative.
        let index = users
            .iter()
            .position(|user| {
                user.email_address
                    .as_deref()
                    .is_some_and(|address| address.eq_ignore_ascii_case(trimmed))
            })
            .or_else(|| (users.len() == 1).then_some(0));

        Ok(index.map(|index| users.swap_remove(index).into_user()))
    }

    async fn issue_property(&self, key: &str, property: &str) -> Result<Option<Value>, CoreError> {
        let path = format!("/rest/api/2/issue/{key}/properties/{property}");
        let response = self.transport.execute(RestRequest::get(&path)).await?;
        if response.status == 404 {
            return Ok(None);
        }
        if !response.is_success() {
            return Err(http_error(RestMethod::Get, &path, &response));
        }

        let payload: PropertyPayload = response.decode()?;
        Ok(Some(payload.value))
    }

    async fn set_issue_property(
        &self,
        key: &str,
        property: &str,
        value: Value,
    ) -> Result<(), CoreError> {
        self.call(RestRequest::put(
            format!("/rest/api/2/issue/{key}/properties/{property}"),
            value,
        ))
        .await?;
        Ok(())
    }

    async fn add_comment(&self, key: &str, body: &str) -> Result<(), CoreError> {
        self.call(RestRequest::post(
            format!("/rest/api/2/issue/{key}/comment"),
            json!({"body": body}),
        ))
        .await?;
        Ok(())
    }

    fn browse_url(&self, key: &str) -> String {
        format!("{}/browse/{}", self.browse_base, key)
    }
}

// Best-effort parse of the issue object a webhook inlines; a structural
// mismatch just means the caller re-fetches over REST.
pub(crate) fn issue_from_webhook(issue: &Value) -> Option<TrackerIssue> {
    serde_json::from_value::<IssuePayload>(issue.clone())
        .ok()
        .map(IssuePayload::into_issue)
}

#[derive(Debug, Deserialize)]
struct CreatedPayload {
    key: String,
}

#[derive(Debug, Deserialize)]
struct IssuePayload {
    key: String,
    fields: IssueFieldsPayload,
}

#[derive(Debug, Deserialize)]
struct IssueFieldsPayload {
    #[serde(default)]
    summary: Option<String>,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    status: Option<StatusPayload>,
    #[serde(default)]
    resolution: Option<NamedPayload>,
    #[serde(default)]
    assignee: Option<UserPayload>,
    #[serde(default)]
    priority: Option<NamedPayload>,
    #[serde(default)]
    labels: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct StatusPayload {
    name: String,
    #[serde(rename = "statusCategory", default)]
    category: Option<NamedPayload>,
}

#[derive(Debug, Deserialize)]
struct NamedPayload {
    name: String,
}

#[derive(Debug, Deserialize)]
struct IdNamePayload {
    id: String,
    name: String,
}

#[derive(Debug, Deserialize)]
struct UserPayload {
    #[serde(rename = "accountId")]
    account_id: String,
    #[serde(rename = "emailAddress", default)]
    email_address: Option<String>,
    #[serde(rename = "displayName", default)]
    display_name: Option<String>,
}

impl UserPayload {
    fn into_user(self) -> TrackerUser {
        TrackerUser {
            account_id: self.account_id,
            email: self.email_address,
            display_name: self.display_name,
        }
    }
}

#[derive(Debug, Deserialize)]
struct SearchPayload {
    #[serde(default)]
    issues: Vec<IssuePayload>,
}

#[derive(Debug, Deserialize)]
struct TransitionsPayload {
    #[serde(default)]
    transitions: Vec<IdNamePayload>,
}

#[derive(Debug, Deserialize)]
struct PropertyPayload {
    value: Value,
}

impl IssuePayload {
    fn into_issue(self) -> TrackerIssue {
        let fields = self.fields;
        let status = match fields.status {
            Some(status) => {
                let category = status
                    .category
                    .map(|category| category.name)
                    .unwrap_or_else(|| status.name.clone());
                IssueStatus {
                    name: status.name,
                    category,
                }
            }
            None => IssueStatus {
                name: "Unknown".to_owned(),
                category: "unknown".to_owned(),
            },
        };

        TrackerIssue {
            key: self.key,
            summary: fields.summary.unwrap_or_default(),
            description: fields.description,
            status,
            resolution: fields.resolution.map(|resolution| resolution.name),
            assignee_id: fields.assignee.map(|user| user.account_id),
            priority: fields.priority.map(|priority| priority.name),
            labels: fields.labels,
        }
    }
}
