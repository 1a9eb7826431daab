use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::CoreError;
use crate::identity::RequestIdentity;

// The only durable record of the thread <-> ticket association, stored on the
// ticket under the configured property key. Field names are a wire contract
// shared with previously written tickets; never rename them.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SidecarProperties {
    pub channel_id: String,
    #[serde(rename = "threadId")]
    pub thread_ts: String,
    #[serde(
        rename = "actionMessageId",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub action_message_ts: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notification_channel_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reporter_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub claimer_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub closer_id: Option<String>,
}

impl SidecarProperties {
    pub fn for_identity(identity: &RequestIdentity) -> Self {
        Self {
            channel_id: identity.channel().to_owned(),
            thread_ts: identity.thread_ts().to_owned(),
            ..Self::default()
        }
    }

    pub fn identity(&self) -> RequestIdentity {
        RequestIdentity::new(self.channel_id.clone(), self.thread_ts.clone())
    }

    pub fn matches(&self, identity: &RequestIdentity) -> bool {
        self.channel_id == identity.channel() && self.thread_ts == identity.thread_ts()
    }

    pub fn from_value(value: &Value) -> Result<Self, CoreError> {
        serde_json::from_value(value.clone())
            .map_err(|err| CoreError::Integration(format!("undecodable sidecar property: {err}")))
    }

    pub fn to_value(&self) -> Result<Value, CoreError> {
        serde_json::to_value(self)
            .map_err(|err| CoreError::Integration(format!("unserializable sidecar: {err}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn serializes_with_contract_field_names() {
        let sidecar = SidecarProperties {
            channel_id: "C024BE91L".to_owned(),
            thread_ts: "1712345678.000200".to_owned(),
            action_message_ts: Some("1712345680.000300".to_owned()),
            notification_channel_id: Some("C0NOTIFY".to_owned()),
            reporter_id: Some("U1".to_owned()),
            claimer_id: Some("U2".to_owned()),
            closer_id: None,
        };

        let value = sidecar.to_value().expect("serialize sidecar");
        assert_eq!(
            value,
            json!({
                "channelId": "C024BE91L",
                "threadId": "1712345678.000200",
                "actionMessageId": "1712345680.000300",
                "notificationChannelId": "C0NOTIFY",
                "reporterId": "U1",
                "claimerId": "U2",
            })
        );
    }

    #[test]
    fn decodes_minimal_blob_with_absent_optionals() {
        let value = json!({
            "channelId": "C024BE91L",
            "threadId": "1712345678.000200",
        });

        let sidecar = SidecarProperties::from_value(&value).expect("decode sidecar");
        assert_eq!(sidecar.channel_id, "C024BE91L");
        assert_eq!(sidecar.action_message_ts, None);
        assert_eq!(sidecar.claimer_id, None);
    }

    #[test]
    fn matches_compares_channel_and_thread() {
        let identity = RequestIdentity::new("C024BE91L", "1712345678.000200");
        let sidecar = SidecarProperties::for_identity(&identity);

        assert!(sidecar.matches(&identity));
        assert!(!sidecar.matches(&RequestIdentity::new("C024BE91L", "1712345678.000201")));
        assert!(!sidecar.matches(&RequestIdentity::new("CXXXXXXXX", "1712345678.000200")));
        assert_eq!(sidecar.identity(), identity);
    }

    #[test]
    fn rejects_malformed_blob() {
        let error = SidecarProperties::from_value(&json!({"channelId": 7}))
            .expect_err("must reject non-string channel");
        assert!(matches!(error, CoreError::Integration(_)));
    }
}
