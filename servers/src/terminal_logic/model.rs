use lib_common::core::StoreField;
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientMessage {
    pub subscribe: Option<Vec<StoreField>>,
    pub unsubscribe: Option<Vec<StoreField>>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ServerMessage {
    pub r#type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub field: Option<StoreField>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ack: Option<bool>,
}

impl ServerMessage {
    pub fn snapshot(message: Value) -> Self {
        Self { r#type: "snapshot".to_string(), field: None, message: Some(message), error: None, ack: None }
    }

    pub fn update(field: StoreField, message: Value) -> Self {
        Self { r#type: "update".to_string(), field: Some(field), message: Some(message), error: None, ack: None }
    }

    /// Market listing error flag, outside the store fields.
    pub fn status(markets_error: bool) -> Self {
        Self {
            r#type: "status".to_string(),
            field: None,
            message: Some(serde_json::json!({ "marketsError": markets_error })),
            error: None,
            ack: None,
        }
    }

    pub fn subscribed(fields: &[StoreField]) -> Self {
        Self {
            r#type: "subscribed".to_string(),
            field: None,
            message: serde_json::to_value(fields).ok(),
            error: None,
            ack: Some(true),
        }
    }

    pub fn error(error: String) -> Self {
        Self { r#type: "error".to_string(), field: None, message: None, error: Some(error), ack: Some(false) }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_client_message_field_names() {
        let msg: ClientMessage = serde_json::from_str(r#"{"subscribe": ["ticker", "funding_rates"]}"#).unwrap();
        assert_eq!(msg.subscribe, Some(vec![StoreField::Ticker, StoreField::FundingRates]));
        assert!(msg.unsubscribe.is_none());
        assert!(serde_json::from_str::<ClientMessage>(r#"{"subscribe": ["weather"]}"#).is_err());
    }

    #[test]
    fn test_update_serialization_skips_empty() {
        let msg = ServerMessage::update(StoreField::Ratio, json!({"longPercent": 65.0}));
        assert_eq!(
            serde_json::to_value(msg).unwrap(),
            json!({"type": "update", "field": "ratio", "message": {"longPercent": 65.0}})
        );
    }
}
