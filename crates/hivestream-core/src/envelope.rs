//! Application payload envelope carried in transfer memos and custom JSON.
//!
//! ```json
//! { "hive_stream": { "id": "hivestream", "name": "dice", "action": "roll", "payload": { "roll": 22 } } }
//! ```
//!
//! The outer key is the configured payload identifier, `id` must equal the
//! configured application id, `name` selects the contract and `action` the
//! contract action.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A decoded envelope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PayloadEnvelope {
    pub id: String,
    pub name: String,
    pub action: String,
    #[serde(default)]
    pub payload: Value,
}

impl PayloadEnvelope {
    /// Decode `raw` as an envelope under `payload_identifier` for `app_id`.
    ///
    /// Returns `None` for anything that is not valid JSON, lacks the key,
    /// has the wrong shape, or targets another application.
    pub fn decode(raw: &str, payload_identifier: &str, app_id: &str) -> Option<Self> {
        let raw = raw.trim();
        if !raw.starts_with('{') {
            return None;
        }
        let mut doc: Value = serde_json::from_str(raw).ok()?;
        let inner = doc.get_mut(payload_identifier)?.take();
        let envelope: Self = serde_json::from_value(inner).ok()?;
        if envelope.id != app_id || envelope.name.is_empty() || envelope.action.is_empty() {
            return None;
        }
        Some(envelope)
    }

    /// Encode this envelope under `payload_identifier` (memo / JSON body form).
    pub fn encode(&self, payload_identifier: &str) -> String {
        let mut doc = serde_json::Map::new();
        doc.insert(
            payload_identifier.to_string(),
            serde_json::to_value(self).unwrap_or(Value::Null),
        );
        Value::Object(doc).to_string()
    }
}

/// Sender data handed to transfer hooks and actions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferMeta {
    pub sender: String,
    pub amount: String,
}

/// Sender data handed to custom JSON hooks and actions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustomJsonMeta {
    pub sender: String,
    pub is_signed_with_active_key: bool,
    /// The custom JSON operation id.
    pub id: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const KEY: &str = "hive_stream";
    const APP: &str = "hivestream";

    #[test]
    fn decodes_valid_envelope() {
        let memo = json!({
            KEY: {"id": APP, "name": "foo", "action": "bar", "payload": {"x": 1}}
        })
        .to_string();
        let env = PayloadEnvelope::decode(&memo, KEY, APP).unwrap();
        assert_eq!(env.name, "foo");
        assert_eq!(env.action, "bar");
        assert_eq!(env.payload, json!({"x": 1}));
    }

    #[test]
    fn rejects_other_application() {
        let memo = json!({KEY: {"id": "someone-else", "name": "foo", "action": "bar"}}).to_string();
        assert!(PayloadEnvelope::decode(&memo, KEY, APP).is_none());
    }

    #[test]
    fn rejects_plain_memos_and_bad_json() {
        assert!(PayloadEnvelope::decode("thanks for the coffee", KEY, APP).is_none());
        assert!(PayloadEnvelope::decode("{not json", KEY, APP).is_none());
        assert!(PayloadEnvelope::decode(r#"{"other": 1}"#, KEY, APP).is_none());
        assert!(PayloadEnvelope::decode(r#"{"hive_stream": "flat"}"#, KEY, APP).is_none());
    }

    #[test]
    fn missing_payload_defaults_to_null() {
        let memo = json!({KEY: {"id": APP, "name": "foo", "action": "bar"}}).to_string();
        let env = PayloadEnvelope::decode(&memo, KEY, APP).unwrap();
        assert_eq!(env.payload, Value::Null);
    }

    #[test]
    fn encode_decodes_back() {
        let env = PayloadEnvelope {
            id: APP.into(),
            name: "dice".into(),
            action: "roll".into(),
            payload: json!({"roll": 50}),
        };
        let memo = env.encode(KEY);
        assert_eq!(PayloadEnvelope::decode(&memo, KEY, APP), Some(env));
    }
}
