//! Shared types for the streaming pipeline.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

// ─── Operations ──────────────────────────────────────────────────────────────

/// A `transfer` operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferOp {
    pub from: String,
    pub to: String,
    /// Asset string as it appears on chain, e.g. `"1.000 HIVE"`.
    pub amount: String,
    #[serde(default)]
    pub memo: String,
}

/// A `custom_json` operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustomJsonOp {
    #[serde(default)]
    pub required_auths: Vec<String>,
    #[serde(default)]
    pub required_posting_auths: Vec<String>,
    /// Application id of the custom JSON (not the envelope id).
    pub id: String,
    /// Raw JSON body as a string.
    pub json: String,
}

impl CustomJsonOp {
    /// Resolve the signing account.
    ///
    /// Returns `(sender, is_signed_with_active_key)`. Active authorities take
    /// precedence over posting authorities.
    pub fn signer(&self) -> Option<(&str, bool)> {
        if let Some(first) = self.required_auths.first() {
            return Some((first.as_str(), true));
        }
        self.required_posting_auths
            .first()
            .map(|first| (first.as_str(), false))
    }
}

/// A `comment` operation (posts are comments without a parent author).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommentOp {
    #[serde(default)]
    pub parent_author: String,
    #[serde(default)]
    pub parent_permlink: String,
    pub author: String,
    pub permlink: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub body: String,
    #[serde(default)]
    pub json_metadata: String,
}

impl CommentOp {
    /// Returns `true` for top-level posts.
    pub fn is_post(&self) -> bool {
        self.parent_author.is_empty()
    }
}

/// A single block operation, decoded as far as the engine needs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum Operation {
    Transfer(TransferOp),
    CustomJson(CustomJsonOp),
    Comment(CommentOp),
    /// Any other operation kind, kept raw for adapter hooks.
    Other { name: String, body: Value },
}

impl Operation {
    /// The on-chain operation name (`"transfer"`, `"custom_json"`, ...).
    pub fn name(&self) -> &str {
        match self {
            Self::Transfer(_) => "transfer",
            Self::CustomJson(_) => "custom_json",
            Self::Comment(_) => "comment",
            Self::Other { name, .. } => name,
        }
    }

    /// Decode an operation from node JSON.
    ///
    /// Accepts the condenser tuple form `["transfer", {...}]` and the appbase
    /// object form `{"type": "transfer_operation", "value": {...}}`. Known
    /// kinds whose body does not match fall back to [`Operation::Other`].
    pub fn from_json(v: &Value) -> Option<Self> {
        let (name, body) = match v {
            Value::Array(pair) if pair.len() == 2 => (pair[0].as_str()?, pair[1].clone()),
            Value::Object(map) => {
                let name = map.get("type")?.as_str()?;
                let name = name.strip_suffix("_operation").unwrap_or(name);
                (name, map.get("value").cloned().unwrap_or(Value::Null))
            }
            _ => return None,
        };

        let typed = match name {
            "transfer" => serde_json::from_value(body.clone()).ok().map(Self::Transfer),
            "custom_json" => serde_json::from_value(body.clone()).ok().map(Self::CustomJson),
            "comment" => serde_json::from_value(body.clone()).ok().map(Self::Comment),
            _ => None,
        };
        Some(typed.unwrap_or_else(|| Self::Other {
            name: name.to_string(),
            body,
        }))
    }
}

// ─── Blocks ──────────────────────────────────────────────────────────────────

/// A transaction inside a block.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    pub operations: Vec<Operation>,
}

/// A block as returned by the blockchain client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Block {
    pub block_id: String,
    pub previous: String,
    /// Block production time (UTC). This is the clock for time-based actions.
    pub timestamp: DateTime<Utc>,
    /// Transaction ids, index-aligned with `transactions`.
    pub transaction_ids: Vec<String>,
    pub transactions: Vec<Transaction>,
}

impl Block {
    /// Iterate over `(transaction_id, operation)` in block order.
    pub fn operations(&self) -> impl Iterator<Item = (&str, &Operation)> + '_ {
        self.transactions.iter().enumerate().flat_map(move |(i, tx)| {
            let trx_id = self.transaction_ids.get(i).map(String::as_str).unwrap_or("");
            tx.operations.iter().map(move |op| (trx_id, op))
        })
    }

    /// Total number of operations across all transactions.
    pub fn operation_count(&self) -> usize {
        self.transactions.iter().map(|t| t.operations.len()).sum()
    }
}

// ─── OperationContext ────────────────────────────────────────────────────────

/// Block context passed alongside each operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperationContext {
    pub block_number: u64,
    pub block_id: String,
    pub previous_block_id: String,
    pub transaction_id: String,
    pub block_time: DateTime<Utc>,
}

impl OperationContext {
    /// Build the context for an operation of `block`.
    pub fn for_block(block_number: u64, block: &Block, transaction_id: &str) -> Self {
        Self {
            block_number,
            block_id: block.block_id.clone(),
            previous_block_id: block.previous.clone(),
            transaction_id: transaction_id.to_string(),
            block_time: block.timestamp,
        }
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn decode_condenser_transfer() {
        let op = Operation::from_json(&json!([
            "transfer",
            {"from": "alice", "to": "bob", "amount": "1.000 HIVE", "memo": "hi"}
        ]))
        .unwrap();
        match op {
            Operation::Transfer(t) => {
                assert_eq!(t.from, "alice");
                assert_eq!(t.amount, "1.000 HIVE");
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn decode_appbase_custom_json() {
        let op = Operation::from_json(&json!({
            "type": "custom_json_operation",
            "value": {
                "required_auths": [],
                "required_posting_auths": ["carol"],
                "id": "hivestream",
                "json": "{}"
            }
        }))
        .unwrap();
        assert_eq!(op.name(), "custom_json");
    }

    #[test]
    fn unknown_kind_is_kept_raw() {
        let op = Operation::from_json(&json!(["vote", {"voter": "dave"}])).unwrap();
        assert_eq!(op.name(), "vote");
        assert!(matches!(op, Operation::Other { .. }));
    }

    #[test]
    fn signer_prefers_active_authority() {
        let mut op = CustomJsonOp {
            required_auths: vec!["alice".into()],
            required_posting_auths: vec!["bob".into()],
            id: "x".into(),
            json: "{}".into(),
        };
        assert_eq!(op.signer(), Some(("alice", true)));
        op.required_auths.clear();
        assert_eq!(op.signer(), Some(("bob", false)));
        op.required_posting_auths.clear();
        assert_eq!(op.signer(), None);
    }

    #[test]
    fn block_operations_keep_order_and_trx_ids() {
        let transfer = |memo: &str| {
            Operation::Transfer(TransferOp {
                from: "a".into(),
                to: "b".into(),
                amount: "1.000 HIVE".into(),
                memo: memo.into(),
            })
        };
        let block = Block {
            block_id: "0002".into(),
            previous: "0001".into(),
            timestamp: Utc::now(),
            transaction_ids: vec!["t1".into(), "t2".into()],
            transactions: vec![
                Transaction { operations: vec![transfer("1"), transfer("2")] },
                Transaction { operations: vec![transfer("3")] },
            ],
        };
        let seen: Vec<_> = block
            .operations()
            .map(|(trx, op)| match op {
                Operation::Transfer(t) => (trx.to_string(), t.memo.clone()),
                _ => unreachable!(),
            })
            .collect();
        assert_eq!(
            seen,
            vec![
                ("t1".to_string(), "1".to_string()),
                ("t1".to_string(), "2".to_string()),
                ("t2".to_string(), "3".to_string()),
            ]
        );
        assert_eq!(block.operation_count(), 3);
    }
}
