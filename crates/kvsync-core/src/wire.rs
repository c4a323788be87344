//! Operation wire format.
//!
//! ```text
//! { "op": "put"|"delete", "bucket": string, "key": string,
//!   "value": string (iff op == "put"), "ts": number, "nodeId": string }
//! ```
//!
//! An absent `value` is distinct from an empty string. A put without a value
//! or a delete with one is rejected as a decode error. `ts` may arrive in
//! float form (`1.7e12`) as long as it is a non-negative integer that a
//! double represents exactly.

use crate::clock::Timestamp;
use crate::errors::{SyncError, SyncResult};
use crate::identifiers::NodeId;
use crate::operation::{OpKind, Operation};
use serde::{de, Deserialize, Deserializer, Serialize};

/// Largest integer a double holds exactly
const MAX_EXACT_FLOAT: f64 = 9_007_199_254_740_991.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
enum WireOpKind {
    Put,
    Delete,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct WireOperation {
    op: WireOpKind,
    bucket: String,
    key: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    value: Option<String>,
    #[serde(deserialize_with = "timestamp")]
    ts: Timestamp,
    #[serde(rename = "nodeId")]
    node_id: String,
}

fn timestamp<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Timestamp, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Number {
        Integer(u64),
        Float(f64),
    }

    match Number::deserialize(deserializer)? {
        Number::Integer(ts) => Ok(ts),
        Number::Float(ts) if ts >= 0.0 && ts <= MAX_EXACT_FLOAT && ts.fract() == 0.0 => {
            Ok(ts as Timestamp)
        }
        Number::Float(ts) => Err(de::Error::custom(format!(
            "ts {ts} is not a non-negative integer"
        ))),
    }
}

impl From<&Operation> for WireOperation {
    fn from(op: &Operation) -> Self {
        let (kind, value) = match &op.kind {
            OpKind::Put { value } => (WireOpKind::Put, Some(value.clone())),
            OpKind::Delete => (WireOpKind::Delete, None),
        };
        Self {
            op: kind,
            bucket: op.bucket.clone(),
            key: op.key.clone(),
            value,
            ts: op.timestamp,
            node_id: op.origin.as_str().to_string(),
        }
    }
}

impl TryFrom<WireOperation> for Operation {
    type Error = SyncError;

    fn try_from(wire: WireOperation) -> SyncResult<Self> {
        let kind = match (wire.op, wire.value) {
            (WireOpKind::Put, Some(value)) => OpKind::Put { value },
            (WireOpKind::Put, None) => {
                return Err(SyncError::decode(format!(
                    "put for key '{}' has no value",
                    wire.key
                )))
            }
            (WireOpKind::Delete, None) => OpKind::Delete,
            (WireOpKind::Delete, Some(_)) => {
                return Err(SyncError::decode(format!(
                    "delete for key '{}' carries a value",
                    wire.key
                )))
            }
        };
        Ok(Self {
            kind,
            bucket: wire.bucket,
            key: wire.key,
            timestamp: wire.ts,
            origin: NodeId::new(wire.node_id),
        })
    }
}

/// Serialize an operation for publishing.
pub fn encode_operation(op: &Operation) -> SyncResult<Vec<u8>> {
    serde_json::to_vec(&WireOperation::from(op)).map_err(SyncError::from)
}

/// Decode a received payload.
///
/// Any failure is a [`SyncError::Decode`]; callers treat it as terminal.
pub fn decode_operation(bytes: &[u8]) -> SyncResult<Operation> {
    let wire: WireOperation =
        serde_json::from_slice(bytes).map_err(|e| SyncError::decode(e.to_string()))?;
    Operation::try_from(wire)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Value;

    #[test]
    fn put_uses_documented_field_names() {
        let op = Operation::put("config", "k1", "x", 42, NodeId::from("site-a"));
        let json: Value = serde_json::from_slice(&encode_operation(&op).unwrap()).unwrap();

        assert_eq!(json["op"], "put");
        assert_eq!(json["bucket"], "config");
        assert_eq!(json["key"], "k1");
        assert_eq!(json["value"], "x");
        assert_eq!(json["ts"], 42);
        assert_eq!(json["nodeId"], "site-a");
    }

    #[test]
    fn delete_omits_value_field() {
        let op = Operation::delete("config", "k1", 43, NodeId::from("site-a"));
        let json: Value = serde_json::from_slice(&encode_operation(&op).unwrap()).unwrap();

        assert_eq!(json["op"], "delete");
        assert!(json.get("value").is_none());
        assert_eq!(decode_operation(&encode_operation(&op).unwrap()).unwrap(), op);
    }

    #[test]
    fn empty_value_survives_the_wire() {
        let op = Operation::put("config", "k1", "", 1, NodeId::from("site-a"));
        let decoded = decode_operation(&encode_operation(&op).unwrap()).unwrap();
        assert_eq!(decoded.kind, OpKind::Put { value: String::new() });
    }

    #[test]
    fn decodes_payload_from_another_site() {
        let payload = br#"{"op":"put","bucket":"config","key":"k","value":"v","ts":1700000000001,"nodeId":"site-b"}"#;
        let op = decode_operation(payload).unwrap();
        assert_eq!(op.origin, NodeId::from("site-b"));
        assert_eq!(op.timestamp, 1_700_000_000_001);
    }

    #[test]
    fn integral_float_timestamp_is_accepted() {
        let payload =
            br#"{"op":"put","bucket":"config","key":"k","value":"v","ts":1.7e12,"nodeId":"a"}"#;
        assert_eq!(decode_operation(payload).unwrap().timestamp, 1_700_000_000_000);
    }

    #[test]
    fn rejects_malformed_payloads() {
        let cases: [&[u8]; 7] = [
            b"not json",
            br#"{"op":"put","bucket":"config","key":"k","ts":1,"nodeId":"a"}"#,
            br#"{"op":"delete","bucket":"config","key":"k","value":"v","ts":1,"nodeId":"a"}"#,
            br#"{"op":"merge","bucket":"config","key":"k","ts":1,"nodeId":"a"}"#,
            br#"{"op":"put","bucket":"config","key":"k","value":"v","ts":-1,"nodeId":"a"}"#,
            br#"{"op":"put","bucket":"config","key":"k","value":"v","ts":1.5,"nodeId":"a"}"#,
            br#"{"op":"put","bucket":"config","key":"k","value":"v","ts":"7","nodeId":"a"}"#,
        ];
        for payload in cases {
            let err = decode_operation(payload).unwrap_err();
            assert!(matches!(err, SyncError::Decode { .. }), "{err:?}");
        }
    }
}
