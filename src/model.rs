//! Value types materialised from control responses.
//!
//! The server embeds aggregates and events as JSON text inside binary
//! responses. Keys are camelCase; snake_case aliases are accepted. Absent
//! optional keys decode to documented defaults: `state`/`payload` to `{}`,
//! `merkleRoot`/`hash` to `""`, `archived` to `false`, `sequence` to `None`
//! and a blank `createdAt` to the Unix epoch.
use std::{fmt, str::FromStr};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::ClientError;

fn empty_object() -> Value {
    Value::Object(Map::new())
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Endpoint {
    pub host: String,
    pub port: u16,
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AggregateSnapshot {
    #[serde(alias = "aggregate_type")]
    pub aggregate_type: String,
    #[serde(alias = "aggregate_id")]
    pub aggregate_id: String,
    pub version: u64,
    #[serde(default = "empty_object")]
    pub state: Value,
    #[serde(default, alias = "merkle_root")]
    pub merkle_root: String,
    #[serde(default)]
    pub archived: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActorClaims {
    #[serde(default)]
    pub group: String,
    #[serde(default)]
    pub user: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventMetadata {
    #[serde(default, alias = "event_id")]
    pub event_id: String,
    #[serde(
        default = "epoch",
        alias = "created_at",
        serialize_with = "timestamp::serialize",
        deserialize_with = "timestamp::deserialize"
    )]
    pub created_at: DateTime<Utc>,
    #[serde(default, alias = "issued_by", skip_serializing_if = "Option::is_none")]
    pub issued_by: Option<ActorClaims>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

fn epoch() -> DateTime<Utc> {
    DateTime::<Utc>::UNIX_EPOCH
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventRecord {
    #[serde(alias = "aggregate_type")]
    pub aggregate_type: String,
    #[serde(alias = "aggregate_id")]
    pub aggregate_id: String,
    #[serde(alias = "event_type")]
    pub event_type: String,
    pub version: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sequence: Option<u64>,
    #[serde(default = "empty_object")]
    pub payload: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<EventMetadata>,
    #[serde(default)]
    pub hash: String,
    #[serde(default, alias = "merkle_root")]
    pub merkle_root: String,
}

/// One page of a cursor-paginated listing.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Page<T> {
    pub items: Vec<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_cursor: Option<String>,
}

impl<T> Page<T> {
    pub fn new(items: Vec<T>, next_cursor: Option<String>) -> Self {
        Self { items, next_cursor }
    }

    /// No further pages follow this one.
    pub fn is_last(&self) -> bool {
        self.next_cursor.is_none()
    }
}

/// Downstream plugin an event should be published to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublishTarget {
    pub plugin: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mode: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority: Option<String>,
}

impl PublishTarget {
    pub fn new(
        plugin: impl Into<String>,
        mode: Option<String>,
        priority: Option<String>,
    ) -> Result<Self, ClientError> {
        let plugin = plugin.into();
        if plugin.trim().is_empty() {
            return Err(ClientError::Configuration(
                "plugin is required for publish targets".into(),
            ));
        }
        Ok(Self {
            plugin,
            mode,
            priority,
        })
    }

    pub fn plugin(plugin: impl Into<String>) -> Result<Self, ClientError> {
        Self::new(plugin, None, None)
    }
}

/// Parses `plugin[:mode[:priority]]`; blank mode or priority parts are absent.
impl FromStr for PublishTarget {
    type Err = ClientError;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        let mut parts = input.split(':');
        let plugin = parts.next().unwrap_or_default();
        let mut part = || {
            parts
                .next()
                .filter(|p| !p.trim().is_empty())
                .map(str::to_string)
        };
        let mode = part();
        let priority = part();
        Self::new(plugin, mode, priority)
    }
}

/// One RFC 6902 JSON Patch operation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsonPatchOperation {
    pub op: String,
    pub path: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<Value>,
}

impl JsonPatchOperation {
    pub fn add(path: impl Into<String>, value: Value) -> Self {
        Self::with_value("add", path, value)
    }

    pub fn replace(path: impl Into<String>, value: Value) -> Self {
        Self::with_value("replace", path, value)
    }

    pub fn remove(path: impl Into<String>) -> Self {
        Self {
            op: "remove".into(),
            path: path.into(),
            from: None,
            value: None,
        }
    }

    fn with_value(op: &str, path: impl Into<String>, value: Value) -> Self {
        Self {
            op: op.into(),
            path: path.into(),
            from: None,
            value: Some(value),
        }
    }
}

mod timestamp {
    use chrono::{DateTime, Utc};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(value: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&value.to_rfc3339())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = Option::<String>::deserialize(deserializer)?.unwrap_or_default();
        if raw.trim().is_empty() {
            return Ok(DateTime::<Utc>::UNIX_EPOCH);
        }
        DateTime::parse_from_rfc3339(raw.trim())
            .map(|dt| dt.with_timezone(&Utc))
            .map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;
    use serde_json::json;

    use super::*;

    #[test]
    fn snapshot_defaults_for_absent_fields() {
        let snapshot: AggregateSnapshot = serde_json::from_value(json!({
            "aggregateType": "person",
            "aggregateId": "p-1",
            "version": 3
        }))
        .unwrap();

        assert_eq!(snapshot.state, json!({}));
        assert_eq!(snapshot.merkle_root, "");
        assert!(!snapshot.archived);
    }

    #[test]
    fn snapshot_round_trip() {
        let snapshot = AggregateSnapshot {
            aggregate_type: "person".into(),
            aggregate_id: "p-1".into(),
            version: 7,
            state: json!({"name": "Jane", "tags": ["a", "b"]}),
            merkle_root: "abc".into(),
            archived: true,
        };
        let text = serde_json::to_string(&snapshot).unwrap();
        assert!(text.contains("\"aggregateType\""));

        let decoded: AggregateSnapshot = serde_json::from_str(&text).unwrap();
        assert_eq!(decoded, snapshot);
    }

    #[test]
    fn snake_case_keys_are_accepted() {
        let snapshot: AggregateSnapshot = serde_json::from_value(json!({
            "aggregate_type": "order",
            "aggregate_id": "o-9",
            "version": 1,
            "merkle_root": "ff"
        }))
        .unwrap();
        assert_eq!(snapshot.aggregate_type, "order");
        assert_eq!(snapshot.merkle_root, "ff");
    }

    #[test]
    fn event_round_trip_with_metadata() {
        let event = EventRecord {
            aggregate_type: "person".into(),
            aggregate_id: "p-1".into(),
            event_type: "person_registered".into(),
            version: 1,
            sequence: Some(12),
            payload: json!({"name": "Jane"}),
            metadata: Some(EventMetadata {
                event_id: "evt-1".into(),
                created_at: Utc.with_ymd_and_hms(2024, 5, 1, 12, 30, 0).unwrap(),
                issued_by: Some(ActorClaims {
                    group: "admins".into(),
                    user: "jane".into(),
                }),
                note: Some("seed".into()),
            }),
            hash: "h".into(),
            merkle_root: "m".into(),
        };

        let text = serde_json::to_string(&event).unwrap();
        let decoded: EventRecord = serde_json::from_str(&text).unwrap();
        assert_eq!(decoded, event);
    }

    #[test]
    fn event_defaults_for_absent_fields() {
        let event: EventRecord = serde_json::from_value(json!({
            "aggregateType": "person",
            "aggregateId": "p-1",
            "eventType": "touched",
            "version": 2,
            "metadata": {"eventId": "e", "createdAt": ""}
        }))
        .unwrap();

        assert_eq!(event.sequence, None);
        assert_eq!(event.payload, json!({}));
        assert_eq!(event.hash, "");
        assert_eq!(event.merkle_root, "");
        let metadata = event.metadata.unwrap();
        assert_eq!(metadata.created_at, DateTime::<Utc>::UNIX_EPOCH);
        assert!(metadata.issued_by.is_none());
    }

    #[test]
    fn publish_target_from_colon_string() {
        let target: PublishTarget = "search:async:high".parse().unwrap();
        assert_eq!(target.plugin, "search");
        assert_eq!(target.mode.as_deref(), Some("async"));
        assert_eq!(target.priority.as_deref(), Some("high"));

        let target: PublishTarget = "audit::low".parse().unwrap();
        assert_eq!(target.mode, None);
        assert_eq!(target.priority.as_deref(), Some("low"));

        assert!(matches!(
            ":sync".parse::<PublishTarget>(),
            Err(ClientError::Configuration(_))
        ));
    }

    #[test]
    fn patch_operations_serialize_as_rfc6902() {
        let ops = vec![
            JsonPatchOperation::add("/status", json!("active")),
            JsonPatchOperation::remove("/legacy"),
        ];
        assert_eq!(
            serde_json::to_value(&ops).unwrap(),
            json!([
                {"op": "add", "path": "/status", "value": "active"},
                {"op": "remove", "path": "/legacy"}
            ])
        );
    }
}
