//! In-memory aggregate store backing the reference server.
//!
//! Aggregates are keyed by `(aggregate_type, aggregate_id)` and keep their full
//! event history. Every event receives a store-wide sequence number, a SHA-256
//! hash of its content and a merkle root chained from the previous event of
//! the same aggregate.
use std::{cmp::Ordering, collections::BTreeMap};

use chrono::Utc;
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};
use thiserror::Error;

use crate::model::{ActorClaims, AggregateSnapshot, EventMetadata, EventRecord, JsonPatchOperation};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum StoreError {
    #[error("aggregate {0}/{1} already exists")]
    Conflict(String, String),
    #[error("aggregate {0}/{1} not found")]
    NotFound(String, String),
    #[error("aggregate {0}/{1} is archived")]
    Archived(String, String),
    #[error("invalid patch: {0}")]
    InvalidPatch(String),
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    #[error("{0} is not supported")]
    Unsupported(String),
}

impl StoreError {
    /// Machine-readable code carried in error responses.
    pub fn code(&self) -> &'static str {
        match self {
            StoreError::Conflict(..) => "CONFLICT",
            StoreError::NotFound(..) => "NOT_FOUND",
            StoreError::Archived(..) => "ARCHIVED",
            StoreError::InvalidPatch(_) => "INVALID_PATCH",
            StoreError::InvalidArgument(_) => "INVALID_ARGUMENT",
            StoreError::Unsupported(_) => "UNSUPPORTED",
        }
    }
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Content of a write, independent of the verb that carried it.
#[derive(Debug, Clone, Default)]
pub struct EventInput {
    pub event_type: String,
    pub payload: Option<Value>,
    pub metadata: Option<Value>,
    pub note: Option<String>,
}

/// Offset window over a listing.
#[derive(Debug, Clone, Default)]
pub struct Window {
    pub cursor: Option<String>,
    pub take: Option<u64>,
    pub filter: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct ListQuery {
    pub window: Window,
    pub include_archived: bool,
    pub archived_only: bool,
    pub sort: Option<String>,
}

#[derive(Debug)]
struct Aggregate {
    snapshot: AggregateSnapshot,
    events: Vec<EventRecord>,
    archive_note: Option<String>,
}

#[derive(Debug, Default)]
pub struct AggregateStore {
    aggregates: BTreeMap<(String, String), Aggregate>,
    sequence: u64,
}

impl AggregateStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.aggregates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.aggregates.is_empty()
    }

    pub fn create(
        &mut self,
        aggregate_type: &str,
        aggregate_id: &str,
        input: EventInput,
    ) -> StoreResult<AggregateSnapshot> {
        let key = (aggregate_type.to_string(), aggregate_id.to_string());
        if self.aggregates.contains_key(&key) {
            return Err(StoreError::Conflict(key.0, key.1));
        }

        let payload = object_payload(input.payload.clone())?;
        let issued_by = issuer(&input.metadata)?;
        let mut aggregate = Aggregate {
            snapshot: AggregateSnapshot {
                aggregate_type: key.0.clone(),
                aggregate_id: key.1.clone(),
                version: 0,
                state: Value::Object(Map::new()),
                merkle_root: String::new(),
                archived: false,
            },
            events: Vec::new(),
            archive_note: None,
        };
        merge(&mut aggregate.snapshot.state, &payload);
        self.sequence += 1;
        record(&mut aggregate, self.sequence, &input, issued_by, payload);

        let snapshot = aggregate.snapshot.clone();
        self.aggregates.insert(key, aggregate);
        Ok(snapshot)
    }

    pub fn append(
        &mut self,
        aggregate_type: &str,
        aggregate_id: &str,
        input: EventInput,
    ) -> StoreResult<EventRecord> {
        let payload = object_payload(input.payload.clone())?;
        let issued_by = issuer(&input.metadata)?;
        let sequence = self.sequence + 1;

        let aggregate = self.writable(aggregate_type, aggregate_id)?;
        merge(&mut aggregate.snapshot.state, &payload);
        let event = record(aggregate, sequence, &input, issued_by, payload);
        self.sequence = sequence;
        Ok(event)
    }

    pub fn patch(
        &mut self,
        aggregate_type: &str,
        aggregate_id: &str,
        operations: &[JsonPatchOperation],
        input: EventInput,
    ) -> StoreResult<AggregateSnapshot> {
        let payload = serde_json::to_value(operations)
            .map_err(|e| StoreError::InvalidPatch(e.to_string()))?;
        let patch: json_patch::Patch = serde_json::from_value(payload.clone())
            .map_err(|e| StoreError::InvalidPatch(e.to_string()))?;
        let issued_by = issuer(&input.metadata)?;
        let sequence = self.sequence + 1;

        let aggregate = self.writable(aggregate_type, aggregate_id)?;
        let mut state = aggregate.snapshot.state.clone();
        json_patch::patch(&mut state, &patch.0)
            .map_err(|e| StoreError::InvalidPatch(e.to_string()))?;
        aggregate.snapshot.state = state;
        record(aggregate, sequence, &input, issued_by, payload);
        let snapshot = aggregate.snapshot.clone();
        self.sequence = sequence;
        Ok(snapshot)
    }

    /// Archiving an archived aggregate (or restoring a live one) only
    /// replaces the stored note.
    pub fn set_archived(
        &mut self,
        aggregate_type: &str,
        aggregate_id: &str,
        archived: bool,
        note: Option<String>,
    ) -> StoreResult<AggregateSnapshot> {
        let aggregate = self.existing(aggregate_type, aggregate_id)?;
        aggregate.snapshot.archived = archived;
        aggregate.archive_note = note;
        Ok(aggregate.snapshot.clone())
    }

    /// Note attached by the most recent archive or restore.
    pub fn archive_note(&self, aggregate_type: &str, aggregate_id: &str) -> Option<&str> {
        self.aggregates
            .get(&(aggregate_type.to_string(), aggregate_id.to_string()))?
            .archive_note
            .as_deref()
    }

    pub fn get(&self, aggregate_type: &str, aggregate_id: &str) -> Option<&AggregateSnapshot> {
        self.aggregates
            .get(&(aggregate_type.to_string(), aggregate_id.to_string()))
            .map(|a| &a.snapshot)
    }

    /// Projects dot-separated field paths out of the aggregate state. Missing
    /// paths map to `null`.
    pub fn select(
        &self,
        aggregate_type: &str,
        aggregate_id: &str,
        fields: &[String],
    ) -> Option<Value> {
        let snapshot = self.get(aggregate_type, aggregate_id)?;
        let selection = fields
            .iter()
            .map(|field| {
                let value = field
                    .split('.')
                    .try_fold(&snapshot.state, |value, key| value.get(key))
                    .cloned()
                    .unwrap_or(Value::Null);
                (field.clone(), value)
            })
            .collect::<Map<_, _>>();
        Some(Value::Object(selection))
    }

    pub fn list(&self, query: &ListQuery) -> StoreResult<(Vec<AggregateSnapshot>, Option<String>)> {
        reject_filter(&query.window.filter)?;
        let sort = parse_sort(query.sort.as_deref())?;

        let mut snapshots: Vec<&AggregateSnapshot> = self
            .aggregates
            .values()
            .map(|a| &a.snapshot)
            .filter(|s| {
                if query.archived_only {
                    s.archived
                } else {
                    query.include_archived || !s.archived
                }
            })
            .collect();
        if !sort.is_empty() {
            snapshots.sort_by(|a, b| compare(a, b, &sort));
        }

        let (items, next) = paginate(&snapshots, &query.window)?;
        Ok((items.iter().map(|s| (*s).clone()).collect(), next))
    }

    pub fn events(
        &self,
        aggregate_type: &str,
        aggregate_id: &str,
        window: &Window,
    ) -> StoreResult<(Vec<EventRecord>, Option<String>)> {
        reject_filter(&window.filter)?;
        let aggregate = self
            .aggregates
            .get(&(aggregate_type.to_string(), aggregate_id.to_string()))
            .ok_or_else(|| StoreError::NotFound(aggregate_type.into(), aggregate_id.into()))?;

        let (items, next) = paginate(&aggregate.events, window)?;
        Ok((items.to_vec(), next))
    }

    fn existing(&mut self, aggregate_type: &str, aggregate_id: &str) -> StoreResult<&mut Aggregate> {
        self.aggregates
            .get_mut(&(aggregate_type.to_string(), aggregate_id.to_string()))
            .ok_or_else(|| StoreError::NotFound(aggregate_type.into(), aggregate_id.into()))
    }

    fn writable(&mut self, aggregate_type: &str, aggregate_id: &str) -> StoreResult<&mut Aggregate> {
        let aggregate = self.existing(aggregate_type, aggregate_id)?;
        if aggregate.snapshot.archived {
            return Err(StoreError::Archived(aggregate_type.into(), aggregate_id.into()));
        }
        Ok(aggregate)
    }
}

fn object_payload(payload: Option<Value>) -> StoreResult<Map<String, Value>> {
    match payload {
        None | Some(Value::Null) => Ok(Map::new()),
        Some(Value::Object(map)) => Ok(map),
        Some(_) => Err(StoreError::InvalidArgument(
            "event payload must be a JSON object".into(),
        )),
    }
}

fn merge(state: &mut Value, payload: &Map<String, Value>) {
    if let Value::Object(state) = state {
        for (key, value) in payload {
            state.insert(key.clone(), value.clone());
        }
    }
}

fn issuer(metadata: &Option<Value>) -> StoreResult<Option<ActorClaims>> {
    match metadata {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Object(metadata)) => metadata
            .get("issuedBy")
            .or_else(|| metadata.get("issued_by"))
            .map(|claims| serde_json::from_value::<ActorClaims>(claims.clone()))
            .transpose()
            .map_err(|e| StoreError::InvalidArgument(format!("invalid issuedBy: {e}"))),
        Some(_) => Err(StoreError::InvalidArgument(
            "event metadata must be a JSON object".into(),
        )),
    }
}

/// Appends an event to `aggregate`, bumping its version and merkle root.
fn record(
    aggregate: &mut Aggregate,
    sequence: u64,
    input: &EventInput,
    issued_by: Option<ActorClaims>,
    payload: impl Into<Value>,
) -> EventRecord {
    let payload = payload.into();
    let snapshot = &mut aggregate.snapshot;
    let version = snapshot.version + 1;

    let hash = hex::encode(Sha256::digest(
        format!(
            "{}|{}|{}|{}|{}",
            snapshot.aggregate_type, snapshot.aggregate_id, version, input.event_type, payload
        )
        .as_bytes(),
    ));
    let merkle_root = hex::encode(Sha256::digest(
        format!("{}{}", snapshot.merkle_root, hash).as_bytes(),
    ));

    let event = EventRecord {
        aggregate_type: snapshot.aggregate_type.clone(),
        aggregate_id: snapshot.aggregate_id.clone(),
        event_type: input.event_type.clone(),
        version,
        sequence: Some(sequence),
        payload,
        metadata: Some(EventMetadata {
            event_id: format!("evt-{sequence:020}"),
            created_at: Utc::now(),
            issued_by,
            note: input.note.clone(),
        }),
        hash,
        merkle_root: merkle_root.clone(),
    };

    snapshot.version = version;
    snapshot.merkle_root = merkle_root;
    aggregate.events.push(event.clone());
    event
}

fn reject_filter(filter: &Option<String>) -> StoreResult<()> {
    match filter {
        Some(f) if !f.trim().is_empty() => Err(StoreError::Unsupported("filtering".into())),
        _ => Ok(()),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SortField {
    AggregateType,
    AggregateId,
    Version,
}

/// Parses `field[:asc|:desc]` terms separated by commas.
fn parse_sort(sort: Option<&str>) -> StoreResult<Vec<(SortField, bool)>> {
    let Some(sort) = sort.filter(|s| !s.trim().is_empty()) else {
        return Ok(Vec::new());
    };

    sort.split(',')
        .map(|term| {
            let (field, direction) = term.trim().split_once(':').unwrap_or((term.trim(), "asc"));
            let field = match field {
                "aggregateType" | "aggregate_type" => SortField::AggregateType,
                "aggregateId" | "aggregate_id" => SortField::AggregateId,
                "version" => SortField::Version,
                other => {
                    return Err(StoreError::InvalidArgument(format!(
                        "unknown sort field '{other}'"
                    )));
                }
            };
            let descending = match direction.to_ascii_lowercase().as_str() {
                "asc" => false,
                "desc" => true,
                other => {
                    return Err(StoreError::InvalidArgument(format!(
                        "unknown sort direction '{other}'"
                    )));
                }
            };
            Ok((field, descending))
        })
        .collect()
}

fn compare(a: &AggregateSnapshot, b: &AggregateSnapshot, sort: &[(SortField, bool)]) -> Ordering {
    sort.iter()
        .map(|(field, descending)| {
            let ordering = match field {
                SortField::AggregateType => a.aggregate_type.cmp(&b.aggregate_type),
                SortField::AggregateId => a.aggregate_id.cmp(&b.aggregate_id),
                SortField::Version => a.version.cmp(&b.version),
            };
            if *descending { ordering.reverse() } else { ordering }
        })
        .find(|o| o.is_ne())
        .unwrap_or(Ordering::Equal)
}

/// Slices `items` by an offset cursor. The returned cursor is the next offset,
/// or `None` on the last page.
fn paginate<'a, T>(items: &'a [T], window: &Window) -> StoreResult<(&'a [T], Option<String>)> {
    let start = match window.cursor.as_deref().filter(|c| !c.is_empty()) {
        Some(cursor) => cursor
            .parse::<usize>()
            .map_err(|_| StoreError::InvalidArgument(format!("invalid cursor '{cursor}'")))?,
        None => 0,
    };
    let start = start.min(items.len());
    let end = match window.take {
        Some(take) => start.saturating_add(usize::try_from(take).unwrap_or(usize::MAX)),
        None => items.len(),
    }
    .min(items.len());

    let next = (end < items.len()).then(|| end.to_string());
    Ok((&items[start..end], next))
}
