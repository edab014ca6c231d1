use bincode::{Decode, Encode};

/// Request envelope. `id` is unique per connection and strictly increasing.
#[derive(Debug, Clone, Encode, Decode, PartialEq, Eq)]
pub struct Request {
    pub id: u64,
    pub payload: RequestPayload,
}

#[derive(Debug, Clone, Encode, Decode, PartialEq, Eq)]
pub enum RequestPayload {
    ListAggregates(ListAggregatesRequest),
    GetAggregate(GetAggregateRequest),
    SelectAggregate(SelectAggregateRequest),
    CreateAggregate(WriteEventRequest),
    AppendEvent(WriteEventRequest),
    PatchEvent(PatchEventRequest),
    SetAggregateArchive(SetAggregateArchiveRequest),
    ListEvents(ListEventsRequest),
}

impl RequestPayload {
    /// Verb name used in logs and protocol errors.
    pub fn verb(&self) -> &'static str {
        match self {
            RequestPayload::ListAggregates(_) => "listAggregates",
            RequestPayload::GetAggregate(_) => "getAggregate",
            RequestPayload::SelectAggregate(_) => "selectAggregate",
            RequestPayload::CreateAggregate(_) => "createAggregate",
            RequestPayload::AppendEvent(_) => "appendEvent",
            RequestPayload::PatchEvent(_) => "patchEvent",
            RequestPayload::SetAggregateArchive(_) => "setAggregateArchive",
            RequestPayload::ListEvents(_) => "listEvents",
        }
    }

    pub fn token(&self) -> &str {
        match self {
            RequestPayload::ListAggregates(r) => &r.token,
            RequestPayload::GetAggregate(r) => &r.token,
            RequestPayload::SelectAggregate(r) => &r.token,
            RequestPayload::CreateAggregate(r) | RequestPayload::AppendEvent(r) => &r.token,
            RequestPayload::PatchEvent(r) => &r.token,
            RequestPayload::SetAggregateArchive(r) => &r.token,
            RequestPayload::ListEvents(r) => &r.token,
        }
    }
}

#[derive(Debug, Clone, Default, Encode, Decode, PartialEq, Eq)]
pub struct ListAggregatesRequest {
    pub cursor: Option<String>,
    pub take: Option<u64>,
    pub include_archived: bool,
    pub archived_only: bool,
    pub filter: Option<String>,
    pub sort: Option<String>,
    pub token: String,
}

#[derive(Debug, Clone, Default, Encode, Decode, PartialEq, Eq)]
pub struct GetAggregateRequest {
    pub aggregate_type: String,
    pub aggregate_id: String,
    pub token: String,
}

#[derive(Debug, Clone, Default, Encode, Decode, PartialEq, Eq)]
pub struct SelectAggregateRequest {
    pub aggregate_type: String,
    pub aggregate_id: String,
    pub fields: Vec<String>,
    pub token: String,
}

/// Body shared by create-aggregate and append-event.
#[derive(Debug, Clone, Default, Encode, Decode, PartialEq, Eq)]
pub struct WriteEventRequest {
    pub token: String,
    pub aggregate_type: String,
    pub aggregate_id: String,
    pub event_type: String,
    pub payload_json: Option<String>,
    pub metadata_json: Option<String>,
    pub note: Option<String>,
    pub publish_targets: Vec<WirePublishTarget>,
}

#[derive(Debug, Clone, Default, Encode, Decode, PartialEq, Eq)]
pub struct PatchEventRequest {
    pub token: String,
    pub aggregate_type: String,
    pub aggregate_id: String,
    pub event_type: String,
    /// JSON array of RFC 6902 operations.
    pub patch_json: String,
    pub metadata_json: Option<String>,
    pub note: Option<String>,
    pub publish_targets: Vec<WirePublishTarget>,
}

#[derive(Debug, Clone, Default, Encode, Decode, PartialEq, Eq)]
pub struct SetAggregateArchiveRequest {
    pub token: String,
    pub aggregate_type: String,
    pub aggregate_id: String,
    pub archived: bool,
    pub note: Option<String>,
}

#[derive(Debug, Clone, Default, Encode, Decode, PartialEq, Eq)]
pub struct ListEventsRequest {
    pub aggregate_type: String,
    pub aggregate_id: String,
    pub cursor: Option<String>,
    pub take: Option<u64>,
    pub filter: Option<String>,
    pub token: String,
}

#[derive(Debug, Clone, Default, Encode, Decode, PartialEq, Eq)]
pub struct WirePublishTarget {
    pub plugin: String,
    pub mode: Option<String>,
    pub priority: Option<String>,
}
