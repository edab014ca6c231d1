use bincode::{Decode, Encode};

/// Response envelope; `id` echoes the request it answers.
#[derive(Debug, Clone, Encode, Decode, PartialEq, Eq)]
pub struct Response {
    pub id: u64,
    pub payload: ResponsePayload,
}

#[derive(Debug, Clone, Encode, Decode, PartialEq, Eq)]
pub enum ResponsePayload {
    ListAggregates {
        aggregates_json: String,
        next_cursor: Option<String>,
    },
    GetAggregate {
        found: bool,
        aggregate_json: String,
    },
    SelectAggregate {
        found: bool,
        selection_json: String,
    },
    CreateAggregate {
        aggregate_json: String,
    },
    AppendEvent {
        event_json: String,
    },
    PatchEvent {
        aggregate_json: String,
    },
    SetAggregateArchive {
        aggregate_json: String,
    },
    ListEvents {
        events_json: String,
        next_cursor: Option<String>,
    },
    Error {
        code: String,
        message: String,
    },
}

impl ResponsePayload {
    pub fn error(code: impl Into<String>, message: impl Into<String>) -> Self {
        ResponsePayload::Error {
            code: code.into(),
            message: message.into(),
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            ResponsePayload::ListAggregates { .. } => "listAggregates",
            ResponsePayload::GetAggregate { .. } => "getAggregate",
            ResponsePayload::SelectAggregate { .. } => "selectAggregate",
            ResponsePayload::CreateAggregate { .. } => "createAggregate",
            ResponsePayload::AppendEvent { .. } => "appendEvent",
            ResponsePayload::PatchEvent { .. } => "patchEvent",
            ResponsePayload::SetAggregateArchive { .. } => "setAggregateArchive",
            ResponsePayload::ListEvents { .. } => "listEvents",
            ResponsePayload::Error { .. } => "error",
        }
    }
}
