//! Per-call options for the client facade. Every field is optional; a `None`
//! token falls back to the token the client was configured with.
use serde_json::Value;

use crate::model::PublishTarget;

/// Pagination and filtering for aggregate and event listings.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PageOptions {
    pub cursor: Option<String>,
    pub take: Option<u64>,
    pub include_archived: bool,
    pub archived_only: bool,
    pub filter: Option<String>,
    /// Comma separated `field[:asc|:desc]` list.
    pub sort: Option<String>,
    pub token: Option<String>,
}

impl PageOptions {
    pub fn take(take: u64) -> Self {
        Self {
            take: Some(take),
            ..Default::default()
        }
    }

    pub fn with_cursor(mut self, cursor: impl Into<String>) -> Self {
        self.cursor = Some(cursor.into());
        self
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct AppendOptions {
    pub payload: Option<Value>,
    pub metadata: Option<Value>,
    pub note: Option<String>,
    pub token: Option<String>,
    pub publish_targets: Vec<PublishTarget>,
}

impl AppendOptions {
    pub fn with_payload(payload: Value) -> Self {
        Self {
            payload: Some(payload),
            ..Default::default()
        }
    }
}

/// Creating an aggregate takes the same options as appending its first event.
pub type CreateOptions = AppendOptions;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct PatchOptions {
    pub metadata: Option<Value>,
    pub note: Option<String>,
    pub token: Option<String>,
    pub publish_targets: Vec<PublishTarget>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ArchiveOptions {
    pub note: Option<String>,
    pub token: Option<String>,
}
