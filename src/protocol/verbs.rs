//! Mapping between facade calls and control messages.
//!
//! Each verb has a `*_request` builder producing a [`RequestPayload`] and a
//! `parse_*` function turning the matching [`ResponsePayload`] into model
//! values. Parsers share the same rules: an `Error` payload becomes
//! [`ClientError::Server`], any other unexpected variant is a protocol error
//! naming the verb, and embedded JSON that does not decode is a protocol error.
use serde::de::DeserializeOwned;
use serde_json::Value;

use super::{
    request::{
        GetAggregateRequest, ListAggregatesRequest, ListEventsRequest, PatchEventRequest,
        RequestPayload, SelectAggregateRequest, SetAggregateArchiveRequest, WirePublishTarget,
        WriteEventRequest,
    },
    response::ResponsePayload,
};
use crate::{
    error::{ClientError, ClientResult},
    model::{AggregateSnapshot, EventRecord, JsonPatchOperation, Page, PublishTarget},
    options::{AppendOptions, ArchiveOptions, PageOptions, PatchOptions},
};

fn token_or(token: &Option<String>, default_token: &str) -> String {
    token.as_deref().unwrap_or(default_token).to_string()
}

fn note(note: &Option<String>) -> Option<String> {
    note.as_ref().filter(|n| !n.trim().is_empty()).cloned()
}

fn cursor(cursor: Option<String>) -> Option<String> {
    cursor.filter(|c| !c.is_empty())
}

fn json_text(value: &Option<Value>) -> Option<String> {
    value.as_ref().map(Value::to_string)
}

fn wire_targets(targets: &[PublishTarget]) -> Vec<WirePublishTarget> {
    targets
        .iter()
        .map(|t| WirePublishTarget {
            plugin: t.plugin.clone(),
            mode: t.mode.clone(),
            priority: t.priority.clone(),
        })
        .collect()
}

fn decode_json<T: DeserializeOwned>(verb: &str, text: &str) -> ClientResult<T> {
    serde_json::from_str(text)
        .map_err(|e| ClientError::Protocol(format!("invalid {verb} payload: {e}")))
}

/// Decodes a JSON listing. Anything other than an array, including blank
/// text, is an empty listing.
fn decode_items<T: DeserializeOwned>(verb: &str, text: &str) -> ClientResult<Vec<T>> {
    if text.trim().is_empty() {
        return Ok(Vec::new());
    }
    match decode_json(verb, text)? {
        items @ Value::Array(_) => serde_json::from_value(items)
            .map_err(|e| ClientError::Protocol(format!("invalid {verb} payload: {e}"))),
        _ => Ok(Vec::new()),
    }
}

fn unexpected(verb: &str, payload: ResponsePayload) -> ClientError {
    match payload {
        ResponsePayload::Error { code, message } => ClientError::Server { code, message },
        other => ClientError::Protocol(format!(
            "unexpected response to {verb}: {}",
            other.kind()
        )),
    }
}

pub fn list_request(options: &PageOptions, default_token: &str) -> RequestPayload {
    RequestPayload::ListAggregates(ListAggregatesRequest {
        cursor: options.cursor.clone(),
        take: options.take,
        include_archived: options.include_archived || options.archived_only,
        archived_only: options.archived_only,
        filter: options.filter.clone(),
        sort: options.sort.clone(),
        token: token_or(&options.token, default_token),
    })
}

pub fn parse_list(payload: ResponsePayload) -> ClientResult<Page<AggregateSnapshot>> {
    match payload {
        ResponsePayload::ListAggregates {
            aggregates_json,
            next_cursor,
        } => Ok(Page::new(
            decode_items("listAggregates", &aggregates_json)?,
            cursor(next_cursor),
        )),
        other => Err(unexpected("listAggregates", other)),
    }
}

pub fn get_request(aggregate_type: &str, aggregate_id: &str, default_token: &str) -> RequestPayload {
    RequestPayload::GetAggregate(GetAggregateRequest {
        aggregate_type: aggregate_type.to_string(),
        aggregate_id: aggregate_id.to_string(),
        token: default_token.to_string(),
    })
}

pub fn parse_get(payload: ResponsePayload) -> ClientResult<Option<AggregateSnapshot>> {
    match payload {
        ResponsePayload::GetAggregate { found: false, .. } => Ok(None),
        ResponsePayload::GetAggregate { aggregate_json, .. } => {
            decode_json("getAggregate", &aggregate_json).map(Some)
        }
        other => Err(unexpected("getAggregate", other)),
    }
}

pub fn select_request(
    aggregate_type: &str,
    aggregate_id: &str,
    fields: &[String],
    default_token: &str,
) -> RequestPayload {
    RequestPayload::SelectAggregate(SelectAggregateRequest {
        aggregate_type: aggregate_type.to_string(),
        aggregate_id: aggregate_id.to_string(),
        fields: fields.to_vec(),
        token: default_token.to_string(),
    })
}

pub fn parse_select(payload: ResponsePayload) -> ClientResult<Option<Value>> {
    match payload {
        ResponsePayload::SelectAggregate { found: false, .. } => Ok(None),
        ResponsePayload::SelectAggregate { selection_json, .. } => {
            decode_json("selectAggregate", &selection_json).map(Some)
        }
        other => Err(unexpected("selectAggregate", other)),
    }
}

pub fn events_request(
    aggregate_type: &str,
    aggregate_id: &str,
    options: &PageOptions,
    default_token: &str,
) -> RequestPayload {
    RequestPayload::ListEvents(ListEventsRequest {
        aggregate_type: aggregate_type.to_string(),
        aggregate_id: aggregate_id.to_string(),
        cursor: options.cursor.clone(),
        take: options.take,
        filter: options.filter.clone(),
        token: token_or(&options.token, default_token),
    })
}

pub fn parse_events(payload: ResponsePayload) -> ClientResult<Page<EventRecord>> {
    match payload {
        ResponsePayload::ListEvents {
            events_json,
            next_cursor,
        } => Ok(Page::new(
            decode_items("listEvents", &events_json)?,
            cursor(next_cursor),
        )),
        other => Err(unexpected("listEvents", other)),
    }
}

fn write_event(
    aggregate_type: &str,
    aggregate_id: &str,
    event_type: &str,
    options: &AppendOptions,
    default_token: &str,
) -> WriteEventRequest {
    WriteEventRequest {
        token: token_or(&options.token, default_token),
        aggregate_type: aggregate_type.to_string(),
        aggregate_id: aggregate_id.to_string(),
        event_type: event_type.to_string(),
        payload_json: json_text(&options.payload),
        metadata_json: json_text(&options.metadata),
        note: note(&options.note),
        publish_targets: wire_targets(&options.publish_targets),
    }
}

pub fn append_request(
    aggregate_type: &str,
    aggregate_id: &str,
    event_type: &str,
    options: &AppendOptions,
    default_token: &str,
) -> RequestPayload {
    RequestPayload::AppendEvent(write_event(
        aggregate_type,
        aggregate_id,
        event_type,
        options,
        default_token,
    ))
}

pub fn parse_append(payload: ResponsePayload) -> ClientResult<EventRecord> {
    match payload {
        ResponsePayload::AppendEvent { event_json } => decode_json("appendEvent", &event_json),
        other => Err(unexpected("appendEvent", other)),
    }
}

pub fn create_request(
    aggregate_type: &str,
    aggregate_id: &str,
    event_type: &str,
    options: &AppendOptions,
    default_token: &str,
) -> RequestPayload {
    RequestPayload::CreateAggregate(write_event(
        aggregate_type,
        aggregate_id,
        event_type,
        options,
        default_token,
    ))
}

pub fn parse_create(payload: ResponsePayload) -> ClientResult<AggregateSnapshot> {
    match payload {
        ResponsePayload::CreateAggregate { aggregate_json } => {
            decode_json("createAggregate", &aggregate_json)
        }
        other => Err(unexpected("createAggregate", other)),
    }
}

pub fn patch_request(
    aggregate_type: &str,
    aggregate_id: &str,
    event_type: &str,
    operations: &[JsonPatchOperation],
    options: &PatchOptions,
    default_token: &str,
) -> ClientResult<RequestPayload> {
    let patch_json = serde_json::to_string(operations)
        .map_err(|e| ClientError::Protocol(format!("failed to encode patch: {e}")))?;

    Ok(RequestPayload::PatchEvent(PatchEventRequest {
        token: token_or(&options.token, default_token),
        aggregate_type: aggregate_type.to_string(),
        aggregate_id: aggregate_id.to_string(),
        event_type: event_type.to_string(),
        patch_json,
        metadata_json: json_text(&options.metadata),
        note: note(&options.note),
        publish_targets: wire_targets(&options.publish_targets),
    }))
}

pub fn parse_patch(payload: ResponsePayload) -> ClientResult<AggregateSnapshot> {
    match payload {
        ResponsePayload::PatchEvent { aggregate_json } => {
            decode_json("patchEvent", &aggregate_json)
        }
        other => Err(unexpected("patchEvent", other)),
    }
}

pub fn archive_request(
    aggregate_type: &str,
    aggregate_id: &str,
    archived: bool,
    options: &ArchiveOptions,
    default_token: &str,
) -> RequestPayload {
    RequestPayload::SetAggregateArchive(SetAggregateArchiveRequest {
        token: token_or(&options.token, default_token),
        aggregate_type: aggregate_type.to_string(),
        aggregate_id: aggregate_id.to_string(),
        archived,
        note: note(&options.note),
    })
}

pub fn parse_archive(payload: ResponsePayload) -> ClientResult<AggregateSnapshot> {
    match payload {
        ResponsePayload::SetAggregateArchive { aggregate_json } => {
            decode_json("setAggregateArchive", &aggregate_json)
        }
        other => Err(unexpected("setAggregateArchive", other)),
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn list_request_applies_defaults_and_archive_flags() {
        let options = PageOptions {
            take: Some(25),
            archived_only: true,
            sort: Some("version:desc".into()),
            ..Default::default()
        };
        let RequestPayload::ListAggregates(body) = list_request(&options, "config-token") else {
            panic!("wrong request variant");
        };

        assert_eq!(body.take, Some(25));
        assert!(body.include_archived);
        assert!(body.archived_only);
        assert_eq!(body.cursor, None);
        assert_eq!(body.token, "config-token");
    }

    #[test]
    fn option_token_overrides_default() {
        let options = ArchiveOptions {
            note: Some("   ".into()),
            token: Some("override".into()),
        };
        let RequestPayload::SetAggregateArchive(body) =
            archive_request("person", "p-1", true, &options, "default")
        else {
            panic!("wrong request variant");
        };

        assert_eq!(body.token, "override");
        assert!(body.archived);
        assert_eq!(body.note, None);
    }

    #[test]
    fn append_serialises_payload_and_targets() {
        let options = AppendOptions {
            payload: Some(json!({"name": "Jane"})),
            note: Some("imported".into()),
            publish_targets: vec!["search:async".parse().unwrap()],
            ..Default::default()
        };
        let RequestPayload::AppendEvent(body) =
            append_request("person", "p-1", "person_renamed", &options, "t")
        else {
            panic!("wrong request variant");
        };

        assert_eq!(body.payload_json.as_deref(), Some(r#"{"name":"Jane"}"#));
        assert_eq!(body.metadata_json, None);
        assert_eq!(body.note.as_deref(), Some("imported"));
        assert_eq!(body.publish_targets.len(), 1);
        assert_eq!(body.publish_targets[0].mode.as_deref(), Some("async"));
    }

    #[test]
    fn patch_operations_are_a_json_array() {
        let ops = [JsonPatchOperation::replace("/name", json!("Janet"))];
        let RequestPayload::PatchEvent(body) =
            patch_request("person", "p-1", "person_patched", &ops, &PatchOptions::default(), "t")
                .unwrap()
        else {
            panic!("wrong request variant");
        };

        let decoded: Value = serde_json::from_str(&body.patch_json).unwrap();
        assert_eq!(decoded, json!([{"op": "replace", "path": "/name", "value": "Janet"}]));
    }

    #[test]
    fn empty_next_cursor_is_absent() {
        let page = parse_events(ResponsePayload::ListEvents {
            events_json: "[]".into(),
            next_cursor: Some(String::new()),
        })
        .unwrap();
        assert!(page.items.is_empty());
        assert!(page.is_last());

        let page = parse_list(ResponsePayload::ListAggregates {
            aggregates_json: "[]".into(),
            next_cursor: Some("2".into()),
        })
        .unwrap();
        assert_eq!(page.next_cursor.as_deref(), Some("2"));
    }

    #[test]
    fn not_found_is_none() {
        let snapshot = parse_get(ResponsePayload::GetAggregate {
            found: false,
            aggregate_json: String::new(),
        })
        .unwrap();
        assert!(snapshot.is_none());

        let selection = parse_select(ResponsePayload::SelectAggregate {
            found: false,
            selection_json: String::new(),
        })
        .unwrap();
        assert!(selection.is_none());
    }

    #[test]
    fn error_payload_is_a_server_error() {
        let err = parse_get(ResponsePayload::error("NOT_FOUND", "missing")).unwrap_err();
        match err {
            ClientError::Server { code, message } => {
                assert_eq!(code, "NOT_FOUND");
                assert_eq!(message, "missing");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn mismatched_variant_names_the_verb() {
        let err = parse_append(ResponsePayload::CreateAggregate {
            aggregate_json: "{}".into(),
        })
        .unwrap_err();
        match err {
            ClientError::Protocol(message) => assert!(message.contains("appendEvent")),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn malformed_json_is_a_protocol_error() {
        let err = parse_create(ResponsePayload::CreateAggregate {
            aggregate_json: "{not json".into(),
        })
        .unwrap_err();
        assert!(matches!(err, ClientError::Protocol(_)));
    }

    #[test]
    fn non_array_listing_is_empty() {
        let page = parse_list(ResponsePayload::ListAggregates {
            aggregates_json: r#"{"aggregateType": "person"}"#.into(),
            next_cursor: None,
        })
        .unwrap();
        assert!(page.items.is_empty());

        let page = parse_events(ResponsePayload::ListEvents {
            events_json: "null".into(),
            next_cursor: Some("5".into()),
        })
        .unwrap();
        assert!(page.items.is_empty());
        assert_eq!(page.next_cursor.as_deref(), Some("5"));

        let page = parse_events(ResponsePayload::ListEvents {
            events_json: String::new(),
            next_cursor: None,
        })
        .unwrap();
        assert!(page.items.is_empty());
    }

    #[test]
    fn malformed_listing_is_still_a_protocol_error() {
        let err = parse_list(ResponsePayload::ListAggregates {
            aggregates_json: "[{".into(),
            next_cursor: None,
        })
        .unwrap_err();
        assert!(matches!(err, ClientError::Protocol(ref m) if m.contains("listAggregates")));
    }
}
