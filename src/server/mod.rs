//! Reference control server.
//!
//! Speaks the same wire protocol as the client, backed by an in-memory
//! [`AggregateStore`]. Used by the integration tests and the `eventdbx_server`
//! binary to exercise the client end to end.
mod pool;
mod store;

use std::{
    io,
    net::{SocketAddr, TcpListener, TcpStream, ToSocketAddrs},
    sync::{Arc, Mutex, MutexGuard},
};

use log::{debug, info, warn};
use serde::Serialize;
use serde_json::Value;

pub use pool::WorkerPool;
pub use store::{AggregateStore, EventInput, ListQuery, StoreError, StoreResult, Window};

use crate::{
    error::ClientError,
    model::JsonPatchOperation,
    protocol::{
        ClientHello, DEFAULT_NOISE_PATTERN, FrameTransport, PROTOCOL_VERSION, Request,
        RequestPayload, Response, ResponsePayload, SecureChannel, ServerHello, SnowSession,
        decode_message, derive_psk, encode_message, encryption_negotiated,
    },
};

#[derive(Debug, Clone)]
pub struct ServerOptions {
    /// Token clients must present. Empty accepts any token.
    pub token: String,
    pub no_noise: bool,
    pub noise_pattern: String,
    /// Upper bound on concurrently served clients. Each connection keeps its
    /// worker until it closes; further clients wait in the accept queue.
    pub workers: usize,
}

impl Default for ServerOptions {
    fn default() -> Self {
        Self {
            token: String::new(),
            no_noise: false,
            noise_pattern: DEFAULT_NOISE_PATTERN.to_string(),
            workers: 4,
        }
    }
}

pub struct ControlServer {
    listener: TcpListener,
    options: Arc<ServerOptions>,
    store: Arc<Mutex<AggregateStore>>,
    pool: WorkerPool,
}

impl ControlServer {
    pub fn bind(address: impl ToSocketAddrs, options: ServerOptions) -> io::Result<Self> {
        let listener = TcpListener::bind(address)?;
        let pool = WorkerPool::new(options.workers)?;
        Ok(Self {
            listener,
            options: Arc::new(options),
            store: Arc::new(Mutex::new(AggregateStore::new())),
            pool,
        })
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    pub fn store(&self) -> Arc<Mutex<AggregateStore>> {
        Arc::clone(&self.store)
    }

    /// Accepts connections until the listener fails.
    pub fn serve(self) -> io::Result<()> {
        info!(
            "listening at {} (noise: {})",
            self.local_addr()?,
            !self.options.no_noise
        );

        for stream in self.listener.incoming() {
            match stream {
                Ok(stream) => {
                    if self.pool.is_saturated() {
                        warn!(
                            "all {} workers busy; new connection waits for one to free",
                            self.pool.size()
                        );
                    }
                    let options = Arc::clone(&self.options);
                    let store = Arc::clone(&self.store);
                    let queued = self.pool.execute(move || {
                        let peer = stream
                            .peer_addr()
                            .map(|a| a.to_string())
                            .unwrap_or_else(|_| "unknown peer".into());
                        if let Err(e) = handle_connection(stream, &options, &store) {
                            warn!("connection from {peer} failed: {e}");
                        }
                    });
                    if !queued {
                        warn!("no workers left; dropping connection");
                    }
                }
                Err(e) => warn!("broken connection: {e:?}"),
            }
        }
        Ok(())
    }
}

fn handle_connection(
    stream: TcpStream,
    options: &ServerOptions,
    store: &Mutex<AggregateStore>,
) -> Result<(), ClientError> {
    let mut channel = SecureChannel::new(FrameTransport::new(stream));

    let Some(hello) = channel.frames().read_frame()? else {
        return Ok(());
    };
    let hello: ClientHello = decode_message(&hello)?;
    if let Some(reason) = reject_reason(&hello, options) {
        info!("rejecting client hello: {reason}");
        channel
            .frames()
            .write_frame(&encode_message(&ServerHello::reject(reason))?)?;
        return Ok(());
    }
    channel
        .frames()
        .write_frame(&encode_message(&ServerHello::accept(options.no_noise))?)?;

    if encryption_negotiated(hello.no_noise, options.no_noise) {
        let psk = derive_psk(&hello.token);
        let session = SnowSession::responder(&options.noise_pattern, &psk)
            .map_err(ClientError::handshake)?;
        channel.accept(Box::new(session))?;
    }
    debug!(
        "client for tenant '{}' ready (encrypted: {})",
        hello.tenant_id,
        channel.is_encrypted()
    );

    while let Some(frame) = channel.recv()? {
        let request: Request = decode_message(&frame)?;
        debug!("request {}: {}", request.id, request.payload.verb());

        let payload = dispatch(store, &options.token, request.payload);
        channel.send(&encode_message(&Response {
            id: request.id,
            payload,
        })?)?;
    }
    Ok(())
}

fn reject_reason(hello: &ClientHello, options: &ServerOptions) -> Option<String> {
    if hello.protocol_version != PROTOCOL_VERSION {
        return Some(format!(
            "unsupported protocol version {}",
            hello.protocol_version
        ));
    }
    if !token_matches(&options.token, &hello.token) {
        return Some("invalid token".into());
    }
    None
}

fn token_matches(expected: &str, presented: &str) -> bool {
    expected.is_empty() || expected == presented
}

fn lock(store: &Mutex<AggregateStore>) -> MutexGuard<'_, AggregateStore> {
    store.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn to_json<T: Serialize>(value: &T) -> StoreResult<String> {
    serde_json::to_string(value).map_err(|e| StoreError::InvalidArgument(e.to_string()))
}

fn parse_json(field: &str, text: Option<String>) -> StoreResult<Option<Value>> {
    text.map(|text| {
        serde_json::from_str(&text)
            .map_err(|e| StoreError::InvalidArgument(format!("{field} is not valid JSON: {e}")))
    })
    .transpose()
}

/// Executes one request against the store.
fn dispatch(store: &Mutex<AggregateStore>, token: &str, payload: RequestPayload) -> ResponsePayload {
    if !token_matches(token, payload.token()) {
        return ResponsePayload::error("UNAUTHORIZED", "invalid token");
    }
    execute(&mut lock(store), payload)
        .unwrap_or_else(|e| ResponsePayload::error(e.code(), e.to_string()))
}

fn execute(store: &mut AggregateStore, payload: RequestPayload) -> StoreResult<ResponsePayload> {
    let response = match payload {
        RequestPayload::ListAggregates(r) => {
            let query = ListQuery {
                window: Window {
                    cursor: r.cursor,
                    take: r.take,
                    filter: r.filter,
                },
                include_archived: r.include_archived,
                archived_only: r.archived_only,
                sort: r.sort,
            };
            let (aggregates, next_cursor) = store.list(&query)?;
            ResponsePayload::ListAggregates {
                aggregates_json: to_json(&aggregates)?,
                next_cursor,
            }
        }
        RequestPayload::GetAggregate(r) => match store.get(&r.aggregate_type, &r.aggregate_id) {
            Some(snapshot) => ResponsePayload::GetAggregate {
                found: true,
                aggregate_json: to_json(snapshot)?,
            },
            None => ResponsePayload::GetAggregate {
                found: false,
                aggregate_json: String::new(),
            },
        },
        RequestPayload::SelectAggregate(r) => {
            match store.select(&r.aggregate_type, &r.aggregate_id, &r.fields) {
                Some(selection) => ResponsePayload::SelectAggregate {
                    found: true,
                    selection_json: to_json(&selection)?,
                },
                None => ResponsePayload::SelectAggregate {
                    found: false,
                    selection_json: String::new(),
                },
            }
        }
        RequestPayload::CreateAggregate(r) => {
            let input = EventInput {
                event_type: r.event_type,
                payload: parse_json("payload", r.payload_json)?,
                metadata: parse_json("metadata", r.metadata_json)?,
                note: r.note,
            };
            let snapshot = store.create(&r.aggregate_type, &r.aggregate_id, input)?;
            ResponsePayload::CreateAggregate {
                aggregate_json: to_json(&snapshot)?,
            }
        }
        RequestPayload::AppendEvent(r) => {
            let input = EventInput {
                event_type: r.event_type,
                payload: parse_json("payload", r.payload_json)?,
                metadata: parse_json("metadata", r.metadata_json)?,
                note: r.note,
            };
            let event = store.append(&r.aggregate_type, &r.aggregate_id, input)?;
            ResponsePayload::AppendEvent {
                event_json: to_json(&event)?,
            }
        }
        RequestPayload::PatchEvent(r) => {
            let operations: Vec<JsonPatchOperation> = serde_json::from_str(&r.patch_json)
                .map_err(|e| StoreError::InvalidPatch(e.to_string()))?;
            let input = EventInput {
                event_type: r.event_type,
                payload: None,
                metadata: parse_json("metadata", r.metadata_json)?,
                note: r.note,
            };
            let snapshot = store.patch(&r.aggregate_type, &r.aggregate_id, &operations, input)?;
            ResponsePayload::PatchEvent {
                aggregate_json: to_json(&snapshot)?,
            }
        }
        RequestPayload::SetAggregateArchive(r) => {
            let snapshot =
                store.set_archived(&r.aggregate_type, &r.aggregate_id, r.archived, r.note)?;
            ResponsePayload::SetAggregateArchive {
                aggregate_json: to_json(&snapshot)?,
            }
        }
        RequestPayload::ListEvents(r) => {
            let window = Window {
                cursor: r.cursor,
                take: r.take,
                filter: r.filter,
            };
            let (events, next_cursor) = store.events(&r.aggregate_type, &r.aggregate_id, &window)?;
            ResponsePayload::ListEvents {
                events_json: to_json(&events)?,
                next_cursor,
            }
        }
    };
    Ok(response)
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::protocol::{GetAggregateRequest, SetAggregateArchiveRequest, WriteEventRequest};

    fn create(token: &str) -> RequestPayload {
        RequestPayload::CreateAggregate(WriteEventRequest {
            token: token.into(),
            aggregate_type: "person".into(),
            aggregate_id: "p-1".into(),
            event_type: "person_registered".into(),
            payload_json: Some(json!({"name": "Jane"}).to_string()),
            ..Default::default()
        })
    }

    #[test]
    fn hello_is_checked_for_version_and_token() {
        let options = ServerOptions {
            token: "secret".into(),
            ..Default::default()
        };

        let mut hello = ClientHello::new("secret", "", false);
        assert_eq!(reject_reason(&hello, &options), None);

        hello.protocol_version = 2;
        assert_eq!(
            reject_reason(&hello, &options).as_deref(),
            Some("unsupported protocol version 2")
        );

        let hello = ClientHello::new("wrong", "", false);
        assert_eq!(
            reject_reason(&hello, &options).as_deref(),
            Some("invalid token")
        );
    }

    #[test]
    fn dispatch_requires_request_token() {
        let store = Mutex::new(AggregateStore::new());
        let response = dispatch(&store, "secret", create("other"));
        assert_eq!(response, ResponsePayload::error("UNAUTHORIZED", "invalid token"));
        assert!(lock(&store).is_empty());
    }

    #[test]
    fn dispatch_maps_store_errors_to_codes() {
        let store = Mutex::new(AggregateStore::new());
        assert_eq!(dispatch(&store, "t", create("t")).kind(), "createAggregate");

        match dispatch(&store, "t", create("t")) {
            ResponsePayload::Error { code, .. } => assert_eq!(code, "CONFLICT"),
            other => panic!("unexpected response: {other:?}"),
        }
    }

    #[test]
    fn missing_aggregate_is_not_found_flag() {
        let store = Mutex::new(AggregateStore::new());
        let response = dispatch(
            &store,
            "",
            RequestPayload::GetAggregate(GetAggregateRequest {
                aggregate_type: "person".into(),
                aggregate_id: "nobody".into(),
                token: "anything".into(),
            }),
        );
        assert_eq!(
            response,
            ResponsePayload::GetAggregate {
                found: false,
                aggregate_json: String::new()
            }
        );
    }

    #[test]
    fn malformed_payload_json_is_invalid_argument() {
        let store = Mutex::new(AggregateStore::new());
        let request = RequestPayload::AppendEvent(WriteEventRequest {
            token: "t".into(),
            aggregate_type: "person".into(),
            aggregate_id: "p-1".into(),
            event_type: "touched".into(),
            payload_json: Some("{oops".into()),
            ..Default::default()
        });
        match dispatch(&store, "t", request) {
            ResponsePayload::Error { code, .. } => assert_eq!(code, "INVALID_ARGUMENT"),
            other => panic!("unexpected response: {other:?}"),
        }
    }

    #[test]
    fn archive_request_records_note() {
        let store = Mutex::new(AggregateStore::new());
        dispatch(&store, "t", create("t"));

        let request = RequestPayload::SetAggregateArchive(SetAggregateArchiveRequest {
            token: "t".into(),
            aggregate_type: "person".into(),
            aggregate_id: "p-1".into(),
            archived: true,
            note: Some("duplicate record".into()),
        });
        assert_eq!(dispatch(&store, "t", request).kind(), "setAggregateArchive");
        assert_eq!(
            lock(&store).archive_note("person", "p-1"),
            Some("duplicate record")
        );
    }
}
