//! Blocking control-socket client for the EventDBX event-sourced aggregate store.
//!
//! The crate talks to an EventDBX server over a framed TCP connection,
//! optionally wrapped in a Noise channel keyed from the control token. Most
//! callers only need [`ClientConfig`] and [`EventDbxClient`]:
//!
//! ```no_run
//! use eventdbx_client::{ClientConfig, EventDbxClient, options::AppendOptions};
//! use serde_json::json;
//!
//! let config = ClientConfig::builder().token("secret").build()?;
//! let mut client = EventDbxClient::new(config);
//!
//! client.create("person", "p-1", "person_registered", Some(AppendOptions::with_payload(json!({"name": "Jane"}))))?;
//! let events = client.events("person", "p-1", None)?;
//! # Ok::<(), eventdbx_client::ClientError>(())
//! ```
pub mod cli;
pub mod client;
pub mod command;
pub mod config;
pub mod error;
pub mod model;
pub mod options;
pub mod protocol;
pub mod server;

pub use cli::prompt;
pub use client::{ControlClient, EventDbxClient};
pub use command::{Command, CommandError};
pub use config::{ClientConfig, ClientConfigBuilder, RetryPolicy};
pub use error::{ClientError, ClientResult};
pub use model::{
    ActorClaims, AggregateSnapshot, Endpoint, EventMetadata, EventRecord, JsonPatchOperation, Page,
    PublishTarget,
};
pub use protocol::ControlSession;
