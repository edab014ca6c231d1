//! Control-socket wire protocol.
//!
//! The protocol is layered bottom to top:
//!
//! - [`FrameTransport`]: 4-byte big-endian length prefix plus payload, up to
//!   [`MAX_FRAME_LEN`] bytes.
//! - [`SecureChannel`]: optional Noise encryption of every frame payload once a
//!   handshake has completed.
//! - [`ClientHello`] / [`ServerHello`]: the unencrypted exchange that opens a
//!   connection, authenticates the token and negotiates encryption.
//! - [`Request`] / [`Response`]: id-correlated envelopes around one verb each.
//! - [`ControlSession`]: the connection state machine tying the layers together.
//!
//! # Binary Format
//!
//! Messages are encoded with `bincode` using big-endian fixed-width integers.
//! Enum tags are `u32`, optional fields carry a one byte presence marker and
//! aggregates and events travel as embedded JSON text.
mod channel;
mod frame;
mod hello;
mod noise;
mod request;
mod response;
mod session;
pub mod verbs;

pub use channel::SecureChannel;
pub use frame::{FrameError, FrameTransport, MAX_FRAME_LEN, decode_message, encode_message};
pub use hello::{ClientHello, PROTOCOL_VERSION, ServerHello, encryption_negotiated};
pub use noise::{DEFAULT_NOISE_PATTERN, NoiseError, SecureSession, SnowSession, derive_psk};
pub use request::{
    GetAggregateRequest, ListAggregatesRequest, ListEventsRequest, PatchEventRequest, Request,
    RequestPayload, SelectAggregateRequest, SetAggregateArchiveRequest, WirePublishTarget,
    WriteEventRequest,
};
pub use response::{Response, ResponsePayload};
pub use session::{ControlSession, SessionState};
