//! Connection state machine for one control socket.
//!
//! ```text
//! Disconnected -> HelloSent -> HelloAcked -> (Handshaking ->) Ready
//!       ^                                                       |
//!       +------------------------ disconnect / error -----------+
//! ```
//!
//! A session owns at most one TCP connection and is strictly half-duplex:
//! every request blocks until its single response frame arrives. Any failure
//! while connecting or exchanging a request tears the connection down, so the
//! next call starts again from `Disconnected`.
use std::{
    io,
    net::{Shutdown, TcpStream, ToSocketAddrs},
};

use log::{debug, info, warn};

use super::{
    FrameTransport, SecureChannel, SnowSession, decode_message, encode_message,
    hello::{ClientHello, ServerHello, encryption_negotiated},
    noise::derive_psk,
    request::{Request, RequestPayload},
    response::{Response, ResponsePayload},
};
use crate::{
    config::ClientConfig,
    error::{ClientError, ClientResult},
    model::Endpoint,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Disconnected,
    HelloSent,
    HelloAcked,
    Handshaking,
    Ready,
}

pub struct ControlSession {
    config: ClientConfig,
    state: SessionState,
    channel: Option<SecureChannel<TcpStream>>,
    next_request_id: u64,
}

impl ControlSession {
    pub fn new(config: ClientConfig) -> Self {
        Self {
            config,
            state: SessionState::Disconnected,
            channel: None,
            next_request_id: 1,
        }
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn is_connected(&self) -> bool {
        self.state == SessionState::Ready
    }

    pub fn is_encrypted(&self) -> bool {
        self.channel.as_ref().is_some_and(SecureChannel::is_encrypted)
    }

    pub fn endpoint(&self) -> Endpoint {
        self.config.endpoint()
    }

    /// Opens the connection and completes the hello and, when negotiated, the
    /// Noise handshake. Does nothing when already connected.
    pub fn connect(&mut self) -> ClientResult<()> {
        if self.is_connected() {
            return Ok(());
        }
        if self.config.token().is_empty() {
            return Err(ClientError::Configuration(
                "control token is required; set EVENTDBX_TOKEN or pass a token".into(),
            ));
        }

        self.disconnect();
        if let Err(e) = self.establish() {
            debug!("connect to {} failed: {e}", self.endpoint());
            self.disconnect();
            return Err(e);
        }
        Ok(())
    }

    fn establish(&mut self) -> ClientResult<()> {
        let stream = self.open_stream()?;
        let mut channel = SecureChannel::new(FrameTransport::new(stream));

        let hello = ClientHello::new(
            self.config.token(),
            self.config.tenant_id(),
            self.config.no_noise(),
        );
        channel.frames().write_frame(&encode_message(&hello)?)?;
        self.state = SessionState::HelloSent;

        let reply = channel
            .frames()
            .read_frame()?
            .ok_or(ClientError::ConnectionClosed)?;
        let reply: ServerHello = decode_message(&reply)?;
        if !reply.accepted {
            return Err(ClientError::HandshakeRejected(reply.message));
        }
        self.state = SessionState::HelloAcked;

        if encryption_negotiated(self.config.no_noise(), reply.no_noise) {
            self.state = SessionState::Handshaking;
            let psk = derive_psk(self.config.token());
            let session = SnowSession::initiator(self.config.noise_pattern(), &psk)
                .map_err(ClientError::handshake)?;
            channel.initiate(Box::new(session))?;
            debug!("noise channel established ({})", self.config.noise_pattern());
        } else if !self.config.no_noise() {
            warn!(
                "server at {} disabled noise; continuing without encryption",
                self.endpoint()
            );
        }

        self.channel = Some(channel);
        self.state = SessionState::Ready;
        info!(
            "connected to {} (tenant '{}', encrypted: {})",
            self.endpoint(),
            self.config.tenant_id(),
            self.is_encrypted()
        );
        Ok(())
    }

    fn open_stream(&self) -> ClientResult<TcpStream> {
        let addrs = (self.config.host(), self.config.port()).to_socket_addrs()?;

        let mut last_err = None;
        for addr in addrs {
            match TcpStream::connect_timeout(&addr, self.config.connect_timeout()) {
                Ok(stream) => {
                    stream.set_read_timeout(Some(self.config.request_timeout()))?;
                    stream.set_write_timeout(Some(self.config.request_timeout()))?;
                    stream.set_nodelay(true)?;
                    return Ok(stream);
                }
                Err(e) => {
                    debug!("connect to {addr} failed: {e}");
                    last_err = Some(e);
                }
            }
        }

        Err(last_err
            .unwrap_or_else(|| {
                io::Error::new(
                    io::ErrorKind::NotFound,
                    format!("no addresses resolved for {}", self.endpoint()),
                )
            })
            .into())
    }

    /// Drops the connection. Safe to call in any state, any number of times.
    pub fn disconnect(&mut self) {
        if let Some(channel) = self.channel.take() {
            let _ = channel.get_ref().shutdown(Shutdown::Both);
            info!("disconnected from {}", self.endpoint());
        }
        self.state = SessionState::Disconnected;
        self.next_request_id = 1;
    }

    /// Sends one request and waits for its response, connecting first if needed.
    pub fn send_request(&mut self, payload: RequestPayload) -> ClientResult<ResponsePayload> {
        self.connect()?;

        let result = self.round_trip(payload);
        if let Err(e) = &result {
            debug!("request failed, dropping connection: {e}");
            self.disconnect();
        }
        result
    }

    fn round_trip(&mut self, payload: RequestPayload) -> ClientResult<ResponsePayload> {
        let id = self.next_request_id;
        self.next_request_id += 1;
        debug!("request {id}: {}", payload.verb());

        let channel = self.channel.as_mut().ok_or(ClientError::ConnectionClosed)?;
        channel.send(&encode_message(&Request { id, payload })?)?;

        let frame = channel.recv()?.ok_or(ClientError::ConnectionClosed)?;
        let response: Response = decode_message(&frame)?;
        if response.id != id {
            return Err(ClientError::Protocol(format!(
                "response id {} does not match request id {id}",
                response.id
            )));
        }
        Ok(response.payload)
    }
}
