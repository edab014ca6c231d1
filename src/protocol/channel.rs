//! Optionally encrypted framing.
//!
//! [`SecureChannel`] exposes the same send/receive contract as
//! [`FrameTransport`] whether or not a Noise session is active. Once a
//! handshake completes every frame payload passes through the session's AEAD.
use std::io::{Read, Write};

use log::debug;

use super::{
    FrameTransport,
    noise::{NoiseError, SecureSession},
};
use crate::error::ClientError;

/// Buffer size for a single handshake message.
const HANDSHAKE_BUFFER: usize = 256;
/// Ciphertext headroom over the plaintext length; covers the AEAD tag.
const CIPHERTEXT_OVERHEAD: usize = 64;

pub struct SecureChannel<T: Read + Write> {
    frames: FrameTransport<T>,
    noise: Option<Box<dyn SecureSession>>,
}

impl<T: Read + Write> SecureChannel<T> {
    pub fn new(frames: FrameTransport<T>) -> Self {
        Self {
            frames,
            noise: None,
        }
    }

    pub fn is_encrypted(&self) -> bool {
        self.noise.is_some()
    }

    pub fn get_ref(&self) -> &T {
        self.frames.get_ref()
    }

    /// Unencrypted access for the hello exchange that precedes the handshake.
    pub fn frames(&mut self) -> &mut FrameTransport<T> {
        &mut self.frames
    }

    /// Runs the initiator side: write one handshake message, read one back.
    pub fn initiate(&mut self, mut session: Box<dyn SecureSession>) -> Result<(), ClientError> {
        let mut outbound = [0u8; HANDSHAKE_BUFFER];
        let len = session
            .write_handshake(&mut outbound)
            .map_err(ClientError::handshake)?;
        self.frames.write_frame(&outbound[..len])?;

        let inbound = self.frames.read_frame()?.ok_or_else(|| {
            ClientError::HandshakeFailure("control socket closed during noise handshake".into())
        })?;
        session
            .read_handshake(&inbound)
            .map_err(ClientError::handshake)?;

        self.install(session)
    }

    /// Runs the responder side: read one handshake message, write one back.
    pub fn accept(&mut self, mut session: Box<dyn SecureSession>) -> Result<(), ClientError> {
        let inbound = self.frames.read_frame()?.ok_or_else(|| {
            ClientError::HandshakeFailure("peer closed during noise handshake".into())
        })?;
        session
            .read_handshake(&inbound)
            .map_err(ClientError::handshake)?;

        let mut outbound = [0u8; HANDSHAKE_BUFFER];
        let len = session
            .write_handshake(&mut outbound)
            .map_err(ClientError::handshake)?;
        self.frames.write_frame(&outbound[..len])?;

        self.install(session)
    }

    fn install(&mut self, session: Box<dyn SecureSession>) -> Result<(), ClientError> {
        if !session.is_transport() {
            return Err(ClientError::handshake(NoiseError::WrongMode("transport")));
        }
        debug!("noise handshake complete");
        self.noise = Some(session);
        Ok(())
    }

    pub fn send(&mut self, plaintext: &[u8]) -> Result<(), ClientError> {
        match self.noise.as_mut() {
            Some(session) => {
                let mut ciphertext = vec![0u8; plaintext.len() + CIPHERTEXT_OVERHEAD];
                let len = session
                    .encrypt(plaintext, &mut ciphertext)
                    .map_err(ClientError::encryption)?;
                ciphertext.truncate(len);
                self.frames.write_frame(&ciphertext)?;
            }
            None => self.frames.write_frame(plaintext)?,
        }
        Ok(())
    }

    pub fn recv(&mut self) -> Result<Option<Vec<u8>>, ClientError> {
        let Some(frame) = self.frames.read_frame()? else {
            return Ok(None);
        };

        match self.noise.as_mut() {
            Some(session) => {
                let mut plaintext = vec![0u8; frame.len()];
                let len = session
                    .decrypt(&frame, &mut plaintext)
                    .map_err(ClientError::encryption)?;
                plaintext.truncate(len);
                Ok(Some(plaintext))
            }
            None => Ok(Some(frame)),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::io::{Cursor, Seek, SeekFrom};

    use super::*;
    use crate::protocol::{
        DEFAULT_NOISE_PATTERN, SnowSession,
        noise::{SecureSession, derive_psk},
    };

    /// Session whose handshake output is always empty.
    struct SilentSession;

    impl SecureSession for SilentSession {
        fn write_handshake(&mut self, _out: &mut [u8]) -> Result<usize, NoiseError> {
            Err(NoiseError::Empty("handshake write"))
        }

        fn read_handshake(&mut self, _message: &[u8]) -> Result<(), NoiseError> {
            Ok(())
        }

        fn encrypt(&mut self, _plaintext: &[u8], _out: &mut [u8]) -> Result<usize, NoiseError> {
            Err(NoiseError::WrongMode("transport"))
        }

        fn decrypt(&mut self, _ciphertext: &[u8], _out: &mut [u8]) -> Result<usize, NoiseError> {
            Err(NoiseError::WrongMode("transport"))
        }

        fn is_transport(&self) -> bool {
            false
        }
    }

    fn channel() -> SecureChannel<Cursor<Vec<u8>>> {
        SecureChannel::new(FrameTransport::new(Cursor::new(Vec::new())))
    }

    #[test]
    fn plain_channel_is_pass_through() {
        let mut chan = channel();
        assert!(!chan.is_encrypted());

        chan.send(b"plain").unwrap();
        chan.frames.get_mut().seek(SeekFrom::Start(0)).unwrap();
        assert_eq!(chan.recv().unwrap().as_deref(), Some(&b"plain"[..]));
    }

    #[test]
    fn handshake_failure_sends_nothing() {
        let mut chan = channel();
        let err = chan.initiate(Box::new(SilentSession)).unwrap_err();

        assert!(matches!(err, ClientError::HandshakeFailure(_)));
        assert!(chan.get_ref().get_ref().is_empty());
        assert!(!chan.is_encrypted());
    }

    #[test]
    fn handshake_end_of_stream_is_a_handshake_failure() {
        let mut chan = channel();
        let session = SnowSession::initiator(DEFAULT_NOISE_PATTERN, &derive_psk("t")).unwrap();

        let err = chan.initiate(Box::new(session)).unwrap_err();
        assert!(matches!(err, ClientError::HandshakeFailure(_)));
    }

    #[test]
    fn encrypted_frames_round_trip_through_a_responder() {
        let psk = derive_psk("secret-token");
        let mut client = SnowSession::initiator(DEFAULT_NOISE_PATTERN, &psk).unwrap();
        let mut server = SnowSession::responder(DEFAULT_NOISE_PATTERN, &psk).unwrap();

        // Complete the handshake out of band, then hand the initiator to the channel.
        let mut hello = [0u8; HANDSHAKE_BUFFER];
        let len = client.write_handshake(&mut hello).unwrap();
        server.read_handshake(&hello[..len]).unwrap();
        let mut reply = [0u8; HANDSHAKE_BUFFER];
        let reply_len = server.write_handshake(&mut reply).unwrap();
        client.read_handshake(&reply[..reply_len]).unwrap();

        let mut chan = channel();
        chan.install(Box::new(client)).unwrap();
        chan.send(b"secret").unwrap();

        let written = chan.get_ref().get_ref().clone();
        assert_ne!(&written[4..], b"secret");

        let mut plaintext = vec![0u8; written.len()];
        let n = server.decrypt(&written[4..], &mut plaintext).unwrap();
        assert_eq!(&plaintext[..n], b"secret");
    }
}
