//! Noise session primitive.
//!
//! The control channel only needs four operations from the handshake library:
//! write/read a handshake message and write/read a transport message. The
//! [`SecureSession`] trait captures exactly that call contract; [`SnowSession`]
//! satisfies it with the `snow` crate.
use sha2::{Digest, Sha256};
use snow::{Builder, HandshakeState, TransportState, params::NoiseParams};
use thiserror::Error;

pub const DEFAULT_NOISE_PATTERN: &str = "Noise_NNpsk0_25519_ChaChaPoly_SHA256";

#[derive(Debug, Error)]
pub enum NoiseError {
    #[error("unsupported noise pattern '{0}'")]
    Pattern(String),

    #[error("{0}")]
    Snow(#[from] snow::Error),

    #[error("{0} produced no bytes")]
    Empty(&'static str),

    #[error("session is not in {0} mode")]
    WrongMode(&'static str),
}

pub trait SecureSession {
    /// Writes the next outgoing handshake message into `out`, returning its length.
    fn write_handshake(&mut self, out: &mut [u8]) -> Result<usize, NoiseError>;

    fn read_handshake(&mut self, message: &[u8]) -> Result<(), NoiseError>;

    fn encrypt(&mut self, plaintext: &[u8], out: &mut [u8]) -> Result<usize, NoiseError>;

    fn decrypt(&mut self, ciphertext: &[u8], out: &mut [u8]) -> Result<usize, NoiseError>;

    fn is_transport(&self) -> bool;
}

/// Derives the 32-byte pre-shared key from the control token.
pub fn derive_psk(token: &str) -> [u8; 32] {
    Sha256::digest(token.as_bytes()).into()
}

pub fn requires_psk(pattern: &str) -> bool {
    pattern.to_ascii_lowercase().contains("psk")
}

/// Location of the PSK token within the pattern name, e.g. `0` for `NNpsk0`.
fn psk_location(pattern: &str) -> u8 {
    let lower = pattern.to_ascii_lowercase();
    lower
        .find("psk")
        .and_then(|at| lower[at + 3..].chars().next())
        .and_then(|c| c.to_digit(10))
        .map(|d| d as u8)
        .unwrap_or(0)
}

enum SnowState {
    Handshake(Box<HandshakeState>),
    Transport(Box<TransportState>),
    Spent,
}

pub struct SnowSession {
    state: SnowState,
}

impl SnowSession {
    pub fn initiator(pattern: &str, psk: &[u8]) -> Result<Self, NoiseError> {
        Self::build(pattern, psk, true)
    }

    pub fn responder(pattern: &str, psk: &[u8]) -> Result<Self, NoiseError> {
        Self::build(pattern, psk, false)
    }

    fn build(pattern: &str, psk: &[u8], initiator: bool) -> Result<Self, NoiseError> {
        let params: NoiseParams = pattern
            .parse()
            .map_err(|_| NoiseError::Pattern(pattern.to_string()))?;

        let mut builder = Builder::new(params);
        if requires_psk(pattern) {
            builder = builder.psk(psk_location(pattern), psk);
        }
        let handshake = if initiator {
            builder.build_initiator()?
        } else {
            builder.build_responder()?
        };

        Ok(Self {
            state: SnowState::Handshake(Box::new(handshake)),
        })
    }

    fn handshake(&mut self) -> Result<&mut HandshakeState, NoiseError> {
        match &mut self.state {
            SnowState::Handshake(hs) => Ok(hs),
            _ => Err(NoiseError::WrongMode("handshake")),
        }
    }

    fn transport(&mut self) -> Result<&mut TransportState, NoiseError> {
        match &mut self.state {
            SnowState::Transport(ts) => Ok(ts),
            _ => Err(NoiseError::WrongMode("transport")),
        }
    }

    /// Switches to transport mode once the handshake pattern is complete.
    fn advance(&mut self) -> Result<(), NoiseError> {
        self.state = match std::mem::replace(&mut self.state, SnowState::Spent) {
            SnowState::Handshake(hs) if hs.is_handshake_finished() => {
                SnowState::Transport(Box::new(hs.into_transport_mode()?))
            }
            other => other,
        };
        Ok(())
    }
}

impl SecureSession for SnowSession {
    fn write_handshake(&mut self, out: &mut [u8]) -> Result<usize, NoiseError> {
        let len = self.handshake()?.write_message(&[], out)?;
        if len == 0 {
            return Err(NoiseError::Empty("handshake write"));
        }
        self.advance()?;
        Ok(len)
    }

    fn read_handshake(&mut self, message: &[u8]) -> Result<(), NoiseError> {
        let mut payload = vec![0u8; message.len()];
        self.handshake()?.read_message(message, &mut payload)?;
        self.advance()
    }

    fn encrypt(&mut self, plaintext: &[u8], out: &mut [u8]) -> Result<usize, NoiseError> {
        let len = self.transport()?.write_message(plaintext, out)?;
        if len == 0 {
            return Err(NoiseError::Empty("encryption"));
        }
        Ok(len)
    }

    fn decrypt(&mut self, ciphertext: &[u8], out: &mut [u8]) -> Result<usize, NoiseError> {
        Ok(self.transport()?.read_message(ciphertext, out)?)
    }

    fn is_transport(&self) -> bool {
        matches!(self.state, SnowState::Transport(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pair() -> (SnowSession, SnowSession) {
        let psk = derive_psk("secret-token");
        (
            SnowSession::initiator(DEFAULT_NOISE_PATTERN, &psk).unwrap(),
            SnowSession::responder(DEFAULT_NOISE_PATTERN, &psk).unwrap(),
        )
    }

    fn handshake(client: &mut SnowSession, server: &mut SnowSession) {
        let mut buf = [0u8; 256];
        let len = client.write_handshake(&mut buf).unwrap();
        server.read_handshake(&buf[..len]).unwrap();
        let len = server.write_handshake(&mut buf).unwrap();
        client.read_handshake(&buf[..len]).unwrap();
    }

    #[test]
    fn psk_is_sha256_of_token() {
        let psk = derive_psk("secret-token");
        assert_eq!(
            hex::encode(psk),
            "930bbdc51b6aed5c2a5678fd6e28dee7a05e8a4b643cfc0b4427c3efb86c0d94"
        );
        assert_eq!(psk.as_slice(), Sha256::digest(b"secret-token").as_slice());
    }

    #[test]
    fn psk_detection_is_case_insensitive() {
        assert!(requires_psk(DEFAULT_NOISE_PATTERN));
        assert!(requires_psk("Noise_NNPSK0_25519_ChaChaPoly_SHA256"));
        assert!(!requires_psk("Noise_NN_25519_ChaChaPoly_SHA256"));
        assert_eq!(psk_location("Noise_XXpsk3_25519_ChaChaPoly_SHA256"), 3);
    }

    #[test]
    fn handshake_then_transport_round_trip() {
        let (mut client, mut server) = pair();
        handshake(&mut client, &mut server);
        assert!(client.is_transport());
        assert!(server.is_transport());

        let mut ciphertext = [0u8; 128];
        let len = client.encrypt(b"ping", &mut ciphertext).unwrap();
        let mut plaintext = [0u8; 128];
        let read = server.decrypt(&ciphertext[..len], &mut plaintext).unwrap();
        assert_eq!(&plaintext[..read], b"ping");
    }

    #[test]
    fn mismatched_psk_fails_handshake() {
        let mut client =
            SnowSession::initiator(DEFAULT_NOISE_PATTERN, &derive_psk("one")).unwrap();
        let mut server =
            SnowSession::responder(DEFAULT_NOISE_PATTERN, &derive_psk("two")).unwrap();

        let mut buf = [0u8; 256];
        let len = client.write_handshake(&mut buf).unwrap();
        assert!(server.read_handshake(&buf[..len]).is_err());
    }

    #[test]
    fn encrypt_before_handshake_is_rejected() {
        let (mut client, _) = pair();
        let mut out = [0u8; 64];
        assert!(matches!(
            client.encrypt(b"x", &mut out),
            Err(NoiseError::WrongMode("transport"))
        ));
    }

    #[test]
    fn unknown_pattern_is_rejected() {
        assert!(matches!(
            SnowSession::initiator("Noise_bogus", &[]),
            Err(NoiseError::Pattern(_))
        ));
    }
}
