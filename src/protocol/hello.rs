use bincode::{Decode, Encode};

/// Control protocol revision announced in every [`ClientHello`].
pub const PROTOCOL_VERSION: u16 = 1;

/// First frame sent by a client, always unencrypted.
#[derive(Debug, Clone, Encode, Decode, PartialEq, Eq)]
pub struct ClientHello {
    pub protocol_version: u16,
    pub token: String,
    pub tenant_id: String,
    /// The client refuses a Noise channel.
    pub no_noise: bool,
}

/// Server reply to [`ClientHello`], always unencrypted.
#[derive(Debug, Clone, Encode, Decode, PartialEq, Eq)]
pub struct ServerHello {
    pub accepted: bool,
    /// Rejection reason; empty when accepted.
    pub message: String,
    pub no_noise: bool,
}

impl ClientHello {
    pub fn new(token: &str, tenant_id: &str, no_noise: bool) -> Self {
        Self {
            protocol_version: PROTOCOL_VERSION,
            token: token.to_string(),
            tenant_id: tenant_id.to_string(),
            no_noise,
        }
    }
}

impl ServerHello {
    pub fn accept(no_noise: bool) -> Self {
        Self {
            accepted: true,
            message: String::new(),
            no_noise,
        }
    }

    pub fn reject(reason: impl Into<String>) -> Self {
        Self {
            accepted: false,
            message: reason.into(),
            no_noise: true,
        }
    }
}

/// Encryption is only used when neither side opted out.
pub fn encryption_negotiated(client_no_noise: bool, server_no_noise: bool) -> bool {
    !(client_no_noise || server_no_noise)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{decode_message, encode_message};

    #[test]
    fn negotiation_requires_both_sides() {
        assert!(encryption_negotiated(false, false));
        assert!(!encryption_negotiated(true, false));
        assert!(!encryption_negotiated(false, true));
        assert!(!encryption_negotiated(true, true));
    }

    #[test]
    fn hello_carries_protocol_version() {
        let hello = ClientHello::new("token", "tenant-a", false);
        let bytes = encode_message(&hello).unwrap();

        // fixed-int big-endian: the version leads the message
        assert_eq!(bytes[..2], PROTOCOL_VERSION.to_be_bytes());
        assert_eq!(decode_message::<ClientHello>(&bytes).unwrap(), hello);
    }

    #[test]
    fn rejected_hello_keeps_reason() {
        let hello = ServerHello::reject("invalid token");
        assert!(!hello.accepted);
        assert_eq!(hello.message, "invalid token");
    }
}
