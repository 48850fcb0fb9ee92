//! `prov-session` handshake messages
//!
//! Two schemes share the endpoint:
//! - sec0: a single hello exchange, no secret involved
//! - sec1: proof of possession. Both sides exchange 32 byte nonces, then each
//!   proves knowledge of the PoP with `SHA256(pop || their_nonce || own_nonce)`.

use std::io;

use sha2::{Digest, Sha256};

pub const SEC0_HELLO: u8 = 0x00;
pub const SEC0_HELLO_RESP: u8 = 0x01;
pub const SEC1_CMD0: u8 = 0x10;
pub const SEC1_RESP0: u8 = 0x11;
pub const SEC1_CMD1: u8 = 0x12;
pub const SEC1_RESP1: u8 = 0x13;

// Handshake status codes
pub const STATUS_OK: u8 = 0;
pub const STATUS_INVALID_PARAMS: u8 = 1;
pub const STATUS_MISMATCH: u8 = 2;
pub const STATUS_NO_SESSION: u8 = 3;

pub const NONCE_LEN: usize = 32;

/// Client -> device handshake message
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionCmd {
    /// sec0 hello
    Hello,
    /// sec1 step 0: client nonce
    Cmd0 { client_nonce: [u8; NONCE_LEN] },
    /// sec1 step 1: client proof
    Cmd1 { client_verify: [u8; NONCE_LEN] },
}

impl SessionCmd {
    pub fn to_bytes(&self) -> Vec<u8> {
        match self {
            SessionCmd::Hello => vec![SEC0_HELLO],
            SessionCmd::Cmd0 { client_nonce } => tagged(SEC1_CMD0, None, client_nonce),
            SessionCmd::Cmd1 { client_verify } => tagged(SEC1_CMD1, None, client_verify),
        }
    }

    pub fn from_bytes(data: &[u8]) -> io::Result<Self> {
        let Some((&tag, rest)) = data.split_first() else {
            return Err(io::Error::new(io::ErrorKind::InvalidData, "session command empty"));
        };

        match tag {
            SEC0_HELLO if rest.is_empty() => Ok(SessionCmd::Hello),
            SEC1_CMD0 => Ok(SessionCmd::Cmd0 { client_nonce: array(rest, "CMD0")? }),
            SEC1_CMD1 => Ok(SessionCmd::Cmd1 { client_verify: array(rest, "CMD1")? }),
            other => Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("unexpected session command 0x{other:02x}"),
            )),
        }
    }
}

/// Device -> client handshake message
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionResp {
    Hello { status: u8 },
    Resp0 { status: u8, device_nonce: [u8; NONCE_LEN] },
    Resp1 { status: u8, device_verify: [u8; NONCE_LEN] },
}

impl SessionResp {
    /// Response reporting a failed step; the nonce/proof field is zeroed
    pub fn failure(status: u8) -> Self {
        SessionResp::Resp1 { status, device_verify: [0u8; NONCE_LEN] }
    }

    pub fn status(&self) -> u8 {
        match self {
            SessionResp::Hello { status }
            | SessionResp::Resp0 { status, .. }
            | SessionResp::Resp1 { status, .. } => *status,
        }
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        match self {
            SessionResp::Hello { status } => vec![SEC0_HELLO_RESP, *status],
            SessionResp::Resp0 { status, device_nonce } => tagged(SEC1_RESP0, Some(*status), device_nonce),
            SessionResp::Resp1 { status, device_verify } => tagged(SEC1_RESP1, Some(*status), device_verify),
        }
    }

    pub fn from_bytes(data: &[u8]) -> io::Result<Self> {
        if data.len() < 2 {
            return Err(io::Error::new(io::ErrorKind::InvalidData, "session response too short"));
        }

        let (tag, status, rest) = (data[0], data[1], &data[2..]);
        match tag {
            SEC0_HELLO_RESP => Ok(SessionResp::Hello { status }),
            SEC1_RESP0 => Ok(SessionResp::Resp0 { status, device_nonce: array(rest, "RESP0")? }),
            SEC1_RESP1 => Ok(SessionResp::Resp1 { status, device_verify: array(rest, "RESP1")? }),
            other => Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("unexpected session response 0x{other:02x}"),
            )),
        }
    }
}

/// `SHA256(pop || a || b)`
///
/// The client proves with `proof(pop, device_nonce, client_nonce)`, the
/// device answers with `proof(pop, client_nonce, device_nonce)`.
pub fn proof(pop: &[u8], a: &[u8; NONCE_LEN], b: &[u8; NONCE_LEN]) -> [u8; NONCE_LEN] {
    let mut hasher = Sha256::new();
    hasher.update(pop);
    hasher.update(a);
    hasher.update(b);
    hasher.finalize().into()
}

fn tagged(tag: u8, status: Option<u8>, body: &[u8; NONCE_LEN]) -> Vec<u8> {
    let mut buf = Vec::with_capacity(2 + NONCE_LEN);
    buf.push(tag);
    if let Some(status) = status {
        buf.push(status);
    }
    buf.extend_from_slice(body);
    buf
}

fn array(data: &[u8], what: &str) -> io::Result<[u8; NONCE_LEN]> {
    data.try_into()
        .map_err(|_| io::Error::new(io::ErrorKind::InvalidData, format!("{what} expects {NONCE_LEN} bytes")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hello_with_trailing_bytes_is_invalid() {
        assert!(SessionCmd::from_bytes(&[SEC0_HELLO, 1]).is_err());
        assert_eq!(SessionCmd::from_bytes(&[SEC0_HELLO]).unwrap(), SessionCmd::Hello);
    }

    #[test]
    fn short_nonce_is_invalid() {
        let mut bytes = vec![SEC1_CMD0];
        bytes.extend_from_slice(&[7u8; 31]);
        assert!(SessionCmd::from_bytes(&bytes).is_err());
    }

    #[test]
    fn proof_is_direction_sensitive() {
        let (a, b) = ([1u8; NONCE_LEN], [2u8; NONCE_LEN]);
        assert_eq!(proof(b"pop", &a, &b), proof(b"pop", &a, &b));
        assert_ne!(proof(b"pop", &a, &b), proof(b"pop", &b, &a));
        assert_ne!(proof(b"pop", &a, &b), proof(b"pip", &a, &b));
    }

    #[test]
    fn failure_carries_status() {
        let resp = SessionResp::from_bytes(&SessionResp::failure(STATUS_MISMATCH).to_bytes()).unwrap();
        assert_eq!(resp.status(), STATUS_MISMATCH);
    }
}
