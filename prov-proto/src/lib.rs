//! Provisioning wire protocol - endpoint records and framing
//!
//! Endpoint payloads are opaque bytes. This crate defines the records the
//! protocol endpoints put inside them (`sec`, `config`, `version`, `custom`)
//! and the frame format used to carry (session, endpoint, bytes) tuples over
//! a byte stream.

pub mod ble;
pub mod config;
pub mod custom;
pub mod sec;
pub mod version;

pub use config::{ConfigRequest, ConfigResponse, Credentials, WifiConfig};
pub use custom::ServiceCredentials;
pub use version::VersionInfo;

use std::io;

/// Opaque per-connection session identifier
pub type SessionId = u32;

// Message types
pub const MSG_CONNECT: u16 = 0x0001;
pub const MSG_DISCONNECT: u16 = 0x0002;
pub const MSG_REQUEST: u16 = 0x0003;
pub const MSG_RESPONSE: u16 = 0x0004;

// RESPONSE status codes
pub const RESP_OK: u8 = 0;
pub const RESP_ERR_UNKNOWN_ENDPOINT: u8 = 1;
pub const RESP_ERR_SESSION_NOT_READY: u8 = 2;
pub const RESP_ERR_NO_MEM: u8 = 3;
pub const RESP_ERR_HANDLER: u8 = 4;

/// Largest frame payload accepted from the link
pub const MAX_FRAME_PAYLOAD: usize = 64 * 1024;

/// Longest endpoint name a REQUEST can carry (one length byte)
pub const MAX_ENDPOINT_NAME: usize = u8::MAX as usize;

/// CONNECT / DISCONNECT message - transport level session boundary
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Link {
    pub session_id: SessionId,
}

impl Link {
    pub fn to_bytes(&self) -> Vec<u8> {
        self.session_id.to_be_bytes().to_vec()
    }

    pub fn from_bytes(data: &[u8]) -> io::Result<Self> {
        if data.len() < 4 {
            return Err(io::Error::new(io::ErrorKind::InvalidData, "LINK too short"));
        }
        Ok(Self {
            session_id: u32::from_be_bytes([data[0], data[1], data[2], data[3]]),
        })
    }
}

/// REQUEST message - client writes `payload` to `endpoint`
#[derive(Debug, Clone)]
pub struct Request {
    pub session_id: SessionId,
    pub endpoint: String,
    pub payload: Vec<u8>,
}

impl Request {
    pub fn to_bytes(&self) -> io::Result<Vec<u8>> {
        let name = self.endpoint.as_bytes();
        let name_len = u8::try_from(name.len()).map_err(|_| {
            io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("endpoint name longer than {MAX_ENDPOINT_NAME} bytes"),
            )
        })?;
        let payload_len = self.payload.len() as u32;

        let mut buf = Vec::with_capacity(4 + 1 + name.len() + 4 + self.payload.len());
        buf.extend_from_slice(&self.session_id.to_be_bytes());
        buf.push(name_len);
        buf.extend_from_slice(name);
        buf.extend_from_slice(&payload_len.to_be_bytes());
        buf.extend_from_slice(&self.payload);
        Ok(buf)
    }

    pub fn from_bytes(data: &[u8]) -> io::Result<Self> {
        if data.len() < 5 {
            return Err(io::Error::new(io::ErrorKind::InvalidData, "REQUEST too short"));
        }

        let session_id = u32::from_be_bytes([data[0], data[1], data[2], data[3]]);
        let name_len = data[4] as usize;
        let name_end = 5 + name_len;

        if data.len() < name_end + 4 {
            return Err(io::Error::new(io::ErrorKind::InvalidData, "REQUEST endpoint truncated"));
        }

        let endpoint = std::str::from_utf8(&data[5..name_end])
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, format!("REQUEST endpoint: {e}")))?
            .to_string();

        let payload_len = u32::from_be_bytes([
            data[name_end],
            data[name_end + 1],
            data[name_end + 2],
            data[name_end + 3],
        ]) as usize;
        let payload_start = name_end + 4;

        if data.len() < payload_start + payload_len {
            return Err(io::Error::new(io::ErrorKind::InvalidData, "REQUEST payload truncated"));
        }

        let payload = data[payload_start..payload_start + payload_len].to_vec();
        Ok(Self { session_id, endpoint, payload })
    }
}

/// RESPONSE message - device's answer to REQUEST
#[derive(Debug, Clone)]
pub struct Response {
    pub session_id: SessionId,
    pub status: u8,
    pub payload: Vec<u8>, // handler output, or error text when status != RESP_OK
}

impl Response {
    pub fn success(session_id: SessionId, payload: Vec<u8>) -> Self {
        Self { session_id, status: RESP_OK, payload }
    }

    pub fn error(session_id: SessionId, status: u8, message: &str) -> Self {
        Self { session_id, status, payload: message.as_bytes().to_vec() }
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let payload_len = self.payload.len() as u32;
        let mut buf = Vec::with_capacity(4 + 1 + 4 + self.payload.len());
        buf.extend_from_slice(&self.session_id.to_be_bytes());
        buf.push(self.status);
        buf.extend_from_slice(&payload_len.to_be_bytes());
        buf.extend_from_slice(&self.payload);
        buf
    }

    pub fn from_bytes(data: &[u8]) -> io::Result<Self> {
        if data.len() < 9 {
            return Err(io::Error::new(io::ErrorKind::InvalidData, "RESPONSE too short"));
        }

        let session_id = u32::from_be_bytes([data[0], data[1], data[2], data[3]]);
        let status = data[4];
        let payload_len = u32::from_be_bytes([data[5], data[6], data[7], data[8]]) as usize;

        if data.len() < 9 + payload_len {
            return Err(io::Error::new(io::ErrorKind::InvalidData, "RESPONSE payload truncated"));
        }

        let payload = data[9..9 + payload_len].to_vec();
        Ok(Self { session_id, status, payload })
    }
}

/// Frame: wraps any message with type and length
#[derive(Debug, Clone)]
pub struct Frame {
    pub msg_type: u16,
    pub payload: Vec<u8>,
}

impl Frame {
    pub fn new(msg_type: u16, payload: Vec<u8>) -> Self {
        Self { msg_type, payload }
    }

    pub fn connect(session_id: SessionId) -> Self {
        Self::new(MSG_CONNECT, Link { session_id }.to_bytes())
    }

    pub fn disconnect(session_id: SessionId) -> Self {
        Self::new(MSG_DISCONNECT, Link { session_id }.to_bytes())
    }

    pub fn request(request: &Request) -> io::Result<Self> {
        Ok(Self::new(MSG_REQUEST, request.to_bytes()?))
    }

    pub fn response(response: &Response) -> Self {
        Self::new(MSG_RESPONSE, response.to_bytes())
    }
}

/// Async frame operations for tokio
#[cfg(feature = "async")]
pub mod async_io {
    use super::*;
    use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

    pub async fn write_frame<W: AsyncWrite + Unpin>(writer: &mut W, frame: &Frame) -> io::Result<()> {
        let len = frame.payload.len() as u32;
        writer.write_all(&frame.msg_type.to_be_bytes()).await?;
        writer.write_all(&len.to_be_bytes()).await?;
        writer.write_all(&frame.payload).await?;
        writer.flush().await?;
        Ok(())
    }

    pub async fn read_frame<R: AsyncRead + Unpin>(reader: &mut R) -> io::Result<Frame> {
        let mut header = [0u8; 6];
        reader.read_exact(&mut header).await?;

        let msg_type = u16::from_be_bytes([header[0], header[1]]);
        let len = u32::from_be_bytes([header[2], header[3], header[4], header[5]]) as usize;

        if len > MAX_FRAME_PAYLOAD {
            return Err(io::Error::new(io::ErrorKind::InvalidData, "frame too large"));
        }

        let mut payload = vec![0u8; len];
        reader.read_exact(&mut payload).await?;

        Ok(Frame { msg_type, payload })
    }
}
