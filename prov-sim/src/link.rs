//! Link: device side of one companion app connection

use std::sync::Arc;

use log::{debug, warn};
use tokio::io::{AsyncRead, AsyncWrite};

use prov_manager::{Error, Event, Manager};
use prov_proto::async_io::{read_frame, write_frame};
use prov_proto::{
    Frame, Link, Request, Response, SessionId, MSG_CONNECT, MSG_DISCONNECT, MSG_REQUEST, RESP_ERR_HANDLER,
    RESP_ERR_NO_MEM, RESP_ERR_SESSION_NOT_READY, RESP_ERR_UNKNOWN_ENDPOINT,
};

pub struct LinkSession<S> {
    stream: S,
    manager: Arc<Manager>,
    active: Option<SessionId>,
}

impl<S: AsyncRead + AsyncWrite + Unpin> LinkSession<S> {
    pub fn new(stream: S, manager: Arc<Manager>) -> Self {
        Self { stream, manager, active: None }
    }

    pub async fn run(mut self) -> std::io::Result<()> {
        loop {
            let frame = match read_frame(&mut self.stream).await {
                Ok(frame) => frame,
                Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => break,
                Err(e) => return Err(e),
            };
            self.handle_frame(frame).await?;
        }

        // Link dropped without DISCONNECT
        if let Some(id) = self.active.take() {
            self.manager.handle_event(Event::TransportDisconnected(id));
        }
        Ok(())
    }

    // Link events are applied inline so requests that follow see the session
    async fn handle_frame(&mut self, frame: Frame) -> std::io::Result<()> {
        match frame.msg_type {
            MSG_CONNECT => {
                let link = Link::from_bytes(&frame.payload)?;
                self.active = Some(link.session_id);
                self.manager.handle_event(Event::TransportConnected(link.session_id));
            }
            MSG_DISCONNECT => {
                let link = Link::from_bytes(&frame.payload)?;
                if self.active == Some(link.session_id) {
                    self.active = None;
                }
                self.manager.handle_event(Event::TransportDisconnected(link.session_id));
            }
            MSG_REQUEST => {
                let request = Request::from_bytes(&frame.payload)?;
                debug!("REQUEST {} ({} bytes)", request.endpoint, request.payload.len());
                let result = self.manager.dispatch(request.session_id, &request.endpoint, &request.payload);
                let response = to_response(request.session_id, result);
                write_frame(&mut self.stream, &Frame::response(&response)).await?;
            }
            other => warn!("unknown message type: 0x{other:04x}"),
        }
        Ok(())
    }
}

/// Map a dispatch outcome onto the wire status codes
pub fn to_response(session_id: SessionId, result: Result<Vec<u8>, Error>) -> Response {
    match result {
        Ok(payload) => Response::success(session_id, payload),
        Err(e) => {
            let status = match e {
                Error::UnknownEndpoint(_) => RESP_ERR_UNKNOWN_ENDPOINT,
                Error::SessionNotReady(_) => RESP_ERR_SESSION_NOT_READY,
                Error::OutOfMemory => RESP_ERR_NO_MEM,
                _ => RESP_ERR_HANDLER,
            };
            Response::error(session_id, status, &e.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use prov_manager::HandlerErrorKind;
    use prov_proto::RESP_OK;

    #[test]
    fn error_statuses() {
        assert_eq!(to_response(1, Ok(vec![1])).status, RESP_OK);
        assert_eq!(
            to_response(1, Err(Error::UnknownEndpoint("x".to_string()))).status,
            RESP_ERR_UNKNOWN_ENDPOINT
        );
        assert_eq!(to_response(1, Err(Error::SessionNotReady(1))).status, RESP_ERR_SESSION_NOT_READY);
        assert_eq!(to_response(1, Err(Error::OutOfMemory)).status, RESP_ERR_NO_MEM);

        let resp = to_response(9, Err(Error::Handler(HandlerErrorKind::Other("gone".to_string()))));
        assert_eq!(resp.status, RESP_ERR_HANDLER);
        assert_eq!(resp.session_id, 9);
        assert!(!resp.payload.is_empty());
    }
}
