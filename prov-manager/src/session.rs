//! Session negotiation
//!
//! One session at a time. A new transport connection force-closes the previous
//! session. The handshake itself is a pluggable `Security` scheme; the
//! negotiator only tracks which session is active and reports the outcome.

use log::{error, info, warn};

use prov_proto::sec::{self, SessionCmd, SessionResp, NONCE_LEN};
use prov_proto::SessionId;

use crate::config::SecurityLevel;
use crate::error::SecurityError;
use crate::event::{Event, EventSender};

/// Result of one handshake message
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Step {
    /// Send this back and wait for the next message
    Continue(Vec<u8>),
    /// Send this back; the session is now established
    Established(Vec<u8>),
}

/// A security handshake scheme
pub trait Security: Send {
    fn level(&self) -> SecurityLevel;

    fn on_message(&mut self, request: &[u8]) -> Result<Step, SecurityError>;
}

/// sec0: no secret, a single hello exchange
#[derive(Debug, Default)]
pub struct NoSecurity;

impl Security for NoSecurity {
    fn level(&self) -> SecurityLevel {
        SecurityLevel::None
    }

    fn on_message(&mut self, request: &[u8]) -> Result<Step, SecurityError> {
        match SessionCmd::from_bytes(request) {
            Ok(SessionCmd::Hello) => Ok(Step::Established(
                SessionResp::Hello { status: sec::STATUS_OK }.to_bytes(),
            )),
            _ => Err(SecurityError::InvalidSecurityParams),
        }
    }
}

enum PopState {
    AwaitCmd0,
    AwaitCmd1 {
        client_nonce: [u8; NONCE_LEN],
        device_nonce: [u8; NONCE_LEN],
    },
    Done,
}

/// sec1: proof of possession
pub struct PopSecurity {
    pop: Vec<u8>,
    state: PopState,
}

impl PopSecurity {
    pub fn new(pop: &[u8]) -> Self {
        Self { pop: pop.to_vec(), state: PopState::AwaitCmd0 }
    }
}

impl Security for PopSecurity {
    fn level(&self) -> SecurityLevel {
        SecurityLevel::Secured
    }

    fn on_message(&mut self, request: &[u8]) -> Result<Step, SecurityError> {
        let cmd = SessionCmd::from_bytes(request).map_err(|_| SecurityError::InvalidSecurityParams)?;

        match (&self.state, cmd) {
            (PopState::AwaitCmd0, SessionCmd::Cmd0 { client_nonce }) => {
                let device_nonce: [u8; NONCE_LEN] = rand::random();
                self.state = PopState::AwaitCmd1 { client_nonce, device_nonce };
                Ok(Step::Continue(
                    SessionResp::Resp0 { status: sec::STATUS_OK, device_nonce }.to_bytes(),
                ))
            }
            (PopState::AwaitCmd1 { client_nonce, device_nonce }, SessionCmd::Cmd1 { client_verify }) => {
                let expected = sec::proof(&self.pop, device_nonce, client_nonce);
                if !constant_time_eq(&expected, &client_verify) {
                    return Err(SecurityError::CredentialsMismatch);
                }
                let device_verify = sec::proof(&self.pop, client_nonce, device_nonce);
                self.state = PopState::Done;
                Ok(Step::Established(
                    SessionResp::Resp1 { status: sec::STATUS_OK, device_verify }.to_bytes(),
                ))
            }
            _ => Err(SecurityError::InvalidSecurityParams),
        }
    }
}

fn constant_time_eq(a: &[u8; NONCE_LEN], b: &[u8; NONCE_LEN]) -> bool {
    a.iter().zip(b.iter()).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Negotiating,
    Established,
}

pub struct Session {
    pub id: SessionId,
    pub state: SessionState,
    scheme: Box<dyn Security>,
}

pub struct SessionNegotiator {
    current: Option<Session>,
    events: EventSender,
}

impl SessionNegotiator {
    pub fn new(events: EventSender) -> Self {
        Self { current: None, events }
    }

    /// Start negotiating `session_id` with the stock scheme for `level`
    pub fn begin(&mut self, session_id: SessionId, level: SecurityLevel, secret: Option<&[u8]>) {
        let scheme: Box<dyn Security> = match level {
            SecurityLevel::None => Box::new(NoSecurity),
            SecurityLevel::Secured => Box::new(PopSecurity::new(secret.unwrap_or_default())),
        };
        self.begin_with(session_id, scheme);
    }

    /// Start negotiating `session_id` with a custom scheme
    pub fn begin_with(&mut self, session_id: SessionId, scheme: Box<dyn Security>) {
        if let Some(prev) = self.current.take() {
            warn!("closing session {} for new connection {session_id}", prev.id);
        }

        let state = match scheme.level() {
            SecurityLevel::None => SessionState::Established,
            SecurityLevel::Secured => SessionState::Negotiating,
        };
        self.current = Some(Session { id: session_id, state, scheme });

        if state == SessionState::Established {
            self.events.send(Event::SessionEstablished(session_id));
        }
    }

    /// Advance the handshake. A failure while negotiating discards the
    /// session and emits `SessionFailed`; the client has to reconnect. Once
    /// established, a rejected handshake message leaves the session alone.
    pub fn on_client_message(&mut self, session_id: SessionId, request: &[u8]) -> Result<Vec<u8>, SecurityError> {
        let session = match self.current.as_mut() {
            Some(s) if s.id == session_id => s,
            _ => return Err(SecurityError::NoSession(session_id)),
        };

        match session.scheme.on_message(request) {
            Ok(Step::Continue(out)) => Ok(out),
            Ok(Step::Established(out)) => {
                if session.state != SessionState::Established {
                    session.state = SessionState::Established;
                    info!("Secured session established!");
                    self.events.send(Event::SessionEstablished(session_id));
                }
                Ok(out)
            }
            Err(e) if session.state == SessionState::Established => {
                warn!("session {session_id} already established, rejecting handshake message: {e}");
                Err(SecurityError::InvalidSecurityParams)
            }
            Err(e) => {
                error!("{e}");
                self.current = None;
                self.events.send(Event::SessionFailed(session_id, e));
                Err(e)
            }
        }
    }

    /// Transport went away
    pub fn end(&mut self, session_id: SessionId) -> bool {
        if self.is_current(session_id) {
            self.current = None;
            true
        } else {
            false
        }
    }

    pub fn clear(&mut self) {
        self.current = None;
    }

    pub fn current(&self) -> Option<&Session> {
        self.current.as_ref()
    }

    pub fn is_current(&self, session_id: SessionId) -> bool {
        self.current.as_ref().is_some_and(|s| s.id == session_id)
    }

    /// Session exists and finished its handshake
    pub fn is_ready(&self, session_id: SessionId) -> bool {
        self.current
            .as_ref()
            .is_some_and(|s| s.id == session_id && s.state == SessionState::Established)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc::UnboundedReceiver;

    fn negotiator() -> (SessionNegotiator, UnboundedReceiver<Event>) {
        let (events, rx) = EventSender::channel();
        (SessionNegotiator::new(events), rx)
    }

    fn handshake(neg: &mut SessionNegotiator, id: SessionId, pop: &[u8]) -> Result<Vec<u8>, SecurityError> {
        let client_nonce = [9u8; NONCE_LEN];
        let resp0 = neg.on_client_message(id, &SessionCmd::Cmd0 { client_nonce }.to_bytes())?;
        let SessionResp::Resp0 { device_nonce, .. } = SessionResp::from_bytes(&resp0).unwrap() else {
            panic!("expected RESP0");
        };
        let client_verify = sec::proof(pop, &device_nonce, &client_nonce);
        neg.on_client_message(id, &SessionCmd::Cmd1 { client_verify }.to_bytes())
    }

    #[test]
    fn no_security_is_ready_immediately() {
        let (mut neg, mut rx) = negotiator();
        neg.begin(4, SecurityLevel::None, None);
        assert!(neg.is_ready(4));
        assert_eq!(rx.try_recv().unwrap(), Event::SessionEstablished(4));
    }

    #[test]
    fn pop_handshake() {
        let (mut neg, mut rx) = negotiator();
        neg.begin(1, SecurityLevel::Secured, Some(b"abcd1234"));
        assert!(!neg.is_ready(1));
        assert!(rx.try_recv().is_err());

        let resp1 = handshake(&mut neg, 1, b"abcd1234").unwrap();
        let SessionResp::Resp1 { status, device_verify } = SessionResp::from_bytes(&resp1).unwrap() else {
            panic!("expected RESP1");
        };
        assert_eq!(status, sec::STATUS_OK);
        assert_ne!(device_verify, [0u8; NONCE_LEN]);
        assert!(neg.is_ready(1));
        assert_eq!(rx.try_recv().unwrap(), Event::SessionEstablished(1));
    }

    #[test]
    fn wrong_pop_fails_once_and_discards() {
        let (mut neg, mut rx) = negotiator();
        neg.begin(1, SecurityLevel::Secured, Some(b"abcd1234"));
        assert_eq!(handshake(&mut neg, 1, b"wrong"), Err(SecurityError::CredentialsMismatch));
        assert!(neg.current().is_none());
        assert_eq!(
            rx.try_recv().unwrap(),
            Event::SessionFailed(1, SecurityError::CredentialsMismatch)
        );
        assert_eq!(
            neg.on_client_message(1, &[sec::SEC1_CMD0]),
            Err(SecurityError::NoSession(1))
        );
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn malformed_handshake() {
        let (mut neg, mut rx) = negotiator();
        neg.begin(2, SecurityLevel::Secured, Some(b"abcd1234"));
        let cmd1 = SessionCmd::Cmd1 { client_verify: [0u8; NONCE_LEN] }.to_bytes();
        assert_eq!(neg.on_client_message(2, &cmd1), Err(SecurityError::InvalidSecurityParams));
        assert_eq!(
            rx.try_recv().unwrap(),
            Event::SessionFailed(2, SecurityError::InvalidSecurityParams)
        );
    }

    #[test]
    fn stray_handshake_keeps_established_session() {
        let (mut neg, mut rx) = negotiator();
        neg.begin(3, SecurityLevel::None, None);
        assert_eq!(rx.try_recv().unwrap(), Event::SessionEstablished(3));

        assert_eq!(neg.on_client_message(3, &[sec::SEC1_CMD0]), Err(SecurityError::InvalidSecurityParams));
        assert!(neg.is_ready(3));
        assert!(rx.try_recv().is_err());

        // a repeated hello is still answered
        assert!(neg.on_client_message(3, &SessionCmd::Hello.to_bytes()).is_ok());
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn handshake_after_pop_success_is_rejected() {
        let (mut neg, mut rx) = negotiator();
        neg.begin(1, SecurityLevel::Secured, Some(b"abcd1234"));
        handshake(&mut neg, 1, b"abcd1234").unwrap();
        assert_eq!(rx.try_recv().unwrap(), Event::SessionEstablished(1));

        assert_eq!(handshake(&mut neg, 1, b"abcd1234"), Err(SecurityError::InvalidSecurityParams));
        assert!(neg.is_ready(1));
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn new_connection_replaces_session() {
        let (mut neg, _rx) = negotiator();
        neg.begin(1, SecurityLevel::None, None);
        neg.begin(2, SecurityLevel::None, None);
        assert!(!neg.is_current(1));
        assert!(neg.is_ready(2));
        assert!(!neg.end(1));
        assert!(neg.end(2));
        assert!(neg.current().is_none());
    }
}
