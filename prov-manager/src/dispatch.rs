//! Endpoint dispatch: (session, endpoint, bytes) -> response bytes

use std::sync::{Arc, Mutex, PoisonError, RwLock};

use log::{debug, warn};

use prov_proto::SessionId;

use crate::error::Error;
use crate::registry::EndpointRegistry;
use crate::session::SessionNegotiator;

pub struct Dispatcher {
    registry: Arc<RwLock<EndpointRegistry>>,
    sessions: Arc<Mutex<SessionNegotiator>>,
}

impl Dispatcher {
    pub fn new(registry: Arc<RwLock<EndpointRegistry>>, sessions: Arc<Mutex<SessionNegotiator>>) -> Self {
        Self { registry, sessions }
    }

    /// Route a request to its handler.
    ///
    /// Unknown endpoints fail before anything else is looked at. Protocol
    /// endpoints that run before the handshake only need the session to
    /// exist; everything else needs it established. The returned buffer
    /// belongs to the caller.
    pub fn dispatch(&self, session_id: SessionId, endpoint: &str, request: &[u8]) -> Result<Vec<u8>, Error> {
        let handler = self
            .registry
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .resolve(endpoint)?;

        let ready = {
            let sessions = self.sessions.lock().unwrap_or_else(PoisonError::into_inner);
            if handler.before_session() {
                sessions.is_current(session_id)
            } else {
                sessions.is_ready(session_id)
            }
        };
        if !ready {
            warn!("{endpoint}: session {session_id} is not ready");
            return Err(Error::SessionNotReady(session_id));
        }

        debug!("{endpoint}: {} bytes from session {session_id}", request.len());
        handler.handle(session_id, request).map_err(|e| {
            warn!("{endpoint}: handler failed: {e}");
            Error::from(e)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use crate::config::SecurityLevel;
    use crate::error::{HandlerError, HandlerErrorKind};
    use crate::event::EventSender;
    use crate::handlers::SessionEndpoint;
    use crate::registry::EndpointHandler;

    struct Fixture {
        dispatcher: Dispatcher,
        registry: Arc<RwLock<EndpointRegistry>>,
        sessions: Arc<Mutex<SessionNegotiator>>,
        calls: Arc<AtomicUsize>,
    }

    fn fixture() -> Fixture {
        let (events, _rx) = EventSender::channel();
        let registry = Arc::new(RwLock::new(EndpointRegistry::new()));
        let sessions = Arc::new(Mutex::new(SessionNegotiator::new(events)));
        let calls = Arc::new(AtomicUsize::new(0));

        let counted = calls.clone();
        let echo: Arc<dyn EndpointHandler> = Arc::new(move |_id: SessionId, req: &[u8]| -> Result<Vec<u8>, HandlerError> {
            counted.fetch_add(1, Ordering::SeqCst);
            Ok(req.to_vec())
        });
        let oom: Arc<dyn EndpointHandler> =
            Arc::new(|_id: SessionId, _req: &[u8]| -> Result<Vec<u8>, HandlerError> { Err(HandlerError::OutOfMemory) });
        let broken: Arc<dyn EndpointHandler> = Arc::new(|_id: SessionId, _req: &[u8]| -> Result<Vec<u8>, HandlerError> {
            Err(HandlerErrorKind::Other("boom".to_string()).into())
        });

        {
            let mut reg = registry.write().unwrap();
            reg.register("echo", echo).unwrap();
            reg.register("oom", oom).unwrap();
            reg.register("broken", broken).unwrap();
            reg.register_protocol("prov-session", Arc::new(SessionEndpoint::new(sessions.clone()))).unwrap();
        }

        Fixture {
            dispatcher: Dispatcher::new(registry.clone(), sessions.clone()),
            registry,
            sessions,
            calls,
        }
    }

    #[test]
    fn unknown_endpoint_never_calls_handlers() {
        let f = fixture();
        assert_eq!(
            f.dispatcher.dispatch(1, "missing", b"0"),
            Err(Error::UnknownEndpoint("missing".to_string()))
        );
        f.sessions.lock().unwrap().begin(1, SecurityLevel::None, None);
        assert_eq!(
            f.dispatcher.dispatch(1, "missing", b"0"),
            Err(Error::UnknownEndpoint("missing".to_string()))
        );
        assert_eq!(f.calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn needs_session() {
        let f = fixture();
        assert_eq!(f.dispatcher.dispatch(1, "echo", b"x"), Err(Error::SessionNotReady(1)));
        f.sessions.lock().unwrap().begin(1, SecurityLevel::None, None);
        assert_eq!(f.dispatcher.dispatch(2, "echo", b"x"), Err(Error::SessionNotReady(2)));
        assert_eq!(f.dispatcher.dispatch(1, "echo", b"x"), Ok(b"x".to_vec()));
    }

    #[test]
    fn secured_session_must_finish_handshake() {
        let f = fixture();
        f.sessions.lock().unwrap().begin(1, SecurityLevel::Secured, Some(b"pop"));
        assert_eq!(f.dispatcher.dispatch(1, "echo", b"x"), Err(Error::SessionNotReady(1)));
        // the handshake endpoint itself is reachable
        assert!(f.dispatcher.dispatch(1, "prov-session", &[0x10]).is_ok());
    }

    #[test]
    fn empty_request_reaches_handler() {
        let f = fixture();
        f.sessions.lock().unwrap().begin(1, SecurityLevel::None, None);
        assert_eq!(f.dispatcher.dispatch(1, "echo", &[]), Ok(vec![]));
        assert_eq!(f.calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn handler_errors_propagate() {
        let f = fixture();
        f.sessions.lock().unwrap().begin(1, SecurityLevel::None, None);
        assert_eq!(f.dispatcher.dispatch(1, "oom", b""), Err(Error::OutOfMemory));
        assert_eq!(
            f.dispatcher.dispatch(1, "broken", b""),
            Err(Error::Handler(HandlerErrorKind::Other("boom".to_string())))
        );
    }

    #[test]
    fn reset_registry_unknown_again() {
        let f = fixture();
        f.sessions.lock().unwrap().begin(1, SecurityLevel::None, None);
        f.registry.write().unwrap().reset();
        assert_eq!(
            f.dispatcher.dispatch(1, "echo", b"x"),
            Err(Error::UnknownEndpoint("echo".to_string()))
        );
    }
}
