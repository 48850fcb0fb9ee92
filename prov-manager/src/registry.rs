//! Endpoint registry: command name -> handler

use std::collections::HashMap;
use std::sync::Arc;

use prov_proto::SessionId;

use crate::error::{Error, HandlerError};

/// Capability behind an endpoint
///
/// Handlers run synchronously on the thread that received the frame and
/// must not block on long I/O. The returned buffer is owned by the caller.
pub trait EndpointHandler: Send + Sync {
    fn handle(&self, session_id: SessionId, request: &[u8]) -> Result<Vec<u8>, HandlerError>;

    /// Reachable before the session has finished its security handshake
    fn before_session(&self) -> bool {
        false
    }
}

impl<F> EndpointHandler for F
where
    F: Fn(SessionId, &[u8]) -> Result<Vec<u8>, HandlerError> + Send + Sync,
{
    fn handle(&self, session_id: SessionId, request: &[u8]) -> Result<Vec<u8>, HandlerError> {
        self(session_id, request)
    }
}

struct Entry {
    handler: Arc<dyn EndpointHandler>,
    /// Protocol endpoints survive `reset`
    protocol: bool,
}

#[derive(Default)]
pub struct EndpointRegistry {
    entries: HashMap<String, Entry>,
}

impl EndpointRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an application endpoint
    pub fn register(&mut self, name: &str, handler: Arc<dyn EndpointHandler>) -> Result<(), Error> {
        self.insert(name, handler, false)
    }

    /// Register an endpoint that is part of the protocol itself
    pub(crate) fn register_protocol(&mut self, name: &str, handler: Arc<dyn EndpointHandler>) -> Result<(), Error> {
        self.insert(name, handler, true)
    }

    fn insert(&mut self, name: &str, handler: Arc<dyn EndpointHandler>, protocol: bool) -> Result<(), Error> {
        if name.len() > prov_proto::MAX_ENDPOINT_NAME {
            return Err(Error::EndpointNameTooLong(name.to_string()));
        }
        if self.entries.contains_key(name) {
            return Err(Error::DuplicateEndpoint(name.to_string()));
        }
        self.entries.insert(name.to_string(), Entry { handler, protocol });
        Ok(())
    }

    pub fn resolve(&self, name: &str) -> Result<Arc<dyn EndpointHandler>, Error> {
        self.entries
            .get(name)
            .map(|e| e.handler.clone())
            .ok_or_else(|| Error::UnknownEndpoint(name.to_string()))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    /// Names of registered application endpoints, sorted
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .entries
            .iter()
            .filter(|(_, e)| !e.protocol)
            .map(|(name, _)| name.clone())
            .collect();
        names.sort();
        names
    }

    /// Drop application endpoints so their names can be registered again
    pub fn reset(&mut self) {
        self.entries.retain(|_, e| e.protocol);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn echo() -> Arc<dyn EndpointHandler> {
        Arc::new(|_id: SessionId, req: &[u8]| -> Result<Vec<u8>, HandlerError> { Ok(req.to_vec()) })
    }

    #[test]
    fn duplicate_name_fails() {
        let mut reg = EndpointRegistry::new();
        reg.register("ble_transmit", echo()).unwrap();
        assert_eq!(
            reg.register("ble_transmit", echo()),
            Err(Error::DuplicateEndpoint("ble_transmit".to_string()))
        );
    }

    #[test]
    fn name_must_fit_a_request() {
        let mut reg = EndpointRegistry::new();
        let long = "e".repeat(prov_proto::MAX_ENDPOINT_NAME + 1);
        assert_eq!(reg.register(&long, echo()), Err(Error::EndpointNameTooLong(long.clone())));
        assert!(!reg.contains(&long));
        reg.register(&long[1..], echo()).unwrap();
    }

    #[test]
    fn unknown_name_fails() {
        let reg = EndpointRegistry::new();
        assert!(matches!(reg.resolve("nope"), Err(Error::UnknownEndpoint(n)) if n == "nope"));
    }

    #[test]
    fn reset_allows_reregistration_and_keeps_protocol() {
        let mut reg = EndpointRegistry::new();
        reg.register_protocol("proto-ver", echo()).unwrap();
        reg.register("custom-data", echo()).unwrap();
        reg.reset();
        assert!(reg.contains("proto-ver"));
        assert!(!reg.contains("custom-data"));
        reg.register("custom-data", echo()).unwrap();
        assert_eq!(reg.names(), vec!["custom-data".to_string()]);
    }
}
