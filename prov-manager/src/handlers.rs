//! Built-in endpoint handlers
//!
//! Payload-shape problems never fail a call: they produce a valid response.
//! The only fatal condition is failing to allocate the response buffer.

use std::sync::{Arc, Mutex, PoisonError};

use log::{debug, info, warn};
use serde_json::json;
use tokio::sync::watch;

use prov_proto::config::{ConfigRequest, ConfigResponse, Credentials, WifiConfig};
use prov_proto::sec::{self, SessionResp};
use prov_proto::{ServiceCredentials, SessionId, VersionInfo};

use crate::config::{HandlerKind, SecurityLevel};
use crate::error::{HandlerError, HandlerErrorKind, SecurityError};
use crate::event::{Event, EventSender, Handoff, HandoffSender, Status};
use crate::registry::EndpointHandler;
use crate::session::SessionNegotiator;

/// Response for any encoding of `0`
pub const DIAG_ZERO_RESPONSE: &str = "0xFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFF";
/// Response for every other non-empty input
pub const DIAG_OTHER_RESPONSE: &str = "0x0000000000000000000000000000000000";
/// Response for empty input
pub const DIAG_HELP_RESPONSE: &str = "Send '0' to get 0xFFF... or any other value to get 0x000...";
/// Response of the structured-credential endpoint
pub const SERVICE_RESPONSE: &str = "SUCCESS";

/// Copy `text` into a fresh NUL terminated buffer
pub fn c_string(text: &str) -> Result<Vec<u8>, HandlerError> {
    let mut buf = Vec::new();
    buf.try_reserve_exact(text.len() + 1)?;
    buf.extend_from_slice(text.as_bytes());
    buf.push(0);
    Ok(buf)
}

/// Copy `bytes` into a fresh buffer
fn owned(bytes: &[u8]) -> Result<Vec<u8>, HandlerError> {
    let mut buf = Vec::new();
    buf.try_reserve_exact(bytes.len())?;
    buf.extend_from_slice(bytes);
    Ok(buf)
}

/// Build the handler for an application endpoint listed in the config
pub fn for_kind(kind: HandlerKind, handoff: &HandoffSender) -> Arc<dyn EndpointHandler> {
    match kind {
        HandlerKind::Diagnostic => Arc::new(DiagnosticHandler),
        HandlerKind::ServiceCredentials => Arc::new(ServiceCredentialsHandler::new(handoff.clone())),
    }
}

/// Maps the distinguished value `0` and everything else to two canned answers
///
/// Accepted encodings of `0`: `"0"`, `0x00`, `"0\0"`, `"{0}"`.
#[derive(Debug, Default)]
pub struct DiagnosticHandler;

impl DiagnosticHandler {
    pub fn is_zero(input: &[u8]) -> bool {
        matches!(input, [b'0'] | [0] | [b'0', 0] | [b'{', b'0', b'}'])
    }

    pub fn respond(input: &[u8]) -> &'static str {
        if input.is_empty() {
            DIAG_HELP_RESPONSE
        } else if Self::is_zero(input) {
            DIAG_ZERO_RESPONSE
        } else {
            DIAG_OTHER_RESPONSE
        }
    }
}

impl EndpointHandler for DiagnosticHandler {
    fn handle(&self, session_id: SessionId, request: &[u8]) -> Result<Vec<u8>, HandlerError> {
        if !request.is_empty() {
            info!("diagnostic endpoint received {} bytes (session {session_id})", request.len());
            for (i, b) in request.iter().enumerate() {
                let c = if b.is_ascii_graphic() || *b == b' ' { *b as char } else { '.' };
                debug!("  byte[{i}] = 0x{b:02x} ('{c}')");
            }
        }

        let response = Self::respond(request);
        info!("Sending response: {response}");
        c_string(response)
    }
}

/// Parses `{ip, p, u, pw}` records and hands them to the station
pub struct ServiceCredentialsHandler {
    handoff: HandoffSender,
}

impl ServiceCredentialsHandler {
    pub fn new(handoff: HandoffSender) -> Self {
        Self { handoff }
    }
}

impl EndpointHandler for ServiceCredentialsHandler {
    fn handle(&self, _session_id: SessionId, request: &[u8]) -> Result<Vec<u8>, HandlerError> {
        if !request.is_empty() {
            match ServiceCredentials::parse(request) {
                Ok(service) => {
                    info!("Received service credentials for {}:{} (user {})", service.ip, service.p, service.u);
                    self.handoff.send(Handoff::Service(service));
                }
                Err(e) => warn!("ignoring malformed service credentials: {e}"),
            }
        }
        c_string(SERVICE_RESPONSE)
    }
}

/// `proto-ver`
pub struct VersionHandler {
    level: SecurityLevel,
}

impl VersionHandler {
    pub fn new(level: SecurityLevel) -> Self {
        Self { level }
    }
}

impl EndpointHandler for VersionHandler {
    fn handle(&self, _session_id: SessionId, _request: &[u8]) -> Result<Vec<u8>, HandlerError> {
        let info = VersionInfo::new(self.level.sec_ver());
        let bytes = serde_json::to_vec(&info).map_err(|e| HandlerErrorKind::Other(e.to_string()))?;
        owned(&bytes)
    }

    fn before_session(&self) -> bool {
        true
    }
}

/// `prov-session`, backed by the negotiator
pub struct SessionEndpoint {
    negotiator: Arc<Mutex<SessionNegotiator>>,
}

impl SessionEndpoint {
    pub fn new(negotiator: Arc<Mutex<SessionNegotiator>>) -> Self {
        Self { negotiator }
    }
}

impl EndpointHandler for SessionEndpoint {
    fn handle(&self, session_id: SessionId, request: &[u8]) -> Result<Vec<u8>, HandlerError> {
        let result = self
            .negotiator
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .on_client_message(session_id, request);

        // Security failures end the session; the client only sees a status
        let out = match result {
            Ok(out) => out,
            Err(e) => {
                let status = match e {
                    SecurityError::InvalidSecurityParams => sec::STATUS_INVALID_PARAMS,
                    SecurityError::CredentialsMismatch => sec::STATUS_MISMATCH,
                    SecurityError::NoSession(_) => sec::STATUS_NO_SESSION,
                };
                SessionResp::failure(status).to_bytes()
            }
        };
        owned(&out)
    }

    fn before_session(&self) -> bool {
        true
    }
}

/// Credentials staged by `set`, waiting for `apply`
pub type Staged = Arc<Mutex<Option<Credentials>>>;

/// `prov-config`: `set`, `apply`, `status`
pub struct ConfigHandler {
    staged: Staged,
    events: EventSender,
    status: watch::Receiver<Status>,
}

impl ConfigHandler {
    pub fn new(staged: Staged, events: EventSender, status: watch::Receiver<Status>) -> Self {
        Self { staged, events, status }
    }

    fn run(&self, request: &[u8]) -> ConfigResponse {
        let request: ConfigRequest = match serde_json::from_slice(request) {
            Ok(r) => r,
            Err(e) => return ConfigResponse::err(format!("invalid request: {e}")),
        };

        match request.cmd.as_str() {
            "set" => {
                let config: WifiConfig = match serde_json::from_value(request.args) {
                    Ok(c) => c,
                    Err(e) => return ConfigResponse::err(format!("invalid args: {e}")),
                };
                match config.into_credentials() {
                    Ok(creds) => {
                        info!("Staged Wi-Fi credentials for SSID {}", creds.ssid);
                        *self.staged.lock().unwrap_or_else(PoisonError::into_inner) = Some(creds);
                        ConfigResponse::ok(json!({}))
                    }
                    Err(e) => ConfigResponse::err(e),
                }
            }
            "apply" => {
                let staged = self.staged.lock().unwrap_or_else(PoisonError::into_inner).clone();
                match staged {
                    Some(creds) => {
                        self.events.send(Event::CredentialsReceived(creds));
                        ConfigResponse::ok(json!({}))
                    }
                    None => ConfigResponse::err("no credentials set"),
                }
            }
            "status" => {
                let status = *self.status.borrow();
                ConfigResponse::ok(json!({
                    "state": status.state.as_str(),
                    "fail_reason": status.last_failure,
                    "retries": status.retries,
                }))
            }
            cmd => ConfigResponse::err(format!("unknown command: {cmd}")),
        }
    }
}

impl EndpointHandler for ConfigHandler {
    fn handle(&self, _session_id: SessionId, request: &[u8]) -> Result<Vec<u8>, HandlerError> {
        let response = self.run(request);
        let bytes = serde_json::to_vec(&response).map_err(|e| HandlerErrorKind::Other(e.to_string()))?;
        owned(&bytes)
    }
}
