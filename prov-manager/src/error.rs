use prov_proto::SessionId;

/// Errors surfaced by the registry and by `dispatch`
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Error {
    #[error("endpoint already registered: {0}")]
    DuplicateEndpoint(String),
    #[error("endpoint name longer than {max} bytes: {0}", max = prov_proto::MAX_ENDPOINT_NAME)]
    EndpointNameTooLong(String),
    #[error("unknown endpoint: {0}")]
    UnknownEndpoint(String),
    #[error("session {0} is not ready")]
    SessionNotReady(SessionId),
    #[error("invalid security parameters")]
    InvalidSecurityParams,
    #[error("incorrect username and/or PoP")]
    CredentialsMismatch,
    #[error("system out of memory")]
    OutOfMemory,
    #[error("handler failed: {0}")]
    Handler(HandlerErrorKind),
}

/// What went wrong inside an endpoint handler
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum HandlerErrorKind {
    #[error("{0}")]
    Other(String),
}

/// Error returned by an endpoint handler
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum HandlerError {
    #[error("system out of memory")]
    OutOfMemory,
    #[error(transparent)]
    Failed(#[from] HandlerErrorKind),
}

impl From<HandlerError> for Error {
    fn from(e: HandlerError) -> Self {
        match e {
            HandlerError::OutOfMemory => Error::OutOfMemory,
            HandlerError::Failed(kind) => Error::Handler(kind),
        }
    }
}

impl From<std::collections::TryReserveError> for HandlerError {
    fn from(_: std::collections::TryReserveError) -> Self {
        HandlerError::OutOfMemory
    }
}

/// Errors from the security handshake
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum SecurityError {
    #[error("received invalid security parameters for establishing secure session")]
    InvalidSecurityParams,
    #[error("received incorrect username and/or PoP for establishing secure session")]
    CredentialsMismatch,
    #[error("no active session {0}")]
    NoSession(SessionId),
}

impl From<SecurityError> for Error {
    fn from(e: SecurityError) -> Self {
        match e {
            SecurityError::InvalidSecurityParams => Error::InvalidSecurityParams,
            SecurityError::CredentialsMismatch => Error::CredentialsMismatch,
            SecurityError::NoSession(id) => Error::SessionNotReady(id),
        }
    }
}

/// Errors loading or validating configuration
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse config: {0}")]
    Json(#[from] serde_json::Error),
    #[error("invalid config: {0}")]
    Invalid(String),
}
