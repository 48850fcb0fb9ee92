//! Typed events consumed by the lifecycle, and what leaves the core

use std::fmt;

use log::warn;
use tokio::sync::mpsc;

use prov_mcu::FailureReason;
use prov_proto::{Credentials, ServiceCredentials, SessionId};

use crate::error::SecurityError;
use crate::lifecycle::ProvisioningState;

/// Everything that can move the provisioning state machine
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    /// Provisioning service activated
    Start,
    TransportConnected(SessionId),
    TransportDisconnected(SessionId),
    SessionEstablished(SessionId),
    SessionFailed(SessionId, SecurityError),
    CredentialsReceived(Credentials),
    ConnectivitySucceeded,
    ConnectivityFailed(FailureReason),
    RetryAvailable,
    RetryExhausted,
    ReprovisionRequested,
    Finalize,
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Event::Start => write!(f, "start"),
            Event::TransportConnected(id) => write!(f, "transport_connected({id})"),
            Event::TransportDisconnected(id) => write!(f, "transport_disconnected({id})"),
            Event::SessionEstablished(id) => write!(f, "session_established({id})"),
            Event::SessionFailed(id, e) => write!(f, "session_failed({id}, {e:?})"),
            Event::CredentialsReceived(c) => write!(f, "credentials_received({})", c.ssid),
            Event::ConnectivitySucceeded => write!(f, "connectivity_succeeded"),
            Event::ConnectivityFailed(r) => write!(f, "connectivity_failed({r:?})"),
            Event::RetryAvailable => write!(f, "retry_available"),
            Event::RetryExhausted => write!(f, "retry_exhausted"),
            Event::ReprovisionRequested => write!(f, "reprovision_requested"),
            Event::Finalize => write!(f, "finalize"),
        }
    }
}

/// Cloneable handle for queueing events to the manager's event loop
#[derive(Debug, Clone)]
pub struct EventSender(mpsc::UnboundedSender<Event>);

impl EventSender {
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<Event>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self(tx), rx)
    }

    /// Queue an event; never blocks
    pub fn send(&self, event: Event) {
        if let Err(e) = self.0.send(event) {
            warn!("event loop is gone, dropping {}", e.0);
        }
    }
}

/// Data handed to the connectivity layer
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Handoff {
    /// Station credentials, at the `credentials_received` transition
    Station(Credentials),
    /// Application service record parsed by a structured-credential endpoint
    Service(ServiceCredentials),
    /// Provisioning ended; radio resources can be released
    Finished,
}

#[derive(Debug, Clone)]
pub struct HandoffSender(mpsc::UnboundedSender<Handoff>);

impl HandoffSender {
    pub fn new(tx: mpsc::UnboundedSender<Handoff>) -> Self {
        Self(tx)
    }

    pub fn send(&self, handoff: Handoff) {
        if self.0.send(handoff).is_err() {
            warn!("connectivity layer is gone, dropping handoff");
        }
    }
}

/// Published after every processed event
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Status {
    pub state: ProvisioningState,
    pub last_failure: Option<FailureReason>,
    pub retries: u32,
}

impl Default for Status {
    fn default() -> Self {
        Self { state: ProvisioningState::Idle, last_failure: None, retries: 0 }
    }
}
