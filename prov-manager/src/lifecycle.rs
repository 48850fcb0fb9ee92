//! Provisioning lifecycle state machine
//!
//! ```text
//! Idle --start--> Started --transport_connected--> SessionEstablishing
//! SessionEstablishing --session_established--> SessionEstablished
//! SessionEstablishing --session_failed--> Failed
//! SessionEstablished --transport_connected--> SessionEstablishing     (prior session force-closed)
//! SessionEstablished --transport_disconnected--> SessionEstablishing  (await a new connection)
//! SessionEstablished --credentials_received--> CredentialsReceived
//! CredentialsReceived --connectivity_succeeded--> Succeeded
//! CredentialsReceived --connectivity_failed--> Failed
//! Failed --connectivity_failed--> Failed   (station still retrying)
//! Failed --retry_available--> SessionEstablishing
//! Failed --retry_exhausted--> Idle    (the manager then re-issues start)
//! Succeeded --finalize--> Ended
//! Succeeded --reprovision_requested--> Started   (re-provisioning only)
//! ```
//!
//! Anything else is ignored.

use std::num::NonZeroU32;

use log::{debug, error, info};

use prov_mcu::FailureReason;

use crate::event::{Event, Status};
use crate::retry::{RetryDecision, RetryPolicy};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ProvisioningState {
    #[default]
    Idle,
    Started,
    SessionEstablishing,
    SessionEstablished,
    CredentialsReceived,
    Succeeded,
    Failed,
    Ended,
}

impl ProvisioningState {
    /// The edge table. `None` means the event is ignored in this state.
    pub fn next(self, event: &Event, reprovision: bool) -> Option<Self> {
        use ProvisioningState::*;

        let next = match (self, event) {
            (Idle, Event::Start) => Started,
            (Started, Event::TransportConnected(_)) => SessionEstablishing,
            (SessionEstablishing, Event::SessionEstablished(_)) => SessionEstablished,
            (SessionEstablishing, Event::SessionFailed(..)) => Failed,
            (SessionEstablished, Event::TransportConnected(_) | Event::TransportDisconnected(_)) => {
                SessionEstablishing
            }
            (SessionEstablished, Event::CredentialsReceived(_)) => CredentialsReceived,
            (CredentialsReceived, Event::ConnectivitySucceeded) => Succeeded,
            (CredentialsReceived | Failed, Event::ConnectivityFailed(_)) => Failed,
            (Failed, Event::RetryAvailable) => SessionEstablishing,
            (Failed, Event::RetryExhausted) => Idle,
            (Succeeded, Event::Finalize) => Ended,
            (Succeeded, Event::ReprovisionRequested) if reprovision => Started,
            _ => return None,
        };
        Some(next)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ProvisioningState::Idle => "idle",
            ProvisioningState::Started => "started",
            ProvisioningState::SessionEstablishing => "session_establishing",
            ProvisioningState::SessionEstablished => "session_established",
            ProvisioningState::CredentialsReceived => "credentials_received",
            ProvisioningState::Succeeded => "succeeded",
            ProvisioningState::Failed => "failed",
            ProvisioningState::Ended => "ended",
        }
    }
}

/// Current state plus the retry counter; the only place either changes
#[derive(Debug, Clone)]
pub struct Lifecycle {
    state: ProvisioningState,
    retry: RetryPolicy,
    reprovision: bool,
    last_failure: Option<FailureReason>,
}

impl Lifecycle {
    pub fn new(retry_threshold: Option<NonZeroU32>, reprovision: bool) -> Self {
        Self {
            state: ProvisioningState::Idle,
            retry: RetryPolicy::new(retry_threshold),
            reprovision,
            last_failure: None,
        }
    }

    pub fn state(&self) -> ProvisioningState {
        self.state
    }

    pub fn retry_count(&self) -> u32 {
        self.retry.count()
    }

    pub fn status(&self) -> Status {
        Status {
            state: self.state,
            last_failure: self.last_failure,
            retries: self.retry.count(),
        }
    }

    /// Apply one event. Returns the resulting state if any edge was taken.
    ///
    /// A `connectivity_failed` that reaches the retry threshold also takes
    /// `retry_exhausted` in the same step, so the caller sees `Idle`.
    pub fn apply(&mut self, event: &Event) -> Option<ProvisioningState> {
        if *event == Event::ConnectivitySucceeded {
            self.retry.on_success();
        }

        let Some(next) = self.state.next(event, self.reprovision) else {
            debug!("provisioning: ignoring {event} in {:?}", self.state);
            return None;
        };
        self.enter(next, event);

        match event {
            Event::ConnectivityFailed(reason) => {
                self.last_failure = Some(*reason);
                error!(
                    "Provisioning failed! Reason: {}. Please reset to factory and retry provisioning",
                    reason.describe()
                );
                if self.retry.on_failure() == RetryDecision::Exhausted {
                    info!("Failed to connect with provisioned AP, resetting provisioned credentials");
                    self.enter(ProvisioningState::Idle, &Event::RetryExhausted);
                }
            }
            Event::RetryExhausted => self.retry.reset(),
            Event::ConnectivitySucceeded => self.last_failure = None,
            _ => {}
        }

        Some(self.state)
    }

    /// Back to `Idle` from anywhere, counters cleared
    pub fn reset(&mut self) {
        if self.state != ProvisioningState::Idle {
            info!("provisioning: {:?} -> Idle on reset", self.state);
        }
        self.state = ProvisioningState::Idle;
        self.retry.reset();
        self.last_failure = None;
    }

    fn enter(&mut self, next: ProvisioningState, event: &Event) {
        info!("provisioning: {:?} -> {:?} on {event}", self.state, next);
        self.state = next;
    }
}
