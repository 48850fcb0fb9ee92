//! Provisioning manager
//!
//! Owns the registry, the negotiator and the lifecycle. Transport callbacks,
//! handlers and the connectivity layer feed it typed events; the event loop
//! applies them one at a time under the lifecycle lock.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};

use log::{debug, info, warn};
use tokio::sync::{mpsc, watch};

use prov_proto::ble::endpoints;
use prov_proto::SessionId;

use crate::config::Config;
use crate::dispatch::Dispatcher;
use crate::error::Error;
use crate::event::{Event, EventSender, Handoff, HandoffSender, Status};
use crate::handlers::{self, ConfigHandler, SessionEndpoint, Staged, VersionHandler};
use crate::lifecycle::{Lifecycle, ProvisioningState};
use crate::registry::{EndpointHandler, EndpointRegistry};
use crate::session::{SessionNegotiator, SessionState};

pub struct Manager {
    config: Config,
    lifecycle: Mutex<Lifecycle>,
    sessions: Arc<Mutex<SessionNegotiator>>,
    registry: Arc<RwLock<EndpointRegistry>>,
    dispatcher: Dispatcher,
    staged: Staged,
    events: EventSender,
    handoff: HandoffSender,
    status: watch::Sender<Status>,
}

/// Drains queued events into the manager
pub struct EventLoop {
    manager: Arc<Manager>,
    rx: mpsc::UnboundedReceiver<Event>,
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

impl Manager {
    /// Build a manager with the protocol endpoints and the endpoints listed
    /// in `config`. Credentials leave through `handoff`.
    pub fn new(config: Config, handoff: mpsc::UnboundedSender<Handoff>) -> Result<(Arc<Self>, EventLoop), Error> {
        let (events, rx) = EventSender::channel();
        let handoff = HandoffSender::new(handoff);
        let lifecycle = Lifecycle::new(config.retry_threshold(), config.reprovision);
        let (status, status_rx) = watch::channel(lifecycle.status());

        let sessions = Arc::new(Mutex::new(SessionNegotiator::new(events.clone())));
        let registry = Arc::new(RwLock::new(EndpointRegistry::new()));
        let staged = Staged::default();

        {
            let mut reg = registry.write().unwrap_or_else(PoisonError::into_inner);
            reg.register_protocol(endpoints::SESSION, Arc::new(SessionEndpoint::new(sessions.clone())))?;
            reg.register_protocol(endpoints::VERSION, Arc::new(VersionHandler::new(config.security.level)))?;
            reg.register_protocol(
                endpoints::CONFIG,
                Arc::new(ConfigHandler::new(staged.clone(), events.clone(), status_rx)),
            )?;
        }

        let manager = Arc::new(Self {
            dispatcher: Dispatcher::new(registry.clone(), sessions.clone()),
            config,
            lifecycle: Mutex::new(lifecycle),
            sessions,
            registry,
            staged,
            events,
            handoff,
            status,
        });
        manager.register_configured()?;

        let event_loop = EventLoop { manager: manager.clone(), rx };
        Ok((manager, event_loop))
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Advertised device name
    pub fn service_name(&self, mac: &[u8; 6]) -> String {
        self.config
            .service_name
            .clone()
            .unwrap_or_else(|| prov_proto::ble::service_name(mac))
    }

    /// Handle for transport and connectivity callbacks
    pub fn events(&self) -> EventSender {
        self.events.clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<Status> {
        self.status.subscribe()
    }

    pub fn state(&self) -> ProvisioningState {
        lock(&self.lifecycle).state()
    }

    pub fn retry_count(&self) -> u32 {
        lock(&self.lifecycle).retry_count()
    }

    /// Register an application endpoint
    pub fn register(&self, name: &str, handler: Arc<dyn EndpointHandler>) -> Result<(), Error> {
        self.registry
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .register(name, handler)?;
        info!("registered endpoint '{name}'");
        Ok(())
    }

    /// Register the endpoints listed in the config (again, after a reset)
    pub fn register_configured(&self) -> Result<(), Error> {
        for ep in &self.config.endpoints {
            self.register(&ep.name, handlers::for_kind(ep.handler, &self.handoff))?;
        }
        Ok(())
    }

    /// Application endpoint names, sorted
    pub fn endpoint_names(&self) -> Vec<String> {
        self.registry.read().unwrap_or_else(PoisonError::into_inner).names()
    }

    pub fn dispatch(&self, session_id: SessionId, endpoint: &str, request: &[u8]) -> Result<Vec<u8>, Error> {
        self.dispatcher.dispatch(session_id, endpoint, request)
    }

    pub fn start(&self) {
        self.events.send(Event::Start);
    }

    /// Stop after success; queues `finalize`
    pub fn stop(&self) {
        self.events.send(Event::Finalize);
    }

    pub fn reprovision(&self) {
        if !self.config.reprovision {
            warn!("re-provisioning is disabled, request will be ignored");
        }
        self.events.send(Event::ReprovisionRequested);
    }

    /// Full teardown: `Idle`, counters cleared, session and staged
    /// credentials dropped, application endpoints unregistered.
    pub fn reset(&self) {
        let mut lifecycle = lock(&self.lifecycle);
        lifecycle.reset();
        lock(&self.sessions).clear();
        *lock(&self.staged) = None;
        self.registry.write().unwrap_or_else(PoisonError::into_inner).reset();
        self.status.send_replace(lifecycle.status());
    }

    /// Apply one event. This is the only place the lifecycle changes.
    pub fn handle_event(&self, event: Event) {
        let mut lifecycle = lock(&self.lifecycle);
        let from = lifecycle.state();

        match &event {
            Event::TransportConnected(id) => {
                info!("BLE transport: Connected! (session {id})");
                if matches!(from, ProvisioningState::Idle | ProvisioningState::Ended) {
                    warn!("provisioning is not running, ignoring connection {id}");
                    return;
                }
                if from == ProvisioningState::Failed {
                    lifecycle.apply(&Event::RetryAvailable);
                }
                let pop = self.config.security.pop.as_deref().map(str::as_bytes);
                lock(&self.sessions).begin(*id, self.config.security.level, pop);
            }
            Event::TransportDisconnected(id) => {
                info!("BLE transport: Disconnected! (session {id})");
                if !lock(&self.sessions).end(*id) {
                    debug!("dropping {event}, session is gone");
                    return;
                }
            }
            Event::SessionEstablished(id) => {
                if !lock(&self.sessions).is_current(*id) {
                    debug!("dropping {event}, session is gone");
                    return;
                }
            }
            Event::CredentialsReceived(_) if from == ProvisioningState::Failed => {
                // New attempt on the connection that is still open
                let ready = lock(&self.sessions)
                    .current()
                    .filter(|s| s.state == SessionState::Established)
                    .map(|s| s.id);
                if let Some(id) = ready {
                    lifecycle.apply(&Event::RetryAvailable);
                    lifecycle.apply(&Event::SessionEstablished(id));
                }
            }
            _ => {}
        }

        if lifecycle.apply(&event).is_some() {
            self.after_transition(from, lifecycle.state(), &event);
        }
        self.status.send_replace(lifecycle.status());
    }

    fn after_transition(&self, from: ProvisioningState, to: ProvisioningState, event: &Event) {
        match event {
            Event::Start => info!("Provisioning started"),
            Event::CredentialsReceived(creds) => {
                info!("Received Wi-Fi credentials SSID: {}", creds.ssid);
                *lock(&self.staged) = None;
                self.handoff.send(Handoff::Station(creds.clone()));
            }
            Event::ConnectivitySucceeded => {
                info!("Provisioning successful");
                if !self.config.reprovision {
                    self.events.send(Event::Finalize);
                }
            }
            Event::Finalize => {
                info!("Provisioning ended");
                lock(&self.sessions).clear();
                self.handoff.send(Handoff::Finished);
            }
            _ => {}
        }

        if to == ProvisioningState::Idle && from != ProvisioningState::Idle {
            lock(&self.sessions).clear();
            *lock(&self.staged) = None;
            info!("Re-entering provisioning");
            self.events.send(Event::Start);
        }
    }
}

impl EventLoop {
    /// Process events until provisioning ends
    pub async fn run(mut self) {
        while let Some(event) = self.rx.recv().await {
            self.manager.handle_event(event);
            if self.manager.state() == ProvisioningState::Ended {
                break;
            }
        }
    }

    /// Process whatever is queued right now; returns how many events ran
    pub fn drain(&mut self) -> usize {
        let mut n = 0;
        while let Ok(event) = self.rx.try_recv() {
            self.manager.handle_event(event);
            n += 1;
        }
        n
    }

    pub fn manager(&self) -> &Arc<Manager> {
        &self.manager
    }
}
