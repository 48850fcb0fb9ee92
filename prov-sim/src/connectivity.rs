//! Connectivity: takes handoffs from the manager and reports station outcomes

use std::fmt::Display;

use log::{error, info, warn};
use tokio::sync::mpsc;

use prov_manager::{Event, EventSender, Handoff};
use prov_mcu::{Credentials, Radio, Station, Storage, WifiStatus};

pub struct Connectivity<R, W, S> {
    pub radio: R,
    pub station: W,
    pub storage: S,
    events: EventSender,
}

impl<R, W, S> Connectivity<R, W, S>
where
    R: Radio,
    R::Error: Display,
    W: Station,
    W::Error: Display,
    S: Storage,
    S::Error: Display,
{
    pub fn new(radio: R, station: W, storage: S, events: EventSender) -> Self {
        Self { radio, station, storage, events }
    }

    /// Runs until provisioning ends; hands the collaborators back
    pub async fn run(mut self, mut handoff: mpsc::UnboundedReceiver<Handoff>) -> Self {
        while let Some(h) = handoff.recv().await {
            match h {
                Handoff::Station(credentials) => self.connect(&credentials),
                Handoff::Service(service) => {
                    if let Err(e) = self.station.configure_service(&service) {
                        error!("failed to configure service: {e}");
                    }
                }
                Handoff::Finished => {
                    if let Err(e) = self.radio.stop_advertising() {
                        error!("failed to stop advertising: {e}");
                    }
                    break;
                }
            }
        }
        self
    }

    pub fn connect(&mut self, credentials: &Credentials) {
        if let Err(e) = self.station.apply(credentials) {
            error!("station rejected credentials: {e}");
            return;
        }

        match self.station.status() {
            WifiStatus::Connected => {
                if let Some(ip) = self.station.ip_info() {
                    info!("Connected with IP Address:{}", ip.ip_str());
                }
                if let Err(e) = self.storage.save_credentials(credentials) {
                    warn!("could not store credentials: {e}");
                }
                self.events.send(Event::ConnectivitySucceeded);
            }
            WifiStatus::Failed(reason) => self.events.send(Event::ConnectivityFailed(reason)),
            other => warn!("station still {other:?} after apply"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::convert::Infallible;

    use prov_mcu::FailureReason;

    use crate::device::{MemRadio, Network, SimStation};

    #[derive(Default)]
    struct Memory(Option<Credentials>);

    impl Storage for Memory {
        type Error = Infallible;

        fn load_credentials(&self) -> Result<Option<Credentials>, Infallible> {
            Ok(self.0.clone())
        }

        fn save_credentials(&mut self, credentials: &Credentials) -> Result<(), Infallible> {
            self.0 = Some(credentials.clone());
            Ok(())
        }

        fn clear(&mut self) -> Result<(), Infallible> {
            self.0 = None;
            Ok(())
        }
    }

    #[tokio::test]
    async fn reports_outcomes_and_stops() {
        let (events, mut rx) = EventSender::channel();
        let station = SimStation::new(Network { ssid: "home".to_string(), password: "secret".to_string() });
        let mut radio = MemRadio::default();
        radio.start_advertising("PROV_000000", &prov_proto::ble::SERVICE_UUID_LE).unwrap();
        let conn = Connectivity::new(radio, station, Memory::default(), events);

        let (tx, handoff) = mpsc::unbounded_channel();
        let wrong = Credentials { ssid: "home".to_string(), password: "nope".to_string() };
        let right = Credentials { ssid: "home".to_string(), password: "secret".to_string() };
        tx.send(Handoff::Station(wrong)).unwrap();
        tx.send(Handoff::Station(right.clone())).unwrap();
        tx.send(Handoff::Finished).unwrap();

        let conn = conn.run(handoff).await;
        assert_eq!(rx.recv().await, Some(Event::ConnectivityFailed(FailureReason::AuthError)));
        assert_eq!(rx.recv().await, Some(Event::ConnectivitySucceeded));
        assert_eq!(conn.storage.0, Some(right));
        assert!(conn.radio.advertising.is_none());
    }
}
