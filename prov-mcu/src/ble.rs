//! Radio traits for the provisioning transport
//!
//! Protocol constants (service UUID, endpoint names) are in prov_proto::ble.

pub use prov_proto::ble::{endpoints, service_name, service_uuid, SERVICE_UUID_LE};
pub use prov_proto::SessionId;

/// Transport level event delivered by the radio
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkEvent {
    /// A companion app connected; a fresh session id was assigned
    Connected(SessionId),
    /// The companion app went away
    Disconnected(SessionId),
}

/// Trait for the radio carrying provisioning endpoints
///
/// MCU-specific crates implement this trait using their BLE stack.
pub trait Radio {
    /// Error type for radio operations
    type Error;

    /// Start advertising the provisioning service under `device_name`
    fn start_advertising(&mut self, device_name: &str, service_uuid: &[u8; 16]) -> Result<(), Self::Error>;

    /// Stop advertising and release the radio
    fn stop_advertising(&mut self) -> Result<(), Self::Error>;

    /// Expose an endpoint as a characteristic
    fn add_endpoint(&mut self, name: &str) -> Result<(), Self::Error>;
}
