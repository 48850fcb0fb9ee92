//! WiFi Station Traits
//!
//! The station receives credentials from the provisioning core and reports
//! back whether the association worked.

use serde::{Deserialize, Serialize};

pub use prov_proto::{Credentials, ServiceCredentials};

/// Why a station could not connect with the provisioned credentials
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureReason {
    /// Station authentication failed (wrong passphrase)
    AuthError,
    /// Access point not found
    PeerNotFound,
}

impl FailureReason {
    pub fn describe(&self) -> &'static str {
        match self {
            FailureReason::AuthError => "Wi-Fi station authentication failed",
            FailureReason::PeerNotFound => "Wi-Fi access-point not found",
        }
    }
}

/// WiFi connection status
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WifiStatus {
    Disconnected,
    Connecting,
    Connected,
    Failed(FailureReason),
}

/// IP address info
#[derive(Debug, Clone)]
pub struct IpInfo {
    pub ip: [u8; 4],
    pub gateway: [u8; 4],
    pub netmask: [u8; 4],
}

impl IpInfo {
    pub fn ip_str(&self) -> String {
        format!("{}.{}.{}.{}", self.ip[0], self.ip[1], self.ip[2], self.ip[3])
    }
}

/// Trait for WiFi station operations
///
/// `apply` starts an association and returns; the outcome arrives later as a
/// status change. Implementations must not block on the connection itself.
pub trait Station {
    /// Error type for station operations
    type Error;

    /// Station MAC address, used to derive the advertised name
    fn mac(&self) -> [u8; 6];

    /// Configure credentials and start connecting
    fn apply(&mut self, credentials: &Credentials) -> Result<(), Self::Error>;

    /// Configure the application service the device reports to
    fn configure_service(&mut self, service: &ServiceCredentials) -> Result<(), Self::Error>;

    /// Get current connection status
    fn status(&self) -> WifiStatus;

    /// Get IP info (if connected)
    fn ip_info(&self) -> Option<IpInfo>;

    /// Check if connected
    fn is_connected(&self) -> bool {
        self.status() == WifiStatus::Connected
    }
}
