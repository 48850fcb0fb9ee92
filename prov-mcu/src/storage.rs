//! Provisioning Storage Trait
//!
//! Persistence of earlier provisioning results lives outside the core; this is
//! the narrow view it needs at startup.

use prov_proto::Credentials;

/// Trait for persistent provisioning state
///
/// MCU-specific crates implement this trait using their storage backend
/// (NVS for ESP32, flash for Pico, etc.)
pub trait Storage {
    /// Error type for storage operations
    type Error;

    /// Stored station credentials, if the device was provisioned before
    fn load_credentials(&self) -> Result<Option<Credentials>, Self::Error>;

    /// Remember credentials that led to a successful connection
    fn save_credentials(&mut self, credentials: &Credentials) -> Result<(), Self::Error>;

    /// Forget provisioning (factory reset)
    fn clear(&mut self) -> Result<(), Self::Error>;

    /// Check if the device was provisioned before
    fn is_provisioned(&self) -> Result<bool, Self::Error> {
        Ok(self.load_credentials()?.is_some())
    }
}
