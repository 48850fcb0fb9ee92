//! Provisioning MCU traits
//!
//! The provisioning core only talks to the outside world through these:
//! - `Radio` advertises the provisioning service (BLE GATT on real hardware)
//! - `Station` takes credentials and associates with the network
//! - `Storage` remembers whether the device was provisioned before
//!
//! MCU crates implement them with their own stacks; `prov-sim` has in-memory
//! versions.

pub mod ble;
pub mod storage;
pub mod wifi;

pub use ble::*;
pub use storage::*;
pub use wifi::*;
