//! BLE GATT Service Constants for WiFi Provisioning
//!
//! This module defines the service UUID, the endpoint names exposed as GATT
//! characteristics, and how the advertised device name is derived.

/// Custom 128-bit provisioning service UUID, LSB first as it goes on air.
///
/// Each endpoint becomes a characteristic built from this base with auto
/// assigned 12th and 13th bytes; clients identify endpoints by reading the
/// User Characteristic Description descriptor (0x2901).
pub const SERVICE_UUID_LE: [u8; 16] = [
    0xb4, 0xdf, 0x5a, 0x1c, 0x3f, 0x6b, 0xf4, 0xbf, 0xea, 0x4a, 0x82, 0x03, 0x04, 0x90, 0x1a, 0x02,
];

/// Prefix of the advertised device name
pub const SERVICE_NAME_PREFIX: &str = "PROV_";

/// Provisioning protocol version reported by `proto-ver`
pub const PROTO_VERSION: &str = "v1.1";

/// Protocol endpoints, always present
pub mod endpoints {
    /// Security handshake
    pub const SESSION: &str = "prov-session";

    /// WiFi configuration: set, apply, status
    pub const CONFIG: &str = "prov-config";

    /// Version and capabilities
    pub const VERSION: &str = "proto-ver";

    /// All protocol endpoint names
    pub const ALL: [&str; 3] = [SESSION, CONFIG, VERSION];

    /// Returns true if `name` is reserved by the protocol
    pub fn is_reserved(name: &str) -> bool {
        ALL.contains(&name)
    }
}

/// Service UUID in canonical (MSB first) form
pub fn service_uuid() -> uuid::Uuid {
    let mut be = SERVICE_UUID_LE;
    be.reverse();
    uuid::Uuid::from_bytes(be)
}

/// Device name advertised over BLE: `PROV_` + last three MAC bytes in hex
pub fn service_name(mac: &[u8; 6]) -> String {
    format!(
        "{}{}",
        SERVICE_NAME_PREFIX,
        data_encoding::HEXUPPER.encode(&mac[3..])
    )
}
