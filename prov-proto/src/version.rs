//! `proto-ver` record

use serde::{Deserialize, Serialize};

/// `{"prov": {"ver": "v1.1", "sec_ver": 0, "cap": ["no_sec"]}}`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionInfo {
    pub prov: ProvVersion,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProvVersion {
    pub ver: String,
    pub sec_ver: u8,
    #[serde(default)]
    pub cap: Vec<String>,
}

impl VersionInfo {
    pub fn new(sec_ver: u8) -> Self {
        let mut cap = Vec::new();
        if sec_ver == 0 {
            cap.push("no_sec".to_string());
        }
        Self {
            prov: ProvVersion {
                ver: crate::ble::PROTO_VERSION.to_string(),
                sec_ver,
                cap,
            },
        }
    }
}
