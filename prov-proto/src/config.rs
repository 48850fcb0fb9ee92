//! `prov-config` records
//!
//! Requests use the `{cmd, args}` shape, responses `{ok, data, error}`.

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

/// Longest SSID accepted, in bytes
pub const MAX_SSID_LEN: usize = 32;

/// Longest passphrase accepted, in bytes
pub const MAX_PASSWORD_LEN: usize = 64;

/// Network credentials handed to the station. Never persisted by the core.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub ssid: String,
    pub password: String,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("ssid", &self.ssid)
            .field("password", &"***")
            .finish()
    }
}

/// `args` of the `set` command
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WifiConfig {
    pub ssid: String,
    #[serde(default)]
    pub password: String,
}

impl WifiConfig {
    /// Checks the length bounds and produces credentials
    pub fn into_credentials(self) -> Result<Credentials, String> {
        if self.ssid.is_empty() || self.ssid.len() > MAX_SSID_LEN {
            return Err(format!("ssid must be 1..={MAX_SSID_LEN} bytes"));
        }
        if self.password.len() > MAX_PASSWORD_LEN {
            return Err(format!("password must be at most {MAX_PASSWORD_LEN} bytes"));
        }
        Ok(Credentials { ssid: self.ssid, password: self.password })
    }
}

/// Request message format
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigRequest {
    pub cmd: String,
    #[serde(default)]
    pub args: JsonValue,
}

impl ConfigRequest {
    pub fn new(cmd: &str) -> Self {
        Self { cmd: cmd.to_string(), args: JsonValue::Null }
    }

    pub fn set(ssid: &str, password: &str) -> Self {
        Self {
            cmd: "set".to_string(),
            args: serde_json::json!({ "ssid": ssid, "password": password }),
        }
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        serde_json::to_vec(self).unwrap_or_default()
    }
}

/// Response message format
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigResponse {
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<JsonValue>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ConfigResponse {
    pub fn ok(data: JsonValue) -> Self {
        Self { ok: true, data: Some(data), error: None }
    }

    pub fn err(msg: impl Into<String>) -> Self {
        Self { ok: false, data: None, error: Some(msg.into()) }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn long_ssid_is_rejected() {
        let cfg = WifiConfig { ssid: "x".repeat(33), password: String::new() };
        assert!(cfg.into_credentials().is_err());
    }

    #[test]
    fn open_network_has_empty_password() {
        let cfg: WifiConfig = serde_json::from_str(r#"{"ssid":"cafe"}"#).unwrap();
        let creds = cfg.into_credentials().unwrap();
        assert_eq!(creds.ssid, "cafe");
        assert!(creds.password.is_empty());
    }

    #[test]
    fn debug_hides_password() {
        let creds = Credentials { ssid: "home".to_string(), password: "hunter22".to_string() };
        assert!(!format!("{creds:?}").contains("hunter22"));
    }
}
