//! Provisioning configuration
//!
//! Loaded from a JSON file; every field has a default matching the stock
//! firmware build (no security, reset on failure after 5 retries, no
//! re-provisioning, two custom endpoints).

use std::collections::HashSet;
use std::num::NonZeroU32;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Security level of the provisioning session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SecurityLevel {
    /// No handshake, sessions are ready as soon as the transport connects
    #[default]
    None,
    /// Proof-of-possession handshake
    Secured,
}

impl SecurityLevel {
    pub fn sec_ver(&self) -> u8 {
        match self {
            SecurityLevel::None => 0,
            SecurityLevel::Secured => 1,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SecurityConfig {
    pub level: SecurityLevel,
    /// Proof of possession, required for `secured`
    pub pop: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Reset the state machine after `max_retries` connection failures
    pub reset_on_failure: bool,
    pub max_retries: u32,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self { reset_on_failure: true, max_retries: 5 }
    }
}

/// Built-in handler shapes an application endpoint can be bound to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum HandlerKind {
    /// Answers a fixed response depending on whether the input encodes `0`
    Diagnostic,
    /// Parses `{ip, p, u, pw}` and hands it to the station
    ServiceCredentials,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EndpointConfig {
    pub name: String,
    pub handler: HandlerKind,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub security: SecurityConfig,
    pub retry: RetryConfig,
    /// Keep the manager alive after success so provisioning can run again
    pub reprovision: bool,
    /// Forget earlier provisioning at startup
    pub reset_provisioned: bool,
    /// Advertised name; derived from the station MAC when absent
    pub service_name: Option<String>,
    pub endpoints: Vec<EndpointConfig>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            security: SecurityConfig::default(),
            retry: RetryConfig::default(),
            reprovision: false,
            reset_provisioned: false,
            service_name: None,
            endpoints: vec![
                EndpointConfig { name: "ble_transmit".to_string(), handler: HandlerKind::Diagnostic },
                EndpointConfig { name: "custom-data".to_string(), handler: HandlerKind::ServiceCredentials },
            ],
        }
    }
}

impl Config {
    /// Read, parse and validate a config file
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let data = std::fs::read_to_string(path)?;
        Self::from_json(&data)
    }

    pub fn from_json(data: &str) -> Result<Self, ConfigError> {
        let config: Config = serde_json::from_str(data)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.retry.reset_on_failure && self.retry.max_retries == 0 {
            return Err(ConfigError::Invalid("retry.max_retries must be at least 1".to_string()));
        }

        if self.security.level == SecurityLevel::Secured
            && self.security.pop.as_deref().is_none_or(str::is_empty)
        {
            return Err(ConfigError::Invalid("secured sessions need a non-empty pop".to_string()));
        }

        let mut seen = HashSet::new();
        for ep in &self.endpoints {
            if ep.name.is_empty() || ep.name.len() > prov_proto::MAX_ENDPOINT_NAME {
                return Err(ConfigError::Invalid(format!(
                    "endpoint name must be 1 to {} bytes: {:?}",
                    prov_proto::MAX_ENDPOINT_NAME,
                    ep.name
                )));
            }
            if prov_proto::ble::endpoints::is_reserved(&ep.name) {
                return Err(ConfigError::Invalid(format!("endpoint name is reserved: {}", ep.name)));
            }
            if !seen.insert(ep.name.as_str()) {
                return Err(ConfigError::Invalid(format!("endpoint listed twice: {}", ep.name)));
            }
        }

        Ok(())
    }

    /// Failures tolerated before a full reset; `None` disables the policy
    pub fn retry_threshold(&self) -> Option<NonZeroU32> {
        if self.retry.reset_on_failure {
            NonZeroU32::new(self.retry.max_retries)
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_object_is_default() {
        assert_eq!(Config::from_json("{}").unwrap(), Config::default());
    }

    #[test]
    fn threshold() {
        let mut config = Config::default();
        assert_eq!(config.retry_threshold(), NonZeroU32::new(5));
        config.retry.reset_on_failure = false;
        assert_eq!(config.retry_threshold(), None);
    }

    #[test]
    fn zero_retries_rejected() {
        let err = Config::from_json(r#"{"retry": {"max_retries": 0}}"#).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn zero_retries_allowed_when_policy_off() {
        let config = Config::from_json(r#"{"retry": {"reset_on_failure": false, "max_retries": 0}}"#).unwrap();
        assert_eq!(config.retry_threshold(), None);
    }

    #[test]
    fn secured_needs_pop() {
        assert!(Config::from_json(r#"{"security": {"level": "secured"}}"#).is_err());
        assert!(Config::from_json(r#"{"security": {"level": "secured", "pop": ""}}"#).is_err());
        let config = Config::from_json(r#"{"security": {"level": "secured", "pop": "abcd1234"}}"#).unwrap();
        assert_eq!(config.security.level.sec_ver(), 1);
    }

    #[test]
    fn reserved_and_duplicate_endpoints_rejected() {
        assert!(Config::from_json(r#"{"endpoints": [{"name": "prov-config", "handler": "diagnostic"}]}"#).is_err());
        assert!(Config::from_json(
            r#"{"endpoints": [
                {"name": "a", "handler": "diagnostic"},
                {"name": "a", "handler": "service-credentials"}
            ]}"#
        )
        .is_err());
    }

    #[test]
    fn endpoint_name_length_checked() {
        let long = "e".repeat(prov_proto::MAX_ENDPOINT_NAME + 1);
        let json = format!(r#"{{"endpoints": [{{"name": "{long}", "handler": "diagnostic"}}]}}"#);
        assert!(matches!(Config::from_json(&json), Err(ConfigError::Invalid(_))));
        assert!(Config::from_json(r#"{"endpoints": [{"name": "", "handler": "diagnostic"}]}"#).is_err());
    }
}
