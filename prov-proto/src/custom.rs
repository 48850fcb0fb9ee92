//! Structured service credentials carried by the `custom-data` endpoint
//!
//! `{"ip": "10.0.0.2", "p": 1883, "u": "device", "pw": "secret"}`. Every key
//! is required; a missing key or a wrongly typed value means no record.
//! `p` is any JSON integer on the wire but must name a port (0..=65535).

use serde::{Deserialize, Deserializer, Serialize};

#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceCredentials {
    pub ip: String,
    #[serde(deserialize_with = "port")]
    pub p: u16,
    pub u: String,
    pub pw: String,
}

impl std::fmt::Debug for ServiceCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceCredentials")
            .field("ip", &self.ip)
            .field("p", &self.p)
            .field("u", &self.u)
            .field("pw", &"***")
            .finish()
    }
}

fn port<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u16, D::Error> {
    let p = i64::deserialize(deserializer)?;
    u16::try_from(p).map_err(|_| serde::de::Error::custom(format!("port {p} out of range")))
}

impl ServiceCredentials {
    pub fn parse(data: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_full_record() {
        let rec = ServiceCredentials::parse(br#"{"ip":"10.0.0.2","p":1883,"u":"dev","pw":"s"}"#).unwrap();
        assert_eq!(rec.ip, "10.0.0.2");
        assert_eq!(rec.p, 1883);
        assert_eq!(rec.u, "dev");
        assert_eq!(rec.pw, "s");
    }

    #[test]
    fn wrong_type_is_absent() {
        assert!(ServiceCredentials::parse(br#"{"ip":"10.0.0.2","p":"1883","u":"dev","pw":"s"}"#).is_err());
        assert!(ServiceCredentials::parse(br#"{"ip":1,"p":1883,"u":"dev","pw":"s"}"#).is_err());
    }

    #[test]
    fn missing_key_is_absent() {
        assert!(ServiceCredentials::parse(br#"{"ip":"10.0.0.2","p":1883,"u":"dev"}"#).is_err());
    }

    #[test]
    fn port_out_of_range_is_absent() {
        let err = ServiceCredentials::parse(br#"{"ip":"h","p":-1,"u":"dev","pw":"s"}"#).unwrap_err();
        assert!(err.to_string().contains("port -1 out of range"));
        let err = ServiceCredentials::parse(br#"{"ip":"h","p":70000,"u":"dev","pw":"s"}"#).unwrap_err();
        assert!(err.to_string().contains("port 70000 out of range"));
        let rec = ServiceCredentials::parse(br#"{"ip":"h","p":65535,"u":"dev","pw":"s"}"#).unwrap();
        assert_eq!(rec.p, 65535);
    }
}
