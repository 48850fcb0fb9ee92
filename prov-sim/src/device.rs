//! Simulated device collaborators: radio, station and persistent storage

use std::convert::Infallible;
use std::io;
use std::path::PathBuf;

use log::{info, warn};

use prov_mcu::{Credentials, FailureReason, IpInfo, Radio, ServiceCredentials, Station, Storage, WifiStatus};
use prov_proto::WifiConfig;

/// Radio that only records what it was asked to do
#[derive(Debug, Default)]
pub struct MemRadio {
    pub advertising: Option<String>,
    pub endpoints: Vec<String>,
}

impl Radio for MemRadio {
    type Error = Infallible;

    fn start_advertising(&mut self, device_name: &str, service_uuid: &[u8; 16]) -> Result<(), Infallible> {
        info!("advertising {device_name} (service uuid, little endian: {service_uuid:02x?})");
        self.advertising = Some(device_name.to_string());
        Ok(())
    }

    fn stop_advertising(&mut self) -> Result<(), Infallible> {
        if let Some(name) = self.advertising.take() {
            info!("stopped advertising {name}");
        }
        Ok(())
    }

    fn add_endpoint(&mut self, name: &str) -> Result<(), Infallible> {
        self.endpoints.push(name.to_string());
        Ok(())
    }
}

/// The access point the simulated station can see
#[derive(Debug, Clone)]
pub struct Network {
    pub ssid: String,
    pub password: String,
}

/// Station that associates instantly against a single `Network`
#[derive(Debug)]
pub struct SimStation {
    network: Network,
    mac: [u8; 6],
    status: WifiStatus,
    service: Option<ServiceCredentials>,
}

impl SimStation {
    pub fn new(network: Network) -> Self {
        let mut mac: [u8; 6] = rand::random();
        // locally administered, unicast
        mac[0] = (mac[0] | 0x02) & 0xfe;
        Self { network, mac, status: WifiStatus::Disconnected, service: None }
    }

    pub fn service(&self) -> Option<&ServiceCredentials> {
        self.service.as_ref()
    }
}

impl Station for SimStation {
    type Error = Infallible;

    fn mac(&self) -> [u8; 6] {
        self.mac
    }

    fn apply(&mut self, credentials: &Credentials) -> Result<(), Infallible> {
        self.status = if credentials.ssid != self.network.ssid {
            WifiStatus::Failed(FailureReason::PeerNotFound)
        } else if credentials.password != self.network.password {
            WifiStatus::Failed(FailureReason::AuthError)
        } else {
            WifiStatus::Connected
        };
        Ok(())
    }

    fn configure_service(&mut self, service: &ServiceCredentials) -> Result<(), Infallible> {
        self.service = Some(service.clone());
        Ok(())
    }

    fn status(&self) -> WifiStatus {
        self.status
    }

    fn ip_info(&self) -> Option<IpInfo> {
        self.is_connected().then_some(IpInfo {
            ip: [192, 168, 4, 2],
            gateway: [192, 168, 4, 1],
            netmask: [255, 255, 255, 0],
        })
    }
}

/// Credentials kept as JSON in a file under `PROV_HOME`
#[derive(Debug)]
pub struct FileStorage {
    path: PathBuf,
}

impl FileStorage {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }
}

impl Storage for FileStorage {
    type Error = io::Error;

    fn load_credentials(&self) -> io::Result<Option<Credentials>> {
        let data = match std::fs::read_to_string(&self.path) {
            Ok(data) => data,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e),
        };
        let stored: WifiConfig = serde_json::from_str(&data).map_err(io::Error::other)?;
        match stored.into_credentials() {
            Ok(credentials) => Ok(Some(credentials)),
            Err(e) => {
                warn!("ignoring stored credentials in {}: {e}", self.path.display());
                Ok(None)
            }
        }
    }

    fn save_credentials(&mut self, credentials: &Credentials) -> io::Result<()> {
        if let Some(dir) = self.path.parent() {
            std::fs::create_dir_all(dir)?;
        }
        let stored = WifiConfig { ssid: credentials.ssid.clone(), password: credentials.password.clone() };
        let data = serde_json::to_vec_pretty(&stored).map_err(io::Error::other)?;
        std::fs::write(&self.path, data)
    }

    fn clear(&mut self) -> io::Result<()> {
        match std::fs::remove_file(&self.path) {
            Err(e) if e.kind() != io::ErrorKind::NotFound => Err(e),
            _ => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn station() -> SimStation {
        SimStation::new(Network { ssid: "home".to_string(), password: "secret".to_string() })
    }

    fn creds(ssid: &str, password: &str) -> Credentials {
        Credentials { ssid: ssid.to_string(), password: password.to_string() }
    }

    #[test]
    fn station_outcomes() {
        let mut st = station();
        st.apply(&creds("cafe", "secret")).unwrap();
        assert_eq!(st.status(), WifiStatus::Failed(FailureReason::PeerNotFound));
        st.apply(&creds("home", "wrong")).unwrap();
        assert_eq!(st.status(), WifiStatus::Failed(FailureReason::AuthError));
        assert!(st.ip_info().is_none());
        st.apply(&creds("home", "secret")).unwrap();
        assert!(st.is_connected());
        assert_eq!(st.ip_info().unwrap().ip_str(), "192.168.4.2");
    }

    #[test]
    fn mac_is_local_unicast() {
        let mac = station().mac();
        assert_eq!(mac[0] & 0x03, 0x02);
    }

    #[test]
    fn file_storage() {
        let dir = std::env::temp_dir().join(format!("prov-sim-{:08x}", rand::random::<u32>()));
        let mut storage = FileStorage::new(dir.join("credentials.json"));

        assert_eq!(storage.load_credentials().unwrap(), None);
        storage.clear().unwrap();

        storage.save_credentials(&creds("home", "secret")).unwrap();
        assert!(storage.is_provisioned().unwrap());
        assert_eq!(storage.load_credentials().unwrap(), Some(creds("home", "secret")));

        storage.clear().unwrap();
        assert!(!storage.is_provisioned().unwrap());
        std::fs::remove_dir_all(&dir).unwrap();
    }
}
