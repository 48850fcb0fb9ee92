//! Startup check: provision, or go straight to the station

use log::info;

use prov_mcu::Storage;
use prov_proto::Credentials;

use crate::config::Config;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Boot {
    /// Nothing stored, run provisioning
    Provision,
    /// Provisioned earlier; start the station with these
    Provisioned(Credentials),
}

pub fn check<S: Storage>(config: &Config, storage: &mut S) -> Result<Boot, S::Error> {
    if config.reset_provisioned {
        info!("forgetting earlier provisioning");
        storage.clear()?;
    }

    match storage.load_credentials()? {
        Some(credentials) => {
            info!("Already provisioned, starting Wi-Fi STA");
            Ok(Boot::Provisioned(credentials))
        }
        None => {
            info!("Starting provisioning");
            Ok(Boot::Provision)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::convert::Infallible;

    #[derive(Default)]
    struct Memory(Option<Credentials>);

    impl Storage for Memory {
        type Error = Infallible;

        fn load_credentials(&self) -> Result<Option<Credentials>, Infallible> {
            Ok(self.0.clone())
        }

        fn save_credentials(&mut self, credentials: &Credentials) -> Result<(), Infallible> {
            self.0 = Some(credentials.clone());
            Ok(())
        }

        fn clear(&mut self) -> Result<(), Infallible> {
            self.0 = None;
            Ok(())
        }
    }

    fn home() -> Credentials {
        Credentials { ssid: "home".to_string(), password: "secret".to_string() }
    }

    #[test]
    fn empty_storage_provisions() {
        let mut storage = Memory::default();
        assert_eq!(check(&Config::default(), &mut storage), Ok(Boot::Provision));
    }

    #[test]
    fn stored_credentials_skip_provisioning() {
        let mut storage = Memory(Some(home()));
        assert_eq!(check(&Config::default(), &mut storage), Ok(Boot::Provisioned(home())));
    }

    #[test]
    fn reset_flag_forgets() {
        let mut storage = Memory(Some(home()));
        let config = Config { reset_provisioned: true, ..Config::default() };
        assert_eq!(check(&config, &mut storage), Ok(Boot::Provision));
        assert!(!storage.is_provisioned().unwrap());
    }
}
