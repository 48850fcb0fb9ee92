//! Companion app: the phone side of the provisioning link

use anyhow::{bail, Context};
use log::info;
use tokio::io::{AsyncRead, AsyncWrite};

use prov_manager::SecurityLevel;
use prov_proto::async_io::{read_frame, write_frame};
use prov_proto::config::{ConfigRequest, ConfigResponse};
use prov_proto::sec::{self, SessionCmd, SessionResp, NONCE_LEN};
use prov_proto::{ble::endpoints, Frame, Request, Response, SessionId, VersionInfo, MSG_RESPONSE, RESP_OK};

pub struct Companion<S> {
    stream: S,
    session_id: SessionId,
}

impl<S: AsyncRead + AsyncWrite + Unpin> Companion<S> {
    pub async fn connect(mut stream: S, session_id: SessionId) -> std::io::Result<Self> {
        write_frame(&mut stream, &Frame::connect(session_id)).await?;
        Ok(Self { stream, session_id })
    }

    /// Open a new session on the same link
    pub async fn reconnect(&mut self, session_id: SessionId) -> std::io::Result<()> {
        write_frame(&mut self.stream, &Frame::connect(session_id)).await?;
        self.session_id = session_id;
        Ok(())
    }

    pub async fn disconnect(mut self) -> std::io::Result<()> {
        write_frame(&mut self.stream, &Frame::disconnect(self.session_id)).await
    }

    /// Write `payload` to `endpoint` and wait for the answer
    pub async fn request(&mut self, endpoint: &str, payload: &[u8]) -> anyhow::Result<Vec<u8>> {
        let request = Request {
            session_id: self.session_id,
            endpoint: endpoint.to_string(),
            payload: payload.to_vec(),
        };
        write_frame(&mut self.stream, &Frame::request(&request)?).await?;

        let frame = read_frame(&mut self.stream).await?;
        if frame.msg_type != MSG_RESPONSE {
            bail!("expected RESPONSE, got message type 0x{:04x}", frame.msg_type);
        }
        let response = Response::from_bytes(&frame.payload)?;
        if response.status != RESP_OK {
            bail!(
                "{endpoint} failed (status {}): {}",
                response.status,
                String::from_utf8_lossy(&response.payload)
            );
        }
        Ok(response.payload)
    }

    pub async fn version(&mut self) -> anyhow::Result<VersionInfo> {
        let out = self.request(endpoints::VERSION, b"").await?;
        serde_json::from_slice(&out).context("malformed proto-ver response")
    }

    /// Run the `prov-session` handshake for `level`
    pub async fn establish(&mut self, level: SecurityLevel, pop: Option<&str>) -> anyhow::Result<()> {
        match level {
            SecurityLevel::None => {
                let out = self.request(endpoints::SESSION, &SessionCmd::Hello.to_bytes()).await?;
                let resp = SessionResp::from_bytes(&out)?;
                if resp.status() != sec::STATUS_OK {
                    bail!("session hello rejected (status {})", resp.status());
                }
            }
            SecurityLevel::Secured => {
                let pop = pop.context("device wants a proof of possession")?.as_bytes();
                let client_nonce: [u8; NONCE_LEN] = rand::random();

                let out = self.request(endpoints::SESSION, &SessionCmd::Cmd0 { client_nonce }.to_bytes()).await?;
                let SessionResp::Resp0 { status: sec::STATUS_OK, device_nonce } = SessionResp::from_bytes(&out)? else {
                    bail!("session step 0 rejected");
                };

                let client_verify = sec::proof(pop, &device_nonce, &client_nonce);
                let out = self.request(endpoints::SESSION, &SessionCmd::Cmd1 { client_verify }.to_bytes()).await?;
                match SessionResp::from_bytes(&out)? {
                    SessionResp::Resp1 { status: sec::STATUS_OK, device_verify } => {
                        if device_verify != sec::proof(pop, &client_nonce, &device_nonce) {
                            bail!("device could not prove possession");
                        }
                    }
                    resp => bail!("session step 1 rejected (status {})", resp.status()),
                }
            }
        }
        info!("session {} established", self.session_id);
        Ok(())
    }

    /// Send `input` to a diagnostic endpoint; returns the text answer
    pub async fn diagnostic(&mut self, endpoint: &str, input: &[u8]) -> anyhow::Result<String> {
        let out = self.request(endpoint, input).await?;
        Ok(text(&out))
    }

    pub async fn config(&mut self, request: ConfigRequest) -> anyhow::Result<ConfigResponse> {
        let out = self.request(endpoints::CONFIG, &request.to_bytes()).await?;
        let response: ConfigResponse = serde_json::from_slice(&out).context("malformed prov-config response")?;
        if !response.ok {
            bail!(
                "prov-config {} failed: {}",
                request.cmd,
                response.error.as_deref().unwrap_or("unknown error")
            );
        }
        Ok(response)
    }

    /// `set` followed by `apply`
    pub async fn send_credentials(&mut self, ssid: &str, password: &str) -> anyhow::Result<()> {
        self.config(ConfigRequest::set(ssid, password)).await?;
        self.config(ConfigRequest::new("apply")).await?;
        Ok(())
    }
}

/// Text up to the first NUL
pub fn text(bytes: &[u8]) -> String {
    let end = bytes.iter().position(|&b| b == 0).unwrap_or(bytes.len());
    String::from_utf8_lossy(&bytes[..end]).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use tokio::sync::mpsc;

    use prov_manager::{Config, Handoff, Manager, ProvisioningState, SecurityConfig};

    use crate::link::LinkSession;

    async fn device(config: Config) -> (Arc<Manager>, Companion<tokio::io::DuplexStream>) {
        let (tx, _handoff) = mpsc::unbounded_channel::<Handoff>();
        let (manager, mut event_loop) = Manager::new(config, tx).unwrap();
        manager.start();
        event_loop.drain();
        tokio::spawn(event_loop.run());

        let (device_end, app_end) = tokio::io::duplex(4096);
        tokio::spawn(LinkSession::new(device_end, manager.clone()).run());
        let app = Companion::connect(app_end, 1).await.unwrap();
        (manager, app)
    }

    #[test]
    fn text_stops_at_nul() {
        assert_eq!(text(b"SUCCESS\0"), "SUCCESS");
        assert_eq!(text(b"abc"), "abc");
        assert_eq!(text(b""), "");
    }

    #[tokio::test]
    async fn open_session_over_link() {
        let (manager, mut app) = device(Config::default()).await;
        app.establish(SecurityLevel::None, None).await.unwrap();

        let version = app.version().await.unwrap();
        assert_eq!(version.prov.sec_ver, 0);
        assert_eq!(
            app.diagnostic("ble_transmit", b"0").await.unwrap(),
            "0xFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFF"
        );

        let err = app.request("nope", b"").await.unwrap_err();
        assert!(err.to_string().contains("status 1"));

        let mut status = manager.subscribe();
        status.wait_for(|s| s.state == ProvisioningState::SessionEstablished).await.unwrap();
        app.disconnect().await.unwrap();
        status.wait_for(|s| s.state == ProvisioningState::SessionEstablishing).await.unwrap();
    }

    #[tokio::test]
    async fn secured_session_over_link() {
        let config = Config {
            security: SecurityConfig { level: SecurityLevel::Secured, pop: Some("abcd1234".to_string()) },
            ..Config::default()
        };
        let (_manager, mut app) = device(config).await;

        let err = app.diagnostic("ble_transmit", b"0").await.unwrap_err();
        assert!(err.to_string().contains("status 2"));

        app.establish(SecurityLevel::Secured, Some("abcd1234")).await.unwrap();
        assert!(app.diagnostic("ble_transmit", b"1").await.is_ok());
    }

    #[tokio::test]
    async fn stray_handshake_keeps_session() {
        let (_manager, mut app) = device(Config::default()).await;
        app.establish(SecurityLevel::None, None).await.unwrap();

        let out = app.request(endpoints::SESSION, &[sec::SEC1_CMD0]).await.unwrap();
        assert_eq!(SessionResp::from_bytes(&out).unwrap().status(), sec::STATUS_INVALID_PARAMS);
        assert!(app.diagnostic("ble_transmit", b"0").await.is_ok());
    }

    #[tokio::test]
    async fn wrong_pop_is_refused() {
        let config = Config {
            security: SecurityConfig { level: SecurityLevel::Secured, pop: Some("abcd1234".to_string()) },
            ..Config::default()
        };
        let (_manager, mut app) = device(config).await;
        assert!(app.establish(SecurityLevel::Secured, Some("guess")).await.is_err());
    }
}
