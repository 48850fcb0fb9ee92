//! WiFi provisioning core
//!
//! Drives a device from "unprovisioned" to "connected":
//! - a lifecycle state machine fed by typed events
//! - one provisioning session at a time, optionally behind a
//!   proof-of-possession handshake
//! - named endpoints carrying opaque request/response bytes
//! - a retry policy that resets the machine after repeated
//!   connection failures
//!
//! Transport and Wi-Fi station are outside this crate. They talk to the
//! core through `Manager::events()` and receive credentials as `Handoff`s.
//!
//! # Example
//! ```no_run
//! use prov_manager::{Config, Manager};
//!
//! # async fn run() -> Result<(), prov_manager::Error> {
//! let (handoff_tx, _handoff_rx) = tokio::sync::mpsc::unbounded_channel();
//! let (manager, event_loop) = Manager::new(Config::default(), handoff_tx)?;
//! manager.start();
//! event_loop.run().await;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod dispatch;
pub mod error;
pub mod event;
pub mod handlers;
pub mod lifecycle;
pub mod manager;
pub mod registry;
pub mod retry;
pub mod session;
pub mod startup;

pub use config::{Config, EndpointConfig, HandlerKind, RetryConfig, SecurityConfig, SecurityLevel};
pub use error::{ConfigError, Error, HandlerError, HandlerErrorKind, SecurityError};
pub use event::{Event, EventSender, Handoff, Status};
pub use lifecycle::ProvisioningState;
pub use manager::{EventLoop, Manager};
pub use registry::EndpointHandler;
pub use startup::Boot;
