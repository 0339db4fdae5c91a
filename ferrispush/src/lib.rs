//! # Ferrispush
//!
//! Concurrent configuration and command push to network devices.
//!
//! Ferrispush takes one payload (a command, a configuration snippet, or one
//! configuration per device) and pushes it to many devices at once through
//! a bounded pool of async workers. Every target ends up with exactly one
//! outcome, a result or a failure, and one unreachable device never stops
//! the rest of the batch.
//!
//! ## Features
//!
//! - Bounded worker pool on tokio
//! - Per-vendor device sessions behind a single async trait
//! - Prompt-driven shell sessions over SSH via russh
//! - Canary mode: validate configuration without committing it
//! - Scripted channel emulator for testing device code without hardware
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use ferrispush::{push_batch, BatchConfig, BatchPayload, ShellProfile, VendorRegistry};
//! use ferrispush::device::shell_factory;
//! use ferrispush::transport::{SshConfig, SshConnector};
//! use secrecy::SecretString;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), ferrispush::Error> {
//!     let mut registry = VendorRegistry::new();
//!     registry.register_factory(
//!         "generic",
//!         shell_factory(ShellProfile::generic(), |_| SshConnector::new(SshConfig::default())),
//!     )?;
//!
//!     let config = BatchConfig {
//!         targets: vec!["192.168.1.1".into(), "192.168.1.2".into()],
//!         vendor: "generic".into(),
//!         user: Some("admin".into()),
//!         workers: 10,
//!         ..Default::default()
//!     };
//!
//!     let report = push_batch(
//!         &config,
//!         BatchPayload::Command("show version".into()),
//!         &registry,
//!         SecretString::from("secret".to_string()),
//!     )
//!     .await?;
//!
//!     print!("{}", report.render("show version", true));
//!     Ok(())
//! }
//! ```

pub mod channel;
pub mod device;
pub mod error;
pub mod push;
pub mod transport;

// Re-export main types for convenience
pub use channel::{Channel, ScriptedChannel, ScriptedClient};
pub use device::{ConfigResponse, Device, DeviceFactory, ShellDevice, ShellProfile, VendorRegistry};
pub use error::{Error, PushError};
pub use push::{
    BatchConfig, BatchPayload, Credentials, FailureRecord, PushOptions, PushReport, PushResult,
    Pusher, RunMode, Task, push_batch,
};
pub use transport::{Connector, SshConfig, SshConnector};
