//! Device capability contract.
//!
//! Every vendor implementation exposes the same four operations:
//! connect, run a command, apply configuration and disconnect. How each
//! one is spoken on the wire is the implementation's business; the push
//! orchestrator only sees this trait.

mod registry;
pub mod shell;

pub use registry::VendorRegistry;
pub use shell::{ShellDevice, ShellProfile, shell_factory};

use std::sync::Arc;

use async_trait::async_trait;
use secrecy::SecretString;

use crate::error::{ApplyConfigError, CommandError, ConnectError};

/// Destination used when none is given.
pub const RUNNING_CONFIG: &str = "running-config";

/// Constructs a device session bound to one target.
pub type DeviceFactory = Arc<dyn Fn(&str) -> Box<dyn Device> + Send + Sync>;

/// Outcome of a successful configuration push.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigResponse {
    /// Everything the device printed while the configuration was applied.
    pub transcript: String,

    /// Whether the change was committed (false in canary mode).
    pub committed: bool,
}

impl ConfigResponse {
    /// Create a new config response.
    pub fn new(transcript: impl Into<String>, committed: bool) -> Self {
        Self {
            transcript: transcript.into(),
            committed,
        }
    }
}

/// Trait for vendor device sessions.
///
/// One instance serves one target for one session; it is never shared
/// between workers.
#[async_trait]
pub trait Device: Send {
    /// The target this session is bound to.
    fn host(&self) -> &str;

    /// Establish the session.
    async fn connect(&mut self, username: &str, password: &SecretString)
    -> Result<(), ConnectError>;

    /// Run a command and return its output.
    async fn run_command(&mut self, command: &str) -> Result<String, CommandError>;

    /// Apply configuration `data` to `destination`.
    ///
    /// With `canary`, the device must validate the change without
    /// committing it.
    async fn apply_config(
        &mut self,
        destination: &str,
        data: &str,
        canary: bool,
    ) -> Result<ConfigResponse, ApplyConfigError>;

    /// Tear the session down. Best-effort.
    async fn disconnect(&mut self) -> Result<(), ConnectError>;
}
