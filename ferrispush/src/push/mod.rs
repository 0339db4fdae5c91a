//! Concurrent push of one payload to many devices.
//!
//! A batch is a closed set of [`Task`]s drained by a fixed pool of workers.
//! Each worker takes a task, opens a [`Device`](crate::device::Device)
//! session for its target, runs the command or applies the configuration,
//! disconnects, and records exactly one outcome: a [`PushResult`] or a
//! [`FailureRecord`]. One target failing never stops the others.
//!
//! # Example
//!
//! ```rust,no_run
//! use ferrispush::device::{shell_factory, ShellProfile, VendorRegistry};
//! use ferrispush::push::{push_batch, BatchConfig, BatchPayload};
//! use ferrispush::transport::{SshConfig, SshConnector};
//! use secrecy::SecretString;
//!
//! # async fn example() -> Result<(), ferrispush::Error> {
//! let mut registry = VendorRegistry::new();
//! registry.register_factory(
//!     "generic",
//!     shell_factory(ShellProfile::generic(), |_| SshConnector::new(SshConfig::default())),
//! )?;
//!
//! let config = BatchConfig {
//!     targets: vec!["r1".into(), "r2".into()],
//!     vendor: "generic".into(),
//!     user: Some("admin".into()),
//!     ..Default::default()
//! };
//! let password = SecretString::from("secret".to_string());
//!
//! let report = push_batch(
//!     &config,
//!     BatchPayload::Command("uptime".into()),
//!     &registry,
//!     password,
//! )
//! .await?;
//! print!("{}", report.render("uptime", config.verbose));
//! # Ok(())
//! # }
//! ```

mod batch;
mod orchestrator;
mod queue;
mod report;

pub use batch::{BatchConfig, BatchPayload, BatchPlan, NamedConfig};
pub use orchestrator::{PushRun, Pusher};
pub use queue::TaskQueue;
pub use report::PushReport;

use secrecy::SecretString;

use crate::device::{RUNNING_CONFIG, VendorRegistry};
use crate::error::{PushError, Result};

/// Whether a batch runs commands or applies configuration.
///
/// Shared by every task of the batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RunMode {
    /// Run the payload as a command and collect its output.
    Command,
    /// Apply the payload as configuration.
    #[default]
    Configuration,
}

/// One unit of work: a payload for a target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Task {
    /// Hostname or IP of the device.
    pub target: String,
    /// Command or configuration text.
    pub payload: String,
}

impl Task {
    /// Create a new task.
    pub fn new(target: impl Into<String>, payload: impl Into<String>) -> Self {
        Self {
            target: target.into(),
            payload: payload.into(),
        }
    }
}

/// Output of a successfully completed task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PushResult {
    pub target: String,
    /// Command output, or the configuration transcript.
    pub output: String,
}

/// A task whose device interaction failed.
#[derive(Debug)]
pub struct FailureRecord {
    pub target: String,
    pub error: PushError,
}

/// Login shared read-only by every worker of a batch.
#[derive(Debug)]
pub struct Credentials {
    pub username: String,
    pub password: SecretString,
}

impl Credentials {
    /// Create new credentials.
    pub fn new(username: impl Into<String>, password: SecretString) -> Self {
        Self {
            username: username.into(),
            password,
        }
    }
}

/// Settings captured once per batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PushOptions {
    /// Worker pool size.
    pub workers: usize,
    /// Command or configuration.
    pub mode: RunMode,
    /// Validate configuration without committing it.
    pub canary: bool,
    /// Where configuration is applied.
    pub destination: String,
}

impl Default for PushOptions {
    fn default() -> Self {
        Self {
            workers: 20,
            mode: RunMode::default(),
            canary: false,
            destination: RUNNING_CONFIG.to_string(),
        }
    }
}

/// Plan, resolve the vendor and run a batch to completion.
pub async fn push_batch(
    config: &BatchConfig,
    payload: BatchPayload,
    registry: &VendorRegistry,
    password: SecretString,
) -> Result<PushReport> {
    let plan = config.plan(payload)?;
    let factory = registry.get(&config.vendor)?;
    let pusher = Pusher::new(factory, Credentials::new(plan.username, password), plan.options)?;
    Ok(pusher.run(plan.tasks).await)
}
