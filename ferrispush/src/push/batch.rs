//! Batch configuration and planning.

use std::path::Path;

use serde::Deserialize;

use super::{PushOptions, RunMode, Task};
use crate::device::RUNNING_CONFIG;
use crate::error::UsageError;

/// Settings for one push run.
///
/// Deserializable so a front end can load it from a file.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct BatchConfig {
    /// Hostnames or IPs.
    pub targets: Vec<String>,
    /// Appended to every target (e.g. a domain name).
    pub suffix: Option<String>,
    /// Registered vendor name.
    pub vendor: String,
    /// Login user, taken from the environment when absent.
    pub user: Option<String>,
    /// Worker pool size.
    pub workers: usize,
    /// Validate configuration without committing it.
    pub canary: bool,
    /// Where configuration is applied.
    pub destination: String,
    /// Report failure details.
    pub verbose: bool,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            targets: Vec::new(),
            suffix: None,
            vendor: String::new(),
            user: None,
            workers: 20,
            canary: false,
            destination: RUNNING_CONFIG.to_string(),
            verbose: false,
        }
    }
}

/// A configuration addressed to a single device.
///
/// The target is the base name of `file_name`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NamedConfig {
    pub file_name: String,
    pub data: String,
}

impl NamedConfig {
    /// Create a new named config.
    pub fn new(file_name: impl Into<String>, data: impl Into<String>) -> Self {
        Self {
            file_name: file_name.into(),
            data: data.into(),
        }
    }

    /// Device the configuration is addressed to.
    pub fn target(&self) -> &str {
        Path::new(&self.file_name)
            .file_name()
            .and_then(|name| name.to_str())
            .unwrap_or(&self.file_name)
    }
}

/// What a batch pushes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BatchPayload {
    /// The same command for every target.
    Command(String),
    /// The same configuration for every target.
    Config(String),
    /// One configuration per device; the devices are the targets.
    PerDevice(Vec<NamedConfig>),
}

impl BatchPayload {
    /// Mode shared by every task of the batch.
    pub fn mode(&self) -> RunMode {
        match self {
            Self::Command(_) => RunMode::Command,
            Self::Config(_) | Self::PerDevice(_) => RunMode::Configuration,
        }
    }

    /// Check if there is nothing to push.
    pub fn is_empty(&self) -> bool {
        match self {
            Self::Command(text) | Self::Config(text) => text.trim().is_empty(),
            Self::PerDevice(configs) => configs.is_empty(),
        }
    }
}

/// A validated batch, ready to hand to a [`Pusher`](super::Pusher).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchPlan {
    pub tasks: Vec<Task>,
    pub options: PushOptions,
    pub username: String,
}

impl BatchConfig {
    /// Check the settings against the payload.
    ///
    /// Every usage error is caught here, before any device is contacted.
    pub fn validate(&self, payload: &BatchPayload) -> Result<(), UsageError> {
        let per_device = matches!(payload, BatchPayload::PerDevice(_));

        if per_device && !self.targets.is_empty() {
            return Err(UsageError::ConflictingTargets);
        }
        if !per_device && self.targets.is_empty() {
            return Err(UsageError::NoTargets);
        }
        if self.vendor.trim().is_empty() {
            return Err(UsageError::NoVendor);
        }
        if payload.is_empty() {
            return Err(UsageError::NoPayload);
        }
        if self.workers == 0 {
            return Err(UsageError::NoWorkers);
        }
        Ok(())
    }

    /// Validate and expand into one task per target.
    pub fn plan(&self, payload: BatchPayload) -> Result<BatchPlan, UsageError> {
        self.validate(&payload)?;
        let username = self.username()?;
        let mode = payload.mode();

        let tasks = match payload {
            BatchPayload::Command(text) | BatchPayload::Config(text) => self
                .targets
                .iter()
                .map(|target| Task::new(self.qualify(target), text.as_str()))
                .collect(),
            BatchPayload::PerDevice(configs) => configs
                .into_iter()
                .map(|config| Task::new(self.qualify(config.target()), config.data))
                .collect(),
        };

        Ok(BatchPlan {
            tasks,
            options: PushOptions {
                workers: self.workers,
                mode,
                canary: self.canary,
                destination: self.destination.clone(),
            },
            username,
        })
    }

    /// Login user: explicit, else `$USER`, else `$LOGNAME`.
    pub fn username(&self) -> Result<String, UsageError> {
        if let Some(user) = self.user.as_deref().filter(|u| !u.is_empty()) {
            return Ok(user.to_string());
        }

        ["USER", "LOGNAME"]
            .into_iter()
            .filter_map(|var| std::env::var(var).ok())
            .find(|user| !user.is_empty())
            .ok_or(UsageError::NoUser)
    }

    fn qualify(&self, target: &str) -> String {
        match &self.suffix {
            Some(suffix) => format!("{target}{suffix}"),
            None => target.to_string(),
        }
    }
}
