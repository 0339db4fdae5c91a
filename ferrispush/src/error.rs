//! Error types for ferrispush.

use std::time::Duration;

use thiserror::Error;

/// Main error type for ferrispush operations.
#[derive(Error, Debug)]
pub enum Error {
    /// Batch configuration errors, raised before any worker starts
    #[error("Usage error: {0}")]
    Usage(#[from] UsageError),

    /// Device session could not be established
    #[error("Connect error: {0}")]
    Connect(#[from] ConnectError),

    /// Configuration could not be applied
    #[error("Apply config error: {0}")]
    ApplyConfig(#[from] ApplyConfigError),

    /// Command could not be run
    #[error("Command error: {0}")]
    Command(#[from] CommandError),

    /// Channel operation errors
    #[error("Channel error: {0}")]
    Channel(#[from] ChannelError),
}

/// Self-contradictory or incomplete batch configuration.
///
/// Fatal to the whole run.
#[derive(Error, Debug)]
pub enum UsageError {
    /// No targets and no per-device configurations
    #[error("No targets defined, provide at least one target")]
    NoTargets,

    /// Explicit targets combined with per-device configurations
    #[error("Targets and per-device configurations are mutually exclusive")]
    ConflictingTargets,

    /// No vendor name
    #[error("No vendor defined (e.g. vendor = \"junos\")")]
    NoVendor,

    /// Vendor name not present in the registry
    #[error("The vendor '{name}' is not registered (known: {known})")]
    UnknownVendor { name: String, known: String },

    /// Vendor registered twice
    #[error("The vendor '{name}' is already registered")]
    DuplicateVendor { name: String },

    /// Nothing to push
    #[error("No command or configuration provided")]
    NoPayload,

    /// Worker pool of size zero
    #[error("Worker pool size must be at least 1")]
    NoWorkers,

    /// No username given and none found in the environment
    #[error("No username provided and none could be determined")]
    NoUser,
}

/// A device session could not be established.
#[derive(Error, Debug)]
pub enum ConnectError {
    /// Remote end refused or was unreachable
    #[error("Connection to {host} refused: {message}")]
    Refused { host: String, message: String },

    /// Connection attempt timed out
    #[error("Connection to {host} timed out after {timeout:?}")]
    Timeout { host: String, timeout: Duration },

    /// Authentication failed
    #[error("Authentication failed for user '{user}'")]
    AuthenticationFailed { user: String },

    /// Host key not present in known_hosts (strict mode)
    #[error("Unknown host key for {host}:{port}")]
    HostKeyUnknown { host: String, port: u16 },

    /// Host key differs from the one in known_hosts
    #[error("Host key for {host}:{port} changed (known_hosts line {line})")]
    HostKeyChanged { host: String, port: u16, line: usize },

    /// known_hosts could not be read or written
    #[error("known_hosts error: {0}")]
    KnownHosts(String),

    /// SSH handshake or protocol error
    #[error("SSH error: {0}")]
    Ssh(#[from] russh::Error),

    /// Session opened but the first prompt never arrived
    #[error("No prompt from {host}: {source}")]
    NoPrompt {
        host: String,
        #[source]
        source: ChannelError,
    },

    /// connect called on an open session
    #[error("Session already connected")]
    AlreadyConnected,
}

/// Configuration application failed on a reachable device.
#[derive(Error, Debug)]
pub enum ApplyConfigError {
    /// Session not connected
    #[error("Session not connected - call connect() first")]
    NotConnected,

    /// The device cannot write to this destination
    #[error("Unsupported destination '{destination}'")]
    UnsupportedDestination { destination: String },

    /// The platform has no way to validate without committing
    #[error("Canary mode is not supported by platform '{platform}'")]
    CanaryUnsupported { platform: String },

    /// The device rejected a configuration line
    #[error("Line '{line}' rejected: {message}")]
    Rejected {
        line: String,
        message: String,
        transcript: String,
    },

    /// Channel failure while applying
    #[error("Channel error: {0}")]
    Channel(#[from] ChannelError),
}

/// A command could not be run.
#[derive(Error, Debug)]
pub enum CommandError {
    /// Session not connected
    #[error("Session not connected - call connect() first")]
    NotConnected,

    /// Output matched one of the platform's failure strings
    #[error("Command '{command}' failed: {message}")]
    Failed { command: String, message: String },

    /// Channel failure while running
    #[error("Channel error: {0}")]
    Channel(#[from] ChannelError),
}

/// Interactive channel errors.
#[derive(Error, Debug)]
pub enum ChannelError {
    /// Sent text matched no rule of a scripted channel
    #[error("Unrecognized input {0:?}")]
    UnrecognizedInput(String),

    /// Nothing arrived within the timeout
    #[error("Nothing received within {0:?}")]
    Timeout(Duration),

    /// Channel closed unexpectedly
    #[error("Channel closed")]
    Closed,

    /// SSH protocol error on the channel
    #[error("Channel SSH error: {0}")]
    Ssh(russh::Error),

    /// Invalid regex pattern
    #[error("Invalid regex pattern: {0}")]
    InvalidPattern(#[from] regex::Error),
}

/// Why one target of a batch failed.
///
/// Recorded per target; never aborts sibling workers.
#[derive(Error, Debug)]
pub enum PushError {
    /// The session could not be established
    #[error(transparent)]
    Connect(#[from] ConnectError),

    /// The configuration was not applied
    #[error(transparent)]
    ApplyConfig(#[from] ApplyConfigError),

    /// The command did not run
    #[error(transparent)]
    Command(#[from] CommandError),

    /// The device session panicked
    #[error("Device session panicked: {0}")]
    Panicked(String),
}

impl PushError {
    /// Short tag naming the failure class.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Connect(_) => "ConnectError",
            Self::ApplyConfig(_) => "ApplyConfigError",
            Self::Command(_) => "CommandError",
            Self::Panicked(_) => "Panic",
        }
    }
}

/// Result type alias using ferrispush's Error.
pub type Result<T> = std::result::Result<T, Error>;
