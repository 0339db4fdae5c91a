//! Transport layer: how a device session gets its interactive channel.
//!
//! A [`Connector`] turns a host and credentials into an open
//! [`Channel`](crate::channel::Channel). [`SshConnector`] does this over
//! SSH with russh; [`ScriptedClient`](crate::channel::ScriptedClient) does
//! it from a script.

pub mod config;
mod ssh;

pub use config::{HostKeyVerification, SshConfig};
pub use ssh::{SshChannel, SshConnector};

use std::future::Future;

use secrecy::SecretString;

use crate::channel::Channel;
use crate::error::ConnectError;

/// Trait for establishing interactive sessions.
pub trait Connector: Send {
    /// The channel produced by a successful connect.
    type Channel: Channel;

    /// Connect and authenticate, returning an open interactive channel.
    fn connect(
        &mut self,
        host: &str,
        username: &str,
        password: &SecretString,
    ) -> impl Future<Output = Result<Self::Channel, ConnectError>> + Send;
}
