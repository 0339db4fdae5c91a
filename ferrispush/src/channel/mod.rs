//! Channel layer for interactive shell sessions.
//!
//! A [`Channel`] is one interactive remote shell: text goes in with
//! [`send`](Channel::send) and comes back in chunks from
//! [`recv`](Channel::recv). Device implementations are written against this
//! trait so they can be driven by a live SSH shell or by a
//! [`ScriptedChannel`] in tests.

mod buffer;
pub mod scripted;

pub use buffer::PatternBuffer;
pub use scripted::{Reply, Responder, ScriptedChannel, ScriptedClient, ScriptedTransport};

use std::future::Future;
use std::time::Duration;

use crate::error::ChannelError;

/// Trait for interactive shell channels.
pub trait Channel: Send {
    /// Send text to the remote shell.
    fn send(&mut self, text: &str) -> impl Future<Output = Result<(), ChannelError>> + Send;

    /// Receive the next chunk of output.
    ///
    /// Fails with [`ChannelError::Timeout`] when nothing arrives within
    /// [`timeout`](Self::timeout).
    fn recv(&mut self) -> impl Future<Output = Result<String, ChannelError>> + Send;

    /// Set the receive timeout.
    fn set_timeout(&mut self, timeout: Duration);

    /// Get the receive timeout.
    fn timeout(&self) -> Duration;

    /// Check if the underlying transport is still alive.
    fn is_active(&self) -> bool;

    /// Close the channel.
    fn close(&mut self) -> impl Future<Output = Result<(), ChannelError>> + Send {
        async { Ok(()) }
    }
}
