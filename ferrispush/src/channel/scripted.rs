//! Scripted stand-in for an interactive shell.
//!
//! [`ScriptedChannel`] answers whatever was last sent by looking it up in an
//! ordered rule table. It lets device implementations exercise their
//! prompt handling and handshakes without a live device.
//!
//! # Example
//!
//! ```rust
//! use ferrispush::channel::{Channel, ScriptedChannel};
//!
//! # async fn example() -> Result<(), ferrispush::Error> {
//! let mut channel = ScriptedChannel::builder()
//!     .rule("show version", "OS v1.0")
//!     .rule("show ip", ["line1", "line2"])
//!     .build()?;
//!
//! channel.send("show ip").await?;
//! assert_eq!(channel.recv().await?, "line1");
//! assert_eq!(channel.recv().await?, "line2");
//! # Ok(())
//! # }
//! ```

use std::collections::VecDeque;
use std::fmt;
use std::time::Duration;

use indexmap::IndexMap;
use log::{debug, trace};
use regex::Regex;
use secrecy::SecretString;

use super::Channel;
use crate::error::{ChannelError, ConnectError};
use crate::transport::Connector;

/// Key of the rule answered by the first receive of a freshly logged-in
/// session (see [`ScriptedChannelBuilder::logged_in`]).
pub const LOGGED_IN: &str = "__logged_in__";

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Output of a responder: one chunk, or several delivered one per receive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    /// A single chunk.
    Text(String),
    /// Chunks delivered in order across successive receives.
    Chunks(Vec<String>),
}

impl From<&str> for Reply {
    fn from(text: &str) -> Self {
        Self::Text(text.to_string())
    }
}

impl From<String> for Reply {
    fn from(text: String) -> Self {
        Self::Text(text)
    }
}

impl From<Vec<String>> for Reply {
    fn from(chunks: Vec<String>) -> Self {
        Self::Chunks(chunks)
    }
}

impl From<Vec<&str>> for Reply {
    fn from(chunks: Vec<&str>) -> Self {
        Self::Chunks(chunks.into_iter().map(String::from).collect())
    }
}

/// How a rule answers once matched.
pub enum Responder {
    /// The same text every time.
    Fixed(String),
    /// The same chunks every time.
    Sequence(Vec<String>),
    /// A fresh reply per match.
    Generator(Box<dyn FnMut() -> Reply + Send>),
}

impl Responder {
    /// Build a responder that calls `f` on every match.
    pub fn generator<F, R>(mut f: F) -> Self
    where
        F: FnMut() -> R + Send + 'static,
        R: Into<Reply>,
    {
        Self::Generator(Box::new(move || f().into()))
    }

    fn respond(&mut self) -> Reply {
        match self {
            Self::Fixed(text) => Reply::Text(text.clone()),
            Self::Sequence(chunks) => Reply::Chunks(chunks.clone()),
            Self::Generator(generate) => generate(),
        }
    }
}

impl fmt::Debug for Responder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Fixed(text) => f.debug_tuple("Fixed").field(text).finish(),
            Self::Sequence(chunks) => f.debug_tuple("Sequence").field(chunks).finish(),
            Self::Generator(_) => f.write_str("Generator(<fn>)"),
        }
    }
}

impl From<&str> for Responder {
    fn from(text: &str) -> Self {
        Self::Fixed(text.to_string())
    }
}

impl From<String> for Responder {
    fn from(text: String) -> Self {
        Self::Fixed(text)
    }
}

impl From<Vec<String>> for Responder {
    fn from(chunks: Vec<String>) -> Self {
        Self::Sequence(chunks)
    }
}

impl From<Vec<&str>> for Responder {
    fn from(chunks: Vec<&str>) -> Self {
        Self::Sequence(chunks.into_iter().map(String::from).collect())
    }
}

impl<const N: usize> From<[&str; N]> for Responder {
    fn from(chunks: [&str; N]) -> Self {
        Self::Sequence(chunks.into_iter().map(String::from).collect())
    }
}

struct Rule {
    key: String,
    matcher: Regex,
    responder: Responder,
}

/// Transport status companion of a [`ScriptedChannel`].
///
/// Always active; no network liveness is modelled.
#[derive(Debug, Clone, Copy)]
pub struct ScriptedTransport {
    active: bool,
}

impl ScriptedTransport {
    fn new() -> Self {
        Self { active: true }
    }

    /// Check if the transport is active.
    pub fn is_active(&self) -> bool {
        self.active
    }
}

/// Deterministic emulation of one interactive shell session.
///
/// Single-session and single-threaded: build one per simulated session and
/// never share it.
pub struct ScriptedChannel {
    /// Rules in insertion order; the first match wins.
    rules: Vec<Rule>,

    /// Last sent text not yet answered.
    pending: Option<String>,

    /// Chunks left over from a multi-chunk reply.
    replay: VecDeque<String>,

    /// How long a receive with nothing to answer waits before failing.
    timeout: Duration,

    /// Every text sent, in order.
    sent: Vec<String>,

    transport: ScriptedTransport,
}

impl ScriptedChannel {
    /// Build a channel from a rule table.
    ///
    /// With `exact`, every key is matched literally; otherwise each key is a
    /// regex. Either way a key must match at the start of the sent text.
    pub fn new(rules: IndexMap<String, Responder>, exact: bool) -> Result<Self, ChannelError> {
        let rules = rules
            .into_iter()
            .map(|(key, responder)| {
                let body = if exact { regex::escape(&key) } else { key.clone() };
                Ok(Rule {
                    matcher: Regex::new(&format!("^(?:{body})"))?,
                    key,
                    responder,
                })
            })
            .collect::<Result<Vec<_>, ChannelError>>()?;

        Ok(Self {
            rules,
            pending: None,
            replay: VecDeque::new(),
            timeout: DEFAULT_TIMEOUT,
            sent: Vec::new(),
            transport: ScriptedTransport::new(),
        })
    }

    /// Start building a channel (exact matching by default).
    pub fn builder() -> ScriptedChannelBuilder {
        ScriptedChannelBuilder::new()
    }

    /// Every text sent so far, in order.
    pub fn sent(&self) -> &[String] {
        &self.sent
    }

    /// The companion transport status.
    pub fn transport(&self) -> ScriptedTransport {
        self.transport
    }

    /// Number of reply chunks still queued.
    pub fn queued(&self) -> usize {
        self.replay.len()
    }
}

impl fmt::Debug for ScriptedChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScriptedChannel")
            .field("rules", &self.rules.iter().map(|r| &r.key).collect::<Vec<_>>())
            .field("pending", &self.pending)
            .field("replay", &self.replay)
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl Channel for ScriptedChannel {
    async fn send(&mut self, text: &str) -> Result<(), ChannelError> {
        trace!("scripted send {:?}", text);
        // An unanswered send is simply replaced.
        self.pending = Some(text.to_string());
        self.sent.push(text.to_string());
        Ok(())
    }

    async fn recv(&mut self) -> Result<String, ChannelError> {
        if let Some(chunk) = self.replay.pop_front() {
            trace!("scripted replay {:?}", chunk);
            return Ok(chunk);
        }

        if let Some(pending) = self.pending.take() {
            let Some(rule) = self
                .rules
                .iter_mut()
                .find(|rule| rule.matcher.is_match(&pending))
            else {
                debug!("scripted channel has no rule for {:?}", pending);
                return Err(ChannelError::UnrecognizedInput(pending));
            };

            trace!("scripted rule {:?} matched {:?}", rule.key, pending);
            return Ok(match rule.responder.respond() {
                Reply::Text(text) => text,
                Reply::Chunks(chunks) => {
                    let mut chunks = VecDeque::from(chunks);
                    let first = chunks.pop_front().unwrap_or_default();
                    self.replay = chunks;
                    first
                }
            });
        }

        tokio::time::sleep(self.timeout).await;
        Err(ChannelError::Timeout(self.timeout))
    }

    fn set_timeout(&mut self, timeout: Duration) {
        self.timeout = timeout;
    }

    fn timeout(&self) -> Duration {
        self.timeout
    }

    fn is_active(&self) -> bool {
        self.transport.is_active()
    }
}

/// Builder for [`ScriptedChannel`].
pub struct ScriptedChannelBuilder {
    rules: IndexMap<String, Responder>,
    exact: bool,
    timeout: Duration,
    logged_in: bool,
}

impl ScriptedChannelBuilder {
    fn new() -> Self {
        Self {
            rules: IndexMap::new(),
            exact: true,
            timeout: DEFAULT_TIMEOUT,
            logged_in: false,
        }
    }

    /// Add a rule. Re-using a key replaces its responder in place.
    pub fn rule(mut self, key: impl Into<String>, responder: impl Into<Responder>) -> Self {
        self.rules.insert(key.into(), responder.into());
        self
    }

    /// Answer the first receive of the session, before anything is sent.
    pub fn logged_in(mut self, responder: impl Into<Responder>) -> Self {
        self.rules.insert(LOGGED_IN.to_string(), responder.into());
        self.logged_in = true;
        self
    }

    /// Match keys literally (the default).
    pub fn exact(mut self) -> Self {
        self.exact = true;
        self
    }

    /// Treat keys as regexes.
    pub fn pattern_mode(mut self) -> Self {
        self.exact = false;
        self
    }

    /// Set the receive timeout.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Build the channel.
    pub fn build(self) -> Result<ScriptedChannel, ChannelError> {
        let mut channel = ScriptedChannel::new(self.rules, self.exact)?;
        channel.timeout = self.timeout;
        if self.logged_in {
            channel.pending = Some(LOGGED_IN.to_string());
        }
        Ok(channel)
    }
}

/// Connector that hands out a single scripted session.
///
/// The first `connect` yields the channel; later ones are refused, as is
/// every connect of a client built with [`refusing`](Self::refusing).
#[derive(Debug)]
pub struct ScriptedClient {
    channel: Option<ScriptedChannel>,
    refusal: Option<String>,
}

impl ScriptedClient {
    /// Create a client that connects to `channel`.
    pub fn new(channel: ScriptedChannel) -> Self {
        Self {
            channel: Some(channel),
            refusal: None,
        }
    }

    /// Create a client whose connects always fail.
    pub fn refusing(message: impl Into<String>) -> Self {
        Self {
            channel: None,
            refusal: Some(message.into()),
        }
    }
}

impl Connector for ScriptedClient {
    type Channel = ScriptedChannel;

    async fn connect(
        &mut self,
        host: &str,
        username: &str,
        _password: &SecretString,
    ) -> Result<ScriptedChannel, ConnectError> {
        if let Some(message) = &self.refusal {
            return Err(ConnectError::Refused {
                host: host.to_string(),
                message: message.clone(),
            });
        }

        debug!("scripted session opened for {}@{}", username, host);
        self.channel.take().ok_or_else(|| ConnectError::Refused {
            host: host.to_string(),
            message: "scripted session already used".to_string(),
        })
    }
}
