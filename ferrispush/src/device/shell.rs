//! Prompt-driven device over an interactive shell channel.
//!
//! [`ShellDevice`] implements [`Device`] for any CLI that can be described
//! by a [`ShellProfile`]: a prompt pattern, the commands that enter, commit,
//! discard and leave configuration mode, and the strings that mark a
//! rejected line. The dialect lives entirely in the profile.
//!
//! # Example
//!
//! ```rust,no_run
//! use ferrispush::device::{Device, ShellDevice, ShellProfile};
//! use ferrispush::transport::{SshConfig, SshConnector};
//! use secrecy::SecretString;
//!
//! # async fn example() -> Result<(), ferrispush::Error> {
//! let profile = ShellProfile::generic()
//!     .with_config_mode("configure", "exit")
//!     .with_commit("commit")
//!     .with_canary("rollback 0")
//!     .with_failure_pattern("syntax error");
//!
//! let mut device = ShellDevice::new(
//!     "router1.example.com",
//!     SshConnector::new(SshConfig::default()),
//!     profile,
//! );
//!
//! let password = SecretString::from("secret".to_string());
//! device.connect("admin", &password).await?;
//! let output = device.run_command("show version").await?;
//! println!("{output}");
//! device.disconnect().await?;
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use log::{debug, trace, warn};
use regex::Regex;
use secrecy::SecretString;

use super::{ConfigResponse, Device, DeviceFactory, RUNNING_CONFIG};
use crate::channel::{Channel, PatternBuffer};
use crate::error::{ApplyConfigError, ChannelError, CommandError, ConnectError};
use crate::transport::Connector;

/// CLI conventions of one platform.
#[derive(Debug, Clone)]
pub struct ShellProfile {
    /// Profile name, used in logs and errors.
    pub name: String,

    /// Pattern matching any prompt of the platform.
    pub prompt: Regex,

    /// Command entering configuration mode.
    pub config_enter: Option<String>,

    /// Command leaving configuration mode.
    pub config_exit: Option<String>,

    /// Command committing the candidate configuration.
    pub commit_command: Option<String>,

    /// Command discarding the candidate configuration.
    pub canary_command: Option<String>,

    /// Command ending the shell session.
    pub exit_command: Option<String>,

    /// Output substrings that mark a failed command or rejected line.
    pub failed_when_contains: Vec<String>,

    /// Destinations configuration may be applied to.
    pub destinations: Vec<String>,

    /// Receive timeout for every exchange.
    pub timeout: Duration,

    /// How many trailing bytes are searched for the prompt.
    pub search_depth: usize,
}

impl ShellProfile {
    /// Create a profile with the given prompt pattern and no config mode.
    pub fn new(name: impl Into<String>, prompt: &str) -> Result<Self, regex::Error> {
        Ok(Self {
            name: name.into(),
            prompt: Regex::new(prompt)?,
            config_enter: None,
            config_exit: None,
            commit_command: None,
            canary_command: None,
            exit_command: Some("exit".to_string()),
            failed_when_contains: vec![],
            destinations: vec![RUNNING_CONFIG.to_string()],
            timeout: Duration::from_secs(30),
            search_depth: 1000,
        })
    }

    /// A plain shell ending its prompts in `$`, `#` or `>`.
    pub fn generic() -> Self {
        Self::new("generic", r"[$#>]\s*$").expect("generic prompt pattern is valid")
    }

    /// Set the commands entering and leaving configuration mode.
    pub fn with_config_mode(mut self, enter: impl Into<String>, exit: impl Into<String>) -> Self {
        self.config_enter = Some(enter.into());
        self.config_exit = Some(exit.into());
        self
    }

    /// Set the commit command.
    pub fn with_commit(mut self, command: impl Into<String>) -> Self {
        self.commit_command = Some(command.into());
        self
    }

    /// Set the command discarding uncommitted changes.
    pub fn with_canary(mut self, command: impl Into<String>) -> Self {
        self.canary_command = Some(command.into());
        self
    }

    /// Set the command ending the session (default `exit`).
    pub fn with_exit(mut self, command: impl Into<String>) -> Self {
        self.exit_command = Some(command.into());
        self
    }

    /// Add a failure pattern.
    pub fn with_failure_pattern(mut self, pattern: impl Into<String>) -> Self {
        self.failed_when_contains.push(pattern.into());
        self
    }

    /// Accept another destination.
    pub fn with_destination(mut self, destination: impl Into<String>) -> Self {
        self.destinations.push(destination.into());
        self
    }

    /// Set the receive timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Can configuration be validated without committing it?
    pub fn supports_canary(&self) -> bool {
        self.config_enter.is_some() && self.canary_command.is_some()
    }

    fn detect_failure(&self, output: &str) -> Option<&str> {
        self.failed_when_contains
            .iter()
            .find(|pattern| output.contains(pattern.as_str()))
            .map(String::as_str)
    }
}

/// Device session speaking a [`ShellProfile`] over a connector's channel.
pub struct ShellDevice<C: Connector> {
    host: String,
    connector: C,
    profile: Arc<ShellProfile>,
    /// Open channel (None when disconnected).
    channel: Option<C::Channel>,
    buffer: PatternBuffer,
}

impl<C: Connector> ShellDevice<C> {
    /// Create a disconnected session for `host`.
    pub fn new(host: impl Into<String>, connector: C, profile: impl Into<Arc<ShellProfile>>) -> Self {
        let profile = profile.into();
        Self {
            host: host.into(),
            connector,
            buffer: PatternBuffer::new(profile.search_depth),
            profile,
            channel: None,
        }
    }

    /// Get the profile.
    pub fn profile(&self) -> &ShellProfile {
        &self.profile
    }

    /// Check if the session is connected.
    pub fn is_connected(&self) -> bool {
        self.channel.is_some()
    }

    /// Get the open channel.
    pub fn channel(&self) -> Option<&C::Channel> {
        self.channel.as_ref()
    }

    /// Read until the prompt shows up in the tail of the output.
    async fn read_until_prompt(&mut self) -> Result<String, ChannelError> {
        let channel = self.channel.as_mut().ok_or(ChannelError::Closed)?;
        self.buffer.clear();

        loop {
            let chunk = channel.recv().await?;
            self.buffer.extend(&chunk);
            if self.buffer.tail_contains(&self.profile.prompt) {
                return Ok(self.buffer.take());
            }
        }
    }

    /// Send one line and collect everything up to the next prompt.
    async fn exchange(&mut self, line: &str) -> Result<String, ChannelError> {
        let channel = self.channel.as_mut().ok_or(ChannelError::Closed)?;
        trace!("{} <- {:?}", self.host, line);
        channel.send(&format!("{line}\n")).await?;
        self.read_until_prompt().await
    }

    /// Strip the command echo and the trailing prompt.
    fn normalize(&self, raw: &str, command: &str) -> String {
        let output = raw
            .strip_prefix(command)
            .unwrap_or(raw)
            .trim_start_matches(['\r', '\n']);

        match output.rfind('\n') {
            Some(pos) => output[..pos].trim_end_matches('\r').to_string(),
            None if self.profile.prompt.is_match(output) => String::new(),
            None => output.to_string(),
        }
    }

    /// Best-effort discard and exit after a rejected line.
    async fn leave_config_mode(&mut self, profile: &ShellProfile) {
        for command in [&profile.canary_command, &profile.config_exit]
            .into_iter()
            .flatten()
        {
            if let Err(e) = self.exchange(command).await {
                debug!("{}: failed to leave config mode: {}", self.host, e);
                break;
            }
        }
    }
}

#[async_trait]
impl<C: Connector + 'static> Device for ShellDevice<C> {
    fn host(&self) -> &str {
        &self.host
    }

    async fn connect(
        &mut self,
        username: &str,
        password: &SecretString,
    ) -> Result<(), ConnectError> {
        if self.channel.is_some() {
            return Err(ConnectError::AlreadyConnected);
        }

        let mut channel = self.connector.connect(&self.host, username, password).await?;
        channel.set_timeout(self.profile.timeout);
        self.channel = Some(channel);

        // Wait for the login banner and first prompt
        if let Err(source) = self.read_until_prompt().await {
            self.channel = None;
            return Err(ConnectError::NoPrompt {
                host: self.host.clone(),
                source,
            });
        }

        debug!("Connected to {} ({})", self.host, self.profile.name);
        Ok(())
    }

    async fn run_command(&mut self, command: &str) -> Result<String, CommandError> {
        if self.channel.is_none() {
            return Err(CommandError::NotConnected);
        }

        let raw = self.exchange(command).await?;
        let output = self.normalize(&raw, command);

        if let Some(message) = self.profile.detect_failure(&output) {
            return Err(CommandError::Failed {
                command: command.to_string(),
                message: message.to_string(),
            });
        }

        Ok(output)
    }

    async fn apply_config(
        &mut self,
        destination: &str,
        data: &str,
        canary: bool,
    ) -> Result<ConfigResponse, ApplyConfigError> {
        if self.channel.is_none() {
            return Err(ApplyConfigError::NotConnected);
        }

        let profile = self.profile.clone();

        if !profile.destinations.iter().any(|d| d == destination) {
            return Err(ApplyConfigError::UnsupportedDestination {
                destination: destination.to_string(),
            });
        }
        if canary && !profile.supports_canary() {
            return Err(ApplyConfigError::CanaryUnsupported {
                platform: profile.name.clone(),
            });
        }

        let mut transcript = String::new();

        if let Some(enter) = &profile.config_enter {
            transcript.push_str(&self.exchange(enter).await?);
        }

        let mut applied = 0usize;
        for line in data.lines().map(str::trim_end).filter(|l| !l.trim().is_empty()) {
            let raw = self.exchange(line).await?;
            transcript.push_str(&raw);

            let output = self.normalize(&raw, line);
            if let Some(message) = profile.detect_failure(&output) {
                warn!("{} rejected {:?}: {}", self.host, line, message);
                self.leave_config_mode(&profile).await;
                return Err(ApplyConfigError::Rejected {
                    line: line.to_string(),
                    message: message.to_string(),
                    transcript,
                });
            }
            applied += 1;
        }

        let finish = if canary {
            &profile.canary_command
        } else {
            &profile.commit_command
        };
        if let Some(command) = finish {
            transcript.push_str(&self.exchange(command).await?);
        }
        if let Some(exit) = &profile.config_exit {
            transcript.push_str(&self.exchange(exit).await?);
        }

        debug!(
            "{}: {} {} lines to {}",
            self.host,
            if canary { "validated" } else { "applied" },
            applied,
            destination
        );
        Ok(ConfigResponse::new(transcript, !canary))
    }

    async fn disconnect(&mut self) -> Result<(), ConnectError> {
        let Some(mut channel) = self.channel.take() else {
            return Ok(());
        };

        if let Some(exit) = &self.profile.exit_command {
            if let Err(e) = channel.send(&format!("{exit}\n")).await {
                debug!("{}: failed to send {:?}: {}", self.host, exit, e);
            }
        }
        if let Err(e) = channel.close().await {
            debug!("{}: failed to close channel: {}", self.host, e);
        }
        Ok(())
    }
}

/// Build a factory producing [`ShellDevice`]s for a profile.
///
/// `connector` is called once per target.
pub fn shell_factory<F, C>(profile: ShellProfile, connector: F) -> DeviceFactory
where
    F: Fn(&str) -> C + Send + Sync + 'static,
    C: Connector + 'static,
{
    let profile = Arc::new(profile);
    Arc::new(move |host: &str| {
        Box::new(ShellDevice::new(host, connector(host), profile.clone())) as Box<dyn Device>
    })
}

#[cfg(test)]
mod tests {
    use tokio_test::{assert_err, assert_ok};

    use super::*;
    use crate::channel::{ScriptedChannel, ScriptedClient};

    fn password() -> SecretString {
        SecretString::from("secret".to_string())
    }

    fn profile() -> ShellProfile {
        ShellProfile::generic()
            .with_config_mode("configure terminal", "end")
            .with_commit("commit")
            .with_canary("abort")
            .with_failure_pattern("% Invalid input")
            .with_timeout(Duration::from_millis(50))
    }

    fn router() -> ScriptedChannel {
        ScriptedChannel::builder()
            .logged_in("Welcome to router\nrouter# ")
            .rule("show version", "show version\r\nOS v1.0\r\nrouter# ")
            .rule("show ip", vec!["line1\n", "line2\n", "router# "])
            .rule("show bogus", "% Invalid input detected\nrouter# ")
            .rule("configure terminal", "router(config)# ")
            .rule("hostname", "router(config)# ")
            .rule("interface bogus", "% Invalid input detected\nrouter(config)# ")
            .rule("commit", "router(config)# ")
            .rule("abort", "router(config)# ")
            .rule("end", "router# ")
            .rule("exit", "")
            .build()
            .unwrap()
    }

    async fn connected(profile: ShellProfile) -> ShellDevice<ScriptedClient> {
        let mut device = ShellDevice::new("r1", ScriptedClient::new(router()), profile);
        assert_ok!(device.connect("admin", &password()).await);
        device
    }

    fn sent(device: &ShellDevice<ScriptedClient>) -> Vec<String> {
        device.channel().unwrap().sent().to_vec()
    }

    #[tokio::test]
    async fn test_connect_waits_for_prompt() {
        let device = connected(profile()).await;
        assert!(device.is_connected());
        assert_eq!(device.host(), "r1");
    }

    #[tokio::test]
    async fn test_connect_without_prompt_fails() {
        let channel = ScriptedChannel::builder().build().unwrap();
        let mut device = ShellDevice::new("r1", ScriptedClient::new(channel), profile());

        let err = assert_err!(device.connect("admin", &password()).await);
        assert!(matches!(
            err,
            ConnectError::NoPrompt {
                source: ChannelError::Timeout(_),
                ..
            }
        ));
        assert!(!device.is_connected());
    }

    #[tokio::test]
    async fn test_connect_refused() {
        let mut device = ShellDevice::new("r1", ScriptedClient::refusing("unreachable"), profile());
        let err = assert_err!(device.connect("admin", &password()).await);
        assert!(matches!(err, ConnectError::Refused { .. }));
    }

    #[tokio::test]
    async fn test_connect_twice_rejected() {
        let mut device = connected(profile()).await;
        let err = assert_err!(device.connect("admin", &password()).await);
        assert!(matches!(err, ConnectError::AlreadyConnected));
    }

    #[tokio::test]
    async fn test_run_command_strips_echo_and_prompt() {
        let mut device = connected(profile()).await;
        let output = assert_ok!(device.run_command("show version").await);
        assert_eq!(output, "OS v1.0");
        assert_eq!(sent(&device), ["show version\n"]);
    }

    #[tokio::test]
    async fn test_run_command_collects_chunks_until_prompt() {
        let mut device = connected(profile()).await;
        let output = assert_ok!(device.run_command("show ip").await);
        assert_eq!(output, "line1\nline2");
    }

    #[tokio::test]
    async fn test_run_command_failure_pattern() {
        let mut device = connected(profile()).await;
        let err = assert_err!(device.run_command("show bogus").await);
        assert!(matches!(err, CommandError::Failed { ref message, .. } if message == "% Invalid input"));
    }

    #[tokio::test]
    async fn test_run_command_unscripted() {
        let mut device = connected(profile()).await;
        let err = assert_err!(device.run_command("reload").await);
        assert!(matches!(
            err,
            CommandError::Channel(ChannelError::UnrecognizedInput(_))
        ));
    }

    #[tokio::test]
    async fn test_run_command_not_connected() {
        let channel = ScriptedChannel::builder().build().unwrap();
        let mut device = ShellDevice::new("r1", ScriptedClient::new(channel), profile());
        let err = assert_err!(device.run_command("show version").await);
        assert!(matches!(err, CommandError::NotConnected));
    }

    #[tokio::test]
    async fn test_apply_config_commits() {
        let mut device = connected(profile()).await;
        let response = assert_ok!(
            device
                .apply_config(RUNNING_CONFIG, "hostname r1\n\nhostname r1-new\n", false)
                .await
        );

        assert!(response.committed);
        assert!(response.transcript.contains("router(config)# "));
        assert_eq!(
            sent(&device),
            [
                "configure terminal\n",
                "hostname r1\n",
                "hostname r1-new\n",
                "commit\n",
                "end\n"
            ]
        );
    }

    #[tokio::test]
    async fn test_apply_config_canary_discards() {
        let mut device = connected(profile()).await;
        let response = assert_ok!(device.apply_config(RUNNING_CONFIG, "hostname r1", true).await);

        assert!(!response.committed);
        let sent = sent(&device);
        assert!(sent.contains(&"abort\n".to_string()));
        assert!(!sent.contains(&"commit\n".to_string()));
    }

    #[tokio::test]
    async fn test_apply_config_rejected_line() {
        let mut device = connected(profile()).await;
        let err = assert_err!(
            device
                .apply_config(
                    RUNNING_CONFIG,
                    "hostname r1\ninterface bogus\nhostname r2",
                    false
                )
                .await
        );

        match err {
            ApplyConfigError::Rejected {
                line, transcript, ..
            } => {
                assert_eq!(line, "interface bogus");
                assert!(transcript.contains("% Invalid input detected"));
            }
            other => panic!("unexpected error: {other}"),
        }

        assert_eq!(
            sent(&device),
            [
                "configure terminal\n",
                "hostname r1\n",
                "interface bogus\n",
                "abort\n",
                "end\n"
            ]
        );
    }

    #[tokio::test]
    async fn test_apply_config_unsupported_destination() {
        let mut device = connected(profile()).await;
        let err = assert_err!(device.apply_config("startup-config", "hostname r1", false).await);
        assert!(matches!(err, ApplyConfigError::UnsupportedDestination { .. }));
    }

    #[tokio::test]
    async fn test_canary_needs_config_mode() {
        let generic = ShellProfile::generic().with_timeout(Duration::from_millis(50));
        let mut device = connected(generic).await;
        let err = assert_err!(device.apply_config(RUNNING_CONFIG, "hostname r1", true).await);
        assert!(matches!(err, ApplyConfigError::CanaryUnsupported { ref platform } if platform == "generic"));
    }

    #[tokio::test]
    async fn test_disconnect_is_idempotent() {
        let mut device = connected(profile()).await;
        assert_ok!(device.disconnect().await);
        assert!(!device.is_connected());
        assert_ok!(device.disconnect().await);
    }

    #[tokio::test]
    async fn test_shell_factory_builds_per_host() {
        let factory = shell_factory(profile(), |_host| ScriptedClient::new(router()));
        let mut device = factory("edge7");
        assert_eq!(device.host(), "edge7");
        assert_ok!(device.connect("admin", &password()).await);
        assert_eq!(assert_ok!(device.run_command("show version").await), "OS v1.0");
    }

    #[test]
    fn test_generic_profile() {
        let profile = ShellProfile::generic();
        assert!(profile.prompt.is_match("user@host:~$ "));
        assert!(profile.prompt.is_match("router#"));
        assert!(profile.prompt.is_match("switch> "));
        assert!(!profile.prompt.is_match("loading..."));
        assert!(!profile.supports_canary());
        assert_eq!(profile.destinations, [RUNNING_CONFIG]);
    }
}
