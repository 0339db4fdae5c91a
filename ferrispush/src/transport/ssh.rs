//! SSH transport implementation using russh.

use std::path::PathBuf;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use log::{debug, warn};
use russh::client::{self, Handle, Msg};
use russh::keys::PublicKey;
use russh::ChannelMsg;
use secrecy::{ExposeSecret, SecretString};

use super::Connector;
use super::config::{HostKeyVerification, SshConfig};
use crate::channel::Channel;
use crate::error::{ChannelError, ConnectError};

/// Connector that opens an authenticated PTY shell over SSH.
#[derive(Debug, Clone, Default)]
pub struct SshConnector {
    config: SshConfig,
}

impl SshConnector {
    /// Create a connector with the given settings.
    pub fn new(config: SshConfig) -> Self {
        Self { config }
    }

    /// Get the connector settings.
    pub fn config(&self) -> &SshConfig {
        &self.config
    }

    /// Open a session channel with a PTY and an interactive shell.
    async fn open_shell(
        &self,
        session: &Handle<SshHandler>,
    ) -> Result<russh::Channel<Msg>, ConnectError> {
        let channel = session.channel_open_session().await?;

        channel
            .request_pty(
                true,
                "xterm",
                self.config.terminal_width,
                self.config.terminal_height,
                0,
                0,
                &[],
            )
            .await?;

        channel.request_shell(true).await?;

        Ok(channel)
    }
}

impl Connector for SshConnector {
    type Channel = SshChannel;

    async fn connect(
        &mut self,
        host: &str,
        username: &str,
        password: &SecretString,
    ) -> Result<SshChannel, ConnectError> {
        let timeout = self.config.timeout;
        let ssh_config = Arc::new(client::Config {
            inactivity_timeout: Some(timeout),
            ..Default::default()
        });

        let host_key_error: Arc<Mutex<Option<ConnectError>>> = Arc::new(Mutex::new(None));

        let handler = SshHandler {
            host: host.to_string(),
            port: self.config.port,
            host_key_verification: self.config.host_key_verification.clone(),
            known_hosts_path: self.config.known_hosts_path.clone(),
            host_key_error: host_key_error.clone(),
        };

        debug!("Connecting to {}@{}:{}", username, host, self.config.port);

        let mut session = tokio::time::timeout(
            timeout,
            client::connect(ssh_config, (host, self.config.port), handler),
        )
        .await
        .map_err(|_| ConnectError::Timeout {
            host: host.to_string(),
            timeout,
        })?
        .map_err(|e| {
            // Prefer the detailed host key error over russh's generic one
            host_key_error
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .take()
                .unwrap_or(ConnectError::Ssh(e))
        })?;

        let authenticated = session
            .authenticate_password(username, password.expose_secret())
            .await?
            .success();

        if !authenticated {
            return Err(ConnectError::AuthenticationFailed {
                user: username.to_string(),
            });
        }

        let channel = self.open_shell(&session).await?;

        Ok(SshChannel {
            session,
            channel,
            timeout,
        })
    }
}

/// Interactive shell channel on an SSH session.
pub struct SshChannel {
    session: Handle<SshHandler>,
    channel: russh::Channel<Msg>,
    timeout: Duration,
}

impl Channel for SshChannel {
    async fn send(&mut self, text: &str) -> Result<(), ChannelError> {
        self.channel
            .data(text.as_bytes())
            .await
            .map_err(ChannelError::Ssh)
    }

    async fn recv(&mut self) -> Result<String, ChannelError> {
        let timeout = self.timeout;
        loop {
            let msg = tokio::time::timeout(timeout, self.channel.wait())
                .await
                .map_err(|_| ChannelError::Timeout(timeout))?;

            match msg {
                Some(ChannelMsg::Data { data }) => {
                    return Ok(String::from_utf8_lossy(&data).into_owned());
                }
                Some(ChannelMsg::ExtendedData { data, .. }) => {
                    return Ok(String::from_utf8_lossy(&data).into_owned());
                }
                Some(ChannelMsg::Eof) | Some(ChannelMsg::Close) | None => {
                    return Err(ChannelError::Closed);
                }
                Some(_) => continue,
            }
        }
    }

    fn set_timeout(&mut self, timeout: Duration) {
        self.timeout = timeout;
    }

    fn timeout(&self) -> Duration {
        self.timeout
    }

    fn is_active(&self) -> bool {
        !self.session.is_closed()
    }

    async fn close(&mut self) -> Result<(), ChannelError> {
        if let Err(e) = self.channel.eof().await {
            debug!("Failed to send EOF: {}", e);
        }
        self.session
            .disconnect(russh::Disconnect::ByApplication, "", "en")
            .await
            .map_err(ChannelError::Ssh)
    }
}

/// SSH client handler for russh.
struct SshHandler {
    host: String,
    port: u16,
    host_key_verification: HostKeyVerification,
    known_hosts_path: Option<PathBuf>,
    /// Detailed host key error for connect() to surface.
    host_key_error: Arc<Mutex<Option<ConnectError>>>,
}

impl SshHandler {
    /// Check the host key against known_hosts.
    ///
    /// Returns `Ok(true)` if matched, `Ok(false)` if the host is not listed.
    fn check_known_hosts(&self, pubkey: &PublicKey) -> Result<bool, ConnectError> {
        let result = match &self.known_hosts_path {
            Some(path) => russh::keys::check_known_hosts_path(&self.host, self.port, pubkey, path),
            None => russh::keys::check_known_hosts(&self.host, self.port, pubkey),
        };

        match result {
            Ok(matched) => Ok(matched),
            Err(russh::keys::Error::KeyChanged { line }) => Err(ConnectError::HostKeyChanged {
                host: self.host.clone(),
                port: self.port,
                line,
            }),
            Err(e) => Err(ConnectError::KnownHosts(e.to_string())),
        }
    }

    /// Save a new host key to known_hosts.
    fn learn_host_key(&self, pubkey: &PublicKey) -> Result<(), ConnectError> {
        let result = match &self.known_hosts_path {
            Some(path) => russh::keys::known_hosts::learn_known_hosts_path(
                &self.host, self.port, pubkey, path,
            ),
            None => russh::keys::known_hosts::learn_known_hosts(&self.host, self.port, pubkey),
        };

        result.map_err(|e| ConnectError::KnownHosts(e.to_string()))
    }

    fn reject(&self, error: ConnectError) -> bool {
        *self
            .host_key_error
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(error);
        false
    }
}

impl client::Handler for SshHandler {
    type Error = russh::Error;

    async fn check_server_key(
        &mut self,
        server_public_key: &PublicKey,
    ) -> Result<bool, Self::Error> {
        match self.host_key_verification {
            HostKeyVerification::Disabled => Ok(true),

            HostKeyVerification::AcceptNew => match self.check_known_hosts(server_public_key) {
                Ok(true) => Ok(true),
                Ok(false) => {
                    if let Err(e) = self.learn_host_key(server_public_key) {
                        warn!("Failed to save host key for {}: {}", self.host, e);
                    }
                    Ok(true)
                }
                Err(e) => Ok(self.reject(e)),
            },

            HostKeyVerification::Strict => match self.check_known_hosts(server_public_key) {
                Ok(true) => Ok(true),
                Ok(false) => Ok(self.reject(ConnectError::HostKeyUnknown {
                    host: self.host.clone(),
                    port: self.port,
                })),
                Err(e) => Ok(self.reject(e)),
            },
        }
    }
}
