//! SSH tunnel handling
//!
//! The tunnel authenticates against the SSH server, binds an ephemeral port on
//! `127.0.0.1` and forwards every local connection through a `direct-tcpip`
//! channel to the remote database address. A failed open never leaves a
//! session behind: anything established before the failure is disconnected
//! before the error is returned.

use async_trait::async_trait;
use russh::client;
use russh::Disconnect;
use russh_keys::key;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::{TcpListener, TcpStream};
use tokio::task::{JoinHandle, JoinSet};

use crate::config::{SshAuth, SshConfig};
use crate::db::Tunnel;
use crate::error::{Error, Result};

type Session = client::Handle<TunnelClient>;

/// Credentials resolved before any network activity
enum Credential {
    Key(Arc<key::KeyPair>),
    Password(String),
}

/// russh client handler; only decides whether to trust the server key
struct TunnelClient {
    host: String,
    port: u16,
    strict_host_key_checking: bool,
}

#[async_trait]
impl client::Handler for TunnelClient {
    type Error = russh::Error;

    async fn check_server_key(
        &mut self,
        server_public_key: &key::PublicKey,
    ) -> std::result::Result<bool, Self::Error> {
        if !self.strict_host_key_checking {
            return Ok(true);
        }

        match russh_keys::check_known_hosts(&self.host, self.port, server_public_key) {
            Ok(known) => {
                if !known {
                    tracing::warn!(host = %self.host, "SSH host key not present in known_hosts");
                }
                Ok(known)
            }
            Err(e) => {
                tracing::warn!(host = %self.host, error = %e, "SSH host key verification failed");
                Ok(false)
            }
        }
    }
}

/// Opens SSH tunnels
pub struct TunnelManager;

impl TunnelManager {
    /// Open a tunnel exposing `remote_host:remote_port` (as seen from the SSH server) locally
    pub async fn open(ssh: &SshConfig, remote_host: &str, remote_port: u16) -> Result<TunnelHandle> {
        let credentials = load_credentials(ssh)?;

        tracing::info!(host = %ssh.host, port = ssh.port, "Opening SSH tunnel");
        let session = Arc::new(connect_and_authenticate(ssh, credentials).await?);

        let listener = match TcpListener::bind("127.0.0.1:0").await {
            Ok(listener) => listener,
            Err(e) => {
                disconnect(&session).await;
                return Err(Error::connectivity("Failed to bind local tunnel port", e));
            }
        };
        let local_port = match listener.local_addr() {
            Ok(addr) => addr.port(),
            Err(e) => {
                disconnect(&session).await;
                return Err(Error::connectivity("Failed to read local tunnel address", e));
            }
        };

        // The remote end must accept a forwarded connection before the tunnel counts as healthy
        if let Err(e) = probe(&session, remote_host, remote_port).await {
            disconnect(&session).await;
            return Err(e);
        }

        let forwarder = tokio::spawn(forward_connections(
            listener,
            session.clone(),
            remote_host.to_string(),
            remote_port,
        ));

        tracing::info!(local_port, remote_host, remote_port, "SSH tunnel established");

        Ok(TunnelHandle {
            local_port,
            session: Some(session),
            forwarder: Some(forwarder),
        })
    }

    /// Connect and authenticate, then disconnect straight away
    pub async fn check(ssh: &SshConfig) -> Result<()> {
        let credentials = load_credentials(ssh)?;
        let session = connect_and_authenticate(ssh, credentials).await?;
        disconnect(&session).await;
        tracing::info!(host = %ssh.host, "SSH connection check succeeded");
        Ok(())
    }
}

/// An open tunnel; closed exactly once
pub struct TunnelHandle {
    local_port: u16,
    session: Option<Arc<Session>>,
    forwarder: Option<JoinHandle<()>>,
}

impl TunnelHandle {
    /// Local port the remote database is reachable on
    pub fn local_port(&self) -> u16 {
        self.local_port
    }

    /// Stop forwarding and disconnect the SSH session
    pub async fn close(&mut self) -> Result<()> {
        if let Some(forwarder) = self.forwarder.take() {
            forwarder.abort();
        }

        if let Some(session) = self.session.take() {
            session
                .disconnect(Disconnect::ByApplication, "", "en")
                .await
                .map_err(|e| Error::connectivity("SSH disconnect failed", e))?;
            tracing::info!(local_port = self.local_port, "SSH tunnel closed");
        }

        Ok(())
    }
}

impl Drop for TunnelHandle {
    fn drop(&mut self) {
        if let Some(forwarder) = self.forwarder.take() {
            forwarder.abort();
        }
        if self.session.is_some() {
            tracing::warn!(local_port = self.local_port, "SSH tunnel dropped without being closed");
        }
    }
}

#[async_trait]
impl Tunnel for TunnelHandle {
    fn local_port(&self) -> u16 {
        TunnelHandle::local_port(self)
    }

    async fn close(&mut self) -> Result<()> {
        TunnelHandle::close(self).await
    }
}

/// Resolve auth methods and read key files; a bad key path fails here, before connecting
fn load_credentials(ssh: &SshConfig) -> Result<Vec<Credential>> {
    ssh.auth_methods()?
        .into_iter()
        .map(|method| match method {
            SshAuth::PrivateKey { path, passphrase } => {
                let pair = russh_keys::load_secret_key(&path, passphrase.as_deref())
                    .map_err(|e| Error::connectivity(&format!("Failed to load private key {}", path), e))?;
                Ok(Credential::Key(Arc::new(pair)))
            }
            SshAuth::Password(password) => Ok(Credential::Password(password)),
        })
        .collect()
}

async fn connect_and_authenticate(ssh: &SshConfig, credentials: Vec<Credential>) -> Result<Session> {
    let config = Arc::new(client::Config::default());
    let handler = TunnelClient {
        host: ssh.host.clone(),
        port: ssh.port,
        strict_host_key_checking: ssh.strict_host_key_checking,
    };

    let target = format!("{}:{}", ssh.host, ssh.port);
    let mut session = tokio::time::timeout(
        ssh.timeout(),
        client::connect(config, (ssh.host.as_str(), ssh.port), handler),
    )
    .await
    .map_err(|_| Error::ConnectivityError(format!("SSH connection to {} timed out", target)))?
    .map_err(|e| Error::connectivity(&format!("SSH connection to {} failed", target), e))?;

    for credential in credentials {
        let attempt = match credential {
            Credential::Key(pair) => session.authenticate_publickey(ssh.username.as_str(), pair).await,
            Credential::Password(password) => {
                session
                    .authenticate_password(ssh.username.as_str(), password.as_str())
                    .await
            }
        };

        match attempt {
            Ok(true) => return Ok(session),
            Ok(false) => tracing::debug!(user = %ssh.username, "SSH auth method rejected, trying next"),
            Err(e) => {
                disconnect(&session).await;
                return Err(Error::connectivity("SSH authentication failed", e));
            }
        }
    }

    disconnect(&session).await;
    Err(Error::ConnectivityError(format!(
        "SSH authentication rejected for user {} on {}",
        ssh.username, target
    )))
}

/// Open and close one forwarded channel to prove the remote address is reachable
async fn probe(session: &Session, remote_host: &str, remote_port: u16) -> Result<()> {
    let channel = session
        .channel_open_direct_tcpip(remote_host, remote_port as u32, "127.0.0.1", 0)
        .await
        .map_err(|e| {
            Error::connectivity(
                &format!("SSH server could not reach {}:{}", remote_host, remote_port),
                e,
            )
        })?;

    if let Err(e) = channel.close().await {
        tracing::debug!(error = %e, "Closing probe channel failed");
    }
    Ok(())
}

async fn disconnect(session: &Session) {
    if let Err(e) = session.disconnect(Disconnect::ByApplication, "", "en").await {
        tracing::warn!(error = %e, "SSH disconnect failed");
    }
}

/// Accept loop; aborting this task drops every in-flight forward with it
async fn forward_connections(
    listener: TcpListener,
    session: Arc<Session>,
    remote_host: String,
    remote_port: u16,
) {
    let mut connections = JoinSet::new();

    loop {
        tokio::select! {
            accepted = listener.accept() => match accepted {
                Ok((socket, peer)) => {
                    connections.spawn(forward_one(
                        socket,
                        peer,
                        session.clone(),
                        remote_host.clone(),
                        remote_port,
                    ));
                }
                Err(e) => {
                    tracing::warn!(error = %e, "Tunnel listener failed");
                    break;
                }
            },
            Some(_) = connections.join_next(), if !connections.is_empty() => {}
        }
    }
}

async fn forward_one(
    mut socket: TcpStream,
    peer: SocketAddr,
    session: Arc<Session>,
    remote_host: String,
    remote_port: u16,
) {
    let channel = match session
        .channel_open_direct_tcpip(
            remote_host.as_str(),
            remote_port as u32,
            peer.ip().to_string(),
            peer.port() as u32,
        )
        .await
    {
        Ok(channel) => channel,
        Err(e) => {
            tracing::warn!(%peer, error = %e, "Failed to open forwarded channel");
            return;
        }
    };

    let mut stream = channel.into_stream();
    match tokio::io::copy_bidirectional(&mut socket, &mut stream).await {
        Ok((sent, received)) => tracing::debug!(%peer, sent, received, "Forwarded connection finished"),
        Err(e) => tracing::debug!(%peer, error = %e, "Forwarded connection ended with error"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ssh_config(private_key_path: Option<&str>) -> SshConfig {
        SshConfig {
            host: "127.0.0.1".to_string(),
            port: 1,
            username: "deploy".to_string(),
            private_key_path: private_key_path.map(str::to_string),
            private_key_passphrase: None,
            password: None,
            timeout_seconds: Some(1),
            strict_host_key_checking: false,
        }
    }

    #[tokio::test]
    async fn test_missing_auth_is_config_error() {
        let result = TunnelManager::open(&ssh_config(None), "db.internal", 5432).await;
        assert!(matches!(result, Err(Error::ConfigError(_))));
    }

    #[tokio::test]
    async fn test_invalid_key_path_is_connectivity_error() {
        let config = ssh_config(Some("/nonexistent/db_copier/id_ed25519"));
        let result = TunnelManager::open(&config, "db.internal", 5432).await;
        assert!(matches!(result, Err(Error::ConnectivityError(_))));
    }
}
