//! SSH session engine: permissive public-key-probe auth, channel/request
//! multiplexing, and the token-exchange state machine.
//!
//! `russh::server::run_stream` already drives the per-connection event loop
//! (draining global requests, dispatching channels to our [`Handler`]
//! callbacks concurrently) — its returned future only resolves once every
//! child task for the connection has finished, so there is no separate task
//! to spawn for that here.

use std::net::SocketAddr;
use std::sync::Arc;

use russh::keys::PrivateKey;
use russh::server::{Auth, Handler, Msg, Server as _, Session};
use russh::{Channel, ChannelId, CryptoVec};
use tracing::{debug, info, warn};

use crate::directory::Provider;
use crate::error::{BootstrapError, ExitCode, SessionError};
use crate::keys::jwks::SigningKey;
use crate::metrics;
use crate::token::{self, TokenConfig};

pub struct ServerState {
    pub provider: Arc<dyn Provider>,
    pub signing_key: SigningKey,
    pub token_config: TokenConfig,
}

/// Per-connection handler. A fresh one is constructed for every accepted
/// TCP connection.
pub struct SessionHandler {
    state: Arc<ServerState>,
    username: Option<String>,
    fingerprint: Option<String>,
}

impl SessionHandler {
    fn new(state: Arc<ServerState>) -> Self {
        Self {
            state,
            username: None,
            fingerprint: None,
        }
    }

    async fn exec_or_shell(
        &mut self,
        channel_id: ChannelId,
        session: &mut Session,
    ) -> Result<(), anyhow::Error> {
        let handle = session.handle();
        let _ = handle.channel_success(channel_id).await;

        let username = self.username.clone().unwrap_or_default();
        let fingerprint = self.fingerprint.clone().unwrap_or_default();

        let exit_code = match self.token_exchange(&username, &fingerprint).await {
            Ok(token) => {
                if handle
                    .data(channel_id, CryptoVec::from_slice(token.as_bytes()))
                    .await
                    .is_err()
                {
                    warn!(%username, "failed to write token to channel");
                }
                ExitCode::Ok
            }
            Err(err) => {
                warn!(error = %err, %username, "session did not complete successfully");
                if matches!(err, SessionError::KeyMismatch) {
                    let _ = handle
                        .extended_data(
                            channel_id,
                            1,
                            CryptoVec::from_slice(
                                b"Authentication failed for the given keys and username\n",
                            ),
                        )
                        .await;
                }
                err.exit_code()
            }
        };

        if handle
            .exit_status_request(channel_id, exit_code.into())
            .await
            .is_err()
        {
            warn!(%username, "failed to send exit-status");
        }
        let _ = handle.close(channel_id).await;
        Ok(())
    }

    async fn token_exchange(&self, username: &str, fingerprint: &str) -> Result<String, SessionError> {
        let user = self
            .state
            .provider
            .get_user(username)
            .await
            .map_err(SessionError::Directory)?;

        if !user.keys.iter().any(|k| k.fingerprint == fingerprint) {
            metrics::record_authentication_failure();
            return Err(SessionError::KeyMismatch);
        }

        token::generate(&user, fingerprint, &self.state.signing_key, &self.state.token_config)
            .map_err(SessionError::TokenMint)
    }
}

impl Handler for SessionHandler {
    type Error = anyhow::Error;

    async fn auth_publickey_offered(
        &mut self,
        user: &str,
        public_key: &russh::keys::PublicKey,
    ) -> Result<Auth, Self::Error> {
        // The real check happens once per session request, not once per
        // key probe — a directory round trip here would be far too slow
        // and would run once per offered key instead of once per session.
        self.username = Some(user.to_string());
        self.fingerprint = Some(public_key.fingerprint(Default::default()).to_string());
        Ok(Auth::Accept)
    }

    async fn auth_publickey(
        &mut self,
        user: &str,
        public_key: &russh::keys::PublicKey,
    ) -> Result<Auth, Self::Error> {
        // Called after russh verifies the signature on the real auth request;
        // this is what actually decides acceptance.
        self.username = Some(user.to_string());
        self.fingerprint = Some(public_key.fingerprint(Default::default()).to_string());
        Ok(Auth::Accept)
    }

    async fn channel_open_session(
        &mut self,
        _channel: Channel<Msg>,
        _session: &mut Session,
    ) -> Result<bool, Self::Error> {
        Ok(true)
    }

    async fn channel_open_direct_tcpip(
        &mut self,
        _channel: Channel<Msg>,
        _host_to_connect: &str,
        _port_to_connect: u32,
        _originator_address: &str,
        _originator_port: u32,
        _session: &mut Session,
    ) -> Result<bool, Self::Error> {
        Ok(false)
    }

    async fn channel_open_x11(
        &mut self,
        _channel: Channel<Msg>,
        _originator_address: &str,
        _originator_port: u32,
        _session: &mut Session,
    ) -> Result<bool, Self::Error> {
        Ok(false)
    }

    async fn pty_request(
        &mut self,
        channel_id: ChannelId,
        _term: &str,
        _col_width: u32,
        _row_height: u32,
        _pix_width: u32,
        _pix_height: u32,
        _modes: &[(russh::Pty, u32)],
        session: &mut Session,
    ) -> Result<(), Self::Error> {
        // Accepted purely to simplify client command lines; has no effect.
        let _ = session.handle().channel_success(channel_id).await;
        Ok(())
    }

    async fn env_request(
        &mut self,
        channel_id: ChannelId,
        _variable_name: &str,
        _variable_value: &str,
        session: &mut Session,
    ) -> Result<(), Self::Error> {
        let _ = session.handle().channel_failure(channel_id).await;
        Ok(())
    }

    async fn shell_request(
        &mut self,
        channel_id: ChannelId,
        session: &mut Session,
    ) -> Result<(), Self::Error> {
        self.exec_or_shell(channel_id, session).await
    }

    async fn exec_request(
        &mut self,
        channel_id: ChannelId,
        _data: &[u8],
        session: &mut Session,
    ) -> Result<(), Self::Error> {
        self.exec_or_shell(channel_id, session).await
    }
}

struct Listener {
    state: Arc<ServerState>,
}

impl russh::server::Server for Listener {
    type Handler = SessionHandler;

    fn new_client(&mut self, peer: Option<SocketAddr>) -> SessionHandler {
        debug!(?peer, "accepted ssh connection");
        metrics::record_ssh_request();
        SessionHandler::new(self.state.clone())
    }
}

/// Bind the SSH listener and run forever, handing each connection to its own
/// task.
pub async fn run(address: &str, host_key: PrivateKey, state: Arc<ServerState>) -> Result<(), BootstrapError> {
    let config = Arc::new(russh::server::Config {
        keys: vec![host_key],
        ..Default::default()
    });

    let socket_addr: SocketAddr = address
        .parse()
        .map_err(|e: std::net::AddrParseError| BootstrapError::InvalidConfig {
            key: "NOTARI_ADDRESS",
            reason: e.to_string(),
        })?;

    info!(address, "ssh listener starting");
    let mut server = Listener { state };
    server
        .run_on_address(config, socket_addr)
        .await
        .map_err(|e| BootstrapError::ListenerBind {
            address: address.to_string(),
            source: std::io::Error::new(std::io::ErrorKind::Other, e),
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::directory::{Key, User};
    use async_trait::async_trait;
    use jsonwebtoken::{Algorithm, EncodingKey};
    use std::collections::HashMap;
    use std::time::Duration;

    struct FixedProvider(User);

    #[async_trait]
    impl Provider for FixedProvider {
        async fn get_user(&self, _username: &str) -> Result<User, anyhow::Error> {
            Ok(self.0.clone())
        }
    }

    fn handler_for(user: User) -> SessionHandler {
        let state = Arc::new(ServerState {
            provider: Arc::new(FixedProvider(user)),
            signing_key: SigningKey {
                kid: "test".to_string(),
                algorithm: Algorithm::HS256,
                encoding_key: EncodingKey::from_secret(b"test-secret"),
            },
            token_config: TokenConfig {
                issuer: "notari".to_string(),
                claim_prefix: "notari:".to_string(),
                static_claims: HashMap::new(),
                expiry: Duration::from_secs(60),
            },
        });
        SessionHandler::new(state)
    }

    fn user_with_key(fingerprint: &str) -> User {
        User {
            sub: "https://github.com/octocat".to_string(),
            username: "octocat".to_string(),
            keys: vec![Key {
                blob: "ssh-rsa AAAA".to_string(),
                fingerprint: fingerprint.to_string(),
            }],
            claims: HashMap::new(),
        }
    }

    #[tokio::test]
    async fn token_exchange_succeeds_when_fingerprint_matches() {
        let handler = handler_for(user_with_key("SHA256:abc"));
        let token = handler
            .token_exchange("octocat", "SHA256:abc")
            .await
            .unwrap();
        assert!(!token.is_empty());
    }

    #[tokio::test]
    async fn token_exchange_rejects_a_fingerprint_mismatch() {
        let handler = handler_for(user_with_key("SHA256:abc"));
        let err = handler
            .token_exchange("octocat", "SHA256:does-not-match")
            .await
            .unwrap_err();
        assert!(matches!(err, SessionError::KeyMismatch));
    }
}
