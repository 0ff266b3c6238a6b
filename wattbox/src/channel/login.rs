//! Interactive login over the Telnet line protocol.

use std::fmt;

use log::{debug, info, warn};
use secrecy::{ExposeSecret, SecretString};
use tokio::io::{AsyncRead, AsyncWrite};

use super::command::CommandChannel;
use super::patterns::MarkerSet;
use crate::error::{AuthError, Error, LoginStage, Result, TransportError};
use crate::transport::{CommandConfig, LineTransport, LoginConfig};

/// Prompts that ask for a user name.
pub const LOGIN_PROMPTS: [&str; 3] = ["login:", "username:", "user:"];

/// Prompts that ask for a password.
pub const PASSWORD_PROMPTS: [&str; 3] = ["password:", "pass:", "passwd:"];

/// Text in the post-login reply that means the credentials were refused.
pub const REJECTION_MARKERS: [&str; 4] = ["login:", "username:", "invalid", "incorrect"];

/// Where the login handshake currently stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthState {
    Disconnected,
    AwaitingLoginPrompt,
    AwaitingPasswordPrompt,
    Authenticated,
    Rejected,
}

impl fmt::Display for AuthState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            AuthState::Disconnected => "disconnected",
            AuthState::AwaitingLoginPrompt => "awaiting login prompt",
            AuthState::AwaitingPasswordPrompt => "awaiting password prompt",
            AuthState::Authenticated => "authenticated",
            AuthState::Rejected => "rejected",
        };
        f.write_str(name)
    }
}

/// Drives the login/password handshake on a fresh transport.
pub struct Authenticator {
    username: String,
    password: SecretString,
    config: LoginConfig,
    state: AuthState,
}

impl Authenticator {
    pub fn new(username: impl Into<String>, password: SecretString, config: LoginConfig) -> Self {
        Self {
            username: username.into(),
            password,
            config,
            state: AuthState::Disconnected,
        }
    }

    pub fn state(&self) -> AuthState {
        self.state
    }

    /// Log in and hand back the transport as an authenticated session.
    ///
    /// The transport is consumed; on failure it is closed.
    pub async fn authenticate<S>(
        &mut self,
        mut transport: LineTransport<S>,
    ) -> Result<AuthenticatedSession<S>>
    where
        S: AsyncRead + AsyncWrite + Unpin + Send,
    {
        match self.handshake(&mut transport).await {
            Ok(banner) => {
                self.state = AuthState::Authenticated;
                info!("logged in as '{}'", self.username);
                Ok(AuthenticatedSession { transport, banner })
            }
            Err(e) => {
                if self.state != AuthState::Rejected {
                    warn!("login failed while {}: {}", self.state, e);
                }
                if matches!(e, Error::Transport(_)) {
                    self.state = AuthState::Disconnected;
                }
                transport.close().await;
                Err(e)
            }
        }
    }

    async fn handshake<S>(&mut self, transport: &mut LineTransport<S>) -> Result<String>
    where
        S: AsyncRead + AsyncWrite + Unpin + Send,
    {
        self.state = AuthState::AwaitingLoginPrompt;
        self.await_prompt(transport, &MarkerSet::new(LOGIN_PROMPTS), LoginStage::Login)
            .await?;
        transport
            .send(format!("{}\r\n", self.username).as_bytes())
            .await?;

        self.state = AuthState::AwaitingPasswordPrompt;
        self.await_prompt(
            transport,
            &MarkerSet::new(PASSWORD_PROMPTS),
            LoginStage::Password,
        )
        .await?;
        transport
            .send(format!("{}\r\n", self.password.expose_secret()).as_bytes())
            .await?;

        tokio::time::sleep(self.config.settle).await;
        let reply = transport
            .read_available(self.config.settle_read_window)
            .await?;
        let text = reply.as_str();
        debug!("post-login reply: {:?}", text);

        if MarkerSet::new(REJECTION_MARKERS).contains(&text) {
            self.state = AuthState::Rejected;
            warn!("device rejected credentials for '{}'", self.username);
            return Err(AuthError::Rejected {
                user: self.username.clone(),
            }
            .into());
        }
        if reply.closed {
            return Err(TransportError::Disconnected.into());
        }

        Ok(text.trim().to_string())
    }

    async fn await_prompt<S>(
        &self,
        transport: &mut LineTransport<S>,
        prompts: &MarkerSet,
        stage: LoginStage,
    ) -> Result<()>
    where
        S: AsyncRead + AsyncWrite + Unpin + Send,
    {
        match transport.read_until(prompts, self.config.prompt_timeout).await {
            Ok(result) if result.matched => {
                debug!("{} prompt: {:?}", stage, result.as_str());
                Ok(())
            }
            Ok(result) => {
                debug!(
                    "connection closed before {} prompt: {:?}",
                    stage,
                    result.as_str()
                );
                Err(TransportError::Disconnected.into())
            }
            Err(TransportError::Timeout(waited)) => Err(AuthError::Timeout {
                stage,
                waited,
                received: transport.pending(),
            }
            .into()),
            Err(e) => Err(e.into()),
        }
    }
}

/// A transport that has passed the login handshake.
///
/// Only an [`Authenticator`] can produce one, and only a session can be
/// turned into a [`CommandChannel`].
pub struct AuthenticatedSession<S> {
    transport: LineTransport<S>,
    banner: String,
}

impl<S> AuthenticatedSession<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    /// Whatever the device printed after accepting the password.
    pub fn banner(&self) -> &str {
        &self.banner
    }

    pub fn into_channel(self, config: CommandConfig) -> CommandChannel<S> {
        CommandChannel::new(self.transport, config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{FakeWattBox, login_config, read_config};

    fn authenticator(password: &str) -> Authenticator {
        Authenticator::new("wattbox", password.to_string().into(), login_config())
    }

    #[tokio::test]
    async fn test_login_success() {
        let (stream, _log) = FakeWattBox::new().serve_duplex();
        let transport = LineTransport::from_stream(stream, read_config());

        let mut auth = authenticator("wattbox");
        assert_eq!(auth.state(), AuthState::Disconnected);
        let session = auth.authenticate(transport).await.unwrap();
        assert_eq!(auth.state(), AuthState::Authenticated);
        assert_eq!(session.banner(), "Successfully Logged In!");
    }

    #[tokio::test]
    async fn test_login_rejected() {
        let (stream, _log) = FakeWattBox::new().serve_duplex();
        let transport = LineTransport::from_stream(stream, read_config());

        let mut auth = authenticator("wrong");
        let err = auth.authenticate(transport).await.err().unwrap();
        assert!(matches!(err, Error::Auth(AuthError::Rejected { ref user }) if user == "wattbox"));
        assert_eq!(auth.state(), AuthState::Rejected);
    }

    #[tokio::test]
    async fn test_login_prompt_timeout() {
        let (stream, _log) = FakeWattBox::new().silent_login().serve_duplex();
        let transport = LineTransport::from_stream(stream, read_config());

        let mut auth = authenticator("wattbox");
        let err = auth.authenticate(transport).await.err().unwrap();
        assert!(matches!(
            err,
            Error::Auth(AuthError::Timeout {
                stage: LoginStage::Login,
                ..
            })
        ));
        assert!(err.is_timeout());
        assert_eq!(auth.state(), AuthState::AwaitingLoginPrompt);
    }

    #[tokio::test]
    async fn test_password_prompt_timeout() {
        let mock = tokio_test::io::Builder::new()
            .read(b"login: ")
            .write(b"wattbox\r\n")
            .wait(std::time::Duration::from_secs(2))
            .build();
        let transport = LineTransport::from_stream(mock, read_config());

        let mut auth = authenticator("wattbox");
        let err = auth.authenticate(transport).await.err().unwrap();
        assert!(matches!(
            err,
            Error::Auth(AuthError::Timeout {
                stage: LoginStage::Password,
                ..
            })
        ));
    }

    #[tokio::test]
    async fn test_closed_before_prompt() {
        let mock = tokio_test::io::Builder::new().read(b"Welcome\r\n").build();
        let transport = LineTransport::from_stream(mock, read_config());

        let mut auth = authenticator("wattbox");
        let err = auth.authenticate(transport).await.err().unwrap();
        assert!(matches!(err, Error::Transport(TransportError::Disconnected)));
        assert!(err.is_connection_lost());
        assert_eq!(auth.state(), AuthState::Disconnected);
    }

    #[tokio::test]
    async fn test_custom_prompt_case() {
        let mock = tokio_test::io::Builder::new()
            .read(b"USERNAME: ")
            .write(b"admin\r\n")
            .read(b"PASS: ")
            .write(b"pw\r\n")
            .read(b"\r\nWelcome admin\r\n")
            .wait(std::time::Duration::from_secs(1))
            .build();
        let transport = LineTransport::from_stream(mock, read_config());

        let mut auth = Authenticator::new("admin", "pw".to_string().into(), login_config());
        let session = auth.authenticate(transport).await.unwrap();
        assert_eq!(session.banner(), "Welcome admin");
    }
}
