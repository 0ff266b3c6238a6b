//! Serialized command execution over an authenticated session.

use std::time::Duration;

use log::{debug, warn};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::Mutex;
use tokio::time::Instant;

use crate::error::{CommandError, Result, TransportError};
use crate::protocol::commands::{self, EXIT};
use crate::transport::{CommandConfig, LineTransport};

/// One command in flight at a time over a logged-in transport.
///
/// The lock covers drain, send and receive, so concurrent callers can
/// never read each other's responses.
pub struct CommandChannel<S> {
    transport: Mutex<LineTransport<S>>,
    config: CommandConfig,
}

impl<S> CommandChannel<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    pub(super) fn new(transport: LineTransport<S>, config: CommandConfig) -> Self {
        Self {
            transport: Mutex::new(transport),
            config,
        }
    }

    /// Default budget for the first response line.
    pub fn timeout(&self) -> Duration {
        self.config.timeout
    }

    /// Run a command with the default timeout.
    pub async fn execute(&self, command: &str) -> Result<String> {
        self.execute_with_timeout(command, self.config.timeout).await
    }

    /// Run a command and return its trimmed response line.
    ///
    /// Query responses must echo the query name; anything else is treated
    /// as a stale answer and a few more lines are read looking for the
    /// right one. `#Error` answers become [`CommandError::Rejected`].
    pub async fn execute_with_timeout(&self, command: &str, timeout: Duration) -> Result<String> {
        let command = command.trim_end_matches(['\r', '\n']);
        let failed = |source: TransportError| CommandError::Failed {
            command: command.to_string(),
            source,
        };

        let mut transport = self.transport.lock().await;
        if transport.is_closed() {
            return Err(failed(TransportError::Disconnected).into());
        }

        transport.drain().await;
        debug!("sending: {}", command);
        transport
            .send(commands::format_command(command).as_bytes())
            .await
            .map_err(failed)?;

        let mut response = match self.first_line(&mut transport, timeout).await {
            Ok(Some(line)) => line,
            Ok(None) => return Err(failed(TransportError::Disconnected).into()),
            Err(TransportError::Timeout(_)) => {
                return Err(CommandError::Timeout {
                    command: command.to_string(),
                    timeout,
                }
                .into());
            }
            Err(e) => return Err(failed(e).into()),
        };

        if let Some(prefix) = commands::expected_prefix(command) {
            if !response.starts_with(prefix) && !commands::is_error_response(&response) {
                response = self
                    .recover_cross_talk(&mut transport, prefix, response)
                    .await
                    .map_err(failed)?;
            }
        }
        drop(transport);

        debug!("response to {}: {}", command, response);
        if commands::is_error_response(&response) {
            return Err(CommandError::Rejected {
                command: command.to_string(),
                response,
            }
            .into());
        }
        Ok(response)
    }

    /// First non-blank line within `timeout`.
    async fn first_line(
        &self,
        transport: &mut LineTransport<S>,
        timeout: Duration,
    ) -> std::result::Result<Option<String>, TransportError> {
        let deadline = Instant::now() + timeout;
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Err(TransportError::Timeout(timeout));
            }
            match transport.read_line(remaining).await? {
                Some(line) if line.trim().is_empty() => continue,
                Some(line) => return Ok(Some(line.trim().to_string())),
                None => return Ok(None),
            }
        }
    }

    /// Read up to `cross_talk_reads` more lines looking for `prefix`.
    ///
    /// Stops at the first short read that times out; returns the last line
    /// seen either way.
    async fn recover_cross_talk(
        &self,
        transport: &mut LineTransport<S>,
        prefix: &str,
        mut last: String,
    ) -> std::result::Result<String, TransportError> {
        warn!("expected {} but got {:?}, skipping stale response", prefix, last);

        for _ in 0..self.config.cross_talk_reads {
            match transport.read_line(self.config.cross_talk_timeout).await {
                Ok(Some(line)) if line.trim().is_empty() => continue,
                Ok(Some(line)) => {
                    last = line.trim().to_string();
                    if last.starts_with(prefix) {
                        debug!("recovered {} after stale response", prefix);
                        break;
                    }
                    debug!("skipping stale response {:?}", last);
                }
                Ok(None) | Err(TransportError::Timeout(_)) => break,
                Err(e) => return Err(e),
            }
        }
        Ok(last)
    }

    /// Send `!Exit` best-effort, then shut the stream. Idempotent.
    pub async fn close(&self) {
        let mut transport = self.transport.lock().await;
        if transport.is_closed() {
            return;
        }
        if !transport.is_eof() {
            if let Err(e) = transport.send(commands::format_command(EXIT).as_bytes()).await {
                debug!("could not send {}: {}", EXIT, e);
            }
        }
        transport.close().await;
    }

    pub async fn is_closed(&self) -> bool {
        let transport = self.transport.lock().await;
        transport.is_closed() || transport.is_eof()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::testing::{FakeWattBox, Reply, channel};
    use futures_util::future::join;

    #[tokio::test]
    async fn test_query_response() {
        let (channel, log) = channel(FakeWattBox::new()).await;
        let response = channel.execute("?Firmware").await.unwrap();
        assert_eq!(response, "?Firmware=2.4.0.2");
        assert_eq!(log.commands(), vec!["?Firmware"]);
    }

    #[tokio::test]
    async fn test_control_response() {
        let (channel, _log) = channel(FakeWattBox::new()).await;
        assert_eq!(channel.execute("!OutletSet=1,ON\n").await.unwrap(), "OK");
    }

    #[tokio::test]
    async fn test_error_response_rejected() {
        let (channel, _log) = channel(FakeWattBox::new()).await;
        let err = channel.execute("?UPSStatus").await.unwrap_err();
        assert!(matches!(
            err,
            Error::Command(CommandError::Rejected { ref response, .. }) if response == "#Error"
        ));
        assert!(err.is_unsupported());
    }

    #[tokio::test]
    async fn test_blank_lines_skipped() {
        let fake = FakeWattBox::new().respond("?Hostname", "\r\n\r\n?Hostname=rack-pdu");
        let (channel, _log) = channel(fake).await;
        assert_eq!(channel.execute("?Hostname").await.unwrap(), "?Hostname=rack-pdu");
    }

    #[tokio::test]
    async fn test_cross_talk_recovered() {
        let fake = FakeWattBox::new().respond("?Hostname", "?Firmware=2.4.0.2\n?Hostname=rack-pdu");
        let (channel, _log) = channel(fake).await;
        assert_eq!(channel.execute("?Hostname").await.unwrap(), "?Hostname=rack-pdu");
    }

    #[tokio::test]
    async fn test_cross_talk_gives_up() {
        let fake = FakeWattBox::new().respond("?Model", "?Firmware=2.4.0.2");
        let (channel, _log) = channel(fake).await;
        // last line read is returned for the parser to reject
        assert_eq!(channel.execute("?Model").await.unwrap(), "?Firmware=2.4.0.2");
    }

    #[tokio::test]
    async fn test_control_not_prefix_checked() {
        let fake = FakeWattBox::new().respond("!Reboot", "?Firmware=2.4.0.2");
        let (channel, _log) = channel(fake).await;
        assert_eq!(channel.execute("!Reboot").await.unwrap(), "?Firmware=2.4.0.2");
    }

    #[tokio::test]
    async fn test_stale_output_drained() {
        let fake = FakeWattBox::new().respond("!OutletSet=*", "OK\nOK");
        let (channel, _log) = channel(fake).await;
        assert_eq!(channel.execute("!OutletSet=2,OFF").await.unwrap(), "OK");
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(channel.execute("!OutletSet=2,ON").await.unwrap(), "OK");
        assert_eq!(channel.execute("?Model").await.unwrap(), "?Model=WB-800-IPVM-6");
    }

    #[tokio::test]
    async fn test_timeout() {
        let fake = FakeWattBox::new().reply("?Firmware", Duration::ZERO, Reply::Silent);
        let (channel, _log) = channel(fake).await;
        let err = channel
            .execute_with_timeout("?Firmware", Duration::from_millis(100))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Command(CommandError::Timeout { .. })));
        assert!(err.is_timeout());
        assert!(!err.is_connection_lost());
    }

    #[tokio::test]
    async fn test_connection_lost() {
        let fake = FakeWattBox::new().reply("?Firmware", Duration::ZERO, Reply::HangUp);
        let (channel, _log) = channel(fake).await;
        let err = channel.execute("?Firmware").await.unwrap_err();
        assert!(matches!(err, Error::Command(CommandError::Failed { .. })));
        assert!(err.is_connection_lost());
        assert!(channel.is_closed().await);
    }

    #[tokio::test]
    async fn test_mutual_exclusion() {
        let fake = FakeWattBox::new()
            .respond_after("?Firmware", Duration::from_millis(150), "?Firmware=2.4.0.2")
            .respond("?Hostname", "?Hostname=rack-pdu");
        let (channel, log) = channel(fake).await;

        let (firmware, hostname) = join(channel.execute("?Firmware"), async {
            tokio::time::sleep(Duration::from_millis(10)).await;
            channel.execute("?Hostname").await
        })
        .await;

        assert_eq!(firmware.unwrap(), "?Firmware=2.4.0.2");
        assert_eq!(hostname.unwrap(), "?Hostname=rack-pdu");
        assert_eq!(log.commands(), vec!["?Firmware", "?Hostname"]);
    }

    #[tokio::test]
    async fn test_close_sends_exit() {
        let (channel, log) = channel(FakeWattBox::new()).await;
        channel.execute("?Model").await.unwrap();
        channel.close().await;
        channel.close().await;
        assert!(channel.is_closed().await);

        let err = channel.execute("?Model").await.unwrap_err();
        assert!(err.is_connection_lost());

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(log.commands(), vec!["?Model", "!Exit"]);
    }
}
