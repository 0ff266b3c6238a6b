//! Scripted WattBox and HTTP responder for tests.

use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::net::TcpListener;

use crate::channel::{Authenticator, CommandChannel};
use crate::transport::{
    CommandConfig, HttpConfig, LineTransport, LoginConfig, ReadConfig, TelnetConfig,
};

/// How the fake answers one command.
#[derive(Debug, Clone)]
pub(crate) enum Reply {
    /// Sent verbatim followed by `\n`; may hold several lines.
    Lines(String),
    /// Never answered.
    Silent,
    /// Connection dropped.
    HangUp,
}

#[derive(Debug, Clone)]
struct Rule {
    pattern: String,
    delay: Duration,
    reply: Reply,
}

impl Rule {
    fn matches(&self, command: &str) -> bool {
        match self.pattern.strip_suffix('*') {
            Some(prefix) => command.starts_with(prefix),
            None => command == self.pattern,
        }
    }
}

/// Commands received by a fake, shared with the test.
#[derive(Debug, Clone, Default)]
pub(crate) struct CommandLog(Arc<Mutex<Vec<String>>>);

impl CommandLog {
    fn push(&self, command: &str) {
        self.0.lock().unwrap().push(command.to_string());
    }

    pub(crate) fn commands(&self) -> Vec<String> {
        self.0.lock().unwrap().clone()
    }

    pub(crate) fn count(&self, command: &str) -> usize {
        self.0.lock().unwrap().iter().filter(|c| *c == command).count()
    }

    pub(crate) fn count_prefix(&self, prefix: &str) -> usize {
        self.0
            .lock()
            .unwrap()
            .iter()
            .filter(|c| c.starts_with(prefix))
            .count()
    }
}

/// A WattBox WB-800-IPVM-6 speaking the integration protocol.
#[derive(Debug, Clone)]
pub(crate) struct FakeWattBox {
    username: String,
    password: String,
    silent_login: bool,
    rules: Vec<Rule>,
}

impl FakeWattBox {
    pub(crate) fn new() -> Self {
        let mut fake = Self {
            username: "wattbox".into(),
            password: "wattbox".into(),
            silent_login: false,
            rules: Vec::new(),
        };
        fake = fake
            .respond("?Firmware", "?Firmware=2.4.0.2")
            .respond("?Hostname", "?Hostname=rack-pdu")
            .respond("?ServiceTag", "?ServiceTag=ST12345678")
            .respond("?Model", "?Model=WB-800-IPVM-6")
            .respond("?OutletCount", "?OutletCount=6")
            .respond("?OutletStatus", "?OutletStatus=1,1,0,1,0,1")
            .respond(
                "?OutletName",
                "?OutletName={Router},{Switch},{Camera},{NVR},{AP},{Spare}",
            )
            .respond("?PowerStatus", "?PowerStatus=3.20,345.10,119.80,1")
            .respond("?UPSConnection", "?UPSConnection=0")
            .respond("?AutoReboot", "?AutoReboot=1")
            .respond("!*", "OK");
        for i in 1..=6 {
            fake = fake.respond(
                &format!("?OutletPowerStatus={i}"),
                &format!("?OutletPowerStatus={i},{}.50,0.{i}0,119.80", i * 10),
            );
        }
        fake
    }

    pub(crate) fn credentials(mut self, username: &str, password: &str) -> Self {
        self.username = username.into();
        self.password = password.into();
        self
    }

    /// Never send a login prompt.
    pub(crate) fn silent_login(mut self) -> Self {
        self.silent_login = true;
        self
    }

    /// Answer `pattern` (exact, or prefix when it ends in `*`). Later
    /// rules win over earlier ones.
    pub(crate) fn respond(self, pattern: &str, response: &str) -> Self {
        self.reply(pattern, Duration::ZERO, Reply::Lines(response.into()))
    }

    pub(crate) fn respond_after(self, pattern: &str, delay: Duration, response: &str) -> Self {
        self.reply(pattern, delay, Reply::Lines(response.into()))
    }

    pub(crate) fn reply(mut self, pattern: &str, delay: Duration, reply: Reply) -> Self {
        self.rules.push(Rule {
            pattern: pattern.into(),
            delay,
            reply,
        });
        self
    }

    /// Serve one session over an in-memory pipe.
    pub(crate) fn serve_duplex(self) -> (tokio::io::DuplexStream, CommandLog) {
        let (client, device) = tokio::io::duplex(4096);
        let log = CommandLog::default();
        let session_log = log.clone();
        tokio::spawn(async move { self.session(device, session_log).await });
        (client, log)
    }

    /// Serve every connection to a loopback listener.
    pub(crate) async fn serve_tcp(self) -> (SocketAddr, CommandLog) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let log = CommandLog::default();
        let accept_log = log.clone();
        tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                let fake = self.clone();
                let log = accept_log.clone();
                tokio::spawn(async move { fake.session(stream, log).await });
            }
        });
        (addr, log)
    }

    async fn session<S>(self, stream: S, log: CommandLog)
    where
        S: AsyncRead + AsyncWrite + Unpin + Send,
    {
        let (reader, mut writer) = tokio::io::split(stream);
        let mut reader = BufReader::new(reader);

        if self.silent_login {
            let mut sink = Vec::new();
            let _ = reader.read_to_end(&mut sink).await;
            return;
        }

        // IAC WILL ECHO, IAC WILL SUPPRESS-GO-AHEAD
        let _ = writer
            .write_all(b"\xff\xfb\x01\xff\xfb\x03\r\nWattBox WB-800 login: ")
            .await;
        let Some(username) = read_line(&mut reader).await else { return };
        let _ = writer.write_all(b"Password: ").await;
        let Some(password) = read_line(&mut reader).await else { return };

        if username != self.username || password != self.password {
            let _ = writer.write_all(b"\r\nInvalid Login\r\nlogin: ").await;
            let _ = read_line(&mut reader).await;
            return;
        }
        let _ = writer.write_all(b"\r\nSuccessfully Logged In!\r\n").await;

        while let Some(command) = read_line(&mut reader).await {
            if command.is_empty() {
                continue;
            }
            log.push(&command);
            if command == "!Exit" {
                return;
            }

            let rule = self.rules.iter().rev().find(|rule| rule.matches(&command));
            let (delay, reply) = match rule {
                Some(rule) => (rule.delay, rule.reply.clone()),
                None => (Duration::ZERO, Reply::Lines("#Error".into())),
            };
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            match reply {
                Reply::Lines(text) => {
                    if writer.write_all(format!("{text}\n").as_bytes()).await.is_err() {
                        return;
                    }
                }
                Reply::Silent => {}
                Reply::HangUp => return,
            }
        }
    }
}

async fn read_line<R: AsyncBufReadExt + Unpin>(reader: &mut R) -> Option<String> {
    let mut line = String::new();
    match reader.read_line(&mut line).await {
        Ok(0) | Err(_) => None,
        Ok(_) => Some(line.trim().to_string()),
    }
}

pub(crate) fn read_config() -> ReadConfig {
    ReadConfig {
        chunk_timeout: Duration::from_millis(20),
        drain_timeout: Duration::from_millis(5),
        ..ReadConfig::default()
    }
}

pub(crate) fn login_config() -> LoginConfig {
    LoginConfig {
        prompt_timeout: Duration::from_millis(500),
        settle: Duration::from_millis(20),
        settle_read_window: Duration::from_millis(200),
    }
}

pub(crate) fn command_config() -> CommandConfig {
    CommandConfig {
        timeout: Duration::from_secs(1),
        cross_talk_timeout: Duration::from_millis(100),
        cross_talk_reads: 3,
    }
}

/// Fast-timing Telnet config pointing at `addr`.
pub(crate) fn telnet_config(addr: SocketAddr) -> TelnetConfig {
    let mut config = TelnetConfig::new(addr.ip().to_string(), "wattbox", "wattbox");
    config.port = addr.port();
    config.connect_timeout = Duration::from_secs(1);
    config.read = read_config();
    config.login = login_config();
    config.command = command_config();
    config
}

/// Log in to `fake` over a pipe and hand back the command channel.
pub(crate) async fn channel(
    fake: FakeWattBox,
) -> (CommandChannel<tokio::io::DuplexStream>, CommandLog) {
    let (stream, log) = fake.serve_duplex();
    let transport = LineTransport::from_stream(stream, read_config());
    let mut auth = Authenticator::new("wattbox", "wattbox".to_string().into(), login_config());
    let session = auth.authenticate(transport).await.unwrap();
    (session.into_channel(command_config()), log)
}

/// One request as seen by [`FakeHttp`].
#[derive(Debug, Clone)]
pub(crate) struct HttpRequest {
    /// Path and query string.
    pub(crate) target: String,
    pub(crate) authorization: Option<String>,
}

type Handler = dyn Fn(&str) -> (u16, String) + Send + Sync;

/// Loopback HTTP/1.1 responder; one request per connection.
pub(crate) struct FakeHttp {
    addr: SocketAddr,
    requests: Arc<Mutex<Vec<HttpRequest>>>,
}

impl FakeHttp {
    /// `handler` maps a request target to status and body.
    pub(crate) async fn start<F>(handler: F) -> Self
    where
        F: Fn(&str) -> (u16, String) + Send + Sync + 'static,
    {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let requests = Arc::new(Mutex::new(Vec::new()));
        let handler: Arc<Handler> = Arc::new(handler);

        let seen = requests.clone();
        tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                let seen = seen.clone();
                let handler = handler.clone();
                tokio::spawn(async move {
                    let (reader, mut writer) = stream.into_split();
                    let mut reader = BufReader::new(reader);

                    let Some(request_line) = read_line(&mut reader).await else { return };
                    let target = request_line
                        .split_whitespace()
                        .nth(1)
                        .unwrap_or("/")
                        .to_string();
                    let mut authorization = None;
                    while let Some(header) = read_line(&mut reader).await {
                        if header.is_empty() {
                            break;
                        }
                        if let Some((name, value)) = header.split_once(':') {
                            if name.eq_ignore_ascii_case("authorization") {
                                authorization = Some(value.trim().to_string());
                            }
                        }
                    }
                    seen.lock().unwrap().push(HttpRequest {
                        target: target.clone(),
                        authorization,
                    });

                    let (status, body) = handler(&target);
                    let response = format!(
                        "HTTP/1.1 {status} X\r\nContent-Type: text/xml\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
                        body.len()
                    );
                    let _ = writer.write_all(response.as_bytes()).await;
                    let _ = writer.shutdown().await;
                });
            }
        });

        Self { addr, requests }
    }

    pub(crate) fn port(&self) -> u16 {
        self.addr.port()
    }

    pub(crate) fn requests(&self) -> Vec<HttpRequest> {
        self.requests.lock().unwrap().clone()
    }

    /// Config with default credentials pointing at this responder.
    pub(crate) fn config(&self) -> HttpConfig {
        let mut config = HttpConfig::new("127.0.0.1", "wattbox", "wattbox");
        config.port = self.port();
        config.timeout = Duration::from_secs(2);
        config
    }
}
