//! Connection driver.
//!
//! [`Connection`] is a cheap, cloneable handle. Behind it, two tasks own the
//! socket: a reader that turns bytes into frames (and enforces the idle
//! timeout) and a driver that feeds those frames and caller requests through
//! the [`Pipeline`]. When the socket fails, the idle timer fires or the
//! server says BYE, every pending request fails with the same error and the
//! connection is done; callers open a new one.

use std::sync::{Arc, OnceLock};

use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt, WriteHalf};
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, trace, warn};

use super::config::{Config, Security};
use super::framed::FramedReader;
use super::pipeline::{CommandResult, Pipeline, Transmit};
use super::sasl::Credentials;
use super::stream::{self, ImapStream};
use crate::command::{Command, TagGenerator};
use crate::parser::records;
use crate::parser::response::{Response, UntaggedResponse};
use crate::types::{Capabilities, Mailbox, ResponseCode, Status};
use crate::{Error, Result};

/// Frames buffered between the reader and the driver.
const FRAME_BUFFER: usize = 64;

/// Lifecycle of a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// Opening the socket and waiting for the greeting.
    Connecting,
    /// AUTHENTICATE sent, not yet answered.
    Authenticating,
    /// Authenticated; commands run.
    Ready,
    /// Terminal.
    Closed,
}

struct Request {
    command: Command,
    mailbox: Option<Mailbox>,
    reply: oneshot::Sender<Result<CommandResult>>,
}

enum Reply {
    Caller {
        sender: oneshot::Sender<Result<CommandResult>>,
        logout: bool,
    },
    Authenticate,
}

/// Handle to one authenticated IMAP connection.
#[derive(Clone)]
pub struct Connection {
    requests: mpsc::UnboundedSender<Request>,
    state: watch::Receiver<ConnectionState>,
    reason: Arc<OnceLock<Error>>,
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("state", &*self.state.borrow())
            .finish_non_exhaustive()
    }
}

impl Connection {
    /// Opens a socket per `config`, upgrading with STARTTLS when asked, and
    /// starts authenticating.
    ///
    /// Returns once the greeting has been read. Authentication runs as the
    /// first queued command: requests issued meanwhile wait behind it, and
    /// fail with [`Error::Auth`] if it is rejected.
    pub async fn connect(config: Config, credentials: Credentials) -> Result<Self> {
        info!(host = %config.host, port = config.port, security = ?config.security, "connecting");
        let mut stream = stream::open(&config).await?;
        let mut tags = TagGenerator::new(config.tag_prefix);

        if config.security == Security::StartTls {
            starttls(&mut stream, &config, &mut tags).await?;
            stream = stream.upgrade_to_tls(&config).await?;
            debug!(host = %config.host, "TLS established");
            // Pre-TLS capabilities are not trusted; authenticate without SASL-IR.
            return start(stream, config, credentials, tags, Some(Capabilities::default())).await;
        }

        start(stream, config, credentials, tags, None).await
    }

    /// Runs the protocol over an already open stream, starting with the
    /// server greeting.
    pub async fn establish<S>(stream: S, config: Config, credentials: Credentials) -> Result<Self>
    where
        S: AsyncRead + AsyncWrite + Send + Unpin + 'static,
    {
        let tags = TagGenerator::new(config.tag_prefix);
        start(stream, config, credentials, tags, None).await
    }

    /// Runs `command` (with `mailbox` selected first when given) and returns
    /// its result whatever the tagged status.
    pub async fn execute(&self, command: Command, mailbox: Option<Mailbox>) -> Result<CommandResult> {
        let (reply, rx) = oneshot::channel();
        self.requests
            .send(Request {
                command,
                mailbox,
                reply,
            })
            .map_err(|_| self.closed_error())?;
        rx.await.map_err(|_| self.closed_error())?
    }

    /// Runs `command` and returns its untagged payload, failing on NO/BAD.
    pub async fn run(&self, command: Command, mailbox: Option<Mailbox>) -> Result<Vec<Vec<u8>>> {
        self.execute(command, mailbox).await?.into_result()
    }

    /// Sends LOGOUT; the connection closes once the server confirms.
    pub async fn logout(&self) -> Result<()> {
        self.run(Command::Logout, None).await.map(|_| ())
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    /// Subscribes to lifecycle changes.
    #[must_use]
    pub fn watch_state(&self) -> watch::Receiver<ConnectionState> {
        self.state.clone()
    }

    /// Returns true once the connection can no longer run commands.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.requests.is_closed() || self.state() == ConnectionState::Closed
    }

    /// The error that closed the connection, if it is closed.
    #[must_use]
    pub fn close_reason(&self) -> Option<Error> {
        self.reason.get().cloned()
    }

    fn closed_error(&self) -> Error {
        self.close_reason()
            .unwrap_or_else(|| Error::ConnectionClosed("connection closed".to_string()))
    }
}

/// Reads the greeting, sends STARTTLS and waits for the server to agree.
async fn starttls(stream: &mut ImapStream, config: &Config, tags: &mut TagGenerator) -> Result<()> {
    let mut framed = FramedReader::new(&mut *stream);
    let greeting = with_connect_timeout(config, framed.read_frame()).await?;
    log_frame(config, &greeting);
    greeting_capabilities(&greeting)?;

    let tag = tags.next_tag();
    let line = Command::StartTls.serialize(&tag, false).concat();
    log_transmit(config, &Transmit {
        data: line.clone(),
        sensitive: false,
    });
    framed.get_mut().write_all(&line).await?;
    framed.get_mut().flush().await?;

    loop {
        let frame = with_connect_timeout(config, framed.read_frame()).await?;
        log_frame(config, &frame);
        if !tag.matches_line(&frame) {
            continue;
        }
        return match records::parse_response(&frame)? {
            Response::Tagged {
                status: Status::Ok, ..
            } => Ok(()),
            Response::Tagged { text, .. } => Err(Error::No(format!("STARTTLS refused: {text}"))),
            other => Err(Error::Protocol(format!("unexpected STARTTLS reply: {other:?}"))),
        };
    }
}

/// Splits the stream, reads the greeting unless `greeted` already carries
/// the capabilities, and spawns the reader and driver tasks.
async fn start<S>(
    stream: S,
    config: Config,
    credentials: Credentials,
    tags: TagGenerator,
    greeted: Option<Capabilities>,
) -> Result<Connection>
where
    S: AsyncRead + AsyncWrite + Send + Unpin + 'static,
{
    let (read_half, write_half) = tokio::io::split(stream);
    let mut framed = FramedReader::new(read_half).with_idle_timeout(config.idle_timeout);

    let (capabilities, preauth) = match greeted {
        Some(caps) => (caps, false),
        None => {
            let greeting = with_connect_timeout(&config, framed.read_frame()).await?;
            log_frame(&config, &greeting);
            greeting_capabilities(&greeting)?
        }
    };

    let mut pipeline = Pipeline::new(tags);
    pipeline.set_literal_plus(capabilities.has(&crate::types::Capability::LiteralPlus));

    let initial = if preauth {
        info!(host = %config.host, "pre-authenticated");
        ConnectionState::Ready
    } else {
        let (command, continuation) = credentials.authenticate(&capabilities);
        debug!(host = %config.host, mechanism = credentials.mechanism(), "authenticating");
        pipeline.submit_with_continuation(command, None, continuation, Reply::Authenticate);
        ConnectionState::Authenticating
    };

    let (state_tx, state_rx) = watch::channel(initial);
    let (request_tx, request_rx) = mpsc::unbounded_channel();
    let (frame_tx, frame_rx) = mpsc::channel(FRAME_BUFFER);
    let reason = Arc::new(OnceLock::new());

    let reader = tokio::spawn(async move {
        loop {
            let frame = framed.read_frame().await;
            let failed = frame.is_err();
            if frame_tx.send(frame).await.is_err() || failed {
                break;
            }
        }
    });

    let driver = Driver {
        config,
        pipeline,
        writer: write_half,
        frames: frame_rx,
        requests: request_rx,
        state: state_tx,
        reason: Arc::clone(&reason),
        reader,
    };
    tokio::spawn(driver.run());

    Ok(Connection {
        requests: request_tx,
        state: state_rx,
        reason,
    })
}

/// Parses the greeting: capabilities from its response code and whether it
/// was PREAUTH.
fn greeting_capabilities(greeting: &[u8]) -> Result<(Capabilities, bool)> {
    match records::parse_response(greeting)? {
        Response::Untagged(UntaggedResponse::Ok { code, .. }) => Ok((code_capabilities(code), false)),
        Response::Untagged(UntaggedResponse::PreAuth { code, .. }) => {
            Ok((code_capabilities(code), true))
        }
        Response::Untagged(UntaggedResponse::Bye { text, .. }) => Err(Error::Bye(text)),
        other => Err(Error::Protocol(format!("unexpected greeting: {other:?}"))),
    }
}

fn code_capabilities(code: Option<ResponseCode>) -> Capabilities {
    match code {
        Some(ResponseCode::Capability(caps)) => Capabilities::new(caps),
        _ => Capabilities::default(),
    }
}

async fn with_connect_timeout<T>(
    config: &Config,
    fut: impl Future<Output = Result<T>>,
) -> Result<T> {
    tokio::time::timeout(config.connect_timeout, fut)
        .await
        .map_err(|_| Error::Timeout(config.connect_timeout))?
}

fn log_frame(config: &Config, frame: &[u8]) {
    if config.log_traffic {
        trace!(target: "mailpipe_imap::wire", "S: {}", String::from_utf8_lossy(frame).trim_end());
    }
}

fn log_transmit(config: &Config, transmit: &Transmit) {
    if !config.log_traffic {
        return;
    }
    if transmit.sensitive {
        trace!(target: "mailpipe_imap::wire", "C: <{} bytes redacted>", transmit.data.len());
    } else {
        trace!(target: "mailpipe_imap::wire", "C: {}", String::from_utf8_lossy(&transmit.data).trim_end());
    }
}

struct Driver<S> {
    config: Config,
    pipeline: Pipeline<Reply>,
    writer: WriteHalf<S>,
    frames: mpsc::Receiver<Result<Vec<u8>>>,
    requests: mpsc::UnboundedReceiver<Request>,
    state: watch::Sender<ConnectionState>,
    reason: Arc<OnceLock<Error>>,
    reader: JoinHandle<()>,
}

impl<S> Driver<S>
where
    S: AsyncRead + AsyncWrite + Send + Unpin + 'static,
{
    async fn run(mut self) {
        let reason = self.drive().await;
        self.close(reason).await;
    }

    /// Runs until the connection must close; returns why.
    async fn drive(&mut self) -> Error {
        let mut accepting = true;

        loop {
            if let Err(err) = self.flush().await {
                return err;
            }
            if !accepting && self.pipeline.is_idle() {
                return Error::ConnectionClosed("all handles dropped".to_string());
            }

            tokio::select! {
                request = self.requests.recv(), if accepting => match request {
                    Some(Request { command, mailbox, reply }) => {
                        let logout = matches!(command, Command::Logout);
                        self.pipeline.submit(command, mailbox, Reply::Caller { sender: reply, logout });
                    }
                    None => accepting = false,
                },
                frame = self.frames.recv() => {
                    let frame = match frame {
                        Some(Ok(frame)) => frame,
                        Some(Err(err)) => return err,
                        None => return Error::ConnectionClosed("reader stopped".to_string()),
                    };
                    log_frame(&self.config, &frame);
                    match self.pipeline.handle_frame(frame) {
                        Ok(Some((reply, result))) => {
                            if let Some(reason) = self.complete(reply, result) {
                                return reason;
                            }
                        }
                        Ok(None) => {}
                        Err(err) => return err,
                    }
                }
            }
        }
    }

    async fn flush(&mut self) -> Result<()> {
        let mut wrote = false;
        while let Some(transmit) = self.pipeline.poll_transmit() {
            log_transmit(&self.config, &transmit);
            self.writer.write_all(&transmit.data).await?;
            wrote = true;
        }
        if wrote {
            self.writer.flush().await?;
        }
        Ok(())
    }

    /// Delivers one result. Returns a close reason when the command ends the
    /// connection.
    fn complete(&mut self, reply: Reply, result: Result<CommandResult>) -> Option<Error> {
        match reply {
            Reply::Authenticate => match result.and_then(CommandResult::check) {
                Ok(_) => {
                    info!(host = %self.config.host, "authenticated");
                    self.state.send_replace(ConnectionState::Ready);
                    None
                }
                Err(err) => {
                    warn!(host = %self.config.host, error = %err, "authentication failed");
                    Some(err)
                }
            },
            Reply::Caller { sender, logout } => {
                let closing = logout && result.as_ref().is_ok_and(|r| r.status == Status::Ok);
                // The caller may have gone away; the result is simply unobserved.
                let _ = sender.send(result);
                closing.then(|| Error::ConnectionClosed("logged out".to_string()))
            }
        }
    }

    async fn close(mut self, reason: Error) {
        match &reason {
            Error::ConnectionClosed(_) => info!(host = %self.config.host, reason = %reason, "connection closed"),
            _ => warn!(host = %self.config.host, reason = %reason, "connection failed"),
        }
        let _ = self.reason.set(reason.clone());
        self.state.send_replace(ConnectionState::Closed);
        self.reader.abort();
        self.requests.close();

        for reply in self.pipeline.fail_all() {
            if let Reply::Caller { sender, .. } = reply {
                let _ = sender.send(Err(reason.clone()));
            }
        }
        while let Ok(request) = self.requests.try_recv() {
            let _ = request.reply.send(Err(reason.clone()));
        }

        if let Err(err) = self.writer.shutdown().await {
            debug!(error = %err, "shutdown after close");
        }
    }
}
