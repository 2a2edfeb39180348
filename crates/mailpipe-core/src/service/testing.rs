//! In-memory IMAP server for request-layer tests.
//!
//! Every connection gets its own duplex pipe. AUTHENTICATE and LOGOUT are
//! answered here; any other command line is passed, without its tag, to
//! the handler, whose reply has each `$` replaced by the command's tag.
//! A reply of [`HANGUP`] closes the connection instead.

#![allow(clippy::unwrap_used)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use futures::FutureExt;
use futures::future::BoxFuture;
use mailpipe_imap::{Config, Connection, Credentials};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, DuplexStream};

use super::registry::Connector;

type Handler = dyn Fn(&str) -> String + Send + Sync;

pub const HANGUP: &str = "<hangup>";

pub const GREETING: &str = "* OK [CAPABILITY IMAP4rev1 SASL-IR] ready\r\n";

#[derive(Clone)]
pub struct FakeServer {
    handler: Arc<Handler>,
    lines: Arc<Mutex<Vec<String>>>,
    connects: Arc<AtomicUsize>,
}

impl FakeServer {
    pub fn new(handler: impl Fn(&str) -> String + Send + Sync + 'static) -> Self {
        Self {
            handler: Arc::new(handler),
            lines: Arc::default(),
            connects: Arc::default(),
        }
    }

    /// Every command line received, tags stripped.
    pub fn commands(&self) -> Vec<String> {
        self.lines.lock().unwrap().clone()
    }

    /// Received command lines starting with `prefix`.
    pub fn count(&self, prefix: &str) -> usize {
        self.commands().iter().filter(|l| l.starts_with(prefix)).count()
    }

    pub fn connects(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }

    async fn serve(self, stream: DuplexStream) {
        let (read, mut write) = tokio::io::split(stream);
        let mut reader = BufReader::new(read);
        write.write_all(GREETING.as_bytes()).await.unwrap();

        let mut line = String::new();
        loop {
            line.clear();
            if reader.read_line(&mut line).await.unwrap_or(0) == 0 {
                return;
            }
            let text = line.trim_end();
            let (tag, command) = text.split_once(' ').unwrap_or((text, ""));
            let command = command.to_string();
            let tag = tag.to_string();

            let reply = if command.starts_with("AUTHENTICATE") {
                format!("{tag} OK authenticated\r\n")
            } else if command == "LOGOUT" {
                format!("* BYE logging out\r\n{tag} OK done\r\n")
            } else {
                self.lines.lock().unwrap().push(command.clone());
                (self.handler)(&command).replace('$', &tag)
            };
            if reply == HANGUP {
                return;
            }

            if write.write_all(reply.as_bytes()).await.is_err() || command == "LOGOUT" {
                return;
            }
        }
    }
}

impl Connector for FakeServer {
    fn connect(
        &self,
        config: Config,
        credentials: Credentials,
    ) -> BoxFuture<'static, mailpipe_imap::Result<Connection>> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        let (client, server) = tokio::io::duplex(64 * 1024);
        tokio::spawn(self.clone().serve(server));
        Connection::establish(client, config, credentials).boxed()
    }
}
