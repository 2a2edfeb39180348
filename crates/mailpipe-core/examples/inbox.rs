//! Lists mailboxes and prints the threaded newest messages of INBOX.
//!
//! ```sh
//! MAILPIPE_URL=imaps://jo@imap.example.com cargo run --example inbox -- [search text]
//! ```
//!
//! The password comes from the URL or the system keyring entry
//! `user@host:port` of the `mailpipe` service. Set `RUST_LOG` to adjust
//! logging; `MAILPIPE_TRACE=1` also dumps the wire traffic.

use mailpipe_core::thread::{ThreadIndex, thread_records};
use mailpipe_core::{AccountConfig, Error, Field, Mailbox, Registry, SearchQuery};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const COUNT: u32 = 20;

#[tokio::main]
async fn main() -> mailpipe_core::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "mailpipe_core=info,mailpipe_imap=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let url = std::env::var("MAILPIPE_URL")
        .map_err(|_| Error::Config("set MAILPIPE_URL to an imap:// or imaps:// URL".into()))?;
    let trace = std::env::var_os("MAILPIPE_TRACE").is_some();

    let registry = Registry::new();
    let account = registry.add(AccountConfig::new("default", url).with_log_traffic(trace))?;
    info!(address = %account.config().address().unwrap_or_default(), "account ready");

    for entry in account.mailboxes().await?.iter() {
        let unseen = entry
            .status
            .and_then(|counts| counts.unseen)
            .map(|n| format!(" ({n} unseen)"))
            .unwrap_or_default();
        println!("{}{unseen}", entry.mailbox);
    }

    let inbox = Mailbox::inbox();
    let mut records = match std::env::args().nth(1) {
        Some(text) => {
            let query = SearchQuery::field(Field::Subject, text.clone())
                .or(SearchQuery::field(Field::From, text));
            account.search(&inbox, query).await?
        }
        None => account.fetch_range(&inbox, COUNT, false).await?,
    };

    let threads = thread_records(&records);
    let index = ThreadIndex::new(&threads);
    records.sort_by_key(|r| r.uid.and_then(|uid| index.get(uid)).map(|p| p.position));
    for record in &records {
        let Some(uid) = record.uid else { continue };
        let indent = index.get(uid).map_or(0, |p| usize::from(p.level) * 2);
        println!(
            "{:>6} {:indent$}{}",
            uid.get(),
            "",
            record.subject().unwrap_or("(no subject)")
        );
    }

    registry.disconnect_all().await;
    Ok(())
}
