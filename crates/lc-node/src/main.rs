//! # lc-node
//!
//! Command-line instance of the channel over a file-backed cookie jar.
//!
//! ```text
//! lc-node listen play pause        # print matching events as JSON lines
//! lc-node send play '"video1"' 30  # queue an event for every other process
//! ```
//!
//! ## Environment Variables
//!
//! | Variable | Default | Description |
//! |----------|---------|-------------|
//! | `LC_JAR_PATH` | `./localconnection.jar` | Shared cookie jar file |
//! | `LC_NAME` | `localconnection` | Cookie name of the queue |
//! | `LC_DEBUG` | `false` | Log every sent event and callback |
//! | `LC_POLL_INTERVAL_MS` | `100` | Polling interval |
//! | `LC_LOG_LEVEL` | `info` | Log filter |

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use serde_json::{json, Value};
use tracing::info;

use local_connection::{init_logging, ConnectionConfig, CookieStore, LocalConnection, LogConfig};

const DEFAULT_JAR_PATH: &str = "./localconnection.jar";

const USAGE: &str = "usage:\n  lc-node send <event> [json-arg ...]\n  lc-node listen <event> [event ...]";

/// Parsed command line.
#[derive(Debug, PartialEq)]
enum Command {
    Send { event: String, args: Vec<Value> },
    Listen { events: Vec<String> },
}

/// Arguments that are not valid JSON are sent as plain strings.
fn parse_arg(raw: &str) -> Value {
    serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()))
}

fn parse_command(args: &[String]) -> Result<Command> {
    match args {
        [cmd, event, rest @ ..] if cmd == "send" => Ok(Command::Send {
            event: event.clone(),
            args: rest.iter().map(|a| parse_arg(a)).collect(),
        }),
        [cmd, events @ ..] if cmd == "listen" && !events.is_empty() => Ok(Command::Listen {
            events: events.to_vec(),
        }),
        _ => bail!("{USAGE}"),
    }
}

fn jar_path() -> PathBuf {
    std::env::var("LC_JAR_PATH")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from(DEFAULT_JAR_PATH))
}

fn open(config: ConnectionConfig) -> Result<LocalConnection> {
    let path = jar_path();
    let store = Arc::new(CookieStore::open(&path));
    LocalConnection::new(config, store)
        .with_context(|| format!("Failed to open channel on {}", path.display()))
}

fn send(event: &str, args: Vec<Value>) -> Result<()> {
    // A sending process must not wipe what others queued.
    let conn = open(ConnectionConfig::from_env().with_preserve_on_start(true))?;
    conn.send(event, args).context("Failed to send event")?;
    info!(id = %conn.id(), event, "Event queued");
    Ok(())
}

async fn listen(events: Vec<String>) -> Result<()> {
    let conn = open(ConnectionConfig::from_env())?;

    for event in events {
        let name = event.clone();
        conn.add_callback(event, move |args| {
            println!("{}", json!({ "event": name, "args": args }));
            Ok(())
        });
    }

    let listener = conn.listen().context("Failed to start listener")?;
    info!(id = %conn.id(), channel = conn.name(), "Listening. Press Ctrl+C to stop.");

    tokio::signal::ctrl_c().await?;
    listener.cancel().await;
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    init_logging(&LogConfig::from_env())?;

    let args: Vec<String> = std::env::args().skip(1).collect();
    match parse_command(&args)? {
        Command::Send { event, args } => send(&event, args),
        Command::Listen { events } => listen(events).await,
    }
}
