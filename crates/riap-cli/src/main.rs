//! riap - command-line client for Riap::Simple servers.
//!
//! Sends one request and prints the decoded response as JSON. On failure the
//! error is printed as a Riap envelope `[status, message]` and the exit code
//! is non-zero.

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use riap_simple::{ClientConfig, RiapClient};
use serde_json::{Map, Value};
use std::process::ExitCode;
use std::time::Duration;
use tracing::{debug, Level};
use tracing_subscriber::FmtSubscriber;

#[derive(Parser, Debug)]
#[command(name = "riap")]
#[command(about = "Send Riap::Simple requests over TCP, Unix sockets or subprocess pipes")]
struct Args {
    /// Enable debug logging
    #[arg(short, long, global = true)]
    debug: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Send one request and print the response
    Request {
        /// Server URL, e.g. riap+tcp://localhost:5678/Foo/Bar/func
        url: String,

        /// Riap action, e.g. call, meta, info
        action: String,

        /// Extra request fields as a JSON object, e.g. '{"args":{"a":1}}'
        #[arg(short, long)]
        extra: Option<String>,

        /// Additional connect attempts after the first
        #[arg(long, default_value_t = ClientConfig::DEFAULT_RETRIES)]
        retries: u32,

        /// Seconds to wait between connect attempts
        #[arg(long, default_value_t = ClientConfig::DEFAULT_RETRY_DELAY.as_secs_f64())]
        retry_delay: f64,
    },

    /// Classify a server URL without connecting
    ParseUrl {
        /// Server URL
        url: String,

        /// Extra request fields as a JSON object; `uri` is used when the URL
        /// carries none
        #[arg(short, long)]
        extra: Option<String>,
    },
}

fn parse_extra(extra: Option<&str>) -> Result<Map<String, Value>> {
    let Some(raw) = extra else {
        return Ok(Map::new());
    };
    match serde_json::from_str(raw).context("--extra is not valid JSON")? {
        Value::Object(map) => Ok(map),
        other => bail!("--extra must be a JSON object, got: {}", other),
    }
}

async fn run(command: Command) -> Result<std::result::Result<Value, riap_simple::RiapError>> {
    match command {
        Command::Request {
            url,
            action,
            extra,
            retries,
            retry_delay,
        } => {
            let extra = parse_extra(extra.as_deref())?;
            let retry_delay = Duration::try_from_secs_f64(retry_delay)
                .context("--retry-delay must be a non-negative number of seconds")?;
            let config = ClientConfig::new()
                .with_retries(retries)
                .with_retry_delay(retry_delay);
            let client = RiapClient::with_config(config)?;

            debug!("Sending {} to {}", action, url);
            Ok(client.request(&action, &url, extra).await)
        }
        Command::ParseUrl { url, extra } => {
            let extra = parse_extra(extra.as_deref())?;
            let client = RiapClient::new();
            Ok(client
                .parse_url(&url, &extra)
                .map(|parsed| serde_json::to_value(parsed).unwrap_or(Value::Null)))
        }
    }
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let args = Args::parse();

    // Set up logging
    let log_level = if args.debug { Level::DEBUG } else { Level::WARN };
    FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_thread_ids(false)
        .compact()
        .init();

    match run(args.command).await? {
        Ok(value) => {
            println!("{}", serde_json::to_string_pretty(&value)?);
            Ok(ExitCode::SUCCESS)
        }
        Err(e) => {
            println!("{}", e.into_envelope());
            Ok(ExitCode::FAILURE)
        }
    }
}
