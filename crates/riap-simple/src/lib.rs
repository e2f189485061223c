//! Riap Simple - client for the Riap::Simple request/response protocol.
//!
//! Sends Riap requests (`action` + resource `uri` + extra fields) to a server
//! reachable over one of three transports, selected by URL:
//!
//! - `riap+tcp://host:port[/uri]`
//! - `riap+unix:<socket path>[//uri]`
//! - `riap+pipe:<program>[//arg/arg/...][//uri]`, speaking to the program's
//!   stdin/stdout
//!
//! Connections are cached per endpoint, checked for staleness before reuse,
//! and reopened transparently. Only connection establishment is retried.
//!
//! # Example
//!
//! ```rust,ignore
//! use riap_simple::RiapClient;
//! use serde_json::json;
//!
//! #[tokio::main]
//! async fn main() -> riap_simple::Result<()> {
//!     let client = RiapClient::new();
//!
//!     let extra = json!({"args": {"a": 1}});
//!     let response = client
//!         .request("call", "riap+tcp://localhost:5678/Foo/Bar/func", extra.as_object().unwrap().clone())
//!         .await?;
//!     println!("{}", response);
//!
//!     Ok(())
//! }
//! ```

pub mod cache;
pub mod cancel;
pub mod config;
pub mod connection;
pub mod error;
pub mod frame;
pub mod platform;
pub mod response;
pub mod retry;
pub mod target;
pub mod validate;

mod client;

// Re-export commonly used types
pub use cache::{CacheStats, ConnectionCache};
pub use cancel::CancellationToken;
pub use client::{RiapClient, RiapClientBuilder};
pub use config::{ClientConfig, FrameConfig};
pub use connection::{Connection, Connector, TransportConnector};
pub use error::{Result, RiapError};
pub use response::{Envelope, Response};
pub use retry::{RetryPolicy, RetryState};
pub use target::{pipe_url, tcp_url, unix_url, ParsedUrl, TargetDescriptor};
pub use validate::{DefaultValidator, NoValidation, RequestValidator};
