//! Request engine.
//!
//! One request runs: validate → classify URL → resolve resource uri →
//! reuse or open a connection (retrying only the connect) → one
//! send/receive exchange.
//!
//! # Thread Safety
//!
//! `RiapClient` is `Send + Sync` and meant to be shared. The connection cache
//! sits behind a short-lived std `Mutex` that is never held across an await;
//! each cache key owns a slot with its own tokio lock, so opening a connection
//! for a key happens at most once at a time and a connection carries one
//! request at a time.

mod builder;

pub use builder::RiapClientBuilder;

use std::path::Path;
use std::sync::{Arc, Mutex as StdMutex, MutexGuard, PoisonError};

use serde_json::{Map, Value};
use tokio::sync::Mutex;
use tracing::{debug, trace};

use crate::cache::{CacheStats, ConnectionCache};
use crate::cancel::CancellationToken;
use crate::config::ClientConfig;
use crate::connection::{Connection, Connector};
use crate::error::{Result, RiapError};
use crate::frame::encode_request;
use crate::response::Response;
use crate::retry::{retry_connect, RetryPolicy};
use crate::target::{pipe_url, tcp_url, unix_url, ParsedUrl, TargetDescriptor};
use crate::validate::RequestValidator;

/// A cache slot: the connection for one key, if one is open.
type Slot = Arc<Mutex<Option<Connection>>>;

/// Riap::Simple client over TCP, Unix sockets and subprocess pipes.
///
/// # Example
///
/// ```rust,no_run
/// use riap_simple::RiapClient;
/// use serde_json::json;
///
/// # async fn run() -> riap_simple::Result<()> {
/// let client = RiapClient::new();
/// let extra = json!({"args": {"a": 1}});
/// let response = client
///     .request(
///         "call",
///         "riap+tcp://localhost:5678/Foo/Bar/func",
///         extra.as_object().cloned().unwrap_or_default(),
///     )
///     .await?;
/// println!("{}", response);
/// # Ok(())
/// # }
/// ```
pub struct RiapClient {
    config: ClientConfig,
    connector: Arc<dyn Connector>,
    validator: Arc<dyn RequestValidator>,
    cache: StdMutex<ConnectionCache<Slot>>,
}

impl Default for RiapClient {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for RiapClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RiapClient")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl RiapClient {
    /// Create a client with the default configuration.
    pub fn new() -> Self {
        let config = ClientConfig::default();
        let connector = Arc::new(crate::connection::TransportConnector::new(
            config.connect_timeout,
        ));
        Self::from_parts(config, connector, Arc::new(crate::validate::DefaultValidator))
    }

    /// Create a client with a custom configuration.
    pub fn with_config(config: ClientConfig) -> Result<Self> {
        RiapClientBuilder::new().config(config).build()
    }

    pub fn builder() -> RiapClientBuilder {
        RiapClientBuilder::new()
    }

    pub(crate) fn from_parts(
        config: ClientConfig,
        connector: Arc<dyn Connector>,
        validator: Arc<dyn RequestValidator>,
    ) -> Self {
        let cache = StdMutex::new(ConnectionCache::new(config.connection_cache_size));
        Self {
            config,
            connector,
            validator,
            cache,
        }
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Send one request and return the decoded response unchanged.
    ///
    /// `extra` is passed through verbatim next to `action` and `uri`. The
    /// resource uri comes from the URL if it embeds one, else from
    /// `extra["uri"]`.
    pub async fn request(
        &self,
        action: &str,
        server_url: &str,
        extra: Map<String, Value>,
    ) -> Result<Response> {
        self.request_with_cancel(action, server_url, extra, &CancellationToken::new())
            .await
    }

    /// Like [`request`](Self::request), abandoned with
    /// [`RiapError::Cancelled`] as soon as `cancel` fires.
    ///
    /// A connection cancelled mid-exchange is discarded, since the peer may
    /// still be writing to it.
    pub async fn request_with_cancel(
        &self,
        action: &str,
        server_url: &str,
        extra: Map<String, Value>,
        cancel: &CancellationToken,
    ) -> Result<Response> {
        if server_url.is_empty() {
            return Err(RiapError::validation("Please specify server_url"));
        }

        let request = build_request(action, &extra, None);
        self.validator.check(&request)?;

        let target = TargetDescriptor::classify(server_url)?;
        let uri = target.resolve_uri(&extra)?;
        let request = build_request(action, &extra, Some(uri));
        // Encoding fails before any connection is made.
        let frame = encode_request(&request)?;

        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                debug!("Request to {} cancelled", target.endpoint());
                Err(RiapError::Cancelled)
            }
            result = self.send(&target, &frame) => result,
        }
    }

    /// Request over TCP, addressing `host:port` directly.
    ///
    /// The resource uri must be in `extra["uri"]`.
    pub async fn request_tcp(
        &self,
        action: &str,
        (host, port): (&str, u16),
        extra: Map<String, Value>,
    ) -> Result<Response> {
        self.request(action, &tcp_url(host, port), extra).await
    }

    /// Request over a Unix socket.
    ///
    /// The resource uri must be in `extra["uri"]`.
    pub async fn request_unix(
        &self,
        action: &str,
        socket_path: impl AsRef<Path>,
        extra: Map<String, Value>,
    ) -> Result<Response> {
        self.request(action, &unix_url(socket_path), extra).await
    }

    /// Request over the stdin/stdout of a subprocess started from `command`
    /// (program followed by its arguments).
    ///
    /// The resource uri must be in `extra["uri"]`.
    pub async fn request_pipe<S: AsRef<str>>(
        &self,
        action: &str,
        command: &[S],
        extra: Map<String, Value>,
    ) -> Result<Response> {
        self.request(action, &pipe_url(command)?, extra).await
    }

    /// Classify `server_url` without connecting.
    pub fn parse_url(&self, server_url: &str, extra: &Map<String, Value>) -> Result<ParsedUrl> {
        if server_url.is_empty() {
            return Err(RiapError::validation("Please specify server_url"));
        }
        let target = TargetDescriptor::classify(server_url)?;
        Ok(ParsedUrl::new(&target, extra))
    }

    /// Drop the cached connection for `server_url`. Returns whether one was
    /// cached.
    pub fn invalidate(&self, server_url: &str) -> Result<bool> {
        let key = TargetDescriptor::classify(server_url)?.cache_key();
        Ok(self.lock_cache().invalidate(&key))
    }

    /// Drop every cached connection. Returns how many were cached.
    pub fn invalidate_all(&self) -> usize {
        self.lock_cache().invalidate_all()
    }

    /// Cache keys of the open connections, least recently used first.
    pub fn cached_keys(&self) -> Vec<String> {
        self.lock_cache().keys().map(str::to_string).collect()
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.lock_cache().stats()
    }

    fn lock_cache(&self) -> MutexGuard<'_, ConnectionCache<Slot>> {
        self.cache.lock().unwrap_or_else(PoisonError::into_inner)
    }

    async fn send(&self, target: &TargetDescriptor, frame: &[u8]) -> Result<Response> {
        let key = target.cache_key();
        let slot = self
            .lock_cache()
            .get_or_insert_with(&key, Slot::default)
            .clone();
        let mut guard = slot.lock().await;

        // From here on the slot is empty until the exchange succeeds. The
        // claim removes it from the cache on every other way out, including
        // this future being dropped by a cancel or an outer timeout.
        let claim = SlotClaim {
            client: self,
            key: &key,
            slot: &slot,
        };

        let cached = guard.take().and_then(|mut connection| {
            if connection.is_stale() {
                debug!("Discarding stale connection {}", key);
                None
            } else {
                trace!("Reusing connection {}", key);
                Some(connection)
            }
        });
        let mut connection = match cached {
            Some(connection) => connection,
            None => self.connect(target).await?,
        };

        let exchange = connection.exchange(frame, self.config.max_response_size);
        let result = match self.config.io_timeout {
            Some(limit) => tokio::time::timeout(limit, exchange)
                .await
                .unwrap_or_else(|_| {
                    Err(RiapError::Timeout {
                        operation: "waiting for response",
                        after: limit,
                    })
                }),
            None => exchange.await,
        };

        match result {
            Ok(response) => {
                *guard = Some(connection);
                claim.release();
                Ok(response)
            }
            Err(e) => {
                debug!("Dropping connection {} after failed exchange: {}", key, e);
                Err(e)
            }
        }
    }

    async fn connect(&self, target: &TargetDescriptor) -> Result<Connection> {
        let policy = RetryPolicy::new(self.config.retries, self.config.retry_delay);
        let (result, state) = retry_connect(&policy, || self.connector.connect(target)).await;
        if state.attempts_made > 1 {
            debug!(
                "Connect to {} took {} attempts ({:?} paused)",
                target.endpoint(),
                state.attempts_made,
                state.total_delay
            );
        }
        result
    }

    /// Remove `key` from the cache if it still maps to `slot`.
    fn forget(&self, key: &str, slot: &Slot) {
        let mut cache = self.lock_cache();
        if cache.peek(key).is_some_and(|cached| Arc::ptr_eq(cached, slot)) {
            cache.invalidate(key);
        }
    }
}

/// Exclusive hold on an emptied cache slot.
///
/// Dropping it without [`release`](Self::release) forgets the slot, so a
/// failed, timed-out or cancelled request leaves no entry behind.
struct SlotClaim<'a> {
    client: &'a RiapClient,
    key: &'a str,
    slot: &'a Slot,
}

impl SlotClaim<'_> {
    /// The slot holds a live connection again; keep it cached.
    fn release(self) {
        std::mem::forget(self);
    }
}

impl Drop for SlotClaim<'_> {
    fn drop(&mut self) {
        self.client.forget(self.key, self.slot);
    }
}

/// Assemble `{action, uri?, ...extra}`.
///
/// `action` and `uri` always come first; the caller's `action` wins over one
/// in `extra`, and a resolved uri wins over `extra["uri"]`.
fn build_request(action: &str, extra: &Map<String, Value>, uri: Option<String>) -> Map<String, Value> {
    let mut request = Map::with_capacity(extra.len() + 2);
    request.insert("action".to_string(), Value::String(action.to_string()));
    match uri {
        Some(uri) => {
            request.insert("uri".to_string(), Value::String(uri));
        }
        None => {
            if let Some(uri) = extra.get("uri") {
                request.insert("uri".to_string(), uri.clone());
            }
        }
    }
    for (key, value) in extra {
        if key != "action" && key != "uri" {
            request.insert(key.clone(), value.clone());
        }
    }
    request
}
