//! Builder for configuring a RiapClient.

use std::sync::Arc;

use super::RiapClient;
use crate::config::ClientConfig;
use crate::connection::{Connector, TransportConnector};
use crate::error::Result;
use crate::validate::{DefaultValidator, RequestValidator};

/// Builder for configuring a [`RiapClient`].
///
/// # Example
///
/// ```rust,no_run
/// use riap_simple::{ClientConfig, RiapClient};
/// use std::time::Duration;
///
/// let client = RiapClient::builder()
///     .config(
///         ClientConfig::new()
///             .with_retries(5)
///             .with_retry_delay(Duration::from_millis(500)),
///     )
///     .build()?;
/// # Ok::<(), riap_simple::RiapError>(())
/// ```
pub struct RiapClientBuilder {
    config: ClientConfig,
    connector: Option<Arc<dyn Connector>>,
    validator: Arc<dyn RequestValidator>,
}

impl Default for RiapClientBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl RiapClientBuilder {
    pub fn new() -> Self {
        Self {
            config: ClientConfig::default(),
            connector: None,
            validator: Arc::new(DefaultValidator),
        }
    }

    /// Replace the whole configuration.
    pub fn config(mut self, config: ClientConfig) -> Self {
        self.config = config;
        self
    }

    /// Use a custom connector instead of the built-in transports.
    ///
    /// Default: [`TransportConnector`] with the configured connect timeout.
    pub fn connector(mut self, connector: Arc<dyn Connector>) -> Self {
        self.connector = Some(connector);
        self
    }

    /// Use a custom pre-flight request check.
    ///
    /// Default: [`DefaultValidator`]
    pub fn validator(mut self, validator: Arc<dyn RequestValidator>) -> Self {
        self.validator = validator;
        self
    }

    /// Build the client.
    pub fn build(self) -> Result<RiapClient> {
        self.config.validate()?;

        let connector = self
            .connector
            .unwrap_or_else(|| Arc::new(TransportConnector::new(self.config.connect_timeout)));

        Ok(RiapClient::from_parts(self.config, connector, self.validator))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::RiapError;
    use crate::validate::NoValidation;

    #[test]
    fn test_build_defaults() {
        let client = RiapClientBuilder::new().build().unwrap();
        assert_eq!(client.config().retries, ClientConfig::DEFAULT_RETRIES);
        assert_eq!(client.cache_stats().capacity, 32);
    }

    #[test]
    fn test_build_rejects_bad_config() {
        let result = RiapClientBuilder::new()
            .config(ClientConfig::new().with_connection_cache_size(0))
            .build();
        assert!(matches!(result, Err(RiapError::Config { .. })));
    }

    #[test]
    fn test_build_with_validator() {
        let client = RiapClientBuilder::new()
            .validator(Arc::new(NoValidation))
            .config(ClientConfig::new().with_connection_cache_size(4))
            .build()
            .unwrap();
        assert_eq!(client.cache_stats().capacity, 4);
    }
}
