// Resource fetcher: turns a URL into raw bytes. No retry; the first failure is final.

use std::sync::OnceLock;

use async_trait::async_trait;
use bytes::Bytes;
use reqwest::Client;
use tracing::{debug, info, instrument, trace};

use crate::config::FetcherConfig;
use crate::error::MirrorError;
use crate::proxy::build_proxy_from_config;

#[async_trait]
pub trait ResourceFetcher: Send + Sync {
    /// Fetch the body behind `url`. Non-success statuses are errors.
    async fn fetch(&self, url: &str) -> Result<Bytes, MirrorError>;
}

pub fn install_rustls_provider() {
    static PROVIDER_INSTALLED: OnceLock<()> = OnceLock::new();
    PROVIDER_INSTALLED.get_or_init(|| {
        if let Err(e) = rustls::crypto::aws_lc_rs::default_provider().install_default() {
            // Another crate got there first.
            debug!(existing_provider = ?e, "rustls CryptoProvider already installed");
        }
    });
}

/// Create a reqwest Client with the provided configuration
pub fn create_client(config: &FetcherConfig) -> Result<Client, MirrorError> {
    install_rustls_provider();

    let mut client_builder = Client::builder()
        .pool_max_idle_per_host(config.pool_max_idle_per_host)
        .default_headers(config.headers.to_header_map()?)
        .redirect(if config.follow_redirects {
            reqwest::redirect::Policy::limited(10)
        } else {
            reqwest::redirect::Policy::none()
        });

    if !config.timeout.is_zero() {
        client_builder = client_builder.timeout(config.timeout);
    }

    if let Some(proxy_config) = &config.proxy {
        client_builder = client_builder.proxy(build_proxy_from_config(proxy_config)?);
        info!(proxy_url = %proxy_config.url, "Using explicitly configured proxy");
    } else if !config.use_system_proxy {
        client_builder = client_builder.no_proxy();
        debug!("Proxy disabled");
    }

    client_builder
        .build()
        .map_err(|e| MirrorError::configuration(format!("failed to build HTTP client: {e}")))
}

/// [`ResourceFetcher`] backed by a shared reqwest client.
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: Client,
}

impl HttpFetcher {
    pub fn new(config: &FetcherConfig) -> Result<Self, MirrorError> {
        Ok(Self {
            client: create_client(config)?,
        })
    }
}

#[async_trait]
impl ResourceFetcher for HttpFetcher {
    #[instrument(skip(self), level = "debug")]
    async fn fetch(&self, url: &str) -> Result<Bytes, MirrorError> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| MirrorError::network(url, e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(MirrorError::http_status(status, url));
        }

        trace!(url, http_version = ?response.version(), "Response received");

        let bytes = response
            .bytes()
            .await
            .map_err(|e| MirrorError::network(url, e))?;

        debug!(url, size = bytes.len(), "Fetched resource");
        Ok(bytes)
    }
}
