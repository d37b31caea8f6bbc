// footprint-core: Retry and cache decorators over the Footprint API client
//
// The stack is assembled inside-out: `HttpClient` talks to the service,
// `RetryClient` recovers from expired sessions and timeouts, and
// `CachingClient` answers repeated listings locally.

pub mod cache;
pub mod config;
pub mod retry;

pub use cache::{CachingClient, DEFAULT_CATEGORY};
pub use config::{CacheConfig, ClientConfig, RetryPolicy};
pub use retry::RetryClient;

// Re-export the contract so most callers only need this crate.
pub use footprint_api::{Credentials, Error, FootprintClient, HttpClient};

use tracing::info;

/// The full decorator stack returned by [`connect`].
pub type Client = CachingClient<RetryClient<HttpClient>>;

/// Build the transport, wrap it in retry and caching layers, and log in.
pub async fn connect(config: ClientConfig) -> Result<Client, Error> {
    let transport = HttpClient::new(
        config.base_url.as_str(),
        config.credentials,
        &config.transport,
    )?
    .with_batcher(config.batcher);

    let client = CachingClient::new(RetryClient::new(transport, config.retry), &config.cache);
    client.login().await?;

    info!(url = %config.base_url, "connected to Footprint");
    Ok(client)
}
