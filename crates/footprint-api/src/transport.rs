// Shared transport configuration for building reqwest::Client instances.
//
// Connect/read budgets live here so the HTTP client and anything else
// talking to the service build their `reqwest::Client` the same way.

use std::time::Duration;

use reqwest::header::HeaderMap;

use crate::error::Error;

const USER_AGENT: &str = concat!("footprint-api/", env!("CARGO_PKG_VERSION"));

/// Shared transport configuration for building HTTP clients.
#[derive(Debug, Clone)]
pub struct TransportConfig {
    /// Budget for establishing the TCP/TLS connection.
    pub connect_timeout: Duration,
    /// Budget for each read from an established connection.
    pub read_timeout: Duration,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(30),
            read_timeout: Duration::from_secs(120),
        }
    }
}

impl TransportConfig {
    /// Build a `reqwest::Client` from this config.
    ///
    /// The cookie store is always on: session login relies on the service's
    /// session cookie riding along with later requests.
    pub fn build_client(&self) -> Result<reqwest::Client, Error> {
        self.build_client_with_headers(HeaderMap::new())
    }

    /// Build a `reqwest::Client` with additional default headers.
    ///
    /// Used under API-key auth to inject the `FootprintApiKey` header.
    pub fn build_client_with_headers(&self, headers: HeaderMap) -> Result<reqwest::Client, Error> {
        reqwest::Client::builder()
            .connect_timeout(self.connect_timeout)
            .read_timeout(self.read_timeout)
            .user_agent(USER_AGENT)
            .cookie_store(true)
            .default_headers(headers)
            .build()
            .map_err(Error::from)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_budgets() {
        let config = TransportConfig::default();
        assert_eq!(config.connect_timeout, Duration::from_secs(30));
        assert_eq!(config.read_timeout, Duration::from_secs(120));
    }

    #[test]
    fn builds_client() {
        assert!(TransportConfig::default().build_client().is_ok());
    }
}
