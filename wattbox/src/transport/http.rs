//! HTTP transport for the WattBox web interface.

use log::{debug, trace};
use reqwest::Client;
use secrecy::ExposeSecret;

use super::config::HttpConfig;
use crate::error::TransportError;

/// Status and body of a completed request.
#[derive(Debug, Clone)]
pub struct HttpResponse {
    pub status: u16,
    pub body: String,
}

impl HttpResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn is_unauthorized(&self) -> bool {
        self.status == 401
    }
}

/// Authenticated GET requests against one device.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: Client,
    config: HttpConfig,
    base_url: String,
}

impl HttpTransport {
    /// Build the HTTP client. No request is made.
    pub fn new(config: HttpConfig) -> Result<Self, TransportError> {
        let client = Client::builder()
            .timeout(config.timeout)
            .no_proxy()
            .build()?;
        let base_url = config.base_url();
        Ok(Self {
            client,
            config,
            base_url,
        })
    }

    /// GET `path` with basic auth.
    ///
    /// Any HTTP status is returned as a response; only network failures
    /// and timeouts are errors.
    pub async fn get(
        &self,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<HttpResponse, TransportError> {
        let url = format!("{}{}", self.base_url, path);
        debug!("GET {} {:?}", url, query);

        let response = self
            .client
            .get(&url)
            .query(query)
            .basic_auth(
                &self.config.username,
                Some(self.config.password.expose_secret()),
            )
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    TransportError::Timeout(self.config.timeout)
                } else if e.is_connect() {
                    TransportError::ConnectionFailed {
                        host: self.config.host.clone(),
                        port: self.config.port,
                        source: std::io::Error::new(std::io::ErrorKind::ConnectionRefused, e),
                    }
                } else {
                    TransportError::Http(e)
                }
            })?;

        let status = response.status().as_u16();
        let body = response.text().await?;
        trace!("{} -> {} ({} bytes)", url, status, body.len());

        Ok(HttpResponse { status, body })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn config(&self) -> &HttpConfig {
        &self.config
    }
}
