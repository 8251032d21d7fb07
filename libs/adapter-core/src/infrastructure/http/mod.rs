//! HTTP Command Client
//!
//! [`CommandClient`] implementation over reqwest. Commands are signed
//! upstream (the session runs every payload through the request signer) and
//! arrive here as header-complete requests; this client only does transport.
//!
//! Venue rejections (4xx/5xx) surface as [`TransportError::Rejected`] with
//! the response body attached; they are terminal and never retried here,
//! since retrying a rejected order could double-submit.

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;

use crate::application::ports::{
    CommandAck, CommandClient, CommandMethod, SignedRequest, TransportError,
};

// =============================================================================
// Configuration
// =============================================================================

/// Configuration for the HTTP command client.
#[derive(Debug, Clone)]
pub struct HttpClientConfig {
    /// Base URL of the venue's command API.
    pub base_url: String,
    /// Path probed by the connect handshake; `None` skips the probe
    /// (stateless venues).
    pub status_path: Option<String>,
    /// Per-request timeout.
    pub request_timeout: Duration,
}

impl HttpClientConfig {
    /// Create a configuration with the default timeout and no status probe.
    #[must_use]
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            status_path: None,
            request_timeout: Duration::from_secs(10),
        }
    }

    /// Enable the connect-time status probe.
    #[must_use]
    pub fn with_status_path(mut self, path: impl Into<String>) -> Self {
        self.status_path = Some(path.into());
        self
    }
}

// =============================================================================
// Client
// =============================================================================

/// Venue ack body: the assigned request/order identifier.
#[derive(Debug, Deserialize)]
struct AckBody {
    id: String,
}

/// reqwest-based [`CommandClient`].
pub struct HttpCommandClient {
    config: HttpClientConfig,
    client: reqwest::Client,
}

impl HttpCommandClient {
    /// Create a client.
    ///
    /// # Errors
    ///
    /// Returns a [`TransportError`] when the underlying client cannot be
    /// constructed.
    pub fn new(config: HttpClientConfig) -> Result<Self, TransportError> {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| TransportError::ConnectFailed(e.to_string()))?;

        Ok(Self { config, client })
    }

    fn url(&self, path: &str) -> String {
        format!(
            "{}/{}",
            self.config.base_url.trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    }
}

#[async_trait]
impl CommandClient for HttpCommandClient {
    async fn handshake(&self) -> Result<(), TransportError> {
        let Some(path) = &self.config.status_path else {
            return Ok(());
        };

        let response = self
            .client
            .get(self.url(path))
            .send()
            .await
            .map_err(|e| TransportError::ConnectFailed(e.to_string()))?;

        if response.status().is_success() {
            Ok(())
        } else {
            Err(TransportError::ConnectFailed(format!(
                "status probe returned {}",
                response.status()
            )))
        }
    }

    async fn send(&self, request: SignedRequest) -> Result<CommandAck, TransportError> {
        let url = self.url(&request.path);
        let mut builder = match request.method {
            CommandMethod::Get => self.client.get(&url),
            CommandMethod::Post => self.client.post(&url),
            CommandMethod::Delete => self.client.delete(&url),
        };

        for (name, value) in &request.headers {
            builder = builder.header(name, value);
        }
        if !request.body.is_empty() {
            builder = builder
                .header("Content-Type", "application/json")
                .body(request.body.clone());
        }

        let response = builder
            .send()
            .await
            .map_err(|e| TransportError::Io(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(TransportError::Rejected {
                status: status.as_u16(),
                message,
            });
        }

        let ack: AckBody = response
            .json()
            .await
            .map_err(|e| TransportError::Io(format!("bad ack body: {e}")))?;

        Ok(CommandAck {
            request_id: ack.id,
        })
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use crate::infrastructure::auth::{Credentials, RequestSigner, SignatureEncoding};

    use super::*;

    fn signed(method: CommandMethod, path: &str, body: &str) -> SignedRequest {
        let signer = RequestSigner::new(
            Credentials::new("key", "secret").expect("credentials"),
            SignatureEncoding::Hex,
        );
        signer.sign(&crate::application::ports::CommandPayload {
            method,
            path: path.to_string(),
            body: body.to_string(),
        })
    }

    #[test]
    fn url_joining_handles_slashes() {
        let client =
            HttpCommandClient::new(HttpClientConfig::new("http://venue.test/")).expect("client");
        assert_eq!(client.url("/v1/orders"), "http://venue.test/v1/orders");
        assert_eq!(client.url("v1/orders"), "http://venue.test/v1/orders");
    }

    #[tokio::test]
    async fn send_parses_the_ack_id() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/v1/orders")
            .match_header("X-API-KEY", "key")
            .with_status(200)
            .with_body(r#"{"id":"venue-7"}"#)
            .create_async()
            .await;

        let client =
            HttpCommandClient::new(HttpClientConfig::new(server.url())).expect("client");
        let ack = client
            .send(signed(CommandMethod::Post, "/v1/orders", "{}"))
            .await
            .expect("ack");

        assert_eq!(ack.request_id, "venue-7");
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn rejection_carries_status_and_body() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/v1/orders")
            .with_status(422)
            .with_body("insufficient funds")
            .create_async()
            .await;

        let client =
            HttpCommandClient::new(HttpClientConfig::new(server.url())).expect("client");
        let err = client
            .send(signed(CommandMethod::Post, "/v1/orders", "{}"))
            .await
            .expect_err("rejection");

        assert!(matches!(
            err,
            TransportError::Rejected { status: 422, ref message } if message == "insufficient funds"
        ));
    }

    #[tokio::test]
    async fn handshake_without_status_path_is_a_noop() {
        let client = HttpCommandClient::new(HttpClientConfig::new("http://127.0.0.1:9"))
            .expect("client");
        client.handshake().await.expect("no probe configured");
    }

    #[tokio::test]
    async fn handshake_probes_the_status_path() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/v1/time")
            .with_status(200)
            .with_body("{}")
            .create_async()
            .await;

        let config = HttpClientConfig::new(server.url()).with_status_path("/v1/time");
        let client = HttpCommandClient::new(config).expect("client");
        client.handshake().await.expect("probe ok");
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn handshake_fails_on_bad_status() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("GET", "/v1/time")
            .with_status(503)
            .create_async()
            .await;

        let config = HttpClientConfig::new(server.url()).with_status_path("/v1/time");
        let client = HttpCommandClient::new(config).expect("client");
        let err = client.handshake().await.expect_err("probe should fail");
        assert!(matches!(err, TransportError::ConnectFailed(_)));
    }
}
