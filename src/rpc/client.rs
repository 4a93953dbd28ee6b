//! Remote echo client.

use std::time::Duration;

use thiserror::Error;
use url::Url;

use crate::rpc::echo::{EchoIntMessage, EchoStringMessage, ECHO_INT_PATH, ECHO_STRING_PATH};

/// Default client request timeout.
pub const DEFAULT_CLIENT_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("invalid server address {addr:?}: {source}")]
    Address {
        addr: String,
        #[source]
        source: url::ParseError,
    },

    #[error("failed to build HTTP client: {0}")]
    Build(#[source] reqwest::Error),

    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),
}

/// Calls the echo service of a running server.
#[derive(Debug, Clone)]
pub struct EchoClient {
    base: Url,
    http: reqwest::Client,
}

impl EchoClient {
    /// Connect to `addr`. An address without a scheme is treated as HTTPS.
    pub fn new(addr: &str, timeout: Duration, skip_verify: bool) -> Result<Self, ClientError> {
        let with_scheme = if addr.contains("://") {
            addr.to_string()
        } else {
            format!("https://{addr}")
        };
        let base = Url::parse(&with_scheme).map_err(|source| ClientError::Address {
            addr: addr.to_string(),
            source,
        })?;

        let http = reqwest::Client::builder()
            .timeout(timeout)
            .danger_accept_invalid_certs(skip_verify)
            .build()
            .map_err(ClientError::Build)?;

        Ok(Self { base, http })
    }

    pub fn base_url(&self) -> &Url {
        &self.base
    }

    pub async fn echo_string(&self, content: impl Into<String>) -> Result<String, ClientError> {
        let request = EchoStringMessage {
            content: content.into(),
        };
        let response: EchoStringMessage = self.call(ECHO_STRING_PATH, &request).await?;
        Ok(response.content)
    }

    pub async fn echo_int(&self, content: i32) -> Result<i32, ClientError> {
        let response: EchoIntMessage = self.call(ECHO_INT_PATH, &EchoIntMessage { content }).await?;
        Ok(response.content)
    }

    async fn call<Req, Res>(&self, path: &str, request: &Req) -> Result<Res, ClientError>
    where
        Req: serde::Serialize + ?Sized,
        Res: serde::de::DeserializeOwned,
    {
        let url = self.base.join(path).map_err(|source| ClientError::Address {
            addr: self.base.to_string(),
            source,
        })?;

        let response = self
            .http
            .post(url)
            .json(request)
            .send()
            .await?
            .error_for_status()?;
        Ok(response.json().await?)
    }
}
