//! Upload of packaged packs to the publish endpoint.

use crate::core::BitpackError;
use anyhow::Result;
use async_trait::async_trait;
use reqwest::StatusCode;

/// Sends a packaged archive to the publish endpoint.
#[async_trait]
pub trait PublishTransport: Send + Sync {
    /// POST `body` to `url` with `auth_token` as bearer token. Anything but
    /// `200 OK` is an [`BitpackError::UploadFailed`].
    async fn post(&self, url: &str, auth_token: &str, body: Vec<u8>) -> Result<()>;
}

/// [`PublishTransport`] over HTTP(S).
#[derive(Debug, Clone, Default)]
pub struct HttpPublishTransport {
    client: reqwest::Client,
}

impl HttpPublishTransport {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl PublishTransport for HttpPublishTransport {
    async fn post(&self, url: &str, auth_token: &str, body: Vec<u8>) -> Result<()> {
        tracing::debug!(target: "pack", "Uploading {} bytes to {}", body.len(), url);
        let response = self
            .client
            .post(url)
            .bearer_auth(auth_token)
            .header(reqwest::header::CONTENT_TYPE, "application/zip")
            .body(body)
            .send()
            .await
            .map_err(|e| BitpackError::UploadFailed {
                reason: e.to_string(),
            })?;

        if response.status() != StatusCode::OK {
            return Err(BitpackError::UploadFailed {
                reason: format!("HTTP {}", response.status()),
            }
            .into());
        }
        Ok(())
    }
}
