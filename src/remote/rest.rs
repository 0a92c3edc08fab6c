//! HTTP implementation of the record store and auth backend.
//!
//! Records are read and written through the realtime database's REST
//! interface at `<firebaseUrl>/<path>.json`. Authentication goes through the
//! bitpack server at `<serverUrl>/api/v1/auth/...`, which hands back a
//! database token. Tokens are kept per firebase URL and appended to every
//! record request as `?auth=<token>`.

use super::{RecordPath, RecordStore};
use crate::auth::{AuthBackend, AuthData};
use crate::config::ConfigResolver;
use crate::context::ContextChain;
use crate::core::BitpackError;
use anyhow::{Context, Result};
use async_trait::async_trait;
use dashmap::DashMap;
use reqwest::{Method, StatusCode};
use serde::Deserialize;
use serde_json::{Map, Value, json};
use std::sync::Arc;

/// Record store and auth backend speaking HTTP.
pub struct RestBackend {
    client: reqwest::Client,
    config: Arc<ConfigResolver>,
    sessions: DashMap<String, String>,
}

#[derive(Deserialize)]
struct CreatedUser {
    uid: String,
}

impl RestBackend {
    pub fn new(config: Arc<ConfigResolver>) -> Self {
        Self {
            client: reqwest::Client::new(),
            config,
            sessions: DashMap::new(),
        }
    }

    fn record_url(&self, chain: &ContextChain, path: &RecordPath) -> Result<String> {
        let firebase = chain.firebase()?;
        let base = firebase.firebase_url().trim_end_matches('/');
        let mut url = format!("{base}/{path}.json");
        if let Some(token) = self.sessions.get(firebase.firebase_url()) {
            url.push_str("?auth=");
            url.push_str(token.value());
        }
        Ok(url)
    }

    fn server_url(&self, chain: &ContextChain) -> Result<String> {
        let value = self.config.get_property(chain, "serverUrl")?.ok_or_else(|| BitpackError::InvalidConfigValue {
            key: "serverUrl".to_string(),
            expected: "string",
        })?;
        Ok(value.expect_str("serverUrl")?.trim_end_matches('/').to_string())
    }

    async fn request(
        &self,
        chain: &ContextChain,
        method: Method,
        path: &RecordPath,
        body: Option<Value>,
    ) -> Result<Option<Value>> {
        let url = self.record_url(chain, path)?;
        tracing::trace!(target: "remote", "{} {}", method, path);

        let mut request = self.client.request(method, &url);
        if let Some(body) = body {
            request = request.json(&body);
        }
        let response = request.send().await.with_context(|| format!("Failed to reach record store for '{path}'"))?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !status.is_success() {
            let reason = response.text().await.unwrap_or_default();
            return Err(BitpackError::RemoteError {
                path: path.to_string(),
                reason: format!("HTTP {status}: {reason}"),
            }
            .into());
        }

        let value: Value = response.json().await.with_context(|| format!("Invalid response for '{path}'"))?;
        Ok((!value.is_null()).then_some(value))
    }

    async fn post_auth<T: serde::de::DeserializeOwned>(&self, chain: &ContextChain, endpoint: &str, body: Value) -> Result<T> {
        let url = format!("{}/api/v1/auth/{endpoint}", self.server_url(chain)?);
        let response = self.client.post(&url).json(&body).send().await.with_context(|| format!("Failed to reach {url}"))?;

        let status = response.status();
        if !status.is_success() {
            let reason = response.text().await.unwrap_or_default();
            return Err(BitpackError::RemoteError {
                path: url,
                reason: format!("HTTP {status}: {reason}"),
            }
            .into());
        }
        Ok(response.json().await.context("Invalid auth response")?)
    }

    fn remember(&self, chain: &ContextChain, auth: &AuthData) -> Result<()> {
        let firebase = chain.firebase()?;
        self.sessions.insert(firebase.firebase_url().to_string(), auth.token.clone());
        Ok(())
    }
}

#[async_trait]
impl RecordStore for RestBackend {
    async fn get(&self, chain: &ContextChain, path: &RecordPath) -> Result<Option<Value>> {
        self.request(chain, Method::GET, path, None).await
    }

    async fn set(&self, chain: &ContextChain, path: &RecordPath, value: Value) -> Result<()> {
        self.request(chain, Method::PUT, path, Some(value)).await.map(drop)
    }

    async fn update(&self, chain: &ContextChain, path: &RecordPath, updates: Map<String, Value>) -> Result<()> {
        self.request(chain, Method::PATCH, path, Some(Value::Object(updates))).await.map(drop)
    }

    async fn delete(&self, chain: &ContextChain, path: &RecordPath) -> Result<()> {
        self.request(chain, Method::DELETE, path, None).await.map(drop)
    }
}

#[async_trait]
impl AuthBackend for RestBackend {
    async fn auth_with_password(&self, chain: &ContextChain, email: &str, password: &str) -> Result<AuthData> {
        let auth: AuthData = self.post_auth(chain, "password", json!({"email": email, "password": password})).await?;
        self.remember(chain, &auth)?;
        Ok(auth)
    }

    async fn auth_with_token(&self, chain: &ContextChain, token: &str) -> Result<AuthData> {
        let auth: AuthData = self.post_auth(chain, "token", json!({"token": token})).await?;
        self.remember(chain, &auth)?;
        Ok(auth)
    }

    async fn create_user(&self, chain: &ContextChain, email: &str, password: &str) -> Result<String> {
        let created: CreatedUser = self.post_auth(chain, "users", json!({"email": email, "password": password})).await?;
        Ok(created.uid)
    }

    async fn unauth(&self, chain: &ContextChain) -> Result<()> {
        let firebase = chain.firebase()?;
        self.sessions.remove(firebase.firebase_url());
        Ok(())
    }
}
