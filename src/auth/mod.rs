//! Authentication and the current user
//!
//! Credentials are obtained from an [`AuthBackend`] and persisted in the
//! `auth` config property of the context's target layer (the user config
//! file for the CLI's auth commands). [`AuthService`] resolves the current
//! user once per execution context and establishes the matching
//! [`UserContext`](crate::context::UserContext) on every chain it sees, so
//! downstream caches (such as pack queries) can be partitioned per user.
//!
//! Without stored credentials, or when they point at a deleted user, the
//! current user is anonymous with id [`ANONYMOUS_USER_ID`].

mod service;

pub use service::AuthService;

use crate::context::ContextChain;
use crate::remote::records::UserRecord;
use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// User id of the anonymous user.
pub const ANONYMOUS_USER_ID: &str = "anonymous";

/// Config property holding the persisted [`AuthData`].
pub const AUTH_PROPERTY: &str = "auth";

/// Credentials returned by a successful authentication.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthData {
    pub uid: String,
    pub token: String,
}

/// Identity provider for the record store.
#[async_trait]
pub trait AuthBackend: Send + Sync {
    async fn auth_with_password(&self, chain: &ContextChain, email: &str, password: &str) -> Result<AuthData>;

    async fn auth_with_token(&self, chain: &ContextChain, token: &str) -> Result<AuthData>;

    /// Create an account, returning its uid.
    async fn create_user(&self, chain: &ContextChain, email: &str, password: &str) -> Result<String>;

    /// Drop the session held for the chain's backend.
    async fn unauth(&self, chain: &ContextChain) -> Result<()>;
}

/// The user operations run as.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CurrentUser {
    user: Option<UserRecord>,
    auth: Option<AuthData>,
}

impl CurrentUser {
    pub fn anonymous() -> Self {
        Self {
            user: None,
            auth: None,
        }
    }

    pub fn authenticated(user: UserRecord, auth: AuthData) -> Self {
        Self {
            user: Some(user),
            auth: Some(auth),
        }
    }

    pub fn is_anonymous(&self) -> bool {
        self.user.is_none()
    }

    pub fn user_id(&self) -> &str {
        self.user.as_ref().map_or(ANONYMOUS_USER_ID, |u| u.id.as_str())
    }

    pub fn user(&self) -> Option<&UserRecord> {
        self.user.as_ref()
    }

    pub fn auth(&self) -> Option<&AuthData> {
        self.auth.as_ref()
    }

    pub fn username(&self) -> Option<&str> {
        self.user.as_ref().map(|u| u.username.as_str()).filter(|u| !u.is_empty())
    }
}
