use super::{AUTH_PROPERTY, AuthBackend, AuthData, CurrentUser};
use crate::config::{ConfigResolver, ConfigValue};
use crate::context::{ContextChain, ContextRegistry};
use crate::core::{BitpackError, is_valid_name};
use crate::remote::RecordManager;
use crate::remote::records::UserRecord;
use anyhow::Result;
use dashmap::DashMap;
use regex::Regex;
use std::sync::{Arc, LazyLock};

static EMAIL_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    #[allow(clippy::expect_used)]
    Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").expect("email pattern is valid")
});

/// Resolves, switches and persists the current user per execution context.
pub struct AuthService {
    config: Arc<ConfigResolver>,
    contexts: Arc<ContextRegistry>,
    backend: Arc<dyn AuthBackend>,
    records: RecordManager,
    current_users: DashMap<String, Arc<CurrentUser>>,
}

impl AuthService {
    pub fn new(
        config: Arc<ConfigResolver>,
        contexts: Arc<ContextRegistry>,
        backend: Arc<dyn AuthBackend>,
        records: RecordManager,
    ) -> Self {
        Self {
            config,
            contexts,
            backend,
            records,
            current_users: DashMap::new(),
        }
    }

    /// The current user already resolved for the chain's exec context.
    pub fn current_user(&self, chain: &ContextChain) -> Result<Option<Arc<CurrentUser>>> {
        let key = chain.exec()?.context_key();
        Ok(self.current_users.get(&key).map(|entry| entry.value().clone()))
    }

    /// Resolve the current user and establish its user context on `chain`.
    ///
    /// The first call per exec context re-authenticates with the stored
    /// `auth` token. Stored credentials for a user that no longer exists are
    /// deleted and the user falls back to anonymous.
    pub async fn auth(&self, chain: &mut ContextChain) -> Result<Arc<CurrentUser>> {
        if let Some(current) = self.current_user(chain)? {
            self.contexts.establish_user(chain, current.user_id());
            return Ok(current);
        }

        self.establish(chain, CurrentUser::anonymous())?;
        let current = self.try_load_current_user(chain).await?.unwrap_or_else(CurrentUser::anonymous);
        self.establish(chain, current)
    }

    /// Authenticate with email and password and persist the credentials.
    pub async fn login(&self, chain: &mut ContextChain, email: &str, password: &str) -> Result<Arc<CurrentUser>> {
        let auth = self.backend.auth_with_password(chain, email, password).await?;
        let current = self.build_current_user(chain, auth).await?;
        self.save_auth(chain, current.auth()).await?;
        tracing::info!(target: "auth", "Logged in as {}", current.username().unwrap_or(current.user_id()));
        self.establish(chain, current)
    }

    /// Forget the stored credentials; the current user becomes anonymous.
    pub async fn logout(&self, chain: &mut ContextChain) -> Result<Arc<CurrentUser>> {
        self.auth(chain).await?;
        self.backend.unauth(chain).await?;
        self.config.delete_config_property(chain, AUTH_PROPERTY).await?;
        self.current_users.remove(&chain.exec()?.context_key());
        tracing::info!(target: "auth", "Logged out");
        self.auth(chain).await
    }

    /// Create an account, claim its username and email, and log in.
    pub async fn sign_up(
        &self,
        chain: &mut ContextChain,
        username: &str,
        email: &str,
        password: &str,
    ) -> Result<Arc<CurrentUser>> {
        let username = username.to_lowercase();
        let email = email.to_lowercase();
        self.validate_email(chain, &email).await?;
        self.validate_username(chain, &username).await?;

        let uid = self.backend.create_user(chain, &email, password).await?;
        let auth = self.backend.auth_with_password(chain, &email, password).await?;

        let pending = UserRecord::pending(&uid);
        self.records.set_user(chain, &pending).await?;
        self.records.claim_identity(chain, &pending, &email, &username).await?;
        self.records.update_user(chain, &uid, serde_json::json!({"signedUp": true})).await?;

        let current = self.build_current_user(chain, auth).await?;
        self.save_auth(chain, current.auth()).await?;
        tracing::info!(target: "auth", "Signed up {} ({})", username, uid);
        self.establish(chain, current)
    }

    async fn validate_email(&self, chain: &ContextChain, email: &str) -> Result<()> {
        if !EMAIL_PATTERN.is_match(email) {
            return Err(BitpackError::InvalidEmail {
                email: email.to_string(),
            }
            .into());
        }
        if self.records.user_id_for_email(chain, email).await?.is_some() {
            return Err(BitpackError::EmailInUse {
                email: email.to_string(),
            }
            .into());
        }
        Ok(())
    }

    async fn validate_username(&self, chain: &ContextChain, username: &str) -> Result<()> {
        if !is_valid_name(username) {
            return Err(BitpackError::InvalidUsername {
                username: username.to_string(),
            }
            .into());
        }
        if self.records.user_id_for_username(chain, username).await?.is_some() {
            return Err(BitpackError::UsernameInUse {
                username: username.to_string(),
            }
            .into());
        }
        Ok(())
    }

    async fn build_current_user(&self, chain: &ContextChain, auth: AuthData) -> Result<CurrentUser> {
        let user = self.records.get_user(chain, &auth.uid).await?.ok_or_else(|| BitpackError::UserNotFound {
            uid: auth.uid.clone(),
        })?;
        Ok(CurrentUser::authenticated(user, auth))
    }

    async fn load_auth(&self, chain: &ContextChain) -> Result<Option<AuthData>> {
        let Some(value) = self.config.get_config_property(chain, AUTH_PROPERTY).await? else {
            return Ok(None);
        };
        let auth = serde_json::from_value(serde_json::Value::from(value)).map_err(|_| BitpackError::InvalidConfigValue {
            key: AUTH_PROPERTY.to_string(),
            expected: "object with uid and token",
        })?;
        Ok(Some(auth))
    }

    async fn save_auth(&self, chain: &ContextChain, auth: Option<&AuthData>) -> Result<()> {
        let Some(auth) = auth else {
            return Ok(());
        };
        let value = ConfigValue::from(serde_json::to_value(auth)?);
        self.config.set_config_property(chain, AUTH_PROPERTY, value).await
    }

    async fn try_load_current_user(&self, chain: &ContextChain) -> Result<Option<CurrentUser>> {
        let Some(stored) = self.load_auth(chain).await? else {
            tracing::debug!(target: "auth", "No stored credentials, continuing anonymously");
            return Ok(None);
        };

        let auth = self.backend.auth_with_token(chain, &stored.token).await?;
        match self.build_current_user(chain, auth).await {
            Ok(current) => Ok(Some(current)),
            Err(e) if matches!(e.downcast_ref::<BitpackError>(), Some(BitpackError::UserNotFound { .. })) => {
                tracing::warn!(target: "auth", "Stored credentials refer to a missing user; removing them");
                self.config.delete_config_property(chain, AUTH_PROPERTY).await?;
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    fn establish(&self, chain: &mut ContextChain, current: CurrentUser) -> Result<Arc<CurrentUser>> {
        let current = Arc::new(current);
        self.contexts.establish_user(chain, current.user_id());
        self.current_users.insert(chain.exec()?.context_key(), current.clone());
        Ok(current)
    }
}
