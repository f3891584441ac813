use std::sync::Arc;

use anyhow::Context;

use saraha_crypto::password::PasswordHasher;
use saraha_db::Database;

use crate::config::Config;
use crate::error::{ApiError, expose_error_detail};
use crate::identity::IdentityProvider;
use crate::ledger::RevocationLedger;
use crate::mailer::EmailDispatcher;
use crate::storage::ObjectStore;
use crate::token::TokenService;

pub type AppState = Arc<AppStateInner>;

pub struct AppStateInner {
    pub db: Arc<Database>,
    pub config: Arc<Config>,
    pub tokens: TokenService,
    pub ledger: RevocationLedger,
    pub hasher: PasswordHasher,
    pub mailer: EmailDispatcher,
    pub identity: Arc<dyn IdentityProvider>,
    pub storage: Arc<dyn ObjectStore>,
}

impl AppStateInner {
    pub fn new(
        db: Arc<Database>,
        config: Arc<Config>,
        mailer: EmailDispatcher,
        identity: Arc<dyn IdentityProvider>,
        storage: Arc<dyn ObjectStore>,
    ) -> anyhow::Result<AppState> {
        expose_error_detail(config.is_development());

        let hasher = PasswordHasher::new(config.hash_memory_kib, config.hash_iterations)
            .context("invalid password hashing parameters")?;

        Ok(Arc::new(Self {
            tokens: TokenService::new(&config.secrets),
            ledger: RevocationLedger::new(db.clone()),
            db,
            config,
            hasher,
            mailer,
            identity,
            storage,
        }))
    }

    /// Run a blocking store call off the async runtime.
    pub async fn db_call<F, T>(&self, f: F) -> Result<T, ApiError>
    where
        F: FnOnce(&Database) -> anyhow::Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let db = self.db.clone();
        tokio::task::spawn_blocking(move || f(&db))
            .await
            .map_err(|e| ApiError::Internal(e.into()))?
            .map_err(ApiError::store)
    }

    pub async fn hash_password(&self, plain: String) -> Result<String, ApiError> {
        let hasher = self.hasher.clone();
        tokio::task::spawn_blocking(move || hasher.hash(&plain))
            .await
            .map_err(|e| ApiError::Internal(e.into()))?
            .map_err(ApiError::Internal)
    }

    pub async fn unusable_password(&self) -> Result<String, ApiError> {
        let hasher = self.hasher.clone();
        tokio::task::spawn_blocking(move || hasher.unusable_password())
            .await
            .map_err(|e| ApiError::Internal(e.into()))?
            .map_err(ApiError::Internal)
    }

    pub async fn verify_password(&self, plain: String, hash: String) -> Result<bool, ApiError> {
        let hasher = self.hasher.clone();
        tokio::task::spawn_blocking(move || hasher.verify(&plain, &hash))
            .await
            .map_err(|e| ApiError::Internal(e.into()))?
            .map_err(ApiError::Internal)
    }

    pub fn encrypt_phone(&self, phone: &str) -> Result<String, ApiError> {
        saraha_crypto::encrypt::encrypt_field(&self.config.encryption_key, phone)
            .map_err(ApiError::Internal)
    }
}
