use crate::db::models::Account;
use crate::error::AppError;
use async_trait::async_trait;
use chrono::Utc;
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

/// Persistence seam for accounts. Production uses [`PgStore`]; tests
/// substitute doubles.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait CredentialStore: Send + Sync {
    /// Inserts a new account. Duplicate unique fields (email,
    /// federated id) surface as `AppError::Conflict`; the uniqueness
    /// check and the insert are atomic at the store.
    async fn insert_account(&self, account: &Account) -> Result<Account, AppError>;

    async fn account_by_id(&self, id: Uuid) -> Result<Option<Account>, AppError>;

    async fn account_by_email(&self, email: &str) -> Result<Option<Account>, AppError>;

    async fn account_by_federated_id(&self, federated_id: &str)
        -> Result<Option<Account>, AppError>;

    /// Replaces the password hash only if the stored hash still equals
    /// `current_hash`. Returns false when the account is gone or a
    /// concurrent change already replaced the hash.
    async fn replace_password_hash(
        &self,
        id: Uuid,
        current_hash: &str,
        new_hash: &str,
    ) -> Result<bool, AppError>;

    /// Returns false if no account with `id` existed.
    async fn delete_account(&self, id: Uuid) -> Result<bool, AppError>;
}

pub struct PgStore {
    pool: Arc<PgPool>,
}

impl PgStore {
    pub fn new(pool: Arc<PgPool>) -> Self {
        Self { pool }
    }

    pub async fn new_with_options(
        url: &str,
        max_connections: u32,
        acquire_timeout: Duration,
    ) -> Result<Self, AppError> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .acquire_timeout(acquire_timeout)
            .connect(url)
            .await?;

        Ok(Self {
            pool: Arc::new(pool),
        })
    }
}

#[async_trait]
impl CredentialStore for PgStore {
    async fn insert_account(&self, account: &Account) -> Result<Account, AppError> {
        let inserted = sqlx::query_as::<_, Account>(
            r#"
            INSERT INTO accounts (id, email, password_hash, federated_id, display_name, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING id, email, password_hash, federated_id, display_name, created_at, updated_at
            "#,
        )
        .bind(account.id)
        .bind(&account.email)
        .bind(&account.password_hash)
        .bind(&account.federated_id)
        .bind(&account.display_name)
        .bind(account.created_at)
        .bind(account.updated_at)
        .fetch_one(self.pool.as_ref())
        .await?;

        Ok(inserted)
    }

    async fn account_by_id(&self, id: Uuid) -> Result<Option<Account>, AppError> {
        let account = sqlx::query_as::<_, Account>(
            "SELECT id, email, password_hash, federated_id, display_name, created_at, updated_at \
             FROM accounts WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(self.pool.as_ref())
        .await?;

        Ok(account)
    }

    async fn account_by_email(&self, email: &str) -> Result<Option<Account>, AppError> {
        let account = sqlx::query_as::<_, Account>(
            "SELECT id, email, password_hash, federated_id, display_name, created_at, updated_at \
             FROM accounts WHERE email = $1",
        )
        .bind(email)
        .fetch_optional(self.pool.as_ref())
        .await?;

        Ok(account)
    }

    async fn account_by_federated_id(
        &self,
        federated_id: &str,
    ) -> Result<Option<Account>, AppError> {
        let account = sqlx::query_as::<_, Account>(
            "SELECT id, email, password_hash, federated_id, display_name, created_at, updated_at \
             FROM accounts WHERE federated_id = $1",
        )
        .bind(federated_id)
        .fetch_optional(self.pool.as_ref())
        .await?;

        Ok(account)
    }

    async fn replace_password_hash(
        &self,
        id: Uuid,
        current_hash: &str,
        new_hash: &str,
    ) -> Result<bool, AppError> {
        // Conditional update: a concurrent change that already replaced
        // the hash makes this affect zero rows instead of clobbering it.
        let result = sqlx::query(
            "UPDATE accounts SET password_hash = $1, updated_at = $2 \
             WHERE id = $3 AND password_hash = $4",
        )
        .bind(new_hash)
        .bind(Utc::now())
        .bind(id)
        .bind(current_hash)
        .execute(self.pool.as_ref())
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn delete_account(&self, id: Uuid) -> Result<bool, AppError> {
        let result = sqlx::query("DELETE FROM accounts WHERE id = $1")
            .bind(id)
            .execute(self.pool.as_ref())
            .await?;

        Ok(result.rows_affected() > 0)
    }
}
