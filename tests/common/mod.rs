use account_server::{Account, AppError, CredentialStore};
use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::RwLock;
use uuid::Uuid;

/// In-memory credential store with the same observable semantics as the
/// Postgres one: unique email / federated id, conditional password
/// replacement.
#[derive(Default)]
pub struct InMemoryStore {
    accounts: RwLock<HashMap<Uuid, Account>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CredentialStore for InMemoryStore {
    async fn insert_account(&self, account: &Account) -> Result<Account, AppError> {
        let mut accounts = self.accounts.write().await;
        let duplicate = accounts.values().any(|existing| {
            (account.email.is_some() && existing.email == account.email)
                || (account.federated_id.is_some()
                    && existing.federated_id == account.federated_id)
        });
        if duplicate {
            return Err(AppError::Conflict("duplicate unique field".into()));
        }
        accounts.insert(account.id, account.clone());
        Ok(account.clone())
    }

    async fn account_by_id(&self, id: Uuid) -> Result<Option<Account>, AppError> {
        Ok(self.accounts.read().await.get(&id).cloned())
    }

    async fn account_by_email(&self, email: &str) -> Result<Option<Account>, AppError> {
        Ok(self
            .accounts
            .read()
            .await
            .values()
            .find(|a| a.email.as_deref() == Some(email))
            .cloned())
    }

    async fn account_by_federated_id(
        &self,
        federated_id: &str,
    ) -> Result<Option<Account>, AppError> {
        Ok(self
            .accounts
            .read()
            .await
            .values()
            .find(|a| a.federated_id.as_deref() == Some(federated_id))
            .cloned())
    }

    async fn replace_password_hash(
        &self,
        id: Uuid,
        current_hash: &str,
        new_hash: &str,
    ) -> Result<bool, AppError> {
        let mut accounts = self.accounts.write().await;
        match accounts.get_mut(&id) {
            Some(account) if account.password_hash.as_deref() == Some(current_hash) => {
                account.password_hash = Some(new_hash.to_string());
                account.updated_at = chrono::Utc::now();
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn delete_account(&self, id: Uuid) -> Result<bool, AppError> {
        Ok(self.accounts.write().await.remove(&id).is_some())
    }
}
