use crate::auth::{PasswordHasher, TokenService};
use crate::db::{Account, CredentialStore, Profile};
use crate::error::{AppError, AuthError};
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

const MIN_PASSWORD_LEN: usize = 8;

/// Orchestrates every account mutation. Each operation is a single
/// transaction against the credential store; nothing is cached across
/// requests.
pub struct AccountService {
    store: Arc<dyn CredentialStore>,
    hasher: PasswordHasher,
    tokens: TokenService,
}

impl AccountService {
    pub fn new(store: Arc<dyn CredentialStore>, hasher: PasswordHasher, tokens: TokenService) -> Self {
        Self {
            store,
            hasher,
            tokens,
        }
    }

    pub fn store(&self) -> &Arc<dyn CredentialStore> {
        &self.store
    }

    pub fn tokens(&self) -> &TokenService {
        &self.tokens
    }

    pub async fn register(
        &self,
        email: &str,
        password: &str,
        display_name: Option<&str>,
    ) -> Result<Profile, AppError> {
        if email.is_empty() || password.is_empty() {
            return Err(AppError::Validation(
                "Please provide email and password".into(),
            ));
        }
        validate_email(email)?;
        validate_password(password)?;

        let email = normalize_email(email);
        // Friendly pre-check; the store's unique index is what actually
        // guarantees no duplicate survives a race.
        if self.store.account_by_email(&email).await?.is_some() {
            return Err(AppError::Conflict(
                "User already exists with this email".into(),
            ));
        }

        let hash = self.hasher.hash(password)?;
        let account = Account::with_password(email, hash, display_name.map(str::to_string));
        let created = self.store.insert_account(&account).await?;
        info!("registered account {}", created.id);
        Ok(created.profile())
    }

    pub async fn login(&self, email: &str, password: &str) -> Result<String, AppError> {
        if email.is_empty() || password.is_empty() {
            return Err(AppError::Validation(
                "Please provide email and password".into(),
            ));
        }

        let email = normalize_email(email);
        let account = self
            .store
            .account_by_email(&email)
            .await?
            .ok_or_else(|| AppError::NotFound("User not found".into()))?;

        // Federated-only accounts have no password to check.
        let stored = account
            .password_hash
            .as_deref()
            .ok_or(AuthError::InvalidCredentials)?;

        if !self.hasher.verify(password, stored)? {
            return Err(AuthError::InvalidCredentials.into());
        }

        self.tokens.issue(account.id)
    }

    pub async fn get_profile(&self, account_id: Uuid) -> Result<Profile, AppError> {
        let account = self
            .store
            .account_by_id(account_id)
            .await?
            .ok_or_else(|| AppError::NotFound("User not found".into()))?;
        Ok(account.profile())
    }

    /// Replaces the password hash. The only committing path is
    /// "current verified, new password different and valid"; everything
    /// else rejects without touching the store.
    pub async fn change_password(
        &self,
        account_id: Uuid,
        current_password: &str,
        new_password: &str,
    ) -> Result<Profile, AppError> {
        let account = self
            .store
            .account_by_id(account_id)
            .await?
            .ok_or_else(|| AppError::NotFound("User not found".into()))?;

        if current_password.is_empty() || new_password.is_empty() {
            return Err(AppError::Validation(
                "Please provide old password and new".into(),
            ));
        }

        let stored = account
            .password_hash
            .as_deref()
            .ok_or(AuthError::InvalidCredentials)?;

        if !self.hasher.verify(current_password, stored)? {
            return Err(AuthError::InvalidCredentials.into());
        }

        if new_password == current_password {
            return Err(AppError::Validation(
                "New password must be different than the old".into(),
            ));
        }
        validate_password(new_password)?;

        let new_hash = self.hasher.hash(new_password)?;
        // Conditional on the hash we just verified: a concurrent change
        // loses the race cleanly instead of passing a stale check.
        let updated = self
            .store
            .replace_password_hash(account_id, stored, &new_hash)
            .await?;
        if !updated {
            return Err(AuthError::InvalidCredentials.into());
        }

        info!("password changed for account {}", account_id);
        Ok(account.profile())
    }

    pub async fn delete_account(&self, account_id: Uuid) -> Result<(), AppError> {
        if !self.store.delete_account(account_id).await? {
            return Err(AppError::NotFound("User not found".into()));
        }
        info!("deleted account {}", account_id);
        Ok(())
    }
}

pub(crate) fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

fn validate_email(email: &str) -> Result<(), AppError> {
    let valid = match email.split_once('@') {
        Some((local, domain)) => {
            !local.is_empty()
                && domain.contains('.')
                && !domain.starts_with('.')
                && !domain.ends_with('.')
                && !email.contains(char::is_whitespace)
        }
        None => false,
    };
    if valid {
        Ok(())
    } else {
        Err(AppError::Validation("Invalid email address".into()))
    }
}

fn validate_password(password: &str) -> Result<(), AppError> {
    // character count, not byte length: multibyte characters count once
    let long_enough = password.chars().count() >= MIN_PASSWORD_LEN;
    let has_upper = password.chars().any(|c| c.is_ascii_uppercase());
    let has_lower = password.chars().any(|c| c.is_ascii_lowercase());
    let has_digit = password.chars().any(|c| c.is_ascii_digit());
    let has_special = password.chars().any(|c| !c.is_alphanumeric());

    if long_enough && has_upper && has_lower && has_digit && has_special {
        Ok(())
    } else {
        Err(AppError::Validation(
            "Password must be at least 8 characters with upper and lower case, a digit and a special character".into(),
        ))
    }
}
