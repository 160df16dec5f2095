//! Federated (Google OAuth) login: code exchange, profile fetch, and the
//! linker that maps an external profile onto an existing or new account.

use crate::accounts::normalize_email;
use crate::config::OAuthConfig;
use crate::db::{Account, CredentialStore};
use crate::error::{AppError, AuthError};
use crate::AppState;
use actix_web::{web, HttpResponse};
use serde::Deserialize;
use tracing::{error, info};
use url::Url;
use uuid::Uuid;

/// Identity the provider vouches for. `sub` is the stable subject id we
/// key accounts on.
#[derive(Debug, Clone, Deserialize)]
pub struct FederatedProfile {
    pub sub: String,
    pub email: Option<String>,
    pub name: Option<String>,
}

pub struct OAuthClient {
    http: reqwest::Client,
    config: OAuthConfig,
}

impl OAuthClient {
    pub fn new(config: OAuthConfig) -> Self {
        Self {
            http: reqwest::Client::new(),
            config,
        }
    }

    pub fn authorize_url(&self, state: &str) -> Result<Url, AppError> {
        Url::parse_with_params(
            &self.config.auth_url,
            &[
                ("client_id", self.config.client_id.as_str()),
                ("redirect_uri", self.config.redirect_url.as_str()),
                ("response_type", "code"),
                ("scope", "openid email profile"),
                ("state", state),
            ],
        )
        .map_err(|e| AppError::Config(format!("invalid oauth auth_url: {}", e)))
    }

    pub async fn exchange_code(&self, code: &str) -> Result<String, AppError> {
        let res = self
            .http
            .post(&self.config.token_url)
            .form(&[
                ("grant_type", "authorization_code"),
                ("code", code),
                ("client_id", &self.config.client_id),
                ("client_secret", &self.config.client_secret),
                ("redirect_uri", &self.config.redirect_url),
            ])
            .send()
            .await?;

        let token_response: serde_json::Value = res.json().await?;
        let access_token = token_response["access_token"]
            .as_str()
            .ok_or(AuthError::InvalidCredentials)?;

        Ok(access_token.to_string())
    }

    pub async fn fetch_profile(&self, access_token: &str) -> Result<FederatedProfile, AppError> {
        let res = self
            .http
            .get(&self.config.userinfo_url)
            .bearer_auth(access_token)
            .send()
            .await?;

        let profile: FederatedProfile = res.json().await?;
        Ok(profile)
    }

    pub fn failure_redirect(&self) -> &str {
        &self.config.failure_redirect
    }

    pub fn success_redirect(&self) -> &str {
        &self.config.success_redirect
    }
}

/// Maps an external profile to an account: lookup by federated id, or
/// create on first sign-in. A lookup miss is never a failure.
pub async fn resolve(
    store: &dyn CredentialStore,
    profile: &FederatedProfile,
) -> Result<Account, AppError> {
    if let Some(existing) = store.account_by_federated_id(&profile.sub).await? {
        return Ok(existing);
    }

    let account = Account::with_federated_id(
        profile.sub.clone(),
        profile.email.as_deref().map(normalize_email),
        profile.name.clone(),
    );
    match store.insert_account(&account).await {
        Ok(created) => {
            info!("created account {} for federated id", created.id);
            Ok(created)
        }
        // concurrent first sign-in with the same subject: take the winner
        Err(AppError::Conflict(_)) => store
            .account_by_federated_id(&profile.sub)
            .await?
            .ok_or_else(|| AppError::Unavailable("account vanished after conflict".into())),
        Err(e) => Err(e),
    }
}

/// Session serialization contract: an account is stored in the session
/// as its federated id only.
pub fn session_key(account: &Account) -> Result<&str, AppError> {
    account
        .federated_id
        .as_deref()
        .ok_or_else(|| AppError::Internal("account has no federated identity".into()))
}

/// Session deserialization contract: a federated id resolves back to
/// the full account on each request.
pub async fn resolve_session(
    store: &dyn CredentialStore,
    federated_id: &str,
) -> Result<Account, AppError> {
    store
        .account_by_federated_id(federated_id)
        .await?
        .ok_or_else(|| AppError::NotFound("User not found".into()))
}

pub async fn google_login(state: web::Data<AppState>) -> Result<HttpResponse, AppError> {
    // CSRF state is a signed, expiring token bound to a throwaway id;
    // the callback only accepts state this process issued
    let csrf_state = state.accounts.tokens().issue(Uuid::new_v4())?;
    let url = state.oauth.authorize_url(&csrf_state)?;
    Ok(HttpResponse::Found()
        .insert_header(("Location", url.as_str()))
        .finish())
}

#[derive(Debug, Deserialize)]
pub struct CallbackQuery {
    pub code: Option<String>,
    pub state: Option<String>,
}

/// Provider redirect target. Any failure redirects to the configured
/// failure path rather than surfacing an error body.
pub async fn google_callback(
    query: web::Query<CallbackQuery>,
    state: web::Data<AppState>,
) -> HttpResponse {
    match callback_flow(&query, &state).await {
        Ok(token) => {
            let location = format!("{}#token={}", state.oauth.success_redirect(), token);
            HttpResponse::Found()
                .insert_header(("Location", location))
                .finish()
        }
        Err(e) => {
            error!("federated login failed: {}", e);
            HttpResponse::Found()
                .insert_header(("Location", state.oauth.failure_redirect().to_string()))
                .finish()
        }
    }
}

async fn callback_flow(query: &CallbackQuery, state: &AppState) -> Result<String, AppError> {
    // forged or replayed-after-expiry state fails here, before any
    // provider exchange
    let csrf_state = query
        .state
        .as_deref()
        .ok_or(AuthError::InvalidCredentials)?;
    state.accounts.tokens().verify(csrf_state)?;

    let code = query
        .code
        .as_deref()
        .ok_or(AuthError::InvalidCredentials)?;

    let access_token = state.oauth.exchange_code(code).await?;
    let profile = state.oauth.fetch_profile(&access_token).await?;
    let account = resolve(state.accounts.store().as_ref(), &profile).await?;

    state.accounts.tokens().issue(account.id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::MockCredentialStore;
    use mockall::predicate::eq;

    fn profile() -> FederatedProfile {
        FederatedProfile {
            sub: "google-123".into(),
            email: Some("A@X.Com".into()),
            name: Some("Someone".into()),
        }
    }

    #[test]
    fn test_authorize_url_carries_client_and_state() {
        let client = OAuthClient::new(crate::config::Settings::new_for_test().unwrap().oauth);
        let url = client.authorize_url("abc123").unwrap();
        let query: Vec<(String, String)> = url
            .query_pairs()
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect();
        assert!(query.contains(&("client_id".into(), "test_client".into())));
        assert!(query.contains(&("state".into(), "abc123".into())));
        assert!(query.contains(&("response_type".into(), "code".into())));
    }

    #[test]
    fn test_session_key_is_federated_id() {
        let account =
            Account::with_federated_id("google-123".into(), Some("a@x.com".into()), None);
        assert_eq!(session_key(&account).unwrap(), "google-123");

        let password_only =
            Account::with_password("a@x.com".into(), "$2b$04$hash".into(), None);
        assert!(session_key(&password_only).is_err());
    }

    #[tokio::test]
    async fn test_resolve_returns_existing_account() {
        let existing =
            Account::with_federated_id("google-123".into(), Some("a@x.com".into()), None);
        let existing_id = existing.id;
        let mut store = MockCredentialStore::new();
        store
            .expect_account_by_federated_id()
            .with(eq("google-123"))
            .returning(move |_| Ok(Some(existing.clone())));

        let account = resolve(&store, &profile()).await.unwrap();
        assert_eq!(account.id, existing_id);
    }

    #[tokio::test]
    async fn test_resolve_creates_account_on_first_sign_in() {
        let mut store = MockCredentialStore::new();
        store
            .expect_account_by_federated_id()
            .returning(|_| Ok(None));
        store
            .expect_insert_account()
            .withf(|account| {
                account.federated_id.as_deref() == Some("google-123")
                    && account.email.as_deref() == Some("a@x.com")
                    && account.password_hash.is_none()
            })
            .returning(|account| Ok(account.clone()));

        let account = resolve(&store, &profile()).await.unwrap();
        assert_eq!(account.federated_id.as_deref(), Some("google-123"));
    }

    #[tokio::test]
    async fn test_resolve_session_round_trip() {
        let account =
            Account::with_federated_id("google-123".into(), Some("a@x.com".into()), None);
        let account_id = account.id;
        let key = session_key(&account).unwrap().to_string();

        let mut store = MockCredentialStore::new();
        store
            .expect_account_by_federated_id()
            .with(eq("google-123"))
            .returning(move |_| Ok(Some(account.clone())));

        let resolved = resolve_session(&store, &key).await.unwrap();
        assert_eq!(resolved.id, account_id);
    }
}
