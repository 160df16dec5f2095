use crate::error::{AppError, AuthError};
use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String, // Account ID
    pub exp: i64,    // Expiration time
    pub iat: i64,    // Issued at
}

/// Issues and verifies signed bearer tokens bound to an account id.
/// The signing secret is loaded once at startup; it never has a
/// baked-in default.
#[derive(Clone)]
pub struct TokenService {
    secret: String,
    expiry: Duration,
}

impl TokenService {
    pub fn new(secret: String, expiry_hours: i64) -> Self {
        Self {
            secret,
            expiry: Duration::hours(expiry_hours),
        }
    }

    pub fn issue(&self, account_id: Uuid) -> Result<String, AppError> {
        self.issue_at(account_id, Utc::now())
    }

    /// Issuance with an explicit clock, so expiry can be exercised in
    /// tests without waiting out the window.
    pub fn issue_at(&self, account_id: Uuid, now: DateTime<Utc>) -> Result<String, AppError> {
        let claims = Claims {
            sub: account_id.to_string(),
            exp: (now + self.expiry).timestamp(),
            iat: now.timestamp(),
        };

        let token = encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(self.secret.as_bytes()),
        )?;

        Ok(token)
    }

    pub fn verify(&self, token: &str) -> Result<Uuid, AppError> {
        let mut validation = Validation::new(Algorithm::HS256);
        // no leeway: the 24h boundary is exact
        validation.leeway = 0;

        let data = decode::<Claims>(
            token,
            &DecodingKey::from_secret(self.secret.as_bytes()),
            &validation,
        )?;

        Uuid::parse_str(&data.claims.sub).map_err(|_| AuthError::InvalidToken.into())
    }
}
