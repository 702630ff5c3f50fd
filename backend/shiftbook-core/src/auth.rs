// src/auth.rs
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;
use uuid::Uuid;

use crate::store::{StoreError, UserStore};

/// An authenticated principal. `current_schedule_id` is a cache, not the source of truth.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: String,
    pub email: String,
    pub current_schedule_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}

// JWT claims
#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,   // Subject (user ID)
    pub email: String, // User email
    pub exp: i64,      // Expiration time
}

#[derive(Debug, Clone)]
pub enum Credentials {
    Bearer(String),
}

#[derive(Error, Debug)]
pub enum AuthError {
    #[error("Missing or malformed Authorization header")]
    MissingCredentials,

    #[error("Token lifetime of {0} hours is out of range")]
    LifetimeOutOfRange(u64),

    #[error("Token error: {0}")]
    Token(#[from] jsonwebtoken::errors::Error),

    #[error("Failed to load user: {0}")]
    Store(#[from] StoreError),
}

#[async_trait]
pub trait Authenticator: Send + Sync {
    async fn authenticate(&self, credentials: &Credentials) -> Result<User, AuthError>;
}

/// Verifies HS256 bearer tokens and makes sure the subject has a user row.
pub struct JwtAuthenticator {
    decoding_key: DecodingKey,
    validation: Validation,
    users: Arc<dyn UserStore>,
}

impl JwtAuthenticator {
    pub fn new(secret: &[u8], users: Arc<dyn UserStore>) -> Self {
        Self {
            decoding_key: DecodingKey::from_secret(secret),
            validation: Validation::new(Algorithm::HS256),
            users,
        }
    }
}

#[async_trait]
impl Authenticator for JwtAuthenticator {
    async fn authenticate(&self, credentials: &Credentials) -> Result<User, AuthError> {
        let Credentials::Bearer(token) = credentials;
        let token_data = decode::<Claims>(token, &self.decoding_key, &self.validation)?;
        let claims = token_data.claims;

        if let Some(user) = self.users.find_user(&claims.sub).await? {
            if user.email == claims.email {
                return Ok(user);
            }
        }

        debug!("Registering user {}", claims.sub);
        Ok(self.users.upsert_user(&claims.sub, &claims.email).await?)
    }
}

/// Signs a token for `user_id` valid for `ttl_hours`.
pub fn issue_token(
    secret: &[u8],
    user_id: &str,
    email: &str,
    ttl_hours: u64,
) -> Result<String, AuthError> {
    let exp = i64::try_from(ttl_hours)
        .ok()
        .and_then(chrono::Duration::try_hours)
        .and_then(|ttl| Utc::now().checked_add_signed(ttl))
        .ok_or(AuthError::LifetimeOutOfRange(ttl_hours))?;
    let claims = Claims {
        sub: user_id.to_string(),
        email: email.to_string(),
        exp: exp.timestamp(),
    };

    Ok(encode(
        &Header::new(Algorithm::HS256),
        &claims,
        &EncodingKey::from_secret(secret),
    )?)
}
