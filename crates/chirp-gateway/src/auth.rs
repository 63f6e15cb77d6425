use std::collections::HashMap;

use axum::http::{HeaderMap, HeaderValue, header};
use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation, decode, encode};
use thiserror::Error;
use tracing::{debug, warn};
use uuid::Uuid;

use chirp_types::api::Claims;

/// Why a bearer credential was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum AuthError {
    #[error("MISSING_TOKEN")]
    MissingToken,
    #[error("INVALID_TOKEN")]
    InvalidToken,
    #[error("INVALID_PAYLOAD")]
    InvalidPayload,
}

impl AuthError {
    /// Stable code reported to clients.
    pub fn code(&self) -> &'static str {
        match self {
            Self::MissingToken => "MISSING_TOKEN",
            Self::InvalidToken => "INVALID_TOKEN",
            Self::InvalidPayload => "INVALID_PAYLOAD",
        }
    }
}

/// HS256 signing and verification keys derived from one shared secret.
#[derive(Clone)]
pub struct TokenKeys {
    encoding: EncodingKey,
    decoding: DecodingKey,
    validation: Validation,
}

impl TokenKeys {
    pub fn from_secret(secret: &str) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
            validation: Validation::default(),
        }
    }

    /// Sign a token carrying `user_id` that expires after `ttl`.
    pub fn issue(&self, user_id: Uuid, ttl: chrono::Duration) -> anyhow::Result<String> {
        let claims = Claims {
            user_id: Some(user_id.to_string()),
            exp: (chrono::Utc::now() + ttl).timestamp() as usize,
        };
        Ok(encode(&Header::default(), &claims, &self.encoding)?)
    }

    /// Check signature and expiry, then pull the user id out of the claims.
    pub fn verify(&self, token: &str) -> Result<Uuid, AuthError> {
        let data = decode::<Claims>(token, &self.decoding, &self.validation).map_err(|e| {
            debug!("Token rejected: {}", e);
            AuthError::InvalidToken
        })?;

        data.claims
            .user_id
            .as_deref()
            .filter(|id| !id.is_empty())
            .and_then(|id| id.parse::<Uuid>().ok())
            .ok_or(AuthError::InvalidPayload)
    }
}

/// Pull the token out of an `Authorization: Bearer <token>` value.
pub fn bearer_token(value: &HeaderValue) -> Result<&str, AuthError> {
    let raw = value.to_str().map_err(|_| AuthError::MissingToken)?;
    raw.strip_prefix("Bearer ")
        .map(str::trim)
        .filter(|token| !token.is_empty())
        .ok_or(AuthError::MissingToken)
}

/// Credentials offered by a chat socket before the upgrade completes.
#[derive(Debug, Clone, Default)]
pub struct Handshake {
    /// Explicit auth field, the `Authorization` header of the upgrade request
    pub authorization: Option<HeaderValue>,
    /// Query string of the upgrade request
    pub query: HashMap<String, String>,
}

impl Handshake {
    pub fn from_request(headers: &HeaderMap, query: HashMap<String, String>) -> Self {
        Self {
            authorization: headers.get(header::AUTHORIZATION).cloned(),
            query,
        }
    }

    /// The offered token. The auth field wins over `?token=` whenever it is
    /// present, even if it turns out to be unusable.
    pub fn token(&self) -> Result<&str, AuthError> {
        if let Some(value) = self.authorization.as_ref().filter(|v| !v.is_empty()) {
            return bearer_token(value);
        }

        self.query
            .get("token")
            .map(String::as_str)
            .filter(|token| !token.is_empty())
            .ok_or(AuthError::MissingToken)
    }

    /// Run the full handshake check. Called exactly once per connection,
    /// before the socket is upgraded.
    pub fn authenticate(&self, keys: &TokenKeys) -> Result<Uuid, AuthError> {
        let result = self.token().and_then(|token| keys.verify(token));
        match &result {
            Ok(user_id) => debug!("Handshake accepted for {}", user_id),
            Err(e) => warn!("Handshake rejected: {}", e),
        }
        result
    }
}
