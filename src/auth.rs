//! Caller identity: Firebase ID token verification and the per-call auth context.

use async_trait::async_trait;
use jsonwebtoken::jwk::JwkSet;
use jsonwebtoken::{Algorithm, DecodingKey, Validation, decode, decode_header};
use serde::Deserialize;
use tokio::sync::RwLock;

/// Tracing target for authentication.
pub const TRACING_TARGET_AUTH: &str = "docit_functions::auth";

/// Google's published signing keys for Firebase ID tokens.
pub const FIREBASE_JWKS_URL: &str =
    "https://www.googleapis.com/service_accounts/v1/jwk/securetoken@system.gserviceaccount.com";

/// Identity of the caller of one request. Never persisted.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AuthContext {
    pub user_id: Option<String>,
    pub email: Option<String>,
    pub email_verified: bool,
}

impl AuthContext {
    /// A caller with a verified email address.
    pub fn verified(user_id: impl Into<String>) -> Self {
        Self {
            user_id: Some(user_id.into()),
            email: None,
            email_verified: true,
        }
    }

    /// Non-empty user id, if any.
    pub fn user_id(&self) -> Option<&str> {
        self.user_id.as_deref().filter(|id| !id.is_empty())
    }
}

/// Reasons a caller is not allowed through.
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("request has no bearer token")]
    MissingToken,

    #[error("invalid ID token: {0}")]
    InvalidToken(#[from] jsonwebtoken::errors::Error),

    #[error("ID token signed with unknown key `{0}`")]
    UnknownKey(String),

    #[error("could not fetch signing keys: {0}")]
    KeyFetch(#[from] reqwest::Error),

    #[error("caller's email address is not verified")]
    EmailNotVerified,

    #[error("auth context carries no user id")]
    MissingUserId,
}

/// Turns a bearer token into an [`AuthContext`].
#[async_trait]
pub trait TokenVerifier: Send + Sync {
    async fn verify(&self, token: &str) -> Result<AuthContext, AuthError>;
}

/// Claims of a Firebase ID token this service reads.
#[derive(Debug, Clone, Deserialize)]
pub struct FirebaseClaims {
    pub sub: String,
    #[serde(default)]
    pub user_id: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub email_verified: bool,
}

impl From<FirebaseClaims> for AuthContext {
    fn from(claims: FirebaseClaims) -> Self {
        let user_id = claims
            .user_id
            .filter(|id| !id.is_empty())
            .or(Some(claims.sub))
            .filter(|id| !id.is_empty());
        Self {
            user_id,
            email: claims.email,
            email_verified: claims.email_verified,
        }
    }
}

/// Validation rules for ID tokens issued to `project_id`.
pub fn firebase_validation(project_id: &str, algorithm: Algorithm) -> Validation {
    let mut validation = Validation::new(algorithm);
    validation.set_audience(&[project_id]);
    validation.set_issuer(&[format!("https://securetoken.google.com/{project_id}")]);
    validation.set_required_spec_claims(&["exp", "aud", "iss", "sub"]);
    validation
}

/// Decodes and validates `token`, returning the caller's context.
pub fn decode_context(
    token: &str,
    key: &DecodingKey,
    validation: &Validation,
) -> Result<AuthContext, AuthError> {
    let data = decode::<FirebaseClaims>(token, key, validation)?;
    Ok(data.claims.into())
}

/// Verifies RS256 Firebase ID tokens against Google's JWKS.
///
/// Keys are fetched on first use and refetched when a token names a key id
/// the cache does not know, which is how Google rotates them.
pub struct FirebaseVerifier {
    client: reqwest::Client,
    jwks_url: String,
    validation: Validation,
    keys: RwLock<JwkSet>,
}

impl FirebaseVerifier {
    pub fn new(client: reqwest::Client, project_id: &str) -> Self {
        Self {
            client,
            jwks_url: FIREBASE_JWKS_URL.to_owned(),
            validation: firebase_validation(project_id, Algorithm::RS256),
            keys: RwLock::new(JwkSet { keys: Vec::new() }),
        }
    }

    #[must_use]
    pub fn with_jwks_url(mut self, jwks_url: impl Into<String>) -> Self {
        self.jwks_url = jwks_url.into();
        self
    }

    async fn cached_key(&self, kid: &str) -> Result<Option<DecodingKey>, AuthError> {
        let keys = self.keys.read().await;
        keys.find(kid)
            .map(DecodingKey::from_jwk)
            .transpose()
            .map_err(AuthError::from)
    }

    async fn refresh(&self) -> Result<(), AuthError> {
        let fetched: JwkSet = self
            .client
            .get(&self.jwks_url)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        tracing::debug!(
            target: TRACING_TARGET_AUTH,
            keys = fetched.keys.len(),
            "refreshed ID token signing keys"
        );
        *self.keys.write().await = fetched;
        Ok(())
    }

    async fn key_for(&self, kid: &str) -> Result<DecodingKey, AuthError> {
        if let Some(key) = self.cached_key(kid).await? {
            return Ok(key);
        }
        self.refresh().await?;
        self.cached_key(kid)
            .await?
            .ok_or_else(|| AuthError::UnknownKey(kid.to_owned()))
    }
}

#[async_trait]
impl TokenVerifier for FirebaseVerifier {
    async fn verify(&self, token: &str) -> Result<AuthContext, AuthError> {
        let header = decode_header(token)?;
        let kid = header
            .kid
            .ok_or_else(|| AuthError::UnknownKey(String::new()))?;
        let key = self.key_for(&kid).await?;
        decode_context(token, &key, &self.validation)
    }
}

/// Extracts the token from an `Authorization: Bearer <token>` header value.
pub fn bearer_token(header: &str) -> Option<&str> {
    let (scheme, token) = header.trim().split_once(' ')?;
    let token = token.trim();
    (scheme.eq_ignore_ascii_case("bearer") && !token.is_empty()).then_some(token)
}
