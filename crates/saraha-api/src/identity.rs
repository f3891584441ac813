//! External identity verification (Google sign-in).

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use thiserror::Error;

use crate::error::ApiError;
use crate::token::TokenError;

const GOOGLE_TOKENINFO_URL: &str = "https://oauth2.googleapis.com/tokeninfo";

/// Identity asserted by an upstream provider after it verified the token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExternalIdentity {
    pub email: String,
    pub email_verified: bool,
    pub name: Option<String>,
    pub picture: Option<String>,
}

#[derive(Debug, Error)]
pub enum IdentityError {
    #[error("identity token rejected: {0}")]
    Rejected(String),

    #[error("identity provider unavailable: {0}")]
    Unavailable(String),
}

impl From<IdentityError> for ApiError {
    fn from(err: IdentityError) -> Self {
        match err {
            IdentityError::Rejected(reason) => ApiError::InvalidToken(TokenError::Rejected(reason)),
            IdentityError::Unavailable(_) => ApiError::DependencyFailure(err.into()),
        }
    }
}

#[async_trait]
pub trait IdentityProvider: Send + Sync {
    fn name(&self) -> &str;

    async fn verify(&self, id_token: &str) -> Result<ExternalIdentity, IdentityError>;
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum Flag {
    Bool(bool),
    Text(String),
}

impl Flag {
    fn is_set(&self) -> bool {
        match self {
            Flag::Bool(b) => *b,
            Flag::Text(s) => s.eq_ignore_ascii_case("true"),
        }
    }
}

#[derive(Debug, Deserialize)]
struct TokenInfo {
    aud: String,
    email: Option<String>,
    email_verified: Option<Flag>,
    name: Option<String>,
    picture: Option<String>,
}

/// Verifies Google ID tokens through the `tokeninfo` endpoint and checks the
/// audience against our client id.
pub struct GoogleIdentityProvider {
    client: Client,
    client_id: String,
    endpoint: String,
}

impl GoogleIdentityProvider {
    pub fn new(client_id: impl Into<String>) -> Self {
        Self::with_endpoint(client_id, GOOGLE_TOKENINFO_URL)
    }

    pub fn with_endpoint(client_id: impl Into<String>, endpoint: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            client_id: client_id.into(),
            endpoint: endpoint.into(),
        }
    }
}

#[async_trait]
impl IdentityProvider for GoogleIdentityProvider {
    fn name(&self) -> &str {
        "google"
    }

    async fn verify(&self, id_token: &str) -> Result<ExternalIdentity, IdentityError> {
        let response = self
            .client
            .get(&self.endpoint)
            .query(&[("id_token", id_token)])
            .send()
            .await
            .map_err(|e| IdentityError::Unavailable(e.to_string()))?;

        let status = response.status();
        if status == StatusCode::BAD_REQUEST || status == StatusCode::UNAUTHORIZED {
            return Err(IdentityError::Rejected("token not accepted by Google".into()));
        }
        if !status.is_success() {
            return Err(IdentityError::Unavailable(format!("tokeninfo returned {}", status)));
        }

        let info: TokenInfo = response
            .json()
            .await
            .map_err(|e| IdentityError::Unavailable(e.to_string()))?;

        identity_from(info, &self.client_id)
    }
}

fn identity_from(info: TokenInfo, client_id: &str) -> Result<ExternalIdentity, IdentityError> {
    if info.aud != client_id {
        return Err(IdentityError::Rejected("audience mismatch".into()));
    }
    let email = info
        .email
        .ok_or_else(|| IdentityError::Rejected("token carries no email".into()))?;

    Ok(ExternalIdentity {
        email: email.trim().to_lowercase(),
        email_verified: info.email_verified.is_some_and(|f| f.is_set()),
        name: info.name,
        picture: info.picture,
    })
}

/// Stand-in used when no Google client id is configured.
pub struct UnconfiguredIdentityProvider;

#[async_trait]
impl IdentityProvider for UnconfiguredIdentityProvider {
    fn name(&self) -> &str {
        "unconfigured"
    }

    async fn verify(&self, _id_token: &str) -> Result<ExternalIdentity, IdentityError> {
        Err(IdentityError::Unavailable("Google sign-in is not configured".into()))
    }
}
