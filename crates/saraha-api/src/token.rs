use std::time::Duration;

use jsonwebtoken::{
    Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode,
    errors::ErrorKind,
};
use thiserror::Error;
use uuid::Uuid;

use saraha_types::api::Claims;

use crate::config::TokenSecrets;

/// Which signing secret a token belongs to. Tokens never verify across classes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SecretClass {
    UserAccess,
    AdminAccess,
    Refresh,
}

impl SecretClass {
    /// Token type reported to clients alongside an access token.
    pub fn token_type(&self) -> &'static str {
        match self {
            Self::UserAccess => "Bearer",
            Self::AdminAccess => "Admin",
            Self::Refresh => "Refresh",
        }
    }
}

#[derive(Debug, Error)]
pub enum TokenError {
    #[error("token signature does not match")]
    InvalidSignature,

    #[error("token has expired")]
    Expired,

    #[error("token could not be parsed")]
    Malformed,

    #[error("token was rejected: {0}")]
    Rejected(String),

    #[error("failed to sign token: {0}")]
    Encoding(jsonwebtoken::errors::Error),
}

impl From<jsonwebtoken::errors::Error> for TokenError {
    fn from(err: jsonwebtoken::errors::Error) -> Self {
        match err.kind() {
            ErrorKind::InvalidSignature => Self::InvalidSignature,
            ErrorKind::ExpiredSignature => Self::Expired,
            ErrorKind::InvalidToken
            | ErrorKind::Base64(_)
            | ErrorKind::Json(_)
            | ErrorKind::Utf8(_) => Self::Malformed,
            other => Self::Rejected(format!("{:?}", other)),
        }
    }
}

struct KeyPair {
    encoding: EncodingKey,
    decoding: DecodingKey,
}

impl KeyPair {
    fn from_secret(secret: &str) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
        }
    }
}

/// HS256 issuance and verification. Stateless apart from the keys.
pub struct TokenService {
    user_access: KeyPair,
    admin_access: KeyPair,
    refresh: KeyPair,
    validation: Validation,
}

impl TokenService {
    pub fn new(secrets: &TokenSecrets) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;
        validation.set_required_spec_claims(&["exp"]);

        Self {
            user_access: KeyPair::from_secret(&secrets.user_access),
            admin_access: KeyPair::from_secret(&secrets.admin_access),
            refresh: KeyPair::from_secret(&secrets.refresh),
            validation,
        }
    }

    fn keys(&self, class: SecretClass) -> &KeyPair {
        match class {
            SecretClass::UserAccess => &self.user_access,
            SecretClass::AdminAccess => &self.admin_access,
            SecretClass::Refresh => &self.refresh,
        }
    }

    /// Sign `email` with a fresh jti, valid for `ttl` from now.
    pub fn issue(&self, email: &str, class: SecretClass, ttl: Duration) -> Result<String, TokenError> {
        let now = chrono::Utc::now().timestamp();
        let claims = Claims {
            email: email.to_string(),
            jti: Uuid::new_v4().to_string(),
            iat: now,
            exp: now + ttl.as_secs() as i64,
        };

        encode(&Header::new(Algorithm::HS256), &claims, &self.keys(class).encoding)
            .map_err(TokenError::Encoding)
    }

    pub fn verify(&self, token: &str, class: SecretClass) -> Result<Claims, TokenError> {
        let data = decode::<Claims>(token, &self.keys(class).decoding, &self.validation)?;
        Ok(data.claims)
    }
}
