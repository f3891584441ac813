use axum::{
    extract::{Request, State},
    http::{HeaderValue, header},
    middleware::Next,
    response::Response,
};
use tracing::warn;

use saraha_db::models::UserRow;
use saraha_types::models::Role;

use crate::error::ApiError;
use crate::state::{AppState, AppStateInner};
use crate::token::SecretClass;

/// Identity attached to a request once its credential checks out.
#[derive(Debug, Clone)]
pub struct AuthContext {
    pub user: UserRow,
    pub jti: String,
    /// Expiry of the presented token, unix seconds.
    pub expires_at: i64,
    pub class: SecretClass,
}

impl AuthContext {
    pub fn is_admin(&self) -> bool {
        self.user.role.parse::<Role>().is_ok_and(|r| r == Role::Admin)
    }
}

/// Set by `optional_auth`. `None` means the caller sent no credential.
#[derive(Debug, Clone)]
pub struct OptionalAuth(pub Option<AuthContext>);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthMode {
    /// `bearer` or `admin` prefix, access secrets.
    Access,
    /// `refresh` prefix only, refresh secret.
    Refresh,
}

fn secret_class(prefix: &str, mode: AuthMode) -> Result<SecretClass, ApiError> {
    match (mode, prefix.to_ascii_lowercase().as_str()) {
        (AuthMode::Access, "bearer") => Ok(SecretClass::UserAccess),
        (AuthMode::Access, "admin") => Ok(SecretClass::AdminAccess),
        (AuthMode::Refresh, "refresh") => Ok(SecretClass::Refresh),
        _ => Err(ApiError::UnsupportedPrefix),
    }
}

/// Split `<prefix> <token>`. Both halves must be present.
fn split_credential(header: &HeaderValue) -> Result<(&str, &str), ApiError> {
    let raw = header.to_str().map_err(|_| ApiError::MalformedCredential)?;
    let mut parts = raw.split(' ');
    match (parts.next(), parts.next()) {
        (Some(prefix), Some(token)) if !prefix.is_empty() && !token.is_empty() => {
            Ok((prefix, token))
        }
        _ => Err(ApiError::MalformedCredential),
    }
}

/// Full credential chain: header shape, prefix, signature, principal, ledger.
pub async fn authorize(
    state: &AppStateInner,
    header: Option<&HeaderValue>,
    mode: AuthMode,
) -> Result<AuthContext, ApiError> {
    let header = header.ok_or(ApiError::Unauthenticated)?;
    let (prefix, token) = split_credential(header)?;
    let class = secret_class(prefix, mode)?;

    let claims = state.tokens.verify(token, class).map_err(|e| {
        warn!("Rejected {:?} token: {}", class, e);
        ApiError::InvalidToken(e)
    })?;

    let email = claims.email.clone();
    let user = state
        .db_call(move |db| db.get_user_by_email(&email))
        .await?
        .ok_or(ApiError::PrincipalNotFound)?;

    if state
        .ledger
        .is_revoked(&claims.jti)
        .await
        .map_err(ApiError::DependencyFailure)?
    {
        warn!(user_id = %user.id, "Revoked token presented");
        return Err(ApiError::TokenRevoked);
    }

    Ok(AuthContext {
        user,
        jti: claims.jti,
        expires_at: claims.exp,
        class,
    })
}

pub async fn require_auth(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let header = req.headers().get(header::AUTHORIZATION).cloned();
    let ctx = authorize(&state, header.as_ref(), AuthMode::Access).await?;
    req.extensions_mut().insert(ctx);
    Ok(next.run(req).await)
}

/// Refresh-token variant. Only for minting access tokens and refresh-only
/// actions; never put it in front of routes that change business data.
pub async fn require_refresh(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let header = req.headers().get(header::AUTHORIZATION).cloned();
    let ctx = authorize(&state, header.as_ref(), AuthMode::Refresh).await?;
    req.extensions_mut().insert(ctx);
    Ok(next.run(req).await)
}

/// Anonymous callers pass through. A credential, once sent, must be valid.
pub async fn optional_auth(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let ctx = match req.headers().get(header::AUTHORIZATION).cloned() {
        Some(header) => Some(authorize(&state, Some(&header), AuthMode::Access).await?),
        None => None,
    };
    req.extensions_mut().insert(OptionalAuth(ctx));
    Ok(next.run(req).await)
}

/// Must run inside `require_auth`.
pub async fn require_admin(req: Request, next: Next) -> Result<Response, ApiError> {
    let ctx = req
        .extensions()
        .get::<AuthContext>()
        .ok_or(ApiError::Unauthenticated)?;

    if !ctx.is_admin() {
        warn!(user_id = %ctx.user.id, "Non-admin on admin route");
        return Err(ApiError::forbidden("Admin access required"));
    }

    Ok(next.run(req).await)
}
