use axum::{Extension, Json, body::Bytes, extract::State, http::StatusCode, response::IntoResponse};
use tracing::{info, warn};
use uuid::Uuid;
use validator::Validate;

use saraha_db::models::{NewUser, UserRow};
use saraha_types::api::{
    AccessToken, ApiResponse, GoogleSignInRequest, LogoutRequest, SigninRequest, SignupRequest,
    SignupResponse, TokenPair, VerifyEmailQuery,
};
use saraha_types::models::{Gender, Provider, Role};

use crate::convert::user_view;
use crate::error::ApiError;
use crate::extract::{ApiJson, ApiQuery};
use crate::mailer::verification_email;
use crate::middleware::AuthContext;
use crate::state::{AppState, AppStateInner};
use crate::token::SecretClass;

pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

fn access_class(user: &UserRow) -> SecretClass {
    match user.role.parse::<Role>() {
        Ok(Role::Admin) => SecretClass::AdminAccess,
        _ => SecretClass::UserAccess,
    }
}

fn provider_of(user: &UserRow) -> Provider {
    user.provider.parse().unwrap_or_default()
}

/// Admins get admin-signed access tokens; refresh tokens are the same for all.
pub fn issue_pair(state: &AppStateInner, user: &UserRow) -> Result<TokenPair, ApiError> {
    let class = access_class(user);
    let access_token = state
        .tokens
        .issue(&user.email, class, state.config.access_ttl)
        .map_err(|e| ApiError::Internal(e.into()))?;
    let refresh_token = state
        .tokens
        .issue(&user.email, SecretClass::Refresh, state.config.refresh_ttl)
        .map_err(|e| ApiError::Internal(e.into()))?;

    Ok(TokenPair {
        access_token,
        refresh_token,
        token_type: class.token_type().to_string(),
    })
}

/// Queue a verification link for `user`. The link carries a short-lived
/// user-access token.
pub fn send_verification(state: &AppStateInner, user: &UserRow) -> Result<(), ApiError> {
    let token = state
        .tokens
        .issue(&user.email, SecretClass::UserAccess, state.config.verify_ttl)
        .map_err(|e| ApiError::Internal(e.into()))?;
    let link = format!("{}/auth/verify-email?token={}", state.config.public_url, token);

    state.mailer.send(verification_email(
        &state.config.email_from,
        &user.email,
        &user.name,
        &link,
    ));
    Ok(())
}

pub async fn signup(
    State(state): State<AppState>,
    ApiJson(req): ApiJson<SignupRequest>,
) -> Result<impl IntoResponse, ApiError> {
    req.validate()?;
    let email = normalize_email(&req.email);

    let lookup = email.clone();
    if state
        .db_call(move |db| db.get_user_by_email(&lookup))
        .await?
        .is_some()
    {
        return Err(ApiError::DuplicateEmail);
    }

    let password_hash = state.hash_password(req.password).await?;
    let phone = state.encrypt_phone(&req.phone)?;
    let id = Uuid::new_v4().to_string();
    let name = req.name.trim().to_string();
    let dob = req.dob.to_string();
    let gender = req.gender.unwrap_or_default();

    let user = state
        .db_call(move |db| {
            db.create_user(&NewUser {
                id: &id,
                name: &name,
                email: &email,
                password: &password_hash,
                dob: Some(&dob),
                gender: gender.as_str(),
                phone: Some(&phone),
                role: Role::User.as_str(),
                confirmed: false,
                provider: Provider::System.as_str(),
                picture_url: None,
            })?;
            db.get_user_by_id(&id)?
                .ok_or_else(|| anyhow::anyhow!("User {} vanished after insert", id))
        })
        .await?;

    info!(user_id = %user.id, "User signed up");

    send_verification(&state, &user)?;
    let pair = issue_pair(&state, &user)?;

    Ok((
        StatusCode::CREATED,
        Json(ApiResponse::with_data(
            "User created successfully, check your email for verification",
            SignupResponse {
                user: user_view(&user, &state.config.encryption_key),
                access_token: pair.access_token,
                refresh_token: pair.refresh_token,
                token_type: pair.token_type,
            },
        )),
    ))
}

pub async fn signin(
    State(state): State<AppState>,
    ApiJson(req): ApiJson<SigninRequest>,
) -> Result<impl IntoResponse, ApiError> {
    req.validate()?;
    let email = normalize_email(&req.email);

    let user = state
        .db_call(move |db| db.get_user_by_email(&email))
        .await?
        .filter(|u| u.confirmed)
        .ok_or(ApiError::NotFoundOrUnverified)?;

    if provider_of(&user) != Provider::System {
        return Err(ApiError::ProviderMismatch);
    }

    if !state
        .verify_password(req.password, user.password.clone())
        .await?
    {
        warn!(user_id = %user.id, "Sign-in with wrong password");
        return Err(ApiError::InvalidCredentials);
    }

    let pair = issue_pair(&state, &user)?;
    info!(user_id = %user.id, "User signed in");

    Ok(Json(ApiResponse::with_data("User signed in successfully", pair)))
}

pub async fn google_sign_in(
    State(state): State<AppState>,
    ApiJson(req): ApiJson<GoogleSignInRequest>,
) -> Result<impl IntoResponse, ApiError> {
    req.validate()?;

    let identity = state.identity.verify(&req.id_token).await?;
    if !identity.email_verified {
        return Err(ApiError::EmailNotVerified);
    }

    let email = identity.email.clone();
    let existing = state
        .db_call(move |db| db.get_user_by_email(&email))
        .await?;

    let user = match existing {
        Some(user) if provider_of(&user) != Provider::Google => {
            return Err(ApiError::ProviderMismatch);
        }
        Some(user) => user,
        None => {
            let id = Uuid::new_v4().to_string();
            let email = identity.email.clone();
            let name = identity
                .name
                .clone()
                .filter(|n| !n.trim().is_empty())
                .unwrap_or_else(|| email.split('@').next().unwrap_or_default().to_string());
            let password = state.unusable_password().await?;
            let phone = state.encrypt_phone(&req.phone)?;
            let dob = req.dob.to_string();
            let picture = identity.picture.clone();

            let user = state
                .db_call(move |db| {
                    db.create_user(&NewUser {
                        id: &id,
                        name: &name,
                        email: &email,
                        password: &password,
                        dob: Some(&dob),
                        gender: Gender::default().as_str(),
                        phone: Some(&phone),
                        role: Role::User.as_str(),
                        confirmed: true,
                        provider: Provider::Google.as_str(),
                        picture_url: picture.as_deref(),
                    })?;
                    db.get_user_by_id(&id)?
                        .ok_or_else(|| anyhow::anyhow!("User {} vanished after insert", id))
                })
                .await?;

            info!(user_id = %user.id, "User created through Google sign-in");
            user
        }
    };

    let pair = issue_pair(&state, &user)?;
    Ok(Json(ApiResponse::with_data("User signed in successfully", pair)))
}

pub async fn verify_email(
    State(state): State<AppState>,
    ApiQuery(query): ApiQuery<VerifyEmailQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let token = query
        .token
        .filter(|t| !t.is_empty())
        .ok_or_else(|| ApiError::bad_request("Token is required"))?;

    let claims = state.tokens.verify(&token, SecretClass::UserAccess)?;
    if state
        .ledger
        .is_revoked(&claims.jti)
        .await
        .map_err(ApiError::DependencyFailure)?
    {
        return Err(ApiError::TokenRevoked);
    }

    let confirmed = state
        .db_call(move |db| match db.get_user_by_email(&claims.email)? {
            Some(user) if !user.confirmed => Ok(db.confirm_user(&user.id)?.then_some(user.id)),
            _ => Ok(None),
        })
        .await?
        .ok_or(ApiError::AlreadyConfirmedOrMissing)?;

    info!(user_id = %confirmed, "Email confirmed");
    Ok(Json(ApiResponse::message("Email verified successfully")))
}

pub async fn refresh_token(
    State(state): State<AppState>,
    Extension(ctx): Extension<AuthContext>,
) -> Result<impl IntoResponse, ApiError> {
    let class = access_class(&ctx.user);
    let access_token = state
        .tokens
        .issue(&ctx.user.email, class, state.config.access_ttl)
        .map_err(|e| ApiError::Internal(e.into()))?;

    Ok(Json(ApiResponse::with_data(
        "Token refreshed successfully",
        AccessToken {
            access_token,
            token_type: class.token_type().to_string(),
        },
    )))
}

/// Revokes the presented access token and, when supplied, the caller's own
/// refresh token.
pub async fn logout(
    State(state): State<AppState>,
    Extension(ctx): Extension<AuthContext>,
    body: Bytes,
) -> Result<impl IntoResponse, ApiError> {
    let req: LogoutRequest = if body.iter().all(u8::is_ascii_whitespace) {
        LogoutRequest::default()
    } else {
        serde_json::from_slice(&body).map_err(|e| ApiError::bad_request(e.to_string()))?
    };

    state
        .ledger
        .revoke(&ctx.jti, &ctx.user.id, ctx.expires_at)
        .await
        .map_err(ApiError::DependencyFailure)?;

    if let Some(refresh) = req.refresh_token {
        match state.tokens.verify(&refresh, SecretClass::Refresh) {
            Ok(claims) if claims.email == ctx.user.email => {
                state
                    .ledger
                    .revoke(&claims.jti, &ctx.user.id, claims.exp)
                    .await
                    .map_err(ApiError::DependencyFailure)?;
            }
            Ok(_) => warn!(user_id = %ctx.user.id, "Logout with another user's refresh token"),
            Err(e) => warn!(user_id = %ctx.user.id, "Logout with unusable refresh token: {}", e),
        }
    }

    info!(user_id = %ctx.user.id, "User logged out");
    Ok(Json(ApiResponse::message("Logged out successfully")))
}
