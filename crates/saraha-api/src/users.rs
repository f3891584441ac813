use axum::{Extension, Json, extract::State, response::IntoResponse};
use tracing::{info, warn};
use validator::Validate;

use saraha_db::models::ProfileUpdate;
use saraha_types::api::{ApiResponse, ForgetPasswordRequest, ResetPasswordRequest, UpdateProfileRequest};
use saraha_types::models::Provider;

use crate::auth::{normalize_email, send_verification};
use crate::convert::{parse_attachments, user_view};
use crate::error::ApiError;
use crate::extract::ApiJson;
use crate::mailer::{account_deleted_email, otp_email, password_changed_email, profile_updated_email};
use crate::middleware::AuthContext;
use crate::state::{AppState, AppStateInner};

const OTP_TTL_SECS: i64 = 10 * 60;

/// Release an object we no longer reference. Failures are logged only.
pub(crate) async fn release_object(state: &AppStateInner, public_id: &str) {
    if public_id.is_empty() {
        return;
    }
    if let Err(e) = state.storage.destroy(public_id).await {
        warn!("Failed to destroy object {}: {:#}", public_id, e);
    }
}

pub async fn get_profile(
    State(state): State<AppState>,
    Extension(ctx): Extension<AuthContext>,
) -> Result<impl IntoResponse, ApiError> {
    Ok(Json(ApiResponse::with_data(
        "User retrieved successfully",
        user_view(&ctx.user, &state.config.encryption_key),
    )))
}

pub async fn update_profile(
    State(state): State<AppState>,
    Extension(ctx): Extension<AuthContext>,
    ApiJson(req): ApiJson<UpdateProfileRequest>,
) -> Result<impl IntoResponse, ApiError> {
    if req.is_empty() {
        return Err(ApiError::bad_request("At least one field is required"));
    }
    req.validate()?;

    let current = &ctx.user;
    let name = req
        .name
        .as_deref()
        .map(str::trim)
        .unwrap_or(current.name.as_str())
        .to_string();
    let dob = req.dob.map(|d| d.to_string()).or_else(|| current.dob.clone());
    let gender = req
        .gender
        .map(|g| g.as_str().to_string())
        .unwrap_or_else(|| current.gender.clone());
    let phone = match &req.phone {
        Some(p) => Some(state.encrypt_phone(p)?),
        None => current.phone.clone(),
    };

    let replaced_picture = req.profile_picture.as_ref().and_then(|_| current.picture_public_id.clone());
    let (picture_public_id, picture_url, picture_display_name) = match req.profile_picture {
        Some(p) => (Some(p.public_id), Some(p.secure_url), Some(p.display_name)),
        None => (
            current.picture_public_id.clone(),
            current.picture_url.clone(),
            current.picture_display_name.clone(),
        ),
    };

    let id = current.id.clone();
    let new_public_id = picture_public_id.clone();
    let updated = state
        .db_call(move |db| {
            db.update_user_profile(
                &id,
                &ProfileUpdate {
                    name: &name,
                    dob: dob.as_deref(),
                    gender: &gender,
                    phone: phone.as_deref(),
                    picture_public_id: picture_public_id.as_deref(),
                    picture_url: picture_url.as_deref(),
                    picture_display_name: picture_display_name.as_deref(),
                },
            )?;
            db.get_user_by_id(&id)
        })
        .await?
        .ok_or(ApiError::PrincipalNotFound)?;

    if let Some(old) = replaced_picture {
        if Some(&old) != new_public_id.as_ref() {
            release_object(&state, &old).await;
        }
    }

    state.mailer.send(profile_updated_email(
        &state.config.email_from,
        &updated.email,
        &updated.name,
    ));
    info!(user_id = %updated.id, "Profile updated");

    Ok(Json(ApiResponse::with_data(
        "Profile updated successfully",
        user_view(&updated, &state.config.encryption_key),
    )))
}

/// Deleting cascades to received messages and ledger entries; sent messages
/// become anonymous.
pub async fn delete_account(
    State(state): State<AppState>,
    Extension(ctx): Extension<AuthContext>,
) -> Result<impl IntoResponse, ApiError> {
    if !ctx.user.confirmed {
        return Err(ApiError::bad_request("Email is not confirmed"));
    }

    let id = ctx.user.id.clone();
    let attachments = state
        .db_call(move |db| {
            let attachments = db.get_attachments_for(&id)?;
            db.delete_user(&id)?;
            Ok(attachments)
        })
        .await?;

    if let Some(public_id) = &ctx.user.picture_public_id {
        release_object(&state, public_id).await;
    }
    for raw in &attachments {
        for attachment in parse_attachments(raw) {
            release_object(&state, &attachment.public_id).await;
        }
    }

    state.mailer.send(account_deleted_email(
        &state.config.email_from,
        &ctx.user.email,
        &ctx.user.name,
    ));
    info!(user_id = %ctx.user.id, "Account deleted");

    Ok(Json(ApiResponse::message("User deleted successfully")))
}

/// Refresh-authorized: an unconfirmed user may only hold a refresh token.
pub async fn resend_confirm_email(
    State(state): State<AppState>,
    Extension(ctx): Extension<AuthContext>,
) -> Result<impl IntoResponse, ApiError> {
    if ctx.user.confirmed {
        return Err(ApiError::bad_request("Email already confirmed"));
    }

    send_verification(&state, &ctx.user)?;
    Ok(Json(ApiResponse::message("Email sent successfully")))
}

pub async fn forget_password(
    State(state): State<AppState>,
    ApiJson(req): ApiJson<ForgetPasswordRequest>,
) -> Result<impl IntoResponse, ApiError> {
    req.validate()?;
    let email = normalize_email(&req.email);

    let user = state
        .db_call(move |db| db.get_user_by_email(&email))
        .await?
        .ok_or_else(|| ApiError::not_found("Email does not exist"))?;

    let otp = format!("{:06}", rand::random_range(0..1_000_000u32));
    let otp_hash = state.hash_password(otp.clone()).await?;
    let expires_at = chrono::Utc::now().timestamp() + OTP_TTL_SECS;

    let id = user.id.clone();
    state
        .db_call(move |db| db.set_user_otp(&id, &otp_hash, expires_at))
        .await?;

    state
        .mailer
        .send(otp_email(&state.config.email_from, &user.email, &user.name, &otp));
    info!(user_id = %user.id, "Password reset code issued");

    Ok(Json(ApiResponse::message(
        "OTP sent successfully. Please check your email",
    )))
}

pub async fn reset_password(
    State(state): State<AppState>,
    ApiJson(req): ApiJson<ResetPasswordRequest>,
) -> Result<impl IntoResponse, ApiError> {
    req.validate()?;
    let email = normalize_email(&req.email);

    let user = state
        .db_call(move |db| db.get_user_by_email(&email))
        .await?
        .ok_or_else(|| ApiError::not_found("Email does not exist"))?;

    if user.provider.parse::<Provider>().unwrap_or_default() != Provider::System {
        return Err(ApiError::ProviderMismatch);
    }

    let (Some(otp_hash), Some(expires_at)) = (user.otp_hash.clone(), user.otp_expires_at) else {
        return Err(ApiError::bad_request("No password reset was requested"));
    };
    if expires_at <= chrono::Utc::now().timestamp() {
        return Err(ApiError::bad_request("OTP has expired"));
    }
    if !state.verify_password(req.otp, otp_hash).await? {
        warn!(user_id = %user.id, "Password reset with wrong OTP");
        return Err(ApiError::bad_request("Invalid OTP"));
    }

    let password_hash = state.hash_password(req.new_password).await?;
    let id = user.id.clone();
    state
        .db_call(move |db| db.reset_user_password(&id, &password_hash))
        .await?;

    state.mailer.send(password_changed_email(
        &state.config.email_from,
        &user.email,
        &user.name,
    ));
    info!(user_id = %user.id, "Password reset");

    Ok(Json(ApiResponse::message("Password updated successfully")))
}
