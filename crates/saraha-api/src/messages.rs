use std::collections::HashSet;

use axum::{Extension, Json, extract::State, http::StatusCode, response::IntoResponse};
use tracing::info;
use uuid::Uuid;
use validator::Validate;

use saraha_db::models::MessageRow;
use saraha_types::api::{
    ApiResponse, MessagePage, PageQuery, ReportMessageRequest, SendMessageRequest,
    UpdateMessageRequest,
};
use saraha_types::models::AttachmentDescriptor;

use crate::convert::{message_view, parse_attachments, report_view};
use crate::error::ApiError;
use crate::extract::{ApiJson, ApiPath, ApiQuery};
use crate::middleware::{AuthContext, OptionalAuth};
use crate::state::{AppState, AppStateInner};
use crate::users::release_object;

pub const MAX_PAGE_SIZE: u32 = 100;

/// Validated `(limit, offset)` for a page query.
pub(crate) fn page_bounds(query: &PageQuery) -> Result<(u32, u64), ApiError> {
    if query.page < 1 {
        return Err(ApiError::bad_request("page must be at least 1"));
    }
    if query.limit < 1 || query.limit > MAX_PAGE_SIZE {
        return Err(ApiError::bad_request(format!(
            "limit must be between 1 and {}",
            MAX_PAGE_SIZE
        )));
    }
    Ok((query.limit, (query.page as u64 - 1) * query.limit as u64))
}

/// Trimmed content. Present-but-blank is rejected rather than dropped.
fn clean_content(content: Option<String>) -> Result<Option<String>, ApiError> {
    match content {
        Some(c) if c.trim().is_empty() => Err(ApiError::bad_request("Content cannot be empty")),
        Some(c) => Ok(Some(c.trim().to_string())),
        None => Ok(None),
    }
}

fn encode_attachments(list: &[AttachmentDescriptor]) -> Result<String, ApiError> {
    serde_json::to_string(list).map_err(|e| ApiError::Internal(e.into()))
}

async fn load_message(state: &AppStateInner, id: Uuid) -> Result<MessageRow, ApiError> {
    state
        .db_call(move |db| db.get_message(&id.to_string()))
        .await?
        .ok_or_else(|| ApiError::not_found("Message not found"))
}

fn ensure_owner_or_admin(ctx: &AuthContext, message: &MessageRow) -> Result<(), ApiError> {
    if ctx.user.id == message.user_id || ctx.is_admin() {
        Ok(())
    } else {
        Err(ApiError::forbidden("You are not allowed to modify this message"))
    }
}

/// Sender comes from the optional credential, never from the body.
pub async fn send_message(
    State(state): State<AppState>,
    Extension(OptionalAuth(sender)): Extension<OptionalAuth>,
    ApiJson(req): ApiJson<SendMessageRequest>,
) -> Result<impl IntoResponse, ApiError> {
    req.validate()?;

    let content = clean_content(req.content)?;
    let attachments = req.attachments.unwrap_or_default();
    if content.is_none() && attachments.is_empty() {
        return Err(ApiError::bad_request("Message content or attachments are required"));
    }

    let recipient_id = req.user_id.to_string();
    let sender_id = sender.map(|ctx| ctx.user.id);
    if sender_id.as_deref() == Some(recipient_id.as_str()) {
        return Err(ApiError::bad_request("You cannot send a message to yourself"));
    }

    let encoded = encode_attachments(&attachments)?;
    let id = Uuid::new_v4().to_string();
    let message = state
        .db_call(move |db| {
            if db.get_user_by_id(&recipient_id)?.is_none() {
                return Ok(None);
            }
            db.insert_message(&id, content.as_deref(), &encoded, &recipient_id, sender_id.as_deref())
                .map(Some)
        })
        .await?
        .ok_or_else(|| ApiError::not_found("Recipient not found"))?;

    info!(message_id = %message.id, anonymous = message.sender_id.is_none(), "Message sent");

    Ok((
        StatusCode::CREATED,
        Json(ApiResponse::with_data("Message sent successfully", message_view(&message))),
    ))
}

pub async fn list_messages(
    State(state): State<AppState>,
    Extension(ctx): Extension<AuthContext>,
    ApiQuery(query): ApiQuery<PageQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let (limit, offset) = page_bounds(&query)?;

    let user_id = ctx.user.id.clone();
    let (rows, total) = state
        .db_call(move |db| {
            let rows = db.get_messages_for(&user_id, limit, offset)?;
            let total = db.count_messages_for(&user_id)?;
            Ok((rows, total))
        })
        .await?;

    Ok(Json(ApiResponse::with_data(
        "Messages retrieved successfully",
        MessagePage {
            messages: rows.iter().map(message_view).collect(),
            total,
            page: query.page,
            limit,
        },
    )))
}

pub async fn update_message(
    State(state): State<AppState>,
    Extension(ctx): Extension<AuthContext>,
    ApiPath(id): ApiPath<Uuid>,
    ApiJson(req): ApiJson<UpdateMessageRequest>,
) -> Result<impl IntoResponse, ApiError> {
    req.validate()?;
    if req.content.is_none() && req.attachments.is_none() {
        return Err(ApiError::bad_request("At least one field is required"));
    }

    let existing = load_message(&state, id).await?;
    ensure_owner_or_admin(&ctx, &existing)?;

    let content = match clean_content(req.content)? {
        Some(c) => Some(c),
        None => existing.content.clone(),
    };
    let old_attachments = parse_attachments(&existing.attachments);
    let (attachments, dropped) = match req.attachments {
        Some(new) => {
            let keep: HashSet<&str> = new.iter().map(|a| a.public_id.as_str()).collect();
            let dropped: Vec<String> = old_attachments
                .iter()
                .filter(|a| !keep.contains(a.public_id.as_str()))
                .map(|a| a.public_id.clone())
                .collect();
            (new, dropped)
        }
        None => (old_attachments, Vec::new()),
    };
    if content.is_none() && attachments.is_empty() {
        return Err(ApiError::bad_request("Message content or attachments are required"));
    }

    let encoded = encode_attachments(&attachments)?;
    let message_id = existing.id.clone();
    let updated = state
        .db_call(move |db| db.update_message(&message_id, content.as_deref(), &encoded))
        .await?
        .ok_or_else(|| ApiError::not_found("Message not found"))?;

    for public_id in &dropped {
        release_object(&state, public_id).await;
    }

    Ok(Json(ApiResponse::with_data(
        "Message updated successfully",
        message_view(&updated),
    )))
}

pub async fn delete_message(
    State(state): State<AppState>,
    Extension(ctx): Extension<AuthContext>,
    ApiPath(id): ApiPath<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let existing = load_message(&state, id).await?;
    ensure_owner_or_admin(&ctx, &existing)?;

    let message_id = existing.id.clone();
    if !state.db_call(move |db| db.delete_message(&message_id)).await? {
        return Err(ApiError::not_found("Message not found"));
    }

    for attachment in parse_attachments(&existing.attachments) {
        release_object(&state, &attachment.public_id).await;
    }
    info!(message_id = %existing.id, user_id = %ctx.user.id, "Message deleted");

    Ok(Json(ApiResponse::message("Message deleted successfully")))
}

/// Only the recipient may report a message.
pub async fn report_message(
    State(state): State<AppState>,
    Extension(ctx): Extension<AuthContext>,
    ApiPath(id): ApiPath<Uuid>,
    ApiJson(req): ApiJson<ReportMessageRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let reason = req.reason.trim().to_string();
    if reason.is_empty() {
        return Err(ApiError::bad_request("Reason is required"));
    }

    let message = load_message(&state, id).await?;
    if message.user_id != ctx.user.id {
        return Err(ApiError::forbidden("Only the recipient can report this message"));
    }

    let report_id = Uuid::new_v4().to_string();
    let reporter = ctx.user.id.clone();
    let report = state
        .db_call(move |db| db.insert_report(&report_id, &message.id, &reporter, &reason))
        .await?;

    info!(report_id = %report.id, "Message reported");

    Ok((
        StatusCode::CREATED,
        Json(ApiResponse::with_data("Message reported successfully", report_view(&report))),
    ))
}
