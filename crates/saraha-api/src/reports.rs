//! Admin review of reported messages.

use axum::{Extension, Json, extract::State, response::IntoResponse};
use tracing::info;
use uuid::Uuid;

use saraha_types::api::{ApiResponse, PageQuery, UpdateReportRequest};
use saraha_types::models::{Report, ReportStatus};

use crate::convert::report_view;
use crate::error::ApiError;
use crate::extract::{ApiJson, ApiPath, ApiQuery};
use crate::messages::page_bounds;
use crate::middleware::AuthContext;
use crate::state::AppState;

pub async fn list_reports(
    State(state): State<AppState>,
    ApiQuery(query): ApiQuery<PageQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let (limit, offset) = page_bounds(&query)?;
    let rows = state
        .db_call(move |db| db.get_reports(limit, offset))
        .await?;

    let reports: Vec<Report> = rows.iter().map(report_view).collect();
    Ok(Json(ApiResponse::with_data("Reports retrieved successfully", reports)))
}

pub async fn update_report(
    State(state): State<AppState>,
    Extension(ctx): Extension<AuthContext>,
    ApiPath(id): ApiPath<Uuid>,
    ApiJson(req): ApiJson<UpdateReportRequest>,
) -> Result<impl IntoResponse, ApiError> {
    if req.status == ReportStatus::Pending {
        return Err(ApiError::bad_request("Status must be reviewed or dismissed"));
    }

    let status = req.status;
    let report = state
        .db_call(move |db| db.update_report_status(&id.to_string(), status.as_str()))
        .await?
        .ok_or_else(|| ApiError::not_found("Report not found"))?;

    info!(report_id = %report.id, admin_id = %ctx.user.id, status = %status, "Report reviewed");

    Ok(Json(ApiResponse::with_data(
        "Report updated successfully",
        report_view(&report),
    )))
}
