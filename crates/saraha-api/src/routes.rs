use axum::{
    Json, Router, middleware,
    routing::{get, patch, post, put},
};

use saraha_types::api::ApiResponse;

use crate::error::ApiError;
use crate::middleware::{optional_auth, require_admin, require_auth, require_refresh};
use crate::state::AppState;
use crate::{auth, messages, reports, users};

async fn welcome() -> Json<ApiResponse<()>> {
    Json(ApiResponse::message("Welcome to the Saraha app"))
}

async fn not_found() -> ApiError {
    ApiError::not_found("Route not found")
}

/// Every HTTP route, grouped by the credential it requires.
pub fn router(state: AppState) -> Router {
    let public_routes = Router::new()
        .route("/", get(welcome))
        .route("/auth/sign-up", post(auth::signup))
        .route("/auth/sign-in", post(auth::signin))
        .route("/auth/google-sign-in", post(auth::google_sign_in))
        .route("/auth/verify-email", get(auth::verify_email))
        .route("/users/forget-password", post(users::forget_password))
        .route("/users/reset-password", post(users::reset_password))
        .with_state(state.clone());

    let refresh_routes = Router::new()
        .route("/auth/refresh-token", post(auth::refresh_token))
        .route("/users/resend-confirm-email", put(users::resend_confirm_email))
        .route_layer(middleware::from_fn_with_state(state.clone(), require_refresh))
        .with_state(state.clone());

    let protected_routes = Router::new()
        .route("/auth/logout", post(auth::logout))
        .route(
            "/users/profile",
            get(users::get_profile)
                .patch(users::update_profile)
                .delete(users::delete_account),
        )
        .route("/messages", get(messages::list_messages))
        .route(
            "/messages/{id}",
            patch(messages::update_message).delete(messages::delete_message),
        )
        .route("/messages/{id}/report", post(messages::report_message))
        .route_layer(middleware::from_fn_with_state(state.clone(), require_auth))
        .with_state(state.clone());

    let admin_routes = Router::new()
        .route("/reports", get(reports::list_reports))
        .route("/reports/{id}", patch(reports::update_report))
        .route_layer(middleware::from_fn(require_admin))
        .route_layer(middleware::from_fn_with_state(state.clone(), require_auth))
        .with_state(state.clone());

    let send_routes = Router::new()
        .route("/messages/send", post(messages::send_message))
        .route_layer(middleware::from_fn_with_state(state.clone(), optional_auth))
        .with_state(state);

    Router::new()
        .merge(public_routes)
        .merge(refresh_routes)
        .merge(protected_routes)
        .merge(admin_routes)
        .merge(send_routes)
        .fallback(not_found)
}
