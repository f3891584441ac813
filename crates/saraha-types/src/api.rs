use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use crate::models::{AttachmentDescriptor, Gender, Message, ProfilePicture, ReportStatus};

// -- Token claims --

/// Claims carried by every token the server issues, whatever its secret class.
/// `jti` identifies this particular token so it can be revoked on its own.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    pub email: String,
    pub jti: String,
    pub iat: i64,
    pub exp: i64,
}

// -- Envelope --

/// Success envelope shared by every handler. Failures use the error envelope
/// built in `saraha-api`.
#[derive(Debug, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    pub message: String,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
}

impl<T> ApiResponse<T> {
    pub fn with_data(message: impl Into<String>, data: T) -> Self {
        Self {
            message: message.into(),
            success: true,
            data: Some(data),
        }
    }
}

impl ApiResponse<()> {
    pub fn message(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            success: true,
            data: None,
        }
    }
}

// -- Auth --

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct SignupRequest {
    #[validate(length(min = 3, max = 60, message = "Name must be 3 to 60 characters long"))]
    pub name: String,
    #[validate(email(message = "Email is invalid"))]
    pub email: String,
    #[validate(length(min = 6, max = 100, message = "Password must be 6 to 100 characters long"))]
    pub password: String,
    #[validate(must_match(other = "password", message = "Confirm password does not match"))]
    pub confirm_password: String,
    #[validate(length(min = 1, message = "Phone number is required"))]
    pub phone: String,
    pub dob: NaiveDate,
    #[serde(default)]
    pub gender: Option<Gender>,
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct SigninRequest {
    #[validate(email(message = "Email is invalid"))]
    pub email: String,
    #[validate(length(min = 1, max = 100, message = "Password is required"))]
    pub password: String,
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct GoogleSignInRequest {
    #[validate(length(min = 1, message = "Id token is required"))]
    pub id_token: String,
    pub dob: NaiveDate,
    #[validate(length(min = 1, message = "Phone number is required"))]
    pub phone: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct VerifyEmailQuery {
    pub token: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct LogoutRequest {
    /// Revoked alongside the access token when it belongs to the same account.
    #[serde(default)]
    pub refresh_token: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
    /// `Bearer` or `Admin`: the prefix to send back in the Authorization header.
    pub token_type: String,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccessToken {
    pub access_token: String,
    pub token_type: String,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignupResponse {
    pub user: crate::models::User,
    pub access_token: String,
    pub refresh_token: String,
    pub token_type: String,
}

// -- Users --

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct ForgetPasswordRequest {
    #[validate(email(message = "Email is invalid"))]
    pub email: String,
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct ResetPasswordRequest {
    #[validate(email(message = "Email is invalid"))]
    pub email: String,
    #[validate(length(equal = 6, message = "Otp must be 6 digits"))]
    pub otp: String,
    #[validate(length(min = 6, max = 100, message = "Password must be 6 to 100 characters long"))]
    pub new_password: String,
    #[validate(must_match(other = "new_password", message = "Confirm password does not match"))]
    pub confirm_password: String,
}

#[derive(Debug, Default, Deserialize, Validate)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct UpdateProfileRequest {
    #[validate(length(min = 3, max = 60, message = "Name must be 3 to 60 characters long"))]
    pub name: Option<String>,
    pub dob: Option<NaiveDate>,
    pub gender: Option<Gender>,
    #[validate(length(min = 1, message = "Phone number cannot be empty"))]
    pub phone: Option<String>,
    pub profile_picture: Option<ProfilePicture>,
}

impl UpdateProfileRequest {
    pub fn is_empty(&self) -> bool {
        self.name.is_none()
            && self.dob.is_none()
            && self.gender.is_none()
            && self.phone.is_none()
            && self.profile_picture.is_none()
    }
}

// -- Messages --

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct SendMessageRequest {
    pub content: Option<String>,
    #[validate(length(max = 5, message = "At most 5 attachments are allowed"))]
    pub attachments: Option<Vec<AttachmentDescriptor>>,
    /// Recipient.
    pub user_id: Uuid,
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct UpdateMessageRequest {
    pub content: Option<String>,
    #[validate(length(max = 5, message = "At most 5 attachments are allowed"))]
    pub attachments: Option<Vec<AttachmentDescriptor>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct ReportMessageRequest {
    pub reason: String,
}

#[derive(Debug, Deserialize)]
pub struct PageQuery {
    #[serde(default = "default_page")]
    pub page: u32,
    #[serde(default = "default_limit")]
    pub limit: u32,
}

fn default_page() -> u32 {
    1
}

fn default_limit() -> u32 {
    10
}

#[derive(Debug, Serialize, Deserialize)]
pub struct MessagePage {
    pub messages: Vec<Message>,
    pub total: u64,
    pub page: u32,
    pub limit: u32,
}

// -- Reports --

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct UpdateReportRequest {
    pub status: ReportStatus,
}
