/// Database row types. These map directly to SQLite rows.
/// Distinct from saraha-types API models to keep the DB layer independent.

#[derive(Debug, Clone)]
pub struct UserRow {
    pub id: String,
    pub name: String,
    pub email: String,
    pub password: String,
    pub dob: Option<String>,
    pub gender: String,
    /// Ciphertext, never the plain number.
    pub phone: Option<String>,
    pub role: String,
    pub confirmed: bool,
    pub provider: String,
    pub picture_public_id: Option<String>,
    pub picture_url: Option<String>,
    pub picture_display_name: Option<String>,
    pub otp_hash: Option<String>,
    pub otp_expires_at: Option<i64>,
    pub created_at: String,
}

pub struct NewUser<'a> {
    pub id: &'a str,
    pub name: &'a str,
    pub email: &'a str,
    pub password: &'a str,
    pub dob: Option<&'a str>,
    pub gender: &'a str,
    pub phone: Option<&'a str>,
    pub role: &'a str,
    pub confirmed: bool,
    pub provider: &'a str,
    pub picture_url: Option<&'a str>,
}

/// Full replacement of the mutable profile columns.
pub struct ProfileUpdate<'a> {
    pub name: &'a str,
    pub dob: Option<&'a str>,
    pub gender: &'a str,
    pub phone: Option<&'a str>,
    pub picture_public_id: Option<&'a str>,
    pub picture_url: Option<&'a str>,
    pub picture_display_name: Option<&'a str>,
}

#[derive(Debug, Clone)]
pub struct MessageRow {
    pub id: String,
    pub content: Option<String>,
    /// JSON array of attachment descriptors.
    pub attachments: String,
    pub user_id: String,
    pub sender_id: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Clone)]
pub struct ReportRow {
    pub id: String,
    pub message_id: String,
    pub reported_by: String,
    pub reason: String,
    pub status: String,
    pub created_at: String,
}
