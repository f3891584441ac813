//! Row to wire conversions. Stored values that fail to parse are logged and
//! replaced with defaults rather than failing the whole request.

use std::str::FromStr;

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use tracing::warn;
use uuid::Uuid;

use saraha_db::models::{MessageRow, ReportRow, UserRow};
use saraha_types::models::{AttachmentDescriptor, Message, ProfilePicture, Report, User};

const STORED_TIMESTAMP: &str = "%Y-%m-%d %H:%M:%S%.f";

pub fn parse_timestamp(raw: &str) -> DateTime<Utc> {
    match NaiveDateTime::parse_from_str(raw, STORED_TIMESTAMP) {
        Ok(naive) => naive.and_utc(),
        Err(e) => {
            warn!("Corrupt timestamp '{}': {}", raw, e);
            DateTime::<Utc>::UNIX_EPOCH
        }
    }
}

pub fn parse_uuid(raw: &str) -> Uuid {
    Uuid::parse_str(raw).unwrap_or_else(|e| {
        warn!("Corrupt id '{}': {}", raw, e);
        Uuid::nil()
    })
}

fn parse_or_default<T: FromStr + Default>(raw: &str, what: &str) -> T {
    raw.parse().unwrap_or_else(|_| {
        warn!("Corrupt {} '{}'", what, raw);
        T::default()
    })
}

pub fn parse_attachments(raw: &str) -> Vec<AttachmentDescriptor> {
    serde_json::from_str(raw).unwrap_or_else(|e| {
        warn!("Corrupt attachment list: {}", e);
        Vec::new()
    })
}

/// Public view of `row`. The phone number is decrypted with `key`.
pub fn user_view(row: &UserRow, key: &[u8; 32]) -> User {
    let phone = row.phone.as_deref().and_then(|sealed| {
        saraha_crypto::encrypt::decrypt_field(key, sealed)
            .map_err(|e| warn!("Cannot decrypt phone for user {}: {:#}", row.id, e))
            .ok()
    });

    // Google accounts carry an upstream URL with no object id of ours.
    let profile_picture = row.picture_url.as_ref().map(|url| ProfilePicture {
        public_id: row.picture_public_id.clone().unwrap_or_default(),
        secure_url: url.clone(),
        display_name: row.picture_display_name.clone().unwrap_or_default(),
    });

    User {
        id: parse_uuid(&row.id),
        name: row.name.clone(),
        email: row.email.clone(),
        dob: row
            .dob
            .as_deref()
            .and_then(|d| NaiveDate::parse_from_str(d, "%Y-%m-%d").ok()),
        gender: parse_or_default(&row.gender, "gender"),
        phone,
        role: parse_or_default(&row.role, "role"),
        confirmed: row.confirmed,
        provider: parse_or_default(&row.provider, "provider"),
        profile_picture,
        created_at: parse_timestamp(&row.created_at),
    }
}

pub fn message_view(row: &MessageRow) -> Message {
    Message {
        id: parse_uuid(&row.id),
        content: row.content.clone(),
        attachments: parse_attachments(&row.attachments),
        user_id: parse_uuid(&row.user_id),
        sender_id: row.sender_id.as_deref().map(parse_uuid),
        created_at: parse_timestamp(&row.created_at),
        updated_at: parse_timestamp(&row.updated_at),
    }
}

pub fn report_view(row: &ReportRow) -> Report {
    Report {
        id: parse_uuid(&row.id),
        message_id: parse_uuid(&row.message_id),
        reported_by: parse_uuid(&row.reported_by),
        reason: row.reason.clone(),
        status: parse_or_default(&row.status, "report status"),
        created_at: parse_timestamp(&row.created_at),
    }
}
