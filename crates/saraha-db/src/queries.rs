use crate::Database;
use crate::models::{MessageRow, NewUser, ProfileUpdate, ReportRow, UserRow};
use anyhow::Result;
use rusqlite::{Connection, Row};

const USER_COLUMNS: &str = "id, name, email, password, dob, gender, phone, role, confirmed, provider,
     picture_public_id, picture_url, picture_display_name, otp_hash, otp_expires_at, created_at";

const MESSAGE_COLUMNS: &str = "id, content, attachments, user_id, sender_id, created_at, updated_at";

const REPORT_COLUMNS: &str = "id, message_id, reported_by, reason, status, created_at";

impl Database {
    // -- Users --

    pub fn create_user(&self, user: &NewUser<'_>) -> Result<()> {
        self.with_conn_mut(|conn| {
            conn.execute(
                "INSERT INTO users (id, name, email, password, dob, gender, phone, role, confirmed, provider, picture_url)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
                rusqlite::params![
                    user.id,
                    user.name,
                    user.email,
                    user.password,
                    user.dob,
                    user.gender,
                    user.phone,
                    user.role,
                    user.confirmed,
                    user.provider,
                    user.picture_url,
                ],
            )?;
            Ok(())
        })
    }

    pub fn get_user_by_email(&self, email: &str) -> Result<Option<UserRow>> {
        self.with_conn(|conn| query_user(conn, "email", email))
    }

    pub fn get_user_by_id(&self, id: &str) -> Result<Option<UserRow>> {
        self.with_conn(|conn| query_user(conn, "id", id))
    }

    /// One-way unconfirmed -> confirmed transition.
    /// Returns false when the user is missing or already confirmed.
    pub fn confirm_user(&self, id: &str) -> Result<bool> {
        self.with_conn_mut(|conn| {
            let changed = conn.execute(
                "UPDATE users SET confirmed = 1, updated_at = strftime('%Y-%m-%d %H:%M:%f', 'now')
                 WHERE id = ?1 AND confirmed = 0",
                [id],
            )?;
            Ok(changed > 0)
        })
    }

    pub fn update_user_profile(&self, id: &str, update: &ProfileUpdate<'_>) -> Result<bool> {
        self.with_conn_mut(|conn| {
            let changed = conn.execute(
                "UPDATE users SET name = ?2, dob = ?3, gender = ?4, phone = ?5,
                     picture_public_id = ?6, picture_url = ?7, picture_display_name = ?8,
                     updated_at = strftime('%Y-%m-%d %H:%M:%f', 'now')
                 WHERE id = ?1",
                rusqlite::params![
                    id,
                    update.name,
                    update.dob,
                    update.gender,
                    update.phone,
                    update.picture_public_id,
                    update.picture_url,
                    update.picture_display_name,
                ],
            )?;
            Ok(changed > 0)
        })
    }

    pub fn set_user_otp(&self, id: &str, otp_hash: &str, expires_at: i64) -> Result<()> {
        self.with_conn_mut(|conn| {
            conn.execute(
                "UPDATE users SET otp_hash = ?2, otp_expires_at = ?3 WHERE id = ?1",
                rusqlite::params![id, otp_hash, expires_at],
            )?;
            Ok(())
        })
    }

    /// Replaces the password hash and consumes any pending OTP.
    pub fn reset_user_password(&self, id: &str, password_hash: &str) -> Result<()> {
        self.with_conn_mut(|conn| {
            conn.execute(
                "UPDATE users SET password = ?2, otp_hash = NULL, otp_expires_at = NULL,
                     updated_at = strftime('%Y-%m-%d %H:%M:%f', 'now')
                 WHERE id = ?1",
                rusqlite::params![id, password_hash],
            )?;
            Ok(())
        })
    }

    pub fn delete_user(&self, id: &str) -> Result<bool> {
        self.with_conn_mut(|conn| Ok(conn.execute("DELETE FROM users WHERE id = ?1", [id])? > 0))
    }

    // -- Messages --

    pub fn insert_message(
        &self,
        id: &str,
        content: Option<&str>,
        attachments: &str,
        user_id: &str,
        sender_id: Option<&str>,
    ) -> Result<MessageRow> {
        self.with_conn_mut(|conn| {
            conn.execute(
                "INSERT INTO messages (id, content, attachments, user_id, sender_id) VALUES (?1, ?2, ?3, ?4, ?5)",
                rusqlite::params![id, content, attachments, user_id, sender_id],
            )?;
            query_message(conn, id)?.ok_or_else(|| anyhow::anyhow!("Message {} vanished after insert", id))
        })
    }

    pub fn get_message(&self, id: &str) -> Result<Option<MessageRow>> {
        self.with_conn(|conn| query_message(conn, id))
    }

    /// Messages received by `user_id`, newest first.
    pub fn get_messages_for(&self, user_id: &str, limit: u32, offset: u64) -> Result<Vec<MessageRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {MESSAGE_COLUMNS} FROM messages
                 WHERE user_id = ?1
                 ORDER BY created_at DESC, rowid DESC
                 LIMIT ?2 OFFSET ?3"
            ))?;

            let rows = stmt
                .query_map(rusqlite::params![user_id, limit, offset as i64], message_from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;

            Ok(rows)
        })
    }

    pub fn count_messages_for(&self, user_id: &str) -> Result<u64> {
        self.with_conn(|conn| {
            let count: i64 = conn.query_row(
                "SELECT COUNT(*) FROM messages WHERE user_id = ?1",
                [user_id],
                |row| row.get(0),
            )?;
            Ok(count as u64)
        })
    }

    pub fn update_message(&self, id: &str, content: Option<&str>, attachments: &str) -> Result<Option<MessageRow>> {
        self.with_conn_mut(|conn| {
            conn.execute(
                "UPDATE messages SET content = ?2, attachments = ?3,
                     updated_at = strftime('%Y-%m-%d %H:%M:%f', 'now')
                 WHERE id = ?1",
                rusqlite::params![id, content, attachments],
            )?;
            query_message(conn, id)
        })
    }

    pub fn delete_message(&self, id: &str) -> Result<bool> {
        self.with_conn_mut(|conn| Ok(conn.execute("DELETE FROM messages WHERE id = ?1", [id])? > 0))
    }

    /// Attachment JSON for every message received by `user_id`, so the
    /// caller can release the stored objects before the rows cascade away.
    pub fn get_attachments_for(&self, user_id: &str) -> Result<Vec<String>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare("SELECT attachments FROM messages WHERE user_id = ?1")?;
            let rows = stmt
                .query_map([user_id], |row| row.get(0))?
                .collect::<std::result::Result<Vec<String>, _>>()?;
            Ok(rows)
        })
    }

    // -- Reports --

    pub fn insert_report(&self, id: &str, message_id: &str, reported_by: &str, reason: &str) -> Result<ReportRow> {
        self.with_conn_mut(|conn| {
            conn.execute(
                "INSERT INTO reports (id, message_id, reported_by, reason) VALUES (?1, ?2, ?3, ?4)",
                rusqlite::params![id, message_id, reported_by, reason],
            )?;
            query_report(conn, id)?.ok_or_else(|| anyhow::anyhow!("Report {} vanished after insert", id))
        })
    }

    pub fn get_reports(&self, limit: u32, offset: u64) -> Result<Vec<ReportRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {REPORT_COLUMNS} FROM reports
                 ORDER BY created_at DESC, rowid DESC
                 LIMIT ?1 OFFSET ?2"
            ))?;
            let rows = stmt
                .query_map(rusqlite::params![limit, offset as i64], report_from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    pub fn update_report_status(&self, id: &str, status: &str) -> Result<Option<ReportRow>> {
        self.with_conn_mut(|conn| {
            conn.execute("UPDATE reports SET status = ?2 WHERE id = ?1", rusqlite::params![id, status])?;
            query_report(conn, id)
        })
    }

    // -- Revoked tokens --

    /// Plain INSERT: a second revocation of the same jti surfaces as a unique
    /// violation and the caller decides what that means.
    pub fn insert_revoked_token(&self, jti: &str, user_id: &str, expires_at: i64) -> Result<()> {
        self.with_conn_mut(|conn| {
            conn.execute(
                "INSERT INTO revoked_tokens (jti, user_id, expires_at) VALUES (?1, ?2, ?3)",
                rusqlite::params![jti, user_id, expires_at],
            )?;
            Ok(())
        })
    }

    /// True if `jti` has a revocation entry still live at `now`. A token is
    /// valid through its `exp` second, so the entry is too.
    pub fn is_token_revoked(&self, jti: &str, now: i64) -> Result<bool> {
        self.with_conn(|conn| {
            let found = conn
                .query_row(
                    "SELECT 1 FROM revoked_tokens WHERE jti = ?1 AND expires_at >= ?2",
                    rusqlite::params![jti, now],
                    |_| Ok(()),
                )
                .optional()?;
            Ok(found.is_some())
        })
    }

    /// Deletes entries that expired before `cutoff`. Returns the number removed.
    pub fn prune_revoked_tokens(&self, cutoff: i64) -> Result<usize> {
        self.with_conn_mut(|conn| {
            Ok(conn.execute("DELETE FROM revoked_tokens WHERE expires_at < ?1", [cutoff])?)
        })
    }
}

fn query_user(conn: &Connection, column: &str, value: &str) -> Result<Option<UserRow>> {
    let mut stmt = conn.prepare(&format!("SELECT {USER_COLUMNS} FROM users WHERE {column} = ?1"))?;

    let row = stmt
        .query_row([value], |row| {
            Ok(UserRow {
                id: row.get(0)?,
                name: row.get(1)?,
                email: row.get(2)?,
                password: row.get(3)?,
                dob: row.get(4)?,
                gender: row.get(5)?,
                phone: row.get(6)?,
                role: row.get(7)?,
                confirmed: row.get(8)?,
                provider: row.get(9)?,
                picture_public_id: row.get(10)?,
                picture_url: row.get(11)?,
                picture_display_name: row.get(12)?,
                otp_hash: row.get(13)?,
                otp_expires_at: row.get(14)?,
                created_at: row.get(15)?,
            })
        })
        .optional()?;

    Ok(row)
}

fn query_message(conn: &Connection, id: &str) -> Result<Option<MessageRow>> {
    let mut stmt = conn.prepare(&format!("SELECT {MESSAGE_COLUMNS} FROM messages WHERE id = ?1"))?;
    let row = stmt.query_row([id], message_from_row).optional()?;
    Ok(row)
}

fn message_from_row(row: &Row<'_>) -> rusqlite::Result<MessageRow> {
    Ok(MessageRow {
        id: row.get(0)?,
        content: row.get(1)?,
        attachments: row.get(2)?,
        user_id: row.get(3)?,
        sender_id: row.get(4)?,
        created_at: row.get(5)?,
        updated_at: row.get(6)?,
    })
}

fn query_report(conn: &Connection, id: &str) -> Result<Option<ReportRow>> {
    let mut stmt = conn.prepare(&format!("SELECT {REPORT_COLUMNS} FROM reports WHERE id = ?1"))?;
    let row = stmt.query_row([id], report_from_row).optional()?;
    Ok(row)
}

fn report_from_row(row: &Row<'_>) -> rusqlite::Result<ReportRow> {
    Ok(ReportRow {
        id: row.get(0)?,
        message_id: row.get(1)?,
        reported_by: row.get(2)?,
        reason: row.get(3)?,
        status: row.get(4)?,
        created_at: row.get(5)?,
    })
}

/// Extension trait for optional query results
trait OptionalExt<T> {
    fn optional(self) -> Result<Option<T>>;
}

impl<T> OptionalExt<T> for std::result::Result<T, rusqlite::Error> {
    fn optional(self) -> Result<Option<T>> {
        match self {
            Ok(val) => Ok(Some(val)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}
