use anyhow::Result;
use rusqlite::Connection;
use tracing::info;

pub fn run(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS users (
            id                    TEXT PRIMARY KEY,
            name                  TEXT NOT NULL,
            email                 TEXT NOT NULL UNIQUE,
            password              TEXT NOT NULL,
            dob                   TEXT,
            gender                TEXT NOT NULL DEFAULT 'male',
            phone                 TEXT,
            role                  TEXT NOT NULL DEFAULT 'user',
            confirmed             INTEGER NOT NULL DEFAULT 0,
            provider              TEXT NOT NULL DEFAULT 'system',
            picture_public_id     TEXT,
            picture_url           TEXT,
            picture_display_name  TEXT,
            otp_hash              TEXT,
            otp_expires_at        INTEGER,
            created_at            TEXT NOT NULL DEFAULT (strftime('%Y-%m-%d %H:%M:%f', 'now')),
            updated_at            TEXT NOT NULL DEFAULT (strftime('%Y-%m-%d %H:%M:%f', 'now'))
        );

        CREATE TABLE IF NOT EXISTS messages (
            id           TEXT PRIMARY KEY,
            content      TEXT,
            attachments  TEXT NOT NULL DEFAULT '[]',
            user_id      TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
            sender_id    TEXT REFERENCES users(id) ON DELETE SET NULL,
            created_at   TEXT NOT NULL DEFAULT (strftime('%Y-%m-%d %H:%M:%f', 'now')),
            updated_at   TEXT NOT NULL DEFAULT (strftime('%Y-%m-%d %H:%M:%f', 'now')),
            CHECK (sender_id IS NULL OR sender_id != user_id)
        );

        CREATE INDEX IF NOT EXISTS idx_messages_recipient
            ON messages(user_id, created_at);

        CREATE TABLE IF NOT EXISTS reports (
            id           TEXT PRIMARY KEY,
            message_id   TEXT NOT NULL REFERENCES messages(id) ON DELETE CASCADE,
            reported_by  TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
            reason       TEXT NOT NULL,
            status       TEXT NOT NULL DEFAULT 'pending',
            created_at   TEXT NOT NULL DEFAULT (strftime('%Y-%m-%d %H:%M:%f', 'now'))
        );

        CREATE TABLE IF NOT EXISTS revoked_tokens (
            jti          TEXT PRIMARY KEY,
            user_id      TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
            expires_at   INTEGER NOT NULL,
            created_at   TEXT NOT NULL DEFAULT (strftime('%Y-%m-%d %H:%M:%f', 'now'))
        );

        CREATE INDEX IF NOT EXISTS idx_revoked_tokens_expiry
            ON revoked_tokens(expires_at);
        ",
    )?;

    info!("Database migrations complete");
    Ok(())
}
