use anyhow::Result;
use rusqlite::Connection;
use tracing::info;

pub fn run(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS users (
            id          TEXT PRIMARY KEY,
            name        TEXT NOT NULL UNIQUE COLLATE NOCASE,
            is_admin    INTEGER NOT NULL DEFAULT 0,
            created_at  TEXT NOT NULL
        );

        -- No foreign key on sender_id: deleting a user keeps their messages.
        CREATE TABLE IF NOT EXISTS messages (
            id                  TEXT PRIMARY KEY,
            sender_id           TEXT NOT NULL,
            body                TEXT,
            image_base64        TEXT,
            audio_base64        TEXT,
            reply_to_id         TEXT,
            reply_to_sender_id  TEXT,
            reply_to_snippet    TEXT,
            seen_at             TEXT,
            created_at          TEXT NOT NULL,
            CHECK ((body IS NOT NULL) + (image_base64 IS NOT NULL) + (audio_base64 IS NOT NULL) = 1)
        );

        CREATE INDEX IF NOT EXISTS idx_messages_created
            ON messages(created_at DESC, id DESC);

        -- The per-user hidden set. Row-per-entry keeps concurrent hides
        -- lossless: INSERT OR IGNORE commutes.
        CREATE TABLE IF NOT EXISTS message_hidden (
            message_id  TEXT NOT NULL REFERENCES messages(id) ON DELETE CASCADE,
            user_id     TEXT NOT NULL,
            created_at  TEXT NOT NULL,
            PRIMARY KEY (message_id, user_id)
        );

        CREATE INDEX IF NOT EXISTS idx_hidden_user
            ON message_hidden(user_id);

        CREATE TABLE IF NOT EXISTS reactions (
            message_id  TEXT NOT NULL REFERENCES messages(id) ON DELETE CASCADE,
            user_id     TEXT NOT NULL,
            emoji       TEXT NOT NULL,
            created_at  TEXT NOT NULL,
            PRIMARY KEY (message_id, user_id, emoji)
        );

        CREATE TABLE IF NOT EXISTS config (
            key         TEXT PRIMARY KEY,
            value       TEXT NOT NULL,
            updated_at  TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS push_subscriptions (
            endpoint        TEXT PRIMARY KEY,
            user_id         TEXT NOT NULL,
            p256dh          TEXT NOT NULL,
            auth            TEXT NOT NULL,
            expiration_time INTEGER,
            updated_at      TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS push_interests (
            endpoint    TEXT NOT NULL REFERENCES push_subscriptions(endpoint) ON DELETE CASCADE,
            sender_id   TEXT NOT NULL,
            PRIMARY KEY (endpoint, sender_id)
        );

        CREATE INDEX IF NOT EXISTS idx_interests_sender
            ON push_interests(sender_id);
        ",
    )?;

    info!("Database migrations complete");
    Ok(())
}
