use rusqlite::Connection;
use tracing::info;

use crate::Result;

pub fn run(conn: &Connection) -> Result<()> {
    conn.execute_batch("CREATE TABLE IF NOT EXISTS schema_version (version INTEGER NOT NULL);")?;

    let version: i64 = conn.query_row(
        "SELECT COALESCE(MAX(version), 0) FROM schema_version",
        [],
        |r| r.get(0),
    )?;

    if version < 1 {
        info!("running migration v1 (users, conversations, messages)");
        conn.execute_batch(
            "
            CREATE TABLE users (
                id              TEXT PRIMARY KEY,
                email           TEXT NOT NULL UNIQUE,
                username        TEXT NOT NULL,
                fullname        TEXT NOT NULL,
                password_hash   TEXT NOT NULL,
                verified        INTEGER NOT NULL DEFAULT 0,
                bio             TEXT NOT NULL DEFAULT '',
                website         TEXT NOT NULL DEFAULT '',
                profile_image   TEXT NOT NULL DEFAULT '',
                created_at      TEXT NOT NULL
            );

            -- Participants are stored lower id first so the unique index
            -- covers the unordered pair.
            CREATE TABLE conversations (
                id          TEXT PRIMARY KEY,
                user_low    TEXT NOT NULL REFERENCES users(id),
                user_high   TEXT NOT NULL REFERENCES users(id),
                created_at  TEXT NOT NULL,
                CHECK (user_low < user_high),
                UNIQUE (user_low, user_high)
            );

            CREATE INDEX idx_conversations_high ON conversations(user_high);

            CREATE TABLE messages (
                id              TEXT PRIMARY KEY,
                conversation_id TEXT NOT NULL REFERENCES conversations(id),
                sender_id       TEXT NOT NULL REFERENCES users(id),
                recipient_id    TEXT NOT NULL REFERENCES users(id),
                text            TEXT NOT NULL,
                read            INTEGER NOT NULL DEFAULT 0,
                created_at      TEXT NOT NULL
            );

            CREATE INDEX idx_messages_conversation
                ON messages(conversation_id, created_at);
            CREATE INDEX idx_messages_unread
                ON messages(recipient_id, read);

            INSERT INTO schema_version (version) VALUES (1);
            ",
        )?;
    }

    if version < 2 {
        info!("running migration v2 (notifications)");
        conn.execute_batch(
            "
            CREATE TABLE notifications (
                id              TEXT PRIMARY KEY,
                kind            TEXT NOT NULL CHECK (kind IN ('like', 'comment', 'follow')),
                actor_id        TEXT NOT NULL REFERENCES users(id),
                recipient_id    TEXT NOT NULL REFERENCES users(id),
                post_id         TEXT,
                read            INTEGER NOT NULL DEFAULT 0,
                created_at      TEXT NOT NULL
            );

            CREATE INDEX idx_notifications_recipient
                ON notifications(recipient_id, created_at);

            INSERT INTO schema_version (version) VALUES (2);
            ",
        )?;
    }

    info!("Database migrations complete");
    Ok(())
}
