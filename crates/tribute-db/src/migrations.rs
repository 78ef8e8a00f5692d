use anyhow::Result;
use rusqlite::Connection;
use tracing::info;

pub fn run(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS users (
            id                  TEXT PRIMARY KEY,
            email               TEXT NOT NULL UNIQUE,
            password            TEXT NOT NULL,
            display_name        TEXT NOT NULL,
            location            TEXT,
            phone_number        TEXT,
            community_reference TEXT,
            role                TEXT NOT NULL DEFAULT 'member'
                                CHECK (role IN ('member', 'admin')),
            is_verified         INTEGER NOT NULL DEFAULT 0,
            is_disabled         INTEGER NOT NULL DEFAULT 0,
            created_at          TEXT NOT NULL DEFAULT (datetime('now'))
        );

        CREATE TABLE IF NOT EXISTS password_resets (
            token       TEXT PRIMARY KEY,
            user_id     TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
            created_at  TEXT NOT NULL DEFAULT (datetime('now'))
        );

        CREATE TABLE IF NOT EXISTS device_tokens (
            user_id     TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
            token       TEXT NOT NULL,
            created_at  TEXT NOT NULL DEFAULT (datetime('now')),
            UNIQUE(user_id, token)
        );

        CREATE TABLE IF NOT EXISTS memorials (
            id                  TEXT PRIMARY KEY,
            full_name           TEXT NOT NULL,
            date_of_birth       TEXT,
            date_of_passing     TEXT,
            biography           TEXT NOT NULL DEFAULT '',
            image_urls          TEXT NOT NULL DEFAULT '[]',
            audio_tribute_url   TEXT,
            legacy_document_url TEXT,
            posted_by           TEXT NOT NULL REFERENCES users(id),
            posted_by_name      TEXT NOT NULL,
            relationship        TEXT NOT NULL,
            family_house        TEXT,
            candles_lit         INTEGER NOT NULL DEFAULT 0,
            status              TEXT NOT NULL DEFAULT 'pending'
                                CHECK (status IN ('pending', 'approved', 'rejected')),
            created_at          TEXT NOT NULL DEFAULT (datetime('now'))
        );

        CREATE INDEX IF NOT EXISTS idx_memorials_status_created
            ON memorials(status, created_at);

        CREATE INDEX IF NOT EXISTS idx_memorials_status_passing
            ON memorials(status, date_of_passing);

        CREATE TABLE IF NOT EXISTS chats (
            id                  TEXT PRIMARY KEY,
            pair_key            TEXT NOT NULL UNIQUE,
            participant_a       TEXT NOT NULL REFERENCES users(id),
            participant_b       TEXT NOT NULL REFERENCES users(id),
            participant_a_name  TEXT NOT NULL,
            participant_b_name  TEXT NOT NULL,
            memorial_id         TEXT,
            memorial_name       TEXT,
            last_message        TEXT NOT NULL DEFAULT '',
            last_message_at     TEXT NOT NULL DEFAULT (datetime('now')),
            created_at          TEXT NOT NULL DEFAULT (datetime('now'))
        );

        CREATE INDEX IF NOT EXISTS idx_chats_participant_a ON chats(participant_a);
        CREATE INDEX IF NOT EXISTS idx_chats_participant_b ON chats(participant_b);

        CREATE TABLE IF NOT EXISTS messages (
            id                   TEXT PRIMARY KEY,
            chat_id              TEXT NOT NULL REFERENCES chats(id) ON DELETE CASCADE,
            text                 TEXT NOT NULL DEFAULT '',
            sender_id            TEXT NOT NULL REFERENCES users(id),
            sender_name          TEXT NOT NULL,
            audio_url            TEXT,
            image_url            TEXT,
            status               TEXT NOT NULL DEFAULT 'sent'
                                 CHECK (status IN ('sent', 'read')),
            read_by              TEXT NOT NULL DEFAULT '[]',
            deleted_for          TEXT NOT NULL DEFAULT '[]',
            deleted_for_everyone INTEGER NOT NULL DEFAULT 0,
            created_at           TEXT NOT NULL DEFAULT (datetime('now'))
        );

        CREATE INDEX IF NOT EXISTS idx_messages_chat
            ON messages(chat_id, created_at);

        CREATE TABLE IF NOT EXISTS notifications (
            id              TEXT PRIMARY KEY,
            user_id         TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
            kind            TEXT NOT NULL
                            CHECK (kind IN ('approved', 'denied', 'message', 'admin_alert')),
            message         TEXT NOT NULL,
            memorial_id     TEXT,
            memorial_name   TEXT,
            chat_id         TEXT,
            is_read         INTEGER NOT NULL DEFAULT 0,
            created_at      TEXT NOT NULL DEFAULT (datetime('now'))
        );

        CREATE INDEX IF NOT EXISTS idx_notifications_user
            ON notifications(user_id, created_at);

        -- Outbox consumed by the external mail dispatcher.
        CREATE TABLE IF NOT EXISTS mail_outbox (
            id          TEXT PRIMARY KEY,
            recipient   TEXT NOT NULL,
            subject     TEXT NOT NULL,
            html        TEXT NOT NULL,
            created_at  TEXT NOT NULL DEFAULT (datetime('now'))
        );
        ",
    )?;

    info!("Database migrations complete");
    Ok(())
}
