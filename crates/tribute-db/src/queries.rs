use anyhow::Result;
use rusqlite::Connection;
use uuid::Uuid;

use tribute_types::api::ArchiveSort;
use tribute_types::models::{
    Chat, ChatMessage, Memorial, MemorialStatus, MessageStatus, Notification, User,
};

use crate::models::{
    ChatRow, MailRow, MemorialContentUpdate, MemorialRow, MessageRow, NewChat, NewMemorial,
    NewMessage, NewNotification, NewUser, NotificationRow, UserRow, encode_string_list,
    encode_uuid_list,
};
use crate::{Database, MAX_BATCH_OPS};

const USER_COLS: &str = "id, email, password, display_name, location, phone_number, \
     community_reference, role, is_verified, is_disabled, created_at";

const MEMORIAL_COLS: &str = "id, full_name, date_of_birth, date_of_passing, biography, \
     image_urls, audio_tribute_url, legacy_document_url, posted_by, posted_by_name, \
     relationship, family_house, candles_lit, status, created_at";

const CHAT_COLS: &str = "id, participant_a, participant_b, participant_a_name, \
     participant_b_name, memorial_id, memorial_name, last_message, last_message_at, created_at";

const MESSAGE_COLS: &str = "id, chat_id, text, sender_id, sender_name, audio_url, image_url, \
     status, read_by, deleted_for, deleted_for_everyone, created_at";

const NOTIFICATION_COLS: &str =
    "id, user_id, kind, message, memorial_id, memorial_name, chat_id, is_read, created_at";

impl Database {
    // -- Users --

    pub fn create_user(&self, user: &NewUser) -> Result<User> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO users (id, email, password, display_name, location, phone_number, \
                 community_reference, role) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                rusqlite::params![
                    user.id.to_string(),
                    user.email,
                    user.password_hash,
                    user.display_name,
                    user.location,
                    user.phone_number,
                    user.community_reference,
                    user.role.as_str(),
                ],
            )?;
            require_user(conn, user.id)
        })
    }

    /// Raw row (including the password hash), used by login.
    pub fn get_user_row_by_email(&self, email: &str) -> Result<Option<UserRow>> {
        self.with_conn(|conn| query_user_row(conn, "email = ?1", &email))
    }

    pub fn get_user_by_id(&self, id: Uuid) -> Result<Option<User>> {
        self.with_conn(|conn| get_user(conn, id))
    }

    pub fn list_users(&self) -> Result<Vec<User>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {USER_COLS} FROM users ORDER BY created_at DESC, rowid DESC"
            ))?;
            let rows = stmt
                .query_map([], user_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            rows.into_iter().map(UserRow::into_user).collect()
        })
    }

    pub fn list_admins(&self) -> Result<Vec<User>> {
        self.with_conn(|conn| {
            let mut stmt =
                conn.prepare(&format!("SELECT {USER_COLS} FROM users WHERE role = 'admin'"))?;
            let rows = stmt
                .query_map([], user_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            rows.into_iter().map(UserRow::into_user).collect()
        })
    }

    /// Owner profile edit. Absent fields keep their current values; the
    /// role/verified/disabled columns are not reachable from here.
    pub fn update_profile(
        &self,
        id: Uuid,
        display_name: Option<&str>,
        location: Option<&str>,
        phone_number: Option<&str>,
        community_reference: Option<&str>,
    ) -> Result<Option<User>> {
        self.with_conn(|conn| {
            let tx = conn.unchecked_transaction()?;
            let Some(current) = get_user(&tx, id)? else {
                return Ok(None);
            };
            tx.execute(
                "UPDATE users SET display_name = ?2, location = ?3, phone_number = ?4, \
                 community_reference = ?5 WHERE id = ?1",
                rusqlite::params![
                    id.to_string(),
                    display_name.unwrap_or(&current.display_name),
                    location.or(current.location.as_deref()),
                    phone_number.or(current.phone_number.as_deref()),
                    community_reference.or(current.community_reference.as_deref()),
                ],
            )?;
            let updated = require_user(&tx, id)?;
            tx.commit()?;
            Ok(Some(updated))
        })
    }

    /// Admin verify/disable toggles. Returns (before, after) so callers can
    /// publish the transition.
    pub fn set_user_flags(
        &self,
        id: Uuid,
        is_verified: Option<bool>,
        is_disabled: Option<bool>,
    ) -> Result<Option<(User, User)>> {
        self.with_conn(|conn| {
            let tx = conn.unchecked_transaction()?;
            let Some(before) = get_user(&tx, id)? else {
                return Ok(None);
            };
            tx.execute(
                "UPDATE users SET is_verified = ?2, is_disabled = ?3 WHERE id = ?1",
                rusqlite::params![
                    id.to_string(),
                    is_verified.unwrap_or(before.is_verified),
                    is_disabled.unwrap_or(before.is_disabled),
                ],
            )?;
            let after = require_user(&tx, id)?;
            tx.commit()?;
            Ok(Some((before, after)))
        })
    }

    pub fn set_password(&self, id: Uuid, password_hash: &str) -> Result<bool> {
        self.with_conn(|conn| {
            let changed = conn.execute(
                "UPDATE users SET password = ?2 WHERE id = ?1",
                rusqlite::params![id.to_string(), password_hash],
            )?;
            Ok(changed > 0)
        })
    }

    // -- Password resets --

    pub fn create_password_reset(&self, token: &str, user_id: Uuid) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT OR REPLACE INTO password_resets (token, user_id) VALUES (?1, ?2)",
                rusqlite::params![token, user_id.to_string()],
            )?;
            Ok(())
        })
    }

    /// One-shot: deletes the token and returns its user if it was still valid.
    pub fn consume_password_reset(&self, token: &str) -> Result<Option<Uuid>> {
        self.with_conn(|conn| {
            let tx = conn.unchecked_transaction()?;
            let user_id: Option<String> = tx
                .query_row(
                    "SELECT user_id FROM password_resets \
                     WHERE token = ?1 AND created_at >= datetime('now', '-1 hour')",
                    [token],
                    |row| row.get(0),
                )
                .optional()?;
            tx.execute("DELETE FROM password_resets WHERE token = ?1", [token])?;
            tx.commit()?;
            user_id
                .as_deref()
                .map(crate::models::parse_uuid)
                .transpose()
        })
    }

    // -- Device tokens --

    /// Register a push token. Duplicate registrations are ignored.
    pub fn register_device_token(&self, user_id: Uuid, token: &str) -> Result<bool> {
        self.with_conn(|conn| {
            let inserted = conn.execute(
                "INSERT OR IGNORE INTO device_tokens (user_id, token) VALUES (?1, ?2)",
                rusqlite::params![user_id.to_string(), token],
            )?;
            Ok(inserted > 0)
        })
    }

    // -- Memorials --

    /// Insert a memorial and, for non-admin submissions, the per-admin alert
    /// notifications — all in one transaction, so the fan-out is atomic with
    /// the submission itself.
    pub fn create_memorial(
        &self,
        memorial: &NewMemorial,
        admin_alerts: &[NewNotification],
    ) -> Result<Memorial> {
        self.with_conn(|conn| {
            let tx = conn.unchecked_transaction()?;
            tx.execute(
                "INSERT INTO memorials (id, full_name, date_of_birth, date_of_passing, \
                 biography, image_urls, audio_tribute_url, legacy_document_url, posted_by, \
                 posted_by_name, relationship, family_house, status) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)",
                rusqlite::params![
                    memorial.id.to_string(),
                    memorial.full_name,
                    memorial.date_of_birth,
                    memorial.date_of_passing,
                    memorial.biography,
                    encode_string_list(memorial.image_urls),
                    memorial.audio_tribute_url,
                    memorial.legacy_document_url,
                    memorial.posted_by.to_string(),
                    memorial.posted_by_name,
                    memorial.relationship,
                    memorial.family_house,
                    memorial.status.as_str(),
                ],
            )?;
            for alert in admin_alerts {
                insert_notification_in(&tx, alert)?;
            }
            let stored = require_memorial(&tx, memorial.id)?;
            tx.commit()?;
            Ok(stored)
        })
    }

    pub fn get_memorial(&self, id: Uuid) -> Result<Option<Memorial>> {
        self.with_conn(|conn| get_memorial(conn, id))
    }

    /// Admin view: every memorial regardless of status, newest first.
    pub fn list_memorials(&self) -> Result<Vec<Memorial>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {MEMORIAL_COLS} FROM memorials ORDER BY created_at DESC, rowid DESC"
            ))?;
            let rows = stmt
                .query_map([], memorial_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            rows.into_iter().map(MemorialRow::into_memorial).collect()
        })
    }

    /// Public archive: approved memorials only, filtered and sorted in SQL.
    /// `search` is a case-insensitive substring of the full name or family
    /// house; `year` is a prefix match on date_of_passing.
    pub fn search_archive(
        &self,
        search: Option<&str>,
        year: Option<&str>,
        sort: ArchiveSort,
    ) -> Result<Vec<Memorial>> {
        self.with_conn(|conn| {
            let mut sql =
                format!("SELECT {MEMORIAL_COLS} FROM memorials WHERE status = 'approved'");
            let mut owned: Vec<String> = Vec::new();

            if let Some(year) = year.map(str::trim).filter(|y| !y.is_empty()) {
                sql.push_str(" AND date_of_passing LIKE ? ESCAPE '\\'");
                owned.push(format!("{}%", escape_like(year)));
            }
            if let Some(needle) = search.map(str::trim).filter(|s| !s.is_empty()) {
                sql.push_str(
                    " AND (lower(full_name) LIKE '%' || ? || '%' ESCAPE '\\' \
                     OR lower(coalesce(family_house, '')) LIKE '%' || ? || '%' ESCAPE '\\')",
                );
                let needle = escape_like(&needle.to_lowercase());
                owned.push(needle.clone());
                owned.push(needle);
            }

            sql.push_str(match sort {
                ArchiveSort::Newest => " ORDER BY created_at DESC, rowid DESC",
                ArchiveSort::Oldest => " ORDER BY created_at ASC, rowid ASC",
                ArchiveSort::Az => " ORDER BY full_name COLLATE NOCASE ASC",
                ArchiveSort::Za => " ORDER BY full_name COLLATE NOCASE DESC",
            });

            let params: Vec<&dyn rusqlite::types::ToSql> = owned
                .iter()
                .map(|s| s as &dyn rusqlite::types::ToSql)
                .collect();

            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map(params.as_slice(), memorial_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            rows.into_iter().map(MemorialRow::into_memorial).collect()
        })
    }

    /// Admin lifecycle transition. Returns (before, after) so callers can
    /// notify and publish; the write is durable once this returns.
    pub fn set_memorial_status(
        &self,
        id: Uuid,
        status: MemorialStatus,
    ) -> Result<Option<(Memorial, Memorial)>> {
        self.with_conn(|conn| {
            let tx = conn.unchecked_transaction()?;
            let Some(before) = get_memorial(&tx, id)? else {
                return Ok(None);
            };
            tx.execute(
                "UPDATE memorials SET status = ?2 WHERE id = ?1",
                rusqlite::params![id.to_string(), status.as_str()],
            )?;
            let after = require_memorial(&tx, id)?;
            tx.commit()?;
            Ok(Some((before, after)))
        })
    }

    /// Owner/admin content edit. The statement lists content columns only;
    /// the lifecycle status is not touchable through this path.
    pub fn update_memorial_content(
        &self,
        id: Uuid,
        update: &MemorialContentUpdate,
    ) -> Result<Option<Memorial>> {
        self.with_conn(|conn| {
            let tx = conn.unchecked_transaction()?;
            let Some(current) = get_memorial(&tx, id)? else {
                return Ok(None);
            };
            let image_urls = match update.image_urls {
                Some(urls) => encode_string_list(urls),
                None => encode_string_list(&current.image_urls),
            };
            tx.execute(
                "UPDATE memorials SET full_name = ?2, date_of_birth = ?3, date_of_passing = ?4, \
                 biography = ?5, family_house = ?6, audio_tribute_url = ?7, \
                 legacy_document_url = ?8, image_urls = ?9 WHERE id = ?1",
                rusqlite::params![
                    id.to_string(),
                    update.full_name.unwrap_or(&current.full_name),
                    update.date_of_birth.or(current.date_of_birth.as_deref()),
                    update.date_of_passing.or(current.date_of_passing.as_deref()),
                    update.biography.unwrap_or(&current.biography),
                    update.family_house.or(current.family_house.as_deref()),
                    update
                        .audio_tribute_url
                        .or(current.audio_tribute_url.as_deref()),
                    update
                        .legacy_document_url
                        .or(current.legacy_document_url.as_deref()),
                    image_urls,
                ],
            )?;
            let updated = require_memorial(&tx, id)?;
            tx.commit()?;
            Ok(Some(updated))
        })
    }

    pub fn delete_memorial(&self, id: Uuid) -> Result<bool> {
        self.with_conn(|conn| {
            let deleted =
                conn.execute("DELETE FROM memorials WHERE id = ?1", [id.to_string()])?;
            Ok(deleted > 0)
        })
    }

    /// Admin clear-all, chunked at the batch bound.
    pub fn clear_memorials(&self) -> Result<usize> {
        self.with_conn(|conn| {
            let ids = collect_ids(conn, "SELECT id FROM memorials", &[])?;
            delete_ids_chunked(conn, "memorials", &ids)
        })
    }

    // -- Chats --

    /// Create-if-absent keyed on the sorted participant pair. Returns the
    /// chat plus whether this call created it.
    pub fn create_or_get_chat(&self, chat: &NewChat) -> Result<(Chat, bool)> {
        let pair_key = Chat::pair_key(chat.participant_a, chat.participant_b);
        self.with_conn(|conn| {
            let inserted = conn.execute(
                "INSERT INTO chats (id, pair_key, participant_a, participant_b, \
                 participant_a_name, participant_b_name, memorial_id, memorial_name) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8) \
                 ON CONFLICT(pair_key) DO NOTHING",
                rusqlite::params![
                    chat.id.to_string(),
                    pair_key,
                    chat.participant_a.to_string(),
                    chat.participant_b.to_string(),
                    chat.participant_a_name,
                    chat.participant_b_name,
                    chat.memorial_id.map(|id| id.to_string()),
                    chat.memorial_name,
                ],
            )?;

            let row = conn
                .query_row(
                    &format!("SELECT {CHAT_COLS} FROM chats WHERE pair_key = ?1"),
                    [&pair_key],
                    chat_row,
                )
                .optional()?
                .ok_or_else(|| anyhow::anyhow!("chat vanished after upsert"))?;

            Ok((row.into_chat()?, inserted > 0))
        })
    }

    pub fn get_chat(&self, id: Uuid) -> Result<Option<Chat>> {
        self.with_conn(|conn| {
            let row = conn
                .query_row(
                    &format!("SELECT {CHAT_COLS} FROM chats WHERE id = ?1"),
                    [id.to_string()],
                    chat_row,
                )
                .optional()?;
            row.map(ChatRow::into_chat).transpose()
        })
    }

    pub fn list_chats_for_user(&self, user_id: Uuid) -> Result<Vec<Chat>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {CHAT_COLS} FROM chats \
                 WHERE participant_a = ?1 OR participant_b = ?1 \
                 ORDER BY last_message_at DESC, rowid DESC"
            ))?;
            let rows = stmt
                .query_map([user_id.to_string()], chat_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            rows.into_iter().map(ChatRow::into_chat).collect()
        })
    }

    // -- Messages --

    /// Insert a message and refresh the parent chat's denormalized
    /// last-message fields in one transaction.
    pub fn insert_message(&self, msg: &NewMessage) -> Result<ChatMessage> {
        self.with_conn(|conn| {
            let tx = conn.unchecked_transaction()?;
            tx.execute(
                "INSERT INTO messages (id, chat_id, text, sender_id, sender_name, audio_url, \
                 image_url) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                rusqlite::params![
                    msg.id.to_string(),
                    msg.chat_id.to_string(),
                    msg.text,
                    msg.sender_id.to_string(),
                    msg.sender_name,
                    msg.audio_url,
                    msg.image_url,
                ],
            )?;
            tx.execute(
                "UPDATE chats SET last_message = ?2, last_message_at = datetime('now') \
                 WHERE id = ?1",
                rusqlite::params![msg.chat_id.to_string(), msg.preview],
            )?;
            let stored = require_message(&tx, msg.id)?;
            tx.commit()?;
            Ok(stored)
        })
    }

    pub fn get_messages(&self, chat_id: Uuid) -> Result<Vec<ChatMessage>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {MESSAGE_COLS} FROM messages WHERE chat_id = ?1 \
                 ORDER BY created_at ASC, rowid ASC"
            ))?;
            let rows = stmt
                .query_map([chat_id.to_string()], message_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            rows.into_iter().map(MessageRow::into_message).collect()
        })
    }

    pub fn get_message(&self, chat_id: Uuid, message_id: Uuid) -> Result<Option<ChatMessage>> {
        self.with_conn(|conn| {
            let row = conn
                .query_row(
                    &format!(
                        "SELECT {MESSAGE_COLS} FROM messages WHERE id = ?1 AND chat_id = ?2"
                    ),
                    rusqlite::params![message_id.to_string(), chat_id.to_string()],
                    message_row,
                )
                .optional()?;
            row.map(MessageRow::into_message).transpose()
        })
    }

    /// Mark-as-read on chat open: every counterpart message not yet listing
    /// this reader gets the reader appended and status flipped. Messages
    /// already read by this user are left untouched. Updates are applied in
    /// sequential batches bounded by MAX_BATCH_OPS.
    pub fn mark_messages_read(&self, chat_id: Uuid, reader: Uuid) -> Result<usize> {
        self.with_conn(|conn| {
            // Work out the pending updates first, then apply them chunk by chunk.
            let mut pending: Vec<(String, String)> = Vec::new();
            {
                let mut stmt = conn.prepare(&format!(
                    "SELECT {MESSAGE_COLS} FROM messages \
                     WHERE chat_id = ?1 AND sender_id != ?2"
                ))?;
                let rows = stmt
                    .query_map(
                        rusqlite::params![chat_id.to_string(), reader.to_string()],
                        message_row,
                    )?
                    .collect::<std::result::Result<Vec<_>, _>>()?;

                for row in rows {
                    let message = row.into_message()?;
                    if message.read_by.contains(&reader) {
                        continue;
                    }
                    let mut read_by = message.read_by;
                    read_by.push(reader);
                    pending.push((message.id.to_string(), encode_uuid_list(&read_by)));
                }
            }

            for chunk in pending.chunks(MAX_BATCH_OPS) {
                let tx = conn.unchecked_transaction()?;
                for (id, read_by) in chunk {
                    tx.execute(
                        "UPDATE messages SET read_by = ?2, status = ?3 WHERE id = ?1",
                        rusqlite::params![id, read_by, MessageStatus::Read.as_str()],
                    )?;
                }
                tx.commit()?;
            }
            Ok(pending.len())
        })
    }

    /// "Delete for me": union the user into the hide set. The row stays.
    pub fn delete_message_for_user(
        &self,
        chat_id: Uuid,
        message_id: Uuid,
        user_id: Uuid,
    ) -> Result<bool> {
        self.with_conn(|conn| {
            let tx = conn.unchecked_transaction()?;
            let Some(message) = get_message_in(&tx, chat_id, message_id)? else {
                return Ok(false);
            };
            if !message.deleted_for.contains(&user_id) {
                let mut deleted_for = message.deleted_for;
                deleted_for.push(user_id);
                tx.execute(
                    "UPDATE messages SET deleted_for = ?2 WHERE id = ?1",
                    rusqlite::params![message_id.to_string(), encode_uuid_list(&deleted_for)],
                )?;
            }
            tx.commit()?;
            Ok(true)
        })
    }

    /// "Delete for everyone": tombstone the row and blank its content.
    pub fn tombstone_message(&self, chat_id: Uuid, message_id: Uuid) -> Result<bool> {
        self.with_conn(|conn| {
            let changed = conn.execute(
                "UPDATE messages SET deleted_for_everyone = 1, text = '', audio_url = NULL, \
                 image_url = NULL WHERE id = ?1 AND chat_id = ?2",
                rusqlite::params![message_id.to_string(), chat_id.to_string()],
            )?;
            Ok(changed > 0)
        })
    }

    // -- Notifications --

    pub fn insert_notification(&self, notification: &NewNotification) -> Result<Notification> {
        self.with_conn(|conn| {
            let id = insert_notification_in(conn, notification)?;
            let row = conn.query_row(
                &format!("SELECT {NOTIFICATION_COLS} FROM notifications WHERE id = ?1"),
                [id.to_string()],
                notification_row,
            )?;
            row.into_notification()
        })
    }

    pub fn list_notifications_for_user(&self, user_id: Uuid) -> Result<Vec<Notification>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {NOTIFICATION_COLS} FROM notifications WHERE user_id = ?1 \
                 ORDER BY created_at DESC, rowid DESC"
            ))?;
            let rows = stmt
                .query_map([user_id.to_string()], notification_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            rows.into_iter()
                .map(NotificationRow::into_notification)
                .collect()
        })
    }

    pub fn mark_notification_read(&self, id: Uuid, user_id: Uuid) -> Result<bool> {
        self.with_conn(|conn| {
            let changed = conn.execute(
                "UPDATE notifications SET is_read = 1 WHERE id = ?1 AND user_id = ?2",
                rusqlite::params![id.to_string(), user_id.to_string()],
            )?;
            Ok(changed > 0)
        })
    }

    pub fn mark_all_notifications_read(&self, user_id: Uuid) -> Result<usize> {
        self.with_conn(|conn| {
            let changed = conn.execute(
                "UPDATE notifications SET is_read = 1 WHERE user_id = ?1 AND is_read = 0",
                [user_id.to_string()],
            )?;
            Ok(changed)
        })
    }

    pub fn delete_notification(&self, id: Uuid, user_id: Uuid) -> Result<bool> {
        self.with_conn(|conn| {
            let deleted = conn.execute(
                "DELETE FROM notifications WHERE id = ?1 AND user_id = ?2",
                rusqlite::params![id.to_string(), user_id.to_string()],
            )?;
            Ok(deleted > 0)
        })
    }

    /// Clear the caller's notifications, chunked at the batch bound.
    pub fn clear_notifications(&self, user_id: Uuid) -> Result<usize> {
        self.with_conn(|conn| {
            let ids = collect_ids(
                conn,
                "SELECT id FROM notifications WHERE user_id = ?1",
                &[&user_id.to_string()],
            )?;
            delete_ids_chunked(conn, "notifications", &ids)
        })
    }

    // -- Mail outbox --

    pub fn enqueue_mail(&self, recipient: &str, subject: &str, html: &str) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO mail_outbox (id, recipient, subject, html) VALUES (?1, ?2, ?3, ?4)",
                rusqlite::params![Uuid::new_v4().to_string(), recipient, subject, html],
            )?;
            Ok(())
        })
    }

    pub fn list_mail(&self) -> Result<Vec<MailRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, recipient, subject, html, created_at FROM mail_outbox \
                 ORDER BY created_at ASC, rowid ASC",
            )?;
            let rows = stmt
                .query_map([], |row| {
                    Ok(MailRow {
                        id: row.get(0)?,
                        recipient: row.get(1)?,
                        subject: row.get(2)?,
                        html: row.get(3)?,
                        created_at: row.get(4)?,
                    })
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }
}

// -- Row mappers --

fn user_row(row: &rusqlite::Row) -> rusqlite::Result<UserRow> {
    Ok(UserRow {
        id: row.get(0)?,
        email: row.get(1)?,
        password: row.get(2)?,
        display_name: row.get(3)?,
        location: row.get(4)?,
        phone_number: row.get(5)?,
        community_reference: row.get(6)?,
        role: row.get(7)?,
        is_verified: row.get(8)?,
        is_disabled: row.get(9)?,
        created_at: row.get(10)?,
    })
}

fn memorial_row(row: &rusqlite::Row) -> rusqlite::Result<MemorialRow> {
    Ok(MemorialRow {
        id: row.get(0)?,
        full_name: row.get(1)?,
        date_of_birth: row.get(2)?,
        date_of_passing: row.get(3)?,
        biography: row.get(4)?,
        image_urls: row.get(5)?,
        audio_tribute_url: row.get(6)?,
        legacy_document_url: row.get(7)?,
        posted_by: row.get(8)?,
        posted_by_name: row.get(9)?,
        relationship: row.get(10)?,
        family_house: row.get(11)?,
        candles_lit: row.get(12)?,
        status: row.get(13)?,
        created_at: row.get(14)?,
    })
}

fn chat_row(row: &rusqlite::Row) -> rusqlite::Result<ChatRow> {
    Ok(ChatRow {
        id: row.get(0)?,
        participant_a: row.get(1)?,
        participant_b: row.get(2)?,
        participant_a_name: row.get(3)?,
        participant_b_name: row.get(4)?,
        memorial_id: row.get(5)?,
        memorial_name: row.get(6)?,
        last_message: row.get(7)?,
        last_message_at: row.get(8)?,
        created_at: row.get(9)?,
    })
}

fn message_row(row: &rusqlite::Row) -> rusqlite::Result<MessageRow> {
    Ok(MessageRow {
        id: row.get(0)?,
        chat_id: row.get(1)?,
        text: row.get(2)?,
        sender_id: row.get(3)?,
        sender_name: row.get(4)?,
        audio_url: row.get(5)?,
        image_url: row.get(6)?,
        status: row.get(7)?,
        read_by: row.get(8)?,
        deleted_for: row.get(9)?,
        deleted_for_everyone: row.get(10)?,
        created_at: row.get(11)?,
    })
}

fn notification_row(row: &rusqlite::Row) -> rusqlite::Result<NotificationRow> {
    Ok(NotificationRow {
        id: row.get(0)?,
        user_id: row.get(1)?,
        kind: row.get(2)?,
        message: row.get(3)?,
        memorial_id: row.get(4)?,
        memorial_name: row.get(5)?,
        chat_id: row.get(6)?,
        is_read: row.get(7)?,
        created_at: row.get(8)?,
    })
}

// -- Shared lookups (work inside and outside transactions) --

fn query_user_row(
    conn: &Connection,
    predicate: &str,
    param: &dyn rusqlite::types::ToSql,
) -> Result<Option<UserRow>> {
    let row = conn
        .query_row(
            &format!("SELECT {USER_COLS} FROM users WHERE {predicate}"),
            [param],
            user_row,
        )
        .optional()?;
    Ok(row)
}

fn get_user(conn: &Connection, id: Uuid) -> Result<Option<User>> {
    query_user_row(conn, "id = ?1", &id.to_string())?
        .map(UserRow::into_user)
        .transpose()
}

fn require_user(conn: &Connection, id: Uuid) -> Result<User> {
    get_user(conn, id)?.ok_or_else(|| anyhow::anyhow!("user {id} vanished after write"))
}

fn get_memorial(conn: &Connection, id: Uuid) -> Result<Option<Memorial>> {
    let row = conn
        .query_row(
            &format!("SELECT {MEMORIAL_COLS} FROM memorials WHERE id = ?1"),
            [id.to_string()],
            memorial_row,
        )
        .optional()?;
    row.map(MemorialRow::into_memorial).transpose()
}

fn require_memorial(conn: &Connection, id: Uuid) -> Result<Memorial> {
    get_memorial(conn, id)?.ok_or_else(|| anyhow::anyhow!("memorial {id} vanished after write"))
}

fn get_message_in(
    conn: &Connection,
    chat_id: Uuid,
    message_id: Uuid,
) -> Result<Option<ChatMessage>> {
    let row = conn
        .query_row(
            &format!("SELECT {MESSAGE_COLS} FROM messages WHERE id = ?1 AND chat_id = ?2"),
            rusqlite::params![message_id.to_string(), chat_id.to_string()],
            message_row,
        )
        .optional()?;
    row.map(MessageRow::into_message).transpose()
}

fn require_message(conn: &Connection, id: Uuid) -> Result<ChatMessage> {
    let row = conn
        .query_row(
            &format!("SELECT {MESSAGE_COLS} FROM messages WHERE id = ?1"),
            [id.to_string()],
            message_row,
        )
        .optional()?
        .ok_or_else(|| anyhow::anyhow!("message {id} vanished after write"))?;
    row.into_message()
}

fn insert_notification_in(conn: &Connection, notification: &NewNotification) -> Result<Uuid> {
    let id = Uuid::new_v4();
    conn.execute(
        "INSERT INTO notifications (id, user_id, kind, message, memorial_id, memorial_name, \
         chat_id) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        rusqlite::params![
            id.to_string(),
            notification.user_id.to_string(),
            notification.kind.as_str(),
            notification.message,
            notification.memorial_id.map(|m| m.to_string()),
            notification.memorial_name,
            notification.chat_id.map(|c| c.to_string()),
        ],
    )?;
    Ok(id)
}

// -- Bulk helpers --

fn collect_ids(
    conn: &Connection,
    sql: &str,
    params: &[&dyn rusqlite::types::ToSql],
) -> Result<Vec<String>> {
    let mut stmt = conn.prepare(sql)?;
    let ids = stmt
        .query_map(params, |row| row.get::<_, String>(0))?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(ids)
}

/// Delete by id in sequential transactions of at most MAX_BATCH_OPS rows —
/// the store's bounded multi-document batch, applied chunk by chunk.
fn delete_ids_chunked(conn: &Connection, table: &str, ids: &[String]) -> Result<usize> {
    let mut deleted = 0;
    for chunk in ids.chunks(MAX_BATCH_OPS) {
        let tx = conn.unchecked_transaction()?;
        let placeholders: Vec<String> = (1..=chunk.len()).map(|i| format!("?{i}")).collect();
        let sql = format!(
            "DELETE FROM {table} WHERE id IN ({})",
            placeholders.join(", ")
        );
        let params: Vec<&dyn rusqlite::types::ToSql> = chunk
            .iter()
            .map(|id| id as &dyn rusqlite::types::ToSql)
            .collect();
        deleted += tx.execute(&sql, params.as_slice())?;
        tx.commit()?;
    }
    Ok(deleted)
}

/// Escape LIKE wildcards in user input (the queries use ESCAPE '\').
fn escape_like(input: &str) -> String {
    input
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_")
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
