use rusqlite::types::Value as SqlValue;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension};

use parlor_shared::types::MessageState;
use parlor_shared::wire::{decode_data_url, encode_data_url, ChatMessage, WireAttachment};

use crate::database::Store;
use crate::error::Result;
use crate::models::RoomKey;
use crate::rooms::{get_or_create_room_tx, resolve_room_tx, room_id_tx};

impl Store {
    /// Insert a message and all its attachments in one transaction.
    ///
    /// Returns false when a row with the same id already exists; the existing
    /// row wins and nothing is written. State is normalized to SAVED.
    pub fn persist_message(&self, room_id: i64, msg: &ChatMessage) -> Result<bool> {
        let mut conn = self.lock();
        let tx = conn.transaction()?;
        let inserted = persist_message_tx(&tx, room_id, msg)?;
        tx.commit()?;
        Ok(inserted)
    }

    /// Ensure the room exists, then persist the batch in one transaction.
    /// Returns the number of messages actually inserted.
    pub fn save_messages(&self, room: &str, msgs: &[ChatMessage]) -> Result<usize> {
        let mut conn = self.lock();
        let tx = conn.transaction()?;
        let room_id = get_or_create_room_tx(&tx, room)?;
        let mut inserted = 0;
        for msg in msgs {
            if persist_message_tx(&tx, room_id, msg)? {
                inserted += 1;
            }
        }
        tx.commit()?;
        Ok(inserted)
    }

    /// Newest-first history window, attachments hydrated as inline data URLs.
    pub fn messages_for_room(
        &self,
        room: &str,
        limit: u32,
        offset: u32,
    ) -> Result<Vec<ChatMessage>> {
        let conn = self.lock();
        let Some(room_id) = room_id_tx(&conn, room)? else {
            return Ok(Vec::new());
        };

        let mut stmt = conn.prepare(
            "SELECT id, timestamp, sender, content, public_key, signature, state
             FROM messages
             WHERE room_id = ?1
             ORDER BY timestamp DESC, id DESC
             LIMIT ?2 OFFSET ?3",
        )?;
        let mut messages = stmt
            .query_map(params![room_id, limit, offset], row_to_message)?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        let mut att_stmt = conn.prepare(
            "SELECT id, name, type, size, data
             FROM attachments
             WHERE message_id = ?1
             ORDER BY id ASC",
        )?;
        for msg in &mut messages {
            msg.attachments = att_stmt
                .query_map(params![msg.id], row_to_attachment)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
        }
        Ok(messages)
    }

    /// Ids only, oldest first: the cheap cache-diff primitive.
    pub fn message_ids_for_room(
        &self,
        room: &RoomKey,
        since_ts: Option<i64>,
    ) -> Result<Vec<String>> {
        let conn = self.lock();
        let Some(room_id) = resolve_room_tx(&conn, room)? else {
            return Ok(Vec::new());
        };

        let mut stmt;
        let ids = match since_ts {
            Some(ts) => {
                stmt = conn.prepare(
                    "SELECT id FROM messages
                     WHERE room_id = ?1 AND timestamp >= ?2
                     ORDER BY timestamp ASC, id ASC",
                )?;
                stmt.query_map(params![room_id, ts], |row| row.get(0))?
                    .collect::<std::result::Result<Vec<_>, _>>()?
            }
            None => {
                stmt = conn.prepare(
                    "SELECT id FROM messages
                     WHERE room_id = ?1
                     ORDER BY timestamp ASC, id ASC",
                )?;
                stmt.query_map(params![room_id], |row| row.get(0))?
                    .collect::<std::result::Result<Vec<_>, _>>()?
            }
        };
        Ok(ids)
    }

    /// Room-scoped retrieval by id list; ids belonging to other rooms are
    /// silently omitted. One join recovers messages and attachments together.
    pub fn messages_by_ids(&self, ids: &[String], room: &RoomKey) -> Result<Vec<ChatMessage>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let conn = self.lock();
        let Some(room_id) = resolve_room_tx(&conn, room)? else {
            return Ok(Vec::new());
        };

        let placeholders = (0..ids.len())
            .map(|i| format!("?{}", i + 2))
            .collect::<Vec<_>>()
            .join(", ");
        let sql = format!(
            "SELECT m.id, m.timestamp, m.sender, m.content, m.public_key, m.signature, m.state,
                    a.id, a.name, a.type, a.size, a.data
             FROM messages m
             LEFT JOIN attachments a ON a.message_id = m.id
             WHERE m.room_id = ?1 AND m.id IN ({placeholders})
             ORDER BY m.timestamp ASC, m.id ASC, a.id ASC"
        );
        let mut stmt = conn.prepare(&sql)?;

        let mut values: Vec<SqlValue> = Vec::with_capacity(ids.len() + 1);
        values.push(SqlValue::Integer(room_id));
        values.extend(ids.iter().map(|id| SqlValue::Text(id.clone())));

        let mut rows = stmt.query(params_from_iter(values))?;
        let mut messages: Vec<ChatMessage> = Vec::new();
        while let Some(row) = rows.next()? {
            let id: String = row.get(0)?;
            if messages.last().map(|m| m.id != id).unwrap_or(true) {
                messages.push(ChatMessage {
                    id: id.clone(),
                    timestamp: row.get(1)?,
                    sender: row.get(2)?,
                    content: row.get::<_, Option<String>>(3)?.unwrap_or_default(),
                    public_key: row.get(4)?,
                    signature: row.get(5)?,
                    state: state_from_sql(row.get(6)?),
                    attachments: Vec::new(),
                });
            }
            if let Some(att_id) = row.get::<_, Option<i64>>(7)? {
                let name: String = row.get(8)?;
                let mime_type: String = row.get(9)?;
                let size: i64 = row.get(10)?;
                let data: Option<Vec<u8>> = row.get(11)?;
                if let Some(msg) = messages.last_mut() {
                    msg.attachments.push(WireAttachment {
                        name,
                        data: data.map(|bytes| encode_data_url(&mime_type, &bytes)),
                        mime_type,
                        size,
                        id: Some(att_id),
                    });
                }
            }
        }
        Ok(messages)
    }

    /// Delete a message and its attachments. Refuses (returning false) unless
    /// the requester is the stored sender or the admin key.
    pub fn delete_message(
        &self,
        id: &str,
        requester_key: &str,
        admin_key: Option<&str>,
    ) -> Result<bool> {
        let mut conn = self.lock();
        let tx = conn.transaction()?;
        let owner: Option<Option<String>> = tx
            .query_row(
                "SELECT public_key FROM messages WHERE id = ?1",
                params![id],
                |row| row.get(0),
            )
            .optional()?;
        let removed = match owner {
            None => false,
            Some(owner_key) => {
                let authorized = owner_key.as_deref() == Some(requester_key)
                    || admin_key == Some(requester_key);
                if authorized {
                    tx.execute("DELETE FROM attachments WHERE message_id = ?1", params![id])?;
                    tx.execute("DELETE FROM messages WHERE id = ?1", params![id])? > 0
                } else {
                    false
                }
            }
        };
        tx.commit()?;
        Ok(removed)
    }

    /// Remove every message (and attachment) this key ever sent, across all
    /// rooms. Returns the number of messages removed.
    pub fn delete_user_content(&self, public_key: &str) -> Result<usize> {
        let mut conn = self.lock();
        let tx = conn.transaction()?;
        tx.execute(
            "DELETE FROM attachments
             WHERE message_id IN (SELECT id FROM messages WHERE public_key = ?1)",
            params![public_key],
        )?;
        let removed = tx.execute(
            "DELETE FROM messages WHERE public_key = ?1",
            params![public_key],
        )?;
        tx.commit()?;
        Ok(removed)
    }
}

pub(crate) fn persist_message_tx(
    conn: &Connection,
    room_id: i64,
    msg: &ChatMessage,
) -> Result<bool> {
    let changed = conn.execute(
        "INSERT OR IGNORE INTO messages
         (id, room_id, timestamp, sender, content, public_key, signature, state)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        params![
            msg.id,
            room_id,
            msg.timestamp,
            msg.sender,
            msg.content,
            msg.public_key,
            msg.signature,
            "SAVED",
        ],
    )?;
    if changed == 0 {
        // Duplicate id: the pre-existing row wins, attachments included.
        return Ok(false);
    }

    for att in &msg.attachments {
        let Some(url) = att.data.as_deref() else {
            tracing::warn!(message_id = %msg.id, name = %att.name, "attachment without data skipped");
            continue;
        };
        let Some((url_mime, bytes)) = decode_data_url(url) else {
            tracing::warn!(message_id = %msg.id, name = %att.name, "undecodable attachment data skipped");
            continue;
        };
        let mime_type = if att.mime_type.is_empty() {
            url_mime
        } else {
            att.mime_type.clone()
        };
        conn.execute(
            "INSERT INTO attachments (message_id, name, type, size, data)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![msg.id, att.name, mime_type, bytes.len() as i64, bytes],
        )?;
    }
    Ok(true)
}

fn row_to_message(row: &rusqlite::Row<'_>) -> rusqlite::Result<ChatMessage> {
    Ok(ChatMessage {
        id: row.get(0)?,
        timestamp: row.get(1)?,
        sender: row.get(2)?,
        content: row.get::<_, Option<String>>(3)?.unwrap_or_default(),
        public_key: row.get(4)?,
        signature: row.get(5)?,
        state: state_from_sql(row.get(6)?),
        attachments: Vec::new(),
    })
}

fn row_to_attachment(row: &rusqlite::Row<'_>) -> rusqlite::Result<WireAttachment> {
    let id: i64 = row.get(0)?;
    let name: String = row.get(1)?;
    let mime_type: String = row.get(2)?;
    let size: i64 = row.get(3)?;
    let data: Option<Vec<u8>> = row.get(4)?;
    Ok(WireAttachment {
        name,
        data: data.map(|bytes| encode_data_url(&mime_type, &bytes)),
        mime_type,
        size,
        id: Some(id),
    })
}

fn state_from_sql(state: Option<String>) -> Option<MessageState> {
    match state.as_deref() {
        Some("SAVED") => Some(MessageState::Saved),
        Some("SENT") => Some(MessageState::Sent),
        Some("FAILED") => Some(MessageState::Failed),
        _ => None,
    }
}
