use rusqlite::params;

use crate::database::Store;
use crate::error::{Result, StoreError};
use crate::models::{RecentAttachment, StoredAttachment};

impl Store {
    /// Fetch one attachment with its raw bytes.
    pub fn attachment(&self, id: i64) -> Result<StoredAttachment> {
        let conn = self.lock();
        conn.query_row(
            "SELECT id, message_id, name, type, size, data
             FROM attachments WHERE id = ?1",
            params![id],
            |row| {
                Ok(StoredAttachment {
                    id: row.get(0)?,
                    message_id: row.get(1)?,
                    name: row.get(2)?,
                    mime_type: row.get(3)?,
                    size: row.get(4)?,
                    data: row.get::<_, Option<Vec<u8>>>(5)?.unwrap_or_default(),
                })
            },
        )
        .map_err(|e| match e {
            rusqlite::Error::QueryReturnedNoRows => StoreError::NotFound,
            other => StoreError::Sqlite(other),
        })
    }

    pub fn delete_attachment(&self, id: i64) -> Result<bool> {
        let conn = self.lock();
        let affected = conn.execute("DELETE FROM attachments WHERE id = ?1", params![id])?;
        Ok(affected > 0)
    }

    /// Newest first by parent message timestamp, joined with message and room
    /// so each row carries room name, sender, key, and timestamp.
    pub fn recent_attachments(&self, limit: u32) -> Result<Vec<RecentAttachment>> {
        let conn = self.lock();
        let mut stmt = conn.prepare(
            "SELECT a.id, a.name, a.type, a.size, r.name, m.sender, m.public_key, m.timestamp
             FROM attachments a
             JOIN messages m ON m.id = a.message_id
             JOIN rooms r ON r.id = m.room_id
             ORDER BY m.timestamp DESC, m.id DESC, a.id DESC
             LIMIT ?1",
        )?;
        let rows = stmt.query_map(params![limit], |row| {
            Ok(RecentAttachment {
                id: row.get(0)?,
                name: row.get(1)?,
                mime_type: row.get(2)?,
                size: row.get(3)?,
                room: row.get(4)?,
                sender: row.get(5)?,
                public_key: row.get(6)?,
                timestamp: row.get(7)?,
            })
        })?;
        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(Into::into)
    }
}
