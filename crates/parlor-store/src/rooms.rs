use rusqlite::{params, Connection, OptionalExtension};

use crate::database::Store;
use crate::error::Result;
use crate::models::{RoomKey, RoomSummary};

impl Store {
    /// Idempotent: concurrent creation cannot produce duplicate rows, the
    /// unique constraint on `name` absorbs the race.
    pub fn get_or_create_room(&self, name: &str) -> Result<i64> {
        let conn = self.lock();
        get_or_create_room_tx(&conn, name)
    }

    /// Delete a room with all its messages and their attachments. Returns
    /// whether the room row existed; a second call is a no-op returning false.
    pub fn delete_room(&self, name: &str) -> Result<bool> {
        let mut conn = self.lock();
        let tx = conn.transaction()?;
        let deleted = match room_id_tx(&tx, name)? {
            None => false,
            Some(room_id) => {
                delete_room_contents_tx(&tx, room_id)?;
                tx.execute("DELETE FROM rooms WHERE id = ?1", params![room_id])? > 0
            }
        };
        tx.commit()?;
        Ok(deleted)
    }

    /// As [`Store::delete_room`] but preserves the room row itself.
    pub fn wipe_room(&self, name: &str) -> Result<bool> {
        let mut conn = self.lock();
        let tx = conn.transaction()?;
        let existed = match room_id_tx(&tx, name)? {
            None => false,
            Some(room_id) => {
                delete_room_contents_tx(&tx, room_id)?;
                true
            }
        };
        tx.commit()?;
        Ok(existed)
    }

    /// `(name, messageCount)` per room, sorted by name.
    pub fn room_summaries(&self) -> Result<Vec<RoomSummary>> {
        let conn = self.lock();
        let mut stmt = conn.prepare(
            "SELECT r.name, COUNT(m.id)
             FROM rooms r
             LEFT JOIN messages m ON m.room_id = r.id
             GROUP BY r.id
             ORDER BY r.name ASC",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok(RoomSummary {
                name: row.get(0)?,
                // COUNT comes back as i64 regardless of driver quirks
                message_count: row.get(1)?,
            })
        })?;
        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(Into::into)
    }
}

pub(crate) fn get_or_create_room_tx(conn: &Connection, name: &str) -> Result<i64> {
    conn.execute("INSERT OR IGNORE INTO rooms (name) VALUES (?1)", params![name])?;
    conn.query_row(
        "SELECT id FROM rooms WHERE name = ?1",
        params![name],
        |row| row.get(0),
    )
    .map_err(Into::into)
}

pub(crate) fn room_id_tx(conn: &Connection, name: &str) -> Result<Option<i64>> {
    conn.query_row(
        "SELECT id FROM rooms WHERE name = ?1",
        params![name],
        |row| row.get(0),
    )
    .optional()
    .map_err(Into::into)
}

pub(crate) fn resolve_room_tx(conn: &Connection, key: &RoomKey) -> Result<Option<i64>> {
    match key {
        RoomKey::Id(id) => Ok(Some(*id)),
        RoomKey::Name(name) => room_id_tx(conn, name),
    }
}

/// Attachments first, then messages; the room row is left to the caller.
pub(crate) fn delete_room_contents_tx(conn: &Connection, room_id: i64) -> Result<()> {
    conn.execute(
        "DELETE FROM attachments
         WHERE message_id IN (SELECT id FROM messages WHERE room_id = ?1)",
        params![room_id],
    )?;
    conn.execute("DELETE FROM messages WHERE room_id = ?1", params![room_id])?;
    Ok(())
}
