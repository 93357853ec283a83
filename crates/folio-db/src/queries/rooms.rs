use anyhow::{Result, anyhow};
use chrono::Utc;
use rusqlite::{Connection, Row};
use uuid::Uuid;

use super::{OptionalExt, parsed, parsed_opt};
use crate::models::RoomRow;
use crate::{Database, ts};

impl Database {
    pub fn create_room(
        &self,
        id: Uuid,
        owner_id: Uuid,
        name: &str,
        description: Option<&str>,
    ) -> Result<RoomRow> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO rooms (id, name, description, owner_id, created_at) VALUES (?1, ?2, ?3, ?4, ?5)",
                rusqlite::params![id.to_string(), name, description, owner_id.to_string(), ts(Utc::now())],
            )?;
            query_room(conn, id)?.ok_or_else(|| anyhow!("room {} vanished after insert", id))
        })
    }

    /// Includes soft-deleted rooms; callers decide how to treat them.
    pub fn get_room(&self, id: Uuid) -> Result<Option<RoomRow>> {
        self.with_conn(|conn| query_room(conn, id))
    }

    /// Replace the description (an empty string clears it).
    pub fn update_room_description(&self, id: Uuid, description: &str) -> Result<Option<RoomRow>> {
        self.with_tx(|tx| {
            let changed = tx.execute(
                "UPDATE rooms SET description = NULLIF(?2, '') WHERE id = ?1 AND deleted_at IS NULL",
                (id.to_string(), description),
            )?;
            if changed == 0 {
                return Ok(None);
            }
            query_room(tx, id)
        })
    }
}

pub(crate) fn query_room(conn: &Connection, id: Uuid) -> Result<Option<RoomRow>> {
    conn.query_row(
        "SELECT id, name, description, owner_id, deleted_at, created_at FROM rooms WHERE id = ?1",
        [id.to_string()],
        map_room,
    )
    .optional()
}

fn map_room(row: &Row<'_>) -> rusqlite::Result<RoomRow> {
    Ok(RoomRow {
        id: parsed(row, 0)?,
        name: row.get(1)?,
        description: row.get(2)?,
        owner_id: parsed(row, 3)?,
        deleted_at: parsed_opt(row, 4)?,
        created_at: parsed(row, 5)?,
    })
}
