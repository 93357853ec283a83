use anyhow::Result;
use chrono::{DateTime, Utc};
use rusqlite::Row;
use uuid::Uuid;

use super::{parsed, parsed_opt};
use crate::models::NotificationRow;
use crate::{Database, ts};

impl Database {
    pub fn insert_notification(
        &self,
        user_id: Uuid,
        kind: &str,
        payload: &serde_json::Value,
        now: DateTime<Utc>,
    ) -> Result<NotificationRow> {
        let row = NotificationRow {
            id: Uuid::new_v4(),
            user_id,
            kind: kind.to_string(),
            payload: payload.to_string(),
            created_at: now,
            read_at: None,
        };
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO notifications (id, user_id, kind, payload, created_at) VALUES (?1, ?2, ?3, ?4, ?5)",
                (
                    row.id.to_string(),
                    user_id.to_string(),
                    &row.kind,
                    &row.payload,
                    ts(now),
                ),
            )?;
            Ok(())
        })?;
        Ok(row)
    }

    /// Newest first; `since` is exclusive.
    pub fn list_notifications(
        &self,
        user_id: Uuid,
        since: Option<DateTime<Utc>>,
        limit: u32,
    ) -> Result<Vec<NotificationRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, user_id, kind, payload, created_at, read_at FROM notifications
                 WHERE user_id = ?1 AND (?2 IS NULL OR created_at > ?2)
                 ORDER BY created_at DESC, rowid DESC
                 LIMIT ?3",
            )?;
            let rows = stmt
                .query_map(
                    rusqlite::params![user_id.to_string(), since.map(ts), limit],
                    map_notification,
                )?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    /// Mark the given notifications read, or all unread ones when `ids` is
    /// empty. Only the owner's rows are touched. Returns the number changed.
    pub fn mark_notifications_read(&self, user_id: Uuid, ids: &[Uuid], now: DateTime<Utc>) -> Result<usize> {
        self.with_tx(|tx| {
            if ids.is_empty() {
                let changed = tx.execute(
                    "UPDATE notifications SET read_at = ?2 WHERE user_id = ?1 AND read_at IS NULL",
                    (user_id.to_string(), ts(now)),
                )?;
                return Ok(changed);
            }

            let mut stmt = tx.prepare(
                "UPDATE notifications SET read_at = ?3
                 WHERE id = ?1 AND user_id = ?2 AND read_at IS NULL",
            )?;
            let mut changed = 0;
            for id in ids {
                changed += stmt.execute((id.to_string(), user_id.to_string(), ts(now)))?;
            }
            Ok(changed)
        })
    }
}

fn map_notification(row: &Row<'_>) -> rusqlite::Result<NotificationRow> {
    Ok(NotificationRow {
        id: parsed(row, 0)?,
        user_id: parsed(row, 1)?,
        kind: row.get(2)?,
        payload: row.get(3)?,
        created_at: parsed(row, 4)?,
        read_at: parsed_opt(row, 5)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queries::test_support::{at, user};
    use serde_json::json;

    #[test]
    fn list_and_mark_read() {
        let db = Database::open_in_memory().unwrap();
        let ada = user(&db, "ada");
        let grace = user(&db, "grace");

        let first = db
            .insert_notification(ada, "kudos_received", &json!({"n": 1}), at("2026-05-01T10:00:00Z"))
            .unwrap();
        db.insert_notification(ada, "kudos_received", &json!({"n": 2}), at("2026-05-01T11:00:00Z"))
            .unwrap();
        db.insert_notification(grace, "content_warning", &json!({}), at("2026-05-01T11:00:00Z"))
            .unwrap();

        let all = db.list_notifications(ada, None, 50).unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].payload, r#"{"n":2}"#);

        let newer = db
            .list_notifications(ada, Some(at("2026-05-01T10:00:00Z")), 50)
            .unwrap();
        assert_eq!(newer.len(), 1);

        // Someone else's id is ignored.
        assert_eq!(
            db.mark_notifications_read(grace, &[first.id], at("2026-05-01T12:00:00Z")).unwrap(),
            0
        );
        assert_eq!(
            db.mark_notifications_read(ada, &[first.id], at("2026-05-01T12:00:00Z")).unwrap(),
            1
        );
        assert_eq!(
            db.mark_notifications_read(ada, &[], at("2026-05-01T12:00:00Z")).unwrap(),
            1
        );
        assert!(db.list_notifications(ada, None, 50).unwrap().iter().all(|n| n.read_at.is_some()));
    }
}
