use anyhow::Result;
use chrono::{DateTime, Utc};
use rusqlite::Connection;
use uuid::Uuid;

use super::reading::query_session;
use super::{OptionalExt, parsed};
use crate::models::{KudosOutcome, KudosRow};
use crate::{Database, ts};

impl Database {
    /// Returns `false` if the follow already existed.
    pub fn follow(&self, follower_id: Uuid, following_id: Uuid) -> Result<bool> {
        self.with_conn(|conn| {
            let changed = conn.execute(
                "INSERT OR IGNORE INTO follows (follower_id, following_id, created_at) VALUES (?1, ?2, ?3)",
                (follower_id.to_string(), following_id.to_string(), ts(Utc::now())),
            )?;
            Ok(changed > 0)
        })
    }

    pub fn unfollow(&self, follower_id: Uuid, following_id: Uuid) -> Result<bool> {
        self.with_conn(|conn| {
            let changed = conn.execute(
                "DELETE FROM follows WHERE follower_id = ?1 AND following_id = ?2",
                (follower_id.to_string(), following_id.to_string()),
            )?;
            Ok(changed > 0)
        })
    }

    pub fn is_following(&self, follower_id: Uuid, following_id: Uuid) -> Result<bool> {
        self.with_conn(|conn| {
            let found = conn
                .query_row(
                    "SELECT 1 FROM follows WHERE follower_id = ?1 AND following_id = ?2",
                    (follower_id.to_string(), following_id.to_string()),
                    |_| Ok(()),
                )
                .optional()?;
            Ok(found.is_some())
        })
    }

    pub fn give_kudos(
        &self,
        id: Uuid,
        giver_id: Uuid,
        session_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<KudosOutcome> {
        self.with_tx(|tx| {
            let Some(session) = query_session(tx, session_id)? else {
                return Ok(KudosOutcome::SessionNotFound);
            };
            if session.user_id == giver_id {
                return Ok(KudosOutcome::OwnSession);
            }
            if query_kudos(tx, giver_id, session_id)?.is_some() {
                return Ok(KudosOutcome::Duplicate);
            }

            tx.execute(
                "INSERT INTO kudos (id, giver_id, receiver_id, session_id, created_at) VALUES (?1, ?2, ?3, ?4, ?5)",
                (
                    id.to_string(),
                    giver_id.to_string(),
                    session.user_id.to_string(),
                    session_id.to_string(),
                    ts(now),
                ),
            )?;

            Ok(KudosOutcome::Given(KudosRow {
                id,
                giver_id,
                receiver_id: session.user_id,
                session_id,
                created_at: now,
            }))
        })
    }

    /// Returns `false` when there was nothing to take back.
    pub fn remove_kudos(&self, giver_id: Uuid, session_id: Uuid) -> Result<bool> {
        self.with_conn(|conn| {
            let changed = conn.execute(
                "DELETE FROM kudos WHERE giver_id = ?1 AND session_id = ?2",
                (giver_id.to_string(), session_id.to_string()),
            )?;
            Ok(changed > 0)
        })
    }
}

fn query_kudos(conn: &Connection, giver_id: Uuid, session_id: Uuid) -> Result<Option<KudosRow>> {
    conn.query_row(
        "SELECT id, giver_id, receiver_id, session_id, created_at FROM kudos
         WHERE giver_id = ?1 AND session_id = ?2",
        (giver_id.to_string(), session_id.to_string()),
        |row| {
            Ok(KudosRow {
                id: parsed(row, 0)?,
                giver_id: parsed(row, 1)?,
                receiver_id: parsed(row, 2)?,
                session_id: parsed(row, 3)?,
                created_at: parsed(row, 4)?,
            })
        },
    )
    .optional()
}
