use anyhow::{Result, anyhow};
use chrono::{DateTime, NaiveDate, Utc};
use rusqlite::{Connection, Row};
use uuid::Uuid;

use folio_core::streak::{StreakChange, StreakState, freeze_cap, local_date};

use super::users::query_user;
use super::{OptionalExt, parsed, parsed_opt};
use crate::models::{
    BookRow, DailyProgressRow, LogSessionOutcome, LoggedSession, NewSession, SessionRow,
};
use crate::{Database, ts};

const SESSION_SELECT: &str = "SELECT s.id, s.user_id, u.username, s.book_id, b.title,
        s.duration_minutes, s.started_at, s.ended_at,
        (SELECT COUNT(*) FROM kudos k WHERE k.session_id = s.id),
        s.created_at
     FROM reading_sessions s
     JOIN users u ON u.id = s.user_id
     JOIN books b ON b.id = s.book_id";

impl Database {
    // -- Books --

    pub fn create_book(&self, id: Uuid, title: &str, author: &str, added_by: Uuid) -> Result<BookRow> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO books (id, title, author, added_by, created_at) VALUES (?1, ?2, ?3, ?4, ?5)",
                (id.to_string(), title, author, added_by.to_string(), ts(Utc::now())),
            )?;
            query_book(conn, id)?.ok_or_else(|| anyhow!("book {} vanished after insert", id))
        })
    }

    pub fn get_book(&self, id: Uuid) -> Result<Option<BookRow>> {
        self.with_conn(|conn| query_book(conn, id))
    }

    /// Books whose title contains `query` (case-insensitive), by title.
    pub fn search_books(&self, query: Option<&str>, limit: u32) -> Result<Vec<BookRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, title, author, added_by, created_at FROM books
                 WHERE ?1 IS NULL OR title LIKE '%' || ?1 || '%'
                 ORDER BY title COLLATE NOCASE
                 LIMIT ?2",
            )?;
            let rows = stmt
                .query_map(rusqlite::params![query, limit], map_book)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    // -- Sessions --

    /// Insert a reading session and run the daily-goal/streak accounting in
    /// the same transaction.
    pub fn log_session(&self, new: &NewSession) -> Result<LogSessionOutcome> {
        self.with_tx(|tx| {
            let user = query_user(tx, new.user_id)?
                .ok_or_else(|| anyhow!("user {} not found", new.user_id))?;
            if query_book(tx, new.book_id)?.is_none() {
                return Ok(LogSessionOutcome::BookNotFound);
            }

            tx.execute(
                "INSERT INTO reading_sessions (id, user_id, book_id, duration_minutes, started_at, ended_at, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                rusqlite::params![
                    new.id.to_string(),
                    new.user_id.to_string(),
                    new.book_id.to_string(),
                    new.duration_minutes,
                    ts(new.started_at),
                    ts(new.ended_at),
                    ts(Utc::now()),
                ],
            )?;

            let date = local_date(new.ended_at, user.utc_offset_minutes);
            tx.execute(
                "INSERT INTO daily_progress (user_id, date, minutes) VALUES (?1, ?2, ?3)
                 ON CONFLICT(user_id, date) DO UPDATE SET minutes = minutes + excluded.minutes",
                rusqlite::params![new.user_id.to_string(), date.to_string(), new.duration_minutes],
            )?;

            let mut day = query_day(tx, new.user_id, date)?
                .ok_or_else(|| anyhow!("daily progress row missing after upsert"))?;
            let mut streak = query_streak(tx, new.user_id)?;
            let mut update = None;

            if !day.goal_met && day.minutes >= user.daily_goal_minutes {
                tx.execute(
                    "UPDATE daily_progress SET goal_met = 1 WHERE user_id = ?1 AND date = ?2",
                    (new.user_id.to_string(), date.to_string()),
                )?;
                day.goal_met = true;

                let result = streak.record_goal_met(date, freeze_cap(user.is_premium));
                if let StreakChange::Bridged { frozen_days } = &result.change {
                    for frozen in frozen_days {
                        tx.execute(
                            "INSERT INTO daily_progress (user_id, date, freeze_used) VALUES (?1, ?2, 1)
                             ON CONFLICT(user_id, date) DO UPDATE SET freeze_used = 1",
                            (new.user_id.to_string(), frozen.to_string()),
                        )?;
                    }
                }
                write_streak(tx, new.user_id, &result.state)?;
                streak = result.state.clone();
                update = Some(result);
            }

            let session = query_session(tx, new.id)?
                .ok_or_else(|| anyhow!("session {} vanished after insert", new.id))?;

            Ok(LogSessionOutcome::Logged(LoggedSession {
                session,
                day,
                streak,
                update,
            }))
        })
    }

    pub fn get_session(&self, id: Uuid) -> Result<Option<SessionRow>> {
        self.with_conn(|conn| query_session(conn, id))
    }

    /// A user's own sessions, newest first.
    pub fn list_user_sessions(&self, user_id: Uuid, limit: u32) -> Result<Vec<SessionRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!(
                "{SESSION_SELECT} WHERE s.user_id = ?1 ORDER BY s.ended_at DESC LIMIT ?2"
            ))?;
            let rows = stmt
                .query_map(rusqlite::params![user_id.to_string(), limit], map_session)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    /// Sessions of everyone `user_id` follows, newest first.
    pub fn feed(&self, user_id: Uuid, limit: u32) -> Result<Vec<SessionRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!(
                "{SESSION_SELECT}
                 WHERE s.user_id IN (SELECT following_id FROM follows WHERE follower_id = ?1)
                   AND u.deleted_at IS NULL
                 ORDER BY s.ended_at DESC
                 LIMIT ?2"
            ))?;
            let rows = stmt
                .query_map(rusqlite::params![user_id.to_string(), limit], map_session)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    // -- Streaks --

    pub fn get_streak(&self, user_id: Uuid) -> Result<StreakState> {
        self.with_conn(|conn| query_streak(conn, user_id))
    }

    pub fn get_day(&self, user_id: Uuid, date: NaiveDate) -> Result<Option<DailyProgressRow>> {
        self.with_conn(|conn| query_day(conn, user_id, date))
    }

    /// Daily rows from `since` (inclusive), newest first.
    pub fn list_progress(&self, user_id: Uuid, since: NaiveDate) -> Result<Vec<DailyProgressRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT date, minutes, goal_met, freeze_used FROM daily_progress
                 WHERE user_id = ?1 AND date >= ?2
                 ORDER BY date DESC",
            )?;
            let rows = stmt
                .query_map((user_id.to_string(), since.to_string()), map_day)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }
}

pub(crate) fn query_session(conn: &Connection, id: Uuid) -> Result<Option<SessionRow>> {
    conn.query_row(
        &format!("{SESSION_SELECT} WHERE s.id = ?1"),
        [id.to_string()],
        map_session,
    )
    .optional()
}

fn query_book(conn: &Connection, id: Uuid) -> Result<Option<BookRow>> {
    conn.query_row(
        "SELECT id, title, author, added_by, created_at FROM books WHERE id = ?1",
        [id.to_string()],
        map_book,
    )
    .optional()
}

fn query_day(conn: &Connection, user_id: Uuid, date: NaiveDate) -> Result<Option<DailyProgressRow>> {
    conn.query_row(
        "SELECT date, minutes, goal_met, freeze_used FROM daily_progress WHERE user_id = ?1 AND date = ?2",
        (user_id.to_string(), date.to_string()),
        map_day,
    )
    .optional()
}

fn query_streak(conn: &Connection, user_id: Uuid) -> Result<StreakState> {
    let state = conn
        .query_row(
            "SELECT current_streak, longest_streak, last_goal_date, freezes_available
             FROM user_streaks WHERE user_id = ?1",
            [user_id.to_string()],
            |row| {
                Ok(StreakState {
                    current: row.get(0)?,
                    longest: row.get(1)?,
                    last_goal_date: parsed_opt(row, 2)?,
                    freezes_available: row.get(3)?,
                })
            },
        )
        .optional()?;
    Ok(state.unwrap_or_else(StreakState::fresh))
}

fn write_streak(conn: &Connection, user_id: Uuid, state: &StreakState) -> Result<()> {
    conn.execute(
        "INSERT INTO user_streaks (user_id, current_streak, longest_streak, last_goal_date, freezes_available, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)
         ON CONFLICT(user_id) DO UPDATE SET
            current_streak = excluded.current_streak,
            longest_streak = excluded.longest_streak,
            last_goal_date = excluded.last_goal_date,
            freezes_available = excluded.freezes_available,
            updated_at = excluded.updated_at",
        rusqlite::params![
            user_id.to_string(),
            state.current,
            state.longest,
            state.last_goal_date.map(|d| d.to_string()),
            state.freezes_available,
            ts(Utc::now()),
        ],
    )?;
    Ok(())
}

fn map_book(row: &Row<'_>) -> rusqlite::Result<BookRow> {
    Ok(BookRow {
        id: parsed(row, 0)?,
        title: row.get(1)?,
        author: row.get(2)?,
        added_by: parsed(row, 3)?,
        created_at: parsed(row, 4)?,
    })
}

fn map_session(row: &Row<'_>) -> rusqlite::Result<SessionRow> {
    Ok(SessionRow {
        id: parsed(row, 0)?,
        user_id: parsed(row, 1)?,
        username: row.get(2)?,
        book_id: parsed(row, 3)?,
        book_title: row.get(4)?,
        duration_minutes: row.get(5)?,
        started_at: parsed::<DateTime<Utc>>(row, 6)?,
        ended_at: parsed(row, 7)?,
        kudos_count: row.get(8)?,
        created_at: parsed(row, 9)?,
    })
}

fn map_day(row: &Row<'_>) -> rusqlite::Result<DailyProgressRow> {
    Ok(DailyProgressRow {
        date: parsed(row, 0)?,
        minutes: row.get(1)?,
        goal_met: row.get(2)?,
        freeze_used: row.get(3)?,
    })
}
