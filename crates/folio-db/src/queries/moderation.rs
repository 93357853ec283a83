use anyhow::{Result, anyhow};
use chrono::{DateTime, Duration, Utc};
use rusqlite::{Connection, Row};
use serde_json::json;
use tracing::debug;
use uuid::Uuid;

use folio_core::moderation::{RESTORE_WINDOW_HOURS, ReviewPlan, can_review, check_restore, suspension_end};
use folio_types::models::{AdminActionKind, ContentType, ModerationStatus, ReviewAction};

use super::{OptionalExt, insert_admin_action, is_unique_violation, parsed, parsed_opt};
use crate::models::{
    AdminActionRow, ContentRemovalRow, FlagOutcome, ModerationItemRow, NewFlag, RestoreOutcome,
    ReviewOutcome,
};
use crate::{Database, ts};

const ITEM_SELECT: &str = "SELECT m.id, m.content_type, m.content_id, m.reporter_id, m.reported_user_id,
        m.reason, m.details, m.status, m.reviewer_id, m.review_notes, m.reviewed_at, m.created_at,
        substr(CASE m.content_type
            WHEN 'USER_BIO' THEN (SELECT bio FROM users WHERE id = m.content_id)
            WHEN 'ROOM_DESCRIPTION' THEN (SELECT description FROM rooms WHERE id = m.content_id)
        END, 1, 200)
     FROM moderation_items m";

const REMOVAL_COLUMNS: &str = "id, moderation_item_id, content_type, content_id, user_id, original_content, \
     violation_type, removed_by, removed_at, restored_at, restored_by";

/// Owner and current text of a piece of flaggable content. `None` when it
/// does not exist or its owner (user or room) is deleted.
struct ContentRef {
    owner_id: Uuid,
    text: Option<String>,
}

impl Database {
    pub fn flag_content(&self, flag: &NewFlag, now: DateTime<Utc>) -> Result<FlagOutcome> {
        let result = self.with_tx(|tx| {
            let Some(content) = resolve_content(tx, flag.content_type, flag.content_id)? else {
                return Ok(FlagOutcome::ContentNotFound);
            };
            if content.owner_id == flag.reporter_id {
                return Ok(FlagOutcome::OwnContent);
            }

            tx.execute(
                "INSERT INTO moderation_items
                    (id, content_type, content_id, reporter_id, reported_user_id, reason, details, status, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, 'PENDING', ?8)",
                rusqlite::params![
                    flag.id.to_string(),
                    flag.content_type.as_str(),
                    flag.content_id.to_string(),
                    flag.reporter_id.to_string(),
                    content.owner_id.to_string(),
                    flag.reason,
                    flag.details,
                    ts(now),
                ],
            )?;

            let item = query_item(tx, flag.id)?
                .ok_or_else(|| anyhow!("moderation item {} vanished after insert", flag.id))?;
            Ok(FlagOutcome::Flagged(item))
        });

        // The unique (reporter, content) constraint is what enforces one
        // report per reporter, even under concurrent requests.
        match result {
            Err(e) if is_unique_violation(&e) => Ok(FlagOutcome::Duplicate),
            other => other,
        }
    }

    /// Queue listing, oldest first so reviewers work in arrival order.
    pub fn list_moderation_items(
        &self,
        status: Option<ModerationStatus>,
        limit: u32,
        offset: u32,
    ) -> Result<Vec<ModerationItemRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!(
                "{ITEM_SELECT}
                 WHERE ?1 IS NULL OR m.status = ?1
                 ORDER BY m.created_at ASC
                 LIMIT ?2 OFFSET ?3"
            ))?;
            let rows = stmt
                .query_map(
                    rusqlite::params![status.map(|s| s.as_str()), limit, offset],
                    map_item,
                )?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    /// Apply a review. Every rejection is decided before the first write;
    /// the status update itself only matches PENDING rows, so of two
    /// racing reviewers exactly one wins.
    pub fn review_item(
        &self,
        item_id: Uuid,
        reviewer_id: Uuid,
        plan: &ReviewPlan,
        notes: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<ReviewOutcome> {
        self.with_tx(|tx| {
            let Some(item) = query_item(tx, item_id)? else {
                return Ok(ReviewOutcome::NotFound);
            };
            if !can_review(item.status) {
                return Ok(ReviewOutcome::AlreadyReviewed);
            }

            let content = if plan.action == ReviewAction::Remove {
                match resolve_content(tx, item.content_type, item.content_id)? {
                    Some(content) => Some(content),
                    None => return Ok(ReviewOutcome::ContentNotFound),
                }
            } else {
                None
            };

            let changed = tx.execute(
                "UPDATE moderation_items
                 SET status = ?2, reviewer_id = ?3, review_notes = ?4, reviewed_at = ?5
                 WHERE id = ?1 AND status = 'PENDING'",
                rusqlite::params![
                    item_id.to_string(),
                    plan.status.as_str(),
                    reviewer_id.to_string(),
                    notes,
                    ts(now),
                ],
            )?;
            if changed == 0 {
                return Ok(ReviewOutcome::AlreadyReviewed);
            }

            let mut removal = None;
            let mut suspended_until = None;

            match plan.action {
                ReviewAction::Dismiss | ReviewAction::Warn => {}
                ReviewAction::Remove => {
                    let violation = plan
                        .violation_type
                        .ok_or_else(|| anyhow!("remove plan without a violation type"))?;
                    let original = content.and_then(|c| c.text);
                    let removal_id = Uuid::new_v4();

                    tx.execute(
                        "INSERT INTO content_removals
                            (id, moderation_item_id, content_type, content_id, user_id,
                             original_content, violation_type, removed_by, removed_at)
                         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
                        rusqlite::params![
                            removal_id.to_string(),
                            item_id.to_string(),
                            item.content_type.as_str(),
                            item.content_id.to_string(),
                            item.reported_user_id.to_string(),
                            original,
                            violation.as_str(),
                            reviewer_id.to_string(),
                            ts(now),
                        ],
                    )?;
                    write_content(tx, item.content_type, item.content_id, None)?;
                    removal = query_removal(tx, removal_id)?;
                }
                ReviewAction::Suspend => {
                    let days = plan
                        .suspend_days
                        .ok_or_else(|| anyhow!("suspend plan without a duration"))?;
                    let until = suspension_end(now, days);
                    tx.execute(
                        "UPDATE users SET suspended_until = ?2 WHERE id = ?1",
                        (item.reported_user_id.to_string(), ts(until)),
                    )?;
                    suspended_until = Some(until);
                }
            }

            insert_admin_action(
                tx,
                Some(reviewer_id),
                plan.audit,
                "moderation_item",
                &item_id.to_string(),
                &json!({
                    "content_type": item.content_type,
                    "content_id": item.content_id,
                    "reported_user_id": item.reported_user_id,
                    "notes": notes,
                    "violation_type": plan.violation_type,
                    "suspend_days": plan.suspend_days,
                    "removal_id": removal.as_ref().map(|r| r.id),
                }),
                now,
            )?;

            let item = query_item(tx, item_id)?
                .ok_or_else(|| anyhow!("moderation item {} vanished during review", item_id))?;
            debug!("Reviewed moderation item {} as {}", item_id, item.status);

            Ok(ReviewOutcome::Reviewed {
                item,
                removal,
                suspended_until,
            })
        })
    }

    /// Removals newest first. With `restorable_only`, just those still
    /// inside the restore window and not yet restored.
    pub fn list_removals(&self, restorable_only: bool, now: DateTime<Utc>) -> Result<Vec<ContentRemovalRow>> {
        let cutoff = ts(now - Duration::hours(RESTORE_WINDOW_HOURS));
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {REMOVAL_COLUMNS} FROM content_removals
                 WHERE ?1 = 0 OR (restored_at IS NULL AND removed_at >= ?2)
                 ORDER BY removed_at DESC"
            ))?;
            let rows = stmt
                .query_map(rusqlite::params![restorable_only, cutoff], map_removal)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    /// Put removed content back and send the item back to the queue.
    pub fn restore_content(&self, removal_id: Uuid, admin_id: Uuid, now: DateTime<Utc>) -> Result<RestoreOutcome> {
        self.with_tx(|tx| {
            let Some(removal) = query_removal(tx, removal_id)? else {
                return Ok(RestoreOutcome::NotFound);
            };
            if let Err(rejection) = check_restore(removal.removed_at, removal.restored_at, now) {
                return Ok(RestoreOutcome::Rejected(rejection));
            }
            if resolve_content(tx, removal.content_type, removal.content_id)?.is_none() {
                return Ok(RestoreOutcome::ContentGone);
            }

            write_content(
                tx,
                removal.content_type,
                removal.content_id,
                removal.original_content.as_deref(),
            )?;
            tx.execute(
                "UPDATE content_removals SET restored_at = ?2, restored_by = ?3 WHERE id = ?1",
                (removal_id.to_string(), ts(now), admin_id.to_string()),
            )?;
            tx.execute(
                "UPDATE moderation_items
                 SET status = 'PENDING', reviewer_id = NULL, review_notes = NULL, reviewed_at = NULL
                 WHERE id = ?1",
                [removal.moderation_item_id.to_string()],
            )?;
            insert_admin_action(
                tx,
                Some(admin_id),
                AdminActionKind::ContentRestore,
                "content_removal",
                &removal_id.to_string(),
                &json!({
                    "moderation_item_id": removal.moderation_item_id,
                    "content_type": removal.content_type,
                    "content_id": removal.content_id,
                }),
                now,
            )?;

            let removal = query_removal(tx, removal_id)?
                .ok_or_else(|| anyhow!("removal {} vanished during restore", removal_id))?;
            let item = query_item(tx, removal.moderation_item_id)?
                .ok_or_else(|| anyhow!("moderation item {} missing", removal.moderation_item_id))?;
            Ok(RestoreOutcome::Restored { removal, item })
        })
    }

    /// Audit log, newest first.
    pub fn list_admin_actions(&self, limit: u32) -> Result<Vec<AdminActionRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, admin_id, action, target_type, target_id, details, created_at
                 FROM admin_actions
                 ORDER BY created_at DESC, rowid DESC
                 LIMIT ?1",
            )?;
            let rows = stmt
                .query_map([limit], |row| {
                    Ok(AdminActionRow {
                        id: parsed(row, 0)?,
                        admin_id: parsed_opt(row, 1)?,
                        action: row.get(2)?,
                        target_type: row.get(3)?,
                        target_id: row.get(4)?,
                        details: row.get(5)?,
                        created_at: parsed(row, 6)?,
                    })
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }
}

fn resolve_content(conn: &Connection, content_type: ContentType, content_id: Uuid) -> Result<Option<ContentRef>> {
    let sql = match content_type {
        ContentType::UserBio => "SELECT id, bio FROM users WHERE id = ?1 AND deleted_at IS NULL",
        ContentType::RoomDescription => {
            "SELECT owner_id, description FROM rooms WHERE id = ?1 AND deleted_at IS NULL"
        }
    };
    conn.query_row(sql, [content_id.to_string()], |row| {
        Ok(ContentRef {
            owner_id: parsed(row, 0)?,
            text: row.get(1)?,
        })
    })
    .optional()
}

/// Overwrite the moderated text. `None` clears it.
fn write_content(
    conn: &Connection,
    content_type: ContentType,
    content_id: Uuid,
    text: Option<&str>,
) -> Result<()> {
    let sql = match content_type {
        ContentType::UserBio => "UPDATE users SET bio = ?2 WHERE id = ?1",
        ContentType::RoomDescription => "UPDATE rooms SET description = ?2 WHERE id = ?1",
    };
    conn.execute(sql, rusqlite::params![content_id.to_string(), text])?;
    Ok(())
}

fn query_item(conn: &Connection, id: Uuid) -> Result<Option<ModerationItemRow>> {
    conn.query_row(
        &format!("{ITEM_SELECT} WHERE m.id = ?1"),
        [id.to_string()],
        map_item,
    )
    .optional()
}

fn query_removal(conn: &Connection, id: Uuid) -> Result<Option<ContentRemovalRow>> {
    conn.query_row(
        &format!("SELECT {REMOVAL_COLUMNS} FROM content_removals WHERE id = ?1"),
        [id.to_string()],
        map_removal,
    )
    .optional()
}

fn map_item(row: &Row<'_>) -> rusqlite::Result<ModerationItemRow> {
    Ok(ModerationItemRow {
        id: parsed(row, 0)?,
        content_type: parsed(row, 1)?,
        content_id: parsed(row, 2)?,
        reporter_id: parsed(row, 3)?,
        reported_user_id: parsed(row, 4)?,
        reason: row.get(5)?,
        details: row.get(6)?,
        status: parsed(row, 7)?,
        reviewer_id: parsed_opt(row, 8)?,
        review_notes: row.get(9)?,
        reviewed_at: parsed_opt(row, 10)?,
        created_at: parsed(row, 11)?,
        content_preview: row.get(12)?,
    })
}

fn map_removal(row: &Row<'_>) -> rusqlite::Result<ContentRemovalRow> {
    Ok(ContentRemovalRow {
        id: parsed(row, 0)?,
        moderation_item_id: parsed(row, 1)?,
        content_type: parsed(row, 2)?,
        content_id: parsed(row, 3)?,
        user_id: parsed(row, 4)?,
        original_content: row.get(5)?,
        violation_type: parsed(row, 6)?,
        removed_by: parsed(row, 7)?,
        removed_at: parsed(row, 8)?,
        restored_at: parsed_opt(row, 9)?,
        restored_by: parsed_opt(row, 10)?,
    })
}
