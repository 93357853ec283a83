use anyhow::Result;
use chrono::{DateTime, Utc};
use rusqlite::{Connection, Row};
use serde_json::json;
use uuid::Uuid;

use folio_types::models::{AdminActionKind, Role};

use super::{OptionalExt, insert_admin_action, is_unique_violation, parsed, parsed_opt};
use crate::models::{ProfileUpdate, UserRow};
use crate::{Database, ts};

const USER_COLUMNS: &str = "id, username, password, role, is_premium, bio, daily_goal_minutes, \
     utc_offset_minutes, suspended_until, deleted_at, created_at";

impl Database {
    /// Insert a user. Returns `false` when the username is taken.
    pub fn create_user(
        &self,
        id: Uuid,
        username: &str,
        password_hash: &str,
        role: Role,
    ) -> Result<bool> {
        let result = self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO users (id, username, password, role, created_at) VALUES (?1, ?2, ?3, ?4, ?5)",
                (id.to_string(), username, password_hash, role.as_str(), ts(Utc::now())),
            )?;
            Ok(())
        });

        match result {
            Ok(()) => Ok(true),
            Err(e) if is_unique_violation(&e) => Ok(false),
            Err(e) => Err(e),
        }
    }

    pub fn get_user_by_username(&self, username: &str) -> Result<Option<UserRow>> {
        self.with_conn(|conn| {
            conn.query_row(
                &format!("SELECT {USER_COLUMNS} FROM users WHERE username = ?1"),
                [username],
                map_user,
            )
            .optional()
        })
    }

    pub fn get_user_by_id(&self, id: Uuid) -> Result<Option<UserRow>> {
        self.with_conn(|conn| query_user(conn, id))
    }

    pub fn update_profile(&self, id: Uuid, update: &ProfileUpdate) -> Result<Option<UserRow>> {
        self.with_tx(|tx| {
            tx.execute(
                "UPDATE users SET
                    bio = CASE WHEN ?2 IS NULL THEN bio ELSE NULLIF(?2, '') END,
                    daily_goal_minutes = COALESCE(?3, daily_goal_minutes),
                    utc_offset_minutes = COALESCE(?4, utc_offset_minutes)
                 WHERE id = ?1 AND deleted_at IS NULL",
                rusqlite::params![
                    id.to_string(),
                    update.bio,
                    update.daily_goal_minutes,
                    update.utc_offset_minutes,
                ],
            )?;
            query_user(tx, id)
        })
    }

    /// Soft-delete an account; the bio goes with it. Returns `false` if the
    /// user does not exist or was already deleted.
    pub fn soft_delete_user(&self, id: Uuid, now: DateTime<Utc>) -> Result<bool> {
        self.with_conn(|conn| {
            let changed = conn.execute(
                "UPDATE users SET deleted_at = ?2, bio = NULL WHERE id = ?1 AND deleted_at IS NULL",
                (id.to_string(), ts(now)),
            )?;
            Ok(changed > 0)
        })
    }

    /// (followers, following)
    pub fn follow_counts(&self, id: Uuid) -> Result<(u32, u32)> {
        self.with_conn(|conn| {
            let id = id.to_string();
            let followers = conn.query_row(
                "SELECT COUNT(*) FROM follows f JOIN users u ON u.id = f.follower_id
                 WHERE f.following_id = ?1 AND u.deleted_at IS NULL",
                [&id],
                |r| r.get(0),
            )?;
            let following = conn.query_row(
                "SELECT COUNT(*) FROM follows f JOIN users u ON u.id = f.following_id
                 WHERE f.follower_id = ?1 AND u.deleted_at IS NULL",
                [&id],
                |r| r.get(0),
            )?;
            Ok((followers, following))
        })
    }

    /// Change a user's role and log it. Returns the previous role, or `None`
    /// when the user does not exist.
    pub fn set_role(
        &self,
        admin_id: Uuid,
        user_id: Uuid,
        role: Role,
        now: DateTime<Utc>,
    ) -> Result<Option<Role>> {
        self.with_tx(|tx| {
            let Some(user) = query_user(tx, user_id)? else {
                return Ok(None);
            };
            if user.is_deleted() {
                return Ok(None);
            }

            tx.execute(
                "UPDATE users SET role = ?2 WHERE id = ?1",
                (user_id.to_string(), role.as_str()),
            )?;
            insert_admin_action(
                tx,
                Some(admin_id),
                AdminActionKind::RoleChange,
                "user",
                &user_id.to_string(),
                &json!({ "from": user.role, "to": role }),
                now,
            )?;
            Ok(Some(user.role))
        })
    }

    /// Lift a suspension early. Returns `false` when the user does not exist.
    pub fn unsuspend_user(&self, admin_id: Uuid, user_id: Uuid, now: DateTime<Utc>) -> Result<bool> {
        self.with_tx(|tx| {
            let changed = tx.execute(
                "UPDATE users SET suspended_until = NULL WHERE id = ?1 AND deleted_at IS NULL",
                [user_id.to_string()],
            )?;
            if changed == 0 {
                return Ok(false);
            }
            insert_admin_action(
                tx,
                Some(admin_id),
                AdminActionKind::UserUnsuspend,
                "user",
                &user_id.to_string(),
                &json!({}),
                now,
            )?;
            Ok(true)
        })
    }
}

pub(crate) fn query_user(conn: &Connection, id: Uuid) -> Result<Option<UserRow>> {
    conn.query_row(
        &format!("SELECT {USER_COLUMNS} FROM users WHERE id = ?1"),
        [id.to_string()],
        map_user,
    )
    .optional()
}

fn map_user(row: &Row<'_>) -> rusqlite::Result<UserRow> {
    Ok(UserRow {
        id: parsed(row, 0)?,
        username: row.get(1)?,
        password: row.get(2)?,
        role: parsed(row, 3)?,
        is_premium: row.get(4)?,
        bio: row.get(5)?,
        daily_goal_minutes: row.get(6)?,
        utc_offset_minutes: row.get(7)?,
        suspended_until: parsed_opt(row, 8)?,
        deleted_at: parsed_opt(row, 9)?,
        created_at: parsed(row, 10)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queries::test_support::{at, user};

    #[test]
    fn usernames_are_unique_case_insensitively() {
        let db = Database::open_in_memory().unwrap();
        assert!(db.create_user(Uuid::new_v4(), "reader", "h", Role::User).unwrap());
        assert!(!db.create_user(Uuid::new_v4(), "Reader", "h", Role::User).unwrap());
    }

    #[test]
    fn profile_update_is_partial() {
        let db = Database::open_in_memory().unwrap();
        let id = user(&db, "ada");

        let updated = db
            .update_profile(
                id,
                &ProfileUpdate {
                    bio: Some("Loves Le Guin".into()),
                    daily_goal_minutes: Some(30),
                    utc_offset_minutes: None,
                },
            )
            .unwrap()
            .unwrap();
        assert_eq!(updated.bio.as_deref(), Some("Loves Le Guin"));
        assert_eq!(updated.daily_goal_minutes, 30);
        assert_eq!(updated.utc_offset_minutes, 0);

        let cleared = db
            .update_profile(
                id,
                &ProfileUpdate {
                    bio: Some(String::new()),
                    ..Default::default()
                },
            )
            .unwrap()
            .unwrap();
        assert_eq!(cleared.bio, None);
        assert_eq!(cleared.daily_goal_minutes, 30);
    }

    #[test]
    fn soft_delete_only_once() {
        let db = Database::open_in_memory().unwrap();
        let id = user(&db, "ada");
        let now = at("2026-02-01T10:00:00Z");

        assert!(db.soft_delete_user(id, now).unwrap());
        assert!(!db.soft_delete_user(id, now).unwrap());
        let row = db.get_user_by_id(id).unwrap().unwrap();
        assert_eq!(row.deleted_at, Some(now));
    }

    #[test]
    fn role_change_is_logged() {
        let db = Database::open_in_memory().unwrap();
        let admin = user(&db, "root");
        let target = user(&db, "ada");
        let now = at("2026-02-01T10:00:00Z");

        let previous = db.set_role(admin, target, Role::Admin, now).unwrap();
        assert_eq!(previous, Some(Role::User));
        assert_eq!(db.get_user_by_id(target).unwrap().unwrap().role, Role::Admin);

        let log = db.list_admin_actions(10).unwrap();
        assert_eq!(log.len(), 1);
        assert_eq!(log[0].action, "ROLE_CHANGE");
        assert_eq!(log[0].admin_id, Some(admin));

        assert_eq!(db.set_role(admin, Uuid::new_v4(), Role::Admin, now).unwrap(), None);
    }

    #[test]
    fn suspension_state() {
        let db = Database::open_in_memory().unwrap();
        let id = user(&db, "ada");
        let row = db.get_user_by_id(id).unwrap().unwrap();
        assert!(!row.is_suspended(Utc::now()));
        assert!(!row.is_deleted());
    }
}
