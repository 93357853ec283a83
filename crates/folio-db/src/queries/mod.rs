mod experiments;
mod moderation;
mod notifications;
mod payments;
mod reading;
mod rooms;
mod social;
mod users;

use std::str::FromStr;

use anyhow::Result;
use chrono::{DateTime, Utc};
use rusqlite::types::Type;
use rusqlite::{Connection, Row, ffi};
use uuid::Uuid;

use folio_types::models::AdminActionKind;

use crate::ts;

/// Extension trait for optional query results
pub(crate) trait OptionalExt<T> {
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

/// True when `err` (or the rusqlite error behind it) is a UNIQUE/PK conflict.
/// Other constraint failures (foreign keys, CHECK, NOT NULL) are not.
pub fn is_unique_violation(err: &anyhow::Error) -> bool {
    matches!(
        err.downcast_ref::<rusqlite::Error>(),
        Some(rusqlite::Error::SqliteFailure(e, _))
            if e.extended_code == ffi::SQLITE_CONSTRAINT_UNIQUE
                || e.extended_code == ffi::SQLITE_CONSTRAINT_PRIMARYKEY
    )
}

/// Read a TEXT column and parse it (uuids, enums, timestamps, dates).
pub(crate) fn parsed<T>(row: &Row<'_>, idx: usize) -> rusqlite::Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    let raw: String = row.get(idx)?;
    raw.parse()
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

pub(crate) fn parsed_opt<T>(row: &Row<'_>, idx: usize) -> rusqlite::Result<Option<T>>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    let raw: Option<String> = row.get(idx)?;
    raw.map(|r| {
        r.parse()
            .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
    })
    .transpose()
}

/// Append a row to the audit log. `admin_id` is `None` for system actions.
pub(crate) fn insert_admin_action(
    conn: &Connection,
    admin_id: Option<Uuid>,
    kind: AdminActionKind,
    target_type: &str,
    target_id: &str,
    details: &serde_json::Value,
    now: DateTime<Utc>,
) -> Result<()> {
    conn.execute(
        "INSERT INTO admin_actions (id, admin_id, action, target_type, target_id, details, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        rusqlite::params![
            Uuid::new_v4().to_string(),
            admin_id.map(|id| id.to_string()),
            kind.as_str(),
            target_type,
            target_id,
            details.to_string(),
            ts(now),
        ],
    )?;
    Ok(())
}

#[cfg(test)]
pub(crate) mod test_support {
    use chrono::{DateTime, Utc};
    use uuid::Uuid;

    use folio_types::models::Role;

    use crate::Database;

    pub fn at(s: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(s).unwrap().with_timezone(&Utc)
    }

    pub fn user(db: &Database, name: &str) -> Uuid {
        user_with_role(db, name, Role::User)
    }

    pub fn user_with_role(db: &Database, name: &str, role: Role) -> Uuid {
        let id = Uuid::new_v4();
        assert!(db.create_user(id, name, "hash", role).unwrap());
        id
    }
}
