use anyhow::{Result, anyhow};
use chrono::{DateTime, Utc};
use rusqlite::{Connection, Row};
use uuid::Uuid;

use folio_core::stats::{VARIANTS, VariantCounts, assign_variant};

use super::{OptionalExt, parsed};
use crate::models::AssignmentRow;
use crate::{Database, ts};

impl Database {
    /// Enroll a user, or return the existing assignment unchanged.
    pub fn assign_experiment(&self, experiment: &str, user_id: Uuid, now: DateTime<Utc>) -> Result<AssignmentRow> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT OR IGNORE INTO experiment_assignments (experiment, user_id, variant, assigned_at)
                 VALUES (?1, ?2, ?3, ?4)",
                (experiment, user_id.to_string(), assign_variant(experiment, user_id), ts(now)),
            )?;
            query_assignment(conn, experiment, user_id)?
                .ok_or_else(|| anyhow!("assignment for {} in {} vanished", user_id, experiment))
        })
    }

    /// `None` when the user is not enrolled. Converting twice is a no-op.
    pub fn mark_converted(&self, experiment: &str, user_id: Uuid) -> Result<Option<AssignmentRow>> {
        self.with_tx(|tx| {
            tx.execute(
                "UPDATE experiment_assignments SET converted = 1 WHERE experiment = ?1 AND user_id = ?2",
                (experiment, user_id.to_string()),
            )?;
            query_assignment(tx, experiment, user_id)
        })
    }

    /// Totals per variant, in `VARIANTS` order, zero-filled.
    pub fn variant_counts(&self, experiment: &str) -> Result<Vec<VariantCounts>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT variant, COUNT(*), COALESCE(SUM(converted), 0)
                 FROM experiment_assignments
                 WHERE experiment = ?1
                 GROUP BY variant",
            )?;
            let found = stmt
                .query_map([experiment], |row| {
                    Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?, row.get::<_, i64>(2)?))
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;

            Ok(VARIANTS
                .iter()
                .map(|&name| {
                    let (participants, conversions) = found
                        .iter()
                        .find(|(variant, _, _)| variant == name)
                        .map(|(_, p, c)| (*p as u64, *c as u64))
                        .unwrap_or((0, 0));
                    VariantCounts {
                        name: name.to_string(),
                        participants,
                        conversions,
                    }
                })
                .collect())
        })
    }
}

fn query_assignment(conn: &Connection, experiment: &str, user_id: Uuid) -> Result<Option<AssignmentRow>> {
    conn.query_row(
        "SELECT experiment, user_id, variant, converted, assigned_at FROM experiment_assignments
         WHERE experiment = ?1 AND user_id = ?2",
        (experiment, user_id.to_string()),
        map_assignment,
    )
    .optional()
}

fn map_assignment(row: &Row<'_>) -> rusqlite::Result<AssignmentRow> {
    Ok(AssignmentRow {
        experiment: row.get(0)?,
        user_id: parsed(row, 1)?,
        variant: row.get(2)?,
        converted: row.get(3)?,
        assigned_at: parsed(row, 4)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queries::test_support::{at, user};

    #[test]
    fn assignment_is_stable() {
        let db = Database::open_in_memory().unwrap();
        let ada = user(&db, "ada");
        let first = db.assign_experiment("onboarding", ada, at("2026-06-01T10:00:00Z")).unwrap();
        let second = db.assign_experiment("onboarding", ada, at("2026-06-02T10:00:00Z")).unwrap();
        assert_eq!(first.variant, second.variant);
        assert_eq!(first.assigned_at, second.assigned_at);
        assert_eq!(first.variant, assign_variant("onboarding", ada));
    }

    #[test]
    fn conversion_requires_enrollment() {
        let db = Database::open_in_memory().unwrap();
        let ada = user(&db, "ada");
        assert!(db.mark_converted("onboarding", ada).unwrap().is_none());

        db.assign_experiment("onboarding", ada, at("2026-06-01T10:00:00Z")).unwrap();
        assert!(db.mark_converted("onboarding", ada).unwrap().unwrap().converted);
        assert!(db.mark_converted("onboarding", ada).unwrap().unwrap().converted);
    }

    #[test]
    fn counts_are_zero_filled() {
        let db = Database::open_in_memory().unwrap();
        let ada = user(&db, "ada");
        let assigned = db.assign_experiment("onboarding", ada, at("2026-06-01T10:00:00Z")).unwrap();
        db.mark_converted("onboarding", ada).unwrap();

        let counts = db.variant_counts("onboarding").unwrap();
        assert_eq!(counts.len(), 2);
        assert_eq!(counts[0].name, "control");
        let mine = counts.iter().find(|c| c.name == assigned.variant).unwrap();
        assert_eq!((mine.participants, mine.conversions), (1, 1));
        let other = counts.iter().find(|c| c.name != assigned.variant).unwrap();
        assert_eq!((other.participants, other.conversions), (0, 0));

        assert!(db.variant_counts("unknown").unwrap().iter().all(|c| c.participants == 0));
    }
}
