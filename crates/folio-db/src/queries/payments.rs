use anyhow::{Result, anyhow};
use chrono::{DateTime, Utc};
use rusqlite::{Connection, Row};
use serde_json::json;
use tracing::{info, warn};
use uuid::Uuid;

use folio_core::webhook::is_paid_status;
use folio_types::models::AdminActionKind;

use super::users::query_user;
use super::{OptionalExt, insert_admin_action, parsed, parsed_opt};
use crate::models::{PaymentEvent, PaymentOutcome, PaymentRow};
use crate::{Database, ts};

const PAYMENT_COLUMNS: &str =
    "id, checkout_id, user_id, amount, currency, status, created_at, updated_at";

impl Database {
    /// Record a checkout event. Idempotent on the checkout id: a redelivery
    /// only updates the status. Premium is granted once per checkout: when
    /// it is paid and linked to a user for the first time.
    pub fn record_payment(&self, event: &PaymentEvent, now: DateTime<Utc>) -> Result<PaymentOutcome> {
        self.with_tx(|tx| {
            let existing = query_payment(tx, &event.checkout_id)?;
            let was_paid = existing.as_ref().is_some_and(|p| is_paid_status(&p.status));
            let had_user = existing.as_ref().is_some_and(|p| p.user_id.is_some());
            let created = existing.is_none();

            // Unknown or deleted users are dropped so the payment itself is
            // still recorded and redeliveries keep succeeding.
            let user_id = match event.user_id {
                Some(id) => match query_user(tx, id)? {
                    Some(user) if !user.is_deleted() => Some(id),
                    _ => {
                        warn!("Checkout {} names unknown user {}", event.checkout_id, id);
                        None
                    }
                },
                None => None,
            };

            match &existing {
                None => {
                    tx.execute(
                        "INSERT INTO payments (id, checkout_id, user_id, amount, currency, status, created_at, updated_at)
                         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?7)",
                        rusqlite::params![
                            Uuid::new_v4().to_string(),
                            event.checkout_id,
                            user_id.map(|id| id.to_string()),
                            event.amount,
                            event.currency,
                            event.status,
                            ts(now),
                        ],
                    )?;
                }
                Some(_) => {
                    // A later event may be the first to carry the user id.
                    tx.execute(
                        "UPDATE payments SET status = ?2, user_id = COALESCE(user_id, ?3), updated_at = ?4
                         WHERE checkout_id = ?1",
                        rusqlite::params![
                            event.checkout_id,
                            event.status,
                            user_id.map(|id| id.to_string()),
                            ts(now),
                        ],
                    )?;
                }
            }

            let payment = query_payment(tx, &event.checkout_id)?
                .ok_or_else(|| anyhow!("payment {} vanished after write", event.checkout_id))?;

            let mut premium_activated = false;
            // Activate on the move into a paid state, or when a paid
            // checkout is first linked to a user.
            let activates = !(was_paid && had_user);
            if activates && is_paid_status(&payment.status) {
                if let Some(user_id) = payment.user_id {
                    let changed = tx.execute(
                        "UPDATE users SET is_premium = 1 WHERE id = ?1 AND deleted_at IS NULL",
                        [user_id.to_string()],
                    )?;
                    if changed > 0 {
                        insert_admin_action(
                            tx,
                            None,
                            AdminActionKind::PremiumActivated,
                            "user",
                            &user_id.to_string(),
                            &json!({
                                "checkout_id": payment.checkout_id,
                                "amount": payment.amount,
                                "currency": payment.currency,
                            }),
                            now,
                        )?;
                        premium_activated = true;
                        info!("Premium activated for user {} (checkout {})", user_id, payment.checkout_id);
                    }
                }
            }

            Ok(PaymentOutcome {
                payment,
                created,
                premium_activated,
            })
        })
    }
}

fn query_payment(conn: &Connection, checkout_id: &str) -> Result<Option<PaymentRow>> {
    conn.query_row(
        &format!("SELECT {PAYMENT_COLUMNS} FROM payments WHERE checkout_id = ?1"),
        [checkout_id],
        map_payment,
    )
    .optional()
}

fn map_payment(row: &Row<'_>) -> rusqlite::Result<PaymentRow> {
    Ok(PaymentRow {
        id: parsed(row, 0)?,
        checkout_id: row.get(1)?,
        user_id: parsed_opt(row, 2)?,
        amount: row.get(3)?,
        currency: row.get(4)?,
        status: row.get(5)?,
        created_at: parsed(row, 6)?,
        updated_at: parsed(row, 7)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queries::test_support::{at, user};

    fn event(user_id: Option<Uuid>, status: &str) -> PaymentEvent {
        PaymentEvent {
            checkout_id: "chk_123".into(),
            user_id,
            amount: 999,
            currency: "usd".into(),
            status: status.into(),
        }
    }

    fn stored(db: &Database) -> PaymentRow {
        db.with_conn(|conn| query_payment(conn, "chk_123"))
            .unwrap()
            .expect("payment row")
    }

    #[test]
    fn redelivery_is_idempotent() {
        let db = Database::open_in_memory().unwrap();
        let buyer = user(&db, "ada");
        let now = at("2026-05-01T10:00:00Z");

        let first = db.record_payment(&event(Some(buyer), "succeeded"), now).unwrap();
        assert!(first.created);
        assert!(first.premium_activated);
        assert!(db.get_user_by_id(buyer).unwrap().unwrap().is_premium);

        let again = db.record_payment(&event(Some(buyer), "succeeded"), now).unwrap();
        assert!(!again.created);
        assert!(!again.premium_activated);
        assert_eq!(again.payment.id, first.payment.id);

        let activations = db
            .list_admin_actions(10)
            .unwrap()
            .into_iter()
            .filter(|a| a.action == "PREMIUM_ACTIVATED")
            .count();
        assert_eq!(activations, 1);
    }

    #[test]
    fn open_checkout_activates_on_transition() {
        let db = Database::open_in_memory().unwrap();
        let buyer = user(&db, "ada");
        let now = at("2026-05-01T10:00:00Z");

        let open = db.record_payment(&event(Some(buyer), "open"), now).unwrap();
        assert!(!open.premium_activated);
        assert!(!db.get_user_by_id(buyer).unwrap().unwrap().is_premium);

        let paid = db.record_payment(&event(Some(buyer), "confirmed"), now).unwrap();
        assert!(paid.premium_activated);
        assert_eq!(stored(&db).status, "confirmed");
    }

    #[test]
    fn unlinked_payment_is_stored_without_activation() {
        let db = Database::open_in_memory().unwrap();
        let outcome = db
            .record_payment(&event(None, "succeeded"), at("2026-05-01T10:00:00Z"))
            .unwrap();
        assert!(outcome.created);
        assert!(!outcome.premium_activated);
        assert_eq!(outcome.payment.user_id, None);
        let log = db.list_admin_actions(10).unwrap();
        assert!(log.is_empty());
    }

    #[test]
    fn late_user_link_activates_paid_checkout() {
        let db = Database::open_in_memory().unwrap();
        let buyer = user(&db, "ada");
        let now = at("2026-05-01T10:00:00Z");

        db.record_payment(&event(None, "succeeded"), now).unwrap();
        let linked = db.record_payment(&event(Some(buyer), "succeeded"), now).unwrap();
        assert!(!linked.created);
        assert!(linked.premium_activated);
        assert_eq!(linked.payment.user_id, Some(buyer));
    }

    #[test]
    fn unknown_user_is_dropped_but_payment_stored() {
        let db = Database::open_in_memory().unwrap();
        let now = at("2026-05-01T10:00:00Z");

        let outcome = db
            .record_payment(&event(Some(Uuid::new_v4()), "succeeded"), now)
            .unwrap();
        assert!(outcome.created);
        assert!(!outcome.premium_activated);
        assert_eq!(outcome.payment.user_id, None);

        let again = db
            .record_payment(&event(Some(Uuid::new_v4()), "succeeded"), now)
            .unwrap();
        assert!(!again.created);
        assert_eq!(stored(&db).id, outcome.payment.id);
    }
}
