use axum::{body::Bytes, extract::State, http::HeaderMap};
use chrono::Utc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use folio_db::models::PaymentEvent;
use folio_types::api::{PaymentWebhookEvent, WebhookAck};
use folio_types::events::RealtimeEvent;

use crate::error::{ActionError, ActionResult, blocking, ok};
use crate::notifications::notify;
use crate::state::AppState;

const HEADER_ID: &str = "webhook-id";
const HEADER_TIMESTAMP: &str = "webhook-timestamp";
const HEADER_SIGNATURE: &str = "webhook-signature";

fn header<'a>(headers: &'a HeaderMap, name: &'static str) -> Result<&'a str, ActionError> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| {
            warn!("Payment webhook without {} header", name);
            ActionError::Unauthorized
        })
}

/// Payment provider callback. The raw body is verified before it is
/// parsed; redeliveries of a known checkout are acknowledged as duplicates.
pub async fn polar(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> ActionResult<WebhookAck> {
    let msg_id = header(&headers, HEADER_ID)?;
    let timestamp = header(&headers, HEADER_TIMESTAMP)?;
    let signature = header(&headers, HEADER_SIGNATURE)?;

    if let Err(e) = state
        .webhooks
        .verify(msg_id, timestamp, signature, &body, Utc::now())
    {
        warn!("Rejected payment webhook {}: {}", msg_id, e);
        return Err(ActionError::Unauthorized);
    }

    let event: PaymentWebhookEvent =
        serde_json::from_slice(&body).map_err(|_| ActionError::invalid("Invalid input"))?;

    let Some(payment) = payment_event(&event) else {
        debug!("Ignoring payment webhook of type {}", event.kind);
        return ok(WebhookAck {
            received: true,
            duplicate: false,
        });
    };

    let db = state.db.clone();
    let recorded = payment.clone();
    let outcome = blocking(move || db.record_payment(&recorded, Utc::now())).await?;

    info!(
        "Payment webhook {} for checkout {}: status {}{}",
        event.kind,
        outcome.payment.checkout_id,
        outcome.payment.status,
        if outcome.created { "" } else { " (redelivery)" }
    );

    if outcome.premium_activated {
        if let Some(user_id) = outcome.payment.user_id {
            let event = RealtimeEvent::PremiumActivated {
                checkout_id: outcome.payment.checkout_id.clone(),
            };
            notify(&state, user_id, event).await;
        }
    }

    ok(WebhookAck {
        received: true,
        duplicate: !outcome.created,
    })
}

/// Map a provider event onto a payment record; `None` for event types
/// that carry no payment state.
fn payment_event(event: &PaymentWebhookEvent) -> Option<PaymentEvent> {
    let data = &event.data;
    let (checkout_id, default_status) = match event.kind.as_str() {
        "checkout.updated" => (data.id.clone(), "open"),
        "order.paid" => (data.checkout_id.clone().unwrap_or_else(|| data.id.clone()), "paid"),
        "order.created" => (data.checkout_id.clone().unwrap_or_else(|| data.id.clone()), "open"),
        _ => return None,
    };

    let user_id = data
        .metadata
        .get("user_id")
        .and_then(|v| v.as_str())
        .and_then(|s| s.parse::<Uuid>().ok());

    Some(PaymentEvent {
        checkout_id,
        user_id,
        amount: data.amount.or(data.total_amount).unwrap_or(0),
        currency: data.currency.clone().unwrap_or_else(|| "usd".to_string()),
        status: data.status.clone().unwrap_or_else(|| default_status.to_string()),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(raw: &str) -> PaymentWebhookEvent {
        serde_json::from_str(raw).unwrap()
    }

    #[test]
    fn order_paid_prefers_checkout_id() {
        let user = Uuid::new_v4();
        let raw = format!(
            r#"{{"type":"order.paid","data":{{"id":"ord_1","checkout_id":"co_9","total_amount":900,"metadata":{{"user_id":"{user}"}}}}}}"#
        );
        let payment = payment_event(&event(&raw)).unwrap();
        assert_eq!(payment.checkout_id, "co_9");
        assert_eq!(payment.status, "paid");
        assert_eq!(payment.amount, 900);
        assert_eq!(payment.currency, "usd");
        assert_eq!(payment.user_id, Some(user));
    }

    #[test]
    fn checkout_updated_uses_own_id_and_status() {
        let payment = payment_event(&event(
            r#"{"type":"checkout.updated","data":{"id":"co_1","status":"succeeded","amount":500,"currency":"eur"}}"#,
        ))
        .unwrap();
        assert_eq!(payment.checkout_id, "co_1");
        assert_eq!(payment.status, "succeeded");
        assert_eq!(payment.currency, "eur");
        assert!(payment.user_id.is_none());
    }

    #[test]
    fn other_events_are_ignored() {
        assert!(payment_event(&event(r#"{"type":"subscription.created","data":{"id":"sub_1"}}"#)).is_none());
    }
}
