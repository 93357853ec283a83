use axum::extract::State;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use tracing::{debug, error};
use uuid::Uuid;

use folio_db::models::NotificationRow;
use folio_types::api::{MarkReadRequest, NotificationResponse};
use folio_types::events::RealtimeEvent;

use crate::caller::Caller;
use crate::error::{ActionResult, blocking, ok};
use crate::extract::{Params, Payload};
use crate::state::AppState;
use crate::validate;

/// Persist a notification for `user_id` and push it on their channel.
/// Failures are logged; the action that triggered it has already succeeded.
pub async fn notify(state: &AppState, user_id: Uuid, event: RealtimeEvent) {
    let payload = match serde_json::to_value(&event) {
        Ok(mut value) => value
            .get_mut("data")
            .map(serde_json::Value::take)
            .unwrap_or(serde_json::Value::Null),
        Err(e) => {
            error!("Failed to serialize {} notification: {}", event.kind(), e);
            return;
        }
    };

    let db = state.db.clone();
    let kind = event.kind();
    let stored = tokio::task::spawn_blocking(move || {
        db.insert_notification(user_id, kind, &payload, Utc::now())
    })
    .await;
    match stored {
        Ok(Ok(_)) => {}
        Ok(Err(e)) => error!("Failed to store {} notification for {}: {:#}", kind, user_id, e),
        Err(e) => error!("spawn_blocking join error: {}", e),
    }

    let listeners = state.dispatcher.send_to_user(user_id, &event);
    debug!("Sent {} to {} ({} listeners)", kind, user_id, listeners);
}

#[derive(Debug, Deserialize)]
pub struct NotificationQuery {
    pub since: Option<DateTime<Utc>>,
    pub limit: Option<u32>,
}

pub async fn list(
    State(state): State<AppState>,
    caller: Caller,
    Params(query): Params<NotificationQuery>,
) -> ActionResult<Vec<NotificationResponse>> {
    let limit = validate::limit(query.limit, 50, 100)?;
    let db = state.db.clone();
    let user_id = caller.id();
    let rows = blocking(move || db.list_notifications(user_id, query.since, limit)).await?;
    ok(rows.into_iter().map(to_response).collect())
}

pub async fn mark_read(
    State(state): State<AppState>,
    caller: Caller,
    Payload(req): Payload<MarkReadRequest>,
) -> ActionResult<usize> {
    caller.require_active()?;
    let db = state.db.clone();
    let user_id = caller.id();
    let changed = blocking(move || db.mark_notifications_read(user_id, &req.ids, Utc::now())).await?;
    ok(changed)
}

fn to_response(row: NotificationRow) -> NotificationResponse {
    NotificationResponse {
        id: row.id,
        kind: row.kind,
        payload: serde_json::from_str(&row.payload).unwrap_or(serde_json::Value::Null),
        created_at: row.created_at,
        read_at: row.read_at,
    }
}
