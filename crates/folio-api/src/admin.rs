use axum::extract::State;
use chrono::Utc;
use serde::Deserialize;
use tracing::info;
use uuid::Uuid;

use folio_db::models::{AdminActionRow, UserRow};
use folio_types::api::{AdminActionResponse, SetRoleRequest, UserStatusResponse};

use crate::caller::Caller;
use crate::error::{ActionError, ActionResult, blocking, ok};
use crate::extract::{Params, PathParam, Payload};
use crate::state::AppState;
use crate::validate;

#[derive(Debug, Deserialize)]
pub struct ActionsQuery {
    pub limit: Option<u32>,
}

/// The audit log, newest first.
pub async fn actions(
    State(state): State<AppState>,
    caller: Caller,
    Params(query): Params<ActionsQuery>,
) -> ActionResult<Vec<AdminActionResponse>> {
    caller.require_admin()?;
    let limit = validate::limit(query.limit, 50, 200)?;
    let db = state.db.clone();
    let rows = blocking(move || db.list_admin_actions(limit)).await?;
    ok(rows.into_iter().map(action_response).collect())
}

pub async fn unsuspend(
    State(state): State<AppState>,
    caller: Caller,
    PathParam(user_id): PathParam<Uuid>,
) -> ActionResult<UserStatusResponse> {
    caller.require_admin()?;

    let db = state.db.clone();
    let admin = caller.id();
    let user = blocking(move || {
        if !db.unsuspend_user(admin, user_id, Utc::now())? {
            return Ok(None);
        }
        db.get_user_by_id(user_id)
    })
    .await?
    .ok_or(ActionError::NotFound("User not found"))?;

    info!("{} lifted the suspension of {}", caller.user.username, user.username);
    ok(status_response(user))
}

pub async fn set_role(
    State(state): State<AppState>,
    caller: Caller,
    PathParam(user_id): PathParam<Uuid>,
    Payload(req): Payload<SetRoleRequest>,
) -> ActionResult<UserStatusResponse> {
    caller.require_super_admin()?;
    if user_id == caller.id() {
        return Err(ActionError::invalid("You cannot change your own role"));
    }

    let db = state.db.clone();
    let admin = caller.id();
    let (previous, user) = blocking(move || {
        let Some(previous) = db.set_role(admin, user_id, req.role, Utc::now())? else {
            return Ok(None);
        };
        Ok(db.get_user_by_id(user_id)?.map(|user| (previous, user)))
    })
    .await?
    .ok_or(ActionError::NotFound("User not found"))?;

    info!(
        "{} changed the role of {} from {} to {}",
        caller.user.username, user.username, previous, user.role
    );
    ok(status_response(user))
}

fn status_response(user: UserRow) -> UserStatusResponse {
    UserStatusResponse {
        id: user.id,
        username: user.username,
        role: user.role,
        suspended_until: user.suspended_until,
    }
}

fn action_response(row: AdminActionRow) -> AdminActionResponse {
    AdminActionResponse {
        id: row.id,
        admin_id: row.admin_id,
        action: row.action,
        target_type: row.target_type,
        target_id: row.target_id,
        details: serde_json::from_str(&row.details).unwrap_or(serde_json::Value::Null),
        created_at: row.created_at,
    }
}
