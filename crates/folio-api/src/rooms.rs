use axum::extract::State;
use tracing::info;
use uuid::Uuid;

use folio_db::models::RoomRow;
use folio_types::api::{CreateRoomRequest, RoomResponse, UpdateRoomRequest};

use crate::caller::Caller;
use crate::error::{ActionError, ActionResult, CreatedResult, blocking, created, ok};
use crate::extract::{PathParam, Payload};
use crate::state::AppState;
use crate::validate;

pub async fn create(
    State(state): State<AppState>,
    caller: Caller,
    Payload(req): Payload<CreateRoomRequest>,
) -> CreatedResult<RoomResponse> {
    caller.require_active()?;
    validate::room_name(&req.name)?;
    if let Some(description) = &req.description {
        validate::description(description)?;
    }

    let db = state.db.clone();
    let owner = caller.id();
    let room = blocking(move || {
        let description = req.description.as_deref().map(str::trim).filter(|d| !d.is_empty());
        db.create_room(Uuid::new_v4(), owner, req.name.trim(), description)
    })
    .await?;

    info!("{} created room {} ({})", caller.user.username, room.name, room.id);
    created(to_response(room))
}

pub async fn get(
    State(state): State<AppState>,
    _caller: Caller,
    PathParam(id): PathParam<Uuid>,
) -> ActionResult<RoomResponse> {
    let db = state.db.clone();
    let room = blocking(move || db.get_room(id))
        .await?
        .filter(|r| r.deleted_at.is_none())
        .ok_or(ActionError::NotFound("Room not found"))?;
    ok(to_response(room))
}

/// Only the owner may edit. An empty description clears it.
pub async fn update(
    State(state): State<AppState>,
    caller: Caller,
    PathParam(id): PathParam<Uuid>,
    Payload(req): Payload<UpdateRoomRequest>,
) -> ActionResult<RoomResponse> {
    caller.require_active()?;
    validate::description(&req.description)?;

    let db = state.db.clone();
    let room = blocking(move || db.get_room(id))
        .await?
        .filter(|r| r.deleted_at.is_none())
        .ok_or(ActionError::NotFound("Room not found"))?;
    if room.owner_id != caller.id() {
        return Err(ActionError::Forbidden);
    }

    let db = state.db.clone();
    let room = blocking(move || db.update_room_description(id, req.description.trim()))
        .await?
        .ok_or(ActionError::NotFound("Room not found"))?;
    ok(to_response(room))
}

fn to_response(room: RoomRow) -> RoomResponse {
    RoomResponse {
        id: room.id,
        name: room.name,
        description: room.description,
        owner_id: room.owner_id,
        created_at: room.created_at,
    }
}
