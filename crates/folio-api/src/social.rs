use axum::extract::State;
use chrono::Utc;
use serde::Deserialize;
use tracing::info;
use uuid::Uuid;

use folio_db::models::KudosOutcome;
use folio_types::api::{FollowResponse, KudosResponse, RemovedResponse, SessionResponse};
use folio_types::events::RealtimeEvent;

use crate::caller::Caller;
use crate::error::{ActionError, ActionResult, CreatedResult, blocking, created, ok};
use crate::extract::{Params, PathParam};
use crate::notifications::notify;
use crate::sessions;
use crate::state::AppState;
use crate::validate;

/// Following is idempotent; following someone twice is not an error.
pub async fn follow(
    State(state): State<AppState>,
    caller: Caller,
    PathParam(target): PathParam<Uuid>,
) -> ActionResult<FollowResponse> {
    caller.require_active()?;
    if target == caller.id() {
        return Err(ActionError::invalid("You cannot follow yourself"));
    }

    let db = state.db.clone();
    let follower = caller.id();
    let followed = blocking(move || {
        match db.get_user_by_id(target)? {
            Some(user) if !user.is_deleted() => {}
            _ => return Ok(None),
        }
        db.follow(follower, target).map(Some)
    })
    .await?
    .ok_or(ActionError::NotFound("User not found"))?;

    if followed {
        info!("{} followed {}", caller.user.username, target);
    }
    ok(FollowResponse { following: true })
}

pub async fn unfollow(
    State(state): State<AppState>,
    caller: Caller,
    PathParam(target): PathParam<Uuid>,
) -> ActionResult<FollowResponse> {
    caller.require_active()?;

    let db = state.db.clone();
    let follower = caller.id();
    blocking(move || db.unfollow(follower, target)).await?;
    ok(FollowResponse { following: false })
}

#[derive(Debug, Deserialize)]
pub struct FeedQuery {
    pub limit: Option<u32>,
}

/// Recent sessions from followed users, newest first.
pub async fn feed(
    State(state): State<AppState>,
    caller: Caller,
    Params(query): Params<FeedQuery>,
) -> ActionResult<Vec<SessionResponse>> {
    let limit = validate::limit(query.limit, 20, 100)?;
    let db = state.db.clone();
    let user_id = caller.id();
    let sessions = blocking(move || db.feed(user_id, limit)).await?;
    ok(sessions.into_iter().map(sessions::to_response).collect())
}

pub async fn give_kudos(
    State(state): State<AppState>,
    caller: Caller,
    PathParam(session_id): PathParam<Uuid>,
) -> CreatedResult<KudosResponse> {
    caller.require_active()?;

    let db = state.db.clone();
    let giver = caller.id();
    let outcome = blocking(move || db.give_kudos(Uuid::new_v4(), giver, session_id, Utc::now())).await?;
    let kudos = match outcome {
        KudosOutcome::Given(kudos) => kudos,
        KudosOutcome::SessionNotFound => return Err(ActionError::NotFound("Session not found")),
        KudosOutcome::OwnSession => {
            return Err(ActionError::invalid("You cannot give kudos to your own session"));
        }
        KudosOutcome::Duplicate => {
            return Err(ActionError::Conflict("You have already given kudos for this session"));
        }
    };

    notify(
        &state,
        kudos.receiver_id,
        RealtimeEvent::KudosReceived {
            kudos_id: kudos.id,
            session_id: kudos.session_id,
            from_user_id: giver,
            from_username: caller.user.username.clone(),
        },
    )
    .await;

    created(KudosResponse {
        id: kudos.id,
        session_id: kudos.session_id,
        giver_id: kudos.giver_id,
        receiver_id: kudos.receiver_id,
        created_at: kudos.created_at,
    })
}

pub async fn remove_kudos(
    State(state): State<AppState>,
    caller: Caller,
    PathParam(session_id): PathParam<Uuid>,
) -> ActionResult<RemovedResponse> {
    caller.require_active()?;

    let db = state.db.clone();
    let giver = caller.id();
    let removed = blocking(move || db.remove_kudos(giver, session_id)).await?;
    ok(RemovedResponse { removed })
}
