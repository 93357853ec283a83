use axum::extract::State;
use chrono::Utc;
use tracing::info;
use uuid::Uuid;

use folio_core::streak::local_date;
use folio_db::models::ProfileUpdate;
use folio_types::api::{ProfileResponse, PublicProfileResponse, RemovedResponse, UpdateProfileRequest};

use crate::caller::Caller;
use crate::error::{ActionError, ActionResult, blocking, ok};
use crate::extract::{PathParam, Payload};
use crate::state::AppState;
use crate::validate;

pub async fn me(State(state): State<AppState>, caller: Caller) -> ActionResult<ProfileResponse> {
    let db = state.db.clone();
    let user_id = caller.id();
    let streak = blocking(move || db.get_streak(user_id)).await?;
    let today = local_date(Utc::now(), caller.user.utc_offset_minutes);
    let user = caller.user;

    ok(ProfileResponse {
        id: user.id,
        username: user.username,
        role: user.role,
        is_premium: user.is_premium,
        bio: user.bio,
        daily_goal_minutes: user.daily_goal_minutes,
        utc_offset_minutes: user.utc_offset_minutes,
        suspended_until: user.suspended_until,
        current_streak: streak.effective_current(today),
        longest_streak: streak.longest,
        created_at: user.created_at,
    })
}

pub async fn update(
    State(state): State<AppState>,
    caller: Caller,
    Payload(req): Payload<UpdateProfileRequest>,
) -> ActionResult<ProfileResponse> {
    caller.require_active()?;
    validate::profile(&req)?;

    let update = ProfileUpdate {
        bio: req.bio.map(|b| b.trim().to_string()),
        daily_goal_minutes: req.daily_goal_minutes,
        utc_offset_minutes: req.utc_offset_minutes,
    };
    let db = state.db.clone();
    let user_id = caller.id();
    let updated = blocking(move || db.update_profile(user_id, &update))
        .await?
        .ok_or(ActionError::Unauthorized)?;

    me(State(state), Caller { user: updated }).await
}

pub async fn delete(State(state): State<AppState>, caller: Caller) -> ActionResult<RemovedResponse> {
    let db = state.db.clone();
    let user_id = caller.id();
    let removed = blocking(move || db.soft_delete_user(user_id, Utc::now())).await?;
    info!("{} ({}) deleted their account", caller.user.username, user_id);
    ok(RemovedResponse { removed })
}

pub async fn public_profile(
    State(state): State<AppState>,
    caller: Caller,
    PathParam(id): PathParam<Uuid>,
) -> ActionResult<PublicProfileResponse> {
    let db = state.db.clone();
    let viewer = caller.id();
    let (user, streak, (followers, following), followed_by_me) = blocking(move || {
        let user = db.get_user_by_id(id)?;
        Ok((
            user,
            db.get_streak(id)?,
            db.follow_counts(id)?,
            db.is_following(viewer, id)?,
        ))
    })
    .await?;
    let user = user
        .filter(|u| !u.is_deleted())
        .ok_or(ActionError::NotFound("User not found"))?;

    let today = local_date(Utc::now(), user.utc_offset_minutes);
    ok(PublicProfileResponse {
        id: user.id,
        username: user.username,
        bio: user.bio,
        current_streak: streak.effective_current(today),
        longest_streak: streak.longest,
        followers,
        following,
        followed_by_me,
        created_at: user.created_at,
    })
}
