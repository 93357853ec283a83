use axum::extract::State;
use chrono::Utc;
use serde::Deserialize;
use tracing::{debug, info};
use uuid::Uuid;

use folio_core::streak::local_date;
use folio_db::models::{LogSessionOutcome, NewSession, SessionRow};
use folio_types::api::{LogSessionRequest, LogSessionResponse, SessionResponse};
use folio_types::events::RealtimeEvent;

use crate::caller::Caller;
use crate::error::{ActionError, ActionResult, CreatedResult, blocking, created, ok};
use crate::extract::{Params, PathParam, Payload};
use crate::state::AppState;
use crate::streaks::streak_response;
use crate::validate;

pub async fn log(
    State(state): State<AppState>,
    caller: Caller,
    Payload(req): Payload<LogSessionRequest>,
) -> CreatedResult<LogSessionResponse> {
    caller.require_active()?;
    validate::session(&req, Utc::now())?;

    let new = NewSession {
        id: Uuid::new_v4(),
        user_id: caller.id(),
        book_id: req.book_id,
        duration_minutes: req.duration_minutes,
        started_at: req.started_at,
        ended_at: req.ended_at,
    };
    let db = state.db.clone();
    let logged = match blocking(move || db.log_session(&new)).await? {
        LogSessionOutcome::Logged(logged) => logged,
        LogSessionOutcome::BookNotFound => return Err(ActionError::NotFound("Book not found")),
    };

    info!(
        "{} logged {} minutes of {}",
        caller.user.username, logged.session.duration_minutes, logged.session.book_title
    );

    if let Some(update) = &logged.update {
        // Live only; the streak itself is the durable record.
        let event = RealtimeEvent::StreakUpdated {
            current: update.state.current,
            longest: update.state.longest,
            freezes_available: update.state.freezes_available,
        };
        let listeners = state.dispatcher.send_to_user(caller.id(), &event);
        debug!("Streak update for {} reached {} listeners", caller.id(), listeners);
    }

    // A session ending yesterday (local time) lands on yesterday's row.
    let today = local_date(Utc::now(), caller.user.utc_offset_minutes);
    let today_row = if logged.day.date == today {
        Some(logged.day.clone())
    } else {
        let db = state.db.clone();
        let user_id = caller.id();
        blocking(move || db.get_day(user_id, today)).await?
    };
    let streak = streak_response(&caller.user, &logged.streak, today, today_row.as_ref());
    created(LogSessionResponse {
        session: to_response(logged.session),
        streak,
    })
}

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    pub limit: Option<u32>,
}

/// The caller's own sessions, newest first.
pub async fn list(
    State(state): State<AppState>,
    caller: Caller,
    Params(query): Params<ListQuery>,
) -> ActionResult<Vec<SessionResponse>> {
    let limit = validate::limit(query.limit, 20, 100)?;
    let db = state.db.clone();
    let user_id = caller.id();
    let sessions = blocking(move || db.list_user_sessions(user_id, limit)).await?;
    ok(sessions.into_iter().map(to_response).collect())
}

pub async fn get(
    State(state): State<AppState>,
    _caller: Caller,
    PathParam(id): PathParam<Uuid>,
) -> ActionResult<SessionResponse> {
    let db = state.db.clone();
    let session = blocking(move || db.get_session(id))
        .await?
        .ok_or(ActionError::NotFound("Session not found"))?;
    ok(to_response(session))
}

pub(crate) fn to_response(s: SessionRow) -> SessionResponse {
    SessionResponse {
        id: s.id,
        user_id: s.user_id,
        username: s.username,
        book_id: s.book_id,
        book_title: s.book_title,
        duration_minutes: s.duration_minutes,
        started_at: s.started_at,
        ended_at: s.ended_at,
        kudos_count: s.kudos_count,
        created_at: s.created_at,
    }
}
