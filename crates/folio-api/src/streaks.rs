use axum::extract::State;
use chrono::{Duration, NaiveDate, Utc};
use serde::Deserialize;

use folio_core::streak::{StreakState, local_date};
use folio_db::models::{DailyProgressRow, UserRow};
use folio_types::api::{DailyProgressResponse, StreakResponse, TodayProgress};

use crate::caller::Caller;
use crate::error::{ActionError, ActionResult, blocking, ok};
use crate::extract::Params;
use crate::state::AppState;

const DEFAULT_PROGRESS_DAYS: u32 = 30;
const MAX_PROGRESS_DAYS: u32 = 90;

/// Streak as shown to the user on their local `today`.
pub fn streak_response(
    user: &UserRow,
    state: &StreakState,
    today: NaiveDate,
    today_row: Option<&DailyProgressRow>,
) -> StreakResponse {
    let minutes = today_row.map_or(0, |d| d.minutes);
    StreakResponse {
        current: state.effective_current(today),
        longest: state.longest,
        freezes_available: state.freezes_available,
        last_goal_date: state.last_goal_date,
        today: TodayProgress {
            date: today,
            minutes,
            goal_minutes: user.daily_goal_minutes,
            goal_met: today_row.is_some_and(|d| d.goal_met),
        },
    }
}

pub async fn streak(State(state): State<AppState>, caller: Caller) -> ActionResult<StreakResponse> {
    let today = local_date(Utc::now(), caller.user.utc_offset_minutes);
    let db = state.db.clone();
    let user_id = caller.id();
    let (streak, day) = blocking(move || Ok((db.get_streak(user_id)?, db.get_day(user_id, today)?))).await?;
    ok(streak_response(&caller.user, &streak, today, day.as_ref()))
}

#[derive(Debug, Deserialize)]
pub struct ProgressQuery {
    pub days: Option<u32>,
}

/// Daily rows for the last `days` local days, newest first. Days without
/// any reading are omitted.
pub async fn progress(
    State(state): State<AppState>,
    caller: Caller,
    Params(query): Params<ProgressQuery>,
) -> ActionResult<Vec<DailyProgressResponse>> {
    let days = query.days.unwrap_or(DEFAULT_PROGRESS_DAYS);
    if !(1..=MAX_PROGRESS_DAYS).contains(&days) {
        return Err(ActionError::invalid("Days must be between 1 and 90"));
    }

    let today = local_date(Utc::now(), caller.user.utc_offset_minutes);
    let since = today - Duration::days(i64::from(days) - 1);
    let db = state.db.clone();
    let user_id = caller.id();
    let rows = blocking(move || db.list_progress(user_id, since)).await?;

    ok(rows
        .into_iter()
        .map(|d| DailyProgressResponse {
            date: d.date,
            minutes: d.minutes,
            goal_met: d.goal_met,
            freeze_used: d.freeze_used,
        })
        .collect())
}
