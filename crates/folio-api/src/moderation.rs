use axum::extract::State;
use chrono::Utc;
use serde::Deserialize;
use tracing::{info, warn};
use uuid::Uuid;

use folio_core::moderation::{RestoreRejection, plan_review, restore_window_open};
use folio_db::models::{
    ContentRemovalRow, FlagOutcome, ModerationItemRow, NewFlag, RestoreOutcome, ReviewOutcome,
};
use folio_types::api::{
    ContentRemovalResponse, FlagContentRequest, ModerationItemResponse, ReviewRequest,
    ReviewResponse,
};
use folio_types::events::RealtimeEvent;
use folio_types::models::{ModerationStatus, ReviewAction};

use crate::caller::Caller;
use crate::error::{ActionError, ActionResult, CreatedResult, blocking, created, ok};
use crate::extract::{Params, PathParam, Payload};
use crate::notifications::notify;
use crate::state::AppState;
use crate::validate;

/// Report a user bio or room description.
pub async fn flag(
    State(state): State<AppState>,
    caller: Caller,
    Payload(req): Payload<FlagContentRequest>,
) -> CreatedResult<ModerationItemResponse> {
    caller.require_active()?;
    validate::flag_reason(&req.reason, req.details.as_deref())?;

    let new = NewFlag {
        id: Uuid::new_v4(),
        reporter_id: caller.id(),
        content_type: req.content_type,
        content_id: req.content_id,
        reason: req.reason.trim().to_string(),
        details: req.details.map(|d| d.trim().to_string()).filter(|d| !d.is_empty()),
    };
    let db = state.db.clone();
    let item = match blocking(move || db.flag_content(&new, Utc::now())).await? {
        FlagOutcome::Flagged(item) => item,
        FlagOutcome::ContentNotFound => return Err(ActionError::NotFound("Content not found")),
        FlagOutcome::OwnContent => {
            return Err(ActionError::invalid("You cannot report your own content"));
        }
        FlagOutcome::Duplicate => {
            return Err(ActionError::Conflict("You have already reported this content"));
        }
    };

    info!(
        "{} flagged {} {} ({})",
        caller.user.username, item.content_type, item.content_id, item.id
    );
    created(item_response(item))
}

#[derive(Debug, Deserialize)]
pub struct QueueQuery {
    pub status: Option<ModerationStatus>,
    pub limit: Option<u32>,
    pub offset: Option<u32>,
}

pub async fn queue(
    State(state): State<AppState>,
    caller: Caller,
    Params(query): Params<QueueQuery>,
) -> ActionResult<Vec<ModerationItemResponse>> {
    caller.require_admin()?;
    let limit = validate::limit(query.limit, 50, 100)?;
    let offset = query.offset.unwrap_or(0);

    let db = state.db.clone();
    let items = blocking(move || db.list_moderation_items(query.status, limit, offset)).await?;
    ok(items.into_iter().map(item_response).collect())
}

pub async fn review(
    State(state): State<AppState>,
    caller: Caller,
    PathParam(item_id): PathParam<Uuid>,
    Payload(req): Payload<ReviewRequest>,
) -> ActionResult<ReviewResponse> {
    caller.require_admin()?;
    let plan = plan_review(req.action, req.violation_type, req.suspend_days)
        .map_err(|e| ActionError::invalid(e.to_string()))?;
    let notes = req.notes.map(|n| n.trim().to_string()).filter(|n| !n.is_empty());
    if notes.as_deref().is_some_and(|n| n.chars().count() > 1000) {
        return Err(ActionError::invalid("Notes must be at most 1000 characters"));
    }

    let db = state.db.clone();
    let reviewer = caller.id();
    let stored_plan = plan.clone();
    let stored_notes = notes.clone();
    let outcome = blocking(move || {
        db.review_item(item_id, reviewer, &stored_plan, stored_notes.as_deref(), Utc::now())
    })
    .await?;

    let (item, removal, suspended_until) = match outcome {
        ReviewOutcome::Reviewed {
            item,
            removal,
            suspended_until,
        } => (item, removal, suspended_until),
        ReviewOutcome::NotFound => return Err(ActionError::NotFound("Moderation item not found")),
        ReviewOutcome::AlreadyReviewed => {
            return Err(ActionError::Conflict("This item has already been reviewed"));
        }
        ReviewOutcome::ContentNotFound => return Err(ActionError::NotFound("Content not found")),
    };

    info!(
        "{} reviewed moderation item {}: {}",
        caller.user.username, item.id, plan.action
    );

    let owner = item.reported_user_id;
    match plan.action {
        ReviewAction::Dismiss => {}
        ReviewAction::Warn => {
            let event = RealtimeEvent::ContentWarning {
                item_id: item.id,
                content_type: item.content_type,
                content_id: item.content_id,
                notes,
            };
            notify(&state, owner, event).await;
        }
        ReviewAction::Remove => match &removal {
            Some(removal) => {
                let event = RealtimeEvent::ContentRemoved {
                    removal_id: removal.id,
                    content_type: removal.content_type,
                    content_id: removal.content_id,
                    violation_type: removal.violation_type,
                };
                notify(&state, owner, event).await;
            }
            None => warn!("Removal review for {} produced no removal record", item.id),
        },
        ReviewAction::Suspend => {
            if let Some(until) = suspended_until {
                notify(&state, owner, RealtimeEvent::AccountSuspended { until }).await;
            }
        }
    }

    ok(ReviewResponse {
        item: item_response(item),
        removal_id: removal.map(|r| r.id),
        suspended_until,
    })
}

#[derive(Debug, Deserialize)]
pub struct RemovalsQuery {
    #[serde(default)]
    pub restorable: bool,
}

/// Removal snapshots, newest first. `restorable=true` limits the list to
/// removals still inside the restore window.
pub async fn removals(
    State(state): State<AppState>,
    caller: Caller,
    Params(query): Params<RemovalsQuery>,
) -> ActionResult<Vec<ContentRemovalResponse>> {
    caller.require_admin()?;
    let now = Utc::now();
    let db = state.db.clone();
    let rows = blocking(move || db.list_removals(query.restorable, now)).await?;
    ok(rows.into_iter().map(|r| removal_response(r, now)).collect())
}

pub async fn restore(
    State(state): State<AppState>,
    caller: Caller,
    PathParam(removal_id): PathParam<Uuid>,
) -> ActionResult<ContentRemovalResponse> {
    caller.require_admin()?;

    let now = Utc::now();
    let db = state.db.clone();
    let admin = caller.id();
    let removal = match blocking(move || db.restore_content(removal_id, admin, now)).await? {
        RestoreOutcome::Restored { removal, .. } => removal,
        RestoreOutcome::NotFound => return Err(ActionError::NotFound("Removal not found")),
        RestoreOutcome::Rejected(RestoreRejection::AlreadyRestored) => {
            return Err(ActionError::Conflict("This content has already been restored"));
        }
        RestoreOutcome::Rejected(RestoreRejection::WindowExpired) => {
            return Err(ActionError::Conflict("The restore window has expired"));
        }
        RestoreOutcome::ContentGone => return Err(ActionError::NotFound("Content not found")),
    };

    info!(
        "{} restored {} {} (removal {})",
        caller.user.username, removal.content_type, removal.content_id, removal.id
    );
    notify(
        &state,
        removal.user_id,
        RealtimeEvent::ContentRestored {
            removal_id: removal.id,
            content_type: removal.content_type,
            content_id: removal.content_id,
        },
    )
    .await;

    ok(removal_response(removal, now))
}

fn item_response(item: ModerationItemRow) -> ModerationItemResponse {
    ModerationItemResponse {
        id: item.id,
        content_type: item.content_type,
        content_id: item.content_id,
        reporter_id: item.reporter_id,
        reported_user_id: item.reported_user_id,
        reason: item.reason,
        details: item.details,
        status: item.status,
        reviewer_id: item.reviewer_id,
        review_notes: item.review_notes,
        reviewed_at: item.reviewed_at,
        created_at: item.created_at,
        content_preview: item.content_preview,
    }
}

fn removal_response(r: ContentRemovalRow, now: chrono::DateTime<Utc>) -> ContentRemovalResponse {
    let restorable = r.restored_at.is_none() && restore_window_open(r.removed_at, now);
    ContentRemovalResponse {
        id: r.id,
        moderation_item_id: r.moderation_item_id,
        content_type: r.content_type,
        content_id: r.content_id,
        user_id: r.user_id,
        original_content: r.original_content,
        violation_type: r.violation_type,
        removed_by: r.removed_by,
        removed_at: r.removed_at,
        restored_at: r.restored_at,
        restored_by: r.restored_by,
        restorable,
    }
}
