use chrono::{DateTime, Duration, Utc};
use thiserror::Error;

use folio_types::models::{AdminActionKind, ModerationStatus, ReviewAction, ViolationType};

/// Removed content can be restored for this long after removal.
pub const RESTORE_WINDOW_HOURS: i64 = 24;

pub const DEFAULT_SUSPEND_DAYS: u32 = 7;
pub const MAX_SUSPEND_DAYS: u32 = 365;

/// Everything a review needs to write, decided before touching storage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReviewPlan {
    pub action: ReviewAction,
    pub status: ModerationStatus,
    pub audit: AdminActionKind,
    /// Set for REMOVE only.
    pub violation_type: Option<ViolationType>,
    /// Set for SUSPEND only.
    pub suspend_days: Option<u32>,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ReviewPlanError {
    #[error("A violation type is required to remove content")]
    MissingViolationType,

    #[error("Suspension must be between 1 and 365 days")]
    SuspendDaysOutOfRange,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RestoreRejection {
    #[error("This content has already been restored")]
    AlreadyRestored,

    #[error("The restore window has expired")]
    WindowExpired,
}

/// Only pending items can be reviewed; every other status is terminal.
pub fn can_review(status: ModerationStatus) -> bool {
    status == ModerationStatus::Pending
}

pub fn status_after(action: ReviewAction) -> ModerationStatus {
    match action {
        ReviewAction::Dismiss => ModerationStatus::Dismissed,
        ReviewAction::Warn => ModerationStatus::Warned,
        ReviewAction::Remove => ModerationStatus::Removed,
        ReviewAction::Suspend => ModerationStatus::Suspended,
    }
}

pub fn plan_review(
    action: ReviewAction,
    violation_type: Option<ViolationType>,
    suspend_days: Option<u32>,
) -> Result<ReviewPlan, ReviewPlanError> {
    let (audit, violation_type, suspend_days) = match action {
        ReviewAction::Dismiss => (AdminActionKind::ReviewDismiss, None, None),
        ReviewAction::Warn => (AdminActionKind::ReviewWarn, None, None),
        ReviewAction::Remove => {
            let violation = violation_type.ok_or(ReviewPlanError::MissingViolationType)?;
            (AdminActionKind::ContentRemove, Some(violation), None)
        }
        ReviewAction::Suspend => {
            let days = suspend_days.unwrap_or(DEFAULT_SUSPEND_DAYS);
            if !(1..=MAX_SUSPEND_DAYS).contains(&days) {
                return Err(ReviewPlanError::SuspendDaysOutOfRange);
            }
            (AdminActionKind::UserSuspend, None, Some(days))
        }
    };

    Ok(ReviewPlan {
        action,
        status: status_after(action),
        audit,
        violation_type,
        suspend_days,
    })
}

pub fn suspension_end(now: DateTime<Utc>, days: u32) -> DateTime<Utc> {
    now + Duration::days(i64::from(days))
}

/// True while `now` is no more than 24 hours after `removed_at`.
pub fn restore_window_open(removed_at: DateTime<Utc>, now: DateTime<Utc>) -> bool {
    now - removed_at <= Duration::hours(RESTORE_WINDOW_HOURS)
}

pub fn check_restore(
    removed_at: DateTime<Utc>,
    restored_at: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
) -> Result<(), RestoreRejection> {
    if restored_at.is_some() {
        return Err(RestoreRejection::AlreadyRestored);
    }
    if !restore_window_open(removed_at, now) {
        return Err(RestoreRejection::WindowExpired);
    }
    Ok(())
}
