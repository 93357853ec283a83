//! Database row types. Distinct from folio-types API models to keep the DB
//! layer independent; handlers convert between the two.

use chrono::{DateTime, NaiveDate, Utc};
use uuid::Uuid;

use folio_core::moderation::RestoreRejection;
use folio_core::streak::{StreakState, StreakUpdate};
use folio_types::models::{ContentType, ModerationStatus, Role, ViolationType};

#[derive(Debug, Clone)]
pub struct UserRow {
    pub id: Uuid,
    pub username: String,
    pub password: String,
    pub role: Role,
    pub is_premium: bool,
    pub bio: Option<String>,
    pub daily_goal_minutes: u32,
    pub utc_offset_minutes: i32,
    pub suspended_until: Option<DateTime<Utc>>,
    pub deleted_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl UserRow {
    pub fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }

    pub fn is_suspended(&self, now: DateTime<Utc>) -> bool {
        self.suspended_until.is_some_and(|until| until > now)
    }
}

/// Partial profile update; `None` leaves a column untouched. An empty bio
/// clears it.
#[derive(Debug, Default, Clone)]
pub struct ProfileUpdate {
    pub bio: Option<String>,
    pub daily_goal_minutes: Option<u32>,
    pub utc_offset_minutes: Option<i32>,
}

#[derive(Debug, Clone)]
pub struct BookRow {
    pub id: Uuid,
    pub title: String,
    pub author: String,
    pub added_by: Uuid,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewSession {
    pub id: Uuid,
    pub user_id: Uuid,
    pub book_id: Uuid,
    pub duration_minutes: u32,
    pub started_at: DateTime<Utc>,
    pub ended_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct SessionRow {
    pub id: Uuid,
    pub user_id: Uuid,
    pub username: String,
    pub book_id: Uuid,
    pub book_title: String,
    pub duration_minutes: u32,
    pub started_at: DateTime<Utc>,
    pub ended_at: DateTime<Utc>,
    pub kudos_count: u32,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DailyProgressRow {
    pub date: NaiveDate,
    pub minutes: u32,
    pub goal_met: bool,
    pub freeze_used: bool,
}

pub enum LogSessionOutcome {
    Logged(LoggedSession),
    BookNotFound,
}

pub struct LoggedSession {
    pub session: SessionRow,
    pub day: DailyProgressRow,
    pub streak: StreakState,
    /// Set when this session completed the day's goal.
    pub update: Option<StreakUpdate>,
}

#[derive(Debug, Clone)]
pub struct KudosRow {
    pub id: Uuid,
    pub giver_id: Uuid,
    pub receiver_id: Uuid,
    pub session_id: Uuid,
    pub created_at: DateTime<Utc>,
}

pub enum KudosOutcome {
    Given(KudosRow),
    SessionNotFound,
    OwnSession,
    Duplicate,
}

#[derive(Debug, Clone)]
pub struct RoomRow {
    pub id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub owner_id: Uuid,
    pub deleted_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewFlag {
    pub id: Uuid,
    pub reporter_id: Uuid,
    pub content_type: ContentType,
    pub content_id: Uuid,
    pub reason: String,
    pub details: Option<String>,
}

#[derive(Debug, Clone)]
pub struct ModerationItemRow {
    pub id: Uuid,
    pub content_type: ContentType,
    pub content_id: Uuid,
    pub reporter_id: Uuid,
    pub reported_user_id: Uuid,
    pub reason: String,
    pub details: Option<String>,
    pub status: ModerationStatus,
    pub reviewer_id: Option<Uuid>,
    pub review_notes: Option<String>,
    pub reviewed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub content_preview: Option<String>,
}

pub enum FlagOutcome {
    Flagged(ModerationItemRow),
    ContentNotFound,
    OwnContent,
    Duplicate,
}

#[derive(Debug, Clone)]
pub struct ContentRemovalRow {
    pub id: Uuid,
    pub moderation_item_id: Uuid,
    pub content_type: ContentType,
    pub content_id: Uuid,
    pub user_id: Uuid,
    pub original_content: Option<String>,
    pub violation_type: ViolationType,
    pub removed_by: Uuid,
    pub removed_at: DateTime<Utc>,
    pub restored_at: Option<DateTime<Utc>>,
    pub restored_by: Option<Uuid>,
}

pub enum ReviewOutcome {
    Reviewed {
        item: ModerationItemRow,
        removal: Option<ContentRemovalRow>,
        suspended_until: Option<DateTime<Utc>>,
    },
    NotFound,
    AlreadyReviewed,
    /// REMOVE on content that no longer exists.
    ContentNotFound,
}

pub enum RestoreOutcome {
    Restored {
        removal: ContentRemovalRow,
        item: ModerationItemRow,
    },
    NotFound,
    Rejected(RestoreRejection),
    /// The owning user or room was deleted after removal.
    ContentGone,
}

#[derive(Debug, Clone)]
pub struct AdminActionRow {
    pub id: Uuid,
    pub admin_id: Option<Uuid>,
    pub action: String,
    pub target_type: String,
    pub target_id: String,
    pub details: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct PaymentEvent {
    pub checkout_id: String,
    pub user_id: Option<Uuid>,
    pub amount: i64,
    pub currency: String,
    pub status: String,
}

#[derive(Debug, Clone)]
pub struct PaymentRow {
    pub id: Uuid,
    pub checkout_id: String,
    pub user_id: Option<Uuid>,
    pub amount: i64,
    pub currency: String,
    pub status: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

pub struct PaymentOutcome {
    pub payment: PaymentRow,
    /// False when the checkout id was already known (a redelivery).
    pub created: bool,
    pub premium_activated: bool,
}

#[derive(Debug, Clone)]
pub struct NotificationRow {
    pub id: Uuid,
    pub user_id: Uuid,
    pub kind: String,
    pub payload: String,
    pub created_at: DateTime<Utc>,
    pub read_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone)]
pub struct AssignmentRow {
    pub experiment: String,
    pub user_id: Uuid,
    pub variant: String,
    pub converted: bool,
    pub assigned_at: DateTime<Utc>,
}
