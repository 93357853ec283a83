use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::{
    ContentType, ModerationStatus, ReviewAction, Role, ViolationType,
};

// -- JWT Claims --

/// JWT claims shared between the REST middleware and the gateway upgrade.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: Uuid,
    pub username: String,
    pub role: Role,
    pub exp: usize,
}

// -- Envelope --

/// Every action answers `{ success: true, data }` or `{ success: false, error }`.
#[derive(Debug, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl<T> ApiResponse<T> {
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    pub fn err(message: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(message.into()),
        }
    }
}

// -- Auth --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RegisterRequest {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct AuthResponse {
    pub user_id: Uuid,
    pub username: String,
    pub role: Role,
    pub token: String,
}

// -- Profile --

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct UpdateProfileRequest {
    pub bio: Option<String>,
    pub daily_goal_minutes: Option<u32>,
    pub utc_offset_minutes: Option<i32>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ProfileResponse {
    pub id: Uuid,
    pub username: String,
    pub role: Role,
    pub is_premium: bool,
    pub bio: Option<String>,
    pub daily_goal_minutes: u32,
    pub utc_offset_minutes: i32,
    pub suspended_until: Option<DateTime<Utc>>,
    pub current_streak: u32,
    pub longest_streak: u32,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct PublicProfileResponse {
    pub id: Uuid,
    pub username: String,
    pub bio: Option<String>,
    pub current_streak: u32,
    pub longest_streak: u32,
    pub followers: u32,
    pub following: u32,
    /// Whether the requesting user follows this profile.
    pub followed_by_me: bool,
    pub created_at: DateTime<Utc>,
}

// -- Books --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CreateBookRequest {
    pub title: String,
    pub author: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct BookResponse {
    pub id: Uuid,
    pub title: String,
    pub author: String,
    pub added_by: Uuid,
    pub created_at: DateTime<Utc>,
}

// -- Reading sessions --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LogSessionRequest {
    pub book_id: Uuid,
    pub duration_minutes: u32,
    pub started_at: DateTime<Utc>,
    pub ended_at: DateTime<Utc>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SessionResponse {
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

#[derive(Debug, Serialize, Deserialize)]
pub struct LogSessionResponse {
    pub session: SessionResponse,
    pub streak: StreakResponse,
}

// -- Streaks --

#[derive(Debug, Serialize, Deserialize)]
pub struct TodayProgress {
    pub date: NaiveDate,
    pub minutes: u32,
    pub goal_minutes: u32,
    pub goal_met: bool,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct StreakResponse {
    pub current: u32,
    pub longest: u32,
    pub freezes_available: u32,
    pub last_goal_date: Option<NaiveDate>,
    pub today: TodayProgress,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct DailyProgressResponse {
    pub date: NaiveDate,
    pub minutes: u32,
    pub goal_met: bool,
    pub freeze_used: bool,
}

// -- Social --

#[derive(Debug, Serialize, Deserialize)]
pub struct FollowResponse {
    pub following: bool,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct KudosResponse {
    pub id: Uuid,
    pub session_id: Uuid,
    pub giver_id: Uuid,
    pub receiver_id: Uuid,
    pub created_at: DateTime<Utc>,
}

/// Result of undoing something that may not have existed.
#[derive(Debug, Serialize, Deserialize)]
pub struct RemovedResponse {
    pub removed: bool,
}

// -- Rooms --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CreateRoomRequest {
    pub name: String,
    pub description: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct UpdateRoomRequest {
    pub description: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct RoomResponse {
    pub id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub owner_id: Uuid,
    pub created_at: DateTime<Utc>,
}

// -- Moderation --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FlagContentRequest {
    pub content_type: ContentType,
    pub content_id: Uuid,
    pub reason: String,
    pub details: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ModerationItemResponse {
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
    /// Current text of the flagged content, if it still exists.
    pub content_preview: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ReviewRequest {
    pub action: ReviewAction,
    pub notes: Option<String>,
    pub violation_type: Option<ViolationType>,
    pub suspend_days: Option<u32>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ReviewResponse {
    pub item: ModerationItemResponse,
    pub removal_id: Option<Uuid>,
    pub suspended_until: Option<DateTime<Utc>>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ContentRemovalResponse {
    pub id: Uuid,
    pub moderation_item_id: Uuid,
    pub content_type: ContentType,
    pub content_id: Uuid,
    pub user_id: Uuid,
    /// `None` when the content had no text at removal time.
    pub original_content: Option<String>,
    pub violation_type: ViolationType,
    pub removed_by: Uuid,
    pub removed_at: DateTime<Utc>,
    pub restored_at: Option<DateTime<Utc>>,
    pub restored_by: Option<Uuid>,
    pub restorable: bool,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct AdminActionResponse {
    pub id: Uuid,
    /// `None` for actions taken by the system (e.g. payment webhooks).
    pub admin_id: Option<Uuid>,
    pub action: String,
    pub target_type: String,
    pub target_id: String,
    pub details: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

/// Account state after an administrative change.
#[derive(Debug, Serialize, Deserialize)]
pub struct UserStatusResponse {
    pub id: Uuid,
    pub username: String,
    pub role: Role,
    pub suspended_until: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SetRoleRequest {
    pub role: Role,
}

// -- Experiments --

#[derive(Debug, Serialize, Deserialize)]
pub struct AssignmentResponse {
    pub experiment: String,
    pub variant: String,
    pub converted: bool,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct VariantResultResponse {
    pub variant: String,
    pub participants: u64,
    pub conversions: u64,
    pub conversion_rate: f64,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ExperimentResultsResponse {
    pub experiment: String,
    pub variants: Vec<VariantResultResponse>,
    pub chi_squared: f64,
    pub significance: String,
}

// -- Notifications --

#[derive(Debug, Serialize, Deserialize)]
pub struct NotificationResponse {
    pub id: Uuid,
    pub kind: String,
    pub payload: serde_json::Value,
    pub created_at: DateTime<Utc>,
    pub read_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MarkReadRequest {
    /// Empty marks everything read.
    #[serde(default)]
    pub ids: Vec<Uuid>,
}

// -- Pub/sub auth --

#[derive(Debug, Deserialize)]
pub struct ChannelAuthRequest {
    pub socket_id: String,
    pub channel_name: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ChannelAuthResponse {
    pub auth: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub channel_data: Option<String>,
}

// -- Payment webhooks --

#[derive(Debug, Deserialize)]
pub struct PaymentWebhookEvent {
    #[serde(rename = "type")]
    pub kind: String,
    pub data: PaymentWebhookData,
}

#[derive(Debug, Deserialize)]
pub struct PaymentWebhookData {
    pub id: String,
    #[serde(default)]
    pub checkout_id: Option<String>,
    #[serde(default)]
    pub amount: Option<i64>,
    #[serde(default)]
    pub total_amount: Option<i64>,
    #[serde(default)]
    pub currency: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub metadata: serde_json::Map<String, serde_json::Value>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct WebhookAck {
    pub received: bool,
    pub duplicate: bool,
}
