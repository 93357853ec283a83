use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::{ContentType, ViolationType};

/// Events pushed to clients over the realtime gateway.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum RealtimeEvent {
    /// Server confirms the connection is authenticated
    Ready { user_id: Uuid, username: String },

    /// Subscription to a channel was accepted
    Subscribed { channel: String },

    /// Subscription to a channel was refused
    SubscriptionDenied { channel: String },

    /// Someone gave kudos on one of the user's sessions
    KudosReceived {
        kudos_id: Uuid,
        session_id: Uuid,
        from_user_id: Uuid,
        from_username: String,
    },

    /// Streak counters changed after a logged session
    StreakUpdated { current: u32, longest: u32, freezes_available: u32 },

    /// A moderator warned the user about a piece of their content
    ContentWarning {
        item_id: Uuid,
        content_type: ContentType,
        content_id: Uuid,
        notes: Option<String>,
    },

    /// A moderator removed a piece of the user's content
    ContentRemoved {
        removal_id: Uuid,
        content_type: ContentType,
        content_id: Uuid,
        violation_type: ViolationType,
    },

    /// Previously removed content was restored
    ContentRestored {
        removal_id: Uuid,
        content_type: ContentType,
        content_id: Uuid,
    },

    /// The account was suspended until the given time
    AccountSuspended { until: DateTime<Utc> },

    /// Premium was activated by a payment
    PremiumActivated { checkout_id: String },

    /// A user joined or left a room channel
    PresenceUpdate {
        room_id: Uuid,
        user_id: Uuid,
        username: String,
        online: bool,
    },
}

impl RealtimeEvent {
    /// Stable name used as the persisted notification kind.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Ready { .. } => "ready",
            Self::Subscribed { .. } => "subscribed",
            Self::SubscriptionDenied { .. } => "subscription_denied",
            Self::KudosReceived { .. } => "kudos_received",
            Self::StreakUpdated { .. } => "streak_updated",
            Self::ContentWarning { .. } => "content_warning",
            Self::ContentRemoved { .. } => "content_removed",
            Self::ContentRestored { .. } => "content_restored",
            Self::AccountSuspended { .. } => "account_suspended",
            Self::PremiumActivated { .. } => "premium_activated",
            Self::PresenceUpdate { .. } => "presence_update",
        }
    }
}

/// Commands sent FROM client TO server over WebSocket.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum GatewayCommand {
    /// Start receiving events published on a channel
    Subscribe { channel: String },

    /// Stop receiving events published on a channel
    Unsubscribe { channel: String },
}
