use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Error returned when a stored enum column holds an unknown value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownVariant(pub String);

impl fmt::Display for UnknownVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown variant '{}'", self.0)
    }
}

impl std::error::Error for UnknownVariant {}

/// Enums stored as TEXT columns use the same spelling as on the wire.
macro_rules! text_enum {
    ($name:ident { $($variant:ident => $text:literal),+ $(,)? }) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        pub enum $name {
            $(
                #[serde(rename = $text)]
                $variant,
            )+
        }

        impl $name {
            pub fn as_str(&self) -> &'static str {
                match self {
                    $(Self::$variant => $text,)+
                }
            }
        }

        impl FromStr for $name {
            type Err = UnknownVariant;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($text => Ok(Self::$variant),)+
                    other => Err(UnknownVariant(other.to_string())),
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }
    };
}

text_enum!(Role {
    User => "USER",
    Admin => "ADMIN",
    SuperAdmin => "SUPER_ADMIN",
});

impl Role {
    pub fn is_staff(&self) -> bool {
        matches!(self, Self::Admin | Self::SuperAdmin)
    }
}

text_enum!(ModerationStatus {
    Pending => "PENDING",
    Dismissed => "DISMISSED",
    Warned => "WARNED",
    Removed => "REMOVED",
    Suspended => "SUSPENDED",
});

text_enum!(ContentType {
    UserBio => "USER_BIO",
    RoomDescription => "ROOM_DESCRIPTION",
});

text_enum!(ReviewAction {
    Dismiss => "DISMISS",
    Warn => "WARN",
    Remove => "REMOVE",
    Suspend => "SUSPEND",
});

text_enum!(ViolationType {
    Spam => "SPAM",
    Harassment => "HARASSMENT",
    HateSpeech => "HATE_SPEECH",
    Explicit => "EXPLICIT",
    Misinformation => "MISINFORMATION",
    Other => "OTHER",
});

text_enum!(AdminActionKind {
    ReviewDismiss => "REVIEW_DISMISS",
    ReviewWarn => "REVIEW_WARN",
    ContentRemove => "CONTENT_REMOVE",
    UserSuspend => "USER_SUSPEND",
    UserUnsuspend => "USER_UNSUSPEND",
    ContentRestore => "CONTENT_RESTORE",
    RoleChange => "ROLE_CHANGE",
    PremiumActivated => "PREMIUM_ACTIVATED",
});

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn text_enums_parse_their_own_spelling() {
        assert_eq!("SUPER_ADMIN".parse::<Role>().unwrap(), Role::SuperAdmin);
        assert_eq!(ModerationStatus::Pending.as_str(), "PENDING");
        assert_eq!(
            "ROOM_DESCRIPTION".parse::<ContentType>().unwrap(),
            ContentType::RoomDescription
        );
        assert!("pending".parse::<ModerationStatus>().is_err());
    }

    #[test]
    fn serde_uses_screaming_case() {
        let json = serde_json::to_string(&ViolationType::HateSpeech).unwrap();
        assert_eq!(json, "\"HATE_SPEECH\"");
        let action: ReviewAction = serde_json::from_str("\"REMOVE\"").unwrap();
        assert_eq!(action, ReviewAction::Remove);
    }

    #[test]
    fn only_admins_are_staff() {
        assert!(!Role::User.is_staff());
        assert!(Role::Admin.is_staff());
        assert!(Role::SuperAdmin.is_staff());
    }
}
