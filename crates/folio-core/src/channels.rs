use std::fmt;
use std::str::FromStr;

use hmac::{Hmac, Mac};
use sha2::Sha256;
use thiserror::Error;
use uuid::Uuid;

type HmacSha256 = Hmac<Sha256>;

const USER_PREFIX: &str = "private-user-";
const PRESENCE_ROOM_PREFIX: &str = "presence-room-";
const PRIVATE_ROOM_PREFIX: &str = "private-room-";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ChannelError {
    #[error("unknown channel '{0}'")]
    Unknown(String),
}

/// A pub/sub channel a client may subscribe to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Channel {
    /// Per-user notifications; only that user may listen.
    User(Uuid),
    /// Room activity. Presence rooms also track who is listening.
    Room { id: Uuid, presence: bool },
}

impl Channel {
    pub fn for_user(user_id: Uuid) -> Self {
        Self::User(user_id)
    }

    pub fn presence_room(room_id: Uuid) -> Self {
        Self::Room {
            id: room_id,
            presence: true,
        }
    }

    pub fn is_presence(&self) -> bool {
        matches!(self, Self::Room { presence: true, .. })
    }

    pub fn room_id(&self) -> Option<Uuid> {
        match self {
            Self::Room { id, .. } => Some(*id),
            Self::User(_) => None,
        }
    }

    /// Whether `caller` may subscribe. Room existence is checked by the
    /// caller of this function since it needs storage.
    pub fn authorize(&self, caller: Uuid) -> bool {
        match self {
            Self::User(owner) => *owner == caller,
            Self::Room { .. } => true,
        }
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::User(id) => write!(f, "{USER_PREFIX}{id}"),
            Self::Room { id, presence: true } => write!(f, "{PRESENCE_ROOM_PREFIX}{id}"),
            Self::Room { id, presence: false } => write!(f, "{PRIVATE_ROOM_PREFIX}{id}"),
        }
    }
}

impl FromStr for Channel {
    type Err = ChannelError;

    fn from_str(name: &str) -> Result<Self, Self::Err> {
        let unknown = || ChannelError::Unknown(name.to_string());

        if let Some(rest) = name.strip_prefix(USER_PREFIX) {
            return rest.parse().map(Self::User).map_err(|_| unknown());
        }
        if let Some(rest) = name.strip_prefix(PRESENCE_ROOM_PREFIX) {
            return rest
                .parse()
                .map(|id| Self::Room { id, presence: true })
                .map_err(|_| unknown());
        }
        if let Some(rest) = name.strip_prefix(PRIVATE_ROOM_PREFIX) {
            return rest
                .parse()
                .map(|id| Self::Room { id, presence: false })
                .map_err(|_| unknown());
        }
        Err(unknown())
    }
}

/// Pusher-protocol socket ids look like `1234.5678`.
pub fn is_valid_socket_id(socket_id: &str) -> bool {
    match socket_id.split_once('.') {
        Some((a, b)) => {
            !a.is_empty()
                && !b.is_empty()
                && a.bytes().all(|c| c.is_ascii_digit())
                && b.bytes().all(|c| c.is_ascii_digit())
        }
        None => false,
    }
}

/// Channel auth token in the Pusher format:
/// `{key}:{hex(hmac_sha256(secret, "{socket_id}:{channel}[:{channel_data}]"))}`.
pub fn sign_subscription(
    key: &str,
    secret: &str,
    socket_id: &str,
    channel_name: &str,
    channel_data: Option<&str>,
) -> String {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).expect("HMAC key of any size");
    mac.update(socket_id.as_bytes());
    mac.update(b":");
    mac.update(channel_name.as_bytes());
    if let Some(data) = channel_data {
        mac.update(b":");
        mac.update(data.as_bytes());
    }
    format!("{}:{}", key, hex::encode(mac.finalize().into_bytes()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_and_prints_channel_names() {
        let id = Uuid::new_v4();
        for channel in [
            Channel::for_user(id),
            Channel::presence_room(id),
            Channel::Room {
                id,
                presence: false,
            },
        ] {
            assert_eq!(channel.to_string().parse::<Channel>().unwrap(), channel);
        }
    }

    #[test]
    fn rejects_unknown_channels() {
        assert!("public-feed".parse::<Channel>().is_err());
        assert!("private-user-not-a-uuid".parse::<Channel>().is_err());
        assert!("presence-room-".parse::<Channel>().is_err());
    }

    #[test]
    fn user_channel_only_for_owner() {
        let me = Uuid::new_v4();
        let other = Uuid::new_v4();
        assert!(Channel::for_user(me).authorize(me));
        assert!(!Channel::for_user(other).authorize(me));
        assert!(Channel::presence_room(other).authorize(me));
    }

    #[test]
    fn socket_id_format() {
        assert!(is_valid_socket_id("1234.5678"));
        assert!(!is_valid_socket_id("1234"));
        assert!(!is_valid_socket_id("12a4.5678"));
        assert!(!is_valid_socket_id(".5678"));
    }

    #[test]
    fn matches_pusher_reference_signature() {
        // Reference values from the Pusher channel authentication docs.
        let auth = sign_subscription(
            "278d425bdf160c739803",
            "7ad3773142a6692b25b8",
            "1234.1234",
            "private-foobar",
            None,
        );
        assert_eq!(
            auth,
            "278d425bdf160c739803:58df8b0c36d6982b82c3ecf6b4662e34fe8c25bba48f5369f135bf843651c3a4"
        );
    }
}
