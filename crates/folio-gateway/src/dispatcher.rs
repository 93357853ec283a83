use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use tokio::sync::{RwLock, broadcast};
use tracing::error;
use uuid::Uuid;

use folio_core::channels::Channel;
use folio_types::events::RealtimeEvent;

/// An event serialized once and tagged with the channel it was published on.
#[derive(Debug, Clone)]
pub struct Published {
    pub channel: Channel,
    pub json: Arc<str>,
}

/// Someone listening on a presence room.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PresenceMember {
    pub user_id: Uuid,
    pub username: String,
}

struct RoomMember {
    username: String,
    /// A user may have the room open in several connections.
    connections: HashSet<Uuid>,
}

/// Fans events out to every connected client. Each connection filters by
/// the channels it has subscribed to.
#[derive(Clone)]
pub struct Dispatcher {
    inner: Arc<DispatcherInner>,
}

struct DispatcherInner {
    broadcast_tx: broadcast::Sender<Published>,

    /// Presence state: room_id -> (user_id -> member)
    presence: RwLock<HashMap<Uuid, HashMap<Uuid, RoomMember>>>,
}

impl Default for Dispatcher {
    fn default() -> Self {
        Self::new()
    }
}

impl Dispatcher {
    pub fn new() -> Self {
        let (broadcast_tx, _) = broadcast::channel(1024);
        Self {
            inner: Arc::new(DispatcherInner {
                broadcast_tx,
                presence: RwLock::new(HashMap::new()),
            }),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Published> {
        self.inner.broadcast_tx.subscribe()
    }

    /// Publish an event on a channel. Returns how many connections were
    /// listening (0 when nobody is connected).
    pub fn publish(&self, channel: Channel, event: &RealtimeEvent) -> usize {
        let json = match serde_json::to_string(event) {
            Ok(json) => json,
            Err(e) => {
                error!("Failed to serialize {} event: {}", event.kind(), e);
                return 0;
            }
        };
        self.inner
            .broadcast_tx
            .send(Published {
                channel,
                json: json.into(),
            })
            .unwrap_or(0)
    }

    /// Publish on the user's private channel.
    pub fn send_to_user(&self, user_id: Uuid, event: &RealtimeEvent) -> usize {
        self.publish(Channel::for_user(user_id), event)
    }

    /// Add a connection to a room's presence set. Returns the members that
    /// were already there. A join event is published only when this is the
    /// user's first connection in the room.
    pub async fn join_room(
        &self,
        room_id: Uuid,
        conn_id: Uuid,
        user_id: Uuid,
        username: &str,
    ) -> Vec<PresenceMember> {
        let (existing, first_connection) = {
            let mut presence = self.inner.presence.write().await;
            let room = presence.entry(room_id).or_default();

            let existing = room
                .iter()
                .filter(|(id, _)| **id != user_id)
                .map(|(id, m)| PresenceMember {
                    user_id: *id,
                    username: m.username.clone(),
                })
                .collect();

            let member = room.entry(user_id).or_insert_with(|| RoomMember {
                username: username.to_string(),
                connections: HashSet::new(),
            });
            let first_connection = member.connections.is_empty();
            member.connections.insert(conn_id);
            (existing, first_connection)
        };

        if first_connection {
            self.publish(
                Channel::presence_room(room_id),
                &RealtimeEvent::PresenceUpdate {
                    room_id,
                    user_id,
                    username: username.to_string(),
                    online: true,
                },
            );
        }
        existing
    }

    /// Remove a connection from a room. The leave event is published once
    /// the user's last connection is gone.
    pub async fn leave_room(&self, room_id: Uuid, conn_id: Uuid, user_id: Uuid) {
        let left = {
            let mut presence = self.inner.presence.write().await;
            let Some(room) = presence.get_mut(&room_id) else {
                return;
            };
            let Some(member) = room.get_mut(&user_id) else {
                return;
            };
            if !member.connections.remove(&conn_id) || !member.connections.is_empty() {
                return;
            }

            let username = room.remove(&user_id).map(|m| m.username).unwrap_or_default();
            if room.is_empty() {
                presence.remove(&room_id);
            }
            username
        };

        self.publish(
            Channel::presence_room(room_id),
            &RealtimeEvent::PresenceUpdate {
                room_id,
                user_id,
                username: left,
                online: false,
            },
        );
    }

    pub async fn room_members(&self, room_id: Uuid) -> Vec<PresenceMember> {
        self.inner
            .presence
            .read()
            .await
            .get(&room_id)
            .map(|room| {
                room.iter()
                    .map(|(id, m)| PresenceMember {
                        user_id: *id,
                        username: m.username.clone(),
                    })
                    .collect()
            })
            .unwrap_or_default()
    }
}
