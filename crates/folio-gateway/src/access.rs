use std::sync::Arc;

use uuid::Uuid;

use folio_core::channels::Channel;
use folio_db::Database;

/// Whether `user_id` may listen on `channel`. Private user channels belong
/// to their user; room channels need a room that exists and is not deleted.
/// Shared by the WebSocket gateway and the channel-auth endpoint.
pub async fn authorize_channel(
    db: &Arc<Database>,
    user_id: Uuid,
    channel: Channel,
) -> anyhow::Result<bool> {
    if !channel.authorize(user_id) {
        return Ok(false);
    }
    let Some(room_id) = channel.room_id() else {
        return Ok(true);
    };

    let db = db.clone();
    let room = tokio::task::spawn_blocking(move || db.get_room(room_id)).await??;
    Ok(room.is_some_and(|r| r.deleted_at.is_none()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use folio_types::models::Role;

    #[tokio::test]
    async fn user_and_room_rules() {
        let db = Arc::new(Database::open_in_memory().unwrap());
        let ada = Uuid::new_v4();
        let grace = Uuid::new_v4();
        assert!(db.create_user(ada, "ada", "h", Role::User).unwrap());
        let room = db.create_room(Uuid::new_v4(), ada, "club", None).unwrap();

        assert!(authorize_channel(&db, ada, Channel::for_user(ada)).await.unwrap());
        assert!(!authorize_channel(&db, grace, Channel::for_user(ada)).await.unwrap());
        assert!(authorize_channel(&db, grace, Channel::presence_room(room.id)).await.unwrap());
        assert!(
            !authorize_channel(&db, grace, Channel::presence_room(Uuid::new_v4()))
                .await
                .unwrap()
        );
    }
}
