use axum::{
    Form,
    extract::{State, rejection::FormRejection},
};
use serde_json::json;
use tracing::{debug, warn};

use folio_core::channels::{Channel, is_valid_socket_id, sign_subscription};
use folio_gateway::access::authorize_channel;
use folio_types::api::{ChannelAuthRequest, ChannelAuthResponse};

use crate::caller::Caller;
use crate::error::{ActionError, ActionResult, ok};
use crate::state::AppState;

/// Sign a client's subscription to a private or presence channel. The
/// request is form encoded, as pub/sub client libraries send it.
pub async fn auth(
    State(state): State<AppState>,
    caller: Caller,
    form: Result<Form<ChannelAuthRequest>, FormRejection>,
) -> ActionResult<ChannelAuthResponse> {
    let Form(req) = form.map_err(|_| ActionError::invalid("Invalid input"))?;
    if !is_valid_socket_id(&req.socket_id) {
        return Err(ActionError::invalid("Invalid socket id"));
    }

    let channel: Channel = req.channel_name.parse().map_err(|e| {
        debug!("{} asked for {}", caller.user.username, e);
        ActionError::Forbidden
    })?;
    if !authorize_channel(&state.db, caller.id(), channel).await? {
        warn!("{} denied channel {}", caller.user.username, channel);
        return Err(ActionError::Forbidden);
    }

    let channel_data = channel.is_presence().then(|| {
        json!({
            "user_id": caller.id(),
            "user_info": { "username": caller.user.username },
        })
        .to_string()
    });

    let auth = sign_subscription(
        &state.pusher.key,
        &state.pusher.secret,
        &req.socket_id,
        &req.channel_name,
        channel_data.as_deref(),
    );
    ok(ChannelAuthResponse { auth, channel_data })
}
