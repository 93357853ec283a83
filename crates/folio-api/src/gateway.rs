use axum::{
    extract::{Query, State, WebSocketUpgrade},
    response::Response,
};
use serde::Deserialize;
use tracing::warn;

use folio_gateway::connection::handle_connection;

use crate::auth::decode_token;
use crate::error::{ActionError, blocking};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct GatewayQuery {
    pub token: String,
}

/// Browsers cannot set headers on a WebSocket handshake, so the token
/// rides in the query string and is checked before upgrading.
pub async fn upgrade(
    State(state): State<AppState>,
    Query(query): Query<GatewayQuery>,
    ws: WebSocketUpgrade,
) -> Result<Response, ActionError> {
    let claims = decode_token(&state.jwt_secret, &query.token).ok_or_else(|| {
        warn!("Gateway upgrade with an invalid token");
        ActionError::Unauthorized
    })?;

    let db = state.db.clone();
    let user = blocking(move || db.get_user_by_id(claims.sub))
        .await?
        .filter(|u| !u.is_deleted())
        .ok_or(ActionError::Unauthorized)?;

    let dispatcher = state.dispatcher.clone();
    let db = state.db.clone();
    Ok(ws.on_upgrade(move |socket| handle_connection(socket, dispatcher, db, user.id, user.username)))
}
