use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use axum_extra::{
    TypedHeader,
    headers::{Authorization, authorization::Bearer},
};

use crate::auth::decode_token;
use crate::error::ActionError;
use crate::state::AppState;

/// Validate the bearer token and make its `Claims` available to handlers.
pub async fn require_auth(
    State(state): State<AppState>,
    bearer: Option<TypedHeader<Authorization<Bearer>>>,
    mut req: Request,
    next: Next,
) -> Result<Response, ActionError> {
    let TypedHeader(Authorization(bearer)) = bearer.ok_or(ActionError::Unauthorized)?;
    let claims = decode_token(&state.jwt_secret, bearer.token()).ok_or(ActionError::Unauthorized)?;

    req.extensions_mut().insert(claims);
    Ok(next.run(req).await)
}
