use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use thiserror::Error;
use tracing::error;

use folio_types::api::ApiResponse;

/// Every failure an action can report. The display text is exactly what
/// the client sees in the `error` field.
#[derive(Debug, Error)]
pub enum ActionError {
    #[error("Unauthorized")]
    Unauthorized,

    #[error("Forbidden")]
    Forbidden,

    #[error("{0}")]
    InvalidInput(String),

    #[error("{0}")]
    NotFound(&'static str),

    /// A business rule refused the request.
    #[error("{0}")]
    Conflict(&'static str),

    #[error("Something went wrong")]
    Internal(#[from] anyhow::Error),
}

impl ActionError {
    pub fn invalid(message: impl Into<String>) -> Self {
        Self::InvalidInput(message.into())
    }

    pub fn status(&self) -> StatusCode {
        match self {
            Self::Unauthorized => StatusCode::UNAUTHORIZED,
            Self::Forbidden => StatusCode::FORBIDDEN,
            Self::InvalidInput(_) => StatusCode::BAD_REQUEST,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Conflict(_) => StatusCode::CONFLICT,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ActionError {
    fn into_response(self) -> Response {
        if let Self::Internal(e) = &self {
            error!("Action failed: {:#}", e);
        }
        (self.status(), Json(ApiResponse::<()>::err(self.to_string()))).into_response()
    }
}

pub type ActionResult<T> = Result<Json<ApiResponse<T>>, ActionError>;
pub type CreatedResult<T> = Result<(StatusCode, Json<ApiResponse<T>>), ActionError>;

pub fn ok<T>(data: T) -> ActionResult<T> {
    Ok(Json(ApiResponse::ok(data)))
}

pub fn created<T>(data: T) -> CreatedResult<T> {
    Ok((StatusCode::CREATED, Json(ApiResponse::ok(data))))
}

/// Run blocking DB work off the async runtime.
pub async fn blocking<F, T>(f: F) -> Result<T, ActionError>
where
    F: FnOnce() -> anyhow::Result<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| {
            error!("spawn_blocking join error: {}", e);
            ActionError::Internal(e.into())
        })?
        .map_err(ActionError::Internal)
}
