use axum::{extract::FromRequestParts, http::request::Parts};
use chrono::Utc;
use uuid::Uuid;

use folio_db::models::UserRow;
use folio_types::api::Claims;
use folio_types::models::Role;

use crate::error::{ActionError, blocking};
use crate::state::AppState;

/// The authenticated user, reloaded from storage on every request so role,
/// suspension and deletion are current. Only usable behind `require_auth`.
pub struct Caller {
    pub user: UserRow,
}

impl FromRequestParts<AppState> for Caller {
    type Rejection = ActionError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let claims = parts
            .extensions
            .get::<Claims>()
            .cloned()
            .ok_or(ActionError::Unauthorized)?;

        let db = state.db.clone();
        let user = blocking(move || db.get_user_by_id(claims.sub))
            .await?
            .filter(|u| !u.is_deleted())
            .ok_or(ActionError::Unauthorized)?;

        Ok(Self { user })
    }
}

impl Caller {
    pub fn id(&self) -> Uuid {
        self.user.id
    }

    /// Suspended users may read but not write.
    pub fn require_active(&self) -> Result<(), ActionError> {
        if self.user.is_suspended(Utc::now()) {
            return Err(ActionError::Forbidden);
        }
        Ok(())
    }

    /// ADMIN or SUPER_ADMIN.
    pub fn require_admin(&self) -> Result<(), ActionError> {
        self.require_active()?;
        if !self.user.role.is_staff() {
            return Err(ActionError::Forbidden);
        }
        Ok(())
    }

    pub fn require_super_admin(&self) -> Result<(), ActionError> {
        self.require_active()?;
        if self.user.role != Role::SuperAdmin {
            return Err(ActionError::Forbidden);
        }
        Ok(())
    }
}
