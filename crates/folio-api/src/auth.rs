use argon2::{Argon2, PasswordHash, PasswordHasher, PasswordVerifier, password_hash::SaltString};
use axum::extract::State;
use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation, decode, encode};
use rand_core::OsRng;
use tracing::{debug, info};
use uuid::Uuid;

use folio_types::api::{AuthResponse, Claims, LoginRequest, RegisterRequest};
use folio_types::models::Role;

use crate::error::{ActionError, ActionResult, CreatedResult, blocking, created, ok};
use crate::extract::Payload;
use crate::state::AppState;
use crate::validate;

const TOKEN_LIFETIME_DAYS: i64 = 30;

pub async fn register(
    State(state): State<AppState>,
    Payload(req): Payload<RegisterRequest>,
) -> CreatedResult<AuthResponse> {
    validate::username(&req.username)?;
    validate::password(&req.password)?;

    let user_id = Uuid::new_v4();
    let db = state.db.clone();
    let username = req.username.clone();
    let inserted = blocking(move || {
        // Hash password with Argon2id
        let salt = SaltString::generate(&mut OsRng);
        let password_hash = Argon2::default()
            .hash_password(req.password.as_bytes(), &salt)
            .map_err(|e| anyhow::anyhow!("password hashing failed: {}", e))?
            .to_string();
        db.create_user(user_id, &username, &password_hash, Role::User)
    })
    .await?;

    if !inserted {
        return Err(ActionError::Conflict("Username is already taken"));
    }

    info!("Registered {} ({})", req.username, user_id);
    let token = create_token(&state.jwt_secret, user_id, &req.username, Role::User)?;
    created(AuthResponse {
        user_id,
        username: req.username,
        role: Role::User,
        token,
    })
}

pub async fn login(
    State(state): State<AppState>,
    Payload(req): Payload<LoginRequest>,
) -> ActionResult<AuthResponse> {
    let db = state.db.clone();
    let username = req.username.clone();
    let user = blocking(move || db.get_user_by_username(&username))
        .await?
        .filter(|u| !u.is_deleted())
        .ok_or(ActionError::Unauthorized)?;

    let stored_hash = user.password.clone();
    let verified = blocking(move || {
        let parsed = PasswordHash::new(&stored_hash)
            .map_err(|e| anyhow::anyhow!("stored password hash is malformed: {}", e))?;
        Ok(Argon2::default()
            .verify_password(req.password.as_bytes(), &parsed)
            .is_ok())
    })
    .await?;

    if !verified {
        debug!("Failed login for {}", user.username);
        return Err(ActionError::Unauthorized);
    }

    let token = create_token(&state.jwt_secret, user.id, &user.username, user.role)?;
    ok(AuthResponse {
        user_id: user.id,
        username: user.username,
        role: user.role,
        token,
    })
}

pub fn create_token(secret: &str, user_id: Uuid, username: &str, role: Role) -> anyhow::Result<String> {
    let claims = Claims {
        sub: user_id,
        username: username.to_string(),
        role,
        exp: (chrono::Utc::now() + chrono::Duration::days(TOKEN_LIFETIME_DAYS)).timestamp() as usize,
    };

    let token = encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )?;

    Ok(token)
}

/// `None` for anything that is not a valid, unexpired token.
pub fn decode_token(secret: &str, token: &str) -> Option<Claims> {
    decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::default(),
    )
    .ok()
    .map(|data| data.claims)
}
