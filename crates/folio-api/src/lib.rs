pub mod admin;
pub mod auth;
pub mod books;
pub mod caller;
pub mod error;
pub mod experiments;
pub mod extract;
pub mod gateway;
pub mod middleware;
pub mod moderation;
pub mod notifications;
pub mod profile;
pub mod pusher;
pub mod rooms;
pub mod sessions;
pub mod social;
pub mod state;
pub mod streaks;
pub mod validate;
pub mod webhooks;

use axum::{
    Router, middleware as axum_middleware,
    routing::{get, post, put},
};

pub use state::{AppState, AppStateInner, PusherCredentials};

/// Every route of the service. CORS and tracing layers are added by the
/// binary.
pub fn router(state: AppState) -> Router {
    let public_routes = Router::new()
        .route("/auth/register", post(auth::register))
        .route("/auth/login", post(auth::login))
        .route("/api/webhooks/polar", post(webhooks::polar))
        .route("/gateway", get(gateway::upgrade));

    let protected_routes = Router::new()
        .route("/me", get(profile::me).patch(profile::update).delete(profile::delete))
        .route("/users/{id}", get(profile::public_profile))
        .route("/users/{id}/follow", post(social::follow).delete(social::unfollow))
        .route("/feed", get(social::feed))
        .route("/books", post(books::create).get(books::search))
        .route("/sessions", post(sessions::log).get(sessions::list))
        .route("/sessions/{id}", get(sessions::get))
        .route("/sessions/{id}/kudos", post(social::give_kudos).delete(social::remove_kudos))
        .route("/streak", get(streaks::streak))
        .route("/progress", get(streaks::progress))
        .route("/rooms", post(rooms::create))
        .route("/rooms/{id}", get(rooms::get).patch(rooms::update))
        .route("/moderation/flag", post(moderation::flag))
        .route("/admin/moderation", get(moderation::queue))
        .route("/admin/moderation/{id}/review", post(moderation::review))
        .route("/admin/removals", get(moderation::removals))
        .route("/admin/removals/{id}/restore", post(moderation::restore))
        .route("/admin/actions", get(admin::actions))
        .route("/admin/users/{id}/unsuspend", post(admin::unsuspend))
        .route("/admin/users/{id}/role", put(admin::set_role))
        .route("/admin/experiments/{name}", get(experiments::results))
        .route("/experiments/{name}/assign", post(experiments::assign))
        .route("/experiments/{name}/convert", post(experiments::convert))
        .route("/notifications", get(notifications::list))
        .route("/notifications/read", post(notifications::mark_read))
        .route("/api/pusher/auth", post(pusher::auth))
        .layer(axum_middleware::from_fn_with_state(
            state.clone(),
            middleware::require_auth,
        ));

    Router::new()
        .merge(public_routes)
        .merge(protected_routes)
        .with_state(state)
}
