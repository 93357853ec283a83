use std::sync::Arc;

use folio_core::webhook::WebhookVerifier;
use folio_db::Database;
use folio_gateway::dispatcher::Dispatcher;

pub type AppState = Arc<AppStateInner>;

pub struct AppStateInner {
    pub db: Arc<Database>,
    pub jwt_secret: String,
    pub dispatcher: Dispatcher,
    pub webhooks: WebhookVerifier,
    pub pusher: PusherCredentials,
}

/// App key and secret used to sign channel subscriptions.
#[derive(Clone)]
pub struct PusherCredentials {
    pub key: String,
    pub secret: String,
}
