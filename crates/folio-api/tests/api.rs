use std::sync::Arc;

use axum::{
    Router,
    body::Body,
    http::{Request, StatusCode, header},
};
use chrono::{Duration, Utc};
use http_body_util::BodyExt;
use serde_json::{Value, json};
use tower::ServiceExt;
use uuid::Uuid;

use folio_api::{AppState, AppStateInner, PusherCredentials, auth::create_token, router};
use folio_core::webhook::WebhookVerifier;
use folio_db::Database;
use folio_gateway::dispatcher::Dispatcher;
use folio_types::models::Role;

const JWT_SECRET: &str = "test-jwt-secret";
const WEBHOOK_SECRET: &str = "test-webhook-secret";

struct TestApp {
    state: AppState,
    router: Router,
}

struct TestUser {
    id: Uuid,
    token: String,
}

impl TestApp {
    fn new() -> Self {
        let state: AppState = Arc::new(AppStateInner {
            db: Arc::new(Database::open_in_memory().unwrap()),
            jwt_secret: JWT_SECRET.into(),
            dispatcher: Dispatcher::new(),
            webhooks: WebhookVerifier::new(WEBHOOK_SECRET).unwrap(),
            pusher: PusherCredentials {
                key: "app-key".into(),
                secret: "app-secret".into(),
            },
        });
        Self {
            router: router(state.clone()),
            state,
        }
    }

    /// Users are inserted directly so tests skip password hashing.
    fn user(&self, name: &str, role: Role) -> TestUser {
        let id = Uuid::new_v4();
        assert!(self.state.db.create_user(id, name, "unused-hash", role).unwrap());
        TestUser {
            id,
            token: create_token(JWT_SECRET, id, name, role).unwrap(),
        }
    }

    async fn send(&self, req: Request<Body>) -> (StatusCode, Value) {
        let response = self.router.clone().oneshot(req).await.unwrap();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, body)
    }

    async fn call(&self, method: &str, uri: &str, token: Option<&str>, body: Option<Value>) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
        }
        let req = match body {
            Some(json) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(json.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };
        self.send(req).await
    }

    async fn add_book(&self, user: &TestUser) -> String {
        let (status, body) = self
            .call(
                "POST",
                "/books",
                Some(&user.token),
                Some(json!({ "title": "Dune", "author": "Frank Herbert" })),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED);
        body["data"]["id"].as_str().unwrap().to_string()
    }

    async fn log_minutes(&self, user: &TestUser, book_id: &str, minutes: i64) -> (StatusCode, Value) {
        let ended = Utc::now() - Duration::minutes(1);
        let started = ended - Duration::minutes(minutes);
        self.call(
            "POST",
            "/sessions",
            Some(&user.token),
            Some(json!({
                "book_id": book_id,
                "duration_minutes": minutes,
                "started_at": started,
                "ended_at": ended,
            })),
        )
        .await
    }

    async fn set_bio(&self, user: &TestUser, bio: &str) {
        let (status, _) = self
            .call("PATCH", "/me", Some(&user.token), Some(json!({ "bio": bio })))
            .await;
        assert_eq!(status, StatusCode::OK);
    }

    async fn flag_bio(&self, reporter: &TestUser, owner: &TestUser) -> String {
        let (status, body) = self
            .call(
                "POST",
                "/moderation/flag",
                Some(&reporter.token),
                Some(json!({
                    "content_type": "USER_BIO",
                    "content_id": owner.id,
                    "reason": "spam links",
                })),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED, "{body}");
        body["data"]["id"].as_str().unwrap().to_string()
    }
}

#[tokio::test]
async fn register_login_and_profile() {
    let app = TestApp::new();

    let creds = json!({ "username": "ada", "password": "correct horse" });
    let (status, body) = app.call("POST", "/auth/register", None, Some(creds.clone())).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["success"], true);
    assert_eq!(body["data"]["role"], "USER");

    let (status, body) = app.call("POST", "/auth/register", None, Some(creds.clone())).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"], "Username is already taken");

    let (status, _) = app
        .call(
            "POST",
            "/auth/login",
            None,
            Some(json!({ "username": "ada", "password": "wrong password" })),
        )
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, body) = app.call("POST", "/auth/login", None, Some(creds)).await;
    assert_eq!(status, StatusCode::OK);
    let token = body["data"]["token"].as_str().unwrap().to_string();

    let (status, body) = app.call("GET", "/me", Some(&token), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["username"], "ada");
    assert_eq!(body["data"]["daily_goal_minutes"], 15);
    assert_eq!(body["data"]["current_streak"], 0);
}

#[tokio::test]
async fn protected_routes_need_a_valid_token() {
    let app = TestApp::new();

    let (status, body) = app.call("GET", "/me", None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body, json!({ "success": false, "error": "Unauthorized" }));

    let (status, _) = app.call("GET", "/me", Some("not-a-jwt"), None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    // A deleted account's token stops working.
    let ada = app.user("ada", Role::User);
    let (status, _) = app.call("DELETE", "/me", Some(&ada.token), None).await;
    assert_eq!(status, StatusCode::OK);
    let (status, _) = app.call("GET", "/me", Some(&ada.token), None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn profile_update_is_validated() {
    let app = TestApp::new();
    let ada = app.user("ada", Role::User);

    let (status, body) = app
        .call("PATCH", "/me", Some(&ada.token), Some(json!({ "daily_goal_minutes": 2 })))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Daily goal must be between 5 and 600 minutes");

    let (status, body) = app
        .call("PATCH", "/me", Some(&ada.token), Some(json!({ "unknown": true })))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Invalid input");

    let (status, body) = app
        .call(
            "PATCH",
            "/me",
            Some(&ada.token),
            Some(json!({ "bio": "  reading everything  ", "daily_goal_minutes": 30 })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["bio"], "reading everything");
    assert_eq!(body["data"]["daily_goal_minutes"], 30);
}

#[tokio::test]
async fn logging_a_session_meets_the_goal_and_starts_a_streak() {
    let app = TestApp::new();
    let ada = app.user("ada", Role::User);
    let book = app.add_book(&ada).await;

    let (status, body) = app.log_minutes(&ada, &book, 10).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["data"]["streak"]["current"], 0);

    let (status, body) = app.log_minutes(&ada, &book, 10).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["data"]["session"]["book_title"], "Dune");
    assert_eq!(body["data"]["streak"]["current"], 1);
    assert_eq!(body["data"]["streak"]["longest"], 1);

    let (status, body) = app.call("GET", "/sessions", Some(&ada.token), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"].as_array().unwrap().len(), 2);

    let (status, body) = app.call("GET", "/progress?days=7", Some(&ada.token), None).await;
    assert_eq!(status, StatusCode::OK);
    let minutes: u64 = body["data"]
        .as_array()
        .unwrap()
        .iter()
        .map(|d| d["minutes"].as_u64().unwrap())
        .sum();
    assert_eq!(minutes, 20);

    let (status, body) = app.call("GET", "/progress?days=91", Some(&ada.token), None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Days must be between 1 and 90");
}

#[tokio::test]
async fn session_input_is_checked() {
    let app = TestApp::new();
    let ada = app.user("ada", Role::User);

    let (status, body) = app.log_minutes(&ada, &Uuid::new_v4().to_string(), 10).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "Book not found");

    let book = app.add_book(&ada).await;
    let (status, body) = app.log_minutes(&ada, &book, 721).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Duration must be between 1 and 720 minutes");
}

#[tokio::test]
async fn kudos_rules_and_notification() {
    let app = TestApp::new();
    let ada = app.user("ada", Role::User);
    let grace = app.user("grace", Role::User);
    let book = app.add_book(&ada).await;
    let (_, body) = app.log_minutes(&ada, &book, 5).await;
    let session = body["data"]["session"]["id"].as_str().unwrap().to_string();
    let uri = format!("/sessions/{session}/kudos");

    let (status, body) = app.call("POST", &uri, Some(&ada.token), None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "You cannot give kudos to your own session");

    let (status, body) = app.call("POST", &uri, Some(&grace.token), None).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["data"]["receiver_id"], ada.id.to_string());

    let (status, _) = app.call("POST", &uri, Some(&grace.token), None).await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (_, body) = app.call("GET", "/notifications", Some(&ada.token), None).await;
    let notifications = body["data"].as_array().unwrap();
    assert_eq!(notifications.len(), 1);
    assert_eq!(notifications[0]["kind"], "kudos_received");
    assert_eq!(notifications[0]["payload"]["from_username"], "grace");

    let (status, body) = app.call("DELETE", &uri, Some(&grace.token), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["removed"], true);
}

#[tokio::test]
async fn follows_feed_and_public_profile() {
    let app = TestApp::new();
    let ada = app.user("ada", Role::User);
    let grace = app.user("grace", Role::User);
    let book = app.add_book(&grace).await;
    app.log_minutes(&grace, &book, 20).await;

    let (status, body) = app
        .call("POST", &format!("/users/{}/follow", ada.id), Some(&ada.token), None)
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "You cannot follow yourself");

    let follow = format!("/users/{}/follow", grace.id);
    let (status, _) = app.call("POST", &follow, Some(&ada.token), None).await;
    assert_eq!(status, StatusCode::OK);
    // Idempotent.
    let (status, _) = app.call("POST", &follow, Some(&ada.token), None).await;
    assert_eq!(status, StatusCode::OK);

    let (_, body) = app.call("GET", "/feed", Some(&ada.token), None).await;
    assert_eq!(body["data"][0]["username"], "grace");

    let (_, body) = app
        .call("GET", &format!("/users/{}", grace.id), Some(&ada.token), None)
        .await;
    assert_eq!(body["data"]["followers"], 1);
    assert_eq!(body["data"]["current_streak"], 1);
    assert_eq!(body["data"]["followed_by_me"], true);

    let (status, body) = app.call("DELETE", &follow, Some(&ada.token), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["following"], false);

    let (_, body) = app
        .call("GET", &format!("/users/{}", grace.id), Some(&ada.token), None)
        .await;
    assert_eq!(body["data"]["followers"], 0);
    assert_eq!(body["data"]["followed_by_me"], false);
}

#[tokio::test]
async fn rooms_are_edited_by_their_owner_only() {
    let app = TestApp::new();
    let ada = app.user("ada", Role::User);
    let grace = app.user("grace", Role::User);

    let (status, body) = app
        .call(
            "POST",
            "/rooms",
            Some(&ada.token),
            Some(json!({ "name": "Sci-fi club", "description": "Spice must flow" })),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);
    let uri = format!("/rooms/{}", body["data"]["id"].as_str().unwrap());

    let patch = json!({ "description": "Hijacked" });
    let (status, _) = app.call("PATCH", &uri, Some(&grace.token), Some(patch)).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, body) = app
        .call("PATCH", &uri, Some(&ada.token), Some(json!({ "description": "" })))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["data"]["description"].is_null());

    let (status, body) = app
        .call("GET", &format!("/rooms/{}", Uuid::new_v4()), Some(&ada.token), None)
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "Room not found");
}

#[tokio::test]
async fn remove_then_restore_within_window() {
    let app = TestApp::new();
    let admin = app.user("mod", Role::Admin);
    let ada = app.user("ada", Role::User);
    let grace = app.user("grace", Role::User);
    app.set_bio(&ada, "buy cheap pills").await;

    let item = app.flag_bio(&grace, &ada).await;
    let (status, body) = app
        .call(
            "POST",
            "/moderation/flag",
            Some(&grace.token),
            Some(json!({ "content_type": "USER_BIO", "content_id": ada.id, "reason": "again" })),
        )
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"], "You have already reported this content");

    let (status, _) = app.call("GET", "/admin/moderation", Some(&ada.token), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (_, body) = app
        .call("GET", "/admin/moderation?status=PENDING", Some(&admin.token), None)
        .await;
    assert_eq!(body["data"][0]["content_preview"], "buy cheap pills");

    let review = format!("/admin/moderation/{item}/review");
    let (status, body) = app
        .call("POST", &review, Some(&admin.token), Some(json!({ "action": "REMOVE" })))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "A violation type is required to remove content");

    let (status, body) = app
        .call(
            "POST",
            &review,
            Some(&admin.token),
            Some(json!({ "action": "REMOVE", "violation_type": "SPAM" })),
        )
        .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["data"]["item"]["status"], "REMOVED");
    let removal = body["data"]["removal_id"].as_str().unwrap().to_string();

    let (status, _) = app
        .call("POST", &review, Some(&admin.token), Some(json!({ "action": "DISMISS" })))
        .await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (_, body) = app.call("GET", "/me", Some(&ada.token), None).await;
    assert!(body["data"]["bio"].is_null());

    let (_, body) = app
        .call("GET", "/admin/removals?restorable=true", Some(&admin.token), None)
        .await;
    assert_eq!(body["data"][0]["restorable"], true);

    let restore = format!("/admin/removals/{removal}/restore");
    let (status, body) = app.call("POST", &restore, Some(&admin.token), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["restorable"], false);

    let (status, body) = app.call("POST", &restore, Some(&admin.token), None).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"], "This content has already been restored");

    let (_, body) = app.call("GET", "/me", Some(&ada.token), None).await;
    assert_eq!(body["data"]["bio"], "buy cheap pills");

    let (_, body) = app.call("GET", "/notifications", Some(&ada.token), None).await;
    let kinds: Vec<&str> = body["data"]
        .as_array()
        .unwrap()
        .iter()
        .map(|n| n["kind"].as_str().unwrap())
        .collect();
    assert!(kinds.contains(&"content_removed"));
    assert!(kinds.contains(&"content_restored"));

    let (_, body) = app.call("GET", "/admin/actions", Some(&admin.token), None).await;
    let actions: Vec<&str> = body["data"]
        .as_array()
        .unwrap()
        .iter()
        .map(|a| a["action"].as_str().unwrap())
        .collect();
    assert_eq!(actions, ["CONTENT_RESTORE", "CONTENT_REMOVE"]);
}

#[tokio::test]
async fn suspension_blocks_writes_until_lifted() {
    let app = TestApp::new();
    let admin = app.user("mod", Role::Admin);
    let ada = app.user("ada", Role::User);
    let grace = app.user("grace", Role::User);
    app.set_bio(&ada, "rude words").await;
    let item = app.flag_bio(&grace, &ada).await;

    let (status, body) = app
        .call(
            "POST",
            &format!("/admin/moderation/{item}/review"),
            Some(&admin.token),
            Some(json!({ "action": "SUSPEND", "suspend_days": 3 })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["data"]["suspended_until"].is_string());

    let (status, _) = app
        .call("POST", "/books", Some(&ada.token), Some(json!({ "title": "A", "author": "B" })))
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    // Reads still work.
    let (status, _) = app.call("GET", "/me", Some(&ada.token), None).await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = app
        .call("POST", &format!("/admin/users/{}/unsuspend", ada.id), Some(&admin.token), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["data"]["suspended_until"].is_null());

    let (status, _) = app
        .call("POST", "/books", Some(&ada.token), Some(json!({ "title": "A", "author": "B" })))
        .await;
    assert_eq!(status, StatusCode::CREATED);
}

#[tokio::test]
async fn suspended_users_cannot_undo_social_actions() {
    let app = TestApp::new();
    let admin = app.user("mod", Role::Admin);
    let ada = app.user("ada", Role::User);
    let grace = app.user("grace", Role::User);
    let book = app.add_book(&grace).await;
    let (_, body) = app.log_minutes(&grace, &book, 5).await;
    let session = body["data"]["session"]["id"].as_str().unwrap().to_string();

    let follow = format!("/users/{}/follow", grace.id);
    let kudos = format!("/sessions/{session}/kudos");
    let (status, _) = app.call("POST", &follow, Some(&ada.token), None).await;
    assert_eq!(status, StatusCode::OK);
    let (status, _) = app.call("POST", &kudos, Some(&ada.token), None).await;
    assert_eq!(status, StatusCode::CREATED);

    app.set_bio(&ada, "rude words").await;
    let item = app.flag_bio(&grace, &ada).await;
    let (status, _) = app
        .call(
            "POST",
            &format!("/admin/moderation/{item}/review"),
            Some(&admin.token),
            Some(json!({ "action": "SUSPEND", "suspend_days": 1 })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = app.call("DELETE", &follow, Some(&ada.token), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    let (status, _) = app.call("DELETE", &kudos, Some(&ada.token), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (_, body) = app
        .call("GET", &format!("/users/{}", grace.id), Some(&grace.token), None)
        .await;
    assert_eq!(body["data"]["followers"], 1);
    let (_, body) = app.call("GET", "/feed", Some(&ada.token), None).await;
    assert_eq!(body["data"][0]["kudos_count"], 1);
}

#[tokio::test]
async fn only_super_admins_change_roles() {
    let app = TestApp::new();
    let root = app.user("root", Role::SuperAdmin);
    let admin = app.user("mod", Role::Admin);
    let ada = app.user("ada", Role::User);
    let uri = format!("/admin/users/{}/role", ada.id);

    let (status, _) = app
        .call("PUT", &uri, Some(&admin.token), Some(json!({ "role": "ADMIN" })))
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, body) = app
        .call(
            "PUT",
            &format!("/admin/users/{}/role", root.id),
            Some(&root.token),
            Some(json!({ "role": "USER" })),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "You cannot change your own role");

    let (status, body) = app
        .call("PUT", &uri, Some(&root.token), Some(json!({ "role": "ADMIN" })))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["role"], "ADMIN");

    // The role is read from storage, not from the old token.
    let (status, _) = app.call("GET", "/admin/actions", Some(&ada.token), None).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn experiments_assign_convert_and_report() {
    let app = TestApp::new();
    let admin = app.user("mod", Role::Admin);
    let ada = app.user("ada", Role::User);

    let (status, _) = app
        .call("POST", "/experiments/onboarding/convert", Some(&ada.token), None)
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (_, first) = app
        .call("POST", "/experiments/onboarding/assign", Some(&ada.token), None)
        .await;
    let (_, second) = app
        .call("POST", "/experiments/onboarding/assign", Some(&ada.token), None)
        .await;
    assert_eq!(first["data"]["variant"], second["data"]["variant"]);

    let (status, body) = app
        .call("POST", "/experiments/onboarding/convert", Some(&ada.token), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["converted"], true);

    let (status, _) = app
        .call("GET", "/admin/experiments/onboarding", Some(&ada.token), None)
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, body) = app
        .call("GET", "/admin/experiments/onboarding", Some(&admin.token), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    let variants = body["data"]["variants"].as_array().unwrap();
    assert_eq!(variants.len(), 2);
    let participants: u64 = variants.iter().map(|v| v["participants"].as_u64().unwrap()).sum();
    assert_eq!(participants, 1);
    assert_eq!(body["data"]["significance"], "Not significant");
}

fn signed_webhook(body: &Value, msg_id: &str) -> Request<Body> {
    let raw = body.to_string();
    let now = Utc::now().timestamp();
    let signature = WebhookVerifier::new(WEBHOOK_SECRET)
        .unwrap()
        .sign(msg_id, now, raw.as_bytes());
    Request::builder()
        .method("POST")
        .uri("/api/webhooks/polar")
        .header(header::CONTENT_TYPE, "application/json")
        .header("webhook-id", msg_id)
        .header("webhook-timestamp", now.to_string())
        .header("webhook-signature", signature)
        .body(Body::from(raw))
        .unwrap()
}

#[tokio::test]
async fn payment_webhook_activates_premium_once() {
    let app = TestApp::new();
    let ada = app.user("ada", Role::User);
    let event = json!({
        "type": "checkout.updated",
        "data": {
            "id": "co_123",
            "status": "succeeded",
            "amount": 499,
            "currency": "usd",
            "metadata": { "user_id": ada.id },
        },
    });

    let (status, body) = app.send(signed_webhook(&event, "msg_1")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"], json!({ "received": true, "duplicate": false }));

    let (status, body) = app.send(signed_webhook(&event, "msg_2")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["duplicate"], true);

    let (_, body) = app.call("GET", "/me", Some(&ada.token), None).await;
    assert_eq!(body["data"]["is_premium"], true);

    let (_, body) = app.call("GET", "/notifications", Some(&ada.token), None).await;
    let activations = body["data"]
        .as_array()
        .unwrap()
        .iter()
        .filter(|n| n["kind"] == "premium_activated")
        .count();
    assert_eq!(activations, 1);
}

#[tokio::test]
async fn payment_webhook_for_unknown_user_is_acknowledged() {
    let app = TestApp::new();
    let event = json!({
        "type": "checkout.updated",
        "data": {
            "id": "co_ghost",
            "status": "succeeded",
            "amount": 499,
            "currency": "usd",
            "metadata": { "user_id": Uuid::new_v4() },
        },
    });

    let (status, body) = app.send(signed_webhook(&event, "msg_1")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"], json!({ "received": true, "duplicate": false }));

    let (stored, linked) = app
        .state
        .db
        .with_conn(|conn| {
            Ok(conn.query_row(
                "SELECT COUNT(*), COUNT(user_id) FROM payments WHERE checkout_id = 'co_ghost'",
                [],
                |r| Ok((r.get::<_, i64>(0)?, r.get::<_, i64>(1)?)),
            )?)
        })
        .unwrap();
    assert_eq!((stored, linked), (1, 0));

    // Redelivery still succeeds.
    let (status, body) = app.send(signed_webhook(&event, "msg_2")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["duplicate"], true);
}

#[tokio::test]
async fn payment_webhook_rejects_bad_signatures() {
    let app = TestApp::new();
    let event = json!({ "type": "order.paid", "data": { "id": "ord_1" } });

    let mut req = signed_webhook(&event, "msg_1");
    req.headers_mut()
        .insert("webhook-signature", "v1,AAAA".parse().unwrap());
    let (status, _) = app.send(req).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let mut req = signed_webhook(&event, "msg_1");
    req.headers_mut().remove("webhook-id");
    let (status, _) = app.send(req).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

async fn channel_auth(app: &TestApp, user: &TestUser, socket_id: &str, channel: &str) -> (StatusCode, Value) {
    let req = Request::builder()
        .method("POST")
        .uri("/api/pusher/auth")
        .header(header::AUTHORIZATION, format!("Bearer {}", user.token))
        .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
        .body(Body::from(format!("socket_id={socket_id}&channel_name={channel}")))
        .unwrap();
    app.send(req).await
}

#[tokio::test]
async fn channel_auth_signs_only_allowed_channels() {
    let app = TestApp::new();
    let ada = app.user("ada", Role::User);
    let grace = app.user("grace", Role::User);
    let room = app
        .state
        .db
        .create_room(Uuid::new_v4(), ada.id, "club", None)
        .unwrap();

    let own = format!("private-user-{}", ada.id);
    let (status, body) = channel_auth(&app, &ada, "123.456", &own).await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["data"]["auth"].as_str().unwrap().starts_with("app-key:"));
    assert!(body["data"].get("channel_data").is_none());

    let (status, _) = channel_auth(&app, &grace, "123.456", &own).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, body) = channel_auth(&app, &ada, "nope", &own).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Invalid socket id");

    let presence = format!("presence-room-{}", room.id);
    let (status, body) = channel_auth(&app, &grace, "1.2", &presence).await;
    assert_eq!(status, StatusCode::OK);
    let data: Value = serde_json::from_str(body["data"]["channel_data"].as_str().unwrap()).unwrap();
    assert_eq!(data["user_info"]["username"], "grace");

    let missing = format!("presence-room-{}", Uuid::new_v4());
    let (status, _) = channel_auth(&app, &grace, "1.2", &missing).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}
