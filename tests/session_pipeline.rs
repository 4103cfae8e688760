use axum::{
    Json, Router,
    extract::{Path, State},
    http::{HeaderMap, StatusCode, header},
    response::IntoResponse,
    routing::{get, post},
};
use esce_session::config::AppConfig;
use esce_session::session::{Identity, ProbeOutcome, PurgeReason, SessionEvent};
use esce_session::storage::{IDENTITY_KEY, StoreSet, TOKEN_KEY};
use esce_session::{AppContext, Error};
use serde_json::{Value, json};
use std::sync::{Arc, Mutex};

/// Mutable answers of the mock API.
#[derive(Clone, Default)]
struct MockApi {
    badges: Arc<Mutex<Value>>,
    profile: Arc<Mutex<Option<Value>>>,
}

async fn echo_auth(headers: HeaderMap) -> Json<Value> {
    let auth = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .map(String::from);
    Json(json!({ "authorization": auth }))
}

async fn echo_content_type(headers: HeaderMap) -> Json<Value> {
    let values: Vec<String> = headers
        .get_all(header::CONTENT_TYPE)
        .iter()
        .filter_map(|v| v.to_str().ok().map(String::from))
        .collect();
    Json(json!({ "contentType": values }))
}

async fn user(
    State(api): State<MockApi>,
    Path(id): Path<i64>,
    headers: HeaderMap,
) -> impl IntoResponse {
    if headers.get(header::AUTHORIZATION).is_none() {
        return (StatusCode::UNAUTHORIZED, Json(json!({}))).into_response();
    }
    match api.profile.lock().unwrap().clone() {
        Some(mut profile) => {
            profile["Id"] = json!(id);
            Json(profile).into_response()
        }
        None => (StatusCode::NOT_FOUND, Json(json!({ "message": "no such user" }))).into_response(),
    }
}

async fn badges(State(api): State<MockApi>) -> Json<Value> {
    Json(api.badges.lock().unwrap().clone())
}

async fn spawn_api(api: MockApi) -> String {
    let app = Router::new()
        .route("/api/echo-auth", get(echo_auth))
        .route("/api/upload", post(echo_content_type))
        .route("/api/user/{id}", get(user))
        .route("/api/statistics/admin-badges", get(badges))
        .route("/api/expired", get(|| async { StatusCode::UNAUTHORIZED }))
        .route(
            "/api/forbidden",
            get(|| async {
                (
                    StatusCode::FORBIDDEN,
                    Json(json!({ "message": "Admins only" })),
                )
            }),
        )
        .with_state(api);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{addr}/api")
}

fn context(base_url: String) -> AppContext {
    let mut config = AppConfig::default();
    config.api.base_url = base_url;
    AppContext::with_stores(config, StoreSet::in_memory()).unwrap()
}

fn sign_in(ctx: &AppContext, remember: bool) {
    let identity = Identity {
        id: Some(42),
        name: Some("Minh".into()),
        avatar: Some("minh.png".into()),
        ..Identity::default()
    };
    ctx.authority.establish("secret-token", &identity, remember).unwrap();
}

fn credential_snapshot(ctx: &AppContext) -> Vec<Option<String>> {
    let stores = ctx.authority.stores();
    vec![
        stores.durable.get(TOKEN_KEY),
        stores.durable.get(IDENTITY_KEY),
        stores.session.get(TOKEN_KEY),
        stores.session.get(IDENTITY_KEY),
    ]
}

#[tokio::test]
async fn test_bearer_token_is_attached() {
    let ctx = context(spawn_api(MockApi::default()).await);

    let anonymous: Value = ctx.client.get_json("echo-auth").await.unwrap();
    assert_eq!(anonymous["authorization"], Value::Null);

    sign_in(&ctx, false);
    let authed: Value = ctx.client.get_json("/echo-auth").await.unwrap();
    assert_eq!(authed["authorization"], "Bearer secret-token");
}

#[tokio::test]
async fn test_multipart_upload_keeps_boundary() {
    let ctx = context(spawn_api(MockApi::default()).await);
    sign_in(&ctx, true);

    let form = reqwest::multipart::Form::new()
        .text("title", "Ha Long Bay cruise")
        .part(
            "image",
            reqwest::multipart::Part::bytes(vec![0xFF, 0xD8, 0xFF]).file_name("cover.jpg"),
        );
    let body: Value = ctx.client.post_multipart("upload", form).await.unwrap();

    let values = body["contentType"].as_array().unwrap();
    assert_eq!(values.len(), 1);
    assert!(
        values[0]
            .as_str()
            .unwrap()
            .starts_with("multipart/form-data; boundary=")
    );
}

#[tokio::test]
async fn test_unauthorized_purges_and_redirects() {
    let ctx = context(spawn_api(MockApi::default()).await);
    sign_in(&ctx, true);
    ctx.authority
        .stores()
        .session
        .set(TOKEN_KEY, "stale-session-token")
        .unwrap();
    ctx.navigator.navigate("/admin/tours");
    let mut events = ctx.authority.subscribe();

    let err = ctx.client.get_json::<Value>("expired").await.unwrap_err();

    assert!(matches!(err, Error::SessionEnded));
    assert!(credential_snapshot(&ctx).iter().all(Option::is_none));
    assert_eq!(ctx.navigator.current(), "/login");
    assert!(matches!(
        events.recv().await.unwrap(),
        SessionEvent::Purged {
            reason: PurgeReason::Unauthorized,
            ..
        }
    ));
    assert_eq!(
        events.recv().await.unwrap(),
        SessionEvent::Redirect {
            to: "/login".into()
        }
    );
}

#[tokio::test]
async fn test_unauthorized_on_public_page_stays_put() {
    let ctx = context(spawn_api(MockApi::default()).await);
    sign_in(&ctx, false);
    ctx.navigator.navigate("/tours/18");

    let err = ctx.client.get_json::<Value>("expired").await.unwrap_err();

    assert!(matches!(err, Error::SessionEnded));
    assert!(!ctx.authority.is_authenticated());
    assert_eq!(ctx.navigator.current(), "/tours/18");
}

#[tokio::test]
async fn test_forbidden_is_action_local() {
    let ctx = context(spawn_api(MockApi::default()).await);
    sign_in(&ctx, true);
    let before = credential_snapshot(&ctx);

    let err = ctx.client.get_json::<Value>("forbidden").await.unwrap_err();

    match err {
        Error::Forbidden { message } => assert_eq!(message, "Admins only"),
        other => panic!("expected Forbidden, got {other:?}"),
    }
    assert_eq!(credential_snapshot(&ctx), before);
}

#[tokio::test]
async fn test_probe_merges_pascal_case_profile() {
    let api = MockApi::default();
    *api.profile.lock().unwrap() = Some(json!({
        "Name": "Minh Nguyen",
        "Email": "minh@esce.vn",
        "RoleId": 1,
        "RoleName": "Admin"
    }));
    let ctx = context(spawn_api(api).await);
    sign_in(&ctx, true);

    let outcome = ctx.authority.validate_session(&ctx.client).await;

    let ProbeOutcome::Refreshed(identity) = outcome else {
        panic!("expected Refreshed, got {outcome:?}");
    };
    assert_eq!(identity.id, Some(42));
    assert_eq!(identity.name.as_deref(), Some("Minh Nguyen"));
    assert_eq!(identity.role_id, Some(1));
    assert_eq!(identity.avatar.as_deref(), Some("minh.png"));
    assert_eq!(ctx.authority.identity().unwrap(), Some(identity));
}

#[tokio::test]
async fn test_probe_purges_deleted_user() {
    let ctx = context(spawn_api(MockApi::default()).await);
    sign_in(&ctx, false);

    let outcome = ctx.authority.validate_session(&ctx.client).await;

    assert_eq!(outcome, ProbeOutcome::Purged(PurgeReason::UserNotFound));
    assert!(credential_snapshot(&ctx).iter().all(Option::is_none));
}

#[tokio::test]
async fn test_probe_survives_network_outage() {
    // Reserve a port, then close it so connections are refused.
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let ctx = context(format!("http://{addr}/api"));
    sign_in(&ctx, true);
    let before = credential_snapshot(&ctx);

    let outcome = ctx.authority.validate_session(&ctx.client).await;

    assert!(matches!(outcome, ProbeOutcome::Inconclusive(_)));
    assert_eq!(credential_snapshot(&ctx), before);
}

#[tokio::test]
async fn test_badge_summary_casing_is_normalized() {
    for body in [
        json!({ "PendingPosts": 3, "UnreadMessages": 1 }),
        json!({ "pendingPosts": 3, "unreadMessages": 1 }),
    ] {
        let api = MockApi::default();
        *api.badges.lock().unwrap() = body;
        let ctx = context(spawn_api(api).await);
        sign_in(&ctx, true);

        assert!(ctx.badges.fetch_raw_totals(&ctx.client).await);

        let totals = ctx.badges.totals();
        assert_eq!(totals.posts, 3);
        assert_eq!(totals.messages, 1);
    }
}

#[tokio::test]
async fn test_badges_follow_navigation_and_polls() {
    let api = MockApi::default();
    *api.badges.lock().unwrap() = json!({ "PendingPosts": 10 });
    let ctx = context(spawn_api(api.clone()).await);
    sign_in(&ctx, true);

    ctx.badges.fetch_raw_totals(&ctx.client).await;
    assert_eq!(ctx.badges.visible().posts, 10);

    ctx.navigator.navigate("/admin/posts-approval");
    ctx.badges.on_route(&ctx.navigator.current());
    assert_eq!(ctx.badges.watermarks().posts, 10);
    assert_eq!(ctx.badges.visible().posts, 0);

    *api.badges.lock().unwrap() = json!({ "PendingPosts": 12 });
    ctx.badges.fetch_raw_totals(&ctx.client).await;
    assert_eq!(ctx.badges.visible().posts, 2);
}

#[tokio::test]
async fn test_badge_fetch_failure_keeps_last_totals() {
    let api = MockApi::default();
    *api.badges.lock().unwrap() = json!({ "pendingServices": 4 });
    let ctx = context(spawn_api(api.clone()).await);
    sign_in(&ctx, true);
    ctx.badges.fetch_raw_totals(&ctx.client).await;

    *api.badges.lock().unwrap() = json!({ "pendingServices": "not a number" });
    assert!(!ctx.badges.fetch_raw_totals(&ctx.client).await);

    assert_eq!(ctx.badges.visible().services, 4);
    assert!(ctx.authority.is_authenticated());
}
