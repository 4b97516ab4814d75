#![allow(dead_code)]

use axum::{
    Router,
    body::Body,
    http::{Request, Response, StatusCode},
};
use http_body_util::BodyExt;
use serde_json::{Value, json};
use std::sync::Arc;
use tollgate::{
    ServerConfig,
    clock::{Clock, ManualClock},
    create_app,
    db::Database,
    roles::ADMIN,
    server_config::{RateLimitSettings, ServerSettings},
    store::IdentityStore,
};
use tower::ServiceExt;

pub const JWT_SECRET: &[u8] = b"integration-test-secret-0123456789abcdef";
pub const PASSWORD: &str = "Secret123!";

pub struct TestApp {
    pub app: Router,
    pub clock: ManualClock,
    pub db: Database,
}

/// Settings used by most tests: production TTLs, no rate limits.
pub fn test_settings() -> ServerSettings {
    ServerSettings {
        rate_limits: RateLimitSettings::unlimited(),
        ..Default::default()
    }
}

pub async fn create_test_app() -> TestApp {
    create_test_app_with(test_settings()).await
}

pub async fn create_test_app_with(settings: ServerSettings) -> TestApp {
    let db = Database::open(":memory:")
        .await
        .expect("Failed to open test database");
    let clock = ManualClock::starting_now();
    let config = ServerConfig::sqlite(&db, JWT_SECRET, settings)
        .await
        .expect("Failed to load roles")
        .with_clock(Arc::new(clock.clone()));

    TestApp {
        app: create_app(&config),
        clock,
        db,
    }
}

/// Tokens handed out by a successful login.
pub struct Tokens {
    pub access: String,
    pub refresh: String,
}

impl Tokens {
    pub fn both(&self) -> String {
        format!("access_token={}; refresh_token={}", self.access, self.refresh)
    }

    pub fn refresh_only(&self) -> String {
        format!("refresh_token={}", self.refresh)
    }
}

impl TestApp {
    pub fn now(&self) -> i64 {
        self.clock.now() as i64
    }

    pub async fn send(&self, request: Request<Body>) -> Response<Body> {
        self.app.clone().oneshot(request).await.unwrap()
    }

    pub async fn post_json(&self, uri: &str, body: Value, cookie: Option<&str>) -> Response<Body> {
        self.send(json_request("POST", uri, body, cookie)).await
    }

    pub async fn get(&self, uri: &str, cookie: &str) -> Response<Body> {
        self.send(
            Request::builder()
                .method("GET")
                .uri(uri)
                .header("cookie", cookie)
                .body(Body::empty())
                .unwrap(),
        )
        .await
    }

    /// Register and return the new user's id.
    pub async fn register(&self, username: &str) -> i64 {
        let response = self
            .post_json(
                "/api/register",
                json!({
                    "username": username,
                    "email": format!("{username}@example.com"),
                    "password": PASSWORD,
                }),
                None,
            )
            .await;
        assert_eq!(response.status(), StatusCode::CREATED);
        body_json(response).await["data"]["id"].as_i64().unwrap()
    }

    pub async fn login(&self, username: &str) -> Tokens {
        self.login_from(username, "test-agent").await
    }

    pub async fn login_from(&self, username: &str, user_agent: &str) -> Tokens {
        let response = self
            .send(
                Request::builder()
                    .method("POST")
                    .uri("/api/login")
                    .header("content-type", "application/json")
                    .header("user-agent", user_agent)
                    .body(Body::from(
                        json!({ "username": username, "password": PASSWORD }).to_string(),
                    ))
                    .unwrap(),
            )
            .await;
        assert_eq!(response.status(), StatusCode::OK);

        let cookies = set_cookies(&response);
        Tokens {
            access: cookie_value(&cookies, "access_token").expect("access cookie"),
            refresh: cookie_value(&cookies, "refresh_token").expect("refresh cookie"),
        }
    }

    /// Register a user, promote it to admin and log in.
    pub async fn admin(&self, username: &str) -> (i64, Tokens) {
        let id = self.register(username).await;
        let admin = self
            .db
            .roles()
            .load_hierarchy()
            .await
            .unwrap()
            .by_name(ADMIN)
            .unwrap()
            .id;
        assert!(self.db.users().set_role(id, admin).await.unwrap());
        (id, self.login(username).await)
    }
}

pub fn json_request(method: &str, uri: &str, body: Value, cookie: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", "application/json");
    if let Some(cookie) = cookie {
        builder = builder.header("cookie", cookie);
    }
    builder.body(Body::from(body.to_string())).unwrap()
}

pub async fn body_json(response: Response<Body>) -> Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

/// Extract Set-Cookie headers from response
pub fn set_cookies(response: &Response<Body>) -> Vec<String> {
    response
        .headers()
        .get_all("set-cookie")
        .iter()
        .filter_map(|v| v.to_str().ok())
        .map(|s| s.to_string())
        .collect()
}

/// Value of a cookie being set (not cleared).
pub fn cookie_value(cookies: &[String], name: &str) -> Option<String> {
    let prefix = format!("{name}=");
    cookies
        .iter()
        .filter(|c| !c.contains("Max-Age=0"))
        .find_map(|c| c.strip_prefix(&prefix))
        .and_then(|rest| rest.split(';').next())
        .map(str::to_string)
}

/// Check if cookies contain a token being cleared (Max-Age=0)
pub fn has_cleared_cookie(cookies: &[String], name: &str) -> bool {
    cookies
        .iter()
        .any(|c| c.starts_with(&format!("{name}=")) && c.contains("Max-Age=0"))
}
