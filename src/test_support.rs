//! Helpers for tests that drive the router or the database directly.

use axum::{
    body::{to_bytes, Body},
    http::{
        header::{CONTENT_TYPE, COOKIE, SET_COOKIE},
        Method, Request, StatusCode,
    },
    Router,
};
use chrono::{Duration, Utc};
use serde_json::{json, Value};
use sqlx::PgPool;
use tower::ServiceExt;
use uuid::Uuid;

use crate::{
    auth::session::TOKEN_COOKIE, config::settings::Settings, media::tests::offline_store, routes,
    AppState,
};

pub const PASSWORD: &str = "sunny-days-42";

pub fn app(pool: PgPool) -> Router {
    routes::router(AppState {
        pool,
        settings: Settings::for_tests(),
        media: offline_store(),
    })
}

/// Sends one request; the body is parsed as JSON when there is one.
pub async fn call(
    app: &Router,
    method: Method,
    uri: &str,
    cookie: Option<&str>,
    body: Option<Value>,
) -> (StatusCode, Value) {
    let (status, _, body) = call_raw(app, method, uri, cookie, body).await;
    (status, body)
}

async fn call_raw(
    app: &Router,
    method: Method,
    uri: &str,
    cookie: Option<&str>,
    body: Option<Value>,
) -> (StatusCode, Option<String>, Value) {
    let mut request = Request::builder().method(method).uri(uri);
    if let Some(cookie) = cookie {
        request = request.header(COOKIE, cookie);
    }
    let request = match body {
        Some(body) => request
            .header(CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => request.body(Body::empty()).unwrap(),
    };

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let token_cookie = response
        .headers()
        .get_all(SET_COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .filter_map(|v| v.split(';').next())
        .find(|pair| {
            pair.starts_with(&format!("{}=", TOKEN_COOKIE)) && pair.len() > TOKEN_COOKIE.len() + 1
        })
        .map(str::to_string);

    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or(Value::Null)
    };
    (status, token_cookie, body)
}

/// Registers `username` through the API; returns its id and session cookie.
pub async fn signup(app: &Router, username: &str) -> (Uuid, String) {
    let (status, cookie, body) = call_raw(
        app,
        Method::POST,
        "/api/users",
        None,
        Some(json!({
            "name": username,
            "username": username,
            "email": format!("{}@example.com", username),
            "password": PASSWORD,
            "age": 30,
        })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "{}", body);

    let id = body["data"]["id"].as_str().unwrap().parse().unwrap();
    (id, cookie.unwrap())
}

/// Logs in through the API; returns the status and the new cookie, if any.
pub async fn login(app: &Router, username: &str) -> (StatusCode, Option<String>) {
    let (status, cookie, _) = call_raw(
        app,
        Method::POST,
        "/api/users/login",
        None,
        Some(json!({ "username": username, "password": PASSWORD })),
    )
    .await;
    (status, cookie)
}

/// Inserts an account without going through signup (no password).
pub async fn insert_user(pool: &PgPool, username: &str, minutes_ago: i64) -> Uuid {
    sqlx::query_scalar::<_, Uuid>(
        r#"
        INSERT INTO users (id, name, username, email, created_at)
        VALUES ($1, $2, $2, $3, $4)
        RETURNING id
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(username)
    .bind(format!("{}@example.com", username))
    .bind(Utc::now() - Duration::minutes(minutes_ago))
    .fetch_one(pool)
    .await
    .unwrap()
}

/// Inserts a post without an image, `minutes_ago` in the past.
pub async fn insert_post(pool: &PgPool, owner: Uuid, minutes_ago: i64) -> Uuid {
    sqlx::query_scalar::<_, Uuid>(
        r#"
        INSERT INTO posts (id, owner_id, description, created_at)
        VALUES ($1, $2, 'a post', $3)
        RETURNING id
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(owner)
    .bind(Utc::now() - Duration::minutes(minutes_ago))
    .fetch_one(pool)
    .await
    .unwrap()
}

pub async fn follow(pool: &PgPool, follower: Uuid, following: Uuid) {
    sqlx::query("INSERT INTO follows (follower_id, following_id) VALUES ($1, $2)")
        .bind(follower)
        .bind(following)
        .execute(pool)
        .await
        .unwrap();
}

pub async fn count(pool: &PgPool, sql: &str, id: Uuid) -> i64 {
    sqlx::query_scalar::<_, i64>(sql)
        .bind(id)
        .fetch_one(pool)
        .await
        .unwrap()
}

/// Ids of the posts in a list response, in response order.
pub fn ids(body: &Value) -> Vec<Uuid> {
    body["data"]
        .as_array()
        .unwrap()
        .iter()
        .map(|p| p["id"].as_str().unwrap().parse().unwrap())
        .collect()
}
