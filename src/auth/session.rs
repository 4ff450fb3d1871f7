use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use chrono::{Duration, Utc};
use sqlx::{PgPool, Row};
use uuid::Uuid;

use crate::{auth::User, config::settings::Settings, error::AppError};

pub const TOKEN_COOKIE: &str = "token";
pub const OAUTH_COOKIE: &str = "isOAuth";
pub const MAX_SESSIONS: i64 = 5;

pub fn ensure_capacity(active_sessions: i64) -> Result<(), AppError> {
    if active_sessions >= MAX_SESSIONS {
        return Err(AppError::UnprocessableEntity(
            "You have exceeded the maximum number of sessions allowed. Please log out of one of your other devices and try again.".to_string(),
        ));
    }
    Ok(())
}

/// Adds `value` to the user's session set, refusing a sixth live session.
/// Expired sessions are purged first; re-presenting a stored value only
/// extends its expiry.
pub async fn open_session(
    pool: &PgPool,
    user_id: Uuid,
    value: &str,
    ttl_hours: i64,
) -> Result<(), AppError> {
    let expires_at = Utc::now() + Duration::hours(ttl_hours);
    let mut tx = pool.begin().await?;

    // Serialize concurrent logins of the same account.
    sqlx::query("SELECT id FROM users WHERE id = $1 FOR UPDATE")
        .bind(user_id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or(AppError::NotFound("User not found".to_string()))?;

    let purged = sqlx::query("DELETE FROM user_sessions WHERE user_id = $1 AND expires_at <= NOW()")
        .bind(user_id)
        .execute(&mut *tx)
        .await?
        .rows_affected();
    if purged > 0 {
        tracing::debug!(user_id = %user_id, purged, "expired sessions removed");
    }

    let refreshed = sqlx::query(
        "UPDATE user_sessions SET expires_at = $3 WHERE user_id = $1 AND token = $2",
    )
    .bind(user_id)
    .bind(value)
    .bind(expires_at)
    .execute(&mut *tx)
    .await?
    .rows_affected();

    if refreshed == 0 {
        let active: i64 =
            sqlx::query("SELECT COUNT(*) AS count FROM user_sessions WHERE user_id = $1")
                .bind(user_id)
                .fetch_one(&mut *tx)
                .await?
                .get("count");

        ensure_capacity(active)?;

        sqlx::query("INSERT INTO user_sessions (user_id, token, expires_at) VALUES ($1, $2, $3)")
            .bind(user_id)
            .bind(value)
            .bind(expires_at)
            .execute(&mut *tx)
            .await?;
    }

    tx.commit().await?;
    Ok(())
}

pub async fn close_session(pool: &PgPool, user_id: Uuid, value: &str) -> Result<(), AppError> {
    sqlx::query("DELETE FROM user_sessions WHERE user_id = $1 AND token = $2")
        .bind(user_id)
        .bind(value)
        .execute(pool)
        .await?;
    Ok(())
}

pub async fn close_all_sessions(pool: &PgPool, user_id: Uuid) -> Result<u64, AppError> {
    let result = sqlx::query("DELETE FROM user_sessions WHERE user_id = $1")
        .bind(user_id)
        .execute(pool)
        .await?;
    Ok(result.rows_affected())
}

pub async fn find_session_user(
    pool: &PgPool,
    user_id: Uuid,
    value: &str,
) -> Result<Option<User>, AppError> {
    let user = sqlx::query_as::<_, User>(
        r#"
        SELECT u.*
        FROM users u
        JOIN user_sessions s ON s.user_id = u.id
        WHERE u.id = $1 AND s.token = $2 AND s.expires_at > NOW()
        "#,
    )
    .bind(user_id)
    .bind(value)
    .fetch_optional(pool)
    .await?;

    Ok(user)
}

fn session_cookie(name: &'static str, value: String, settings: &Settings) -> Cookie<'static> {
    let same_site = if settings.cookie_secure {
        SameSite::None
    } else {
        SameSite::Lax
    };

    Cookie::build((name, value))
        .path("/")
        .http_only(true)
        .secure(settings.cookie_secure)
        .same_site(same_site)
        .max_age(time::Duration::hours(settings.session_ttl_hours))
        .build()
}

pub fn set_session_cookies(
    jar: CookieJar,
    token: String,
    federated: bool,
    settings: &Settings,
) -> CookieJar {
    let jar = jar.add(session_cookie(TOKEN_COOKIE, token, settings));
    if federated {
        jar.add(session_cookie(OAUTH_COOKIE, "true".to_string(), settings))
    } else {
        jar.remove(Cookie::build(OAUTH_COOKIE).path("/"))
    }
}

pub fn clear_session_cookies(jar: CookieJar) -> CookieJar {
    jar.remove(Cookie::build(TOKEN_COOKIE).path("/"))
        .remove(Cookie::build(OAUTH_COOKIE).path("/"))
}
