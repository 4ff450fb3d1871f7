use axum::{extract::State, response::IntoResponse, Json};
use axum_extra::extract::CookieJar;
use sqlx::PgPool;
use uuid::Uuid;
use validator::Validate;

use crate::{
    auth::{
        jwt::{self, AuthUser},
        session, utils, ChangePassword, LoginUser, OAuthLogin, OAuthProfile, RegisterUser, User,
        UserResponse,
    },
    config::settings::Settings,
    error::AppError,
    media::{MediaStore, AVATAR_URL_TTL},
    response::ApiResponse,
};

/// Register a new account and open its first session
/// POST /api/users
pub async fn signup(
    State(pool): State<PgPool>,
    State(settings): State<Settings>,
    State(media): State<MediaStore>,
    jar: CookieJar,
    Json(payload): Json<RegisterUser>,
) -> Result<impl IntoResponse, AppError> {
    payload
        .validate()
        .map_err(|e| AppError::UnprocessableEntity(e.to_string()))?;

    let password_hash = utils::hash_password(payload.password.trim())
        .map_err(|_| AppError::InternalServerError)?;

    let user = sqlx::query_as::<_, User>(
        r#"
        INSERT INTO users (id, name, username, email, password_hash, age, bio)
        VALUES ($1, $2, $3, $4, $5, $6, $7)
        RETURNING *
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(payload.name.trim())
    .bind(utils::normalize_handle(&payload.username))
    .bind(utils::normalize_handle(&payload.email))
    .bind(&password_hash)
    .bind(payload.age.unwrap_or(0))
    .bind(payload.bio.as_deref().map(str::trim))
    .fetch_one(&pool)
    .await
    .map_err(|e| AppError::unique_or(e, "Username or Email already exists"))?;

    let token = jwt::create_token(user.id, &settings.jwt_secret, settings.session_ttl_hours)
        .map_err(|_| AppError::InternalServerError)?;
    session::open_session(&pool, user.id, &token, settings.session_ttl_hours).await?;

    tracing::info!(user_id = %user.id, "account registered");

    let jar = session::set_session_cookies(jar, token, false, &settings);
    let user = UserResponse::build(user, &media, AVATAR_URL_TTL).await?;

    Ok((jar, ApiResponse::success(user).created()))
}

/// Log in with username and password
/// POST /api/users/login
pub async fn login(
    State(pool): State<PgPool>,
    State(settings): State<Settings>,
    State(media): State<MediaStore>,
    jar: CookieJar,
    Json(payload): Json<LoginUser>,
) -> Result<impl IntoResponse, AppError> {
    payload
        .validate()
        .map_err(|e| AppError::UnprocessableEntity(e.to_string()))?;

    let user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE username = $1")
        .bind(utils::normalize_handle(&payload.username))
        .fetch_optional(&pool)
        .await?
        .ok_or(AppError::Unauthorized)?;

    // Accounts created through a provider have no password to check.
    let hash = user.password_hash.as_deref().ok_or(AppError::Unauthorized)?;
    utils::verify_password(hash, payload.password.trim()).map_err(|_| AppError::Unauthorized)?;

    let token = jwt::create_token(user.id, &settings.jwt_secret, settings.session_ttl_hours)
        .map_err(|_| AppError::InternalServerError)?;
    session::open_session(&pool, user.id, &token, settings.session_ttl_hours).await?;

    let jar = session::set_session_cookies(jar, token, false, &settings);
    let user = UserResponse::build(user, &media, AVATAR_URL_TTL).await?;

    Ok((jar, ApiResponse::success(user)))
}

/// Log in through an identity provider, creating the account on first use
/// POST /api/users/oauth-login
pub async fn oauth_login(
    State(pool): State<PgPool>,
    State(settings): State<Settings>,
    State(media): State<MediaStore>,
    jar: CookieJar,
    Json(payload): Json<OAuthLogin>,
) -> Result<impl IntoResponse, AppError> {
    payload
        .validate()
        .map_err(|e| AppError::UnprocessableEntity(e.to_string()))?;

    let user = find_or_create_federated(&pool, &payload.user, &payload.provider).await?;

    session::open_session(&pool, user.id, &payload.token, settings.session_ttl_hours).await?;
    let wrapper = jwt::create_federated_token(
        user.id,
        &payload.token,
        &settings.jwt_secret,
        settings.session_ttl_hours,
    )
    .map_err(|_| AppError::InternalServerError)?;

    let jar = session::set_session_cookies(jar, wrapper, true, &settings);
    let user = UserResponse::build(user, &media, AVATAR_URL_TTL).await?;

    Ok((jar, ApiResponse::success(user).created()))
}

/// The username is claimed by someone else when its email or provider differ;
/// the federated account then lives under `<username>1`.
async fn find_or_create_federated(
    pool: &PgPool,
    profile: &OAuthProfile,
    provider: &str,
) -> Result<User, AppError> {
    let username = utils::normalize_handle(&profile.username);
    let email = utils::normalize_handle(&profile.email);

    let candidates = [username.clone(), format!("{}1", username)];
    for candidate in &candidates {
        let existing = sqlx::query_as::<_, User>("SELECT * FROM users WHERE username = $1")
            .bind(candidate)
            .fetch_optional(pool)
            .await?;

        match existing {
            None => {
                let user = sqlx::query_as::<_, User>(
                    r#"
                    INSERT INTO users (id, name, username, email, oauth_provider)
                    VALUES ($1, $2, $3, $4, $5)
                    RETURNING *
                    "#,
                )
                .bind(Uuid::new_v4())
                .bind(profile.name.trim())
                .bind(candidate)
                .bind(&email)
                .bind(provider)
                .fetch_one(pool)
                .await
                .map_err(|e| AppError::unique_or(e, "Username or Email already exists"))?;

                tracing::info!(user_id = %user.id, provider, "federated account created");
                return Ok(user);
            }
            Some(user)
                if user.email == email && user.oauth_provider.as_deref() == Some(provider) =>
            {
                return Ok(user);
            }
            Some(_) => continue,
        }
    }

    Err(AppError::Conflict(
        "Username or Email already exists".to_string(),
    ))
}

/// End the current session
/// POST /api/users/logout
pub async fn logout(
    State(pool): State<PgPool>,
    auth: AuthUser,
    jar: CookieJar,
) -> Result<impl IntoResponse, AppError> {
    session::close_session(&pool, auth.user.id, &auth.session_value).await?;
    tracing::info!(
        user_id = %auth.user.id,
        federated = auth.session.is_federated(),
        "session closed"
    );

    Ok((
        session::clear_session_cookies(jar),
        ApiResponse::ok("Logout successfully".to_string()),
    ))
}

/// End every session of the account
/// POST /api/users/logoutall
pub async fn logout_all(
    State(pool): State<PgPool>,
    auth: AuthUser,
    jar: CookieJar,
) -> Result<impl IntoResponse, AppError> {
    let closed = session::close_all_sessions(&pool, auth.user.id).await?;
    tracing::info!(user_id = %auth.user.id, closed, "all sessions closed");

    Ok((
        session::clear_session_cookies(jar),
        ApiResponse::ok("Logout successfully".to_string()),
    ))
}

/// PATCH /api/users/me/change-password
pub async fn change_password(
    State(pool): State<PgPool>,
    State(media): State<MediaStore>,
    auth: AuthUser,
    Json(payload): Json<ChangePassword>,
) -> Result<impl IntoResponse, AppError> {
    payload
        .validate()
        .map_err(|e| AppError::UnprocessableEntity(e.to_string()))?;

    let hash = auth.user.password_hash.as_deref().ok_or_else(|| {
        AppError::BadRequest("This account signs in through an identity provider".to_string())
    })?;
    utils::verify_password(hash, payload.old_password.trim())
        .map_err(|_| AppError::BadRequest("Password is incorrect".to_string()))?;

    let new_hash = utils::hash_password(payload.new_password.trim())
        .map_err(|_| AppError::InternalServerError)?;

    let user = sqlx::query_as::<_, User>(
        "UPDATE users SET password_hash = $1, updated_at = NOW() WHERE id = $2 RETURNING *",
    )
    .bind(&new_hash)
    .bind(auth.user.id)
    .fetch_one(&pool)
    .await?;

    let user = UserResponse::build(user, &media, AVATAR_URL_TTL).await?;
    Ok(ApiResponse::success_with_message(
        "Password updated".to_string(),
        user,
    ))
}

#[cfg(test)]
mod tests {
    use axum::http::{Method, StatusCode};
    use serde_json::json;
    use sqlx::PgPool;

    use crate::{
        auth::session::MAX_SESSIONS,
        test_support::{app, call, count, login, signup, PASSWORD},
    };

    const LIVE_SESSIONS: &str =
        "SELECT COUNT(*) FROM user_sessions WHERE user_id = $1 AND expires_at > NOW()";

    #[sqlx::test(migrations = "./migrations")]
    async fn login_succeeds_once_every_session_expired(pool: PgPool) {
        let app = app(pool.clone());
        let (alice_id, _) = signup(&app, "alice").await;

        sqlx::query("UPDATE user_sessions SET expires_at = NOW() - INTERVAL '1 hour' WHERE user_id = $1")
            .bind(alice_id)
            .execute(&pool)
            .await
            .unwrap();
        for i in 1..MAX_SESSIONS {
            sqlx::query(
                "INSERT INTO user_sessions (user_id, token, expires_at) VALUES ($1, $2, NOW() - INTERVAL '1 hour')",
            )
            .bind(alice_id)
            .bind(format!("stale-{}", i))
            .execute(&pool)
            .await
            .unwrap();
        }

        let (status, cookie) = login(&app, "alice").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(count(&pool, "SELECT COUNT(*) FROM user_sessions WHERE user_id = $1", alice_id).await, 1);

        let (status, _) = call(&app, Method::GET, "/api/users/me", cookie.as_deref(), None).await;
        assert_eq!(status, StatusCode::OK);
    }

    #[sqlx::test(migrations = "./migrations")]
    async fn sixth_live_login_is_refused(pool: PgPool) {
        let app = app(pool.clone());
        let (alice_id, _) = signup(&app, "alice").await;
        for _ in 1..MAX_SESSIONS {
            assert_eq!(login(&app, "alice").await.0, StatusCode::OK);
        }
        assert_eq!(count(&pool, LIVE_SESSIONS, alice_id).await, MAX_SESSIONS);

        let (status, cookie) = login(&app, "alice").await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert!(cookie.is_none());
    }

    #[sqlx::test(migrations = "./migrations")]
    async fn logout_frees_the_session(pool: PgPool) {
        let app = app(pool.clone());
        let (alice_id, alice) = signup(&app, "alice").await;

        let (status, _) = call(&app, Method::POST, "/api/users/logout", Some(&alice), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(count(&pool, LIVE_SESSIONS, alice_id).await, 0);

        let (status, _) = call(&app, Method::GET, "/api/users/me", Some(&alice), None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[sqlx::test(migrations = "./migrations")]
    async fn wrong_password_is_unauthorized(pool: PgPool) {
        let app = app(pool);
        signup(&app, "alice").await;

        let (status, body) = call(
            &app,
            Method::POST,
            "/api/users/login",
            None,
            Some(json!({ "username": "alice", "password": "not-the-password-1" })),
        )
        .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["message"], "Please authenticate");
    }

    #[sqlx::test(migrations = "./migrations")]
    async fn duplicate_username_conflicts(pool: PgPool) {
        let app = app(pool);
        signup(&app, "alice").await;

        let (status, body) = call(
            &app,
            Method::POST,
            "/api/users",
            None,
            Some(json!({
                "name": "Other Alice",
                "username": " ALICE ",
                "email": "other@example.com",
                "password": PASSWORD,
            })),
        )
        .await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body["message"], "Username or Email already exists");
    }

    #[sqlx::test(migrations = "./migrations")]
    async fn padded_short_username_cannot_sign_up(pool: PgPool) {
        let app = app(pool.clone());

        let (status, _) = call(
            &app,
            Method::POST,
            "/api/users",
            None,
            Some(json!({
                "name": "Ab",
                "username": "  ab  ",
                "email": "ab@example.com",
                "password": PASSWORD,
            })),
        )
        .await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);

        let users = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM users")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(users, 0);
    }
}
