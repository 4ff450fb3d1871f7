use axum::{
    extract::{Multipart, Path, Query, State},
    response::IntoResponse,
    Json,
};
use axum_extra::extract::CookieJar;
use futures::future::try_join_all;
use sqlx::{PgPool, Row};
use uuid::Uuid;

use crate::{
    auth::{jwt::AuthUser, session, utils, User, UserResponse},
    cascade,
    error::AppError,
    media::{upload, MediaStore, AVATAR_URL_TTL, OWN_AVATAR_URL_TTL},
    pagination::Pagination,
    patch::parse_patch,
    response::ApiResponse,
    users::{escape_like, ProfileResponse, PublicUserResponse, SearchQuery, UpdateProfile, PROFILE_FIELDS},
};

/// Resolves a path `:username` to its account id.
pub(crate) async fn user_id_by_username(pool: &PgPool, username: &str) -> Result<Uuid, AppError> {
    sqlx::query_scalar::<_, Uuid>("SELECT id FROM users WHERE username = $1")
        .bind(utils::normalize_handle(username))
        .fetch_optional(pool)
        .await?
        .ok_or(AppError::NotFound("User not found".to_string()))
}

/// GET /api/users/me
pub async fn get_me(
    State(media): State<MediaStore>,
    auth: AuthUser,
) -> Result<impl IntoResponse, AppError> {
    let user = UserResponse::build(auth.user, &media, OWN_AVATAR_URL_TTL).await?;
    Ok(ApiResponse::success(user))
}

/// Patch name, username, email, age or bio
/// PATCH /api/users/me
pub async fn update_me(
    State(pool): State<PgPool>,
    State(media): State<MediaStore>,
    auth: AuthUser,
    Json(body): Json<serde_json::Value>,
) -> Result<impl IntoResponse, AppError> {
    let patch: UpdateProfile = parse_patch(body, PROFILE_FIELDS)?;

    let user = sqlx::query_as::<_, User>(
        r#"
        UPDATE users SET
            name = COALESCE($1, name),
            username = COALESCE($2, username),
            email = COALESCE($3, email),
            age = COALESCE($4, age),
            bio = COALESCE($5, bio),
            updated_at = NOW()
        WHERE id = $6
        RETURNING *
        "#,
    )
    .bind(patch.name.as_deref().map(str::trim))
    .bind(patch.username.as_deref().map(utils::normalize_handle))
    .bind(patch.email.as_deref().map(utils::normalize_handle))
    .bind(patch.age)
    .bind(patch.bio.as_deref().map(str::trim))
    .bind(auth.user.id)
    .fetch_one(&pool)
    .await
    .map_err(|e| AppError::unique_or(e, "Username or Email already exists"))?;

    let user = UserResponse::build(user, &media, OWN_AVATAR_URL_TTL).await?;
    Ok(ApiResponse::success(user))
}

/// Delete the account and everything it owns
/// DELETE /api/users/me
pub async fn delete_me(
    State(pool): State<PgPool>,
    State(media): State<MediaStore>,
    auth: AuthUser,
    jar: CookieJar,
) -> Result<impl IntoResponse, AppError> {
    let deleted = cascade::delete_user(&pool, auth.user.id).await?;
    tracing::info!(
        user_id = %auth.user.id,
        posts = deleted.posts,
        "account deleted"
    );

    media.delete_orphans(deleted.object_keys()).await;

    Ok((
        session::clear_session_cookies(jar),
        ApiResponse::ok("Account deleted".to_string()),
    ))
}

/// Replace the avatar image
/// POST /api/users/me/avatar
pub async fn upload_avatar(
    State(pool): State<PgPool>,
    State(media): State<MediaStore>,
    auth: AuthUser,
    multipart: Multipart,
) -> Result<impl IntoResponse, AppError> {
    let image = upload::read_image(multipart).await?;
    let key = image.object_key("avatars");

    media
        .put_object(&key, image.bytes, &image.content_type)
        .await?;

    let updated = sqlx::query_as::<_, User>(
        "UPDATE users SET avatar_key = $1, updated_at = NOW() WHERE id = $2 RETURNING *",
    )
    .bind(&key)
    .bind(auth.user.id)
    .fetch_one(&pool)
    .await;

    let user = match updated {
        Ok(user) => user,
        Err(e) => {
            media.delete_orphans([key.as_str()]).await;
            return Err(e.into());
        }
    };

    media.delete_orphans(auth.user.avatar_key.as_deref()).await;

    let user = UserResponse::build(user, &media, AVATAR_URL_TTL).await?;
    Ok(ApiResponse::success(user))
}

/// Case-insensitive search over usernames and names
/// GET /api/users/search?q=
pub async fn search_users(
    State(pool): State<PgPool>,
    State(media): State<MediaStore>,
    Query(query): Query<SearchQuery>,
) -> Result<impl IntoResponse, AppError> {
    let term = query.q.as_deref().map(str::trim).unwrap_or_default();
    if term.is_empty() {
        return Ok(ApiResponse::success(Vec::<PublicUserResponse>::new()));
    }

    let page = Pagination {
        skip: query.skip,
        limit: query.limit,
    }
    .page(10, 50);
    let pattern = format!("%{}%", escape_like(term));

    let users = sqlx::query_as::<_, User>(
        r#"
        SELECT * FROM users
        WHERE username ILIKE $1 ESCAPE '\' OR name ILIKE $1 ESCAPE '\'
        ORDER BY username ASC
        LIMIT $2 OFFSET $3
        "#,
    )
    .bind(&pattern)
    .bind(page.limit)
    .bind(page.offset)
    .fetch_all(&pool)
    .await?;

    let users = try_join_all(
        users
            .into_iter()
            .map(|user| PublicUserResponse::build(user, &media, AVATAR_URL_TTL)),
    )
    .await?;

    Ok(ApiResponse::success(users))
}

/// Public profile with follow stats
/// GET /api/users/:username
pub async fn get_profile(
    State(pool): State<PgPool>,
    State(media): State<MediaStore>,
    viewer: Option<AuthUser>,
    Path(username): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE username = $1")
        .bind(utils::normalize_handle(&username))
        .fetch_optional(&pool)
        .await?
        .ok_or(AppError::NotFound("User not found".to_string()))?;

    let counts = sqlx::query(
        r#"
        SELECT
            (SELECT COUNT(*) FROM follows WHERE following_id = $1) AS followers_count,
            (SELECT COUNT(*) FROM follows WHERE follower_id = $1) AS following_count,
            (SELECT COUNT(*) FROM posts WHERE owner_id = $1) AS posts_count,
            EXISTS (
                SELECT 1 FROM follows WHERE follower_id = $2 AND following_id = $1
            ) AS is_following
        "#,
    )
    .bind(user.id)
    .bind(viewer.map(|v| v.user.id))
    .fetch_one(&pool)
    .await?;

    let age = user.age;
    let created_at = user.created_at;

    Ok(ApiResponse::success(ProfileResponse {
        user: PublicUserResponse::build(user, &media, AVATAR_URL_TTL).await?,
        age,
        followers_count: counts.get("followers_count"),
        following_count: counts.get("following_count"),
        posts_count: counts.get("posts_count"),
        is_following: counts.get("is_following"),
        created_at,
    }))
}

#[cfg(test)]
mod tests {
    use axum::http::{Method, StatusCode};
    use serde_json::json;
    use sqlx::PgPool;

    use crate::test_support::{app, call, count, follow, insert_post, signup};

    #[sqlx::test(migrations = "./migrations")]
    async fn profile_counts_and_follow_flag(pool: PgPool) {
        let app = app(pool.clone());
        let (alice_id, alice) = signup(&app, "alice").await;
        let (bob_id, bob) = signup(&app, "bob").await;
        follow(&pool, alice_id, bob_id).await;
        insert_post(&pool, bob_id, 0).await;
        insert_post(&pool, bob_id, 1).await;

        let (status, body) = call(&app, Method::GET, "/api/users/BOB", Some(&alice), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["username"], "bob");
        assert_eq!(body["data"]["followersCount"], 1);
        assert_eq!(body["data"]["followingCount"], 0);
        assert_eq!(body["data"]["postsCount"], 2);
        assert_eq!(body["data"]["isFollowing"], true);
        assert!(body["data"].get("email").is_none());

        let (_, body) = call(&app, Method::GET, "/api/users/bob", Some(&bob), None).await;
        assert_eq!(body["data"]["isFollowing"], false);

        let (_, body) = call(&app, Method::GET, "/api/users/bob", None, None).await;
        assert_eq!(body["data"]["isFollowing"], false);

        let (status, _) = call(&app, Method::GET, "/api/users/nobody", None, None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[sqlx::test(migrations = "./migrations")]
    async fn profile_patch_rejects_unknown_fields(pool: PgPool) {
        let app = app(pool);
        let (_, alice) = signup(&app, "alice").await;

        let (status, body) = call(
            &app,
            Method::PATCH,
            "/api/users/me",
            Some(&alice),
            Some(json!({ "bio": "hi", "password": "sneaky-pass-1" })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["message"], "Invalid updates!");

        let (status, body) = call(
            &app,
            Method::PATCH,
            "/api/users/me",
            Some(&alice),
            Some(json!({ "bio": "  hi  ", "username": "  Alice_2  " })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["bio"], "hi");
        assert_eq!(body["data"]["username"], "alice_2");
    }

    #[sqlx::test(migrations = "./migrations")]
    async fn profile_patch_cannot_take_a_used_username(pool: PgPool) {
        let app = app(pool);
        let (_, alice) = signup(&app, "alice").await;
        signup(&app, "bob").await;

        let (status, _) = call(
            &app,
            Method::PATCH,
            "/api/users/me",
            Some(&alice),
            Some(json!({ "username": "Bob" })),
        )
        .await;
        assert_eq!(status, StatusCode::CONFLICT);
    }

    #[sqlx::test(migrations = "./migrations")]
    async fn deleted_account_loses_its_session(pool: PgPool) {
        let app = app(pool.clone());
        let (alice_id, alice) = signup(&app, "alice").await;

        let (status, _) = call(&app, Method::DELETE, "/api/users/me", Some(&alice), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(count(&pool, "SELECT COUNT(*) FROM users WHERE id = $1", alice_id).await, 0);

        let (status, body) = call(&app, Method::GET, "/api/users/me", Some(&alice), None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["message"], "Please authenticate");
    }

    #[sqlx::test(migrations = "./migrations")]
    async fn search_matches_names_case_insensitively(pool: PgPool) {
        let app = app(pool);
        signup(&app, "alice").await;
        signup(&app, "malik").await;
        signup(&app, "bob").await;

        let (status, body) = call(&app, Method::GET, "/api/users/search?q=LI", None, None).await;
        assert_eq!(status, StatusCode::OK);
        let names: Vec<&str> = body["data"]
            .as_array()
            .unwrap()
            .iter()
            .map(|u| u["username"].as_str().unwrap())
            .collect();
        assert_eq!(names, vec!["alice", "malik"]);
    }
}
