use std::collections::HashMap;

use axum::{
    extract::{Path, Query, State},
    response::IntoResponse,
};
use futures::future::try_join_all;
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

use crate::{
    auth::{jwt::AuthUser, User},
    error::AppError,
    follows::{
        graph, Follow, FollowActionResponse, FollowListResponse, FollowSuggestionResponse,
        FollowUserResponse,
    },
    media::{MediaStore, AVATAR_URL_TTL},
    pagination::Pagination,
    response::ApiResponse,
    users::{handler::user_id_by_username, PublicUserResponse},
};

/// Helper struct for fetching user with follow info
#[derive(FromRow)]
struct UserFollowRow {
    id: Uuid,
    name: String,
    username: String,
    bio: Option<String>,
    avatar_key: Option<String>,
    followed_at: chrono::DateTime<chrono::Utc>,
}

impl UserFollowRow {
    async fn into_response(self, media: &MediaStore) -> Result<FollowUserResponse, AppError> {
        let avatar_url = media
            .presigned_url_opt(self.avatar_key.as_deref(), AVATAR_URL_TTL)
            .await?;

        Ok(FollowUserResponse {
            id: self.id,
            name: self.name,
            username: self.username,
            bio: self.bio,
            avatar_url,
            followed_at: self.followed_at,
        })
    }
}

/// Which side of the edge a list is read from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Direction {
    Followers,
    Followings,
}

impl Direction {
    /// (column matching the profile owner, column joined to users)
    fn columns(self) -> (&'static str, &'static str) {
        match self {
            Direction::Followers => ("following_id", "follower_id"),
            Direction::Followings => ("follower_id", "following_id"),
        }
    }
}

async fn followers_count(pool: &PgPool, user_id: Uuid) -> Result<i64, AppError> {
    let count = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM follows WHERE following_id = $1")
        .bind(user_id)
        .fetch_one(pool)
        .await?;

    Ok(count)
}

/// Follow a user
/// POST /api/users/:username/follow
pub async fn follow_user(
    State(pool): State<PgPool>,
    auth: AuthUser,
    Path(username): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let target = user_id_by_username(&pool, &username).await?;

    // Can't follow yourself
    if target == auth.user.id {
        return Err(AppError::UnprocessableEntity(
            "You cannot follow yourself".to_string(),
        ));
    }

    sqlx::query_as::<_, Follow>(
        r#"
        INSERT INTO follows (follower_id, following_id)
        VALUES ($1, $2)
        RETURNING *
        "#,
    )
    .bind(auth.user.id)
    .bind(target)
    .fetch_one(&pool)
    .await
    .map_err(|e| AppError::unique_or(e, "You already follow this user"))?;

    tracing::info!(follower = %auth.user.id, following = %target, "follow created");

    Ok(ApiResponse::success(FollowActionResponse {
        following: true,
        followers_count: followers_count(&pool, target).await?,
    })
    .created())
}

/// Unfollow a user
/// DELETE /api/users/:username/unfollow
pub async fn unfollow_user(
    State(pool): State<PgPool>,
    auth: AuthUser,
    Path(username): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let target = user_id_by_username(&pool, &username).await?;

    if target == auth.user.id {
        return Err(AppError::UnprocessableEntity(
            "You cannot unfollow yourself".to_string(),
        ));
    }

    sqlx::query_as::<_, Follow>(
        "DELETE FROM follows WHERE follower_id = $1 AND following_id = $2 RETURNING *",
    )
    .bind(auth.user.id)
    .bind(target)
    .fetch_optional(&pool)
    .await?
    .ok_or(AppError::NotFound("Follow not found".to_string()))?;

    Ok(ApiResponse::success(FollowActionResponse {
        following: false,
        followers_count: followers_count(&pool, target).await?,
    }))
}

async fn follow_list(
    pool: &PgPool,
    media: &MediaStore,
    username: &str,
    pagination: Pagination,
    direction: Direction,
) -> Result<FollowListResponse, AppError> {
    let user_id = user_id_by_username(pool, username).await?;
    let (owner_col, other_col) = direction.columns();
    let page = pagination.page(20, 100);

    let total = sqlx::query_scalar::<_, i64>(&format!(
        "SELECT COUNT(*) FROM follows WHERE {} = $1",
        owner_col
    ))
    .bind(user_id)
    .fetch_one(pool)
    .await?;

    let query_str = format!(
        r#"
        SELECT u.id, u.name, u.username, u.bio, u.avatar_key, f.created_at AS followed_at
        FROM follows f
        JOIN users u ON f.{other} = u.id
        WHERE f.{owner} = $1
        ORDER BY f.created_at DESC, u.id ASC
        LIMIT $2 OFFSET $3
        "#,
        other = other_col,
        owner = owner_col,
    );

    let rows = sqlx::query_as::<_, UserFollowRow>(&query_str)
        .bind(user_id)
        .bind(page.limit)
        .bind(page.offset)
        .fetch_all(pool)
        .await?;

    let users = try_join_all(rows.into_iter().map(|row| row.into_response(media))).await?;

    Ok(FollowListResponse::new(users, total, page.offset))
}

/// Get a user's followers
/// GET /api/users/:username/followers
pub async fn get_followers(
    State(pool): State<PgPool>,
    State(media): State<MediaStore>,
    Path(username): Path<String>,
    Query(pagination): Query<Pagination>,
) -> Result<impl IntoResponse, AppError> {
    let list = follow_list(&pool, &media, &username, pagination, Direction::Followers).await?;
    Ok(ApiResponse::success(list))
}

/// Get users that a user is following
/// GET /api/users/:username/followings
pub async fn get_followings(
    State(pool): State<PgPool>,
    State(media): State<MediaStore>,
    Path(username): Path<String>,
    Query(pagination): Query<Pagination>,
) -> Result<impl IntoResponse, AppError> {
    let list = follow_list(&pool, &media, &username, pagination, Direction::Followings).await?;
    Ok(ApiResponse::success(list))
}

/// Get suggested users to follow
/// GET /api/users/me/user-suggestions
///
/// Ranked by how many of the caller's followees follow each candidate; falls
/// back to the oldest accounts when that signal is empty.
pub async fn get_user_suggestions(
    State(pool): State<PgPool>,
    State(media): State<MediaStore>,
    auth: AuthUser,
    Query(pagination): Query<Pagination>,
) -> Result<impl IntoResponse, AppError> {
    let suggestions = graph::suggest(&pool, auth.user.id).await?;
    tracing::debug!(
        user = %auth.user.id,
        source = ?suggestions.source,
        candidates = suggestions.candidates.len(),
        "user suggestions ranked"
    );

    let page = pagination.page(50, 100);
    let window: Vec<graph::RankedCandidate> = suggestions
        .candidates
        .into_iter()
        .skip(page.offset as usize)
        .take(page.limit as usize)
        .collect();

    if window.is_empty() {
        return Ok(ApiResponse::success(Vec::<FollowSuggestionResponse>::new()));
    }

    let ids: Vec<Uuid> = window.iter().map(|c| c.user_id).collect();
    let users = sqlx::query_as::<_, User>("SELECT * FROM users WHERE id = ANY($1)")
        .bind(&ids)
        .fetch_all(&pool)
        .await?;
    let users = graph::order_by_rank(&ids, users, |u| u.id);

    let counts: HashMap<Uuid, i64> = window
        .iter()
        .map(|c| (c.user_id, c.mutual_count))
        .collect();

    let response = try_join_all(users.into_iter().map(|user| {
        let media = &media;
        let mutual_followers_count = counts.get(&user.id).copied().unwrap_or(0);
        async move {
            Ok::<_, AppError>(FollowSuggestionResponse {
                user: PublicUserResponse::build(user, media, AVATAR_URL_TTL).await?,
                mutual_followers_count,
            })
        }
    }))
    .await?;

    Ok(ApiResponse::success(response))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn followers_are_read_from_the_following_side() {
        assert_eq!(
            Direction::Followers.columns(),
            ("following_id", "follower_id")
        );
        assert_eq!(
            Direction::Followings.columns(),
            ("follower_id", "following_id")
        );
    }

    mod db {
        use axum::http::{Method, StatusCode};
        use sqlx::PgPool;

        use crate::test_support::{app, call, signup};

        #[sqlx::test(migrations = "./migrations")]
        async fn double_follow_conflicts_and_second_unfollow_is_missing(pool: PgPool) {
            let app = app(pool);
            let (_, alice) = signup(&app, "alice").await;
            signup(&app, "bob").await;

            let (status, body) =
                call(&app, Method::POST, "/api/users/bob/follow", Some(&alice), None).await;
            assert_eq!(status, StatusCode::CREATED);
            assert_eq!(body["data"]["following"], true);
            assert_eq!(body["data"]["followersCount"], 1);

            let (status, body) =
                call(&app, Method::POST, "/api/users/bob/follow", Some(&alice), None).await;
            assert_eq!(status, StatusCode::CONFLICT);
            assert_eq!(body["message"], "You already follow this user");

            let (status, body) =
                call(&app, Method::DELETE, "/api/users/bob/unfollow", Some(&alice), None).await;
            assert_eq!(status, StatusCode::OK);
            assert_eq!(body["data"]["following"], false);
            assert_eq!(body["data"]["followersCount"], 0);

            let (status, _) =
                call(&app, Method::DELETE, "/api/users/bob/unfollow", Some(&alice), None).await;
            assert_eq!(status, StatusCode::NOT_FOUND);
        }

        #[sqlx::test(migrations = "./migrations")]
        async fn following_yourself_is_refused(pool: PgPool) {
            let app = app(pool);
            let (_, alice) = signup(&app, "alice").await;

            let (status, _) =
                call(&app, Method::POST, "/api/users/Alice/follow", Some(&alice), None).await;
            assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        }

        #[sqlx::test(migrations = "./migrations")]
        async fn follow_lists_report_both_sides(pool: PgPool) {
            let app = app(pool);
            let (_, alice) = signup(&app, "alice").await;
            let (bob_id, _) = signup(&app, "bob").await;
            call(&app, Method::POST, "/api/users/bob/follow", Some(&alice), None).await;

            let (status, body) = call(&app, Method::GET, "/api/users/alice/followings", None, None).await;
            assert_eq!(status, StatusCode::OK);
            assert_eq!(body["data"]["users"][0]["id"], bob_id.to_string());

            let (_, body) = call(&app, Method::GET, "/api/users/alice/followers", None, None).await;
            assert_eq!(body["data"]["users"], serde_json::json!([]));
        }
    }
}
