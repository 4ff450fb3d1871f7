use axum::{
    extract::{Path, Query, State},
    response::IntoResponse,
    Json,
};
use futures::future::try_join_all;
use sqlx::{FromRow, PgPool};
use uuid::Uuid;
use validator::Validate;

use crate::{
    auth::jwt::AuthUser,
    comments::{Comment, CommentResponse, CreateComment},
    error::AppError,
    media::MediaStore,
    pagination::Pagination,
    posts::{handler::ensure_post_exists, view},
    response::ApiResponse,
};

/// Helper struct for fetching comments with author info from database
#[derive(FromRow)]
struct CommentFromDb {
    id: Uuid,
    post_id: Uuid,
    text: String,
    created_at: chrono::DateTime<chrono::Utc>,
    updated_at: chrono::DateTime<chrono::Utc>,
    // Author fields
    user_id: Uuid,
    name: String,
    username: String,
    avatar_key: Option<String>,
}

impl CommentFromDb {
    async fn into_response(self, media: &MediaStore) -> Result<CommentResponse, AppError> {
        let user = view::owner_response(
            media,
            self.user_id,
            self.name,
            self.username,
            self.avatar_key.as_deref(),
        )
        .await?;

        Ok(CommentResponse {
            id: self.id,
            post_id: self.post_id,
            text: self.text,
            user,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

const COMMENT_SELECT: &str = r#"
    SELECT
        c.id, c.post_id, c.text, c.created_at, c.updated_at,
        u.id AS user_id, u.name, u.username, u.avatar_key
    FROM comments c
    JOIN users u ON c.user_id = u.id
"#;

/// Comment on a post
/// POST /api/posts/:id/comment
pub async fn create_comment(
    State(pool): State<PgPool>,
    State(media): State<MediaStore>,
    auth: AuthUser,
    Path(post_id): Path<Uuid>,
    Json(payload): Json<CreateComment>,
) -> Result<impl IntoResponse, AppError> {
    payload
        .validate()
        .map_err(|e| AppError::UnprocessableEntity(e.to_string()))?;

    let text = payload.text.trim();
    if text.is_empty() {
        return Err(AppError::UnprocessableEntity(
            "Comment cannot be empty".to_string(),
        ));
    }

    let mut tx = pool.begin().await?;

    ensure_post_exists(&mut *tx, post_id).await?;

    let comment = sqlx::query_as::<_, Comment>(
        r#"
        INSERT INTO comments (post_id, user_id, text)
        VALUES ($1, $2, $3)
        RETURNING *
        "#,
    )
    .bind(post_id)
    .bind(auth.user.id)
    .bind(text)
    .fetch_one(&mut *tx)
    .await?;

    sqlx::query("UPDATE posts SET comments_count = comments_count + 1 WHERE id = $1")
        .bind(post_id)
        .execute(&mut *tx)
        .await?;

    tx.commit().await?;

    let response = get_comment_response(&pool, &media, comment.id).await?;
    Ok(ApiResponse::success(response).created())
}

/// Comments on a post, newest first
/// GET /api/posts/:id/comments
pub async fn get_post_comments(
    State(pool): State<PgPool>,
    State(media): State<MediaStore>,
    Path(post_id): Path<Uuid>,
    Query(pagination): Query<Pagination>,
) -> Result<impl IntoResponse, AppError> {
    ensure_post_exists(&pool, post_id).await?;

    let page = pagination.page(10, 100);
    let query_str = format!(
        "{} WHERE c.post_id = $1 ORDER BY c.created_at DESC, c.id DESC LIMIT $2 OFFSET $3",
        COMMENT_SELECT
    );

    let rows = sqlx::query_as::<_, CommentFromDb>(&query_str)
        .bind(post_id)
        .bind(page.limit)
        .bind(page.offset)
        .fetch_all(&pool)
        .await?;

    let comments = try_join_all(rows.into_iter().map(|row| row.into_response(&media))).await?;

    Ok(ApiResponse::success(comments))
}

/// Delete your own comment
/// DELETE /api/posts/:id/comment/:comment_id
pub async fn delete_comment(
    State(pool): State<PgPool>,
    auth: AuthUser,
    Path((post_id, comment_id)): Path<(Uuid, Uuid)>,
) -> Result<impl IntoResponse, AppError> {
    let mut tx = pool.begin().await?;

    ensure_post_exists(&mut *tx, post_id).await?;

    let comment = sqlx::query_as::<_, Comment>(
        "SELECT * FROM comments WHERE id = $1 AND post_id = $2 FOR UPDATE",
    )
    .bind(comment_id)
    .bind(post_id)
    .fetch_optional(&mut *tx)
    .await?
    .ok_or(AppError::NotFound("Comment not found".to_string()))?;

    if comment.user_id != auth.user.id {
        return Err(AppError::Forbidden(
            "You can only delete your own comments".to_string(),
        ));
    }

    sqlx::query("DELETE FROM comments WHERE id = $1")
        .bind(comment_id)
        .execute(&mut *tx)
        .await?;

    sqlx::query("UPDATE posts SET comments_count = comments_count - 1 WHERE id = $1")
        .bind(post_id)
        .execute(&mut *tx)
        .await?;

    tx.commit().await?;

    Ok(ApiResponse::success(comment))
}

async fn get_comment_response(
    pool: &PgPool,
    media: &MediaStore,
    comment_id: Uuid,
) -> Result<CommentResponse, AppError> {
    let query_str = format!("{} WHERE c.id = $1", COMMENT_SELECT);

    sqlx::query_as::<_, CommentFromDb>(&query_str)
        .bind(comment_id)
        .fetch_optional(pool)
        .await?
        .ok_or(AppError::NotFound("Comment not found".to_string()))?
        .into_response(media)
        .await
}
