use axum::{
    extract::{Multipart, Path, Query, State},
    response::IntoResponse,
    Json,
};
use futures::future::try_join_all;
use sqlx::{FromRow, PgExecutor, PgPool, Row};
use uuid::Uuid;
use validator::Validate;

use crate::{
    auth::jwt::AuthUser,
    cascade,
    error::AppError,
    media::{upload, MediaStore, POST_IMAGE_URL_TTL},
    pagination::Pagination,
    patch::parse_patch,
    posts::{
        view::{self, PostRow, POST_SELECT},
        LikeResponse, LikerResponse, Post, SavedResponse, UpdatePost, POST_FIELDS,
    },
    response::ApiResponse,
    users::handler::user_id_by_username,
};

pub(crate) async fn ensure_post_exists<'e>(
    executor: impl PgExecutor<'e>,
    post_id: Uuid,
) -> Result<(), AppError> {
    sqlx::query("SELECT id FROM posts WHERE id = $1")
        .bind(post_id)
        .fetch_optional(executor)
        .await?
        .ok_or(AppError::NotFound("Post not found".to_string()))?;
    Ok(())
}

/// Verifies the caller owns the post before a mutation.
async fn ensure_owner(pool: &PgPool, post_id: Uuid, user_id: Uuid) -> Result<(), AppError> {
    let row = sqlx::query("SELECT owner_id FROM posts WHERE id = $1")
        .bind(post_id)
        .fetch_optional(pool)
        .await?
        .ok_or(AppError::NotFound("Post not found".to_string()))?;

    let owner_id: Uuid = row.get("owner_id");
    if owner_id != user_id {
        return Err(AppError::Forbidden(
            "You can only change your own posts".to_string(),
        ));
    }
    Ok(())
}

async fn post_response(
    pool: &PgPool,
    media: &MediaStore,
    viewer: Uuid,
    post_id: Uuid,
) -> Result<crate::posts::PostResponse, AppError> {
    view::fetch_post(pool, Some(viewer), post_id)
        .await?
        .ok_or(AppError::NotFound("Post not found".to_string()))?
        .into_response(media, POST_IMAGE_URL_TTL)
        .await
}

/// Create a post from a multipart form (`description`, `image`)
/// POST /api/posts
pub async fn create_post(
    State(pool): State<PgPool>,
    State(media): State<MediaStore>,
    auth: AuthUser,
    multipart: Multipart,
) -> Result<impl IntoResponse, AppError> {
    let form = upload::read_post_form(multipart).await?;
    UpdatePost {
        description: form.description.clone(),
    }
    .validate()
    .map_err(|e| AppError::UnprocessableEntity(e.to_string()))?;

    let image_key = match &form.image {
        Some(image) => {
            let key = image.object_key("posts");
            media
                .put_object(&key, image.bytes.clone(), &image.content_type)
                .await?;
            Some(key)
        }
        None => None,
    };

    let inserted = sqlx::query_as::<_, Post>(
        r#"
        INSERT INTO posts (id, owner_id, description, image_key)
        VALUES ($1, $2, $3, $4)
        RETURNING *
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(auth.user.id)
    .bind(&form.description)
    .bind(&image_key)
    .fetch_one(&pool)
    .await;

    let created = match inserted {
        Ok(post) => post,
        Err(e) => {
            // The row never landed, so the uploaded object has no owner.
            media.delete_orphans(image_key).await;
            return Err(e.into());
        }
    };

    tracing::info!(
        post_id = %created.id,
        owner = %created.owner_id,
        has_image = created.image_key.is_some(),
        "post created"
    );

    let post = post_response(&pool, &media, auth.user.id, created.id).await?;
    Ok(ApiResponse::success(post).created())
}

/// GET /api/posts/:id
pub async fn get_post(
    State(pool): State<PgPool>,
    State(media): State<MediaStore>,
    auth: AuthUser,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    let post = post_response(&pool, &media, auth.user.id, id).await?;
    Ok(ApiResponse::success(post))
}

/// Only `description` may be patched
/// PATCH /api/posts/:id
pub async fn update_post(
    State(pool): State<PgPool>,
    State(media): State<MediaStore>,
    auth: AuthUser,
    Path(id): Path<Uuid>,
    Json(body): Json<serde_json::Value>,
) -> Result<impl IntoResponse, AppError> {
    let patch: UpdatePost = parse_patch(body, POST_FIELDS)?;

    ensure_owner(&pool, id, auth.user.id).await?;

    if let Some(description) = &patch.description {
        let description = description.trim();
        sqlx::query("UPDATE posts SET description = $1, updated_at = NOW() WHERE id = $2")
            .bind((!description.is_empty()).then_some(description))
            .bind(id)
            .execute(&pool)
            .await?;
    }

    let post = post_response(&pool, &media, auth.user.id, id).await?;
    Ok(ApiResponse::success(post))
}

/// DELETE /api/posts/:id
pub async fn delete_post(
    State(pool): State<PgPool>,
    State(media): State<MediaStore>,
    auth: AuthUser,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    ensure_owner(&pool, id, auth.user.id).await?;

    let deleted = cascade::delete_post(&pool, id).await?;
    tracing::info!(
        post_id = %id,
        likes = deleted.likes,
        comments = deleted.comments,
        saved = deleted.saved,
        "post deleted"
    );

    media.delete_orphans(deleted.image_key).await;

    Ok(ApiResponse::ok("Post deleted".to_string()))
}

/// POST /api/posts/:id/like
pub async fn like_post(
    State(pool): State<PgPool>,
    auth: AuthUser,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    let mut tx = pool.begin().await?;

    ensure_post_exists(&mut *tx, id).await?;

    let like = sqlx::query_as::<_, LikeResponse>(
        "INSERT INTO likes (user_id, post_id) VALUES ($1, $2) RETURNING id, user_id, post_id, created_at",
    )
    .bind(auth.user.id)
    .bind(id)
    .fetch_one(&mut *tx)
    .await
    .map_err(|e| AppError::unique_or(e, "You already liked this post"))?;

    sqlx::query("UPDATE posts SET likes_count = likes_count + 1 WHERE id = $1")
        .bind(id)
        .execute(&mut *tx)
        .await?;

    tx.commit().await?;

    Ok(ApiResponse::success(like).created())
}

/// DELETE /api/posts/:id/unlike
pub async fn unlike_post(
    State(pool): State<PgPool>,
    auth: AuthUser,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    let mut tx = pool.begin().await?;

    ensure_post_exists(&mut *tx, id).await?;

    let like = sqlx::query_as::<_, LikeResponse>(
        "DELETE FROM likes WHERE user_id = $1 AND post_id = $2 RETURNING id, user_id, post_id, created_at",
    )
    .bind(auth.user.id)
    .bind(id)
    .fetch_optional(&mut *tx)
    .await?
    .ok_or(AppError::NotFound("Like not found".to_string()))?;

    sqlx::query("UPDATE posts SET likes_count = likes_count - 1 WHERE id = $1")
        .bind(id)
        .execute(&mut *tx)
        .await?;

    tx.commit().await?;

    Ok(ApiResponse::success(like))
}

#[derive(FromRow)]
struct LikerRow {
    id: Uuid,
    name: String,
    username: String,
    avatar_key: Option<String>,
    liked_at: chrono::DateTime<chrono::Utc>,
}

/// Users who liked a post, most recent first
/// GET /api/posts/:id/likes
pub async fn get_post_likes(
    State(pool): State<PgPool>,
    State(media): State<MediaStore>,
    Path(id): Path<Uuid>,
    Query(pagination): Query<Pagination>,
) -> Result<impl IntoResponse, AppError> {
    ensure_post_exists(&pool, id).await?;
    let page = pagination.page(20, 100);

    let rows = sqlx::query_as::<_, LikerRow>(
        r#"
        SELECT u.id, u.name, u.username, u.avatar_key, l.created_at AS liked_at
        FROM likes l
        JOIN users u ON u.id = l.user_id
        WHERE l.post_id = $1
        ORDER BY l.created_at DESC, l.id DESC
        LIMIT $2 OFFSET $3
        "#,
    )
    .bind(id)
    .bind(page.limit)
    .bind(page.offset)
    .fetch_all(&pool)
    .await?;

    let likers = try_join_all(rows.into_iter().map(|row| {
        let media = &media;
        async move {
            let user = view::owner_response(
                media,
                row.id,
                row.name,
                row.username,
                row.avatar_key.as_deref(),
            )
            .await?;
            Ok::<_, AppError>(LikerResponse {
                user,
                liked_at: row.liked_at,
            })
        }
    }))
    .await?;

    Ok(ApiResponse::success(likers))
}

/// POST /api/posts/:id/save
pub async fn save_post(
    State(pool): State<PgPool>,
    auth: AuthUser,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    ensure_post_exists(&pool, id).await?;

    let saved = sqlx::query_as::<_, SavedResponse>(
        "INSERT INTO saved (user_id, post_id) VALUES ($1, $2) RETURNING id, user_id, post_id, created_at",
    )
    .bind(auth.user.id)
    .bind(id)
    .fetch_one(&pool)
    .await
    .map_err(|e| AppError::unique_or(e, "Post already saved"))?;

    Ok(ApiResponse::success(saved).created())
}

/// DELETE /api/posts/:id/unsave
pub async fn unsave_post(
    State(pool): State<PgPool>,
    auth: AuthUser,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    ensure_post_exists(&pool, id).await?;

    let saved = sqlx::query_as::<_, SavedResponse>(
        "DELETE FROM saved WHERE user_id = $1 AND post_id = $2 RETURNING id, user_id, post_id, created_at",
    )
    .bind(auth.user.id)
    .bind(id)
    .fetch_optional(&pool)
    .await?
    .ok_or(AppError::NotFound("Saved not found".to_string()))?;

    Ok(ApiResponse::success(saved))
}

/// A user's posts, newest first
/// GET /api/users/:username/posts
pub async fn get_user_posts(
    State(pool): State<PgPool>,
    State(media): State<MediaStore>,
    viewer: Option<AuthUser>,
    Path(username): Path<String>,
    Query(pagination): Query<Pagination>,
) -> Result<impl IntoResponse, AppError> {
    let owner_id = user_id_by_username(&pool, &username).await?;

    let page = pagination.page(3, 50);
    let query = format!(
        "{} WHERE p.owner_id = $2 ORDER BY p.created_at DESC, p.id DESC LIMIT $3 OFFSET $4",
        POST_SELECT
    );

    let rows = sqlx::query_as::<_, PostRow>(&query)
        .bind(viewer.map(|v| v.user.id))
        .bind(owner_id)
        .bind(page.limit)
        .bind(page.offset)
        .fetch_all(&pool)
        .await?;

    let posts = view::hydrate(rows, &media, POST_IMAGE_URL_TTL).await?;
    Ok(ApiResponse::success(posts))
}

/// Posts the caller liked, most recently liked first
/// GET /api/users/me/liked
pub async fn get_liked_posts(
    State(pool): State<PgPool>,
    State(media): State<MediaStore>,
    auth: AuthUser,
    Query(pagination): Query<Pagination>,
) -> Result<impl IntoResponse, AppError> {
    let page = pagination.page(10, 50);
    let query = format!(
        "{} JOIN likes mine ON mine.post_id = p.id AND mine.user_id = $1 \
         ORDER BY mine.created_at DESC, mine.id DESC LIMIT $2 OFFSET $3",
        POST_SELECT
    );

    let rows = sqlx::query_as::<_, PostRow>(&query)
        .bind(auth.user.id)
        .bind(page.limit)
        .bind(page.offset)
        .fetch_all(&pool)
        .await?;

    let posts = view::hydrate(rows, &media, POST_IMAGE_URL_TTL).await?;
    Ok(ApiResponse::success(posts))
}

/// Posts the caller saved, most recently saved first
/// GET /api/users/me/saved
pub async fn get_saved_posts(
    State(pool): State<PgPool>,
    State(media): State<MediaStore>,
    auth: AuthUser,
    Query(pagination): Query<Pagination>,
) -> Result<impl IntoResponse, AppError> {
    let page = pagination.page(3, 50);
    let query = format!(
        "{} JOIN saved mine ON mine.post_id = p.id AND mine.user_id = $1 \
         ORDER BY mine.created_at DESC, mine.id DESC LIMIT $2 OFFSET $3",
        POST_SELECT
    );

    let rows = sqlx::query_as::<_, PostRow>(&query)
        .bind(auth.user.id)
        .bind(page.limit)
        .bind(page.offset)
        .fetch_all(&pool)
        .await?;

    let posts = view::hydrate(rows, &media, POST_IMAGE_URL_TTL).await?;
    Ok(ApiResponse::success(posts))
}
