//! Cascading deletes.
//!
//! Each cascade runs in one transaction so a failure part-way leaves neither
//! orphaned join rows nor drifted counters. Media objects are returned to the
//! caller and removed only after the commit.

use sqlx::{PgPool, Row};
use uuid::Uuid;

use crate::error::AppError;

#[derive(Debug, Default)]
pub struct DeletedPost {
    pub image_key: Option<String>,
    pub likes: u64,
    pub comments: u64,
    pub saved: u64,
}

#[derive(Debug, Default)]
pub struct DeletedUser {
    pub avatar_key: Option<String>,
    pub image_keys: Vec<String>,
    pub posts: u64,
}

impl DeletedUser {
    pub fn object_keys(&self) -> Vec<String> {
        self.image_keys
            .iter()
            .cloned()
            .chain(self.avatar_key.clone())
            .collect()
    }
}

/// Removes a post together with its likes, comments and saved entries.
pub async fn delete_post(pool: &PgPool, post_id: Uuid) -> Result<DeletedPost, AppError> {
    let mut tx = pool.begin().await?;

    let likes = sqlx::query("DELETE FROM likes WHERE post_id = $1")
        .bind(post_id)
        .execute(&mut *tx)
        .await?
        .rows_affected();

    let comments = sqlx::query("DELETE FROM comments WHERE post_id = $1")
        .bind(post_id)
        .execute(&mut *tx)
        .await?
        .rows_affected();

    let saved = sqlx::query("DELETE FROM saved WHERE post_id = $1")
        .bind(post_id)
        .execute(&mut *tx)
        .await?
        .rows_affected();

    let row = sqlx::query("DELETE FROM posts WHERE id = $1 RETURNING image_key")
        .bind(post_id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or(AppError::NotFound("Post not found".to_string()))?;

    tx.commit().await?;

    Ok(DeletedPost {
        image_key: row.get("image_key"),
        likes,
        comments,
        saved,
    })
}

/// Removes an account with everything it owns: posts (and their likes,
/// comments and saves), its own likes, comments and saves on other posts,
/// follow edges in both directions, and sessions. Counters on posts owned by
/// other users are decremented for the likes and comments that disappear.
pub async fn delete_user(pool: &PgPool, user_id: Uuid) -> Result<DeletedUser, AppError> {
    let mut tx = pool.begin().await?;

    sqlx::query("SELECT id FROM users WHERE id = $1 FOR UPDATE")
        .bind(user_id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or(AppError::NotFound("User not found".to_string()))?;

    sqlx::query(
        r#"
        UPDATE posts p
        SET likes_count = p.likes_count - l.n
        FROM (
            SELECT post_id, COUNT(*)::INT AS n FROM likes WHERE user_id = $1 GROUP BY post_id
        ) l
        WHERE p.id = l.post_id AND p.owner_id <> $1
        "#,
    )
    .bind(user_id)
    .execute(&mut *tx)
    .await?;

    sqlx::query(
        r#"
        UPDATE posts p
        SET comments_count = p.comments_count - c.n
        FROM (
            SELECT post_id, COUNT(*)::INT AS n FROM comments WHERE user_id = $1 GROUP BY post_id
        ) c
        WHERE p.id = c.post_id AND p.owner_id <> $1
        "#,
    )
    .bind(user_id)
    .execute(&mut *tx)
    .await?;

    let image_keys: Vec<String> = sqlx::query_scalar(
        "SELECT image_key FROM posts WHERE owner_id = $1 AND image_key IS NOT NULL",
    )
    .bind(user_id)
    .fetch_all(&mut *tx)
    .await?;

    for table in ["likes", "comments", "saved"] {
        let sql = format!(
            "DELETE FROM {} WHERE user_id = $1 OR post_id IN (SELECT id FROM posts WHERE owner_id = $1)",
            table
        );
        sqlx::query(&sql).bind(user_id).execute(&mut *tx).await?;
    }

    sqlx::query("DELETE FROM follows WHERE follower_id = $1 OR following_id = $1")
        .bind(user_id)
        .execute(&mut *tx)
        .await?;

    let posts = sqlx::query("DELETE FROM posts WHERE owner_id = $1")
        .bind(user_id)
        .execute(&mut *tx)
        .await?
        .rows_affected();

    sqlx::query("DELETE FROM user_sessions WHERE user_id = $1")
        .bind(user_id)
        .execute(&mut *tx)
        .await?;

    let avatar_key: Option<String> =
        sqlx::query_scalar("DELETE FROM users WHERE id = $1 RETURNING avatar_key")
            .bind(user_id)
            .fetch_one(&mut *tx)
            .await?;

    tx.commit().await?;

    Ok(DeletedUser {
        avatar_key,
        image_keys,
        posts,
    })
}
