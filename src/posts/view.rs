//! Viewer-scoped read model for posts.
//!
//! `isLiked` / `isSaved` are computed by the query for the viewer bound to
//! `$1` and live only in the response; nothing on this path writes to `posts`.

use std::time::Duration;

use futures::future::try_join_all;
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

use crate::{
    error::AppError,
    media::{MediaStore, AVATAR_URL_TTL},
    posts::{OwnerResponse, PostResponse},
};

/// Post columns joined with the owner and the viewer flags. `$1` is the
/// viewer id; binding NULL yields false for both flags.
pub const POST_SELECT: &str = r#"
    SELECT
        p.id, p.description, p.image_key, p.likes_count, p.comments_count,
        p.created_at, p.updated_at,
        u.id AS owner_id, u.name AS owner_name, u.username AS owner_username,
        u.avatar_key AS owner_avatar_key,
        EXISTS (SELECT 1 FROM likes l WHERE l.post_id = p.id AND l.user_id = $1) AS is_liked,
        EXISTS (SELECT 1 FROM saved s WHERE s.post_id = p.id AND s.user_id = $1) AS is_saved
    FROM posts p
    JOIN users u ON u.id = p.owner_id
"#;

#[derive(Debug, FromRow)]
pub struct PostRow {
    pub id: Uuid,
    pub description: Option<String>,
    pub image_key: Option<String>,
    pub likes_count: i32,
    pub comments_count: i32,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub updated_at: chrono::DateTime<chrono::Utc>,
    pub owner_id: Uuid,
    pub owner_name: String,
    pub owner_username: String,
    pub owner_avatar_key: Option<String>,
    pub is_liked: bool,
    pub is_saved: bool,
}

impl PostRow {
    pub async fn into_response(
        self,
        media: &MediaStore,
        image_ttl: Duration,
    ) -> Result<PostResponse, AppError> {
        let image_url = media
            .presigned_url_opt(self.image_key.as_deref(), image_ttl)
            .await?;
        let owner = owner_response(
            media,
            self.owner_id,
            self.owner_name,
            self.owner_username,
            self.owner_avatar_key.as_deref(),
        )
        .await?;

        Ok(PostResponse {
            id: self.id,
            description: self.description,
            image_url,
            owner,
            likes_count: self.likes_count,
            comments_count: self.comments_count,
            is_liked: self.is_liked,
            is_saved: self.is_saved,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

pub async fn owner_response(
    media: &MediaStore,
    id: Uuid,
    name: String,
    username: String,
    avatar_key: Option<&str>,
) -> Result<OwnerResponse, AppError> {
    let avatar_url = media.presigned_url_opt(avatar_key, AVATAR_URL_TTL).await?;
    Ok(OwnerResponse {
        id,
        name,
        username,
        avatar_url,
    })
}

/// Signs every page entry concurrently, keeping page order.
pub async fn hydrate(
    rows: Vec<PostRow>,
    media: &MediaStore,
    image_ttl: Duration,
) -> Result<Vec<PostResponse>, AppError> {
    try_join_all(rows.into_iter().map(|row| row.into_response(media, image_ttl))).await
}

pub async fn fetch_post(
    pool: &PgPool,
    viewer: Option<Uuid>,
    post_id: Uuid,
) -> Result<Option<PostRow>, AppError> {
    let query = format!("{} WHERE p.id = $2", POST_SELECT);

    let row = sqlx::query_as::<_, PostRow>(&query)
        .bind(viewer)
        .bind(post_id)
        .fetch_optional(pool)
        .await?;

    Ok(row)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::media::{tests::offline_store, FEED_IMAGE_URL_TTL};

    fn row(image_key: Option<&str>) -> PostRow {
        PostRow {
            id: Uuid::new_v4(),
            description: Some("sunset".to_string()),
            image_key: image_key.map(str::to_string),
            likes_count: 1,
            comments_count: 0,
            created_at: chrono::Utc::now(),
            updated_at: chrono::Utc::now(),
            owner_id: Uuid::new_v4(),
            owner_name: "Bea".to_string(),
            owner_username: "bea".to_string(),
            owner_avatar_key: None,
            is_liked: true,
            is_saved: false,
        }
    }

    #[tokio::test]
    async fn post_without_image_has_no_url() {
        let response = row(None)
            .into_response(&offline_store(), FEED_IMAGE_URL_TTL)
            .await
            .unwrap();

        assert!(response.image_url.is_none());
        assert!(response.owner.avatar_url.is_none());
        assert!(response.is_liked);
        assert!(!response.is_saved);
    }

    #[tokio::test]
    async fn image_is_signed_with_requested_window() {
        let response = row(Some("posts/p.jpg"))
            .into_response(&offline_store(), FEED_IMAGE_URL_TTL)
            .await
            .unwrap();

        let url = response.image_url.unwrap();
        assert!(url.contains("posts/p.jpg"));
        assert!(url.contains("X-Amz-Expires=60"));
    }

    #[tokio::test]
    async fn hydrate_keeps_page_order() {
        let rows = vec![row(None), row(Some("posts/b.jpg")), row(None)];
        let ids: Vec<Uuid> = rows.iter().map(|r| r.id).collect();

        let page = hydrate(rows, &offline_store(), FEED_IMAGE_URL_TTL)
            .await
            .unwrap();
        let hydrated: Vec<Uuid> = page.iter().map(|p| p.id).collect();
        assert_eq!(hydrated, ids);
    }

    #[test]
    fn response_uses_camel_case_flags() {
        let response = PostResponse {
            id: Uuid::nil(),
            description: None,
            image_url: None,
            owner: OwnerResponse {
                id: Uuid::nil(),
                name: "Bea".to_string(),
                username: "bea".to_string(),
                avatar_url: None,
            },
            likes_count: 0,
            comments_count: 0,
            is_liked: false,
            is_saved: false,
            created_at: chrono::Utc::now(),
            updated_at: chrono::Utc::now(),
        };
        let value = serde_json::to_value(response).unwrap();
        assert_eq!(value["isLiked"], false);
        assert_eq!(value["isSaved"], false);
        assert_eq!(value["likesCount"], 0);
        assert_eq!(value["owner"]["username"], "bea");
    }
}
