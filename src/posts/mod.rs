use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

pub mod handler;
pub mod view;

/// Fields a post owner may change.
pub const POST_FIELDS: &[&str] = &["description"];

#[derive(Debug, Serialize, Deserialize, sqlx::FromRow)]
pub struct Post {
    pub id: Uuid,
    pub owner_id: Uuid,
    pub description: Option<String>,
    pub image_key: Option<String>,
    pub likes_count: i32,
    pub comments_count: i32,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub updated_at: chrono::DateTime<chrono::Utc>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct UpdatePost {
    #[validate(length(max = 2200, message = "Description must be at most 2200 characters"))]
    pub description: Option<String>,
}

/// A post as seen by one viewer.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PostResponse {
    pub id: Uuid,
    pub description: Option<String>,
    pub image_url: Option<String>,
    pub owner: OwnerResponse,
    pub likes_count: i32,
    pub comments_count: i32,
    pub is_liked: bool,
    pub is_saved: bool,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub updated_at: chrono::DateTime<chrono::Utc>,
}

/// Owner info embedded in posts and comments
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OwnerResponse {
    pub id: Uuid,
    pub name: String,
    pub username: String,
    pub avatar_url: Option<String>,
}

#[derive(Debug, Serialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct LikeResponse {
    pub id: Uuid,
    pub user_id: Uuid,
    pub post_id: Uuid,
    pub created_at: chrono::DateTime<chrono::Utc>,
}

#[derive(Debug, Serialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct SavedResponse {
    pub id: Uuid,
    pub user_id: Uuid,
    pub post_id: Uuid,
    pub created_at: chrono::DateTime<chrono::Utc>,
}

/// A user who liked a post
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LikerResponse {
    #[serde(flatten)]
    pub user: OwnerResponse,
    pub liked_at: chrono::DateTime<chrono::Utc>,
}
