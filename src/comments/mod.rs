use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use crate::posts::OwnerResponse;

pub mod handler;

/// Database model for a comment
#[derive(Debug, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Comment {
    pub id: Uuid,
    pub post_id: Uuid,
    pub user_id: Uuid,
    pub text: String,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub updated_at: chrono::DateTime<chrono::Utc>,
}

/// Request payload for creating a comment
#[derive(Debug, Deserialize, Validate)]
pub struct CreateComment {
    #[validate(length(
        min = 1,
        max = 2200,
        message = "Comment must be between 1 and 2200 characters"
    ))]
    pub text: String,
}

/// Response structure for a comment with author info
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CommentResponse {
    pub id: Uuid,
    pub post_id: Uuid,
    pub text: String,
    pub user: OwnerResponse,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub updated_at: chrono::DateTime<chrono::Utc>,
}
