use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use crate::{error::AppError, media::MediaStore};

pub mod handler;
pub mod jwt;
pub mod session;
pub mod utils;

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct User {
    pub id: Uuid,
    pub name: String,
    pub username: String,
    pub email: String,
    pub password_hash: Option<String>,
    pub age: i32,
    pub bio: Option<String>,
    pub avatar_key: Option<String>,
    pub oauth_provider: Option<String>,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub updated_at: chrono::DateTime<chrono::Utc>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct RegisterUser {
    #[validate(length(min = 1, max = 50, message = "Name must be between 1 and 50 characters"))]
    pub name: String,
    #[validate(custom(function = "utils::validate_username"))]
    pub username: String,
    #[validate(email(message = "Email is invalid"))]
    pub email: String,
    #[validate(custom(function = "utils::validate_password"))]
    pub password: String,
    #[validate(range(min = 0, message = "Age must be a positive number"))]
    pub age: Option<i32>,
    #[validate(length(max = 500, message = "Bio must be at most 500 characters"))]
    pub bio: Option<String>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct LoginUser {
    #[validate(length(min = 1, message = "Username is required"))]
    pub username: String,
    #[validate(length(min = 1, message = "Password is required"))]
    pub password: String,
}

/// Profile fields sent by the identity provider on federated login.
#[derive(Debug, Deserialize, Validate)]
pub struct OAuthProfile {
    #[validate(length(min = 1, max = 50))]
    pub name: String,
    #[validate(custom(function = "utils::validate_username"))]
    pub username: String,
    #[validate(email(message = "Email is invalid"))]
    pub email: String,
}

#[derive(Debug, Deserialize, Validate)]
pub struct OAuthLogin {
    #[validate(nested)]
    pub user: OAuthProfile,
    /// Provider-issued token; it becomes the stored session value.
    #[validate(length(min = 1, message = "Provider token is required"))]
    pub token: String,
    #[validate(length(min = 1, message = "Provider is required"))]
    pub provider: String,
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct ChangePassword {
    pub old_password: String,
    #[validate(custom(function = "utils::validate_password"))]
    pub new_password: String,
}

/// The account as its owner sees it.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserResponse {
    pub id: Uuid,
    pub name: String,
    pub username: String,
    pub email: String,
    pub age: i32,
    pub bio: Option<String>,
    pub avatar_url: Option<String>,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub updated_at: chrono::DateTime<chrono::Utc>,
}

impl UserResponse {
    pub async fn build(
        user: User,
        media: &MediaStore,
        avatar_ttl: std::time::Duration,
    ) -> Result<Self, AppError> {
        let avatar_url = media
            .presigned_url_opt(user.avatar_key.as_deref(), avatar_ttl)
            .await?;

        Ok(UserResponse {
            id: user.id,
            name: user.name,
            username: user.username,
            email: user.email,
            age: user.age,
            bio: user.bio,
            avatar_url,
            created_at: user.created_at,
            updated_at: user.updated_at,
        })
    }
}
