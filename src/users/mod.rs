use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use crate::{auth::User, error::AppError, media::MediaStore};

pub mod handler;

/// Fields a user may change on their own profile.
pub const PROFILE_FIELDS: &[&str] = &["name", "username", "email", "age", "bio"];

#[derive(Debug, Deserialize, Validate)]
pub struct UpdateProfile {
    #[validate(length(min = 1, max = 50, message = "Name must be between 1 and 50 characters"))]
    pub name: Option<String>,
    #[validate(custom(function = "crate::auth::utils::validate_username"))]
    pub username: Option<String>,
    #[validate(email(message = "Email is invalid"))]
    pub email: Option<String>,
    #[validate(range(min = 0, message = "Age must be a positive number"))]
    pub age: Option<i32>,
    #[validate(length(max = 500, message = "Bio must be at most 500 characters"))]
    pub bio: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct SearchQuery {
    pub q: Option<String>,
    pub skip: Option<i64>,
    pub limit: Option<i64>,
}

/// What anyone may see about an account.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PublicUserResponse {
    pub id: Uuid,
    pub name: String,
    pub username: String,
    pub bio: Option<String>,
    pub avatar_url: Option<String>,
}

impl PublicUserResponse {
    pub async fn build(
        user: User,
        media: &MediaStore,
        avatar_ttl: std::time::Duration,
    ) -> Result<Self, AppError> {
        let avatar_url = media
            .presigned_url_opt(user.avatar_key.as_deref(), avatar_ttl)
            .await?;

        Ok(PublicUserResponse {
            id: user.id,
            name: user.name,
            username: user.username,
            bio: user.bio,
            avatar_url,
        })
    }
}

/// Public profile with follow stats
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfileResponse {
    #[serde(flatten)]
    pub user: PublicUserResponse,
    pub age: i32,
    pub followers_count: i64,
    pub following_count: i64,
    pub posts_count: i64,
    /// Whether the viewer follows this user; false for anonymous viewers.
    pub is_following: bool,
    pub created_at: chrono::DateTime<chrono::Utc>,
}

/// Escapes LIKE metacharacters so a search term only ever matches literally.
pub fn escape_like(term: &str) -> String {
    let mut escaped = String::with_capacity(term.len());
    for c in term.chars() {
        if matches!(c, '\\' | '%' | '_') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn like_metacharacters_are_escaped() {
        assert_eq!(escape_like("al_ice%"), "al\\_ice\\%");
        assert_eq!(escape_like("back\\slash"), "back\\\\slash");
        assert_eq!(escape_like("plain"), "plain");
    }

    #[test]
    fn padded_short_username_is_rejected() {
        let patch = UpdateProfile {
            name: None,
            username: Some("  ab  ".to_string()),
            email: None,
            age: None,
            bio: None,
        };
        assert!(patch.validate().is_err());
    }

    #[test]
    fn profile_flattens_public_fields() {
        let profile = ProfileResponse {
            user: PublicUserResponse {
                id: Uuid::nil(),
                name: "Ada".to_string(),
                username: "ada".to_string(),
                bio: None,
                avatar_url: None,
            },
            age: 36,
            followers_count: 2,
            following_count: 1,
            posts_count: 0,
            is_following: true,
            created_at: chrono::Utc::now(),
        };

        let value = serde_json::to_value(profile).unwrap();
        assert_eq!(value["username"], "ada");
        assert_eq!(value["followersCount"], 2);
        assert_eq!(value["isFollowing"], true);
        assert!(value.get("user").is_none());
    }
}
