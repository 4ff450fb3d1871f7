use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::users::PublicUserResponse;

pub mod graph;
pub mod handler;

/// Database model for a follow relationship
#[derive(Debug, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Follow {
    pub follower_id: Uuid,
    pub following_id: Uuid,
    pub created_at: chrono::DateTime<chrono::Utc>,
}

/// Response for a user in followers/followings lists
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FollowUserResponse {
    pub id: Uuid,
    pub name: String,
    pub username: String,
    pub bio: Option<String>,
    pub avatar_url: Option<String>,
    pub followed_at: chrono::DateTime<chrono::Utc>,
}

/// Response for paginated followers/followings lists
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FollowListResponse {
    pub users: Vec<FollowUserResponse>,
    pub total: i64,
    pub has_more: bool,
}

impl FollowListResponse {
    pub fn new(users: Vec<FollowUserResponse>, total: i64, offset: i64) -> Self {
        let has_more = offset + (users.len() as i64) < total;
        FollowListResponse {
            users,
            total,
            has_more,
        }
    }
}

/// Response for follow/unfollow actions
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FollowActionResponse {
    pub following: bool,
    pub followers_count: i64,
}

/// Suggested account with the number of the viewer's followees following it
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FollowSuggestionResponse {
    #[serde(flatten)]
    pub user: PublicUserResponse,
    pub mutual_followers_count: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(n: u128) -> FollowUserResponse {
        FollowUserResponse {
            id: Uuid::from_u128(n),
            name: format!("User {}", n),
            username: format!("user{}", n),
            bio: None,
            avatar_url: None,
            followed_at: chrono::Utc::now(),
        }
    }

    #[test]
    fn has_more_while_rows_remain_past_this_page() {
        let list = FollowListResponse::new(vec![entry(1), entry(2)], 5, 0);
        assert!(list.has_more);

        let list = FollowListResponse::new(vec![entry(3), entry(4), entry(5)], 5, 2);
        assert!(!list.has_more);
    }

    #[test]
    fn empty_page_past_the_end_has_no_more() {
        let list = FollowListResponse::new(vec![], 3, 10);
        assert!(!list.has_more);
        assert_eq!(list.total, 3);
    }

    #[test]
    fn suggestion_flattens_user_fields() {
        let suggestion = FollowSuggestionResponse {
            user: PublicUserResponse {
                id: Uuid::nil(),
                name: "Ada".to_string(),
                username: "ada".to_string(),
                bio: None,
                avatar_url: None,
            },
            mutual_followers_count: 2,
        };

        let value = serde_json::to_value(suggestion).unwrap();
        assert_eq!(value["username"], "ada");
        assert_eq!(value["mutualFollowersCount"], 2);
    }
}
