//! Home feed and explore pages.
//!
//! Both pages are ordered by `created_at DESC, id DESC` so that consecutive
//! `skip`/`limit` windows never overlap or leave gaps.

use uuid::Uuid;

use crate::posts::view::POST_SELECT;

pub mod handler;

pub const FEED_DEFAULT_LIMIT: i64 = 10;
pub const FEED_MAX_LIMIT: i64 = 50;

/// Whose posts the home feed draws from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FeedScope {
    /// The viewer follows nobody: every post not written by the viewer.
    Everyone,
    /// Posts owned by the accounts the viewer follows.
    Followees(Vec<Uuid>),
}

impl FeedScope {
    pub fn for_followees(followees: Vec<Uuid>) -> Self {
        if followees.is_empty() {
            FeedScope::Everyone
        } else {
            FeedScope::Followees(followees)
        }
    }

    /// Page query. `$1` viewer, `$2` limit, `$3` offset and, for
    /// `Followees`, `$4` the owner ids.
    pub fn sql(&self) -> String {
        let filter = match self {
            FeedScope::Everyone => "p.owner_id <> $1",
            FeedScope::Followees(_) => "p.owner_id = ANY($4)",
        };
        format!(
            "{} WHERE {} ORDER BY p.created_at DESC, p.id DESC LIMIT $2 OFFSET $3",
            POST_SELECT, filter
        )
    }
}

/// Explore page query. `$1` viewer, `$2` ranked owner ids, `$3` limit,
/// `$4` offset. Posts follow the owners' rank, newest first within an owner.
pub fn explore_sql() -> String {
    format!(
        "{} WHERE p.owner_id = ANY($2) \
         ORDER BY array_position($2::uuid[], p.owner_id), p.created_at DESC, p.id DESC \
         LIMIT $3 OFFSET $4",
        POST_SELECT
    )
}
