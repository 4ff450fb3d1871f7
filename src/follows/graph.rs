//! Social graph aggregation: who to suggest following.
//!
//! Candidates are ranked by collaborative signal, i.e. how many of the
//! viewer's followees already follow them. Equal counts fall back to the
//! candidate id so the order is reproducible across requests. When the signal
//! is empty the viewer gets a cold-start list of everyone they don't follow,
//! oldest accounts first.

use std::collections::{HashMap, HashSet};

use serde::Serialize;
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

use crate::error::AppError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, FromRow)]
pub struct FollowEdge {
    pub follower_id: Uuid,
    pub following_id: Uuid,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SuggestionSource {
    Collaborative,
    ColdStart,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RankedCandidate {
    pub user_id: Uuid,
    pub mutual_count: i64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Suggestions {
    pub source: SuggestionSource,
    pub candidates: Vec<RankedCandidate>,
}

impl Suggestions {
    pub fn user_ids(&self) -> Vec<Uuid> {
        self.candidates.iter().map(|c| c.user_id).collect()
    }
}

/// Counts, for every account followed by one of `followees`, how many
/// followees follow it. The viewer and accounts already followed never
/// appear. Sorted by count descending, then id ascending.
pub fn rank_candidates(
    viewer: Uuid,
    followees: &[Uuid],
    edges: &[FollowEdge],
) -> Vec<RankedCandidate> {
    let followed: HashSet<Uuid> = followees.iter().copied().collect();
    let mut counts: HashMap<Uuid, i64> = HashMap::new();

    for edge in edges {
        if !followed.contains(&edge.follower_id) {
            continue;
        }
        if edge.following_id == viewer || followed.contains(&edge.following_id) {
            continue;
        }
        *counts.entry(edge.following_id).or_insert(0) += 1;
    }

    let mut ranked: Vec<RankedCandidate> = counts
        .into_iter()
        .map(|(user_id, mutual_count)| RankedCandidate {
            user_id,
            mutual_count,
        })
        .collect();

    ranked.sort_by(|a, b| {
        b.mutual_count
            .cmp(&a.mutual_count)
            .then_with(|| a.user_id.cmp(&b.user_id))
    });
    ranked
}

/// Reorders `items` to follow `ranked`. `id = ANY($1)` lookups come back in
/// storage order, not rank order. Ids with no matching item are skipped.
pub fn order_by_rank<T, F>(ranked: &[Uuid], items: Vec<T>, id_of: F) -> Vec<T>
where
    F: Fn(&T) -> Uuid,
{
    let mut by_id: HashMap<Uuid, T> = items.into_iter().map(|item| (id_of(&item), item)).collect();
    ranked.iter().filter_map(|id| by_id.remove(id)).collect()
}

pub async fn followee_ids(pool: &PgPool, viewer: Uuid) -> Result<Vec<Uuid>, AppError> {
    let ids = sqlx::query_scalar::<_, Uuid>(
        "SELECT following_id FROM follows WHERE follower_id = $1 ORDER BY following_id",
    )
    .bind(viewer)
    .fetch_all(pool)
    .await?;

    Ok(ids)
}

pub async fn suggest(pool: &PgPool, viewer: Uuid) -> Result<Suggestions, AppError> {
    let followees = followee_ids(pool, viewer).await?;

    if !followees.is_empty() {
        let edges = sqlx::query_as::<_, FollowEdge>(
            "SELECT follower_id, following_id FROM follows WHERE follower_id = ANY($1)",
        )
        .bind(&followees)
        .fetch_all(pool)
        .await?;

        let candidates = rank_candidates(viewer, &followees, &edges);
        if !candidates.is_empty() {
            return Ok(Suggestions {
                source: SuggestionSource::Collaborative,
                candidates,
            });
        }
    }

    let cold = sqlx::query_scalar::<_, Uuid>(
        r#"
        SELECT id FROM users
        WHERE id <> $1 AND NOT (id = ANY($2))
        ORDER BY created_at ASC, id ASC
        "#,
    )
    .bind(viewer)
    .bind(&followees)
    .fetch_all(pool)
    .await?;

    Ok(Suggestions {
        source: SuggestionSource::ColdStart,
        candidates: cold
            .into_iter()
            .map(|user_id| RankedCandidate {
                user_id,
                mutual_count: 0,
            })
            .collect(),
    })
}
