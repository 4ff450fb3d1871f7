use axum::{
    extract::{Query, State},
    response::IntoResponse,
};
use sqlx::PgPool;

use crate::{
    auth::jwt::AuthUser,
    error::AppError,
    feeds::{explore_sql, FeedScope, FEED_DEFAULT_LIMIT, FEED_MAX_LIMIT},
    follows::graph,
    media::{MediaStore, FEED_IMAGE_URL_TTL},
    pagination::Pagination,
    posts::{view, view::PostRow, PostResponse},
    response::ApiResponse,
};

/// Home feed: posts from followed accounts, or from everyone else when the
/// caller follows nobody
/// GET /api/feeds
pub async fn get_feed(
    State(pool): State<PgPool>,
    State(media): State<MediaStore>,
    auth: AuthUser,
    Query(pagination): Query<Pagination>,
) -> Result<impl IntoResponse, AppError> {
    let page = pagination.page(FEED_DEFAULT_LIMIT, FEED_MAX_LIMIT);
    let followees = graph::followee_ids(&pool, auth.user.id).await?;
    let scope = FeedScope::for_followees(followees);
    let query_str = scope.sql();

    let mut query = sqlx::query_as::<_, PostRow>(&query_str)
        .bind(auth.user.id)
        .bind(page.limit)
        .bind(page.offset);
    if let FeedScope::Followees(ids) = &scope {
        query = query.bind(ids);
    }

    let rows = query.fetch_all(&pool).await?;
    let posts = view::hydrate(rows, &media, FEED_IMAGE_URL_TTL).await?;

    Ok(ApiResponse::success(posts))
}

/// Posts from suggested accounts, in suggestion order
/// GET /api/explore
pub async fn get_explore(
    State(pool): State<PgPool>,
    State(media): State<MediaStore>,
    auth: AuthUser,
    Query(pagination): Query<Pagination>,
) -> Result<impl IntoResponse, AppError> {
    let page = pagination.page(FEED_DEFAULT_LIMIT, FEED_MAX_LIMIT);
    let suggestions = graph::suggest(&pool, auth.user.id).await?;
    let owners = suggestions.user_ids();

    if owners.is_empty() {
        return Ok(ApiResponse::success(Vec::<PostResponse>::new()));
    }

    let rows = sqlx::query_as::<_, PostRow>(&explore_sql())
        .bind(auth.user.id)
        .bind(&owners)
        .bind(page.limit)
        .bind(page.offset)
        .fetch_all(&pool)
        .await?;

    let posts = view::hydrate(rows, &media, FEED_IMAGE_URL_TTL).await?;
    Ok(ApiResponse::success(posts))
}

#[cfg(test)]
mod tests {
    use axum::http::{Method, StatusCode};
    use sqlx::PgPool;

    use crate::test_support::{app, call, follow, ids, insert_post, signup};

    #[sqlx::test(migrations = "./migrations")]
    async fn feed_holds_followee_posts_only(pool: PgPool) {
        let app = app(pool.clone());
        let (alice_id, alice) = signup(&app, "alice").await;
        let (bob_id, _) = signup(&app, "bob").await;
        let (carol_id, _) = signup(&app, "carol").await;

        let post = insert_post(&pool, bob_id, 5).await;
        insert_post(&pool, alice_id, 1).await;
        insert_post(&pool, carol_id, 0).await;
        follow(&pool, alice_id, bob_id).await;

        let (status, body) = call(&app, Method::GET, "/api/feeds", Some(&alice), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(ids(&body), vec![post]);
        assert_eq!(body["data"][0]["isLiked"], false);
        assert_eq!(body["data"][0]["isSaved"], false);
        assert_eq!(body["data"][0]["owner"]["username"], "bob");
    }

    #[sqlx::test(migrations = "./migrations")]
    async fn feed_without_followees_shows_everyone_else(pool: PgPool) {
        let app = app(pool.clone());
        let (alice_id, alice) = signup(&app, "alice").await;
        let (bob_id, _) = signup(&app, "bob").await;
        let (carol_id, _) = signup(&app, "carol").await;

        let older = insert_post(&pool, bob_id, 5).await;
        let newer = insert_post(&pool, carol_id, 1).await;
        insert_post(&pool, alice_id, 0).await;

        let (_, body) = call(&app, Method::GET, "/api/feeds", Some(&alice), None).await;
        assert_eq!(ids(&body), vec![newer, older]);
    }

    #[sqlx::test(migrations = "./migrations")]
    async fn feed_pages_are_disjoint_and_contiguous(pool: PgPool) {
        let app = app(pool.clone());
        let (alice_id, alice) = signup(&app, "alice").await;
        let (bob_id, _) = signup(&app, "bob").await;
        follow(&pool, alice_id, bob_id).await;

        let mut newest_first = Vec::new();
        for minutes_ago in (0..5).rev() {
            newest_first.insert(0, insert_post(&pool, bob_id, minutes_ago).await);
        }

        let mut seen = Vec::new();
        for skip in [0, 2, 4] {
            let uri = format!("/api/feeds?skip={}&limit=2", skip);
            let (status, body) = call(&app, Method::GET, &uri, Some(&alice), None).await;
            assert_eq!(status, StatusCode::OK);
            let page = ids(&body);
            assert!(page.iter().all(|id| !seen.contains(id)), "overlap at skip={}", skip);
            seen.extend(page);
        }
        assert_eq!(seen, newest_first);
    }

    #[sqlx::test(migrations = "./migrations")]
    async fn explore_follows_suggestion_rank(pool: PgPool) {
        let app = app(pool.clone());
        let (a, alice) = signup(&app, "alice").await;
        let (b, _) = signup(&app, "bob").await;
        let (e, _) = signup(&app, "erin").await;
        let (c, _) = signup(&app, "carol").await;
        let (d, _) = signup(&app, "dave").await;

        follow(&pool, a, b).await;
        follow(&pool, a, e).await;
        follow(&pool, b, c).await;
        follow(&pool, e, c).await;
        follow(&pool, b, d).await;

        let by_dave = insert_post(&pool, d, 0).await;
        let by_carol = insert_post(&pool, c, 10).await;
        insert_post(&pool, b, 0).await;

        let (status, body) = call(&app, Method::GET, "/api/explore", Some(&alice), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(ids(&body), vec![by_carol, by_dave]);
    }
}
