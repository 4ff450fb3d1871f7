use axum::{
    extract::DefaultBodyLimit,
    http::{
        header::{AUTHORIZATION, CONTENT_TYPE},
        HeaderValue, Method,
    },
    routing::{delete, get, patch, post},
    Router,
};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::{auth, comments, config::settings::Settings, feeds, follows, posts, users, AppState};

/// Multipart bodies carry one image of at most 5 MiB plus form fields.
const UPLOAD_BODY_LIMIT: usize = 6 * 1024 * 1024;

pub fn router(state: AppState) -> Router {
    let user_router = Router::new()
        .route("/", post(auth::handler::signup))
        .route("/login", post(auth::handler::login))
        .route("/oauth-login", post(auth::handler::oauth_login))
        .route("/logout", post(auth::handler::logout))
        .route("/logoutall", post(auth::handler::logout_all))
        .route(
            "/me",
            get(users::handler::get_me)
                .patch(users::handler::update_me)
                .delete(users::handler::delete_me),
        )
        .route("/me/change-password", patch(auth::handler::change_password))
        .route(
            "/me/avatar",
            post(users::handler::upload_avatar).layer(DefaultBodyLimit::max(UPLOAD_BODY_LIMIT)),
        )
        .route(
            "/me/user-suggestions",
            get(follows::handler::get_user_suggestions),
        )
        .route("/me/liked", get(posts::handler::get_liked_posts))
        .route("/me/saved", get(posts::handler::get_saved_posts))
        .route("/search", get(users::handler::search_users))
        .route("/:username", get(users::handler::get_profile))
        .route("/:username/posts", get(posts::handler::get_user_posts))
        .route("/:username/followers", get(follows::handler::get_followers))
        .route("/:username/followings", get(follows::handler::get_followings))
        .route("/:username/follow", post(follows::handler::follow_user))
        .route("/:username/unfollow", delete(follows::handler::unfollow_user));

    let post_router = Router::new()
        .route(
            "/",
            post(posts::handler::create_post).layer(DefaultBodyLimit::max(UPLOAD_BODY_LIMIT)),
        )
        .route(
            "/:id",
            get(posts::handler::get_post)
                .patch(posts::handler::update_post)
                .delete(posts::handler::delete_post),
        )
        .route("/:id/like", post(posts::handler::like_post))
        .route(
            "/:id/unlike",
            post(posts::handler::unlike_post).delete(posts::handler::unlike_post),
        )
        .route("/:id/likes", get(posts::handler::get_post_likes))
        .route("/:id/save", post(posts::handler::save_post))
        .route("/:id/unsave", delete(posts::handler::unsave_post))
        .route("/:id/comments", get(comments::handler::get_post_comments))
        .route("/:id/comment", post(comments::handler::create_comment))
        .route(
            "/:id/comment/:comment_id",
            delete(comments::handler::delete_comment),
        );

    let api = Router::new()
        .nest("/users", user_router)
        .nest("/posts", post_router)
        .route("/feeds", get(feeds::handler::get_feed))
        .route("/explore", get(feeds::handler::get_explore));

    let cors = cors_layer(&state.settings);

    let app = Router::new()
        .route("/", get(|| async { "I am alive" }))
        .nest("/api", api)
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    match cors {
        Some(cors) => app.layer(cors),
        None => app,
    }
}

/// Credentialed CORS for the configured client origin; none when unset.
fn cors_layer(settings: &Settings) -> Option<CorsLayer> {
    let origin = settings.client_origin.as_deref()?;
    let origin = match origin.parse::<HeaderValue>() {
        Ok(origin) => origin,
        Err(_) => {
            tracing::warn!("Ignoring invalid CLIENT_ORIGIN {:?}", origin);
            return None;
        }
    };

    Some(
        CorsLayer::new()
            .allow_origin(origin)
            .allow_credentials(true)
            .allow_methods([
                Method::GET,
                Method::POST,
                Method::PATCH,
                Method::DELETE,
                Method::OPTIONS,
            ])
            .allow_headers([CONTENT_TYPE, AUTHORIZATION]),
    )
}
