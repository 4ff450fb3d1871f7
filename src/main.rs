use axum::extract::FromRef;
use dotenv::dotenv;
use sqlx::{postgres::PgPoolOptions, PgPool};
use tokio::signal;
use tracing::info;
use tracing_subscriber::EnvFilter;

mod auth;
mod cascade;
mod comments;
mod config;
mod error;
mod feeds;
mod follows;
mod media;
mod pagination;
mod patch;
mod posts;
mod response;
mod routes;
#[cfg(test)]
mod test_support;
mod users;

use config::settings::Settings;
use media::MediaStore;

#[derive(Clone)]
pub struct AppState {
    pool: PgPool,
    settings: Settings,
    media: MediaStore,
}

impl FromRef<AppState> for PgPool {
    fn from_ref(app_state: &AppState) -> PgPool {
        app_state.pool.clone()
    }
}

impl FromRef<AppState> for Settings {
    fn from_ref(app_state: &AppState) -> Settings {
        app_state.settings.clone()
    }
}

impl FromRef<AppState> for MediaStore {
    fn from_ref(app_state: &AppState) -> MediaStore {
        app_state.media.clone()
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("social_backend=info,tower_http=info")),
        )
        .init();

    let settings = Settings::from_env()?;

    let pool = PgPoolOptions::new()
        .max_connections(settings.database_max_connections)
        .connect(&settings.database_url)
        .await?;

    info!("database connected");

    sqlx::migrate!("./migrations").run(&pool).await?;

    info!("migrations applied");

    let media = MediaStore::from_env(settings.s3_bucket.clone()).await;

    let app_state = AppState {
        pool,
        settings: settings.clone(),
        media,
    };

    let app = routes::router(app_state);

    info!("Server running on http://localhost:{}", settings.port);

    let listener = tokio::net::TcpListener::bind(settings.addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("server stopped");

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C, shutting down"),
        _ = terminate => info!("Received terminate signal, shutting down"),
    }
}
