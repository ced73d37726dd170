use anyhow::{Context, Result};
use axum::Router;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use std::{fs, io::ErrorKind, path::Path, str::FromStr, sync::Arc};
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;

mod config;
mod errors;
mod handlers;
mod models;
mod routes;
mod services;
mod state;
mod views;

use services::{
    image_codec::RasterCodec,
    object_store::ObjectStore,
    storage_service::{StorageService, apply_schema},
    thumbnail_service::{ThumbnailResolver, ThumbnailSettings},
    transcoder::{FfmpegTranscoder, FrameExtractor},
    upload_service::UploadService,
};

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    // --- Logging setup ---
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    // --- Parse config + migrate flag ---
    let (cfg, migrate) = config::AppConfig::from_env_and_args()?;

    tracing::info!("Starting bucket-browser with config: {:?}", cfg);

    // --- Ensure storage directory exists ---
    if !Path::new(&cfg.storage_dir).exists() {
        fs::create_dir_all(&cfg.storage_dir)?;
        tracing::info!("Created storage directory at {}", cfg.storage_dir);
    }

    // --- Initialize SQLite connection ---
    let db_url = &cfg.database_url;
    let db_path = db_url
        .trim_start_matches("sqlite://")
        .trim_start_matches("sqlite:")
        .trim_start_matches("file:");
    tracing::debug!("Interpreted SQLite path => {}", db_path);

    if let Some(parent) = Path::new(db_path).parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            fs::create_dir_all(parent)?;
            tracing::info!("Created missing directory {:?}", parent);
        }
    }

    let options = SqliteConnectOptions::from_str(db_url)
        .with_context(|| format!("invalid database URL {}", db_url))?
        .create_if_missing(true);
    let db = Arc::new(
        SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await?,
    );

    let applied = apply_schema(&db).await?;
    tracing::debug!("Applied {} schema statements", applied);

    // --- Handle migration mode ---
    if migrate {
        tracing::info!("Database migration complete.");
        return Ok(());
    }

    // --- Initialize services ---
    let storage = StorageService::new(db.clone(), cfg.storage_dir.clone(), cfg.bucket.clone());
    let bucket = storage.ensure_bucket().await?;
    tracing::info!(bucket = %bucket.name, created_at = %bucket.created_at, "Serving bucket");

    let ffmpeg = FfmpegTranscoder::new(cfg.ffmpeg_path.clone());
    if !ffmpeg.is_available().await {
        anyhow::bail!(
            "ffmpeg not runnable at `{}`; set BUCKET_BROWSER_FFMPEG or --ffmpeg-path",
            ffmpeg.ffmpeg_path()
        );
    }

    let store: Arc<dyn ObjectStore> = Arc::new(storage);
    let transcoder: Arc<dyn FrameExtractor> = Arc::new(ffmpeg);
    let thumbnails = ThumbnailResolver::new(
        store.clone(),
        Arc::new(RasterCodec),
        transcoder.clone(),
        ThumbnailSettings::default(),
    );
    let uploads = UploadService::new(store.clone(), thumbnails.clone(), None);
    let state = state::AppState {
        store,
        thumbnails,
        uploads,
        transcoder,
    };

    // --- Build router ---
    let app: Router =
        routes::routes::routes(&cfg.static_dir, cfg.max_upload_bytes()).with_state(state);

    // --- Start server ---
    let addr = cfg.addr();
    let listener = match TcpListener::bind(&addr).await {
        Ok(listener) => listener,
        Err(err)
            if err.kind() == ErrorKind::PermissionDenied
                && matches!(cfg.host.as_str(), "0.0.0.0" | "::") =>
        {
            let fallback_addr = format!("127.0.0.1:{}", cfg.port);
            tracing::warn!(
                "Permission denied binding to {} ({}). Falling back to {}",
                addr,
                err,
                fallback_addr
            );
            TcpListener::bind(&fallback_addr).await?
        }
        Err(err) => return Err(err.into()),
    };

    tracing::info!("Server listening on http://{}", listener.local_addr()?);
    axum::serve(listener, app).await?;

    Ok(())
}
