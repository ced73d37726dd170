use anyhow::{Context, Result};
use clap::Parser;
use std::{env, str::FromStr};

/// Centralized application configuration.
/// Combines environment variables and CLI arguments.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    pub storage_dir: String,
    pub database_url: String,
    pub bucket: String,
    pub ffmpeg_path: String,
    pub static_dir: String,
    pub max_upload_mb: usize,
}

/// Command-line + environment configuration.
#[derive(Parser, Debug, Default)]
#[command(author, version, about = "Web file browser for an object storage bucket")]
pub struct Args {
    /// Host to bind to (overrides BUCKET_BROWSER_HOST)
    #[arg(long)]
    pub host: Option<String>,

    /// Port to bind to (overrides BUCKET_BROWSER_PORT)
    #[arg(long)]
    pub port: Option<u16>,

    /// Directory where object payloads are stored (overrides BUCKET_BROWSER_STORAGE_DIR)
    #[arg(long)]
    pub storage_dir: Option<String>,

    /// Database URL (overrides BUCKET_BROWSER_DATABASE_URL)
    #[arg(long)]
    pub database_url: Option<String>,

    /// Bucket served by this process (overrides BUCKET_BROWSER_BUCKET)
    #[arg(long)]
    pub bucket: Option<String>,

    /// ffmpeg binary used for video thumbnails (overrides BUCKET_BROWSER_FFMPEG)
    #[arg(long)]
    pub ffmpeg_path: Option<String>,

    /// Directory served under /static (overrides BUCKET_BROWSER_STATIC_DIR)
    #[arg(long)]
    pub static_dir: Option<String>,

    /// Largest accepted upload in MiB (overrides BUCKET_BROWSER_MAX_UPLOAD_MB)
    #[arg(long)]
    pub max_upload_mb: Option<usize>,

    /// Apply the database schema and exit
    #[arg(long)]
    pub migrate: bool,
}

/// Read `key`, parsing it when present and falling back to `default` when absent.
fn env_parsed<T>(key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match env::var(key) {
        Ok(value) => value
            .parse::<T>()
            .with_context(|| format!("parsing {} value `{}`", key, value)),
        Err(env::VarError::NotPresent) => Ok(default),
        Err(err) => Err(err).with_context(|| format!("reading {}", key)),
    }
}

fn env_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.into())
}

impl AppConfig {
    /// Parse environment variables + CLI args into AppConfig and migrate flag.
    pub fn from_env_and_args() -> Result<(Self, bool)> {
        let args = Args::parse();
        let migrate = args.migrate;
        Ok((Self::from_args(args)?, migrate))
    }

    /// Merge parsed arguments over environment values over defaults.
    pub fn from_args(args: Args) -> Result<Self> {
        let env_port = env_parsed("BUCKET_BROWSER_PORT", 8080u16)?;
        let env_max_upload = env_parsed("BUCKET_BROWSER_MAX_UPLOAD_MB", 1024usize)?;

        Ok(Self {
            host: args
                .host
                .unwrap_or_else(|| env_or("BUCKET_BROWSER_HOST", "0.0.0.0")),
            port: args.port.unwrap_or(env_port),
            storage_dir: args
                .storage_dir
                .unwrap_or_else(|| env_or("BUCKET_BROWSER_STORAGE_DIR", "./data/objects")),
            database_url: args.database_url.unwrap_or_else(|| {
                env_or(
                    "BUCKET_BROWSER_DATABASE_URL",
                    "sqlite://./data/meta/bucket_browser.db",
                )
            }),
            bucket: args
                .bucket
                .unwrap_or_else(|| env_or("BUCKET_BROWSER_BUCKET", "files")),
            ffmpeg_path: args
                .ffmpeg_path
                .unwrap_or_else(|| env_or("BUCKET_BROWSER_FFMPEG", "ffmpeg")),
            static_dir: args
                .static_dir
                .unwrap_or_else(|| env_or("BUCKET_BROWSER_STATIC_DIR", "./static")),
            max_upload_mb: args.max_upload_mb.unwrap_or(env_max_upload),
        })
    }

    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn max_upload_bytes(&self) -> usize {
        self.max_upload_mb.saturating_mul(1024 * 1024)
    }
}
