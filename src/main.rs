//! Auth Service - credential lifecycle server
//! Mission: Register accounts, issue ES256 tokens, validate and refresh them

use anyhow::{Context, Result};
use auth_service::{
    auth::{api, CredentialService, FileKeySource, JwtHandler, KeyPair, PasswordHasher, SqliteUserStore},
    AuthConfig,
};
use clap::Parser;
use dotenv::dotenv;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(name = "auth-service", about = "Credential lifecycle service")]
struct Args {
    /// Port to listen on (overrides PORT)
    #[arg(long, env = "PORT")]
    port: Option<u16>,

    /// Extra .env file loaded before configuration is read
    #[arg(long, env = "AUTH_ENV_FILE")]
    env_file: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    load_env(args.env_file.as_deref());
    init_tracing();

    let mut config = AuthConfig::from_env().context("Failed to load configuration")?;
    if let Some(port) = args.port {
        config.port = port;
    }

    info!("🚀 Auth service starting (issuer: {})", config.issuer);

    // Key material is read once; any failure here stops startup
    let keys = KeyPair::load(
        &FileKeySource,
        &config.private_key_path,
        &config.public_key_path,
    )
    .context("Failed to load signing keys")?;

    let user_store = Arc::new(
        SqliteUserStore::new(&config.database_path).context("Failed to open user store")?,
    );
    info!("🔐 User store initialized at: {}", config.database_path);

    let jwt_handler = JwtHandler::new(
        Arc::new(keys),
        config.issuer.clone(),
        config.access_token_ttl_minutes,
        config.refresh_token_ttl_hours,
    );

    let service = Arc::new(
        CredentialService::new(
            user_store,
            jwt_handler,
            PasswordHasher::new(config.bcrypt_cost),
        )
        .with_validation_mode(config.validation_mode),
    );

    let app = api::router(service);

    let addr = format!("0.0.0.0:{}", config.port);
    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;

    info!(
        "✅ Listening on {} (access TTL {}m, refresh TTL {}h, validation {:?})",
        addr,
        config.access_token_ttl_minutes,
        config.refresh_token_ttl_hours,
        config.validation_mode
    );

    axum::serve(listener, app)
        .await
        .context("Server terminated unexpectedly")?;

    Ok(())
}

/// Initialize tracing once for the whole process
fn init_tracing() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "auth_service=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}

fn load_env(extra: Option<&Path>) {
    // 1) Standard dotenv search (cwd + parents)
    let _ = dotenv();

    // 2) Crate-root .env, for runs started from another directory
    let manifest_env = Path::new(env!("CARGO_MANIFEST_DIR")).join(".env");
    if manifest_env.exists() {
        let _ = dotenv::from_path(&manifest_env);
    }

    if let Some(path) = extra {
        let _ = dotenv::from_path(path);
    }
}
