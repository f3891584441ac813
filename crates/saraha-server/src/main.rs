use std::net::SocketAddr;
use std::sync::Arc;

use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use saraha_api::config::Config;
use saraha_api::identity::{GoogleIdentityProvider, IdentityProvider, UnconfiguredIdentityProvider};
use saraha_api::ledger::run_prune_loop;
use saraha_api::mailer::{EmailDispatcher, EmailTransport, LogTransport, RelayTransport};
use saraha_api::storage::LocalObjectStore;
use saraha_api::AppStateInner;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // `saraha generate-key` prints a fresh SARAHA_ENCRYPTION_KEY and exits
    if std::env::args().nth(1).as_deref() == Some("generate-key") {
        let key = saraha_crypto::keys::generate_field_key();
        println!("{}", saraha_crypto::keys::key_to_base64(&key));
        return Ok(());
    }

    // Load .env if present
    let _ = dotenvy::dotenv();

    // Init logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "saraha_server=debug,saraha_api=debug,saraha_db=debug,tower_http=debug".into()),
        )
        .init();

    // Config
    let config = Arc::new(Config::from_env()?);
    if config.is_development() {
        warn!("Running in development mode; error details are exposed in responses");
    }

    // Init database
    let db = Arc::new(saraha_db::Database::open(&config.db_path)?);

    // Collaborators
    let storage = Arc::new(LocalObjectStore::new(config.storage_dir.clone()).await?);

    let transport: Arc<dyn EmailTransport> = match &config.email_relay_url {
        Some(url) => Arc::new(RelayTransport::new(url.clone(), config.email_relay_key.clone())),
        None => Arc::new(LogTransport),
    };
    let mailer = EmailDispatcher::spawn(transport);

    let identity: Arc<dyn IdentityProvider> = match &config.google_client_id {
        Some(client_id) => Arc::new(GoogleIdentityProvider::new(client_id.clone())),
        None => {
            warn!("SARAHA_GOOGLE_CLIENT_ID not set; Google sign-in is disabled");
            Arc::new(UnconfiguredIdentityProvider)
        }
    };

    // Shared state
    let state = AppStateInner::new(db, config.clone(), mailer, identity, storage)?;

    // Ledger cleanup
    tokio::spawn(run_prune_loop(
        state.ledger.clone(),
        config.cleanup_interval,
        config.revocation_grace,
    ));

    let app = saraha_api::router(state)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http());

    let addr: SocketAddr = format!("{}:{}", config.host, config.port).parse()?;
    info!("Saraha server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
