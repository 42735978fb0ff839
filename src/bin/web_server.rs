use std::{path::PathBuf, sync::Arc};

use axum::http::{HeaderValue, Method, header};
use book_club::{
    api::app, config::Config, database::connect, state::AppState, utils::init_log,
};
use clap::Parser;
use time::Duration;
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;
use tower_sessions::{ExpiredDeletion, Expiry, SessionManagerLayer};
use tower_sessions_sqlx_store::SqliteStore;
use tracing::{error, info};

#[derive(Debug, Parser)]
struct Args {
    #[arg(short, long, default_value = "book_club.toml")]
    config: PathBuf,
    /// Overrides the port from the config file
    #[arg(short, long)]
    port: Option<u16>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let mut config = Config::load(&args.config)?;
    if let Some(port) = args.port {
        config.port = port;
    }
    let _guard = init_log(config.log_dir.clone())?;

    let database = connect(&config.database_url).await?;

    let session_store = SqliteStore::new(database.clone());
    session_store.migrate().await?;
    let deletion_task = tokio::task::spawn(
        session_store
            .clone()
            .continuously_delete_expired(tokio::time::Duration::from_secs(60 * 60)),
    );
    let session_layer = SessionManagerLayer::new(session_store)
        .with_secure(config.secure_cookies)
        .with_expiry(Expiry::OnInactivity(Duration::days(
            config.session_expiry_days,
        )));

    let origins = config
        .cors_origins
        .iter()
        .map(|origin| origin.parse::<HeaderValue>())
        .collect::<Result<Vec<_>, _>>()?;
    let cors = CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
        .allow_headers([header::CONTENT_TYPE])
        .allow_credentials(true);

    let address = config.address();
    let state = Arc::new(AppState::new(database, config));
    let app = app(state).layer(ServiceBuilder::new().layer(cors).layer(session_layer));

    let listener = tokio::net::TcpListener::bind(&address).await?;
    info!("listening on http://{}", address);
    info!("swagger ui available at http://{}/swagger-ui/", address);
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    deletion_task.abort();
    info!("server stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("failed to listen for ctrl-c: {}", e);
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!("failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    info!("shutting down");
}
