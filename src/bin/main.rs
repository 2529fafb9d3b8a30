use std::net::SocketAddr;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::{Level, info};
use tracing_subscriber::EnvFilter;

use social_api::{AppConfig, build_app, load_config};

#[derive(Parser)]
#[command(name = "social-api")]
#[command(about = "Social graph HTTP API")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP API
    Server {
        /// Bind address, e.g. 0.0.0.0:8080 (overrides the config file)
        #[arg(long, env = "SOCIAL_BIND")]
        bind: Option<String>,
        /// SurrealDB URL, `memory` for an in-process store
        #[arg(long, env = "SURREALDB_URL")]
        db_url: Option<String>,
    },
    /// Apply the schema and seed roles
    Init {
        #[arg(long, env = "SURREALDB_URL")]
        db_url: Option<String>,
    },
}

fn apply_overrides(config: &mut AppConfig, bind: Option<String>, db_url: Option<String>) {
    if let Some(bind) = bind {
        config.server.bind = bind;
    }
    if let Some(url) = db_url {
        config.database.url = url;
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env()
                .add_directive("social_api=info".parse()?)
                .add_directive("tower_http=info".parse()?),
        )
        .with_max_level(Level::INFO)
        .init();

    let cli = Cli::parse();
    let mut config = load_config()?;

    match cli.command {
        Commands::Server { bind, db_url } => {
            apply_overrides(&mut config, bind, db_url);
            info!("Using database url: {}", config.database.url);

            let app = build_app(&config).await?;

            let listener = tokio::net::TcpListener::bind(&config.server.bind)
                .await
                .with_context(|| format!("failed to bind {}", config.server.bind))?;
            info!("Server listening on http://{}/v1", config.server.bind);

            axum::serve(
                listener,
                app.into_make_service_with_connect_info::<SocketAddr>(),
            )
            .with_graceful_shutdown(shutdown_signal())
            .await?;
            info!("Server stopped");
        }
        Commands::Init { db_url } => {
            apply_overrides(&mut config, None, db_url);
            info!("Using database url for initialization: {}", config.database.url);

            info!("Initializing database...");
            let db = social_api::create_connection(config.database.clone()).await?;
            social_api::ensure_schema(&db).await?;
            info!("Database initialized successfully");
        }
    }

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
