use std::sync::Arc;

use clap::Parser;
use parley_core::{MemoryUserStore, OpenAiCompletionClient, ParleyConfig, PgUserStore, UserStore};
use tokio::sync::broadcast;
use tracing_subscriber::{fmt, EnvFilter};

use parley_server::commands::COMMANDS;
use parley_server::dispatch::Dispatcher;
use parley_server::http::HttpState;
use parley_server::session::{SessionManager, SessionSettings};
use parley_server::telegram::TelegramTransport;
use parley_server::transport::ChatTransport;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    #[arg(short, long, default_value = "parley.toml")]
    config: String,

    /// Check the database connection and exit
    #[arg(long, conflicts_with = "memory_store")]
    health: bool,

    /// Keep sessions in memory instead of Postgres (nothing survives a restart)
    #[arg(long)]
    memory_store: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file if present
    dotenvy::dotenv().ok();

    let args = Args::parse();

    // Load config
    let config = match ParleyConfig::load(&args.config) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Failed to load config from {}: {}", args.config, e);
            std::process::exit(1);
        }
    };

    // Init logging
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.service.log_level));
    fmt().with_env_filter(filter).init();

    // Connect to DB
    let pool = if args.memory_store {
        tracing::warn!("Using in-memory session store");
        None
    } else {
        let pool = match parley_core::db::create_pool(&config.database).await {
            Ok(p) => p,
            Err(e) => {
                eprintln!("Failed to connect to database: {}", e);
                std::process::exit(1);
            }
        };

        if args.health {
            match parley_core::db::health_check(&pool).await {
                Ok(v) => println!("✅ PostgreSQL connected: {}", v),
                Err(e) => {
                    println!("❌ PostgreSQL connection failed: {}", e);
                    std::process::exit(1);
                }
            }
            return Ok(());
        }

        parley_core::db::ensure_schema(&pool).await?;
        Some(pool)
    };

    let store: Arc<dyn UserStore> = match &pool {
        Some(pool) => Arc::new(PgUserStore::new(pool.clone())),
        None => Arc::new(MemoryUserStore::new()),
    };

    let completion = Arc::new(OpenAiCompletionClient::new(&config.completion)?);
    let telegram = Arc::new(TelegramTransport::new(&config.telegram)?);

    if let Err(e) = telegram.set_commands(COMMANDS).await {
        tracing::warn!(error = %e, "Could not update slash commands");
    } else {
        tracing::info!("Updated slash commands");
    }

    let manager = Arc::new(SessionManager::new(
        store.clone(),
        completion,
        SessionSettings::from(&config),
    ));
    let dispatcher = Arc::new(Dispatcher::new(
        manager.clone(),
        telegram.clone(),
        config.telegram.bot_username.clone(),
    ));

    let (tx, _rx) = broadcast::channel(1);
    let shutdown_tx = tx.clone();

    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for Ctrl+C: {}", e);
            return;
        }
        tracing::info!("Shutdown signal received");
        let _ = shutdown_tx.send(());
    });

    // Daily quota reset at 00:00 UTC
    tokio::spawn(parley_server::scheduler::run_midnight_reset_loop(
        store,
        tx.subscribe(),
    ));

    if config.http.enabled {
        let http_state = HttpState {
            pool: pool.clone(),
            manager: manager.clone(),
        };
        let http_config = config.http.clone();
        let http_shutdown = tx.subscribe();
        tokio::spawn(async move {
            if let Err(e) =
                parley_server::http::start_http_server(http_state, http_config, http_shutdown).await
            {
                tracing::error!("HTTP server error: {}", e);
            }
        });
    }

    parley_server::telegram::run_poll_loop(telegram, dispatcher, tx.subscribe()).await;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_health_check_rejects_memory_store() {
        let err = Args::try_parse_from(["parley-server", "--health", "--memory-store"]).unwrap_err();
        assert_eq!(err.kind(), clap::error::ErrorKind::ArgumentConflict);
    }

    #[test]
    fn test_flags_parse_on_their_own() {
        let args = Args::try_parse_from(["parley-server", "--health"]).unwrap();
        assert!(args.health && !args.memory_store);
        assert_eq!(args.config, "parley.toml");

        let args = Args::try_parse_from(["parley-server", "--memory-store"]).unwrap();
        assert!(args.memory_store && !args.health);
    }
}
