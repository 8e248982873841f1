use anyhow::Context;
use bookie::config::Settings;
use bookie::connection_manager::{handle_listen_server, Services};
use bookie::database::DatabaseConnection;
use bookie::database_manager::DatabaseManager;
use bookie::feed::ScoreBoard;
use bookie::modifiers::ModifierRegistry;
use bookie::notifier::Notifier;
use bookie::scheduler::Scheduler;
use bookie::wager_manager::WagerManager;
use std::sync::Arc;
use tokio::join;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,bookie=debug")),
        )
        .with(tracing_subscriber::fmt::layer().with_target(true))
        .init();

    let settings = Settings::from_env()?;
    info!(db = %settings.db_address, listen = %settings.listen_address, "starting bookie");

    let database = DatabaseConnection::connect(&settings)
        .await
        .with_context(|| format!("connecting to surrealdb at {}", settings.db_address))?;
    let listener = TcpListener::bind(&settings.listen_address)
        .await
        .with_context(|| format!("binding {}", settings.listen_address))?;

    let (db_tx, db_rx) = mpsc::channel(32);
    let mut db_manager = DatabaseManager::new(database, db_rx);
    let db_task = tokio::spawn(async move {
        db_manager.manage().await;
    });

    let scoreboard = ScoreBoard::new();
    let notifier = Notifier::new(64);
    let registry = Arc::new(ModifierRegistry::standard());
    info!(cards = registry.len(), "modifier catalog loaded");

    let (wager_tx, wager_rx) = mpsc::channel(32);
    let mut wager_manager = WagerManager::new(
        wager_rx,
        db_tx.clone(),
        scoreboard.clone(),
        registry,
        notifier.clone(),
    );
    let wager_task = tokio::spawn(async move {
        wager_manager.manage().await;
    });

    let scheduler = Scheduler::new(
        wager_tx.clone(),
        db_tx.clone(),
        settings.settle_interval,
        settings.expiry_interval,
    );
    let scheduler_task = tokio::spawn(scheduler.run());

    let services = Services {
        db_tx,
        wager_tx,
        scoreboard,
        notifier,
    };
    let listen_server_task = tokio::spawn(handle_listen_server(listener, services));

    let (res1, res2, res3, res4) = join!(db_task, wager_task, scheduler_task, listen_server_task);
    for (task, result) in [
        ("database", res1),
        ("wager", res2),
        ("scheduler", res3),
        ("listener", res4),
    ] {
        if let Err(err) = result {
            error!(task, error = %err, "task ended abnormally");
        }
    }
    Ok(())
}
