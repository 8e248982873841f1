pub mod config;
pub mod connection_manager;
pub mod database;
pub mod database_manager;
pub mod error;
pub mod feed;
pub mod ledger;
pub mod modifiers;
pub mod notifier;
pub mod parlay;
pub mod scheduler;
pub mod settlement;
pub mod wager_manager;
