use anyhow::Context;
use std::time::Duration;

/// Runtime settings, read from `LEDGER_*` environment variables.
#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    pub db_address: String,
    pub db_user: String,
    pub db_pass: String,
    pub namespace: String,
    pub database: String,
    pub listen_address: String,
    pub settle_interval: Duration,
    pub expiry_interval: Duration,
}

impl Settings {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let text = |key: &str, default: &str| lookup(key).unwrap_or_else(|| default.to_string());

        Ok(Self {
            db_address: text("LEDGER_DB_ADDR", "127.0.0.1:8000"),
            db_user: text("LEDGER_DB_USER", "root"),
            db_pass: text("LEDGER_DB_PASS", "root"),
            namespace: text("LEDGER_DB_NS", "bet"),
            database: text("LEDGER_DB_NAME", "ledger"),
            listen_address: text("LEDGER_LISTEN_ADDR", "127.0.0.1:6379"),
            settle_interval: seconds(&lookup, "LEDGER_SETTLE_INTERVAL_SECS", 60)?,
            expiry_interval: seconds(&lookup, "LEDGER_EXPIRY_INTERVAL_SECS", 300)?,
        })
    }
}

fn seconds(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
    default: u64,
) -> anyhow::Result<Duration> {
    let secs = match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse::<u64>()
            .with_context(|| format!("{key} must be a whole number of seconds, got {raw:?}"))?,
        None => default,
    };
    Ok(Duration::from_secs(secs))
}
