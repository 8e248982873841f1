use thiserror::Error;

/// Typed failures raised while settling a wager.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum SettleError {
    #[error("wager {0} not found")]
    WagerNotFound(String),

    #[error("guild {0} not found")]
    GuildNotFound(String),

    #[error("entry {entry} picks option {option}, wagers only have options 1 and 2")]
    InvalidOption { entry: String, option: u8 },

    #[error("modifier lookup failed for user {user}: {reason}")]
    ModifierLookup { user: String, reason: String },

    #[error("could not load bettor {user}: {reason}")]
    BettorUnavailable { user: String, reason: String },
}

impl SettleError {
    /// Whether the failure came from the store rather than from the data.
    pub fn is_transient(&self) -> bool {
        matches!(self, SettleError::BettorUnavailable { .. })
    }
}
