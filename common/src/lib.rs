use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

pub mod network;
pub mod odds;
pub mod outcome;

/// Which scoreboard side option 1 of a wager represents.
#[derive(Serialize, Deserialize, Debug, PartialEq, Eq, Clone, Copy, Default)]
#[serde(rename_all = "lowercase")]
pub enum GameSide {
    #[default]
    Home,
    Away,
}

#[derive(Serialize, Deserialize, Debug, PartialEq, Clone)]
pub struct User {
    pub id: String,
    pub name: String,
    pub guild: String,
    pub points: f64,
    pub subscribed_team: Option<String>,
}

impl User {
    pub fn new(id: impl Into<String>, guild: impl Into<String>, points: f64) -> Self {
        let id = id.into();
        Self {
            name: id.clone(),
            id,
            guild: guild.into(),
            points,
            subscribed_team: None,
        }
    }
}

#[derive(Serialize, Deserialize, Debug, PartialEq, Clone)]
pub struct Guild {
    pub id: String,
    pub name: String,
    pub pool: f64,
    pub emperor: Option<String>,
    pub emperor_until: Option<DateTime<Utc>>,
}

impl Guild {
    pub fn new(id: impl Into<String>, pool: f64) -> Self {
        let id = id.into();
        Self {
            name: id.clone(),
            id,
            pool,
            emperor: None,
            emperor_until: None,
        }
    }

    /// The authority holder, while their window is still open.
    pub fn emperor_at(&self, now: DateTime<Utc>) -> Option<&str> {
        match (&self.emperor, self.emperor_until) {
            (Some(holder), Some(until)) if until > now => Some(holder.as_str()),
            _ => None,
        }
    }
}

#[derive(Serialize, Deserialize, Debug, PartialEq, Clone)]
pub struct Wager {
    pub id: String,
    pub guild: String,
    pub title: String,
    pub option1: String,
    pub option2: String,
    pub option1_odds: i32,
    pub option2_odds: i32,
    /// Handicap applied to option 1. `None` settles on the moneyline.
    pub spread: Option<f64>,
    pub game_id: Option<String>,
    pub option1_side: GameSide,
    pub active: bool,
    pub paid: bool,
}

impl Wager {
    pub fn option_name(&self, option: u8) -> Option<&str> {
        match option {
            1 => Some(&self.option1),
            2 => Some(&self.option2),
            _ => None,
        }
    }

    pub fn odds_for(&self, option: u8) -> Option<i32> {
        match option {
            1 => Some(self.option1_odds),
            2 => Some(self.option2_odds),
            _ => None,
        }
    }
}

/// One user's stake on one option of a wager.
#[derive(Serialize, Deserialize, Debug, PartialEq, Clone)]
pub struct WagerEntry {
    pub id: String,
    pub wager: String,
    pub user: String,
    pub option: u8,
    pub stake: f64,
    /// Line captured when the bet was placed; wins over the wager's current spread.
    pub spread: Option<f64>,
    pub placed_at: DateTime<Utc>,
    pub resolved: bool,
    pub won: bool,
}

impl WagerEntry {
    pub fn effective_spread(&self, wager: &Wager) -> Option<f64> {
        self.spread.or(wager.spread)
    }
}

#[derive(Serialize, Deserialize, Debug, PartialEq, Eq, Clone, Copy, Default)]
#[serde(rename_all = "lowercase")]
pub enum ParlayStatus {
    #[default]
    Pending,
    Won,
    Lost,
    Partial,
}

#[derive(Serialize, Deserialize, Debug, PartialEq, Clone)]
pub struct Parlay {
    pub id: String,
    pub user: String,
    pub guild: String,
    pub stake: f64,
    pub multiplier: f64,
    pub status: ParlayStatus,
}

#[derive(Serialize, Deserialize, Debug, PartialEq, Clone)]
pub struct ParlayLeg {
    pub id: String,
    pub parlay: String,
    pub wager: String,
    pub option: u8,
    pub resolved: bool,
    pub won: bool,
}

/// A card held in a user's inventory.
#[derive(Serialize, Deserialize, Debug, PartialEq, Clone)]
pub struct ModifierItem {
    pub id: String,
    pub owner: String,
    pub guild: String,
    pub card: String,
    pub target_user: Option<String>,
    pub target_wager: Option<String>,
    pub acquired_at: DateTime<Utc>,
    pub expires_at: Option<DateTime<Utc>>,
    pub uses: u32,
    /// Points put up by a counter-wager card.
    pub side_stake: Option<f64>,
}

impl ModifierItem {
    pub fn new(
        id: impl Into<String>,
        owner: impl Into<String>,
        guild: impl Into<String>,
        card: impl Into<String>,
        acquired_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: id.into(),
            owner: owner.into(),
            guild: guild.into(),
            card: card.into(),
            target_user: None,
            target_wager: None,
            acquired_at,
            expires_at: None,
            uses: 1,
            side_stake: None,
        }
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|expiry| expiry <= now)
    }

    pub fn acquired_within(&self, now: DateTime<Utc>, window: Duration) -> bool {
        self.acquired_at <= now && now - self.acquired_at <= window
    }
}

/// Rendered result of one entry, as shown to the guild.
#[derive(Serialize, Deserialize, Debug, PartialEq, Clone)]
pub struct EntryLine {
    pub user: String,
    pub spread_label: String,
    pub won: bool,
    pub stake: f64,
    pub payout: f64,
    pub refund: f64,
    pub modifiers: Vec<String>,
    pub text: String,
}

#[derive(Serialize, Deserialize, Debug, PartialEq, Clone)]
pub struct SettlementNotice {
    pub wager_id: String,
    pub guild: String,
    pub title: String,
    pub winning_option: Option<String>,
    pub lines: Vec<EntryLine>,
    pub adjustments: Vec<String>,
    pub skipped: Vec<String>,
    pub total_payout: f64,
    pub pool_balance: f64,
}

#[derive(Serialize, Deserialize, Debug, PartialEq, Clone)]
pub enum SettleOutcome {
    AlreadyPaid,
    NotReady,
    Settled(SettlementNotice),
}
