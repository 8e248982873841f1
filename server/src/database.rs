use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use surrealdb::engine::local::{Db, Mem};
use surrealdb::engine::remote::ws::{Client, Ws};
use surrealdb::opt::auth::Root;
use surrealdb::sql::statements::{BeginStatement, CommitStatement};
use surrealdb::sql::{Id, Thing};
use surrealdb::{Connection, Result, Surreal};

use crate::config::Settings;
use crate::ledger::LedgerPlan;
use crate::settlement::Bettor;

pub const USER: &str = "user";
pub const GUILD: &str = "guild";
pub const WAGER: &str = "wager";
pub const WAGER_ENTRY: &str = "wager_entry";
pub const PARLAY: &str = "parlay";
pub const PARLAY_LEG: &str = "parlay_leg";
pub const MODIFIER: &str = "modifier";

pub fn thing(tb: &str, key: &str) -> Thing {
    Thing {
        tb: tb.into(),
        id: Id::String(key.into()),
    }
}

/// The bare key of a record id, `alice` for `user:alice`.
pub fn key(thing: &Thing) -> String {
    match &thing.id {
        Id::String(key) => key.clone(),
        other => other.to_string(),
    }
}

fn opt_thing(tb: &str, key: &Option<String>) -> Option<Thing> {
    key.as_deref().map(|key| thing(tb, key))
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct Record {
    pub id: Thing,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct DbUser {
    pub id: Thing,
    pub name: String,
    pub guild: Thing,
    pub points: f64,
    pub subscribed_team: Option<String>,
}

impl From<&common::User> for DbUser {
    fn from(value: &common::User) -> Self {
        Self {
            id: thing(USER, &value.id),
            name: value.name.clone(),
            guild: thing(GUILD, &value.guild),
            points: value.points,
            subscribed_team: value.subscribed_team.clone(),
        }
    }
}

impl From<DbUser> for common::User {
    fn from(value: DbUser) -> Self {
        Self {
            id: key(&value.id),
            name: value.name,
            guild: key(&value.guild),
            points: value.points,
            subscribed_team: value.subscribed_team,
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct DbGuild {
    pub id: Thing,
    pub name: String,
    pub pool: f64,
    pub emperor: Option<Thing>,
    pub emperor_until: Option<DateTime<Utc>>,
}

impl From<&common::Guild> for DbGuild {
    fn from(value: &common::Guild) -> Self {
        Self {
            id: thing(GUILD, &value.id),
            name: value.name.clone(),
            pool: value.pool,
            emperor: opt_thing(USER, &value.emperor),
            emperor_until: value.emperor_until,
        }
    }
}

impl From<DbGuild> for common::Guild {
    fn from(value: DbGuild) -> Self {
        Self {
            id: key(&value.id),
            name: value.name,
            pool: value.pool,
            emperor: value.emperor.as_ref().map(key),
            emperor_until: value.emperor_until,
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct DbWager {
    pub id: Thing,
    pub guild: Thing,
    pub title: String,
    pub option1: String,
    pub option2: String,
    pub option1_odds: i32,
    pub option2_odds: i32,
    pub spread: Option<f64>,
    pub game_id: Option<String>,
    pub option1_side: common::GameSide,
    pub active: bool,
    pub paid: bool,
}

impl From<&common::Wager> for DbWager {
    fn from(value: &common::Wager) -> Self {
        Self {
            id: thing(WAGER, &value.id),
            guild: thing(GUILD, &value.guild),
            title: value.title.clone(),
            option1: value.option1.clone(),
            option2: value.option2.clone(),
            option1_odds: value.option1_odds,
            option2_odds: value.option2_odds,
            spread: value.spread,
            game_id: value.game_id.clone(),
            option1_side: value.option1_side,
            active: value.active,
            paid: value.paid,
        }
    }
}

impl From<DbWager> for common::Wager {
    fn from(value: DbWager) -> Self {
        Self {
            id: key(&value.id),
            guild: key(&value.guild),
            title: value.title,
            option1: value.option1,
            option2: value.option2,
            option1_odds: value.option1_odds,
            option2_odds: value.option2_odds,
            spread: value.spread,
            game_id: value.game_id,
            option1_side: value.option1_side,
            active: value.active,
            paid: value.paid,
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct DbWagerEntry {
    pub id: Thing,
    pub wager: Thing,
    pub user: Thing,
    pub option: u8,
    pub stake: f64,
    pub spread: Option<f64>,
    pub placed_at: DateTime<Utc>,
    pub resolved: bool,
    pub won: bool,
}

impl From<&common::WagerEntry> for DbWagerEntry {
    fn from(value: &common::WagerEntry) -> Self {
        Self {
            id: thing(WAGER_ENTRY, &value.id),
            wager: thing(WAGER, &value.wager),
            user: thing(USER, &value.user),
            option: value.option,
            stake: value.stake,
            spread: value.spread,
            placed_at: value.placed_at,
            resolved: value.resolved,
            won: value.won,
        }
    }
}

impl From<DbWagerEntry> for common::WagerEntry {
    fn from(value: DbWagerEntry) -> Self {
        Self {
            id: key(&value.id),
            wager: key(&value.wager),
            user: key(&value.user),
            option: value.option,
            stake: value.stake,
            spread: value.spread,
            placed_at: value.placed_at,
            resolved: value.resolved,
            won: value.won,
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct DbParlay {
    pub id: Thing,
    pub user: Thing,
    pub guild: Thing,
    pub stake: f64,
    pub multiplier: f64,
    pub status: common::ParlayStatus,
}

impl From<&common::Parlay> for DbParlay {
    fn from(value: &common::Parlay) -> Self {
        Self {
            id: thing(PARLAY, &value.id),
            user: thing(USER, &value.user),
            guild: thing(GUILD, &value.guild),
            stake: value.stake,
            multiplier: value.multiplier,
            status: value.status,
        }
    }
}

impl From<DbParlay> for common::Parlay {
    fn from(value: DbParlay) -> Self {
        Self {
            id: key(&value.id),
            user: key(&value.user),
            guild: key(&value.guild),
            stake: value.stake,
            multiplier: value.multiplier,
            status: value.status,
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct DbParlayLeg {
    pub id: Thing,
    pub parlay: Thing,
    pub wager: Thing,
    pub option: u8,
    pub resolved: bool,
    pub won: bool,
}

impl From<&common::ParlayLeg> for DbParlayLeg {
    fn from(value: &common::ParlayLeg) -> Self {
        Self {
            id: thing(PARLAY_LEG, &value.id),
            parlay: thing(PARLAY, &value.parlay),
            wager: thing(WAGER, &value.wager),
            option: value.option,
            resolved: value.resolved,
            won: value.won,
        }
    }
}

impl From<DbParlayLeg> for common::ParlayLeg {
    fn from(value: DbParlayLeg) -> Self {
        Self {
            id: key(&value.id),
            parlay: key(&value.parlay),
            wager: key(&value.wager),
            option: value.option,
            resolved: value.resolved,
            won: value.won,
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct DbModifier {
    pub id: Thing,
    pub owner: Thing,
    pub guild: Thing,
    pub card: String,
    pub target_user: Option<Thing>,
    pub target_wager: Option<Thing>,
    pub acquired_at: DateTime<Utc>,
    pub expires_at: Option<DateTime<Utc>>,
    pub uses: u32,
    pub side_stake: Option<f64>,
}

impl From<&common::ModifierItem> for DbModifier {
    fn from(value: &common::ModifierItem) -> Self {
        Self {
            id: thing(MODIFIER, &value.id),
            owner: thing(USER, &value.owner),
            guild: thing(GUILD, &value.guild),
            card: value.card.clone(),
            target_user: opt_thing(USER, &value.target_user),
            target_wager: opt_thing(WAGER, &value.target_wager),
            acquired_at: value.acquired_at,
            expires_at: value.expires_at,
            uses: value.uses,
            side_stake: value.side_stake,
        }
    }
}

impl From<DbModifier> for common::ModifierItem {
    fn from(value: DbModifier) -> Self {
        Self {
            id: key(&value.id),
            owner: key(&value.owner),
            guild: key(&value.guild),
            card: value.card,
            target_user: value.target_user.as_ref().map(key),
            target_wager: value.target_wager.as_ref().map(key),
            acquired_at: value.acquired_at,
            expires_at: value.expires_at,
            uses: value.uses,
            side_stake: value.side_stake,
        }
    }
}

fn convert<D, T: From<D>>(records: Vec<D>) -> Vec<T> {
    records.into_iter().map(T::from).collect()
}

pub struct DatabaseConnection<C: Connection> {
    connection: Surreal<C>,
}

impl DatabaseConnection<Client> {
    pub async fn connect(settings: &Settings) -> Result<Self> {
        let db = Surreal::new::<Ws>(settings.db_address.as_str()).await?;

        db.signin(Root {
            username: &settings.db_user,
            password: &settings.db_pass,
        })
        .await?;

        db.use_ns(&settings.namespace)
            .use_db(&settings.database)
            .await?;

        Ok(Self { connection: db })
    }
}

impl DatabaseConnection<Db> {
    /// Embedded store, gone when dropped.
    pub async fn in_memory() -> Result<Self> {
        let db = Surreal::new::<Mem>(()).await?;
        db.use_ns("test").use_db("ledger").await?;
        Ok(Self { connection: db })
    }
}

impl<C: Connection> DatabaseConnection<C> {
    pub async fn add_guild(&mut self, guild: &common::Guild) -> Result<()> {
        let _: Option<Record> = self
            .connection
            .create((GUILD, guild.id.as_str()))
            .content(DbGuild::from(guild))
            .await?;
        Ok(())
    }

    pub async fn add_user(&mut self, user: &common::User) -> Result<()> {
        let _: Option<Record> = self
            .connection
            .create((USER, user.id.as_str()))
            .content(DbUser::from(user))
            .await?;
        Ok(())
    }

    pub async fn add_wager(&mut self, wager: &common::Wager) -> Result<()> {
        let _: Option<Record> = self
            .connection
            .create((WAGER, wager.id.as_str()))
            .content(DbWager::from(wager))
            .await?;
        Ok(())
    }

    pub async fn add_entry(&mut self, entry: &common::WagerEntry) -> Result<()> {
        let _: Option<Record> = self
            .connection
            .create((WAGER_ENTRY, entry.id.as_str()))
            .content(DbWagerEntry::from(entry))
            .await?;
        Ok(())
    }

    pub async fn add_parlay(&mut self, parlay: &common::Parlay) -> Result<()> {
        let _: Option<Record> = self
            .connection
            .create((PARLAY, parlay.id.as_str()))
            .content(DbParlay::from(parlay))
            .await?;
        Ok(())
    }

    pub async fn add_parlay_leg(&mut self, leg: &common::ParlayLeg) -> Result<()> {
        let _: Option<Record> = self
            .connection
            .create((PARLAY_LEG, leg.id.as_str()))
            .content(DbParlayLeg::from(leg))
            .await?;
        Ok(())
    }

    pub async fn add_modifier(&mut self, item: &common::ModifierItem) -> Result<()> {
        let _: Option<Record> = self
            .connection
            .create((MODIFIER, item.id.as_str()))
            .content(DbModifier::from(item))
            .await?;
        Ok(())
    }

    pub async fn get_user(&self, id: &str) -> Result<Option<common::User>> {
        let user: Option<DbUser> = self.connection.select((USER, id)).await?;
        Ok(user.map(Into::into))
    }

    pub async fn get_guild(&self, id: &str) -> Result<Option<common::Guild>> {
        let guild: Option<DbGuild> = self.connection.select((GUILD, id)).await?;
        Ok(guild.map(Into::into))
    }

    pub async fn get_wager(&self, id: &str) -> Result<Option<common::Wager>> {
        let wager: Option<DbWager> = self.connection.select((WAGER, id)).await?;
        Ok(wager.map(Into::into))
    }

    /// Unpaid wagers tied to a game, i.e. the ones a feed can settle.
    pub async fn get_due_wagers(&self) -> Result<Vec<common::Wager>> {
        let wagers: Vec<DbWager> = self.connection.select(WAGER).await?;
        Ok(wagers
            .into_iter()
            .filter(|wager| !wager.paid && wager.game_id.is_some())
            .map(Into::into)
            .collect())
    }

    pub async fn get_entries_for_wager(&self, wager: &str) -> Result<Vec<common::WagerEntry>> {
        let entries: Vec<DbWagerEntry> = self
            .connection
            .query("SELECT * FROM wager_entry WHERE wager = $wager;")
            .bind(("wager", thing(WAGER, wager)))
            .await?
            .take(0)?;
        Ok(convert(entries))
    }

    pub async fn get_modifiers_for_user(&self, user: &str) -> Result<Vec<common::ModifierItem>> {
        let items: Vec<DbModifier> = self
            .connection
            .query("SELECT * FROM modifier WHERE owner = $owner;")
            .bind(("owner", thing(USER, user)))
            .await?
            .take(0)?;
        Ok(convert(items))
    }

    pub async fn get_modifiers_for_guild(&self, guild: &str) -> Result<Vec<common::ModifierItem>> {
        let items: Vec<DbModifier> = self
            .connection
            .query("SELECT * FROM modifier WHERE guild = $guild;")
            .bind(("guild", thing(GUILD, guild)))
            .await?
            .take(0)?;
        Ok(convert(items))
    }

    pub async fn get_bettor(&self, user: &str) -> Result<Option<Bettor>> {
        let Some(user) = self.get_user(user).await? else {
            return Ok(None);
        };
        let inventory = self.get_modifiers_for_user(&user.id).await?;
        Ok(Some(Bettor { user, inventory }))
    }

    pub async fn get_parlay_legs(&self, parlay: &str) -> Result<Vec<common::ParlayLeg>> {
        let legs: Vec<DbParlayLeg> = self
            .connection
            .query("SELECT * FROM parlay_leg WHERE parlay = $parlay;")
            .bind(("parlay", thing(PARLAY, parlay)))
            .await?
            .take(0)?;
        Ok(convert(legs))
    }

    /// Every parlay with a leg on `wager`, each with all of its legs.
    pub async fn get_parlays_for_wager(
        &self,
        wager: &str,
    ) -> Result<Vec<(common::Parlay, Vec<common::ParlayLeg>)>> {
        let riding: Vec<DbParlayLeg> = self
            .connection
            .query("SELECT * FROM parlay_leg WHERE wager = $wager;")
            .bind(("wager", thing(WAGER, wager)))
            .await?
            .take(0)?;

        let mut parlay_ids: Vec<String> = riding.iter().map(|leg| key(&leg.parlay)).collect();
        parlay_ids.sort();
        parlay_ids.dedup();

        let mut parlays = vec![];
        for id in parlay_ids {
            let parlay: Option<DbParlay> = self.connection.select((PARLAY, id.as_str())).await?;
            if let Some(parlay) = parlay {
                let legs = self.get_parlay_legs(&id).await?;
                parlays.push((parlay.into(), legs));
            }
        }
        Ok(parlays)
    }

    /// Applies a settlement in one transaction.
    ///
    /// The batch throws, and so writes nothing, if the wager was paid by the
    /// time it runs or if any card it spends is already gone. Balances and
    /// card uses move by increments only, and the wager is flagged paid by the
    /// last statement of the same batch.
    pub async fn commit_ledger(&mut self, plan: &LedgerPlan) -> Result<()> {
        let mut query = self
            .connection
            .query(BeginStatement)
            .query("IF $wager.paid = true { THROW \"wager already paid\"; };")
            .bind(("wager", thing(WAGER, &plan.wager)));

        for (i, used) in plan.consumed.iter().enumerate() {
            query = query
                .query(format!(
                    "IF !$item_{i}.uses OR $item_{i}.uses < 1 \
                     {{ THROW \"modifier already spent\"; }};"
                ))
                .bind((format!("item_{i}"), thing(MODIFIER, &used.item)));
        }

        for (i, (user, delta)) in plan.user_deltas.iter().enumerate() {
            query = query
                .query(format!("UPDATE $user_{i} SET points += $delta_{i};"))
                .bind((format!("user_{i}"), thing(USER, user)))
                .bind((format!("delta_{i}"), *delta));
        }

        if plan.pool_delta != 0.0 {
            query = query
                .query("UPDATE $guild SET pool += $pool_delta;")
                .bind(("guild", thing(GUILD, &plan.guild)))
                .bind(("pool_delta", plan.pool_delta));
        }

        for (i, resolution) in plan.entries.iter().enumerate() {
            query = query
                .query(format!("UPDATE $entry_{i} SET resolved = true, won = $won_{i};"))
                .bind((format!("entry_{i}"), thing(WAGER_ENTRY, &resolution.entry)))
                .bind((format!("won_{i}"), resolution.won));
        }

        for i in 0..plan.consumed.len() {
            query = query
                .query(format!("UPDATE $item_{i} SET uses -= 1;"))
                .query(format!("DELETE $item_{i} WHERE uses <= 0;"));
        }

        for (i, resolution) in plan.legs.iter().enumerate() {
            query = query
                .query(format!("UPDATE $leg_{i} SET resolved = true, won = $leg_won_{i};"))
                .bind((format!("leg_{i}"), thing(PARLAY_LEG, &resolution.leg)))
                .bind((format!("leg_won_{i}"), resolution.won));
        }

        for (i, update) in plan.parlays.iter().enumerate() {
            query = query
                .query(format!("UPDATE $parlay_{i} SET status = $status_{i};"))
                .bind((format!("parlay_{i}"), thing(PARLAY, &update.parlay)))
                .bind((format!("status_{i}"), update.status));
        }

        query
            .query("UPDATE $wager SET paid = true, active = false;")
            .query(CommitStatement)
            .await?
            .check()?;
        Ok(())
    }

    /// Deletes every card whose expiry has passed. Returns how many went.
    pub async fn sweep_expired_modifiers(&mut self, now: DateTime<Utc>) -> Result<usize> {
        let items: Vec<DbModifier> = self.connection.select(MODIFIER).await?;
        let expired: Vec<Thing> = items
            .into_iter()
            .filter(|item| item.expires_at.is_some_and(|expiry| expiry <= now))
            .map(|item| item.id)
            .collect();
        if expired.is_empty() {
            return Ok(0);
        }

        let mut query = self.connection.query(BeginStatement);
        for (i, id) in expired.iter().enumerate() {
            query = query
                .query(format!("DELETE $expired_{i};"))
                .bind((format!("expired_{i}"), id.clone()));
        }
        query.query(CommitStatement).await?.check()?;
        Ok(expired.len())
    }
}
