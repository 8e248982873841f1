use common::{outcome, GameSide};
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Latest known state of one game.
#[derive(Debug, Clone, PartialEq)]
pub struct GameResult {
    pub game_id: String,
    pub home_score: Option<i64>,
    pub away_score: Option<i64>,
    pub completed: bool,
}

impl GameResult {
    /// Margin from option 1's point of view, once the game is final.
    pub fn final_score_diff(&self, option1_side: GameSide) -> Option<i64> {
        match (self.completed, self.home_score, self.away_score) {
            (true, Some(home), Some(away)) => Some(outcome::score_diff(home, away, option1_side)),
            _ => None,
        }
    }
}

/// Source of final scores. `Ok(None)` means the game is unknown to the feed.
pub trait GameFeed: Send + Sync + 'static {
    fn game_result(
        &self,
        game_id: &str,
    ) -> impl Future<Output = anyhow::Result<Option<GameResult>>> + Send;
}

/// Scores pushed in from outside (a feed poller, an admin), kept in memory.
#[derive(Clone, Default)]
pub struct ScoreBoard {
    games: Arc<RwLock<HashMap<String, GameResult>>>,
}

impl ScoreBoard {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn record(&self, result: GameResult) {
        self.games
            .write()
            .await
            .insert(result.game_id.clone(), result);
    }
}

impl GameFeed for ScoreBoard {
    fn game_result(
        &self,
        game_id: &str,
    ) -> impl Future<Output = anyhow::Result<Option<GameResult>>> + Send {
        let games = self.games.clone();
        let game_id = game_id.to_string();
        async move { Ok(games.read().await.get(&game_id).cloned()) }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn result(home: Option<i64>, away: Option<i64>, completed: bool) -> GameResult {
        GameResult {
            game_id: "g1".into(),
            home_score: home,
            away_score: away,
            completed,
        }
    }

    #[test]
    fn only_final_games_have_a_margin() {
        assert_eq!(result(Some(24), Some(10), true).final_score_diff(GameSide::Home), Some(14));
        assert_eq!(result(Some(24), Some(10), true).final_score_diff(GameSide::Away), Some(-14));
        assert_eq!(result(Some(24), Some(10), false).final_score_diff(GameSide::Home), None);
        assert_eq!(result(None, None, true).final_score_diff(GameSide::Home), None);
    }

    #[tokio::test]
    async fn scoreboard_serves_recorded_games() {
        let board = ScoreBoard::new();
        assert_eq!(board.game_result("g1").await.unwrap(), None);
        board.record(result(Some(3), Some(0), true)).await;
        let stored = board.game_result("g1").await.unwrap().unwrap();
        assert_eq!(stored.home_score, Some(3));
    }
}
