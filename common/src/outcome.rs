//! Who won, given a final margin and a line.
//!
//! `score_diff` is always `score(option 1 side) - score(option 2 side)`. A
//! spread is quoted from option 1's point of view, so a home favourite by 3.5
//! on option 1 carries `spread = -3.5`.

use crate::GameSide;

/// Margin from option 1's point of view.
pub fn score_diff(home_score: i64, away_score: i64, option1_side: GameSide) -> i64 {
    match option1_side {
        GameSide::Home => home_score - away_score,
        GameSide::Away => away_score - home_score,
    }
}

/// Whether a stake on `option` wins.
///
/// Against the spread, a margin landing exactly on the line is a loss for
/// both options; nobody is refunded.
pub fn entry_wins(option: u8, score_diff: i64, spread: Option<f64>) -> bool {
    let margin = score_diff as f64;
    match (option, spread) {
        (1, None) => score_diff > 0,
        (2, None) => score_diff < 0,
        (1, Some(spread)) => margin + spread > 0.0,
        (2, Some(spread)) => -(margin + spread) > 0.0,
        _ => false,
    }
}

/// Winning option for the wager as a whole, `None` on a tie or a push.
pub fn determine_outcome(score_diff: i64, spread: Option<f64>) -> Option<u8> {
    if entry_wins(1, score_diff, spread) {
        Some(1)
    } else if entry_wins(2, score_diff, spread) {
        Some(2)
    } else {
        None
    }
}
