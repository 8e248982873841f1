use crate::Wager;

/// Total return (stake included) of a winning stake at American odds.
pub fn total_return(stake: f64, american_odds: i32) -> f64 {
    if american_odds < 0 {
        stake + stake * 100.0 / f64::from(american_odds.unsigned_abs())
    } else {
        stake + stake * f64::from(american_odds) / 100.0
    }
}

/// Total return for a stake on `option` of `wager`; `None` for an unknown option.
pub fn payout(stake: f64, option: u8, wager: &Wager) -> Option<f64> {
    wager.odds_for(option).map(|odds| total_return(stake, odds))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::GameSide;

    fn close(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn favourite_odds() {
        assert!(close(total_return(110.0, -110), 210.0));
        assert!(close(total_return(100.0, -200), 150.0));
    }

    #[test]
    fn underdog_odds() {
        assert!(close(total_return(100.0, 150), 250.0));
        assert!(close(total_return(40.0, 100), 80.0));
    }

    #[test]
    fn payout_reads_the_chosen_option() {
        let wager = Wager {
            id: "w".into(),
            guild: "g".into(),
            title: "Chiefs @ Bills".into(),
            option1: "Bills".into(),
            option2: "Chiefs".into(),
            option1_odds: -150,
            option2_odds: 130,
            spread: None,
            game_id: None,
            option1_side: GameSide::Home,
            active: true,
            paid: false,
        };
        assert!(close(payout(150.0, 1, &wager).unwrap(), 250.0));
        assert!(close(payout(100.0, 2, &wager).unwrap(), 230.0));
        assert_eq!(payout(100.0, 3, &wager), None);
    }
}
