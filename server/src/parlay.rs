use common::{Parlay, ParlayLeg, ParlayStatus};
use tracing::debug;

use crate::ledger::{LedgerPlan, LegResolution, ParlayUpdate};

/// Aggregate status of a parlay from its legs.
pub fn aggregate_status(legs: &[ParlayLeg]) -> ParlayStatus {
    let resolved = legs.iter().filter(|leg| leg.resolved).count();
    if legs.iter().any(|leg| leg.resolved && !leg.won) {
        ParlayStatus::Lost
    } else if resolved == 0 {
        ParlayStatus::Pending
    } else if resolved == legs.len() {
        ParlayStatus::Won
    } else {
        ParlayStatus::Partial
    }
}

/// Resolves every leg riding on `wager` and records the new parlay states.
///
/// A parlay moving to `won` pays `stake * multiplier`; one moving to `lost`
/// sends its stake to the pool. Either happens only on the transition.
pub fn propagate(
    wager: &str,
    winning_option: Option<u8>,
    parlays: &[(Parlay, Vec<ParlayLeg>)],
    plan: &mut LedgerPlan,
) {
    for (parlay, legs) in parlays {
        let mut legs = legs.clone();
        for leg in legs.iter_mut().filter(|leg| leg.wager == wager) {
            leg.resolved = true;
            leg.won = winning_option == Some(leg.option);
            plan.legs.push(LegResolution {
                leg: leg.id.clone(),
                won: leg.won,
            });
        }

        let status = aggregate_status(&legs);
        if status == parlay.status {
            continue;
        }
        debug!(parlay = %parlay.id, from = ?parlay.status, to = ?status, "parlay status");
        match status {
            ParlayStatus::Won => plan.credit(&parlay.user, parlay.stake * parlay.multiplier),
            ParlayStatus::Lost => plan.to_pool(parlay.stake),
            ParlayStatus::Pending | ParlayStatus::Partial => {}
        }
        plan.parlays.push(ParlayUpdate {
            parlay: parlay.id.clone(),
            status,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn leg(id: &str, wager: &str, option: u8, resolved: bool, won: bool) -> ParlayLeg {
        ParlayLeg {
            id: id.into(),
            parlay: "p1".into(),
            wager: wager.into(),
            option,
            resolved,
            won,
        }
    }

    fn parlay(status: ParlayStatus) -> Parlay {
        Parlay {
            id: "p1".into(),
            user: "alice".into(),
            guild: "g".into(),
            stake: 50.0,
            multiplier: 6.0,
            status,
        }
    }

    #[test]
    fn status_from_legs() {
        assert_eq!(aggregate_status(&[leg("a", "w1", 1, false, false)]), ParlayStatus::Pending);
        assert_eq!(
            aggregate_status(&[leg("a", "w1", 1, true, true), leg("b", "w2", 1, false, false)]),
            ParlayStatus::Partial
        );
        assert_eq!(
            aggregate_status(&[leg("a", "w1", 1, true, false), leg("b", "w2", 1, false, false)]),
            ParlayStatus::Lost
        );
        assert_eq!(
            aggregate_status(&[leg("a", "w1", 1, true, true), leg("b", "w2", 2, true, true)]),
            ParlayStatus::Won
        );
    }

    #[test]
    fn first_winning_leg_goes_partial() {
        let parlays = vec![(
            parlay(ParlayStatus::Pending),
            vec![leg("a", "w1", 1, false, false), leg("b", "w2", 2, false, false)],
        )];
        let mut plan = LedgerPlan::new("w1", "g");
        propagate("w1", Some(1), &parlays, &mut plan);
        assert_eq!(plan.legs, vec![LegResolution { leg: "a".into(), won: true }]);
        assert_eq!(plan.parlays[0].status, ParlayStatus::Partial);
        assert!(plan.user_deltas.is_empty());
    }

    #[test]
    fn last_leg_pays_the_parlay() {
        let parlays = vec![(
            parlay(ParlayStatus::Partial),
            vec![leg("a", "w1", 1, true, true), leg("b", "w2", 2, false, false)],
        )];
        let mut plan = LedgerPlan::new("w2", "g");
        propagate("w2", Some(2), &parlays, &mut plan);
        assert_eq!(plan.parlays[0].status, ParlayStatus::Won);
        assert_eq!(plan.user_delta("alice"), 300.0);
    }

    #[test]
    fn push_sinks_the_parlay() {
        let parlays = vec![(
            parlay(ParlayStatus::Pending),
            vec![leg("a", "w1", 1, false, false), leg("b", "w2", 2, false, false)],
        )];
        let mut plan = LedgerPlan::new("w1", "g");
        propagate("w1", None, &parlays, &mut plan);
        assert_eq!(plan.parlays[0].status, ParlayStatus::Lost);
        assert_eq!(plan.pool_delta, 50.0);
    }

    #[test]
    fn an_already_lost_parlay_is_not_charged_twice() {
        let parlays = vec![(
            parlay(ParlayStatus::Lost),
            vec![leg("a", "w1", 1, true, false), leg("b", "w2", 2, false, false)],
        )];
        let mut plan = LedgerPlan::new("w2", "g");
        propagate("w2", Some(2), &parlays, &mut plan);
        assert_eq!(plan.legs.len(), 1);
        assert!(plan.parlays.is_empty());
        assert_eq!(plan.pool_delta, 0.0);
    }
}
