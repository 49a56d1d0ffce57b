use rand::Rng;
use rust_decimal::Decimal;

use crate::{
    constants::{
        MAX_BOOSTERS_PER_ROUND, MAX_BOOSTER_MULTIPLIER, MAX_EFFECTIVE_POWER,
        MIN_BOOSTER_MULTIPLIER, NEUTRAL_BOOSTER_MULTIPLIER,
    },
    error::{AppError, Result},
    models::Booster,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoundWinner {
    First,
    Second,
}

/// Result of one face-off. Each side's effective power is also the damage it deals.
#[derive(Debug, Clone, PartialEq)]
pub struct RoundOutcome {
    pub first_power: Decimal,
    pub second_power: Decimal,
    pub winner: RoundWinner,
}

fn power_out_of_range() -> AppError {
    AppError::BadRequest("boosted power is out of range".to_string())
}

/// Applies boosters in order: `power = power * multiplier / 100` for each.
/// The result is also the damage the card deals.
pub fn effective_power(power_level: i32, boosters: &[Booster]) -> Result<Decimal> {
    let neutral = Decimal::from(NEUTRAL_BOOSTER_MULTIPLIER);
    let limit = Decimal::from(MAX_EFFECTIVE_POWER);
    boosters
        .iter()
        .try_fold(Decimal::from(power_level), |power, booster| {
            let boosted = power
                .checked_mul(booster.multiplier)
                .and_then(|value| value.checked_div(neutral))
                .ok_or_else(power_out_of_range)?;
            if boosted.abs() >= limit {
                return Err(power_out_of_range());
            }
            Ok(boosted)
        })
}

/// Higher power wins. Equal power is settled by a fair coin from `rng`.
fn pick_winner<R: Rng + ?Sized>(
    first_power: Decimal,
    second_power: Decimal,
    rng: &mut R,
) -> RoundWinner {
    if first_power > second_power {
        RoundWinner::First
    } else if second_power > first_power {
        RoundWinner::Second
    } else if rng.random_bool(0.5) {
        RoundWinner::First
    } else {
        RoundWinner::Second
    }
}

/// Boosts both cards, then compares. Fails without touching `rng` when a boosted
/// power does not fit.
pub fn resolve_round<R: Rng + ?Sized>(
    first_power_level: i32,
    first_boosters: &[Booster],
    second_power_level: i32,
    second_boosters: &[Booster],
    rng: &mut R,
) -> Result<RoundOutcome> {
    let first_power = effective_power(first_power_level, first_boosters)?;
    let second_power = effective_power(second_power_level, second_boosters)?;

    Ok(RoundOutcome {
        first_power,
        second_power,
        winner: pick_winner(first_power, second_power, rng),
    })
}

/// Rejects boosters that cannot be applied to a power level.
pub fn validate_boosters(boosters: &[Booster]) -> Result<()> {
    if boosters.len() > MAX_BOOSTERS_PER_ROUND {
        return Err(AppError::BadRequest(format!(
            "at most {} boosters per round",
            MAX_BOOSTERS_PER_ROUND
        )));
    }
    let min = Decimal::from(MIN_BOOSTER_MULTIPLIER);
    let max = Decimal::from(MAX_BOOSTER_MULTIPLIER);
    for booster in boosters {
        if booster.booster_type.trim().is_empty() {
            return Err(AppError::BadRequest(
                "booster type is required".to_string(),
            ));
        }
        if booster.multiplier < min || booster.multiplier > max {
            return Err(AppError::BadRequest(format!(
                "booster {} multiplier must be between {} and {}",
                booster.booster_type, MIN_BOOSTER_MULTIPLIER, MAX_BOOSTER_MULTIPLIER
            )));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::{rngs::StdRng, SeedableRng};

    fn booster(multiplier: i64) -> Booster {
        Booster {
            booster_type: "rage".to_string(),
            multiplier: Decimal::from(multiplier),
        }
    }

    #[test]
    fn stronger_card_wins_and_deals_its_power() {
        let mut rng = StdRng::seed_from_u64(7);
        let outcome = resolve_round(100, &[], 90, &[], &mut rng).unwrap();
        assert_eq!(outcome.winner, RoundWinner::First);
        assert_eq!(outcome.first_power, Decimal::from(100));
        assert_eq!(outcome.second_power, Decimal::from(90));
    }

    #[test]
    fn booster_can_flip_the_round() {
        let mut rng = StdRng::seed_from_u64(7);
        let outcome = resolve_round(100, &[booster(150)], 120, &[], &mut rng).unwrap();
        assert_eq!(outcome.first_power, Decimal::from(150));
        assert_eq!(outcome.winner, RoundWinner::First);
    }

    #[test]
    fn boosters_compound_in_order() {
        let power = effective_power(100, &[booster(150), booster(50)]).unwrap();
        assert_eq!(power, Decimal::from(75));
        assert_eq!(effective_power(80, &[booster(100)]).unwrap(), Decimal::from(80));
        assert_eq!(effective_power(80, &[]).unwrap(), Decimal::from(80));
    }

    #[test]
    fn ties_split_roughly_evenly() {
        let mut rng = StdRng::seed_from_u64(42);
        let first_wins = (0..1000)
            .filter(|_| {
                let outcome = resolve_round(50, &[], 50, &[], &mut rng).unwrap();
                outcome.winner == RoundWinner::First
            })
            .count();
        assert!((400..600).contains(&first_wins), "first won {}", first_wins);
    }

    #[test]
    fn multiplier_outside_bounds_is_rejected() {
        assert!(validate_boosters(&[booster(150)]).is_ok());
        assert!(validate_boosters(&[booster(1), booster(1_000)]).is_ok());
        assert!(validate_boosters(&[booster(0)]).is_err());
        assert!(validate_boosters(&[booster(1_001)]).is_err());
        let fractional = Booster {
            booster_type: "rage".to_string(),
            multiplier: Decimal::new(5, 1),
        };
        assert!(validate_boosters(&[fractional]).is_err());
        let unnamed = Booster {
            booster_type: " ".to_string(),
            multiplier: Decimal::from(120),
        };
        assert!(validate_boosters(&[unnamed]).is_err());
    }

    #[test]
    fn too_many_boosters_are_rejected() {
        let stack: Vec<Booster> = (0..=MAX_BOOSTERS_PER_ROUND).map(|_| booster(110)).collect();
        assert!(matches!(
            validate_boosters(&stack),
            Err(AppError::BadRequest(_))
        ));
    }

    #[test]
    fn huge_multipliers_error_instead_of_overflowing() {
        let huge = Booster {
            booster_type: "rage".to_string(),
            multiplier: Decimal::from(1_000_000_000_000_000_i64),
        };
        assert!(matches!(
            effective_power(i32::MAX, &[huge.clone(), huge.clone()]),
            Err(AppError::BadRequest(_))
        ));
        let mut rng = StdRng::seed_from_u64(1);
        assert!(resolve_round(100, &[], 90, &[huge.clone(), huge], &mut rng).is_err());
    }

    #[test]
    fn strongest_allowed_stack_fits_damage_column() {
        let stack: Vec<Booster> = (0..MAX_BOOSTERS_PER_ROUND)
            .map(|_| booster(MAX_BOOSTER_MULTIPLIER))
            .collect();
        let power = effective_power(i32::MAX, &stack).unwrap();
        assert!(power < Decimal::from(MAX_EFFECTIVE_POWER));
    }
}
