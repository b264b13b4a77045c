use std::collections::HashMap;

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use rust_decimal::prelude::{FromPrimitive, ToPrimitive};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::models::Tier;

/// Jitter bounds for one tier. All values are configuration, never code.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StealthBounds {
    pub delay_ms_min: u64,
    pub delay_ms_max: u64,
    /// Maximum lot-size variance, percent. 8.0 means the adjusted lot stays
    /// within ±8% of the base lot.
    pub lot_variance_pct: Decimal,
    /// Maximum absolute entry-price offset, pips.
    pub price_offset_pips: Decimal,
    /// Probability of deliberately skipping the execution, 0.0–1.0.
    pub skip_probability: f64,
}

/// Per-tier stealth configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StealthConfig {
    pub tiers: HashMap<Tier, StealthBounds>,
}

impl StealthConfig {
    pub fn bounds_for(&self, tier: Tier) -> &StealthBounds {
        self.tiers.get(&tier).unwrap_or(&FALLBACK_BOUNDS)
    }
}

/// Applied when a tier has no configured bounds: no jitter at all, so a
/// config gap degrades to plain execution instead of random behavior.
static FALLBACK_BOUNDS: StealthBounds = StealthBounds {
    delay_ms_min: 0,
    delay_ms_max: 0,
    lot_variance_pct: Decimal::ZERO,
    price_offset_pips: Decimal::ZERO,
    skip_probability: 0.0,
};

impl Default for StealthConfig {
    fn default() -> Self {
        let mut tiers = HashMap::new();
        tiers.insert(
            Tier::Scout,
            StealthBounds {
                delay_ms_min: 1_000,
                delay_ms_max: 5_000,
                lot_variance_pct: Decimal::from(5),
                price_offset_pips: Decimal::from(2),
                skip_probability: 0.05,
            },
        );
        tiers.insert(
            Tier::Sniper,
            StealthBounds {
                delay_ms_min: 800,
                delay_ms_max: 4_000,
                lot_variance_pct: Decimal::from(6),
                price_offset_pips: Decimal::from(2),
                skip_probability: 0.02,
            },
        );
        tiers.insert(
            Tier::Commander,
            StealthBounds {
                delay_ms_min: 500,
                delay_ms_max: 3_000,
                lot_variance_pct: Decimal::from(8),
                price_offset_pips: Decimal::from(3),
                skip_probability: 0.0,
            },
        );
        tiers.insert(
            Tier::Ghost,
            StealthBounds {
                delay_ms_min: 200,
                delay_ms_max: 2_000,
                lot_variance_pct: Decimal::from(12),
                price_offset_pips: Decimal::from(5),
                skip_probability: 0.10,
            },
        );
        Self { tiers }
    }
}

/// The execution plan before jitter.
#[derive(Debug, Clone, PartialEq)]
pub struct BasePlan {
    pub lot_size: Decimal,
}

/// The jittered plan. `skip` means a deliberate non-execution.
#[derive(Debug, Clone, PartialEq)]
pub struct StealthAdjustment {
    pub lot_size: Decimal,
    pub entry_delay_ms: u64,
    pub price_offset_pips: Decimal,
    pub skip: bool,
}

/// Apply tier-scaled jitter to a base plan.
///
/// Pure function: all randomness comes from the request-scoped seed, so
/// concurrent calls never interfere and a fixed seed reproduces the exact
/// adjustment. No hidden global generator ever influences a trading
/// decision.
pub fn apply(plan: &BasePlan, bounds: &StealthBounds, seed: u64) -> StealthAdjustment {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);

    let skip = bounds.skip_probability > 0.0 && rng.gen_bool(bounds.skip_probability.min(1.0));

    let entry_delay_ms = if bounds.delay_ms_max > bounds.delay_ms_min {
        rng.gen_range(bounds.delay_ms_min..=bounds.delay_ms_max)
    } else {
        bounds.delay_ms_min
    };

    let variance = bounds.lot_variance_pct.to_f64().unwrap_or(0.0);
    let lot_size = if variance > 0.0 {
        let pct = rng.gen_range(-variance..=variance);
        let factor = Decimal::from_f64(1.0 + pct / 100.0).unwrap_or(Decimal::ONE);
        // Lot step is two decimal places on every supported broker.
        (plan.lot_size * factor).round_dp(2)
    } else {
        plan.lot_size
    };

    let max_offset = bounds.price_offset_pips.to_f64().unwrap_or(0.0);
    let price_offset_pips = if max_offset > 0.0 {
        Decimal::from_f64(rng.gen_range(-max_offset..=max_offset))
            .unwrap_or(Decimal::ZERO)
            .round_dp(1)
    } else {
        Decimal::ZERO
    };

    StealthAdjustment {
        lot_size,
        entry_delay_ms,
        price_offset_pips,
        skip,
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn commander_bounds() -> StealthBounds {
        StealthConfig::default()
            .bounds_for(Tier::Commander)
            .clone()
    }

    #[test]
    fn test_fixed_seed_is_deterministic() {
        let plan = BasePlan {
            lot_size: Decimal::ONE,
        };
        let bounds = commander_bounds();
        let a = apply(&plan, &bounds, 1234);
        let b = apply(&plan, &bounds, 1234);
        assert_eq!(a, b);
    }

    #[test]
    fn test_output_stays_within_tier_bounds() {
        let plan = BasePlan {
            lot_size: Decimal::ONE,
        };
        let bounds = commander_bounds();
        let lo = Decimal::new(92, 2); // 0.92
        let hi = Decimal::new(108, 2); // 1.08

        for seed in 0..500u64 {
            let adj = apply(&plan, &bounds, seed);
            assert!(
                adj.lot_size >= lo && adj.lot_size <= hi,
                "seed {seed}: lot {} outside [{lo}, {hi}]",
                adj.lot_size
            );
            assert!((500..=3_000).contains(&adj.entry_delay_ms));
            assert!(adj.price_offset_pips.abs() <= Decimal::from(3));
            // Commander skip probability is zero.
            assert!(!adj.skip);
        }
    }

    #[test]
    fn test_skip_probability_one_always_skips() {
        let plan = BasePlan {
            lot_size: Decimal::ONE,
        };
        let bounds = StealthBounds {
            skip_probability: 1.0,
            ..commander_bounds()
        };
        for seed in 0..50u64 {
            assert!(apply(&plan, &bounds, seed).skip);
        }
    }

    #[test]
    fn test_zero_bounds_pass_plan_through() {
        let plan = BasePlan {
            lot_size: Decimal::new(37, 2),
        };
        let bounds = StealthBounds {
            delay_ms_min: 0,
            delay_ms_max: 0,
            lot_variance_pct: Decimal::ZERO,
            price_offset_pips: Decimal::ZERO,
            skip_probability: 0.0,
        };
        let adj = apply(&plan, &bounds, 7);
        assert_eq!(adj.lot_size, plan.lot_size);
        assert_eq!(adj.entry_delay_ms, 0);
        assert_eq!(adj.price_offset_pips, Decimal::ZERO);
        assert!(!adj.skip);
    }

    #[test]
    fn test_different_seeds_diverge() {
        let plan = BasePlan {
            lot_size: Decimal::ONE,
        };
        let bounds = commander_bounds();
        let outputs: std::collections::HashSet<String> = (0..20u64)
            .map(|seed| {
                let adj = apply(&plan, &bounds, seed);
                format!("{}:{}:{}", adj.lot_size, adj.entry_delay_ms, adj.price_offset_pips)
            })
            .collect();
        assert!(outputs.len() > 1, "jitter should vary across seeds");
    }
}
