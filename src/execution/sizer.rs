use rust_decimal::Decimal;

use crate::models::Signal;

/// Broker lot step: 0.01 on every supported account type.
pub fn lot_step() -> Decimal {
    Decimal::new(1, 2)
}

/// Pip size for a symbol: 0.01 for JPY quotes, 0.0001 otherwise.
pub fn pip_size(symbol: &str) -> Decimal {
    if symbol.to_uppercase().ends_with("JPY") {
        Decimal::new(1, 2)
    } else {
        Decimal::new(1, 4)
    }
}

/// Approximate USD value of one pip per standard lot.
pub fn pip_value(_symbol: &str) -> Decimal {
    Decimal::from(10)
}

/// Stop distance in pips for a signal's entry/stop pair.
pub fn stop_distance_pips(signal: &Signal) -> Decimal {
    let pip = pip_size(&signal.symbol);
    if pip.is_zero() {
        return Decimal::ZERO;
    }
    ((signal.entry_price - signal.stop_loss).abs() / pip).round_dp(1)
}

/// Risk-based lot size, floored to the broker lot step.
///
/// `lot = (balance × risk% / 100) / (sl_pips × pip_value)`. Returns zero
/// when the stop distance is degenerate or the result is below one lot
/// step; callers treat zero as an auditable skip, not an error.
pub fn lot_size(
    account_balance: Decimal,
    risk_percent: Decimal,
    sl_pips: Decimal,
    pip_value: Decimal,
) -> Decimal {
    let denominator = sl_pips * pip_value;
    if denominator <= Decimal::ZERO {
        return Decimal::ZERO;
    }

    let risk_amount = account_balance * risk_percent / Decimal::ONE_HUNDRED;
    let raw = risk_amount / denominator;

    let step = lot_step();
    let floored = (raw / step).floor() * step;
    if floored < step {
        Decimal::ZERO
    } else {
        floored
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Direction;
    use chrono::Utc;

    fn eurusd_signal(entry: Decimal, stop: Decimal) -> Signal {
        Signal {
            signal_id: "sig-sizer".into(),
            symbol: "EURUSD".into(),
            direction: Direction::Buy,
            entry_price: entry,
            stop_loss: stop,
            take_profit: entry + (entry - stop) * Decimal::from(2),
            confidence: Decimal::new(80, 2),
            shield_classification: "approved".into(),
            issued_at: Utc::now(),
            expires_at: Utc::now() + chrono::Duration::minutes(10),
        }
    }

    #[test]
    fn test_commander_scenario_yields_one_lot() {
        // $10,000 balance, 2% risk, 20-pip stop → 200 / (20 × 10) = 1.0
        let size = lot_size(
            Decimal::from(10_000),
            Decimal::from(2),
            Decimal::from(20),
            Decimal::from(10),
        );
        assert_eq!(size, Decimal::ONE);
    }

    #[test]
    fn test_lot_is_floored_to_step() {
        // 150 / (20 × 10) = 0.75; 0.75 is already on step
        let size = lot_size(
            Decimal::from(7_500),
            Decimal::from(2),
            Decimal::from(20),
            Decimal::from(10),
        );
        assert_eq!(size, Decimal::new(75, 2));

        // 100 × 3% = 3 → 3 / 300 = 0.01 exactly
        let size = lot_size(
            Decimal::from(100),
            Decimal::from(3),
            Decimal::from(30),
            Decimal::from(10),
        );
        assert_eq!(size, Decimal::new(1, 2));
    }

    #[test]
    fn test_below_one_step_is_zero() {
        let size = lot_size(
            Decimal::from(100),
            Decimal::ONE,
            Decimal::from(50),
            Decimal::from(10),
        );
        assert_eq!(size, Decimal::ZERO);
    }

    #[test]
    fn test_zero_stop_distance_is_zero() {
        let size = lot_size(
            Decimal::from(10_000),
            Decimal::from(2),
            Decimal::ZERO,
            Decimal::from(10),
        );
        assert_eq!(size, Decimal::ZERO);
    }

    #[test]
    fn test_stop_distance_pips_eurusd() {
        let signal = eurusd_signal(Decimal::new(10800, 4), Decimal::new(10780, 4));
        assert_eq!(stop_distance_pips(&signal), Decimal::from(20));
    }

    #[test]
    fn test_pip_size_jpy() {
        assert_eq!(pip_size("USDJPY"), Decimal::new(1, 2));
        assert_eq!(pip_size("EURUSD"), Decimal::new(1, 4));
    }
}
