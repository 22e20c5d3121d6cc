//! Property tests for position and strategy invariants.
//!
//! Uses proptest to verify:
//! 1. Monotonic stop: trailing stops only tighten while a position is open
//! 2. Single closure: open → closed happens once, nothing mutates afterwards
//! 3. Fee-adjusted PnL: net = gross - entry fee - exit fee
//! 4. RSI boundary: a strictly rising window has RSI 100
//! 5. Breakout boundary: the trigger price itself never fires
//! 6. Reversal atomicity: every opposite-side position is liquidated first

use chrono::{DateTime, Duration, TimeZone, Utc};
use proptest::prelude::*;
use ticklab_core::domain::{
    CloseReason, ConfigId, NewPosition, PositionError, PriceSeries, Side, SignalAction,
    TradingSignal,
};
use ticklab_core::engine::{check_exit, plan_entry, EntryPlan, ExitContext};
use ticklab_core::indicators::rsi;
use ticklab_core::ledger::{PositionLedger, StopRules};
use ticklab_core::strategy::{Breakout, SignalGenerator};

// ── Helpers ──────────────────────────────────────────────────────────

fn t(minute: i64) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap() + Duration::minutes(minute)
}

fn new_position(side: Side, entry: f64, quantity: f64, entry_fee: f64, minute: i64) -> NewPosition {
    NewPosition {
        symbol: "BTC/JPY".into(),
        side,
        quantity,
        entry_price: entry,
        entry_fee,
        trailing_stop_price: None,
        opened_at: t(minute),
        config_id: ConfigId::new("prop"),
    }
}

fn series(prices: &[f64]) -> PriceSeries {
    let mut s = PriceSeries::new("BTC/JPY");
    for (i, &p) in prices.iter().enumerate() {
        s.push(p, t(i as i64)).unwrap();
    }
    s
}

// ── Strategies (proptest) ────────────────────────────────────────────

fn arb_price() -> impl Strategy<Value = f64> {
    (10.0..1000.0_f64).prop_map(|p| (p * 100.0).round() / 100.0)
}

fn arb_side() -> impl Strategy<Value = Side> {
    prop_oneof![Just(Side::Long), Just(Side::Short)]
}

fn arb_path() -> impl Strategy<Value = Vec<f64>> {
    prop::collection::vec(arb_price(), 1..60)
}

// ── 1. Monotonic stop ────────────────────────────────────────────────

proptest! {
    /// While open, a long's stop never falls and a short's never rises,
    /// whatever the price path.
    #[test]
    fn trailing_stop_is_monotonic(side in arb_side(), entry in arb_price(), path in arb_path()) {
        let mut ledger = PositionLedger::new();
        let id = ledger.open(new_position(side, entry, 1.0, 0.0, 0)).unwrap().id;
        let strategy = Breakout::new(20, 0.1, 1.0);
        let rules = StopRules {
            // a fixed stop far away keeps the position open for the whole path
            stop_loss_percent: 99.0,
            initial_trailing_percent: 0.7,
            trailing_offset_percent: 0.5,
        };
        let owner = ConfigId::new("prop");
        let prices = series(&path);

        let mut previous: Option<f64> = None;
        for end in 1..=prices.len() {
            let window = prices.window(end);
            let price = window.current().unwrap();
            let ctx = ExitContext {
                price,
                now: window.now().unwrap(),
                window: &window,
                strategy: &strategy,
                owner: &owner,
                rules,
            };
            let position = ledger.get_mut(id).unwrap();
            let decision = check_exit(position, &ctx).unwrap();
            let stop = position.trailing_stop_price;

            if let (Some(before), Some(after)) = (previous, stop) {
                match side {
                    Side::Long => prop_assert!(after >= before),
                    Side::Short => prop_assert!(after <= before),
                }
            }
            previous = stop;
            if decision.is_some() {
                break;
            }
        }
    }
}

// ── 2. Single closure ────────────────────────────────────────────────

proptest! {
    /// A closed position rejects a second close and any further mutation.
    #[test]
    fn positions_close_exactly_once(
        side in arb_side(),
        entry in arb_price(),
        exit in arb_price(),
        again in arb_price(),
    ) {
        let mut ledger = PositionLedger::new();
        let id = ledger.open(new_position(side, entry, 0.5, 0.0, 0)).unwrap().id;
        ledger.close(id, exit, 0.0, t(1), CloseReason::StopLoss).unwrap();
        let snapshot = ledger.get(id).unwrap().clone();

        let second = ledger.close(id, again, 0.0, t(2), CloseReason::TrailingStop);
        prop_assert_eq!(second.err(), Some(PositionError::Closed(id)));

        let position = ledger.get_mut(id).unwrap();
        prop_assert!(position.ratchet_trailing(again).is_err());
        prop_assert!(position.set_exit_order(None).is_err());
        prop_assert!(ledger.update(&snapshot).is_err());
        prop_assert_eq!(ledger.get(id).unwrap(), &snapshot);
    }
}

// ── 3. Fee-adjusted PnL ──────────────────────────────────────────────

proptest! {
    #[test]
    fn net_pnl_subtracts_both_fees(
        side in arb_side(),
        entry in arb_price(),
        exit in arb_price(),
        quantity in 0.001..10.0_f64,
        entry_fee in -1.0..5.0_f64,
        exit_fee in -1.0..5.0_f64,
    ) {
        let mut ledger = PositionLedger::new();
        let id = ledger.open(new_position(side, entry, quantity, entry_fee, 0)).unwrap().id;
        let closed = ledger.close(id, exit, exit_fee, t(5), CloseReason::SignalExit).unwrap();

        let gross = side.sign() * (exit - entry) * quantity;
        let net = closed.net_profit_loss().unwrap();
        prop_assert!((closed.profit_loss.unwrap() - gross).abs() < 1e-9);
        prop_assert!((net - (gross - entry_fee - exit_fee)).abs() < 1e-9);
    }
}

// ── 4. RSI boundary ──────────────────────────────────────────────────

proptest! {
    #[test]
    fn strictly_rising_window_has_rsi_100(
        start in arb_price(),
        steps in prop::collection::vec(0.01..50.0_f64, 2..40),
    ) {
        let mut values = vec![start];
        for step in &steps {
            let next = values[values.len() - 1] + step;
            values.push(next);
        }
        let period = steps.len();
        prop_assert_eq!(rsi(&values, period), Some(100.0));
    }
}

// ── 5. Breakout boundary ─────────────────────────────────────────────

proptest! {
    /// A tick exactly on `H * (1 + t/100)` holds; anything above it buys.
    #[test]
    fn breakout_trigger_is_strict(
        channel in prop::collection::vec(50.0..150.0_f64, 2..30),
        threshold in 0.01..5.0_f64,
    ) {
        let lookback = channel.len();
        let strategy = Breakout::new(lookback, threshold, 1.0);
        let high = channel.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        let trigger = strategy.upper_trigger(high);

        let mut at_trigger = channel.clone();
        at_trigger.push(trigger);
        let s = series(&at_trigger);
        prop_assert_eq!(strategy.analyze(&s.full_window()).action, SignalAction::Hold);

        let mut above = channel;
        above.push(trigger + trigger * 1e-9);
        let s = series(&above);
        prop_assert_eq!(strategy.analyze(&s.full_window()).action, SignalAction::Buy);
    }
}

// ── 6. Reversal atomicity ────────────────────────────────────────────

proptest! {
    /// An entry plan lists every open opposite-side position, oldest first,
    /// and nothing on the entry side.
    #[test]
    fn reversal_covers_every_opposite_position(
        sides in prop::collection::vec(arb_side(), 0..12),
        entry_side in arb_side(),
    ) {
        let mut ledger = PositionLedger::new();
        for (minute, side) in sides.iter().enumerate() {
            ledger.open(new_position(*side, 100.0, 1.0, 0.0, minute as i64)).unwrap();
        }
        let action = match entry_side {
            Side::Long => SignalAction::Buy,
            Side::Short => SignalAction::Short,
        };
        let signal = TradingSignal::market(action, 1.0, "prop");

        let plan = plan_entry(&signal, ledger.open_positions("BTC/JPY"));
        let EntryPlan::Enter { side, reversal, .. } = plan else {
            return Err(TestCaseError::fail("expected an entry plan"));
        };
        prop_assert_eq!(side, entry_side);

        let expected: Vec<_> = ledger
            .open_positions("BTC/JPY")
            .filter(|p| p.side == entry_side.opposite())
            .map(|p| p.id)
            .collect();
        prop_assert_eq!(&reversal, &expected);

        for id in reversal {
            ledger.close(id, 100.0, 0.0, t(100), CloseReason::Reversal).unwrap();
        }
        prop_assert_eq!(ledger.open_count("BTC/JPY", entry_side.opposite()), 0);
    }
}
