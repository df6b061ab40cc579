//! Pure margin and P&L math. No I/O, no side effects — every function here
//! is a straight arithmetic transform so it can be unit tested directly and
//! reused by the risk policy, order engine, and position engine alike.

use crate::oracle::Quote;
use crate::types::{MarginStatus, MarginThresholds, OrderSide, PositionSide, DEFAULT_LOT_SIZE};
use rust_decimal::Decimal;

fn lot_size(_symbol: &str) -> Decimal {
    // Forex-only for now; contract size for other asset classes is an
    // open question left undecided by the source material.
    Decimal::from(DEFAULT_LOT_SIZE)
}

pub fn margin_required(quantity: Decimal, price: Decimal, leverage: Decimal, symbol: &str) -> Decimal {
    quantity * lot_size(symbol) * price / leverage
}

pub fn unrealized_pnl(
    side: PositionSide,
    entry: Decimal,
    mark: Decimal,
    quantity: Decimal,
    symbol: &str,
) -> Decimal {
    side.sign() * (mark - entry) * quantity * lot_size(symbol)
}

pub fn pnl_percentage(pnl: Decimal, margin_used: Decimal) -> Decimal {
    if margin_used.is_zero() {
        return Decimal::ZERO;
    }
    Decimal::ONE_HUNDRED * pnl / margin_used
}

pub fn pip_size(symbol: &str) -> Decimal {
    if symbol.to_ascii_uppercase().contains("JPY") {
        Decimal::new(1, 2) // 0.01
    } else {
        Decimal::new(1, 4) // 0.0001
    }
}

/// Entry price for a new position: the side-appropriate component of the
/// quote (ask for a buy/long entry, bid for a sell/short entry).
pub fn entry_price(side: OrderSide, quote: &Quote) -> Decimal {
    match side {
        OrderSide::Buy => quote.ask,
        OrderSide::Sell => quote.bid,
    }
}

/// Exit price for closing a position: opposite convention from entry —
/// a long exits at bid, a short exits at ask.
pub fn exit_price(side: PositionSide, quote: &Quote) -> Decimal {
    match side {
        PositionSide::Long => quote.bid,
        PositionSide::Short => quote.ask,
    }
}

/// `100 * equity / usedMargin`; unbounded (represented as `Decimal::MAX`)
/// when there is no used margin — an all-cash participant is never at risk.
pub fn margin_level(equity: Decimal, used_margin: Decimal) -> Decimal {
    if used_margin.is_zero() {
        return Decimal::MAX;
    }
    Decimal::ONE_HUNDRED * equity / used_margin
}

pub fn margin_status(equity: Decimal, used_margin: Decimal, thresholds: &MarginThresholds) -> MarginStatus {
    let level = margin_level(equity, used_margin);
    if level <= thresholds.liquidation {
        MarginStatus::Liquidation
    } else if level <= thresholds.margin_call {
        MarginStatus::MarginCall
    } else if level <= thresholds.warning {
        MarginStatus::Warning
    } else {
        MarginStatus::Safe
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use std::str::FromStr;

    fn d(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    fn quote(bid: &str, ask: &str) -> Quote {
        Quote {
            symbol: "EURUSD".to_string(),
            bid: d(bid),
            ask: d(ask),
            mid: (d(bid) + d(ask)) / Decimal::TWO,
            spread: d(ask) - d(bid),
            timestamp: Utc::now(),
            is_fallback: false,
            is_stale: false,
        }
    }

    #[test]
    fn margin_required_matches_spec_formula() {
        let m = margin_required(d("1"), d("1.10010"), d("100"), "EURUSD");
        assert_eq!(m, d("1100.0100"));
    }

    #[test]
    fn unrealized_pnl_long_and_short_mirror() {
        let long_pnl = unrealized_pnl(PositionSide::Long, d("1.10010"), d("1.10020"), d("1"), "EURUSD");
        assert_eq!(long_pnl, d("10"));
        let short_pnl = unrealized_pnl(PositionSide::Short, d("1.10010"), d("1.10020"), d("1"), "EURUSD");
        assert_eq!(short_pnl, d("-10"));
    }

    #[test]
    fn stop_loss_scenario_matches_spec_s2() {
        let entry = d("1.10010");
        let exit = d("1.09890");
        let pnl = unrealized_pnl(PositionSide::Long, entry, exit, d("1"), "EURUSD");
        assert_eq!(pnl, d("-120"));
    }

    #[test]
    fn pip_size_is_symbol_sensitive() {
        assert_eq!(pip_size("EURUSD"), d("0.0001"));
        assert_eq!(pip_size("USDJPY"), d("0.01"));
    }

    #[test]
    fn entry_and_exit_prices_use_opposite_sides() {
        let q = quote("1.09890", "1.09900");
        assert_eq!(entry_price(OrderSide::Buy, &q), q.ask);
        assert_eq!(entry_price(OrderSide::Sell, &q), q.bid);
        assert_eq!(exit_price(PositionSide::Long, &q), q.bid);
        assert_eq!(exit_price(PositionSide::Short, &q), q.ask);
    }

    #[test]
    fn margin_level_is_unbounded_with_no_used_margin() {
        assert_eq!(margin_level(d("1000"), Decimal::ZERO), Decimal::MAX);
    }

    #[test]
    fn margin_status_buckets_against_thresholds() {
        let thresholds = MarginThresholds {
            safe: d("200"),
            warning: d("100"),
            margin_call: d("50"),
            liquidation: d("20"),
        };
        assert_eq!(margin_status(d("3000"), d("1000"), &thresholds), MarginStatus::Safe);
        assert_eq!(margin_status(d("900"), d("1000"), &thresholds), MarginStatus::Warning);
        assert_eq!(margin_status(d("450"), d("1000"), &thresholds), MarginStatus::MarginCall);
        assert_eq!(margin_status(d("150"), d("1000"), &thresholds), MarginStatus::Liquidation);
    }
}
