//! Risk policy: the per-order validators and per-contest risk limits from
//! the component design. Every rejection carries a precise reason and is
//! never retried by the caller — a `RiskRejected`/`Validation` error is
//! terminal for that order.

use crate::config::RiskConfig;
use crate::error::{AppError, Result};
use crate::oracle::Quote;
use crate::pnl::{margin_required, pip_size};
use crate::types::{AssetClass, LeverageBand, OrderSide, OrderType, RiskLimits};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;

/// The inputs a risk check needs about the order under review. Kept flat
/// rather than threading the full `Order`/`Contest`/`Participant` structs
/// through, so the policy module has no dependency on the persistence layer.
pub struct OrderRiskContext<'a> {
    pub quantity: Decimal,
    pub symbol: &'a str,
    pub side: OrderSide,
    pub order_type: OrderType,
    pub leverage: Decimal,
    pub requested_price: Option<Decimal>,
    pub stop_loss: Option<Decimal>,
    pub take_profit: Option<Decimal>,
    pub allowed_asset_classes: &'a [AssetClass],
    pub symbol_asset_class: AssetClass,
    pub blocked_symbols: &'a [String],
    pub leverage_band: LeverageBand,
    pub current_open_positions: u32,
    pub max_open_positions: u32,
    pub available_capital: Decimal,
    pub quote: &'a Quote,
}

pub struct ContestRiskContext {
    pub limits: RiskLimits,
    pub starting_capital: Decimal,
    pub current_capital: Decimal,
    pub realized_pnl_since_midnight_utc: Decimal,
    pub unrealized_pnl_open_positions: Decimal,
}

pub struct RiskPolicy {
    config: RiskConfig,
}

impl RiskPolicy {
    pub fn new(config: RiskConfig) -> Self {
        Self { config }
    }

    /// Runs the seven per-order validators in the specified order, failing
    /// fast on the first violation so the rejection reason is unambiguous.
    pub fn validate_order(&self, ctx: &OrderRiskContext) -> Result<()> {
        if ctx.quantity < self.config.min_position_size || ctx.quantity > self.config.max_position_size {
            return Err(AppError::Validation(format!(
                "quantity {} outside allowed range [{}, {}]",
                ctx.quantity, self.config.min_position_size, self.config.max_position_size
            )));
        }

        if !ctx.allowed_asset_classes.contains(&ctx.symbol_asset_class) {
            return Err(AppError::Validation(format!(
                "asset class for {} is not permitted in this contest",
                ctx.symbol
            )));
        }
        if ctx.blocked_symbols.iter().any(|s| s == ctx.symbol) {
            return Err(AppError::Validation(format!("{} is blocked in this contest", ctx.symbol)));
        }

        if ctx.leverage < ctx.leverage_band.min || ctx.leverage > ctx.leverage_band.max {
            return Err(AppError::Validation(format!(
                "leverage {} outside contest band [{}, {}]",
                ctx.leverage, ctx.leverage_band.min, ctx.leverage_band.max
            )));
        }

        if ctx.order_type == OrderType::Limit {
            self.validate_limit_price(ctx)?;
        }

        self.validate_stop_take_profit(ctx)?;

        if ctx.current_open_positions >= ctx.max_open_positions {
            return Err(AppError::Validation("maximum open positions reached".to_string()));
        }

        let required = margin_required(ctx.quantity, ctx.quote.mid, ctx.leverage, ctx.symbol);
        if required > ctx.available_capital {
            return Err(AppError::InsufficientCapital { required, available: ctx.available_capital });
        }

        Ok(())
    }

    fn validate_limit_price(&self, ctx: &OrderRiskContext) -> Result<()> {
        let price = ctx
            .requested_price
            .ok_or_else(|| AppError::Validation("limit order requires requestedPrice".to_string()))?;

        match ctx.side {
            OrderSide::Buy if price >= ctx.quote.ask => {
                return Err(AppError::Validation("buy limit price must be below current ask".to_string()));
            }
            OrderSide::Sell if price <= ctx.quote.bid => {
                return Err(AppError::Validation("sell limit price must be above current bid".to_string()));
            }
            _ => {}
        }

        let pip = pip_size(ctx.symbol);
        let distance_pips = ((price - ctx.quote.mid).abs() / pip).round();
        let min_pips = Decimal::from(1u32);
        let max_pips = Decimal::from(5000u32);
        if distance_pips < min_pips || distance_pips > max_pips {
            return Err(AppError::Validation(format!(
                "limit price {} pips from mid is outside allowed distance",
                distance_pips
            )));
        }

        Ok(())
    }

    fn validate_stop_take_profit(&self, ctx: &OrderRiskContext) -> Result<()> {
        let Some(entry_reference) = ctx.requested_price.or(Some(ctx.quote.mid)) else {
            return Ok(());
        };

        match (ctx.side, ctx.stop_loss, ctx.take_profit) {
            (OrderSide::Buy, Some(sl), Some(tp)) => {
                if !(sl < entry_reference && entry_reference < tp) {
                    return Err(AppError::Validation(
                        "for a long, stopLoss must be below entry and takeProfit above it".to_string(),
                    ));
                }
            }
            (OrderSide::Sell, Some(sl), Some(tp)) => {
                if !(tp < entry_reference && entry_reference < sl) {
                    return Err(AppError::Validation(
                        "for a short, takeProfit must be below entry and stopLoss above it".to_string(),
                    ));
                }
            }
            (OrderSide::Buy, Some(sl), None) => {
                if sl >= entry_reference {
                    return Err(AppError::Validation("stopLoss must be below entry for a long".to_string()));
                }
            }
            (OrderSide::Buy, None, Some(tp)) => {
                if tp <= entry_reference {
                    return Err(AppError::Validation("takeProfit must be above entry for a long".to_string()));
                }
            }
            (OrderSide::Sell, Some(sl), None) => {
                if sl <= entry_reference {
                    return Err(AppError::Validation("stopLoss must be above entry for a short".to_string()));
                }
            }
            (OrderSide::Sell, None, Some(tp)) => {
                if tp >= entry_reference {
                    return Err(AppError::Validation("takeProfit must be below entry for a short".to_string()));
                }
            }
            _ => {}
        }
        Ok(())
    }

    /// The three per-contest limits, only evaluated when the contest has
    /// opted in (`limits.enabled`).
    pub fn validate_contest_limits(&self, ctx: &ContestRiskContext) -> Result<()> {
        if !ctx.limits.enabled {
            return Ok(());
        }

        let drawdown_floor =
            ctx.starting_capital * (Decimal::ONE - ctx.limits.max_drawdown_percent / Decimal::ONE_HUNDRED);
        if ctx.current_capital <= drawdown_floor {
            return Err(AppError::RiskRejected(format!(
                "current capital {} has breached max drawdown floor {}",
                ctx.current_capital, drawdown_floor
            )));
        }

        let daily_loss_limit = ctx.starting_capital * ctx.limits.daily_loss_limit_percent / Decimal::ONE_HUNDRED;
        if ctx.realized_pnl_since_midnight_utc < Decimal::ZERO
            && ctx.realized_pnl_since_midnight_utc.abs() >= daily_loss_limit
        {
            return Err(AppError::RiskRejected(format!(
                "daily realized loss {} has reached the {} limit",
                ctx.realized_pnl_since_midnight_utc.abs(),
                daily_loss_limit
            )));
        }

        if ctx.limits.equity_check_enabled {
            let equity = ctx.current_capital + ctx.unrealized_pnl_open_positions;
            let equity_floor =
                ctx.starting_capital * (Decimal::ONE - ctx.limits.equity_drawdown_percent / Decimal::ONE_HUNDRED);
            if equity <= equity_floor {
                return Err(AppError::RiskRejected(format!(
                    "equity {} has breached equity drawdown floor {}",
                    equity, equity_floor
                )));
            }
        }

        Ok(())
    }
}

pub fn midnight_utc(now: DateTime<Utc>) -> DateTime<Utc> {
    now.date_naive().and_hms_opt(0, 0, 0).unwrap().and_utc()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RiskConfig;
    use crate::types::MarginThresholds;
    use std::str::FromStr;

    fn d(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    fn config() -> RiskConfig {
        RiskConfig {
            margin_thresholds: MarginThresholds {
                safe: d("200"),
                warning: d("100"),
                margin_call: d("50"),
                liquidation: d("20"),
            },
            margin_check_interval_seconds: 5,
            min_leverage: d("1"),
            max_leverage: d("100"),
            default_leverage: d("10"),
            min_position_size: d("0.01"),
            max_position_size: d("100"),
        }
    }

    fn quote() -> Quote {
        Quote {
            symbol: "EURUSD".to_string(),
            bid: d("1.10000"),
            ask: d("1.10010"),
            mid: d("1.10005"),
            spread: d("0.00010"),
            timestamp: Utc::now(),
            is_fallback: false,
            is_stale: false,
        }
    }

    fn happy_ctx<'a>(quote: &'a Quote, allowed: &'a [AssetClass], blocked: &'a [String]) -> OrderRiskContext<'a> {
        OrderRiskContext {
            quantity: d("1"),
            symbol: "EURUSD",
            side: OrderSide::Buy,
            order_type: OrderType::Market,
            leverage: d("100"),
            requested_price: None,
            stop_loss: None,
            take_profit: None,
            allowed_asset_classes: allowed,
            symbol_asset_class: AssetClass::Forex,
            blocked_symbols: blocked,
            leverage_band: LeverageBand { min: d("1"), max: d("100"), default: d("10") },
            current_open_positions: 0,
            max_open_positions: 10,
            available_capital: d("10000"),
            quote,
        }
    }

    #[test]
    fn happy_path_s1_passes_every_validator() {
        let policy = RiskPolicy::new(config());
        let q = quote();
        let allowed = [AssetClass::Forex];
        let blocked: Vec<String> = vec![];
        let ctx = happy_ctx(&q, &allowed, &blocked);
        assert!(policy.validate_order(&ctx).is_ok());
    }

    #[test]
    fn rejects_quantity_outside_range() {
        let policy = RiskPolicy::new(config());
        let q = quote();
        let allowed = [AssetClass::Forex];
        let blocked: Vec<String> = vec![];
        let mut ctx = happy_ctx(&q, &allowed, &blocked);
        ctx.quantity = d("0.0001");
        assert!(matches!(policy.validate_order(&ctx), Err(AppError::Validation(_))));
    }

    #[test]
    fn rejects_blocked_symbol() {
        let policy = RiskPolicy::new(config());
        let q = quote();
        let allowed = [AssetClass::Forex];
        let blocked = vec!["EURUSD".to_string()];
        let ctx = happy_ctx(&q, &allowed, &blocked);
        assert!(policy.validate_order(&ctx).is_err());
    }

    #[test]
    fn rejects_insufficient_capital() {
        let policy = RiskPolicy::new(config());
        let q = quote();
        let allowed = [AssetClass::Forex];
        let blocked: Vec<String> = vec![];
        let mut ctx = happy_ctx(&q, &allowed, &blocked);
        ctx.available_capital = d("1");
        assert!(matches!(policy.validate_order(&ctx), Err(AppError::InsufficientCapital { .. })));
    }

    #[test]
    fn contest_max_drawdown_rejects_when_breached() {
        let policy = RiskPolicy::new(config());
        let ctx = ContestRiskContext {
            limits: RiskLimits {
                enabled: true,
                max_drawdown_percent: d("20"),
                daily_loss_limit_percent: d("100"),
                equity_drawdown_percent: d("100"),
                equity_check_enabled: false,
            },
            starting_capital: d("10000"),
            current_capital: d("7000"),
            realized_pnl_since_midnight_utc: Decimal::ZERO,
            unrealized_pnl_open_positions: Decimal::ZERO,
        };
        assert!(matches!(policy.validate_contest_limits(&ctx), Err(AppError::RiskRejected(_))));
    }
}
