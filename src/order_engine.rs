//! Order engine: order intake, validation, and execution. `resolve_execution_quote`
//! is the single policy boundary for locked-vs-fresh quote acceptance, used
//! by both order placement and position close.

use crate::db::models::{Order, Participant, PriceLog};
use crate::db::Repository;
use crate::error::{AppError, Result};
use crate::events::EventSink;
use crate::oracle::{PriceOracle, Quote};
use crate::pnl::{entry_price, margin_required, pip_size};
use crate::restrictions::{RestrictedAction, RestrictionsService};
use crate::risk::{OrderRiskContext, RiskPolicy};
use crate::types::*;
use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use serde_json::json;
use std::sync::Arc;
use uuid::Uuid;

/// A client-supplied quote snapshot accompanying a market order, accepted
/// only when fresh enough (< 2 seconds old at the time of evaluation).
#[derive(Debug, Clone)]
pub struct LockedQuote {
    pub bid: Decimal,
    pub ask: Decimal,
    pub timestamp: DateTime<Utc>,
}

pub const LOCKED_QUOTE_MAX_AGE: Duration = Duration::milliseconds(2_000);

/// Result of resolving which quote an execution uses, plus the slippage
/// measurement against the caller's expectation (always logged, whether or
/// not the locked quote was actually used).
pub struct ResolvedQuote {
    pub quote: Quote,
    pub used_locked: bool,
    pub slippage_pips: Decimal,
}

/// The one policy boundary in the order engine for locked-vs-fresh quote
/// acceptance: a locked quote is honored only if it is still within its
/// freshness window; otherwise the fresh oracle quote is used and the
/// difference from the caller's expectation is reported as slippage.
pub fn resolve_execution_quote(locked: Option<&LockedQuote>, fresh: &Quote, symbol: &str) -> ResolvedQuote {
    let pip = pip_size(symbol);
    match locked {
        Some(locked) if Utc::now() - locked.timestamp < LOCKED_QUOTE_MAX_AGE => {
            let quote = Quote {
                symbol: symbol.to_string(),
                bid: locked.bid,
                ask: locked.ask,
                mid: (locked.bid + locked.ask) / Decimal::TWO,
                spread: locked.ask - locked.bid,
                timestamp: locked.timestamp,
                is_fallback: false,
                is_stale: false,
            };
            let slippage = (quote.mid - fresh.mid).abs() / pip;
            ResolvedQuote { quote, used_locked: true, slippage_pips: slippage }
        }
        _ => ResolvedQuote { quote: fresh.clone(), used_locked: false, slippage_pips: Decimal::ZERO },
    }
}

pub struct PlaceOrderParams {
    pub participant_id: ParticipantId,
    pub symbol: String,
    pub symbol_asset_class: AssetClass,
    pub side: OrderSide,
    pub order_type: OrderType,
    pub quantity: Decimal,
    pub leverage: Decimal,
    pub requested_price: Option<Decimal>,
    pub stop_loss: Option<Decimal>,
    pub take_profit: Option<Decimal>,
    pub locked_quote: Option<LockedQuote>,
    pub source: OrderSource,
}

pub struct OrderEngine {
    repo: Arc<dyn Repository>,
    oracle: Arc<dyn PriceOracle>,
    risk: Arc<RiskPolicy>,
    restrictions: Arc<dyn RestrictionsService>,
    events: Arc<dyn EventSink>,
}

impl OrderEngine {
    pub fn new(
        repo: Arc<dyn Repository>,
        oracle: Arc<dyn PriceOracle>,
        risk: Arc<RiskPolicy>,
        restrictions: Arc<dyn RestrictionsService>,
        events: Arc<dyn EventSink>,
    ) -> Self {
        Self { repo, oracle, risk, restrictions, events }
    }

    pub async fn place_order(&self, params: PlaceOrderParams) -> Result<Order> {
        let participant = self
            .repo
            .get_participant(params.participant_id)
            .await?
            .ok_or_else(|| AppError::NotFound("participant not found".to_string()))?;

        let check = self.restrictions.can_user_perform_action(participant.user_id, RestrictedAction::Trade).await;
        if !check.allowed {
            return Err(AppError::Forbidden(check.reason.unwrap_or_else(|| "trading restricted".to_string())));
        }

        let contest = self
            .repo
            .get_contest(participant.contest_id)
            .await?
            .ok_or_else(|| AppError::Fatal("participant references missing contest".to_string()))?;
        if contest.status != ContestStatus::Active {
            return Err(AppError::ContestNotActive);
        }

        if !self.oracle.is_market_open().await {
            return Err(AppError::MarketClosed);
        }

        let fresh_quote = self.oracle.quote(&params.symbol).await?;

        let open_positions = self.repo.list_open_positions_by_participant(participant.id).await?;

        let risk_ctx = OrderRiskContext {
            quantity: params.quantity,
            symbol: &params.symbol,
            side: params.side,
            order_type: params.order_type,
            leverage: params.leverage,
            requested_price: params.requested_price,
            stop_loss: params.stop_loss,
            take_profit: params.take_profit,
            allowed_asset_classes: &contest.allowed_asset_classes,
            symbol_asset_class: params.symbol_asset_class,
            blocked_symbols: &contest.blocked_symbols,
            leverage_band: contest.leverage,
            current_open_positions: open_positions.len() as u32,
            max_open_positions: contest.max_open_positions,
            available_capital: participant.available_capital,
            quote: &fresh_quote,
        };
        self.risk.validate_order(&risk_ctx)?;

        let now = Utc::now();
        let order_id = Uuid::new_v4();

        if params.order_type == OrderType::Limit {
            let order = Order {
                id: order_id,
                contest_id: contest.id,
                participant_id: participant.id,
                status: OrderStatus::Pending,
                side: params.side,
                order_type: OrderType::Limit,
                symbol: params.symbol,
                quantity: params.quantity,
                requested_price: params.requested_price,
                executed_price: None,
                stop_loss: params.stop_loss,
                take_profit: params.take_profit,
                leverage: params.leverage,
                margin_required: margin_required(params.quantity, fresh_quote.mid, params.leverage, &params.symbol),
                placed_at: now,
                executed_at: None,
                cancelled_at: None,
                order_source: params.source,
                position_id: None,
                cancel_reason: None,
            };
            self.repo.insert_order(order.clone()).await?;
            return Ok(order);
        }

        // Market order: accept a locked quote only if fresh enough.
        let resolved = resolve_execution_quote(params.locked_quote.as_ref(), &fresh_quote, &order_symbol(&params));
        let execution_price = entry_price(params.side, &resolved.quote);
        let margin = margin_required(params.quantity, execution_price, params.leverage, &order_symbol(&params));

        if margin > participant.available_capital {
            return Err(AppError::InsufficientCapital { required: margin, available: participant.available_capital });
        }

        let order = Order {
            id: order_id,
            contest_id: contest.id,
            participant_id: participant.id,
            status: OrderStatus::Filled,
            side: params.side,
            order_type: OrderType::Market,
            symbol: order_symbol(&params),
            quantity: params.quantity,
            requested_price: None,
            executed_price: Some(execution_price),
            stop_loss: params.stop_loss,
            take_profit: params.take_profit,
            leverage: params.leverage,
            margin_required: margin,
            placed_at: now,
            executed_at: Some(now),
            cancelled_at: None,
            order_source: params.source,
            position_id: None,
            cancel_reason: None,
        };

        let position_id = Uuid::new_v4();
        let position = crate::db::models::Position {
            id: position_id,
            contest_id: contest.id,
            participant_id: participant.id,
            status: PositionStatus::Open,
            side: params.side.to_position_side(),
            symbol: order.symbol.clone(),
            quantity: params.quantity,
            entry_price: execution_price,
            current_price: execution_price,
            unrealized_pnl: Decimal::ZERO,
            unrealized_pnl_percentage: Decimal::ZERO,
            leverage: params.leverage,
            margin_used: margin,
            stop_loss: params.stop_loss,
            take_profit: params.take_profit,
            open_order_id: order.id,
            close_order_id: None,
            opened_at: now,
            closed_at: None,
            last_price_update: now,
            price_update_count: 0,
            holding_time_seconds: None,
            close_reason: None,
        };

        let mut order = order;
        order.position_id = Some(position_id);

        self.repo.insert_order(order.clone()).await?;
        self.repo.insert_position(position).await?;

        let mut participant = participant;
        participant.available_capital -= margin;
        participant.used_margin += margin;
        participant.current_open_positions += 1;
        participant.total_trades += 1;
        self.repo.update_participant(participant.clone()).await?;

        self.repo
            .insert_price_log(PriceLog {
                id: Uuid::new_v4(),
                symbol: order.symbol.clone(),
                bid: resolved.quote.bid,
                ask: resolved.quote.ask,
                mid: resolved.quote.mid,
                spread: resolved.quote.spread,
                quote_timestamp: resolved.quote.timestamp,
                logged_at: now,
                expected_price: params.requested_price,
                execution_price,
                slippage_pips: resolved.slippage_pips,
                price_source: PriceSource::Rest,
                order_id: Some(order.id),
                position_id: Some(position_id),
            })
            .await?;

        self.events
            .emit_position_event(
                "order_filled",
                participant.user_id,
                contest.id,
                Some(position_id),
                json!({ "order_id": order.id, "execution_price": execution_price }),
            )
            .await;
        self.events
            .emit_position_event(
                "position_opened",
                participant.user_id,
                contest.id,
                Some(position_id),
                json!({ "symbol": order.symbol, "side": order.side }),
            )
            .await;

        Ok(order)
    }

    pub async fn cancel_order(&self, order_id: OrderId) -> Result<Order> {
        let mut order = self.repo.get_order(order_id).await?.ok_or_else(|| AppError::NotFound("order not found".to_string()))?;
        if order.status != OrderStatus::Pending {
            return Err(AppError::OrderNotPending);
        }
        order.status = OrderStatus::Cancelled;
        order.cancelled_at = Some(Utc::now());
        self.repo.update_order(order.clone()).await?;
        Ok(order)
    }

    /// Invoked by the limit-order scanner once a pending limit order's
    /// trigger condition is met at the current mark price.
    pub async fn execute_limit_order(&self, order_id: OrderId, mark: &Quote) -> Result<Order> {
        let mut order = self.repo.get_order(order_id).await?.ok_or_else(|| AppError::NotFound("order not found".to_string()))?;
        if order.status != OrderStatus::Pending {
            return Err(AppError::OrderNotPending);
        }

        let mut participant = self
            .repo
            .get_participant(order.participant_id)
            .await?
            .ok_or_else(|| AppError::Fatal("order references missing participant".to_string()))?;

        let execution_price = entry_price(order.side, mark);
        let margin = margin_required(order.quantity, execution_price, order.leverage, &order.symbol);

        if margin > participant.available_capital {
            order.status = OrderStatus::Cancelled;
            order.cancelled_at = Some(Utc::now());
            order.cancel_reason = Some("Insufficient capital".to_string());
            self.repo.update_order(order.clone()).await?;
            return Ok(order);
        }

        let now = Utc::now();
        let position_id = Uuid::new_v4();
        let position = crate::db::models::Position {
            id: position_id,
            contest_id: order.contest_id,
            participant_id: participant.id,
            status: PositionStatus::Open,
            side: order.side.to_position_side(),
            symbol: order.symbol.clone(),
            quantity: order.quantity,
            entry_price: execution_price,
            current_price: execution_price,
            unrealized_pnl: Decimal::ZERO,
            unrealized_pnl_percentage: Decimal::ZERO,
            leverage: order.leverage,
            margin_used: margin,
            stop_loss: order.stop_loss,
            take_profit: order.take_profit,
            open_order_id: order.id,
            close_order_id: None,
            opened_at: now,
            closed_at: None,
            last_price_update: now,
            price_update_count: 0,
            holding_time_seconds: None,
            close_reason: None,
        };

        order.status = OrderStatus::Filled;
        order.executed_price = Some(execution_price);
        order.executed_at = Some(now);
        order.position_id = Some(position_id);

        self.repo.update_order(order.clone()).await?;
        self.repo.insert_position(position).await?;

        participant.available_capital -= margin;
        participant.used_margin += margin;
        participant.current_open_positions += 1;
        participant.total_trades += 1;
        self.repo.update_participant(participant.clone()).await?;

        self.events
            .emit_position_event(
                "order_filled",
                participant.user_id,
                order.contest_id,
                Some(position_id),
                json!({ "order_id": order.id, "execution_price": execution_price }),
            )
            .await;

        Ok(order)
    }

    /// Iterates pending limit orders for a contest in placement order,
    /// triggering each whose mark crosses its requested price.
    pub async fn scan_limit_orders(&self, contest_id: ContestId) -> Result<Vec<Order>> {
        let pending = self.repo.list_pending_limit_orders(contest_id).await?;
        let symbols: Vec<String> = pending.iter().map(|o| o.symbol.clone()).collect();
        let quotes = self.oracle.quote_batch(&symbols).await?;

        let mut executed = Vec::new();
        for order in pending {
            let Some(quote) = quotes.get(&order.symbol) else { continue };
            let Some(requested) = order.requested_price else { continue };

            let triggers = match order.side {
                OrderSide::Buy => quote.ask <= requested,
                OrderSide::Sell => quote.bid >= requested,
            };
            if !triggers {
                continue;
            }

            match self.execute_limit_order(order.id, quote).await {
                Ok(filled) => executed.push(filled),
                Err(e) => tracing::warn!(order_id = %order.id, error = %e, "limit order execution failed during scan"),
            }
        }
        Ok(executed)
    }
}

fn order_symbol(params: &PlaceOrderParams) -> String {
    params.symbol.clone()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::InMemoryRepository;
    use crate::oracle::StaticPriceOracle;
    use crate::restrictions::AllowAllRestrictionsService;
    use crate::config::RiskConfig;
    use crate::types::MarginThresholds;
    use std::str::FromStr;

    fn d(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    async fn make_participant(repo: &InMemoryRepository, contest_id: ContestId) -> Participant {
        let participant = Participant {
            id: Uuid::new_v4(),
            contest_id,
            user_id: Uuid::new_v4(),
            starting_capital: d("10000"),
            current_capital: d("10000"),
            available_capital: d("10000"),
            used_margin: Decimal::ZERO,
            realized_pnl: Decimal::ZERO,
            unrealized_pnl: Decimal::ZERO,
            pnl: Decimal::ZERO,
            pnl_percentage: Decimal::ZERO,
            total_trades: 0,
            winning_trades: 0,
            losing_trades: 0,
            win_rate: Decimal::ZERO,
            average_win: Decimal::ZERO,
            average_loss: Decimal::ZERO,
            largest_win: Decimal::ZERO,
            largest_loss: Decimal::ZERO,
            current_open_positions: 0,
            status: ParticipantStatus::Active,
            entered_at: Utc::now(),
            disqualification_reason: None,
            liquidation_reason: None,
            prize_received: None,
            is_winner: false,
        };
        repo.insert_participant(participant.clone()).await.unwrap();
        participant
    }

    fn make_contest(id: ContestId) -> crate::db::models::Contest {
        crate::db::models::Contest {
            id,
            slug: "test".to_string(),
            name: "Test".to_string(),
            kind: ContestKind::Competition,
            start_time: Utc::now(),
            end_time: Utc::now() + Duration::hours(1),
            accept_deadline: None,
            status: ContestStatus::Active,
            entry_fee: d("10"),
            starting_capital: d("10000"),
            prize_pool: d("100"),
            platform_fee_percentage: d("5"),
            platform_fee_amount: Decimal::ZERO,
            winner_prize: Decimal::ZERO,
            prize_distribution: vec![],
            min_participants: 2,
            max_participants: 10,
            current_participants: 1,
            allowed_asset_classes: vec![AssetClass::Forex],
            allowed_symbols: vec![],
            blocked_symbols: vec![],
            leverage: LeverageBand { min: d("1"), max: d("100"), default: d("10") },
            max_open_positions: 10,
            max_position_size: d("100"),
            margin_call_threshold: None,
            ranking_method: RankingMethod::Pnl,
            tie_breaker1: None,
            tie_breaker2: None,
            minimum_trades: 0,
            tie_prize_distribution: TiePrizeDistribution::SplitEqually,
            disqualify_on_liquidation: true,
            risk_limits: RiskLimits::default(),
            cancellation_reason: None,
        }
    }

    fn risk_policy() -> RiskPolicy {
        RiskPolicy::new(RiskConfig {
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
        })
    }

    #[tokio::test]
    async fn s1_market_order_happy_path() {
        let repo = Arc::new(InMemoryRepository::new());
        let oracle = Arc::new(StaticPriceOracle::new());
        oracle
            .set_quote(Quote {
                symbol: "EURUSD".to_string(),
                bid: d("1.10000"),
                ask: d("1.10010"),
                mid: d("1.10005"),
                spread: d("0.00010"),
                timestamp: Utc::now(),
                is_fallback: false,
                is_stale: false,
            })
            .await;

        let contest_id = Uuid::new_v4();
        repo.insert_contest(make_contest(contest_id)).await.unwrap();
        let participant = make_participant(&repo, contest_id).await;

        let engine = OrderEngine::new(
            repo.clone(),
            oracle.clone(),
            Arc::new(risk_policy()),
            Arc::new(AllowAllRestrictionsService),
            Arc::new(crate::events::RepositoryEventSink::new(repo.clone())),
        );

        let order = engine
            .place_order(PlaceOrderParams {
                participant_id: participant.id,
                symbol: "EURUSD".to_string(),
                symbol_asset_class: AssetClass::Forex,
                side: OrderSide::Buy,
                order_type: OrderType::Market,
                quantity: d("1"),
                leverage: d("100"),
                requested_price: None,
                stop_loss: None,
                take_profit: None,
                locked_quote: None,
                source: OrderSource::Web,
            })
            .await
            .unwrap();

        assert_eq!(order.status, OrderStatus::Filled);
        assert_eq!(order.executed_price, Some(d("1.10010")));

        let updated = repo.get_participant(participant.id).await.unwrap().unwrap();
        assert_eq!(updated.current_open_positions, 1);
        assert_eq!(updated.total_trades, 1);
        assert_eq!(updated.available_capital, d("8899.90"));
    }

    #[tokio::test]
    async fn cancel_only_allowed_while_pending() {
        let repo = Arc::new(InMemoryRepository::new());
        let order_id = Uuid::new_v4();
        repo.insert_order(Order {
            id: order_id,
            contest_id: Uuid::new_v4(),
            participant_id: Uuid::new_v4(),
            status: OrderStatus::Filled,
            side: OrderSide::Buy,
            order_type: OrderType::Market,
            symbol: "EURUSD".to_string(),
            quantity: d("1"),
            requested_price: None,
            executed_price: Some(d("1.1")),
            stop_loss: None,
            take_profit: None,
            leverage: d("10"),
            margin_required: d("110"),
            placed_at: Utc::now(),
            executed_at: Some(Utc::now()),
            cancelled_at: None,
            order_source: OrderSource::Web,
            position_id: None,
            cancel_reason: None,
        })
        .await
        .unwrap();

        let engine = OrderEngine::new(
            repo.clone(),
            Arc::new(StaticPriceOracle::new()),
            Arc::new(risk_policy()),
            Arc::new(AllowAllRestrictionsService),
            Arc::new(crate::events::RepositoryEventSink::new(repo.clone())),
        );

        assert!(matches!(engine.cancel_order(order_id).await, Err(AppError::OrderNotPending)));
    }
}
