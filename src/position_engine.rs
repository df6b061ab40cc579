//! Position engine: revaluation, SL/TP triggers, and margin-call
//! liquidation. Every automatic (non-user-initiated) capital-affecting
//! action gates on `Quote::is_safe_for_auto_action` — a fallback, stale, or
//! wildly divergent quote must never trigger a liquidation.

use crate::db::models::{Position, TradeHistory};
use crate::db::Repository;
use crate::error::{AppError, Result};
use crate::events::EventSink;
use crate::oracle::{PriceOracle, Quote};
use crate::pnl::{exit_price, margin_status, pnl_percentage, unrealized_pnl};
use crate::types::*;
use chrono::{Duration, Utc};
use rust_decimal::Decimal;
use serde_json::json;
use std::sync::Arc;
use uuid::Uuid;

/// Maximum age of a quote the position engine will act on automatically.
/// Anything staler, or flagged fallback/stale by the oracle itself, is
/// refused for SL/TP and liquidation decisions (the liquidation safety gate).
pub const MAX_AUTO_ACTION_QUOTE_AGE: Duration = Duration::seconds(60);

/// A liquidation additionally refuses to act if the quote used to compute
/// margin level diverges from the position's entry price by more than this
/// fraction — guards against a single bad tick forcing a close.
const MAX_MARK_DIVERGENCE_FRACTION: &str = "0.10";

pub struct PositionEngine {
    repo: Arc<dyn Repository>,
    oracle: Arc<dyn PriceOracle>,
    events: Arc<dyn EventSink>,
    default_margin_thresholds: MarginThresholds,
}

impl PositionEngine {
    pub fn new(
        repo: Arc<dyn Repository>,
        oracle: Arc<dyn PriceOracle>,
        events: Arc<dyn EventSink>,
        default_margin_thresholds: MarginThresholds,
    ) -> Self {
        Self { repo, oracle, events, default_margin_thresholds }
    }

    /// A contest's own `marginCallThreshold` narrows the admin-global
    /// margin-call bucket boundary when set; the warning/liquidation
    /// boundaries always come from the platform-wide configuration.
    fn margin_thresholds_for(&self, contest: &crate::db::models::Contest) -> MarginThresholds {
        match contest.margin_call_threshold {
            Some(t) => MarginThresholds { margin_call: t, ..self.default_margin_thresholds },
            None => self.default_margin_thresholds,
        }
    }

    /// Revalues every open position in a contest against a fresh quote
    /// batch, persisting the new mark/unrealized P&L without closing
    /// anything. Intended to be called by the revaluation scan.
    pub async fn update_all_positions_pnl(&self, contest_id: ContestId) -> Result<()> {
        let positions = self.repo.list_open_positions_by_contest(contest_id).await?;
        if positions.is_empty() {
            return Ok(());
        }
        let symbols: Vec<String> = positions.iter().map(|p| p.symbol.clone()).collect();
        let quotes = self.oracle.quote_batch(&symbols).await?;

        for mut position in positions {
            let Some(quote) = quotes.get(&position.symbol) else { continue };
            self.apply_mark(&mut position, quote);
            if let Err(e) = self.repo.update_position(position.clone()).await {
                tracing::warn!(position_id = %position.id, error = %e, "failed to persist position revaluation");
            }
        }
        Ok(())
    }

    fn apply_mark(&self, position: &mut Position, quote: &Quote) {
        let mark = exit_price(position.side, quote);
        position.current_price = mark;
        position.unrealized_pnl = unrealized_pnl(position.side, position.entry_price, mark, position.quantity, &position.symbol);
        position.unrealized_pnl_percentage = pnl_percentage(position.unrealized_pnl, position.margin_used);
        position.last_price_update = Utc::now();
        position.price_update_count += 1;
    }

    /// Scans a contest's open positions for stop-loss/take-profit triggers
    /// at the current mark, closing any that cross their threshold.
    pub async fn check_stop_loss_take_profit(&self, contest_id: ContestId) -> Result<Vec<Position>> {
        let positions = self.repo.list_open_positions_by_contest(contest_id).await?;
        let symbols: Vec<String> = positions.iter().map(|p| p.symbol.clone()).collect();
        let quotes = self.oracle.quote_batch(&symbols).await?;

        let mut closed = Vec::new();
        for position in positions {
            let Some(quote) = quotes.get(&position.symbol) else { continue };
            if !quote.is_safe_for_auto_action(MAX_AUTO_ACTION_QUOTE_AGE) {
                continue;
            }

            let mark = exit_price(position.side, quote);
            let reason = match position.side {
                PositionSide::Long => {
                    if position.stop_loss.is_some_and(|sl| mark <= sl) {
                        Some(CloseReason::StopLoss)
                    } else if position.take_profit.is_some_and(|tp| mark >= tp) {
                        Some(CloseReason::TakeProfit)
                    } else {
                        None
                    }
                }
                PositionSide::Short => {
                    if position.stop_loss.is_some_and(|sl| mark >= sl) {
                        Some(CloseReason::StopLoss)
                    } else if position.take_profit.is_some_and(|tp| mark <= tp) {
                        Some(CloseReason::TakeProfit)
                    } else {
                        None
                    }
                }
            };

            let Some(reason) = reason else { continue };
            match self.close_position_automatic(position.id, reason, quote).await {
                Ok(p) => closed.push(p),
                Err(e) => tracing::warn!(position_id = %position.id, error = %e, "automatic close failed during SL/TP scan"),
            }
        }
        Ok(closed)
    }

    /// Scans a contest's open positions for margin-call liquidation,
    /// applying the safety gate: a quote that is fallback-sourced, stale, or
    /// diverges more than 10% from the position's entry price is refused
    /// and the position is left open for the next scan.
    pub async fn check_margin_calls(&self, contest_id: ContestId) -> Result<Vec<Position>> {
        let contest = self.repo.get_contest(contest_id).await?.ok_or_else(|| AppError::NotFound("contest not found".to_string()))?;
        let thresholds = self.margin_thresholds_for(&contest);

        let positions = self.repo.list_open_positions_by_contest(contest_id).await?;
        let participants = self.repo.list_participants_by_contest(contest_id).await?;
        let participant_by_id: std::collections::HashMap<_, _> =
            participants.into_iter().map(|p| (p.id, p)).collect();

        let symbols: Vec<String> = positions.iter().map(|p| p.symbol.clone()).collect();
        let quotes = self.oracle.quote_batch(&symbols).await?;

        let mut liquidated = Vec::new();
        for position in positions {
            let Some(quote) = quotes.get(&position.symbol) else { continue };
            let Some(participant) = participant_by_id.get(&position.participant_id) else { continue };

            if !quote.is_safe_for_auto_action(MAX_AUTO_ACTION_QUOTE_AGE) {
                tracing::warn!(position_id = %position.id, "liquidation scan skipped: quote unsafe for auto action");
                continue;
            }
            let max_divergence: Decimal = MAX_MARK_DIVERGENCE_FRACTION.parse().unwrap();
            if position.entry_price > Decimal::ZERO {
                let divergence = (quote.mid - position.entry_price).abs() / position.entry_price;
                if divergence > max_divergence {
                    tracing::warn!(position_id = %position.id, %divergence, "liquidation scan skipped: quote diverges beyond safety gate");
                    continue;
                }
            }

            let mark = exit_price(position.side, quote);
            let pnl = unrealized_pnl(position.side, position.entry_price, mark, position.quantity, &position.symbol);
            let equity = participant.current_capital + participant.unrealized_pnl - position.unrealized_pnl + pnl;

            if margin_status(equity, participant.used_margin, &thresholds) == MarginStatus::Liquidation {
                match self.close_position_automatic(position.id, CloseReason::MarginCall, quote).await {
                    Ok(p) => liquidated.push(p),
                    Err(e) => tracing::warn!(position_id = %position.id, error = %e, "liquidation close failed"),
                }
            }
        }
        Ok(liquidated)
    }

    /// User-initiated close: always uses a fresh quote, never the safety gate
    /// (a user is free to close into a stale or fallback market at their own
    /// discretion).
    pub async fn close_position(&self, position_id: PositionId) -> Result<Position> {
        let quote = {
            let position = self.repo.get_position(position_id).await?.ok_or(AppError::PositionNotOpen)?;
            self.oracle.quote(&position.symbol).await?
        };
        self.close_with_quote(position_id, CloseReason::User, &quote).await
    }

    /// System-initiated close (SL/TP, margin call, contest/challenge end)
    /// using a quote the caller has already validated against the safety
    /// gate where applicable.
    pub async fn close_position_automatic(&self, position_id: PositionId, reason: CloseReason, quote: &Quote) -> Result<Position> {
        self.close_with_quote(position_id, reason, quote).await
    }

    async fn close_with_quote(&self, position_id: PositionId, reason: CloseReason, quote: &Quote) -> Result<Position> {
        let mut position = self.repo.get_position(position_id).await?.ok_or(AppError::PositionNotOpen)?;
        if position.status != PositionStatus::Open {
            return Err(AppError::PositionNotOpen);
        }

        let mut participant = self
            .repo
            .get_participant(position.participant_id)
            .await?
            .ok_or_else(|| AppError::Fatal("position references missing participant".to_string()))?;

        let exit = exit_price(position.side, quote);
        let realized = unrealized_pnl(position.side, position.entry_price, exit, position.quantity, &position.symbol);
        let realized_pct = pnl_percentage(realized, position.margin_used);
        let now = Utc::now();
        let holding_seconds = (now - position.opened_at).num_seconds();

        position.status = if reason == CloseReason::MarginCall { PositionStatus::Liquidated } else { PositionStatus::Closed };
        position.current_price = exit;
        position.unrealized_pnl = realized;
        position.unrealized_pnl_percentage = realized_pct;
        position.closed_at = Some(now);
        position.holding_time_seconds = Some(holding_seconds);
        position.close_reason = Some(reason);

        self.repo.update_position(position.clone()).await?;

        participant.available_capital += position.margin_used + realized;
        participant.used_margin -= position.margin_used;
        participant.current_capital += realized;
        participant.realized_pnl += realized;
        participant.current_open_positions = participant.current_open_positions.saturating_sub(1);
        if realized > Decimal::ZERO {
            participant.winning_trades += 1;
            if realized > participant.largest_win {
                participant.largest_win = realized;
            }
        } else if realized < Decimal::ZERO {
            participant.losing_trades += 1;
            if realized < participant.largest_loss {
                participant.largest_loss = realized;
            }
        }
        if reason == CloseReason::MarginCall && participant.current_capital <= Decimal::ZERO {
            participant.status = ParticipantStatus::Liquidated;
            participant.liquidation_reason = Some(format!("margin call on position {}", position.id));
        }
        self.repo.update_participant(participant.clone()).await?;

        self.repo
            .insert_trade_history(TradeHistory {
                id: Uuid::new_v4(),
                contest_id: position.contest_id,
                participant_id: position.participant_id,
                position_id: position.id,
                symbol: position.symbol.clone(),
                side: position.side,
                quantity: position.quantity,
                entry_price: position.entry_price,
                exit_price: exit,
                price_change: exit - position.entry_price,
                price_change_percentage: if position.entry_price.is_zero() {
                    Decimal::ZERO
                } else {
                    Decimal::ONE_HUNDRED * (exit - position.entry_price) / position.entry_price
                },
                realized_pnl: realized,
                realized_pnl_percentage: realized_pct,
                holding_time_seconds: holding_seconds,
                close_reason: reason,
                is_winner: realized > Decimal::ZERO,
                closed_at: now,
            })
            .await?;

        self.events
            .emit_position_event(
                "position_closed",
                participant.user_id,
                position.contest_id,
                Some(position.id),
                json!({ "reason": reason, "realized_pnl": realized }),
            )
            .await;
        if reason == CloseReason::MarginCall {
            self.events
                .emit_notification(participant.user_id, Some(position.contest_id), "liquidation", json!({ "position_id": position.id }))
                .await;
        }

        Ok(position)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::InMemoryRepository;
    use crate::events::RepositoryEventSink;
    use crate::oracle::StaticPriceOracle;
    use std::str::FromStr;

    fn d(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    fn quote(symbol: &str, bid: &str, ask: &str, is_fallback: bool, is_stale: bool) -> Quote {
        Quote {
            symbol: symbol.to_string(),
            bid: d(bid),
            ask: d(ask),
            mid: (d(bid) + d(ask)) / Decimal::TWO,
            spread: d(ask) - d(bid),
            timestamp: Utc::now(),
            is_fallback,
            is_stale,
        }
    }

    fn seed_participant(contest_id: ContestId) -> crate::db::models::Participant {
        crate::db::models::Participant {
            id: Uuid::new_v4(),
            contest_id,
            user_id: Uuid::new_v4(),
            starting_capital: d("10000"),
            current_capital: d("10000"),
            available_capital: d("8899.90"),
            used_margin: d("1100.10"),
            realized_pnl: Decimal::ZERO,
            unrealized_pnl: Decimal::ZERO,
            pnl: Decimal::ZERO,
            pnl_percentage: Decimal::ZERO,
            total_trades: 1,
            winning_trades: 0,
            losing_trades: 0,
            win_rate: Decimal::ZERO,
            average_win: Decimal::ZERO,
            average_loss: Decimal::ZERO,
            largest_win: Decimal::ZERO,
            largest_loss: Decimal::ZERO,
            current_open_positions: 1,
            status: ParticipantStatus::Active,
            entered_at: Utc::now(),
            disqualification_reason: None,
            liquidation_reason: None,
            prize_received: None,
            is_winner: false,
        }
    }

    fn test_margin_thresholds() -> MarginThresholds {
        MarginThresholds { safe: d("200"), warning: d("100"), margin_call: d("50"), liquidation: d("20") }
    }

    fn seed_contest(id: ContestId) -> crate::db::models::Contest {
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

    fn seed_position(contest_id: ContestId, participant_id: ParticipantId) -> Position {
        Position {
            id: Uuid::new_v4(),
            contest_id,
            participant_id,
            status: PositionStatus::Open,
            side: PositionSide::Long,
            symbol: "EURUSD".to_string(),
            quantity: d("1"),
            entry_price: d("1.10010"),
            current_price: d("1.10010"),
            unrealized_pnl: Decimal::ZERO,
            unrealized_pnl_percentage: Decimal::ZERO,
            leverage: d("100"),
            margin_used: d("1100.10"),
            stop_loss: Some(d("1.09890")),
            take_profit: Some(d("1.11000")),
            open_order_id: Uuid::new_v4(),
            close_order_id: None,
            opened_at: Utc::now() - Duration::minutes(5),
            closed_at: None,
            last_price_update: Utc::now(),
            price_update_count: 0,
            holding_time_seconds: None,
            close_reason: None,
        }
    }

    #[tokio::test]
    async fn s2_stop_loss_triggers_and_realizes_expected_pnl() {
        let repo = Arc::new(InMemoryRepository::new());
        let oracle = Arc::new(StaticPriceOracle::new());
        let events = Arc::new(RepositoryEventSink::new(repo.clone()));
        let contest_id = Uuid::new_v4();

        let participant = seed_participant(contest_id);
        repo.insert_participant(participant.clone()).await.unwrap();
        let position = seed_position(contest_id, participant.id);
        repo.insert_position(position.clone()).await.unwrap();

        oracle.set_quote(quote("EURUSD", "1.09880", "1.09890", false, false)).await;

        let engine = PositionEngine::new(repo.clone(), oracle.clone(), events, test_margin_thresholds());
        let closed = engine.check_stop_loss_take_profit(contest_id).await.unwrap();

        assert_eq!(closed.len(), 1);
        assert_eq!(closed[0].close_reason, Some(CloseReason::StopLoss));
        assert_eq!(closed[0].unrealized_pnl, d("-120"));

        let updated_participant = repo.get_participant(participant.id).await.unwrap().unwrap();
        assert_eq!(updated_participant.realized_pnl, d("-120"));
        assert_eq!(updated_participant.current_open_positions, 0);
    }

    #[tokio::test]
    async fn s3_liquidation_safety_gate_refuses_fallback_quote() {
        let repo = Arc::new(InMemoryRepository::new());
        let oracle = Arc::new(StaticPriceOracle::new());
        let events = Arc::new(RepositoryEventSink::new(repo.clone()));
        let contest_id = Uuid::new_v4();

        repo.insert_contest(seed_contest(contest_id)).await.unwrap();
        let mut participant = seed_participant(contest_id);
        participant.used_margin = d("1100.10");
        participant.current_capital = d("1100");
        repo.insert_participant(participant.clone()).await.unwrap();
        let mut position = seed_position(contest_id, participant.id);
        position.current_price = d("1.05000");
        repo.insert_position(position.clone()).await.unwrap();

        // A fallback-sourced quote must never drive an automatic liquidation,
        // even though this mark would otherwise push margin level under the
        // liquidation threshold.
        oracle.set_quote(quote("EURUSD", "1.00000", "1.00010", true, false)).await;

        let engine = PositionEngine::new(repo.clone(), oracle.clone(), events, test_margin_thresholds());
        let liquidated = engine.check_margin_calls(contest_id).await.unwrap();

        assert!(liquidated.is_empty());
        let unchanged = repo.get_position(position.id).await.unwrap().unwrap();
        assert_eq!(unchanged.status, PositionStatus::Open);
    }

    #[tokio::test]
    async fn user_close_works_regardless_of_quote_freshness() {
        let repo = Arc::new(InMemoryRepository::new());
        let oracle = Arc::new(StaticPriceOracle::new());
        let events = Arc::new(RepositoryEventSink::new(repo.clone()));
        let contest_id = Uuid::new_v4();

        let participant = seed_participant(contest_id);
        repo.insert_participant(participant.clone()).await.unwrap();
        let position = seed_position(contest_id, participant.id);
        repo.insert_position(position.clone()).await.unwrap();

        oracle.set_quote(quote("EURUSD", "1.10500", "1.10510", true, true)).await;

        let engine = PositionEngine::new(repo.clone(), oracle.clone(), events, test_margin_thresholds());
        let closed = engine.close_position(position.id).await.unwrap();
        assert_eq!(closed.status, PositionStatus::Closed);
        assert_eq!(closed.close_reason, Some(CloseReason::User));
    }
}
