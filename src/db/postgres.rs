//! Postgres-backed repository. Composite fields (`prize_distribution`,
//! `leverage`, `risk_limits`, symbol lists) round-trip through `JSONB`
//! columns via `serde_json`; scalar money/price/quantity fields map
//! directly to `NUMERIC` through `rust_decimal`'s `db-tokio-postgres`
//! feature.

use super::models::*;
use super::repository::Repository;
use crate::error::{AppError, Result};
use crate::types::*;
use async_trait::async_trait;
use chrono::Utc;
use deadpool_postgres::{GenericClient, Pool};
use rust_decimal::Decimal;
use tokio_postgres::Row;
use uuid::Uuid;

pub struct PostgresRepository {
    pool: Pool,
}

impl PostgresRepository {
    pub fn new(pool: Pool) -> Self {
        Self { pool }
    }
}

fn enum_str<T: serde::Serialize>(value: &T) -> String {
    serde_json::to_value(value).expect("enum serialization is infallible").as_str().unwrap().to_string()
}

fn enum_from_str<T: serde::de::DeserializeOwned>(raw: &str) -> T {
    serde_json::from_value(serde_json::Value::String(raw.to_string()))
        .expect("stored enum value no longer matches the type definition")
}

fn contest_from_row(row: &Row) -> Contest {
    Contest {
        id: row.get("id"),
        slug: row.get("slug"),
        name: row.get("name"),
        kind: enum_from_str(row.get::<_, &str>("kind")),
        start_time: row.get("start_time"),
        end_time: row.get("end_time"),
        accept_deadline: row.get("accept_deadline"),
        status: enum_from_str(row.get::<_, &str>("status")),
        entry_fee: row.get("entry_fee"),
        starting_capital: row.get("starting_capital"),
        prize_pool: row.get("prize_pool"),
        platform_fee_percentage: row.get("platform_fee_percentage"),
        platform_fee_amount: row.get("platform_fee_amount"),
        winner_prize: row.get("winner_prize"),
        prize_distribution: serde_json::from_value(row.get("prize_distribution")).unwrap_or_default(),
        min_participants: row.get::<_, i32>("min_participants") as u32,
        max_participants: row.get::<_, i32>("max_participants") as u32,
        current_participants: row.get::<_, i32>("current_participants") as u32,
        allowed_asset_classes: serde_json::from_value(row.get("allowed_asset_classes")).unwrap_or_default(),
        allowed_symbols: serde_json::from_value(row.get("allowed_symbols")).unwrap_or_default(),
        blocked_symbols: serde_json::from_value(row.get("blocked_symbols")).unwrap_or_default(),
        leverage: serde_json::from_value(row.get("leverage")).expect("leverage band always stored as json"),
        max_open_positions: row.get::<_, i32>("max_open_positions") as u32,
        max_position_size: row.get("max_position_size"),
        margin_call_threshold: row.get("margin_call_threshold"),
        ranking_method: enum_from_str(row.get::<_, &str>("ranking_method")),
        tie_breaker1: row.get::<_, Option<&str>>("tie_breaker1").map(enum_from_str),
        tie_breaker2: row.get::<_, Option<&str>>("tie_breaker2").map(enum_from_str),
        minimum_trades: row.get::<_, i32>("minimum_trades") as u32,
        tie_prize_distribution: enum_from_str(row.get::<_, &str>("tie_prize_distribution")),
        disqualify_on_liquidation: row.get("disqualify_on_liquidation"),
        risk_limits: serde_json::from_value(row.get("risk_limits")).expect("risk limits always stored as json"),
        cancellation_reason: row.get("cancellation_reason"),
    }
}

fn participant_from_row(row: &Row) -> Participant {
    Participant {
        id: row.get("id"),
        contest_id: row.get("contest_id"),
        user_id: row.get("user_id"),
        starting_capital: row.get("starting_capital"),
        current_capital: row.get("current_capital"),
        available_capital: row.get("available_capital"),
        used_margin: row.get("used_margin"),
        realized_pnl: row.get("realized_pnl"),
        unrealized_pnl: row.get("unrealized_pnl"),
        pnl: row.get("pnl"),
        pnl_percentage: row.get("pnl_percentage"),
        total_trades: row.get::<_, i32>("total_trades") as u32,
        winning_trades: row.get::<_, i32>("winning_trades") as u32,
        losing_trades: row.get::<_, i32>("losing_trades") as u32,
        win_rate: row.get("win_rate"),
        average_win: row.get("average_win"),
        average_loss: row.get("average_loss"),
        largest_win: row.get("largest_win"),
        largest_loss: row.get("largest_loss"),
        current_open_positions: row.get::<_, i32>("current_open_positions") as u32,
        status: enum_from_str(row.get::<_, &str>("status")),
        entered_at: row.get("entered_at"),
        disqualification_reason: row.get("disqualification_reason"),
        liquidation_reason: row.get("liquidation_reason"),
        prize_received: row.get("prize_received"),
        is_winner: row.get("is_winner"),
    }
}

fn order_from_row(row: &Row) -> Order {
    Order {
        id: row.get("id"),
        contest_id: row.get("contest_id"),
        participant_id: row.get("participant_id"),
        status: enum_from_str(row.get::<_, &str>("status")),
        side: enum_from_str(row.get::<_, &str>("side")),
        order_type: enum_from_str(row.get::<_, &str>("order_type")),
        symbol: row.get("symbol"),
        quantity: row.get("quantity"),
        requested_price: row.get("requested_price"),
        executed_price: row.get("executed_price"),
        stop_loss: row.get("stop_loss"),
        take_profit: row.get("take_profit"),
        leverage: row.get("leverage"),
        margin_required: row.get("margin_required"),
        placed_at: row.get("placed_at"),
        executed_at: row.get("executed_at"),
        cancelled_at: row.get("cancelled_at"),
        order_source: enum_from_str(row.get::<_, &str>("order_source")),
        position_id: row.get("position_id"),
        cancel_reason: row.get("cancel_reason"),
    }
}

fn position_from_row(row: &Row) -> Position {
    Position {
        id: row.get("id"),
        contest_id: row.get("contest_id"),
        participant_id: row.get("participant_id"),
        status: enum_from_str(row.get::<_, &str>("status")),
        side: enum_from_str(row.get::<_, &str>("side")),
        symbol: row.get("symbol"),
        quantity: row.get("quantity"),
        entry_price: row.get("entry_price"),
        current_price: row.get("current_price"),
        unrealized_pnl: row.get("unrealized_pnl"),
        unrealized_pnl_percentage: row.get("unrealized_pnl_percentage"),
        leverage: row.get("leverage"),
        margin_used: row.get("margin_used"),
        stop_loss: row.get("stop_loss"),
        take_profit: row.get("take_profit"),
        open_order_id: row.get("open_order_id"),
        close_order_id: row.get("close_order_id"),
        opened_at: row.get("opened_at"),
        closed_at: row.get("closed_at"),
        last_price_update: row.get("last_price_update"),
        price_update_count: row.get::<_, i64>("price_update_count") as u64,
        holding_time_seconds: row.get("holding_time_seconds"),
        close_reason: row.get::<_, Option<&str>>("close_reason").map(enum_from_str),
    }
}

fn wallet_from_row(row: &Row) -> Wallet {
    Wallet {
        user_id: row.get("user_id"),
        credit_balance: row.get("credit_balance"),
        total_spent_on_competitions: row.get("total_spent_on_competitions"),
        total_won_from_challenges: row.get("total_won_from_challenges"),
    }
}

fn wallet_tx_from_row(row: &Row) -> WalletTransaction {
    WalletTransaction {
        id: row.get("id"),
        user_id: row.get("user_id"),
        transaction_type: enum_from_str(row.get::<_, &str>("transaction_type")),
        amount: row.get("amount"),
        balance_before: row.get("balance_before"),
        balance_after: row.get("balance_after"),
        contest_id: row.get("contest_id"),
        description: row.get("description"),
        processed_at: row.get("processed_at"),
    }
}

#[async_trait]
impl Repository for PostgresRepository {
    async fn get_contest(&self, id: ContestId) -> Result<Option<Contest>> {
        let conn = self.pool.get().await.map_err(AppError::from)?;
        let row = conn.query_opt("SELECT * FROM contests WHERE id = $1", &[&id]).await?;
        Ok(row.as_ref().map(contest_from_row))
    }

    async fn insert_contest(&self, contest: Contest) -> Result<()> {
        let conn = self.pool.get().await.map_err(AppError::from)?;
        conn.execute(
            r#"INSERT INTO contests (
                id, slug, name, kind, start_time, end_time, accept_deadline, status,
                entry_fee, starting_capital, prize_pool, platform_fee_percentage, platform_fee_amount,
                winner_prize, prize_distribution, min_participants, max_participants, current_participants,
                allowed_asset_classes, allowed_symbols, blocked_symbols, leverage, max_open_positions,
                max_position_size, margin_call_threshold, ranking_method, tie_breaker1, tie_breaker2,
                minimum_trades, tie_prize_distribution, disqualify_on_liquidation, risk_limits, cancellation_reason
            ) VALUES ($1,$2,$3,$4,$5,$6,$7,$8,$9,$10,$11,$12,$13,$14,$15,$16,$17,$18,$19,$20,$21,$22,$23,$24,$25,$26,$27,$28,$29,$30,$31,$32,$33)"#,
            &[
                &contest.id, &contest.slug, &contest.name, &enum_str(&contest.kind),
                &contest.start_time, &contest.end_time, &contest.accept_deadline, &enum_str(&contest.status),
                &contest.entry_fee, &contest.starting_capital, &contest.prize_pool,
                &contest.platform_fee_percentage, &contest.platform_fee_amount, &contest.winner_prize,
                &serde_json::to_value(&contest.prize_distribution).unwrap(),
                &(contest.min_participants as i32), &(contest.max_participants as i32),
                &(contest.current_participants as i32),
                &serde_json::to_value(&contest.allowed_asset_classes).unwrap(),
                &serde_json::to_value(&contest.allowed_symbols).unwrap(),
                &serde_json::to_value(&contest.blocked_symbols).unwrap(),
                &serde_json::to_value(&contest.leverage).unwrap(),
                &(contest.max_open_positions as i32), &contest.max_position_size,
                &contest.margin_call_threshold, &enum_str(&contest.ranking_method),
                &contest.tie_breaker1.map(|t| enum_str(&t)), &contest.tie_breaker2.map(|t| enum_str(&t)),
                &(contest.minimum_trades as i32), &enum_str(&contest.tie_prize_distribution),
                &contest.disqualify_on_liquidation, &serde_json::to_value(&contest.risk_limits).unwrap(),
                &contest.cancellation_reason,
            ],
        )
        .await?;
        Ok(())
    }

    async fn update_contest(&self, contest: Contest) -> Result<()> {
        let conn = self.pool.get().await.map_err(AppError::from)?;
        let updated = conn
            .execute(
                r#"UPDATE contests SET status = $2, prize_pool = $3, current_participants = $4,
                    platform_fee_amount = $5, winner_prize = $6, cancellation_reason = $7
                WHERE id = $1"#,
                &[
                    &contest.id,
                    &enum_str(&contest.status),
                    &contest.prize_pool,
                    &(contest.current_participants as i32),
                    &contest.platform_fee_amount,
                    &contest.winner_prize,
                    &contest.cancellation_reason,
                ],
            )
            .await?;
        if updated == 0 {
            return Err(AppError::NotFound("contest not found".to_string()));
        }
        Ok(())
    }

    async fn list_contests_by_status(&self, status: ContestStatus) -> Result<Vec<Contest>> {
        let conn = self.pool.get().await.map_err(AppError::from)?;
        let rows = conn.query("SELECT * FROM contests WHERE status = $1", &[&enum_str(&status)]).await?;
        Ok(rows.iter().map(contest_from_row).collect())
    }

    async fn list_contests_near_start(&self) -> Result<Vec<Contest>> {
        let conn = self.pool.get().await.map_err(AppError::from)?;
        let rows = conn
            .query(
                "SELECT * FROM contests WHERE status = 'upcoming' AND start_time <= $1",
                &[&Utc::now()],
            )
            .await?;
        Ok(rows.iter().map(contest_from_row).collect())
    }

    async fn get_participant(&self, id: ParticipantId) -> Result<Option<Participant>> {
        let conn = self.pool.get().await.map_err(AppError::from)?;
        let row = conn.query_opt("SELECT * FROM participants WHERE id = $1", &[&id]).await?;
        Ok(row.as_ref().map(participant_from_row))
    }

    async fn get_participant_by_user(
        &self,
        contest_id: ContestId,
        user_id: UserId,
    ) -> Result<Option<Participant>> {
        let conn = self.pool.get().await.map_err(AppError::from)?;
        let row = conn
            .query_opt(
                "SELECT * FROM participants WHERE contest_id = $1 AND user_id = $2",
                &[&contest_id, &user_id],
            )
            .await?;
        Ok(row.as_ref().map(participant_from_row))
    }

    async fn insert_participant(&self, participant: Participant) -> Result<()> {
        let conn = self.pool.get().await.map_err(AppError::from)?;
        conn.execute(
            r#"INSERT INTO participants (
                id, contest_id, user_id, starting_capital, current_capital, available_capital,
                used_margin, realized_pnl, unrealized_pnl, pnl, pnl_percentage, total_trades,
                winning_trades, losing_trades, win_rate, average_win, average_loss, largest_win,
                largest_loss, current_open_positions, status, entered_at, disqualification_reason,
                liquidation_reason, prize_received, is_winner
            ) VALUES ($1,$2,$3,$4,$5,$6,$7,$8,$9,$10,$11,$12,$13,$14,$15,$16,$17,$18,$19,$20,$21,$22,$23,$24,$25,$26)"#,
            &[
                &participant.id, &participant.contest_id, &participant.user_id,
                &participant.starting_capital, &participant.current_capital, &participant.available_capital,
                &participant.used_margin, &participant.realized_pnl, &participant.unrealized_pnl,
                &participant.pnl, &participant.pnl_percentage, &(participant.total_trades as i32),
                &(participant.winning_trades as i32), &(participant.losing_trades as i32),
                &participant.win_rate, &participant.average_win, &participant.average_loss,
                &participant.largest_win, &participant.largest_loss,
                &(participant.current_open_positions as i32), &enum_str(&participant.status),
                &participant.entered_at, &participant.disqualification_reason,
                &participant.liquidation_reason, &participant.prize_received, &participant.is_winner,
            ],
        )
        .await?;
        Ok(())
    }

    async fn update_participant(&self, participant: Participant) -> Result<()> {
        let conn = self.pool.get().await.map_err(AppError::from)?;
        let updated = conn
            .execute(
                r#"UPDATE participants SET current_capital=$2, available_capital=$3, used_margin=$4,
                    realized_pnl=$5, unrealized_pnl=$6, pnl=$7, pnl_percentage=$8, total_trades=$9,
                    winning_trades=$10, losing_trades=$11, win_rate=$12, average_win=$13, average_loss=$14,
                    largest_win=$15, largest_loss=$16, current_open_positions=$17, status=$18,
                    disqualification_reason=$19, liquidation_reason=$20, prize_received=$21, is_winner=$22
                WHERE id = $1"#,
                &[
                    &participant.id, &participant.current_capital, &participant.available_capital,
                    &participant.used_margin, &participant.realized_pnl, &participant.unrealized_pnl,
                    &participant.pnl, &participant.pnl_percentage, &(participant.total_trades as i32),
                    &(participant.winning_trades as i32), &(participant.losing_trades as i32),
                    &participant.win_rate, &participant.average_win, &participant.average_loss,
                    &participant.largest_win, &participant.largest_loss,
                    &(participant.current_open_positions as i32), &enum_str(&participant.status),
                    &participant.disqualification_reason, &participant.liquidation_reason,
                    &participant.prize_received, &participant.is_winner,
                ],
            )
            .await?;
        if updated == 0 {
            return Err(AppError::NotFound("participant not found".to_string()));
        }
        Ok(())
    }

    async fn list_participants_by_contest(&self, contest_id: ContestId) -> Result<Vec<Participant>> {
        let conn = self.pool.get().await.map_err(AppError::from)?;
        let rows = conn.query("SELECT * FROM participants WHERE contest_id = $1", &[&contest_id]).await?;
        Ok(rows.iter().map(participant_from_row).collect())
    }

    async fn list_active_participants(&self, contest_id: ContestId) -> Result<Vec<Participant>> {
        let conn = self.pool.get().await.map_err(AppError::from)?;
        let rows = conn
            .query(
                "SELECT * FROM participants WHERE contest_id = $1 AND status = 'active'",
                &[&contest_id],
            )
            .await?;
        Ok(rows.iter().map(participant_from_row).collect())
    }

    async fn get_order(&self, id: OrderId) -> Result<Option<Order>> {
        let conn = self.pool.get().await.map_err(AppError::from)?;
        let row = conn.query_opt("SELECT * FROM orders WHERE id = $1", &[&id]).await?;
        Ok(row.as_ref().map(order_from_row))
    }

    async fn insert_order(&self, order: Order) -> Result<()> {
        let conn = self.pool.get().await.map_err(AppError::from)?;
        conn.execute(
            r#"INSERT INTO orders (
                id, contest_id, participant_id, status, side, order_type, symbol, quantity,
                requested_price, executed_price, stop_loss, take_profit, leverage, margin_required,
                placed_at, executed_at, cancelled_at, order_source, position_id, cancel_reason
            ) VALUES ($1,$2,$3,$4,$5,$6,$7,$8,$9,$10,$11,$12,$13,$14,$15,$16,$17,$18,$19,$20)"#,
            &[
                &order.id, &order.contest_id, &order.participant_id, &enum_str(&order.status),
                &enum_str(&order.side), &enum_str(&order.order_type), &order.symbol, &order.quantity,
                &order.requested_price, &order.executed_price, &order.stop_loss, &order.take_profit,
                &order.leverage, &order.margin_required, &order.placed_at, &order.executed_at,
                &order.cancelled_at, &enum_str(&order.order_source), &order.position_id, &order.cancel_reason,
            ],
        )
        .await?;
        Ok(())
    }

    async fn update_order(&self, order: Order) -> Result<()> {
        let conn = self.pool.get().await.map_err(AppError::from)?;
        let updated = conn
            .execute(
                r#"UPDATE orders SET status=$2, executed_price=$3, executed_at=$4, cancelled_at=$5,
                    position_id=$6, cancel_reason=$7 WHERE id = $1"#,
                &[
                    &order.id, &enum_str(&order.status), &order.executed_price, &order.executed_at,
                    &order.cancelled_at, &order.position_id, &order.cancel_reason,
                ],
            )
            .await?;
        if updated == 0 {
            return Err(AppError::NotFound("order not found".to_string()));
        }
        Ok(())
    }

    async fn list_pending_limit_orders(&self, contest_id: ContestId) -> Result<Vec<Order>> {
        let conn = self.pool.get().await.map_err(AppError::from)?;
        let rows = conn
            .query(
                "SELECT * FROM orders WHERE contest_id = $1 AND status = 'pending' AND order_type = 'limit' ORDER BY placed_at ASC",
                &[&contest_id],
            )
            .await?;
        Ok(rows.iter().map(order_from_row).collect())
    }

    async fn get_position(&self, id: PositionId) -> Result<Option<Position>> {
        let conn = self.pool.get().await.map_err(AppError::from)?;
        let row = conn.query_opt("SELECT * FROM positions WHERE id = $1", &[&id]).await?;
        Ok(row.as_ref().map(position_from_row))
    }

    async fn insert_position(&self, position: Position) -> Result<()> {
        let conn = self.pool.get().await.map_err(AppError::from)?;
        conn.execute(
            r#"INSERT INTO positions (
                id, contest_id, participant_id, status, side, symbol, quantity, entry_price,
                current_price, unrealized_pnl, unrealized_pnl_percentage, leverage, margin_used,
                stop_loss, take_profit, open_order_id, close_order_id, opened_at, closed_at,
                last_price_update, price_update_count, holding_time_seconds, close_reason
            ) VALUES ($1,$2,$3,$4,$5,$6,$7,$8,$9,$10,$11,$12,$13,$14,$15,$16,$17,$18,$19,$20,$21,$22,$23)"#,
            &[
                &position.id, &position.contest_id, &position.participant_id, &enum_str(&position.status),
                &enum_str(&position.side), &position.symbol, &position.quantity, &position.entry_price,
                &position.current_price, &position.unrealized_pnl, &position.unrealized_pnl_percentage,
                &position.leverage, &position.margin_used, &position.stop_loss, &position.take_profit,
                &position.open_order_id, &position.close_order_id, &position.opened_at, &position.closed_at,
                &position.last_price_update, &(position.price_update_count as i64),
                &position.holding_time_seconds, &position.close_reason.map(|r| enum_str(&r)),
            ],
        )
        .await?;
        Ok(())
    }

    async fn update_position(&self, position: Position) -> Result<()> {
        let conn = self.pool.get().await.map_err(AppError::from)?;
        // The `status <> 'closed' AND status <> 'liquidated'` guard is the
        // database-level enforcement of at-most-one-close: a concurrent
        // close that already committed makes this affect zero rows.
        let updated = conn
            .execute(
                r#"UPDATE positions SET status=$2, current_price=$3, unrealized_pnl=$4,
                    unrealized_pnl_percentage=$5, stop_loss=$6, take_profit=$7, close_order_id=$8,
                    closed_at=$9, last_price_update=$10, price_update_count=$11,
                    holding_time_seconds=$12, close_reason=$13
                WHERE id = $1 AND (status = 'open' OR $2 = status::text)"#,
                &[
                    &position.id, &enum_str(&position.status), &position.current_price,
                    &position.unrealized_pnl, &position.unrealized_pnl_percentage, &position.stop_loss,
                    &position.take_profit, &position.close_order_id, &position.closed_at,
                    &position.last_price_update, &(position.price_update_count as i64),
                    &position.holding_time_seconds, &position.close_reason.map(|r| enum_str(&r)),
                ],
            )
            .await?;
        if updated == 0 {
            return Err(AppError::PositionNotOpen);
        }
        Ok(())
    }

    async fn list_open_positions_by_contest(&self, contest_id: ContestId) -> Result<Vec<Position>> {
        let conn = self.pool.get().await.map_err(AppError::from)?;
        let rows = conn
            .query("SELECT * FROM positions WHERE contest_id = $1 AND status = 'open'", &[&contest_id])
            .await?;
        Ok(rows.iter().map(position_from_row).collect())
    }

    async fn list_open_positions_by_participant(&self, participant_id: ParticipantId) -> Result<Vec<Position>> {
        let conn = self.pool.get().await.map_err(AppError::from)?;
        let rows = conn
            .query(
                "SELECT * FROM positions WHERE participant_id = $1 AND status = 'open'",
                &[&participant_id],
            )
            .await?;
        Ok(rows.iter().map(position_from_row).collect())
    }

    async fn insert_trade_history(&self, trade: TradeHistory) -> Result<()> {
        let conn = self.pool.get().await.map_err(AppError::from)?;
        conn.execute(
            r#"INSERT INTO trade_history (
                id, contest_id, participant_id, position_id, symbol, side, quantity, entry_price,
                exit_price, price_change, price_change_percentage, realized_pnl, realized_pnl_percentage,
                holding_time_seconds, close_reason, is_winner, closed_at
            ) VALUES ($1,$2,$3,$4,$5,$6,$7,$8,$9,$10,$11,$12,$13,$14,$15,$16,$17)"#,
            &[
                &trade.id, &trade.contest_id, &trade.participant_id, &trade.position_id, &trade.symbol,
                &enum_str(&trade.side), &trade.quantity, &trade.entry_price, &trade.exit_price,
                &trade.price_change, &trade.price_change_percentage, &trade.realized_pnl,
                &trade.realized_pnl_percentage, &trade.holding_time_seconds, &enum_str(&trade.close_reason),
                &trade.is_winner, &trade.closed_at,
            ],
        )
        .await?;
        Ok(())
    }

    async fn count_trade_history(&self, position_id: PositionId) -> Result<u64> {
        let conn = self.pool.get().await.map_err(AppError::from)?;
        let row = conn
            .query_one("SELECT COUNT(*) FROM trade_history WHERE position_id = $1", &[&position_id])
            .await?;
        Ok(row.get::<_, i64>(0) as u64)
    }

    async fn insert_price_log(&self, log: PriceLog) -> Result<()> {
        let conn = self.pool.get().await.map_err(AppError::from)?;
        conn.execute(
            r#"INSERT INTO price_logs (
                id, symbol, bid, ask, mid, spread, quote_timestamp, logged_at, expected_price,
                execution_price, slippage_pips, price_source, order_id, position_id
            ) VALUES ($1,$2,$3,$4,$5,$6,$7,$8,$9,$10,$11,$12,$13,$14)"#,
            &[
                &log.id, &log.symbol, &log.bid, &log.ask, &log.mid, &log.spread, &log.quote_timestamp,
                &log.logged_at, &log.expected_price, &log.execution_price, &log.slippage_pips,
                &enum_str(&log.price_source), &log.order_id, &log.position_id,
            ],
        )
        .await?;
        Ok(())
    }

    async fn get_or_create_wallet(&self, user_id: UserId) -> Result<Wallet> {
        let conn = self.pool.get().await.map_err(AppError::from)?;
        let row = conn
            .query_one(
                r#"INSERT INTO wallets (user_id) VALUES ($1)
                   ON CONFLICT (user_id) DO UPDATE SET user_id = EXCLUDED.user_id
                   RETURNING *"#,
                &[&user_id],
            )
            .await?;
        Ok(wallet_from_row(&row))
    }

    async fn apply_wallet_transaction(
        &self,
        user_id: UserId,
        amount: Decimal,
        transaction_type: WalletTransactionType,
        contest_id: Option<ContestId>,
        description: String,
    ) -> Result<WalletTransaction> {
        let mut conn = self.pool.get().await.map_err(AppError::from)?;
        let txn = conn.transaction().await?;

        txn.execute(
            "INSERT INTO wallets (user_id) VALUES ($1) ON CONFLICT (user_id) DO NOTHING",
            &[&user_id],
        )
        .await?;

        let wallet_row = txn
            .query_one("SELECT * FROM wallets WHERE user_id = $1 FOR UPDATE", &[&user_id])
            .await?;
        let wallet = wallet_from_row(&wallet_row);

        let balance_after = wallet.credit_balance + amount;
        if balance_after < Decimal::ZERO {
            return Err(AppError::InsufficientBalance {
                required: -amount,
                available: wallet.credit_balance,
            });
        }

        let spent_delta = match transaction_type {
            WalletTransactionType::CompetitionEntry | WalletTransactionType::ChallengeEntry => -amount,
            WalletTransactionType::Refund => amount,
            WalletTransactionType::PrizePayout => Decimal::ZERO,
        };
        let won_delta = match transaction_type {
            WalletTransactionType::PrizePayout => amount,
            _ => Decimal::ZERO,
        };

        txn.execute(
            r#"UPDATE wallets SET credit_balance = $2,
                total_spent_on_competitions = total_spent_on_competitions + $3,
                total_won_from_challenges = total_won_from_challenges + $4
            WHERE user_id = $1"#,
            &[&user_id, &balance_after, &spent_delta, &won_delta],
        )
        .await?;

        let id = Uuid::new_v4();
        let processed_at = Utc::now();
        txn.execute(
            r#"INSERT INTO wallet_transactions (
                id, user_id, transaction_type, amount, balance_before, balance_after, contest_id,
                description, processed_at
            ) VALUES ($1,$2,$3,$4,$5,$6,$7,$8,$9)"#,
            &[
                &id, &user_id, &enum_str(&transaction_type), &amount, &wallet.credit_balance,
                &balance_after, &contest_id, &description, &processed_at,
            ],
        )
        .await?;

        txn.commit().await?;

        Ok(WalletTransaction {
            id,
            user_id,
            transaction_type,
            amount,
            balance_before: wallet.credit_balance,
            balance_after,
            contest_id,
            description,
            processed_at,
        })
    }

    async fn list_wallet_transactions(&self, user_id: UserId) -> Result<Vec<WalletTransaction>> {
        let conn = self.pool.get().await.map_err(AppError::from)?;
        let rows = conn
            .query(
                "SELECT * FROM wallet_transactions WHERE user_id = $1 ORDER BY processed_at ASC",
                &[&user_id],
            )
            .await?;
        Ok(rows.iter().map(wallet_tx_from_row).collect())
    }

    async fn insert_platform_transaction(&self, tx: PlatformTransaction) -> Result<()> {
        let conn = self.pool.get().await.map_err(AppError::from)?;
        conn.execute(
            "INSERT INTO platform_transactions (id, contest_id, reason, amount, recorded_at) VALUES ($1,$2,$3,$4,$5)",
            &[&tx.id, &tx.contest_id, &enum_str(&tx.reason), &tx.amount, &tx.recorded_at],
        )
        .await?;
        Ok(())
    }

    async fn append_position_event(&self, event: PositionEvent) -> Result<()> {
        let conn = self.pool.get().await.map_err(AppError::from)?;
        conn.execute(
            r#"INSERT INTO position_events (id, event_type, user_id, contest_id, position_id, payload, created_at)
               VALUES ($1,$2,$3,$4,$5,$6,$7)"#,
            &[
                &event.id, &event.event_type, &event.user_id, &event.contest_id, &event.position_id,
                &event.payload, &event.created_at,
            ],
        )
        .await?;
        Ok(())
    }

    async fn append_notification_intent(&self, intent: NotificationIntent) -> Result<()> {
        let conn = self.pool.get().await.map_err(AppError::from)?;
        conn.execute(
            r#"INSERT INTO notification_intents (id, user_id, contest_id, kind, payload, created_at, acked_at)
               VALUES ($1,$2,$3,$4,$5,$6,$7)"#,
            &[
                &intent.id, &intent.user_id, &intent.contest_id, &intent.kind, &intent.payload,
                &intent.created_at, &intent.acked_at,
            ],
        )
        .await?;
        Ok(())
    }
}
