//! Entity rows for the eleven logical tables. Every money/price/quantity
//! field is a `rust_decimal::Decimal`; every identity is a `uuid::Uuid`;
//! every timestamp is `chrono::DateTime<Utc>`.

use crate::types::*;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Contest {
    pub id: ContestId,
    pub slug: String,
    pub name: String,
    pub kind: ContestKind,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub accept_deadline: Option<DateTime<Utc>>,
    pub status: ContestStatus,
    pub entry_fee: Decimal,
    pub starting_capital: Decimal,
    pub prize_pool: Decimal,
    pub platform_fee_percentage: Decimal,
    pub platform_fee_amount: Decimal,
    pub winner_prize: Decimal,
    pub prize_distribution: Vec<PrizeShare>,
    pub min_participants: u32,
    pub max_participants: u32,
    pub current_participants: u32,
    pub allowed_asset_classes: Vec<AssetClass>,
    pub allowed_symbols: Vec<String>,
    pub blocked_symbols: Vec<String>,
    pub leverage: LeverageBand,
    pub max_open_positions: u32,
    pub max_position_size: Decimal,
    pub margin_call_threshold: Option<Decimal>,
    pub ranking_method: RankingMethod,
    pub tie_breaker1: Option<TieBreaker>,
    pub tie_breaker2: Option<TieBreaker>,
    pub minimum_trades: u32,
    pub tie_prize_distribution: TiePrizeDistribution,
    pub disqualify_on_liquidation: bool,
    pub risk_limits: RiskLimits,
    pub cancellation_reason: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Participant {
    pub id: ParticipantId,
    pub contest_id: ContestId,
    pub user_id: UserId,
    pub starting_capital: Decimal,
    pub current_capital: Decimal,
    pub available_capital: Decimal,
    pub used_margin: Decimal,
    pub realized_pnl: Decimal,
    pub unrealized_pnl: Decimal,
    pub pnl: Decimal,
    pub pnl_percentage: Decimal,
    pub total_trades: u32,
    pub winning_trades: u32,
    pub losing_trades: u32,
    pub win_rate: Decimal,
    pub average_win: Decimal,
    pub average_loss: Decimal,
    pub largest_win: Decimal,
    pub largest_loss: Decimal,
    pub current_open_positions: u32,
    pub status: ParticipantStatus,
    pub entered_at: DateTime<Utc>,
    pub disqualification_reason: Option<String>,
    pub liquidation_reason: Option<String>,
    pub prize_received: Option<Decimal>,
    pub is_winner: bool,
}

impl Participant {
    pub fn equity(&self) -> Decimal {
        self.current_capital + self.unrealized_pnl
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Order {
    pub id: OrderId,
    pub contest_id: ContestId,
    pub participant_id: ParticipantId,
    pub status: OrderStatus,
    pub side: OrderSide,
    pub order_type: OrderType,
    pub symbol: String,
    pub quantity: Decimal,
    pub requested_price: Option<Decimal>,
    pub executed_price: Option<Decimal>,
    pub stop_loss: Option<Decimal>,
    pub take_profit: Option<Decimal>,
    pub leverage: Decimal,
    pub margin_required: Decimal,
    pub placed_at: DateTime<Utc>,
    pub executed_at: Option<DateTime<Utc>>,
    pub cancelled_at: Option<DateTime<Utc>>,
    pub order_source: OrderSource,
    pub position_id: Option<PositionId>,
    pub cancel_reason: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Position {
    pub id: PositionId,
    pub contest_id: ContestId,
    pub participant_id: ParticipantId,
    pub status: PositionStatus,
    pub side: PositionSide,
    pub symbol: String,
    pub quantity: Decimal,
    pub entry_price: Decimal,
    pub current_price: Decimal,
    pub unrealized_pnl: Decimal,
    pub unrealized_pnl_percentage: Decimal,
    pub leverage: Decimal,
    pub margin_used: Decimal,
    pub stop_loss: Option<Decimal>,
    pub take_profit: Option<Decimal>,
    pub open_order_id: OrderId,
    pub close_order_id: Option<OrderId>,
    pub opened_at: DateTime<Utc>,
    pub closed_at: Option<DateTime<Utc>>,
    pub last_price_update: DateTime<Utc>,
    pub price_update_count: u64,
    pub holding_time_seconds: Option<i64>,
    pub close_reason: Option<CloseReason>,
}

impl Position {
    pub fn maintenance_margin(&self) -> Decimal {
        self.margin_used / Decimal::TWO
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TradeHistory {
    pub id: Uuid,
    pub contest_id: ContestId,
    pub participant_id: ParticipantId,
    pub position_id: PositionId,
    pub symbol: String,
    pub side: PositionSide,
    pub quantity: Decimal,
    pub entry_price: Decimal,
    pub exit_price: Decimal,
    pub price_change: Decimal,
    pub price_change_percentage: Decimal,
    pub realized_pnl: Decimal,
    pub realized_pnl_percentage: Decimal,
    pub holding_time_seconds: i64,
    pub close_reason: CloseReason,
    pub is_winner: bool,
    pub closed_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PriceLog {
    pub id: Uuid,
    pub symbol: String,
    pub bid: Decimal,
    pub ask: Decimal,
    pub mid: Decimal,
    pub spread: Decimal,
    pub quote_timestamp: DateTime<Utc>,
    pub logged_at: DateTime<Utc>,
    pub expected_price: Option<Decimal>,
    pub execution_price: Decimal,
    pub slippage_pips: Decimal,
    pub price_source: PriceSource,
    pub order_id: Option<OrderId>,
    pub position_id: Option<PositionId>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Wallet {
    pub user_id: UserId,
    pub credit_balance: Decimal,
    pub total_spent_on_competitions: Decimal,
    pub total_won_from_challenges: Decimal,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WalletTransaction {
    pub id: Uuid,
    pub user_id: UserId,
    pub transaction_type: WalletTransactionType,
    pub amount: Decimal,
    pub balance_before: Decimal,
    pub balance_after: Decimal,
    pub contest_id: Option<ContestId>,
    pub description: String,
    pub processed_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlatformTransaction {
    pub id: Uuid,
    pub contest_id: ContestId,
    pub reason: PlatformTransactionReason,
    pub amount: Decimal,
    pub recorded_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PositionEvent {
    pub id: Uuid,
    pub event_type: String,
    pub user_id: UserId,
    pub contest_id: ContestId,
    pub position_id: Option<PositionId>,
    pub payload: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationIntent {
    pub id: Uuid,
    pub user_id: UserId,
    pub contest_id: Option<ContestId>,
    pub kind: String,
    pub payload: serde_json::Value,
    pub created_at: DateTime<Utc>,
    pub acked_at: Option<DateTime<Utc>>,
}
