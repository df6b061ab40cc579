//! Shared domain enums and small value types used across the contest
//! trading core. Kept free of any engine logic so every module can depend
//! on it without creating cycles.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub type ContestId = Uuid;
pub type ParticipantId = Uuid;
pub type OrderId = Uuid;
pub type PositionId = Uuid;
pub type UserId = Uuid;

/// A competition has many participants; a challenge is strictly 1v1.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContestKind {
    Competition,
    Challenge,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContestStatus {
    Draft,
    Upcoming,
    Active,
    Completed,
    Cancelled,
    Expired,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParticipantStatus {
    Active,
    Completed,
    Disqualified,
    Liquidated,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderSide {
    Buy,
    Sell,
}

impl OrderSide {
    pub fn to_position_side(self) -> PositionSide {
        match self {
            OrderSide::Buy => PositionSide::Long,
            OrderSide::Sell => PositionSide::Short,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderType {
    Market,
    Limit,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    Pending,
    Filled,
    Cancelled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderSource {
    Web,
    System,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PositionSide {
    Long,
    Short,
}

impl PositionSide {
    pub fn sign(self) -> Decimal {
        match self {
            PositionSide::Long => Decimal::ONE,
            PositionSide::Short => -Decimal::ONE,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PositionStatus {
    Open,
    Closed,
    Liquidated,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CloseReason {
    User,
    StopLoss,
    TakeProfit,
    MarginCall,
    ChallengeEnd,
    CompetitionEnd,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RankingMethod {
    Pnl,
    Roi,
    TotalCapital,
    WinRate,
    TotalWins,
    ProfitFactor,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TieBreaker {
    TradesCount,
    WinRate,
    TotalCapital,
    Roi,
    JoinTime,
    SplitPrize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TiePrizeDistribution {
    SplitEqually,
    ChallengerWins,
    BothLose,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssetClass {
    Forex,
    Crypto,
    Stocks,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MarginStatus {
    Safe,
    Warning,
    MarginCall,
    Liquidation,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PriceSource {
    Rest,
    Ws,
    Cache,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WalletTransactionType {
    CompetitionEntry,
    ChallengeEntry,
    Refund,
    PrizePayout,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlatformTransactionReason {
    PlatformFee,
    UnclaimedPool,
    AllDisqualified,
}

/// The leverage band a contest allows and the default applied when an
/// order omits one.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct LeverageBand {
    pub min: Decimal,
    pub max: Decimal,
    pub default: Decimal,
}

/// One row of `{rank, percentage}` in a prize distribution table.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct PrizeShare {
    pub rank: u32,
    pub percentage: Decimal,
}

/// Per-contest risk limits, evaluated before every order placement when
/// `enabled` is true.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct RiskLimits {
    pub enabled: bool,
    pub max_drawdown_percent: Decimal,
    pub daily_loss_limit_percent: Decimal,
    pub equity_drawdown_percent: Decimal,
    pub equity_check_enabled: bool,
}

impl Default for RiskLimits {
    fn default() -> Self {
        Self {
            enabled: false,
            max_drawdown_percent: Decimal::ZERO,
            daily_loss_limit_percent: Decimal::ZERO,
            equity_drawdown_percent: Decimal::ZERO,
            equity_check_enabled: false,
        }
    }
}

/// Admin-configured margin-level thresholds (percent), ordered
/// `safe >= warning >= margin_call >= liquidation`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct MarginThresholds {
    pub safe: Decimal,
    pub warning: Decimal,
    pub margin_call: Decimal,
    pub liquidation: Decimal,
}

/// Standard lot size: 100,000 units of the base currency, used unless a
/// symbol-specific contract size is configured.
pub const DEFAULT_LOT_SIZE: i64 = 100_000;

pub fn now() -> DateTime<Utc> {
    Utc::now()
}
