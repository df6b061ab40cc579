//! Repository contract: every operation the engines need against persisted
//! state, expressed as a single async trait so `InMemoryRepository` (tests)
//! and `PostgresRepository` (production) are interchangeable behind
//! `Arc<dyn Repository>`.

use super::models::*;
use crate::error::Result;
use crate::types::*;
use async_trait::async_trait;

#[async_trait]
pub trait Repository: Send + Sync {
    async fn get_contest(&self, id: ContestId) -> Result<Option<Contest>>;
    async fn insert_contest(&self, contest: Contest) -> Result<()>;
    async fn update_contest(&self, contest: Contest) -> Result<()>;
    async fn list_contests_by_status(&self, status: ContestStatus) -> Result<Vec<Contest>>;
    async fn list_contests_near_start(&self) -> Result<Vec<Contest>>;

    async fn get_participant(&self, id: ParticipantId) -> Result<Option<Participant>>;
    async fn get_participant_by_user(
        &self,
        contest_id: ContestId,
        user_id: UserId,
    ) -> Result<Option<Participant>>;
    async fn insert_participant(&self, participant: Participant) -> Result<()>;
    async fn update_participant(&self, participant: Participant) -> Result<()>;
    async fn list_participants_by_contest(&self, contest_id: ContestId) -> Result<Vec<Participant>>;
    async fn list_active_participants(&self, contest_id: ContestId) -> Result<Vec<Participant>>;

    async fn get_order(&self, id: OrderId) -> Result<Option<Order>>;
    async fn insert_order(&self, order: Order) -> Result<()>;
    async fn update_order(&self, order: Order) -> Result<()>;
    async fn list_pending_limit_orders(&self, contest_id: ContestId) -> Result<Vec<Order>>;

    async fn get_position(&self, id: PositionId) -> Result<Option<Position>>;
    async fn insert_position(&self, position: Position) -> Result<()>;
    async fn update_position(&self, position: Position) -> Result<()>;
    async fn list_open_positions_by_contest(&self, contest_id: ContestId) -> Result<Vec<Position>>;
    async fn list_open_positions_by_participant(
        &self,
        participant_id: ParticipantId,
    ) -> Result<Vec<Position>>;

    async fn insert_trade_history(&self, trade: TradeHistory) -> Result<()>;
    async fn count_trade_history(&self, position_id: PositionId) -> Result<u64>;

    async fn insert_price_log(&self, log: PriceLog) -> Result<()>;

    async fn get_or_create_wallet(&self, user_id: UserId) -> Result<Wallet>;
    /// Transactional read-modify-write: applies `amount` (signed — positive
    /// credits, negative debits) and appends exactly one journal entry.
    async fn apply_wallet_transaction(
        &self,
        user_id: UserId,
        amount: rust_decimal::Decimal,
        transaction_type: WalletTransactionType,
        contest_id: Option<ContestId>,
        description: String,
    ) -> Result<WalletTransaction>;
    async fn list_wallet_transactions(&self, user_id: UserId) -> Result<Vec<WalletTransaction>>;

    async fn insert_platform_transaction(&self, tx: PlatformTransaction) -> Result<()>;

    async fn append_position_event(&self, event: PositionEvent) -> Result<()>;
    async fn append_notification_intent(&self, intent: NotificationIntent) -> Result<()>;
}
