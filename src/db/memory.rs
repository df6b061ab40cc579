//! In-memory repository used by tests and by local development without a
//! Postgres instance. Guards every table behind its own `tokio::sync::Mutex`
//! so the wallet read-modify-write stays linearizable per user without
//! locking unrelated tables.

use super::models::*;
use super::repository::Repository;
use crate::error::{AppError, Result};
use crate::types::*;
use async_trait::async_trait;
use chrono::Utc;
use rust_decimal::Decimal;
use std::collections::HashMap;
use tokio::sync::Mutex;
use uuid::Uuid;

#[derive(Default)]
pub struct InMemoryRepository {
    contests: Mutex<HashMap<ContestId, Contest>>,
    participants: Mutex<HashMap<ParticipantId, Participant>>,
    orders: Mutex<HashMap<OrderId, Order>>,
    positions: Mutex<HashMap<PositionId, Position>>,
    trade_history: Mutex<Vec<TradeHistory>>,
    price_logs: Mutex<Vec<PriceLog>>,
    wallets: Mutex<HashMap<UserId, Wallet>>,
    wallet_transactions: Mutex<Vec<WalletTransaction>>,
    platform_transactions: Mutex<Vec<PlatformTransaction>>,
    position_events: Mutex<Vec<PositionEvent>>,
    notification_intents: Mutex<Vec<NotificationIntent>>,
}

impl InMemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Repository for InMemoryRepository {
    async fn get_contest(&self, id: ContestId) -> Result<Option<Contest>> {
        Ok(self.contests.lock().await.get(&id).cloned())
    }

    async fn insert_contest(&self, contest: Contest) -> Result<()> {
        self.contests.lock().await.insert(contest.id, contest);
        Ok(())
    }

    async fn update_contest(&self, contest: Contest) -> Result<()> {
        let mut table = self.contests.lock().await;
        if !table.contains_key(&contest.id) {
            return Err(AppError::NotFound("contest not found".to_string()));
        }
        table.insert(contest.id, contest);
        Ok(())
    }

    async fn list_contests_by_status(&self, status: ContestStatus) -> Result<Vec<Contest>> {
        Ok(self.contests.lock().await.values().filter(|c| c.status == status).cloned().collect())
    }

    async fn list_contests_near_start(&self) -> Result<Vec<Contest>> {
        let now = Utc::now();
        Ok(self
            .contests
            .lock()
            .await
            .values()
            .filter(|c| c.status == ContestStatus::Upcoming && c.start_time <= now)
            .cloned()
            .collect())
    }

    async fn get_participant(&self, id: ParticipantId) -> Result<Option<Participant>> {
        Ok(self.participants.lock().await.get(&id).cloned())
    }

    async fn get_participant_by_user(
        &self,
        contest_id: ContestId,
        user_id: UserId,
    ) -> Result<Option<Participant>> {
        Ok(self
            .participants
            .lock()
            .await
            .values()
            .find(|p| p.contest_id == contest_id && p.user_id == user_id)
            .cloned())
    }

    async fn insert_participant(&self, participant: Participant) -> Result<()> {
        self.participants.lock().await.insert(participant.id, participant);
        Ok(())
    }

    async fn update_participant(&self, participant: Participant) -> Result<()> {
        let mut table = self.participants.lock().await;
        if !table.contains_key(&participant.id) {
            return Err(AppError::NotFound("participant not found".to_string()));
        }
        table.insert(participant.id, participant);
        Ok(())
    }

    async fn list_participants_by_contest(&self, contest_id: ContestId) -> Result<Vec<Participant>> {
        Ok(self
            .participants
            .lock()
            .await
            .values()
            .filter(|p| p.contest_id == contest_id)
            .cloned()
            .collect())
    }

    async fn list_active_participants(&self, contest_id: ContestId) -> Result<Vec<Participant>> {
        Ok(self
            .participants
            .lock()
            .await
            .values()
            .filter(|p| p.contest_id == contest_id && p.status == ParticipantStatus::Active)
            .cloned()
            .collect())
    }

    async fn get_order(&self, id: OrderId) -> Result<Option<Order>> {
        Ok(self.orders.lock().await.get(&id).cloned())
    }

    async fn insert_order(&self, order: Order) -> Result<()> {
        self.orders.lock().await.insert(order.id, order);
        Ok(())
    }

    async fn update_order(&self, order: Order) -> Result<()> {
        let mut table = self.orders.lock().await;
        if !table.contains_key(&order.id) {
            return Err(AppError::NotFound("order not found".to_string()));
        }
        table.insert(order.id, order);
        Ok(())
    }

    async fn list_pending_limit_orders(&self, contest_id: ContestId) -> Result<Vec<Order>> {
        let mut orders: Vec<Order> = self
            .orders
            .lock()
            .await
            .values()
            .filter(|o| {
                o.contest_id == contest_id && o.status == OrderStatus::Pending && o.order_type == OrderType::Limit
            })
            .cloned()
            .collect();
        orders.sort_by_key(|o| o.placed_at);
        Ok(orders)
    }

    async fn get_position(&self, id: PositionId) -> Result<Option<Position>> {
        Ok(self.positions.lock().await.get(&id).cloned())
    }

    async fn insert_position(&self, position: Position) -> Result<()> {
        self.positions.lock().await.insert(position.id, position);
        Ok(())
    }

    async fn update_position(&self, position: Position) -> Result<()> {
        let mut table = self.positions.lock().await;
        let Some(existing) = table.get(&position.id) else {
            return Err(AppError::NotFound("position not found".to_string()));
        };
        // Enforces the at-most-one-close invariant: once closed, a position
        // can never transition again.
        if existing.status != PositionStatus::Open && position.status != existing.status {
            return Err(AppError::PositionNotOpen);
        }
        table.insert(position.id, position);
        Ok(())
    }

    async fn list_open_positions_by_contest(&self, contest_id: ContestId) -> Result<Vec<Position>> {
        Ok(self
            .positions
            .lock()
            .await
            .values()
            .filter(|p| p.contest_id == contest_id && p.status == PositionStatus::Open)
            .cloned()
            .collect())
    }

    async fn list_open_positions_by_participant(
        &self,
        participant_id: ParticipantId,
    ) -> Result<Vec<Position>> {
        Ok(self
            .positions
            .lock()
            .await
            .values()
            .filter(|p| p.participant_id == participant_id && p.status == PositionStatus::Open)
            .cloned()
            .collect())
    }

    async fn insert_trade_history(&self, trade: TradeHistory) -> Result<()> {
        self.trade_history.lock().await.push(trade);
        Ok(())
    }

    async fn count_trade_history(&self, position_id: PositionId) -> Result<u64> {
        Ok(self.trade_history.lock().await.iter().filter(|t| t.position_id == position_id).count() as u64)
    }

    async fn insert_price_log(&self, log: PriceLog) -> Result<()> {
        self.price_logs.lock().await.push(log);
        Ok(())
    }

    async fn get_or_create_wallet(&self, user_id: UserId) -> Result<Wallet> {
        let mut wallets = self.wallets.lock().await;
        Ok(wallets
            .entry(user_id)
            .or_insert_with(|| Wallet {
                user_id,
                credit_balance: Decimal::ZERO,
                total_spent_on_competitions: Decimal::ZERO,
                total_won_from_challenges: Decimal::ZERO,
            })
            .clone())
    }

    async fn apply_wallet_transaction(
        &self,
        user_id: UserId,
        amount: Decimal,
        transaction_type: WalletTransactionType,
        contest_id: Option<ContestId>,
        description: String,
    ) -> Result<WalletTransaction> {
        let mut wallets = self.wallets.lock().await;
        let wallet = wallets.entry(user_id).or_insert_with(|| Wallet {
            user_id,
            credit_balance: Decimal::ZERO,
            total_spent_on_competitions: Decimal::ZERO,
            total_won_from_challenges: Decimal::ZERO,
        });

        let balance_before = wallet.credit_balance;
        let balance_after = balance_before + amount;
        if balance_after < Decimal::ZERO {
            return Err(AppError::InsufficientBalance { required: -amount, available: balance_before });
        }

        wallet.credit_balance = balance_after;
        match transaction_type {
            WalletTransactionType::CompetitionEntry | WalletTransactionType::ChallengeEntry => {
                wallet.total_spent_on_competitions += -amount;
            }
            WalletTransactionType::PrizePayout => {
                wallet.total_won_from_challenges += amount;
            }
            WalletTransactionType::Refund => {
                wallet.total_spent_on_competitions += amount;
            }
        }

        let tx = WalletTransaction {
            id: Uuid::new_v4(),
            user_id,
            transaction_type,
            amount,
            balance_before,
            balance_after,
            contest_id,
            description,
            processed_at: Utc::now(),
        };
        self.wallet_transactions.lock().await.push(tx.clone());
        Ok(tx)
    }

    async fn list_wallet_transactions(&self, user_id: UserId) -> Result<Vec<WalletTransaction>> {
        Ok(self
            .wallet_transactions
            .lock()
            .await
            .iter()
            .filter(|t| t.user_id == user_id)
            .cloned()
            .collect())
    }

    async fn insert_platform_transaction(&self, tx: PlatformTransaction) -> Result<()> {
        self.platform_transactions.lock().await.push(tx);
        Ok(())
    }

    async fn append_position_event(&self, event: PositionEvent) -> Result<()> {
        self.position_events.lock().await.push(event);
        Ok(())
    }

    async fn append_notification_intent(&self, intent: NotificationIntent) -> Result<()> {
        self.notification_intents.lock().await.push(intent);
        Ok(())
    }
}
