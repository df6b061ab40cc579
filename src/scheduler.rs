//! Background scheduler: one periodic `tokio::spawn` loop per scan kind.
//! Each tick is wrapped in `tokio::time::timeout` against its configured
//! deadline; a timed-out or failed tick is logged and the loop continues —
//! a stalled scan for one contest never blocks the others.

use crate::config::SchedulerConfig;
use crate::contest_lifecycle::ContestLifecycle;
use crate::db::Repository;
use crate::error::Result;
use crate::order_engine::OrderEngine;
use crate::position_engine::PositionEngine;
use crate::types::{ContestId, ContestKind, ContestStatus};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;

/// Per-contest keyed mutex so scans for the same contest never overlap —
/// two concurrent automatic closes on the same contest would otherwise
/// race. Scans for different contests still run in parallel.
#[derive(Default)]
pub struct ContestLocks {
    locks: Mutex<HashMap<ContestId, Arc<Mutex<()>>>>,
}

impl ContestLocks {
    pub fn new() -> Self {
        Self::default()
    }

    async fn lock_for(&self, contest_id: ContestId) -> Arc<Mutex<()>> {
        let mut table = self.locks.lock().await;
        table.entry(contest_id).or_insert_with(|| Arc::new(Mutex::new(()))).clone()
    }
}

pub struct Scheduler {
    repo: Arc<dyn Repository>,
    orders: Arc<OrderEngine>,
    positions: Arc<PositionEngine>,
    lifecycle: Arc<ContestLifecycle>,
    locks: Arc<ContestLocks>,
    config: SchedulerConfig,
}

async fn active_contest_ids(repo: &dyn Repository, scan_name: &str) -> Vec<ContestId> {
    match repo.list_contests_by_status(ContestStatus::Active).await {
        Ok(contests) => contests.into_iter().map(|c| c.id).collect(),
        Err(e) => {
            tracing::warn!(error = %e, scan = scan_name, "failed to list active contests for scan");
            Vec::new()
        }
    }
}

fn log_tick_outcome(scan_name: &str, contest_id: ContestId, outcome: std::result::Result<Result<()>, tokio::time::error::Elapsed>) {
    match outcome {
        Ok(Ok(())) => {}
        Ok(Err(e)) => tracing::warn!(%contest_id, error = %e, scan = scan_name, "scan tick failed"),
        Err(_) => tracing::warn!(%contest_id, scan = scan_name, "scan tick timed out"),
    }
}

impl Scheduler {
    pub fn new(
        repo: Arc<dyn Repository>,
        orders: Arc<OrderEngine>,
        positions: Arc<PositionEngine>,
        lifecycle: Arc<ContestLifecycle>,
        config: SchedulerConfig,
    ) -> Self {
        Self { repo, orders, positions, lifecycle, locks: Arc::new(ContestLocks::new()), config }
    }

    /// Spawns every periodic scan and returns their join handles so the
    /// caller can hold or abort them on shutdown.
    pub fn spawn_all(self: &Arc<Self>) -> Vec<JoinHandle<()>> {
        vec![
            self.clone().spawn_revaluation(),
            self.clone().spawn_stop_loss_take_profit(),
            self.clone().spawn_margin_calls(),
            self.clone().spawn_limit_orders(),
            self.clone().spawn_finalization(),
            self.clone().spawn_challenge_expiry(),
            self.clone().spawn_auto_start(),
        ]
    }

    fn spawn_revaluation(self: Arc<Self>) -> JoinHandle<()> {
        let deadline = Duration::from_millis(self.config.oracle_deadline_ms);
        let period = Duration::from_secs(self.config.revaluation_interval_seconds.max(1));
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            loop {
                ticker.tick().await;
                for contest_id in active_contest_ids(self.repo.as_ref(), "revaluation").await {
                    let guard = self.locks.lock_for(contest_id).await;
                    let _permit = guard.lock().await;
                    let outcome = tokio::time::timeout(deadline, self.positions.update_all_positions_pnl(contest_id)).await;
                    log_tick_outcome("revaluation", contest_id, outcome);
                }
            }
        })
    }

    fn spawn_stop_loss_take_profit(self: Arc<Self>) -> JoinHandle<()> {
        let deadline = Duration::from_millis(self.config.oracle_deadline_ms);
        let period = Duration::from_secs(self.config.tpsl_scan_interval_seconds.max(1));
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            loop {
                ticker.tick().await;
                for contest_id in active_contest_ids(self.repo.as_ref(), "tpsl_scan").await {
                    let guard = self.locks.lock_for(contest_id).await;
                    let _permit = guard.lock().await;
                    let outcome = tokio::time::timeout(deadline, self.positions.check_stop_loss_take_profit(contest_id))
                        .await
                        .map(|r| r.map(|_| ()));
                    log_tick_outcome("tpsl_scan", contest_id, outcome);
                }
            }
        })
    }

    fn spawn_margin_calls(self: Arc<Self>) -> JoinHandle<()> {
        let deadline = Duration::from_millis(self.config.oracle_deadline_ms);
        let period = Duration::from_secs(self.config.margin_scan_interval_seconds.max(1));
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            loop {
                ticker.tick().await;
                for contest_id in active_contest_ids(self.repo.as_ref(), "margin_scan").await {
                    let guard = self.locks.lock_for(contest_id).await;
                    let _permit = guard.lock().await;
                    let outcome = tokio::time::timeout(deadline, self.positions.check_margin_calls(contest_id))
                        .await
                        .map(|r| r.map(|_| ()));
                    log_tick_outcome("margin_scan", contest_id, outcome);
                }
            }
        })
    }

    fn spawn_limit_orders(self: Arc<Self>) -> JoinHandle<()> {
        let deadline = Duration::from_millis(self.config.oracle_deadline_ms);
        let period = Duration::from_secs(self.config.limit_order_scan_interval_seconds.max(1));
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            loop {
                ticker.tick().await;
                for contest_id in active_contest_ids(self.repo.as_ref(), "limit_order_scan").await {
                    let guard = self.locks.lock_for(contest_id).await;
                    let _permit = guard.lock().await;
                    let outcome = tokio::time::timeout(deadline, self.orders.scan_limit_orders(contest_id))
                        .await
                        .map(|r| r.map(|_| ()));
                    log_tick_outcome("limit_order_scan", contest_id, outcome);
                }
            }
        })
    }

    fn spawn_finalization(self: Arc<Self>) -> JoinHandle<()> {
        let deadline = Duration::from_millis(self.config.db_timeout_ms);
        let period = Duration::from_secs(self.config.finalization_scan_interval_seconds.max(1));
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            loop {
                ticker.tick().await;
                for contest_id in active_contest_ids(self.repo.as_ref(), "finalization_scan").await {
                    let guard = self.locks.lock_for(contest_id).await;
                    let _permit = guard.lock().await;
                    let outcome = tokio::time::timeout(deadline, self.finalize_if_ended(contest_id)).await;
                    log_tick_outcome("finalization_scan", contest_id, outcome);
                }
            }
        })
    }

    async fn finalize_if_ended(&self, contest_id: ContestId) -> Result<()> {
        let Some(contest) = self.repo.get_contest(contest_id).await? else { return Ok(()) };
        if chrono::Utc::now() < contest.end_time {
            return Ok(());
        }
        match contest.kind {
            ContestKind::Competition => self.lifecycle.finalize_competition(contest_id).await,
            ContestKind::Challenge => self.lifecycle.finalize_challenge(contest_id).await,
        }
    }

    fn spawn_challenge_expiry(self: Arc<Self>) -> JoinHandle<()> {
        let deadline = Duration::from_millis(self.config.db_timeout_ms);
        let period = Duration::from_secs(self.config.challenge_expiry_scan_interval_seconds.max(1));
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            loop {
                ticker.tick().await;
                match tokio::time::timeout(deadline, self.lifecycle.expire_pending_challenges()).await {
                    Ok(Ok(())) => {}
                    Ok(Err(e)) => tracing::warn!(error = %e, scan = "challenge_expiry", "scan tick failed"),
                    Err(_) => tracing::warn!(scan = "challenge_expiry", "scan tick timed out"),
                }
            }
        })
    }

    fn spawn_auto_start(self: Arc<Self>) -> JoinHandle<()> {
        let deadline = Duration::from_millis(self.config.db_timeout_ms);
        let period = Duration::from_secs(self.config.auto_start_scan_interval_seconds.max(1));
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            loop {
                ticker.tick().await;
                let Ok(near_start) = self.repo.list_contests_near_start().await else { continue };
                for contest in near_start {
                    let contest_id = contest.id;
                    let guard = self.locks.lock_for(contest_id).await;
                    let _permit = guard.lock().await;
                    let outcome = tokio::time::timeout(deadline, self.lifecycle.auto_start_or_cancel(contest_id)).await;
                    log_tick_outcome("auto_start", contest_id, outcome);
                }
            }
        })
    }
}
