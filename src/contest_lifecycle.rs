//! Contest lifecycle manager: join, auto-start/auto-cancel, cancellation
//! with refunds, ranking, and finalization (competition and challenge).

use crate::db::models::{Contest, Participant, PlatformTransaction};
use crate::db::Repository;
use crate::error::{AppError, Result};
use crate::events::EventSink;
use crate::ledger::WalletLedger;
use crate::oracle::PriceOracle;
use crate::position_engine::PositionEngine;
use crate::restrictions::{RestrictedAction, RestrictionsService};
use crate::types::*;
use chrono::Utc;
use rust_decimal::Decimal;
use serde_json::json;
use std::sync::Arc;
use uuid::Uuid;

const TIE_EPSILON: &str = "0.001";

#[derive(Debug, Clone)]
pub struct RankedParticipant {
    pub participant_id: ParticipantId,
    pub rank: u32,
    pub metric: Decimal,
    pub is_tied: bool,
    pub tied_with: Vec<ParticipantId>,
    pub disqualified: bool,
    pub disqualification_reason: Option<String>,
}

pub struct ContestLifecycle {
    repo: Arc<dyn Repository>,
    ledger: Arc<WalletLedger>,
    positions: Arc<PositionEngine>,
    oracle: Arc<dyn PriceOracle>,
    restrictions: Arc<dyn RestrictionsService>,
    events: Arc<dyn EventSink>,
}

impl ContestLifecycle {
    pub fn new(
        repo: Arc<dyn Repository>,
        ledger: Arc<WalletLedger>,
        positions: Arc<PositionEngine>,
        oracle: Arc<dyn PriceOracle>,
        restrictions: Arc<dyn RestrictionsService>,
        events: Arc<dyn EventSink>,
    ) -> Self {
        Self { repo, ledger, positions, oracle, restrictions, events }
    }

    async fn join(&self, contest_id: ContestId, user_id: UserId) -> Result<Participant> {
        let check = self.restrictions.can_user_perform_action(user_id, RestrictedAction::EnterCompetition).await;
        if !check.allowed {
            return Err(AppError::Forbidden(check.reason.unwrap_or_else(|| "entry restricted".to_string())));
        }

        let mut contest = self.repo.get_contest(contest_id).await?.ok_or_else(|| AppError::NotFound("contest not found".to_string()))?;
        if !matches!(contest.status, ContestStatus::Upcoming | ContestStatus::Active) {
            return Err(AppError::ContestNotActive);
        }
        if contest.current_participants >= contest.max_participants {
            return Err(AppError::ContestFull);
        }
        if self.repo.get_participant_by_user(contest_id, user_id).await?.is_some() {
            return Err(AppError::AlreadyJoined);
        }

        let tx_kind = match contest.kind {
            ContestKind::Competition => WalletTransactionType::CompetitionEntry,
            ContestKind::Challenge => WalletTransactionType::ChallengeEntry,
        };
        self.ledger.debit_for_entry(user_id, contest_id, contest.entry_fee, tx_kind).await?;

        let now = Utc::now();
        let participant = Participant {
            id: Uuid::new_v4(),
            contest_id,
            user_id,
            starting_capital: contest.starting_capital,
            current_capital: contest.starting_capital,
            available_capital: contest.starting_capital,
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
            entered_at: now,
            disqualification_reason: None,
            liquidation_reason: None,
            prize_received: None,
            is_winner: false,
        };
        self.repo.insert_participant(participant.clone()).await?;

        contest.current_participants += 1;
        contest.prize_pool += contest.entry_fee;
        self.repo.update_contest(contest.clone()).await?;

        self.events
            .emit_notification(user_id, Some(contest_id), "contest_joined", json!({ "participant_id": participant.id }))
            .await;

        Ok(participant)
    }

    pub async fn enter_competition(&self, contest_id: ContestId, user_id: UserId) -> Result<Participant> {
        let contest = self.repo.get_contest(contest_id).await?.ok_or_else(|| AppError::NotFound("contest not found".to_string()))?;
        if contest.kind != ContestKind::Competition {
            return Err(AppError::Validation("not a competition".to_string()));
        }
        self.join(contest_id, user_id).await
    }

    pub async fn accept_challenge(&self, contest_id: ContestId, user_id: UserId) -> Result<Participant> {
        let contest = self.repo.get_contest(contest_id).await?.ok_or_else(|| AppError::NotFound("contest not found".to_string()))?;
        if contest.kind != ContestKind::Challenge {
            return Err(AppError::Validation("not a challenge".to_string()));
        }
        if let Some(deadline) = contest.accept_deadline {
            if Utc::now() >= deadline {
                return Err(AppError::ContestNotActive);
            }
        }
        self.join(contest_id, user_id).await
    }

    /// Runs the auto-start-vs-auto-cancel decision for one contest at its
    /// boundary. Safe to call both from the scheduler and lazily on read.
    pub async fn auto_start_or_cancel(&self, contest_id: ContestId) -> Result<()> {
        let mut contest = self.repo.get_contest(contest_id).await?.ok_or_else(|| AppError::NotFound("contest not found".to_string()))?;
        if contest.status != ContestStatus::Upcoming {
            return Ok(());
        }
        if contest.current_participants >= contest.min_participants {
            contest.status = ContestStatus::Active;
            self.repo.update_contest(contest).await?;
        } else {
            self.cancel_competition_and_refund(contest_id, "minimum participants not reached by start time").await?;
        }
        Ok(())
    }

    /// Refunds every participant's entry fee and transitions the contest to
    /// `cancelled`. Idempotent: a contest already cancelled produces no
    /// additional wallet transactions (testable property #8).
    pub async fn cancel_competition_and_refund(&self, contest_id: ContestId, reason: &str) -> Result<()> {
        let mut contest = self.repo.get_contest(contest_id).await?.ok_or_else(|| AppError::NotFound("contest not found".to_string()))?;
        if contest.status == ContestStatus::Cancelled {
            return Ok(());
        }
        if !matches!(contest.status, ContestStatus::Upcoming | ContestStatus::Active) {
            return Err(AppError::Validation("contest cannot be cancelled from its current status".to_string()));
        }

        let participants = self.repo.list_participants_by_contest(contest_id).await?;
        for participant in participants {
            self.ledger.refund(participant.user_id, contest_id, contest.entry_fee).await?;
            self.events
                .emit_notification(participant.user_id, Some(contest_id), "contest_cancelled", json!({}))
                .await;
        }

        contest.status = ContestStatus::Cancelled;
        contest.cancellation_reason = Some(reason.to_string());
        self.repo.update_contest(contest).await?;
        Ok(())
    }

    /// A challenge in `upcoming` whose accept deadline has passed, without
    /// having reached `active`, expires without any ledger effect (the entry
    /// fee is only deducted at acceptance, never at creation).
    pub async fn expire_pending_challenges(&self) -> Result<()> {
        let now = Utc::now();
        let upcoming = self.repo.list_contests_by_status(ContestStatus::Upcoming).await?;
        for mut contest in upcoming {
            if contest.kind != ContestKind::Challenge {
                continue;
            }
            if contest.accept_deadline.is_some_and(|d| d < now) {
                contest.status = ContestStatus::Expired;
                if let Err(e) = self.repo.update_contest(contest).await {
                    tracing::warn!(error = %e, "failed to expire pending challenge");
                }
            }
        }
        Ok(())
    }

    fn primary_metric(method: RankingMethod, p: &Participant) -> Decimal {
        match method {
            RankingMethod::Pnl => p.pnl,
            RankingMethod::Roi => p.pnl_percentage,
            RankingMethod::TotalCapital => p.current_capital,
            RankingMethod::WinRate => p.win_rate,
            RankingMethod::TotalWins => Decimal::from(p.winning_trades),
            RankingMethod::ProfitFactor => {
                if p.losing_trades == 0 {
                    if p.winning_trades > 0 { Decimal::from(9999) } else { Decimal::ZERO }
                } else {
                    Decimal::from(p.winning_trades) / Decimal::from(p.losing_trades)
                }
            }
        }
    }

    /// Tie-breaker metrics are normalized so "descending" always means
    /// "better", matching the primary-metric sort direction.
    fn tie_metric(breaker: TieBreaker, p: &Participant) -> Option<Decimal> {
        match breaker {
            TieBreaker::TradesCount => Some(-Decimal::from(p.total_trades)),
            TieBreaker::WinRate => Some(p.win_rate),
            TieBreaker::TotalCapital => Some(p.current_capital),
            TieBreaker::Roi => Some(p.pnl_percentage),
            TieBreaker::JoinTime => Some(-Decimal::from(p.entered_at.timestamp())),
            TieBreaker::SplitPrize => None,
        }
    }

    fn cluster_by_epsilon(sorted: Vec<(Participant, Decimal)>) -> Vec<Vec<(Participant, Decimal)>> {
        let epsilon: Decimal = TIE_EPSILON.parse().unwrap();
        let mut groups: Vec<Vec<(Participant, Decimal)>> = Vec::new();
        for item in sorted {
            let starts_new_group = match groups.last() {
                Some(group) => (group[0].1 - item.1).abs() > epsilon,
                None => true,
            };
            if starts_new_group {
                groups.push(vec![item]);
            } else {
                groups.last_mut().unwrap().push(item);
            }
        }
        groups
    }

    fn apply_tiebreak(groups: Vec<Vec<(Participant, Decimal)>>, breaker: TieBreaker) -> Vec<Vec<(Participant, Decimal)>> {
        groups
            .into_iter()
            .flat_map(|g| {
                if g.len() <= 1 {
                    return vec![g];
                }
                let Some(_) = Self::tie_metric(breaker, &g[0].0) else {
                    return vec![g];
                };
                let mut items: Vec<(Participant, Decimal)> =
                    g.into_iter().map(|(p, _)| (p.clone(), Self::tie_metric(breaker, &p).unwrap())).collect();
                items.sort_by(|a, b| b.1.cmp(&a.1));
                Self::cluster_by_epsilon(items)
            })
            .collect()
    }

    /// Deterministic ranking: same participants and rules always produce
    /// identical ranks, tie groups, and qualification status (testable
    /// property #6). The minimum-trade filter is applied only when
    /// `apply_minimum_trades` is set (finalization), never for a live
    /// leaderboard read.
    pub fn calculate_rankings(
        &self,
        participants: Vec<Participant>,
        contest: &Contest,
        apply_minimum_trades: bool,
    ) -> Vec<RankedParticipant> {
        let (qualified, disqualified): (Vec<Participant>, Vec<Participant>) = if apply_minimum_trades {
            participants.into_iter().partition(|p| p.total_trades >= contest.minimum_trades)
        } else {
            (participants, Vec::new())
        };

        let mut sorted: Vec<(Participant, Decimal)> =
            qualified.into_iter().map(|p| (p.clone(), Self::primary_metric(contest.ranking_method, &p))).collect();
        sorted.sort_by(|a, b| b.1.cmp(&a.1));

        let mut groups = Self::cluster_by_epsilon(sorted);
        if let Some(b1) = contest.tie_breaker1 {
            groups = Self::apply_tiebreak(groups, b1);
        }
        if let Some(b2) = contest.tie_breaker2 {
            groups = Self::apply_tiebreak(groups, b2);
        }

        let mut ranked = Vec::new();
        let mut rank = 1u32;
        for group in groups {
            let ids: Vec<ParticipantId> = group.iter().map(|(p, _)| p.id).collect();
            let is_tied = group.len() > 1;
            for (p, metric) in &group {
                ranked.push(RankedParticipant {
                    participant_id: p.id,
                    rank,
                    metric: *metric,
                    is_tied,
                    tied_with: if is_tied { ids.iter().copied().filter(|id| *id != p.id).collect() } else { Vec::new() },
                    disqualified: false,
                    disqualification_reason: None,
                });
            }
            rank += group.len() as u32;
        }

        let mut sorted_dq: Vec<(Participant, Decimal)> =
            disqualified.into_iter().map(|p| (p.clone(), Self::primary_metric(contest.ranking_method, &p))).collect();
        sorted_dq.sort_by(|a, b| b.1.cmp(&a.1));
        for (p, metric) in sorted_dq {
            ranked.push(RankedParticipant {
                participant_id: p.id,
                rank,
                metric,
                is_tied: false,
                tied_with: Vec::new(),
                disqualified: true,
                disqualification_reason: Some(format!(
                    "fewer than {} required trades",
                    contest.minimum_trades
                )),
            });
            rank += 1;
        }

        ranked
    }

    async fn close_all_open_positions(&self, contest_id: ContestId, reason: CloseReason) -> Result<()> {
        let positions = self.repo.list_open_positions_by_contest(contest_id).await?;
        for position in positions {
            let quote = match self.oracle.quote(&position.symbol).await {
                Ok(q) => q,
                Err(e) => {
                    tracing::warn!(position_id = %position.id, error = %e, "could not fetch quote to close position at finalization");
                    continue;
                }
            };
            if let Err(e) = self.positions.close_position_automatic(position.id, reason, &quote).await {
                tracing::warn!(position_id = %position.id, error = %e, "failed to close position at finalization");
            }
        }
        Ok(())
    }

    /// Only valid when `status=active` and `now >= endTime`.
    pub async fn finalize_competition(&self, contest_id: ContestId) -> Result<()> {
        let mut contest = self.repo.get_contest(contest_id).await?.ok_or_else(|| AppError::NotFound("contest not found".to_string()))?;
        if contest.status != ContestStatus::Active || Utc::now() < contest.end_time {
            return Err(AppError::ContestNotActive);
        }

        self.close_all_open_positions(contest_id, CloseReason::CompetitionEnd).await?;

        let participants = self.repo.list_participants_by_contest(contest_id).await?;
        let all_disqualified = !participants.is_empty()
            && participants.iter().all(|p| p.total_trades < contest.minimum_trades);
        let ranked = self.calculate_rankings(participants.clone(), &contest, true);

        let platform_fee_amount = (contest.prize_pool * contest.platform_fee_percentage / Decimal::ONE_HUNDRED).floor();
        let distributable = contest.prize_pool - platform_fee_amount;

        let mut unclaimed = Decimal::ZERO;
        for share in contest.prize_distribution.clone() {
            let amount = (distributable * share.percentage / Decimal::ONE_HUNDRED).floor();
            let winner = ranked.iter().find(|r| r.rank == share.rank && !r.disqualified);
            match winner {
                Some(r) => {
                    if let Some(mut p) = participants.iter().find(|p| p.id == r.participant_id).cloned() {
                        self.ledger.pay_prize(p.user_id, contest_id, amount).await?;
                        p.prize_received = Some(p.prize_received.unwrap_or(Decimal::ZERO) + amount);
                        p.is_winner = true;
                        p.status = ParticipantStatus::Completed;
                        self.repo.update_participant(p.clone()).await?;
                        self.events.emit_notification(p.user_id, Some(contest_id), "contest_won", json!({ "amount": amount })).await;
                    }
                }
                None => unclaimed += amount,
            }
        }

        if platform_fee_amount > Decimal::ZERO {
            self.repo
                .insert_platform_transaction(PlatformTransaction {
                    id: Uuid::new_v4(),
                    contest_id,
                    reason: PlatformTransactionReason::PlatformFee,
                    amount: platform_fee_amount,
                    recorded_at: Utc::now(),
                })
                .await?;
        }
        if unclaimed > Decimal::ZERO {
            self.repo
                .insert_platform_transaction(PlatformTransaction {
                    id: Uuid::new_v4(),
                    contest_id,
                    reason: if all_disqualified { PlatformTransactionReason::AllDisqualified } else { PlatformTransactionReason::UnclaimedPool },
                    amount: unclaimed,
                    recorded_at: Utc::now(),
                })
                .await?;
        }

        for mut p in participants {
            if !p.is_winner {
                p.status = ParticipantStatus::Completed;
                self.repo.update_participant(p.clone()).await?;
                self.events.emit_notification(p.user_id, Some(contest_id), "contest_lost", json!({})).await;
            }
        }

        contest.status = ContestStatus::Completed;
        self.repo.update_contest(contest).await?;
        Ok(())
    }

    /// Structurally identical to competition finalization but with exactly
    /// two participants and `tiePrizeDistribution` governing tie payout.
    pub async fn finalize_challenge(&self, contest_id: ContestId) -> Result<()> {
        let mut contest = self.repo.get_contest(contest_id).await?.ok_or_else(|| AppError::NotFound("contest not found".to_string()))?;
        if contest.status != ContestStatus::Active || Utc::now() < contest.end_time {
            return Err(AppError::ContestNotActive);
        }

        self.close_all_open_positions(contest_id, CloseReason::ChallengeEnd).await?;

        let mut participants = self.repo.list_participants_by_contest(contest_id).await?;
        participants.sort_by_key(|p| p.entered_at);
        let ranked = self.calculate_rankings(participants.clone(), &contest, true);

        let winner_prize = contest.winner_prize;
        let qualified: Vec<&RankedParticipant> = ranked.iter().filter(|r| !r.disqualified).collect();
        let both_disqualified = qualified.is_empty();

        if both_disqualified {
            self.repo
                .insert_platform_transaction(PlatformTransaction {
                    id: Uuid::new_v4(),
                    contest_id,
                    reason: PlatformTransactionReason::AllDisqualified,
                    amount: winner_prize,
                    recorded_at: Utc::now(),
                })
                .await?;
        } else if qualified.len() == 1 {
            let winner_id = qualified[0].participant_id;
            self.pay_challenge_winner(&mut participants, contest_id, winner_id, winner_prize).await?;
        } else {
            // Both qualified: tied (rank 1 shared) or a clear winner.
            let rank1: Vec<&RankedParticipant> = ranked.iter().filter(|r| r.rank == 1 && !r.disqualified).collect();
            if rank1.len() == 2 {
                match contest.tie_prize_distribution {
                    TiePrizeDistribution::SplitEqually => {
                        let half = (winner_prize / Decimal::TWO).floor();
                        for r in &rank1 {
                            if let Some(p) = participants.iter().find(|p| p.id == r.participant_id) {
                                self.ledger.pay_prize(p.user_id, contest_id, half).await?;
                            }
                        }
                        for p in participants.iter_mut() {
                            if rank1.iter().any(|r| r.participant_id == p.id) {
                                p.prize_received = Some(half);
                                p.is_winner = true;
                            }
                        }
                    }
                    TiePrizeDistribution::ChallengerWins => {
                        // The challenger is the first participant by entry
                        // time (the challenge's creator).
                        let challenger_id = participants.first().map(|p| p.id);
                        if let Some(id) = challenger_id {
                            self.pay_challenge_winner(&mut participants, contest_id, id, winner_prize).await?;
                        }
                    }
                    TiePrizeDistribution::BothLose => {
                        self.repo
                            .insert_platform_transaction(PlatformTransaction {
                                id: Uuid::new_v4(),
                                contest_id,
                                reason: PlatformTransactionReason::UnclaimedPool,
                                amount: winner_prize,
                                recorded_at: Utc::now(),
                            })
                            .await?;
                    }
                }
            } else {
                let winner_id = rank1[0].participant_id;
                self.pay_challenge_winner(&mut participants, contest_id, winner_id, winner_prize).await?;
            }
        }

        for p in participants.iter_mut() {
            p.status = if ranked.iter().any(|r| r.participant_id == p.id && r.disqualified) {
                ParticipantStatus::Disqualified
            } else {
                ParticipantStatus::Completed
            };
            if p.status == ParticipantStatus::Disqualified {
                p.disqualification_reason = Some(format!("fewer than {} required trades", contest.minimum_trades));
            }
            self.repo.update_participant(p.clone()).await?;
            let event = if p.is_winner { "contest_won" } else if p.status == ParticipantStatus::Disqualified { "challenge_disqualified" } else { "contest_lost" };
            self.events.emit_notification(p.user_id, Some(contest_id), event, json!({})).await;
        }

        contest.status = ContestStatus::Completed;
        self.repo.update_contest(contest).await?;
        Ok(())
    }

    async fn pay_challenge_winner(
        &self,
        participants: &mut [Participant],
        contest_id: ContestId,
        winner_id: ParticipantId,
        amount: Decimal,
    ) -> Result<()> {
        if let Some(p) = participants.iter_mut().find(|p| p.id == winner_id) {
            self.ledger.pay_prize(p.user_id, contest_id, amount).await?;
            p.prize_received = Some(amount);
            p.is_winner = true;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::InMemoryRepository;
    use crate::events::RepositoryEventSink;
    use crate::oracle::StaticPriceOracle;
    use crate::restrictions::AllowAllRestrictionsService;
    use chrono::Duration;
    use std::str::FromStr;

    fn d(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    fn base_contest(kind: ContestKind) -> Contest {
        Contest {
            id: Uuid::new_v4(),
            slug: "t".to_string(),
            name: "T".to_string(),
            kind,
            start_time: Utc::now() - Duration::minutes(1),
            end_time: Utc::now() - Duration::seconds(1),
            accept_deadline: None,
            status: ContestStatus::Active,
            entry_fee: d("10"),
            starting_capital: d("10000"),
            prize_pool: d("20"),
            platform_fee_percentage: d("0"),
            platform_fee_amount: Decimal::ZERO,
            winner_prize: d("20"),
            prize_distribution: vec![PrizeShare { rank: 1, percentage: d("100") }],
            min_participants: 2,
            max_participants: 10,
            current_participants: 0,
            allowed_asset_classes: vec![AssetClass::Forex],
            allowed_symbols: vec![],
            blocked_symbols: vec![],
            leverage: LeverageBand { min: d("1"), max: d("100"), default: d("10") },
            max_open_positions: 10,
            max_position_size: d("100"),
            margin_call_threshold: None,
            ranking_method: RankingMethod::Pnl,
            tie_breaker1: Some(TieBreaker::TradesCount),
            tie_breaker2: Some(TieBreaker::WinRate),
            minimum_trades: 0,
            tie_prize_distribution: TiePrizeDistribution::SplitEqually,
            disqualify_on_liquidation: true,
            risk_limits: RiskLimits::default(),
            cancellation_reason: None,
        }
    }

    fn participant(contest_id: ContestId, pnl: &str, trades: u32, win_rate: &str) -> Participant {
        Participant {
            id: Uuid::new_v4(),
            contest_id,
            user_id: Uuid::new_v4(),
            starting_capital: d("10000"),
            current_capital: d("10000") + d(pnl),
            available_capital: d("10000") + d(pnl),
            used_margin: Decimal::ZERO,
            realized_pnl: d(pnl),
            unrealized_pnl: Decimal::ZERO,
            pnl: d(pnl),
            pnl_percentage: Decimal::ZERO,
            total_trades: trades,
            winning_trades: 0,
            losing_trades: 0,
            win_rate: d(win_rate),
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
        }
    }

    fn lifecycle(repo: Arc<InMemoryRepository>) -> ContestLifecycle {
        let oracle = Arc::new(StaticPriceOracle::new());
        let events = Arc::new(RepositoryEventSink::new(repo.clone()));
        let positions = Arc::new(PositionEngine::new(
            repo.clone(),
            oracle.clone(),
            events.clone(),
            MarginThresholds { safe: d("200"), warning: d("100"), margin_call: d("50"), liquidation: d("20") },
        ));
        ContestLifecycle::new(
            repo.clone(),
            Arc::new(WalletLedger::new(repo.clone())),
            positions,
            oracle,
            Arc::new(AllowAllRestrictionsService),
            events,
        )
    }

    #[tokio::test]
    async fn s4_cancellation_refunds_every_participant() {
        let repo = Arc::new(InMemoryRepository::new());
        let lc = lifecycle(repo.clone());

        let mut contest = base_contest(ContestKind::Competition);
        contest.status = ContestStatus::Upcoming;
        contest.min_participants = 5;
        contest.current_participants = 3;
        let contest_id = contest.id;
        repo.insert_contest(contest).await.unwrap();

        for _ in 0..3 {
            let user = Uuid::new_v4();
            repo.apply_wallet_transaction(user, d("100"), WalletTransactionType::PrizePayout, None, "seed".to_string())
                .await
                .unwrap();
            lc.join(contest_id, user).await.unwrap();
        }

        lc.auto_start_or_cancel(contest_id).await.unwrap();

        let updated = repo.get_contest(contest_id).await.unwrap().unwrap();
        assert_eq!(updated.status, ContestStatus::Cancelled);

        let participants = repo.list_participants_by_contest(contest_id).await.unwrap();
        for p in participants {
            assert_eq!(repo.get_or_create_wallet(p.user_id).await.unwrap().credit_balance, d("100"));
        }
    }

    #[test]
    fn s5_challenger_wins_on_fewer_trades_tiebreak() {
        let repo = Arc::new(InMemoryRepository::new());
        let lc = lifecycle_sync(repo);
        let mut contest = base_contest(ContestKind::Challenge);
        contest.tie_breaker1 = Some(TieBreaker::TradesCount);
        contest.tie_breaker2 = Some(TieBreaker::WinRate);

        let challenger = participant(contest.id, "100", 10, "60");
        let challenged = participant(contest.id, "100", 12, "70");
        let ranked = lc.calculate_rankings(vec![challenger.clone(), challenged.clone()], &contest, false);

        let winner = ranked.iter().find(|r| r.rank == 1).unwrap();
        assert_eq!(winner.participant_id, challenger.id);
        assert!(!winner.is_tied);
    }

    #[test]
    fn s6_both_disqualified_when_below_minimum_trades() {
        let repo = Arc::new(InMemoryRepository::new());
        let lc = lifecycle_sync(repo);
        let mut contest = base_contest(ContestKind::Challenge);
        contest.minimum_trades = 3;

        let a = participant(contest.id, "50", 1, "100");
        let b = participant(contest.id, "30", 1, "0");
        let ranked = lc.calculate_rankings(vec![a, b], &contest, true);

        assert!(ranked.iter().all(|r| r.disqualified));
    }

    #[test]
    fn ranking_is_deterministic_across_repeated_calls() {
        let repo = Arc::new(InMemoryRepository::new());
        let lc = lifecycle_sync(repo);
        let contest = base_contest(ContestKind::Competition);
        let a = participant(contest.id, "200", 5, "80");
        let b = participant(contest.id, "100", 3, "50");

        let r1 = lc.calculate_rankings(vec![a.clone(), b.clone()], &contest, false);
        let r2 = lc.calculate_rankings(vec![a, b], &contest, false);

        let ranks1: Vec<u32> = r1.iter().map(|r| r.rank).collect();
        let ranks2: Vec<u32> = r2.iter().map(|r| r.rank).collect();
        assert_eq!(ranks1, ranks2);
    }

    // Synchronous construction helper for tests that only exercise
    // `calculate_rankings`, which does no I/O.
    fn lifecycle_sync(repo: Arc<InMemoryRepository>) -> ContestLifecycle {
        let oracle = Arc::new(StaticPriceOracle::new());
        let events = Arc::new(RepositoryEventSink::new(repo.clone()));
        let positions = Arc::new(PositionEngine::new(
            repo.clone(),
            oracle.clone(),
            events.clone(),
            MarginThresholds { safe: d("200"), warning: d("100"), margin_call: d("50"), liquidation: d("20") },
        ));
        ContestLifecycle::new(
            repo.clone(),
            Arc::new(WalletLedger::new(repo.clone())),
            positions,
            oracle,
            Arc::new(AllowAllRestrictionsService),
            events,
        )
    }
}
