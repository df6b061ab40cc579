//! User restrictions: consulted before any capital-affecting action. The
//! core treats this purely as a gate — it never decides *why* a user is
//! restricted, only whether to proceed.

use crate::types::UserId;
use async_trait::async_trait;
use deadpool_postgres::Pool;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RestrictedAction {
    Trade,
    EnterCompetition,
}

pub struct RestrictionCheck {
    pub allowed: bool,
    pub reason: Option<String>,
}

#[async_trait]
pub trait RestrictionsService: Send + Sync {
    async fn can_user_perform_action(&self, user_id: UserId, action: RestrictedAction) -> RestrictionCheck;
}

/// Postgres-backed default: a user is restricted if a row exists in
/// `user_restrictions` covering the requested action and not yet expired.
pub struct PostgresRestrictionsService {
    pool: Pool,
}

impl PostgresRestrictionsService {
    pub fn new(pool: Pool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl RestrictionsService for PostgresRestrictionsService {
    async fn can_user_perform_action(&self, user_id: UserId, action: RestrictedAction) -> RestrictionCheck {
        let action_key = match action {
            RestrictedAction::Trade => "trade",
            RestrictedAction::EnterCompetition => "enter_competition",
        };

        let conn = match self.pool.get().await {
            Ok(conn) => conn,
            Err(e) => {
                // Fail open on infrastructure errors: a restrictions outage
                // must not itself become a denial-of-service on trading.
                tracing::warn!(error = %e, "restrictions service unreachable, allowing action");
                return RestrictionCheck { allowed: true, reason: None };
            }
        };

        let row = conn
            .query_opt(
                r#"SELECT reason FROM user_restrictions
                   WHERE user_id = $1 AND action = $2 AND (expires_at IS NULL OR expires_at > NOW())"#,
                &[&user_id, &action_key],
            )
            .await;

        match row {
            Ok(Some(row)) => RestrictionCheck { allowed: false, reason: Some(row.get("reason")) },
            Ok(None) => RestrictionCheck { allowed: true, reason: None },
            Err(e) => {
                tracing::warn!(error = %e, "restrictions lookup failed, allowing action");
                RestrictionCheck { allowed: true, reason: None }
            }
        }
    }
}

/// Always-allow stub for tests and for deployments that have no
/// restrictions backend wired up yet.
pub struct AllowAllRestrictionsService;

#[async_trait]
impl RestrictionsService for AllowAllRestrictionsService {
    async fn can_user_perform_action(&self, _user_id: UserId, _action: RestrictedAction) -> RestrictionCheck {
        RestrictionCheck { allowed: true, reason: None }
    }
}
