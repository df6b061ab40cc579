//! Event bus: out-of-band emission of position events and notification
//! intents. Emission always happens after the owning transaction commits
//! and never fails the core — a sink error is logged and swallowed, matching
//! the "core never blocks on consumers" contract.

use crate::db::models::{NotificationIntent, PositionEvent};
use crate::db::Repository;
use crate::types::{ContestId, PositionId, UserId};
use async_trait::async_trait;
use chrono::Utc;
use serde_json::Value;
use std::sync::Arc;
use uuid::Uuid;

#[async_trait]
pub trait EventSink: Send + Sync {
    async fn emit_position_event(
        &self,
        event_type: &str,
        user_id: UserId,
        contest_id: ContestId,
        position_id: Option<PositionId>,
        payload: Value,
    );

    async fn emit_notification(
        &self,
        user_id: UserId,
        contest_id: Option<ContestId>,
        kind: &str,
        payload: Value,
    );
}

/// Default sink: appends to the repository's `position_events` /
/// `notification_intents` tables (at-least-once, consumers ack out of band).
pub struct RepositoryEventSink {
    repo: Arc<dyn Repository>,
}

impl RepositoryEventSink {
    pub fn new(repo: Arc<dyn Repository>) -> Self {
        Self { repo }
    }
}

#[async_trait]
impl EventSink for RepositoryEventSink {
    async fn emit_position_event(
        &self,
        event_type: &str,
        user_id: UserId,
        contest_id: ContestId,
        position_id: Option<PositionId>,
        payload: Value,
    ) {
        let event = PositionEvent {
            id: Uuid::new_v4(),
            event_type: event_type.to_string(),
            user_id,
            contest_id,
            position_id,
            payload,
            created_at: Utc::now(),
        };
        if let Err(e) = self.repo.append_position_event(event).await {
            tracing::warn!(event_type, %user_id, %contest_id, error = %e, "failed to append position event");
        }
    }

    async fn emit_notification(&self, user_id: UserId, contest_id: Option<ContestId>, kind: &str, payload: Value) {
        let intent = NotificationIntent {
            id: Uuid::new_v4(),
            user_id,
            contest_id,
            kind: kind.to_string(),
            payload,
            created_at: Utc::now(),
            acked_at: None,
        };
        if let Err(e) = self.repo.append_notification_intent(intent).await {
            tracing::warn!(kind, %user_id, error = %e, "failed to append notification intent");
        }
    }
}
