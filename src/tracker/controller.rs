use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::{
    clock::Clock,
    error::TrackerResult,
    models::EntityId,
    store::SharedStore,
};

use super::SessionStatus;

const ENABLE_LOGS: bool = true;
const LOG_TARGET: &str = "fichaje::tracker";

use crate::log_info;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClockInReceipt {
    pub entity: EntityId,
    pub started_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClockOutReceipt {
    pub entity: EntityId,
    pub started_at: DateTime<Utc>,
    pub ended_at: DateTime<Utc>,
    /// Raw seconds of the session just closed.
    pub session_seconds: f64,
    /// Raw accumulated seconds after the close.
    pub total_seconds: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ElapsedReport {
    pub entity: EntityId,
    pub status: SessionStatus,
    pub accumulated_seconds: f64,
    /// Zero when idle.
    pub in_progress_seconds: f64,
}

impl ElapsedReport {
    pub fn total_seconds(&self) -> f64 {
        self.accumulated_seconds + self.in_progress_seconds
    }
}

/// Serializes clock-in, clock-out and query for every channel through the
/// store lock. A receipt is only returned once the change is on disk.
#[derive(Clone)]
pub struct SessionTracker {
    store: SharedStore,
    clock: Arc<dyn Clock>,
}

impl SessionTracker {
    pub fn new(store: SharedStore, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    pub async fn clock_in(&self, entity: EntityId) -> TrackerResult<ClockInReceipt> {
        let mut store = self.store.lock().await;
        let now = self.clock.now();

        let mut record = store.get(entity).cloned().unwrap_or_default();
        record.clock_in(entity, now)?;
        store.commit(entity, record)?;

        log_info!("Channel {entity} clocked in at {now}");
        Ok(ClockInReceipt {
            entity,
            started_at: now,
        })
    }

    pub async fn clock_out(&self, entity: EntityId) -> TrackerResult<ClockOutReceipt> {
        let mut store = self.store.lock().await;
        let now = self.clock.now();

        let mut record = store.get(entity).cloned().unwrap_or_default();
        let started_at = record.open_since();
        let session_seconds = record.clock_out(entity, now)?;
        let total_seconds = record.accumulated_seconds();
        store.commit(entity, record)?;

        log_info!(
            "Channel {entity} clocked out after {session_seconds:.1}s (total {total_seconds:.1}s)"
        );
        Ok(ClockOutReceipt {
            entity,
            // clock_out succeeded, so a start was present
            started_at: started_at.unwrap_or(now),
            ended_at: now,
            session_seconds,
            total_seconds,
        })
    }

    /// Accumulated time plus the running session, if any. Read-only.
    pub async fn query(&self, entity: EntityId) -> TrackerResult<ElapsedReport> {
        let store = self.store.lock().await;
        let now = self.clock.now();

        let record = store.get(entity).cloned().unwrap_or_default();
        let in_progress_seconds = record.in_progress_seconds(entity, now)?.unwrap_or(0.0);

        Ok(ElapsedReport {
            entity,
            status: record.status(),
            accumulated_seconds: record.accumulated_seconds(),
            in_progress_seconds,
        })
    }

    pub async fn open_sessions(&self) -> Vec<(EntityId, DateTime<Utc>)> {
        let store = self.store.lock().await;
        store
            .records()
            .iter()
            .filter_map(|(entity, record)| record.open_since().map(|since| (*entity, since)))
            .collect()
    }
}
