use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{
    error::{TrackerError, TrackerResult},
    models::{EntityId, TrackingRecord},
};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum SessionStatus {
    Idle,
    Active,
}

impl Default for SessionStatus {
    fn default() -> Self {
        SessionStatus::Idle
    }
}

/// Transitions of the per-channel clock. Each one either applies fully or
/// returns an error with the record untouched.
impl TrackingRecord {
    pub fn status(&self) -> SessionStatus {
        if self.open_since.is_some() {
            SessionStatus::Active
        } else {
            SessionStatus::Idle
        }
    }

    pub fn clock_in(&mut self, entity: EntityId, now: DateTime<Utc>) -> TrackerResult<()> {
        if self.open_since.is_some() {
            return Err(TrackerError::AlreadyClockedIn(entity));
        }
        self.open_since = Some(now);
        Ok(())
    }

    /// Closes the open session and returns its length in raw seconds.
    pub fn clock_out(&mut self, entity: EntityId, now: DateTime<Utc>) -> TrackerResult<f64> {
        let open_since = self
            .open_since
            .ok_or(TrackerError::NotClockedIn(entity))?;
        let delta = interval_seconds(entity, open_since, now)?;

        self.accumulated_seconds += delta;
        self.open_since = None;
        Ok(delta)
    }

    /// Seconds of the session still running, if any. Nothing is written back.
    pub fn in_progress_seconds(
        &self,
        entity: EntityId,
        now: DateTime<Utc>,
    ) -> TrackerResult<Option<f64>> {
        self.open_since
            .map(|open_since| interval_seconds(entity, open_since, now))
            .transpose()
    }

    pub fn elapsed_seconds(&self, entity: EntityId, now: DateTime<Utc>) -> TrackerResult<f64> {
        let running = self.in_progress_seconds(entity, now)?.unwrap_or(0.0);
        Ok(self.accumulated_seconds + running)
    }
}

fn interval_seconds(
    entity: EntityId,
    open_since: DateTime<Utc>,
    now: DateTime<Utc>,
) -> TrackerResult<f64> {
    (now - open_since)
        .to_std()
        .map(|elapsed| elapsed.as_secs_f64())
        .map_err(|_| TrackerError::InvalidInterval {
            entity,
            open_since,
            now,
        })
}
