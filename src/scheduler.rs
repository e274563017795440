use std::{
    sync::{Arc, Mutex},
    time::Duration,
};

use anyhow::{Context, Result};
use async_trait::async_trait;
use tokio::{task::JoinHandle, time::MissedTickBehavior};
use tokio_util::sync::CancellationToken;

const ENABLE_LOGS: bool = true;
const LOG_TARGET: &str = "fichaje::scheduler";

use crate::{log_info, log_warn};

/// Work that runs on every tick of a periodic schedule.
#[async_trait]
pub trait PeriodicTask: Send + Sync {
    async fn tick(&self);
}

pub trait Scheduler {
    fn schedule_periodic(&self, period: Duration, task: Arc<dyn PeriodicTask>);
}

/// One interval loop per scheduled task. The first tick fires immediately;
/// a tick that overruns delays the next one instead of bursting.
pub struct TokioScheduler {
    cancel_token: CancellationToken,
    handles: Mutex<Vec<JoinHandle<()>>>,
}

impl TokioScheduler {
    pub fn new() -> Self {
        Self {
            cancel_token: CancellationToken::new(),
            handles: Mutex::new(Vec::new()),
        }
    }

    /// Stops every loop and waits for in-flight ticks to finish.
    pub async fn shutdown(&self) -> Result<()> {
        self.cancel_token.cancel();

        let handles = {
            let mut guard = match self.handles.lock() {
                Ok(guard) => guard,
                Err(poisoned) => poisoned.into_inner(),
            };
            std::mem::take(&mut *guard)
        };
        for handle in handles {
            handle
                .await
                .context("scheduled task failed to join")?;
        }
        Ok(())
    }
}

impl Default for TokioScheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl Scheduler for TokioScheduler {
    fn schedule_periodic(&self, period: Duration, task: Arc<dyn PeriodicTask>) {
        let period = if period.is_zero() {
            log_warn!("Zero scheduling period requested; using one second");
            Duration::from_secs(1)
        } else {
            period
        };

        let cancel_token = self.cancel_token.clone();
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = ticker.tick() => task.tick().await,
                    _ = cancel_token.cancelled() => {
                        log_info!("periodic task shutting down");
                        break;
                    }
                }
            }
        });

        match self.handles.lock() {
            Ok(mut guard) => guard.push(handle),
            Err(poisoned) => poisoned.into_inner().push(handle),
        }
    }
}
