use std::sync::Arc;

use async_trait::async_trait;

use crate::{
    error::TrackerResult,
    messenger::{upsert, Messenger, Upserted},
    models::{ArtifactRef, EntityId},
    scheduler::PeriodicTask,
    store::SharedStore,
    summary::Reconciler,
    tracker::panel_notification,
};

const ENABLE_LOGS: bool = true;
const LOG_TARGET: &str = "fichaje::housekeeping";

use crate::{log_debug, log_info, log_warn};

/// Counters from one housekeeping pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TickReport {
    pub purged: usize,
    pub panels_created: usize,
    pub panels_refreshed: usize,
    pub failures: usize,
    pub summary: Option<Upserted>,
}

/// Keeps exactly one panel per tracked channel, clears the bot's other
/// messages around it and refreshes the summary.
pub struct Housekeeper {
    store: SharedStore,
    messenger: Arc<dyn Messenger>,
    reconciler: Arc<Reconciler>,
    tracked: Vec<EntityId>,
}

impl Housekeeper {
    pub fn new(
        store: SharedStore,
        messenger: Arc<dyn Messenger>,
        reconciler: Arc<Reconciler>,
        tracked: Vec<EntityId>,
    ) -> Self {
        Self {
            store,
            messenger,
            reconciler,
            tracked,
        }
    }

    pub async fn on_tick(&self) -> TickReport {
        let mut report = TickReport::default();

        for entity in &self.tracked {
            if let Err(err) = self.tend_panel(*entity, &mut report).await {
                report.failures += 1;
                log_warn!("Housekeeping of channel {entity} failed: {err}");
            }
        }

        if let Some(destination) = self.reconciler.destination() {
            let keep = self.anchor_of(destination).await;
            match self.messenger.purge_stale(destination, keep).await {
                Ok(removed) => report.purged += removed,
                Err(err) => {
                    report.failures += 1;
                    log_warn!("Cleanup of summary channel {destination} failed: {err}");
                }
            }
        }

        match self.reconciler.reconcile().await {
            Ok(summary) => report.summary = summary,
            Err(err) => {
                report.failures += 1;
                log_warn!("Summary refresh failed: {err}");
            }
        }

        log_debug!("Housekeeping tick done: {report:?}");
        report
    }

    async fn tend_panel(&self, entity: EntityId, report: &mut TickReport) -> TrackerResult<()> {
        let anchor = self.anchor_of(entity).await;
        report.purged += self.messenger.purge_stale(entity, anchor).await?;

        let outcome = upsert(self.messenger.as_ref(), entity, anchor, &panel_notification()).await?;
        match outcome {
            Upserted::Edited(_) => report.panels_refreshed += 1,
            Upserted::Created(panel) => {
                report.panels_created += 1;
                self.store.lock().await.set_anchor(entity, Some(panel))?;
                log_info!("Posted panel {panel} in channel {entity}");
            }
        }
        Ok(())
    }

    async fn anchor_of(&self, entity: EntityId) -> Option<ArtifactRef> {
        self.store
            .lock()
            .await
            .get(entity)
            .and_then(|record| record.display_anchor_id())
    }
}

#[async_trait]
impl PeriodicTask for Housekeeper {
    async fn tick(&self) {
        self.on_tick().await;
    }
}
