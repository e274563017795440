use std::{collections::HashMap, sync::Arc};

use tokio::sync::Mutex;

use crate::{
    error::TrackerResult,
    messenger::{upsert, Messenger, Notification, Upserted},
    models::{ArtifactRef, EntityId, RecordMap},
    store::SharedStore,
    utils::duration,
};

const ENABLE_LOGS: bool = true;
const LOG_TARGET: &str = "fichaje::summary";

use crate::{log_debug, log_info};

pub const SUMMARY_TITLE: &str = "🏆 Ranking de horas trabajadas";
pub const EMPTY_SUMMARY: &str = "No hay registros todavía.";
const SUMMARY_COLOR: u32 = 0x2ecc71;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SummaryLine {
    pub entity: EntityId,
    pub label: String,
    pub rendered: String,
}

/// Aggregate report over every channel, one line per record in id order.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RenderedSummary {
    lines: Vec<SummaryLine>,
}

impl RenderedSummary {
    pub fn lines(&self) -> &[SummaryLine] {
        &self.lines
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    pub fn to_text(&self) -> String {
        if self.lines.is_empty() {
            return EMPTY_SUMMARY.to_string();
        }
        self.lines
            .iter()
            .map(|line| format!("**{}**: {}", line.label, line.rendered))
            .collect::<Vec<_>>()
            .join("\n")
    }

    pub fn to_notification(&self) -> Notification {
        Notification::new(SUMMARY_TITLE, self.to_text(), SUMMARY_COLOR)
    }
}

pub fn fallback_label(entity: EntityId) -> String {
    format!("Canal {entity}")
}

/// Renders the accumulated (closed-session) time of every record. `skip`
/// leaves out the record that carries the summary's own anchor.
pub fn rebuild(
    records: &RecordMap,
    names: &HashMap<EntityId, String>,
    acceleration: f64,
    skip: Option<EntityId>,
) -> TrackerResult<RenderedSummary> {
    let mut lines = Vec::with_capacity(records.len());
    for (entity, record) in records {
        if Some(*entity) == skip {
            continue;
        }
        lines.push(SummaryLine {
            entity: *entity,
            label: names
                .get(entity)
                .cloned()
                .unwrap_or_else(|| fallback_label(*entity)),
            rendered: duration::render(record.accumulated_seconds(), acceleration)?,
        });
    }
    Ok(RenderedSummary { lines })
}

/// Replaces the summary behind `anchor` in place, or posts a new one when the
/// anchor is absent or no longer resolves.
pub async fn publish(
    messenger: &dyn Messenger,
    destination: EntityId,
    summary: &RenderedSummary,
    anchor: Option<ArtifactRef>,
) -> TrackerResult<Upserted> {
    upsert(messenger, destination, anchor, &summary.to_notification()).await
}

/// Rebuilds the summary from the store and republishes it. Runs one at a
/// time; the store lock is never held while talking to the platform.
pub struct Reconciler {
    store: SharedStore,
    messenger: Arc<dyn Messenger>,
    destination: Option<EntityId>,
    acceleration: f64,
    gate: Mutex<()>,
}

impl Reconciler {
    pub fn new(
        store: SharedStore,
        messenger: Arc<dyn Messenger>,
        destination: Option<EntityId>,
        acceleration: f64,
    ) -> Self {
        Self {
            store,
            messenger,
            destination,
            acceleration,
            gate: Mutex::new(()),
        }
    }

    pub fn destination(&self) -> Option<EntityId> {
        self.destination
    }

    /// `Ok(None)` when no summary destination is configured.
    pub async fn reconcile(&self) -> TrackerResult<Option<Upserted>> {
        let Some(destination) = self.destination else {
            log_debug!("No summary destination configured; skipping");
            return Ok(None);
        };
        let _serialized = self.gate.lock().await;

        let (records, anchor) = {
            let store = self.store.lock().await;
            let anchor = store
                .get(destination)
                .and_then(|record| record.display_anchor_id());
            (store.records().clone(), anchor)
        };

        let mut names = HashMap::with_capacity(records.len());
        for entity in records.keys().filter(|entity| **entity != destination) {
            if let Some(name) = self.messenger.resolve_channel_name(*entity).await {
                names.insert(*entity, name);
            }
        }

        let summary = rebuild(&records, &names, self.acceleration, Some(destination))?;
        let outcome = publish(self.messenger.as_ref(), destination, &summary, anchor).await?;

        if outcome.created() {
            self.store
                .lock()
                .await
                .set_anchor(destination, Some(outcome.anchor()))?;
            log_info!(
                "Posted a new summary {} in channel {destination}",
                outcome.anchor()
            );
        }
        Ok(Some(outcome))
    }
}
