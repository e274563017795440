//! In-crate fakes shared by the unit tests.

use std::{
    collections::{BTreeMap, HashMap},
    path::PathBuf,
    sync::{Arc, Mutex, MutexGuard},
};

use async_trait::async_trait;
use chrono::{DateTime, Duration, TimeZone, Utc};
use tempfile::TempDir;

use crate::{
    clock::Clock,
    error::{TrackerError, TrackerResult},
    housekeeping::Housekeeper,
    messenger::{Delivery, Messenger, Notification},
    models::{ArtifactRef, EntityId},
    store::{RecordStore, SharedStore},
    summary::Reconciler,
    tracker::{ActionHandler, SessionTracker},
};

#[derive(Default)]
struct FakeState {
    next_id: u64,
    live: BTreeMap<ArtifactRef, (EntityId, Notification)>,
    names: HashMap<EntityId, String>,
    failing: bool,
    sends: usize,
    edits: usize,
    purges: usize,
}

impl FakeState {
    fn allocate(&mut self) -> ArtifactRef {
        self.next_id += 1;
        ArtifactRef::new(1_000 + self.next_id)
    }
}

/// Messenger that keeps "published" messages in memory and counts calls.
#[derive(Default)]
pub(crate) struct RecordingMessenger {
    state: Mutex<FakeState>,
    send_gate: tokio::sync::Mutex<()>,
}

impl RecordingMessenger {
    fn state(&self) -> MutexGuard<'_, FakeState> {
        match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    pub(crate) fn with_name(self, entity: EntityId, name: &str) -> Self {
        self.state().names.insert(entity, name.to_string());
        self
    }

    /// While the guard lives, every `send_notification` waits.
    pub(crate) async fn hold_sends(&self) -> tokio::sync::MutexGuard<'_, ()> {
        self.send_gate.lock().await
    }

    pub(crate) fn set_failing(&self, failing: bool) {
        self.state().failing = failing;
    }

    /// A message that was already in the channel (e.g. from a previous run).
    pub(crate) fn existing(&self, destination: EntityId, content: Notification) -> ArtifactRef {
        let mut state = self.state();
        let artifact = state.allocate();
        state.live.insert(artifact, (destination, content));
        artifact
    }

    /// Simulates someone deleting the message by hand.
    pub(crate) fn forget(&self, artifact: ArtifactRef) {
        self.state().live.remove(&artifact);
    }

    pub(crate) fn content(&self, artifact: ArtifactRef) -> Option<Notification> {
        self.state()
            .live
            .get(&artifact)
            .map(|(_, content)| content.clone())
    }

    pub(crate) fn live_in(&self, destination: EntityId) -> Vec<ArtifactRef> {
        self.state()
            .live
            .iter()
            .filter(|(_, (channel, _))| *channel == destination)
            .map(|(artifact, _)| *artifact)
            .collect()
    }

    pub(crate) fn sends(&self) -> usize {
        self.state().sends
    }

    pub(crate) fn edits(&self) -> usize {
        self.state().edits
    }

    pub(crate) fn purges(&self) -> usize {
        self.state().purges
    }
}

fn outage() -> TrackerError {
    TrackerError::CollaboratorUnavailable("simulated outage".to_string())
}

#[async_trait]
impl Messenger for RecordingMessenger {
    async fn send_notification(
        &self,
        destination: EntityId,
        content: &Notification,
    ) -> TrackerResult<ArtifactRef> {
        let _released = self.send_gate.lock().await;
        let mut state = self.state();
        if state.failing {
            return Err(outage());
        }
        state.sends += 1;
        let artifact = state.allocate();
        state.live.insert(artifact, (destination, content.clone()));
        Ok(artifact)
    }

    async fn edit_notification(
        &self,
        destination: EntityId,
        artifact: ArtifactRef,
        content: &Notification,
    ) -> TrackerResult<Delivery> {
        let mut state = self.state();
        if state.failing {
            return Err(outage());
        }
        state.edits += 1;
        match state.live.get_mut(&artifact) {
            Some((channel, existing)) if *channel == destination => {
                *existing = content.clone();
                Ok(Delivery::Applied)
            }
            _ => Ok(Delivery::NotFound),
        }
    }

    async fn delete_notification(
        &self,
        destination: EntityId,
        artifact: ArtifactRef,
    ) -> TrackerResult<Delivery> {
        let mut state = self.state();
        if state.failing {
            return Err(outage());
        }
        let owned = matches!(
            state.live.get(&artifact),
            Some((channel, _)) if *channel == destination
        );
        if owned {
            state.live.remove(&artifact);
            Ok(Delivery::Applied)
        } else {
            Ok(Delivery::NotFound)
        }
    }

    async fn purge_stale(
        &self,
        destination: EntityId,
        keep: Option<ArtifactRef>,
    ) -> TrackerResult<usize> {
        let mut state = self.state();
        if state.failing {
            return Err(outage());
        }
        state.purges += 1;
        let stale: Vec<ArtifactRef> = state
            .live
            .iter()
            .filter(|(artifact, (channel, _))| {
                *channel == destination && Some(**artifact) != keep
            })
            .map(|(artifact, _)| *artifact)
            .collect();
        for artifact in &stale {
            state.live.remove(artifact);
        }
        Ok(stale.len())
    }

    async fn resolve_channel_name(&self, entity: EntityId) -> Option<String> {
        self.state().names.get(&entity).cloned()
    }
}

/// Clock that only moves when told to.
#[derive(Debug)]
pub(crate) struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    pub(crate) fn new(start: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(start),
        }
    }

    pub(crate) fn set(&self, instant: DateTime<Utc>) {
        *self.guard() = instant;
    }

    pub(crate) fn advance(&self, by: Duration) {
        *self.guard() += by;
    }

    fn guard(&self) -> MutexGuard<'_, DateTime<Utc>> {
        match self.now.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.guard()
    }
}

pub(crate) fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 6, 3, 8, 0, 0).unwrap()
}

/// Tracker, reconciler and dispatcher wired over a temp-dir store, a manual
/// clock starting at [`t0`] and a [`RecordingMessenger`].
pub(crate) struct Harness {
    pub(crate) dir: TempDir,
    pub(crate) store: SharedStore,
    pub(crate) clock: Arc<ManualClock>,
    pub(crate) messenger: Arc<RecordingMessenger>,
    pub(crate) tracker: SessionTracker,
    pub(crate) reconciler: Arc<Reconciler>,
    pub(crate) handler: ActionHandler,
}

impl Harness {
    pub(crate) fn new(acceleration: f64, summary_destination: Option<EntityId>) -> Self {
        Self::with_messenger(
            acceleration,
            summary_destination,
            RecordingMessenger::default(),
        )
    }

    pub(crate) fn with_messenger(
        acceleration: f64,
        summary_destination: Option<EntityId>,
        messenger: RecordingMessenger,
    ) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let store = RecordStore::open(dir.path().join("horas.json")).into_shared();
        let clock = Arc::new(ManualClock::new(t0()));
        let messenger = Arc::new(messenger);

        let tracker = SessionTracker::new(store.clone(), clock.clone() as Arc<dyn Clock>);
        let reconciler = Arc::new(Reconciler::new(
            store.clone(),
            messenger.clone() as Arc<dyn Messenger>,
            summary_destination,
            acceleration,
        ));
        let handler = ActionHandler::new(tracker.clone(), reconciler.clone(), acceleration);

        Self {
            dir,
            store,
            clock,
            messenger,
            tracker,
            reconciler,
            handler,
        }
    }

    pub(crate) fn store_path(&self) -> PathBuf {
        self.dir.path().join("horas.json")
    }

    pub(crate) fn housekeeper(&self, tracked: &[EntityId]) -> Housekeeper {
        Housekeeper::new(
            self.store.clone(),
            self.messenger.clone() as Arc<dyn Messenger>,
            self.reconciler.clone(),
            tracked.to_vec(),
        )
    }
}
