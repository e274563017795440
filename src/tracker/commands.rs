use std::sync::Arc;

use tokio::task::JoinHandle;

use crate::{
    error::{TrackerError, TrackerResult},
    messenger::{ButtonStyle, Notification},
    models::EntityId,
    summary::Reconciler,
    utils::duration,
};

use super::SessionTracker;

const ENABLE_LOGS: bool = true;
const LOG_TARGET: &str = "fichaje::commands";

use crate::{log_error, log_info, log_warn};

const PANEL_TITLE: &str = "💼 Ministerio de Trabajo";
const PANEL_DESCRIPTION: &str = "Sistema de fichaje del taller\nSelecciona una opción:";
const PANEL_COLOR: u32 = 0x3498db;

pub const UNKNOWN_ACTION_REPLY: &str = "⚠️ Acción desconocida.";

/// The three buttons on a channel's panel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    ClockIn,
    ClockOut,
    Query,
}

impl Action {
    pub const ALL: [Action; 3] = [Action::ClockIn, Action::ClockOut, Action::Query];

    pub fn from_custom_id(custom_id: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|action| action.custom_id() == custom_id)
    }

    pub fn custom_id(self) -> &'static str {
        match self {
            Action::ClockIn => "ingreso",
            Action::ClockOut => "retirada",
            Action::Query => "horas",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Action::ClockIn => "🟢 Ingreso",
            Action::ClockOut => "🔴 Retirada",
            Action::Query => "📊 Horas totales",
        }
    }

    pub fn style(self) -> ButtonStyle {
        match self {
            Action::ClockIn => ButtonStyle::Success,
            Action::ClockOut => ButtonStyle::Danger,
            Action::Query => ButtonStyle::Primary,
        }
    }
}

pub fn panel_notification() -> Notification {
    Action::ALL.into_iter().fold(
        Notification::new(PANEL_TITLE, PANEL_DESCRIPTION, PANEL_COLOR),
        |panel, action| panel.with_button(action.label(), action.custom_id(), action.style()),
    )
}

/// What the user sees, plus the background summary refresh a clock-out kicks
/// off (already running; awaiting it is optional).
#[derive(Debug)]
pub struct ActionOutcome {
    pub reply: String,
    pub follow_up: Option<JoinHandle<()>>,
}

impl ActionOutcome {
    fn reply(reply: impl Into<String>) -> Self {
        Self {
            reply: reply.into(),
            follow_up: None,
        }
    }
}

/// Turns button presses into tracker calls and user-facing replies.
#[derive(Clone)]
pub struct ActionHandler {
    tracker: SessionTracker,
    reconciler: Arc<Reconciler>,
    acceleration: f64,
}

impl ActionHandler {
    pub fn new(tracker: SessionTracker, reconciler: Arc<Reconciler>, acceleration: f64) -> Self {
        Self {
            tracker,
            reconciler,
            acceleration,
        }
    }

    pub async fn handle_custom_id(&self, entity: EntityId, custom_id: &str) -> ActionOutcome {
        match Action::from_custom_id(custom_id) {
            Some(action) => self.handle(entity, action).await,
            None => {
                log_warn!("Unknown action '{custom_id}' in channel {entity}");
                ActionOutcome::reply(UNKNOWN_ACTION_REPLY)
            }
        }
    }

    pub async fn handle(&self, entity: EntityId, action: Action) -> ActionOutcome {
        let result = match action {
            Action::ClockIn => self.clock_in(entity).await,
            Action::ClockOut => self.clock_out(entity).await,
            Action::Query => self.query(entity).await,
        };

        result.unwrap_or_else(|err| {
            if err.is_guard_violation() {
                log_info!("{action:?} refused for channel {entity}: {err}");
            } else {
                log_error!("{action:?} failed for channel {entity}: {err}");
            }
            ActionOutcome::reply(error_reply(&err))
        })
    }

    async fn clock_in(&self, entity: EntityId) -> TrackerResult<ActionOutcome> {
        self.tracker.clock_in(entity).await?;
        Ok(ActionOutcome::reply("✅ Has fichado tu **entrada**."))
    }

    async fn clock_out(&self, entity: EntityId) -> TrackerResult<ActionOutcome> {
        let receipt = self.tracker.clock_out(entity).await?;
        // the session is already saved; a bad factor only costs the pretty print
        let reply = match duration::render(receipt.session_seconds, self.acceleration) {
            Ok(rendered) => format!("✅ Has fichado tu **salida**. Has trabajado {rendered}."),
            Err(err) => {
                log_warn!("Could not render session for channel {entity}: {err}");
                format!("✅ Has fichado tu **salida**. {}", error_reply(&err))
            }
        };

        let reconciler = self.reconciler.clone();
        let follow_up = tokio::spawn(async move {
            if let Err(err) = reconciler.reconcile().await {
                log_warn!("Summary refresh after clock-out of {entity} failed: {err}");
            }
        });

        Ok(ActionOutcome {
            reply,
            follow_up: Some(follow_up),
        })
    }

    async fn query(&self, entity: EntityId) -> TrackerResult<ActionOutcome> {
        let report = self.tracker.query(entity).await?;
        let rendered = duration::render(report.total_seconds(), self.acceleration)?;
        Ok(ActionOutcome::reply(format!(
            "⏱️ Has trabajado un total de **{rendered}** en este canal."
        )))
    }
}

fn error_reply(err: &TrackerError) -> String {
    match err {
        TrackerError::AlreadyClockedIn(_) => "⚠️ Ya habías fichado tu entrada.".to_string(),
        TrackerError::NotClockedIn(_) => "⚠️ No habías fichado entrada.".to_string(),
        TrackerError::InvalidInterval { .. } => {
            "⚠️ La hora de entrada guardada es posterior a la actual. Avisa a un administrador."
                .to_string()
        }
        TrackerError::InvalidDuration(detail) => format!("⚠️ Error al calcular horas: {detail}"),
        TrackerError::Persistence { .. } => {
            "⚠️ No se pudo guardar el registro. Inténtalo de nuevo.".to_string()
        }
        TrackerError::MalformedRecord { .. } | TrackerError::CollaboratorUnavailable(_) => {
            "⚠️ Servicio no disponible en este momento.".to_string()
        }
    }
}
