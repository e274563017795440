use async_trait::async_trait;

use crate::{
    error::TrackerResult,
    models::{ArtifactRef, EntityId},
};

mod discord;

pub use discord::DiscordMessenger;

const ENABLE_LOGS: bool = true;
const LOG_TARGET: &str = "fichaje::messenger";

use crate::log_info;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ButtonStyle {
    Primary,
    Success,
    Danger,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Button {
    pub label: String,
    pub custom_id: String,
    pub style: ButtonStyle,
}

/// Platform-neutral content of a published message: an embed-like card with
/// optional action buttons.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub title: String,
    pub description: String,
    pub color: u32,
    pub buttons: Vec<Button>,
}

impl Notification {
    pub fn new(title: impl Into<String>, description: impl Into<String>, color: u32) -> Self {
        Self {
            title: title.into(),
            description: description.into(),
            color,
            buttons: Vec::new(),
        }
    }

    pub fn with_button(
        mut self,
        label: impl Into<String>,
        custom_id: impl Into<String>,
        style: ButtonStyle,
    ) -> Self {
        self.buttons.push(Button {
            label: label.into(),
            custom_id: custom_id.into(),
            style,
        });
        self
    }
}

/// Result of an edit or delete against an existing artifact.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    Applied,
    NotFound,
}

/// Outbound side of the chat platform. Errors are always
/// `CollaboratorUnavailable`; a missing artifact is not an error but
/// [`Delivery::NotFound`].
#[async_trait]
pub trait Messenger: Send + Sync {
    async fn send_notification(
        &self,
        destination: EntityId,
        content: &Notification,
    ) -> TrackerResult<ArtifactRef>;

    async fn edit_notification(
        &self,
        destination: EntityId,
        artifact: ArtifactRef,
        content: &Notification,
    ) -> TrackerResult<Delivery>;

    async fn delete_notification(
        &self,
        destination: EntityId,
        artifact: ArtifactRef,
    ) -> TrackerResult<Delivery>;

    /// Removes the bot's own recent messages in `destination`, except `keep`.
    /// Returns how many were removed.
    async fn purge_stale(
        &self,
        destination: EntityId,
        keep: Option<ArtifactRef>,
    ) -> TrackerResult<usize>;

    async fn resolve_channel_name(&self, entity: EntityId) -> Option<String>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Upserted {
    Edited(ArtifactRef),
    Created(ArtifactRef),
}

impl Upserted {
    pub fn anchor(self) -> ArtifactRef {
        match self {
            Upserted::Edited(anchor) | Upserted::Created(anchor) => anchor,
        }
    }

    pub fn created(self) -> bool {
        matches!(self, Upserted::Created(_))
    }
}

/// Edits `anchor` in place when it still exists, otherwise posts a new
/// artifact. Repeating the call with a live anchor never creates anything.
pub async fn upsert(
    messenger: &dyn Messenger,
    destination: EntityId,
    anchor: Option<ArtifactRef>,
    content: &Notification,
) -> TrackerResult<Upserted> {
    if let Some(anchor) = anchor {
        match messenger
            .edit_notification(destination, anchor, content)
            .await?
        {
            Delivery::Applied => return Ok(Upserted::Edited(anchor)),
            Delivery::NotFound => {
                log_info!("Message {anchor} in channel {destination} is gone; posting a new one")
            }
        }
    }

    let created = messenger.send_notification(destination, content).await?;
    Ok(Upserted::Created(created))
}
