use std::{collections::HashMap, time::Duration};

use async_trait::async_trait;
use reqwest::{header::AUTHORIZATION, Client, RequestBuilder, Response, StatusCode};
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::sync::{Mutex, OnceCell};

use crate::{
    error::{TrackerError, TrackerResult},
    models::{ArtifactRef, EntityId},
};

use super::{ButtonStyle, Delivery, Messenger, Notification};

const ENABLE_LOGS: bool = true;
const LOG_TARGET: &str = "fichaje::discord";

use crate::{log_debug, log_warn};

const API_BASE: &str = "https://discord.com/api/v10";
const REQUEST_TIMEOUT_SECS: u64 = 10;
/// How far back `purge_stale` looks for the bot's own messages.
const PURGE_SCAN_LIMIT: u32 = 10;

const COMPONENT_ACTION_ROW: u8 = 1;
const COMPONENT_BUTTON: u8 = 2;

#[derive(Deserialize)]
struct MessageObject {
    id: String,
    author: Option<UserObject>,
}

#[derive(Deserialize)]
struct UserObject {
    id: String,
}

#[derive(Deserialize)]
struct ChannelObject {
    name: Option<String>,
}

/// [`Messenger`] over the Discord REST API, authenticated as a bot.
pub struct DiscordMessenger {
    client: Client,
    token: String,
    base_url: String,
    bot_user_id: OnceCell<u64>,
    channel_names: Mutex<HashMap<EntityId, String>>,
}

impl DiscordMessenger {
    pub fn new(token: impl Into<String>) -> TrackerResult<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .user_agent(concat!("fichaje/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(TrackerError::collaborator)?;

        Ok(Self {
            client,
            token: token.into(),
            base_url: API_BASE.to_string(),
            bot_user_id: OnceCell::new(),
            channel_names: Mutex::new(HashMap::new()),
        })
    }

    /// Points the client at another API root (a proxy or a local stub).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn authorized(&self, builder: RequestBuilder) -> RequestBuilder {
        builder.header(AUTHORIZATION, format!("Bot {}", self.token))
    }

    async fn execute(&self, builder: RequestBuilder) -> TrackerResult<Response> {
        self.authorized(builder)
            .send()
            .await
            .map_err(TrackerError::collaborator)
    }

    async fn bot_user_id(&self) -> TrackerResult<u64> {
        self.bot_user_id
            .get_or_try_init(|| async {
                let response = self.execute(self.client.get(self.url("/users/@me"))).await?;
                let user: UserObject = expect_success(response)
                    .await?
                    .json()
                    .await
                    .map_err(TrackerError::collaborator)?;
                parse_snowflake(&user.id)
            })
            .await
            .copied()
    }
}

#[async_trait]
impl Messenger for DiscordMessenger {
    async fn send_notification(
        &self,
        destination: EntityId,
        content: &Notification,
    ) -> TrackerResult<ArtifactRef> {
        let request = self
            .client
            .post(self.url(&format!("/channels/{destination}/messages")))
            .json(&message_payload(content));

        let message: MessageObject = expect_success(self.execute(request).await?)
            .await?
            .json()
            .await
            .map_err(TrackerError::collaborator)?;

        log_debug!("Posted message {} in channel {destination}", message.id);
        parse_snowflake(&message.id).map(ArtifactRef::new)
    }

    async fn edit_notification(
        &self,
        destination: EntityId,
        artifact: ArtifactRef,
        content: &Notification,
    ) -> TrackerResult<Delivery> {
        let request = self
            .client
            .patch(self.url(&format!("/channels/{destination}/messages/{artifact}")))
            .json(&message_payload(content));

        let response = self.execute(request).await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(Delivery::NotFound);
        }
        expect_success(response).await?;
        Ok(Delivery::Applied)
    }

    async fn delete_notification(
        &self,
        destination: EntityId,
        artifact: ArtifactRef,
    ) -> TrackerResult<Delivery> {
        let request = self
            .client
            .delete(self.url(&format!("/channels/{destination}/messages/{artifact}")));

        let response = self.execute(request).await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(Delivery::NotFound);
        }
        expect_success(response).await?;
        Ok(Delivery::Applied)
    }

    async fn purge_stale(
        &self,
        destination: EntityId,
        keep: Option<ArtifactRef>,
    ) -> TrackerResult<usize> {
        let bot_user_id = self.bot_user_id().await?;
        let request = self
            .client
            .get(self.url(&format!("/channels/{destination}/messages")))
            .query(&[("limit", PURGE_SCAN_LIMIT)]);

        let messages: Vec<MessageObject> = expect_success(self.execute(request).await?)
            .await?
            .json()
            .await
            .map_err(TrackerError::collaborator)?;

        let mut removed = 0;
        for message in messages {
            let authored_by_bot = message
                .author
                .as_ref()
                .and_then(|author| author.id.parse::<u64>().ok())
                == Some(bot_user_id);
            if !authored_by_bot {
                continue;
            }

            let artifact = ArtifactRef::new(parse_snowflake(&message.id)?);
            if Some(artifact) == keep {
                continue;
            }

            match self.delete_notification(destination, artifact).await {
                Ok(Delivery::Applied) => removed += 1,
                Ok(Delivery::NotFound) => {}
                Err(err) => {
                    log_warn!("Could not delete message {artifact} in channel {destination}: {err}")
                }
            }
        }
        Ok(removed)
    }

    async fn resolve_channel_name(&self, entity: EntityId) -> Option<String> {
        if let Some(name) = self.channel_names.lock().await.get(&entity) {
            return Some(name.clone());
        }

        let request = self.client.get(self.url(&format!("/channels/{entity}")));
        let channel: ChannelObject = match self.execute(request).await {
            Ok(response) => match expect_success(response).await {
                Ok(response) => response.json().await.ok()?,
                Err(err) => {
                    log_debug!("Channel {entity} lookup failed: {err}");
                    return None;
                }
            },
            Err(err) => {
                log_debug!("Channel {entity} lookup failed: {err}");
                return None;
            }
        };

        let name = channel.name?;
        self.channel_names
            .lock()
            .await
            .insert(entity, name.clone());
        Some(name)
    }
}

async fn expect_success(response: Response) -> TrackerResult<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    Err(TrackerError::CollaboratorUnavailable(format!(
        "discord answered {status}: {body}"
    )))
}

fn parse_snowflake(raw: &str) -> TrackerResult<u64> {
    raw.parse()
        .map_err(|err| TrackerError::collaborator(format!("invalid snowflake '{raw}': {err}")))
}

fn message_payload(content: &Notification) -> Value {
    let buttons: Vec<Value> = content
        .buttons
        .iter()
        .map(|button| {
            json!({
                "type": COMPONENT_BUTTON,
                "style": button_style(button.style),
                "label": button.label,
                "custom_id": button.custom_id,
            })
        })
        .collect();

    let components = if buttons.is_empty() {
        Vec::new()
    } else {
        vec![json!({ "type": COMPONENT_ACTION_ROW, "components": buttons })]
    };

    json!({
        "embeds": [{
            "title": content.title,
            "description": content.description,
            "color": content.color,
        }],
        "components": components,
    })
}

fn button_style(style: ButtonStyle) -> u8 {
    match style {
        ButtonStyle::Primary => 1,
        ButtonStyle::Success => 3,
        ButtonStyle::Danger => 4,
    }
}
