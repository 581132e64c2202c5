//! Discord REST client and the status message sink
//!
//! [`DiscordSink`] implements [`SurfaceSink`](crate::presentation::SurfaceSink)
//! on top of [`DiscordClient`], remembering message ids in a
//! [`MessageIdRegistry`] file so a restart edits the old messages.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Method, StatusCode};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{debug, info, instrument, warn};

use crate::presentation::sink::{SinkError, SurfaceSink, UnitId};

pub const DEFAULT_API_BASE: &str = "https://discord.com/api/v10";

pub const GREEN: u32 = 3066993;
pub const RED: u32 = 15158332;
pub const BLUE: u32 = 3447003;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub embeds: Vec<Embed>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Embed {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<u32>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub fields: Vec<EmbedField>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub footer: Option<EmbedFooter>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<String>,
}

impl Embed {
    pub fn new(title: impl ToString) -> Self {
        Self {
            title: Some(title.to_string()),
            ..Default::default()
        }
    }

    pub fn description(mut self, description: impl ToString) -> Self {
        self.description = Some(description.to_string());
        self
    }

    pub fn color(mut self, color: u32) -> Self {
        self.color = Some(color);
        self
    }

    pub fn field(mut self, name: impl ToString, value: impl ToString, inline: bool) -> Self {
        self.fields.push(EmbedField {
            name: name.to_string(),
            value: value.to_string(),
            inline,
        });
        self
    }

    pub fn footer(mut self, text: impl ToString) -> Self {
        self.footer = Some(EmbedFooter {
            text: text.to_string(),
        });
        self
    }

    pub fn timestamp(mut self, timestamp: chrono::DateTime<chrono::Utc>) -> Self {
        self.timestamp = Some(timestamp.to_rfc3339());
        self
    }

    pub fn field_value(&self, name: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|field| field.name == name)
            .map(|field| field.value.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmbedField {
    pub name: String,
    pub value: String,
    #[serde(default)]
    pub inline: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmbedFooter {
    pub text: String,
}

#[derive(Default)]
pub struct MessageBuilder {
    content: Option<String>,
    embeds: Vec<Embed>,
}

impl MessageBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn content(mut self, content: impl ToString) -> Self {
        self.content = Some(content.to_string());
        self
    }

    pub fn add_embed(mut self, embed: Embed) -> Self {
        self.embeds.push(embed);
        self
    }

    pub fn build(self) -> Message {
        Message {
            content: self.content,
            embeds: self.embeds,
        }
    }
}

#[derive(Deserialize)]
struct CreatedMessage {
    id: String,
}

/// Minimal Discord REST client for channel messages
#[derive(Debug, Clone)]
pub struct DiscordClient {
    client: Client,
    base_url: String,
    token: String,
}

impl DiscordClient {
    pub fn new(token: impl Into<String>) -> reqwest::Result<Self> {
        Self::with_base_url(token, DEFAULT_API_BASE)
    }

    pub fn with_base_url(token: impl Into<String>, base_url: impl Into<String>) -> reqwest::Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(15))
            .user_agent(concat!("hostwatch/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token: token.into(),
        })
    }

    fn messages_url(&self, channel_id: u64) -> String {
        format!("{}/channels/{channel_id}/messages", self.base_url)
    }

    async fn request(
        &self,
        method: Method,
        url: String,
        body: Option<&Message>,
    ) -> Result<reqwest::Response, SinkError> {
        let mut request = self
            .client
            .request(method, url)
            .header("Authorization", format!("Bot {}", self.token));

        if let Some(body) = body {
            request = request.json(body);
        }

        request
            .send()
            .await
            .map_err(|e| SinkError::Unavailable(format!("request failed: {e}")))
    }

    async fn unexpected(response: reqwest::Response) -> SinkError {
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        if status == StatusCode::TOO_MANY_REQUESTS {
            SinkError::Unavailable("rate limited".to_string())
        } else {
            SinkError::Unavailable(format!("discord answered {status}: {body}"))
        }
    }

    /// Post a new message, returning its id
    #[instrument(skip(self, message))]
    pub async fn send_message(&self, channel_id: u64, message: &Message) -> Result<UnitId, SinkError> {
        let response = self
            .request(Method::POST, self.messages_url(channel_id), Some(message))
            .await?;

        if !response.status().is_success() {
            return Err(Self::unexpected(response).await);
        }

        let created: CreatedMessage = response
            .json()
            .await
            .map_err(|e| SinkError::Unavailable(format!("malformed response: {e}")))?;

        created
            .id
            .parse()
            .map(UnitId)
            .map_err(|_| SinkError::Unavailable(format!("invalid message id {:?}", created.id)))
    }

    #[instrument(skip(self, message))]
    pub async fn edit_message(
        &self,
        channel_id: u64,
        message_id: UnitId,
        message: &Message,
    ) -> Result<(), SinkError> {
        let url = format!("{}/{message_id}", self.messages_url(channel_id));
        let response = self.request(Method::PATCH, url, Some(message)).await?;

        match response.status() {
            status if status.is_success() => Ok(()),
            StatusCode::NOT_FOUND => Err(SinkError::HandleInvalid(message_id)),
            _ => Err(Self::unexpected(response).await),
        }
    }

    /// `Ok(true)` when the message still exists
    #[instrument(skip(self))]
    pub async fn message_exists(&self, channel_id: u64, message_id: UnitId) -> Result<bool, SinkError> {
        let url = format!("{}/{message_id}", self.messages_url(channel_id));
        let response = self.request(Method::GET, url, None).await?;

        match response.status() {
            status if status.is_success() => Ok(true),
            StatusCode::NOT_FOUND => Ok(false),
            _ => Err(Self::unexpected(response).await),
        }
    }
}

/// Hostname to message id, persisted as JSON so a restart edits the same
/// messages instead of posting new ones
#[derive(Debug)]
pub struct MessageIdRegistry {
    path: PathBuf,
    ids: Mutex<BTreeMap<String, u64>>,
}

impl MessageIdRegistry {
    /// Load the registry; a missing or unreadable file starts empty
    pub fn load(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref().to_path_buf();

        let ids = match std::fs::read_to_string(&path) {
            Ok(raw) => serde_json::from_str(&raw).unwrap_or_else(|e| {
                warn!("ignoring malformed {}: {e}", path.display());
                BTreeMap::new()
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => BTreeMap::new(),
            Err(e) => {
                warn!("cannot read {}: {e}", path.display());
                BTreeMap::new()
            }
        };

        debug!("loaded {} message ids", ids.len());
        Self {
            path,
            ids: Mutex::new(ids),
        }
    }

    pub async fn get(&self, hostname: &str) -> Option<UnitId> {
        self.ids.lock().await.get(hostname).copied().map(UnitId)
    }

    pub async fn set(&self, hostname: &str, id: UnitId) -> std::io::Result<()> {
        let mut ids = self.ids.lock().await;
        ids.insert(hostname.to_string(), id.0);
        self.persist(&ids).await
    }

    pub async fn remove(&self, hostname: &str) -> std::io::Result<()> {
        let mut ids = self.ids.lock().await;
        if ids.remove(hostname).is_some() {
            self.persist(&ids).await?;
        }
        Ok(())
    }

    async fn persist(&self, ids: &BTreeMap<String, u64>) -> std::io::Result<()> {
        let json = serde_json::to_vec_pretty(ids)?;
        let tmp = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp, json).await?;
        tokio::fs::rename(&tmp, &self.path).await
    }
}

/// One status message per host in a single channel
pub struct DiscordSink {
    client: DiscordClient,
    channel_id: u64,
    registry: MessageIdRegistry,
}

impl DiscordSink {
    pub fn new(client: DiscordClient, channel_id: u64, registry: MessageIdRegistry) -> Self {
        Self {
            client,
            channel_id,
            registry,
        }
    }

    fn message(content: &Embed) -> Message {
        MessageBuilder::new().add_embed(content.clone()).build()
    }
}

#[async_trait]
impl SurfaceSink for DiscordSink {
    async fn create_unit(&self, hostname: &str, content: &Embed) -> Result<UnitId, SinkError> {
        let id = self
            .client
            .send_message(self.channel_id, &Self::message(content))
            .await?;

        info!("created status message {id} for {hostname}");
        if let Err(e) = self.registry.set(hostname, id).await {
            warn!("cannot persist message id for {hostname}: {e}");
        }
        Ok(id)
    }

    async fn edit_unit(
        &self,
        _hostname: &str,
        unit: UnitId,
        content: &Embed,
    ) -> Result<(), SinkError> {
        self.client
            .edit_message(self.channel_id, unit, &Self::message(content))
            .await
    }

    async fn lookup_existing_unit(&self, hostname: &str) -> Result<Option<UnitId>, SinkError> {
        let Some(id) = self.registry.get(hostname).await else {
            return Ok(None);
        };

        if self.client.message_exists(self.channel_id, id).await? {
            debug!("rebinding {hostname} to message {id}");
            return Ok(Some(id));
        }

        info!("status message {id} for {hostname} is gone");
        if let Err(e) = self.registry.remove(hostname).await {
            warn!("cannot persist message ids: {e}");
        }
        Ok(None)
    }
}
