/// line.rs — LINE Messaging API: webhook event model, signature check and the
/// two calls the bridge needs (message content, sender profile).
use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use futures::TryStreamExt;
use hmac::{Hmac, Mac};
use reqwest::Client;
use serde::Deserialize;
use sha2::Sha256;
use tokio_util::io::StreamReader;

use crate::{
    config::Config,
    error::{BridgeError, BridgeResult},
    sniff::BoxReader,
};

pub const SIGNATURE_HEADER: &str = "x-line-signature";

// ─── Webhook event shapes ──────────────────────────────────────────────────────

#[derive(Deserialize, Debug)]
pub struct WebhookBody {
    #[serde(default)]
    pub destination: Option<String>,
    pub events:      Vec<ChatEvent>,
}

#[derive(Deserialize, Debug, Clone)]
pub struct ChatEvent {
    #[serde(rename = "type")]
    pub kind:    EventKind,
    #[serde(default)]
    pub message: Option<ChatMessage>,
    #[serde(default)]
    pub source:  Option<EventSource>,
}

#[derive(Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum EventKind {
    Message,
    Follow,
    Unfollow,
    Join,
    Leave,
    Postback,
    #[serde(other)]
    Other,
}

#[derive(Deserialize, Debug, Clone)]
pub struct ChatMessage {
    pub id:   String,
    #[serde(rename = "type")]
    pub kind: MessageKind,
}

#[derive(Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum MessageKind {
    Text,
    Image,
    Video,
    Audio,
    File,
    Location,
    Sticker,
    #[serde(other)]
    Other,
}

#[derive(Deserialize, Debug, Clone, Default)]
pub struct EventSource {
    #[serde(rename = "userId", default)]
    pub user_id: Option<String>,
}

impl ChatEvent {
    /// The image message carried by this event, if it is one.
    pub fn image_message(&self) -> Option<&ChatMessage> {
        if self.kind != EventKind::Message {
            return None;
        }
        self.message.as_ref().filter(|m| m.kind == MessageKind::Image)
    }

    pub fn user_id(&self) -> Option<&str> {
        self.source.as_ref().and_then(|s| s.user_id.as_deref())
    }
}

// ─── Signature ─────────────────────────────────────────────────────────────────

fn body_mac(channel_secret: &str, body: &[u8]) -> BridgeResult<Hmac<Sha256>> {
    let mut mac = Hmac::<Sha256>::new_from_slice(channel_secret.as_bytes())
        .map_err(|e| BridgeError::Signature(e.to_string()))?;
    mac.update(body);
    Ok(mac)
}

/// base64(HMAC-SHA256(channel_secret, body)).
pub fn sign(channel_secret: &str, body: &[u8]) -> BridgeResult<String> {
    Ok(BASE64.encode(body_mac(channel_secret, body)?.finalize().into_bytes()))
}

pub fn verify_signature(channel_secret: &str, body: &[u8], signature: &str) -> BridgeResult<()> {
    let expected = BASE64
        .decode(signature.trim())
        .map_err(|_| BridgeError::Signature("signature is not base64".into()))?;
    let mac = body_mac(channel_secret, body)?;
    mac.verify_slice(&expected)
        .map_err(|_| BridgeError::Signature("signature mismatch".into()))
}

/// Verify the signature header and parse the event batch.
pub fn parse_events(channel_secret: &str, signature: Option<&str>, body: &[u8]) -> BridgeResult<Vec<ChatEvent>> {
    let signature = signature.ok_or_else(|| BridgeError::Signature("missing X-Line-Signature".into()))?;
    verify_signature(channel_secret, body, signature)?;
    let parsed: WebhookBody = serde_json::from_slice(body).map_err(|e| BridgeError::Parse(e.to_string()))?;
    Ok(parsed.events)
}

// ─── Platform seam ─────────────────────────────────────────────────────────────

/// Image bytes of one message. Dropping it closes the underlying stream.
pub struct MessageContent {
    reader: BoxReader,
}

impl MessageContent {
    pub fn new(reader: BoxReader) -> Self {
        Self { reader }
    }

    pub fn into_reader(self) -> BoxReader {
        self.reader
    }
}

#[async_trait]
pub trait ChatPlatform: Send + Sync {
    async fn fetch_content(&self, message_id: &str) -> BridgeResult<MessageContent>;
    async fn display_name(&self, user_id: &str) -> BridgeResult<String>;
}

#[derive(Deserialize)]
struct Profile {
    #[serde(rename = "displayName")]
    display_name: String,
}

pub struct LineClient {
    http:         Client,
    access_token: String,
    api_base:     String,
    data_base:    String,
}

impl LineClient {
    pub fn new(http: Client, access_token: String, api_base: String, data_base: String) -> Self {
        Self { http, access_token, api_base, data_base }
    }

    pub fn from_config(http: Client, cfg: &Config) -> Self {
        Self::new(
            http,
            cfg.secrets.line_channel_access_token.clone(),
            cfg.endpoints.line_api_base.clone(),
            cfg.endpoints.line_data_api_base.clone(),
        )
    }
}

#[async_trait]
impl ChatPlatform for LineClient {
    async fn fetch_content(&self, message_id: &str) -> BridgeResult<MessageContent> {
        let resp = self.http
            .get(format!("{}/v2/bot/message/{message_id}/content", self.data_base))
            .bearer_auth(&self.access_token)
            .send()
            .await
            .map_err(|e| BridgeError::ContentFetch(e.to_string()))?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(BridgeError::ContentFetch(format!("status={status} body={body}")));
        }

        let stream = resp
            .bytes_stream()
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e));
        Ok(MessageContent::new(Box::new(StreamReader::new(Box::pin(stream)))))
    }

    async fn display_name(&self, user_id: &str) -> BridgeResult<String> {
        let profile: Profile = self.http
            .get(format!("{}/v2/bot/profile/{user_id}", self.api_base))
            .bearer_auth(&self.access_token)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        Ok(profile.display_name)
    }
}
