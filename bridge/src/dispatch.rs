/// dispatch.rs — Walks one webhook batch and uploads every image message.
use axum::http::StatusCode;
use reqwest::Client;
use std::sync::Arc;
use tokio::time::{timeout_at, Instant};
use tracing::{error, info, warn};

use crate::{
    config::Config,
    credential::CredentialCache,
    error::{BridgeError, BridgeResult},
    line::{ChatEvent, ChatMessage, ChatPlatform},
    photos::PhotosUploader,
};

#[derive(Debug)]
pub struct EventFailure {
    pub index:      usize,
    pub message_id: String,
    pub error:      BridgeError,
}

#[derive(Debug, Default)]
pub struct BatchReport {
    pub received: usize,
    pub skipped:  usize,
    pub uploaded: Vec<String>,
    pub failures: Vec<EventFailure>,
    /// Set when a failure stopped the batch before every event was visited.
    pub aborted:  bool,
}

impl BatchReport {
    pub fn is_success(&self) -> bool {
        self.failures.is_empty()
    }

    /// 200 when every image went through, otherwise the first failure's status.
    pub fn status_code(&self) -> StatusCode {
        self.failures
            .first()
            .map(|f| f.error.status_code())
            .unwrap_or(StatusCode::OK)
    }

    pub fn summary(&self) -> String {
        let attempted = self.uploaded.len() + self.failures.len();
        match self.failures.first() {
            None => format!("Uploaded {attempted} image(s), skipped {} event(s)", self.skipped),
            Some(first) => format!(
                "Failed to upload {} of {attempted} image(s){}: message {}: {}",
                self.failures.len(),
                if self.aborted { " (batch aborted)" } else { "" },
                first.message_id,
                first.error,
            ),
        }
    }
}

#[derive(Clone, Debug)]
pub struct DispatchSettings {
    pub photos_api_base:       String,
    pub album_id:              String,
    pub fallback_display_name: String,
}

impl DispatchSettings {
    pub fn from_config(cfg: &Config) -> Self {
        Self {
            photos_api_base:       cfg.endpoints.photos_api_base.clone(),
            album_id:              cfg.secrets.album_id.clone(),
            fallback_display_name: cfg.fallback_display_name.clone(),
        }
    }
}

/// Stateless between batches; the credential cache is the only shared state.
pub struct EventDispatcher {
    platform:    Arc<dyn ChatPlatform>,
    credentials: Arc<CredentialCache>,
    http:        Client,
    settings:    DispatchSettings,
}

impl EventDispatcher {
    pub fn new(
        platform:    Arc<dyn ChatPlatform>,
        credentials: Arc<CredentialCache>,
        http:        Client,
        settings:    DispatchSettings,
    ) -> Self {
        Self { platform, credentials, http, settings }
    }

    /// Process `events` front to back. Non-image events are skipped; a failed
    /// event does not stop the rest unless the failure is a credential refresh.
    /// Every event shares `deadline`; an event still running at the deadline is
    /// cancelled and recorded as failed.
    pub async fn dispatch(&self, events: &[ChatEvent], deadline: Instant) -> BatchReport {
        let mut report = BatchReport { received: events.len(), ..Default::default() };
        info!("Number of events = {}", events.len());

        for (index, ev) in events.iter().enumerate() {
            let Some(msg) = ev.image_message() else {
                info!("Event ignored: type={:?} message={:?}", ev.kind, ev.message.as_ref().map(|m| m.kind));
                report.skipped += 1;
                continue;
            };

            let outcome = if Instant::now() >= deadline {
                // Out of time: record the event without starting any call for it.
                Err(BridgeError::deadline(&format!("waiting to process message {}", msg.id)))
            } else {
                match timeout_at(deadline, self.process(ev, msg)).await {
                    Ok(res) => res,
                    Err(_) => Err(BridgeError::deadline(&format!("processing message {}", msg.id))),
                }
            };

            match outcome {
                Ok(()) => {
                    info!("Upload success: {}", msg.id);
                    report.uploaded.push(msg.id.clone());
                }
                Err(e) => {
                    error!("Failed to upload {}: {e}", msg.id);
                    let abort = e.aborts_batch();
                    report.failures.push(EventFailure { index, message_id: msg.id.clone(), error: e });
                    if abort {
                        report.aborted = true;
                        break;
                    }
                }
            }
        }

        info!("Finished: {}", report.summary());
        report
    }

    /// Content is owned by this call and released on every return path.
    async fn process(&self, ev: &ChatEvent, msg: &ChatMessage) -> BridgeResult<()> {
        let content = self.platform.fetch_content(&msg.id).await?;
        let name = self.resolve_name(ev.user_id()).await;
        let token = self.credentials.get_token().await?;

        let uploader = PhotosUploader::new(
            &self.http,
            &self.settings.photos_api_base,
            &self.settings.album_id,
            token,
        );
        uploader.upload(&name, content.into_reader()).await
    }

    async fn resolve_name(&self, user_id: Option<&str>) -> String {
        let Some(user_id) = user_id else {
            return self.settings.fallback_display_name.clone();
        };
        match self.platform.display_name(user_id).await {
            Ok(name) if !name.is_empty() => name,
            Ok(_) => self.settings.fallback_display_name.clone(),
            Err(e) => {
                warn!("profile lookup failed for {user_id}: {e}");
                self.settings.fallback_display_name.clone()
            }
        }
    }
}
