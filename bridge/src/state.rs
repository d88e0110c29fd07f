/// state.rs — Shared application state passed to every Axum handler.
use std::{sync::Arc, time::Duration};

use crate::{
    config::Config,
    credential::{CredentialCache, OAuthClient},
    dispatch::{DispatchSettings, EventDispatcher},
    line::{ChatPlatform, LineClient},
};

#[derive(Clone)]
pub struct AppState {
    pub cfg:        Arc<Config>,
    pub dispatcher: Arc<EventDispatcher>,
}

impl AppState {
    pub fn new(cfg: Arc<Config>, dispatcher: Arc<EventDispatcher>) -> Self {
        Self { cfg, dispatcher }
    }

    /// Production wiring: one HTTP client and one credential cache for the
    /// whole process, LINE as the chat platform.
    pub fn from_config(cfg: Arc<Config>) -> reqwest::Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(cfg.http_timeout_s))
            .build()?;
        let credentials = Arc::new(CredentialCache::new(http.clone(), OAuthClient::from_config(&cfg)));
        let platform: Arc<dyn ChatPlatform> = Arc::new(LineClient::from_config(http.clone(), &cfg));
        let dispatcher = EventDispatcher::new(platform, credentials, http, DispatchSettings::from_config(&cfg));
        Ok(Self::new(cfg, Arc::new(dispatcher)))
    }
}
