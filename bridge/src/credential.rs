/// credential.rs — Single-slot OAuth access-token cache.
/// One album, one credential: every webhook invocation in the process shares
/// the same slot and refreshes it through the refresh-token grant.
use chrono::{TimeZone, Utc};
use reqwest::Client;
use serde::Deserialize;
use tokio::sync::Mutex;
use tracing::info;

use crate::{
    config::Config,
    error::{BridgeError, BridgeResult},
};

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in:   i64,
    #[serde(default)]
    scope:        String,
}

#[derive(Clone, Debug)]
pub struct OAuthClient {
    pub token_url:     String,
    pub client_id:     String,
    pub client_secret: String,
    pub refresh_token: String,
}

impl OAuthClient {
    pub fn from_config(cfg: &Config) -> Self {
        Self {
            token_url:     cfg.endpoints.token_url.clone(),
            client_id:     cfg.secrets.oauth2_client_id.clone(),
            client_secret: cfg.secrets.oauth2_client_secret.clone(),
            refresh_token: cfg.secrets.oauth2_refresh_token.clone(),
        }
    }
}

#[derive(Clone, Debug)]
struct CachedToken {
    token:      String,
    expires_at: i64, // unix seconds
}

pub struct CredentialCache {
    http:  Client,
    oauth: OAuthClient,
    slot:  Mutex<Option<CachedToken>>,
}

impl CredentialCache {
    pub fn new(http: Client, oauth: OAuthClient) -> Self {
        Self { http, oauth, slot: Mutex::new(None) }
    }

    /// Return the cached token while `now < expires_at`, otherwise refresh.
    ///
    /// The slot lock is held across the refresh call, so concurrent callers
    /// that find the token expired wait for the first refresh and then reuse
    /// its result instead of issuing their own.
    pub async fn get_token(&self) -> BridgeResult<String> {
        let mut slot = self.slot.lock().await;
        let now = Utc::now().timestamp();
        if let Some(cached) = slot.as_ref() {
            if now < cached.expires_at {
                return Ok(cached.token.clone());
            }
        }

        let fresh = self.refresh(now).await?;
        let token = fresh.token.clone();
        *slot = Some(fresh);
        Ok(token)
    }

    /// Expiry of the cached token, if any. Unix seconds.
    pub async fn expires_at(&self) -> Option<i64> {
        self.slot.lock().await.as_ref().map(|c| c.expires_at)
    }

    async fn refresh(&self, now: i64) -> BridgeResult<CachedToken> {
        let form = [
            ("refresh_token", self.oauth.refresh_token.as_str()),
            ("client_id",     self.oauth.client_id.as_str()),
            ("client_secret", self.oauth.client_secret.as_str()),
            ("grant_type",    "refresh_token"),
        ];

        let resp = self.http
            .post(&self.oauth.token_url)
            .form(&form)
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(BridgeError::Auth { status: status.as_u16(), body });
        }

        let parsed: TokenResponse = resp.json().await?;
        // Absurd lifetimes pin the expiry at the far end instead of wrapping.
        let expires_at = now.saturating_add(parsed.expires_in);
        let expires_display = Utc.timestamp_opt(expires_at, 0)
            .single()
            .map(|t| t.to_rfc3339())
            .unwrap_or_else(|| expires_at.to_string());
        info!("token generated. scope={} expiredAt={expires_display}", parsed.scope);

        Ok(CachedToken { token: parsed.access_token, expires_at })
    }
}
