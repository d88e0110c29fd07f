/// config.rs — Bridge config loader.
/// Secrets come from the environment and are mandatory; tuning comes from an
/// optional config.json and falls back to defaults.
use serde::{Deserialize, Serialize};
use std::{
    fs,
    path::{Path, PathBuf},
};
use tracing::{info, warn};

use crate::error::{BridgeError, BridgeResult};

pub const DEFAULT_TOKEN_URL:          &str = "https://www.googleapis.com/oauth2/v4/token";
pub const DEFAULT_PHOTOS_API_BASE:    &str = "https://photoslibrary.googleapis.com";
pub const DEFAULT_LINE_API_BASE:      &str = "https://api.line.me";
pub const DEFAULT_LINE_DATA_API_BASE: &str = "https://api-data.line.me";

const SECRET_VARS: [&str; 6] = [
    "LINE_CHANNEL_SECRET",
    "LINE_CHANNEL_ACCESS_TOKEN",
    "OAUTH2_CLIENT_ID",
    "OAUTH2_CLIENT_SECRET",
    "OAUTH2_REFRESH_TOKEN",
    "ALBUM_ID",
];

// ─── Raw JSON shapes (with optional fields for validation) ────────────────────

#[derive(Deserialize, Default, Clone)]
struct RawServer {
    host:      Option<String>,
    port:      Option<u16>,
    log_level: Option<String>,
}

#[derive(Deserialize, Default, Clone)]
struct RawHttp {
    timeout_s: Option<u64>,
}

#[derive(Deserialize, Default, Clone)]
struct RawWebhook {
    deadline_s:            Option<u64>,
    fallback_display_name: Option<String>,
}

#[derive(Deserialize, Default, Clone)]
struct RawEndpoints {
    token_url:          Option<String>,
    photos_api_base:    Option<String>,
    line_api_base:      Option<String>,
    line_data_api_base: Option<String>,
}

#[derive(Deserialize, Default, Clone)]
struct RawConfig {
    #[serde(default)]
    server:    RawServer,
    #[serde(default)]
    http:      RawHttp,
    #[serde(default)]
    webhook:   RawWebhook,
    #[serde(default)]
    endpoints: RawEndpoints,
}

// ─── Validated, exported config ───────────────────────────────────────────────

#[derive(Clone, Debug)]
pub struct Secrets {
    pub line_channel_secret:       String,
    pub line_channel_access_token: String,
    pub oauth2_client_id:          String,
    pub oauth2_client_secret:      String,
    pub oauth2_refresh_token:      String,
    pub album_id:                  String,
}

#[derive(Clone, Debug, Serialize)]
pub struct Endpoints {
    pub token_url:          String,
    pub photos_api_base:    String,
    pub line_api_base:      String,
    pub line_data_api_base: String,
}

impl Default for Endpoints {
    fn default() -> Self {
        Self {
            token_url:          DEFAULT_TOKEN_URL.to_string(),
            photos_api_base:    DEFAULT_PHOTOS_API_BASE.to_string(),
            line_api_base:      DEFAULT_LINE_API_BASE.to_string(),
            line_data_api_base: DEFAULT_LINE_DATA_API_BASE.to_string(),
        }
    }
}

#[derive(Clone, Debug)]
pub struct Config {
    pub secrets: Secrets,

    // Server
    pub host:      String,
    pub port:      u16,
    pub log_level: String,

    // Outbound HTTP
    pub http_timeout_s: u64,

    // Webhook
    pub deadline_s:            u64,
    pub fallback_display_name: String,

    pub endpoints: Endpoints,
}

/// Populate the process environment from `<base_dir>/bridge.env`, or from a
/// `.env` in the working directory when that file is absent. Variables that
/// are already set are left alone. Returns the file that was read.
pub fn load_env_files(base_dir: &Path) -> Option<PathBuf> {
    let env_path = base_dir.join("bridge.env");
    if env_path.exists() {
        dotenvy::from_path(&env_path).ok().map(|_| env_path)
    } else {
        dotenvy::dotenv().ok()
    }
}

impl Config {
    /// Load secrets from the process environment and tuning from
    /// `<base_dir>/config.json`.
    pub fn load(base_dir: &Path) -> BridgeResult<Self> {
        Self::load_with(base_dir, |key| std::env::var(key).ok())
    }

    pub fn load_with(base_dir: &Path, env: impl Fn(&str) -> Option<String>) -> BridgeResult<Self> {
        let secrets = read_secrets(&env)?;
        let raw = read_raw(base_dir);
        let mut cfg = Self::from_raw(secrets, raw);
        if let Some(port) = env("PORT").and_then(|p| p.parse().ok()) {
            cfg.port = port;
        }
        Ok(cfg)
    }

    fn from_raw(secrets: Secrets, r: RawConfig) -> Self {
        let s = &r.server;
        let h = &r.http;
        let w = &r.webhook;
        let e = &r.endpoints;

        macro_rules! clamp {
            ($val:expr, $default:expr, $lo:expr, $hi:expr) => {{
                let v = $val.unwrap_or($default);
                let lo = $lo;
                let hi = $hi;
                if v < lo || v > hi {
                    warn!("config value {} out of range [{lo},{hi}] → default {}", v, $default);
                    $default
                } else {
                    v
                }
            }};
        }

        let log_level_raw = s.log_level.clone().unwrap_or_else(|| "info".to_string());
        let log_level = if ["debug", "info", "warn", "error"].contains(&log_level_raw.as_str()) {
            log_level_raw
        } else {
            warn!("unknown log_level {log_level_raw:?} → info");
            "info".to_string()
        };

        let fallback_display_name = w.fallback_display_name.clone()
            .filter(|n| !n.trim().is_empty())
            .unwrap_or_else(|| "someone".to_string());

        let defaults = Endpoints::default();
        let endpoint = |v: &Option<String>, d: String| {
            v.clone()
                .map(|u| u.trim_end_matches('/').to_string())
                .filter(|u| !u.is_empty())
                .unwrap_or(d)
        };

        Config {
            secrets,

            host:      s.host.clone().unwrap_or_else(|| "0.0.0.0".to_string()),
            port:      s.port.unwrap_or(8080),
            log_level,

            http_timeout_s: clamp!(h.timeout_s, 30, 5, 600),

            deadline_s: clamp!(w.deadline_s, 60, 5, 540),
            fallback_display_name,

            endpoints: Endpoints {
                token_url:          endpoint(&e.token_url, defaults.token_url),
                photos_api_base:    endpoint(&e.photos_api_base, defaults.photos_api_base),
                line_api_base:      endpoint(&e.line_api_base, defaults.line_api_base),
                line_data_api_base: endpoint(&e.line_data_api_base, defaults.line_data_api_base),
            },
        }
    }

    pub fn print_summary(&self) {
        info!("{}", "─".repeat(60));
        info!("LINE → Google Photos bridge");
        info!("   Server  : {}:{}  log={}", self.host, self.port, self.log_level);
        info!("   Webhook : deadline={}s  fallback_name={:?}", self.deadline_s, self.fallback_display_name);
        info!("   HTTP    : timeout={}s", self.http_timeout_s);
        info!("   Album   : {}", redact(&self.secrets.album_id));
        info!("   Photos  : {}", self.endpoints.photos_api_base);
        info!("   OAuth   : {}", self.endpoints.token_url);
        info!("   LINE    : {} / {}", self.endpoints.line_api_base, self.endpoints.line_data_api_base);
        info!("{}", "─".repeat(60));
    }
}

fn read_secrets(env: &impl Fn(&str) -> Option<String>) -> BridgeResult<Secrets> {
    let values: Vec<Option<String>> = SECRET_VARS
        .iter()
        .map(|k| env(k).filter(|v| !v.trim().is_empty()))
        .collect();

    let missing: Vec<&str> = SECRET_VARS
        .iter()
        .zip(&values)
        .filter(|(_, v)| v.is_none())
        .map(|(k, _)| *k)
        .collect();
    if !missing.is_empty() {
        return Err(BridgeError::Config(format!("missing required env: {}", missing.join(", "))));
    }

    let mut it = values.into_iter().flatten();
    let mut next = || it.next().unwrap_or_default();
    Ok(Secrets {
        line_channel_secret:       next(),
        line_channel_access_token: next(),
        oauth2_client_id:          next(),
        oauth2_client_secret:      next(),
        oauth2_refresh_token:      next(),
        album_id:                  next(),
    })
}

fn read_raw(base_dir: &Path) -> RawConfig {
    let path = base_dir.join("config.json");
    if !path.exists() {
        info!("config.json not found → using defaults");
        return RawConfig::default();
    }
    let parsed = fs::read_to_string(&path)
        .map_err(BridgeError::from)
        .and_then(|s| {
            // Keys starting with "_" are comments.
            let mut val: serde_json::Value = serde_json::from_str(&s)?;
            strip_comment_keys(&mut val);
            serde_json::from_value(val).map_err(Into::into)
        });
    match parsed {
        Ok(r) => r,
        Err(e) => {
            warn!("config.json parse error: {e} → using defaults");
            RawConfig::default()
        }
    }
}

fn strip_comment_keys(val: &mut serde_json::Value) {
    if let serde_json::Value::Object(map) = val {
        let keys_to_remove: Vec<String> = map.keys()
            .filter(|k| k.starts_with('_'))
            .cloned()
            .collect();
        for k in keys_to_remove {
            map.remove(&k);
        }
        for v in map.values_mut() {
            strip_comment_keys(v);
        }
    }
}

fn redact(value: &str) -> String {
    let shown: String = value.chars().take(4).collect();
    format!("{shown}…")
}
