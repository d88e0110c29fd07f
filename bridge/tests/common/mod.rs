//! Shared fixtures: an in-memory chat platform that tracks stream closes.
#![allow(dead_code)]

use async_trait::async_trait;
use line_photos_bridge::{
    credential::{CredentialCache, OAuthClient},
    dispatch::{DispatchSettings, EventDispatcher},
    error::{BridgeError, BridgeResult},
    line::{ChatEvent, ChatPlatform, MessageContent},
};
use httpmock::MockServer;
use serde_json::json;
use std::{
    collections::HashMap,
    io::Cursor,
    pin::Pin,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc, Mutex,
    },
    task::{Context, Poll},
};
use tokio::io::{AsyncRead, ReadBuf};

pub const JPEG: &[u8] = &[0xFF, 0xD8, 0xFF, 0xE0, 0x00, 0x10, b'J', b'F', b'I', b'F', 0x00, 0x01];

/// Counts how many content streams were dropped.
struct TrackedReader {
    inner:  Cursor<Vec<u8>>,
    closed: Arc<AtomicUsize>,
}

impl AsyncRead for TrackedReader {
    fn poll_read(mut self: Pin<&mut Self>, cx: &mut Context<'_>, buf: &mut ReadBuf<'_>) -> Poll<std::io::Result<()>> {
        Pin::new(&mut self.inner).poll_read(cx, buf)
    }
}

impl Drop for TrackedReader {
    fn drop(&mut self) {
        self.closed.fetch_add(1, Ordering::SeqCst);
    }
}

#[derive(Default)]
pub struct FakePlatform {
    pub contents:     HashMap<String, Vec<u8>>,
    pub names:        HashMap<String, String>,
    pub fetched:      Mutex<Vec<String>>,
    pub opened:       AtomicUsize,
    pub closed:       Arc<AtomicUsize>,
}

impl FakePlatform {
    pub fn with_image(mut self, message_id: &str) -> Self {
        self.contents.insert(message_id.to_string(), JPEG.to_vec());
        self
    }

    pub fn with_name(mut self, user_id: &str, name: &str) -> Self {
        self.names.insert(user_id.to_string(), name.to_string());
        self
    }

    pub fn fetched(&self) -> Vec<String> {
        self.fetched.lock().unwrap().clone()
    }

    pub fn open_streams(&self) -> usize {
        self.opened.load(Ordering::SeqCst) - self.closed.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ChatPlatform for FakePlatform {
    async fn fetch_content(&self, message_id: &str) -> BridgeResult<MessageContent> {
        self.fetched.lock().unwrap().push(message_id.to_string());
        let data = self.contents.get(message_id)
            .cloned()
            .ok_or_else(|| BridgeError::ContentFetch(format!("status=404 body=no content for {message_id}")))?;
        self.opened.fetch_add(1, Ordering::SeqCst);
        Ok(MessageContent::new(Box::new(TrackedReader {
            inner:  Cursor::new(data),
            closed: Arc::clone(&self.closed),
        })))
    }

    async fn display_name(&self, user_id: &str) -> BridgeResult<String> {
        self.names.get(user_id)
            .cloned()
            .ok_or_else(|| BridgeError::ContentFetch(format!("no profile for {user_id}")))
    }
}

pub fn text_event(id: &str, user: &str) -> serde_json::Value {
    json!({"type": "message", "message": {"id": id, "type": "text", "text": "hello"}, "source": {"type": "user", "userId": user}})
}

pub fn image_event(id: &str, user: &str) -> serde_json::Value {
    json!({"type": "message", "message": {"id": id, "type": "image"}, "source": {"type": "user", "userId": user}})
}

pub fn events(values: Vec<serde_json::Value>) -> Vec<ChatEvent> {
    values.into_iter().map(|v| serde_json::from_value(v).unwrap()).collect()
}

pub fn settings(server: &MockServer) -> DispatchSettings {
    DispatchSettings {
        photos_api_base:       server.base_url(),
        album_id:              "album-1".into(),
        fallback_display_name: "someone".into(),
    }
}

pub fn credentials(server: &MockServer) -> Arc<CredentialCache> {
    Arc::new(CredentialCache::new(reqwest::Client::new(), OAuthClient {
        token_url:     server.url("/token"),
        client_id:     "cid".into(),
        client_secret: "csecret".into(),
        refresh_token: "rtok".into(),
    }))
}

pub fn dispatcher(server: &MockServer, platform: Arc<FakePlatform>) -> EventDispatcher {
    EventDispatcher::new(platform, credentials(server), reqwest::Client::new(), settings(server))
}
