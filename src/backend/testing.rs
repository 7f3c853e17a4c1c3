//! In-memory transport for tests. Responses can be held back per path or URL
//! and released later, which lets tests control completion order.

use async_trait::async_trait;
use serde_json::{Value, json};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;

use super::transport::Transport;
use crate::settings::Endpoints;
use crate::{Error, Result};

#[derive(Default)]
pub struct FakeTransport {
    json: Mutex<HashMap<String, Value>>,
    gates: Mutex<HashMap<String, Arc<Semaphore>>>,
    failing: Mutex<HashSet<String>>,
    json_calls: Mutex<Vec<String>>,
    preload_calls: Mutex<Vec<String>>,
    hold_preloads: AtomicBool,
    slow_cancel: AtomicBool,
    running: AtomicUsize,
    max_running: AtomicUsize,
}

pub fn preview_url(item: &str, page: usize) -> String {
    format!("https://i.test/{item}/p{page}_preview.jpg")
}

pub fn full_url(item: &str, page: usize) -> String {
    format!("https://i.test/{item}/p{page}_full.jpg")
}

pub fn archive_url(item: &str) -> String {
    format!("https://i.test/{item}/frames.zip")
}

/// Lets every spawned task run until the runtime goes idle.
pub async fn settle() {
    for _ in 0..200 {
        tokio::task::yield_now().await;
    }
}

impl FakeTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn add_json(&self, path: String, body: Value) {
        self.json
            .lock()
            .unwrap()
            .insert(path, json!({ "error": false, "message": "", "body": body }));
    }

    pub fn add_image_item(&self, id: &str, owner: &str, pages: usize, tags: &[&str]) {
        let pages: Vec<Value> = (0..pages)
            .map(|n| json!({ "previewUrl": preview_url(id, n), "fullUrl": full_url(id, n) }))
            .collect();
        self.add_json(
            Endpoints::default().item_path(id),
            json!({ "id": id, "ownerId": owner, "kind": "image", "title": id, "tags": tags, "pages": pages }),
        );
    }

    pub fn add_animation_item(&self, id: &str, owner: &str) {
        self.add_json(
            Endpoints::default().item_path(id),
            json!({
                "id": id,
                "ownerId": owner,
                "kind": "animation",
                "title": id,
                "tags": [],
                "pages": [{ "previewUrl": preview_url(id, 0), "fullUrl": full_url(id, 0) }]
            }),
        );
        self.add_json(
            Endpoints::default().animation_path(id),
            json!({ "src": archive_url(id), "frames": [{ "file": "0.jpg", "delay": 50 }] }),
        );
    }

    pub fn add_owner(&self, id: &str, name: &str) {
        self.add_json(
            Endpoints::default().owner_path(id),
            json!({ "id": id, "name": name }),
        );
    }

    pub fn fail(&self, key: String) {
        self.failing.lock().unwrap().insert(key);
    }

    /// Holds the response for `key` until `release` is called.
    pub fn hold(&self, key: String) {
        self.gates
            .lock()
            .unwrap()
            .insert(key, Arc::new(Semaphore::new(0)));
    }

    pub fn release(&self, key: &str) {
        let gate = self
            .gates
            .lock()
            .unwrap()
            .entry(key.to_string())
            .or_insert_with(|| Arc::new(Semaphore::new(0)))
            .clone();
        gate.add_permits(1);
    }

    /// Holds every preload (binary or image) until released or cancelled.
    pub fn hold_preloads(&self) {
        self.hold_preloads.store(true, Ordering::SeqCst);
    }

    /// Preloads ignore their cancel token and only finish when released,
    /// like a transfer that takes a while to tear down.
    pub fn slow_cancel(&self) {
        self.slow_cancel.store(true, Ordering::SeqCst);
    }

    pub fn json_calls(&self, path: &str) -> usize {
        self.json_calls
            .lock()
            .unwrap()
            .iter()
            .filter(|p| *p == path)
            .count()
    }

    pub fn preload_calls(&self) -> Vec<String> {
        self.preload_calls.lock().unwrap().clone()
    }

    pub fn running_preloads(&self) -> usize {
        self.running.load(Ordering::SeqCst)
    }

    pub fn max_running_preloads(&self) -> usize {
        self.max_running.load(Ordering::SeqCst)
    }

    async fn wait_gate(&self, key: &str) {
        let gate = self.gates.lock().unwrap().get(key).cloned();
        if let Some(gate) = gate {
            if let Ok(permit) = gate.acquire().await {
                permit.forget();
            }
        }
    }

    fn outcome(&self, url: &str) -> Result<()> {
        if self.failing.lock().unwrap().contains(url) {
            Err(Error::MissingBody(url.to_string()))
        } else {
            Ok(())
        }
    }

    async fn preload(&self, url: &str, cancel: CancellationToken) -> Result<()> {
        self.preload_calls.lock().unwrap().push(url.to_string());
        if self.hold_preloads.load(Ordering::SeqCst) {
            self.gates
                .lock()
                .unwrap()
                .entry(url.to_string())
                .or_insert_with(|| Arc::new(Semaphore::new(0)));
        }

        let now = self.running.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_running.fetch_max(now, Ordering::SeqCst);

        let result = if self.slow_cancel.load(Ordering::SeqCst) {
            self.wait_gate(url).await;
            self.outcome(url)
        } else {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => Err(Error::Cancelled),
                _ = self.wait_gate(url) => self.outcome(url),
            }
        };

        self.running.fetch_sub(1, Ordering::SeqCst);
        result
    }
}

#[async_trait]
impl Transport for FakeTransport {
    async fn fetch_json(&self, path: &str) -> Result<Value> {
        self.json_calls.lock().unwrap().push(path.to_string());
        self.wait_gate(path).await;

        if self.failing.lock().unwrap().contains(path) {
            return Err(Error::Api {
                path: path.to_string(),
                message: "injected failure".to_string(),
            });
        }

        let value = self.json.lock().unwrap().get(path).cloned();
        value.ok_or_else(|| Error::Api {
            path: path.to_string(),
            message: "not found".to_string(),
        })
    }

    async fn fetch_binary(&self, url: &str, cancel: CancellationToken) -> Result<Vec<u8>> {
        self.preload(url, cancel).await.map(|_| Vec::new())
    }

    async fn decode_image(&self, url: &str, cancel: CancellationToken) -> Result<()> {
        self.preload(url, cancel).await
    }
}
