//! In-process menu document store.
//!
//! Serves the same REST surface as the flat-file JSON server the menu API
//! runs on: collections are JSON arrays addressed as `/name` and
//! `/name/{id}`, singletons are JSON objects addressed as `/name`. Used by
//! the CLI when `MENU_DB_FILE` is set and by the test-suite, which can also
//! inject failures and hold requests in flight.

use async_trait::async_trait;
use reqwest::Method;
use serde_json::{Map, Value};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard};
use tokio::sync::Semaphore;
use tracing::trace;

use crate::error::TransportError;
use crate::store::RemoteStore;

/// A request the store has seen, in arrival order.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedRequest {
    pub method: Method,
    pub path: String,
    pub body: Option<Value>,
}

#[derive(Debug, Clone)]
struct FailureRule {
    method: Option<Method>,
    path_prefix: String,
    remaining: usize,
    status: u16,
    message: String,
}

impl FailureRule {
    fn matches(&self, method: &Method, path: &str) -> bool {
        self.remaining > 0
            && self.method.as_ref().map_or(true, |m| m == method)
            && path.starts_with(&self.path_prefix)
    }
}

#[derive(Debug, Default)]
struct Inner {
    db: Map<String, Value>,
    next_id: u64,
    failures: Vec<FailureRule>,
    log: Vec<RecordedRequest>,
}

pub struct MemoryStore {
    inner: Mutex<Inner>,
    gated: AtomicBool,
    gate: Semaphore,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    /// An empty menu: default branding and no branches, categories or dishes.
    pub fn new() -> Self {
        let mut db = Map::new();
        db.insert(
            "branding".into(),
            serde_json::json!({ "restaurantName": "" }),
        );
        for name in ["branches", "categories", "dishes"] {
            db.insert(name.into(), Value::Array(Vec::new()));
        }
        Self::with_db(db)
    }

    /// Seed the store from a whole database document.
    pub fn from_document(document: Value) -> Result<Self, TransportError> {
        let Value::Object(db) = document else {
            return Err(TransportError::invalid_body(
                "menu database document must be a JSON object",
            ));
        };
        Ok(Self::with_db(db))
    }

    fn with_db(db: Map<String, Value>) -> Self {
        Self {
            inner: Mutex::new(Inner {
                db,
                next_id: 1,
                ..Inner::default()
            }),
            gated: AtomicBool::new(false),
            gate: Semaphore::new(0),
        }
    }

    /// Seed the store from a flat `db.json` file.
    pub fn from_file(path: &Path) -> std::io::Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        let document: Value = serde_json::from_str(&raw)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
        Self::from_document(document)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Fail the next `times` requests whose path starts with `path_prefix`
    /// (and, when given, use `method`) with HTTP 500.
    pub fn fail_next(&self, method: Option<Method>, path_prefix: &str, times: usize) {
        self.fail_with(method, path_prefix, times, 500, "Internal Server Error");
    }

    pub fn fail_with(
        &self,
        method: Option<Method>,
        path_prefix: &str,
        times: usize,
        status: u16,
        message: &str,
    ) {
        self.lock().failures.push(FailureRule {
            method,
            path_prefix: path_prefix.to_string(),
            remaining: times,
            status,
            message: message.to_string(),
        });
    }

    /// Park every subsequent request until [`MemoryStore::release`] admits it.
    pub fn hold(&self) {
        self.gated.store(true, Ordering::SeqCst);
    }

    pub fn release(&self, requests: usize) {
        self.gate.add_permits(requests);
    }

    /// Stop parking requests and let every parked one through.
    pub fn open(&self) {
        self.gated.store(false, Ordering::SeqCst);
        self.gate.add_permits(Semaphore::MAX_PERMITS / 2);
    }

    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.lock().log.clone()
    }

    pub fn clear_requests(&self) {
        self.lock().log.clear();
    }

    /// Snapshot of the whole database document.
    pub fn document(&self) -> Value {
        Value::Object(self.lock().db.clone())
    }

    /// Items of a collection, or an empty list when it does not exist.
    pub fn collection(&self, name: &str) -> Vec<Value> {
        self.lock()
            .db
            .get(name)
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default()
    }

    fn handle(
        &self,
        method: &Method,
        path: &str,
        body: Option<Value>,
    ) -> Result<Value, TransportError> {
        let mut inner = self.lock();
        inner.log.push(RecordedRequest {
            method: method.clone(),
            path: path.to_string(),
            body: body.clone(),
        });

        if let Some(rule) = inner.failures.iter_mut().find(|r| r.matches(method, path)) {
            rule.remaining -= 1;
            return Err(TransportError::status(rule.status, rule.message.clone()));
        }

        let route = path.split('?').next().unwrap_or_default();
        let segments: Vec<String> = route
            .split('/')
            .filter(|s| !s.is_empty())
            .map(decode_segment)
            .collect();

        match segments.as_slice() {
            [name] => inner.handle_resource(method, name, body),
            [name, id] => inner.handle_item(method, name, id, body),
            _ => Err(not_found(route)),
        }
    }
}

impl Inner {
    fn handle_resource(
        &mut self,
        method: &Method,
        name: &str,
        body: Option<Value>,
    ) -> Result<Value, TransportError> {
        let new_id = (*method == Method::POST).then(|| self.allocate_id(name));
        let resource = self.db.get_mut(name).ok_or_else(|| not_found(name))?;
        match (resource, method.as_str()) {
            (Value::Array(items), "GET") => Ok(Value::Array(items.clone())),
            (Value::Array(items), "POST") => {
                let mut doc = object_body(body)?;
                let has_id = doc
                    .get("id")
                    .map(|v| !v.is_null() && v.as_str() != Some(""))
                    .unwrap_or(false);
                if let (false, Some(id)) = (has_id, new_id) {
                    doc.insert("id".into(), Value::String(id));
                }
                let created = Value::Object(doc);
                items.push(created.clone());
                Ok(created)
            }
            (Value::Object(fields), "GET") => Ok(Value::Object(fields.clone())),
            (Value::Object(fields), "PUT") => {
                *fields = object_body(body)?;
                Ok(Value::Object(fields.clone()))
            }
            (Value::Object(fields), "PATCH") => {
                fields.extend(object_body(body)?);
                Ok(Value::Object(fields.clone()))
            }
            _ => Err(TransportError::status(
                404,
                format!("{method} /{name} is not supported"),
            )),
        }
    }

    fn handle_item(
        &mut self,
        method: &Method,
        name: &str,
        id: &str,
        body: Option<Value>,
    ) -> Result<Value, TransportError> {
        let items = self
            .db
            .get_mut(name)
            .and_then(Value::as_array_mut)
            .ok_or_else(|| not_found(name))?;
        let index = items
            .iter()
            .position(|item| id_matches(item, id))
            .ok_or_else(|| not_found(&format!("{name}/{id}")))?;

        match method.as_str() {
            "GET" => Ok(items[index].clone()),
            "PUT" => {
                let mut doc = object_body(body)?;
                let original_id = items[index].get("id").cloned().unwrap_or(Value::Null);
                doc.insert("id".into(), original_id);
                items[index] = Value::Object(doc);
                Ok(items[index].clone())
            }
            "PATCH" => {
                let mut patch = object_body(body)?;
                patch.remove("id");
                if let Value::Object(fields) = &mut items[index] {
                    fields.extend(patch);
                }
                Ok(items[index].clone())
            }
            "DELETE" => {
                items.remove(index);
                Ok(Value::Object(Map::new()))
            }
            _ => Err(TransportError::status(
                404,
                format!("{method} /{name}/{id} is not supported"),
            )),
        }
    }

    /// Next numeric id not already used in `name`.
    fn allocate_id(&mut self, name: &str) -> String {
        let taken = |candidate: &str| {
            self.db
                .get(name)
                .and_then(Value::as_array)
                .map(|items| items.iter().any(|item| id_matches(item, candidate)))
                .unwrap_or(false)
        };
        let mut id = self.next_id;
        while taken(&id.to_string()) {
            id += 1;
        }
        self.next_id = id + 1;
        id.to_string()
    }
}

fn id_matches(item: &Value, id: &str) -> bool {
    match item.get("id") {
        Some(Value::String(s)) => s == id,
        Some(Value::Number(n)) => n.to_string() == id,
        _ => false,
    }
}

fn object_body(body: Option<Value>) -> Result<Map<String, Value>, TransportError> {
    match body {
        Some(Value::Object(map)) => Ok(map),
        _ => Err(TransportError::status(400, "request body must be a JSON object")),
    }
}

fn not_found(what: &str) -> TransportError {
    TransportError::status(404, format!("{} not found", what.trim_start_matches('/')))
}

fn decode_segment(segment: &str) -> String {
    let bytes = segment.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' && i + 2 < bytes.len() {
            if let (Some(hi), Some(lo)) = (hex_value(bytes[i + 1]), hex_value(bytes[i + 2])) {
                out.push(hi << 4 | lo);
                i += 3;
                continue;
            }
        }
        out.push(bytes[i]);
        i += 1;
    }
    String::from_utf8_lossy(&out).into_owned()
}

fn hex_value(b: u8) -> Option<u8> {
    (b as char).to_digit(16).map(|d| d as u8)
}

#[async_trait]
impl RemoteStore for MemoryStore {
    async fn request(
        &self,
        path: &str,
        method: Method,
        body: Option<Value>,
    ) -> Result<Value, TransportError> {
        if self.gated.load(Ordering::SeqCst) {
            let permit = self
                .gate
                .acquire()
                .await
                .map_err(|e| TransportError::network(format!("memory store closed: {e}")))?;
            permit.forget();
        }
        trace!(method = %method, path = %path, "memory store request");
        self.handle(&method, path, body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn seeded() -> MemoryStore {
        MemoryStore::from_document(json!({
            "branding": { "restaurantName": "Rayhon" },
            "branches": [{ "id": "1", "name": "Chilonzor", "address": "A", "phone": "1" }],
            "categories": [],
            "dishes": [{ "id": 3, "categoryId": "c1", "name": "Plov" }],
        }))
        .unwrap()
    }

    #[tokio::test]
    async fn post_assigns_unused_ids() {
        let store = seeded();
        let created = store
            .request("/branches", Method::POST, Some(json!({ "name": "Yunusobod" })))
            .await
            .unwrap();
        assert_eq!(created["id"], "2");
        assert_eq!(store.collection("branches").len(), 2);
    }

    #[tokio::test]
    async fn put_keeps_id_and_patch_merges() {
        let store = seeded();
        let replaced = store
            .request("/dishes/3", Method::PUT, Some(json!({ "id": "x", "name": "Lagman" })))
            .await
            .unwrap();
        assert_eq!(replaced, json!({ "id": 3, "name": "Lagman" }));

        let patched = store
            .request("/dishes/3", Method::PATCH, Some(json!({ "sortOrder": 4 })))
            .await
            .unwrap();
        assert_eq!(patched["sortOrder"], 4);
        assert_eq!(patched["name"], "Lagman");
    }

    #[tokio::test]
    async fn singleton_put_replaces_whole_object() {
        let store = seeded();
        store
            .request("/branding", Method::PUT, Some(json!({ "restaurantName": "Bahor" })))
            .await
            .unwrap();
        let branding = store.request("/branding", Method::GET, None).await.unwrap();
        assert_eq!(branding, json!({ "restaurantName": "Bahor" }));
    }

    #[tokio::test]
    async fn delete_and_missing_items() {
        let store = seeded();
        let resp = store.request("/branches/1", Method::DELETE, None).await.unwrap();
        assert_eq!(resp, json!({}));
        let err = store
            .request("/branches/1", Method::DELETE, None)
            .await
            .unwrap_err();
        assert!(err.is_not_found());
        let err = store.request("/nope", Method::GET, None).await.unwrap_err();
        assert_eq!(err.status, Some(404));
    }

    #[tokio::test]
    async fn injected_failures_are_consumed_in_order() {
        let store = seeded();
        store.fail_with(Some(Method::GET), "/branches", 1, 503, "maintenance");
        let err = store.request("/branches", Method::GET, None).await.unwrap_err();
        assert_eq!(err.status, Some(503));
        assert_eq!(err.message, "maintenance");
        assert!(store.request("/branches", Method::GET, None).await.is_ok());
        assert_eq!(store.requests().len(), 2);
    }

    #[test]
    fn percent_decoding_round_trips_store_paths() {
        let encoded = crate::store::paths::encode_segment("a b/c");
        assert_eq!(decode_segment(&encoded), "a b/c");
        assert_eq!(decode_segment("100%"), "100%");
    }

    #[test]
    fn from_file_reads_flat_database() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("db.json");
        std::fs::write(&path, r#"{"branches": [], "branding": {}}"#).unwrap();
        let store = MemoryStore::from_file(&path).unwrap();
        assert!(store.collection("branches").is_empty());

        std::fs::write(&path, "[1, 2]").unwrap();
        assert!(MemoryStore::from_file(&path).is_err());
    }
}
