#![allow(dead_code)]

use axum::body::{Body, to_bytes};
use axum::http::{Request, Response};
use serde_json::Value;
use std::path::PathBuf;
use std::time::{SystemTime, UNIX_EPOCH};
use vetdesk::config::Config;
use vetdesk::db::Storage;
use vetdesk::social::SocialService;

pub const CLINIC_KEY: &str = "test-clinic-key";

/// A throwaway SQLite file, removed on drop.
pub struct TempDb {
    pub path: PathBuf,
    pub storage: Storage,
}

impl TempDb {
    pub async fn new(label: &str) -> Self {
        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("system time before UNIX_EPOCH")
            .as_nanos();
        let mut path = std::env::temp_dir();
        path.push(format!(
            "vetdesk-{label}-{}-{}.sqlite",
            std::process::id(),
            nanos
        ));
        let database_url = format!("sqlite:{}", path.display());
        let storage = Storage::connect(&database_url)
            .await
            .expect("failed to open temp database");
        Self { path, storage }
    }
}

impl Drop for TempDb {
    fn drop(&mut self) {
        let _ = std::fs::remove_file(&self.path);
    }
}

pub fn test_config() -> Config {
    let mut cfg = Config::default();
    cfg.basic.clinic_key = CLINIC_KEY.to_string();
    cfg.basic.insecure_cookie = true;
    cfg
}

pub async fn build_state(db: &TempDb, cfg: &Config, social: SocialService) -> vetdesk::AppState {
    let bus = vetdesk::service::message_bus::spawn(
        db.storage.clone(),
        cfg.messaging.channel_capacity,
    )
    .await
    .expect("failed to spawn message bus");
    vetdesk::AppState::new(db.storage.clone(), bus, social, &cfg.basic, &cfg.messaging)
}

pub fn social_service(db: &TempDb, cfg: &Config) -> SocialService {
    SocialService::new(cfg.social.clone(), db.storage.clone(), None)
        .expect("failed to build social service")
}

pub fn json_request(method: &str, uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", "application/json")
        .header("x-api-key", CLINIC_KEY)
        .body(Body::from(body.to_string()))
        .expect("failed to build request")
}

pub fn get_request(uri: &str) -> Request<Body> {
    Request::builder()
        .method("GET")
        .uri(uri)
        .header("x-api-key", CLINIC_KEY)
        .body(Body::empty())
        .expect("failed to build request")
}

pub async fn body_json(resp: Response<Body>) -> Value {
    let body = to_bytes(resp.into_body(), usize::MAX)
        .await
        .expect("failed to read response body");
    serde_json::from_slice(&body).expect("response body was not JSON")
}
