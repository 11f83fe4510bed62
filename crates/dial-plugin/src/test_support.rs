//! In-process stand-in for the audio-control daemon, built on axum the same
//! way the real HTTP surface is: every endpoint is a GET on loopback.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::extract::State;
use axum::http::{StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use axum::{Json, Router};
use serde_json::{json, Value};
use tokio::net::TcpListener;

use crate::daemon::DaemonClient;

#[derive(Default)]
struct Inner {
    apps: Value,
    apps_status: Option<u16>,
    icons: HashMap<u32, String>,
    requests: Vec<String>,
    delay: Duration,
}

#[derive(Clone)]
pub struct FakeDaemon {
    addr: SocketAddr,
    inner: Arc<Mutex<Inner>>,
}

impl FakeDaemon {
    pub async fn start(apps: Value) -> Self {
        let inner = Arc::new(Mutex::new(Inner {
            apps,
            ..Inner::default()
        }));
        let app = Router::new().fallback(handle).with_state(inner.clone());

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let _ = axum::serve(listener, app).await;
        });

        Self { addr, inner }
    }

    pub fn base_url(&self) -> String {
        format!("http://{}", self.addr)
    }

    pub fn client(&self) -> DaemonClient {
        DaemonClient::new(
            self.base_url(),
            Duration::from_secs(1),
            Duration::from_millis(500),
        )
        .unwrap()
    }

    pub fn set_apps(&self, apps: Value) {
        self.inner.lock().unwrap().apps = apps;
    }

    pub fn set_apps_status(&self, status: u16) {
        self.inner.lock().unwrap().apps_status = Some(status);
    }

    pub fn set_icon(&self, pid: u32, data_url: &str) {
        self.inner
            .lock()
            .unwrap()
            .icons
            .insert(pid, data_url.to_string());
    }

    pub fn set_delay(&self, delay: Duration) {
        self.inner.lock().unwrap().delay = delay;
    }

    /// Path and query of every request received so far, in arrival order.
    pub fn requests(&self) -> Vec<String> {
        self.inner.lock().unwrap().requests.clone()
    }

    pub fn requests_to(&self, path: &str) -> Vec<String> {
        self.requests()
            .into_iter()
            .filter(|r| r == path || r.starts_with(&format!("{path}?")))
            .collect()
    }

    /// Wait until at least `count` requests hit `path`.
    pub async fn wait_for(&self, path: &str, count: usize) -> Vec<String> {
        for _ in 0..200 {
            let seen = self.requests_to(path);
            if seen.len() >= count {
                return seen;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!(
            "timed out waiting for {count} request(s) to {path}; saw {:?}",
            self.requests()
        );
    }
}

async fn handle(State(inner): State<Arc<Mutex<Inner>>>, uri: Uri) -> Response {
    let (delay, apps, apps_status, icon) = {
        let mut guard = inner.lock().unwrap();
        let recorded = uri
            .path_and_query()
            .map(|pq| pq.as_str().to_string())
            .unwrap_or_else(|| uri.path().to_string());
        guard.requests.push(recorded);

        let pid = uri
            .query()
            .and_then(|q| q.split('&').find_map(|kv| kv.strip_prefix("pid=")))
            .and_then(|pid| pid.parse::<u32>().ok());
        let icon = pid.and_then(|pid| guard.icons.get(&pid).cloned());
        (guard.delay, guard.apps.clone(), guard.apps_status, icon)
    };

    if !delay.is_zero() {
        tokio::time::sleep(delay).await;
    }

    match uri.path() {
        "/apps" => {
            let status = apps_status
                .and_then(|s| StatusCode::from_u16(s).ok())
                .unwrap_or(StatusCode::OK);
            (status, Json(apps)).into_response()
        }
        "/icon" => match icon {
            Some(data_url) => Json(json!({"status": "ok", "data_url": data_url})).into_response(),
            None => (
                StatusCode::NOT_FOUND,
                Json(json!({"status": "error", "message": "process not found"})),
            )
                .into_response(),
        },
        _ => Json(json!({"status": "ok"})).into_response(),
    }
}
