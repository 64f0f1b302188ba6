use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use axum::Router;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::post;
use common::TransformConfig;
use common::storage::filesystem::FilesystemObjectStore;
use sea_orm::DatabaseConnection;
use serde_json::Value;
use tempfile::TempDir;

use engine::database::init_db;

pub struct TestEnv {
    pub db: DatabaseConnection,
    pub store: Arc<FilesystemObjectStore>,
    pub store_dir: PathBuf,
    _dir: TempDir,
}

/// File-backed SQLite plus a filesystem object store, both rooted in one
/// temp directory.
pub async fn test_env() -> TestEnv {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();

    let dir = tempfile::tempdir().unwrap();
    let db_url = format!("sqlite://{}/engine.db?mode=rwc", dir.path().display());
    let db = init_db(&db_url).await.unwrap();

    let store_dir = dir.path().join("objects");
    let store = Arc::new(
        FilesystemObjectStore::new(store_dir.clone(), "http://localhost:9000/store", "test-secret")
            .await
            .unwrap(),
    );

    TestEnv {
        db,
        store,
        store_dir,
        _dir: dir,
    }
}

pub fn config_for(endpoint: &str) -> TransformConfig {
    TransformConfig {
        endpoint: endpoint.to_string(),
        poll_interval_ms: 10,
        max_polls: 50,
        ..TransformConfig::default()
    }
}

/// How the mock remote service answers a dispatch.
#[derive(Clone, Copy)]
pub enum MockMode {
    /// Write every addressed output and answer 201.
    Succeed,
    /// Answer 504 without writing anything.
    GatewayTimeout,
    /// Answer the given status and body without writing anything.
    Reject(u16, &'static str),
}

#[derive(Clone)]
struct MockState {
    store_dir: PathBuf,
    mode: MockMode,
    requests: Arc<Mutex<Vec<(String, Value)>>>,
}

/// In-process stand-in for the remote transformation service. Accepts any
/// POST under its root, records (path, payload), and in `Succeed` mode
/// materializes each output URL the payload names.
pub struct MockTransform {
    pub endpoint: String,
    requests: Arc<Mutex<Vec<(String, Value)>>>,
}

impl MockTransform {
    pub async fn spawn(store_dir: PathBuf, mode: MockMode) -> Self {
        let requests = Arc::new(Mutex::new(Vec::new()));
        let state = MockState {
            store_dir,
            mode,
            requests: requests.clone(),
        };
        let app = Router::new()
            .route("/{*path}", post(handle_dispatch))
            .with_state(state);

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr: SocketAddr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self {
            endpoint: format!("http://{addr}"),
            requests,
        }
    }

    pub fn requests(&self) -> Vec<(String, Value)> {
        self.requests.lock().unwrap().clone()
    }

    pub fn dispatch_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }
}

async fn handle_dispatch(
    State(state): State<MockState>,
    Path(path): Path<String>,
    axum::Json(body): axum::Json<Value>,
) -> impl IntoResponse {
    state.requests.lock().unwrap().push((path, body.clone()));

    match state.mode {
        MockMode::Succeed => {
            for field in [
                "variant_url",
                "preview_image_url",
                "preview_image_variant_url",
            ] {
                if let Some(url) = body.get(field).and_then(Value::as_str) {
                    let key = key_from_url(url);
                    std::fs::write(state.store_dir.join(key), b"derived bytes").unwrap();
                }
            }
            (StatusCode::CREATED, String::new())
        }
        MockMode::GatewayTimeout => (StatusCode::GATEWAY_TIMEOUT, String::new()),
        MockMode::Reject(status, msg) => (
            StatusCode::from_u16(status).unwrap(),
            msg.to_string(),
        ),
    }
}

/// Storage key addressed by an output URL: last path segment, query dropped.
pub fn key_from_url(url: &str) -> &str {
    let path = url.split('?').next().unwrap_or(url);
    path.rsplit('/').next().unwrap_or(path)
}
