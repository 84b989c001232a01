//! Shared test fixtures: a fake deployment server and a seeded catalog.
//! Note: #[allow(dead_code)] because each test file compiles common/ separately.

use arkive_catalog::Catalog;
use axum::body::Body;
use axum::extract::State;
use axum::http::{Response, Uri};
use axum::Router;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tempfile::TempDir;

/// A canned response for one artifact path.
#[derive(Clone, Debug)]
#[allow(dead_code)]
pub struct FakeResponse {
    pub status: u16,
    pub etag: Option<String>,
    pub body: Vec<u8>,
}

#[allow(dead_code)]
impl FakeResponse {
    pub fn ok(body: &[u8], etag: &str) -> Self {
        Self {
            status: 200,
            etag: Some(format!("\"{etag}\"")),
            body: body.to_vec(),
        }
    }

    pub fn status(status: u16) -> Self {
        Self {
            status,
            etag: None,
            body: Vec::new(),
        }
    }
}

type ResponseMap = Arc<Mutex<HashMap<String, FakeResponse>>>;

/// A fake deployment server. Unknown paths return 403, the modal
/// "does not exist" signal.
#[derive(Clone)]
#[allow(dead_code)]
pub struct FakeServer {
    pub base_url: String,
    responses: ResponseMap,
}

#[allow(dead_code)]
impl FakeServer {
    pub async fn spawn() -> Self {
        let responses: ResponseMap = Arc::new(Mutex::new(HashMap::new()));
        let app = Router::new()
            .fallback(handle)
            .with_state(responses.clone());
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind fake server");
        let addr = listener.local_addr().expect("local addr");
        tokio::spawn(async move {
            axum::serve(listener, app).await.expect("serve");
        });
        Self {
            base_url: format!("http://{addr}"),
            responses,
        }
    }

    /// Serve a canned response at `<base>/<path>`.
    pub fn set(&self, path: &str, response: FakeResponse) {
        self.responses
            .lock()
            .expect("responses lock")
            .insert(path.to_string(), response);
    }

    /// Serve a deploy history blob.
    pub fn set_history(&self, text: &str) {
        self.set(
            "DeployHistory.txt",
            FakeResponse {
                status: 200,
                etag: None,
                body: text.as_bytes().to_vec(),
            },
        );
    }
}

async fn handle(State(responses): State<ResponseMap>, uri: Uri) -> Response<Body> {
    let path = uri.path().trim_start_matches('/').to_string();
    let canned = responses
        .lock()
        .expect("responses lock")
        .get(&path)
        .cloned();
    match canned {
        Some(response) => {
            let mut builder = Response::builder()
                .status(response.status)
                .header("content-length", response.body.len());
            if let Some(etag) = &response.etag {
                builder = builder.header("etag", etag);
            }
            builder
                .body(Body::from(response.body))
                .expect("build response")
        }
        None => Response::builder()
            .status(403)
            .body(Body::empty())
            .expect("build response"),
    }
}

/// A catalog in a scratch directory, plus an objects root beside it.
#[allow(dead_code)]
pub struct TestCatalog {
    pub catalog: Catalog,
    pub objects_root: std::path::PathBuf,
    _temp_dir: TempDir,
}

#[allow(dead_code)]
impl TestCatalog {
    pub async fn new() -> Self {
        let temp_dir = tempfile::tempdir().expect("create temp dir");
        let objects_root = temp_dir.path().join("objects");
        std::fs::create_dir(&objects_root).expect("create objects root");
        let catalog = Catalog::open(temp_dir.path().join("catalog.db"))
            .await
            .expect("open catalog");
        Self {
            catalog,
            objects_root,
            _temp_dir: temp_dir,
        }
    }
}
