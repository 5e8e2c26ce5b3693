//! Common test utilities for API testing with mocks.
//!
//! Builds the real router over an in-memory registry, a [`MockExecutor`] and,
//! optionally, a binary updater fed by a [`MockReleaseFeed`].

#![allow(dead_code)]

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use serde_json::Value;
use tempfile::TempDir;
use tower::ServiceExt;

use reelhaul_core::{
    testing::{MockExecutor, MockReleaseFeed},
    BinaryConfig, BinaryUpdateManager, JobRegistry, JobScheduler, SchedulerConfig,
    UpdaterConfig,
};
use reelhaul_server::{api::create_router, state::AppState};

/// Re-export fixtures for test convenience
pub use reelhaul_core::testing::fixtures;

/// Test fixture for API testing with mock dependencies.
///
/// The scheduler is created but not started; tests drive dispatch with
/// [`JobScheduler::dispatch_pending`] unless they call `start()`.
pub struct TestFixture {
    /// The Axum router for testing
    pub router: Router,
    pub registry: Arc<JobRegistry>,
    pub scheduler: Arc<JobScheduler>,
    pub executor: Arc<MockExecutor>,
    /// Present when the fixture was built with the updater enabled
    pub feed: Option<Arc<MockReleaseFeed>>,
    pub temp_dir: TempDir,
}

/// Response from a test request
#[derive(Debug)]
pub struct TestResponse {
    pub status: StatusCode,
    pub body: Value,
    pub text: String,
}

/// Configuration for test fixture.
#[derive(Debug, Clone, Default)]
pub struct TestConfig {
    /// Executions hang until cancelled
    pub hanging_executor: bool,
    /// Build a binary updater over a mock release feed
    pub enable_updater: bool,
}

impl TestConfig {
    pub fn with_hanging_executor() -> Self {
        Self {
            hanging_executor: true,
            ..Default::default()
        }
    }

    pub fn with_updater() -> Self {
        Self {
            enable_updater: true,
            ..Default::default()
        }
    }
}

impl TestFixture {
    /// Create a new test fixture with default mocks.
    pub async fn new() -> Self {
        Self::with_config(TestConfig::default()).await
    }

    /// Create a test fixture with custom configuration.
    pub async fn with_config(test_config: TestConfig) -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");

        let scheduler_config = SchedulerConfig {
            max_concurrent_jobs: 1,
            poll_interval_ms: 20,
            cancel_timeout_ms: 200,
            max_finished_jobs: 0,
        };

        let registry = Arc::new(JobRegistry::new(0));
        let executor = if test_config.hanging_executor {
            Arc::new(MockExecutor::new().with_hang())
        } else {
            Arc::new(MockExecutor::new())
        };
        let scheduler = Arc::new(JobScheduler::new(
            scheduler_config,
            Arc::clone(&registry),
            executor.clone(),
        ));

        let (updater, feed) = if test_config.enable_updater {
            let feed = Arc::new(MockReleaseFeed::with_release("2024.02.01", &["yt-dlp"]));
            let binary = BinaryConfig {
                path: temp_dir.path().join("bin").join("yt-dlp"),
                ..Default::default()
            };
            let manager = Arc::new(BinaryUpdateManager::new(
                binary,
                UpdaterConfig::default(),
                Arc::clone(&registry),
                feed.clone(),
            ));
            (Some(manager), Some(feed))
        } else {
            (None, None)
        };

        let state = Arc::new(AppState::new(
            Arc::clone(&registry),
            Arc::clone(&scheduler),
            updater,
        ));

        Self {
            router: create_router(state),
            registry,
            scheduler,
            executor,
            feed,
            temp_dir,
        }
    }

    pub fn binary_path(&self) -> PathBuf {
        self.temp_dir.path().join("bin").join("yt-dlp")
    }

    /// Send a GET request to the test server.
    pub async fn get(&self, path: &str) -> TestResponse {
        self.request("GET", path, None).await
    }

    /// Send a POST request with JSON body.
    pub async fn post(&self, path: &str, body: Value) -> TestResponse {
        self.request("POST", path, Some(body)).await
    }

    /// Send a POST request without a body.
    pub async fn post_empty(&self, path: &str) -> TestResponse {
        self.request("POST", path, None).await
    }

    /// Send a DELETE request.
    pub async fn delete(&self, path: &str) -> TestResponse {
        self.request("DELETE", path, None).await
    }

    /// Send a POST request with raw string body (for testing malformed JSON).
    pub async fn post_raw(&self, path: &str, body: &str) -> TestResponse {
        let request = Request::builder()
            .method("POST")
            .uri(path)
            .header("Content-Type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap();
        self.send(request).await
    }

    /// Poll a job until it reaches `status`.
    pub async fn wait_for_status(&self, id: &str, status: &str) -> Value {
        let path = format!("/api/v1/jobs/{}", id);
        for _ in 0..200 {
            let response = self.get(&path).await;
            if response.body["status"] == status {
                return response.body;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("job {} never reached status {}", id, status);
    }

    async fn request(&self, method: &str, path: &str, body: Option<Value>) -> TestResponse {
        let mut request_builder = Request::builder().method(method).uri(path);

        let body = if let Some(json_body) = body {
            request_builder = request_builder.header("Content-Type", "application/json");
            Body::from(serde_json::to_vec(&json_body).unwrap())
        } else {
            Body::empty()
        };

        self.send(request_builder.body(body).unwrap()).await
    }

    async fn send(&self, request: Request<Body>) -> TestResponse {
        let response = self
            .router
            .clone()
            .oneshot(request)
            .await
            .expect("Failed to send request");

        let status = response.status();
        let body_bytes = response
            .into_body()
            .collect()
            .await
            .expect("Failed to collect body")
            .to_bytes();

        let text = String::from_utf8_lossy(&body_bytes).into_owned();
        let body: Value = if body_bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&body_bytes).unwrap_or(Value::Null)
        };

        TestResponse { status, body, text }
    }
}

/// Helper to assert a response has expected status.
#[macro_export]
macro_rules! assert_status {
    ($response:expr, $status:expr) => {
        assert_eq!(
            $response.status, $status,
            "Expected status {:?}, got {:?}. Body: {}",
            $status, $response.status, $response.text
        );
    };
}
