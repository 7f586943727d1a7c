//! Test server harness for E2E testing
//!
//! Provides `TestConferenceServer` for spawning real Conference Controller
//! instances in tests, wired to the in-memory media platform.

use conference_controller::actors::{ActorMetrics, ConferenceRegistryHandle, RegistrySettings};
use conference_controller::config::Config;
use conference_controller::observability::metrics::init_metrics_recorder;
use conference_controller::observability::HealthState;
use conference_controller::platform::mock::MockMediaPlatform;
use conference_controller::platform::SharedPlatform;
use conference_controller::routes::{self, AppState};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Arc, OnceLock};
use tokio::task::JoinHandle;

/// Websocket URL handed to web participants by test servers.
pub const TEST_WEBSOCKET_URL: &str = "wss://device.test.invalid/ws";

/// Global metrics handle shared by every test server in the process.
static TEST_METRICS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

fn test_metrics_handle() -> PrometheusHandle {
    TEST_METRICS_HANDLE
        .get_or_init(|| {
            init_metrics_recorder()
                .unwrap_or_else(|_| PrometheusBuilder::new().build_recorder().handle())
        })
        .clone()
}

/// Test harness for spawning a Conference Controller in E2E tests.
///
/// # Example
/// ```rust,ignore
/// #[tokio::test]
/// async fn test_health() -> anyhow::Result<()> {
///     let server = TestConferenceServer::spawn().await?;
///
///     let response = server
///         .client()
///         .get(format!("{}/health", server.url()))
///         .send()
///         .await?;
///
///     assert_eq!(response.status(), 200);
///     Ok(())
/// }
/// ```
pub struct TestConferenceServer {
    addr: SocketAddr,
    config: Config,
    platform: Arc<MockMediaPlatform>,
    registry: ConferenceRegistryHandle,
    health: Arc<HealthState>,
    client: reqwest::Client,
    _handle: JoinHandle<()>,
}

impl TestConferenceServer {
    /// Spawn a server with default settings and a fresh mock platform.
    pub async fn spawn() -> Result<Self, anyhow::Error> {
        Self::spawn_with(Arc::new(MockMediaPlatform::new()), &[]).await
    }

    /// Spawn a server against the given mock platform.
    ///
    /// `overrides` are applied on top of the test environment variables,
    /// e.g. `("CC_JOIN_CODE_LENGTH", "1")`.
    ///
    /// The server will:
    /// - Bind to a random available port (127.0.0.1:0)
    /// - Start the registry actor and HTTP server in the background
    pub async fn spawn_with(
        platform: Arc<MockMediaPlatform>,
        overrides: &[(&str, &str)],
    ) -> Result<Self, anyhow::Error> {
        let mut vars = HashMap::from([
            ("CC_BIND_ADDRESS".to_string(), "127.0.0.1:0".to_string()),
            ("CC_INSTANCE_ID".to_string(), "cc-test".to_string()),
            (
                "PLATFORM_API_URL".to_string(),
                "http://platform.test.invalid".to_string(),
            ),
            ("PLATFORM_ACCOUNT_ID".to_string(), "acct-test".to_string()),
            ("PLATFORM_USERNAME".to_string(), "test-user".to_string()),
            ("PLATFORM_PASSWORD".to_string(), "test-password".to_string()),
            (
                "PLATFORM_CALLBACK_URL".to_string(),
                "http://cc.test.invalid/v1/callbacks/platform".to_string(),
            ),
            (
                "DEVICE_WEBSOCKET_URL".to_string(),
                TEST_WEBSOCKET_URL.to_string(),
            ),
            ("CC_DRAIN_SECONDS".to_string(), "0".to_string()),
        ]);
        for (key, value) in overrides {
            vars.insert((*key).to_string(), (*value).to_string());
        }

        let config = Config::from_vars(&vars)
            .map_err(|e| anyhow::anyhow!("Failed to create config: {}", e))?;

        let shared: SharedPlatform = platform.clone();
        let registry = ConferenceRegistryHandle::new(
            config.instance_id.clone(),
            shared,
            RegistrySettings::from_config(&config),
            ActorMetrics::new(),
        )
        .map_err(|e| anyhow::anyhow!("Failed to start registry: {}", e))?;

        let health = Arc::new(HealthState::new());
        let state = Arc::new(AppState {
            registry: registry.clone(),
            config: config.clone(),
        });

        let app = routes::build_routes(state, Arc::clone(&health), test_metrics_handle());

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .map_err(|e| anyhow::anyhow!("Failed to bind test server: {}", e))?;

        let addr = listener
            .local_addr()
            .map_err(|e| anyhow::anyhow!("Failed to get local address: {}", e))?;

        let handle = tokio::spawn(async move {
            if let Err(e) = axum::serve(listener, app).await {
                eprintln!("Test server error: {}", e);
            }
        });

        health.set_ready();

        Ok(Self {
            addr,
            config,
            platform,
            registry,
            health,
            client: reqwest::Client::new(),
            _handle: handle,
        })
    }

    /// Get the base URL of the test server.
    pub fn url(&self) -> String {
        format!("http://{}", self.addr)
    }

    /// Get the socket address.
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Get reference to the server configuration.
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// The in-memory media platform behind this server.
    pub fn platform(&self) -> &Arc<MockMediaPlatform> {
        &self.platform
    }

    /// Handle to the server's registry actor.
    pub fn registry(&self) -> &ConferenceRegistryHandle {
        &self.registry
    }

    pub fn health(&self) -> &Arc<HealthState> {
        &self.health
    }

    /// Shared HTTP client for requests against this server.
    pub fn client(&self) -> &reqwest::Client {
        &self.client
    }

    /// Join a web participant to `slug`, returning the response body.
    pub async fn join_web(
        &self,
        slug: &str,
        name: Option<&str>,
    ) -> Result<serde_json::Value, anyhow::Error> {
        let response = self
            .client
            .post(format!("{}/v1/conferences/{}/participants", self.url(), slug))
            .json(&serde_json::json!({ "name": name }))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            anyhow::bail!("join {} failed with status {}", slug, status);
        }
        Ok(response.json().await?)
    }

    /// Post a platform notification and return the response status.
    pub async fn post_platform_event(
        &self,
        event: serde_json::Value,
    ) -> Result<reqwest::StatusCode, anyhow::Error> {
        let response = self
            .client
            .post(format!("{}/v1/callbacks/platform", self.url()))
            .json(&event)
            .send()
            .await?;
        Ok(response.status())
    }
}

impl Drop for TestConferenceServer {
    fn drop(&mut self) {
        self._handle.abort();
        self.registry.cancel();
    }
}
