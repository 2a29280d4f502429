//! Test server harness for E2E testing
//!
//! Provides `TestCircleServer` for spawning real circle server instances in
//! tests, with `MockTransport` standing in for LiveKit.

use crate::tokens::TEST_JWT_SECRET;
use circle_service::config::Config;
use circle_service::routes::{self, AppState};
use circle_service::services::transport::mock::MockTransport;
use metrics_exporter_prometheus::PrometheusBuilder;
use sqlx::PgPool;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::task::JoinHandle;

/// Test harness for spawning the circle service in E2E tests.
///
/// # Example
/// ```rust,ignore
/// #[sqlx::test(migrations = "../../migrations")]
/// async fn test_health_flow_e2e(pool: PgPool) -> Result<()> {
///     let server = TestCircleServer::spawn(pool).await?;
///
///     let response = reqwest::get(format!("{}/health", server.url())).await?;
///
///     assert_eq!(response.status(), 200);
///     Ok(())
/// }
/// ```
pub struct TestCircleServer {
    addr: SocketAddr,
    pool: PgPool,
    config: Config,
    transport: Arc<MockTransport>,
    _handle: JoinHandle<()>,
}

impl TestCircleServer {
    /// Spawn a new test server bound to a random port on 127.0.0.1.
    ///
    /// # Arguments
    /// * `pool` - Database connection pool (typically from `#[sqlx::test]`)
    pub async fn spawn(pool: PgPool) -> Result<Self, anyhow::Error> {
        let vars = HashMap::from([
            (
                "DATABASE_URL".to_string(),
                "postgresql://test/test".to_string(),
            ),
            ("BIND_ADDRESS".to_string(), "127.0.0.1:0".to_string()),
            ("CIRCLE_JWT_SECRET".to_string(), TEST_JWT_SECRET.to_string()),
            ("LIVEKIT_API_KEY".to_string(), "test-api-key".to_string()),
            (
                "LIVEKIT_API_SECRET".to_string(),
                "test-api-secret".to_string(),
            ),
            ("ROOM_LOCK_TIMEOUT_MS".to_string(), "2000".to_string()),
            ("CIRCLE_DRAIN_SECONDS".to_string(), "0".to_string()),
        ]);

        let config = Config::from_vars(&vars)
            .map_err(|e| anyhow::anyhow!("Failed to create config: {}", e))?;

        let transport = Arc::new(MockTransport::new());
        let state = Arc::new(AppState {
            pool: pool.clone(),
            config: config.clone(),
            transport: transport.clone(),
        });

        // A standalone recorder handle; tests must not install a global recorder
        let metrics_handle = PrometheusBuilder::new().build_recorder().handle();

        let app = routes::build_routes(state, metrics_handle);

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .map_err(|e| anyhow::anyhow!("Failed to bind test server: {}", e))?;

        let addr = listener
            .local_addr()
            .map_err(|e| anyhow::anyhow!("Failed to get local address: {}", e))?;

        let handle = tokio::spawn(async move {
            let make_service = app.into_make_service_with_connect_info::<SocketAddr>();
            if let Err(e) = axum::serve(listener, make_service).await {
                eprintln!("Test server error: {}", e);
            }
        });

        Ok(Self {
            addr,
            pool,
            config,
            transport,
            _handle: handle,
        })
    }

    /// Get reference to the database pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
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

    /// The mock transport the server talks to; set connected participants here.
    pub fn transport(&self) -> &Arc<MockTransport> {
        &self.transport
    }
}

impl Drop for TestCircleServer {
    fn drop(&mut self) {
        self._handle.abort();
    }
}
