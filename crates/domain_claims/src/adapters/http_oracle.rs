//! HTTP Similarity Oracle Adapter
//!
//! Talks to the vehicle similarity service over REST. The service keeps one
//! image slot per angle and compares the filled slots pairwise.
//!
//! | operation     | request                                              |
//! |---------------|------------------------------------------------------|
//! | submit        | `POST {base}/upload/{angle}` multipart `file`        |
//! | compare       | `GET {base}/check_car?threshold=`                    |
//! | clear         | `DELETE {base}/clear`                                |
//! | score_image   | `POST {base}/check_car` multipart `file`, `threshold`|
//! | health        | `GET {base}/status`                                  |
//!
//! # Error Handling
//!
//! Responses are mapped to `PortError` variants:
//! - 404 -> `PortError::NotFound`
//! - 4xx -> `PortError::Validation`
//! - 5xx -> `PortError::ServiceUnavailable`
//! - Timeouts -> `PortError::Timeout`
//! - Connection failures -> `PortError::Connection`
//! - Undecodable bodies -> `PortError::Transformation`
//!
//! A circuit breaker stops calling the service after repeated failures.

use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use serde::Deserialize;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;

use core_kernel::{
    AdapterHealth, CircuitBreakerConfig, DomainPort, HealthCheckResult, HealthCheckable,
    PortError,
};

use crate::claim::Angle;
use crate::ports::SimilarityOracle;
use crate::verification::{OracleComparison, PairSimilarity};

const ADAPTER_ID: &str = "http-similarity-oracle";

/// Configuration for the HTTP oracle adapter
#[derive(Debug, Clone)]
pub struct HttpOracleConfig {
    /// Base URL of the service (e.g., "http://localhost:8001")
    pub base_url: String,

    /// Per-request timeout
    pub timeout: Duration,

    /// Circuit breaker configuration
    pub circuit_breaker: Option<CircuitBreakerConfig>,
}

impl HttpOracleConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            ..Default::default()
        }
    }
}

impl Default for HttpOracleConfig {
    fn default() -> Self {
        Self {
            base_url: String::new(),
            timeout: Duration::from_secs(10),
            circuit_breaker: Some(CircuitBreakerConfig::default()),
        }
    }
}

/// Circuit breaker state for fault tolerance
#[derive(Debug)]
struct CircuitBreaker {
    config: CircuitBreakerConfig,
    failure_count: AtomicU64,
    success_count: AtomicU64,
    is_open: AtomicBool,
    last_failure_time: RwLock<Option<Instant>>,
}

impl CircuitBreaker {
    fn new(config: CircuitBreakerConfig) -> Self {
        Self {
            config,
            failure_count: AtomicU64::new(0),
            success_count: AtomicU64::new(0),
            is_open: AtomicBool::new(false),
            last_failure_time: RwLock::new(None),
        }
    }

    async fn is_available(&self) -> bool {
        if !self.is_open.load(Ordering::Relaxed) {
            return true;
        }

        let last_failure = self.last_failure_time.read().await;
        if let Some(time) = *last_failure {
            if time.elapsed() > self.config.open_for {
                // Half-open: let a probe through
                return true;
            }
        }

        false
    }

    fn record_success(&self) {
        self.failure_count.store(0, Ordering::Relaxed);
        let success = self.success_count.fetch_add(1, Ordering::Relaxed) + 1;
        if success >= self.config.success_threshold as u64 {
            self.is_open.store(false, Ordering::Relaxed);
            self.success_count.store(0, Ordering::Relaxed);
        }
    }

    async fn record_failure(&self) {
        self.success_count.store(0, Ordering::Relaxed);
        let failures = self.failure_count.fetch_add(1, Ordering::Relaxed) + 1;
        if failures >= self.config.failure_threshold as u64 {
            self.is_open.store(true, Ordering::Relaxed);
            *self.last_failure_time.write().await = Some(Instant::now());
        }
    }
}

#[derive(Debug, Deserialize)]
struct CompareResponse {
    #[serde(default)]
    similarities: Vec<PairSimilarity>,
    average_similarity: f64,
    same_car: bool,
}

#[derive(Debug, Deserialize)]
struct ScoreResponse {
    similarity_score: f64,
}

/// Similarity oracle backed by the REST service
#[derive(Debug, Clone)]
pub struct HttpSimilarityOracle {
    config: HttpOracleConfig,
    client: reqwest::Client,
    circuit_breaker: Option<Arc<CircuitBreaker>>,
}

impl HttpSimilarityOracle {
    /// Creates a new adapter
    ///
    /// # Arguments
    ///
    /// * `config` - The adapter configuration
    ///
    /// # Returns
    ///
    /// The adapter, or `PortError::Internal` if the HTTP client cannot be built
    pub fn new(config: HttpOracleConfig) -> Result<Self, PortError> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| PortError::internal_with_source("failed to build HTTP client", e))?;
        let circuit_breaker = config
            .circuit_breaker
            .clone()
            .map(|cb| Arc::new(CircuitBreaker::new(cb)));

        Ok(Self {
            config,
            client,
            circuit_breaker,
        })
    }

    /// Returns the base URL of the service
    pub fn base_url(&self) -> &str {
        &self.config.base_url
    }

    /// Checks if the circuit breaker is open (blocking requests)
    pub async fn is_circuit_open(&self) -> bool {
        match self.circuit_breaker {
            Some(ref cb) => !cb.is_available().await,
            None => false,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.config.base_url.trim_end_matches('/'), path)
    }

    fn file_part(angle: Angle, bytes: &[u8]) -> Part {
        Part::bytes(bytes.to_vec()).file_name(format!("{}.jpg", angle))
    }

    /// Sends a request through the circuit breaker and maps failures
    async fn send(&self, request: reqwest::RequestBuilder, operation: &str) -> Result<reqwest::Response, PortError> {
        if let Some(ref cb) = self.circuit_breaker {
            if !cb.is_available().await {
                return Err(PortError::ServiceUnavailable {
                    service: "Circuit breaker is open".to_string(),
                });
            }
        }

        let result = match request.send().await {
            Ok(response) => map_status(response, operation).await,
            Err(err) => Err(map_transport_error(err, operation, self.config.timeout)),
        };

        if let Some(ref cb) = self.circuit_breaker {
            match &result {
                Ok(_) => cb.record_success(),
                Err(err) if err.is_transient() => cb.record_failure().await,
                Err(_) => {}
            }
        }

        tracing::debug!(operation, ok = result.is_ok(), "Similarity oracle call");
        result
    }
}

async fn map_status(response: reqwest::Response, operation: &str) -> Result<reqwest::Response, PortError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = match response.text().await {
        Ok(body) => body,
        Err(err) => {
            tracing::debug!(operation, status = %status, error = %err, "Failed to read oracle error body");
            String::new()
        }
    };
    Err(match status.as_u16() {
        404 => PortError::not_found("OracleResource", operation),
        400..=499 => PortError::validation(format!("{} rejected with {}: {}", operation, status, body)),
        _ => PortError::ServiceUnavailable {
            service: format!("{} returned {}", ADAPTER_ID, status),
        },
    })
}

fn map_transport_error(err: reqwest::Error, operation: &str, timeout: Duration) -> PortError {
    if err.is_timeout() {
        PortError::Timeout {
            operation: operation.to_string(),
            duration_ms: timeout.as_millis() as u64,
        }
    } else if err.is_connect() || err.is_request() {
        PortError::Connection {
            message: format!("{} failed: {}", operation, err),
            source: Some(Box::new(err)),
        }
    } else {
        PortError::internal_with_source(format!("{} failed", operation), err)
    }
}

async fn decode<T: for<'de> Deserialize<'de>>(response: reqwest::Response, operation: &str) -> Result<T, PortError> {
    response.json::<T>().await.map_err(|e| PortError::Transformation {
        message: format!("cannot decode {} response: {}", operation, e),
    })
}

impl DomainPort for HttpSimilarityOracle {}

#[async_trait]
impl HealthCheckable for HttpSimilarityOracle {
    /// Calls the `/status` endpoint of the service
    async fn health_check(&self) -> HealthCheckResult {
        let start = Instant::now();

        if self.is_circuit_open().await {
            return HealthCheckResult::new(ADAPTER_ID, AdapterHealth::Degraded, 0)
                .with_message("Circuit breaker is open");
        }

        let result = self.send(self.client.get(self.url("status")), "status").await;
        let latency_ms = start.elapsed().as_millis() as u64;

        match result {
            Ok(_) => HealthCheckResult::healthy(ADAPTER_ID, latency_ms),
            Err(err) => HealthCheckResult::unhealthy(ADAPTER_ID, latency_ms, err.to_string()),
        }
    }
}

#[async_trait]
impl SimilarityOracle for HttpSimilarityOracle {
    async fn submit(&self, angle: Angle, bytes: &[u8]) -> Result<(), PortError> {
        let form = Form::new().part("file", Self::file_part(angle, bytes));
        let request = self
            .client
            .post(self.url(&format!("upload/{}", angle)))
            .multipart(form);
        self.send(request, "submit").await.map(|_| ())
    }

    async fn compare(&self, threshold: f64) -> Result<OracleComparison, PortError> {
        let request = self
            .client
            .get(self.url("check_car"))
            .query(&[("threshold", threshold)]);
        let response = self.send(request, "compare").await?;
        let body: CompareResponse = decode(response, "compare").await?;

        Ok(OracleComparison {
            similarities: body.similarities,
            average_similarity: body.average_similarity,
            same_car: body.same_car,
        })
    }

    async fn clear(&self) -> Result<(), PortError> {
        let request = self.client.delete(self.url("clear"));
        self.send(request, "clear").await.map(|_| ())
    }

    async fn score_image(
        &self,
        angle: Angle,
        bytes: &[u8],
        threshold: f64,
    ) -> Result<f64, PortError> {
        let form = Form::new()
            .part("file", Self::file_part(angle, bytes))
            .text("threshold", threshold.to_string());
        let request = self.client.post(self.url("check_car")).multipart(form);
        let response = self.send(request, "score_image").await?;
        let body: ScoreResponse = decode(response, "score_image").await?;
        Ok(body.similarity_score)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_url_joining_trims_trailing_slash() {
        let oracle = HttpSimilarityOracle::new(HttpOracleConfig::new("http://oracle:8001/")).unwrap();
        assert_eq!(oracle.url("check_car"), "http://oracle:8001/check_car");
        assert_eq!(oracle.base_url(), "http://oracle:8001/");
    }

    #[tokio::test]
    async fn test_breaker_opens_after_threshold() {
        let cb = CircuitBreaker::new(CircuitBreakerConfig {
            failure_threshold: 2,
            success_threshold: 1,
            open_for: Duration::from_secs(60),
        });
        assert!(cb.is_available().await);
        cb.record_failure().await;
        assert!(cb.is_available().await);
        cb.record_failure().await;
        assert!(!cb.is_available().await);
        cb.record_success();
        assert!(cb.is_available().await);
    }

    #[tokio::test]
    async fn test_truncated_error_body_still_maps_status() {
        use tokio::io::{AsyncReadExt, AsyncWriteExt};

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let server = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut request = vec![0u8; 4096];
            let _ = socket.read(&mut request).await;
            // Promises 64 body bytes and closes after 7
            socket
                .write_all(b"HTTP/1.1 400 Bad Request\r\nContent-Length: 64\r\nConnection: close\r\n\r\npartial")
                .await
                .unwrap();
            socket.shutdown().await.unwrap();
        });

        let oracle = HttpSimilarityOracle::new(HttpOracleConfig {
            base_url: format!("http://{}", addr),
            timeout: Duration::from_secs(2),
            circuit_breaker: None,
        })
        .unwrap();
        let err = oracle.clear().await.unwrap_err();
        server.await.unwrap();

        match err {
            PortError::Validation { message } => assert_eq!(message, "clear rejected with 400 Bad Request: "),
            other => panic!("expected a validation error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_unreachable_service_maps_to_transient_error() {
        // Port 9 (discard) on localhost is expected to refuse connections
        let oracle = HttpSimilarityOracle::new(HttpOracleConfig {
            base_url: "http://127.0.0.1:9".to_string(),
            timeout: Duration::from_millis(500),
            circuit_breaker: None,
        })
        .unwrap();
        let err = oracle.clear().await.unwrap_err();
        assert!(err.is_transient());
    }
}
