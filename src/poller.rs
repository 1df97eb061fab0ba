//! Vendor API polling and metric updates.

use reqwest::StatusCode;
use serde_json::Value;
use tokio::sync::watch;
use tracing::{debug, error, info};

use crate::api::{self, SchemaError};
use crate::collector::{
    CIRCUIT_STATUS, HTTP_STATUS, RESPONSE_TIME, SITE_INFORMATION, SITE_STATUS, SharedCollector,
};
use crate::config::ApiConfig;
use crate::mapping::{map_circuit_status, map_site_status, parse_response_time};

/// Error type for a single poll tick. Every variant is recoverable: the tick
/// is skipped and previously stored values keep serving.
#[derive(Debug, thiserror::Error)]
pub enum PollError {
    #[error("Request failed: {0}")]
    Transport(reqwest::Error),
    #[error("API returned HTTP {0}")]
    Status(StatusCode),
    #[error("Failed to decode response body: {0}")]
    Decode(reqwest::Error),
    #[error("Schema error: {0}")]
    Schema(#[from] SchemaError),
}

/// Polls the vendor status API and writes gauges into the shared collector.
pub struct ApiPoller {
    client: reqwest::Client,
    config: ApiConfig,
    collector: SharedCollector,
}

impl ApiPoller {
    /// Create a new poller with a bounded request timeout.
    pub fn new(config: ApiConfig, collector: SharedCollector) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout())
            .build()?;

        Ok(Self {
            client,
            config,
            collector,
        })
    }

    /// Run the polling loop until the shutdown signal is received.
    ///
    /// Ticks never overlap: each poll fully completes before the interval
    /// sleep starts, so a slow poll delays the next tick rather than stacking.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        let interval = self.config.poll_interval();

        info!(
            url = %self.config.url,
            interval_secs = self.config.scrape_frequency,
            "Starting API poller"
        );

        loop {
            match self.poll_once().await {
                Ok(count) => {
                    self.collector.record_poll(true);
                    debug!(series = count, "Poll completed");
                }
                Err(e) => {
                    self.collector.record_poll(false);
                    error!("Polling error: {}", e);
                }
            }

            tokio::select! {
                _ = tokio::time::sleep(interval) => {}
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }

        info!("API poller stopped");
    }

    /// Perform a single poll cycle, returning the number of series updated.
    ///
    /// Gauges set before a failure point stay set; there is no rollback.
    pub async fn poll_once(&self) -> Result<usize, PollError> {
        let response = self
            .client
            .get(&self.config.url)
            .basic_auth(&self.config.token_key, Some(&self.config.token_auth))
            .send()
            .await
            .map_err(PollError::Transport)?;

        let status = response.status();
        if !status.is_success() {
            return Err(PollError::Status(status));
        }

        let body: Value = response.json().await.map_err(PollError::Decode)?;
        let mut count = 0;

        // Optional top-level observability fields
        if let Some(raw) = body.get("response_time").and_then(Value::as_str) {
            match parse_response_time(raw) {
                Some(latency) => {
                    self.collector.set_scalar(RESPONSE_TIME, latency);
                    count += 1;
                }
                None => debug!(value = raw, "Unparseable response_time, skipping"),
            }
        }

        if let Some(code) = body.get("http_status").and_then(Value::as_f64) {
            self.collector.set_scalar(HTTP_STATUS, code);
            count += 1;
        }

        let sites = api::extract_sites(&body)?;

        for site in &sites {
            let site_id = site.site_id.as_label();
            let company_id = site.company_id.as_label();
            self.collector.set_info(
                SITE_INFORMATION,
                &[
                    ("site_id", &site_id),
                    ("site_name", &site.site_name),
                    ("company_name", &site.company_name),
                    ("company_id", &company_id),
                ],
            );
            count += 1;

            match map_site_status(&site.site_status) {
                Some(ordinal) => {
                    self.collector.set_gauge(
                        SITE_STATUS,
                        &[
                            ("site_name", &site.site_name),
                            ("site_status", &site.site_status),
                        ],
                        ordinal,
                    );
                    count += 1;
                }
                None => debug!(
                    site = %site.site_name,
                    status = %site.site_status,
                    "Unmapped site status, skipping"
                ),
            }

            for circuit in &site.circuits {
                match map_circuit_status(&circuit.circuit_status) {
                    Some(ordinal) => {
                        self.collector.set_gauge(
                            CIRCUIT_STATUS,
                            &[
                                ("site_name", &site.site_name),
                                ("circuit_name", &circuit.circuit_name),
                            ],
                            ordinal,
                        );
                        count += 1;
                    }
                    None => debug!(
                        site = %site.site_name,
                        circuit = %circuit.circuit_name,
                        status = %circuit.circuit_status,
                        "Unmapped circuit status, skipping"
                    ),
                }
            }
        }

        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collector::MetricCollector;
    use axum::Router;
    use axum::http::HeaderMap;
    use axum::routing::get;
    use parking_lot::Mutex;
    use std::net::SocketAddr;
    use std::sync::Arc;

    /// Spawn a mock vendor API that returns a fixed status and body, and
    /// records the Authorization header of the last request.
    async fn spawn_mock(
        status: StatusCode,
        body: &str,
        seen_auth: Arc<Mutex<Option<String>>>,
    ) -> SocketAddr {
        let body = body.to_string();
        let app = Router::new().route(
            "/",
            get(move |headers: HeaderMap| {
                let seen_auth = seen_auth.clone();
                let body = body.clone();
                async move {
                    *seen_auth.lock() = headers
                        .get("authorization")
                        .and_then(|v| v.to_str().ok())
                        .map(String::from);
                    (status, body)
                }
            }),
        );

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        addr
    }

    fn make_config(addr: SocketAddr) -> ApiConfig {
        ApiConfig {
            url: format!("http://{}/", addr),
            token_key: "key".to_string(),
            token_auth: "secret".to_string(),
            scrape_frequency: 60,
            timeout_secs: 5,
        }
    }

    fn sample_body() -> &'static str {
        r#"{
            "response_time": "482ms",
            "http_status": 200,
            "data": {
                "sites": [
                    {
                        "site_id": 1, "site_name": "A", "company_name": "Acme", "company_id": 10,
                        "site_status": "Site Healthy",
                        "circuits": [{ "circuit_name": "c1", "circuit_status": "Healthy" }]
                    },
                    {
                        "site_id": 2, "site_name": "B", "company_name": "Acme", "company_id": 10,
                        "site_status": "Circuit Issues",
                        "circuits": [{ "circuit_name": "c2", "circuit_status": "Circuit Down" }]
                    }
                ]
            }
        }"#
    }

    #[tokio::test]
    async fn test_poll_once_sets_documented_series() {
        let seen_auth = Arc::new(Mutex::new(None));
        let addr = spawn_mock(StatusCode::OK, sample_body(), seen_auth.clone()).await;

        let collector = Arc::new(MetricCollector::new());
        let poller = ApiPoller::new(make_config(addr), collector.clone()).unwrap();

        poller.poll_once().await.unwrap();

        assert_eq!(
            collector.value(
                SITE_STATUS,
                &[("site_name", "A"), ("site_status", "Site Healthy")]
            ),
            Some(0.0)
        );
        assert_eq!(
            collector.value(
                SITE_STATUS,
                &[("site_name", "B"), ("site_status", "Circuit Issues")]
            ),
            Some(2.0)
        );
        assert_eq!(
            collector.value(CIRCUIT_STATUS, &[("site_name", "A"), ("circuit_name", "c1")]),
            Some(0.0)
        );
        assert_eq!(
            collector.value(CIRCUIT_STATUS, &[("site_name", "B"), ("circuit_name", "c2")]),
            Some(2.0)
        );
        assert_eq!(collector.value(RESPONSE_TIME, &[]), Some(482.0));
        assert_eq!(collector.value(HTTP_STATUS, &[]), Some(200.0));
    }

    #[tokio::test]
    async fn test_poll_once_sends_basic_auth() {
        let seen_auth = Arc::new(Mutex::new(None));
        let addr = spawn_mock(StatusCode::OK, sample_body(), seen_auth.clone()).await;

        let collector = Arc::new(MetricCollector::new());
        let poller = ApiPoller::new(make_config(addr), collector).unwrap();
        poller.poll_once().await.unwrap();

        // base64("key:secret")
        let auth = seen_auth.lock().clone().unwrap();
        assert_eq!(auth, "Basic a2V5OnNlY3JldA==");
    }

    #[tokio::test]
    async fn test_poll_once_transport_error() {
        // Bind and drop to find a port nothing listens on.
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let collector = Arc::new(MetricCollector::new());
        collector.set_scalar(RESPONSE_TIME, 10.0);

        let poller = ApiPoller::new(make_config(addr), collector.clone()).unwrap();
        let err = poller.poll_once().await.unwrap_err();

        assert!(matches!(err, PollError::Transport(_)));
        // Previous values survive the failed tick.
        assert_eq!(collector.value(RESPONSE_TIME, &[]), Some(10.0));
    }

    #[tokio::test]
    async fn test_poll_once_http_error() {
        let seen_auth = Arc::new(Mutex::new(None));
        let addr = spawn_mock(StatusCode::INTERNAL_SERVER_ERROR, "{}", seen_auth).await;

        let collector = Arc::new(MetricCollector::new());
        let poller = ApiPoller::new(make_config(addr), collector.clone()).unwrap();
        let err = poller.poll_once().await.unwrap_err();

        assert!(matches!(err, PollError::Status(s) if s == StatusCode::INTERNAL_SERVER_ERROR));
        assert_eq!(collector.series_count(), 0);
    }

    #[tokio::test]
    async fn test_poll_once_decode_error() {
        let seen_auth = Arc::new(Mutex::new(None));
        let addr = spawn_mock(StatusCode::OK, "not json", seen_auth).await;

        let collector = Arc::new(MetricCollector::new());
        let poller = ApiPoller::new(make_config(addr), collector.clone()).unwrap();
        let err = poller.poll_once().await.unwrap_err();

        assert!(matches!(err, PollError::Decode(_)));
        assert_eq!(collector.series_count(), 0);
    }

    #[tokio::test]
    async fn test_poll_once_schema_error_keeps_earlier_gauges() {
        // Valid top-level fields but no `data` key: the scalar gauges set in
        // step 2 stay, the tick is aborted, old site gauges survive.
        let body = r#"{ "response_time": "100ms", "http_status": 200 }"#;
        let seen_auth = Arc::new(Mutex::new(None));
        let addr = spawn_mock(StatusCode::OK, body, seen_auth).await;

        let collector = Arc::new(MetricCollector::new());
        collector.set_gauge(
            SITE_STATUS,
            &[("site_name", "A"), ("site_status", "Site Healthy")],
            0.0,
        );

        let poller = ApiPoller::new(make_config(addr), collector.clone()).unwrap();
        let err = poller.poll_once().await.unwrap_err();

        assert!(matches!(err, PollError::Schema(SchemaError::MissingData)));
        assert_eq!(collector.value(RESPONSE_TIME, &[]), Some(100.0));
        assert_eq!(
            collector.value(
                SITE_STATUS,
                &[("site_name", "A"), ("site_status", "Site Healthy")]
            ),
            Some(0.0)
        );
    }

    #[tokio::test]
    async fn test_poll_once_unmapped_statuses_skipped() {
        let body = r#"{
            "data": {
                "sites": [
                    {
                        "site_id": 1, "site_name": "A", "company_name": "Acme", "company_id": 10,
                        "site_status": "Under Maintenance",
                        "circuits": [{ "circuit_name": "c1", "circuit_status": "Flapping" }]
                    }
                ]
            }
        }"#;
        let seen_auth = Arc::new(Mutex::new(None));
        let addr = spawn_mock(StatusCode::OK, body, seen_auth).await;

        let collector = Arc::new(MetricCollector::new());
        let poller = ApiPoller::new(make_config(addr), collector.clone()).unwrap();

        // Still a successful tick; only the info series is written.
        poller.poll_once().await.unwrap();

        assert_eq!(
            collector.value(
                SITE_STATUS,
                &[("site_name", "A"), ("site_status", "Under Maintenance")]
            ),
            None
        );
        assert_eq!(
            collector.value(CIRCUIT_STATUS, &[("site_name", "A"), ("circuit_name", "c1")]),
            None
        );
        assert_eq!(collector.series_count(), 1);
    }

    #[tokio::test]
    async fn test_poll_once_missing_optional_fields() {
        let body = r#"{ "data": { "sites": [] } }"#;
        let seen_auth = Arc::new(Mutex::new(None));
        let addr = spawn_mock(StatusCode::OK, body, seen_auth).await;

        let collector = Arc::new(MetricCollector::new());
        let poller = ApiPoller::new(make_config(addr), collector.clone()).unwrap();

        poller.poll_once().await.unwrap();

        assert_eq!(collector.value(RESPONSE_TIME, &[]), None);
        assert_eq!(collector.value(HTTP_STATUS, &[]), None);
    }
}
