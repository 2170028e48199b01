//! Advisory minimum replica counts from an external decision service.
//!
//! The decision service is optional. [`DecisionSource`] makes that explicit:
//! callers ask for an advisory and get `None` whenever the service is
//! disabled, unreachable, slow or answers with garbage.

use anyhow::{Context, Result, bail};
use async_trait::async_trait;
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

use pkg_constants::tuning::DECISION_SERVICE_PATH;

/// An advisory minimum replica count.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScalingDecision {
    pub min_replicas: u32,
}

#[async_trait]
pub trait ScalingDecisionService: Send + Sync {
    /// Ask for the minimum replica count of the autoscaler `name`
    /// (`<namespace>/<name>`), given its current floor and replica count.
    async fn scaling_decision(
        &self,
        name: &str,
        current_min: u32,
        current_replicas: u32,
    ) -> Result<ScalingDecision>;
}

#[derive(Debug, Deserialize)]
struct DecisionServiceResponse {
    decision: DecisionBody,
}

#[derive(Debug, Deserialize)]
struct DecisionBody {
    #[serde(rename = "minCount")]
    min_count: u32,
}

/// Decision service reached over HTTP:
/// `GET <endpoint>/api/HorizontalPodAutoscaler?name=..&current-min=..&current-instance-count=..`
pub struct HttpScalingDecisionService {
    endpoint: String,
    client: reqwest::Client,
}

impl HttpScalingDecisionService {
    pub fn new(endpoint: &str, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("failed to build decision service HTTP client")?;
        Ok(Self {
            endpoint: endpoint.trim_end_matches('/').to_string(),
            client,
        })
    }

    fn url(&self, name: &str, current_min: u32, current_replicas: u32) -> Result<reqwest::Url> {
        let base = format!("{}{}", self.endpoint, DECISION_SERVICE_PATH);
        reqwest::Url::parse_with_params(
            &base,
            &[
                ("name", name.to_string()),
                ("current-min", current_min.to_string()),
                ("current-instance-count", current_replicas.to_string()),
            ],
        )
        .with_context(|| format!("invalid decision service endpoint {}", self.endpoint))
    }
}

#[async_trait]
impl ScalingDecisionService for HttpScalingDecisionService {
    async fn scaling_decision(
        &self,
        name: &str,
        current_min: u32,
        current_replicas: u32,
    ) -> Result<ScalingDecision> {
        let url = self.url(name, current_min, current_replicas)?;
        debug!("Querying decision service: {}", url);

        let resp = self
            .client
            .get(url)
            .header("Accept", "application/json")
            .send()
            .await
            .context("decision service request failed")?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            bail!("decision service returned {}: {}", status, body);
        }

        let body = resp
            .bytes()
            .await
            .context("failed to read decision service response")?;
        let parsed: DecisionServiceResponse = serde_json::from_slice(&body)
            .context("decision service response is not a valid decision")?;

        Ok(ScalingDecision {
            min_replicas: parsed.decision.min_count,
        })
    }
}

/// The decision service as an optional capability.
#[derive(Clone)]
pub enum DecisionSource {
    /// No endpoint configured; every advisory is absent.
    Disabled,
    Enabled(Arc<dyn ScalingDecisionService>),
}

impl DecisionSource {
    /// Build from an optional endpoint. `None` or a blank string disables
    /// the service.
    pub fn from_endpoint(endpoint: Option<&str>, timeout: Duration) -> Result<Self> {
        match endpoint.map(str::trim).filter(|e| !e.is_empty()) {
            Some(endpoint) => {
                info!(
                    "Decision service enabled at {} (timeout={}s)",
                    endpoint,
                    timeout.as_secs()
                );
                let service = HttpScalingDecisionService::new(endpoint, timeout)?;
                Ok(DecisionSource::Enabled(Arc::new(service)))
            }
            None => {
                info!("Decision service disabled (no endpoint configured)");
                Ok(DecisionSource::Disabled)
            }
        }
    }

    pub fn is_enabled(&self) -> bool {
        matches!(self, DecisionSource::Enabled(_))
    }

    /// Ask for an advisory minimum. Any failure collapses to `Err` with the
    /// cause, so the caller can log it and carry on without an advisory.
    pub async fn advisory(
        &self,
        name: &str,
        current_min: u32,
        current_replicas: u32,
    ) -> Result<u32> {
        match self {
            DecisionSource::Disabled => {
                bail!("decision service requested for {} but none is configured", name)
            }
            DecisionSource::Enabled(service) => {
                let decision = service
                    .scaling_decision(name, current_min, current_replicas)
                    .await?;
                info!(
                    "Decision service advises min={} for {}",
                    decision.min_replicas, name
                );
                Ok(decision.min_replicas)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::Router;
    use axum::extract::Query;
    use axum::http::StatusCode;
    use axum::routing::get;
    use std::collections::HashMap;

    async fn serve(app: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{}", addr)
    }

    #[tokio::test]
    async fn parses_min_count_and_sends_query() {
        let app = Router::new().route(
            "/api/HorizontalPodAutoscaler",
            get(|Query(q): Query<HashMap<String, String>>| async move {
                assert_eq!(q.get("name").map(String::as_str), Some("web/frontend"));
                assert_eq!(q.get("current-min").map(String::as_str), Some("1"));
                assert_eq!(
                    q.get("current-instance-count").map(String::as_str),
                    Some("2")
                );
                r#" {"decision":{"minCount":99}}"#
            }),
        );
        let endpoint = serve(app).await;

        let source = DecisionSource::from_endpoint(Some(&endpoint), Duration::from_secs(5)).unwrap();
        assert!(source.is_enabled());
        assert_eq!(source.advisory("web/frontend", 1, 2).await.unwrap(), 99);
    }

    #[tokio::test]
    async fn error_status_and_bad_body_yield_no_advisory() {
        let app = Router::new()
            .route(
                "/broken/api/HorizontalPodAutoscaler",
                get(|| async { (StatusCode::INTERNAL_SERVER_ERROR, "boom") }),
            )
            .route(
                "/garbage/api/HorizontalPodAutoscaler",
                get(|| async { r#"{"decision":{}}"# }),
            );
        let base = serve(app).await;

        let broken =
            DecisionSource::from_endpoint(Some(&format!("{}/broken", base)), Duration::from_secs(5))
                .unwrap();
        assert!(broken.advisory("web/frontend", 1, 1).await.is_err());

        let garbage =
            DecisionSource::from_endpoint(Some(&format!("{}/garbage/", base)), Duration::from_secs(5))
                .unwrap();
        assert!(garbage.advisory("web/frontend", 1, 1).await.is_err());
    }

    #[tokio::test]
    async fn times_out_on_slow_service() {
        let app = Router::new().route(
            "/api/HorizontalPodAutoscaler",
            get(|| async {
                tokio::time::sleep(Duration::from_secs(2)).await;
                r#"{"decision":{"minCount":3}}"#
            }),
        );
        let endpoint = serve(app).await;
        let source =
            DecisionSource::from_endpoint(Some(&endpoint), Duration::from_millis(200)).unwrap();
        assert!(source.advisory("web/frontend", 1, 1).await.is_err());
    }

    #[tokio::test]
    async fn blank_endpoint_disables_service() {
        let source = DecisionSource::from_endpoint(Some("  "), Duration::from_secs(1)).unwrap();
        assert!(!source.is_enabled());
        assert!(source.advisory("web/frontend", 1, 1).await.is_err());

        let source = DecisionSource::from_endpoint(None, Duration::from_secs(1)).unwrap();
        assert!(source.advisory("web/frontend", 1, 1).await.is_err());
    }
}
