//! Fleet scaler capability.
//!
//! The router only emits scale requests; the scaler decides what to do
//! with them.

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::{Result, RouterError};
use crate::load_balancer::backend::WorkloadClass;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScaleDirection {
    In,
    Out,
}

impl ScaleDirection {
    pub fn as_str(&self) -> &'static str {
        match self {
            ScaleDirection::In => "in",
            ScaleDirection::Out => "out",
        }
    }
}

impl fmt::Display for ScaleDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Body of a scale request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScaleRequest {
    pub cluster: String,
    pub namespace: String,
    pub class: WorkloadClass,
    pub direction: ScaleDirection,
    /// Desired member count hint: 0 for scale-in, 1 for scale-out.
    pub target_hint: u32,
    pub max_cost_per_query: i64,
}

#[async_trait]
pub trait FleetScaler: Send + Sync {
    async fn request_scale(&self, request: &ScaleRequest) -> Result<()>;
}

/// POSTs requests as JSON to `{endpoint}/v1/scale`.
#[derive(Debug, Clone)]
pub struct HttpScaler {
    client: reqwest::Client,
    url: String,
}

impl HttpScaler {
    pub fn new(endpoint: &str, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| RouterError::Scaler(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            client,
            url: format!("{}/v1/scale", endpoint.trim_end_matches('/')),
        })
    }
}

#[async_trait]
impl FleetScaler for HttpScaler {
    async fn request_scale(&self, request: &ScaleRequest) -> Result<()> {
        let resp = self
            .client
            .post(&self.url)
            .json(request)
            .send()
            .await
            .map_err(|e| RouterError::Scaler(format!("request to {} failed: {e}", self.url)))?;

        if !resp.status().is_success() {
            return Err(RouterError::Scaler(format!(
                "{} returned status {}",
                self.url,
                resp.status()
            )));
        }
        Ok(())
    }
}

/// Logs requests without sending them anywhere.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogScaler;

#[async_trait]
impl FleetScaler for LogScaler {
    async fn request_scale(&self, request: &ScaleRequest) -> Result<()> {
        tracing::info!(
            cluster = %request.cluster,
            class = %request.class,
            direction = %request.direction,
            target_hint = request.target_hint,
            "Scale request (no scaler endpoint configured)"
        );
        Ok(())
    }
}
