//! Client for the external ACCRUAL service.
//!
//! Single endpoint: `GET {base}/api/orders/{number}`. Before issuing a
//! request the client checks the process-wide rate-limit gate and
//! short-circuits without touching the network if it's in the future.

use chrono::{Duration as ChronoDuration, Utc};
use reqwest::StatusCode;
use std::sync::Arc;
use tracing::{debug, instrument, warn};

use crate::adapters::rate_limit_gate::RateLimitGate;
use crate::domain::RemoteOrder;
use crate::error::{GophermartError, Result};

#[derive(Clone)]
pub struct AccrualClient {
    http: reqwest::Client,
    base_url: String,
    gate: Arc<RateLimitGate>,
}

impl AccrualClient {
    pub fn new(base_url: impl Into<String>, gate: Arc<RateLimitGate>) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.into(),
            gate,
        }
    }

    pub fn gate(&self) -> &Arc<RateLimitGate> {
        &self.gate
    }

    #[instrument(skip(self))]
    pub async fn get_order_status(&self, order_number: &str) -> Result<RemoteOrder> {
        if self.gate.is_blocked() {
            return Err(GophermartError::TooManyRequests);
        }

        let url = format!(
            "{}/api/orders/{}",
            self.base_url.trim_end_matches('/'),
            order_number
        );
        let response = self.http.get(&url).send().await?;

        match response.status() {
            StatusCode::OK => {
                let remote: RemoteOrder = response.json().await?;
                Ok(remote)
            }
            StatusCode::NO_CONTENT => Err(GophermartError::NoOrderFound),
            StatusCode::TOO_MANY_REQUESTS => {
                let retry_after_secs = response
                    .headers()
                    .get("Retry-After")
                    .and_then(|v| v.to_str().ok())
                    .and_then(|v| v.parse::<i64>().ok())
                    .unwrap_or(1);
                let candidate = Utc::now() + ChronoDuration::seconds(retry_after_secs);
                self.gate.advance_to(candidate);
                debug!("accrual system rate limited us until {candidate}");
                Err(GophermartError::TooManyRequests)
            }
            other => {
                warn!("accrual system returned unexpected status {other}");
                Err(GophermartError::AccrualTransport {
                    status: other.as_u16(),
                })
            }
        }
    }
}
