//! JSON/wire DTOs for the `/api/user` boundary. Money crosses the wire as
//! `f64` (§3/§9 — floating point on egress only, decimal everywhere else).

use chrono::{DateTime, Utc};
use rust_decimal::prelude::ToPrimitive;
use serde::{Deserialize, Serialize};

use crate::domain::{BalanceInfo, Order, Withdrawal};

#[derive(Debug, Deserialize)]
pub struct CredentialsRequest {
    pub login: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct OrderResponse {
    pub number: String,
    pub status: &'static str,
    pub accrual: f64,
    pub uploaded_at: DateTime<Utc>,
}

impl From<Order> for OrderResponse {
    fn from(order: Order) -> Self {
        Self {
            number: order.number,
            status: order.status.as_str(),
            accrual: order.accrual.to_f64().unwrap_or(0.0),
            uploaded_at: order.uploaded_at,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct BalanceResponse {
    pub current: f64,
    pub withdrawn: f64,
}

impl From<BalanceInfo> for BalanceResponse {
    fn from(info: BalanceInfo) -> Self {
        Self {
            current: info.current.to_f64().unwrap_or(0.0),
            withdrawn: info.withdrawn.to_f64().unwrap_or(0.0),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct WithdrawRequest {
    pub order: String,
    pub sum: f64,
}

#[derive(Debug, Serialize)]
pub struct WithdrawalResponse {
    pub order: String,
    pub sum: f64,
    pub processed_at: DateTime<Utc>,
}

impl From<Withdrawal> for WithdrawalResponse {
    fn from(w: Withdrawal) -> Self {
        Self {
            order: w.order_number,
            sum: w.amount.to_f64().unwrap_or(0.0),
            processed_at: w.processed_at,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub db: &'static str,
    pub uptime_secs: i64,
}
