//! Core entities shared by the repository, wallet, and orders monitor.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// A registered user. `password_hash` is opaque here — the repository is the
/// only layer that knows it's a `pgcrypto` digest.
#[derive(Debug, Clone)]
pub struct User {
    pub id: i32,
    pub login: String,
}

/// Local order status. Once `Processed` or `Invalid`, never changes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum OrderStatus {
    New,
    Processing,
    Processed,
    Invalid,
}

impl OrderStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, OrderStatus::Processed | OrderStatus::Invalid)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            OrderStatus::New => "NEW",
            OrderStatus::Processing => "PROCESSING",
            OrderStatus::Processed => "PROCESSED",
            OrderStatus::Invalid => "INVALID",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "NEW" => Some(OrderStatus::New),
            "PROCESSING" => Some(OrderStatus::Processing),
            "PROCESSED" => Some(OrderStatus::Processed),
            "INVALID" => Some(OrderStatus::Invalid),
            _ => None,
        }
    }
}

impl std::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone)]
pub struct Order {
    pub number: String,
    pub user_id: i32,
    pub status: OrderStatus,
    pub accrual: Decimal,
    pub uploaded_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct Withdrawal {
    pub user_id: i32,
    pub order_number: String,
    pub amount: Decimal,
    pub processed_at: DateTime<Utc>,
}

/// Aggregate view used by `GET /balance`.
#[derive(Debug, Clone, Copy)]
pub struct BalanceInfo {
    pub current: Decimal,
    pub withdrawn: Decimal,
}

/// The status vocabulary used by the remote ACCRUAL service — distinct from
/// `OrderStatus` because `REGISTERED` has no local counterpart (it collapses
/// into `PROCESSING`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum RemoteStatus {
    Registered,
    Invalid,
    Processing,
    Processed,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RemoteOrder {
    pub order: String,
    pub status: RemoteStatus,
    // The accrual system is an external collaborator wire-compatible with
    // the spec's literal example (`"accrual":729.98`, a bare JSON number),
    // which is incompatible with this crate's own string-based `Decimal`
    // serde default (picked for our own DB-facing DTOs) — so this one field
    // opts back into the float codec explicitly.
    #[serde(default, with = "rust_decimal::serde::float")]
    pub accrual: Decimal,
}
