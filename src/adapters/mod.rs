pub mod accrual_client;
pub mod executor;
pub mod inflight_set;
pub mod rate_limit_gate;
pub mod repository;

pub use accrual_client::AccrualClient;
pub use executor::{Executor, Scope};
pub use inflight_set::InFlightSet;
pub use rate_limit_gate::RateLimitGate;
pub use repository::Repository;
