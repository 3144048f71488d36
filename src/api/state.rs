use std::time::Duration;

use crate::adapters::Repository;
use crate::api::auth::TokenFactory;
use crate::services::Wallet;

/// Shared application state for the `/api/user` handlers.
#[derive(Clone)]
pub struct AppState {
    pub repository: Repository,
    pub wallet: Wallet,
    pub token_factory: TokenFactory,
    pub started_at: chrono::DateTime<chrono::Utc>,
}

impl AppState {
    pub fn new(
        repository: Repository,
        wallet: Wallet,
        jwt_secret: impl Into<String>,
        jwt_ttl: Duration,
    ) -> Self {
        Self {
            repository,
            wallet,
            token_factory: TokenFactory::new(jwt_secret, jwt_ttl),
            started_at: chrono::Utc::now(),
        }
    }

    pub fn uptime_seconds(&self) -> i64 {
        (chrono::Utc::now() - self.started_at).num_seconds()
    }
}
