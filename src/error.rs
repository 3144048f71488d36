use thiserror::Error;

/// Top-level error type for the gophermart backend.
#[derive(Error, Debug)]
pub enum GophermartError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error("HTTP request error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("JWT error: {0}")]
    Jwt(#[from] jsonwebtoken::errors::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // Repository-level domain errors (§7).
    #[error("unique constraint violation")]
    UniqueConstraintViolation,

    #[error("no such login")]
    InvalidLogin,

    #[error("password mismatch")]
    InvalidPassword,

    #[error("no rows returned")]
    NoRows,

    // Auth service.
    #[error("login already taken")]
    LoginTaken,

    #[error("invalid credentials")]
    InvalidCredentials,

    // Orders service.
    #[error("order already registered by this user")]
    OrderRegistered,

    #[error("order registered by another user")]
    OrderRegisteredByAnotherUser,

    #[error("order number failed Luhn validation")]
    InvalidOrderNumber,

    // Boundary input validation.
    #[error("bad request: {0}")]
    BadRequest(String),

    // Wallet.
    #[error("not enough balance")]
    NotEnoughBalance,

    // Accrual client.
    #[error("accrual system has no record of this order")]
    NoOrderFound,

    #[error("accrual system rate limit in effect")]
    TooManyRequests,

    #[error("accrual system returned unexpected status {status}")]
    AccrualTransport { status: u16 },

    // Retry primitive.
    #[error("all retry attempts failed")]
    AllAttemptsFailed,

    // Orders monitor / shutdown.
    #[error("operation cancelled")]
    Cancelled,

    #[error("order {0} has no recorded status")]
    InvalidOrderStatus(String),

    #[error("{0}")]
    Other(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, GophermartError>;

impl GophermartError {
    /// True for the PostgreSQL SQLSTATE class 08 (connection exception) —
    /// the only class the storage executor retries transparently.
    pub fn is_retryable_connection_error(&self) -> bool {
        match self {
            GophermartError::Database(sqlx::Error::Database(db_err)) => db_err
                .code()
                .map(|code| code.starts_with("08"))
                .unwrap_or(false),
            _ => false,
        }
    }
}
