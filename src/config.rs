//! CLI/environment configuration.
//!
//! The core contract (§6.3) is three flags — `-a`/`-r`/`-d` — each
//! overridable by an environment variable of *higher* precedence than the
//! flag. That's the inverse of `clap`'s own `#[arg(env = ...)]` precedence,
//! so it's resolved by hand instead of leaning on that attribute. Everything
//! else here (logging level, JWT secret/TTL, monitor tuning, shutdown
//! timeout) is ambient and read straight from the environment with sane
//! defaults, independent of the three core flags.

use std::time::Duration;

use clap::Parser;

const DEFAULT_RUN_ADDRESS: &str = "localhost:8081";
const DEFAULT_ACCRUAL_ADDRESS: &str = "http://localhost:8080";
const DEFAULT_JWT_SECRET: &str = "gophermart-development-secret-change-me";

#[derive(Parser, Debug)]
#[command(name = "gophermart")]
#[command(about = "Loyalty-points backend with asynchronous order reconciliation", long_about = None)]
struct Args {
    /// Address the HTTP server listens on.
    #[arg(short = 'a', long = "run-address", default_value = DEFAULT_RUN_ADDRESS)]
    run_address: String,

    /// Base URL of the external accrual system.
    #[arg(short = 'r', long = "accrual-system-address", default_value = DEFAULT_ACCRUAL_ADDRESS)]
    accrual_system_address: String,

    /// Postgres connection string.
    #[arg(short = 'd', long = "database-uri", default_value = "")]
    database_uri: String,
}

/// Fully resolved process configuration: CLI flags merged with environment
/// overrides, plus the ambient settings §10.1 specifies independently.
#[derive(Debug, Clone)]
pub struct Settings {
    pub run_address: String,
    pub accrual_system_address: String,
    pub database_uri: String,

    pub log_filter: String,
    pub jwt_secret: String,
    pub jwt_ttl: Duration,
    pub shutdown_timeout: Duration,

    pub monitor_tick_period: Duration,
    pub monitor_workers_count: usize,
    pub monitor_tasks_buffer_length: usize,
}

impl Settings {
    /// Parse CLI flags, then let environment variables win where set.
    pub fn load() -> Self {
        let args = Args::parse();
        Self::from_args_and_env(args)
    }

    fn from_args_and_env(args: Args) -> Self {
        let run_address = env_override("RUN_ADDRESS").unwrap_or(args.run_address);
        let accrual_system_address =
            env_override("ACCRUAL_SYSTEM_ADDRESS").unwrap_or(args.accrual_system_address);
        let database_uri = env_override("DATABASE_URI").unwrap_or(args.database_uri);

        let log_filter = env_override("RUST_LOG")
            .or_else(|| env_override("LOG_LEVEL"))
            .unwrap_or_else(|| "info".to_string());

        let jwt_secret =
            env_override("JWT_SECRET").unwrap_or_else(|| DEFAULT_JWT_SECRET.to_string());
        let jwt_ttl = Duration::from_secs(env_parse("JWT_TTL_SECONDS").unwrap_or(3600));
        let shutdown_timeout =
            Duration::from_secs(env_parse("GOPHERMART_SHUTDOWN_TIMEOUT_SECS").unwrap_or(10));

        let monitor_tick_period =
            Duration::from_millis(env_parse("GOPHERMART_MONITOR_TICK_PERIOD_MS").unwrap_or(1000));
        let monitor_workers_count: usize =
            env_parse("GOPHERMART_MONITOR_WORKERS").unwrap_or(4);
        let monitor_tasks_buffer_length: usize =
            env_parse("GOPHERMART_MONITOR_BUFFER").unwrap_or(64);

        Self {
            run_address,
            accrual_system_address,
            database_uri,
            log_filter,
            jwt_secret,
            jwt_ttl,
            shutdown_timeout,
            monitor_tick_period,
            monitor_workers_count,
            monitor_tasks_buffer_length,
        }
    }
}

fn env_override(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.is_empty())
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    env_override(key).and_then(|v| v.parse().ok())
}
