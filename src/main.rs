use std::sync::Arc;

use sqlx::postgres::PgPoolOptions;
use tokio::signal;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use gophermart::adapters::{AccrualClient, Executor, InFlightSet, RateLimitGate, Repository};
use gophermart::api::{create_router, AppState};
use gophermart::error::Result;
use gophermart::services::{OrdersMonitor, OrdersMonitorConfig};
use gophermart::services::Wallet;
use gophermart::Settings;

#[tokio::main]
async fn main() -> Result<()> {
    let settings = Settings::load();
    init_logging(&settings.log_filter);

    info!(
        run_address = %settings.run_address,
        accrual_system_address = %settings.accrual_system_address,
        "starting gophermart"
    );

    let pool = PgPoolOptions::new()
        .max_connections(10)
        .connect(&settings.database_uri)
        .await?;

    sqlx::migrate!("./migrations").run(&pool).await?;

    let retry_delays = vec![
        std::time::Duration::from_millis(50),
        std::time::Duration::from_millis(100),
        std::time::Duration::from_millis(200),
    ];
    let executor = Executor::new(pool, retry_delays);
    let repository = Repository::new(executor);
    let wallet = Wallet::new(repository.clone());

    let gate = Arc::new(RateLimitGate::new());
    let accrual_client = AccrualClient::new(settings.accrual_system_address.clone(), gate);
    let in_flight = Arc::new(InFlightSet::new());

    let monitor = Arc::new(OrdersMonitor::new(
        repository.clone(),
        accrual_client,
        in_flight,
        OrdersMonitorConfig {
            tick_period: settings.monitor_tick_period,
            workers_count: settings.monitor_workers_count,
            tasks_buffer_length: settings.monitor_tasks_buffer_length,
        },
    ));
    let monitor_handle = monitor.spawn();

    let app_state = AppState::new(
        repository,
        wallet,
        settings.jwt_secret.clone(),
        settings.jwt_ttl,
    );
    let app = create_router(app_state);

    let listener = tokio::net::TcpListener::bind(&settings.run_address).await?;
    info!("listening on {}", settings.run_address);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("http server stopped, shutting down orders monitor");
    match tokio::time::timeout(settings.shutdown_timeout, monitor_handle.stop()).await {
        Ok(()) => info!("orders monitor stopped cleanly"),
        Err(_) => error!(
            "orders monitor did not stop within {:?}, forcing exit",
            settings.shutdown_timeout
        ),
    }

    Ok(())
}

fn init_logging(filter: &str) {
    let env_filter =
        EnvFilter::try_new(filter).unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .json()
        .init();
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }
    info!("shutdown signal received");
}
