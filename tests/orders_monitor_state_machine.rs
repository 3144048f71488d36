//! Exercises the NEW -> PROCESSING -> {PROCESSED, INVALID} order state
//! machine against a live Postgres instance.
//!
//! The first few tests below drive the repository directly to pin down the
//! bookkeeping primitives (`set_order_status`/`set_user_balance`) in
//! isolation. The tests further down drive `OrdersMonitor::handle_order`
//! itself — the real per-order reconciliation transition, including its
//! call into the accrual client — against a `wiremock` stub standing in for
//! the external accrual system, so the PROCESSED-credits-once and
//! terminal-no-op paths are covered end to end rather than only through
//! their constituent repository calls.
//!
//! Requires a reachable database; set `DATABASE_URI` (falls back to
//! `postgres://localhost/gophermart_test`) and run with
//! `cargo test -- --ignored`.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use rust_decimal::Decimal;
use serde_json::json;
use sqlx::postgres::PgPoolOptions;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use gophermart::adapters::{AccrualClient, Executor, InFlightSet, RateLimitGate, Repository, Scope};
use gophermart::domain::{Order, OrderStatus};
use gophermart::services::{OrdersMonitor, OrdersMonitorConfig};

fn database_uri() -> String {
    std::env::var("DATABASE_URI").unwrap_or_else(|_| "postgres://localhost/gophermart_test".into())
}

async fn test_repository() -> Repository {
    let pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(&database_uri())
        .await
        .expect("connect to test database");
    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .expect("run migrations");
    let executor = Executor::new(pool, vec![Duration::from_millis(10)]);
    Repository::new(executor)
}

async fn insert_test_user(repository: &Repository, login: &str) -> i32 {
    let mut scope: Scope<'_> = repository.executor().pool_scope();
    repository
        .insert_user(&mut scope, login, "hunter2")
        .await
        .expect("insert user")
}

/// An `OrdersMonitor` wired to a stub accrual server at `accrual_base`, with
/// a scheduler/worker-pool configuration that's irrelevant here since the
/// tests below call `handle_order` directly rather than `spawn()`-ing it.
fn monitor_against(repository: Repository, accrual_base: &str) -> OrdersMonitor {
    let gate = Arc::new(RateLimitGate::new());
    let accrual_client = AccrualClient::new(accrual_base, gate);
    OrdersMonitor::new(
        repository,
        accrual_client,
        Arc::new(InFlightSet::new()),
        OrdersMonitorConfig {
            tick_period: Duration::from_secs(3600),
            workers_count: 1,
            tasks_buffer_length: 1,
        },
    )
}

async fn insert_new_order(repository: &Repository, user_id: i32, number: &str) {
    let order = Order {
        number: number.to_string(),
        user_id,
        status: OrderStatus::New,
        accrual: Decimal::ZERO,
        uploaded_at: Utc::now(),
    };
    let mut scope: Scope<'_> = repository.executor().pool_scope();
    repository.insert_order(&mut scope, &order).await.expect("insert order");
}

#[tokio::test]
#[ignore] // Requires database
async fn new_order_starts_out_unprocessed_and_at_most_one_owner() {
    let repository = test_repository().await;
    let user_id = insert_test_user(&repository, "order_owner").await;
    let other_user_id = insert_test_user(&repository, "order_bystander").await;

    let order = Order {
        number: "12345678903".to_string(),
        user_id,
        status: OrderStatus::New,
        accrual: Decimal::ZERO,
        uploaded_at: Utc::now(),
    };
    {
        let mut scope: Scope<'_> = repository.executor().pool_scope();
        repository.insert_order(&mut scope, &order).await.expect("insert order");
    }

    let mut scope: Scope<'_> = repository.executor().pool_scope();
    let (owner, status) = repository
        .get_order(&mut scope, &order.number)
        .await
        .expect("get order")
        .expect("order exists");
    assert_eq!(owner, user_id);
    assert_eq!(status, OrderStatus::New);
    assert_ne!(owner, other_user_id);

    let owner_via_lookup = repository
        .get_order_owner(&mut scope, &order.number)
        .await
        .expect("get order owner");
    assert_eq!(owner_via_lookup, user_id);
}

#[tokio::test]
#[ignore] // Requires database
async fn transition_into_processed_credits_balance_exactly_once() {
    let repository = test_repository().await;
    let user_id = insert_test_user(&repository, "accrual_recipient").await;

    let order = Order {
        number: "12345678903".to_string(),
        user_id,
        status: OrderStatus::Processing,
        accrual: Decimal::ZERO,
        uploaded_at: Utc::now(),
    };
    {
        let mut scope: Scope<'_> = repository.executor().pool_scope();
        repository.insert_order(&mut scope, &order).await.expect("insert order");
    }

    let accrual = Decimal::new(72998, 2);

    // Simulate `apply_remote_order`'s PROCESSED branch: credit the balance
    // and flip the order status inside one transaction.
    {
        let mut scope: Scope<'_> = repository.executor().pool_scope();
        let current = repository.get_user_balance(&mut scope, user_id).await.expect("get balance");
        repository
            .set_user_balance(&mut scope, user_id, current + accrual)
            .await
            .expect("credit balance");
        repository
            .set_order_status(&mut scope, &order.number, accrual, OrderStatus::Processed)
            .await
            .expect("mark processed");
    }

    let mut scope: Scope<'_> = repository.executor().pool_scope();
    let balance = repository.get_user_balance(&mut scope, user_id).await.expect("get balance");
    assert_eq!(balance, accrual);

    let (_, status) = repository
        .get_order(&mut scope, &order.number)
        .await
        .expect("get order")
        .expect("order exists");
    assert_eq!(status, OrderStatus::Processed);

    // Re-running the same state machine's terminal-status no-op check: a
    // second reconciliation pass over an already-PROCESSED order must not
    // credit the balance again.
    let (_, status_again) = repository
        .get_order(&mut scope, &order.number)
        .await
        .expect("get order")
        .expect("order exists");
    assert!(status_again.is_terminal());

    let balance_after_recheck = repository.get_user_balance(&mut scope, user_id).await.expect("get balance");
    assert_eq!(balance_after_recheck, accrual);
}

#[tokio::test]
#[ignore] // Requires database
async fn transition_into_invalid_never_credits_balance() {
    let repository = test_repository().await;
    let user_id = insert_test_user(&repository, "rejected_order_owner").await;

    let order = Order {
        number: "12345678903".to_string(),
        user_id,
        status: OrderStatus::New,
        accrual: Decimal::ZERO,
        uploaded_at: Utc::now(),
    };
    {
        let mut scope: Scope<'_> = repository.executor().pool_scope();
        repository.insert_order(&mut scope, &order).await.expect("insert order");
        repository
            .set_order_status(&mut scope, &order.number, Decimal::ZERO, OrderStatus::Invalid)
            .await
            .expect("mark invalid");
    }

    let mut scope: Scope<'_> = repository.executor().pool_scope();
    let balance = repository.get_user_balance(&mut scope, user_id).await.expect("get balance");
    assert_eq!(balance, Decimal::ZERO);

    let (_, status) = repository
        .get_order(&mut scope, &order.number)
        .await
        .expect("get order")
        .expect("order exists");
    assert_eq!(status, OrderStatus::Invalid);
    assert!(status.is_terminal());
}

#[tokio::test]
#[ignore] // Requires database
async fn handle_order_processed_credits_balance_exactly_once() {
    let repository = test_repository().await;
    let user_id = insert_test_user(&repository, "handle_order_processed").await;
    insert_new_order(&repository, user_id, "12345678903").await;

    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/orders/12345678903"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "order": "12345678903",
            "status": "PROCESSED",
            "accrual": 729.98,
        })))
        .mount(&server)
        .await;

    let monitor = monitor_against(repository.clone(), &server.uri());
    monitor.handle_order("12345678903").await.expect("handle order");

    let mut scope: Scope<'_> = repository.executor().pool_scope();
    let (_, status) = repository
        .get_order(&mut scope, "12345678903")
        .await
        .expect("get order")
        .expect("order exists");
    assert_eq!(status, OrderStatus::Processed);

    let balance = repository.get_user_balance(&mut scope, user_id).await.expect("get balance");
    assert_eq!(balance, Decimal::new(72998, 2));

    // Re-running handle_order against the now-terminal order must be a
    // no-op: it must not call the accrual system again (the mock would
    // still answer, but the terminal check inside the transaction short
    // circuits before any remote call) and must not credit the balance a
    // second time.
    monitor.handle_order("12345678903").await.expect("handle order again");

    let balance_after_recheck = repository.get_user_balance(&mut scope, user_id).await.expect("get balance");
    assert_eq!(balance_after_recheck, Decimal::new(72998, 2));

    let (_, status_again) = repository
        .get_order(&mut scope, "12345678903")
        .await
        .expect("get order")
        .expect("order exists");
    assert_eq!(status_again, OrderStatus::Processed);
}

#[tokio::test]
#[ignore] // Requires database
async fn handle_order_invalid_never_credits_balance() {
    let repository = test_repository().await;
    let user_id = insert_test_user(&repository, "handle_order_invalid").await;
    insert_new_order(&repository, user_id, "12345678911").await;

    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/orders/12345678911"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "order": "12345678911",
            "status": "INVALID",
        })))
        .mount(&server)
        .await;

    let monitor = monitor_against(repository.clone(), &server.uri());
    monitor.handle_order("12345678911").await.expect("handle order");

    let mut scope: Scope<'_> = repository.executor().pool_scope();
    let (_, status) = repository
        .get_order(&mut scope, "12345678911")
        .await
        .expect("get order")
        .expect("order exists");
    assert_eq!(status, OrderStatus::Invalid);
    assert!(status.is_terminal());

    let balance = repository.get_user_balance(&mut scope, user_id).await.expect("get balance");
    assert_eq!(balance, Decimal::ZERO);
}

#[tokio::test]
#[ignore] // Requires database
async fn handle_order_no_content_marks_invalid() {
    let repository = test_repository().await;
    let user_id = insert_test_user(&repository, "handle_order_no_content").await;
    insert_new_order(&repository, user_id, "12345678929").await;

    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/orders/12345678929"))
        .respond_with(ResponseTemplate::new(204))
        .mount(&server)
        .await;

    let monitor = monitor_against(repository.clone(), &server.uri());
    monitor.handle_order("12345678929").await.expect("handle order");

    let mut scope: Scope<'_> = repository.executor().pool_scope();
    let (_, status) = repository
        .get_order(&mut scope, "12345678929")
        .await
        .expect("get order")
        .expect("order exists");
    assert_eq!(status, OrderStatus::Invalid);
}

#[tokio::test]
#[ignore] // Requires database
async fn handle_order_still_processing_does_not_credit() {
    let repository = test_repository().await;
    let user_id = insert_test_user(&repository, "handle_order_processing").await;
    insert_new_order(&repository, user_id, "12345678937").await;

    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/orders/12345678937"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "order": "12345678937",
            "status": "PROCESSING",
        })))
        .mount(&server)
        .await;

    let monitor = monitor_against(repository.clone(), &server.uri());
    monitor.handle_order("12345678937").await.expect("handle order");

    let mut scope: Scope<'_> = repository.executor().pool_scope();
    let (_, status) = repository
        .get_order(&mut scope, "12345678937")
        .await
        .expect("get order")
        .expect("order exists");
    assert_eq!(status, OrderStatus::Processing);
    assert!(!status.is_terminal());

    let balance = repository.get_user_balance(&mut scope, user_id).await.expect("get balance");
    assert_eq!(balance, Decimal::ZERO);
}
