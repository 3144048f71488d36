//! Typed SQL statements for users, orders, withdrawals, and balances.
//!
//! A thin layer over `Executor`: every method takes an explicit `&mut
//! Scope<'_>` so it works identically inside or outside a transaction.
//! Password hashing is pushed into Postgres via `pgcrypto`'s `crypt()` with
//! a Blowfish salt, mirroring the source's choice of a database-side
//! one-way primitive (see DESIGN.md Open Questions).

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::Row;
use tracing::instrument;

use crate::adapters::executor::{Executor, Scope};
use crate::domain::{Order, OrderStatus, Withdrawal};
use crate::error::{GophermartError, Result};

#[derive(Clone)]
pub struct Repository {
    executor: Executor,
}

impl Repository {
    pub fn new(executor: Executor) -> Self {
        Self { executor }
    }

    pub fn executor(&self) -> &Executor {
        &self.executor
    }

    #[instrument(skip(self, scope, password))]
    pub async fn insert_user(
        &self,
        scope: &mut Scope<'_>,
        login: &str,
        password: &str,
    ) -> Result<i32> {
        let row = self
            .executor
            .query_value(
                scope,
                "INSERT INTO users (login, password) VALUES ($1, crypt($2, gen_salt('bf'))) RETURNING id",
                |q| q.bind(login).bind(password),
            )
            .await
            .map_err(map_unique_violation)?;

        Ok(row.get("id"))
    }

    #[instrument(skip(self, scope, password))]
    pub async fn validate_user(
        &self,
        scope: &mut Scope<'_>,
        login: &str,
        password: &str,
    ) -> Result<i32> {
        let row = self
            .executor
            .query_row(
                scope,
                "SELECT id, (password = crypt($2, password)) AS matches FROM users WHERE login = $1",
                |q| q.bind(login).bind(password),
            )
            .await?;

        let Some(row) = row else {
            return Err(GophermartError::InvalidLogin);
        };
        if !row.get::<bool, _>("matches") {
            return Err(GophermartError::InvalidPassword);
        }
        Ok(row.get("id"))
    }

    #[instrument(skip(self, scope, order))]
    pub async fn insert_order(&self, scope: &mut Scope<'_>, order: &Order) -> Result<()> {
        self.executor
            .exec(
                scope,
                "INSERT INTO orders (number, user_id, status, accrual, upload_time) VALUES ($1, $2, $3, $4, $5)",
                |q| {
                    q.bind(&order.number)
                        .bind(order.user_id)
                        .bind(order.status.as_str())
                        .bind(order.accrual)
                        .bind(order.uploaded_at)
                },
            )
            .await
            .map_err(map_unique_violation)?;
        Ok(())
    }

    pub async fn get_order_owner(&self, scope: &mut Scope<'_>, number: &str) -> Result<i32> {
        let row = self
            .executor
            .query_value(
                scope,
                "SELECT user_id FROM orders WHERE number = $1",
                |q| q.bind(number),
            )
            .await?;
        Ok(row.get("user_id"))
    }

    pub async fn get_all_user_orders(&self, scope: &mut Scope<'_>, user_id: i32) -> Result<Vec<Order>> {
        let rows = self
            .executor
            .query(
                scope,
                "SELECT number, user_id, status, accrual, upload_time FROM orders WHERE user_id = $1 ORDER BY upload_time ASC",
                |q| q.bind(user_id),
            )
            .await?;

        rows.iter().map(row_to_order).collect()
    }

    /// `limit <= 0` means unlimited; an empty `allowed_statuses` means all
    /// statuses. Placeholders are numbered deterministically: `$1` is the
    /// limit (only bound when `limit > 0`), status placeholders start at
    /// `$2` in that case or `$1` otherwise.
    pub async fn get_orders(
        &self,
        scope: &mut Scope<'_>,
        limit: i64,
        allowed_statuses: &[OrderStatus],
    ) -> Result<Vec<Order>> {
        let mut sql = String::from(
            "SELECT number, user_id, status, accrual, upload_time FROM orders",
        );
        let has_limit = limit > 0;
        let status_offset = if has_limit { 2 } else { 1 };

        if !allowed_statuses.is_empty() {
            let placeholders: Vec<String> = (0..allowed_statuses.len())
                .map(|i| format!("${}", status_offset + i))
                .collect();
            sql.push_str(&format!(" WHERE status IN ({})", placeholders.join(", ")));
        }
        sql.push_str(" ORDER BY upload_time ASC");
        if has_limit {
            sql.push_str(" LIMIT $1");
        }

        let statuses: Vec<&'static str> = allowed_statuses.iter().map(|s| s.as_str()).collect();
        let rows = self
            .executor
            .query(scope, &sql, |q| {
                let mut q = q;
                if has_limit {
                    q = q.bind(limit);
                }
                for s in &statuses {
                    q = q.bind(*s);
                }
                q
            })
            .await?;

        rows.iter().map(row_to_order).collect()
    }

    pub async fn get_user_balance(&self, scope: &mut Scope<'_>, user_id: i32) -> Result<Decimal> {
        let row = self
            .executor
            .query_row(
                scope,
                "SELECT points FROM balances WHERE user_id = $1",
                |q| q.bind(user_id),
            )
            .await?;
        Ok(row.map(|r| r.get("points")).unwrap_or(Decimal::ZERO))
    }

    pub async fn set_user_balance(
        &self,
        scope: &mut Scope<'_>,
        user_id: i32,
        value: Decimal,
    ) -> Result<()> {
        self.executor
            .exec(
                scope,
                "INSERT INTO balances (user_id, points) VALUES ($1, $2) \
                 ON CONFLICT (user_id) DO UPDATE SET points = EXCLUDED.points",
                |q| q.bind(user_id).bind(value),
            )
            .await?;
        Ok(())
    }

    pub async fn get_order(
        &self,
        scope: &mut Scope<'_>,
        number: &str,
    ) -> Result<Option<(i32, OrderStatus)>> {
        let row = self
            .executor
            .query_row(
                scope,
                "SELECT user_id, status FROM orders WHERE number = $1",
                |q| q.bind(number),
            )
            .await?;
        Ok(row.map(|r| {
            let status = OrderStatus::parse(r.get::<String, _>("status").as_str())
                .expect("status column always a known value");
            (r.get("user_id"), status)
        }))
    }

    pub async fn set_order_status(
        &self,
        scope: &mut Scope<'_>,
        number: &str,
        accrual: Decimal,
        status: OrderStatus,
    ) -> Result<()> {
        self.executor
            .exec(
                scope,
                "UPDATE orders SET accrual = $2, status = $3 WHERE number = $1",
                |q| q.bind(number).bind(accrual).bind(status.as_str()),
            )
            .await?;
        Ok(())
    }

    pub async fn get_total_user_withdraw(&self, scope: &mut Scope<'_>, user_id: i32) -> Result<Decimal> {
        let row = self
            .executor
            .query_row(
                scope,
                "SELECT COALESCE(SUM(amount), 0) AS total FROM withdrawals WHERE user_id = $1",
                |q| q.bind(user_id),
            )
            .await?;
        Ok(row.map(|r| r.get("total")).unwrap_or(Decimal::ZERO))
    }

    pub async fn insert_withdrawal(&self, scope: &mut Scope<'_>, w: &Withdrawal) -> Result<()> {
        self.executor
            .exec(
                scope,
                "INSERT INTO withdrawals (user_id, order_number, amount, process_time) VALUES ($1, $2, $3, $4)",
                |q| {
                    q.bind(w.user_id)
                        .bind(&w.order_number)
                        .bind(w.amount)
                        .bind(w.processed_at)
                },
            )
            .await?;
        Ok(())
    }

    pub async fn get_all_user_withdrawals(
        &self,
        scope: &mut Scope<'_>,
        user_id: i32,
    ) -> Result<Vec<Withdrawal>> {
        let rows = self
            .executor
            .query(
                scope,
                "SELECT user_id, order_number, amount, process_time FROM withdrawals WHERE user_id = $1 ORDER BY process_time ASC",
                |q| q.bind(user_id),
            )
            .await?;

        Ok(rows
            .iter()
            .map(|r| Withdrawal {
                user_id: r.get("user_id"),
                order_number: r.get("order_number"),
                amount: r.get("amount"),
                processed_at: r.get::<DateTime<Utc>, _>("process_time"),
            })
            .collect())
    }
}

fn row_to_order(row: &sqlx::postgres::PgRow) -> Result<Order> {
    let status = OrderStatus::parse(row.get::<String, _>("status").as_str())
        .expect("status column always a known value");
    Ok(Order {
        number: row.get("number"),
        user_id: row.get("user_id"),
        status,
        accrual: row.get("accrual"),
        uploaded_at: row.get::<DateTime<Utc>, _>("upload_time"),
    })
}

fn map_unique_violation(err: GophermartError) -> GophermartError {
    match &err {
        GophermartError::Database(sqlx::Error::Database(db_err))
            if db_err.code().as_deref() == Some("23505") =>
        {
            GophermartError::UniqueConstraintViolation
        }
        _ => err,
    }
}
