//! Storage executor: wraps the SQL pool, carries an explicit ambient
//! transaction scope, and retries transient connection errors.
//!
//! The source propagates a transaction through request-local context. Per
//! the redesign in the spec's design notes, this is instead an explicit
//! `Scope` value threaded through every repository call — the same
//! repository method works whether `scope` wraps the pool or a live
//! transaction, with no hidden lookup.

use sqlx::postgres::{PgPool, PgRow};
use sqlx::{PgConnection, Postgres, Transaction};
use std::future::Future;
use std::pin::Pin;
use std::time::Duration;
use tracing::warn;

use crate::error::{GophermartError, Result};

/// Either a pool handle or a live transaction connection. Repository methods
/// take `&mut Scope<'_>` so the inner connection can be reborrowed across
/// several sequential calls within the same logical operation.
pub enum Scope<'a> {
    Pool(&'a PgPool),
    Tx(&'a mut PgConnection),
}

type ScopedFuture<'s, T> = Pin<Box<dyn Future<Output = Result<T>> + Send + 's>>;

#[derive(Clone)]
pub struct Executor {
    pool: PgPool,
    retry_delays: Vec<Duration>,
}

impl Executor {
    pub fn new(pool: PgPool, retry_delays: Vec<Duration>) -> Self {
        Self { pool, retry_delays }
    }

    pub fn pool_scope(&self) -> Scope<'_> {
        Scope::Pool(&self.pool)
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Run an INSERT/UPDATE/DELETE, returning affected row count.
    ///
    /// The retry loop is inlined here (and in `query_row`/`query` below)
    /// rather than routed through a shared `FnMut() -> Fut` helper: a
    /// closure capturing `scope: &mut Scope<'_>` and reborrowing it inside
    /// `match scope { .. }` produces a future tied to that reborrow, which a
    /// generic `FnMut() -> Fut` bound cannot express — the future cannot be
    /// proven not to outlive the call that produces it. Reborrowing `scope`
    /// directly in the loop body sidesteps that entirely.
    pub async fn exec(
        &self,
        scope: &mut Scope<'_>,
        sql: &str,
        bind: impl Fn(sqlx::query::Query<'_, Postgres, sqlx::postgres::PgArguments>) -> sqlx::query::Query<'_, Postgres, sqlx::postgres::PgArguments>,
    ) -> Result<u64> {
        for (attempt, delay) in self.retry_delays.iter().enumerate() {
            let query = bind(sqlx::query(sql));
            let outcome: Result<u64> = async {
                let tag = match scope {
                    Scope::Pool(pool) => query.execute(*pool).await?,
                    Scope::Tx(conn) => query.execute(&mut **conn).await?,
                };
                Ok(tag.rows_affected())
            }
            .await;

            match outcome {
                Ok(value) => return Ok(value),
                Err(e) if e.is_retryable_connection_error() => {
                    if attempt + 1 == self.retry_delays.len() {
                        break;
                    }
                    tokio::time::sleep(*delay).await;
                }
                Err(e) => return Err(e),
            }
        }
        Err(GophermartError::AllAttemptsFailed)
    }

    /// Run a query expected to return at most one row.
    pub async fn query_row(
        &self,
        scope: &mut Scope<'_>,
        sql: &str,
        bind: impl Fn(sqlx::query::Query<'_, Postgres, sqlx::postgres::PgArguments>) -> sqlx::query::Query<'_, Postgres, sqlx::postgres::PgArguments>,
    ) -> Result<Option<PgRow>> {
        for (attempt, delay) in self.retry_delays.iter().enumerate() {
            let query = bind(sqlx::query(sql));
            let outcome: Result<Option<PgRow>> = async {
                let row = match scope {
                    Scope::Pool(pool) => query.fetch_optional(*pool).await?,
                    Scope::Tx(conn) => query.fetch_optional(&mut **conn).await?,
                };
                Ok(row)
            }
            .await;

            match outcome {
                Ok(value) => return Ok(value),
                Err(e) if e.is_retryable_connection_error() => {
                    if attempt + 1 == self.retry_delays.len() {
                        break;
                    }
                    tokio::time::sleep(*delay).await;
                }
                Err(e) => return Err(e),
            }
        }
        Err(GophermartError::AllAttemptsFailed)
    }

    /// Run a query expected to return many rows.
    pub async fn query(
        &self,
        scope: &mut Scope<'_>,
        sql: &str,
        bind: impl Fn(sqlx::query::Query<'_, Postgres, sqlx::postgres::PgArguments>) -> sqlx::query::Query<'_, Postgres, sqlx::postgres::PgArguments>,
    ) -> Result<Vec<PgRow>> {
        for (attempt, delay) in self.retry_delays.iter().enumerate() {
            let query = bind(sqlx::query(sql));
            let outcome: Result<Vec<PgRow>> = async {
                let rows = match scope {
                    Scope::Pool(pool) => query.fetch_all(*pool).await?,
                    Scope::Tx(conn) => query.fetch_all(&mut **conn).await?,
                };
                Ok(rows)
            }
            .await;

            match outcome {
                Ok(value) => return Ok(value),
                Err(e) if e.is_retryable_connection_error() => {
                    if attempt + 1 == self.retry_delays.len() {
                        break;
                    }
                    tokio::time::sleep(*delay).await;
                }
                Err(e) => return Err(e),
            }
        }
        Err(GophermartError::AllAttemptsFailed)
    }

    /// `query_row` plus "no row" surfaced as `GophermartError::NoRows` rather
    /// than `None`, so repositories can map it straight to a domain error.
    pub async fn query_value(
        &self,
        scope: &mut Scope<'_>,
        sql: &str,
        bind: impl Fn(sqlx::query::Query<'_, Postgres, sqlx::postgres::PgArguments>) -> sqlx::query::Query<'_, Postgres, sqlx::postgres::PgArguments>,
    ) -> Result<PgRow> {
        self.query_row(scope, sql, bind)
            .await?
            .ok_or(GophermartError::NoRows)
    }

    /// Begin a REPEATABLE READ transaction, run `f` against a `Scope::Tx`
    /// bound to it, and commit on success / roll back on failure. Once
    /// started, the commit-or-rollback always runs to completion — no
    /// `select!`/timeout wraps it, so cancellation of the caller cannot
    /// orphan the transaction half-open.
    pub async fn do_with_transaction<T, F>(&self, f: F) -> Result<T>
    where
        F: for<'s> FnOnce(Scope<'s>) -> ScopedFuture<'s, T>,
    {
        let mut tx: Transaction<'_, Postgres> = self.pool.begin().await?;
        sqlx::query("SET TRANSACTION ISOLATION LEVEL REPEATABLE READ")
            .execute(&mut *tx)
            .await?;

        let conn: &mut PgConnection = &mut tx;
        let outcome = f(Scope::Tx(conn)).await;

        match outcome {
            Ok(value) => match tx.commit().await {
                Ok(()) => Ok(value),
                Err(e) => {
                    warn!("transaction commit failed: {e}");
                    Err(GophermartError::Database(e))
                }
            },
            Err(e) => {
                if let Err(rollback_err) = tx.rollback().await {
                    warn!("rollback after error also failed: {rollback_err}");
                }
                Err(e)
            }
        }
    }
}
