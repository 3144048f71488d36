//! HTTP handlers for the `/api/user` surface (§6.1). Domain errors are
//! mapped to status codes per §7; anything else surfaces as 500.

use axum::extract::State;
use axum::http::{header::AUTHORIZATION, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use chrono::Utc;
use rust_decimal::Decimal;
use tracing::{error, instrument};

use crate::api::auth::AuthUser;
use crate::api::state::AppState;
use crate::api::types::{
    BalanceResponse, CredentialsRequest, HealthResponse, OrderResponse, WithdrawRequest,
    WithdrawalResponse,
};
use crate::domain::{Order, OrderStatus};
use crate::error::GophermartError;
use crate::luhn;

/// Thin wrapper so `GophermartError` can implement `IntoResponse` without
/// pulling axum into the core error module.
pub struct ApiError(GophermartError);

impl From<GophermartError> for ApiError {
    fn from(e: GophermartError) -> Self {
        Self(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            GophermartError::LoginTaken
            | GophermartError::UniqueConstraintViolation
            | GophermartError::OrderRegisteredByAnotherUser => StatusCode::CONFLICT,
            GophermartError::InvalidLogin
            | GophermartError::InvalidPassword
            | GophermartError::InvalidCredentials => StatusCode::UNAUTHORIZED,
            GophermartError::NotEnoughBalance => StatusCode::PAYMENT_REQUIRED,
            GophermartError::InvalidOrderNumber => StatusCode::UNPROCESSABLE_ENTITY,
            GophermartError::BadRequest(_) => StatusCode::BAD_REQUEST,
            _ => {
                error!("internal error serving request: {}", self.0);
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };
        status.into_response()
    }
}

fn bearer_response(status: StatusCode, token: &str) -> Response {
    let mut response = status.into_response();
    if let Ok(value) = HeaderValue::from_str(&format!("Bearer {token}")) {
        response.headers_mut().insert(AUTHORIZATION, value);
    }
    response
}

#[instrument(skip(state, req))]
pub async fn register(
    State(state): State<AppState>,
    Json(req): Json<CredentialsRequest>,
) -> Result<Response, ApiError> {
    let mut scope = state.repository.executor().pool_scope();
    let user_id = state
        .repository
        .insert_user(&mut scope, &req.login, &req.password)
        .await
        .map_err(|e| match e {
            GophermartError::UniqueConstraintViolation => GophermartError::LoginTaken,
            other => other,
        })?;

    let token = state.token_factory.generate(user_id)?;
    Ok(bearer_response(StatusCode::OK, &token))
}

#[instrument(skip(state, req))]
pub async fn login(
    State(state): State<AppState>,
    Json(req): Json<CredentialsRequest>,
) -> Result<Response, ApiError> {
    let mut scope = state.repository.executor().pool_scope();
    let user_id = state
        .repository
        .validate_user(&mut scope, &req.login, &req.password)
        .await
        .map_err(|e| match e {
            GophermartError::InvalidLogin | GophermartError::InvalidPassword => {
                GophermartError::InvalidCredentials
            }
            other => other,
        })?;

    let token = state.token_factory.generate(user_id)?;
    Ok(bearer_response(StatusCode::OK, &token))
}

#[instrument(skip(state, body))]
pub async fn upload_order(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    body: String,
) -> Result<StatusCode, ApiError> {
    if body.len() > 1024 {
        return Err(GophermartError::BadRequest("order number exceeds 1024 bytes".into()).into());
    }
    let number = body.trim().to_string();
    if !luhn::is_valid(&number) {
        return Err(GophermartError::InvalidOrderNumber.into());
    }

    let order = Order {
        number: number.clone(),
        user_id,
        status: OrderStatus::New,
        accrual: Decimal::ZERO,
        uploaded_at: Utc::now(),
    };

    let mut scope = state.repository.executor().pool_scope();
    match state.repository.insert_order(&mut scope, &order).await {
        Ok(()) => Ok(StatusCode::ACCEPTED),
        Err(GophermartError::UniqueConstraintViolation) => {
            let owner = state
                .repository
                .get_order_owner(&mut scope, &number)
                .await?;
            if owner == user_id {
                Ok(StatusCode::OK)
            } else {
                Err(GophermartError::OrderRegisteredByAnotherUser.into())
            }
        }
        Err(e) => Err(e.into()),
    }
}

#[instrument(skip(state))]
pub async fn get_orders(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
) -> Result<Response, ApiError> {
    let mut scope = state.repository.executor().pool_scope();
    let orders = state
        .repository
        .get_all_user_orders(&mut scope, user_id)
        .await?;

    if orders.is_empty() {
        return Ok(StatusCode::NO_CONTENT.into_response());
    }
    let response: Vec<OrderResponse> = orders.into_iter().map(OrderResponse::from).collect();
    Ok(Json(response).into_response())
}

#[instrument(skip(state))]
pub async fn get_balance(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
) -> Result<Json<BalanceResponse>, ApiError> {
    let info = state.wallet.get_user_balance_info(user_id).await?;
    Ok(Json(info.into()))
}

#[instrument(skip(state, req))]
pub async fn withdraw(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Json(req): Json<WithdrawRequest>,
) -> Result<StatusCode, ApiError> {
    if !luhn::is_valid(&req.order) {
        return Err(GophermartError::InvalidOrderNumber.into());
    }
    let amount = Decimal::from_f64_retain(req.sum)
        .ok_or_else(|| GophermartError::BadRequest("sum is not a finite number".into()))?;

    state.wallet.withdraw(user_id, &req.order, amount).await?;
    Ok(StatusCode::OK)
}

#[instrument(skip(state))]
pub async fn get_withdrawals(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
) -> Result<Response, ApiError> {
    let withdrawals = state.wallet.get_all_user_withdrawals(user_id).await?;
    if withdrawals.is_empty() {
        return Ok(StatusCode::NO_CONTENT.into_response());
    }
    let response: Vec<WithdrawalResponse> = withdrawals
        .into_iter()
        .map(WithdrawalResponse::from)
        .collect();
    Ok(Json(response).into_response())
}

pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    let mut scope = state.repository.executor().pool_scope();
    let db = match state
        .repository
        .executor()
        .query(&mut scope, "SELECT 1", |q| q)
        .await
    {
        Ok(_) => "up",
        Err(_) => "down",
    };
    Json(HealthResponse {
        status: "ok",
        db,
        uptime_secs: state.uptime_seconds(),
    })
}
