use std::future::Future;
use std::net::SocketAddr;

use anyhow::{Context, Result};
use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use sea_orm::DatabaseConnection;
use serde::{Deserialize, Serialize};
use tracing::{error, info};

use crate::error::LedgerError;
use crate::ledger::{self, BalanceFilter, StockBalance};

#[derive(Debug, Clone)]
pub struct Config {
    bind: SocketAddr,
    env: String,
}

impl From<&super::Args> for Config {
    fn from(args: &super::Args) -> Self {
        match &args.command {
            super::SubCommandArgs::Serve { bind, env } => Self {
                bind: *bind,
                env: env.clone(),
            },
            _ => unreachable!(),
        }
    }
}

#[derive(Clone)]
pub struct AppState {
    db: DatabaseConnection,
    env: String,
}

#[derive(Debug, PartialEq, Serialize, Deserialize)]
pub struct Health {
    pub ok: bool,
    pub env: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct StockQuery {
    product: Option<String>,
    warehouse: Option<String>,
}

pub struct ApiError(LedgerError);

impl From<LedgerError> for ApiError {
    fn from(err: LedgerError) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            LedgerError::NotFound { .. } => StatusCode::NOT_FOUND,
            LedgerError::Db(_) => StatusCode::INTERNAL_SERVER_ERROR,
            _ => StatusCode::UNPROCESSABLE_ENTITY,
        };
        if status.is_server_error() {
            error!(error = %self.0, "request failed");
        }
        let body = serde_json::json!({ "ok": false, "error": self.0.to_string() });
        (status, Json(body)).into_response()
    }
}

pub fn router(db: DatabaseConnection, env: &str) -> Router {
    Router::new()
        .route("/api/health", get(health))
        .route("/api/stock", get(stock))
        .with_state(AppState {
            db,
            env: env.to_owned(),
        })
}

async fn health(State(state): State<AppState>) -> Json<Health> {
    Json(Health {
        ok: true,
        env: state.env,
    })
}

async fn stock(
    State(state): State<AppState>,
    Query(query): Query<StockQuery>,
) -> Result<Json<Vec<StockBalance>>, ApiError> {
    let filter = BalanceFilter {
        product_code: query.product,
        warehouse: query.warehouse,
    };
    Ok(Json(ledger::balances(&state.db, &filter).await?))
}

/// Resolves once Ctrl-C is received.
fn shutdown_signal() -> Result<impl Future<Output = ()> + Send + 'static> {
    let (exit_tx, exit_rx) = flume::bounded(1);
    ctrlc::set_handler(move || {
        let _ = exit_tx.try_send(());
    })
    .context("Error setting Ctrl-C handler")?;
    Ok(async move {
        let _ = exit_rx.recv_async().await;
        info!("receive the exit signal, exit...");
    })
}

pub async fn execute<T: Into<Config>>(db: &DatabaseConnection, config: T) -> Result<()> {
    let config = config.into();
    let listener = tokio::net::TcpListener::bind(config.bind)
        .await
        .with_context(|| format!("Failed to bind {}", config.bind))?;
    info!(addr = %config.bind, env = %config.env, "listening");
    axum::serve(listener, router(db.clone(), &config.env))
        .with_graceful_shutdown(shutdown_signal()?)
        .await
        .context("Server error")?;
    Ok(())
}
