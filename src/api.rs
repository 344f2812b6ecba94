//! Read-only JSON API over the card store.

use std::sync::{Arc, Mutex, PoisonError};

use axum::extract::rejection::{PathRejection, QueryRejection};
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use axum::routing::get;
use axum::Router;
use chrono::{Local, NaiveDate, NaiveDateTime, NaiveTime};
use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{error, instrument};

use crate::db::CardRepository;
use crate::error::TrackerError;
use crate::spending::{MonthlyOverview, monthly_overview, summarize};

#[derive(Clone)]
pub struct AppState {
    pub conn: Arc<Mutex<Connection>>,
}

impl AppState {
    pub fn new(conn: Connection) -> Self {
        Self {
            conn: Arc::new(Mutex::new(conn)),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct ReferenceQuery {
    /// Evaluate as of this day instead of today.
    pub date: Option<NaiveDate>,
}

impl ReferenceQuery {
    fn reference(&self) -> NaiveDateTime {
        self.date
            .map(|day| day.and_time(NaiveTime::MIN))
            .unwrap_or_else(|| Local::now().naive_local())
    }
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
}

pub struct ApiError(TrackerError);

impl From<TrackerError> for ApiError {
    fn from(err: TrackerError) -> Self {
        ApiError(err)
    }
}

impl From<serde_json::Error> for ApiError {
    fn from(err: serde_json::Error) -> Self {
        ApiError(TrackerError::Json(err))
    }
}

impl From<PathRejection> for ApiError {
    fn from(rejection: PathRejection) -> Self {
        ApiError(TrackerError::Invalid(rejection.body_text()))
    }
}

impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        ApiError(TrackerError::Invalid(rejection.body_text()))
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            TrackerError::NotFound(_) => StatusCode::NOT_FOUND,
            TrackerError::Invalid(_) => StatusCode::BAD_REQUEST,
            TrackerError::Database(_) | TrackerError::Json(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        if status.is_server_error() {
            error!(error = %self.0, "request failed");
        }
        (status, Json(json!({ "error": self.0.to_string() }))).into_response()
    }
}

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/cards", get(list_cards))
        .route("/api/cards/:card_id/summary", get(card_summary))
        .route("/api/overview", get(overview))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CorsLayer::permissive()),
        )
        .with_state(state)
}

async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy",
        version: env!("CARGO_PKG_VERSION"),
    })
}

#[instrument(skip(state))]
async fn list_cards(State(state): State<AppState>) -> Result<Json<Value>, ApiError> {
    let conn = state.conn.lock().unwrap_or_else(PoisonError::into_inner);
    let cards = conn.list_cards()?;
    Ok(Json(serde_json::to_value(&cards)?))
}

#[instrument(skip(state))]
async fn card_summary(
    State(state): State<AppState>,
    card_id: Result<Path<i64>, PathRejection>,
    query: Result<Query<ReferenceQuery>, QueryRejection>,
) -> Result<Json<Value>, ApiError> {
    let Path(card_id) = card_id?;
    let Query(query) = query?;
    let conn = state.conn.lock().unwrap_or_else(PoisonError::into_inner);
    let card = conn
        .get_card(card_id)?
        .ok_or_else(|| TrackerError::NotFound(format!("card {card_id}")))?;
    let summary = summarize(&card, query.reference());
    Ok(Json(serde_json::to_value(&summary)?))
}

#[instrument(skip(state))]
async fn overview(
    State(state): State<AppState>,
    query: Result<Query<ReferenceQuery>, QueryRejection>,
) -> Result<Json<MonthlyOverview>, ApiError> {
    let Query(query) = query?;
    let conn = state.conn.lock().unwrap_or_else(PoisonError::into_inner);
    let cards = conn.list_cards()?;
    Ok(Json(monthly_overview(&cards, query.reference())))
}
