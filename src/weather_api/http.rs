// weather_api - REST backend for storing and querying weather observations
//
// Copyright 2024 Nick Pillitteri
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License
// along with this program.  If not, see <http://www.gnu.org/licenses/>.
//

use crate::client::ClientError;
use crate::model::{ListFilter, Observation, StatsReport, ValidationError};
use crate::schema::{self, PayloadError, PayloadMode};
use crate::service::{ObservationService, ServiceError};
use crate::store::StoreError;
use axum::body::Bytes;
use axum::extract::rejection::QueryRejection;
use axum::extract::{Path, Query, State};
use axum::http::header::CONTENT_TYPE;
use axum::http::{HeaderValue, Method, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use prometheus_client::encoding::text::encode;
use prometheus_client::registry::Registry;
use serde_json::json;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

const OPENMETRICS_TEXT: &str = "application/openmetrics-text; version=1.0.0; charset=utf-8";

/// State shared by every request handler.
#[derive(Debug)]
pub struct RequestContext {
    service: ObservationService,
    registry: Registry,
}

impl RequestContext {
    pub fn new(service: ObservationService, registry: Registry) -> Self {
        RequestContext { service, registry }
    }
}

/// Build the full route table for the API.
pub fn router(context: Arc<RequestContext>) -> Router {
    Router::new()
        .route("/", get(api_root))
        .route("/metrics", get(text_metrics))
        .route("/observations/", get(list_observations).post(create_observation))
        .route("/observations/fetch_from_api/", post(fetch_from_api))
        .route("/observations/stats/", get(observation_stats))
        .route(
            "/observations/:id/",
            get(retrieve_observation)
                .put(update_observation)
                .patch(partial_update_observation)
                .delete(destroy_observation),
        )
        .layer(TraceLayer::new_for_http())
        .with_state(context)
}

/// CORS policy allowing browser frontends served from `origins` to use the API.
pub fn cors_layer(origins: Vec<HeaderValue>) -> CorsLayer {
    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::PATCH,
            Method::DELETE,
        ])
        .allow_headers([CONTENT_TYPE])
}

/// Every way a request can fail, mapped to a status code and JSON body.
#[derive(Debug)]
pub enum ApiError {
    NotFound,
    BadQuery(String),
    Payload(PayloadError),
    Service(ServiceError),
}

impl From<QueryRejection> for ApiError {
    fn from(e: QueryRejection) -> Self {
        Self::BadQuery(e.body_text())
    }
}

impl From<PayloadError> for ApiError {
    fn from(e: PayloadError) -> Self {
        Self::Payload(e)
    }
}

impl From<ValidationError> for ApiError {
    fn from(e: ValidationError) -> Self {
        Self::Payload(PayloadError::Invalid(e))
    }
}

impl From<ServiceError> for ApiError {
    fn from(e: ServiceError) -> Self {
        Self::Service(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            Self::NotFound | Self::Service(ServiceError::Store(StoreError::NotFound(_))) => {
                (StatusCode::NOT_FOUND, Json(json!({"detail": "Not found."}))).into_response()
            }
            Self::BadQuery(e) => (StatusCode::BAD_REQUEST, Json(json!({ "detail": e }))).into_response(),
            Self::Payload(PayloadError::Malformed(e)) => (
                StatusCode::BAD_REQUEST,
                Json(json!({ "detail": format!("JSON parse error - {}", e) })),
            )
                .into_response(),
            Self::Payload(PayloadError::Invalid(e)) | Self::Service(ServiceError::Store(StoreError::Invalid(e))) => {
                (StatusCode::BAD_REQUEST, Json(e)).into_response()
            }
            Self::Service(ServiceError::Client(e)) => {
                (provider_error_status(&e), Json(json!({ "error": e.to_string() }))).into_response()
            }
            Self::Service(ServiceError::Store(e)) => {
                tracing::error!(message = "observation storage failed", error = %e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(json!({ "detail": e.to_string() })),
                )
                    .into_response()
            }
        }
    }
}

/// Mirror the provider's own status for errors it reported, 400 for everything else.
fn provider_error_status(e: &ClientError) -> StatusCode {
    match e.status() {
        Some(s) if s.is_client_error() || s.is_server_error() => s,
        _ => StatusCode::BAD_REQUEST,
    }
}

/// Unparseable IDs can't match any record so they're treated the same as missing ones.
fn parse_id(raw: &str) -> Result<i64, ApiError> {
    raw.parse::<i64>().map_err(|_| ApiError::NotFound)
}

async fn api_root() -> Json<serde_json::Value> {
    Json(json!({ "observations": "/observations/" }))
}

async fn text_metrics(State(context): State<Arc<RequestContext>>) -> Response {
    let mut buf = String::new();

    match encode(&mut buf, &context.registry) {
        Ok(_) => {
            tracing::debug!(message = "encoded prometheus metrics to text format", num_bytes = buf.len());
            ([(CONTENT_TYPE, OPENMETRICS_TEXT)], buf).into_response()
        }
        Err(e) => {
            tracing::error!(message = "error encoding metrics", error = %e);
            StatusCode::SERVICE_UNAVAILABLE.into_response()
        }
    }
}

async fn list_observations(
    State(context): State<Arc<RequestContext>>,
    filter: Result<Query<ListFilter>, QueryRejection>,
) -> Result<Json<Vec<Observation>>, ApiError> {
    let Query(filter) = filter?;
    Ok(Json(context.service.list(&filter)?))
}

async fn create_observation(
    State(context): State<Arc<RequestContext>>,
    body: Bytes,
) -> Result<(StatusCode, Json<Observation>), ApiError> {
    let draft = schema::observation_payload(&body, PayloadMode::Full)?.into_draft()?;
    let obs = context.service.create(draft)?;

    tracing::info!(message = "created observation", id = obs.id, location = %obs.location);
    Ok((StatusCode::CREATED, Json(obs)))
}

async fn retrieve_observation(
    State(context): State<Arc<RequestContext>>,
    Path(id): Path<String>,
) -> Result<Json<Observation>, ApiError> {
    let id = parse_id(&id)?;
    Ok(Json(context.service.get(id)?))
}

async fn update_observation(
    State(context): State<Arc<RequestContext>>,
    Path(id): Path<String>,
    body: Bytes,
) -> Result<Json<Observation>, ApiError> {
    update(&context, &id, &body, PayloadMode::Full)
}

async fn partial_update_observation(
    State(context): State<Arc<RequestContext>>,
    Path(id): Path<String>,
    body: Bytes,
) -> Result<Json<Observation>, ApiError> {
    update(&context, &id, &body, PayloadMode::Partial)
}

fn update(context: &RequestContext, id: &str, body: &[u8], mode: PayloadMode) -> Result<Json<Observation>, ApiError> {
    let id = parse_id(id)?;
    // Missing records are reported before problems with the body
    context.service.get(id)?;

    let patch = schema::observation_payload(body, mode)?;
    let obs = context.service.update(id, patch)?;

    tracing::info!(message = "updated observation", id = obs.id);
    Ok(Json(obs))
}

async fn destroy_observation(
    State(context): State<Arc<RequestContext>>,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    let id = parse_id(&id)?;
    context.service.delete(id)?;

    tracing::info!(message = "deleted observation", id = id);
    Ok(StatusCode::NO_CONTENT)
}

async fn fetch_from_api(
    State(context): State<Arc<RequestContext>>,
    body: Bytes,
) -> Result<Json<Observation>, ApiError> {
    let req = schema::fetch_payload(&body)?;
    Ok(Json(context.service.fetch_and_store(req.city.as_deref()).await?))
}

async fn observation_stats(State(context): State<Arc<RequestContext>>) -> Result<Json<StatsReport>, ApiError> {
    Ok(Json(context.service.compute_stats()?))
}
