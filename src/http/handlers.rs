//! Client administration handlers.
//!
//! Every change to a client record is mirrored into the bucket store so the
//! limiter sees new limits immediately.

use axum::extract::{Path, State};
use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{debug, error, info, warn};

use super::AppState;
use crate::directory::ClientRecord;
use crate::error::TurnstileError;

/// Body of `POST /clients`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AddClientRequest {
    pub client_id: String,
    pub capacity: u64,
    pub refill_rate_seconds: u64,
    #[serde(default)]
    pub unlimited: bool,
}

/// Body of `PUT /clients/:client_id`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateClientRequest {
    pub capacity: u64,
    pub refill_rate_seconds: u64,
    #[serde(default)]
    pub unlimited: bool,
}

/// A client as returned by the API.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientResponse {
    pub client_id: String,
    pub capacity: u64,
    pub refill_rate_seconds: u64,
    pub unlimited: bool,
    pub created_at: DateTime<Utc>,
}

impl From<ClientRecord> for ClientResponse {
    fn from(record: ClientRecord) -> Self {
        Self {
            client_id: record.key,
            capacity: record.capacity,
            refill_rate_seconds: record.refill_rate_seconds,
            unlimited: record.unlimited,
            created_at: record.created_at,
        }
    }
}

/// Errors returned to HTTP callers.
#[derive(Debug)]
pub enum ApiError {
    BadRequest(String),
    NotFound(String),
    Conflict(String),
    TooManyRequests { retry_after_secs: u64 },
    Internal(String),
}

impl From<TurnstileError> for ApiError {
    fn from(e: TurnstileError) -> Self {
        match e {
            TurnstileError::ClientNotFound(key) => ApiError::NotFound(format!("client {} not found", key)),
            TurnstileError::ClientExists(key) => ApiError::Conflict(format!("client {} already exists", key)),
            TurnstileError::InvalidClient(msg) => ApiError::BadRequest(msg),
            other => ApiError::Internal(other.to_string()),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::BadRequest(msg) => {
                warn!(error_type = "bad_request", message = %msg, "Responding with 400");
                (StatusCode::BAD_REQUEST, msg)
            }
            ApiError::NotFound(msg) => {
                debug!(error_type = "not_found", message = %msg, "Responding with 404");
                (StatusCode::NOT_FOUND, msg)
            }
            ApiError::Conflict(msg) => {
                warn!(error_type = "conflict", message = %msg, "Responding with 409");
                (StatusCode::CONFLICT, msg)
            }
            ApiError::TooManyRequests { retry_after_secs } => {
                let mut response = (
                    StatusCode::TOO_MANY_REQUESTS,
                    Json(json!({ "error": "Too Many Requests" })),
                )
                    .into_response();
                response
                    .headers_mut()
                    .insert(header::RETRY_AFTER, HeaderValue::from(retry_after_secs));
                return response;
            }
            ApiError::Internal(msg) => {
                error!(error_type = "internal", error = %msg, "Responding with 500");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error".to_string(),
                )
            }
        };
        (status, Json(json!({ "error": message }))).into_response()
    }
}

/// POST /clients
pub async fn add_client(
    State(state): State<AppState>,
    Json(body): Json<AddClientRequest>,
) -> Result<impl IntoResponse, ApiError> {
    info!(client_id = %body.client_id, "Adding client");

    let record = ClientRecord::new(
        body.client_id.trim(),
        body.capacity,
        body.refill_rate_seconds,
        body.unlimited,
    );
    state.directory.add(record.clone()).await?;
    state.store.set(&record.key, state.store.new_bucket(record.limit()));

    info!(client_id = %record.key, capacity = record.capacity, unlimited = record.unlimited, "Client added");
    Ok((StatusCode::CREATED, Json(ClientResponse::from(record))))
}

/// GET /clients
pub async fn list_clients(State(state): State<AppState>) -> Result<impl IntoResponse, ApiError> {
    let clients = state.directory.list().await?;
    debug!(count = clients.len(), "Listing clients");

    let response: Vec<ClientResponse> = clients.into_iter().map(ClientResponse::from).collect();
    Ok(Json(response))
}

/// GET /clients/:client_id
pub async fn get_client(
    State(state): State<AppState>,
    Path(client_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let record = state.directory.get(&client_id).await?;
    Ok(Json(ClientResponse::from(record)))
}

/// PUT /clients/:client_id
///
/// The client's bucket is replaced, so its token count starts over at the
/// new capacity.
pub async fn update_client(
    State(state): State<AppState>,
    Path(client_id): Path<String>,
    Json(body): Json<UpdateClientRequest>,
) -> Result<impl IntoResponse, ApiError> {
    info!(client_id = %client_id, "Updating client");

    let record = ClientRecord::new(
        client_id,
        body.capacity,
        body.refill_rate_seconds,
        body.unlimited,
    );
    let updated = state.directory.update(record).await?;
    state.store.set(&updated.key, state.store.new_bucket(updated.limit()));

    Ok(Json(ClientResponse::from(updated)))
}

/// DELETE /clients/:client_id
pub async fn delete_client(
    State(state): State<AppState>,
    Path(client_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    info!(client_id = %client_id, "Deleting client");

    state.directory.delete(&client_id).await?;
    state.store.delete(&client_id);

    Ok(Json(json!({ "deleted": client_id })))
}

/// ANY /api
pub async fn api() -> &'static str {
    "Request allowed\n"
}

/// GET /health
pub async fn health(State(state): State<AppState>) -> impl IntoResponse {
    Json(json!({ "status": "ok", "buckets": state.store.len() }))
}
