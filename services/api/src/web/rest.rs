//! services/api/src/web/rest.rs
//!
//! Contains the Axum handlers for the REST API endpoints and the master
//! definition for the OpenAPI specification.

use crate::adapters::ThresholdStore;
use crate::web::state::{AppState, CustomerId};
use ambassador_core::{PortError, Reviewability, ThresholdConfig, ViewingLedger};
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Json},
    Extension,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{error, info};
use utoipa::{OpenApi, ToSchema};

//=========================================================================================
// OpenAPI Master Definition
//=========================================================================================

#[derive(OpenApi)]
#[openapi(
    paths(
        health_handler,
        document_status_handler,
        list_ledger_handler,
        reset_ledger_handler,
        get_thresholds_handler,
        update_thresholds_handler,
    ),
    components(
        schemas(DocumentStatusResponse, LedgerEntryResponse, ThresholdConfigBody)
    ),
    tags(
        (name = "M.Ambassador API", description = "Point accrual endpoints for the document viewer.")
    )
)]
pub struct ApiDoc;

//=========================================================================================
// API Response and Payload Structs
//=========================================================================================

/// Whether a document can currently earn points for the customer.
#[derive(Debug, Serialize, Deserialize, ToSchema, PartialEq)]
pub struct DocumentStatusResponse {
    pub document_id: String,
    pub reviewable: bool,
    /// Seconds until the document can earn points again; 0 when reviewable.
    pub remaining_seconds: u64,
}

/// One credited document of the customer's viewing history.
#[derive(Debug, Serialize, Deserialize, ToSchema, PartialEq)]
pub struct LedgerEntryResponse {
    pub document_id: String,
    pub last_viewed_at: DateTime<Utc>,
}

/// Viewing-time thresholds as exchanged with the admin screens.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, ToSchema, PartialEq)]
pub struct ThresholdConfigBody {
    /// Seconds to reach the 50% milestone.
    pub min_viewing_time_50: u32,
    /// Seconds to reach the 100% milestone.
    pub min_viewing_time_100: u32,
    pub milestone_50_enabled: bool,
    /// Seconds a credited document stays locked.
    pub cooldown_secs: u32,
}

impl From<ThresholdConfig> for ThresholdConfigBody {
    fn from(config: ThresholdConfig) -> Self {
        Self {
            min_viewing_time_50: config.duration50,
            min_viewing_time_100: config.duration100,
            milestone_50_enabled: config.milestone50_enabled,
            cooldown_secs: config.cooldown_secs,
        }
    }
}

impl From<ThresholdConfigBody> for ThresholdConfig {
    fn from(body: ThresholdConfigBody) -> Self {
        Self {
            duration50: body.min_viewing_time_50,
            duration100: body.min_viewing_time_100,
            milestone50_enabled: body.milestone_50_enabled,
            cooldown_secs: body.cooldown_secs,
        }
    }
}

//=========================================================================================
// REST API Handlers
//=========================================================================================

/// Liveness probe.
#[utoipa::path(
    get,
    path = "/health",
    responses((status = 200, description = "Service is up"))
)]
pub async fn health_handler() -> &'static str {
    "ok"
}

/// Check whether a document can currently earn points.
#[utoipa::path(
    get,
    path = "/documents/{document_id}/status",
    params(
        ("document_id" = String, Path, description = "The document identifier."),
        ("x-customer-id" = String, Header, description = "The customer's identifier.")
    ),
    responses(
        (status = 200, description = "Current cooldown status", body = DocumentStatusResponse),
        (status = 401, description = "Missing customer id"),
        (status = 500, description = "Internal server error")
    )
)]
pub async fn document_status_handler(
    State(app_state): State<Arc<AppState>>,
    Extension(CustomerId(customer_id)): Extension<CustomerId>,
    Path(document_id): Path<String>,
) -> Result<Json<DocumentStatusResponse>, (StatusCode, String)> {
    let reviewability = app_state
        .engine
        .reviewability(&customer_id, &document_id)
        .await
        .map_err(|e| {
            error!("Failed to read viewing ledger: {:?}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Failed to read viewing history".to_string(),
            )
        })?;

    let remaining_seconds = match reviewability {
        Reviewability::Reviewable => 0,
        Reviewability::Locked { remaining_seconds } => remaining_seconds,
    };
    Ok(Json(DocumentStatusResponse {
        document_id,
        reviewable: reviewability.is_reviewable(),
        remaining_seconds,
    }))
}

/// List the customer's credited documents, most recent first.
#[utoipa::path(
    get,
    path = "/ledger",
    params(("x-customer-id" = String, Header, description = "The customer's identifier.")),
    responses(
        (status = 200, description = "Viewing history", body = [LedgerEntryResponse]),
        (status = 401, description = "Missing customer id"),
        (status = 500, description = "Internal server error")
    )
)]
pub async fn list_ledger_handler(
    State(app_state): State<Arc<AppState>>,
    Extension(CustomerId(customer_id)): Extension<CustomerId>,
) -> Result<Json<Vec<LedgerEntryResponse>>, (StatusCode, String)> {
    let entries = app_state
        .engine
        .ledger()
        .entries(&customer_id)
        .await
        .map_err(|e| {
            error!("Failed to list viewing ledger: {:?}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Failed to read viewing history".to_string(),
            )
        })?;

    Ok(Json(
        entries
            .into_iter()
            .map(|entry| LedgerEntryResponse {
                document_id: entry.document_id,
                last_viewed_at: entry.last_viewed_at,
            })
            .collect(),
    ))
}

/// Forget the customer's viewing history. Called on logout.
#[utoipa::path(
    delete,
    path = "/ledger",
    params(("x-customer-id" = String, Header, description = "The customer's identifier.")),
    responses(
        (status = 204, description = "History cleared"),
        (status = 401, description = "Missing customer id"),
        (status = 500, description = "Internal server error")
    )
)]
pub async fn reset_ledger_handler(
    State(app_state): State<Arc<AppState>>,
    Extension(CustomerId(customer_id)): Extension<CustomerId>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    app_state
        .engine
        .ledger()
        .clear(&customer_id)
        .await
        .map_err(|e| {
            error!("Failed to clear viewing ledger: {:?}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Failed to clear viewing history".to_string(),
            )
        })?;
    info!("Cleared viewing history for customer {}", customer_id);
    Ok(StatusCode::NO_CONTENT)
}

/// Read the thresholds new viewing sessions will use.
#[utoipa::path(
    get,
    path = "/admin/thresholds",
    params(("x-admin-token" = String, Header, description = "Admin token.")),
    responses(
        (status = 200, description = "Current thresholds", body = ThresholdConfigBody),
        (status = 401, description = "Invalid admin token")
    )
)]
pub async fn get_thresholds_handler(
    State(app_state): State<Arc<AppState>>,
) -> Json<ThresholdConfigBody> {
    Json(app_state.engine.current_thresholds().await.into())
}

/// Replace the viewing thresholds. Sessions already open keep their thresholds.
#[utoipa::path(
    put,
    path = "/admin/thresholds",
    request_body = ThresholdConfigBody,
    params(("x-admin-token" = String, Header, description = "Admin token.")),
    responses(
        (status = 200, description = "Thresholds stored", body = ThresholdConfigBody),
        (status = 400, description = "Inconsistent thresholds"),
        (status = 401, description = "Invalid admin token"),
        (status = 500, description = "Internal server error")
    )
)]
pub async fn update_thresholds_handler(
    State(app_state): State<Arc<AppState>>,
    Json(body): Json<ThresholdConfigBody>,
) -> Result<Json<ThresholdConfigBody>, (StatusCode, String)> {
    let config = ThresholdConfig::from(body);
    config
        .validate()
        .map_err(|e| (StatusCode::BAD_REQUEST, e))?;

    app_state
        .thresholds
        .save_threshold_config(&config)
        .await
        .map_err(|e| match e {
            PortError::Rejected(reason) => (StatusCode::BAD_REQUEST, reason),
            e => {
                error!("Failed to store threshold config: {:?}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Failed to store thresholds".to_string(),
                )
            }
        })?;
    info!("Threshold config updated: {:?}", config);
    Ok(Json(config.into()))
}
