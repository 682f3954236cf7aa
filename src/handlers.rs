use crate::assignment::{AssignmentWorkflow, ClientMeta};
use crate::errors::AppError;
use crate::lytex_client::LytexClient;
use crate::models::{
    AssignValueRequest, AssignValueResponse, ReconcileBatchRequest, ReconcileRequest,
    ReconcileResponse, SyncResponse,
};
use crate::notifications::ManagerNotifier;
use crate::reconciliation::ReconciliationEngine;
use crate::store::ContributionStore;
use axum::{
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    Json,
};
use serde_json::json;
use sqlx::PgPool;
use std::sync::Arc;
use uuid::Uuid;

/// Shared application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    /// Database connection pool.
    pub db: PgPool,
    /// Lytex client; shared so the token cache is process-wide.
    pub lytex: Arc<LytexClient>,
    /// Manager notification dispatcher.
    pub notifier: ManagerNotifier,
}

/// Health check endpoint.
pub async fn health() -> (StatusCode, Json<serde_json::Value>) {
    (
        StatusCode::OK,
        Json(json!({
            "status": "healthy",
            "service": "contrib-billing-api",
            "version": "0.1.0"
        })),
    )
}

fn client_meta(headers: &HeaderMap) -> ClientMeta {
    ClientMeta {
        ip_address: headers
            .get("x-forwarded-for")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.split(',').next())
            .map(|v| v.trim().to_string()),
        user_agent: headers
            .get("user-agent")
            .and_then(|v| v.to_str().ok())
            .map(String::from),
    }
}

/// POST /api/v1/contributions/:id/assign-value
///
/// Validates the submitted value and portal authorization, issues the Lytex
/// invoice and transitions the contribution from `awaiting_value` to
/// `pending`. Succeeds at most once per contribution.
///
/// # Returns
///
/// * `200 {"success": true, "lytex_invoice_url": ...}` on success;
/// * `400` invalid value, `403` authorization failure, `404` unknown
///   contribution, `409` already priced, `500` provider failure.
pub async fn assign_value(
    State(state): State<Arc<AppState>>,
    Path(contribution_id): Path<Uuid>,
    headers: HeaderMap,
    Json(request): Json<AssignValueRequest>,
) -> Result<Json<AssignValueResponse>, AppError> {
    tracing::info!(
        "POST /contributions/{}/assign-value (portal: {:?})",
        contribution_id,
        request.portal_type
    );

    let ctx = request.portal_context()?;
    let meta = client_meta(&headers);

    let workflow = AssignmentWorkflow::new(
        ContributionStore::new(state.db.clone()),
        state.lytex.clone(),
        state.notifier.clone(),
    );
    let invoice_url = workflow
        .assign_value(contribution_id, request.value, ctx, &meta)
        .await?;

    Ok(Json(AssignValueResponse {
        success: true,
        lytex_invoice_url: invoice_url,
    }))
}

/// POST /api/v1/clinics/:clinic_id/contributions/sync
///
/// Pulls invoice state from Lytex for every invoiced, unreconciled
/// contribution of the clinic and converges local records. Divergent
/// amounts are flagged, never corrected.
pub async fn sync_contributions(
    State(state): State<Arc<AppState>>,
    Path(clinic_id): Path<Uuid>,
) -> Result<Json<SyncResponse>, AppError> {
    tracing::info!("POST /clinics/{}/contributions/sync", clinic_id);

    let engine = ReconciliationEngine::new(
        ContributionStore::new(state.db.clone()),
        state.lytex.clone(),
    );
    let updated = engine.sync_pending(clinic_id).await?;

    Ok(Json(SyncResponse { updated }))
}

/// POST /api/v1/contributions/:id/reconcile
///
/// Marks one paid, non-divergent contribution as reconciled. Idempotent:
/// an already-reconciled or divergent record is a no-op (`reconciled: 0`).
pub async fn reconcile_one(
    State(state): State<Arc<AppState>>,
    Path(contribution_id): Path<Uuid>,
    Json(request): Json<ReconcileRequest>,
) -> Result<Json<ReconcileResponse>, AppError> {
    tracing::info!("POST /contributions/{}/reconcile", contribution_id);

    let engine = ReconciliationEngine::new(
        ContributionStore::new(state.db.clone()),
        state.lytex.clone(),
    );
    let reconciled = engine.reconcile_one(contribution_id, request.actor_id).await?;

    Ok(Json(ReconcileResponse { reconciled }))
}

/// POST /api/v1/contributions/reconcile-batch
///
/// Batch reconciliation in a single statement. The returned count is rows
/// actually changed; ids filtered out by the paid/unreconciled/non-divergent
/// guard are silent no-ops.
pub async fn reconcile_batch(
    State(state): State<Arc<AppState>>,
    Json(request): Json<ReconcileBatchRequest>,
) -> Result<Json<ReconcileResponse>, AppError> {
    tracing::info!(
        "POST /contributions/reconcile-batch ({} ids)",
        request.contribution_ids.len()
    );

    let engine = ReconciliationEngine::new(
        ContributionStore::new(state.db.clone()),
        state.lytex.clone(),
    );
    let reconciled = engine
        .reconcile_batch(&request.contribution_ids, request.actor_id)
        .await?;

    Ok(Json(ReconcileResponse { reconciled }))
}
