//! HTTP route handlers: health, clients, quotes, history, audit.

use std::str::FromStr;
use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use rust_decimal::Decimal;
use serde::Deserialize;
use time::OffsetDateTime;

use chantier_core::{QuoteStatus, Stage};
use chantier_storage::ChantierStorage;
use chantier_engine::{
    create_client, create_quote, delete_quote, patch_quote, MutationContext, NewQuote, QuoteMutation,
    QuotePatch,
};

use super::error::{json_error, ApiError};
use super::state::AppState;

/// Fallback handler for unmatched routes.
pub(crate) async fn handle_not_found() -> impl IntoResponse {
    json_error(StatusCode::NOT_FOUND, "not found")
}

/// GET /health
pub(crate) async fn handle_health() -> impl IntoResponse {
    let response = serde_json::json!({
        "success": true,
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
    });
    (StatusCode::OK, Json(response))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct CreateClientRequest {
    client_id: String,
    stage: Option<Stage>,
}

/// POST /clients
///
/// Lead-conversion hook: creates the client record the quote endpoints
/// operate on. New clients default to the qualified stage.
pub(crate) async fn handle_create_client(
    State(state): State<Arc<AppState>>,
    Json(body): Json<CreateClientRequest>,
) -> Result<impl IntoResponse, ApiError> {
    if body.client_id.trim().is_empty() {
        return Err(ApiError::Validation("clientId must not be empty".to_string()));
    }
    let ctx = request_context(None);
    let stage = body.stage.unwrap_or(Stage::Qualified);
    let client = create_client(&state.storage, &ctx, &body.client_id, stage).await?;
    let response = serde_json::json!({ "success": true, "data": client });
    Ok((StatusCode::CREATED, Json(response)))
}

/// GET /clients/{id}/quotes
pub(crate) async fn handle_list_quotes(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    // Distinguish an unknown client from one with no quotes.
    state.storage.get_client(&id).await?;
    let quotes = state.storage.list_quotes_for_client(&id).await?;
    let response = serde_json::json!({ "success": true, "data": quotes });
    Ok((StatusCode::OK, Json(response)))
}

#[derive(Deserialize)]
pub(crate) struct CreateQuoteRequest {
    title: String,
    montant: serde_json::Value,
    description: Option<String>,
    statut: Option<QuoteStatus>,
    #[serde(rename = "createdBy")]
    created_by: Option<String>,
    notes: Option<String>,
    fichier: Option<String>,
}

/// POST /clients/{id}/quotes
pub(crate) async fn handle_create_quote(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(body): Json<CreateQuoteRequest>,
) -> Result<impl IntoResponse, ApiError> {
    if body.title.trim().is_empty() {
        return Err(ApiError::Validation("title must not be empty".to_string()));
    }
    let montant = parse_montant(&body.montant)?;
    let ctx = request_context(body.created_by.as_deref());
    let new = NewQuote {
        title: body.title,
        montant,
        description: body.description,
        statut: body.statut,
        notes: body.notes,
        fichier: body.fichier,
        created_by: body.created_by,
    };
    let out = create_quote(&state.storage, &ctx, &id, new).await?;
    Ok((StatusCode::CREATED, Json(mutation_envelope(&out))))
}

#[derive(Deserialize)]
pub(crate) struct PatchQuoteRequest {
    #[serde(rename = "devisId")]
    devis_id: String,
    title: Option<String>,
    montant: Option<serde_json::Value>,
    description: Option<String>,
    statut: Option<QuoteStatus>,
    facture_reglee: Option<bool>,
    notes: Option<String>,
    fichier: Option<String>,
}

/// PATCH /clients/{id}/quotes
///
/// The body carries `devisId` plus any subset of mutable fields; absent
/// fields are left untouched.
pub(crate) async fn handle_patch_quote(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(body): Json<PatchQuoteRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let montant = body.montant.as_ref().map(parse_montant).transpose()?;
    let ctx = request_context(None);
    let patch = QuotePatch {
        title: body.title,
        montant,
        description: body.description,
        statut: body.statut,
        facture_reglee: body.facture_reglee,
        notes: body.notes,
        fichier: body.fichier,
    };
    let out = patch_quote(&state.storage, &ctx, &id, &body.devis_id, patch).await?;
    Ok((StatusCode::OK, Json(mutation_envelope(&out))))
}

#[derive(Deserialize)]
pub(crate) struct DeleteQuoteQuery {
    #[serde(rename = "devisId")]
    devis_id: Option<String>,
}

/// DELETE /clients/{id}/quotes?devisId=...
pub(crate) async fn handle_delete_quote(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Query(query): Query<DeleteQuoteQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let devis_id = query
        .devis_id
        .ok_or_else(|| ApiError::Validation("devisId query parameter is required".to_string()))?;
    let ctx = request_context(None);
    delete_quote(&state.storage, &ctx, &id, &devis_id).await?;
    let response = serde_json::json!({ "success": true });
    Ok((StatusCode::OK, Json(response)))
}

/// GET /clients/{id}/history
pub(crate) async fn handle_history(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    state.storage.get_client(&id).await?;
    let rows = state.storage.list_stage_history(&id).await?;
    let response = serde_json::json!({ "success": true, "data": rows });
    Ok((StatusCode::OK, Json(response)))
}

/// GET /clients/{id}/audit
pub(crate) async fn handle_audit(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    state.storage.get_client(&id).await?;
    let rows = state.storage.list_audit(&id).await?;
    let response = serde_json::json!({ "success": true, "data": rows });
    Ok((StatusCode::OK, Json(response)))
}

/// One request, one instant: every timestamp written by the mutation uses
/// this context's `now`.
fn request_context(author: Option<&str>) -> MutationContext {
    MutationContext {
        author: author.unwrap_or("api").to_string(),
        now: OffsetDateTime::now_utc(),
    }
}

/// Accept `montant` as either a JSON string ("12500.50") or a number, the
/// way existing clients send it. Anything else is a 400.
fn parse_montant(value: &serde_json::Value) -> Result<Decimal, ApiError> {
    let parsed = match value {
        serde_json::Value::String(s) => Decimal::from_str(s).ok(),
        serde_json::Value::Number(n) => Decimal::from_str(&n.to_string()).ok(),
        _ => None,
    };
    parsed.ok_or_else(|| ApiError::Validation(format!("malformed montant: {value}")))
}

fn mutation_envelope(out: &QuoteMutation) -> serde_json::Value {
    serde_json::json!({
        "success": true,
        "data": out.quote,
        "stageProgressed": out.stage_progressed,
        "newStage": out.new_stage,
    })
}
