// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// HTTP handlers.

use axum::body::Bytes;
use axum::extract::{Path, Query, State};
use axum::http::{StatusCode, header};
use axum::response::IntoResponse;
use axum::Json;
use tracing::info;

use docforge_core::types::{DocumentId, JobId};
use docforge_security::AuditEntry;

use crate::error::ApiError;
use crate::models::{
    DocumentResponse, HealthResponse, JobResponse, ListParams, SubmitJobRequest, SubmitJobResponse,
};
use crate::state::AppState;

const DEFAULT_LIST_LIMIT: usize = 50;
const MAX_LIST_LIMIT: usize = 500;

fn parse_id<T: std::str::FromStr>(raw: &str, what: &str) -> Result<T, ApiError> {
    raw.parse()
        .map_err(|_| ApiError::InvalidRequest(format!("{raw:?} is not a valid {what} id")))
}

pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
        workers: state.engine.config().workers,
        ocr_available: state.engine.ocr_available(),
    })
}

// -- Documents ---------------------------------------------------------------

/// Store the raw request body as a new document.
pub async fn upload_document(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<(StatusCode, Json<DocumentResponse>), ApiError> {
    let stored = state.engine.documents().insert(body.to_vec())?;
    info!(document_id = %stored.id, size = stored.bytes.len(), "document uploaded");
    Ok((
        StatusCode::CREATED,
        Json(DocumentResponse {
            document_id: stored.id,
            hash: stored.hash,
            size: stored.bytes.len(),
            version: stored.version,
        }),
    ))
}

/// Current bytes of a document, including every completed job's changes.
pub async fn download_document(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let id: DocumentId = parse_id(&id, "document")?;
    let stored = state.engine.documents().get(id)?;
    Ok((
        [
            (header::CONTENT_TYPE, "application/pdf".to_string()),
            (header::ETAG, format!("\"{}\"", stored.hash)),
        ],
        stored.bytes.as_ref().clone(),
    ))
}

// -- Jobs --------------------------------------------------------------------

pub async fn submit_job(
    State(state): State<AppState>,
    Json(req): Json<SubmitJobRequest>,
) -> Result<(StatusCode, Json<SubmitJobResponse>), ApiError> {
    let settings = req
        .job_settings(state.engine.config().default_security_level)
        .map_err(|e| ApiError::InvalidRequest(format!("settings for {}: {e}", req.kind)))?;
    let job_id = state.engine.submit(req.document_id, settings)?;
    let job = state.engine.status(job_id)?;
    Ok((
        StatusCode::ACCEPTED,
        Json(SubmitJobResponse {
            job_id,
            state: job.state,
        }),
    ))
}

pub async fn list_jobs(
    State(state): State<AppState>,
    Query(params): Query<ListParams>,
) -> Result<Json<Vec<JobResponse>>, ApiError> {
    let limit = params.limit.unwrap_or(DEFAULT_LIST_LIMIT).clamp(1, MAX_LIST_LIMIT);
    let jobs = state.engine.list(limit)?;
    Ok(Json(jobs.into_iter().map(JobResponse::from).collect()))
}

pub async fn get_job(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<JobResponse>, ApiError> {
    let id: JobId = parse_id(&id, "job")?;
    Ok(Json(state.engine.status(id)?.into()))
}

/// Request cancellation. Responds with the job as it stands; a running job
/// reaches Cancelled shortly after.
pub async fn cancel_job(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<(StatusCode, Json<JobResponse>), ApiError> {
    let id: JobId = parse_id(&id, "job")?;
    let job = state.engine.cancel(id)?;
    Ok((StatusCode::ACCEPTED, Json(job.into())))
}

pub async fn job_audit(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Vec<AuditEntry>>, ApiError> {
    let id: JobId = parse_id(&id, "job")?;
    Ok(Json(state.engine.audit(id)?))
}
