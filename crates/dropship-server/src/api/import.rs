use axum::{
    extract::{rejection::JsonRejection, State},
    http::StatusCode,
    Extension, Json,
};
use dropship_core::{JobId, JobStatus};
use dropship_pipeline::IntakeError;
use serde::{Deserialize, Serialize};

use crate::middleware::RequestId;

use super::{ApiError, AppState};

#[derive(Debug, Deserialize)]
pub(super) struct ImportRequest {
    ali_id: String,
}

#[derive(Debug, Serialize)]
pub(super) struct ImportAccepted {
    job_id: JobId,
    status: JobStatus,
}

/// `POST /import`: enqueue an import, or return the job already running for
/// the same item.
pub(super) async fn submit_import(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    body: Result<Json<ImportRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<ImportAccepted>), ApiError> {
    let Json(body) = body.map_err(|rejection| {
        ApiError::new(req_id.0.clone(), "bad_request", rejection.body_text())
    })?;

    let submission = state
        .intake
        .submit(&body.ali_id)
        .await
        .map_err(|e| match e {
            IntakeError::InvalidExternalId(_) => {
                ApiError::new(req_id.0.clone(), "validation_error", e.to_string())
            }
            IntakeError::Store(ref store) => ApiError::internal(req_id.0.clone(), store),
        })?;

    Ok((
        StatusCode::ACCEPTED,
        Json(ImportAccepted {
            job_id: submission.job.id,
            status: submission.job.status,
        }),
    ))
}
