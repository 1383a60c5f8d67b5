use axum::{
    extract::{rejection::QueryRejection, Path, Query, State},
    Extension, Json,
};
use chrono::{DateTime, Utc};
use dropship_core::{CatalogItemId, ErrorKind, ImportJob, JobId, JobStatus};
use dropship_pipeline::IntakeError;
use serde::{Deserialize, Serialize};

use crate::middleware::RequestId;

use super::{ApiError, AppState};

#[derive(Debug, Deserialize)]
pub(super) struct JobsQuery {
    pub limit: Option<i64>,
}

#[derive(Debug, Serialize)]
pub(super) struct JobErrorItem {
    kind: ErrorKind,
    message: String,
}

#[derive(Debug, Serialize)]
pub(super) struct JobItem {
    job_id: JobId,
    ali_id: String,
    status: JobStatus,
    attempts: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<JobErrorItem>,
    #[serde(skip_serializing_if = "Option::is_none")]
    catalog_item_id: Option<CatalogItemId>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<ImportJob> for JobItem {
    fn from(job: ImportJob) -> Self {
        Self {
            job_id: job.id,
            ali_id: job.external_id.into(),
            status: job.status,
            attempts: job.attempts,
            error: job.last_error.map(|e| JobErrorItem {
                kind: e.kind,
                message: e.message,
            }),
            catalog_item_id: job.catalog_item_id,
            created_at: job.created_at,
            updated_at: job.updated_at,
        }
    }
}

fn map_intake_error(request_id: String, error: &IntakeError) -> ApiError {
    ApiError::internal(request_id, error)
}

/// `GET /jobs`: newest first.
pub(super) async fn list_jobs(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    query: Result<Query<JobsQuery>, QueryRejection>,
) -> Result<Json<Vec<JobItem>>, ApiError> {
    let Query(query) = query.map_err(|rejection| {
        ApiError::new(req_id.0.clone(), "bad_request", rejection.body_text())
    })?;

    let jobs = state
        .intake
        .list(query.limit)
        .await
        .map_err(|e| map_intake_error(req_id.0.clone(), &e))?;

    Ok(Json(jobs.into_iter().map(JobItem::from).collect()))
}

/// `GET /jobs/{job_id}`. Ids that do not parse are reported as not found.
pub(super) async fn get_job(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Path(raw_id): Path<String>,
) -> Result<Json<JobItem>, ApiError> {
    let not_found = || ApiError::new(req_id.0.clone(), "not_found", "job not found");

    let Ok(id) = raw_id.parse::<JobId>() else {
        return Err(not_found());
    };

    let job = state
        .intake
        .get(id)
        .await
        .map_err(|e| map_intake_error(req_id.0.clone(), &e))?
        .ok_or_else(not_found)?;

    Ok(Json(job.into()))
}

#[cfg(test)]
mod tests {
    use axum::http::StatusCode;
    use chrono::Utc;
    use dropship_core::{ExternalId, JobError};
    use serde_json::json;

    use super::super::test_support::{app, get, memory_state, post_json, send};
    use super::*;

    #[test]
    fn optional_fields_are_omitted_until_set() {
        let job = ImportJob::queued(ExternalId::parse("12345").unwrap(), Utc::now());
        let json = serde_json::to_value(JobItem::from(job)).unwrap();
        assert_eq!(json["ali_id"], "12345");
        assert_eq!(json["status"], "queued");
        assert_eq!(json["attempts"], 0);
        assert!(json.get("error").is_none());
        assert!(json.get("catalog_item_id").is_none());
    }

    #[test]
    fn errors_serialize_kind_and_message() {
        let mut job = ImportJob::queued(ExternalId::parse("1").unwrap(), Utc::now());
        job.status = JobStatus::RetryWait;
        job.last_error = Some(JobError::new(ErrorKind::Transient, "fetch timed out"));
        let json = serde_json::to_value(JobItem::from(job)).unwrap();
        assert_eq!(json["status"], "retry_wait");
        assert_eq!(json["error"]["kind"], "transient");
        assert_eq!(json["error"]["message"], "fetch timed out");
    }

    #[tokio::test]
    async fn submitted_job_is_listed_and_fetchable() {
        let router = app(memory_state());
        let (_, accepted) = send(&router, post_json("/import", &json!({"ali_id": "12345"}))).await;
        let job_id = accepted["job_id"].as_str().unwrap().to_string();

        let (status, list) = send(&router, get("/jobs?limit=10")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(list[0]["job_id"], job_id.as_str());

        let (status, one) = send(&router, get(&format!("/jobs/{job_id}"))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(one["ali_id"], "12345");
        assert!(one["created_at"].is_string());
    }

    #[tokio::test]
    async fn unknown_and_unparseable_ids_are_not_found() {
        let router = app(memory_state());
        let (status, json) = send(&router, get("/jobs/not-a-uuid")).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(json["error"]["code"], "not_found");

        let missing = JobId::new();
        let (status, _) = send(&router, get(&format!("/jobs/{missing}"))).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn non_numeric_limit_is_a_bad_request() {
        let (status, json) = send(&app(memory_state()), get("/jobs?limit=lots")).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(json["error"]["code"], "bad_request");
    }
}
