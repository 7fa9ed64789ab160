use axum::extract::{Multipart, Path, Query, State};
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::IntoResponse;
use axum::Json;
use dockhand_common::{DeploymentKind, DeploymentStatus};
use futures::stream;
use serde::Deserialize;

use crate::error::{OrchestratorError, Result};
use crate::log_pipeline::KEEPALIVE_INTERVAL;
use crate::orchestrator::ProjectConfig;

use super::dto::{CreateDeploymentRequest, DeploymentResponse, LogsResponse, SubmitResponse};
use super::state::AppState;

#[derive(Debug, Deserialize)]
pub struct SinceQuery {
    pub since_id: Option<i64>,
}

/// `POST /api/deployments` — creates and submits a `FULL` or
/// `RESTART_ONLY` deployment (§6).
pub async fn create_deployment(
    State(state): State<AppState>,
    Json(request): Json<CreateDeploymentRequest>,
) -> Result<Json<SubmitResponse>> {
    if request.kind == DeploymentKind::Upload {
        return Err(OrchestratorError::Validation(
            "use POST /api/deployments/upload for UPLOAD deployments".to_string(),
        ));
    }

    let project_row = state
        .db
        .get_project(request.project_id)
        .await?
        .ok_or_else(|| OrchestratorError::Validation("unknown project".to_string()))?;
    let project = ProjectConfig::from_row(project_row).map_err(OrchestratorError::Validation)?;
    if request.kind == DeploymentKind::RestartOnly && project.restart_only_script.is_none() {
        return Err(OrchestratorError::Validation(
            "project has no restart_only_script configured".to_string(),
        ));
    }

    let deployment_id = state
        .db
        .create_deployment(
            request.project_id,
            &request.branch,
            request.kind,
            &request.target_server_group_ids,
            request.environment,
            None,
            request.created_by,
        )
        .await?;

    let admitted = state.service.submit(deployment_id).await?;
    let status = if admitted {
        DeploymentStatus::Pending
    } else {
        DeploymentStatus::Queued
    };
    Ok(Json(SubmitResponse { deployment_id, status }))
}

/// `POST /api/deployments/upload` — creates and submits an `UPLOAD`
/// deployment from a directly-provided artifact (§4.7 kind == UPLOAD).
pub async fn create_upload_deployment(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Json<SubmitResponse>> {
    let mut project_id: Option<i64> = None;
    let mut target_server_group_ids: Vec<i64> = Vec::new();
    let mut environment: Option<dockhand_common::Environment> = None;
    let mut created_by: Option<i64> = None;
    let mut file_name: Option<String> = None;
    let mut file_bytes: Option<Vec<u8>> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| OrchestratorError::Validation(format!("invalid multipart body: {e}")))?
    {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "project_id" => {
                let text = field.text().await.unwrap_or_default();
                project_id = text.parse().ok();
            }
            "target_server_group_ids" => {
                let text = field.text().await.unwrap_or_default();
                target_server_group_ids = text
                    .split(',')
                    .filter(|s| !s.is_empty())
                    .filter_map(|s| s.trim().parse().ok())
                    .collect();
            }
            "environment" => {
                let text = field.text().await.unwrap_or_default();
                environment = text.parse().ok();
            }
            "created_by" => {
                let text = field.text().await.unwrap_or_default();
                created_by = text.parse().ok();
            }
            "artifact" => {
                file_name = field.file_name().map(str::to_string);
                file_bytes = Some(
                    field
                        .bytes()
                        .await
                        .map_err(|e| OrchestratorError::Validation(format!("failed to read upload: {e}")))?
                        .to_vec(),
                );
            }
            _ => {}
        }
    }

    let project_id = project_id.ok_or_else(|| OrchestratorError::Validation("missing project_id".to_string()))?;
    let environment = environment.ok_or_else(|| OrchestratorError::Validation("missing environment".to_string()))?;
    let file_name = file_name.ok_or_else(|| OrchestratorError::Validation("missing artifact file".to_string()))?;
    let file_bytes = file_bytes.ok_or_else(|| OrchestratorError::Validation("missing artifact file".to_string()))?;

    let project_row = state
        .db
        .get_project(project_id)
        .await?
        .ok_or_else(|| OrchestratorError::Validation("unknown project".to_string()))?;
    let project = ProjectConfig::from_row(project_row).map_err(OrchestratorError::Validation)?;

    let expected_ext = project.kind.expected_upload_extension();
    let actual_ext = std::path::Path::new(&file_name)
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or_default();
    if !actual_ext.eq_ignore_ascii_case(expected_ext) {
        return Err(OrchestratorError::Validation(format!(
            "expected a .{expected_ext} artifact for a {} project, got .{actual_ext}",
            project.kind
        )));
    }

    let deployment_id = state
        .db
        .create_deployment(
            project_id,
            "",
            DeploymentKind::Upload,
            &target_server_group_ids,
            environment,
            None,
            created_by,
        )
        .await?;

    tokio::fs::create_dir_all(&state.config.artifacts_dir).await?;
    let artifact_path = state
        .config
        .artifacts_dir
        .join(format!("upload_{deployment_id}.{expected_ext}"));
    tokio::fs::write(&artifact_path, &file_bytes).await?;

    let sha256 = crate::build::digest_file(&artifact_path).await?;
    state
        .db
        .insert_artifact(
            deployment_id,
            &artifact_path.to_string_lossy(),
            file_bytes.len() as u64,
            &sha256,
        )
        .await?;

    let admitted = state.service.submit(deployment_id).await?;
    let status = if admitted {
        DeploymentStatus::Pending
    } else {
        DeploymentStatus::Queued
    };
    Ok(Json(SubmitResponse { deployment_id, status }))
}

/// `GET /api/deployments` (§6).
pub async fn list_deployments(State(state): State<AppState>) -> Result<Json<Vec<DeploymentResponse>>> {
    let rows = state.db.list_deployments().await?;
    Ok(Json(rows.into_iter().map(DeploymentResponse::from_row).collect()))
}

/// `GET /api/deployments/{id}` with an optional `since_id` query param
/// whose matching log tail is folded into the response as `max_log_id`
/// (§6).
pub async fn get_deployment(
    State(state): State<AppState>,
    Path(deployment_id): Path<i64>,
    Query(query): Query<SinceQuery>,
) -> Result<Json<DeploymentResponse>> {
    let row = state
        .db
        .get_deployment(deployment_id)
        .await?
        .ok_or_else(|| OrchestratorError::Validation("deployment not found".to_string()))?;
    let (_, max_log_id) = state.db.fetch_logs(deployment_id, query.since_id).await?;
    let mut response = DeploymentResponse::from_row(row);
    response.max_log_id = max_log_id;
    Ok(Json(response))
}

/// `GET /api/deployments/{id}/logs/tail?since_id=` — a one-shot incremental
/// fetch, for callers that don't want to hold an SSE connection open.
pub async fn get_logs(
    State(state): State<AppState>,
    Path(deployment_id): Path<i64>,
    Query(query): Query<SinceQuery>,
) -> Result<Json<LogsResponse>> {
    let (entries, max_log_id) = state.db.fetch_logs(deployment_id, query.since_id).await?;
    Ok(Json(LogsResponse { entries, max_log_id }))
}

/// `GET /api/deployments/{id}/logs` — live log tail over SSE with a 30s
/// keepalive, per the streaming contract in §4.1/§6.
pub async fn stream_logs(
    State(state): State<AppState>,
    Path(deployment_id): Path<i64>,
) -> impl IntoResponse {
    let pipeline = state.logs.get_or_create(deployment_id);
    let mut receiver = pipeline.subscribe();

    let stream = stream::unfold(receiver, move |mut receiver| async move {
        let entry = receiver.recv().await?;
        let event = Event::default().data(entry.to_sse_data());
        Some((Ok::<_, std::convert::Infallible>(event), receiver))
    });

    Sse::new(stream).keep_alive(KeepAlive::new().interval(KEEPALIVE_INTERVAL).text("keep-alive"))
}

/// `POST /api/deployments/{id}/rollback` — `{id}` names the deployment to
/// roll back *to*. Creates a new deployment row referencing it and
/// redeploys its artifact directly, bypassing clone/build (§4.11).
pub async fn rollback_deployment(
    State(state): State<AppState>,
    Path(source_deployment_id): Path<i64>,
) -> Result<Json<SubmitResponse>> {
    let source_row = state
        .db
        .get_deployment(source_deployment_id)
        .await?
        .ok_or_else(|| OrchestratorError::Validation("source deployment not found".to_string()))?;

    let rollback_deployment_id = state
        .db
        .create_deployment(
            source_row.project_id,
            &source_row.branch,
            source_row.kind.0,
            &source_row.target_server_ids(),
            source_row.environment.0,
            Some(source_row.id),
            None,
        )
        .await?;

    let admitted = state
        .service
        .submit_rollback(rollback_deployment_id, source_deployment_id)
        .await?;
    let status = if admitted {
        DeploymentStatus::Pending
    } else {
        DeploymentStatus::Queued
    };
    Ok(Json(SubmitResponse {
        deployment_id: rollback_deployment_id,
        status,
    }))
}

/// `DELETE /api/deployments/{id}` — cooperative cancel (§4.7). Rejects with
/// 400 if the deployment has already reached a terminal status (§8).
pub async fn cancel_deployment(State(state): State<AppState>, Path(deployment_id): Path<i64>) -> Result<Json<bool>> {
    let row = state
        .db
        .get_deployment(deployment_id)
        .await?
        .ok_or_else(|| OrchestratorError::Validation("deployment not found".to_string()))?;
    if row.status.0.is_terminal() {
        return Err(OrchestratorError::Validation(format!(
            "deployment {deployment_id} is already in a terminal status ({})",
            row.status.0
        )));
    }
    Ok(Json(state.service.cancel(deployment_id).await))
}
