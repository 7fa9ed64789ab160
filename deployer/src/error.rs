use std::error::Error as StdError;

use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{ser::SerializeMap, Serialize};

use crate::build::BuildError;
use crate::git::GitError;
use crate::health::ProbeError;
use crate::ssh::SshError;

/// The error taxonomy of §7, collapsed to the single type the orchestrator
/// stores in a deployment's `error_message` and the HTTP boundary renders.
#[derive(thiserror::Error, Debug)]
pub enum OrchestratorError {
    #[error("validation error: {0}")]
    Validation(String),
    #[error("git error: {0}")]
    Git(#[from] GitError),
    #[error("build error: {0}")]
    Build(#[from] BuildError),
    #[error("ssh error: {0}")]
    Ssh(#[from] SshError),
    #[error("health check failed: {0}")]
    Probe(#[from] ProbeError),
    #[error("remote command failed: {0}")]
    RemoteExec(String),
    #[error("deployment cancelled")]
    Cancelled,
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("internal error: {0}")]
    Internal(String),
}

impl OrchestratorError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::Validation(_) => StatusCode::BAD_REQUEST,
            Self::Cancelled => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl Serialize for OrchestratorError {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        let mut map = serializer.serialize_map(Some(2))?;
        map.serialize_entry("type", &format!("{self:?}"))?;
        let msg = self
            .source()
            .map(|s| s.to_string())
            .unwrap_or_else(|| self.to_string());
        map.serialize_entry("msg", &msg)?;
        map.end()
    }
}

impl IntoResponse for OrchestratorError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        (
            status,
            [(
                header::CONTENT_TYPE,
                HeaderValue::from_static("application/json"),
            )],
            Json(self),
        )
            .into_response()
    }
}

pub type Result<T> = std::result::Result<T, OrchestratorError>;
