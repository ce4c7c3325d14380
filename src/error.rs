//! Typed errors and HTTP mapping.

use crate::interceptor::http::escape_entities;
use axum::{
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use std::path::PathBuf;
use thiserror::Error;

/// Startup configuration problems. Always fatal.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("missing credentials for cluster {cluster}: {field} is not set")]
    MissingCredentials { cluster: String, field: &'static str },
    #[error("projects property is empty for additional cluster (url): {url}")]
    EmptyProjects { url: String },
    #[error("unsupported driver '{driver}' for cluster {url} (only PostgreSQL is supported)")]
    UnsupportedDriver { url: String, driver: String },
    #[error("invalid connection url '{url}': {reason}")]
    InvalidUrl { url: String, reason: String },
    #[error("invalid value for {key}: '{value}'")]
    InvalidValue { key: String, value: String },
    #[error("config load: {0}")]
    Load(String),
}

/// Schema migration failures. Always fatal at startup.
#[derive(Error, Debug)]
pub enum MigrationError {
    #[error("cannot read changelog {path}: {source}")]
    Changelog {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("migration of {url} failed: {source}")]
    Database {
        url: String,
        #[source]
        source: sqlx::Error,
    },
    #[error("changeset '{id}' failed on {url}: {source}")]
    Changeset {
        id: String,
        url: String,
        #[source]
        source: sqlx::Error,
    },
    #[error("cannot write rollback file {path}: {source}")]
    RollbackFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

#[derive(Error, Debug)]
pub enum MessagingError {
    #[error("message conversion: {0}")]
    Conversion(String),
    #[error("transport: {0}")]
    Transport(String),
    #[error("listener: {0}")]
    Listener(String),
}

#[derive(Error, Debug)]
pub enum AppError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Migration(#[from] MigrationError),
    #[error(transparent)]
    Messaging(#[from] MessagingError),
    #[error("access denied to {0}")]
    AccessDenied(String),
}

#[derive(Serialize)]
pub struct ErrorBody {
    pub error: ErrorDetail,
}

#[derive(Serialize)]
pub struct ErrorDetail {
    pub code: String,
    pub message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code) = match &self {
            AppError::AccessDenied(tenant_id) => {
                // Plain text body; the tenant id comes from a request header.
                let body = format!("Access denied to {}", escape_entities(tenant_id));
                return (
                    StatusCode::FORBIDDEN,
                    [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
                    body,
                )
                    .into_response();
            }
            AppError::Config(_) => (StatusCode::INTERNAL_SERVER_ERROR, "config_error"),
            AppError::Migration(_) => (StatusCode::INTERNAL_SERVER_ERROR, "migration_error"),
            AppError::Messaging(_) => (StatusCode::BAD_GATEWAY, "messaging_error"),
        };
        let body = ErrorBody {
            error: ErrorDetail {
                code: code.to_string(),
                message: self.to_string(),
            },
        };
        (status, Json(body)).into_response()
    }
}
