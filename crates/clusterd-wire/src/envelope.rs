//! The REST response envelope: every response is one of `sync`,
//! `async` or `error`, carrying a JSON `metadata` body.

use clusterd_types::{ClusterError, ErrorKind, OperationId};
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ApiResponse {
    Sync {
        status: String,
        status_code: u16,
        metadata: Value,
    },
    Async {
        status: String,
        status_code: u16,
        operation: String,
        metadata: Value,
    },
    Error {
        status: String,
        status_code: u16,
        error: String,
        error_code: u16,
        metadata: Value,
    },
}

impl ApiResponse {
    pub fn sync(metadata: Value) -> Self {
        ApiResponse::Sync {
            status: "Success".into(),
            status_code: 200,
            metadata,
        }
    }

    pub fn created(metadata: Value) -> Self {
        ApiResponse::Sync {
            status: "Created".into(),
            status_code: 201,
            metadata,
        }
    }

    pub fn accepted(operation: OperationId) -> Self {
        ApiResponse::Async {
            status: "Operation created".into(),
            status_code: 202,
            operation: format!("/1.0/operations/{operation}"),
            metadata: Value::Null,
        }
    }

    pub fn from_error(err: &ClusterError) -> Self {
        ApiResponse::Error {
            status: "Failure".into(),
            status_code: err.kind.http_status(),
            error: err.message.clone(),
            error_code: err.kind.http_status(),
            metadata: err
                .upstream_member
                .map(|m| serde_json::json!({ "upstream_member": m.to_string() }))
                .unwrap_or(Value::Null),
        }
    }

    pub fn http_status(&self) -> u16 {
        match self {
            ApiResponse::Sync { status_code, .. } => *status_code,
            ApiResponse::Async { status_code, .. } => *status_code,
            ApiResponse::Error { status_code, .. } => *status_code,
        }
    }
}

/// Optional query parameters every mutating endpoint accepts.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RequestParams {
    pub project: Option<String>,
    pub target: Option<String>,
    #[serde(default)]
    pub recursion: u8,
}

impl RequestParams {
    pub fn effective_project(&self) -> &str {
        self.project.as_deref().unwrap_or("default")
    }
}

pub fn error_kind_status(kind: ErrorKind) -> u16 {
    kind.http_status()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_project_falls_back_to_default() {
        let params = RequestParams::default();
        assert_eq!(params.effective_project(), "default");
    }

    #[test]
    fn error_response_carries_http_status_from_kind() {
        let err = ClusterError::not_found("instance not found");
        let response = ApiResponse::from_error(&err);
        assert_eq!(response.http_status(), 404);
    }
}
