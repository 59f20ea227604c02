//! Uniform REST error rendering.
//!
//! Every handler failure funnels into [`ApiError`], which renders the
//! standard error envelope with the HTTP status derived from the error
//! kind. Structured errors survive forwarding: the kind, message and
//! upstream-member tag all come straight from the wrapped
//! [`ClusterError`].

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use clusterd_types::ClusterError;
use clusterd_wire::ApiResponse;

pub type ApiResult<T> = Result<T, ApiError>;

#[derive(Debug)]
pub struct ApiError(pub ClusterError);

impl<E> From<E> for ApiError
where
    ClusterError: From<E>,
{
    fn from(err: E) -> Self {
        Self(ClusterError::from(err))
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.0.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        (status, Json(ApiResponse::from_error(&self.0))).into_response()
    }
}

/// Renders a success envelope with its embedded status code.
pub fn envelope(response: ApiResponse) -> Response {
    let status = StatusCode::from_u16(response.http_status()).unwrap_or(StatusCode::OK);
    (status, Json(response)).into_response()
}
