//! Maps [`LambError`] onto an HTTP response (§7).
//!
//! A local newtype, not a direct `impl IntoResponse for LambError`: both the trait and
//! the error type are foreign to this crate.

use axum::http::{HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;

use lamb_core::error::LambError;

pub struct ApiError(pub LambError);

impl From<LambError> for ApiError {
    fn from(e: LambError) -> Self {
        Self(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.0.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        let body = Json(json!({
            "error": {
                "code": self.0.code(),
                "message": self.0.to_string(),
            }
        }));
        let mut response = (status, body).into_response();
        // §4.1: the core surfaces the disabled hint as structured error data; the HTTP
        // layer is the transport that turns it into the out-of-band header (§6.1 S6).
        if matches!(self.0, LambError::AccountDisabled) {
            response
                .headers_mut()
                .insert("X-Account-Status", HeaderValue::from_static("disabled"));
        }
        response
    }
}
