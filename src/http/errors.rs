//! # HTTP Errors
//!
//! Every failure is rendered as
//! `{"error": {"code": ..., "message": ..., <detail fields>}}` with the
//! status from `MutationError::status_code`.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::{json, Map, Value};

use crate::errors::MutationError;

#[derive(Debug)]
pub enum ApiError {
    Mutation(MutationError),
    BadRequest(String),
    Internal(String),
}

impl ApiError {
    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self::BadRequest(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    pub fn status(&self) -> StatusCode {
        match self {
            Self::Mutation(e) => {
                StatusCode::from_u16(e.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
            }
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn body(&self) -> Value {
        let mut error = Map::new();
        match self {
            Self::Mutation(e) => {
                error.insert("code".into(), json!(e.code()));
                error.insert("message".into(), json!(e.to_string()));
                if let Value::Object(detail) = e.detail() {
                    error.extend(detail);
                }
                match e {
                    MutationError::StaleWrite { actual_latest, .. } => {
                        error.insert("latest".into(), json!(format!("/versions/{}", actual_latest)));
                    }
                    MutationError::AlreadySuperseded { superseded_by, .. } => {
                        error.insert("latest".into(), json!(format!("/versions/{}", superseded_by)));
                    }
                    _ => {}
                }
            }
            Self::BadRequest(msg) => {
                error.insert("code".into(), json!("BAD_REQUEST"));
                error.insert("message".into(), json!(msg));
            }
            Self::Internal(msg) => {
                error.insert("code".into(), json!("INTERNAL_ERROR"));
                error.insert("message".into(), json!(msg));
            }
        }
        json!({ "error": error })
    }
}

impl From<MutationError> for ApiError {
    fn from(e: MutationError) -> Self {
        Self::Mutation(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status(), Json(self.body())).into_response()
    }
}
