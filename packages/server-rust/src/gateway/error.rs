//! Gateway error responses.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use tonic::{Code, Status};

/// Anything that ends a gateway request without a successful RPC reply.
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    /// The request body is not valid JSON for the route.
    #[error("malformed request body: {0}")]
    MalformedBody(String),

    /// No gateway route matches the request.
    #[error("no route for {method} {path}")]
    NoRoute { method: String, path: String },

    /// The path exists but not for this verb.
    #[error("method {method} not allowed for {path}")]
    MethodNotAllowed { method: String, path: String },

    /// The RPC failed; carries its status unchanged.
    #[error("{}", .0.message())]
    Rpc(#[from] Status),
}

/// JSON error body: `{"code": <grpc code>, "error": <msg>, "message": <msg>}`.
#[derive(Debug, Serialize)]
struct ErrorBody {
    code: i32,
    error: String,
    message: String,
}

impl GatewayError {
    /// gRPC code the error corresponds to.
    #[must_use]
    pub fn code(&self) -> Code {
        match self {
            Self::MalformedBody(_) => Code::InvalidArgument,
            Self::NoRoute { .. } => Code::NotFound,
            Self::MethodNotAllowed { .. } => Code::Unimplemented,
            Self::Rpc(status) => status.code(),
        }
    }

    /// HTTP status of the response: [`http_status`] of the code, except for
    /// a wrong verb, which answers 405.
    #[must_use]
    pub fn status(&self) -> StatusCode {
        match self {
            Self::MethodNotAllowed { .. } => StatusCode::METHOD_NOT_ALLOWED,
            other => http_status(other.code()),
        }
    }
}

/// HTTP status for a gRPC code.
#[must_use]
pub fn http_status(code: Code) -> StatusCode {
    match code {
        Code::Ok => StatusCode::OK,
        Code::InvalidArgument | Code::FailedPrecondition | Code::OutOfRange => {
            StatusCode::BAD_REQUEST
        }
        Code::NotFound => StatusCode::NOT_FOUND,
        Code::AlreadyExists | Code::Aborted => StatusCode::CONFLICT,
        Code::Unauthenticated => StatusCode::UNAUTHORIZED,
        Code::PermissionDenied => StatusCode::FORBIDDEN,
        Code::ResourceExhausted => StatusCode::TOO_MANY_REQUESTS,
        Code::Cancelled => StatusCode::REQUEST_TIMEOUT,
        Code::Unimplemented => StatusCode::NOT_IMPLEMENTED,
        Code::DeadlineExceeded => StatusCode::GATEWAY_TIMEOUT,
        Code::Unavailable => StatusCode::SERVICE_UNAVAILABLE,
        Code::Unknown | Code::Internal | Code::DataLoss => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = self.to_string();
        let body = ErrorBody {
            code: self.code() as i32,
            error: message.clone(),
            message,
        };
        (status, Json(body)).into_response()
    }
}
