use std::fmt;

use actix_web::http::StatusCode;
use actix_web::{HttpResponse, HttpResponseBuilder};
use log::error;
use serde::{Deserialize, Serialize};

pub const UNAUTHORIZED_MESSAGE: &str = "unauthorized.";
pub const INTERNAL_ERROR_MESSAGE: &str = "an unknown internal error occurred";

/// A wrapper struct for HTTP responses that provides convenient methods
/// for creating common response types
pub struct Response {
    http_response: HttpResponse,
}

impl Response {
    pub fn json<T: Serialize>(data: &T) -> Self {
        Self {
            http_response: HttpResponse::Ok().json(data),
        }
    }
}

impl From<Response> for HttpResponse {
    fn from(val: Response) -> Self {
        val.http_response
    }
}

/// Machine readable reason attached to some client errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    MustResetPassword,
    OldPasswordNotAllowed,
    NotMeetPasswordRequirements,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_code: Option<ErrorCode>,
}

/// Error returned by endpoints, rendered as `{"error": ..., "error_code": ...}`.
#[derive(Debug)]
pub struct EndpointError {
    status: StatusCode,
    body: ErrorBody,
}

impl EndpointError {
    pub fn new(status: StatusCode, error: impl Into<String>) -> Self {
        Self {
            status,
            body: ErrorBody {
                error: error.into(),
                error_code: None,
            },
        }
    }

    pub fn with_code(mut self, code: ErrorCode) -> Self {
        self.body.error_code = Some(code);
        self
    }

    pub fn bad_request(error: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, error)
    }

    pub fn not_found(error: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, error)
    }

    pub fn unauthenticated(error: impl Into<String>) -> Self {
        Self::new(StatusCode::UNAUTHORIZED, error)
    }

    /// Every authorization denial renders exactly this.
    pub fn unauthorized() -> Self {
        Self::new(StatusCode::FORBIDDEN, UNAUTHORIZED_MESSAGE)
    }

    pub fn internal() -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, INTERNAL_ERROR_MESSAGE)
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn body(&self) -> &ErrorBody {
        &self.body
    }
}

impl fmt::Display for EndpointError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.status, self.body.error)
    }
}

impl From<anyhow::Error> for EndpointError {
    fn from(err: anyhow::Error) -> Self {
        error!("Internal error: {err:#}");
        Self::internal()
    }
}

impl From<EndpointError> for Response {
    fn from(err: EndpointError) -> Self {
        Self {
            http_response: HttpResponseBuilder::new(err.status()).json(err.body()),
        }
    }
}

#[cfg(test)]
mod tests {
    use actix_web::body::to_bytes;
    use anyhow::anyhow;

    use super::*;

    async fn render(err: EndpointError) -> (StatusCode, String) {
        let resp = HttpResponse::from(Response::from(err));
        let status = resp.status();
        let body = to_bytes(resp.into_body()).await.unwrap();
        (status, String::from_utf8(body.to_vec()).unwrap())
    }

    #[actix_web::test]
    async fn test_error_body() {
        let (status, body) = render(EndpointError::unauthorized()).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(body, r#"{"error":"unauthorized."}"#);

        let err = EndpointError::unauthenticated("password must be reset")
            .with_code(ErrorCode::MustResetPassword);
        let (status, body) = render(err).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(
            body,
            r#"{"error":"password must be reset","error_code":"must_reset_password"}"#
        );

        let (status, body) = render(EndpointError::from(anyhow!("disk on fire"))).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body, r#"{"error":"an unknown internal error occurred"}"#);
    }
}
