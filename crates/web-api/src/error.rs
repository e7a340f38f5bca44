use application::{ApplicationError, GatewayError};
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use tracing::error;

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub code: &'static str,
    pub message: String,
}

#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    body: ErrorBody,
}

impl ApiError {
    pub fn new(status: StatusCode, code: &'static str, message: impl Into<String>) -> Self {
        Self {
            status,
            body: ErrorBody {
                code,
                message: message.into(),
            },
        }
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new(StatusCode::UNAUTHORIZED, "UNAUTHORIZED", message)
    }

    pub fn internal_server_error(message: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR", message)
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }
}

impl From<ApplicationError> for ApiError {
    fn from(error: ApplicationError) -> Self {
        use application::ApplicationError as AppErr;
        use domain::DomainError;

        match error {
            AppErr::Forbidden => {
                ApiError::new(StatusCode::FORBIDDEN, "NOT_ROOM_MEMBER", "user not in room")
            }
            AppErr::NotFound(resource) => ApiError::new(
                StatusCode::NOT_FOUND,
                "NOT_FOUND",
                format!("{resource} not found"),
            ),
            AppErr::InvalidMessageType(reason) => ApiError::new(
                StatusCode::UNPROCESSABLE_ENTITY,
                "INVALID_MESSAGE_TYPE",
                reason,
            ),
            AppErr::Domain(DomainError::InvalidArgument { field, reason }) => ApiError::new(
                StatusCode::BAD_REQUEST,
                "INVALID_ARGUMENT",
                format!("{field}: {reason}"),
            ),
            AppErr::Domain(DomainError::NotAnAiMessage) => ApiError::new(
                StatusCode::UNPROCESSABLE_ENTITY,
                "INVALID_MESSAGE_TYPE",
                "message is not an ai message",
            ),
            AppErr::Gateway(err) => {
                let code = match err {
                    GatewayError::Timeout => "LLM_GATEWAY_TIMEOUT",
                    GatewayError::Cancelled => "LLM_GATEWAY_CANCELLED",
                    _ => "LLM_GATEWAY_ERROR",
                };
                ApiError::new(StatusCode::BAD_GATEWAY, code, err.to_string())
            }
            AppErr::Repository(repo_err) => {
                // 存储细节只写日志，不返回给调用方
                error!(error = %repo_err, "仓储操作失败");
                ApiError::internal_server_error("internal storage error")
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(self.body)).into_response()
    }
}
