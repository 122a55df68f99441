use axum::{
    extract::rejection::JsonRejection,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use birthday_core::NotifierError;
use serde_json::json;
use tracing::error;

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("服务错误: {0}")]
    Notifier(#[from] NotifierError),

    #[error("请求体格式错误: {0}")]
    InvalidBody(#[from] JsonRejection),
}

impl ApiError {
    fn parts(&self) -> (StatusCode, String, &'static str) {
        match self {
            ApiError::Notifier(NotifierError::PersonNotFound { id }) => (
                StatusCode::NOT_FOUND,
                format!("用户 {id} 不存在"),
                "PERSON_NOT_FOUND",
            ),
            ApiError::Notifier(NotifierError::Validation(msg)) => (
                StatusCode::BAD_REQUEST,
                format!("请求参数验证失败: {msg}"),
                "VALIDATION_ERROR",
            ),
            ApiError::InvalidBody(rejection) => (
                StatusCode::BAD_REQUEST,
                format!("请求数据格式错误: {}", rejection.body_text()),
                "BAD_REQUEST",
            ),
            ApiError::Notifier(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "系统内部错误".to_string(),
                "INTERNAL_ERROR",
            ),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message, error_type) = self.parts();
        if status.is_server_error() {
            error!("请求处理失败: {}", self);
        }

        let body = Json(json!({
            "success": false,
            "error": {
                "message": message,
                "type": error_type,
                "code": status.as_u16(),
                "timestamp": chrono::Utc::now().to_rfc3339(),
            }
        }));

        (status, body).into_response()
    }
}

pub type ApiResult<T> = Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_found_maps_to_404() {
        let response = ApiError::from(NotifierError::person_not_found("p-1")).into_response();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn test_validation_maps_to_400() {
        let response =
            ApiError::from(NotifierError::Validation("firstName 不能为空".to_string())).into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn test_backend_errors_map_to_500() {
        for err in [
            NotifierError::MessageQueue("down".to_string()),
            NotifierError::Cache("down".to_string()),
            NotifierError::Internal("boom".to_string()),
        ] {
            let response = ApiError::from(err).into_response();
            assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        }
    }
}
