//! # Birthday Notifier API
//!
//! 用户资料的HTTP接口，基于Axum构建。
//!
//! ## API 端点
//!
//! - `GET /health` - 健康检查
//! - `POST /api/users` - 创建用户
//! - `GET /api/users/{id}` - 查询用户
//! - `PUT /api/users/{id}` - 更新用户（部分字段）
//! - `DELETE /api/users/{id}` - 删除用户
//!
//! 请求与响应均为camelCase JSON，`state` 可作为 `region` 的别名。
//! 成功响应统一包装为 [`response::ApiResponse`]，错误响应见 [`error::ApiError`]。

pub mod error;
pub mod handlers;
pub mod middleware;
pub mod response;
pub mod routes;

use std::sync::Arc;

use axum::Router;
use birthday_core::{Clock, PersonService};
use tower::ServiceBuilder;

use crate::middleware::{cors_layer, request_logging, trace_layer};
use crate::routes::{create_routes, AppState};

pub use error::{ApiError, ApiResult};
pub use response::ApiResponse;

/// 创建带中间件的API应用
pub fn create_app(person_service: Arc<PersonService>, clock: Arc<dyn Clock>) -> Router {
    let state = AppState {
        person_service,
        clock,
    };

    create_routes(state).layer(
        ServiceBuilder::new()
            .layer(trace_layer())
            .layer(cors_layer())
            .layer(axum::middleware::from_fn(request_logging)),
    )
}
