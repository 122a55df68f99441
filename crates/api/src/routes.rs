use std::sync::Arc;

use axum::routing::get;
use axum::Router;
use birthday_core::{Clock, PersonService};

use crate::handlers::health::health_check;
use crate::handlers::persons::{create_person, delete_person, get_person, update_person};

/// API应用状态
#[derive(Clone)]
pub struct AppState {
    pub person_service: Arc<PersonService>,
    /// 创建与更新时计算下一次生日的参考时钟
    pub clock: Arc<dyn Clock>,
}

/// 创建API路由
pub fn create_routes(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/api/users", axum::routing::post(create_person))
        .route(
            "/api/users/{id}",
            get(get_person).put(update_person).delete(delete_person),
        )
        .with_state(state)
}
