use axum::{
    extract::{rejection::JsonRejection, Path, State},
    response::IntoResponse,
    Json,
};
use birthday_core::{CreatePersonRequest, UpdatePersonRequest};
use tracing::debug;

use crate::{
    error::ApiResult,
    response::{created, success, ApiResponse},
    routes::AppState,
};

/// 创建用户
pub async fn create_person(
    State(state): State<AppState>,
    payload: Result<Json<CreatePersonRequest>, JsonRejection>,
) -> ApiResult<impl IntoResponse> {
    let Json(request) = payload?;
    let person = state
        .person_service
        .create(request, state.clock.now())
        .await?;
    Ok(created(person))
}

/// 获取单个用户
pub async fn get_person(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<impl IntoResponse> {
    let person = state.person_service.get(&id).await?;
    Ok(success(person))
}

/// 部分更新用户
pub async fn update_person(
    State(state): State<AppState>,
    Path(id): Path<String>,
    payload: Result<Json<UpdatePersonRequest>, JsonRejection>,
) -> ApiResult<impl IntoResponse> {
    let Json(request) = payload?;
    debug!(person_id = %id, "收到用户更新请求");
    let person = state
        .person_service
        .update(&id, request, state.clock.now())
        .await?;
    Ok(success(person))
}

/// 删除用户，返回被删除的记录
pub async fn delete_person(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<impl IntoResponse> {
    let person = state.person_service.delete(&id).await?;
    Ok(ApiResponse::success_with_message(person, "用户已删除".to_string()))
}
