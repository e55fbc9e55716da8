use axum::{
    extract::{Path, State},
    http::StatusCode,
    Extension, Json,
};
use chrono::Utc;
use serde_json::{json, Value};

use crate::auth::middleware::AuthUser;
use crate::db::{Filter, FindQuery, Repository, SortKey};
use crate::error::{AppResult, StoreResultExt};
use crate::handlers::incomplete_body;
use crate::models::learning::{
    ContentPatch, ContentQuery, CreateContentRequest, LearningContent, MarkReadRequest,
    ReadReceipt, ReadingHistory, UpdateContentRequest,
};
use crate::pagination::PageWindow;
use crate::validation::{QueryParams, ValidatedJson};
use crate::AppState;

const RECOMMENDATION_COUNT: u64 = 5;

pub async fn list_content(
    State(state): State<AppState>,
    QueryParams(query): QueryParams<ContentQuery>,
) -> AppResult<Json<Value>> {
    let filter = Filter::new()
        .eq_opt("type", query.kind.map(|k| json!(k)))
        .eq_opt("category", query.category)
        .eq_opt("difficulty", query.difficulty.map(|d| json!(d)));

    let (content, pagination) = state
        .content
        .page(
            filter,
            query.sort.keys(),
            PageWindow::new(query.page, query.limit),
        )
        .await
        .or_server_error("Error fetching learning content")?;

    Ok(Json(json!({
        "success": true,
        "data": {
            "content": content,
            "pagination": pagination,
        },
    })))
}

pub async fn get_content(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> AppResult<Json<Value>> {
    let content = state.content.get(&id).await?;
    Ok(Json(json!({ "success": true, "data": content })))
}

pub async fn create_content(
    State(state): State<AppState>,
    ValidatedJson(body): ValidatedJson<CreateContentRequest>,
) -> AppResult<(StatusCode, Json<Value>)> {
    let new = body.into_new().ok_or_else(incomplete_body)?;
    let content = state.content.create(&new).await?;

    tracing::info!(content_id = %content.id, "Learning content created");
    Ok((
        StatusCode::CREATED,
        Json(json!({ "success": true, "data": content })),
    ))
}

pub async fn update_content(
    State(state): State<AppState>,
    Path(id): Path<String>,
    ValidatedJson(body): ValidatedJson<UpdateContentRequest>,
) -> AppResult<Json<Value>> {
    let content = state
        .content
        .update(&id, &ContentPatch::from(body))
        .await?
        .ok_or_else(Repository::<LearningContent>::not_found)?;

    Ok(Json(json!({ "success": true, "data": content })))
}

pub async fn delete_content(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> AppResult<Json<Value>> {
    if !state.content.delete(&id).await? {
        return Err(Repository::<LearningContent>::not_found());
    }

    tracing::info!(content_id = %id, "Learning content deleted");
    Ok(Json(json!({ "success": true, "message": "Content deleted" })))
}

/// Echoes the read event back. Counters on the content are left untouched and
/// no history record is written.
pub async fn mark_read(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    Path(id): Path<String>,
    ValidatedJson(body): ValidatedJson<MarkReadRequest>,
) -> AppResult<Json<Value>> {
    let content = state.content.get(&id).await?;
    tracing::debug!(content_id = %content.id, user_id = %auth_user.id, "Content marked as read");

    Ok(Json(json!({
        "success": true,
        "message": "Content marked as read",
        "data": ReadReceipt::new(content.id.to_string(), body, Utc::now()),
    })))
}

pub async fn reading_history(Extension(_auth_user): Extension<AuthUser>) -> Json<Value> {
    Json(json!({ "success": true, "data": ReadingHistory::default() }))
}

/// The most recently created items; not personalised.
pub async fn recommendations(
    State(state): State<AppState>,
    Extension(_auth_user): Extension<AuthUser>,
) -> AppResult<Json<Value>> {
    let query = FindQuery::new(Filter::new())
        .sort(&[SortKey::desc("createdAt")])
        .limit(RECOMMENDATION_COUNT);
    let content = state
        .content
        .find(&query)
        .await
        .or_server_error("Error fetching recommendations")?;

    Ok(Json(json!({ "success": true, "data": content })))
}
