use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde_json::{json, Value};

use crate::db::{Filter, Repository, SortKey};
use crate::error::{AppResult, StoreResultExt};
use crate::handlers::incomplete_body;
use crate::models::activity::{
    Activity, ActivityQuery, CreateActivityRequest, UpdateActivityRequest,
};
use crate::pagination::PageWindow;
use crate::validation::{QueryParams, ValidatedJson};
use crate::AppState;

pub async fn list_activities(
    State(state): State<AppState>,
    QueryParams(query): QueryParams<ActivityQuery>,
) -> AppResult<Json<Value>> {
    let filter = Filter::new()
        .eq_opt("type", query.kind.map(|k| json!(k)))
        .eq_opt("difficulty", query.difficulty.map(|d| json!(d)))
        .contains_opt("tags", query.tag)
        .eq_opt("isActive", query.is_active);

    let (activities, pagination) = state
        .activities
        .page(
            filter,
            &[SortKey::desc("createdAt")],
            PageWindow::new(query.page, query.limit),
        )
        .await
        .or_server_error("Error fetching activities")?;

    Ok(Json(json!({
        "success": true,
        "data": activities,
        "pagination": pagination,
    })))
}

pub async fn get_activity(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> AppResult<Json<Value>> {
    let activity = state.activities.get(&id).await?;
    Ok(Json(json!({ "success": true, "data": activity })))
}

pub async fn create_activity(
    State(state): State<AppState>,
    ValidatedJson(body): ValidatedJson<CreateActivityRequest>,
) -> AppResult<(StatusCode, Json<Value>)> {
    let new = body.into_new().ok_or_else(incomplete_body)?;
    let activity = state.activities.create(&new).await?;

    tracing::info!(activity_id = %activity.id, "Activity created");
    Ok((
        StatusCode::CREATED,
        Json(json!({ "success": true, "data": activity })),
    ))
}

pub async fn update_activity(
    State(state): State<AppState>,
    Path(id): Path<String>,
    ValidatedJson(body): ValidatedJson<UpdateActivityRequest>,
) -> AppResult<Json<Value>> {
    let patch = body.into_patch().ok_or_else(incomplete_body)?;
    let activity = state
        .activities
        .update(&id, &patch)
        .await?
        .ok_or_else(Repository::<Activity>::not_found)?;

    Ok(Json(json!({ "success": true, "data": activity })))
}

pub async fn delete_activity(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> AppResult<Json<Value>> {
    if !state.activities.delete(&id).await? {
        return Err(Repository::<Activity>::not_found());
    }

    tracing::info!(activity_id = %id, "Activity deleted");
    Ok(Json(json!({ "success": true, "message": "Activity deleted" })))
}
