use axum::{
    extract::{Path, State},
    http::StatusCode,
    Extension, Json,
};
use chrono::Utc;
use serde_json::{json, Value};

use crate::auth::middleware::AuthUser;
use crate::db::{Filter, Repository, SortKey};
use crate::error::{AppError, AppResult, StoreResultExt};
use crate::handlers::incomplete_body;
use crate::models::survey::{
    CreateSurveyRequest, SubmitResponsesRequest, Survey, SurveyQuery, UpdateSurveyRequest,
};
use crate::pagination::PageWindow;
use crate::validation::{QueryParams, ValidatedJson};
use crate::AppState;

async fn load_owned(state: &AppState, auth_user: &AuthUser, id: &str) -> AppResult<Survey> {
    let survey = state.surveys.get(id).await?;
    if survey.user_id != auth_user.id {
        return Err(Repository::<Survey>::not_found());
    }
    Ok(survey)
}

async fn save(state: &AppState, id: &str, survey: &Survey) -> AppResult<Survey> {
    state
        .surveys
        .replace(id, survey)
        .await?
        .ok_or_else(Repository::<Survey>::not_found)
}

pub async fn list_surveys(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    QueryParams(query): QueryParams<SurveyQuery>,
) -> AppResult<Json<Value>> {
    let filter = Filter::new()
        .eq("userId", auth_user.id.to_string())
        .eq_opt("type", query.kind.map(|k| json!(k)))
        .eq_opt("isCompleted", query.is_completed);

    let (surveys, pagination) = state
        .surveys
        .page(
            filter,
            &[SortKey::desc("createdAt")],
            PageWindow::new(query.page, query.limit),
        )
        .await
        .or_server_error("Error fetching surveys")?;

    Ok(Json(json!({
        "success": true,
        "data": surveys,
        "pagination": pagination,
    })))
}

pub async fn get_survey(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    Path(id): Path<String>,
) -> AppResult<Json<Value>> {
    let survey = load_owned(&state, &auth_user, &id).await?;
    Ok(Json(json!({ "success": true, "data": survey })))
}

pub async fn create_survey(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    ValidatedJson(body): ValidatedJson<CreateSurveyRequest>,
) -> AppResult<(StatusCode, Json<Value>)> {
    let new = body.into_new(auth_user.id).ok_or_else(incomplete_body)?;
    let survey = state.surveys.create(&new).await?;

    tracing::info!(survey_id = %survey.id, user_id = %auth_user.id, "Survey created");
    Ok((
        StatusCode::CREATED,
        Json(json!({ "success": true, "data": survey })),
    ))
}

pub async fn update_survey(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    Path(id): Path<String>,
    ValidatedJson(body): ValidatedJson<UpdateSurveyRequest>,
) -> AppResult<Json<Value>> {
    load_owned(&state, &auth_user, &id).await?;
    let patch = body.into_patch().ok_or_else(incomplete_body)?;
    let survey = state
        .surveys
        .update(&id, &patch)
        .await?
        .ok_or_else(Repository::<Survey>::not_found)?;

    Ok(Json(json!({ "success": true, "data": survey })))
}

pub async fn delete_survey(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    Path(id): Path<String>,
) -> AppResult<Json<Value>> {
    load_owned(&state, &auth_user, &id).await?;
    if !state.surveys.delete(&id).await? {
        return Err(Repository::<Survey>::not_found());
    }

    tracing::info!(survey_id = %id, user_id = %auth_user.id, "Survey deleted");
    Ok(Json(json!({ "success": true, "message": "Survey deleted" })))
}

pub async fn submit_responses(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    Path(id): Path<String>,
    ValidatedJson(body): ValidatedJson<SubmitResponsesRequest>,
) -> AppResult<Json<Value>> {
    let mut survey = load_owned(&state, &auth_user, &id).await?;
    survey
        .record_answers(body.responses, Utc::now())
        .map_err(AppError::Validation)?;
    let survey = save(&state, &id, &survey).await?;

    Ok(Json(json!({ "success": true, "data": survey })))
}

pub async fn complete_survey(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    Path(id): Path<String>,
) -> AppResult<Json<Value>> {
    let mut survey = load_owned(&state, &auth_user, &id).await?;
    survey.complete(Utc::now()).map_err(AppError::Validation)?;
    let survey = save(&state, &id, &survey).await?;

    tracing::info!(survey_id = %survey.id, user_id = %auth_user.id, "Survey completed");
    Ok(Json(json!({ "success": true, "data": survey })))
}
