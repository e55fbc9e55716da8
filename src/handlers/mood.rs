use axum::{
    extract::{Path, State},
    http::StatusCode,
    Extension, Json,
};
use chrono::{Duration, NaiveDate, NaiveTime, Utc};
use serde_json::{json, Value};

use crate::auth::middleware::AuthUser;
use crate::db::{Filter, FindQuery, Repository, SortKey};
use crate::error::{AppError, AppResult, StoreResultExt};
use crate::handlers::incomplete_body;
use crate::models::mood::{
    CreateMoodEntryRequest, MoodEntry, MoodEntryView, MoodQuery, MoodStats, MoodStatsQuery,
    UpdateMoodEntryRequest,
};
use crate::pagination::PageWindow;
use crate::validation::{QueryParams, ValidatedJson};
use crate::AppState;

const DEFAULT_STATS_DAYS: u32 = 30;

fn owner_filter(auth_user: &AuthUser) -> Filter {
    Filter::new().eq("userId", auth_user.id.to_string())
}

/// Entries belonging to someone else are reported as missing.
async fn load_owned(state: &AppState, auth_user: &AuthUser, id: &str) -> AppResult<MoodEntry> {
    let entry = state.moods.get(id).await?;
    if entry.user_id != auth_user.id {
        return Err(Repository::<MoodEntry>::not_found());
    }
    Ok(entry)
}

fn day_bounds(
    start: Option<NaiveDate>,
    end: Option<NaiveDate>,
) -> (Option<chrono::DateTime<Utc>>, Option<chrono::DateTime<Utc>>) {
    let from = start.map(|d| d.and_time(NaiveTime::MIN).and_utc());
    let to = end
        .and_then(|d| d.and_hms_milli_opt(23, 59, 59, 999))
        .map(|dt| dt.and_utc());
    (from, to)
}

pub async fn list_entries(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    QueryParams(query): QueryParams<MoodQuery>,
) -> AppResult<Json<Value>> {
    let (from, to) = day_bounds(query.start_date, query.end_date);
    let filter = owner_filter(&auth_user)
        .eq_opt("mood.value", query.mood)
        .range("timestamp", from, to);

    let (entries, pagination) = state
        .moods
        .page(
            filter,
            &[SortKey::desc("timestamp")],
            PageWindow::new(query.page, query.limit),
        )
        .await
        .or_server_error("Error fetching mood entries")?;

    let data: Vec<MoodEntryView> = entries.into_iter().map(MoodEntryView::from).collect();
    Ok(Json(json!({
        "success": true,
        "data": data,
        "pagination": pagination,
    })))
}

pub async fn stats(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    QueryParams(query): QueryParams<MoodStatsQuery>,
) -> AppResult<Json<Value>> {
    let days = query.days.unwrap_or(DEFAULT_STATS_DAYS).max(1);
    let since = Utc::now()
        .checked_sub_signed(Duration::days(i64::from(days)))
        .ok_or_else(|| AppError::validation("days", "Path `days` is out of range."))?;
    let filter = owner_filter(&auth_user).range("timestamp", Some(since), None);

    let entries = state
        .moods
        .find(&FindQuery::new(filter).sort(&[SortKey::desc("timestamp")]))
        .await
        .or_server_error("Error fetching mood statistics")?;

    Ok(Json(json!({
        "success": true,
        "data": MoodStats::from_entries(days, &entries),
    })))
}

pub async fn get_entry(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    Path(id): Path<String>,
) -> AppResult<Json<Value>> {
    let entry = load_owned(&state, &auth_user, &id).await?;
    Ok(Json(json!({ "success": true, "data": MoodEntryView::from(entry) })))
}

pub async fn create_entry(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    ValidatedJson(body): ValidatedJson<CreateMoodEntryRequest>,
) -> AppResult<(StatusCode, Json<Value>)> {
    let new = body
        .into_new(auth_user.id, Utc::now())
        .ok_or_else(incomplete_body)?;
    let entry = state.moods.create(&new).await?;

    tracing::info!(entry_id = %entry.id, user_id = %auth_user.id, "Mood entry created");
    Ok((
        StatusCode::CREATED,
        Json(json!({ "success": true, "data": MoodEntryView::from(entry) })),
    ))
}

pub async fn update_entry(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    Path(id): Path<String>,
    ValidatedJson(body): ValidatedJson<UpdateMoodEntryRequest>,
) -> AppResult<Json<Value>> {
    load_owned(&state, &auth_user, &id).await?;
    let entry = state
        .moods
        .update(&id, &body)
        .await?
        .ok_or_else(Repository::<MoodEntry>::not_found)?;

    Ok(Json(json!({ "success": true, "data": MoodEntryView::from(entry) })))
}

pub async fn delete_entry(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    Path(id): Path<String>,
) -> AppResult<Json<Value>> {
    load_owned(&state, &auth_user, &id).await?;
    if !state.moods.delete(&id).await? {
        return Err(Repository::<MoodEntry>::not_found());
    }

    tracing::info!(entry_id = %id, user_id = %auth_user.id, "Mood entry deleted");
    Ok(Json(json!({ "success": true, "message": "Mood entry deleted" })))
}
