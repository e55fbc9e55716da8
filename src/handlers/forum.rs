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
use crate::models::forum::{
    CreatePostRequest, CreateReplyRequest, ForumPost, ForumPostView, ForumQuery, PostPatch,
    UpdatePostRequest, SEARCH_FIELDS,
};
use crate::models::user::Role;
use crate::pagination::PageWindow;
use crate::validation::{QueryParams, ValidatedJson};
use crate::AppState;

const FEED_ORDER: &[SortKey] = &[SortKey::desc("createdAt")];
const CATEGORY_ORDER: &[SortKey] = &[SortKey::asc("category"), SortKey::desc("createdAt")];

async fn save(state: &AppState, id: &str, post: &ForumPost) -> AppResult<ForumPost> {
    state
        .posts
        .replace(id, post)
        .await?
        .ok_or_else(Repository::<ForumPost>::not_found)
}

pub async fn list_posts(
    State(state): State<AppState>,
    QueryParams(query): QueryParams<ForumQuery>,
) -> AppResult<Json<Value>> {
    let order = if query.category.is_some() {
        CATEGORY_ORDER
    } else {
        FEED_ORDER
    };
    let filter = Filter::new()
        .eq_opt("category", query.category.map(|c| json!(c)))
        .contains_opt("tags", query.tag)
        .text_opt(SEARCH_FIELDS, query.search.as_deref());

    let (posts, pagination) = state
        .posts
        .page(filter, order, PageWindow::new(query.page, query.limit))
        .await
        .or_server_error("Error fetching forum posts")?;

    let data: Vec<ForumPostView> = posts.into_iter().map(ForumPostView::from).collect();
    Ok(Json(json!({
        "success": true,
        "data": data,
        "pagination": pagination,
    })))
}

pub async fn get_post(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> AppResult<Json<Value>> {
    let post = state.posts.get(&id).await?;
    Ok(Json(json!({ "success": true, "data": ForumPostView::from(post) })))
}

pub async fn create_post(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    ValidatedJson(body): ValidatedJson<CreatePostRequest>,
) -> AppResult<(StatusCode, Json<Value>)> {
    let new = body.into_new(auth_user.id).ok_or_else(incomplete_body)?;
    let post = state.posts.create(&new).await?;

    tracing::info!(post_id = %post.id, user_id = %auth_user.id, "Forum post created");
    Ok((
        StatusCode::CREATED,
        Json(json!({ "success": true, "data": ForumPostView::from(post) })),
    ))
}

pub async fn update_post(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    Path(id): Path<String>,
    ValidatedJson(body): ValidatedJson<UpdatePostRequest>,
) -> AppResult<Json<Value>> {
    let post = state.posts.get(&id).await?;
    if !post.is_author(auth_user.id) {
        return Err(AppError::Forbidden("Not authorized to update this post".into()));
    }

    let post = state
        .posts
        .update(&id, &PostPatch::from(body))
        .await?
        .ok_or_else(Repository::<ForumPost>::not_found)?;

    Ok(Json(json!({ "success": true, "data": ForumPostView::from(post) })))
}

pub async fn delete_post(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    Path(id): Path<String>,
) -> AppResult<Json<Value>> {
    let post = state.posts.get(&id).await?;
    if !post.is_author(auth_user.id) {
        let is_admin = state
            .users
            .find_by_id(&auth_user.id.to_string())
            .await?
            .is_some_and(|u| u.role == Role::Admin);
        if !is_admin {
            return Err(AppError::Forbidden("Not authorized to delete this post".into()));
        }
    }

    if !state.posts.delete(&id).await? {
        return Err(Repository::<ForumPost>::not_found());
    }

    tracing::info!(post_id = %id, user_id = %auth_user.id, "Forum post deleted");
    Ok(Json(json!({ "success": true, "message": "Post deleted" })))
}

pub async fn add_reply(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    Path(id): Path<String>,
    ValidatedJson(body): ValidatedJson<CreateReplyRequest>,
) -> AppResult<(StatusCode, Json<Value>)> {
    let content = body.content.ok_or_else(incomplete_body)?;
    let mut post = state.posts.get(&id).await?;
    post.add_reply(
        auth_user.id,
        content,
        body.is_anonymous.unwrap_or(false),
        Utc::now(),
    );
    let post = save(&state, &id, &post).await?;

    tracing::info!(post_id = %post.id, user_id = %auth_user.id, "Forum reply added");
    Ok((
        StatusCode::CREATED,
        Json(json!({ "success": true, "data": ForumPostView::from(post) })),
    ))
}

pub async fn like_post(
    State(state): State<AppState>,
    Extension(_auth_user): Extension<AuthUser>,
    Path(id): Path<String>,
) -> AppResult<Json<Value>> {
    let post = state.posts.get(&id).await?;
    let post = state
        .posts
        .update(&id, &json!({ "likes": post.likes + 1 }))
        .await?
        .ok_or_else(Repository::<ForumPost>::not_found)?;

    Ok(Json(json!({ "success": true, "data": { "likes": post.likes } })))
}
