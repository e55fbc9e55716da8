use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use axum_extra::headers::{authorization::Bearer, Authorization, HeaderMapExt};
use uuid::Uuid;

use crate::auth::jwt::TokenPurpose;
use crate::error::AppError;
use crate::models::user::Role;
use crate::AppState;

#[derive(Debug, Clone)]
pub struct AuthUser {
    pub id: Uuid,
    pub email: String,
}

pub async fn require_auth(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, AppError> {
    let bearer = req
        .headers()
        .typed_get::<Authorization<Bearer>>()
        .ok_or_else(|| AppError::Unauthorized("Not authorized, no token".into()))?;

    let claims = state
        .tokens
        .verify_purpose(bearer.token(), TokenPurpose::Access)?;

    let auth_user = AuthUser {
        id: claims.id,
        email: claims.email,
    };

    req.extensions_mut().insert(auth_user);
    Ok(next.run(req).await)
}

/// Must run after [`require_auth`]. The role is read from the user record, not
/// the token, so demotions take effect immediately.
pub async fn require_admin(
    State(state): State<AppState>,
    req: Request,
    next: Next,
) -> Result<Response, AppError> {
    let auth_user = req
        .extensions()
        .get::<AuthUser>()
        .cloned()
        .ok_or_else(|| AppError::Unauthorized("Not authorized, no token".into()))?;

    let user = state
        .users
        .find_by_id(&auth_user.id.to_string())
        .await?
        .ok_or_else(|| AppError::Unauthorized("User no longer exists".into()))?;

    if user.role != Role::Admin {
        return Err(AppError::Forbidden("Admin access required".into()));
    }

    Ok(next.run(req).await)
}
