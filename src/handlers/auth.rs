use axum::{extract::State, http::StatusCode, Extension, Json};
use serde_json::{json, Value};

use crate::auth::{
    jwt::{Subject, TokenPurpose},
    middleware::AuthUser,
    password::{hash_password, verify_password},
};
use crate::db::{Filter, Repository};
use crate::error::{AppError, AppResult};
use crate::handlers::incomplete_body;
use crate::models::user::{
    ForgotPasswordRequest, LoginRequest, NewUser, RefreshRequest, RegisterRequest,
    ResetPasswordRequest, Role, User, UserProfile, VerifyEmailRequest,
};
use crate::validation::ValidatedJson;
use crate::AppState;

fn subject(user: &User) -> Subject<'_> {
    Subject {
        id: user.id,
        email: &user.email,
    }
}

fn invalid_credentials() -> AppError {
    AppError::Unauthorized("Invalid credentials".into())
}

async fn find_by_email(state: &AppState, email: &str) -> AppResult<Option<User>> {
    Ok(state
        .users
        .find_one(Filter::new().eq("email", email.trim().to_lowercase()))
        .await?)
}

pub async fn register(
    State(state): State<AppState>,
    ValidatedJson(body): ValidatedJson<RegisterRequest>,
) -> AppResult<(StatusCode, Json<Value>)> {
    let (Some(name), Some(email), Some(password)) = (body.name, body.email, body.password) else {
        return Err(incomplete_body());
    };
    let email = email.trim().to_lowercase();

    let role = if state.config.is_admin_email(&email) {
        Role::Admin
    } else {
        Role::User
    };

    let user = state
        .users
        .create(&NewUser {
            name: name.trim().to_string(),
            email,
            password_hash: hash_password(&password)?,
            role,
            is_email_verified: false,
        })
        .await?;

    let tokens = state.tokens.issue_pair(subject(&user))?;
    let verification = state.tokens.issue_email_verification(subject(&user))?;
    tracing::info!(user_id = %user.id, "User registered");
    tracing::debug!(user_id = %user.id, token = %verification, "Email verification token issued");

    Ok((
        StatusCode::CREATED,
        Json(json!({
            "success": true,
            "data": {
                "user": UserProfile::from(user),
                "token": tokens.token,
                "refreshToken": tokens.refresh_token,
            },
        })),
    ))
}

pub async fn login(
    State(state): State<AppState>,
    ValidatedJson(body): ValidatedJson<LoginRequest>,
) -> AppResult<Json<Value>> {
    let (Some(email), Some(password)) = (body.email, body.password) else {
        return Err(incomplete_body());
    };

    let user = find_by_email(&state, &email)
        .await?
        .ok_or_else(invalid_credentials)?;

    if !verify_password(&password, &user.password_hash)? {
        return Err(invalid_credentials());
    }

    let tokens = state.tokens.issue_pair(subject(&user))?;
    tracing::info!(user_id = %user.id, "User logged in");

    Ok(Json(json!({
        "success": true,
        "data": {
            "user": UserProfile::from(user),
            "token": tokens.token,
            "refreshToken": tokens.refresh_token,
        },
    })))
}

pub async fn refresh(
    State(state): State<AppState>,
    ValidatedJson(body): ValidatedJson<RefreshRequest>,
) -> AppResult<Json<Value>> {
    let raw = body.refresh_token.ok_or_else(incomplete_body)?;
    let claims = state.tokens.verify_purpose(&raw, TokenPurpose::Refresh)?;

    // The account may have been removed since the refresh token was issued.
    let user = state
        .users
        .find_by_id(&claims.id.to_string())
        .await?
        .ok_or_else(|| AppError::Unauthorized("User no longer exists".into()))?;

    let token = state.tokens.issue_access(subject(&user))?;
    Ok(Json(json!({ "success": true, "data": { "token": token } })))
}

pub async fn verify_email(
    State(state): State<AppState>,
    ValidatedJson(body): ValidatedJson<VerifyEmailRequest>,
) -> AppResult<Json<Value>> {
    let raw = body.token.ok_or_else(incomplete_body)?;
    let claims = state
        .tokens
        .verify_purpose(&raw, TokenPurpose::EmailVerification)?;

    let user = state
        .users
        .update(&claims.id.to_string(), &json!({ "isEmailVerified": true }))
        .await?
        .ok_or_else(Repository::<User>::not_found)?;

    tracing::info!(user_id = %user.id, "Email verified");
    Ok(Json(json!({
        "success": true,
        "message": "Email verified",
        "data": UserProfile::from(user),
    })))
}

/// Always answers with success so callers cannot learn which emails exist.
pub async fn forgot_password(
    State(state): State<AppState>,
    ValidatedJson(body): ValidatedJson<ForgotPasswordRequest>,
) -> AppResult<Json<Value>> {
    let email = body.email.ok_or_else(incomplete_body)?;

    if let Some(user) = find_by_email(&state, &email).await? {
        let token = state.tokens.issue_password_reset(subject(&user))?;
        tracing::debug!(user_id = %user.id, token = %token, "Password reset token issued");
    }

    Ok(Json(json!({
        "success": true,
        "message": "If that account exists, a password reset link has been sent",
    })))
}

pub async fn reset_password(
    State(state): State<AppState>,
    ValidatedJson(body): ValidatedJson<ResetPasswordRequest>,
) -> AppResult<Json<Value>> {
    let (Some(raw), Some(password)) = (body.token, body.password) else {
        return Err(incomplete_body());
    };
    let claims = state.tokens.verify_purpose(&raw, TokenPurpose::PasswordReset)?;

    let password_hash = hash_password(&password)?;
    let user = state
        .users
        .update(&claims.id.to_string(), &json!({ "passwordHash": password_hash }))
        .await?
        .ok_or_else(Repository::<User>::not_found)?;

    tracing::info!(user_id = %user.id, "Password reset");
    Ok(Json(json!({ "success": true, "message": "Password has been reset" })))
}

pub async fn me(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
) -> AppResult<Json<Value>> {
    let user = state.users.get(&auth_user.id.to_string()).await?;
    Ok(Json(json!({ "success": true, "data": UserProfile::from(user) })))
}
