use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use crate::db::{ser_timestamp, Document};
use crate::validation::non_empty;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub password_hash: String,
    pub role: Role,
    pub is_email_verified: bool,
    #[serde(serialize_with = "ser_timestamp")]
    pub created_at: DateTime<Utc>,
    #[serde(serialize_with = "ser_timestamp")]
    pub updated_at: DateTime<Utc>,
}

impl Document for User {
    const COLLECTION: &'static str = "users";
    const LABEL: &'static str = "User";
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    #[default]
    User,
    Admin,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NewUser {
    pub name: String,
    pub email: String,
    pub password_hash: String,
    pub role: Role,
    pub is_email_verified: bool,
}

/// Public shape of a user; never carries the password hash.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub role: Role,
    pub is_email_verified: bool,
    #[serde(serialize_with = "ser_timestamp")]
    pub created_at: DateTime<Utc>,
}

impl From<User> for UserProfile {
    fn from(u: User) -> Self {
        Self {
            id: u.id,
            name: u.name,
            email: u.email,
            role: u.role,
            is_email_verified: u.is_email_verified,
            created_at: u.created_at,
        }
    }
}

#[derive(Debug, Deserialize, Validate)]
pub struct RegisterRequest {
    #[validate(
        required(message = "Name is required"),
        custom(function = "non_empty", message = "Name is required"),
        length(max = 50, message = "Name cannot exceed 50 characters")
    )]
    pub name: Option<String>,

    #[validate(
        required(message = "Email is required"),
        email(message = "Please provide a valid email")
    )]
    pub email: Option<String>,

    #[validate(
        required(message = "Password is required"),
        length(min = 8, max = 128, message = "Password must be 8-128 characters")
    )]
    pub password: Option<String>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct LoginRequest {
    #[validate(
        required(message = "Email is required"),
        email(message = "Please provide a valid email")
    )]
    pub email: Option<String>,

    #[validate(required(message = "Password is required"))]
    pub password: Option<String>,
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct RefreshRequest {
    #[validate(required(message = "Refresh token is required"))]
    pub refresh_token: Option<String>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct VerifyEmailRequest {
    #[validate(required(message = "Token is required"))]
    pub token: Option<String>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct ForgotPasswordRequest {
    #[validate(
        required(message = "Email is required"),
        email(message = "Please provide a valid email")
    )]
    pub email: Option<String>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct ResetPasswordRequest {
    #[validate(required(message = "Token is required"))]
    pub token: Option<String>,

    #[validate(
        required(message = "Password is required"),
        length(min = 8, max = 128, message = "Password must be 8-128 characters")
    )]
    pub password: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_profile_hides_password_hash() {
        let created = Utc.with_ymd_and_hms(2026, 1, 5, 8, 30, 0).unwrap();
        let user = User {
            id: Uuid::new_v4(),
            name: "Ari".into(),
            email: "ari@mindspace.app".into(),
            password_hash: "$argon2id$secret".into(),
            role: Role::User,
            is_email_verified: false,
            created_at: created,
            updated_at: created,
        };
        let json = serde_json::to_value(UserProfile::from(user)).unwrap();
        assert!(json.get("passwordHash").is_none());
        assert_eq!(json["role"], "user");
        assert_eq!(json["isEmailVerified"], false);
        assert_eq!(json["createdAt"], "2026-01-05T08:30:00.000Z");
    }

    #[test]
    fn test_empty_name_is_required_not_too_long() {
        let req: RegisterRequest = serde_json::from_str(
            r#"{"name":"","email":"ari@mindspace.app","password":"long enough"}"#,
        )
        .unwrap();
        let errors = crate::validation::violations(&req.validate().unwrap_err());
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].field, "name");
        assert_eq!(errors[0].message, "Name is required");
    }

    #[test]
    fn test_register_rules() {
        let req: RegisterRequest = serde_json::from_str(
            r#"{"name":"Ari","email":"not-an-email","password":"short"}"#,
        )
        .unwrap();
        let errors = crate::validation::violations(&req.validate().unwrap_err());
        let fields: Vec<_> = errors.iter().map(|e| e.field.as_str()).collect();
        assert_eq!(fields, vec!["email", "password"]);
    }
}
