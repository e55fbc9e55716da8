use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{
    decode, encode, errors::ErrorKind, Algorithm, DecodingKey, EncodingKey, Header, Validation,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::config::Config;

pub const ISSUER: &str = "mindspace-api";
pub const AUDIENCE: &str = "mindspace-client";

const EMAIL_VERIFICATION_TTL_HOURS: i64 = 24;
const PASSWORD_RESET_TTL_HOURS: i64 = 1;

#[derive(Debug, thiserror::Error)]
pub enum TokenError {
    #[error("Invalid token")]
    Invalid,

    #[error("Token expired")]
    Expired,

    #[error("Failed to sign token: {0}")]
    Signing(#[source] jsonwebtoken::errors::Error),
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TokenPurpose {
    Access,
    Refresh,
    EmailVerification,
    PasswordReset,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Claims {
    pub id: Uuid,
    pub email: String,
    pub purpose: TokenPurpose,
    pub iss: String,
    pub aud: String,
    pub iat: i64,
    pub exp: i64,
}

/// The identity a token is issued for.
#[derive(Debug, Clone, Copy)]
pub struct Subject<'a> {
    pub id: Uuid,
    pub email: &'a str,
}

/// Which key a token was signed with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SigningKey {
    Primary,
    Refresh,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenPair {
    pub token: String,
    pub refresh_token: String,
}

/// Issues and verifies the HS256 bearer tokens used by the API. Holds only
/// keys and lifetimes; nothing is persisted.
pub struct TokenService {
    primary: (EncodingKey, DecodingKey),
    refresh: (EncodingKey, DecodingKey),
    access_ttl: Duration,
    refresh_ttl: Duration,
}

impl TokenService {
    pub fn new(secret: &str, refresh_secret: &str, access_ttl: Duration, refresh_ttl: Duration) -> Self {
        Self {
            primary: (
                EncodingKey::from_secret(secret.as_bytes()),
                DecodingKey::from_secret(secret.as_bytes()),
            ),
            refresh: (
                EncodingKey::from_secret(refresh_secret.as_bytes()),
                DecodingKey::from_secret(refresh_secret.as_bytes()),
            ),
            access_ttl,
            refresh_ttl,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(
            &config.jwt_secret,
            &config.jwt_refresh_secret,
            config.jwt_expire,
            config.jwt_refresh_expire,
        )
    }

    pub fn issue_access(&self, subject: Subject<'_>) -> Result<String, TokenError> {
        self.issue_at(subject, TokenPurpose::Access, Utc::now())
    }

    pub fn issue_refresh(&self, subject: Subject<'_>) -> Result<String, TokenError> {
        self.issue_at(subject, TokenPurpose::Refresh, Utc::now())
    }

    pub fn issue_email_verification(&self, subject: Subject<'_>) -> Result<String, TokenError> {
        self.issue_at(subject, TokenPurpose::EmailVerification, Utc::now())
    }

    pub fn issue_password_reset(&self, subject: Subject<'_>) -> Result<String, TokenError> {
        self.issue_at(subject, TokenPurpose::PasswordReset, Utc::now())
    }

    pub fn issue_pair(&self, subject: Subject<'_>) -> Result<TokenPair, TokenError> {
        Ok(TokenPair {
            token: self.issue_access(subject)?,
            refresh_token: self.issue_refresh(subject)?,
        })
    }

    fn lifetime(&self, purpose: TokenPurpose) -> Duration {
        match purpose {
            TokenPurpose::Access => self.access_ttl,
            TokenPurpose::Refresh => self.refresh_ttl,
            TokenPurpose::EmailVerification => Duration::hours(EMAIL_VERIFICATION_TTL_HOURS),
            TokenPurpose::PasswordReset => Duration::hours(PASSWORD_RESET_TTL_HOURS),
        }
    }

    fn key_for(purpose: TokenPurpose) -> SigningKey {
        match purpose {
            TokenPurpose::Refresh => SigningKey::Refresh,
            _ => SigningKey::Primary,
        }
    }

    fn keys(&self, key: SigningKey) -> &(EncodingKey, DecodingKey) {
        match key {
            SigningKey::Primary => &self.primary,
            SigningKey::Refresh => &self.refresh,
        }
    }

    pub(crate) fn issue_at(
        &self,
        subject: Subject<'_>,
        purpose: TokenPurpose,
        issued_at: DateTime<Utc>,
    ) -> Result<String, TokenError> {
        let claims = Claims {
            id: subject.id,
            email: subject.email.to_string(),
            purpose,
            iss: ISSUER.to_string(),
            aud: AUDIENCE.to_string(),
            iat: issued_at.timestamp(),
            exp: (issued_at + self.lifetime(purpose)).timestamp(),
        };

        let (encoding, _) = self.keys(Self::key_for(purpose));
        encode(&Header::new(Algorithm::HS256), &claims, encoding).map_err(TokenError::Signing)
    }

    /// Check signature, issuer, audience and expiry. There is no leeway.
    pub fn verify(&self, token: &str, key: SigningKey) -> Result<Claims, TokenError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_issuer(&[ISSUER]);
        validation.set_audience(&[AUDIENCE]);
        validation.leeway = 0;

        let (_, decoding) = self.keys(key);
        decode::<Claims>(token, decoding, &validation)
            .map(|data| data.claims)
            .map_err(|e| match e.kind() {
                ErrorKind::ExpiredSignature => TokenError::Expired,
                _ => TokenError::Invalid,
            })
    }

    /// Verify and additionally require the token to have been issued for `purpose`.
    pub fn verify_purpose(&self, token: &str, purpose: TokenPurpose) -> Result<Claims, TokenError> {
        let claims = self.verify(token, Self::key_for(purpose))?;
        if claims.purpose != purpose {
            return Err(TokenError::Invalid);
        }
        Ok(claims)
    }
}

/// Read the claims without checking the signature or expiry. Only for
/// inspection that grants nothing.
pub fn decode_unverified(token: &str) -> Option<Claims> {
    let mut validation = Validation::new(Algorithm::HS256);
    validation.insecure_disable_signature_validation();
    validation.validate_exp = false;
    validation.validate_aud = false;
    validation.required_spec_claims.clear();

    decode::<Claims>(token, &DecodingKey::from_secret(&[]), &validation)
        .ok()
        .map(|data| data.claims)
}
