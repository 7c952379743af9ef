//! Authentication models for AgriLink

use serde::{Deserialize, Serialize};
use sqlx::types::chrono::{DateTime, Utc};
use uuid::Uuid;
use validator::{Validate, ValidationError};

use super::{Language, UserResponse, UserRole};

/// What a one-time code may be used for
#[derive(Debug, Serialize, Deserialize, sqlx::Type, Clone, Copy, PartialEq, Eq)]
#[sqlx(type_name = "otp_purpose", rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OtpPurpose {
    Registration,
    Login,
    PasswordReset,
    PhoneVerification,
}

/// One-time code record; only the SHA-256 of the code is stored
#[derive(Debug, sqlx::FromRow, Clone)]
pub struct OtpCode {
    pub id: Uuid,
    pub phone_number: String,
    pub code_hash: String,
    pub purpose: OtpPurpose,
    pub expires_at: DateTime<Utc>,
    pub is_used: bool,
    pub used_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

/// Persisted refresh token, kept for rotation and revocation
#[derive(Debug, sqlx::FromRow, Clone)]
pub struct RefreshTokenRecord {
    pub id: Uuid,
    pub user_id: Uuid,
    pub token_hash: String,
    pub expires_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

/// Ethiopian mobile numbers in international form: +2519XXXXXXXX or +2517XXXXXXXX
pub fn validate_phone_number(phone: &str) -> Result<(), ValidationError> {
    let valid = phone
        .strip_prefix("+251")
        .map(|rest| {
            rest.len() == 9
                && (rest.starts_with('9') || rest.starts_with('7'))
                && rest.chars().all(|c| c.is_ascii_digit())
        })
        .unwrap_or(false);

    if valid {
        Ok(())
    } else {
        let mut err = ValidationError::new("phone_number");
        err.message = Some("Phone number must be in the format +2519XXXXXXXX".into());
        Err(err)
    }
}

fn validate_otp_code(code: &str) -> Result<(), ValidationError> {
    if code.len() == 6 && code.chars().all(|c| c.is_ascii_digit()) {
        Ok(())
    } else {
        let mut err = ValidationError::new("otp_code");
        err.message = Some("OTP must be a 6-digit code".into());
        Err(err)
    }
}

// ============================================================================
// Request/Response DTOs
// ============================================================================

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct RequestOtpRequest {
    #[validate(custom = "validate_phone_number")]
    pub phone_number: String,
    pub purpose: OtpPurpose,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OtpRequestResponse {
    pub expires_at: DateTime<Utc>,
    /// Only populated outside production
    #[serde(skip_serializing_if = "Option::is_none")]
    pub otp: Option<String>,
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct VerifyOtpRequest {
    #[validate(custom = "validate_phone_number")]
    pub phone_number: String,
    #[validate(custom = "validate_otp_code")]
    pub code: String,
    pub purpose: OtpPurpose,
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct RegisterRequest {
    #[validate(custom = "validate_phone_number")]
    pub phone_number: String,
    #[validate(length(min = 1, max = 100, message = "First name is required"))]
    pub first_name: String,
    #[validate(length(min = 1, max = 100, message = "Last name is required"))]
    pub last_name: String,
    #[validate(email(message = "Invalid email address"))]
    pub email: Option<String>,
    #[validate(length(min = 8, max = 128, message = "Password must be at least 8 characters"))]
    pub password: Option<String>,
    pub role: Option<UserRole>,
    pub language: Option<Language>,
    /// REGISTRATION code; not needed when calling with the token from OTP verification
    #[validate(custom = "validate_otp_code")]
    pub otp: Option<String>,
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct LoginRequest {
    #[validate(custom = "validate_phone_number")]
    pub phone_number: String,
    #[validate(length(min = 1, message = "Password is required"))]
    pub password: String,
}

/// Refresh token request (also used for logout)
#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct RefreshTokenRequest {
    #[validate(length(min = 1, message = "Refresh token is required"))]
    pub refresh_token: String,
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct ChangePasswordRequest {
    #[validate(length(min = 1, message = "Current password is required"))]
    pub current_password: String,
    #[validate(length(min = 8, max = 128, message = "Password must be at least 8 characters"))]
    pub new_password: String,
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct SetPasswordRequest {
    #[validate(length(min = 8, max = 128, message = "Password must be at least 8 characters"))]
    pub password: String,
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct ResetPasswordRequest {
    #[validate(custom = "validate_phone_number")]
    pub phone_number: String,
    #[validate(custom = "validate_otp_code")]
    pub code: String,
    #[validate(length(min = 8, max = 128, message = "Password must be at least 8 characters"))]
    pub new_password: String,
}

/// Auth tokens response
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthTokensResponse {
    pub user: UserResponse,
    pub access_token: String,
    pub refresh_token: String,
    pub token_type: String,
    pub expires_in: i64,
}
