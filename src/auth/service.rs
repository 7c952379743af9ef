//! Authentication service
//!
//! Core business logic for OTP and password authentication and session
//! (refresh token) management.

use chrono::{Duration, Utc};
use sqlx::{PgConnection, PgPool, Postgres, Transaction};
use thiserror::Error;
use uuid::Uuid;

use crate::error::ApiError;
use crate::models::{
    AuthTokensResponse, OtpPurpose, OtpRequestResponse, RefreshTokenRecord,
    RegisterRequest, User, UserResponse, UserRole,
};

use super::crypto::{generate_otp_code, hash_password, hash_token, verify_password};
use super::jwt::{generate_access_token, generate_refresh_token, verify_token, JwtError, TokenType};

/// Auth service errors
#[derive(Error, Debug)]
pub enum AuthError {
    #[error(transparent)]
    Database(#[from] sqlx::Error),

    #[error("Invalid or expired OTP")]
    InvalidOtp,

    #[error("User not found. Please register first")]
    UserNotFound,

    #[error("User already registered with this phone number")]
    AlreadyRegistered,

    #[error("Invalid phone number or password")]
    InvalidCredentials,

    #[error("Account is deactivated")]
    AccountDeactivated,

    #[error("Role must be FARMER or BUYER")]
    InvalidRole,

    #[error("Verify the phone number with a registration OTP first")]
    PhoneNotVerified,

    #[error("Phone number does not match the signed-in account")]
    PhoneMismatch,

    #[error("{0}")]
    Token(#[from] JwtError),

    #[error("Invalid or expired refresh token")]
    InvalidRefreshToken,

    #[error("No password set for this account")]
    PasswordNotSet,

    #[error("Password already set. Use change-password instead")]
    PasswordAlreadySet,

    #[error("Current password is incorrect")]
    IncorrectPassword,

    #[error("Password hashing failed: {0}")]
    Hashing(String),
}

impl From<AuthError> for ApiError {
    fn from(err: AuthError) -> Self {
        match err {
            AuthError::Database(e) => ApiError::from(e),
            AuthError::UserNotFound => ApiError::NotFound(err.to_string()),
            AuthError::AlreadyRegistered | AuthError::PasswordAlreadySet => {
                ApiError::Conflict(err.to_string())
            }
            AuthError::PhoneMismatch => ApiError::Forbidden(err.to_string()),
            AuthError::InvalidRole | AuthError::PasswordNotSet => {
                ApiError::ValidationError(err.to_string())
            }
            AuthError::Token(JwtError::EncodingFailed(_)) | AuthError::Hashing(_) => {
                ApiError::InternalError(err.to_string())
            }
            AuthError::InvalidOtp
            | AuthError::PhoneNotVerified
            | AuthError::InvalidCredentials
            | AuthError::AccountDeactivated
            | AuthError::Token(_)
            | AuthError::InvalidRefreshToken
            | AuthError::IncorrectPassword => ApiError::Unauthorized(err.to_string()),
        }
    }
}

/// Authentication service
#[derive(Clone)]
pub struct AuthService {
    db_pool: PgPool,
    jwt_secret: String,
    jwt_refresh_secret: String,
    access_token_ttl_seconds: i64,
    refresh_token_ttl_days: i64,
    otp_ttl_seconds: i64,
    bcrypt_cost: u32,
    expose_otp: bool,
}

impl AuthService {
    /// Create a new AuthService
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        db_pool: PgPool,
        jwt_secret: String,
        jwt_refresh_secret: String,
        access_token_ttl_seconds: i64,
        refresh_token_ttl_days: i64,
        otp_ttl_seconds: i64,
        bcrypt_cost: u32,
        expose_otp: bool,
    ) -> Self {
        Self {
            db_pool,
            jwt_secret,
            jwt_refresh_secret,
            access_token_ttl_seconds,
            refresh_token_ttl_days,
            otp_ttl_seconds,
            bcrypt_cost,
            expose_otp,
        }
    }

    /// Issue a one-time code for the given phone and purpose
    pub async fn request_otp(
        &self,
        phone_number: &str,
        purpose: OtpPurpose,
    ) -> Result<OtpRequestResponse, AuthError> {
        let existing = self.find_user_by_phone(phone_number).await?;

        match purpose {
            OtpPurpose::Registration => {
                if existing.as_ref().is_some_and(User::is_registered) {
                    return Err(AuthError::AlreadyRegistered);
                }
            }
            OtpPurpose::Login | OtpPurpose::PasswordReset => {
                if existing.is_none() {
                    return Err(AuthError::UserNotFound);
                }
            }
            OtpPurpose::PhoneVerification => {}
        }

        let code = generate_otp_code();
        let expires_at = Utc::now() + Duration::seconds(self.otp_ttl_seconds);

        sqlx::query(
            r#"
            INSERT INTO otp_codes (id, phone_number, code_hash, purpose, expires_at)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(phone_number)
        .bind(hash_token(&code))
        .bind(purpose)
        .bind(expires_at)
        .execute(&self.db_pool)
        .await?;

        tracing::info!(purpose = ?purpose, "OTP issued");
        // SMS delivery is not wired up; the code only reaches the logs
        tracing::debug!(phone = %phone_number, code = %code, "OTP code");

        Ok(OtpRequestResponse {
            expires_at,
            otp: self.expose_otp.then_some(code),
        })
    }

    /// Verify a one-time code and sign the user in
    pub async fn verify_otp(
        &self,
        phone_number: &str,
        code: &str,
        purpose: OtpPurpose,
    ) -> Result<AuthTokensResponse, AuthError> {
        let mut conn = self.db_pool.acquire().await?;
        consume_otp(&mut conn, phone_number, code, purpose).await?;
        drop(conn);

        let user = match self.find_user_by_phone(phone_number).await? {
            Some(user) => {
                if !user.is_active {
                    return Err(AuthError::AccountDeactivated);
                }
                if user.is_verified {
                    user
                } else {
                    sqlx::query_as::<_, User>(
                        "UPDATE users SET is_verified = TRUE, updated_at = NOW() WHERE id = $1 RETURNING *",
                    )
                    .bind(user.id)
                    .fetch_one(&self.db_pool)
                    .await?
                }
            }
            None if purpose == OtpPurpose::Registration => {
                // Bare account; names and role are filled in by register()
                sqlx::query_as::<_, User>(
                    r#"
                    INSERT INTO users (id, phone_number, role, is_verified)
                    VALUES ($1, $2, 'BUYER', TRUE)
                    ON CONFLICT (phone_number) DO UPDATE SET is_verified = TRUE, updated_at = NOW()
                    RETURNING *
                    "#,
                )
                .bind(Uuid::new_v4())
                .bind(phone_number)
                .fetch_one(&self.db_pool)
                .await?
            }
            None => return Err(AuthError::UserNotFound),
        };

        tracing::info!(user_id = %user.id, purpose = ?purpose, "OTP verified");

        self.issue_tokens(user).await
    }

    /// Complete registration for a phone number.
    ///
    /// Ownership of the phone must be proven, either by the access token of
    /// the bare account created at OTP verification or by a fresh
    /// REGISTRATION code in the request.
    pub async fn register(
        &self,
        req: RegisterRequest,
        signed_in_phone: Option<&str>,
    ) -> Result<AuthTokensResponse, AuthError> {
        if signed_in_phone.is_some_and(|phone| phone != req.phone_number) {
            return Err(AuthError::PhoneMismatch);
        }
        if signed_in_phone.is_none() && req.otp.is_none() {
            return Err(AuthError::PhoneNotVerified);
        }

        let role = req.role.unwrap_or(UserRole::Buyer);
        if role == UserRole::Admin {
            return Err(AuthError::InvalidRole);
        }

        let password_hash = match &req.password {
            Some(password) => Some(self.hash_password(password).await?),
            None => None,
        };
        let language = req.language.unwrap_or_default();

        let mut tx = self.db_pool.begin().await?;

        if signed_in_phone.is_none() {
            if let Some(code) = &req.otp {
                consume_otp(&mut tx, &req.phone_number, code, OtpPurpose::Registration).await?;
            }
        }

        let existing = sqlx::query_as::<_, User>(
            "SELECT * FROM users WHERE phone_number = $1 FOR UPDATE",
        )
        .bind(&req.phone_number)
        .fetch_optional(&mut *tx)
        .await?;

        let user = match existing {
            Some(user) if user.is_registered() => return Err(AuthError::AlreadyRegistered),
            Some(user) => {
                sqlx::query_as::<_, User>(
                    r#"
                    UPDATE users
                    SET first_name = $2, last_name = $3, email = $4,
                        password_hash = COALESCE($5, password_hash),
                        role = $6, language = $7, is_verified = TRUE, updated_at = NOW()
                    WHERE id = $1
                    RETURNING *
                    "#,
                )
                .bind(user.id)
                .bind(&req.first_name)
                .bind(&req.last_name)
                .bind(&req.email)
                .bind(&password_hash)
                .bind(role)
                .bind(language)
                .fetch_one(&mut *tx)
                .await?
            }
            None => {
                sqlx::query_as::<_, User>(
                    r#"
                    INSERT INTO users
                        (id, phone_number, first_name, last_name, email, password_hash, role,
                         language, is_verified)
                    VALUES ($1, $2, $3, $4, $5, $6, $7, $8, TRUE)
                    RETURNING *
                    "#,
                )
                .bind(Uuid::new_v4())
                .bind(&req.phone_number)
                .bind(&req.first_name)
                .bind(&req.last_name)
                .bind(&req.email)
                .bind(&password_hash)
                .bind(role)
                .bind(language)
                .fetch_one(&mut *tx)
                .await?
            }
        };

        create_empty_profile(&mut tx, user.id, role).await?;

        tx.commit().await?;

        tracing::info!(user_id = %user.id, role = %role.as_str(), "User registered");

        self.issue_tokens(user).await
    }

    /// Password login
    pub async fn login(
        &self,
        phone_number: &str,
        password: &str,
    ) -> Result<AuthTokensResponse, AuthError> {
        let user = self
            .find_user_by_phone(phone_number)
            .await?
            .ok_or(AuthError::InvalidCredentials)?;

        let hash = user
            .password_hash
            .clone()
            .ok_or(AuthError::InvalidCredentials)?;

        if !self.verify_password(password, hash).await? {
            return Err(AuthError::InvalidCredentials);
        }

        if !user.is_active {
            return Err(AuthError::AccountDeactivated);
        }

        let user = sqlx::query_as::<_, User>(
            "UPDATE users SET last_login_at = NOW() WHERE id = $1 RETURNING *",
        )
        .bind(user.id)
        .fetch_one(&self.db_pool)
        .await?;

        tracing::info!(user_id = %user.id, "User logged in");

        self.issue_tokens(user).await
    }

    /// Generate an access/refresh pair and persist the refresh token hash
    pub async fn generate_tokens(&self, user: &User) -> Result<(String, String), AuthError> {
        let access_token =
            generate_access_token(user, &self.jwt_secret, self.access_token_ttl_seconds)?;
        let refresh_token =
            generate_refresh_token(user, &self.jwt_refresh_secret, self.refresh_token_ttl_days)?;

        let expires_at = Utc::now() + Duration::days(self.refresh_token_ttl_days);

        sqlx::query(
            r#"
            INSERT INTO refresh_tokens (id, user_id, token_hash, expires_at)
            VALUES ($1, $2, $3, $4)
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(user.id)
        .bind(hash_token(&refresh_token))
        .bind(expires_at)
        .execute(&self.db_pool)
        .await?;

        Ok((access_token, refresh_token))
    }

    async fn issue_tokens(&self, user: User) -> Result<AuthTokensResponse, AuthError> {
        let (access_token, refresh_token) = self.generate_tokens(&user).await?;

        Ok(AuthTokensResponse {
            user: UserResponse::from(user),
            access_token,
            refresh_token,
            token_type: "Bearer".to_string(),
            expires_in: self.access_token_ttl_seconds,
        })
    }

    /// Rotate a refresh token: the presented token is revoked and a new
    /// pair is issued.
    pub async fn refresh(&self, refresh_token: &str) -> Result<AuthTokensResponse, AuthError> {
        verify_token(refresh_token, &self.jwt_refresh_secret, TokenType::Refresh)?;

        let record = sqlx::query_as::<_, RefreshTokenRecord>(
            "DELETE FROM refresh_tokens WHERE token_hash = $1 RETURNING *",
        )
        .bind(hash_token(refresh_token))
        .fetch_optional(&self.db_pool)
        .await?
        .ok_or(AuthError::InvalidRefreshToken)?;

        if record.expires_at <= Utc::now() {
            return Err(AuthError::InvalidRefreshToken);
        }

        let user = self
            .get_user_by_id(record.user_id)
            .await?
            .ok_or(AuthError::InvalidRefreshToken)?;

        if !user.is_active {
            return Err(AuthError::AccountDeactivated);
        }

        tracing::debug!(user_id = %user.id, "Refresh token rotated");

        self.issue_tokens(user).await
    }

    /// Revoke a single refresh token; unknown tokens are ignored
    pub async fn logout(&self, refresh_token: &str) -> Result<(), AuthError> {
        sqlx::query("DELETE FROM refresh_tokens WHERE token_hash = $1")
            .bind(hash_token(refresh_token))
            .execute(&self.db_pool)
            .await?;

        Ok(())
    }

    /// Revoke every refresh token of a user. Returns the number revoked.
    pub async fn logout_all(&self, user_id: Uuid) -> Result<u64, AuthError> {
        let result = sqlx::query("DELETE FROM refresh_tokens WHERE user_id = $1")
            .bind(user_id)
            .execute(&self.db_pool)
            .await?;

        tracing::info!(user_id = %user_id, revoked = result.rows_affected(), "All sessions revoked");

        Ok(result.rows_affected())
    }

    pub async fn change_password(
        &self,
        user_id: Uuid,
        current_password: &str,
        new_password: &str,
    ) -> Result<(), AuthError> {
        let user = self
            .get_user_by_id(user_id)
            .await?
            .ok_or(AuthError::UserNotFound)?;

        let hash = user.password_hash.ok_or(AuthError::PasswordNotSet)?;
        if !self.verify_password(current_password, hash).await? {
            return Err(AuthError::IncorrectPassword);
        }

        let new_hash = self.hash_password(new_password).await?;
        self.store_password_and_revoke(user_id, &new_hash).await
    }

    /// Set a first password for an OTP-only account
    pub async fn set_password(&self, user_id: Uuid, password: &str) -> Result<(), AuthError> {
        let hash = self.hash_password(password).await?;

        let result = sqlx::query(
            r#"
            UPDATE users SET password_hash = $2, updated_at = NOW()
            WHERE id = $1 AND password_hash IS NULL
            "#,
        )
        .bind(user_id)
        .bind(&hash)
        .execute(&self.db_pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(AuthError::PasswordAlreadySet);
        }

        Ok(())
    }

    pub async fn reset_password(
        &self,
        phone_number: &str,
        code: &str,
        new_password: &str,
    ) -> Result<(), AuthError> {
        let user = self
            .find_user_by_phone(phone_number)
            .await?
            .ok_or(AuthError::UserNotFound)?;

        let mut conn = self.db_pool.acquire().await?;
        consume_otp(&mut conn, phone_number, code, OtpPurpose::PasswordReset).await?;
        drop(conn);

        let hash = self.hash_password(new_password).await?;
        self.store_password_and_revoke(user.id, &hash).await?;

        tracing::info!(user_id = %user.id, "Password reset");

        Ok(())
    }

    async fn store_password_and_revoke(&self, user_id: Uuid, hash: &str) -> Result<(), AuthError> {
        let mut tx = self.db_pool.begin().await?;

        sqlx::query("UPDATE users SET password_hash = $2, updated_at = NOW() WHERE id = $1")
            .bind(user_id)
            .bind(hash)
            .execute(&mut *tx)
            .await?;

        sqlx::query("DELETE FROM refresh_tokens WHERE user_id = $1")
            .bind(user_id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(())
    }

    /// Resolve an access token to an active user
    pub async fn authenticate(&self, access_token: &str) -> Result<User, AuthError> {
        let claims = verify_token(access_token, &self.jwt_secret, TokenType::Access)?;
        let user_id = claims.user_id()?;

        let user = self
            .get_user_by_id(user_id)
            .await?
            .ok_or(AuthError::Token(JwtError::InvalidToken))?;

        if !user.is_active {
            return Err(AuthError::AccountDeactivated);
        }

        Ok(user)
    }

    /// Get user by ID
    pub async fn get_user_by_id(&self, user_id: Uuid) -> Result<Option<User>, AuthError> {
        let user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE id = $1")
            .bind(user_id)
            .fetch_optional(&self.db_pool)
            .await?;

        Ok(user)
    }

    async fn find_user_by_phone(&self, phone_number: &str) -> Result<Option<User>, AuthError> {
        let user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE phone_number = $1")
            .bind(phone_number)
            .fetch_optional(&self.db_pool)
            .await?;

        Ok(user)
    }

    async fn hash_password(&self, password: &str) -> Result<String, AuthError> {
        let password = password.to_string();
        let cost = self.bcrypt_cost;

        tokio::task::spawn_blocking(move || hash_password(&password, cost))
            .await
            .map_err(|e| AuthError::Hashing(e.to_string()))?
            .map_err(|e| AuthError::Hashing(e.to_string()))
    }

    async fn verify_password(&self, password: &str, hash: String) -> Result<bool, AuthError> {
        let password = password.to_string();

        tokio::task::spawn_blocking(move || verify_password(&password, &hash))
            .await
            .map_err(|e| AuthError::Hashing(e.to_string()))
    }
}

/// Consume the most recent matching, unused and unexpired code.
///
/// The select and the mark-as-used happen in one statement, so a code
/// can succeed at most once even under concurrent verification.
async fn consume_otp(
    conn: &mut PgConnection,
    phone_number: &str,
    code: &str,
    purpose: OtpPurpose,
) -> Result<(), AuthError> {
    let result = sqlx::query(
        r#"
        UPDATE otp_codes
        SET is_used = TRUE, used_at = NOW()
        WHERE id = (
            SELECT id FROM otp_codes
            WHERE phone_number = $1
              AND code_hash = $2
              AND purpose = $3
              AND is_used = FALSE
              AND expires_at > NOW()
            ORDER BY created_at DESC
            LIMIT 1
        )
        AND is_used = FALSE
        "#,
    )
    .bind(phone_number)
    .bind(hash_token(code))
    .bind(purpose)
    .execute(&mut *conn)
    .await?;

    if result.rows_affected() == 0 {
        return Err(AuthError::InvalidOtp);
    }

    Ok(())
}

async fn create_empty_profile(
    tx: &mut Transaction<'_, Postgres>,
    user_id: Uuid,
    role: UserRole,
) -> Result<(), sqlx::Error> {
    let sql = match role {
        UserRole::Farmer => {
            "INSERT INTO farmer_profiles (user_id) VALUES ($1) ON CONFLICT (user_id) DO NOTHING"
        }
        UserRole::Buyer => {
            "INSERT INTO buyer_profiles (user_id) VALUES ($1) ON CONFLICT (user_id) DO NOTHING"
        }
        UserRole::Admin => return Ok(()),
    };

    sqlx::query(sql).bind(user_id).execute(&mut **tx).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::StatusCode;

    #[test]
    fn test_auth_errors_map_to_statuses() {
        let cases = [
            (AuthError::InvalidOtp, StatusCode::UNAUTHORIZED),
            (AuthError::InvalidCredentials, StatusCode::UNAUTHORIZED),
            (AuthError::AccountDeactivated, StatusCode::UNAUTHORIZED),
            (AuthError::Token(JwtError::TokenExpired), StatusCode::UNAUTHORIZED),
            (AuthError::UserNotFound, StatusCode::NOT_FOUND),
            (AuthError::AlreadyRegistered, StatusCode::CONFLICT),
            (AuthError::PasswordAlreadySet, StatusCode::CONFLICT),
            (AuthError::InvalidRole, StatusCode::BAD_REQUEST),
            (AuthError::PhoneNotVerified, StatusCode::UNAUTHORIZED),
            (AuthError::PhoneMismatch, StatusCode::FORBIDDEN),
            (
                AuthError::Hashing("boom".to_string()),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];

        for (err, status) in cases {
            assert_eq!(ApiError::from(err).status_code(), status);
        }
    }

    #[test]
    fn test_jwt_messages_surface_to_clients() {
        let err = ApiError::from(AuthError::Token(JwtError::TokenExpired));
        assert_eq!(err.to_string(), "Token has expired");

        let err = ApiError::from(AuthError::Token(JwtError::TokenNotYetValid));
        assert_eq!(err.to_string(), "Token not yet valid");
    }

    #[test]
    fn test_login_failures_share_one_message() {
        assert_eq!(
            AuthError::InvalidCredentials.to_string(),
            "Invalid phone number or password"
        );
    }
}
