//! JWT token generation and validation
//!
//! Handles creation and verification of access and refresh tokens. Access and
//! refresh tokens are signed with different secrets.

use chrono::{Duration, Utc};
use jsonwebtoken::{
    decode, encode, errors::ErrorKind, DecodingKey, EncodingKey, Header, Validation,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::models::User;

/// JWT-related errors
#[derive(Error, Debug, PartialEq, Eq)]
pub enum JwtError {
    #[error("Token encoding failed: {0}")]
    EncodingFailed(String),

    #[error("Token has expired")]
    TokenExpired,

    #[error("Token not yet valid")]
    TokenNotYetValid,

    #[error("Invalid token")]
    InvalidToken,

    #[error("Invalid token type")]
    WrongTokenType,
}

/// JWT claims shared by access and refresh tokens
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Claims {
    /// Subject (user ID)
    pub sub: String,
    /// User role at issuance
    pub role: String,
    /// Phone number at issuance
    pub phone: String,
    /// JWT ID, makes every issued token distinct
    pub jti: String,
    /// Issued at (Unix timestamp)
    pub iat: i64,
    /// Not before (Unix timestamp)
    pub nbf: i64,
    /// Expiration (Unix timestamp)
    pub exp: i64,
    /// Token type (access or refresh)
    pub token_type: String,
}

impl Claims {
    pub fn user_id(&self) -> Result<Uuid, JwtError> {
        Uuid::parse_str(&self.sub).map_err(|_| JwtError::InvalidToken)
    }
}

/// Token type enum
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenType {
    Access,
    Refresh,
}

impl TokenType {
    pub fn as_str(&self) -> &'static str {
        match self {
            TokenType::Access => "access",
            TokenType::Refresh => "refresh",
        }
    }
}

/// Generate an access token for a user
pub fn generate_access_token(user: &User, secret: &str, ttl_seconds: i64) -> Result<String, JwtError> {
    generate_token(user, secret, ttl_seconds, TokenType::Access)
}

/// Generate a refresh token for a user
pub fn generate_refresh_token(user: &User, secret: &str, ttl_days: i64) -> Result<String, JwtError> {
    let ttl_seconds = ttl_days * 24 * 60 * 60;
    generate_token(user, secret, ttl_seconds, TokenType::Refresh)
}

fn generate_token(
    user: &User,
    secret: &str,
    ttl_seconds: i64,
    token_type: TokenType,
) -> Result<String, JwtError> {
    let now = Utc::now();
    let exp = now + Duration::seconds(ttl_seconds);

    let claims = Claims {
        sub: user.id.to_string(),
        role: user.role.as_str().to_string(),
        phone: user.phone_number.clone(),
        jti: Uuid::new_v4().to_string(),
        iat: now.timestamp(),
        nbf: now.timestamp(),
        exp: exp.timestamp(),
        token_type: token_type.as_str().to_string(),
    };

    encode_claims(&claims, secret)
}

fn encode_claims(claims: &Claims, secret: &str) -> Result<String, JwtError> {
    encode(
        &Header::default(),
        claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
    .map_err(|e| JwtError::EncodingFailed(e.to_string()))
}

/// Verify and decode a JWT token of the expected type
pub fn verify_token(token: &str, secret: &str, expected: TokenType) -> Result<Claims, JwtError> {
    let mut validation = Validation::default();
    validation.validate_exp = true;
    validation.validate_nbf = true;

    let token_data = decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &validation,
    )
    .map_err(|e| match e.kind() {
        ErrorKind::ExpiredSignature => JwtError::TokenExpired,
        ErrorKind::ImmatureSignature => JwtError::TokenNotYetValid,
        _ => JwtError::InvalidToken,
    })?;

    if token_data.claims.token_type != expected.as_str() {
        return Err(JwtError::WrongTokenType);
    }

    Ok(token_data.claims)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Language, UserRole};

    fn create_test_user() -> User {
        User {
            id: Uuid::new_v4(),
            phone_number: "+251911234567".to_string(),
            email: None,
            password_hash: None,
            first_name: "Almaz".to_string(),
            last_name: "Tesfaye".to_string(),
            role: UserRole::Farmer,
            language: Language::Am,
            is_verified: true,
            is_active: true,
            last_login_at: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn test_generate_access_token() {
        let user = create_test_user();
        let secret = "test-secret-key";

        let token = generate_access_token(&user, secret, 900).unwrap();
        let claims = verify_token(&token, secret, TokenType::Access).unwrap();

        assert_eq!(claims.user_id().unwrap(), user.id);
        assert_eq!(claims.role, "FARMER");
        assert_eq!(claims.phone, user.phone_number);
        assert_eq!(claims.token_type, "access");
    }

    #[test]
    fn test_refresh_token_is_not_an_access_token() {
        let user = create_test_user();
        let secret = "test-secret-key";

        let token = generate_refresh_token(&user, secret, 7).unwrap();
        assert!(verify_token(&token, secret, TokenType::Refresh).is_ok());
        assert_eq!(
            verify_token(&token, secret, TokenType::Access).unwrap_err(),
            JwtError::WrongTokenType
        );
    }

    #[test]
    fn test_tokens_are_unique_per_issue() {
        let user = create_test_user();
        let a = generate_refresh_token(&user, "s", 7).unwrap();
        let b = generate_refresh_token(&user, "s", 7).unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn test_expired_token() {
        let user = create_test_user();
        let token = generate_access_token(&user, "secret", -600).unwrap();
        assert_eq!(
            verify_token(&token, "secret", TokenType::Access).unwrap_err(),
            JwtError::TokenExpired
        );
    }

    #[test]
    fn test_not_yet_valid_token() {
        let now = Utc::now().timestamp();
        let claims = Claims {
            sub: Uuid::new_v4().to_string(),
            role: "BUYER".to_string(),
            phone: "+251911234567".to_string(),
            jti: Uuid::new_v4().to_string(),
            iat: now,
            nbf: now + 3600,
            exp: now + 7200,
            token_type: "access".to_string(),
        };
        let token = encode_claims(&claims, "secret").unwrap();
        assert_eq!(
            verify_token(&token, "secret", TokenType::Access).unwrap_err(),
            JwtError::TokenNotYetValid
        );
    }

    #[test]
    fn test_invalid_token() {
        let result = verify_token("invalid.token.here", "secret", TokenType::Access);
        assert_eq!(result.unwrap_err(), JwtError::InvalidToken);
    }

    #[test]
    fn test_wrong_secret() {
        let user = create_test_user();
        let token = generate_access_token(&user, "secret1", 900).unwrap();
        assert!(verify_token(&token, "secret2", TokenType::Access).is_err());
    }
}
