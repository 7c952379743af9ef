//! Authentication module for AgriLink
//!
//! - One-time codes over SMS (hashed at rest, single use)
//! - Password login with bcrypt
//! - JWT access tokens and rotating refresh tokens

mod crypto;
mod jwt;
mod service;

pub use crypto::{hash_token, OTP_LENGTH};
pub use jwt::{generate_access_token, generate_refresh_token, verify_token, Claims, JwtError, TokenType};
pub use service::{AuthError, AuthService};
