//! Middleware for the AgriLink API
//!
//! Request tracing, security headers and authentication extractors.

pub mod auth;
mod security;
mod tracing;

pub use auth::{AdminUser, AuthenticatedUser, FarmerUser, OptionalUser};
pub use security::{hsts_header, redact_internal_errors, security_headers};
pub use tracing::{request_tracing, REQUEST_ID_HEADER};
