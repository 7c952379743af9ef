//! HTTP handlers for the AgriLink API

pub mod auth;
pub mod chat;
pub mod health;
pub mod notifications;
pub mod orders;
pub mod payments;
pub mod products;
pub mod reviews;
pub mod users;

pub use health::{health_check, root};

// Extractors used across handlers
pub use crate::middleware::auth::{AdminUser, AuthenticatedUser, FarmerUser, OptionalUser};
