//! In-app notifications
//!
//! Lifecycle changes write notifications inside their own transaction; the
//! rows are pushed over the realtime channel once the transaction commits.

mod model;
mod service;

pub use model::*;
pub use service::{insert_notification, NotificationService};
