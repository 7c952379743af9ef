//! Product catalog

mod model;
mod service;

pub use model::*;
pub use service::{resolve_status, CatalogService};
