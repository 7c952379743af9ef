//! Reviews and rating aggregation

mod model;
mod service;

pub use model::*;
pub use service::ReviewService;
