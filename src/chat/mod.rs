//! Direct messaging between users

mod model;
mod service;

pub use model::*;
pub use service::ChatService;
