//! User profiles and account administration

mod model;
mod service;

pub use model::*;
pub use service::UserService;
