//! Orders: multi-vendor placement and the order lifecycle

mod model;
mod planner;
mod service;

pub use model::*;
pub use planner::{generate_order_number, plan_orders, PlannedItem, PlannedOrder};
pub use service::{lock_order, transition_order, OrderService};
