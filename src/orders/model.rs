//! Order models and the order state machine

use serde::{Deserialize, Serialize};
use sqlx::types::chrono::{DateTime, Utc};
use thiserror::Error;
use uuid::Uuid;
use validator::Validate;

use crate::catalog::validate_price;
use crate::error::ApiError;
use crate::payments::Payment;

#[derive(Debug, Serialize, Deserialize, sqlx::Type, Clone, Copy, PartialEq, Eq, Hash)]
#[sqlx(type_name = "order_status", rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderStatus {
    Pending,
    Confirmed,
    PaymentPending,
    Paid,
    Processing,
    Shipped,
    InTransit,
    Delivered,
    Cancelled,
    Disputed,
    Refunded,
}

/// Who is asking for a status change
#[derive(Debug, Serialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Actor {
    Buyer,
    Farmer,
    Admin,
    /// Payment callbacks and background jobs
    System,
}

#[derive(Error, Debug, PartialEq, Eq)]
pub enum TransitionError {
    #[error("Cannot change order status from {from:?} to {to:?}")]
    Illegal { from: OrderStatus, to: OrderStatus },

    #[error("{actor:?} is not allowed to move an order to {to:?}")]
    NotPermitted { actor: Actor, to: OrderStatus },
}

impl From<TransitionError> for ApiError {
    fn from(err: TransitionError) -> Self {
        match err {
            TransitionError::Illegal { .. } => ApiError::ValidationError(err.to_string()),
            TransitionError::NotPermitted { .. } => ApiError::Forbidden(err.to_string()),
        }
    }
}

impl OrderStatus {
    /// Actors allowed to perform `self -> next`; empty when the edge does not exist
    pub fn allowed_actors(&self, next: OrderStatus) -> &'static [Actor] {
        use Actor::*;
        use OrderStatus::*;

        match (self, next) {
            (Pending, Confirmed) => &[Farmer, Admin],
            (Pending, PaymentPending) => &[Buyer, System],
            (Pending, Cancelled) => &[Buyer, Farmer, Admin],
            (Confirmed, PaymentPending) => &[Buyer, System],
            (Confirmed, Cancelled) => &[Buyer, Farmer, Admin],
            (PaymentPending, Paid) => &[System],
            (PaymentPending, Cancelled) => &[Buyer, Admin],
            (Paid, Processing) => &[Farmer, Admin],
            (Paid, Disputed) => &[Buyer, Admin],
            (Paid, Cancelled) => &[Buyer, Farmer, Admin],
            (Processing, Shipped) => &[Farmer, Admin],
            (Processing, Cancelled) => &[Farmer, Admin],
            (Processing, Disputed) => &[Buyer, Admin],
            (Shipped, InTransit) => &[Farmer, Admin],
            (Shipped, Delivered) => &[Buyer, Admin, System],
            (Shipped, Disputed) => &[Buyer, Admin],
            (InTransit, Delivered) => &[Buyer, Farmer, Admin, System],
            (InTransit, Disputed) => &[Buyer, Admin],
            (Delivered, Disputed) => &[Buyer, Admin],
            (Disputed, Delivered) => &[Admin],
            (Disputed, Refunded) => &[Admin, System],
            _ => &[],
        }
    }

    pub fn can_transition_to(&self, next: OrderStatus) -> bool {
        !self.allowed_actors(next).is_empty()
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, OrderStatus::Cancelled | OrderStatus::Refunded)
    }

    /// Check a requested transition for a given actor
    pub fn check_transition(&self, next: OrderStatus, actor: Actor) -> Result<(), TransitionError> {
        let allowed = self.allowed_actors(next);
        if allowed.is_empty() {
            return Err(TransitionError::Illegal {
                from: *self,
                to: next,
            });
        }
        if !allowed.contains(&actor) {
            return Err(TransitionError::NotPermitted { actor, to: next });
        }
        Ok(())
    }
}

/// Order placed with a single farmer
#[derive(Debug, Serialize, sqlx::FromRow, Clone)]
#[serde(rename_all = "camelCase")]
pub struct Order {
    pub id: Uuid,
    pub order_number: String,
    pub buyer_id: Uuid,
    pub farmer_id: Uuid,
    pub status: OrderStatus,
    pub total_amount: i64,
    pub negotiated_price: Option<i64>,
    pub delivery_address: String,
    pub delivery_date: Option<DateTime<Utc>>,
    pub notes: Option<String>,
    pub cancel_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Order {
    /// Amount the buyer pays: the negotiated price when one was agreed
    pub fn payable_amount(&self) -> i64 {
        self.negotiated_price.unwrap_or(self.total_amount)
    }

    /// Role of `user_id` in this order, admins included
    pub fn actor_for(&self, user_id: Uuid, is_admin: bool) -> Option<Actor> {
        if user_id == self.buyer_id {
            Some(Actor::Buyer)
        } else if user_id == self.farmer_id {
            Some(Actor::Farmer)
        } else if is_admin {
            Some(Actor::Admin)
        } else {
            None
        }
    }

    /// The party on the other side of `actor`
    pub fn counterparties(&self, actor: Actor) -> Vec<Uuid> {
        match actor {
            Actor::Buyer => vec![self.farmer_id],
            Actor::Farmer => vec![self.buyer_id],
            Actor::Admin | Actor::System => vec![self.buyer_id, self.farmer_id],
        }
    }
}

#[derive(Debug, Serialize, sqlx::FromRow, Clone)]
#[serde(rename_all = "camelCase")]
pub struct OrderItem {
    pub id: Uuid,
    pub order_id: Uuid,
    pub product_id: Uuid,
    pub product_title: String,
    pub quantity: i32,
    pub unit_price: i64,
    pub total_price: i64,
    pub created_at: DateTime<Utc>,
}

/// Order with its line items and payment
#[derive(Debug, Serialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct OrderWithDetails {
    #[serde(flatten)]
    pub order: Order,
    pub items: Vec<OrderItem>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payment: Option<Payment>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct OrderItemInput {
    pub product_id: Uuid,
    pub quantity: i32,
    pub negotiated_price: Option<i64>,
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CreateOrderRequest {
    #[validate(length(min = 1, message = "Order must contain at least one item"))]
    pub items: Vec<OrderItemInput>,
    #[validate(length(min = 5, max = 500, message = "Delivery address is required"))]
    pub delivery_address: String,
    pub delivery_date: Option<DateTime<Utc>>,
    #[validate(length(max = 1000))]
    pub notes: Option<String>,
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct UpdateOrderStatusRequest {
    pub status: OrderStatus,
    #[validate(length(max = 500))]
    pub reason: Option<String>,
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct NegotiatePriceRequest {
    #[validate(custom = "validate_price")]
    pub negotiated_price: i64,
}

#[derive(Debug, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct ListOrdersQuery {
    pub status: Option<OrderStatus>,
    pub page: Option<i64>,
    pub limit: Option<i64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL: [OrderStatus; 11] = [
        OrderStatus::Pending,
        OrderStatus::Confirmed,
        OrderStatus::PaymentPending,
        OrderStatus::Paid,
        OrderStatus::Processing,
        OrderStatus::Shipped,
        OrderStatus::InTransit,
        OrderStatus::Delivered,
        OrderStatus::Cancelled,
        OrderStatus::Disputed,
        OrderStatus::Refunded,
    ];

    #[test]
    fn test_terminal_states_have_no_exits() {
        for from in [OrderStatus::Cancelled, OrderStatus::Refunded] {
            assert!(from.is_terminal());
            for to in ALL {
                assert!(!from.can_transition_to(to), "{:?} -> {:?}", from, to);
            }
        }
    }

    #[test]
    fn test_no_self_transitions() {
        for status in ALL {
            assert!(!status.can_transition_to(status));
        }
    }

    #[test]
    fn test_pending_cannot_jump_to_delivered() {
        let err = OrderStatus::Pending
            .check_transition(OrderStatus::Delivered, Actor::Admin)
            .unwrap_err();
        assert!(matches!(err, TransitionError::Illegal { .. }));
        assert_eq!(
            ApiError::from(err).status_code(),
            axum::http::StatusCode::BAD_REQUEST
        );
    }

    #[test]
    fn test_only_system_marks_paid() {
        for actor in [Actor::Buyer, Actor::Farmer, Actor::Admin] {
            let err = OrderStatus::PaymentPending
                .check_transition(OrderStatus::Paid, actor)
                .unwrap_err();
            assert_eq!(
                ApiError::from(err).status_code(),
                axum::http::StatusCode::FORBIDDEN
            );
        }
        assert!(OrderStatus::PaymentPending
            .check_transition(OrderStatus::Paid, Actor::System)
            .is_ok());
    }

    #[test]
    fn test_farmer_cannot_cancel_while_buyer_is_paying() {
        assert!(OrderStatus::Confirmed
            .check_transition(OrderStatus::Cancelled, Actor::Farmer)
            .is_ok());
        assert!(OrderStatus::PaymentPending
            .check_transition(OrderStatus::Cancelled, Actor::Farmer)
            .is_err());
    }

    #[test]
    fn test_paid_orders_can_still_be_cancelled() {
        for actor in [Actor::Buyer, Actor::Farmer, Actor::Admin] {
            assert!(OrderStatus::Paid
                .check_transition(OrderStatus::Cancelled, actor)
                .is_ok());
        }
        assert!(OrderStatus::Processing
            .check_transition(OrderStatus::Cancelled, Actor::Farmer)
            .is_ok());
        assert!(matches!(
            OrderStatus::Processing.check_transition(OrderStatus::Cancelled, Actor::Buyer),
            Err(TransitionError::NotPermitted { .. })
        ));
        assert!(matches!(
            OrderStatus::Shipped.check_transition(OrderStatus::Cancelled, Actor::Admin),
            Err(TransitionError::Illegal { .. })
        ));
    }

    #[test]
    fn test_payable_amount_prefers_negotiated_price() {
        let mut order = Order {
            id: Uuid::new_v4(),
            order_number: "AGL-TEST".to_string(),
            buyer_id: Uuid::new_v4(),
            farmer_id: Uuid::new_v4(),
            status: OrderStatus::Pending,
            total_amount: 450_000,
            negotiated_price: None,
            delivery_address: "Bole, Addis Ababa".to_string(),
            delivery_date: None,
            notes: None,
            cancel_reason: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };
        assert_eq!(order.payable_amount(), 450_000);
        order.negotiated_price = Some(420_000);
        assert_eq!(order.payable_amount(), 420_000);
    }

    #[test]
    fn test_actor_resolution() {
        let order = Order {
            id: Uuid::new_v4(),
            order_number: "AGL-TEST".to_string(),
            buyer_id: Uuid::new_v4(),
            farmer_id: Uuid::new_v4(),
            status: OrderStatus::Pending,
            total_amount: 1,
            negotiated_price: None,
            delivery_address: "Adama".to_string(),
            delivery_date: None,
            notes: None,
            cancel_reason: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };
        assert_eq!(order.actor_for(order.buyer_id, false), Some(Actor::Buyer));
        assert_eq!(order.actor_for(order.farmer_id, true), Some(Actor::Farmer));
        assert_eq!(order.actor_for(Uuid::new_v4(), true), Some(Actor::Admin));
        assert_eq!(order.actor_for(Uuid::new_v4(), false), None);
        assert_eq!(order.counterparties(Actor::Buyer), vec![order.farmer_id]);
    }
}
