//! Payments with escrow
//!
//! A payment moves PENDING -> PROCESSING -> COMPLETED (or FAILED) through
//! checkout and the gateway callback. Escrow is a separate axis: funds stay
//! HELD until the buyer or an admin releases them, the release date passes,
//! or the payment is refunded.

mod escrow_release;
mod model;
mod service;
mod webhook;

pub use escrow_release::start_escrow_release_job;
pub use model::*;
pub use service::{
    create_payment_for_order, lock_payment_for_order, refund_locked, void_for_cancellation,
    PaymentService,
};
pub use webhook::{WebhookError, WebhookVerifier, SIGNATURE_HEADER};
