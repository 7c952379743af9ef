//! Payment service layer - checkout, gateway callbacks and escrow

use chrono::{DateTime, Utc};
use serde_json::json;
use sqlx::{PgConnection, PgPool};
use uuid::Uuid;

use crate::error::{ApiError, ApiResult};
use crate::middleware::AuthenticatedUser;
use crate::notifications::{
    insert_notification, NewNotification, Notification, NotificationService, NotificationType,
};
use crate::orders::{lock_order, transition_order, Actor, Order, OrderStatus};

use super::model::{
    EscrowStatus, GatewayOutcome, Payment, PaymentMethod, PaymentStatus, ReleaseFailure,
    ReleaseSummary, WebhookPayload,
};
use super::webhook::{WebhookError, WebhookVerifier};

/// Due payments fetched per round trip of the auto-release sweep
const RELEASE_BATCH_SIZE: i64 = 100;

/// Create the escrow-backed payment for a freshly placed order
pub async fn create_payment_for_order(
    conn: &mut PgConnection,
    order: &Order,
    escrow_release_days: i64,
) -> ApiResult<Payment> {
    let existing: Option<Uuid> = sqlx::query_scalar("SELECT id FROM payments WHERE order_id = $1")
        .bind(order.id)
        .fetch_optional(&mut *conn)
        .await?;
    if existing.is_some() {
        return Err(ApiError::Conflict(
            "A payment already exists for this order".to_string(),
        ));
    }

    // NOW() is the transaction start, so the release time is exactly
    // created_at + escrow_release_days
    let payment = sqlx::query_as::<_, Payment>(
        r#"
        INSERT INTO payments (
            id, order_id, buyer_id, farmer_id, amount, status, escrow_status, escrow_release_at
        )
        VALUES ($1, $2, $3, $4, $5, $6, $7, NOW() + make_interval(days => $8::int))
        RETURNING *
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(order.id)
    .bind(order.buyer_id)
    .bind(order.farmer_id)
    .bind(order.payable_amount())
    .bind(PaymentStatus::Pending)
    .bind(EscrowStatus::Held)
    .bind(escrow_release_days)
    .fetch_one(&mut *conn)
    .await?;

    Ok(payment)
}

async fn lock_payment(conn: &mut PgConnection, payment_id: Uuid) -> ApiResult<Payment> {
    sqlx::query_as::<_, Payment>("SELECT * FROM payments WHERE id = $1 FOR UPDATE")
        .bind(payment_id)
        .fetch_optional(conn)
        .await?
        .ok_or_else(|| ApiError::NotFound("Payment not found".to_string()))
}

pub async fn lock_payment_for_order(conn: &mut PgConnection, order_id: Uuid) -> ApiResult<Payment> {
    sqlx::query_as::<_, Payment>("SELECT * FROM payments WHERE order_id = $1 FOR UPDATE")
        .bind(order_id)
        .fetch_optional(conn)
        .await?
        .ok_or_else(|| ApiError::NotFound("Payment not found".to_string()))
}

/// Refund a captured payment that is still held in escrow
pub async fn refund_locked(
    conn: &mut PgConnection,
    payment: &Payment,
    reason: Option<&str>,
) -> ApiResult<Payment> {
    if !payment.is_releasable() {
        return Err(ApiError::ValidationError(
            "Only completed payments held in escrow can be refunded".to_string(),
        ));
    }

    let refunded = sqlx::query_as::<_, Payment>(
        r#"
        UPDATE payments
        SET status = 'REFUNDED', escrow_status = 'REFUNDED', refunded_at = NOW(), updated_at = NOW()
        WHERE id = $1 AND status = 'COMPLETED' AND escrow_status = 'HELD'
        RETURNING *
        "#,
    )
    .bind(payment.id)
    .fetch_optional(&mut *conn)
    .await?
    .ok_or_else(|| ApiError::Conflict("Payment was changed concurrently".to_string()))?;

    request_gateway_refund(&refunded, reason);

    Ok(refunded)
}

/// Settle the payment of an order that is being cancelled.
///
/// Captured funds are refunded; a payment that never completed is marked
/// failed and its escrow closed.
pub async fn void_for_cancellation(
    conn: &mut PgConnection,
    order_id: Uuid,
) -> ApiResult<Option<Payment>> {
    let payment = sqlx::query_as::<_, Payment>("SELECT * FROM payments WHERE order_id = $1 FOR UPDATE")
        .bind(order_id)
        .fetch_optional(&mut *conn)
        .await?;

    let Some(payment) = payment else {
        return Ok(None);
    };

    match payment.status {
        PaymentStatus::Completed if payment.escrow_status == EscrowStatus::Held => {
            refund_locked(conn, &payment, Some("Order cancelled"))
                .await
                .map(Some)
        }
        PaymentStatus::Pending | PaymentStatus::Processing => {
            let voided = sqlx::query_as::<_, Payment>(
                r#"
                UPDATE payments
                SET status = 'FAILED', escrow_status = 'REFUNDED', updated_at = NOW()
                WHERE id = $1
                RETURNING *
                "#,
            )
            .bind(payment.id)
            .fetch_one(&mut *conn)
            .await?;
            Ok(Some(voided))
        }
        _ => Ok(Some(payment)),
    }
}

/// Gateway refunds are not integrated yet; the request is only logged
fn request_gateway_refund(payment: &Payment, reason: Option<&str>) {
    tracing::info!(
        payment_id = %payment.id,
        transaction_id = ?payment.transaction_id,
        amount = payment.amount,
        reason = ?reason,
        "Gateway refund requested"
    );
}

fn generate_transaction_id() -> String {
    format!("AGL-TX-{}", Uuid::new_v4().simple().to_string().to_uppercase())
}

/// Payment service for checkout and escrow management
#[derive(Clone)]
pub struct PaymentService {
    db_pool: PgPool,
    notifications: NotificationService,
    checkout_base_url: String,
    webhook: Option<WebhookVerifier>,
}

impl PaymentService {
    pub fn new(
        db_pool: PgPool,
        notifications: NotificationService,
        checkout_base_url: String,
        webhook: Option<WebhookVerifier>,
    ) -> Self {
        Self {
            db_pool,
            notifications,
            checkout_base_url,
            webhook,
        }
    }

    /// Payment details; parties or admins only
    pub async fn get_payment(&self, id: Uuid, user: &AuthenticatedUser) -> ApiResult<Payment> {
        let payment = sqlx::query_as::<_, Payment>("SELECT * FROM payments WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.db_pool)
            .await?
            .ok_or_else(|| ApiError::NotFound("Payment not found".to_string()))?;

        if !payment.is_party(user.user_id) && !user.is_admin() {
            return Err(ApiError::Forbidden(
                "You do not have access to this payment".to_string(),
            ));
        }

        Ok(payment)
    }

    /// Start checkout for a pending payment
    pub async fn initialize_payment(
        &self,
        id: Uuid,
        user: &AuthenticatedUser,
        method: PaymentMethod,
    ) -> ApiResult<Payment> {
        let mut tx = self.db_pool.begin().await?;

        let payment = lock_payment(&mut tx, id).await?;
        if payment.buyer_id != user.user_id {
            return Err(ApiError::Forbidden(
                "Only the buyer can pay for this order".to_string(),
            ));
        }
        if payment.status != PaymentStatus::Pending {
            return Err(ApiError::ValidationError(format!(
                "Payment cannot be initialized from {:?}",
                payment.status
            )));
        }

        let order = lock_order(&mut tx, payment.order_id).await?;
        if order.status.is_terminal() {
            return Err(ApiError::ValidationError(
                "Order is no longer awaiting payment".to_string(),
            ));
        }

        let transaction_id = generate_transaction_id();
        let checkout_url = format!(
            "{}/{}",
            self.checkout_base_url.trim_end_matches('/'),
            transaction_id
        );

        let payment = sqlx::query_as::<_, Payment>(
            r#"
            UPDATE payments
            SET method = $2, status = 'PROCESSING', transaction_id = $3, checkout_url = $4,
                amount = $5, updated_at = NOW()
            WHERE id = $1 AND status = 'PENDING'
            RETURNING *
            "#,
        )
        .bind(payment.id)
        .bind(method)
        .bind(&transaction_id)
        .bind(&checkout_url)
        .bind(order.payable_amount())
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| ApiError::Conflict("Payment was changed concurrently".to_string()))?;

        if order.status.can_transition_to(OrderStatus::PaymentPending) {
            transition_order(&mut tx, &order, OrderStatus::PaymentPending, Actor::System, None)
                .await?;
        }

        tx.commit().await?;

        tracing::info!(
            payment_id = %payment.id,
            transaction_id = %transaction_id,
            method = ?method,
            "Payment initialized"
        );

        Ok(payment)
    }

    /// Verify and apply a signed gateway callback
    pub async fn handle_webhook(&self, body: &[u8], signature: Option<&str>) -> ApiResult<Payment> {
        let verifier = self.webhook.as_ref().ok_or(WebhookError::NotConfigured)?;
        verifier.verify(body, signature)?;

        let payload: WebhookPayload = serde_json::from_slice(body)
            .map_err(|e| ApiError::BadRequest(format!("Invalid webhook payload: {}", e)))?;

        self.apply_gateway_outcome(payload).await
    }

    async fn apply_gateway_outcome(&self, payload: WebhookPayload) -> ApiResult<Payment> {
        let mut tx = self.db_pool.begin().await?;

        let payment = sqlx::query_as::<_, Payment>(
            "SELECT * FROM payments WHERE transaction_id = $1 FOR UPDATE",
        )
        .bind(&payload.transaction_id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| ApiError::NotFound("Payment not found".to_string()))?;

        let mut notifications = Vec::new();

        let payment = match (payload.status, payment.status) {
            (GatewayOutcome::Success, PaymentStatus::Completed)
            | (GatewayOutcome::Failed, PaymentStatus::Failed) => {
                tracing::debug!(payment_id = %payment.id, "Duplicate gateway callback ignored");
                return Ok(payment);
            }
            (GatewayOutcome::Success, PaymentStatus::Processing) => {
                let completed = sqlx::query_as::<_, Payment>(
                    r#"
                    UPDATE payments
                    SET status = 'COMPLETED', paid_at = NOW(), gateway_data = $2, updated_at = NOW()
                    WHERE id = $1
                    RETURNING *
                    "#,
                )
                .bind(payment.id)
                .bind(&payload.gateway_data)
                .fetch_one(&mut *tx)
                .await?;

                let order = lock_order(&mut tx, completed.order_id).await?;
                if order.status.can_transition_to(OrderStatus::Paid) {
                    transition_order(&mut tx, &order, OrderStatus::Paid, Actor::System, None)
                        .await?;
                } else {
                    tracing::warn!(
                        order_id = %order.id,
                        status = ?order.status,
                        "Payment completed for an order that is not awaiting payment"
                    );
                }

                let data = json!({ "orderId": order.id, "paymentId": completed.id });
                notifications.push(
                    insert_notification(
                        &mut tx,
                        NewNotification::new(
                            completed.farmer_id,
                            NotificationType::PaymentReceived,
                            "Payment received",
                            format!(
                                "Payment for order {} is held in escrow",
                                order.order_number
                            ),
                        )
                        .with_data(data.clone()),
                    )
                    .await?,
                );
                notifications.push(
                    insert_notification(
                        &mut tx,
                        NewNotification::new(
                            completed.buyer_id,
                            NotificationType::PaymentReceived,
                            "Payment confirmed",
                            format!("Your payment for order {} was confirmed", order.order_number),
                        )
                        .with_data(data),
                    )
                    .await?,
                );

                completed
            }
            (GatewayOutcome::Failed, PaymentStatus::Processing) => {
                let failed = sqlx::query_as::<_, Payment>(
                    r#"
                    UPDATE payments
                    SET status = 'FAILED', gateway_data = $2, updated_at = NOW()
                    WHERE id = $1
                    RETURNING *
                    "#,
                )
                .bind(payment.id)
                .bind(&payload.gateway_data)
                .fetch_one(&mut *tx)
                .await?;

                notifications.push(
                    insert_notification(
                        &mut tx,
                        NewNotification::new(
                            failed.buyer_id,
                            NotificationType::PaymentFailed,
                            "Payment failed",
                            "Your payment could not be completed",
                        )
                        .with_data(json!({ "orderId": failed.order_id, "paymentId": failed.id })),
                    )
                    .await?,
                );

                failed
            }
            (outcome, status) => {
                tracing::warn!(
                    payment_id = %payment.id,
                    outcome = ?outcome,
                    status = ?status,
                    "Gateway callback does not match payment state"
                );
                return Err(ApiError::Conflict(format!(
                    "Payment is {:?} and cannot accept this callback",
                    status
                )));
            }
        };

        tx.commit().await?;

        tracing::info!(
            payment_id = %payment.id,
            status = ?payment.status,
            "Gateway callback applied"
        );

        self.notifications.publish(notifications);

        Ok(payment)
    }

    /// Release escrow to the farmer; the buyer or an admin may do this
    pub async fn release_escrow(&self, id: Uuid, user: &AuthenticatedUser) -> ApiResult<Payment> {
        let mut tx = self.db_pool.begin().await?;

        let payment = lock_payment(&mut tx, id).await?;
        let actor = if payment.buyer_id == user.user_id {
            Actor::Buyer
        } else if user.is_admin() {
            Actor::Admin
        } else {
            return Err(ApiError::Forbidden(
                "Only the buyer or an admin can release escrow".to_string(),
            ));
        };

        let (released, notifications) = release_locked(&mut tx, &payment, actor).await?;
        tx.commit().await?;

        self.notifications.publish(notifications);

        Ok(released)
    }

    /// Release every payment whose escrow period has elapsed.
    ///
    /// Due payments are walked in batches ordered by `(escrow_release_at, id)`.
    /// Each payment is released in its own transaction; one failure does not
    /// stop the rest of the sweep.
    pub async fn auto_release_escrow(&self) -> ApiResult<ReleaseSummary> {
        let mut summary = ReleaseSummary::default();
        let mut cursor: Option<(DateTime<Utc>, Uuid)> = None;

        loop {
            let batch = self.due_batch(cursor).await?;
            let Some(&last) = batch.last() else {
                break;
            };
            cursor = Some(last);

            for &(_, payment_id) in &batch {
                match self.auto_release_one(payment_id).await {
                    Ok(true) => summary.released.push(payment_id),
                    Ok(false) => {}
                    Err(e) => {
                        tracing::error!(payment_id = %payment_id, error = %e, "Escrow auto-release failed");
                        summary.failed.push(ReleaseFailure {
                            payment_id,
                            error: e.to_string(),
                        });
                    }
                }
            }

            if batch.len() < RELEASE_BATCH_SIZE as usize {
                break;
            }
        }

        tracing::info!(
            released = summary.released.len(),
            failed = summary.failed.len(),
            "Escrow auto-release sweep finished"
        );

        Ok(summary)
    }

    /// Next page of due payments strictly after `cursor`
    async fn due_batch(
        &self,
        cursor: Option<(DateTime<Utc>, Uuid)>,
    ) -> ApiResult<Vec<(DateTime<Utc>, Uuid)>> {
        let (after_at, after_id) = cursor.unzip();
        let batch = sqlx::query_as(
            r#"
            SELECT escrow_release_at, id FROM payments
            WHERE escrow_status = 'HELD' AND status = 'COMPLETED' AND escrow_release_at <= NOW()
              AND ($1::timestamptz IS NULL OR (escrow_release_at, id) > ($1, $2::uuid))
            ORDER BY escrow_release_at, id
            LIMIT $3
            "#,
        )
        .bind(after_at)
        .bind(after_id)
        .bind(RELEASE_BATCH_SIZE)
        .fetch_all(&self.db_pool)
        .await?;

        Ok(batch)
    }

    async fn auto_release_one(&self, payment_id: Uuid) -> ApiResult<bool> {
        let mut tx = self.db_pool.begin().await?;

        let payment = lock_payment(&mut tx, payment_id).await?;
        // Re-check under the lock; the payment may have moved since selection
        if !payment.is_due_for_release(Utc::now()) {
            return Ok(false);
        }

        let (_, notifications) = release_locked(&mut tx, &payment, Actor::System).await?;
        tx.commit().await?;

        self.notifications.publish(notifications);

        Ok(true)
    }

    /// Refund a captured payment (admin)
    pub async fn refund_payment(
        &self,
        id: Uuid,
        admin: &AuthenticatedUser,
        reason: Option<&str>,
    ) -> ApiResult<Payment> {
        let mut tx = self.db_pool.begin().await?;

        let payment = lock_payment(&mut tx, id).await?;
        let refunded = refund_locked(&mut tx, &payment, reason).await?;

        let order = lock_order(&mut tx, refunded.order_id).await?;
        if order.status.can_transition_to(OrderStatus::Refunded) {
            transition_order(&mut tx, &order, OrderStatus::Refunded, Actor::System, None).await?;
        }

        let mut notifications = Vec::new();
        for recipient in [refunded.buyer_id, refunded.farmer_id] {
            notifications.push(
                insert_notification(
                    &mut tx,
                    NewNotification::new(
                        recipient,
                        NotificationType::PaymentRefunded,
                        "Payment refunded",
                        format!("The payment for order {} was refunded", order.order_number),
                    )
                    .with_data(json!({
                        "orderId": order.id,
                        "paymentId": refunded.id,
                        "reason": reason,
                    })),
                )
                .await?,
            );
        }

        tx.commit().await?;

        tracing::info!(payment_id = %refunded.id, admin_id = %admin.user_id, "Payment refunded");

        self.notifications.publish(notifications);

        Ok(refunded)
    }
}

/// Release a locked payment and deliver its order when it is in transit
async fn release_locked(
    conn: &mut PgConnection,
    payment: &Payment,
    actor: Actor,
) -> ApiResult<(Payment, Vec<Notification>)> {
    if !payment.is_releasable() {
        return Err(ApiError::ValidationError(
            "Escrow can only be released for completed payments held in escrow".to_string(),
        ));
    }

    let released = sqlx::query_as::<_, Payment>(
        r#"
        UPDATE payments
        SET escrow_status = 'RELEASED', released_at = NOW(), updated_at = NOW()
        WHERE id = $1 AND status = 'COMPLETED' AND escrow_status = 'HELD'
        RETURNING *
        "#,
    )
    .bind(payment.id)
    .fetch_optional(&mut *conn)
    .await?
    .ok_or_else(|| ApiError::Conflict("Payment was changed concurrently".to_string()))?;

    let order = lock_order(&mut *conn, released.order_id).await?;
    if matches!(order.status, OrderStatus::Shipped | OrderStatus::InTransit) {
        transition_order(&mut *conn, &order, OrderStatus::Delivered, actor, None).await?;
    }

    let notification = insert_notification(
        &mut *conn,
        NewNotification::new(
            released.farmer_id,
            NotificationType::EscrowReleased,
            "Funds released",
            format!(
                "Escrow for order {} was released to you",
                order.order_number
            ),
        )
        .with_data(json!({ "orderId": order.id, "paymentId": released.id, "amount": released.amount })),
    )
    .await?;

    tracing::info!(
        payment_id = %released.id,
        order_id = %order.id,
        actor = ?actor,
        "Escrow released"
    );

    Ok((released, vec![notification]))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transaction_id_shape() {
        let id = generate_transaction_id();
        assert!(id.starts_with("AGL-TX-"));
        assert_eq!(id.len(), "AGL-TX-".len() + 32);
        assert!(id["AGL-TX-".len()..]
            .chars()
            .all(|c| c.is_ascii_hexdigit() && !c.is_ascii_lowercase()));
    }
}
