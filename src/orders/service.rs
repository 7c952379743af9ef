//! Order service layer - order placement and lifecycle

use std::collections::HashMap;

use serde_json::json;
use sqlx::{PgConnection, PgPool, Postgres, QueryBuilder};
use uuid::Uuid;

use crate::catalog::Product;
use crate::error::{ApiError, ApiResult};
use crate::middleware::AuthenticatedUser;
use crate::models::{PageWindow, Pagination, UserRole};
use crate::notifications::{insert_notification, NewNotification, NotificationService, NotificationType};
use crate::payments::{self, Payment, PaymentStatus};

use super::model::{
    Actor, CreateOrderRequest, ListOrdersQuery, NegotiatePriceRequest, Order, OrderItem,
    OrderStatus, OrderWithDetails, UpdateOrderStatusRequest,
};
use super::planner::{generate_order_number, plan_orders};

/// Move an order along the state machine.
///
/// The write is a compare-and-set on the status the caller observed; a
/// concurrent change makes it fail with a conflict instead of overwriting.
pub async fn transition_order(
    conn: &mut PgConnection,
    order: &Order,
    next: OrderStatus,
    actor: Actor,
    cancel_reason: Option<&str>,
) -> ApiResult<Order> {
    order.status.check_transition(next, actor)?;

    let updated = sqlx::query_as::<_, Order>(
        r#"
        UPDATE orders
        SET status = $3, cancel_reason = COALESCE($4, cancel_reason), updated_at = NOW()
        WHERE id = $1 AND status = $2
        RETURNING *
        "#,
    )
    .bind(order.id)
    .bind(order.status)
    .bind(next)
    .bind(cancel_reason)
    .fetch_optional(&mut *conn)
    .await?
    .ok_or_else(|| ApiError::Conflict("Order status was changed concurrently".to_string()))?;

    tracing::info!(
        order_id = %order.id,
        from = ?order.status,
        to = ?next,
        actor = ?actor,
        "Order status changed"
    );

    Ok(updated)
}

/// Lock an order row for the rest of the transaction
pub async fn lock_order(conn: &mut PgConnection, order_id: Uuid) -> ApiResult<Order> {
    sqlx::query_as::<_, Order>("SELECT * FROM orders WHERE id = $1 FOR UPDATE")
        .bind(order_id)
        .fetch_optional(conn)
        .await?
        .ok_or_else(|| ApiError::NotFound("Order not found".to_string()))
}

async fn load_items(conn: &mut PgConnection, order_ids: &[Uuid]) -> ApiResult<Vec<OrderItem>> {
    let items = sqlx::query_as::<_, OrderItem>(
        "SELECT * FROM order_items WHERE order_id = ANY($1) ORDER BY created_at, id",
    )
    .bind(order_ids)
    .fetch_all(conn)
    .await?;

    Ok(items)
}

/// Put the stock of a cancelled order back on the shelf
async fn restore_stock(conn: &mut PgConnection, items: &[OrderItem]) -> ApiResult<()> {
    for item in items {
        sqlx::query(
            r#"
            UPDATE products
            SET quantity = quantity + $2,
                sold_quantity = GREATEST(sold_quantity - $2, 0),
                status = CASE WHEN status = 'SOLD_OUT' THEN 'ACTIVE'::product_status ELSE status END,
                updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(item.product_id)
        .bind(item.quantity)
        .execute(&mut *conn)
        .await?;
    }
    Ok(())
}

fn push_order_filters(
    builder: &mut QueryBuilder<'_, Postgres>,
    party_column: Option<&'static str>,
    user_id: Uuid,
    status: Option<OrderStatus>,
) {
    builder.push(" FROM orders WHERE 1=1");
    if let Some(column) = party_column {
        builder.push(format!(" AND {} = ", column));
        builder.push_bind(user_id);
    }
    if let Some(status) = status {
        builder.push(" AND status = ");
        builder.push_bind(status);
    }
}

fn status_label(status: OrderStatus) -> String {
    format!("{:?}", status)
        .chars()
        .enumerate()
        .flat_map(|(i, c)| {
            let space = (i > 0 && c.is_uppercase()).then_some(' ');
            space.into_iter().chain(c.to_lowercase())
        })
        .collect()
}

/// Order service for placement, listing and lifecycle changes
#[derive(Clone)]
pub struct OrderService {
    db_pool: PgPool,
    notifications: NotificationService,
    escrow_release_days: i64,
}

impl OrderService {
    pub fn new(db_pool: PgPool, notifications: NotificationService, escrow_release_days: i64) -> Self {
        Self {
            db_pool,
            notifications,
            escrow_release_days,
        }
    }

    /// Place a cart, split into one order per farmer.
    ///
    /// Everything happens in one transaction: a failed stock check leaves no
    /// orders, items, stock changes or payments behind.
    pub async fn create_order(
        &self,
        buyer: &AuthenticatedUser,
        req: CreateOrderRequest,
    ) -> ApiResult<Vec<OrderWithDetails>> {
        if buyer.role != UserRole::Buyer {
            return Err(ApiError::Forbidden("Only buyers can place orders".to_string()));
        }

        let product_ids: Vec<Uuid> = req.items.iter().map(|item| item.product_id).collect();

        let mut tx = self.db_pool.begin().await?;

        let products = sqlx::query_as::<_, Product>(
            r#"
            SELECT * FROM products
            WHERE id = ANY($1) AND status = 'ACTIVE'
            ORDER BY id
            FOR UPDATE
            "#,
        )
        .bind(&product_ids)
        .fetch_all(&mut *tx)
        .await?;

        let plans = plan_orders(buyer.user_id, &req.items, &products)?;

        let mut created = Vec::with_capacity(plans.len());
        let mut notifications = Vec::with_capacity(plans.len());

        for plan in plans {
            let order = sqlx::query_as::<_, Order>(
                r#"
                INSERT INTO orders (
                    id, order_number, buyer_id, farmer_id, status, total_amount,
                    delivery_address, delivery_date, notes
                )
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
                RETURNING *
                "#,
            )
            .bind(Uuid::new_v4())
            .bind(generate_order_number())
            .bind(buyer.user_id)
            .bind(plan.farmer_id)
            .bind(OrderStatus::Pending)
            .bind(plan.total_amount)
            .bind(req.delivery_address.trim())
            .bind(req.delivery_date)
            .bind(&req.notes)
            .fetch_one(&mut *tx)
            .await?;

            let mut items = Vec::with_capacity(plan.items.len());
            for planned in &plan.items {
                let item = sqlx::query_as::<_, OrderItem>(
                    r#"
                    INSERT INTO order_items (
                        id, order_id, product_id, product_title, quantity, unit_price, total_price
                    )
                    VALUES ($1, $2, $3, $4, $5, $6, $7)
                    RETURNING *
                    "#,
                )
                .bind(Uuid::new_v4())
                .bind(order.id)
                .bind(planned.product_id)
                .bind(&planned.product_title)
                .bind(planned.quantity)
                .bind(planned.unit_price)
                .bind(planned.total_price)
                .fetch_one(&mut *tx)
                .await?;

                let decremented = sqlx::query(
                    r#"
                    UPDATE products
                    SET quantity = quantity - $2,
                        sold_quantity = sold_quantity + $2,
                        status = CASE WHEN quantity - $2 = 0
                                      THEN 'SOLD_OUT'::product_status ELSE status END,
                        updated_at = NOW()
                    WHERE id = $1 AND quantity >= $2 AND status = 'ACTIVE'
                    "#,
                )
                .bind(planned.product_id)
                .bind(planned.quantity)
                .execute(&mut *tx)
                .await?;

                if decremented.rows_affected() == 0 {
                    return Err(ApiError::ValidationError(format!(
                        "Insufficient stock for {}",
                        planned.product_title
                    )));
                }

                items.push(item);
            }

            let payment =
                payments::create_payment_for_order(&mut tx, &order, self.escrow_release_days)
                    .await?;

            notifications.push(
                insert_notification(
                    &mut tx,
                    NewNotification::new(
                        order.farmer_id,
                        NotificationType::OrderPlaced,
                        "New order received",
                        format!("Order {} was placed for your products", order.order_number),
                    )
                    .with_data(json!({ "orderId": order.id, "orderNumber": order.order_number })),
                )
                .await?,
            );

            created.push(OrderWithDetails {
                order,
                items,
                payment: Some(payment),
            });
        }

        tx.commit().await?;

        tracing::info!(
            buyer_id = %buyer.user_id,
            orders = created.len(),
            "Orders placed"
        );

        self.notifications.publish(notifications);

        Ok(created)
    }

    /// Buyers see their purchases, farmers their sales, admins everything
    pub async fn list_orders(
        &self,
        user: &AuthenticatedUser,
        query: &ListOrdersQuery,
    ) -> ApiResult<(Vec<OrderWithDetails>, Pagination)> {
        let window = PageWindow::new(query.page, query.limit);

        let party_column = match user.role {
            UserRole::Buyer => Some("buyer_id"),
            UserRole::Farmer => Some("farmer_id"),
            UserRole::Admin => None,
        };

        let mut count_builder: QueryBuilder<Postgres> = QueryBuilder::new("SELECT COUNT(*)");
        push_order_filters(&mut count_builder, party_column, user.user_id, query.status);

        let mut list_builder: QueryBuilder<Postgres> = QueryBuilder::new("SELECT *");
        push_order_filters(&mut list_builder, party_column, user.user_id, query.status);

        let total: i64 = count_builder
            .build_query_scalar::<i64>()
            .fetch_one(&self.db_pool)
            .await?;

        list_builder.push(" ORDER BY created_at DESC LIMIT ");
        list_builder.push_bind(window.limit);
        list_builder.push(" OFFSET ");
        list_builder.push_bind(window.offset());

        let orders = list_builder
            .build_query_as::<Order>()
            .fetch_all(&self.db_pool)
            .await?;

        let ids: Vec<Uuid> = orders.iter().map(|o| o.id).collect();
        let mut conn = self.db_pool.acquire().await?;
        let mut items_by_order: HashMap<Uuid, Vec<OrderItem>> = HashMap::new();
        for item in load_items(&mut conn, &ids).await? {
            items_by_order.entry(item.order_id).or_default().push(item);
        }

        let details = orders
            .into_iter()
            .map(|order| OrderWithDetails {
                items: items_by_order.remove(&order.id).unwrap_or_default(),
                order,
                payment: None,
            })
            .collect();

        Ok((details, window.with_total(total)))
    }

    /// Order with items and payment; parties or admins only
    pub async fn get_order(&self, id: Uuid, user: &AuthenticatedUser) -> ApiResult<OrderWithDetails> {
        let order = sqlx::query_as::<_, Order>("SELECT * FROM orders WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.db_pool)
            .await?
            .ok_or_else(|| ApiError::NotFound("Order not found".to_string()))?;

        if order.actor_for(user.user_id, user.is_admin()).is_none() {
            return Err(ApiError::Forbidden(
                "You do not have access to this order".to_string(),
            ));
        }

        let mut conn = self.db_pool.acquire().await?;
        self.with_details(&mut conn, order).await
    }

    async fn with_details(&self, conn: &mut PgConnection, order: Order) -> ApiResult<OrderWithDetails> {
        let items = load_items(&mut *conn, &[order.id]).await?;
        let payment = sqlx::query_as::<_, Payment>("SELECT * FROM payments WHERE order_id = $1")
            .bind(order.id)
            .fetch_optional(&mut *conn)
            .await?;

        Ok(OrderWithDetails {
            order,
            items,
            payment,
        })
    }

    /// Apply a user-requested status change
    pub async fn update_status(
        &self,
        id: Uuid,
        user: &AuthenticatedUser,
        req: UpdateOrderStatusRequest,
    ) -> ApiResult<OrderWithDetails> {
        let mut tx = self.db_pool.begin().await?;

        let order = lock_order(&mut tx, id).await?;
        let actor = order
            .actor_for(user.user_id, user.is_admin())
            .ok_or_else(|| ApiError::Forbidden("You do not have access to this order".to_string()))?;

        order.status.check_transition(req.status, actor)?;

        let mut notifications = Vec::new();

        match req.status {
            OrderStatus::Cancelled => {
                let items = load_items(&mut tx, &[order.id]).await?;
                restore_stock(&mut tx, &items).await?;
                let voided = payments::void_for_cancellation(&mut tx, order.id).await?;
                if let Some(payment) = voided.filter(|p| p.status == PaymentStatus::Refunded) {
                    notifications.push(
                        insert_notification(
                            &mut tx,
                            NewNotification::new(
                                order.buyer_id,
                                NotificationType::PaymentRefunded,
                                "Payment refunded",
                                format!(
                                    "Order {} was cancelled and your payment refunded",
                                    order.order_number
                                ),
                            )
                            .with_data(json!({ "orderId": order.id, "paymentId": payment.id })),
                        )
                        .await?,
                    );
                }
            }
            OrderStatus::Refunded => {
                let payment = payments::lock_payment_for_order(&mut tx, order.id).await?;
                payments::refund_locked(&mut tx, &payment, req.reason.as_deref()).await?;
                notifications.push(
                    insert_notification(
                        &mut tx,
                        NewNotification::new(
                            order.buyer_id,
                            NotificationType::PaymentRefunded,
                            "Payment refunded",
                            format!("Your payment for order {} was refunded", order.order_number),
                        )
                        .with_data(json!({ "orderId": order.id, "paymentId": payment.id })),
                    )
                    .await?,
                );
            }
            _ => {}
        }

        let cancel_reason = (req.status == OrderStatus::Cancelled)
            .then_some(req.reason.as_deref())
            .flatten();
        let updated = transition_order(&mut tx, &order, req.status, actor, cancel_reason).await?;

        for recipient in updated.counterparties(actor) {
            notifications.push(
                insert_notification(
                    &mut tx,
                    NewNotification::new(
                        recipient,
                        NotificationType::OrderStatus,
                        "Order updated",
                        format!(
                            "Order {} is now {}",
                            updated.order_number,
                            status_label(updated.status)
                        ),
                    )
                    .with_data(json!({
                        "orderId": updated.id,
                        "status": updated.status,
                        "reason": req.reason,
                    })),
                )
                .await?,
            );
        }

        let details = self.with_details(&mut tx, updated).await?;
        tx.commit().await?;

        self.notifications.publish(notifications);

        Ok(details)
    }

    /// Propose a new total while the order is still pending; last write wins
    pub async fn negotiate_price(
        &self,
        id: Uuid,
        user: &AuthenticatedUser,
        req: NegotiatePriceRequest,
    ) -> ApiResult<OrderWithDetails> {
        if req.negotiated_price <= 0 {
            return Err(ApiError::ValidationError(
                "Negotiated price must be greater than 0".to_string(),
            ));
        }

        let mut tx = self.db_pool.begin().await?;

        let order = lock_order(&mut tx, id).await?;
        let actor = match order.actor_for(user.user_id, false) {
            Some(actor @ (Actor::Buyer | Actor::Farmer)) => actor,
            _ => {
                return Err(ApiError::Forbidden(
                    "Only the buyer or farmer can negotiate this order".to_string(),
                ))
            }
        };

        if order.status != OrderStatus::Pending {
            return Err(ApiError::ValidationError(
                "Price can only be negotiated while the order is pending".to_string(),
            ));
        }

        let updated = sqlx::query_as::<_, Order>(
            r#"
            UPDATE orders SET negotiated_price = $2, updated_at = NOW()
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(order.id)
        .bind(req.negotiated_price)
        .fetch_one(&mut *tx)
        .await?;

        sqlx::query(
            "UPDATE payments SET amount = $2, updated_at = NOW() WHERE order_id = $1 AND status = 'PENDING'",
        )
        .bind(updated.id)
        .bind(updated.payable_amount())
        .execute(&mut *tx)
        .await?;

        let mut notifications = Vec::new();
        for recipient in updated.counterparties(actor) {
            notifications.push(
                insert_notification(
                    &mut tx,
                    NewNotification::new(
                        recipient,
                        NotificationType::PriceNegotiation,
                        "Price proposal",
                        format!(
                            "A new price of {} santim was proposed for order {}",
                            req.negotiated_price, updated.order_number
                        ),
                    )
                    .with_data(json!({
                        "orderId": updated.id,
                        "negotiatedPrice": req.negotiated_price,
                    })),
                )
                .await?,
            );
        }

        let details = self.with_details(&mut tx, updated).await?;
        tx.commit().await?;

        self.notifications.publish(notifications);

        Ok(details)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_farmer_listing_filters_by_sales() {
        let mut builder: QueryBuilder<Postgres> = QueryBuilder::new("SELECT COUNT(*)");
        push_order_filters(
            &mut builder,
            Some("farmer_id"),
            Uuid::new_v4(),
            Some(OrderStatus::Paid),
        );
        assert_eq!(
            builder.sql(),
            "SELECT COUNT(*) FROM orders WHERE 1=1 AND farmer_id = $1 AND status = $2"
        );
    }

    #[test]
    fn test_status_label() {
        assert_eq!(status_label(OrderStatus::InTransit), "in transit");
        assert_eq!(status_label(OrderStatus::PaymentPending), "payment pending");
        assert_eq!(status_label(OrderStatus::Paid), "paid");
    }
}
