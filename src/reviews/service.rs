//! Review service layer

use serde_json::json;
use sqlx::{PgConnection, PgPool};
use uuid::Uuid;

use crate::error::{ApiError, ApiResult};
use crate::middleware::AuthenticatedUser;
use crate::models::{PageWindow, Pagination};
use crate::notifications::{insert_notification, NewNotification, NotificationService, NotificationType};
use crate::orders::{lock_order, Actor, Order, OrderStatus};

use super::model::{CreateReviewRequest, Review, ReviewWithReviewer, UpdateReviewRequest};

const REVIEW_WITH_REVIEWER: &str = r#"
    SELECT r.*, TRIM(u.first_name || ' ' || u.last_name) AS reviewer_name
    FROM reviews r
    JOIN users u ON u.id = r.reviewer_id
"#;

/// Recompute rating aggregates from the stored reviews
async fn refresh_aggregates(
    conn: &mut PgConnection,
    reviewee_id: Uuid,
    product_id: Option<Uuid>,
) -> ApiResult<()> {
    sqlx::query(
        r#"
        UPDATE farmer_profiles SET
            rating = COALESCE((SELECT AVG(rating)::float8 FROM reviews WHERE reviewee_id = $1), 0),
            total_reviews = (SELECT COUNT(*) FROM reviews WHERE reviewee_id = $1),
            updated_at = NOW()
        WHERE user_id = $1
        "#,
    )
    .bind(reviewee_id)
    .execute(&mut *conn)
    .await?;

    if let Some(product_id) = product_id {
        sqlx::query(
            r#"
            UPDATE products SET
                rating = COALESCE((SELECT AVG(rating)::float8 FROM reviews WHERE product_id = $1), 0),
                review_count = (SELECT COUNT(*) FROM reviews WHERE product_id = $1)
            WHERE id = $1
            "#,
        )
        .bind(product_id)
        .execute(&mut *conn)
        .await?;
    }

    Ok(())
}

/// The party a review is about.
///
/// Product ratings describe what the buyer received, so only the buyer may
/// attach a product; a farmer's review of the buyer never reaches the
/// product aggregates.
fn reviewee_for(order: &Order, reviewer_id: Uuid, product_id: Option<Uuid>) -> ApiResult<Uuid> {
    let reviewee_id = match order.actor_for(reviewer_id, false) {
        Some(Actor::Buyer) => order.farmer_id,
        Some(Actor::Farmer) => {
            if product_id.is_some() {
                return Err(ApiError::ValidationError(
                    "Only the buyer can rate a product".to_string(),
                ));
            }
            order.buyer_id
        }
        _ => {
            return Err(ApiError::Forbidden(
                "Only the buyer or farmer of this order can review it".to_string(),
            ))
        }
    };
    if reviewee_id == reviewer_id {
        return Err(ApiError::ValidationError(
            "You cannot review yourself".to_string(),
        ));
    }
    Ok(reviewee_id)
}

#[derive(Clone)]
pub struct ReviewService {
    db_pool: PgPool,
    notifications: NotificationService,
}

impl ReviewService {
    pub fn new(db_pool: PgPool, notifications: NotificationService) -> Self {
        Self {
            db_pool,
            notifications,
        }
    }

    /// Review the other party of a delivered order
    pub async fn create_review(
        &self,
        reviewer: &AuthenticatedUser,
        req: CreateReviewRequest,
    ) -> ApiResult<Review> {
        let mut tx = self.db_pool.begin().await?;

        let order = lock_order(&mut tx, req.order_id).await?;
        let reviewee_id = reviewee_for(&order, reviewer.user_id, req.product_id)?;
        if order.status != OrderStatus::Delivered {
            return Err(ApiError::ValidationError(
                "Only delivered orders can be reviewed".to_string(),
            ));
        }

        if let Some(product_id) = req.product_id {
            let in_order: bool = sqlx::query_scalar(
                "SELECT EXISTS(SELECT 1 FROM order_items WHERE order_id = $1 AND product_id = $2)",
            )
            .bind(order.id)
            .bind(product_id)
            .fetch_one(&mut *tx)
            .await?;
            if !in_order {
                return Err(ApiError::ValidationError(
                    "Product is not part of this order".to_string(),
                ));
            }
        }

        let already_reviewed: bool = sqlx::query_scalar(
            "SELECT EXISTS(SELECT 1 FROM reviews WHERE order_id = $1 AND reviewer_id = $2)",
        )
        .bind(order.id)
        .bind(reviewer.user_id)
        .fetch_one(&mut *tx)
        .await?;
        if already_reviewed {
            return Err(ApiError::Conflict(
                "You have already reviewed this order".to_string(),
            ));
        }

        let review = sqlx::query_as::<_, Review>(
            r#"
            INSERT INTO reviews (id, order_id, reviewer_id, reviewee_id, product_id, rating, comment)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(order.id)
        .bind(reviewer.user_id)
        .bind(reviewee_id)
        .bind(req.product_id)
        .bind(req.rating)
        .bind(&req.comment)
        .fetch_one(&mut *tx)
        .await?;

        refresh_aggregates(&mut tx, review.reviewee_id, review.product_id).await?;

        let notification = insert_notification(
            &mut tx,
            NewNotification::new(
                reviewee_id,
                NotificationType::NewReview,
                "New review",
                format!(
                    "You received a {}-star review for order {}",
                    review.rating, order.order_number
                ),
            )
            .with_data(json!({ "reviewId": review.id, "orderId": order.id })),
        )
        .await?;

        tx.commit().await?;

        tracing::info!(review_id = %review.id, order_id = %order.id, "Review created");

        self.notifications.publish(vec![notification]);

        Ok(review)
    }

    /// Edit a review; author only
    pub async fn update_review(
        &self,
        id: Uuid,
        user: &AuthenticatedUser,
        req: UpdateReviewRequest,
    ) -> ApiResult<Review> {
        let mut tx = self.db_pool.begin().await?;

        let review = self.lock_review(&mut tx, id).await?;
        if review.reviewer_id != user.user_id {
            return Err(ApiError::Forbidden(
                "You can only edit your own reviews".to_string(),
            ));
        }

        let review = sqlx::query_as::<_, Review>(
            r#"
            UPDATE reviews
            SET rating = COALESCE($2, rating), comment = COALESCE($3, comment), updated_at = NOW()
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(req.rating)
        .bind(&req.comment)
        .fetch_one(&mut *tx)
        .await?;

        refresh_aggregates(&mut tx, review.reviewee_id, review.product_id).await?;
        tx.commit().await?;

        Ok(review)
    }

    /// Remove a review; author or admin
    pub async fn delete_review(&self, id: Uuid, user: &AuthenticatedUser) -> ApiResult<()> {
        let mut tx = self.db_pool.begin().await?;

        let review = self.lock_review(&mut tx, id).await?;
        if review.reviewer_id != user.user_id && !user.is_admin() {
            return Err(ApiError::Forbidden(
                "You can only delete your own reviews".to_string(),
            ));
        }

        sqlx::query("DELETE FROM reviews WHERE id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await?;

        refresh_aggregates(&mut tx, review.reviewee_id, review.product_id).await?;
        tx.commit().await?;

        tracing::info!(review_id = %id, deleted_by = %user.user_id, "Review deleted");

        Ok(())
    }

    async fn lock_review(&self, conn: &mut PgConnection, id: Uuid) -> ApiResult<Review> {
        sqlx::query_as::<_, Review>("SELECT * FROM reviews WHERE id = $1 FOR UPDATE")
            .bind(id)
            .fetch_optional(conn)
            .await?
            .ok_or_else(|| ApiError::NotFound("Review not found".to_string()))
    }

    /// Reviews received by a user
    pub async fn list_for_user(
        &self,
        user_id: Uuid,
        window: PageWindow,
    ) -> ApiResult<(Vec<ReviewWithReviewer>, Pagination)> {
        self.list_where("r.reviewee_id", user_id, window).await
    }

    /// Reviews attached to a product
    pub async fn list_for_product(
        &self,
        product_id: Uuid,
        window: PageWindow,
    ) -> ApiResult<(Vec<ReviewWithReviewer>, Pagination)> {
        self.list_where("r.product_id", product_id, window).await
    }

    async fn list_where(
        &self,
        column: &'static str,
        id: Uuid,
        window: PageWindow,
    ) -> ApiResult<(Vec<ReviewWithReviewer>, Pagination)> {
        let sql = format!(
            "{} WHERE {} = $1 ORDER BY r.created_at DESC LIMIT $2 OFFSET $3",
            REVIEW_WITH_REVIEWER, column
        );
        let reviews = sqlx::query_as::<_, ReviewWithReviewer>(&sql)
            .bind(id)
            .bind(window.limit)
            .bind(window.offset())
            .fetch_all(&self.db_pool)
            .await?;

        let count_sql = format!("SELECT COUNT(*) FROM reviews r WHERE {} = $1", column);
        let total: i64 = sqlx::query_scalar(&count_sql)
            .bind(id)
            .fetch_one(&self.db_pool)
            .await?;

        Ok((reviews, window.with_total(total)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn delivered_order(buyer_id: Uuid, farmer_id: Uuid) -> Order {
        Order {
            id: Uuid::new_v4(),
            order_number: "AGL-20240115-3F9A1C2B".to_string(),
            buyer_id,
            farmer_id,
            status: OrderStatus::Delivered,
            total_amount: 4500,
            negotiated_price: None,
            delivery_address: "Bole, Addis Ababa".to_string(),
            delivery_date: None,
            notes: None,
            cancel_reason: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn test_buyer_reviews_farmer_and_product() {
        let (buyer, farmer) = (Uuid::new_v4(), Uuid::new_v4());
        let order = delivered_order(buyer, farmer);

        assert_eq!(reviewee_for(&order, buyer, Some(Uuid::new_v4())).unwrap(), farmer);
        assert_eq!(reviewee_for(&order, buyer, None).unwrap(), farmer);
    }

    #[test]
    fn test_farmer_cannot_rate_own_product() {
        let (buyer, farmer) = (Uuid::new_v4(), Uuid::new_v4());
        let order = delivered_order(buyer, farmer);

        assert_eq!(reviewee_for(&order, farmer, None).unwrap(), buyer);
        assert!(matches!(
            reviewee_for(&order, farmer, Some(Uuid::new_v4())),
            Err(ApiError::ValidationError(_))
        ));
    }

    #[test]
    fn test_outsiders_and_self_orders_are_rejected() {
        let (buyer, farmer) = (Uuid::new_v4(), Uuid::new_v4());
        let order = delivered_order(buyer, farmer);
        assert!(matches!(
            reviewee_for(&order, Uuid::new_v4(), None),
            Err(ApiError::Forbidden(_))
        ));

        let same = Uuid::new_v4();
        let order = delivered_order(same, same);
        assert!(matches!(
            reviewee_for(&order, same, None),
            Err(ApiError::ValidationError(_))
        ));
    }
}
