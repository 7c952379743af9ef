//! Catalog service layer

use sqlx::{PgPool, Postgres, QueryBuilder};
use uuid::Uuid;

use crate::error::{ApiError, ApiResult};
use crate::models::{PageWindow, Pagination};

use super::model::{
    CreateProductRequest, ListProductsQuery, Product, ProductStatus, UpdateProductRequest,
};

/// Status after an edit: listings with no stock show as sold out and
/// restocked sold-out listings become active again.
pub fn resolve_status(
    current: ProductStatus,
    requested: Option<ProductStatus>,
    quantity: i32,
) -> ProductStatus {
    match requested.unwrap_or(current) {
        ProductStatus::Active if quantity == 0 => ProductStatus::SoldOut,
        ProductStatus::SoldOut if quantity > 0 => ProductStatus::Active,
        status => status,
    }
}

/// Escape LIKE wildcards in user input
fn like_pattern(input: &str) -> String {
    let escaped = input
        .trim()
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_");
    format!("%{}%", escaped)
}

fn push_filters(builder: &mut QueryBuilder<'_, Postgres>, query: &ListProductsQuery) {
    builder.push(" WHERE status = ");
    builder.push_bind(ProductStatus::Active);

    if let Some(category) = query.category {
        builder.push(" AND category = ");
        builder.push_bind(category);
    }
    if let Some(location) = query.location.as_deref().filter(|l| !l.trim().is_empty()) {
        builder.push(" AND location ILIKE ");
        builder.push_bind(like_pattern(location));
    }
    if let Some(min_price) = query.min_price {
        builder.push(" AND price >= ");
        builder.push_bind(min_price);
    }
    if let Some(max_price) = query.max_price {
        builder.push(" AND price <= ");
        builder.push_bind(max_price);
    }
    if let Some(min_quantity) = query.min_quantity {
        builder.push(" AND quantity >= ");
        builder.push_bind(min_quantity);
    }
    if let Some(farmer_id) = query.farmer_id {
        builder.push(" AND farmer_id = ");
        builder.push_bind(farmer_id);
    }
    if let Some(is_organic) = query.is_organic {
        builder.push(" AND is_organic = ");
        builder.push_bind(is_organic);
    }
    if let Some(search) = query.search.as_deref().filter(|s| !s.trim().is_empty()) {
        let pattern = like_pattern(search);
        builder.push(" AND (title ILIKE ");
        builder.push_bind(pattern.clone());
        builder.push(" OR description ILIKE ");
        builder.push_bind(pattern);
        builder.push(")");
    }
}

/// Catalog service for product listings
#[derive(Clone)]
pub struct CatalogService {
    db_pool: PgPool,
}

impl CatalogService {
    pub fn new(db_pool: PgPool) -> Self {
        Self { db_pool }
    }

    pub async fn create_product(
        &self,
        farmer_id: Uuid,
        req: CreateProductRequest,
    ) -> ApiResult<Product> {
        let product = sqlx::query_as::<_, Product>(
            r#"
            INSERT INTO products (
                id, farmer_id, title, description, category, unit, price, quantity,
                min_order, status, location, latitude, longitude, images, is_organic,
                harvest_date
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16)
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(farmer_id)
        .bind(req.title.trim())
        .bind(&req.description)
        .bind(req.category)
        .bind(req.unit.as_deref().unwrap_or("kg"))
        .bind(req.price)
        .bind(req.quantity)
        .bind(req.min_order.unwrap_or(1))
        .bind(ProductStatus::Active)
        .bind(req.location.trim())
        .bind(req.latitude)
        .bind(req.longitude)
        .bind(&req.images)
        .bind(req.is_organic)
        .bind(req.harvest_date)
        .fetch_one(&self.db_pool)
        .await?;

        tracing::info!(product_id = %product.id, farmer_id = %farmer_id, "Product listed");

        Ok(product)
    }

    pub async fn update_product(
        &self,
        id: Uuid,
        farmer_id: Uuid,
        req: UpdateProductRequest,
    ) -> ApiResult<Product> {
        let mut tx = self.db_pool.begin().await?;

        let current = sqlx::query_as::<_, Product>(
            "SELECT * FROM products WHERE id = $1 AND status <> 'DELETED' FOR UPDATE",
        )
        .bind(id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| ApiError::NotFound("Product not found".to_string()))?;

        if current.farmer_id != farmer_id {
            return Err(ApiError::Forbidden(
                "You can only update your own products".to_string(),
            ));
        }

        let quantity = req.quantity.unwrap_or(current.quantity);
        let min_order = req.min_order.unwrap_or(current.min_order);
        if quantity > 0 && min_order > quantity {
            return Err(ApiError::ValidationError(
                "Minimum order cannot exceed available quantity".to_string(),
            ));
        }
        let status = resolve_status(current.status, req.status, quantity);

        let product = sqlx::query_as::<_, Product>(
            r#"
            UPDATE products SET
                title = COALESCE($2, title),
                description = COALESCE($3, description),
                category = COALESCE($4, category),
                unit = COALESCE($5, unit),
                price = COALESCE($6, price),
                quantity = $7,
                min_order = $8,
                status = $9,
                location = COALESCE($10, location),
                latitude = COALESCE($11, latitude),
                longitude = COALESCE($12, longitude),
                images = COALESCE($13, images),
                is_organic = COALESCE($14, is_organic),
                harvest_date = COALESCE($15, harvest_date),
                updated_at = NOW()
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(req.title.as_deref().map(str::trim))
        .bind(&req.description)
        .bind(req.category)
        .bind(&req.unit)
        .bind(req.price)
        .bind(quantity)
        .bind(min_order)
        .bind(status)
        .bind(req.location.as_deref().map(str::trim))
        .bind(req.latitude)
        .bind(req.longitude)
        .bind(&req.images)
        .bind(req.is_organic)
        .bind(req.harvest_date)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;

        Ok(product)
    }

    /// Soft delete. Allowed for the owning farmer or an admin.
    pub async fn delete_product(&self, id: Uuid, user_id: Uuid, is_admin: bool) -> ApiResult<()> {
        let product = sqlx::query_as::<_, Product>(
            "SELECT * FROM products WHERE id = $1 AND status <> 'DELETED'",
        )
        .bind(id)
        .fetch_optional(&self.db_pool)
        .await?
        .ok_or_else(|| ApiError::NotFound("Product not found".to_string()))?;

        if product.farmer_id != user_id && !is_admin {
            return Err(ApiError::Forbidden(
                "You can only delete your own products".to_string(),
            ));
        }

        sqlx::query("UPDATE products SET status = 'DELETED', updated_at = NOW() WHERE id = $1")
            .bind(id)
            .execute(&self.db_pool)
            .await?;

        tracing::info!(product_id = %id, deleted_by = %user_id, "Product deleted");

        Ok(())
    }

    /// Fetch a product and count the view in the same statement.
    /// The owner looking at their own listing is not counted.
    pub async fn get_product(&self, id: Uuid, viewer_id: Option<Uuid>) -> ApiResult<Product> {
        sqlx::query_as::<_, Product>(
            r#"
            UPDATE products
            SET views = views + CASE WHEN farmer_id = $2 THEN 0 ELSE 1 END
            WHERE id = $1 AND status <> 'DELETED'
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(viewer_id)
        .fetch_optional(&self.db_pool)
        .await?
        .ok_or_else(|| ApiError::NotFound("Product not found".to_string()))
    }

    /// List active products with filtering, sorting and pagination
    pub async fn get_products(
        &self,
        query: &ListProductsQuery,
    ) -> ApiResult<(Vec<Product>, Pagination)> {
        let window = PageWindow::new(query.page, query.limit);

        let mut count_builder: QueryBuilder<Postgres> =
            QueryBuilder::new("SELECT COUNT(*) FROM products");
        push_filters(&mut count_builder, query);
        let total: i64 = count_builder
            .build_query_scalar::<i64>()
            .fetch_one(&self.db_pool)
            .await?;

        let mut builder: QueryBuilder<Postgres> = QueryBuilder::new("SELECT * FROM products");
        push_filters(&mut builder, query);
        builder.push(" ORDER BY ");
        builder.push(query.sort.unwrap_or_default().order_by());
        builder.push(" LIMIT ");
        builder.push_bind(window.limit);
        builder.push(" OFFSET ");
        builder.push_bind(window.offset());

        let products = builder
            .build_query_as::<Product>()
            .fetch_all(&self.db_pool)
            .await?;

        Ok((products, window.with_total(total)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_follows_stock() {
        use ProductStatus::*;
        assert_eq!(resolve_status(Active, None, 0), SoldOut);
        assert_eq!(resolve_status(SoldOut, None, 40), Active);
        assert_eq!(resolve_status(Active, Some(Inactive), 10), Inactive);
        assert_eq!(resolve_status(Inactive, None, 0), Inactive);
        assert_eq!(resolve_status(SoldOut, Some(Active), 0), SoldOut);
    }

    #[test]
    fn test_like_pattern_escapes_wildcards() {
        assert_eq!(like_pattern(" teff "), "%teff%");
        assert_eq!(like_pattern("50%_off"), "%50\\%\\_off%");
    }

    #[test]
    fn test_filters_always_restrict_to_active() {
        let mut builder: QueryBuilder<Postgres> = QueryBuilder::new("SELECT * FROM products");
        push_filters(&mut builder, &ListProductsQuery::default());
        assert_eq!(builder.sql(), "SELECT * FROM products WHERE status = $1");
    }

    #[test]
    fn test_filters_compose_in_order() {
        let query = ListProductsQuery {
            min_price: Some(100),
            search: Some("coffee".to_string()),
            ..Default::default()
        };
        let mut builder: QueryBuilder<Postgres> = QueryBuilder::new("SELECT COUNT(*) FROM products");
        push_filters(&mut builder, &query);
        assert_eq!(
            builder.sql(),
            "SELECT COUNT(*) FROM products WHERE status = $1 AND price >= $2 \
             AND (title ILIKE $3 OR description ILIKE $4)"
        );
    }
}
