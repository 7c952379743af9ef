//! Catalog models

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use sqlx::types::chrono::{DateTime, Utc};
use uuid::Uuid;
use validator::{Validate, ValidationError};

#[derive(Debug, Serialize, Deserialize, sqlx::Type, Clone, Copy, PartialEq, Eq)]
#[sqlx(type_name = "product_category", rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ProductCategory {
    Cereals,
    Pulses,
    Oilseeds,
    Vegetables,
    Fruits,
    Coffee,
    Spices,
    Livestock,
    Dairy,
    Other,
}

#[derive(Debug, Serialize, Deserialize, sqlx::Type, Clone, Copy, PartialEq, Eq)]
#[sqlx(type_name = "product_status", rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ProductStatus {
    Active,
    SoldOut,
    Inactive,
    Deleted,
}

/// Product listing. `price` is per unit in santim.
#[derive(Debug, Serialize, sqlx::FromRow, Clone)]
#[serde(rename_all = "camelCase")]
pub struct Product {
    pub id: Uuid,
    pub farmer_id: Uuid,
    pub title: String,
    pub description: Option<String>,
    pub category: ProductCategory,
    pub unit: String,
    pub price: i64,
    pub quantity: i32,
    pub min_order: i32,
    pub status: ProductStatus,
    pub location: String,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub images: Vec<String>,
    pub is_organic: bool,
    pub harvest_date: Option<NaiveDate>,
    pub sold_quantity: i32,
    pub views: i32,
    pub rating: f64,
    pub review_count: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Prices are whole santim and must be positive
pub fn validate_price(price: i64) -> Result<(), ValidationError> {
    if price > 0 {
        Ok(())
    } else {
        let mut err = ValidationError::new("price");
        err.message = Some("Price must be greater than 0".into());
        Err(err)
    }
}

fn validate_images(images: &[String]) -> Result<(), ValidationError> {
    if images.len() > 10 || images.iter().any(|url| url.trim().is_empty()) {
        let mut err = ValidationError::new("images");
        err.message = Some("At most 10 non-empty image URLs are allowed".into());
        return Err(err);
    }
    Ok(())
}

fn validate_editable_status(status: &ProductStatus) -> Result<(), ValidationError> {
    match status {
        ProductStatus::Active | ProductStatus::Inactive => Ok(()),
        _ => {
            let mut err = ValidationError::new("status");
            err.message = Some("Status can only be set to ACTIVE or INACTIVE".into());
            Err(err)
        }
    }
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
#[validate(schema(function = "validate_create_product", skip_on_field_errors = true))]
pub struct CreateProductRequest {
    #[validate(length(min = 3, max = 200, message = "Title must be 3-200 characters"))]
    pub title: String,
    #[validate(length(max = 5000))]
    pub description: Option<String>,
    pub category: ProductCategory,
    #[validate(length(min = 1, max = 20, message = "Unit is required"))]
    pub unit: Option<String>,
    #[validate(custom = "validate_price")]
    pub price: i64,
    #[validate(range(min = 1, message = "Quantity must be at least 1"))]
    pub quantity: i32,
    #[validate(range(min = 1, message = "Minimum order must be at least 1"))]
    pub min_order: Option<i32>,
    #[validate(length(min = 2, max = 200, message = "Location is required"))]
    pub location: String,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    #[validate(custom = "validate_images")]
    #[serde(default)]
    pub images: Vec<String>,
    #[serde(default)]
    pub is_organic: bool,
    pub harvest_date: Option<NaiveDate>,
}

fn validate_coordinates(latitude: Option<f64>, longitude: Option<f64>) -> Result<(), ValidationError> {
    let lat_ok = latitude.map_or(true, |lat| (-90.0..=90.0).contains(&lat));
    let lon_ok = longitude.map_or(true, |lon| (-180.0..=180.0).contains(&lon));
    if lat_ok && lon_ok {
        Ok(())
    } else {
        let mut err = ValidationError::new("coordinates");
        err.message = Some("Latitude must be within ±90 and longitude within ±180".into());
        Err(err)
    }
}

fn validate_create_product(req: &CreateProductRequest) -> Result<(), ValidationError> {
    validate_coordinates(req.latitude, req.longitude)?;
    if req.min_order.unwrap_or(1) > req.quantity {
        let mut err = ValidationError::new("min_order");
        err.message = Some("Minimum order cannot exceed available quantity".into());
        return Err(err);
    }
    Ok(())
}

fn validate_update_coordinates(req: &UpdateProductRequest) -> Result<(), ValidationError> {
    validate_coordinates(req.latitude, req.longitude)
}

/// Partial update; absent fields are left unchanged
#[derive(Debug, Deserialize, Validate, Default)]
#[serde(rename_all = "camelCase")]
#[validate(schema(function = "validate_update_coordinates", skip_on_field_errors = true))]
pub struct UpdateProductRequest {
    #[validate(length(min = 3, max = 200, message = "Title must be 3-200 characters"))]
    pub title: Option<String>,
    #[validate(length(max = 5000))]
    pub description: Option<String>,
    pub category: Option<ProductCategory>,
    #[validate(length(min = 1, max = 20))]
    pub unit: Option<String>,
    #[validate(custom = "validate_price")]
    pub price: Option<i64>,
    #[validate(range(min = 0, message = "Quantity cannot be negative"))]
    pub quantity: Option<i32>,
    #[validate(range(min = 1, message = "Minimum order must be at least 1"))]
    pub min_order: Option<i32>,
    #[validate(custom = "validate_editable_status")]
    pub status: Option<ProductStatus>,
    #[validate(length(min = 2, max = 200))]
    pub location: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    #[validate(custom = "validate_images")]
    pub images: Option<Vec<String>>,
    pub is_organic: Option<bool>,
    pub harvest_date: Option<NaiveDate>,
}

/// Listing sort order
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "kebab-case")]
pub enum ProductSort {
    #[default]
    Newest,
    PriceAsc,
    PriceDesc,
    Rating,
}

impl ProductSort {
    pub fn order_by(&self) -> &'static str {
        match self {
            ProductSort::Newest => "created_at DESC",
            ProductSort::PriceAsc => "price ASC, created_at DESC",
            ProductSort::PriceDesc => "price DESC, created_at DESC",
            ProductSort::Rating => "rating DESC, review_count DESC, created_at DESC",
        }
    }
}

/// Query parameters for listing products
#[derive(Debug, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct ListProductsQuery {
    pub category: Option<ProductCategory>,
    pub location: Option<String>,
    pub min_price: Option<i64>,
    pub max_price: Option<i64>,
    pub min_quantity: Option<i32>,
    pub farmer_id: Option<Uuid>,
    pub search: Option<String>,
    pub is_organic: Option<bool>,
    pub sort: Option<ProductSort>,
    pub page: Option<i64>,
    pub limit: Option<i64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn create_request() -> CreateProductRequest {
        CreateProductRequest {
            title: "White Teff".to_string(),
            description: None,
            category: ProductCategory::Cereals,
            unit: Some("kg".to_string()),
            price: 15_000,
            quantity: 300,
            min_order: Some(25),
            location: "Debre Zeit".to_string(),
            latitude: None,
            longitude: None,
            images: vec![],
            is_organic: false,
            harvest_date: None,
        }
    }

    #[test]
    fn test_valid_create_request() {
        assert!(create_request().validate().is_ok());
    }

    #[test]
    fn test_create_rejects_non_positive_price_and_quantity() {
        let mut req = create_request();
        req.price = 0;
        assert!(req.validate().is_err());

        let mut req = create_request();
        req.quantity = 0;
        assert!(req.validate().is_err());
    }

    #[test]
    fn test_min_order_cannot_exceed_quantity() {
        let mut req = create_request();
        req.min_order = Some(301);
        assert!(req.validate().is_err());
    }

    #[test]
    fn test_coordinates_bounds() {
        let mut req = create_request();
        req.latitude = Some(8.75);
        req.longitude = Some(38.98);
        assert!(req.validate().is_ok());

        req.latitude = Some(91.0);
        assert!(req.validate().is_err());
    }

    #[test]
    fn test_status_update_limited_to_active_or_inactive() {
        let req = UpdateProductRequest {
            status: Some(ProductStatus::Deleted),
            ..Default::default()
        };
        assert!(req.validate().is_err());

        let req = UpdateProductRequest {
            status: Some(ProductStatus::Inactive),
            ..Default::default()
        };
        assert!(req.validate().is_ok());
    }

    #[test]
    fn test_sort_parses_kebab_case() {
        let sort: ProductSort = serde_json::from_str("\"price-asc\"").unwrap();
        assert_eq!(sort, ProductSort::PriceAsc);
        assert_eq!(ProductSort::default(), ProductSort::Newest);
    }
}
