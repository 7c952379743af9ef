//! Splitting a cart into per-farmer orders
//!
//! Pure pricing and stock checks, run against products already locked by
//! the caller's transaction.

use std::collections::{HashMap, HashSet};

use uuid::Uuid;

use crate::catalog::Product;
use crate::error::ApiError;

use super::model::OrderItemInput;

/// Line item ready to insert; prices are snapshotted here
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannedItem {
    pub product_id: Uuid,
    pub product_title: String,
    pub quantity: i32,
    pub unit_price: i64,
    pub total_price: i64,
}

/// One order per farmer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannedOrder {
    pub farmer_id: Uuid,
    pub items: Vec<PlannedItem>,
    pub total_amount: i64,
}

/// Validate a cart against the available products and group it by farmer.
///
/// `products` holds the ACTIVE products referenced by the cart; a product
/// missing from it is reported as not found. Orders come out in the order
/// their farmer first appears in the cart.
pub fn plan_orders(
    buyer_id: Uuid,
    items: &[OrderItemInput],
    products: &[Product],
) -> Result<Vec<PlannedOrder>, ApiError> {
    if items.is_empty() {
        return Err(ApiError::ValidationError(
            "Order must contain at least one item".to_string(),
        ));
    }

    let mut seen = HashSet::new();
    if !items.iter().all(|item| seen.insert(item.product_id)) {
        return Err(ApiError::ValidationError(
            "Each product may appear only once per order".to_string(),
        ));
    }

    let by_id: HashMap<Uuid, &Product> = products.iter().map(|p| (p.id, p)).collect();
    let mut plans: Vec<PlannedOrder> = Vec::new();

    for item in items {
        let product = by_id.get(&item.product_id).ok_or_else(|| {
            ApiError::NotFound(format!(
                "Product {} not found or unavailable",
                item.product_id
            ))
        })?;

        if product.farmer_id == buyer_id {
            return Err(ApiError::ValidationError(
                "You cannot order your own product".to_string(),
            ));
        }
        if item.quantity < 1 {
            return Err(ApiError::ValidationError(format!(
                "Quantity for {} must be at least 1",
                product.title
            )));
        }
        if item.quantity > product.quantity {
            return Err(ApiError::ValidationError(format!(
                "Insufficient stock for {}. Available: {} {}",
                product.title, product.quantity, product.unit
            )));
        }
        if item.quantity < product.min_order {
            return Err(ApiError::ValidationError(format!(
                "Minimum order quantity for {} is {}",
                product.title, product.min_order
            )));
        }

        let unit_price = match item.negotiated_price {
            Some(price) if price <= 0 => {
                return Err(ApiError::ValidationError(
                    "Negotiated price must be greater than 0".to_string(),
                ))
            }
            Some(price) => price,
            None => product.price,
        };
        let total_price = unit_price
            .checked_mul(i64::from(item.quantity))
            .ok_or_else(|| ApiError::ValidationError("Order total is too large".to_string()))?;

        let planned = PlannedItem {
            product_id: product.id,
            product_title: product.title.clone(),
            quantity: item.quantity,
            unit_price,
            total_price,
        };

        match plans.iter_mut().find(|p| p.farmer_id == product.farmer_id) {
            Some(plan) => plan.items.push(planned),
            None => plans.push(PlannedOrder {
                farmer_id: product.farmer_id,
                items: vec![planned],
                total_amount: 0,
            }),
        }
    }

    for plan in &mut plans {
        plan.total_amount = plan
            .items
            .iter()
            .try_fold(0i64, |acc, item| acc.checked_add(item.total_price))
            .ok_or_else(|| ApiError::ValidationError("Order total is too large".to_string()))?;
    }

    Ok(plans)
}

/// Human-facing order reference, e.g. `AGL-20240115-3F9A1C2B`
pub fn generate_order_number() -> String {
    let suffix = Uuid::new_v4().simple().to_string()[..8].to_uppercase();
    format!("AGL-{}-{}", chrono::Utc::now().format("%Y%m%d"), suffix)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{ProductCategory, ProductStatus};
    use chrono::Utc;

    fn product(farmer_id: Uuid, title: &str, price: i64, quantity: i32, min_order: i32) -> Product {
        Product {
            id: Uuid::new_v4(),
            farmer_id,
            title: title.to_string(),
            description: None,
            category: ProductCategory::Cereals,
            unit: "kg".to_string(),
            price,
            quantity,
            min_order,
            status: ProductStatus::Active,
            location: "Bishoftu".to_string(),
            latitude: None,
            longitude: None,
            images: vec![],
            is_organic: false,
            harvest_date: None,
            sold_quantity: 0,
            views: 0,
            rating: 0.0,
            review_count: 0,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn item(product: &Product, quantity: i32) -> OrderItemInput {
        OrderItemInput {
            product_id: product.id,
            quantity,
            negotiated_price: None,
        }
    }

    fn message(err: ApiError) -> String {
        err.to_string()
    }

    #[test]
    fn test_teff_below_minimum_is_rejected() {
        let teff = product(Uuid::new_v4(), "Teff", 150, 300, 25);
        let err = plan_orders(Uuid::new_v4(), &[item(&teff, 20)], &[teff.clone()]).unwrap_err();
        assert_eq!(message(err), "Minimum order quantity for Teff is 25");
    }

    #[test]
    fn test_teff_total_is_snapshot() {
        let teff = product(Uuid::new_v4(), "Teff", 150, 300, 25);
        let plans = plan_orders(Uuid::new_v4(), &[item(&teff, 30)], &[teff.clone()]).unwrap();

        assert_eq!(plans.len(), 1);
        assert_eq!(plans[0].total_amount, 4500);
        assert_eq!(plans[0].items[0].unit_price, 150);
        assert_eq!(plans[0].items[0].total_price, 4500);
    }

    #[test]
    fn test_insufficient_stock() {
        let coffee = product(Uuid::new_v4(), "Yirgacheffe Coffee", 900, 10, 1);
        let err = plan_orders(Uuid::new_v4(), &[item(&coffee, 11)], &[coffee.clone()]).unwrap_err();
        assert!(matches!(err, ApiError::ValidationError(_)));
        assert!(message(err).starts_with("Insufficient stock for Yirgacheffe Coffee"));
    }

    #[test]
    fn test_split_by_farmer_in_first_appearance_order() {
        let (alemu, bekele) = (Uuid::new_v4(), Uuid::new_v4());
        let teff = product(alemu, "Teff", 150, 300, 1);
        let maize = product(bekele, "Maize", 40, 500, 1);
        let lentils = product(alemu, "Lentils", 120, 80, 1);

        let plans = plan_orders(
            Uuid::new_v4(),
            &[item(&maize, 10), item(&teff, 2), item(&lentils, 5)],
            &[teff.clone(), maize.clone(), lentils.clone()],
        )
        .unwrap();

        assert_eq!(plans.len(), 2);
        assert_eq!(plans[0].farmer_id, bekele);
        assert_eq!(plans[0].total_amount, 400);
        assert_eq!(plans[1].farmer_id, alemu);
        assert_eq!(plans[1].items.len(), 2);
        assert_eq!(plans[1].total_amount, 2 * 150 + 5 * 120);
    }

    #[test]
    fn test_negotiated_unit_price_overrides_list_price() {
        let teff = product(Uuid::new_v4(), "Teff", 150, 300, 1);
        let input = OrderItemInput {
            product_id: teff.id,
            quantity: 10,
            negotiated_price: Some(140),
        };
        let plans = plan_orders(Uuid::new_v4(), &[input], &[teff]).unwrap();
        assert_eq!(plans[0].total_amount, 1400);
    }

    #[test]
    fn test_rejects_empty_duplicate_missing_and_own_products() {
        let farmer = Uuid::new_v4();
        let teff = product(farmer, "Teff", 150, 300, 1);

        assert!(plan_orders(Uuid::new_v4(), &[], &[]).is_err());

        let dup = [item(&teff, 1), item(&teff, 2)];
        assert!(matches!(
            plan_orders(Uuid::new_v4(), &dup, &[teff.clone()]),
            Err(ApiError::ValidationError(_))
        ));

        assert!(matches!(
            plan_orders(Uuid::new_v4(), &[item(&teff, 1)], &[]),
            Err(ApiError::NotFound(_))
        ));

        assert!(matches!(
            plan_orders(farmer, &[item(&teff, 1)], &[teff.clone()]),
            Err(ApiError::ValidationError(_))
        ));
    }

    #[test]
    fn test_order_number_shape() {
        let number = generate_order_number();
        assert!(number.starts_with("AGL-"));
        assert_eq!(number.len(), "AGL-20240101-ABCDEF12".len());
        assert_ne!(number, generate_order_number());
    }
}
