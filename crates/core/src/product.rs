//! Catalog products and catalog query rules.
//!
//! The catalog is small, so queries load every product and filter, sort and
//! page in memory. The functions here are the pure part of that; fetching
//! lives in the storefront.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::{ProductCategory, ProductId, ProductStatus, Yen};

/// Optional free-form product details shown on the product page.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductDetails {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ingredients: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub material: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub weight: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub manufacturer: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub origin: Option<String>,
}

/// A catalog product. Read-only to checkout: stock is never decremented.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Product {
    pub id: ProductId,
    pub name: String,
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub long_description: Option<String>,
    pub price: Yen,
    /// Pre-discount price, shown struck through when present.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub original_price: Option<Yen>,
    pub stock: i32,
    pub category: ProductCategory,
    pub status: ProductStatus,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub images: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rating: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reviews: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<ProductDetails>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Product {
    /// Whether the product is publicly visible.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.status == ProductStatus::Active
    }

    /// First image, used for cart lines and order items.
    #[must_use]
    pub fn primary_image(&self) -> Option<&str> {
        self.images.first().map(String::as_str)
    }
}

/// Catalog listing filter. Price bounds are inclusive.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductFilter {
    pub category: Option<ProductCategory>,
    pub min_price: Option<Yen>,
    pub max_price: Option<Yen>,
}

impl ProductFilter {
    /// Whether an (active) product passes this filter.
    #[must_use]
    pub fn matches(&self, product: &Product) -> bool {
        self.category.is_none_or(|c| product.category == c)
            && self.min_price.is_none_or(|min| product.price >= min)
            && self.max_price.is_none_or(|max| product.price <= max)
    }
}

/// Active products passing `filter`, newest first.
#[must_use]
pub fn filter_products(products: &[Product], filter: &ProductFilter) -> Vec<Product> {
    let mut visible: Vec<Product> = products
        .iter()
        .filter(|p| p.is_active() && filter.matches(p))
        .cloned()
        .collect();
    sort_newest_first(&mut visible);
    visible
}

/// Sort by `created_at` descending. Stable, so ties keep store order.
pub fn sort_newest_first(products: &mut [Product]) {
    products.sort_by(|a, b| b.created_at.cmp(&a.created_at));
}

/// Up to `limit` other active products in the same category, newest first.
#[must_use]
pub fn related_products(
    products: &[Product],
    category: ProductCategory,
    exclude: &ProductId,
    limit: usize,
) -> Vec<Product> {
    let filter = ProductFilter {
        category: Some(category),
        ..ProductFilter::default()
    };
    filter_products(products, &filter)
        .into_iter()
        .filter(|p| &p.id != exclude)
        .take(limit)
        .collect()
}

/// Number of active products per category, plus `"all"`.
///
/// Every category appears, with zero when it has no products.
#[must_use]
pub fn count_by_category(products: &[Product]) -> BTreeMap<String, usize> {
    let mut counts: BTreeMap<String, usize> = ProductCategory::ALL
        .iter()
        .map(|c| (c.as_str().to_owned(), 0))
        .collect();
    let mut all = 0;
    for product in products.iter().filter(|p| p.is_active()) {
        all += 1;
        *counts.entry(product.category.as_str().to_owned()).or_default() += 1;
    }
    counts.insert("all".to_owned(), all);
    counts
}

/// One page of a listing.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Page<T> {
    pub items: Vec<T>,
    pub page: u32,
    pub per_page: u32,
    pub total_items: usize,
    pub total_pages: u32,
}

impl<T> Page<T> {
    #[must_use]
    pub const fn has_more(&self) -> bool {
        self.page < self.total_pages
    }
}

/// Slice out page `page` (1-based) of `per_page` items.
///
/// Page numbers below 1 are treated as 1 and `per_page` of 0 as 1. A page past
/// the end is empty.
#[must_use]
pub fn paginate<T>(items: Vec<T>, page: u32, per_page: u32) -> Page<T> {
    let page = page.max(1);
    let per_page = per_page.max(1);
    let total_items = items.len();
    let per = per_page as usize;
    let total_pages = u32::try_from(total_items.div_ceil(per)).unwrap_or(u32::MAX);
    let skip = (page as usize - 1).saturating_mul(per);

    Page {
        items: items.into_iter().skip(skip).take(per).collect(),
        page,
        per_page,
        total_items,
        total_pages,
    }
}
