//! Catalog route handlers.

use std::collections::BTreeMap;

use axum::{
    Json,
    extract::{Path, Query, State},
};
use muscle_shop_core::product::Page;
use muscle_shop_core::{Product, ProductCategory, ProductFilter, ProductId, Yen};
use serde::{Deserialize, Serialize};
use tracing::instrument;

use crate::error::{AppError, Result};
use crate::services::catalog::RELATED_PRODUCTS_LIMIT;
use crate::state::AppState;

/// Products per listing page.
pub const DEFAULT_PER_PAGE: u32 = 30;

/// Largest page size a client may ask for.
const MAX_PER_PAGE: u32 = 100;

/// Query parameters for the product listing.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListQuery {
    /// Category slug, or `all`.
    pub category: Option<String>,
    pub min_price: Option<i64>,
    pub max_price: Option<i64>,
    pub page: Option<u32>,
    pub per_page: Option<u32>,
}

impl ListQuery {
    fn filter(&self) -> Result<ProductFilter> {
        let category = match self.category.as_deref() {
            None | Some("" | "all") => None,
            Some(slug) => Some(
                slug.parse::<ProductCategory>()
                    .map_err(|e| AppError::BadRequest(e.to_string()))?,
            ),
        };
        Ok(ProductFilter {
            category,
            min_price: self.min_price.map(Yen::new),
            max_price: self.max_price.map(Yen::new),
        })
    }
}

/// Product page data: the product and a few from the same category.
#[derive(Debug, Serialize)]
pub struct ProductDetail {
    pub product: Product,
    pub related: Vec<Product>,
}

/// `GET /api/products`
#[instrument(skip(state))]
pub async fn index(
    State(state): State<AppState>,
    Query(query): Query<ListQuery>,
) -> Result<Json<Page<Product>>> {
    let filter = query.filter()?;
    let per_page = query
        .per_page
        .unwrap_or(DEFAULT_PER_PAGE)
        .clamp(1, MAX_PER_PAGE);
    let page = state
        .catalog()
        .list_page(&filter, query.page.unwrap_or(1), per_page)
        .await?;
    Ok(Json(page))
}

/// `GET /api/products/counts`
pub async fn counts(State(state): State<AppState>) -> Result<Json<BTreeMap<String, usize>>> {
    Ok(Json(state.catalog().count_by_category().await?))
}

/// `GET /api/products/{id}`
#[instrument(skip(state))]
pub async fn show(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<ProductDetail>> {
    let id = ProductId::new(id);
    let product = state
        .catalog()
        .get_product(&id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("product {id}")))?;
    let related = state
        .catalog()
        .related_products(&product, RELATED_PRODUCTS_LIMIT)
        .await?;
    Ok(Json(ProductDetail { product, related }))
}
