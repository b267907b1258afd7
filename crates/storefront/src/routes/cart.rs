//! Cart route handlers.
//!
//! The cart lives in the visitor's session. Every handler responds with the
//! updated [`CartView`] so the client never has to re-fetch.

use axum::{Json, extract::State};
use muscle_shop_core::{CartLine, ProductId, Totals, Yen};
use serde::{Deserialize, Serialize};
use tower_sessions::Session;
use tracing::instrument;

use crate::error::{AppError, Result, add_breadcrumb};
use crate::services::cart::{CartStorage, CartStore, SessionCartStorage};
use crate::state::AppState;

/// One cart line for display.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CartLineView {
    #[serde(flatten)]
    pub line: CartLine,
    pub line_total: Yen,
}

/// Cart display data.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CartView {
    pub lines: Vec<CartLineView>,
    pub total_items: u64,
    pub totals: Totals,
    pub open: bool,
}

impl CartView {
    pub(crate) fn of<S: CartStorage>(store: &CartStore<S>) -> Self {
        Self {
            lines: line_views(store.cart().lines()),
            total_items: store.total_items(),
            totals: store.totals(),
            open: store.cart().is_open(),
        }
    }
}

pub(crate) fn line_views(lines: &[CartLine]) -> Vec<CartLineView> {
    lines
        .iter()
        .map(|line| CartLineView {
            line_total: line.line_total(),
            line: line.clone(),
        })
        .collect()
}

async fn load(session: Session) -> CartStore<SessionCartStorage> {
    CartStore::load(SessionCartStorage::new(session)).await
}

/// Add-to-cart request body.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddToCart {
    pub product_id: ProductId,
    pub quantity: Option<u32>,
}

/// Quantity update request body.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateQuantity {
    pub product_id: ProductId,
    /// Zero or below removes the line.
    pub quantity: i64,
}

/// Remove-line request body.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoveFromCart {
    pub product_id: ProductId,
}

/// `GET /api/cart`
pub async fn show(session: Session) -> Json<CartView> {
    Json(CartView::of(&load(session).await))
}

/// `POST /api/cart/add`
///
/// Snapshots the product's current name and price into the line and opens
/// the cart panel.
#[instrument(skip(state, session))]
pub async fn add(
    State(state): State<AppState>,
    session: Session,
    Json(body): Json<AddToCart>,
) -> Result<Json<CartView>> {
    let quantity = body.quantity.unwrap_or(1);
    if quantity == 0 {
        return Err(AppError::BadRequest("quantity must be at least 1".to_string()));
    }
    let product = state
        .catalog()
        .get_product(&body.product_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("product {}", body.product_id)))?;

    let mut cart = load(session).await;
    cart.add(&product, quantity).await;

    let quantity = quantity.to_string();
    add_breadcrumb(
        "cart",
        "Added to cart",
        Some(&[
            ("product_id", product.id.as_str()),
            ("quantity", quantity.as_str()),
        ]),
    );
    Ok(Json(CartView::of(&cart)))
}

/// `POST /api/cart/update`
pub async fn update(session: Session, Json(body): Json<UpdateQuantity>) -> Json<CartView> {
    let mut cart = load(session).await;
    cart.update_quantity(&body.product_id, body.quantity).await;
    Json(CartView::of(&cart))
}

/// `POST /api/cart/remove`
pub async fn remove(session: Session, Json(body): Json<RemoveFromCart>) -> Json<CartView> {
    let mut cart = load(session).await;
    cart.remove(&body.product_id).await;
    Json(CartView::of(&cart))
}

/// `POST /api/cart/clear`
pub async fn clear(session: Session) -> Json<CartView> {
    let mut cart = load(session).await;
    cart.clear().await;
    Json(CartView::of(&cart))
}

/// `POST /api/cart/open`
pub async fn open(session: Session) -> Json<CartView> {
    let mut cart = load(session).await;
    cart.open().await;
    Json(CartView::of(&cart))
}

/// `POST /api/cart/close`
pub async fn close(session: Session) -> Json<CartView> {
    let mut cart = load(session).await;
    cart.close().await;
    Json(CartView::of(&cart))
}
