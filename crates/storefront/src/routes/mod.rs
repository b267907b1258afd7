//! HTTP route handlers for storefront.
//!
//! All responses are JSON. Errors use the shape described in
//! [`crate::error`].
//!
//! # Route Structure
//!
//! ```text
//! GET  /health                 - Health check
//! GET  /health/ready           - Readiness (database reachable)
//!
//! # Products
//! GET  /api/products           - Product listing (?category&minPrice&maxPrice&page&perPage)
//! GET  /api/products/counts    - Active products per category
//! GET  /api/products/{id}      - Product detail with related products
//!
//! # Cart (session)
//! GET  /api/cart               - Current cart with totals
//! POST /api/cart/add           - Add a product
//! POST /api/cart/update        - Set a line's quantity (0 removes)
//! POST /api/cart/remove        - Remove a line
//! POST /api/cart/clear         - Empty the cart
//! POST /api/cart/open          - Show the cart panel
//! POST /api/cart/close         - Hide the cart panel
//!
//! # Checkout
//! GET  /api/checkout           - Form data, or redirect when there is nothing to buy
//! POST /api/checkout           - Place the order
//! GET  /api/order-complete     - Confirmation (?orderNumber&payment)
//! ```

pub mod cart;
pub mod checkout;
pub mod health;
pub mod order_complete;
pub mod products;

use axum::{
    Router,
    routing::{get, post},
};
use tower_sessions::{SessionManagerLayer, SessionStore};

use crate::middleware::request_id_middleware;
use crate::state::AppState;

/// Create the product routes router.
pub fn product_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(products::index))
        .route("/counts", get(products::counts))
        .route("/{id}", get(products::show))
}

/// Create the cart routes router.
pub fn cart_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(cart::show))
        .route("/add", post(cart::add))
        .route("/update", post(cart::update))
        .route("/remove", post(cart::remove))
        .route("/clear", post(cart::clear))
        .route("/open", post(cart::open))
        .route("/close", post(cart::close))
}

/// Create the main router with all routes.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/health", get(health::health))
        .route("/health/ready", get(health::readiness))
        .nest("/api/products", product_routes())
        .nest("/api/cart", cart_routes())
        .route("/api/checkout", get(checkout::show).post(checkout::submit))
        .route("/api/order-complete", get(order_complete::show))
}

/// The application: all routes with request ids and sessions, bound to
/// `state`.
pub fn app<S>(state: AppState, session_layer: SessionManagerLayer<S>) -> Router
where
    S: SessionStore + Clone,
{
    routes()
        .layer(axum::middleware::from_fn(request_id_middleware))
        .layer(session_layer)
        .with_state(state)
}
