//! Cart store: a visitor's [`Cart`] plus its persistence.
//!
//! Each request loads the cart from a [`CartStorage`], applies one
//! operation, and writes it back. Storage failures are logged and
//! swallowed: cart operations never fail from the caller's point of view,
//! and a cart that cannot be loaded starts out empty.

use std::sync::Arc;

use async_trait::async_trait;
use muscle_shop_core::{Cart, CartLine, Product, ProductId, Totals, Yen, calculate_totals};
use thiserror::Error;
use tokio::sync::Mutex;
use tower_sessions::Session;

use crate::models::session::keys;

/// Errors from the storage adapter. Never surfaced past [`CartStore`].
#[derive(Debug, Error)]
pub enum CartStorageError {
    #[error("session error: {0}")]
    Session(#[from] tower_sessions::session::Error),
}

/// Where a cart is persisted between requests.
#[async_trait]
pub trait CartStorage: Send + Sync {
    /// # Errors
    ///
    /// Returns error if the stored cart cannot be read.
    async fn load(&self) -> Result<Option<Cart>, CartStorageError>;

    /// # Errors
    ///
    /// Returns error if the cart cannot be written.
    async fn save(&self, cart: &Cart) -> Result<(), CartStorageError>;
}

/// Cart persisted in the visitor's tower-sessions session.
#[derive(Clone)]
pub struct SessionCartStorage {
    session: Session,
}

impl SessionCartStorage {
    #[must_use]
    pub const fn new(session: Session) -> Self {
        Self { session }
    }
}

#[async_trait]
impl CartStorage for SessionCartStorage {
    async fn load(&self) -> Result<Option<Cart>, CartStorageError> {
        Ok(self.session.get::<Cart>(keys::CART).await?)
    }

    async fn save(&self, cart: &Cart) -> Result<(), CartStorageError> {
        self.session.insert(keys::CART, cart).await?;
        Ok(())
    }
}

/// Cart persisted in process memory. Clones share the same cart.
#[derive(Clone, Default)]
pub struct MemoryCartStorage {
    cart: Arc<Mutex<Option<Cart>>>,
}

impl MemoryCartStorage {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The last saved cart, if any.
    pub async fn saved(&self) -> Option<Cart> {
        self.cart.lock().await.clone()
    }
}

#[async_trait]
impl CartStorage for MemoryCartStorage {
    async fn load(&self) -> Result<Option<Cart>, CartStorageError> {
        Ok(self.cart.lock().await.clone())
    }

    async fn save(&self, cart: &Cart) -> Result<(), CartStorageError> {
        *self.cart.lock().await = Some(cart.clone());
        Ok(())
    }
}

/// A loaded cart bound to its storage.
pub struct CartStore<S> {
    storage: S,
    cart: Cart,
}

impl<S: CartStorage> CartStore<S> {
    /// Load the cart from `storage`, starting empty if there is none or it
    /// cannot be read.
    pub async fn load(storage: S) -> Self {
        let cart = match storage.load().await {
            Ok(cart) => cart.unwrap_or_default(),
            Err(e) => {
                tracing::warn!(error = %e, "Failed to load cart, starting empty");
                Cart::new()
            }
        };
        Self { storage, cart }
    }

    /// Add `quantity` of `product`, merging with an existing line.
    pub async fn add(&mut self, product: &Product, quantity: u32) {
        self.cart.add(CartLine::for_product(product, quantity));
        self.persist().await;
    }

    /// Set a line's quantity; zero or below removes it.
    pub async fn update_quantity(&mut self, product_id: &ProductId, quantity: i64) {
        if self.cart.update_quantity(product_id, quantity) {
            self.persist().await;
        }
    }

    pub async fn remove(&mut self, product_id: &ProductId) {
        if self.cart.remove(product_id) {
            self.persist().await;
        }
    }

    /// Empty the cart. Used after an order has been placed.
    pub async fn clear(&mut self) {
        self.cart.clear();
        self.persist().await;
    }

    pub async fn open(&mut self) {
        self.cart.open();
        self.persist().await;
    }

    pub async fn close(&mut self) {
        self.cart.close();
        self.persist().await;
    }

    #[must_use]
    pub fn total_items(&self) -> u64 {
        self.cart.total_items()
    }

    /// Subtotal of all lines.
    #[must_use]
    pub fn total_price(&self) -> Yen {
        self.cart.total_price()
    }

    #[must_use]
    pub fn totals(&self) -> Totals {
        calculate_totals(self.cart.lines())
    }

    #[must_use]
    pub const fn cart(&self) -> &Cart {
        &self.cart
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.cart.is_empty()
    }

    async fn persist(&self) {
        if let Err(e) = self.storage.save(&self.cart).await {
            tracing::warn!(error = %e, "Failed to persist cart");
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use chrono::Utc;
    use muscle_shop_core::{ProductCategory, ProductStatus};

    use super::*;

    fn product(id: &str, price: i64) -> Product {
        let now = Utc::now();
        Product {
            id: ProductId::new(id),
            name: format!("product {id}"),
            description: String::new(),
            long_description: None,
            price: Yen::new(price),
            original_price: None,
            stock: 5,
            category: ProductCategory::Supplement,
            status: ProductStatus::Active,
            images: vec![],
            rating: None,
            reviews: None,
            details: None,
            created_at: now,
            updated_at: now,
        }
    }

    struct BrokenStorage;

    #[async_trait]
    impl CartStorage for BrokenStorage {
        async fn load(&self) -> Result<Option<Cart>, CartStorageError> {
            Err(tower_sessions::session::Error::Store(
                tower_sessions::session_store::Error::Backend("quota exceeded".to_owned()),
            )
            .into())
        }

        async fn save(&self, _cart: &Cart) -> Result<(), CartStorageError> {
            self.load().await.map(|_| ())
        }
    }

    #[tokio::test]
    async fn test_changes_are_persisted() {
        let storage = MemoryCartStorage::new();
        let mut store = CartStore::load(storage.clone()).await;
        store.add(&product("whey", 3000), 2).await;
        store.add(&product("whey", 3000), 3).await;

        let reloaded = CartStore::load(storage.clone()).await;
        assert_eq!(reloaded.total_items(), 5);
        assert_eq!(reloaded.cart().lines().len(), 1);
        assert!(reloaded.cart().is_open());
    }

    #[tokio::test]
    async fn test_update_to_zero_removes_and_persists() {
        let storage = MemoryCartStorage::new();
        let mut store = CartStore::load(storage.clone()).await;
        store.add(&product("belt", 4000), 1).await;
        store.update_quantity(&ProductId::new("belt"), 0).await;

        assert!(storage.saved().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_clear_survives_reload() {
        let storage = MemoryCartStorage::new();
        let mut store = CartStore::load(storage.clone()).await;
        store.add(&product("whey", 3000), 2).await;
        store.clear().await;

        assert!(CartStore::load(storage).await.is_empty());
    }

    #[tokio::test]
    async fn test_storage_errors_are_swallowed() {
        let mut store = CartStore::load(BrokenStorage).await;
        assert!(store.is_empty());

        store.add(&product("whey", 3000), 2).await;
        assert_eq!(store.total_price(), Yen::new(6000));
        assert_eq!(store.totals().total, Yen::new(7100));
    }
}
