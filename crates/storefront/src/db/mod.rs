//! Database operations for storefront `PostgreSQL`.
//!
//! # Database: `muscle_shop`
//!
//! ## Tables
//!
//! - `storefront.product` - Catalog products
//! - `storefront.order` - Order documents (customer, address and items as JSONB)
//! - `tower_sessions.session` - Tower-sessions storage (carts, checkout state)
//!
//! # Migrations
//!
//! Migrations are stored in `crates/storefront/migrations/` and run via:
//! ```bash
//! cargo run -p muscle-shop-cli -- migrate
//! ```
//!
//! Handlers never talk to `PgPool` directly; they go through the
//! [`OrderRepository`] and [`ProductRepository`] ports held by `AppState`,
//! so tests can swap in the in-memory implementations from [`memory`].

pub mod memory;
pub mod orders;
pub mod products;

use std::time::Duration;

use async_trait::async_trait;
use muscle_shop_core::{CreatedOrder, NewOrder, Order, OrderNumber, Product, ProductId};
use secrecy::ExposeSecret;
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;
use thiserror::Error;

pub use memory::{InMemoryOrderRepository, InMemoryProductRepository};
pub use orders::PgOrderRepository;
pub use products::PgProductRepository;

/// Errors that can occur during repository operations.
#[derive(Debug, Error)]
pub enum RepositoryError {
    /// The store is not initialized or cannot be reached.
    #[error("order store unavailable: {0}")]
    Unavailable(String),

    /// Database error from sqlx.
    #[error("database error: {0}")]
    Database(sqlx::Error),

    /// Data in the database is corrupted or invalid.
    #[error("data corruption: {0}")]
    DataCorruption(String),

    /// Requested entity was not found.
    #[error("not found")]
    NotFound,

    /// Constraint violation (e.g., unique order number).
    #[error("constraint violation: {0}")]
    Conflict(String),
}

impl From<sqlx::Error> for RepositoryError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::PoolClosed | sqlx::Error::PoolTimedOut | sqlx::Error::Io(_) => {
                Self::Unavailable(err.to_string())
            }
            sqlx::Error::ColumnDecode { .. } | sqlx::Error::Decode(_) => {
                Self::DataCorruption(err.to_string())
            }
            other => Self::Database(other),
        }
    }
}

/// Persistence port for orders.
#[async_trait]
pub trait OrderRepository: Send + Sync {
    /// Persist a new order and return it with its generated id and number.
    ///
    /// Statuses start as `pending` and both timestamps are set to the store's
    /// current time. If an order for `order.submission_id` already exists it
    /// is returned unchanged with `replayed = true`.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Unavailable` if the store cannot be reached,
    /// `RepositoryError::Conflict` if no unique order number could be
    /// allocated, or another variant if the write fails.
    async fn create_order(&self, order: NewOrder) -> Result<CreatedOrder, RepositoryError>;

    /// Look up an order by its human-readable number.
    ///
    /// Returns the earliest-created match, or `None` if there is none.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError` if the store cannot be read.
    async fn get_by_order_number(
        &self,
        order_number: &OrderNumber,
    ) -> Result<Option<Order>, RepositoryError>;
}

/// Read port for the product catalog.
#[async_trait]
pub trait ProductRepository: Send + Sync {
    /// Every product regardless of status.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError` if the store cannot be read.
    async fn list_all(&self) -> Result<Vec<Product>, RepositoryError>;

    /// One product regardless of status.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError` if the store cannot be read.
    async fn get(&self, id: &ProductId) -> Result<Option<Product>, RepositoryError>;
}

/// Create a `PostgreSQL` connection pool with sensible defaults.
///
/// # Arguments
///
/// * `database_url` - `PostgreSQL` connection string (wrapped in `SecretString`)
///
/// # Errors
///
/// Returns `sqlx::Error` if the connection cannot be established.
pub async fn create_pool(database_url: &secrecy::SecretString) -> Result<PgPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(10)
        .min_connections(2)
        .acquire_timeout(Duration::from_secs(10))
        .connect(database_url.expose_secret())
        .await
}

/// Fail fast with `Unavailable` when the pool has been shut down.
fn ensure_open(pool: &PgPool) -> Result<(), RepositoryError> {
    if pool.is_closed() {
        return Err(RepositoryError::Unavailable(
            "connection pool is closed".to_owned(),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pool_errors_map_to_unavailable() {
        assert!(matches!(
            RepositoryError::from(sqlx::Error::PoolTimedOut),
            RepositoryError::Unavailable(_)
        ));
        assert!(matches!(
            RepositoryError::from(sqlx::Error::PoolClosed),
            RepositoryError::Unavailable(_)
        ));
    }

    #[test]
    fn test_row_not_found_is_database_error() {
        assert!(matches!(
            RepositoryError::from(sqlx::Error::RowNotFound),
            RepositoryError::Database(_)
        ));
    }
}
