//! Application state shared across handlers.

use std::sync::Arc;

use sqlx::PgPool;

use crate::config::{BankTransferConfig, StorefrontConfig};
use crate::db::{OrderRepository, PgOrderRepository, PgProductRepository, ProductRepository};
use crate::services::catalog::Catalog;
use crate::services::checkout::CheckoutService;
use crate::services::email::{EmailService, MailError};
use crate::services::notification::{
    EmailNotifier, NotificationDispatcher, OrderEmailRenderer, OrderNotifier,
};

/// Application state shared across all handlers.
///
/// This struct is cheaply cloneable via `Arc`. Repositories and the notifier
/// are trait objects so tests can build the state from in-memory parts.
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    pool: Option<PgPool>,
    bank: BankTransferConfig,
    orders: Arc<dyn OrderRepository>,
    catalog: Catalog,
    checkout: CheckoutService,
}

impl AppState {
    /// Create the production state: `PostgreSQL` repositories and the
    /// email notifier.
    ///
    /// # Errors
    ///
    /// Returns an error if SMTP is configured but invalid.
    pub fn new(config: &StorefrontConfig, pool: PgPool) -> Result<Self, MailError> {
        let mailer = EmailService::from_config(config.email.as_ref(), &config.shop.name)?;
        if !mailer.is_smtp() {
            tracing::warn!("SMTP not configured, order emails will only be logged");
        }
        let notifier = EmailNotifier::new(
            OrderEmailRenderer::new(config.shop.clone(), config.bank.clone()),
            mailer,
        );

        Ok(Self::build(
            Arc::new(PgOrderRepository::new(pool.clone())),
            Arc::new(PgProductRepository::new(pool.clone())),
            Arc::new(notifier),
            config.bank.clone(),
            Some(pool),
        ))
    }

    /// Assemble state from its ports, without a database pool. Bank
    /// details are the defaults.
    #[must_use]
    pub fn from_parts(
        orders: Arc<dyn OrderRepository>,
        products: Arc<dyn ProductRepository>,
        notifier: Arc<dyn OrderNotifier>,
    ) -> Self {
        Self::build(
            orders,
            products,
            notifier,
            BankTransferConfig::default(),
            None,
        )
    }

    fn build(
        orders: Arc<dyn OrderRepository>,
        products: Arc<dyn ProductRepository>,
        notifier: Arc<dyn OrderNotifier>,
        bank: BankTransferConfig,
        pool: Option<PgPool>,
    ) -> Self {
        let catalog = Catalog::new(products);
        let checkout = CheckoutService::new(
            Arc::clone(&orders),
            catalog.clone(),
            NotificationDispatcher::new(notifier),
        );

        Self {
            inner: Arc::new(AppStateInner {
                pool,
                bank,
                orders,
                catalog,
                checkout,
            }),
        }
    }

    /// Get the database connection pool, if the state was built with one.
    #[must_use]
    pub fn pool(&self) -> Option<&PgPool> {
        self.inner.pool.as_ref()
    }

    /// Account shown to customers paying by bank transfer.
    #[must_use]
    pub fn bank(&self) -> &BankTransferConfig {
        &self.inner.bank
    }

    #[must_use]
    pub fn orders(&self) -> &dyn OrderRepository {
        self.inner.orders.as_ref()
    }

    #[must_use]
    pub fn catalog(&self) -> &Catalog {
        &self.inner.catalog
    }

    #[must_use]
    pub fn checkout(&self) -> &CheckoutService {
        &self.inner.checkout
    }
}
