//! In-memory repositories for tests and local development.
//!
//! They follow the same contract as the `PostgreSQL` repositories: unique
//! order numbers with bounded retry, submission replay, and earliest-match
//! lookup.

use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use muscle_shop_core::{
    CreatedOrder, NewOrder, Order, OrderId, OrderNumber, Product, ProductId, SubmissionId,
};
use tokio::sync::RwLock;

use super::orders::MAX_ORDER_NUMBER_ATTEMPTS;
use super::{OrderRepository, ProductRepository, RepositoryError};

type NumberSource = Box<dyn Fn(DateTime<Utc>) -> OrderNumber + Send + Sync>;

#[derive(Default)]
struct OrderTable {
    orders: Vec<Order>,
    by_submission: HashMap<SubmissionId, OrderId>,
}

/// Order store held in process memory.
pub struct InMemoryOrderRepository {
    table: RwLock<OrderTable>,
    next_id: AtomicI64,
    number_source: NumberSource,
}

impl Default for InMemoryOrderRepository {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryOrderRepository {
    #[must_use]
    pub fn new() -> Self {
        Self::with_number_source(OrderNumber::generate)
    }

    /// Use `source` instead of random generation for new order numbers.
    #[must_use]
    pub fn with_number_source(
        source: impl Fn(DateTime<Utc>) -> OrderNumber + Send + Sync + 'static,
    ) -> Self {
        Self {
            table: RwLock::new(OrderTable::default()),
            next_id: AtomicI64::new(1),
            number_source: Box::new(source),
        }
    }

    /// Every stored order, in insertion order.
    pub async fn orders(&self) -> Vec<Order> {
        self.table.read().await.orders.clone()
    }

    /// Store an order as-is, bypassing number generation.
    pub async fn insert_raw(&self, order: Order) {
        self.table.write().await.orders.push(order);
    }
}

#[async_trait]
impl OrderRepository for InMemoryOrderRepository {
    async fn create_order(&self, new_order: NewOrder) -> Result<CreatedOrder, RepositoryError> {
        let mut table = self.table.write().await;

        if let Some(id) = table.by_submission.get(&new_order.submission_id)
            && let Some(order) = table.orders.iter().find(|o| o.id == *id)
        {
            return Ok(CreatedOrder {
                order: order.clone(),
                replayed: true,
            });
        }

        let now = Utc::now();
        for attempt in 1..=MAX_ORDER_NUMBER_ATTEMPTS {
            let order_number = (self.number_source)(now);
            if table.orders.iter().any(|o| o.order_number == order_number) {
                tracing::warn!(attempt, %order_number, "Order number collision, retrying");
                continue;
            }

            let id = OrderId::new(self.next_id.fetch_add(1, Ordering::Relaxed));
            let submission_id = new_order.submission_id;
            let order = new_order.into_order(id, order_number, now);
            table.by_submission.insert(submission_id, id);
            table.orders.push(order.clone());
            return Ok(CreatedOrder {
                order,
                replayed: false,
            });
        }

        Err(RepositoryError::Conflict(format!(
            "no free order number after {MAX_ORDER_NUMBER_ATTEMPTS} attempts"
        )))
    }

    async fn get_by_order_number(
        &self,
        order_number: &OrderNumber,
    ) -> Result<Option<Order>, RepositoryError> {
        let table = self.table.read().await;
        Ok(table
            .orders
            .iter()
            .filter(|o| &o.order_number == order_number)
            .min_by_key(|o| (o.created_at, o.id))
            .cloned())
    }
}

/// Product catalog held in process memory.
#[derive(Default)]
pub struct InMemoryProductRepository {
    products: RwLock<Vec<Product>>,
}

impl InMemoryProductRepository {
    #[must_use]
    pub fn new(products: Vec<Product>) -> Self {
        Self {
            products: RwLock::new(products),
        }
    }

    /// Replace a product with the same id, or append it.
    pub async fn put(&self, product: Product) {
        let mut products = self.products.write().await;
        if let Some(existing) = products.iter_mut().find(|p| p.id == product.id) {
            *existing = product;
        } else {
            products.push(product);
        }
    }
}

#[async_trait]
impl ProductRepository for InMemoryProductRepository {
    async fn list_all(&self) -> Result<Vec<Product>, RepositoryError> {
        Ok(self.products.read().await.clone())
    }

    async fn get(&self, id: &ProductId) -> Result<Option<Product>, RepositoryError> {
        Ok(self
            .products
            .read()
            .await
            .iter()
            .find(|p| &p.id == id)
            .cloned())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::atomic::AtomicU16;

    use chrono::NaiveDate;
    use muscle_shop_core::{
        CartLine, Customer, Email, OrderStatus, PaymentMethod, PaymentStatus, ShippingAddress,
        Yen,
    };

    use super::*;

    fn new_order(submission_id: SubmissionId) -> NewOrder {
        NewOrder {
            customer: Customer {
                name: "山田 太郎".to_owned(),
                email: Email::parse("taro@example.jp").unwrap(),
                phone: "090-1234-5678".to_owned(),
            },
            shipping_address: ShippingAddress {
                zip_code: "150-0001".to_owned(),
                prefecture: "東京都".to_owned(),
                city: "渋谷区".to_owned(),
                address: "神宮前1-2-3".to_owned(),
                building: None,
            },
            lines: vec![CartLine {
                product_id: ProductId::new("whey"),
                name: "ホエイプロテイン".to_owned(),
                unit_price: Yen::new(3000),
                quantity: 2,
                image: String::new(),
            }],
            payment_method: PaymentMethod::BankTransfer,
            submission_id,
        }
    }

    fn fixed_number(suffix: u16) -> OrderNumber {
        OrderNumber::from_parts(NaiveDate::from_ymd_opt(2026, 5, 1).unwrap(), suffix)
    }

    #[tokio::test]
    async fn test_create_order_sets_pending_and_totals() {
        let repo = InMemoryOrderRepository::new();
        let created = repo.create_order(new_order(SubmissionId::random())).await.unwrap();

        assert!(!created.replayed);
        let order = created.order;
        assert_eq!(order.payment_status, PaymentStatus::Pending);
        assert_eq!(order.status, OrderStatus::Pending);
        assert_eq!(order.subtotal, Yen::new(6000));
        assert_eq!(order.total, Yen::new(7100));
        assert_eq!(order.created_at, order.updated_at);
    }

    #[tokio::test]
    async fn test_same_submission_replays() {
        let repo = InMemoryOrderRepository::new();
        let submission = SubmissionId::random();

        let first = repo.create_order(new_order(submission)).await.unwrap();
        let second = repo.create_order(new_order(submission)).await.unwrap();

        assert!(second.replayed);
        assert_eq!(first.order, second.order);
        assert_eq!(repo.orders().await.len(), 1);
    }

    #[tokio::test]
    async fn test_collision_retries_with_new_number() {
        let calls = AtomicU16::new(0);
        let repo = InMemoryOrderRepository::with_number_source(move |_| {
            // first two orders both draw 0001; the second retries and gets 0002
            let n = calls.fetch_add(1, Ordering::Relaxed);
            fixed_number(if n < 2 { 1 } else { 2 })
        });

        let a = repo.create_order(new_order(SubmissionId::random())).await.unwrap();
        let b = repo.create_order(new_order(SubmissionId::random())).await.unwrap();

        assert_eq!(a.order_number().as_str(), "ORD-20260501-0001");
        assert_eq!(b.order_number().as_str(), "ORD-20260501-0002");
    }

    #[tokio::test]
    async fn test_collision_gives_up_after_max_attempts() {
        let repo = InMemoryOrderRepository::with_number_source(|_| fixed_number(7));
        repo.create_order(new_order(SubmissionId::random())).await.unwrap();

        let err = repo
            .create_order(new_order(SubmissionId::random()))
            .await
            .unwrap_err();
        assert!(matches!(err, RepositoryError::Conflict(_)));
        assert_eq!(repo.orders().await.len(), 1);
    }

    #[tokio::test]
    async fn test_lookup_returns_earliest_duplicate() {
        let repo = InMemoryOrderRepository::new();
        let created = repo.create_order(new_order(SubmissionId::random())).await.unwrap();

        let mut later = created.order.clone();
        later.id = OrderId::new(99);
        later.created_at += chrono::TimeDelta::minutes(5);
        repo.insert_raw(later).await;

        let found = repo
            .get_by_order_number(created.order_number())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(found.id, created.id());
    }

    #[tokio::test]
    async fn test_lookup_unknown_number_is_none() {
        let repo = InMemoryOrderRepository::new();
        let missing = fixed_number(1234);
        assert!(repo.get_by_order_number(&missing).await.unwrap().is_none());
    }
}
