//! Shared harness for router tests.
//!
//! Builds the real router over in-memory repositories and an in-memory
//! session store, and keeps the session cookie between requests like a
//! browser would.

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::Router;
use axum::body::Body;
use axum::http::{HeaderMap, Request, StatusCode, header};
use chrono::{TimeZone, Utc};
use serde_json::{Value, json};
use tokio::sync::{Notify, mpsc};
use tokio::task::JoinHandle;
use tower::ServiceExt;
use tower_sessions::MemoryStore;

use muscle_shop_core::{
    CreatedOrder, NewOrder, Order, OrderNumber, Product, ProductCategory, ProductId, ProductStatus,
    Yen,
};
use muscle_shop_storefront::db::{
    InMemoryOrderRepository, InMemoryProductRepository, OrderRepository, RepositoryError,
};
use muscle_shop_storefront::middleware::session_layer_with_store;
use muscle_shop_storefront::routes;
use muscle_shop_storefront::services::email::MailError;
use muscle_shop_storefront::services::notification::{
    NotificationError, NotificationTemplate, OrderNotifier,
};
use muscle_shop_storefront::state::AppState;

// ============================================================================
// Fixtures
// ============================================================================

pub fn product(id: &str, price: i64, category: ProductCategory, day: u32) -> Product {
    let created = Utc
        .with_ymd_and_hms(2026, 3, day, 0, 0, 0)
        .single()
        .expect("valid date");
    Product {
        id: ProductId::new(id),
        name: format!("商品 {id}"),
        description: String::new(),
        long_description: None,
        price: Yen::new(price),
        original_price: None,
        stock: 10,
        category,
        status: ProductStatus::Active,
        images: vec![format!("/images/{id}.jpg")],
        rating: None,
        reviews: None,
        details: None,
        created_at: created,
        updated_at: created,
    }
}

/// whey ¥3,000, creatine ¥6,000, belt ¥4,000, plus one retired product.
pub fn catalog() -> Vec<Product> {
    let mut retired = product("retired", 1000, ProductCategory::Wear, 4);
    retired.status = ProductStatus::Inactive;
    vec![
        product("whey", 3000, ProductCategory::Supplement, 1),
        product("creatine", 6000, ProductCategory::Supplement, 2),
        product("belt", 4000, ProductCategory::Equipment, 3),
        retired,
    ]
}

pub fn checkout_form(payment_method: &str) -> Value {
    json!({
        "lastName": "山田",
        "firstName": "太郎",
        "lastNameKana": "ヤマダ",
        "firstNameKana": "タロウ",
        "email": "taro@example.com",
        "phone": "090-1234-5678",
        "zipCode": "150-0001",
        "prefecture": "東京都",
        "city": "渋谷区",
        "address": "神宮前1-2-3",
        "building": "",
        "paymentMethod": payment_method,
        "cardNumber": "4242 4242 4242 4242",
        "cardName": "TARO YAMADA",
        "cardExpiry": "12/30",
        "cardCvc": "123",
    })
}

// ============================================================================
// Test doubles
// ============================================================================

/// Forwards every notification to a channel.
pub struct RecordingNotifier {
    sent: mpsc::UnboundedSender<(Order, NotificationTemplate)>,
}

#[async_trait]
impl OrderNotifier for RecordingNotifier {
    async fn notify_order_complete(
        &self,
        order: &Order,
        template: NotificationTemplate,
    ) -> Result<(), NotificationError> {
        let _ = self.sent.send((order.clone(), template));
        Ok(())
    }
}

/// Notifier whose mail server always rejects the message.
pub struct FailingNotifier;

#[async_trait]
impl OrderNotifier for FailingNotifier {
    async fn notify_order_complete(
        &self,
        _order: &Order,
        _template: NotificationTemplate,
    ) -> Result<(), NotificationError> {
        Err(MailError::InvalidAddress("relay refused".to_owned()).into())
    }
}

/// Working order store whose writes wait until [`Self::release`] is called.
#[derive(Default)]
pub struct BlockingOrders {
    inner: InMemoryOrderRepository,
    entered: Notify,
    released: Notify,
}

impl BlockingOrders {
    /// Wait until a write has started.
    pub async fn wait_for_write(&self) {
        self.entered.notified().await;
    }

    /// Let the pending write finish.
    pub fn release(&self) {
        self.released.notify_one();
    }
}

#[async_trait]
impl OrderRepository for BlockingOrders {
    async fn create_order(&self, order: NewOrder) -> Result<CreatedOrder, RepositoryError> {
        self.entered.notify_one();
        self.released.notified().await;
        self.inner.create_order(order).await
    }

    async fn get_by_order_number(
        &self,
        order_number: &OrderNumber,
    ) -> Result<Option<Order>, RepositoryError> {
        self.inner.get_by_order_number(order_number).await
    }
}

/// Order store that is always down.
pub struct UnavailableOrders;

#[async_trait]
impl OrderRepository for UnavailableOrders {
    async fn create_order(&self, _order: NewOrder) -> Result<CreatedOrder, RepositoryError> {
        Err(RepositoryError::Unavailable("connection refused".to_owned()))
    }

    async fn get_by_order_number(
        &self,
        _order_number: &OrderNumber,
    ) -> Result<Option<Order>, RepositoryError> {
        Err(RepositoryError::Unavailable("connection refused".to_owned()))
    }
}

// ============================================================================
// Harness
// ============================================================================

pub struct TestResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Value,
}

impl TestResponse {
    pub fn location(&self) -> Option<&str> {
        self.headers
            .get(header::LOCATION)
            .and_then(|v| v.to_str().ok())
    }
}

pub struct TestApp {
    router: Router,
    cookie: Option<String>,
    notifications: mpsc::UnboundedReceiver<(Order, NotificationTemplate)>,
    pub products: Arc<InMemoryProductRepository>,
}

impl TestApp {
    /// App over a working in-memory order store, returned alongside it.
    pub fn new() -> (Self, Arc<InMemoryOrderRepository>) {
        let orders = Arc::new(InMemoryOrderRepository::new());
        (Self::with_orders(orders.clone()), orders)
    }

    pub fn with_orders(orders: Arc<dyn OrderRepository>) -> Self {
        let (sent, notifications) = mpsc::unbounded_channel();
        Self::build(orders, Arc::new(RecordingNotifier { sent }), notifications)
    }

    /// App whose confirmation emails go to `notifier` instead of the
    /// recording channel.
    pub fn with_notifier(
        orders: Arc<dyn OrderRepository>,
        notifier: Arc<dyn OrderNotifier>,
    ) -> Self {
        let (_sent, notifications) = mpsc::unbounded_channel();
        Self::build(orders, notifier, notifications)
    }

    fn build(
        orders: Arc<dyn OrderRepository>,
        notifier: Arc<dyn OrderNotifier>,
        notifications: mpsc::UnboundedReceiver<(Order, NotificationTemplate)>,
    ) -> Self {
        let products = Arc::new(InMemoryProductRepository::new(catalog()));
        let state = AppState::from_parts(orders, products.clone(), notifier);
        let router = routes::app(state, session_layer_with_store(MemoryStore::default(), false));

        Self {
            router,
            cookie: None,
            notifications,
            products,
        }
    }

    pub async fn get(&mut self, uri: &str) -> TestResponse {
        let request = self.request("GET", uri).body(Body::empty()).expect("request");
        self.send(request).await
    }

    pub async fn post(&mut self, uri: &str, body: Value) -> TestResponse {
        let request = self
            .request("POST", uri)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .expect("request");
        self.send(request).await
    }

    /// Send a POST with the current cookie on a separate task, as a second
    /// tab would. The cookie from its response is not kept.
    pub fn spawn_post(&self, uri: &str, body: Value) -> JoinHandle<StatusCode> {
        let request = self
            .request("POST", uri)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .expect("request");
        let router = self.router.clone();
        tokio::spawn(async move {
            router
                .oneshot(request)
                .await
                .expect("router is infallible")
                .status()
        })
    }

    /// Next notification, waiting briefly for the background task.
    pub async fn next_notification(&mut self) -> Option<(Order, NotificationTemplate)> {
        tokio::time::timeout(Duration::from_secs(2), self.notifications.recv())
            .await
            .ok()
            .flatten()
    }

    /// Whether a notification is waiting, after giving spawned tasks a turn.
    pub async fn has_pending_notification(&mut self) -> bool {
        tokio::time::sleep(Duration::from_millis(50)).await;
        !self.notifications.is_empty()
    }

    fn request(&self, method: &str, uri: &str) -> axum::http::request::Builder {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(cookie) = &self.cookie {
            builder = builder.header(header::COOKIE, cookie);
        }
        builder
    }

    async fn send(&mut self, request: Request<Body>) -> TestResponse {
        let response = self
            .router
            .clone()
            .oneshot(request)
            .await
            .expect("router is infallible");

        if let Some(set_cookie) = response.headers().get(header::SET_COOKIE)
            && let Ok(value) = set_cookie.to_str()
            && let Some(pair) = value.split(';').next()
        {
            self.cookie = Some(pair.to_owned());
        }

        let status = response.status();
        let headers = response.headers().clone();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("body");
        let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);

        TestResponse {
            status,
            headers,
            body,
        }
    }
}
