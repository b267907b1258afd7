//! Order repository backed by `storefront.order`.
//!
//! Customer, shipping address and items are stored as JSONB documents so
//! that optional fields (the building line, item images) are simply absent
//! rather than `NULL` columns.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use muscle_shop_core::{
    CreatedOrder, Customer, NewOrder, Order, OrderId, OrderItem, OrderNumber, ShippingAddress,
    SubmissionId,
};
use sqlx::postgres::PgRow;
use sqlx::types::Json;
use sqlx::{PgPool, Row};

use super::{OrderRepository, RepositoryError, ensure_open};

/// Order numbers carry only 10,000 suffixes per day, so a collision is
/// retried with a fresh number a bounded number of times.
pub const MAX_ORDER_NUMBER_ATTEMPTS: usize = 5;

const ORDER_NUMBER_CONSTRAINT: &str = "order_order_number_key";

/// `PostgreSQL` implementation of [`OrderRepository`].
#[derive(Clone)]
pub struct PgOrderRepository {
    pool: PgPool,
}

impl PgOrderRepository {
    /// Create a new order repository.
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Insert one order under `order_number`.
    ///
    /// Returns `None` when an order for the same submission already exists.
    async fn insert(
        &self,
        new_order: &NewOrder,
        order_number: &OrderNumber,
    ) -> Result<Option<Order>, RepositoryError> {
        let totals = new_order.totals();
        let items: Vec<OrderItem> = new_order.lines.iter().map(OrderItem::from).collect();

        let row = sqlx::query(
            r"
            INSERT INTO storefront.order (
                order_number, submission_id, customer, shipping_address, items,
                subtotal, tax, shipping, total, payment_method
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            ON CONFLICT (submission_id) DO NOTHING
            RETURNING id, created_at
            ",
        )
        .bind(order_number.as_str())
        .bind(new_order.submission_id)
        .bind(Json(&new_order.customer))
        .bind(Json(&new_order.shipping_address))
        .bind(Json(&items))
        .bind(totals.subtotal)
        .bind(totals.tax)
        .bind(totals.shipping)
        .bind(totals.total)
        .bind(new_order.payment_method)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            if let sqlx::Error::Database(ref db_err) = e
                && db_err.constraint() == Some(ORDER_NUMBER_CONSTRAINT)
            {
                return RepositoryError::Conflict(format!(
                    "order number {order_number} already exists"
                ));
            }
            RepositoryError::from(e)
        })?;

        let Some(row) = row else {
            return Ok(None);
        };
        let id: OrderId = row.try_get("id")?;
        let created_at: DateTime<Utc> = row.try_get("created_at")?;

        Ok(Some(new_order.clone().into_order(
            id,
            order_number.clone(),
            created_at,
        )))
    }

    async fn find_by_submission(
        &self,
        submission_id: SubmissionId,
    ) -> Result<Option<Order>, RepositoryError> {
        let row = sqlx::query(
            r"
            SELECT id, order_number, customer, shipping_address, items,
                   subtotal, tax, shipping, total,
                   payment_method, payment_status, status, created_at, updated_at
            FROM storefront.order
            WHERE submission_id = $1
            ",
        )
        .bind(submission_id)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(order_from_row).transpose()
    }
}

#[async_trait]
impl OrderRepository for PgOrderRepository {
    #[tracing::instrument(skip(self, new_order), fields(submission_id = %new_order.submission_id))]
    async fn create_order(&self, new_order: NewOrder) -> Result<CreatedOrder, RepositoryError> {
        ensure_open(&self.pool)?;

        if let Some(order) = self.find_by_submission(new_order.submission_id).await? {
            tracing::info!(order_number = %order.order_number, "Replaying existing order for submission");
            return Ok(CreatedOrder {
                order,
                replayed: true,
            });
        }

        for attempt in 1..=MAX_ORDER_NUMBER_ATTEMPTS {
            let order_number = OrderNumber::generate(Utc::now());
            match self.insert(&new_order, &order_number).await {
                Ok(Some(order)) => {
                    return Ok(CreatedOrder {
                        order,
                        replayed: false,
                    });
                }
                // A concurrent request for the same submission won the race.
                Ok(None) => {
                    let order = self
                        .find_by_submission(new_order.submission_id)
                        .await?
                        .ok_or(RepositoryError::NotFound)?;
                    return Ok(CreatedOrder {
                        order,
                        replayed: true,
                    });
                }
                Err(RepositoryError::Conflict(reason)) => {
                    tracing::warn!(attempt, %reason, "Order number collision, retrying");
                }
                Err(e) => return Err(e),
            }
        }

        Err(RepositoryError::Conflict(format!(
            "no free order number after {MAX_ORDER_NUMBER_ATTEMPTS} attempts"
        )))
    }

    #[tracing::instrument(skip(self), fields(order_number = %order_number))]
    async fn get_by_order_number(
        &self,
        order_number: &OrderNumber,
    ) -> Result<Option<Order>, RepositoryError> {
        ensure_open(&self.pool)?;

        let row = sqlx::query(
            r"
            SELECT id, order_number, customer, shipping_address, items,
                   subtotal, tax, shipping, total,
                   payment_method, payment_status, status, created_at, updated_at
            FROM storefront.order
            WHERE order_number = $1
            ORDER BY created_at, id
            LIMIT 1
            ",
        )
        .bind(order_number.as_str())
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(order_from_row).transpose()
    }
}

fn order_from_row(row: &PgRow) -> Result<Order, RepositoryError> {
    let order_number: String = row.try_get("order_number")?;
    let order_number = OrderNumber::parse(&order_number).map_err(|e| {
        RepositoryError::DataCorruption(format!("invalid order number in database: {e}"))
    })?;
    let Json(customer): Json<Customer> = row.try_get("customer")?;
    let Json(shipping_address): Json<ShippingAddress> = row.try_get("shipping_address")?;
    let Json(items): Json<Vec<OrderItem>> = row.try_get("items")?;

    Ok(Order {
        id: row.try_get("id")?,
        order_number,
        customer,
        shipping_address,
        items,
        subtotal: row.try_get("subtotal")?,
        tax: row.try_get("tax")?,
        shipping: row.try_get("shipping")?,
        total: row.try_get("total")?,
        payment_method: row.try_get("payment_method")?,
        payment_status: row.try_get("payment_status")?,
        status: row.try_get("status")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}
