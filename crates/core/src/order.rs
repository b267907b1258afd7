//! Order documents and human-readable order numbers.
//!
//! An [`Order`] is written once per successful checkout and never modified
//! by the checkout flow afterwards. Its money figures are a snapshot taken
//! with [`calculate_totals`] at creation time.

use core::fmt;

use chrono::{DateTime, Datelike, NaiveDate, NaiveDateTime, TimeDelta, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::cart::CartLine;
use crate::totals::{Totals, calculate_totals};
use crate::types::{
    Email, OrderId, OrderStatus, PaymentMethod, PaymentStatus, ProductId, SubmissionId, Yen,
};

/// Offset of Japan Standard Time from UTC. Japan has no daylight saving.
const JST_OFFSET_HOURS: i64 = 9;

/// Convert a UTC instant to Japan wall-clock time.
///
/// Order numbers and the dates printed in emails use the shop's local date.
#[must_use]
pub fn japan_time(at: DateTime<Utc>) -> NaiveDateTime {
    (at + TimeDelta::hours(JST_OFFSET_HOURS)).naive_utc()
}

/// Errors that can occur when parsing an [`OrderNumber`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum OrderNumberError {
    #[error("order number must look like ORD-YYYYMMDD-NNNN")]
    Malformed,
    #[error("order number contains an invalid date")]
    InvalidDate,
}

/// Human-readable order identifier, `ORD-YYYYMMDD-NNNN`.
///
/// The date is the shop-local (JST) date of creation and `NNNN` is a
/// zero-padded random value in `0000..=9999`. The suffix alone does not make
/// the number unique; the order store rejects duplicates and the caller
/// generates a new number.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "postgres", derive(sqlx::Type))]
#[cfg_attr(feature = "postgres", sqlx(transparent))]
#[serde(try_from = "String", into = "String")]
pub struct OrderNumber(String);

impl OrderNumber {
    const PREFIX: &'static str = "ORD-";

    /// Generate a number for an order created at `at`.
    #[must_use]
    pub fn generate(at: DateTime<Utc>) -> Self {
        let suffix: u16 = rand::rng().random_range(0..10_000);
        Self::from_parts(japan_time(at).date(), suffix)
    }

    /// Build a number from a date and a suffix (taken modulo 10,000).
    #[must_use]
    pub fn from_parts(date: NaiveDate, suffix: u16) -> Self {
        Self(format!(
            "{}{:04}{:02}{:02}-{:04}",
            Self::PREFIX,
            date.year(),
            date.month(),
            date.day(),
            suffix % 10_000
        ))
    }

    /// Parse and validate an order number.
    ///
    /// # Errors
    ///
    /// Returns [`OrderNumberError`] if the input is not `ORD-` followed by an
    /// eight-digit valid date, a dash, and four digits.
    pub fn parse(s: &str) -> Result<Self, OrderNumberError> {
        let s = s.trim();
        let rest = s
            .strip_prefix(Self::PREFIX)
            .ok_or(OrderNumberError::Malformed)?;
        let (date, suffix) = rest.split_once('-').ok_or(OrderNumberError::Malformed)?;

        let all_digits = |part: &str, len: usize| {
            part.len() == len && part.bytes().all(|b| b.is_ascii_digit())
        };
        if !all_digits(date, 8) || !all_digits(suffix, 4) {
            return Err(OrderNumberError::Malformed);
        }
        NaiveDate::parse_from_str(date, "%Y%m%d").map_err(|_| OrderNumberError::InvalidDate)?;

        Ok(Self(s.to_owned()))
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for OrderNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for OrderNumber {
    type Error = OrderNumberError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<OrderNumber> for String {
    fn from(number: OrderNumber) -> Self {
        number.0
    }
}

impl std::str::FromStr for OrderNumber {
    type Err = OrderNumberError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

/// Who placed the order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Customer {
    /// Full name, family name first (`山田 太郎`).
    pub name: String,
    pub email: Email,
    pub phone: String,
}

/// Where the order ships.
///
/// `building` is omitted from the serialized document when absent rather
/// than written as `null`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShippingAddress {
    pub zip_code: String,
    pub prefecture: String,
    pub city: String,
    pub address: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub building: Option<String>,
}

impl ShippingAddress {
    /// Address block for emails and the confirmation view:
    ///
    /// ```text
    /// 〒150-0001
    /// 東京都渋谷区神宮前1-2-3
    /// マッスルビル101
    /// ```
    #[must_use]
    pub fn postal_block(&self) -> String {
        let mut block = format!(
            "〒{}\n{}{}{}",
            self.zip_code, self.prefecture, self.city, self.address
        );
        if let Some(building) = &self.building {
            block.push('\n');
            block.push_str(building);
        }
        block
    }
}

/// One purchased product within an order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderItem {
    pub product_id: ProductId,
    pub product_name: String,
    pub quantity: u32,
    pub unit_price: Yen,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
}

impl OrderItem {
    #[must_use]
    pub fn line_total(&self) -> Yen {
        self.unit_price.times(self.quantity)
    }
}

impl From<&CartLine> for OrderItem {
    fn from(line: &CartLine) -> Self {
        Self {
            product_id: line.product_id.clone(),
            product_name: line.name.clone(),
            quantity: line.quantity,
            unit_price: line.unit_price,
            image: (!line.image.is_empty()).then(|| line.image.clone()),
        }
    }
}

/// A placed order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Order {
    pub id: OrderId,
    pub order_number: OrderNumber,
    pub customer: Customer,
    pub shipping_address: ShippingAddress,
    pub items: Vec<OrderItem>,
    pub subtotal: Yen,
    pub tax: Yen,
    pub shipping: Yen,
    pub total: Yen,
    pub payment_method: PaymentMethod,
    pub payment_status: PaymentStatus,
    pub status: OrderStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Order {
    /// The stored money figures as a [`Totals`].
    #[must_use]
    pub const fn totals(&self) -> Totals {
        Totals {
            subtotal: self.subtotal,
            tax: self.tax,
            shipping: self.shipping,
            total: self.total,
        }
    }

    /// Deadline for bank-transfer payment: seven days after creation.
    #[must_use]
    pub fn payment_deadline(&self) -> DateTime<Utc> {
        self.created_at + TimeDelta::days(7)
    }
}

/// Everything needed to create an order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewOrder {
    pub customer: Customer,
    pub shipping_address: ShippingAddress,
    pub lines: Vec<CartLine>,
    pub payment_method: PaymentMethod,
    /// Identifies the checkout submission this order comes from.
    pub submission_id: SubmissionId,
}

impl NewOrder {
    /// Totals over the lines, as they will be stored.
    #[must_use]
    pub fn totals(&self) -> Totals {
        calculate_totals(&self.lines)
    }

    /// Build the order document with fresh `pending` statuses and
    /// `created_at == updated_at == now`.
    #[must_use]
    pub fn into_order(self, id: OrderId, order_number: OrderNumber, now: DateTime<Utc>) -> Order {
        let totals = self.totals();
        Order {
            id,
            order_number,
            customer: self.customer,
            shipping_address: self.shipping_address,
            items: self.lines.iter().map(OrderItem::from).collect(),
            subtotal: totals.subtotal,
            tax: totals.tax,
            shipping: totals.shipping,
            total: totals.total,
            payment_method: self.payment_method,
            payment_status: PaymentStatus::Pending,
            status: OrderStatus::Pending,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Result of creating an order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreatedOrder {
    pub order: Order,
    /// `true` when the submission had already produced this order and no new
    /// document was written.
    pub replayed: bool,
}

impl CreatedOrder {
    #[must_use]
    pub const fn id(&self) -> OrderId {
        self.order.id
    }

    #[must_use]
    pub const fn order_number(&self) -> &OrderNumber {
        &self.order.order_number
    }
}
