//! Order confirmation handler.
//!
//! Shown after checkout. It never fails: when the order cannot be looked
//! up the page still confirms the purchase and points the customer at the
//! confirmation email.

use axum::{
    Json,
    extract::{Query, State},
};
use chrono::{DateTime, TimeDelta, Utc};
use muscle_shop_core::{Order, OrderNumber, PaymentMethod};
use serde::{Deserialize, Serialize};
use tracing::instrument;

use crate::config::BankTransferConfig;
use crate::services::notification::format_date;
use crate::state::AppState;

/// Shown instead of order details when they cannot be loaded.
pub const ORDER_DETAILS_UNAVAILABLE: &str =
    "注文詳細を表示できませんでした。確認メールをご確認ください。";

/// Days until a bank transfer is due.
const PAYMENT_DAYS: i64 = 7;

/// Typical days until delivery, shown as an estimate.
const DELIVERY_DAYS: i64 = 3;

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderCompleteQuery {
    pub order_number: Option<String>,
    pub payment: Option<String>,
}

/// Where to send a bank transfer, and by when.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BankTransferView {
    pub bank_name: String,
    pub branch: String,
    pub account_type: String,
    pub account_number: String,
    pub account_holder: String,
    pub payment_deadline: String,
}

impl BankTransferView {
    fn new(bank: &BankTransferConfig, deadline: DateTime<Utc>) -> Self {
        Self {
            bank_name: bank.bank_name.clone(),
            branch: bank.branch.clone(),
            account_type: bank.account_type.clone(),
            account_number: bank.account_number.clone(),
            account_holder: bank.account_holder.clone(),
            payment_deadline: format_date(deadline),
        }
    }
}

/// Confirmation page data.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderCompleteView {
    pub order_number: Option<String>,
    pub payment_method: PaymentMethod,
    pub order: Option<Order>,
    /// Set when `order` could not be loaded.
    pub message: Option<&'static str>,
    pub estimated_delivery: String,
    pub bank_transfer: Option<BankTransferView>,
}

async fn find_order(state: &AppState, raw: Option<&str>) -> Option<Order> {
    let number = match OrderNumber::parse(raw?) {
        Ok(number) => number,
        Err(e) => {
            tracing::debug!(error = %e, "Ignoring malformed order number");
            return None;
        }
    };
    match state.orders().get_by_order_number(&number).await {
        Ok(order) => order,
        Err(e) => {
            tracing::warn!(error = %e, order_number = %number, "Failed to load order for confirmation");
            None
        }
    }
}

/// `GET /api/order-complete?orderNumber=..&payment=..`
///
/// `payment` defaults to credit card. Bank transfer adds the account to pay
/// into and a deadline seven days after the order.
#[instrument(skip(state))]
pub async fn show(
    State(state): State<AppState>,
    Query(query): Query<OrderCompleteQuery>,
) -> Json<OrderCompleteView> {
    let payment_method = query
        .payment
        .as_deref()
        .and_then(|p| p.parse::<PaymentMethod>().ok())
        .unwrap_or(PaymentMethod::CreditCard);
    let order = find_order(&state, query.order_number.as_deref()).await;

    let placed_at = order.as_ref().map_or_else(Utc::now, |o| o.created_at);
    let bank_transfer = (payment_method == PaymentMethod::BankTransfer).then(|| {
        let deadline = order.as_ref().map_or_else(
            || placed_at + TimeDelta::days(PAYMENT_DAYS),
            Order::payment_deadline,
        );
        BankTransferView::new(state.bank(), deadline)
    });

    Json(OrderCompleteView {
        order_number: query.order_number,
        payment_method,
        message: order.is_none().then_some(ORDER_DETAILS_UNAVAILABLE),
        order,
        estimated_delivery: format_date(placed_at + TimeDelta::days(DELIVERY_DAYS)),
        bank_transfer,
    })
}
