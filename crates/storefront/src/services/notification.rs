//! Order confirmation emails.
//!
//! Notification is best-effort. [`NotificationDispatcher::dispatch`] runs the
//! notifier on its own task after the order has been written; a failure is
//! logged and reported to Sentry but never reaches the checkout result.

use std::sync::Arc;

use askama::Template;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use muscle_shop_core::order::japan_time;
use muscle_shop_core::{Email, Order, PaymentMethod, Yen};
use thiserror::Error;
use tokio::task::JoinHandle;

use crate::config::{BankTransferConfig, ShopConfig};
use crate::services::email::{EmailService, MailError};

/// Which of the two confirmation emails to send.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationTemplate {
    CreditCard,
    BankTransfer,
}

impl NotificationTemplate {
    /// Template for a payment method. Convenience-store payment has none.
    #[must_use]
    pub const fn for_payment_method(method: PaymentMethod) -> Option<Self> {
        match method {
            PaymentMethod::CreditCard => Some(Self::CreditCard),
            PaymentMethod::BankTransfer => Some(Self::BankTransfer),
            PaymentMethod::ConvenienceStore => None,
        }
    }
}

/// Errors raised while rendering or sending a notification.
#[derive(Debug, Error)]
pub enum NotificationError {
    #[error("Template error: {0}")]
    Template(#[from] askama::Error),

    #[error("Mail error: {0}")]
    Mail(#[from] MailError),
}

#[derive(Template)]
#[template(path = "email/order_complete_credit_card.txt")]
struct CreditCardEmail<'a> {
    fields: &'a OrderFields,
    shop_name: &'a str,
    contact_email: &'a str,
}

#[derive(Template)]
#[template(path = "email/order_complete_bank_transfer.txt")]
struct BankTransferEmail<'a> {
    fields: &'a OrderFields,
    shop_name: &'a str,
    contact_email: &'a str,
    bank_name: &'a str,
    branch: &'a str,
    account_type: &'a str,
    account_number: &'a str,
    account_holder: &'a str,
    payment_deadline: String,
}

/// Order values as printed in both emails.
#[derive(Debug, Clone, PartialEq, Eq)]
struct OrderFields {
    customer_name: String,
    order_number: String,
    order_date: String,
    order_items: String,
    subtotal: String,
    tax: String,
    shipping: String,
    total: String,
    shipping_address: String,
}

impl OrderFields {
    fn new(order: &Order) -> Self {
        let order_items = order
            .items
            .iter()
            .map(|item| {
                format!(
                    "・{} x {} - ¥{}",
                    item.product_name,
                    item.quantity,
                    item.line_total().grouped()
                )
            })
            .collect::<Vec<_>>()
            .join("\n");

        Self {
            customer_name: order.customer.name.clone(),
            order_number: order.order_number.to_string(),
            order_date: format_datetime(order.created_at),
            order_items,
            subtotal: order.subtotal.grouped(),
            tax: order.tax.grouped(),
            shipping: format_shipping(order.shipping),
            total: order.total.grouped(),
            shipping_address: format!(
                "{} 様\n{}",
                order.customer.name,
                order.shipping_address.postal_block()
            ),
        }
    }
}

/// `2026年3月4日 14:05` in Japan time.
#[must_use]
pub fn format_datetime(at: DateTime<Utc>) -> String {
    japan_time(at).format("%Y年%-m月%-d日 %H:%M").to_string()
}

/// `2026年3月11日` in Japan time.
#[must_use]
pub fn format_date(at: DateTime<Utc>) -> String {
    japan_time(at).format("%Y年%-m月%-d日").to_string()
}

fn format_shipping(shipping: Yen) -> String {
    if shipping == Yen::ZERO {
        "0（無料）".to_string()
    } else {
        shipping.grouped()
    }
}

/// A rendered email ready to send.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderEmail {
    pub to: Email,
    pub subject: String,
    pub body: String,
}

/// Renders confirmation emails for orders.
#[derive(Debug, Clone)]
pub struct OrderEmailRenderer {
    shop: ShopConfig,
    bank: BankTransferConfig,
}

impl OrderEmailRenderer {
    #[must_use]
    pub const fn new(shop: ShopConfig, bank: BankTransferConfig) -> Self {
        Self { shop, bank }
    }

    /// Render the email for `order` using `template`.
    ///
    /// # Errors
    ///
    /// Returns error if the template fails to render.
    pub fn render(
        &self,
        order: &Order,
        template: NotificationTemplate,
    ) -> Result<OrderEmail, NotificationError> {
        let fields = OrderFields::new(order);
        let shop_name = self.shop.name.as_str();
        let contact_email = self.shop.contact_email.as_str();

        let (subject, body) = match template {
            NotificationTemplate::CreditCard => (
                format!(
                    "【{shop_name}】ご注文ありがとうございます（注文番号: {}）",
                    order.order_number
                ),
                CreditCardEmail {
                    fields: &fields,
                    shop_name,
                    contact_email,
                }
                .render()?,
            ),
            NotificationTemplate::BankTransfer => (
                format!(
                    "【{shop_name}】ご注文ありがとうございます - お振込のお願い（注文番号: {}）",
                    order.order_number
                ),
                BankTransferEmail {
                    fields: &fields,
                    shop_name,
                    contact_email,
                    bank_name: &self.bank.bank_name,
                    branch: &self.bank.branch,
                    account_type: &self.bank.account_type,
                    account_number: &self.bank.account_number,
                    account_holder: &self.bank.account_holder,
                    payment_deadline: format_date(order.payment_deadline()),
                }
                .render()?,
            ),
        };

        Ok(OrderEmail {
            to: order.customer.email.clone(),
            subject,
            body,
        })
    }
}

/// Sends the order-complete notification for one order.
#[async_trait]
pub trait OrderNotifier: Send + Sync {
    /// # Errors
    ///
    /// Returns error if the message could not be rendered or delivered.
    async fn notify_order_complete(
        &self,
        order: &Order,
        template: NotificationTemplate,
    ) -> Result<(), NotificationError>;
}

/// [`OrderNotifier`] that emails the customer.
#[derive(Clone)]
pub struct EmailNotifier {
    renderer: OrderEmailRenderer,
    mailer: EmailService,
}

impl EmailNotifier {
    #[must_use]
    pub const fn new(renderer: OrderEmailRenderer, mailer: EmailService) -> Self {
        Self { renderer, mailer }
    }
}

#[async_trait]
impl OrderNotifier for EmailNotifier {
    async fn notify_order_complete(
        &self,
        order: &Order,
        template: NotificationTemplate,
    ) -> Result<(), NotificationError> {
        let email = self.renderer.render(order, template)?;
        self.mailer
            .send_text(&email.to, &email.subject, &email.body)
            .await?;
        Ok(())
    }
}

/// Issues notifications as detached tasks.
#[derive(Clone)]
pub struct NotificationDispatcher {
    notifier: Arc<dyn OrderNotifier>,
}

impl NotificationDispatcher {
    #[must_use]
    pub fn new(notifier: Arc<dyn OrderNotifier>) -> Self {
        Self { notifier }
    }

    /// Spawn the confirmation email for `order`.
    ///
    /// Returns `None` without spawning when the payment method has no
    /// template. Callers may drop the handle; awaiting it only waits for the
    /// attempt to finish and never yields the notifier's error.
    pub fn dispatch(&self, order: Order) -> Option<JoinHandle<()>> {
        let Some(template) = NotificationTemplate::for_payment_method(order.payment_method) else {
            tracing::warn!(
                order_number = %order.order_number,
                payment_method = %order.payment_method,
                "No confirmation template for payment method, skipping email"
            );
            return None;
        };

        let notifier = Arc::clone(&self.notifier);
        Some(tokio::spawn(async move {
            match notifier.notify_order_complete(&order, template).await {
                Ok(()) => {
                    tracing::info!(order_number = %order.order_number, "Order confirmation sent");
                }
                Err(e) => {
                    let event_id = sentry::capture_error(&e);
                    tracing::error!(
                        order_number = %order.order_number,
                        error = %e,
                        sentry_event_id = %event_id,
                        "Order confirmation failed"
                    );
                }
            }
        }))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use chrono::TimeZone;
    use muscle_shop_core::{
        Customer, OrderId, OrderItem, OrderNumber, OrderStatus, PaymentStatus, ProductId,
        ShippingAddress,
    };

    use super::*;

    fn order(payment_method: PaymentMethod, unit_price: i64) -> Order {
        // 2026-03-04 14:05 JST
        let created = Utc.with_ymd_and_hms(2026, 3, 4, 5, 5, 0).unwrap();
        let items = vec![OrderItem {
            product_id: ProductId::new("whey"),
            product_name: "ホエイプロテイン".to_owned(),
            quantity: 2,
            unit_price: Yen::new(unit_price),
            image: None,
        }];
        let totals = muscle_shop_core::calculate_totals(&items);
        Order {
            id: OrderId::new(1),
            order_number: OrderNumber::parse("ORD-20260304-0042").unwrap(),
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
                building: Some("マッスルビル101".to_owned()),
            },
            items,
            subtotal: totals.subtotal,
            tax: totals.tax,
            shipping: totals.shipping,
            total: totals.total,
            payment_method,
            payment_status: PaymentStatus::Pending,
            status: OrderStatus::Pending,
            created_at: created,
            updated_at: created,
        }
    }

    fn renderer() -> OrderEmailRenderer {
        OrderEmailRenderer::new(ShopConfig::default(), BankTransferConfig::default())
    }

    #[test]
    fn test_template_for_payment_method() {
        assert_eq!(
            NotificationTemplate::for_payment_method(PaymentMethod::CreditCard),
            Some(NotificationTemplate::CreditCard)
        );
        assert_eq!(
            NotificationTemplate::for_payment_method(PaymentMethod::ConvenienceStore),
            None
        );
    }

    #[test]
    fn test_credit_card_email() {
        let email = renderer()
            .render(&order(PaymentMethod::CreditCard, 3000), NotificationTemplate::CreditCard)
            .unwrap();

        assert_eq!(email.to.as_str(), "taro@example.jp");
        assert_eq!(
            email.subject,
            "【筋肉ショップ】ご注文ありがとうございます（注文番号: ORD-20260304-0042）"
        );
        assert!(email.body.starts_with("山田 太郎 様\n"));
        assert!(email.body.contains("注文日時: 2026年3月4日 14:05"));
        assert!(email.body.contains("・ホエイプロテイン x 2 - ¥6,000"));
        assert!(email.body.contains("小計: ¥6,000"));
        assert!(email.body.contains("消費税: ¥600"));
        assert!(email.body.contains("送料: ¥500"));
        assert!(email.body.contains("合計: ¥7,100"));
        assert!(email.body.contains("クレジットカード（決済完了）"));
        assert!(
            email
                .body
                .contains("山田 太郎 様\n〒150-0001\n東京都渋谷区神宮前1-2-3\nマッスルビル101")
        );
        assert!(!email.body.contains("お振込先情報"));
    }

    #[test]
    fn test_bank_transfer_email_has_account_and_deadline() {
        let email = renderer()
            .render(&order(PaymentMethod::BankTransfer, 6000), NotificationTemplate::BankTransfer)
            .unwrap();

        assert!(email.subject.contains("お振込のお願い"));
        assert!(email.body.contains("金融機関: 筋肉銀行"));
        assert!(email.body.contains("口座名義: カ）キンニクショップ"));
        assert!(email.body.contains("【お振込期限】2026年3月11日"));
        assert!(email.body.contains("送料: ¥0（無料）"));
        assert!(email.body.contains("合計: ¥13,200"));
    }

    struct FailingNotifier {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl OrderNotifier for FailingNotifier {
        async fn notify_order_complete(
            &self,
            _order: &Order,
            _template: NotificationTemplate,
        ) -> Result<(), NotificationError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Err(MailError::InvalidAddress("nowhere".to_owned()).into())
        }
    }

    #[tokio::test]
    async fn test_dispatch_swallows_notifier_errors() {
        let notifier = Arc::new(FailingNotifier {
            calls: AtomicUsize::new(0),
        });
        let dispatcher = NotificationDispatcher::new(notifier.clone());

        let handle = dispatcher
            .dispatch(order(PaymentMethod::CreditCard, 3000))
            .unwrap();
        assert!(handle.await.is_ok());
        assert_eq!(notifier.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_dispatch_skips_convenience_store() {
        let notifier = Arc::new(FailingNotifier {
            calls: AtomicUsize::new(0),
        });
        let dispatcher = NotificationDispatcher::new(notifier.clone());

        assert!(dispatcher
            .dispatch(order(PaymentMethod::ConvenienceStore, 3000))
            .is_none());
        assert_eq!(notifier.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_email_notifier_logs_without_smtp() {
        let notifier = EmailNotifier::new(renderer(), EmailService::log_only());
        let result = notifier
            .notify_order_complete(
                &order(PaymentMethod::BankTransfer, 3000),
                NotificationTemplate::BankTransfer,
            )
            .await;
        assert!(result.is_ok());
    }
}
