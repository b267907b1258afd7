//! Checkout workflow.
//!
//! Turns a validated checkout form and the visitor's cart into an order:
//!
//! 1. Validate the form (nothing is written on failure).
//! 2. Re-price every cart line from the catalog.
//! 3. Create the order. On failure the cart is left untouched.
//! 4. Dispatch the confirmation email as a detached task.
//! 5. Clear the cart.
//!
//! The in-flight state visible to the entry guard lives in the session
//! (see [`CheckoutPhase`]) and is managed by the route handler.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use muscle_shop_core::{
    Cart, CartLine, Customer, Email, NewOrder, Order, OrderNumber, PaymentMethod, ProductId,
    ShippingAddress, SubmissionId,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::task::JoinHandle;

use crate::db::{OrderRepository, RepositoryError};
use crate::models::CheckoutPhase;
use crate::services::cart::{CartStorage, CartStore};
use crate::services::catalog::Catalog;
use crate::services::notification::NotificationDispatcher;

/// The 47 prefectures accepted in shipping addresses.
pub const PREFECTURES: [&str; 47] = [
    "北海道", "青森県", "岩手県", "宮城県", "秋田県", "山形県", "福島県", "茨城県", "栃木県",
    "群馬県", "埼玉県", "千葉県", "東京都", "神奈川県", "新潟県", "富山県", "石川県", "福井県",
    "山梨県", "長野県", "岐阜県", "静岡県", "愛知県", "三重県", "滋賀県", "京都府", "大阪府",
    "兵庫県", "奈良県", "和歌山県", "鳥取県", "島根県", "岡山県", "広島県", "山口県", "徳島県",
    "香川県", "愛媛県", "高知県", "福岡県", "佐賀県", "長崎県", "熊本県", "大分県", "宮崎県",
    "鹿児島県", "沖縄県",
];

/// Payment methods offered on the checkout form.
pub const CHECKOUT_PAYMENT_METHODS: [PaymentMethod; 2] =
    [PaymentMethod::CreditCard, PaymentMethod::BankTransfer];

/// Message shown for any failure to place the order.
pub const ORDER_FAILED_MESSAGE: &str =
    "注文の処理中にエラーが発生しました。もう一度お試しください。";

/// Raw checkout form as submitted.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CheckoutForm {
    pub last_name: String,
    pub first_name: String,
    pub last_name_kana: String,
    pub first_name_kana: String,
    pub email: String,
    pub phone: String,
    pub zip_code: String,
    pub prefecture: String,
    pub city: String,
    pub address: String,
    pub building: String,
    pub payment_method: Option<PaymentMethod>,
    pub card_number: String,
    pub card_name: String,
    pub card_expiry: String,
    pub card_cvc: String,
    /// Generated when the form is shown; resubmissions reuse it.
    pub submission_id: Option<SubmissionId>,
}

/// One invalid form field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldError {
    pub field: &'static str,
    pub message: &'static str,
}

/// Every invalid field of a rejected form.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{} invalid checkout field(s)", .0.len())]
pub struct ValidationErrors(pub Vec<FieldError>);

impl ValidationErrors {
    /// Whether `field` was rejected.
    #[must_use]
    pub fn has(&self, field: &str) -> bool {
        self.0.iter().any(|e| e.field == field)
    }
}

/// A form that passed validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidCheckout {
    pub customer: Customer,
    pub shipping_address: ShippingAddress,
    pub payment_method: PaymentMethod,
    pub submission_id: SubmissionId,
}

const REQUIRED: &str = "入力してください";

impl CheckoutForm {
    /// Check every field and collect all problems at once.
    ///
    /// Card fields are only required for credit card payment. They are
    /// checked for presence and shape but never stored or sent anywhere.
    /// A missing `submission_id` gets a fresh one.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationErrors`] listing each invalid field.
    pub fn validate(&self) -> Result<ValidCheckout, ValidationErrors> {
        let mut errors = Vec::new();
        let mut require = |field: &'static str, value: &str| {
            if value.trim().is_empty() {
                errors.push(FieldError {
                    field,
                    message: REQUIRED,
                });
                false
            } else {
                true
            }
        };

        require("lastName", &self.last_name);
        require("firstName", &self.first_name);
        let last_kana = require("lastNameKana", &self.last_name_kana);
        let first_kana = require("firstNameKana", &self.first_name_kana);
        let has_email = require("email", &self.email);
        let has_phone = require("phone", &self.phone);
        let has_zip = require("zipCode", &self.zip_code);
        let has_prefecture = require("prefecture", &self.prefecture);
        require("city", &self.city);
        require("address", &self.address);

        let card = self.payment_method == Some(PaymentMethod::CreditCard);
        let card_fields = card.then(|| {
            (
                require("cardNumber", &self.card_number),
                require("cardName", &self.card_name),
                require("cardExpiry", &self.card_expiry),
                require("cardCvc", &self.card_cvc),
            )
        });

        let mut invalid = |field: &'static str, message: &'static str| {
            errors.push(FieldError { field, message });
        };

        if last_kana && !is_katakana(&self.last_name_kana) {
            invalid("lastNameKana", "カタカナで入力してください");
        }
        if first_kana && !is_katakana(&self.first_name_kana) {
            invalid("firstNameKana", "カタカナで入力してください");
        }
        let email = if has_email {
            Email::parse(&self.email)
                .inspect_err(|_| invalid("email", "メールアドレスの形式が正しくありません"))
                .ok()
        } else {
            None
        };
        if has_phone && !is_phone_number(&self.phone) {
            invalid("phone", "電話番号の形式が正しくありません");
        }
        if has_zip && !is_zip_code(&self.zip_code) {
            invalid("zipCode", "郵便番号は123-4567の形式で入力してください");
        }
        if has_prefecture && !PREFECTURES.contains(&self.prefecture.trim()) {
            invalid("prefecture", "都道府県を選択してください");
        }
        match self.payment_method {
            Some(method) if CHECKOUT_PAYMENT_METHODS.contains(&method) => {}
            _ => invalid("paymentMethod", "お支払い方法を選択してください"),
        }
        if let Some((number, _, expiry, cvc)) = card_fields {
            if number && !is_card_number(&self.card_number) {
                invalid("cardNumber", "カード番号の形式が正しくありません");
            }
            if expiry && !is_card_expiry(&self.card_expiry) {
                invalid("cardExpiry", "有効期限はMM/YYの形式で入力してください");
            }
            if cvc && !is_cvc(&self.card_cvc) {
                invalid("cardCvc", "セキュリティコードの形式が正しくありません");
            }
        }

        let (Some(email), Some(payment_method), true) =
            (email, self.payment_method, errors.is_empty())
        else {
            return Err(ValidationErrors(errors));
        };

        let building = self.building.trim();
        Ok(ValidCheckout {
            customer: Customer {
                name: format!("{} {}", self.last_name.trim(), self.first_name.trim()),
                email,
                phone: self.phone.trim().to_owned(),
            },
            shipping_address: ShippingAddress {
                zip_code: self.zip_code.trim().to_owned(),
                prefecture: self.prefecture.trim().to_owned(),
                city: self.city.trim().to_owned(),
                address: self.address.trim().to_owned(),
                building: (!building.is_empty()).then(|| building.to_owned()),
            },
            payment_method,
            submission_id: self.submission_id.unwrap_or_else(SubmissionId::random),
        })
    }
}

fn is_katakana(s: &str) -> bool {
    s.trim()
        .chars()
        .all(|c| matches!(c, '\u{30A1}'..='\u{30FA}' | 'ー' | '・' | ' ' | '\u{3000}'))
}

fn digits(s: &str) -> String {
    s.chars().filter(char::is_ascii_digit).collect()
}

fn only_digits_and(s: &str, extra: &[char]) -> bool {
    s.trim()
        .chars()
        .all(|c| c.is_ascii_digit() || extra.contains(&c))
}

fn is_phone_number(s: &str) -> bool {
    only_digits_and(s, &['-']) && (10..=11).contains(&digits(s).len())
}

fn is_zip_code(s: &str) -> bool {
    let s = s.trim();
    only_digits_and(s, &['-']) && digits(s).len() == 7 && (s.len() == 7 || s.find('-') == Some(3))
}

fn is_card_number(s: &str) -> bool {
    only_digits_and(s, &[' ', '-']) && (14..=16).contains(&digits(s).len())
}

fn is_card_expiry(s: &str) -> bool {
    let Some((month, year)) = s.trim().split_once('/') else {
        return false;
    };
    let month_ok = month.len() == 2 && month.parse::<u8>().is_ok_and(|m| (1..=12).contains(&m));
    month_ok && year.len() == 2 && year.bytes().all(|b| b.is_ascii_digit())
}

fn is_cvc(s: &str) -> bool {
    let s = s.trim();
    (3..=4).contains(&s.len()) && s.bytes().all(|b| b.is_ascii_digit())
}

/// Where a visitor opening checkout should go.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CheckoutEntry {
    /// Show the form.
    Proceed,
    /// Nothing to check out.
    RedirectHome,
    /// The order just completed; show its confirmation.
    RedirectConfirmation(String),
}

/// Confirmation page path for an order.
#[must_use]
pub fn confirmation_path(order_number: &OrderNumber, payment_method: PaymentMethod) -> String {
    format!("/order-complete?orderNumber={order_number}&payment={payment_method}")
}

/// Entry guard for the checkout page.
///
/// An empty cart sends the visitor home, unless a submission is in flight
/// or just succeeded: the successful path clears the cart before the
/// visitor reaches the confirmation page, and that must not bounce them
/// home.
#[must_use]
pub fn checkout_entry(cart: &Cart, phase: &CheckoutPhase, now: DateTime<Utc>) -> CheckoutEntry {
    if !cart.is_empty() || phase.is_in_flight(now) {
        return CheckoutEntry::Proceed;
    }
    match phase {
        CheckoutPhase::Succeeded {
            order_number,
            payment_method,
        } => CheckoutEntry::RedirectConfirmation(confirmation_path(order_number, *payment_method)),
        _ => CheckoutEntry::RedirectHome,
    }
}

/// Checkout failures.
#[derive(Debug, Error)]
pub enum CheckoutError {
    #[error("invalid checkout form: {0}")]
    Validation(#[from] ValidationErrors),

    #[error("cart is empty")]
    EmptyCart,

    #[error("product {0} is no longer available")]
    ProductUnavailable(ProductId),

    #[error("order could not be created: {0}")]
    Order(#[from] RepositoryError),
}

impl CheckoutError {
    /// Whether resubmitting the same form may succeed.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::Order(_))
    }

    /// Message for the customer. Never includes internal details.
    #[must_use]
    pub const fn user_message(&self) -> &'static str {
        match self {
            Self::Validation(_) => "入力内容に誤りがあります。ご確認ください。",
            Self::EmptyCart => "カートに商品がありません。",
            Self::ProductUnavailable(_) => {
                "販売を終了した商品がカートに含まれています。カートをご確認ください。"
            }
            Self::Order(_) => ORDER_FAILED_MESSAGE,
        }
    }
}

/// A placed order.
#[derive(Debug)]
pub struct CheckoutSuccess {
    pub order: Order,
    /// The submission had already produced this order.
    pub replayed: bool,
    /// The confirmation email task, if one was started. Dropping it leaves
    /// the task running.
    pub notification: Option<JoinHandle<()>>,
}

impl CheckoutSuccess {
    #[must_use]
    pub const fn order_number(&self) -> &OrderNumber {
        &self.order.order_number
    }

    #[must_use]
    pub const fn payment_method(&self) -> PaymentMethod {
        self.order.payment_method
    }

    /// Where to send the customer next.
    #[must_use]
    pub fn confirmation_path(&self) -> String {
        confirmation_path(self.order_number(), self.payment_method())
    }
}

/// Places orders.
#[derive(Clone)]
pub struct CheckoutService {
    orders: Arc<dyn OrderRepository>,
    catalog: Catalog,
    notifications: NotificationDispatcher,
}

impl CheckoutService {
    #[must_use]
    pub fn new(
        orders: Arc<dyn OrderRepository>,
        catalog: Catalog,
        notifications: NotificationDispatcher,
    ) -> Self {
        Self {
            orders,
            catalog,
            notifications,
        }
    }

    /// Place an order for the cart in `cart`.
    ///
    /// The cart is cleared only after the order exists. A replayed
    /// submission clears the cart but sends no second email.
    ///
    /// # Errors
    ///
    /// Returns [`CheckoutError`] if the form is invalid, the cart is empty,
    /// a product is no longer sold, or the order cannot be written. The cart
    /// is unchanged in every error case.
    #[tracing::instrument(skip_all, fields(items = cart.total_items()))]
    pub async fn submit<S: CartStorage>(
        &self,
        cart: &mut CartStore<S>,
        form: &CheckoutForm,
    ) -> Result<CheckoutSuccess, CheckoutError> {
        let valid = form.validate()?;
        if cart.is_empty() {
            return Err(CheckoutError::EmptyCart);
        }
        let lines = self.reprice(cart.cart().lines()).await?;

        let created = self
            .orders
            .create_order(NewOrder {
                customer: valid.customer,
                shipping_address: valid.shipping_address,
                lines,
                payment_method: valid.payment_method,
                submission_id: valid.submission_id,
            })
            .await
            .inspect_err(|e| {
                let event_id = sentry::capture_error(e);
                tracing::error!(error = %e, sentry_event_id = %event_id, "Order creation failed");
            })?;

        let notification = if created.replayed {
            tracing::info!(order_number = %created.order_number(), "Checkout replayed existing order");
            None
        } else {
            tracing::info!(
                order_number = %created.order_number(),
                total = %created.order.total,
                payment_method = %created.order.payment_method,
                "Order placed"
            );
            self.notifications.dispatch(created.order.clone())
        };

        cart.clear().await;

        Ok(CheckoutSuccess {
            order: created.order,
            replayed: created.replayed,
            notification,
        })
    }

    /// Replace each line's name and price with the catalog's current values.
    async fn reprice(&self, lines: &[CartLine]) -> Result<Vec<CartLine>, CheckoutError> {
        let mut priced = Vec::with_capacity(lines.len());
        for line in lines {
            let product = self
                .catalog
                .get_product(&line.product_id)
                .await?
                .ok_or_else(|| CheckoutError::ProductUnavailable(line.product_id.clone()))?;
            priced.push(CartLine::for_product(&product, line.quantity));
        }
        Ok(priced)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use chrono::TimeDelta;

    use super::*;

    fn form(payment: PaymentMethod) -> CheckoutForm {
        CheckoutForm {
            last_name: "山田".to_owned(),
            first_name: "太郎".to_owned(),
            last_name_kana: "ヤマダ".to_owned(),
            first_name_kana: "タロウ".to_owned(),
            email: "taro@example.jp".to_owned(),
            phone: "090-1234-5678".to_owned(),
            zip_code: "150-0001".to_owned(),
            prefecture: "東京都".to_owned(),
            city: "渋谷区".to_owned(),
            address: "神宮前1-2-3".to_owned(),
            building: String::new(),
            payment_method: Some(payment),
            card_number: "4242 4242 4242 4242".to_owned(),
            card_name: "TARO YAMADA".to_owned(),
            card_expiry: "12/29".to_owned(),
            card_cvc: "123".to_owned(),
            submission_id: None,
        }
    }

    #[test]
    fn test_valid_form_builds_customer_and_address() {
        let valid = form(PaymentMethod::CreditCard).validate().unwrap();
        assert_eq!(valid.customer.name, "山田 太郎");
        assert_eq!(valid.shipping_address.building, None);
        assert_eq!(valid.payment_method, PaymentMethod::CreditCard);
    }

    #[test]
    fn test_submission_id_is_kept() {
        let id = SubmissionId::random();
        let mut f = form(PaymentMethod::BankTransfer);
        f.submission_id = Some(id);
        assert_eq!(f.validate().unwrap().submission_id, id);
    }

    #[test]
    fn test_missing_fields_are_all_reported() {
        let errors = CheckoutForm::default().validate().unwrap_err();
        for field in ["lastName", "firstNameKana", "email", "zipCode", "paymentMethod"] {
            assert!(errors.has(field), "{field} should be reported");
        }
        assert!(!errors.has("cardNumber"));
    }

    #[test]
    fn test_card_fields_required_only_for_credit_card() {
        let mut bank = form(PaymentMethod::BankTransfer);
        bank.card_number.clear();
        bank.card_cvc.clear();
        assert!(bank.validate().is_ok());

        let mut card = form(PaymentMethod::CreditCard);
        card.card_number.clear();
        card.card_expiry = "13/29".to_owned();
        let errors = card.validate().unwrap_err();
        assert!(errors.has("cardNumber"));
        assert!(errors.has("cardExpiry"));
    }

    #[test]
    fn test_convenience_store_not_offered() {
        let errors = form(PaymentMethod::ConvenienceStore).validate().unwrap_err();
        assert_eq!(errors.0.len(), 1);
        assert!(errors.has("paymentMethod"));
    }

    #[test]
    fn test_field_formats() {
        let mut f = form(PaymentMethod::BankTransfer);
        f.last_name_kana = "やまだ".to_owned();
        f.zip_code = "1500-001".to_owned();
        f.prefecture = "東京".to_owned();
        f.email = "taro.example.jp".to_owned();
        f.phone = "090-12".to_owned();

        let errors = f.validate().unwrap_err();
        for field in ["lastNameKana", "zipCode", "prefecture", "email", "phone"] {
            assert!(errors.has(field), "{field} should be reported");
        }
    }

    #[test]
    fn test_building_kept_when_present() {
        let mut f = form(PaymentMethod::BankTransfer);
        f.building = " マッスルビル101 ".to_owned();
        assert_eq!(
            f.validate().unwrap().shipping_address.building.as_deref(),
            Some("マッスルビル101")
        );
    }

    #[test]
    fn test_prefecture_list() {
        assert_eq!(PREFECTURES.len(), 47);
        assert!(PREFECTURES.contains(&"沖縄県"));
    }

    #[test]
    fn test_entry_guard() {
        let now = Utc::now();
        let empty = Cart::new();

        assert_eq!(
            checkout_entry(&empty, &CheckoutPhase::Idle, now),
            CheckoutEntry::RedirectHome
        );

        let submitting = CheckoutPhase::Submitting {
            submission_id: SubmissionId::random(),
            started_at: now - TimeDelta::seconds(1),
        };
        assert_eq!(
            checkout_entry(&empty, &submitting, now),
            CheckoutEntry::Proceed
        );

        let done = CheckoutPhase::Succeeded {
            order_number: OrderNumber::parse("ORD-20260304-0042").unwrap(),
            payment_method: PaymentMethod::BankTransfer,
        };
        assert_eq!(
            checkout_entry(&empty, &done, now),
            CheckoutEntry::RedirectConfirmation(
                "/order-complete?orderNumber=ORD-20260304-0042&payment=bank_transfer".to_owned()
            )
        );
    }

    #[test]
    fn test_only_store_failures_are_retryable() {
        assert!(CheckoutError::Order(RepositoryError::Unavailable("down".to_owned())).is_retryable());
        assert!(!CheckoutError::EmptyCart.is_retryable());
        assert_eq!(
            CheckoutError::Order(RepositoryError::NotFound).user_message(),
            ORDER_FAILED_MESSAGE
        );
    }
}
