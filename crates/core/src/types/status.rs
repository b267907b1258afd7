//! Status and classification enums for products and orders.
//!
//! Every enum serializes as its `snake_case` wire name (the same string stored
//! in the database enum type) and carries a Japanese display label used by
//! the storefront and the confirmation emails.

use serde::{Deserialize, Serialize};

/// Error returned when a wire name does not match any variant.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid {kind}: {value}")]
pub struct ParseEnumError {
    kind: &'static str,
    value: String,
}

/// Implements `as_str`, `Display` and `FromStr` over the wire names.
macro_rules! wire_names {
    ($ty:ident, $kind:literal, { $($variant:ident => $name:literal),+ $(,)? }) => {
        impl $ty {
            /// All variants, in declaration order.
            pub const ALL: &'static [Self] = &[$(Self::$variant),+];

            /// The `snake_case` wire name.
            #[must_use]
            pub const fn as_str(self) -> &'static str {
                match self {
                    $(Self::$variant => $name),+
                }
            }
        }

        impl ::core::fmt::Display for $ty {
            fn fmt(&self, f: &mut ::core::fmt::Formatter<'_>) -> ::core::fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl ::core::str::FromStr for $ty {
            type Err = ParseEnumError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($name => Ok(Self::$variant),)+
                    _ => Err(ParseEnumError {
                        kind: $kind,
                        value: s.to_owned(),
                    }),
                }
            }
        }
    };
}

/// How the customer pays for an order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "postgres", derive(sqlx::Type))]
#[cfg_attr(
    feature = "postgres",
    sqlx(type_name = "storefront.payment_method", rename_all = "snake_case")
)]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
    CreditCard,
    BankTransfer,
    ConvenienceStore,
}

wire_names!(PaymentMethod, "payment method", {
    CreditCard => "credit_card",
    BankTransfer => "bank_transfer",
    ConvenienceStore => "convenience_store",
});

impl PaymentMethod {
    /// Japanese display label.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::CreditCard => "クレジットカード",
            Self::BankTransfer => "銀行振込",
            Self::ConvenienceStore => "コンビニ払い",
        }
    }
}

/// Whether an order has been paid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[cfg_attr(feature = "postgres", derive(sqlx::Type))]
#[cfg_attr(
    feature = "postgres",
    sqlx(type_name = "storefront.payment_status", rename_all = "snake_case")
)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    #[default]
    Pending,
    Paid,
    Failed,
}

wire_names!(PaymentStatus, "payment status", {
    Pending => "pending",
    Paid => "paid",
    Failed => "failed",
});

impl PaymentStatus {
    /// Japanese display label.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Pending => "未入金",
            Self::Paid => "入金済み",
            Self::Failed => "失敗",
        }
    }
}

/// Fulfillment lifecycle of an order.
///
/// Checkout only ever writes `Pending`; later transitions belong to back-office
/// tooling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[cfg_attr(feature = "postgres", derive(sqlx::Type))]
#[cfg_attr(
    feature = "postgres",
    sqlx(type_name = "storefront.order_status", rename_all = "snake_case")
)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    #[default]
    Pending,
    Confirmed,
    Processing,
    Shipped,
    Delivered,
    Cancelled,
}

wire_names!(OrderStatus, "order status", {
    Pending => "pending",
    Confirmed => "confirmed",
    Processing => "processing",
    Shipped => "shipped",
    Delivered => "delivered",
    Cancelled => "cancelled",
});

impl OrderStatus {
    /// Japanese display label.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Pending => "新規注文",
            Self::Confirmed => "確認済み",
            Self::Processing => "処理中",
            Self::Shipped => "発送済み",
            Self::Delivered => "配達完了",
            Self::Cancelled => "キャンセル",
        }
    }
}

/// Catalog visibility of a product. Only `Active` products are listed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[cfg_attr(feature = "postgres", derive(sqlx::Type))]
#[cfg_attr(
    feature = "postgres",
    sqlx(type_name = "storefront.product_status", rename_all = "snake_case")
)]
#[serde(rename_all = "snake_case")]
pub enum ProductStatus {
    #[default]
    Active,
    Inactive,
    OutOfStock,
}

wire_names!(ProductStatus, "product status", {
    Active => "active",
    Inactive => "inactive",
    OutOfStock => "out_of_stock",
});

impl ProductStatus {
    /// Japanese display label.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Active => "販売中",
            Self::Inactive => "非公開",
            Self::OutOfStock => "在庫切れ",
        }
    }
}

/// Catalog category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "postgres", derive(sqlx::Type))]
#[cfg_attr(
    feature = "postgres",
    sqlx(type_name = "storefront.product_category", rename_all = "snake_case")
)]
#[serde(rename_all = "snake_case")]
pub enum ProductCategory {
    Supplement,
    Equipment,
    Wear,
    Accessories,
    Other,
}

wire_names!(ProductCategory, "product category", {
    Supplement => "supplement",
    Equipment => "equipment",
    Wear => "wear",
    Accessories => "accessories",
    Other => "other",
});

impl ProductCategory {
    /// Japanese display label.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Supplement => "サプリメント",
            Self::Equipment => "トレーニング器具",
            Self::Wear => "ウェア",
            Self::Accessories => "アクセサリー",
            Self::Other => "その他",
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_wire_names_round_trip_through_from_str() {
        for method in PaymentMethod::ALL {
            assert_eq!(method.as_str().parse::<PaymentMethod>().unwrap(), *method);
        }
        for status in OrderStatus::ALL {
            assert_eq!(status.as_str().parse::<OrderStatus>().unwrap(), *status);
        }
    }

    #[test]
    fn test_serde_uses_wire_names() {
        let json = serde_json::to_string(&PaymentMethod::BankTransfer).unwrap();
        assert_eq!(json, "\"bank_transfer\"");
        let status: ProductStatus = serde_json::from_str("\"out_of_stock\"").unwrap();
        assert_eq!(status, ProductStatus::OutOfStock);
    }

    #[test]
    fn test_from_str_rejects_unknown() {
        let err = "cash".parse::<PaymentMethod>().unwrap_err();
        assert_eq!(err.to_string(), "invalid payment method: cash");
    }

    #[test]
    fn test_defaults_are_pending() {
        assert_eq!(PaymentStatus::default(), PaymentStatus::Pending);
        assert_eq!(OrderStatus::default(), OrderStatus::Pending);
    }

    #[test]
    fn test_labels() {
        assert_eq!(PaymentMethod::CreditCard.label(), "クレジットカード");
        assert_eq!(ProductCategory::Equipment.label(), "トレーニング器具");
    }
}
