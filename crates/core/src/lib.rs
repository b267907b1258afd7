//! Muscle Shop Core - Shared domain types and rules.
//!
//! This crate provides the types used across all Muscle Shop components:
//! - `storefront` - Public-facing shop (catalog, cart, checkout)
//! - `cli` - Command-line tools for migrations and seeding
//!
//! # Architecture
//!
//! The core crate contains only types and pure rules - no I/O, no database
//! access, no HTTP clients. Pricing lives here so that the totals shown in the
//! cart, the totals written to an order, and the totals printed in the
//! confirmation email are all derived by the same function.
//!
//! # Modules
//!
//! - [`types`] - Newtype wrappers for ids, yen amounts, emails and statuses
//! - [`cart`] - Cart lines and the in-memory cart
//! - [`totals`] - Subtotal, tax and shipping calculation
//! - [`order`] - Order documents and order numbers
//! - [`product`] - Catalog products and catalog filtering

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod cart;
pub mod order;
pub mod product;
pub mod totals;
pub mod types;

pub use cart::{Cart, CartLine};
pub use order::{
    CreatedOrder, Customer, NewOrder, Order, OrderItem, OrderNumber, OrderNumberError,
    ShippingAddress,
};
pub use product::{Product, ProductDetails, ProductFilter};
pub use totals::{Totals, calculate_totals};
pub use types::*;
