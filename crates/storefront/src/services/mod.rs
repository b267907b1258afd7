//! Business logic services for storefront.
//!
//! # Services
//!
//! - `cart` - Session-backed cart store
//! - `catalog` - Cached product queries
//! - `checkout` - Form validation and order placement
//! - `email` - SMTP transport (or log-only fallback)
//! - `notification` - Order confirmation emails, sent off the request path

pub mod cart;
pub mod catalog;
pub mod checkout;
pub mod email;
pub mod notification;
