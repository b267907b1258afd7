//! Domain models for storefront.
//!
//! Catalog, cart and order types live in `muscle_shop_core`; this module
//! holds only what the storefront keeps in the visitor's session.

pub mod session;

pub use session::CheckoutPhase;
