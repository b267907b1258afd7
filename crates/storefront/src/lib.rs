//! Muscle Shop Storefront - Public e-commerce site.
//!
//! Library half of the storefront binary: configuration, repositories,
//! services and the axum router. `main.rs` wires these to `PostgreSQL`,
//! SMTP and Sentry; tests build the same router over in-memory parts.

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod config;
pub mod db;
pub mod error;
pub mod middleware;
pub mod models;
pub mod routes;
pub mod services;
pub mod state;
