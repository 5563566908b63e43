//! Invoice lifecycle and payment reconciliation engine.
//!
//! Tracks each invoice through a regulated set of statuses, reconciles
//! payments and refunds against it to the cent, and writes an immutable
//! audit entry for every status change in the same transaction as the
//! change itself.

pub mod config;
pub mod error;
pub mod models;
pub mod observability;
pub mod services;

pub use config::ServiceConfig;
pub use error::LifecycleError;
