//! Billing lifecycle core for institutional administration.
//!
//! Discounts and price lists move through date-windowed statuses, payment
//! concepts are typed through a persisted registry, and payment receipts are
//! composed into flat views for the HTTP layer.

pub mod billing;
pub mod config;
pub mod error;
pub mod storage;
pub mod telemetry;
