//! Database record types and repository request structs.
//!
//! Row types derive [`sqlx::FromRow`] and map one-to-one onto table columns. Request structs are
//! what the repositories in [`crate::db::handlers`] accept for inserts and updates.

pub mod comments;
pub mod invoices;
pub mod newsletter;
pub mod password_reset_tokens;
pub mod stats;
pub mod subscriptions;
pub mod users;
