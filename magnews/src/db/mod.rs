//! Database layer: PostgreSQL via SQLx, organised as repositories.
//!
//! ```text
//! api handlers ──> db::handlers (repositories, SQL) ──> db::models (rows) ──> PostgreSQL
//! ```
//!
//! Write paths that touch more than one table open a transaction and build repositories over it:
//!
//! ```ignore
//! let mut tx = pool.begin().await?;
//! Users::new(&mut tx).set_subscription(user_id, SubscriptionStatus::Active, end).await?;
//! Subscriptions::new(&mut tx).upsert_for_user(&request).await?;
//! tx.commit().await?;
//! ```
//!
//! Migrations live in `migrations/` and are embedded through [`crate::migrator`].

pub mod errors;
pub mod handlers;
pub mod models;
