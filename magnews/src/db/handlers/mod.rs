//! Repository implementations for database access.
//!
//! Each repository wraps a `&mut PgConnection` (a pooled connection or an open transaction) and
//! owns the SQL for one table. [`Users`] and [`Comments`] implement the shared [`Repository`]
//! trait; the others expose only the operations their callers need.
//!
//! ```ignore
//! use magnews::db::handlers::{Repository, Users};
//!
//! let mut tx = pool.begin().await?;
//! let user = Users::new(&mut tx).get_by_id(user_id).await?;
//! tx.commit().await?;
//! ```

pub mod comments;
pub mod invoices;
pub mod newsletter;
pub mod password_reset_tokens;
pub mod repository;
pub mod stats;
pub mod subscriptions;
pub mod users;

pub use comments::Comments;
pub use invoices::Invoices;
pub use newsletter::NewsletterSubscribers;
pub use password_reset_tokens::PasswordResetTokens;
pub use repository::Repository;
pub use stats::Stats;
pub use subscriptions::Subscriptions;
pub use users::Users;
