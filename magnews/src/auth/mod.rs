//! Reader authentication.
//!
//! Readers authenticate with a JWT passed as `Authorization: Bearer <token>`. Tokens are issued by
//! the register, login, verify-email and Google OAuth flows and carry the user's id and email.
//!
//! # Modules
//!
//! - [`current_user`]: Extractor resolving the bearer token to a [`CurrentUser`]
//! - [`google`]: Google OAuth2 authorization-code client
//! - [`password`]: Argon2 hashing, password policy, and random token/code generation
//! - [`session`]: JWT issuance and verification
//! - [`stats_token`]: Extractor guarding operator endpoints with the shared stats token
//!
//! # Usage in Handlers
//!
//! ```ignore
//! use magnews::api::models::users::CurrentUser;
//!
//! async fn protected_handler(current_user: CurrentUser) -> String {
//!     format!("Hello, {}!", current_user.name)
//! }
//! ```
//!
//! [`CurrentUser`]: crate::api::models::users::CurrentUser

pub mod current_user;
pub mod google;
pub mod password;
pub mod session;
pub mod stats_token;
