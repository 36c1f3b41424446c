//! HTTP request handlers for all API endpoints.
//!
//! This module contains Axum route handlers organized by resource type.
//! Each handler is responsible for:
//! - Request validation and deserialization
//! - Authentication checks via the [`CurrentUser`] and [`StatsAccess`] extractors
//! - Business logic execution via database repositories and external clients
//! - Response serialization into the [`ApiResponse`] envelope
//!
//! # Handler Modules
//!
//! - [`auth`]: Registration, login, email verification, and password reset
//! - [`comments`]: Article comment threads with a 30 minute edit window
//! - [`config`]: Launch phase configuration
//! - [`content`]: Read-through proxy to the CMS
//! - [`index`]: Service banner at `/`
//! - [`newsletter`]: Newsletter signup, unsubscribe, and operator export
//! - [`oauth`]: Google sign-in callback
//! - [`profile`]: The signed-in reader's profile
//! - [`stats`]: Operator statistics
//! - [`subscription`]: Subscription status and checkout
//! - [`webhook`]: Payment provider webhooks
//!
//! # Error Handling
//!
//! Handlers return [`crate::errors::Error`] which automatically converts to
//! appropriate HTTP status codes and `{"success": false, "error": ...}` bodies.
//!
//! [`CurrentUser`]: crate::api::models::users::CurrentUser
//! [`StatsAccess`]: crate::auth::stats_token::StatsAccess
//! [`ApiResponse`]: crate::api::models::ApiResponse

pub mod auth;
pub mod comments;
pub mod config;
pub mod content;
pub mod index;
pub mod newsletter;
pub mod oauth;
pub mod profile;
pub mod stats;
pub mod subscription;
pub mod webhook;
