//! API layer for HTTP request handling and data models.
//!
//! This module contains the REST API implementation, organized into:
//!
//! - **[`handlers`]**: Axum route handlers for all API endpoints
//! - **[`models`]**: Request/response data structures for API communication
//!
//! # API Structure
//!
//! Everything except the service banner lives under `/api`:
//!
//! - **Authentication** (`/api/auth/*`, `/api/oauth/google/callback`): Accounts and sessions
//! - **Profile** (`/api/profile`): Name and billing name
//! - **Comments** (`/api/comments/*`): Article discussion threads
//! - **Newsletter** (`/api/newsletter/*`): Mailing list membership
//! - **Subscription** (`/api/subscription/*`, `/api/webhook`): Paid subscription lifecycle
//! - **Content** (`/api/content/*`): Articles served from the CMS
//! - **Stats** (`/api/stats/*`): Operator dashboards, guarded by the stats token
//! - **Config** (`/api/config`): Launch phase feature flags
//!
//! # OpenAPI Documentation
//!
//! All endpoints are documented with OpenAPI annotations using `utoipa`.
//! API documentation is available at `/docs` when the server is running.

pub mod handlers;
pub mod models;
