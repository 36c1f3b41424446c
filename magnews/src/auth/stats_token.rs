use crate::{AppState, errors::Error};
use axum::{
    extract::{FromRequestParts, Query},
    http::request::Parts,
};
use subtle::ConstantTimeEq;
use tracing::{instrument, trace};

use crate::api::models::stats::StatsTokenQuery;

pub const STATS_TOKEN_HEADER: &str = "x-stats-token";

/// Proof that the request carried the operator stats token.
///
/// The token is read from `?token=` first, then the `X-Stats-Token` header.
#[derive(Debug, Clone, Copy)]
pub struct StatsAccess;

fn presented_token(parts: &Parts) -> Option<String> {
    let from_query = Query::<StatsTokenQuery>::try_from_uri(&parts.uri)
        .ok()
        .and_then(|Query(query)| query.token)
        .filter(|token| !token.is_empty());

    from_query.or_else(|| {
        parts
            .headers
            .get(STATS_TOKEN_HEADER)
            .and_then(|value| value.to_str().ok())
            .map(str::to_string)
            .filter(|token| !token.is_empty())
    })
}

impl FromRequestParts<AppState> for StatsAccess {
    type Rejection = Error;

    #[instrument(skip(parts, state))]
    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Error> {
        let Some(presented) = presented_token(parts) else {
            return Err(Error::Unauthenticated {
                message: Some("Missing secret token".to_string()),
            });
        };

        let Some(expected) = state.config.stats.secret_token.as_deref().filter(|t| !t.is_empty()) else {
            trace!("Stats token presented but none is configured");
            return Err(Error::Forbidden {
                message: "Invalid secret token".to_string(),
            });
        };

        if bool::from(presented.as_bytes().ct_eq(expected.as_bytes())) {
            Ok(StatsAccess)
        } else {
            Err(Error::Forbidden {
                message: "Invalid secret token".to_string(),
            })
        }
    }
}
