//! Query parameters for the CMS content proxy. Responses are passed through from the CMS.

use serde::Deserialize;
use utoipa::IntoParams;

pub const DEFAULT_ARTICLE_LIMIT: u32 = 10;
pub const MAX_ARTICLE_LIMIT: u32 = 100;

#[derive(Debug, Clone, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct ContentQuery {
    /// Fetch a single article by id
    pub id: Option<String>,
    /// Search article titles and bodies
    pub search: Option<String>,
    /// Page size (default 10)
    pub limit: Option<u32>,
    /// 1-based page number (default 1)
    pub page: Option<u32>,
}
