//! Client for the headless CMS that stores articles, videos, daily facts and app reviews.
//!
//! Responses are passed through as raw JSON; the API never reshapes CMS documents. Article list
//! pages are cached in-process for [`CmsConfig::cache_ttl`] so a front page refresh does not hit
//! the CMS on every request.

use moka::future::Cache;
use reqwest::{Client, StatusCode};
use serde_json::Value;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, instrument};
use url::Url;

use crate::{config::CmsConfig, errors::Error};

/// Collections counted by the stats endpoint.
pub const CONTENT_COLLECTIONS: [&str; 4] = ["articles", "videos", "daily-facts", "apps"];

#[derive(Debug, Error)]
pub enum CmsError {
    #[error("{context}: {source}")]
    Http {
        context: &'static str,
        #[source]
        source: reqwest::Error,
    },

    #[error("{context}: CMS returned {status}")]
    Status { context: &'static str, status: StatusCode },

    #[error("{context}: invalid CMS URL")]
    InvalidUrl { context: &'static str },
}

impl From<CmsError> for Error {
    fn from(err: CmsError) -> Self {
        Error::Upstream {
            service: "CMS".to_string(),
            message: err.to_string(),
        }
    }
}

pub struct CmsClient {
    client: Client,
    base_url: Url,
    api_key: Option<String>,
    /// Keyed by (limit, page); None when caching is disabled
    article_pages: Option<Cache<(u32, u32), Value>>,
}

/// Makes sure a url has a trailing slash so `join` appends instead of replacing the last segment.
fn ensure_slash(url: &Url) -> Url {
    if url.path().ends_with('/') {
        url.clone()
    } else {
        let mut new_url = url.clone();
        let path = format!("{}/", new_url.path());
        new_url.set_path(&path);
        new_url
    }
}

impl CmsClient {
    pub fn new(config: &CmsConfig) -> Result<Self, Error> {
        let client = Client::builder().timeout(config.timeout).build().map_err(|e| Error::Internal {
            operation: format!("create CMS HTTP client: {e}"),
        })?;

        let article_pages = (config.cache_ttl > Duration::ZERO).then(|| {
            Cache::builder()
                .max_capacity(256)
                .time_to_live(config.cache_ttl)
                .build()
        });

        Ok(Self {
            client,
            base_url: ensure_slash(&config.url),
            api_key: config.api_key.clone(),
            article_pages,
        })
    }

    /// URL for `api/<segments...>`, with each segment percent-encoded.
    fn api_url(&self, context: &'static str, segments: &[&str]) -> Result<Url, CmsError> {
        let mut url = self.base_url.join("api/").map_err(|_| CmsError::InvalidUrl { context })?;
        {
            let mut path = url.path_segments_mut().map_err(|_| CmsError::InvalidUrl { context })?;
            path.pop_if_empty();
            for segment in segments {
                path.push(segment);
            }
        }
        Ok(url)
    }

    async fn get_json(&self, context: &'static str, url: Url, query: &[(&str, String)]) -> Result<Value, CmsError> {
        let mut request = self.client.get(url).query(query).header("Accept", "application/json");
        if let Some(api_key) = &self.api_key {
            request = request.bearer_auth(api_key);
        }

        let response = request.send().await.map_err(|source| CmsError::Http { context, source })?;
        let status = response.status();
        if !status.is_success() {
            return Err(CmsError::Status { context, status });
        }

        response.json::<Value>().await.map_err(|source| CmsError::Http { context, source })
    }

    /// Newest articles first.
    #[instrument(skip(self), err)]
    pub async fn get_articles(&self, limit: u32, page: u32) -> Result<Value, CmsError> {
        if let Some(cache) = &self.article_pages
            && let Some(cached) = cache.get(&(limit, page)).await
        {
            debug!("Cache hit for article page");
            return Ok(cached);
        }

        const CONTEXT: &str = "Failed to fetch articles";
        let url = self.api_url(CONTEXT, &["articles"])?;
        let articles = self
            .get_json(
                CONTEXT,
                url,
                &[
                    ("limit", limit.to_string()),
                    ("page", page.to_string()),
                    ("sort", "-createdAt".to_string()),
                ],
            )
            .await?;

        if let Some(cache) = &self.article_pages {
            cache.insert((limit, page), articles.clone()).await;
        }

        Ok(articles)
    }

    #[instrument(skip(self), err)]
    pub async fn get_article(&self, id: &str) -> Result<Value, CmsError> {
        const CONTEXT: &str = "Article not found";
        let url = self.api_url(CONTEXT, &["articles", id])?;
        self.get_json(CONTEXT, url, &[]).await
    }

    /// Articles whose title or content matches `query`.
    #[instrument(skip(self), err)]
    pub async fn search_articles(&self, query: &str) -> Result<Value, CmsError> {
        const CONTEXT: &str = "Search failed";
        let url = self.api_url(CONTEXT, &["articles"])?;
        self.get_json(
            CONTEXT,
            url,
            &[
                ("where[or][0][title][like]", query.to_string()),
                ("where[or][1][content][like]", query.to_string()),
            ],
        )
        .await
    }

    /// Number of documents in a collection, read from the `totalDocs` of a one-item page.
    #[instrument(skip(self), err)]
    pub async fn collection_total(&self, collection: &str) -> Result<i64, CmsError> {
        const CONTEXT: &str = "Failed to fetch collection";
        let url = self.api_url(CONTEXT, &[collection])?;
        let page = self.get_json(CONTEXT, url, &[("limit", "1".to_string())]).await?;
        Ok(page.get("totalDocs").and_then(Value::as_i64).unwrap_or(0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::{
        Mock, MockServer, ResponseTemplate,
        matchers::{header, method, path, query_param},
    };

    fn client_for(server: &MockServer, cache_ttl: Duration) -> CmsClient {
        crate::test_utils::install_crypto_provider();
        CmsClient::new(&CmsConfig {
            url: Url::parse(&server.uri()).unwrap(),
            api_key: Some("cms-key".to_string()),
            timeout: Duration::from_secs(5),
            cache_ttl,
        })
        .unwrap()
    }

    #[tokio::test]
    async fn test_get_articles_is_cached() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/articles"))
            .and(query_param("limit", "10"))
            .and(query_param("page", "1"))
            .and(query_param("sort", "-createdAt"))
            .and(header("authorization", "Bearer cms-key"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"docs": [{"id": "a1"}], "totalDocs": 1})))
            .expect(1)
            .mount(&server)
            .await;

        let client = client_for(&server, Duration::from_secs(60));
        let first = client.get_articles(10, 1).await.unwrap();
        let second = client.get_articles(10, 1).await.unwrap();
        assert_eq!(first, second);
        assert_eq!(first["docs"][0]["id"], "a1");
    }

    #[tokio::test]
    async fn test_cache_disabled_with_zero_ttl() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/articles"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"docs": []})))
            .expect(2)
            .mount(&server)
            .await;

        let client = client_for(&server, Duration::ZERO);
        client.get_articles(10, 1).await.unwrap();
        client.get_articles(10, 1).await.unwrap();
    }

    #[tokio::test]
    async fn test_get_article_not_found() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/articles/missing"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let client = client_for(&server, Duration::ZERO);
        let err = client.get_article("missing").await.unwrap_err();
        assert!(matches!(err, CmsError::Status { status: StatusCode::NOT_FOUND, .. }));
        assert!(err.to_string().starts_with("Article not found"));

        let api_err: Error = err.into();
        assert_eq!(api_err.status_code(), axum::http::StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[tokio::test]
    async fn test_search_articles_query() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/articles"))
            .and(query_param("where[or][0][title][like]", "card trick"))
            .and(query_param("where[or][1][content][like]", "card trick"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"docs": [{"id": "a2"}]})))
            .mount(&server)
            .await;

        let client = client_for(&server, Duration::ZERO);
        let results = client.search_articles("card trick").await.unwrap();
        assert_eq!(results["docs"][0]["id"], "a2");
    }

    #[tokio::test]
    async fn test_collection_total() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/daily-facts"))
            .and(query_param("limit", "1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"docs": [], "totalDocs": 42})))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/api/apps"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"docs": []})))
            .mount(&server)
            .await;

        let client = client_for(&server, Duration::ZERO);
        assert_eq!(client.collection_total("daily-facts").await.unwrap(), 42);
        assert_eq!(client.collection_total("apps").await.unwrap(), 0);
    }

    #[test]
    fn test_api_url_keeps_base_path() {
        crate::test_utils::install_crypto_provider();
        let client = CmsClient::new(&CmsConfig {
            url: Url::parse("https://cms.example.com/payload").unwrap(),
            ..Default::default()
        })
        .unwrap();
        let url = client.api_url("test", &["articles", "a/b"]).unwrap();
        assert_eq!(url.as_str(), "https://cms.example.com/payload/api/articles/a%2Fb");
    }
}
