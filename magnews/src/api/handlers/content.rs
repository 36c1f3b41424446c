use axum::{
    Json,
    extract::{Path, Query, State},
};
use serde_json::Value;

use crate::{
    AppState,
    api::models::{
        ApiResponse,
        content::{ContentQuery, DEFAULT_ARTICLE_LIMIT, MAX_ARTICLE_LIMIT},
    },
    errors::Error,
};

/// List, search, or fetch articles from the CMS
///
/// `id` takes precedence over `search`; without either the newest articles are paged with
/// `limit` and `page`. CMS documents are returned unchanged.
#[utoipa::path(
    get,
    path = "/content",
    params(ContentQuery),
    tag = "content",
    responses(
        (status = 200, description = "CMS response in `data`", body = Object),
        (status = 500, description = "CMS request failed", body = crate::errors::ErrorBody),
    )
)]
#[tracing::instrument(skip_all)]
pub async fn get_content(State(state): State<AppState>, Query(query): Query<ContentQuery>) -> Result<Json<ApiResponse<Value>>, Error> {
    let content = if let Some(id) = query.id.as_deref().filter(|id| !id.is_empty()) {
        state.cms.get_article(id).await?
    } else if let Some(search) = query.search.as_deref().filter(|q| !q.is_empty()) {
        state.cms.search_articles(search).await?
    } else {
        let limit = query.limit.unwrap_or(DEFAULT_ARTICLE_LIMIT).clamp(1, MAX_ARTICLE_LIMIT);
        let page = query.page.unwrap_or(1).max(1);
        state.cms.get_articles(limit, page).await?
    };

    Ok(Json(ApiResponse::ok(content)))
}

/// Fetch a single article
#[utoipa::path(
    get,
    path = "/content/{id}",
    params(("id" = String, Path, description = "CMS article ID")),
    tag = "content",
    responses(
        (status = 200, description = "The article document in `data`", body = Object),
        (status = 500, description = "CMS request failed", body = crate::errors::ErrorBody),
    )
)]
#[tracing::instrument(skip_all, fields(article_id = %id))]
pub async fn get_article(State(state): State<AppState>, Path(id): Path<String>) -> Result<Json<ApiResponse<Value>>, Error> {
    let article = state.cms.get_article(&id).await?;
    Ok(Json(ApiResponse::ok(article)))
}

#[cfg(test)]
mod tests {
    use crate::test_utils::{create_test_app_with_config, create_test_config};
    use axum::http::StatusCode;
    use serde_json::{Value, json};
    use sqlx::PgPool;
    use url::Url;
    use wiremock::{
        Mock, MockServer, ResponseTemplate,
        matchers::{method, path, query_param},
    };

    async fn app_with_cms(pool: PgPool, cms: &MockServer) -> axum_test::TestServer {
        let mut config = create_test_config();
        config.cms.url = Url::parse(&cms.uri()).unwrap();
        create_test_app_with_config(pool, config).await
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_list_and_get_articles(pool: PgPool) {
        let cms = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/articles"))
            .and(query_param("limit", "5"))
            .and(query_param("page", "2"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"docs": [{"id": "a1"}], "totalDocs": 6})))
            .mount(&cms)
            .await;
        Mock::given(method("GET"))
            .and(path("/api/articles/a1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": "a1", "title": "The Cups and Balls"})))
            .mount(&cms)
            .await;

        let server = app_with_cms(pool, &cms).await;

        let response = server
            .get("/api/content")
            .add_query_param("limit", 5)
            .add_query_param("page", 2)
            .await;
        response.assert_status_ok();
        assert_eq!(response.json::<Value>()["data"]["totalDocs"], 6);

        let response = server.get("/api/content/a1").await;
        response.assert_status_ok();
        assert_eq!(response.json::<Value>()["data"]["title"], "The Cups and Balls");

        let response = server.get("/api/content").add_query_param("id", "a1").await;
        assert_eq!(response.json::<Value>()["data"]["id"], "a1");
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_article_limit_is_capped(pool: PgPool) {
        let cms = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/articles"))
            .and(query_param("limit", "100"))
            .and(query_param("page", "1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"docs": [], "totalDocs": 0})))
            .expect(1)
            .mount(&cms)
            .await;

        let server = app_with_cms(pool, &cms).await;
        let response = server.get("/api/content").add_query_param("limit", 100_000).await;
        response.assert_status_ok();
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_search_articles(pool: PgPool) {
        let cms = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/articles"))
            .and(query_param("where[or][0][title][like]", "coin"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"docs": [], "totalDocs": 0})))
            .mount(&cms)
            .await;

        let server = app_with_cms(pool, &cms).await;
        let response = server.get("/api/content").add_query_param("search", "coin").await;
        response.assert_status_ok();
        assert_eq!(response.json::<Value>()["data"]["totalDocs"], 0);
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_cms_failure_is_server_error(pool: PgPool) {
        let cms = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&cms)
            .await;

        let server = app_with_cms(pool, &cms).await;
        let response = server.get("/api/content/missing").await;
        response.assert_status(StatusCode::INTERNAL_SERVER_ERROR);
        let error = response.json::<Value>()["error"].as_str().unwrap().to_string();
        assert!(error.starts_with("Article not found"), "{error}");
    }
}
