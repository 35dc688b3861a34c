use crate::es_dsl;
use crate::traits::{BackendResult, SearchBackend};
use attrsearch_core::{BackendError, CompiledQuery, Hit, PageRequest, SearchPage};
use elasticsearch::http::response::Response;
use elasticsearch::http::transport::{SingleNodeConnectionPool, TransportBuilder};
use elasticsearch::indices::{IndicesCreateParts, IndicesDeleteParts, IndicesExistsParts};
use elasticsearch::{CountParts, Elasticsearch, GetParts, SearchParts};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ElasticConfig {
    pub url: String,
    pub index: String,
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
    /// Body sent with index creation (`settings`/`mappings`).
    #[serde(default)]
    pub index_body: Option<JsonValue>,
}

fn default_request_timeout_ms() -> u64 {
    30_000
}

impl ElasticConfig {
    pub fn new(url: impl Into<String>, index: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            index: index.into(),
            request_timeout_ms: default_request_timeout_ms(),
            index_body: None,
        }
    }
}

/// Mapping for the repair-shop index: `coordinates` must be a geo point for
/// distance queries to work.
pub fn repair_shop_index_body() -> JsonValue {
    serde_json::json!({
        "mappings": {
            "properties": {
                "coordinates": { "type": "geo_point" },
                "rating": { "type": "double" },
                "reviews": { "type": "integer" }
            }
        }
    })
}

pub struct ElasticBackend {
    client: Elasticsearch,
    config: ElasticConfig,
}

impl std::fmt::Debug for ElasticBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ElasticBackend")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl ElasticBackend {
    pub fn new(config: ElasticConfig) -> BackendResult<Self> {
        let url: elasticsearch::http::Url = config
            .url
            .parse()
            .map_err(|e| BackendError::Unavailable(format!("invalid url {}: {e}", config.url)))?;
        let transport = TransportBuilder::new(SingleNodeConnectionPool::new(url))
            .timeout(Duration::from_millis(config.request_timeout_ms))
            .build()
            .map_err(|e| BackendError::Unavailable(format!("failed to build transport: {e}")))?;
        Ok(Self {
            client: Elasticsearch::new(transport),
            config,
        })
    }

    fn timeout(&self) -> Duration {
        Duration::from_millis(self.config.request_timeout_ms)
    }

    fn transport_error(&self, e: elasticsearch::Error) -> BackendError {
        if e.is_timeout() {
            BackendError::Timeout(self.timeout())
        } else {
            BackendError::Unavailable(e.to_string())
        }
    }

    async fn json_or_error(&self, response: Response) -> BackendResult<JsonValue> {
        let status = response.status_code();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(es_dsl::classify_error(status.as_u16(), &body));
        }
        response
            .json::<JsonValue>()
            .await
            .map_err(|e| BackendError::Internal(format!("unreadable response: {e}")))
    }
}

#[async_trait::async_trait]
impl SearchBackend for ElasticBackend {
    fn index(&self) -> &str {
        &self.config.index
    }

    async fn search(&self, query: &CompiledQuery, page: &PageRequest) -> BackendResult<SearchPage> {
        let index = self.config.index.as_str();
        let response = self
            .client
            .search(SearchParts::Index(&[index]))
            .body(es_dsl::search_body(query, page))
            .send()
            .await
            .map_err(|e| self.transport_error(e))?;
        let body = self.json_or_error(response).await?;
        es_dsl::parse_search_response(&body)
    }

    async fn count(&self, query: &CompiledQuery) -> BackendResult<u64> {
        let index = self.config.index.as_str();
        let response = self
            .client
            .count(CountParts::Index(&[index]))
            .body(es_dsl::count_body(query))
            .send()
            .await
            .map_err(|e| self.transport_error(e))?;
        let body = self.json_or_error(response).await?;
        es_dsl::parse_count_response(&body)
    }

    async fn get(&self, id: &str) -> BackendResult<Option<Hit>> {
        let response = self
            .client
            .get(GetParts::IndexId(&self.config.index, id))
            .send()
            .await
            .map_err(|e| self.transport_error(e))?;
        if response.status_code().as_u16() == 404 {
            let body = response.text().await.unwrap_or_default();
            if body.contains("index_not_found_exception") {
                return Err(es_dsl::classify_error(404, &body));
            }
            return Ok(None);
        }
        let body = self.json_or_error(response).await?;
        Ok(body.get("_source").map(|source| Hit {
            id: id.to_string(),
            score: None,
            source: source.clone(),
        }))
    }

    async fn create_index(&self) -> BackendResult<()> {
        if self.index_exists().await? {
            return Ok(());
        }
        let index = self.config.index.as_str();
        let body = self
            .config
            .index_body
            .clone()
            .unwrap_or_else(|| serde_json::json!({}));
        let response = self
            .client
            .indices()
            .create(IndicesCreateParts::Index(index))
            .body(body)
            .send()
            .await
            .map_err(|e| self.transport_error(e))?;
        let status = response.status_code();
        if status.is_success() {
            tracing::info!(index, "created index");
            return Ok(());
        }
        let text = response.text().await.unwrap_or_default();
        // lost a creation race with another node
        if text.contains("resource_already_exists_exception") {
            return Ok(());
        }
        Err(es_dsl::classify_error(status.as_u16(), &text))
    }

    async fn delete_index(&self) -> BackendResult<()> {
        let index = self.config.index.as_str();
        let response = self
            .client
            .indices()
            .delete(IndicesDeleteParts::Index(&[index]))
            .send()
            .await
            .map_err(|e| self.transport_error(e))?;
        let status = response.status_code();
        if status.is_success() {
            tracing::info!(index, "deleted index");
            return Ok(());
        }
        let text = response.text().await.unwrap_or_default();
        if text.contains("index_not_found_exception") {
            return Ok(());
        }
        Err(es_dsl::classify_error(status.as_u16(), &text))
    }

    async fn index_exists(&self) -> BackendResult<bool> {
        let index = self.config.index.as_str();
        let response = self
            .client
            .indices()
            .exists(IndicesExistsParts::Index(&[index]))
            .send()
            .await
            .map_err(|e| self.transport_error(e))?;
        match response.status_code().as_u16() {
            200 => Ok(true),
            404 => Ok(false),
            other => Err(BackendError::Internal(format!(
                "index exists check returned status {other}"
            ))),
        }
    }
}
