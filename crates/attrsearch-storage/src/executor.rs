use crate::traits::{BackendResult, SearchBackend};
use attrsearch_core::{BackendError, CompiledQuery, PageRequest, Result, SearchError, SearchPage};
use once_cell::sync::Lazy;
use prometheus::{register_histogram_vec, HistogramVec};
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

static BACKEND_QUERY_SECONDS: Lazy<HistogramVec> = Lazy::new(|| {
    register_histogram_vec!(
        "backend_query_seconds",
        "Backend call latency by index, operation and result",
        &["index", "op", "result"],
        vec![0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0]
    )
    .unwrap()
});

static SEARCH_TOTAL_HITS: Lazy<HistogramVec> = Lazy::new(|| {
    register_histogram_vec!(
        "search_total_hits",
        "Total matching documents per search",
        &["index"],
        vec![0.0, 1.0, 10.0, 100.0, 1_000.0, 10_000.0, 100_000.0, 1_000_000.0]
    )
    .unwrap()
});

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Runs compiled queries against one backend under a deadline.
///
/// A backend failure is logged with the query id and paging, then returned
/// as [`SearchError::Execution`]. No retries and no partial results.
#[derive(Clone)]
pub struct SearchExecutor {
    backend: Arc<dyn SearchBackend>,
    timeout: Duration,
}

impl SearchExecutor {
    pub fn new(backend: Arc<dyn SearchBackend>, timeout: Duration) -> Self {
        Self { backend, timeout }
    }

    pub fn backend(&self) -> &Arc<dyn SearchBackend> {
        &self.backend
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub async fn execute(&self, query: &CompiledQuery, page: &PageRequest) -> Result<SearchPage> {
        let query_id = query.fingerprint(Some(page));
        match self.timed("search", self.backend.search(query, page)).await {
            Ok(result) => {
                SEARCH_TOTAL_HITS
                    .with_label_values(&[self.backend.index()])
                    .observe(result.total_hits as f64);
                tracing::debug!(
                    query_id = %query_id,
                    index = self.backend.index(),
                    page = page.page,
                    size = page.size,
                    hits = result.hits.len(),
                    total_hits = result.total_hits,
                    "search executed"
                );
                Ok(result)
            }
            Err(e) => {
                tracing::error!(
                    query_id = %query_id,
                    index = self.backend.index(),
                    clauses = query.len(),
                    page = page.page,
                    size = page.size,
                    error = %e,
                    "search execution failed"
                );
                Err(SearchError::Execution(e))
            }
        }
    }

    pub async fn count(&self, query: &CompiledQuery) -> Result<u64> {
        let query_id = query.fingerprint(None);
        self.timed("count", self.backend.count(query))
            .await
            .map_err(|e| {
                tracing::error!(
                    query_id = %query_id,
                    index = self.backend.index(),
                    clauses = query.len(),
                    error = %e,
                    "count execution failed"
                );
                SearchError::Execution(e)
            })
    }

    /// Lifecycle and lookup calls share the deadline but are not logged here.
    pub async fn call<T, F>(&self, op: &'static str, fut: F) -> Result<T>
    where
        F: Future<Output = BackendResult<T>>,
    {
        Ok(self.timed(op, fut).await?)
    }

    async fn timed<T, F>(&self, op: &'static str, fut: F) -> BackendResult<T>
    where
        F: Future<Output = BackendResult<T>>,
    {
        let start = Instant::now();
        let result = match tokio::time::timeout(self.timeout, fut).await {
            Ok(r) => r,
            Err(_) => Err(BackendError::Timeout(self.timeout)),
        };
        let label = if result.is_ok() { "ok" } else { "error" };
        BACKEND_QUERY_SECONDS
            .with_label_values(&[self.backend.index(), op, label])
            .observe(start.elapsed().as_secs_f64());
        result
    }
}

#[cfg(test)]
pub(crate) mod stub {
    use super::*;
    use attrsearch_core::Hit;

    /// Backend double with a fixed behaviour for every call.
    pub enum Behaviour {
        Hang,
        Fail(BackendError),
        Serve(Vec<Hit>),
    }

    pub struct StubBackend(pub Behaviour);

    impl StubBackend {
        async fn respond<T>(&self, ok: impl FnOnce(&[Hit]) -> T) -> BackendResult<T> {
            match &self.0 {
                Behaviour::Hang => {
                    tokio::time::sleep(Duration::from_secs(3600)).await;
                    Err(BackendError::Internal("woke up".into()))
                }
                Behaviour::Fail(e) => Err(e.clone()),
                Behaviour::Serve(hits) => Ok(ok(hits)),
            }
        }
    }

    #[async_trait::async_trait]
    impl SearchBackend for StubBackend {
        fn index(&self) -> &str {
            "stub"
        }

        async fn search(&self, _: &CompiledQuery, page: &PageRequest) -> BackendResult<SearchPage> {
            self.respond(|hits| SearchPage {
                hits: hits
                    .iter()
                    .skip(page.offset() as usize)
                    .take(page.size as usize)
                    .cloned()
                    .collect(),
                total_hits: hits.len() as u64,
            })
            .await
        }

        async fn count(&self, _: &CompiledQuery) -> BackendResult<u64> {
            self.respond(|hits| hits.len() as u64).await
        }

        async fn get(&self, id: &str) -> BackendResult<Option<Hit>> {
            self.respond(|hits| hits.iter().find(|h| h.id == id).cloned())
                .await
        }

        async fn create_index(&self) -> BackendResult<()> {
            self.respond(|_| ()).await
        }

        async fn delete_index(&self) -> BackendResult<()> {
            self.respond(|_| ()).await
        }

        async fn index_exists(&self) -> BackendResult<bool> {
            self.respond(|_| true).await
        }
    }
}
