//! Compile, execute, assemble: the search pipeline for one collection.

use crate::executor::SearchExecutor;
use attrsearch_core::{
    aggregate, assemble, AttributeFilter, CompiledQuery, DocumentDecoder, FilterValue,
    PageRequest, PageResult, QueryCompiler, Result, SearchError, StrategyTable,
};
use std::sync::Arc;

/// Upper bound for endpoints that return a plain list instead of a page.
pub const LIST_LIMIT: i64 = 10_000;

pub struct SearchService<D: DocumentDecoder> {
    compiler: QueryCompiler,
    executor: SearchExecutor,
    decoder: D,
}

impl<D: DocumentDecoder> SearchService<D> {
    pub fn new(table: Arc<StrategyTable>, executor: SearchExecutor, decoder: D) -> Self {
        Self {
            compiler: QueryCompiler::new(table),
            executor,
            decoder,
        }
    }

    pub fn compiler(&self) -> &QueryCompiler {
        &self.compiler
    }

    pub fn index(&self) -> &str {
        self.executor.backend().index()
    }

    pub fn compile(&self, filter: &AttributeFilter) -> CompiledQuery {
        self.compiler.compile(filter)
    }

    pub async fn search(
        &self,
        filter: &AttributeFilter,
        page: &PageRequest,
    ) -> Result<PageResult<D::Entity>> {
        let query = self.compiler.compile(filter);
        self.search_query(&query, page)
            .await
            .inspect_err(|e| self.log_failure("search", filter, e))
    }

    /// Runs an already built query, for searches that need an OR across
    /// distinct attributes.
    pub async fn search_query(
        &self,
        query: &CompiledQuery,
        page: &PageRequest,
    ) -> Result<PageResult<D::Entity>> {
        let result = self.executor.execute(query, page).await?;
        assemble(result.hits, result.total_hits, page, &self.decoder)
    }

    /// Same compilation as [`search`](Self::search), so the count always
    /// equals the search's total for the same filter.
    pub async fn count(&self, filter: &AttributeFilter) -> Result<u64> {
        let query = self.compiler.compile(filter);
        self.executor
            .count(&query)
            .await
            .inspect_err(|e| self.log_failure("count", filter, e))
    }

    /// Folds scalar, set and freeform filters into one filter, then searches.
    pub async fn search_groups<S, T, V>(
        &self,
        scalar: S,
        sets: T,
        freeform: AttributeFilter,
        page: &PageRequest,
    ) -> Result<PageResult<D::Entity>>
    where
        S: IntoIterator<Item = (String, String)>,
        T: IntoIterator<Item = (String, V)>,
        V: IntoIterator<Item = String>,
    {
        let filter = aggregate(scalar, sets, freeform);
        self.search(&filter, page).await
    }

    /// First [`LIST_LIMIT`] matches by relevance.
    pub async fn list(&self, filter: &AttributeFilter) -> Result<Vec<D::Entity>> {
        let page = PageRequest::new(0, LIST_LIMIT)?;
        Ok(self.search(filter, &page).await?.content)
    }

    /// Like [`list`](Self::list) for a prebuilt query.
    pub async fn list_query(&self, query: &CompiledQuery) -> Result<Vec<D::Entity>> {
        let page = PageRequest::new(0, LIST_LIMIT)?;
        Ok(self.search_query(query, &page).await?.content)
    }

    /// One exact-match count per value, in input order.
    pub async fn count_values(
        &self,
        attribute: &str,
        values: Vec<String>,
    ) -> Result<Vec<(String, u64)>> {
        let mut out = Vec::with_capacity(values.len());
        for value in values {
            let mut filter = AttributeFilter::new();
            filter.insert(attribute, FilterValue::Exact(value.clone()));
            let n = if filter.is_empty() {
                0
            } else {
                self.count(&filter).await?
            };
            out.push((value, n));
        }
        Ok(out)
    }

    pub async fn get(&self, id: &str) -> Result<D::Entity> {
        let backend = self.executor.backend();
        match self.executor.call("get", backend.get(id)).await? {
            Some(hit) => self.decoder.decode(hit),
            None => Err(SearchError::NotFound),
        }
    }

    pub async fn create_index(&self) -> Result<()> {
        let backend = self.executor.backend();
        self.executor.call("create_index", backend.create_index()).await
    }

    pub async fn delete_index(&self) -> Result<()> {
        let backend = self.executor.backend();
        self.executor.call("delete_index", backend.delete_index()).await
    }

    pub async fn index_exists(&self) -> Result<bool> {
        let backend = self.executor.backend();
        self.executor.call("index_exists", backend.index_exists()).await
    }

    pub async fn reindex(&self) -> Result<()> {
        let backend = self.executor.backend();
        self.executor.call("reindex", backend.reindex()).await?;
        tracing::info!(index = self.index(), "index rebuilt");
        Ok(())
    }

    fn log_failure(&self, op: &str, filter: &AttributeFilter, e: &SearchError) {
        let filters = serde_json::to_string(filter).unwrap_or_default();
        tracing::error!(index = self.index(), op, filters = %filters, error = %e, "search failed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::stub::{Behaviour, StubBackend};
    use crate::executor::DEFAULT_TIMEOUT;
    use crate::mem::InMemoryBackend;
    use attrsearch_core::{BackendError, JsonDecoder, SerdeDecoder};
    use serde::Deserialize;
    use serde_json::json;

    fn users() -> SearchService<JsonDecoder> {
        let backend = InMemoryBackend::new("users");
        for i in 0..23 {
            let city = if i % 2 == 0 { "Paris" } else { "Lyon" };
            let dept = if i % 2 == 0 { "75" } else { "69" };
            let gender = if i < 12 { "F" } else { "M" };
            backend.put(
                format!("u{i:02}"),
                json!({"name": format!("User {i}"), "gender": gender, "city": city, "department": dept}),
            );
        }
        SearchService::new(
            Arc::new(StrategyTable::users()),
            SearchExecutor::new(Arc::new(backend), DEFAULT_TIMEOUT),
            JsonDecoder,
        )
    }

    #[tokio::test]
    async fn count_matches_search_total() {
        let svc = users();
        for f in [
            AttributeFilter::new(),
            [("city", "Paris")].into_iter().collect(),
            [("gender", "F"), ("city", "Lyon")].into_iter().collect(),
        ] {
            let page = svc.search(&f, &PageRequest::new(0, 5).unwrap()).await.unwrap();
            assert_eq!(svc.count(&f).await.unwrap(), page.total_items);
        }
    }

    #[tokio::test]
    async fn empty_filter_pages_through_everything() {
        let svc = users();
        let r = svc
            .search(&AttributeFilter::new(), &PageRequest::new(2, 10).unwrap())
            .await
            .unwrap();
        assert_eq!(r.content.len(), 3);
        assert_eq!(r.total_items, 23);
        assert_eq!(r.total_pages, 3);
        assert_eq!(r.current_page, 2);
    }

    #[tokio::test]
    async fn grouped_filters_search() {
        let svc = users();
        let r = svc
            .search_groups(
                vec![("gender".to_string(), "F".to_string())],
                vec![("department".to_string(), vec!["69".to_string(), "92".to_string()])],
                AttributeFilter::new(),
                &PageRequest::new(0, 10).unwrap(),
            )
            .await
            .unwrap();
        // odd ids below 12
        assert_eq!(r.total_items, 6);
        assert!(r.content.iter().all(|u| u["city"] == "Lyon"));
    }

    #[tokio::test]
    async fn value_counts_keep_request_order() {
        let svc = users();
        let counts = svc
            .count_values("city", vec!["Lyon".into(), "Paris".into(), "Rome".into()])
            .await
            .unwrap();
        assert_eq!(
            counts,
            vec![
                ("Lyon".to_string(), 11u64),
                ("Paris".to_string(), 12),
                ("Rome".to_string(), 0)
            ]
        );
    }

    #[tokio::test]
    async fn prebuilt_query_lists_matches() {
        use attrsearch_core::{Clause, ClauseKind, Operator};
        let svc = users();
        let name = |v: &str| {
            Clause::should(ClauseKind::Match {
                field: "name".into(),
                value: v.into(),
                fuzziness: None,
                operator: Operator::And,
            })
        };
        let query = CompiledQuery {
            clauses: vec![Clause::must(ClauseKind::AnyOf {
                clauses: vec![name("User 3"), name("User 4")],
            })],
        };
        let found = svc.list_query(&query).await.unwrap();
        assert_eq!(found.len(), 2);
        assert_eq!(found[0]["name"], "User 3");
    }

    #[tokio::test]
    async fn get_missing_is_not_found() {
        let svc = users();
        assert_eq!(svc.get("u03").await.unwrap()["city"], "Lyon");
        assert!(matches!(svc.get("zz").await, Err(SearchError::NotFound)));
    }

    #[tokio::test]
    async fn backend_errors_surface_as_execution_errors() {
        let svc = SearchService::new(
            Arc::new(StrategyTable::users()),
            SearchExecutor::new(
                Arc::new(StubBackend(Behaviour::Fail(BackendError::Unavailable("down".into())))),
                DEFAULT_TIMEOUT,
            ),
            JsonDecoder,
        );
        let f: AttributeFilter = [("gender", "F")].into_iter().collect();
        let err = svc.search(&f, &PageRequest::new(0, 10).unwrap()).await.unwrap_err();
        assert!(matches!(err, SearchError::Execution(BackendError::Unavailable(_))));
    }

    #[derive(Debug, Deserialize)]
    struct Shop {
        #[allow(dead_code)]
        name: String,
        rating: f64,
    }

    #[tokio::test]
    async fn typed_decoding_failures_are_decode_errors() {
        let backend = InMemoryBackend::new("shops");
        backend.put("ok", json!({"name": "Garage", "rating": 4.0}));
        backend.put("bad", json!({"name": "Broken"}));
        let svc = SearchService::new(
            Arc::new(StrategyTable::repair_shops()),
            SearchExecutor::new(Arc::new(backend), DEFAULT_TIMEOUT),
            SerdeDecoder::<Shop>::new(),
        );
        assert_eq!(svc.get("ok").await.unwrap().rating, 4.0);
        let err = svc.list(&AttributeFilter::new()).await.unwrap_err();
        assert!(matches!(err, SearchError::Decode(_)));
    }

    #[tokio::test]
    async fn reindex_leaves_an_empty_index() {
        let svc = users();
        svc.reindex().await.unwrap();
        assert!(svc.index_exists().await.unwrap());
        assert_eq!(svc.count(&AttributeFilter::new()).await.unwrap(), 0);
        svc.create_index().await.unwrap();
        svc.delete_index().await.unwrap();
        svc.delete_index().await.unwrap();
        assert!(!svc.index_exists().await.unwrap());
    }
}
