use attrsearch_core::{BackendError, CompiledQuery, Hit, PageRequest, SearchPage};

pub type BackendResult<T> = std::result::Result<T, BackendError>;

/// Document search backend for one index.
///
/// `search` reports the exact number of matching documents in
/// [`SearchPage::total_hits`], never a capped estimate, and `count` must agree
/// with it for the same query.
#[async_trait::async_trait]
pub trait SearchBackend: Send + Sync + 'static {
    /// Index this backend serves, for logs.
    fn index(&self) -> &str;

    async fn search(&self, query: &CompiledQuery, page: &PageRequest) -> BackendResult<SearchPage>;
    async fn count(&self, query: &CompiledQuery) -> BackendResult<u64>;
    async fn get(&self, id: &str) -> BackendResult<Option<Hit>>;

    // Index lifecycle. Creating an existing index and deleting a missing one
    // both succeed.
    async fn create_index(&self) -> BackendResult<()>;
    async fn delete_index(&self) -> BackendResult<()>;
    async fn index_exists(&self) -> BackendResult<bool>;

    /// Drops the index and creates it empty.
    async fn reindex(&self) -> BackendResult<()> {
        self.delete_index().await?;
        self.create_index().await
    }
}
