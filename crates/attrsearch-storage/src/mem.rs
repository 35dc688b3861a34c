use crate::matching::{
    as_geo_point, as_number, edit_distance_bounded, field_text, haversine_km, lookup, tokenize,
};
use crate::traits::{BackendResult, SearchBackend};
use attrsearch_core::{
    BackendError, Clause, ClauseKind, CompiledQuery, Hit, Occur, Operator, PageRequest,
    SearchPage, SortDirection, SortField,
};
use once_cell::sync::Lazy;
use parking_lot::RwLock;
use prometheus::{register_int_gauge_vec, IntGaugeVec};
use serde_json::Value as JsonValue;
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::io::BufRead;
use std::path::Path;
use std::sync::Arc;
use thiserror::Error;

static MEM_INDEX_DOCUMENTS: Lazy<IntGaugeVec> = Lazy::new(|| {
    register_int_gauge_vec!(
        "mem_index_documents",
        "Documents held per in-memory index",
        &["index"]
    )
    .unwrap()
});

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("read failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("line {line}: {source}")]
    Parse {
        line: usize,
        #[source]
        source: serde_json::Error,
    },
    #[error("line {line}: document must be a JSON object")]
    NotAnObject { line: usize },
}

/// Index kept in process memory. Evaluates compiled queries directly against
/// the stored JSON documents.
#[derive(Clone)]
pub struct InMemoryBackend {
    index: String,
    inner: Arc<RwLock<Inner>>,
}

struct Inner {
    exists: bool,
    // ordered by id, which is also the tie-breaker for equal scores
    docs: BTreeMap<String, JsonValue>,
}

impl InMemoryBackend {
    pub fn new(index: impl Into<String>) -> Self {
        Self {
            index: index.into(),
            inner: Arc::new(RwLock::new(Inner {
                exists: true,
                docs: BTreeMap::new(),
            })),
        }
    }

    /// Stores `doc` under `id`, creating the index if needed.
    pub fn put(&self, id: impl Into<String>, doc: JsonValue) {
        let mut inner = self.inner.write();
        inner.exists = true;
        inner.docs.insert(id.into(), doc);
        MEM_INDEX_DOCUMENTS
            .with_label_values(&[self.index.as_str()])
            .set(inner.docs.len() as i64);
    }

    /// Stores `doc` under its own `id` attribute, or a fresh ULID when it has none.
    pub fn insert(&self, doc: JsonValue) -> String {
        let id = match doc.get("id") {
            Some(JsonValue::String(s)) if !s.is_empty() => s.clone(),
            Some(JsonValue::Number(n)) => n.to_string(),
            _ => ulid::Ulid::new().to_string(),
        };
        self.put(id.clone(), doc);
        id
    }

    /// Loads newline-delimited JSON documents. Blank lines are skipped.
    pub fn load_ndjson<R: BufRead>(&self, reader: R) -> Result<usize, LoadError> {
        let mut loaded = 0;
        for (i, line) in reader.lines().enumerate() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            let doc: JsonValue = serde_json::from_str(&line)
                .map_err(|source| LoadError::Parse { line: i + 1, source })?;
            if !doc.is_object() {
                return Err(LoadError::NotAnObject { line: i + 1 });
            }
            self.insert(doc);
            loaded += 1;
        }
        tracing::info!(index = %self.index, documents = loaded, "seeded in-memory index");
        Ok(loaded)
    }

    pub fn load_file(&self, path: impl AsRef<Path>) -> Result<usize, LoadError> {
        let file = std::fs::File::open(path)?;
        self.load_ndjson(std::io::BufReader::new(file))
    }

    pub fn len(&self) -> usize {
        self.inner.read().docs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn run_search(&self, query: &CompiledQuery, page: &PageRequest) -> BackendResult<SearchPage> {
        let inner = self.inner.read();
        if !inner.exists {
            return Err(BackendError::IndexMissing(self.index.clone()));
        }
        let mut matches: Vec<(f32, &String, &JsonValue)> = inner
            .docs
            .iter()
            .filter_map(|(id, doc)| evaluate(query, doc).map(|s| (s, id, doc)))
            .collect();
        let total_hits = matches.len() as u64;

        let dir = page.sort.direction;
        match &page.sort.field {
            SortField::Score => matches.sort_by(|a, b| {
                directed(a.0.total_cmp(&b.0), dir).then_with(|| a.1.cmp(b.1))
            }),
            SortField::Field(field) => matches.sort_by(|a, b| {
                compare_field(lookup(a.2, field), lookup(b.2, field), dir)
                    .then_with(|| a.1.cmp(b.1))
            }),
        }

        let hits = matches
            .into_iter()
            .skip(page.offset() as usize)
            .take(page.size as usize)
            .map(|(score, id, doc)| Hit {
                id: id.clone(),
                score: Some(score),
                source: doc.clone(),
            })
            .collect();
        Ok(SearchPage { hits, total_hits })
    }

    fn run_count(&self, query: &CompiledQuery) -> BackendResult<u64> {
        let inner = self.inner.read();
        if !inner.exists {
            return Err(BackendError::IndexMissing(self.index.clone()));
        }
        Ok(inner
            .docs
            .values()
            .filter(|doc| evaluate(query, doc).is_some())
            .count() as u64)
    }
}

#[async_trait::async_trait]
impl SearchBackend for InMemoryBackend {
    fn index(&self) -> &str {
        &self.index
    }

    async fn search(&self, query: &CompiledQuery, page: &PageRequest) -> BackendResult<SearchPage> {
        self.run_search(query, page)
    }

    async fn count(&self, query: &CompiledQuery) -> BackendResult<u64> {
        self.run_count(query)
    }

    async fn get(&self, id: &str) -> BackendResult<Option<Hit>> {
        let inner = self.inner.read();
        if !inner.exists {
            return Err(BackendError::IndexMissing(self.index.clone()));
        }
        Ok(inner.docs.get(id).map(|doc| Hit {
            id: id.to_string(),
            score: None,
            source: doc.clone(),
        }))
    }

    async fn create_index(&self) -> BackendResult<()> {
        self.inner.write().exists = true;
        Ok(())
    }

    async fn delete_index(&self) -> BackendResult<()> {
        let mut inner = self.inner.write();
        inner.exists = false;
        inner.docs.clear();
        MEM_INDEX_DOCUMENTS.with_label_values(&[self.index.as_str()]).set(0);
        Ok(())
    }

    async fn index_exists(&self) -> BackendResult<bool> {
        Ok(self.inner.read().exists)
    }
}

/// Relevance of `doc` for `query`, `None` when it does not match.
fn evaluate(query: &CompiledQuery, doc: &JsonValue) -> Option<f32> {
    if query.is_match_all() {
        return Some(1.0);
    }
    bool_score(&query.clauses, doc)
}

// Every MUST clause has to match; when there are only SHOULD clauses at least
// one of them has to. Matching clauses add up.
fn bool_score(clauses: &[Clause], doc: &JsonValue) -> Option<f32> {
    let mut score = 0.0;
    let mut has_must = false;
    let mut has_should = false;
    let mut should_matched = false;
    for clause in clauses {
        match clause.occur {
            Occur::Must => {
                has_must = true;
                score += clause_score(&clause.kind, doc)?;
            }
            Occur::Should => {
                has_should = true;
                if let Some(s) = clause_score(&clause.kind, doc) {
                    should_matched = true;
                    score += s;
                }
            }
        }
    }
    if has_should && !has_must && !should_matched {
        return None;
    }
    Some(score)
}

fn clause_score(kind: &ClauseKind, doc: &JsonValue) -> Option<f32> {
    match kind {
        ClauseKind::Match {
            field,
            value,
            fuzziness,
            operator,
        } => match_score(lookup(doc, field)?, value, fuzziness.unwrap_or(0), *operator),
        ClauseKind::AnyOf { clauses } => bool_score(clauses, doc),
        ClauseKind::GeoDistance {
            field,
            lat,
            lon,
            distance_km,
        } => {
            let point = as_geo_point(lookup(doc, field)?)?;
            (haversine_km(point, (*lat, *lon)) <= *distance_km).then_some(1.0)
        }
        ClauseKind::Range { field, gte, lte } => {
            let value = lookup(doc, field)?;
            let in_range = |n: f64| gte.map_or(true, |g| n >= g) && lte.map_or(true, |l| n <= l);
            let hit = match value {
                JsonValue::Array(items) => items.iter().filter_map(as_number).any(in_range),
                other => as_number(other).is_some_and(in_range),
            };
            hit.then_some(1.0)
        }
    }
}

fn match_score(field: &JsonValue, value: &str, fuzziness: u8, operator: Operator) -> Option<f32> {
    let query_tokens = tokenize(value);
    if query_tokens.is_empty() {
        return None;
    }
    let mut texts = Vec::new();
    field_text(field, &mut texts);
    let doc_tokens: Vec<String> = texts.iter().flat_map(|t| tokenize(t)).collect();

    let max = fuzziness as usize;
    let mut matched = 0;
    let mut score = 0.0;
    for qt in &query_tokens {
        let best = doc_tokens
            .iter()
            .filter_map(|dt| edit_distance_bounded(qt, dt, max))
            .min();
        if let Some(d) = best {
            matched += 1;
            score += 1.0 / (1.0 + d as f32);
        }
    }
    let ok = match operator {
        Operator::And => matched == query_tokens.len(),
        Operator::Or => matched > 0,
    };
    ok.then_some(score)
}

fn directed(ord: Ordering, dir: SortDirection) -> Ordering {
    match dir {
        SortDirection::Asc => ord,
        SortDirection::Desc => ord.reverse(),
    }
}

// Missing values sort last in both directions; numbers before strings.
fn compare_field(a: Option<&JsonValue>, b: Option<&JsonValue>, dir: SortDirection) -> Ordering {
    let key = |v: Option<&JsonValue>| -> Option<Result<f64, String>> {
        let v = v?;
        if let Some(n) = as_number(v) {
            return Some(Ok(n));
        }
        let mut texts = Vec::new();
        field_text(v, &mut texts);
        texts.into_iter().next().map(|s| Err(s.to_lowercase()))
    };
    match (key(a), key(b)) {
        (None, None) => Ordering::Equal,
        (None, Some(_)) => Ordering::Greater,
        (Some(_), None) => Ordering::Less,
        (Some(x), Some(y)) => {
            let ord = match (x, y) {
                (Ok(x), Ok(y)) => x.total_cmp(&y),
                (Ok(_), Err(_)) => Ordering::Less,
                (Err(_), Ok(_)) => Ordering::Greater,
                (Err(x), Err(y)) => x.cmp(&y),
            };
            directed(ord, dir)
        }
    }
}
