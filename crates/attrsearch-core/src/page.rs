use crate::errors::{Result, SearchError};
use crate::model::{Hit, PageRequest};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value as JsonValue;
use std::marker::PhantomData;

/// Turns a raw backend hit into a domain entity.
pub trait DocumentDecoder: Send + Sync + 'static {
    type Entity: Send + 'static;

    fn decode(&self, hit: Hit) -> Result<Self::Entity>;
}

/// Returns the stored document unchanged.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonDecoder;

impl DocumentDecoder for JsonDecoder {
    type Entity = JsonValue;

    fn decode(&self, hit: Hit) -> Result<JsonValue> {
        Ok(hit.source)
    }
}

/// Deserializes the stored document into `T`.
pub struct SerdeDecoder<T>(PhantomData<fn() -> T>);

impl<T> SerdeDecoder<T> {
    pub fn new() -> Self {
        Self(PhantomData)
    }
}

impl<T> Default for SerdeDecoder<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> DocumentDecoder for SerdeDecoder<T>
where
    T: DeserializeOwned + Send + 'static,
{
    type Entity = T;

    fn decode(&self, hit: Hit) -> Result<T> {
        serde_json::from_value(hit.source)
            .map_err(|e| SearchError::Decode(format!("document {}: {}", hit.id, e)))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PageResult<T> {
    pub content: Vec<T>,
    pub current_page: u32,
    pub page_size: u32,
    /// Exact backend total, independent of `content.len()`.
    pub total_items: u64,
    pub total_pages: u64,
}

impl<T> PageResult<T> {
    pub fn is_first(&self) -> bool {
        self.current_page == 0
    }

    pub fn is_last(&self) -> bool {
        (self.current_page as u64) + 1 >= self.total_pages
    }
}

/// `ceil(total / size)`; a zero size is a validation error.
pub fn total_pages(total_items: u64, page_size: u32) -> Result<u64> {
    if page_size == 0 {
        return Err(SearchError::Validation("page size must be > 0".into()));
    }
    Ok(total_items.div_ceil(page_size as u64))
}

pub fn assemble<D: DocumentDecoder>(
    hits: Vec<Hit>,
    total_hits: u64,
    page: &PageRequest,
    decoder: &D,
) -> Result<PageResult<D::Entity>> {
    let total_pages = total_pages(total_hits, page.size)?;
    let content = hits
        .into_iter()
        .map(|hit| decoder.decode(hit))
        .collect::<Result<Vec<_>>>()?;
    Ok(PageResult {
        content,
        current_page: page.page,
        page_size: page.size,
        total_items: total_hits,
        total_pages,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use serde_json::json;

    fn hit(id: &str, source: JsonValue) -> Hit {
        Hit {
            id: id.into(),
            score: Some(1.0),
            source,
        }
    }

    #[test]
    fn total_pages_is_ceiling() {
        assert_eq!(total_pages(23, 10).unwrap(), 3);
        assert_eq!(total_pages(20, 10).unwrap(), 2);
        assert_eq!(total_pages(0, 10).unwrap(), 0);
        assert_eq!(total_pages(1, 10_000).unwrap(), 1);
        assert!(matches!(total_pages(5, 0), Err(SearchError::Validation(_))));
    }

    #[test]
    fn total_comes_from_backend_not_page_length() {
        let page = PageRequest::new(0, 10).unwrap();
        let hits = vec![hit("a", json!({"n":1})), hit("b", json!({"n":2}))];
        let r = assemble(hits, 23, &page, &JsonDecoder).unwrap();
        assert_eq!(r.content.len(), 2);
        assert_eq!(r.total_items, 23);
        assert_eq!(r.total_pages, 3);
        assert_eq!(r.current_page, 0);
        assert!(r.is_first());
        assert!(!r.is_last());
    }

    #[test]
    fn zero_size_fails_fast() {
        let mut page = PageRequest::new(0, 10).unwrap();
        page.size = 0;
        let err = assemble(Vec::new(), 3, &page, &JsonDecoder).unwrap_err();
        assert!(matches!(err, SearchError::Validation(_)));
    }

    #[derive(Debug, Deserialize, PartialEq)]
    struct Shop {
        name: String,
    }

    #[test]
    fn serde_decoder_reports_bad_documents() {
        let page = PageRequest::new(0, 5).unwrap();
        let ok = assemble(
            vec![hit("1", json!({"name":"Garage"}))],
            1,
            &page,
            &SerdeDecoder::<Shop>::new(),
        )
        .unwrap();
        assert_eq!(ok.content, vec![Shop { name: "Garage".into() }]);

        let err = assemble(
            vec![hit("2", json!({"name": 7}))],
            1,
            &page,
            &SerdeDecoder::<Shop>::new(),
        )
        .unwrap_err();
        assert!(matches!(err, SearchError::Decode(m) if m.contains("document 2")));
    }
}
