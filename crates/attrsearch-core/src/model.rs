use crate::errors::{Result, SearchError};
use serde::de::{self, MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value as JsonValue;
use std::fmt;

pub type DocumentId = String;

/// Value side of one filter entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum FilterValue {
    /// Free-form value, matched with the field's strategy.
    Text(String),
    /// Scalar filter: exact match, the strategy table is not consulted.
    /// Priority fields stay fuzzy.
    Exact(String),
    /// Set filter: the field must match one of the values.
    AnyOf(Vec<String>),
}

impl FilterValue {
    /// Trims values and drops blanks. `None` when nothing usable is left.
    pub fn normalize(self) -> Option<Self> {
        fn trimmed(s: String) -> Option<String> {
            let t = s.trim();
            if t.is_empty() {
                None
            } else if t.len() == s.len() {
                Some(s)
            } else {
                Some(t.to_string())
            }
        }
        match self {
            FilterValue::Text(s) => trimmed(s).map(FilterValue::Text),
            FilterValue::Exact(s) => trimmed(s).map(FilterValue::Exact),
            FilterValue::AnyOf(values) => {
                let mut out: Vec<String> = Vec::with_capacity(values.len());
                for v in values.into_iter().filter_map(trimmed) {
                    if !out.contains(&v) {
                        out.push(v);
                    }
                }
                if out.is_empty() {
                    None
                } else {
                    Some(FilterValue::AnyOf(out))
                }
            }
        }
    }
}

/// Ordered attribute map supplied with one search request.
///
/// Keys are unique and every stored value is non-blank: blank values are
/// dropped on insertion, so the compiler never sees them.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct AttributeFilter {
    entries: Vec<(String, FilterValue)>,
}

impl AttributeFilter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts or replaces `field`. A replaced entry keeps its position.
    /// Returns `false` when the value was blank and nothing was stored.
    pub fn insert(&mut self, field: impl Into<String>, value: FilterValue) -> bool {
        let field = field.into();
        let Some(value) = value.normalize() else {
            self.remove(&field);
            return false;
        };
        match self.entries.iter_mut().find(|(k, _)| *k == field) {
            Some(slot) => slot.1 = value,
            None => self.entries.push((field, value)),
        }
        true
    }

    /// Inserts only when `field` is not present yet (first writer wins).
    pub fn insert_if_absent(&mut self, field: impl Into<String>, value: FilterValue) -> bool {
        let field = field.into();
        if self.contains(&field) {
            return false;
        }
        self.insert(field, value)
    }

    pub fn text(mut self, field: impl Into<String>, value: impl Into<String>) -> Self {
        self.insert(field, FilterValue::Text(value.into()));
        self
    }

    pub fn remove(&mut self, field: &str) -> Option<FilterValue> {
        let pos = self.entries.iter().position(|(k, _)| k == field)?;
        Some(self.entries.remove(pos).1)
    }

    pub fn get(&self, field: &str) -> Option<&FilterValue> {
        self.entries.iter().find(|(k, _)| k == field).map(|(_, v)| v)
    }

    pub fn contains(&self, field: &str) -> bool {
        self.get(field).is_some()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &FilterValue)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for AttributeFilter {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut filter = AttributeFilter::new();
        for (k, v) in iter {
            filter.insert(k, FilterValue::Text(v.into()));
        }
        filter
    }
}

impl IntoIterator for AttributeFilter {
    type Item = (String, FilterValue);
    type IntoIter = std::vec::IntoIter<(String, FilterValue)>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.into_iter()
    }
}

impl Serialize for AttributeFilter {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (k, v) in &self.entries {
            map.serialize_entry(k, v)?;
        }
        map.end()
    }
}

// JSON objects keep document order; scalars become Text, arrays become AnyOf,
// nulls are dropped.
impl<'de> Deserialize<'de> for AttributeFilter {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        struct FilterVisitor;

        impl<'de> Visitor<'de> for FilterVisitor {
            type Value = AttributeFilter;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str("a map of attribute names to values")
            }

            fn visit_map<A: MapAccess<'de>>(
                self,
                mut map: A,
            ) -> std::result::Result<Self::Value, A::Error> {
                let mut filter = AttributeFilter::new();
                while let Some((key, value)) = map.next_entry::<String, JsonValue>()? {
                    let value = match value {
                        JsonValue::Null => continue,
                        JsonValue::Array(items) => FilterValue::AnyOf(
                            items
                                .into_iter()
                                .map(|item| scalar_to_string(item).ok_or(()))
                                .collect::<std::result::Result<Vec<_>, ()>>()
                                .map_err(|_| {
                                    <A::Error as de::Error>::custom(format!(
                                        "attribute `{key}`: list members must be scalars"
                                    ))
                                })?,
                        ),
                        other => match scalar_to_string(other) {
                            Some(s) => FilterValue::Text(s),
                            None => {
                                return Err(de::Error::custom(format!(
                                    "attribute `{key}`: nested objects are not supported"
                                )))
                            }
                        },
                    };
                    filter.insert(key, value);
                }
                Ok(filter)
            }
        }

        deserializer.deserialize_map(FilterVisitor)
    }
}

fn scalar_to_string(value: JsonValue) -> Option<String> {
    match value {
        JsonValue::String(s) => Some(s),
        JsonValue::Number(n) => Some(n.to_string()),
        JsonValue::Bool(b) => Some(b.to_string()),
        JsonValue::Null => Some(String::new()),
        JsonValue::Array(_) | JsonValue::Object(_) => None,
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum SortField {
    /// Relevance score, `_score` on the wire.
    Score,
    Field(String),
}

impl SortField {
    pub const SCORE: &'static str = "_score";

    pub fn parse(raw: &str) -> Self {
        let raw = raw.trim();
        if raw.is_empty() || raw == Self::SCORE {
            SortField::Score
        } else {
            SortField::Field(raw.to_string())
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            SortField::Score => Self::SCORE,
            SortField::Field(f) => f,
        }
    }
}

impl Serialize for SortField {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SortDirection {
    Asc,
    Desc,
}

impl SortDirection {
    /// `asc` in any case is ascending; everything else is descending.
    pub fn parse(raw: &str) -> Self {
        if raw.trim().eq_ignore_ascii_case("asc") {
            SortDirection::Asc
        } else {
            SortDirection::Desc
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct Sort {
    pub field: SortField,
    pub direction: SortDirection,
}

impl Default for Sort {
    fn default() -> Self {
        Self {
            field: SortField::Score,
            direction: SortDirection::Desc,
        }
    }
}

/// Zero-based page request. Construct through [`PageRequest::new`], which
/// rejects negative pages and empty page sizes.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct PageRequest {
    pub page: u32,
    pub size: u32,
    pub sort: Sort,
}

impl PageRequest {
    pub fn new(page: i64, size: i64) -> Result<Self> {
        let page = u32::try_from(page)
            .map_err(|_| SearchError::Validation(format!("page must be >= 0, got {page}")))?;
        if size <= 0 {
            return Err(SearchError::Validation(format!(
                "page size must be > 0, got {size}"
            )));
        }
        let size = u32::try_from(size)
            .map_err(|_| SearchError::Validation(format!("page size too large: {size}")))?;
        Ok(Self {
            page,
            size,
            sort: Sort::default(),
        })
    }

    pub fn with_sort(mut self, field: SortField, direction: SortDirection) -> Self {
        self.sort = Sort { field, direction };
        self
    }

    /// Index of the first hit on this page.
    pub fn offset(&self) -> u64 {
        self.page as u64 * self.size as u64
    }
}

/// Raw document as returned by a backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Hit {
    pub id: DocumentId,
    #[serde(default)]
    pub score: Option<f32>,
    pub source: JsonValue,
}

/// One backend page plus the exact number of matching documents.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SearchPage {
    pub hits: Vec<Hit>,
    pub total_hits: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blank_values_are_dropped() {
        let mut f = AttributeFilter::new();
        assert!(!f.insert("name", FilterValue::Text("   ".into())));
        assert!(f.insert("city", FilterValue::Text(" Boston ".into())));
        assert!(!f.insert("department", FilterValue::AnyOf(vec![" ".into(), "".into()])));
        assert_eq!(f.len(), 1);
        assert_eq!(f.get("city"), Some(&FilterValue::Text("Boston".into())));
    }

    #[test]
    fn replacing_keeps_position_and_blank_replacement_removes() {
        let mut f: AttributeFilter = [("a", "1"), ("b", "2")].into_iter().collect();
        f.insert("a", FilterValue::Text("3".into()));
        let keys: Vec<&str> = f.iter().map(|(k, _)| k).collect();
        assert_eq!(keys, ["a", "b"]);
        f.insert("a", FilterValue::Text("".into()));
        assert!(!f.contains("a"));
    }

    #[test]
    fn any_of_dedups_and_trims() {
        let v = FilterValue::AnyOf(vec!["75".into(), " 92".into(), "75".into()]).normalize();
        assert_eq!(v, Some(FilterValue::AnyOf(vec!["75".into(), "92".into()])));
    }

    #[test]
    fn deserialize_preserves_document_order() {
        let f: AttributeFilter = serde_json::from_str(
            r#"{"zeta":"1","alpha":"x","skip":null,"blank":"  ","age":42,"dept":["75",92]}"#,
        )
        .unwrap();
        let got: Vec<(&str, &FilterValue)> = f.iter().collect();
        assert_eq!(
            got,
            vec![
                ("zeta", &FilterValue::Text("1".into())),
                ("alpha", &FilterValue::Text("x".into())),
                ("age", &FilterValue::Text("42".into())),
                ("dept", &FilterValue::AnyOf(vec!["75".into(), "92".into()])),
            ]
        );
    }

    #[test]
    fn nested_objects_are_rejected() {
        let err = serde_json::from_str::<AttributeFilter>(r#"{"a":{"b":1}}"#).unwrap_err();
        assert!(err.to_string().contains("nested objects"));
    }

    #[test]
    fn page_request_validation() {
        assert!(matches!(
            PageRequest::new(0, 0),
            Err(SearchError::Validation(_))
        ));
        assert!(matches!(
            PageRequest::new(-1, 10),
            Err(SearchError::Validation(_))
        ));
        let p = PageRequest::new(3, 25).unwrap();
        assert_eq!(p.offset(), 75);
        assert_eq!(p.sort, Sort::default());
    }

    #[test]
    fn sort_parsing() {
        assert_eq!(SortField::parse("_score"), SortField::Score);
        assert_eq!(SortField::parse(""), SortField::Score);
        assert_eq!(SortField::parse("rating"), SortField::Field("rating".into()));
        assert_eq!(SortDirection::parse("ASC"), SortDirection::Asc);
        assert_eq!(SortDirection::parse("whatever"), SortDirection::Desc);
    }
}
