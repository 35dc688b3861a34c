use crate::model::PageRequest;
use crate::strategy::Operator;
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Occur {
    Must,
    /// Alternative inside an `AnyOf` group; one of the group must match.
    Should,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClauseKind {
    Match {
        field: String,
        value: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        fuzziness: Option<u8>,
        operator: Operator,
    },
    AnyOf {
        clauses: Vec<Clause>,
    },
    GeoDistance {
        field: String,
        lat: f64,
        lon: f64,
        distance_km: f64,
    },
    Range {
        field: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        gte: Option<f64>,
        #[serde(skip_serializing_if = "Option::is_none")]
        lte: Option<f64>,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Clause {
    pub occur: Occur,
    #[serde(flatten)]
    pub kind: ClauseKind,
}

impl Clause {
    pub fn must(kind: ClauseKind) -> Self {
        Self {
            occur: Occur::Must,
            kind,
        }
    }

    pub fn should(kind: ClauseKind) -> Self {
        Self {
            occur: Occur::Should,
            kind,
        }
    }

    /// Indexed field this clause constrains; `None` for groups.
    pub fn field(&self) -> Option<&str> {
        match &self.kind {
            ClauseKind::Match { field, .. }
            | ClauseKind::GeoDistance { field, .. }
            | ClauseKind::Range { field, .. } => Some(field),
            ClauseKind::AnyOf { .. } => None,
        }
    }
}

/// Conjunction of clauses in compile order. Empty means match everything.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CompiledQuery {
    pub clauses: Vec<Clause>,
}

impl CompiledQuery {
    pub fn match_all() -> Self {
        Self::default()
    }

    pub fn is_match_all(&self) -> bool {
        self.clauses.is_empty()
    }

    pub fn len(&self) -> usize {
        self.clauses.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clauses.is_empty()
    }

    /// Stable digest of the query and, when given, the page it was run for.
    /// Usable as a cache key and as a log correlation id.
    pub fn fingerprint(&self, page: Option<&PageRequest>) -> String {
        #[derive(Serialize)]
        struct Key<'a> {
            query: &'a CompiledQuery,
            page: Option<&'a PageRequest>,
        }
        let bytes = serde_json::to_vec(&Key { query: self, page }).unwrap_or_default();
        blake3::hash(&bytes).to_hex().to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn exact(field: &str, value: &str) -> ClauseKind {
        ClauseKind::Match {
            field: field.into(),
            value: value.into(),
            fuzziness: None,
            operator: Operator::Or,
        }
    }

    #[test]
    fn fingerprint_depends_on_query_and_page() {
        let a = CompiledQuery {
            clauses: vec![Clause::must(exact("gender", "F"))],
        };
        let b = CompiledQuery {
            clauses: vec![Clause::must(exact("gender", "M"))],
        };
        let p0 = PageRequest::new(0, 10).unwrap();
        let p1 = PageRequest::new(1, 10).unwrap();
        assert_eq!(a.fingerprint(Some(&p0)), a.clone().fingerprint(Some(&p0)));
        assert_ne!(a.fingerprint(Some(&p0)), b.fingerprint(Some(&p0)));
        assert_ne!(a.fingerprint(Some(&p0)), a.fingerprint(Some(&p1)));
        assert_eq!(a.fingerprint(None).len(), 64);
    }

    #[test]
    fn clause_serializes_flat() {
        let c = Clause::must(exact("gender", "F"));
        let v = serde_json::to_value(&c).unwrap();
        assert_eq!(
            v,
            serde_json::json!({"occur":"must","type":"match","field":"gender","value":"F","operator":"or"})
        );
    }
}
