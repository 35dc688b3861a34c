//! Elasticsearch Query DSL rendering and response parsing.
//!
//! Kept free of any client so the request bodies can be inspected from the
//! CLI and unit tests without a cluster.

use crate::traits::BackendResult;
use attrsearch_core::{
    BackendError, Clause, ClauseKind, CompiledQuery, Hit, Occur, Operator, PageRequest,
    SearchPage, SortDirection, SortField,
};
use serde_json::{json, Map, Value as JsonValue};

pub fn render_query(query: &CompiledQuery) -> JsonValue {
    if query.is_match_all() {
        return json!({ "match_all": {} });
    }
    render_bool(&query.clauses)
}

fn render_bool(clauses: &[Clause]) -> JsonValue {
    let mut must = Vec::new();
    let mut should = Vec::new();
    for clause in clauses {
        let rendered = render_clause(&clause.kind);
        match clause.occur {
            Occur::Must => must.push(rendered),
            Occur::Should => should.push(rendered),
        }
    }
    let mut body = Map::new();
    if !must.is_empty() {
        body.insert("must".into(), JsonValue::Array(must));
    }
    if !should.is_empty() {
        body.insert("should".into(), JsonValue::Array(should));
        body.insert("minimum_should_match".into(), json!(1));
    }
    json!({ "bool": body })
}

fn render_clause(kind: &ClauseKind) -> JsonValue {
    match kind {
        ClauseKind::Match {
            field,
            value,
            fuzziness,
            operator,
        } => {
            let mut params = Map::new();
            params.insert("query".into(), json!(value));
            params.insert(
                "operator".into(),
                json!(match operator {
                    Operator::And => "and",
                    Operator::Or => "or",
                }),
            );
            if let Some(f) = fuzziness {
                params.insert("fuzziness".into(), json!(f.to_string()));
            }
            json!({ "match": { field.as_str(): params } })
        }
        ClauseKind::AnyOf { clauses } => render_bool(clauses),
        ClauseKind::GeoDistance {
            field,
            lat,
            lon,
            distance_km,
        } => json!({
            "geo_distance": {
                "distance": format!("{distance_km}km"),
                field.as_str(): { "lat": lat, "lon": lon }
            }
        }),
        ClauseKind::Range { field, gte, lte } => {
            let mut bounds = Map::new();
            if let Some(g) = gte {
                bounds.insert("gte".into(), json!(g));
            }
            if let Some(l) = lte {
                bounds.insert("lte".into(), json!(l));
            }
            json!({ "range": { field.as_str(): bounds } })
        }
    }
}

/// `_search` body. Totals are always tracked exactly.
pub fn search_body(query: &CompiledQuery, page: &PageRequest) -> JsonValue {
    let order = match page.sort.direction {
        SortDirection::Asc => "asc",
        SortDirection::Desc => "desc",
    };
    let sort = match &page.sort.field {
        SortField::Score => json!([{ "_score": { "order": order } }]),
        SortField::Field(f) => json!([{ f.as_str(): { "order": order, "missing": "_last" } }]),
    };
    json!({
        "query": render_query(query),
        "from": page.offset(),
        "size": page.size,
        "sort": sort,
        "track_total_hits": true,
    })
}

pub fn count_body(query: &CompiledQuery) -> JsonValue {
    json!({ "query": render_query(query) })
}

pub fn parse_search_response(body: &JsonValue) -> BackendResult<SearchPage> {
    let hits_obj = body
        .get("hits")
        .ok_or_else(|| BackendError::Internal("search response has no `hits`".into()))?;
    let total_hits = hits_obj
        .get("total")
        .and_then(|t| t.get("value").or(Some(t)))
        .and_then(JsonValue::as_u64)
        .ok_or_else(|| BackendError::Internal("search response has no total".into()))?;
    let hits = hits_obj
        .get("hits")
        .and_then(JsonValue::as_array)
        .map(|arr| arr.iter().filter_map(parse_hit).collect())
        .unwrap_or_default();
    Ok(SearchPage { hits, total_hits })
}

fn parse_hit(hit: &JsonValue) -> Option<Hit> {
    Some(Hit {
        id: hit.get("_id")?.as_str()?.to_string(),
        score: hit.get("_score").and_then(JsonValue::as_f64).map(|s| s as f32),
        source: hit.get("_source")?.clone(),
    })
}

pub fn parse_count_response(body: &JsonValue) -> BackendResult<u64> {
    body.get("count")
        .and_then(JsonValue::as_u64)
        .ok_or_else(|| BackendError::Internal("count response has no `count`".into()))
}

/// Maps an unsuccessful Elasticsearch response onto [`BackendError`].
pub fn classify_error(status: u16, body: &str) -> BackendError {
    if body.contains("index_not_found_exception") {
        return BackendError::IndexMissing(extract_reason(body));
    }
    match status {
        400 => BackendError::MalformedQuery(extract_reason(body)),
        408 | 429 | 502..=504 => BackendError::Unavailable(format!("status {status}")),
        _ => BackendError::Internal(format!("status {status}: {}", extract_reason(body))),
    }
}

fn extract_reason(body: &str) -> String {
    serde_json::from_str::<JsonValue>(body)
        .ok()
        .and_then(|v| {
            v.pointer("/error/reason")
                .and_then(JsonValue::as_str)
                .map(str::to_string)
        })
        .unwrap_or_else(|| body.chars().take(200).collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use attrsearch_core::{AttributeFilter, FilterValue, QueryCompiler, StrategyTable};
    use std::sync::Arc;

    fn compile(table: StrategyTable, f: &AttributeFilter) -> CompiledQuery {
        QueryCompiler::new(Arc::new(table)).compile(f)
    }

    #[test]
    fn empty_query_is_match_all_with_exact_totals() {
        let body = search_body(&CompiledQuery::match_all(), &PageRequest::new(2, 10).unwrap());
        assert_eq!(
            body,
            json!({
                "query": {"match_all": {}},
                "from": 20,
                "size": 10,
                "sort": [{"_score": {"order": "desc"}}],
                "track_total_hits": true
            })
        );
    }

    #[test]
    fn priority_fields_render_fuzzy_and() {
        let f: AttributeFilter = [("name", "Smith Auto"), ("city", "Boston")].into_iter().collect();
        let q = render_query(&compile(StrategyTable::repair_shops(), &f));
        assert_eq!(
            q,
            json!({"bool": {"must": [
                {"match": {"name": {"query": "Smith Auto", "operator": "and", "fuzziness": "2"}}},
                {"match": {"city": {"query": "Boston", "operator": "and", "fuzziness": "2"}}}
            ]}})
        );
    }

    #[test]
    fn sets_render_as_nested_should() {
        let mut f = AttributeFilter::new();
        f.insert("department", FilterValue::AnyOf(vec!["75".into(), "92".into()]));
        let q = render_query(&compile(StrategyTable::users(), &f));
        let group = &q["bool"]["must"][0]["bool"];
        assert_eq!(group["minimum_should_match"], 1);
        assert_eq!(group["should"].as_array().unwrap().len(), 2);
        assert_eq!(group["should"][1]["match"]["department"]["query"], "92");
        assert!(group["should"][0]["match"]["department"].get("fuzziness").is_none());
    }

    #[test]
    fn geo_and_range_render() {
        let f: AttributeFilter = [
            ("latitude", "48.85"),
            ("longitude", "2.35"),
            ("minRating", "4"),
        ]
        .into_iter()
        .collect();
        let q = render_query(&compile(StrategyTable::repair_shops(), &f));
        assert_eq!(
            q["bool"]["must"][0],
            json!({"geo_distance": {"distance": "5km", "coordinates": {"lat": 48.85, "lon": 2.35}}})
        );
        assert_eq!(q["bool"]["must"][1], json!({"range": {"rating": {"gte": 4.0}}}));
    }

    #[test]
    fn field_sort_keeps_missing_last() {
        let page = PageRequest::new(0, 5)
            .unwrap()
            .with_sort(SortField::Field("rating".into()), SortDirection::Asc);
        let body = search_body(&CompiledQuery::match_all(), &page);
        assert_eq!(body["sort"], json!([{"rating": {"order": "asc", "missing": "_last"}}]));
    }

    #[test]
    fn parses_search_and_count_responses() {
        let body = json!({
            "hits": {
                "total": {"value": 23, "relation": "eq"},
                "hits": [
                    {"_id": "a", "_score": 1.5, "_source": {"name": "A"}},
                    {"_id": "b", "_score": null, "_source": {"name": "B"}}
                ]
            }
        });
        let page = parse_search_response(&body).unwrap();
        assert_eq!(page.total_hits, 23);
        assert_eq!(page.hits.len(), 2);
        assert_eq!(page.hits[0].score, Some(1.5));
        assert_eq!(page.hits[1].score, None);
        assert_eq!(parse_count_response(&json!({"count": 7})).unwrap(), 7);
        assert!(parse_search_response(&json!({})).is_err());
    }

    #[test]
    fn error_classification() {
        let missing = r#"{"error":{"type":"index_not_found_exception","reason":"no such index [users]"}}"#;
        assert_eq!(
            classify_error(404, missing),
            BackendError::IndexMissing("no such index [users]".into())
        );
        let bad = r#"{"error":{"type":"parsing_exception","reason":"unknown query [mtch]"}}"#;
        assert_eq!(
            classify_error(400, bad),
            BackendError::MalformedQuery("unknown query [mtch]".into())
        );
        assert!(matches!(classify_error(503, ""), BackendError::Unavailable(_)));
        assert!(matches!(classify_error(500, "boom"), BackendError::Internal(_)));
    }
}
