//! Attribute filter -> [`CompiledQuery`].
//!
//! Compilation never fails. Priority fields are emitted first (in
//! [`PRIORITY_FIELDS`] order), then every other entry in filter order.
//! Parameter attributes of geo/range strategies fold into one clause on
//! their target field, placed where the first parameter appears.

use crate::model::{AttributeFilter, FilterValue};
use crate::query::{Clause, ClauseKind, CompiledQuery};
use crate::strategy::{FieldStrategy, Operator, StrategyTable, PRIORITY_FIELDS};
use std::collections::HashSet;
use std::sync::Arc;

#[derive(Debug, Clone)]
pub struct QueryCompiler {
    table: Arc<StrategyTable>,
}

impl QueryCompiler {
    pub fn new(table: Arc<StrategyTable>) -> Self {
        Self { table }
    }

    pub fn table(&self) -> &StrategyTable {
        &self.table
    }

    pub fn compile(&self, filter: &AttributeFilter) -> CompiledQuery {
        let mut clauses = Vec::with_capacity(filter.len());

        // Priority fields are fuzzy whatever the value kind: a set becomes an
        // OR group of fuzzy matches.
        for field in PRIORITY_FIELDS {
            let strategy = self.table.strategy_for(field);
            let kind = match filter.get(field) {
                Some(FilterValue::Text(v) | FilterValue::Exact(v)) => {
                    strategy_clause(strategy, field, v)
                }
                Some(FilterValue::AnyOf(values)) => ClauseKind::AnyOf {
                    clauses: values
                        .iter()
                        .map(|v| Clause::should(strategy_clause(strategy, field, v)))
                        .collect(),
                },
                None => continue,
            };
            clauses.push(Clause::must(kind));
        }

        let mut folded_targets: HashSet<&str> = HashSet::new();
        for (field, value) in filter.iter() {
            match value {
                _ if PRIORITY_FIELDS.contains(&field) => {}
                FilterValue::Exact(v) => clauses.push(Clause::must(exact(field, v))),
                FilterValue::AnyOf(values) => clauses.push(Clause::must(ClauseKind::AnyOf {
                    clauses: values
                        .iter()
                        .map(|v| Clause::should(exact(field, v)))
                        .collect(),
                })),
                FilterValue::Text(v) => {
                    if let Some((target, strategy)) = self.table.parameter_target(field) {
                        if folded_targets.insert(target) {
                            match parameter_clause(strategy, target, filter) {
                                Some(kind) => clauses.push(Clause::must(kind)),
                                None => tracing::debug!(
                                    target_field = target,
                                    "parameters present but unusable, no clause emitted"
                                ),
                            }
                        }
                        continue;
                    }
                    clauses.push(Clause::must(strategy_clause(
                        self.table.strategy_for(field),
                        field,
                        v,
                    )));
                }
            }
        }

        tracing::debug!(
            attributes = filter.len(),
            clauses = clauses.len(),
            "compiled attribute filter"
        );
        CompiledQuery { clauses }
    }
}

fn exact(field: &str, value: &str) -> ClauseKind {
    ClauseKind::Match {
        field: field.to_string(),
        value: value.to_string(),
        fuzziness: None,
        operator: Operator::And,
    }
}

fn plain_match(field: &str, value: &str) -> ClauseKind {
    ClauseKind::Match {
        field: field.to_string(),
        value: value.to_string(),
        fuzziness: None,
        operator: Operator::Or,
    }
}

fn strategy_clause(strategy: &FieldStrategy, field: &str, value: &str) -> ClauseKind {
    match strategy {
        FieldStrategy::FuzzyMatch { distance, operator } => ClauseKind::Match {
            field: field.to_string(),
            value: value.to_string(),
            fuzziness: Some(*distance),
            operator: *operator,
        },
        FieldStrategy::MultiFieldOr { fields } => ClauseKind::AnyOf {
            clauses: fields
                .iter()
                .map(|f| Clause::should(plain_match(f, value)))
                .collect(),
        },
        // a value on the geo/range target itself has no parameters to read
        FieldStrategy::ExactMatch
        | FieldStrategy::GeoRadius { .. }
        | FieldStrategy::RangeMatch { .. } => plain_match(field, value),
    }
}

fn parameter_clause(
    strategy: &FieldStrategy,
    target: &str,
    filter: &AttributeFilter,
) -> Option<ClauseKind> {
    match strategy {
        FieldStrategy::GeoRadius {
            lat_field,
            lon_field,
            distance_field,
            default_distance_km,
        } => {
            let lat = number(filter, lat_field).filter(|v| (-90.0..=90.0).contains(v))?;
            let lon = number(filter, lon_field).filter(|v| (-180.0..=180.0).contains(v))?;
            let distance_km = number(filter, distance_field)
                .filter(|d| *d > 0.0)
                .unwrap_or(*default_distance_km);
            Some(ClauseKind::GeoDistance {
                field: target.to_string(),
                lat,
                lon,
                distance_km,
            })
        }
        FieldStrategy::RangeMatch {
            min_field,
            max_field,
        } => {
            let gte = number(filter, min_field);
            let lte = number(filter, max_field);
            if gte.is_none() && lte.is_none() {
                return None;
            }
            Some(ClauseKind::Range {
                field: target.to_string(),
                gte,
                lte,
            })
        }
        _ => None,
    }
}

fn number(filter: &AttributeFilter, field: &str) -> Option<f64> {
    match filter.get(field)? {
        FilterValue::Text(s) | FilterValue::Exact(s) => {
            s.parse::<f64>().ok().filter(|v| v.is_finite())
        }
        FilterValue::AnyOf(_) => None,
    }
}
