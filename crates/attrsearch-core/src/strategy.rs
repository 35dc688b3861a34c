//! Field strategy table: which matching algorithm applies to which attribute.
//!
//! Lookups are total. Unknown fields get [`FieldStrategy::ExactMatch`], and the
//! names in [`PRIORITY_FIELDS`] always resolve to a fuzzy AND match no matter
//! what the table holds. Tables are built once at start-up and shared
//! read-only between requests.

use serde::Serialize;
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Operator {
    /// Every token of the value must match.
    And,
    /// At least one token must match.
    Or,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "strategy", rename_all = "snake_case")]
pub enum FieldStrategy {
    /// Plain match on the field, no fuzziness.
    ExactMatch,
    FuzzyMatch { distance: u8, operator: Operator },
    /// One value searched across several fields; any field may match.
    MultiFieldOr { fields: Vec<String> },
    /// Distance filter around a point. Registered under the geo field and
    /// fed by the three named parameter attributes.
    GeoRadius {
        lat_field: String,
        lon_field: String,
        distance_field: String,
        default_distance_km: f64,
    },
    /// Inclusive numeric bounds fed by two parameter attributes.
    RangeMatch { min_field: String, max_field: String },
}

/// Fuzziness used for the priority fields.
pub const PRIORITY_FUZZINESS: u8 = 2;

/// Radius used when a geo filter omits its distance parameter.
pub const DEFAULT_GEO_DISTANCE_KM: f64 = 5.0;

/// Always compiled first, in this order, with [`PRIORITY_STRATEGY`].
pub const PRIORITY_FIELDS: [&str; 3] = ["name", "query", "city"];

pub static PRIORITY_STRATEGY: FieldStrategy = FieldStrategy::FuzzyMatch {
    distance: PRIORITY_FUZZINESS,
    operator: Operator::And,
};

pub static DEFAULT_STRATEGY: FieldStrategy = FieldStrategy::ExactMatch;

impl FieldStrategy {
    pub fn multi_field_or<I, S>(fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        FieldStrategy::MultiFieldOr {
            fields: fields.into_iter().map(Into::into).collect(),
        }
    }

    pub fn geo_radius(lat_field: &str, lon_field: &str, distance_field: &str) -> Self {
        FieldStrategy::GeoRadius {
            lat_field: lat_field.to_string(),
            lon_field: lon_field.to_string(),
            distance_field: distance_field.to_string(),
            default_distance_km: DEFAULT_GEO_DISTANCE_KM,
        }
    }

    pub fn range(min_field: &str, max_field: &str) -> Self {
        FieldStrategy::RangeMatch {
            min_field: min_field.to_string(),
            max_field: max_field.to_string(),
        }
    }

    /// Attribute names that feed a parameter-driven strategy.
    pub fn parameters(&self) -> Vec<&str> {
        match self {
            FieldStrategy::GeoRadius {
                lat_field,
                lon_field,
                distance_field,
                ..
            } => vec![lat_field.as_str(), lon_field.as_str(), distance_field.as_str()],
            FieldStrategy::RangeMatch {
                min_field,
                max_field,
            } => vec![min_field.as_str(), max_field.as_str()],
            _ => Vec::new(),
        }
    }
}

pub fn is_priority_field(field: &str) -> bool {
    PRIORITY_FIELDS.contains(&field)
}

#[derive(Debug, Clone, Default)]
pub struct StrategyTable {
    strategies: HashMap<String, FieldStrategy>,
    // parameter attribute -> field whose strategy consumes it
    parameters: HashMap<String, String>,
}

impl StrategyTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Binds `field` to `strategy`. A later binding for the same field wins.
    pub fn with(mut self, field: impl Into<String>, strategy: FieldStrategy) -> Self {
        let field = field.into();
        if let Some(old) = self.strategies.get(&field) {
            for p in old.parameters() {
                self.parameters.remove(p);
            }
        }
        for p in strategy.parameters() {
            self.parameters.insert(p.to_string(), field.clone());
        }
        self.strategies.insert(field, strategy);
        self
    }

    pub fn strategy_for(&self, field: &str) -> &FieldStrategy {
        if is_priority_field(field) {
            return &PRIORITY_STRATEGY;
        }
        self.strategies.get(field).unwrap_or(&DEFAULT_STRATEGY)
    }

    /// For a parameter attribute, the field it targets and that field's strategy.
    pub fn parameter_target(&self, attribute: &str) -> Option<(&str, &FieldStrategy)> {
        if is_priority_field(attribute) {
            return None;
        }
        let target = self.parameters.get(attribute)?;
        let strategy = self.strategies.get(target)?;
        Some((target.as_str(), strategy))
    }

    pub fn len(&self) -> usize {
        self.strategies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.strategies.is_empty()
    }

    /// Users index: every non-priority attribute is a plain match.
    pub fn users() -> Self {
        Self::new()
    }

    /// Repair-shop index.
    pub fn repair_shops() -> Self {
        Self::new()
            .with(
                "text",
                FieldStrategy::multi_field_or(["name", "description", "mainCategory", "categories"]),
            )
            .with(
                "coordinates",
                FieldStrategy::geo_radius("latitude", "longitude", "distance"),
            )
            .with("rating", FieldStrategy::range("minRating", "maxRating"))
            .with("reviews", FieldStrategy::range("minReviews", "maxReviews"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_fields_default_to_exact_match() {
        let table = StrategyTable::repair_shops();
        assert_eq!(table.strategy_for("gender"), &FieldStrategy::ExactMatch);
        assert_eq!(table.strategy_for(""), &FieldStrategy::ExactMatch);
        assert_eq!(table.strategy_for("description"), &FieldStrategy::ExactMatch);
    }

    #[test]
    fn priority_fields_ignore_table_overrides() {
        let table = StrategyTable::new()
            .with("name", FieldStrategy::ExactMatch)
            .with("city", FieldStrategy::multi_field_or(["a", "b"]))
            .with("query", FieldStrategy::range("lo", "hi"));
        for f in PRIORITY_FIELDS {
            assert_eq!(
                table.strategy_for(f),
                &FieldStrategy::FuzzyMatch {
                    distance: 2,
                    operator: Operator::And
                }
            );
        }
    }

    #[test]
    fn parameters_resolve_to_their_target() {
        let table = StrategyTable::repair_shops();
        let (target, strategy) = table.parameter_target("longitude").unwrap();
        assert_eq!(target, "coordinates");
        assert!(matches!(strategy, FieldStrategy::GeoRadius { .. }));
        assert_eq!(table.parameter_target("maxRating").unwrap().0, "rating");
        assert!(table.parameter_target("rating").is_none());
    }

    #[test]
    fn rebinding_drops_old_parameters() {
        let table = StrategyTable::new()
            .with("rating", FieldStrategy::range("lo", "hi"))
            .with("rating", FieldStrategy::ExactMatch);
        assert!(table.parameter_target("lo").is_none());
        assert_eq!(table.len(), 1);
    }
}
