//! Folds independently sourced filter groups into one [`AttributeFilter`].
//!
//! On a field-name collision the first non-blank value wins, with groups
//! consulted in the order scalar, set, freeform. A blank scalar does not
//! shadow a set or freeform value for the same field.

use crate::model::{AttributeFilter, FilterValue};

pub fn aggregate<S, T, V>(scalar: S, sets: T, freeform: AttributeFilter) -> AttributeFilter
where
    S: IntoIterator<Item = (String, String)>,
    T: IntoIterator<Item = (String, V)>,
    V: IntoIterator<Item = String>,
{
    let mut out = AttributeFilter::new();
    for (field, value) in scalar {
        out.insert_if_absent(field, FilterValue::Exact(value));
    }
    for (field, values) in sets {
        out.insert_if_absent(field, FilterValue::AnyOf(values.into_iter().collect()));
    }
    for (field, value) in freeform {
        if !out.insert_if_absent(field.clone(), value) {
            tracing::debug!(field = %field, "freeform attribute shadowed by scalar or set filter");
        }
    }
    out
}
