//! Text and geo primitives used by the in-memory backend.

use serde_json::Value as JsonValue;

const EARTH_RADIUS_KM: f64 = 6371.0088;

/// Lowercased alphanumeric tokens, roughly what a standard analyzer emits.
pub fn tokenize(text: &str) -> Vec<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(str::to_lowercase)
        .collect()
}

/// Edit distance between `a` and `b` with adjacent transpositions counted as
/// one edit (optimal string alignment), or `None` once it exceeds `max`.
pub fn edit_distance_bounded(a: &str, b: &str, max: usize) -> Option<usize> {
    if a == b {
        return Some(0);
    }
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    if a.len().abs_diff(b.len()) > max {
        return None;
    }
    if a.is_empty() || b.is_empty() {
        return Some(a.len().max(b.len()));
    }

    let n = b.len();
    let mut prev2 = vec![0usize; n + 1];
    let mut prev: Vec<usize> = (0..=n).collect();
    let mut curr = vec![0usize; n + 1];
    let mut prev_min = 0;
    for i in 1..=a.len() {
        curr[0] = i;
        let mut row_min = curr[0];
        for j in 1..=n {
            let cost = usize::from(a[i - 1] != b[j - 1]);
            curr[j] = (prev[j - 1] + cost).min(prev[j] + 1).min(curr[j - 1] + 1);
            if i > 1 && j > 1 && a[i - 1] == b[j - 2] && a[i - 2] == b[j - 1] {
                curr[j] = curr[j].min(prev2[j - 2] + 1);
            }
            row_min = row_min.min(curr[j]);
        }
        // a transposition can reach this row from two rows up
        if row_min > max && prev_min > max {
            return None;
        }
        prev_min = row_min;
        std::mem::swap(&mut prev2, &mut prev);
        std::mem::swap(&mut prev, &mut curr);
    }
    let d = prev[n];
    (d <= max).then_some(d)
}

/// Looks up a dotted path (`address.city`) in a document.
pub fn lookup<'a>(doc: &'a JsonValue, path: &str) -> Option<&'a JsonValue> {
    if let Some(v) = doc.get(path) {
        return Some(v);
    }
    path.split('.').try_fold(doc, |v, part| v.get(part))
}

/// Scalar text of a field, flattening arrays.
pub fn field_text(value: &JsonValue, out: &mut Vec<String>) {
    match value {
        JsonValue::String(s) => out.push(s.clone()),
        JsonValue::Number(n) => out.push(n.to_string()),
        JsonValue::Bool(b) => out.push(b.to_string()),
        JsonValue::Array(items) => items.iter().for_each(|i| field_text(i, out)),
        JsonValue::Null | JsonValue::Object(_) => {}
    }
}

pub fn as_number(value: &JsonValue) -> Option<f64> {
    let n = match value {
        JsonValue::Number(n) => n.as_f64(),
        JsonValue::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    n.filter(|v| v.is_finite())
}

/// Reads a geo point stored as `{lat, lon}`, `[lon, lat]` or `"lat,lon"`.
pub fn as_geo_point(value: &JsonValue) -> Option<(f64, f64)> {
    match value {
        JsonValue::Object(map) => {
            let lat = as_number(map.get("lat")?)?;
            let lon = as_number(map.get("lon")?)?;
            Some((lat, lon))
        }
        JsonValue::Array(items) if items.len() == 2 => {
            Some((as_number(&items[1])?, as_number(&items[0])?))
        }
        JsonValue::String(s) => {
            let (lat, lon) = s.split_once(',')?;
            Some((lat.trim().parse().ok()?, lon.trim().parse().ok()?))
        }
        _ => None,
    }
}

pub fn haversine_km(a: (f64, f64), b: (f64, f64)) -> f64 {
    let (lat1, lon1) = (a.0.to_radians(), a.1.to_radians());
    let (lat2, lon2) = (b.0.to_radians(), b.1.to_radians());
    let dlat = lat2 - lat1;
    let dlon = lon2 - lon1;
    let h = (dlat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (dlon / 2.0).sin().powi(2);
    2.0 * EARTH_RADIUS_KM * h.sqrt().asin()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn tokenizer_lowercases_and_splits() {
        assert_eq!(tokenize("Smith-Auto  Repair!"), ["smith", "auto", "repair"]);
        assert!(tokenize("  --  ").is_empty());
    }

    #[test]
    fn bounded_edit_distance() {
        assert_eq!(edit_distance_bounded("boston", "boston", 0), Some(0));
        assert_eq!(edit_distance_bounded("bostn", "boston", 2), Some(1));
        assert_eq!(edit_distance_bounded("paris", "lyon", 2), None);
        assert_eq!(edit_distance_bounded("a", "abcd", 2), None);
        assert_eq!(edit_distance_bounded("", "ab", 2), Some(2));
    }

    #[test]
    fn adjacent_swap_is_one_edit() {
        assert_eq!(edit_distance_bounded("smiht", "smith", 1), Some(1));
        assert_eq!(edit_distance_bounded("garaeg", "garage", 1), Some(1));
        assert_eq!(edit_distance_bounded("ab", "ba", 1), Some(1));
        assert_eq!(edit_distance_bounded("abc", "ca", 1), None);
        assert_eq!(edit_distance_bounded("bca", "abc", 2), Some(2));
    }

    #[test]
    fn dotted_lookup() {
        let doc = json!({"address": {"city": "Lyon"}, "a.b": 1});
        assert_eq!(lookup(&doc, "address.city"), Some(&json!("Lyon")));
        assert_eq!(lookup(&doc, "a.b"), Some(&json!(1)));
        assert_eq!(lookup(&doc, "missing.x"), None);
    }

    #[test]
    fn geo_point_formats() {
        assert_eq!(as_geo_point(&json!({"lat": 48.8, "lon": 2.3})), Some((48.8, 2.3)));
        assert_eq!(as_geo_point(&json!([2.3, 48.8])), Some((48.8, 2.3)));
        assert_eq!(as_geo_point(&json!("48.8, 2.3")), Some((48.8, 2.3)));
        assert_eq!(as_geo_point(&json!("nowhere")), None);
    }

    #[test]
    fn paris_to_versailles_is_about_17km() {
        let d = haversine_km((48.8566, 2.3522), (48.8049, 2.1204));
        assert!((16.0..19.0).contains(&d), "{d}");
    }
}
