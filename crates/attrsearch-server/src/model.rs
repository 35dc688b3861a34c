//! Wire types of the HTTP API.

use attrsearch_core::{
    AttributeFilter, PageRequest, PageResult, Result, SortDirection, SortField,
};
use attrsearch_storage::matching::{as_geo_point, field_text};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value as JsonValue};

/// `?page&size&sortBy&direction` on the attribute search endpoints.
#[derive(Debug, Default, Deserialize)]
pub struct SearchParams {
    pub page: Option<i64>,
    pub size: Option<i64>,
    #[serde(rename = "sortBy")]
    pub sort_by: Option<String>,
    pub direction: Option<String>,
}

impl SearchParams {
    pub fn page_request(&self, default_size: i64) -> Result<PageRequest> {
        let page = PageRequest::new(self.page.unwrap_or(0), self.size.unwrap_or(default_size))?;
        Ok(page.with_sort(
            SortField::parse(self.sort_by.as_deref().unwrap_or(SortField::SCORE)),
            SortDirection::parse(self.direction.as_deref().unwrap_or("desc")),
        ))
    }
}

/// Page object in the shape existing frontends read.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PageBody<T> {
    pub content: Vec<T>,
    pub number: u32,
    pub size: u32,
    pub total_elements: u64,
    pub total_pages: u64,
    pub number_of_elements: usize,
    pub first: bool,
    pub last: bool,
    pub empty: bool,
}

impl<T> From<PageResult<T>> for PageBody<T> {
    fn from(r: PageResult<T>) -> Self {
        let first = r.is_first();
        let last = r.is_last();
        Self {
            number_of_elements: r.content.len(),
            empty: r.content.is_empty(),
            content: r.content,
            number: r.current_page,
            size: r.page_size,
            total_elements: r.total_items,
            total_pages: r.total_pages,
            first,
            last,
        }
    }
}

/// `{page, totalResults}`
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchEnvelope<T> {
    pub page: PageBody<T>,
    pub total_results: u64,
}

impl<T> From<PageResult<T>> for SearchEnvelope<T> {
    fn from(r: PageResult<T>) -> Self {
        let total_results = r.total_items;
        Self {
            page: r.into(),
            total_results,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdvancedSearchRequest {
    pub gender: Option<String>,
    pub departments: Option<Vec<String>>,
    pub regions: Option<Vec<String>>,
    pub cities: Option<Vec<String>>,
    pub additional_attributes: Option<AttributeFilter>,
    pub page: Option<i64>,
    pub size: Option<i64>,
}

impl AdvancedSearchRequest {
    pub fn page_request(&self) -> Result<PageRequest> {
        PageRequest::new(self.page.unwrap_or(0), self.size.unwrap_or(10))
    }

    /// Scalar filters keyed by indexed field name.
    pub fn scalar_filters(&self) -> Vec<(String, String)> {
        self.gender
            .iter()
            .map(|g| ("gender".to_string(), g.clone()))
            .collect()
    }

    /// Set filters keyed by indexed field name. User documents keep their
    /// location under the `current*` attributes.
    pub fn set_filters(&self) -> Vec<(String, Vec<String>)> {
        [
            ("currentDepartment", &self.departments),
            ("currentRegion", &self.regions),
            ("currentCity", &self.cities),
        ]
        .into_iter()
        .filter_map(|(field, values)| values.clone().map(|v| (field.to_string(), v)))
        .collect()
    }
}

/// `{content, currentPage, totalItems, totalPages}`
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AdvancedSearchResponse<T> {
    pub content: Vec<T>,
    pub current_page: u32,
    pub total_items: u64,
    pub total_pages: u64,
}

impl<T> From<PageResult<T>> for AdvancedSearchResponse<T> {
    fn from(r: PageResult<T>) -> Self {
        Self {
            content: r.content,
            current_page: r.current_page,
            total_items: r.total_items,
            total_pages: r.total_pages,
        }
    }
}

/// Geo point, read from any of `{lat, lon}`, `[lon, lat]` or `"lat,lon"`
/// and always written back as `{lat, lon}`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GeoPoint {
    pub lat: f64,
    pub lon: f64,
}

impl<'de> Deserialize<'de> for GeoPoint {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = JsonValue::deserialize(deserializer)?;
        match as_geo_point(&raw) {
            Some((lat, lon)) => Ok(GeoPoint { lat, lon }),
            None => Err(serde::de::Error::custom(format!("not a geo point: {raw}"))),
        }
    }
}

/// Repair-shop document. Attributes without a dedicated field (`id`
/// included) are kept in `extra` and written back unchanged.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RepairShop {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub main_category: Option<String>,
    #[serde(default)]
    pub categories: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub city: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub postal_code: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rating: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reviews: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub coordinates: Option<GeoPoint>,
    /// Days the shop is closed, a string or a list of strings.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub closed_on: Option<JsonValue>,
    #[serde(flatten)]
    pub extra: Map<String, JsonValue>,
}

impl RepairShop {
    /// `false` when any closing-day entry mentions `day` (case-insensitive).
    pub fn is_open_on(&self, day: &str) -> bool {
        let day = day.trim().to_lowercase();
        let Some(closed) = &self.closed_on else {
            return true;
        };
        let mut days = Vec::new();
        field_text(closed, &mut days);
        !days.iter().any(|d| d.to_lowercase().contains(&day))
    }
}

#[derive(Debug, Deserialize)]
pub struct TextQuery {
    pub query: String,
}

/// `?firstName&lastName`, either may be omitted.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserNameQuery {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct OpenDayQuery {
    pub day: String,
}

#[derive(Debug, Deserialize)]
pub struct NearbyParams {
    pub latitude: f64,
    pub longitude: f64,
    pub distance: Option<f64>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RatingRangeParams {
    pub min_rating: f64,
    pub max_rating: f64,
}

#[derive(Debug, Deserialize)]
pub struct StatisticsParams {
    pub attribute: String,
}

#[derive(Debug, PartialEq, Serialize, Deserialize)]
pub struct StatEntry {
    pub name: String,
    pub count: u64,
}
