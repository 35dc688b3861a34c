use crate::error::{ApiError, ApiResult};
use crate::metrics;
use crate::model::{
    AdvancedSearchRequest, AdvancedSearchResponse, NearbyParams, OpenDayQuery, RatingRangeParams,
    RepairShop, SearchEnvelope, SearchParams, StatEntry, StatisticsParams, TextQuery,
    UserNameQuery,
};
use attrsearch_core::{
    AttributeFilter, Clause, ClauseKind, CompiledQuery, JsonDecoder, Operator, SearchError,
    SerdeDecoder, StrategyTable,
};
use attrsearch_storage::{SearchBackend, SearchExecutor, SearchService};
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::Value as JsonValue;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

const USERS_DEFAULT_SIZE: i64 = 10_000;
const SHOPS_DEFAULT_SIZE: i64 = 10;

/// `GET /api/repair-shops/search/<path>?<param>=...`, one attribute filter
/// on `field`.
#[derive(Debug, Clone, Copy)]
struct FieldSearch {
    path: &'static str,
    param: &'static str,
    field: &'static str,
    numeric: bool,
}

impl FieldSearch {
    const fn text(path: &'static str, param: &'static str, field: &'static str) -> Self {
        Self {
            path,
            param,
            field,
            numeric: false,
        }
    }

    const fn number(path: &'static str, param: &'static str, field: &'static str) -> Self {
        Self {
            path,
            param,
            field,
            numeric: true,
        }
    }
}

const SHOP_FIELD_SEARCHES: [FieldSearch; 8] = [
    FieldSearch::text("name", "name", "name"),
    FieldSearch::text("category", "category", "mainCategory"),
    FieldSearch::text("city", "city", "city"),
    FieldSearch::text("postal-code", "postalCode", "postalCode"),
    FieldSearch::text("phone", "phone", "phone"),
    FieldSearch::text("status", "status", "status"),
    FieldSearch::number("rating", "rating", "minRating"),
    FieldSearch::number("min-reviews", "minReviews", "minReviews"),
];

pub type UserService = SearchService<JsonDecoder>;
pub type ShopService = SearchService<SerdeDecoder<RepairShop>>;

#[derive(Clone)]
pub struct AppState {
    pub users: Arc<UserService>,
    pub shops: Arc<ShopService>,
}

impl AppState {
    pub fn new(
        users: Arc<dyn SearchBackend>,
        shops: Arc<dyn SearchBackend>,
        timeout: Duration,
    ) -> Self {
        Self {
            users: Arc::new(SearchService::new(
                Arc::new(StrategyTable::users()),
                SearchExecutor::new(users, timeout),
                JsonDecoder,
            )),
            shops: Arc::new(SearchService::new(
                Arc::new(StrategyTable::repair_shops()),
                SearchExecutor::new(shops, timeout),
                SerdeDecoder::new(),
            )),
        }
    }
}

pub fn app(state: AppState) -> Router {
    let mut router = Router::new();
    for search in SHOP_FIELD_SEARCHES {
        router = router.route(
            &format!("/api/repair-shops/search/{}", search.path),
            get(
                move |state: State<AppState>, query: Query<HashMap<String, String>>| {
                    shops_by_field(state, query, search)
                },
            ),
        );
    }
    router
        .route("/health", get(health))
        .route("/metrics", get(metrics_text))
        .route("/users/searchByA04NoFus", post(users_search))
        .route("/users/searchByA04NoFusNumb", post(users_search_total))
        .route("/users/count", post(users_count))
        .route("/users/search", get(users_by_name))
        .route("/users/search/advanced", post(users_advanced))
        .route("/users/:id", get(user_by_id))
        .route("/api/repair-shops/searchByA04NoFus", post(shops_search))
        .route("/api/repair-shops/search", get(shops_text))
        .route("/api/repair-shops/search/nearby", get(shops_nearby))
        .route("/api/repair-shops/search/rating-range", get(shops_rating_range))
        .route("/api/repair-shops/search/open", get(shops_open_on))
        .route(
            "/api/repair-shops/index",
            post(shops_create_index).delete(shops_delete_index),
        )
        .route("/api/repair-shops/reindex", post(shops_reindex))
        .route("/api/repair-shops/:id", get(shop_by_id))
        .route("/api/statistics/custom", post(custom_statistics))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
}

fn tracked<T>(endpoint: &'static str, r: ApiResult<T>) -> ApiResult<T> {
    metrics::record(endpoint, if r.is_ok() { "ok" } else { "error" });
    r
}

async fn health() -> impl IntoResponse {
    (StatusCode::OK, "ok")
}

async fn metrics_text() -> impl IntoResponse {
    (StatusCode::OK, metrics::render())
}

async fn users_search(
    State(app): State<AppState>,
    Query(params): Query<SearchParams>,
    Json(filter): Json<AttributeFilter>,
) -> ApiResult<Json<SearchEnvelope<JsonValue>>> {
    let r = async {
        let page = params.page_request(USERS_DEFAULT_SIZE)?;
        app.users.search(&filter, &page).await
    }
    .await
    .map(|result| Json(result.into()))
    .map_err(ApiError::from);
    tracked("users_search", r)
}

async fn users_search_total(
    State(app): State<AppState>,
    Query(params): Query<SearchParams>,
    Json(filter): Json<AttributeFilter>,
) -> ApiResult<Json<u64>> {
    let r = async {
        params.page_request(USERS_DEFAULT_SIZE)?;
        app.users.count(&filter).await
    }
    .await
    .map(Json)
    .map_err(ApiError::from);
    tracked("users_search_total", r)
}

async fn users_count(
    State(app): State<AppState>,
    Json(filter): Json<AttributeFilter>,
) -> ApiResult<Json<u64>> {
    let r = app.users.count(&filter).await.map(Json).map_err(ApiError::from);
    tracked("users_count", r)
}

async fn users_advanced(
    State(app): State<AppState>,
    Json(req): Json<AdvancedSearchRequest>,
) -> ApiResult<Json<AdvancedSearchResponse<JsonValue>>> {
    let r = async {
        let page = req.page_request()?;
        let freeform = req.additional_attributes.clone().unwrap_or_default();
        app.users
            .search_groups(req.scalar_filters(), req.set_filters(), freeform, &page)
            .await
    }
    .await
    .map(|result| Json(result.into()))
    .map_err(|e| ApiError::internal("search failed", e));
    tracked("users_advanced", r)
}

/// Users whose first name or last name matches.
async fn users_by_name(
    State(app): State<AppState>,
    Query(q): Query<UserNameQuery>,
) -> ApiResult<Json<Vec<JsonValue>>> {
    let clauses: Vec<Clause> = [("firstName", q.first_name), ("lastName", q.last_name)]
        .into_iter()
        .filter_map(|(field, value)| {
            let value = value?.trim().to_string();
            (!value.is_empty()).then(|| {
                Clause::should(ClauseKind::Match {
                    field: field.to_string(),
                    value,
                    fuzziness: None,
                    operator: Operator::Or,
                })
            })
        })
        .collect();
    let r = if clauses.is_empty() {
        Ok(Json(Vec::new()))
    } else {
        let query = CompiledQuery {
            clauses: vec![Clause::must(ClauseKind::AnyOf { clauses })],
        };
        app.users
            .list_query(&query)
            .await
            .map(Json)
            .map_err(ApiError::from)
    };
    tracked("users_by_name", r)
}

async fn user_by_id(
    State(app): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<JsonValue>> {
    let r = app.users.get(&id).await.map(Json).map_err(ApiError::from);
    tracked("user_by_id", r)
}

async fn shops_search(
    State(app): State<AppState>,
    Query(params): Query<SearchParams>,
    Json(filter): Json<AttributeFilter>,
) -> ApiResult<Json<SearchEnvelope<RepairShop>>> {
    let r = async {
        let page = params.page_request(SHOPS_DEFAULT_SIZE)?;
        app.shops.search(&filter, &page).await
    }
    .await
    .map(|result| Json(result.into()))
    .map_err(ApiError::from);
    tracked("shops_search", r)
}

async fn shops_text(
    State(app): State<AppState>,
    Query(q): Query<TextQuery>,
) -> ApiResult<Json<Vec<RepairShop>>> {
    let filter = AttributeFilter::new().text("text", q.query);
    let r = if filter.is_empty() {
        Ok(Json(Vec::new()))
    } else {
        app.shops.list(&filter).await.map(Json).map_err(ApiError::from)
    };
    tracked("shops_text", r)
}

async fn shops_nearby(
    State(app): State<AppState>,
    Query(p): Query<NearbyParams>,
) -> ApiResult<Json<Vec<RepairShop>>> {
    let r = async {
        let distance = p.distance.unwrap_or(attrsearch_core::DEFAULT_GEO_DISTANCE_KM);
        if !(-90.0..=90.0).contains(&p.latitude) || !(-180.0..=180.0).contains(&p.longitude) {
            return Err(SearchError::Validation(format!(
                "coordinates out of range: {}, {}",
                p.latitude, p.longitude
            )));
        }
        if !(distance.is_finite() && distance > 0.0) {
            return Err(SearchError::Validation(format!(
                "distance must be > 0, got {distance}"
            )));
        }
        let filter = AttributeFilter::new()
            .text("latitude", p.latitude.to_string())
            .text("longitude", p.longitude.to_string())
            .text("distance", distance.to_string());
        app.shops.list(&filter).await
    }
    .await
    .map(Json)
    .map_err(ApiError::from);
    tracked("shops_nearby", r)
}

async fn shops_rating_range(
    State(app): State<AppState>,
    Query(p): Query<RatingRangeParams>,
) -> ApiResult<Json<Vec<RepairShop>>> {
    let r = async {
        if !(p.min_rating.is_finite() && p.max_rating.is_finite()) || p.min_rating > p.max_rating {
            return Err(SearchError::Validation(format!(
                "invalid rating range {}..{}",
                p.min_rating, p.max_rating
            )));
        }
        let filter = AttributeFilter::new()
            .text("minRating", p.min_rating.to_string())
            .text("maxRating", p.max_rating.to_string());
        app.shops.list(&filter).await
    }
    .await
    .map(Json)
    .map_err(ApiError::from);
    tracked("shops_rating_range", r)
}

async fn shops_by_field(
    State(app): State<AppState>,
    Query(params): Query<HashMap<String, String>>,
    search: FieldSearch,
) -> ApiResult<Json<Vec<RepairShop>>> {
    let r = async {
        let value = params.get(search.param).map(|v| v.trim()).ok_or_else(|| {
            SearchError::Validation(format!("missing query parameter `{}`", search.param))
        })?;
        if value.is_empty() {
            return Ok(Vec::new());
        }
        if search.numeric && !value.parse::<f64>().is_ok_and(f64::is_finite) {
            return Err(SearchError::Validation(format!(
                "`{}` must be a number, got `{value}`",
                search.param
            )));
        }
        let filter = AttributeFilter::new().text(search.field, value);
        app.shops.list(&filter).await
    }
    .await
    .map(Json)
    .map_err(ApiError::from);
    tracked("shops_by_field", r)
}

/// Shops whose closing days do not include `day`.
async fn shops_open_on(
    State(app): State<AppState>,
    Query(q): Query<OpenDayQuery>,
) -> ApiResult<Json<Vec<RepairShop>>> {
    let r = async {
        if q.day.trim().is_empty() {
            return Err(SearchError::Validation("day is required".into()));
        }
        let shops = app.shops.list(&AttributeFilter::new()).await?;
        Ok(shops
            .into_iter()
            .filter(|shop| shop.is_open_on(&q.day))
            .collect::<Vec<_>>())
    }
    .await
    .map(Json)
    .map_err(ApiError::from);
    tracked("shops_open_on", r)
}

async fn shop_by_id(
    State(app): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<RepairShop>> {
    let r = app.shops.get(&id).await.map(Json).map_err(ApiError::from);
    tracked("shop_by_id", r)
}

async fn shops_create_index(State(app): State<AppState>) -> ApiResult<StatusCode> {
    let r = app.shops.create_index().await.map(|_| StatusCode::OK).map_err(ApiError::from);
    tracked("shops_create_index", r)
}

async fn shops_delete_index(State(app): State<AppState>) -> ApiResult<StatusCode> {
    let r = app.shops.delete_index().await.map(|_| StatusCode::OK).map_err(ApiError::from);
    tracked("shops_delete_index", r)
}

async fn shops_reindex(State(app): State<AppState>) -> ApiResult<StatusCode> {
    let r = app.shops.reindex().await.map(|_| StatusCode::OK).map_err(ApiError::from);
    tracked("shops_reindex", r)
}

async fn custom_statistics(
    State(app): State<AppState>,
    Query(p): Query<StatisticsParams>,
    Json(values): Json<Vec<String>>,
) -> ApiResult<Json<Vec<StatEntry>>> {
    let r = async {
        if p.attribute.trim().is_empty() {
            return Err(SearchError::Validation("attribute is required".into()));
        }
        let counts = app.users.count_values(p.attribute.trim(), values).await?;
        Ok(counts
            .into_iter()
            .map(|(name, count)| StatEntry { name, count })
            .collect::<Vec<_>>())
    }
    .await
    .map(Json)
    .map_err(ApiError::from);
    tracked("custom_statistics", r)
}
