use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    response::Json,
};
use serde::Deserialize;
use uuid::Uuid;

use scamwatch_common::countries::{country_code, resolve_country};
use scamwatch_common::{
    Engagement, EngagementKind, LocationStat, ReportQuery, ReportSort, ReportSummary, ScamCategory,
    ScamReport, DEFAULT_PAGE_SIZE, MAX_PAGE_SIZE,
};

use crate::error::{ApiError, ApiResult};
use crate::AppState;

// --- Query structs ---

#[derive(Deserialize)]
pub struct ReportsQuery {
    country: Option<String>,
    city: Option<String>,
    category: Option<String>,
    incidents_only: Option<bool>,
    sort: Option<String>,
    limit: Option<i64>,
    offset: Option<i64>,
}

#[derive(Deserialize)]
pub struct SearchQuery {
    q: Option<String>,
    limit: Option<i64>,
}

#[derive(Deserialize)]
pub struct LimitQuery {
    limit: Option<i64>,
}

#[derive(Deserialize)]
pub struct CityQuery {
    city: Option<String>,
}

#[derive(Deserialize)]
pub struct ResolveQuery {
    name: Option<String>,
}

// --- Helpers ---

fn parse_param<T: std::str::FromStr>(value: Option<&str>, name: &str) -> ApiResult<Option<T>> {
    match value.map(str::trim).filter(|v| !v.is_empty()) {
        None => Ok(None),
        Some(raw) => raw
            .parse()
            .map(Some)
            .map_err(|_| ApiError::BadRequest(format!("invalid {name}: {raw}"))),
    }
}

/// Stored country spelling for user input, falling back to the input.
fn canonical_country(input: &str) -> String {
    resolve_country(input)
        .map(str::to_string)
        .unwrap_or_else(|| input.trim().to_string())
}

fn page_limit(limit: Option<i64>) -> i64 {
    limit.unwrap_or(DEFAULT_PAGE_SIZE).clamp(1, MAX_PAGE_SIZE)
}

pub fn stats_to_geojson(stats: &[LocationStat]) -> serde_json::Value {
    let features: Vec<serde_json::Value> = stats
        .iter()
        .filter_map(|stat| {
            let point = stat.coordinates?;
            Some(serde_json::json!({
                "type": "Feature",
                "geometry": {
                    "type": "Point",
                    "coordinates": [point.lng, point.lat]
                },
                "properties": {
                    "country": stat.country,
                    "city": stat.city,
                    "total_scams": stat.total_scams,
                    "average_loss": stat.average_loss,
                    "top_categories": stat.top_categories,
                }
            }))
        })
        .collect();

    serde_json::json!({
        "type": "FeatureCollection",
        "features": features,
    })
}

// --- Handlers ---

pub async fn api_reports(
    State(state): State<Arc<AppState>>,
    Query(params): Query<ReportsQuery>,
) -> ApiResult<Json<Vec<ScamReport>>> {
    let query = ReportQuery {
        country: params.country.as_deref().map(canonical_country),
        city: params.city.filter(|c| !c.trim().is_empty()),
        category: parse_param::<ScamCategory>(params.category.as_deref(), "category")?,
        incidents_only: params.incidents_only.unwrap_or(true),
        sort: parse_param::<ReportSort>(params.sort.as_deref(), "sort")?.unwrap_or_default(),
        limit: params.limit.unwrap_or(DEFAULT_PAGE_SIZE),
        offset: params.offset.unwrap_or(0),
    }
    .normalized();
    Ok(Json(state.store.list_reports(&query).await?))
}

pub async fn api_search_reports(
    State(state): State<Arc<AppState>>,
    Query(params): Query<SearchQuery>,
) -> ApiResult<Json<Vec<ScamReport>>> {
    let text = params
        .q
        .as_deref()
        .map(str::trim)
        .filter(|q| !q.is_empty())
        .ok_or_else(|| ApiError::BadRequest("missing search text (q)".into()))?;
    Ok(Json(state.store.search_reports(text, page_limit(params.limit)).await?))
}

pub async fn api_report_detail(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<ScamReport>> {
    // Unprocessed reports are not visible to readers.
    state
        .store
        .get_report(id)
        .await?
        .filter(|r| r.is_processed)
        .map(Json)
        .ok_or(ApiError::NotFound("report"))
}

pub async fn api_record_engagement(
    State(state): State<Arc<AppState>>,
    Path((id, kind)): Path<(Uuid, String)>,
) -> ApiResult<Json<Engagement>> {
    let kind: EngagementKind = kind
        .parse()
        .map_err(|_| ApiError::BadRequest(format!("invalid engagement kind: {kind}")))?;
    state
        .store
        .record_engagement(id, kind)
        .await?
        .map(Json)
        .ok_or(ApiError::NotFound("report"))
}

pub async fn api_stats(State(state): State<Arc<AppState>>) -> ApiResult<Json<ReportSummary>> {
    Ok(Json(state.store.report_summary(state.max_attempts).await?))
}

pub async fn api_locations(
    State(state): State<Arc<AppState>>,
    Query(params): Query<LimitQuery>,
) -> ApiResult<Json<Vec<LocationStat>>> {
    Ok(Json(state.store.location_stats(page_limit(params.limit)).await?))
}

pub async fn api_locations_geojson(
    State(state): State<Arc<AppState>>,
    Query(params): Query<LimitQuery>,
) -> ApiResult<Json<serde_json::Value>> {
    let stats = state.store.location_stats(page_limit(params.limit)).await?;
    Ok(Json(stats_to_geojson(&stats)))
}

pub async fn api_location_detail(
    State(state): State<Arc<AppState>>,
    Path(country): Path<String>,
    Query(params): Query<CityQuery>,
) -> ApiResult<Json<LocationStat>> {
    let country = canonical_country(&country);
    let city = params.city.as_deref().map(str::trim).filter(|c| !c.is_empty());
    state
        .store
        .location_stat(&country, city)
        .await?
        .map(Json)
        .ok_or(ApiError::NotFound("location"))
}

pub async fn api_resolve_country(
    Query(params): Query<ResolveQuery>,
) -> ApiResult<Json<serde_json::Value>> {
    let name = params
        .name
        .as_deref()
        .map(str::trim)
        .filter(|n| !n.is_empty())
        .ok_or_else(|| ApiError::BadRequest("missing country name".into()))?;
    let canonical = resolve_country(name).ok_or(ApiError::NotFound("country"))?;
    Ok(Json(serde_json::json!({
        "input": name,
        "canonical": canonical,
        "code": country_code(canonical),
    })))
}
