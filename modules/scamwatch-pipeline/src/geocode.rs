//! Location hint -> coordinates plus canonical names.
//!
//! Queries always carry the country hint, the geocoder is narrowed by
//! country code, results are cached per normalized query, and two names
//! that routinely resolve to the wrong place are corrected.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tracing::{debug, info, warn};

use mapbox_client::{ForwardQuery, MapboxClient, MapboxError, PlaceType};
use scamwatch_common::countries::{canonical_for_code, country_code, resolve_country};
use scamwatch_common::GeoPoint;

const PLACE_TYPES: [PlaceType; 5] = [
    PlaceType::Place,
    PlaceType::Locality,
    PlaceType::District,
    PlaceType::Region,
    PlaceType::Country,
];

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum GeocodeError {
    /// Rate limiting, transport failure or a 5xx. Worth another attempt.
    #[error("Geocoder unavailable: {0}")]
    Transient(String),

    /// Credentials refused. No retry can fix this.
    #[error("Geocoder credentials rejected (status {status}): {message}")]
    Unauthorized { status: u16, message: String },

    /// The query itself was refused.
    #[error("Geocoder rejected the request (status {status}): {message}")]
    Rejected { status: u16, message: String },
}

impl GeocodeError {
    pub fn is_transient(&self) -> bool {
        matches!(self, GeocodeError::Transient(_))
    }

    pub fn is_configuration(&self) -> bool {
        matches!(self, GeocodeError::Unauthorized { .. })
    }
}

impl From<MapboxError> for GeocodeError {
    fn from(err: MapboxError) -> Self {
        match err {
            MapboxError::RateLimited => GeocodeError::Transient(err.to_string()),
            MapboxError::Network(message) => GeocodeError::Transient(message),
            MapboxError::Api { status, message } if status >= 500 => {
                GeocodeError::Transient(format!("status {status}: {message}"))
            }
            MapboxError::Api { status, message } if status == 401 || status == 403 => {
                GeocodeError::Unauthorized { status, message }
            }
            MapboxError::Api { status, message } => GeocodeError::Rejected { status, message },
            MapboxError::Parse(message) => GeocodeError::Transient(message),
        }
    }
}

/// Best candidate returned by the forward geocoder.
#[derive(Debug, Clone, PartialEq)]
pub struct GeocodeCandidate {
    pub point: GeoPoint,
    pub country: Option<String>,
    pub city: Option<String>,
}

/// Forward geocoding: free text plus an optional two-letter country filter.
#[async_trait]
pub trait Geocoder: Send + Sync {
    async fn forward(
        &self,
        query: &str,
        country_code: Option<&str>,
    ) -> Result<Option<GeocodeCandidate>, GeocodeError>;
}

#[async_trait]
impl Geocoder for MapboxClient {
    async fn forward(
        &self,
        query: &str,
        country_code: Option<&str>,
    ) -> Result<Option<GeocodeCandidate>, GeocodeError> {
        let mut request = ForwardQuery::new(query).types(&PLACE_TYPES).limit(1);
        if let Some(code) = country_code {
            request = request.country(code);
        }
        let features = MapboxClient::forward(self, &request).await?;
        Ok(features.first().map(|feature| GeocodeCandidate {
            point: GeoPoint::new(feature.lat(), feature.lng()),
            country: feature.country_name().map(str::to_string),
            city: feature.city_name().map(str::to_string),
        }))
    }
}

/// Resolved location. Canonical names are `None` when the geocoder gave no
/// usable context.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedLocation {
    pub point: GeoPoint,
    pub country: Option<String>,
    pub city: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum GeocodeOutcome {
    Resolved(ResolvedLocation),
    NotFound,
}

impl GeocodeOutcome {
    pub fn resolved(&self) -> Option<&ResolvedLocation> {
        match self {
            GeocodeOutcome::Resolved(location) => Some(location),
            GeocodeOutcome::NotFound => None,
        }
    }
}

// ---------------------------------------------------------------------------
// Cache
// ---------------------------------------------------------------------------

#[async_trait]
pub trait GeocodeCache: Send + Sync {
    async fn get(&self, key: &str) -> Option<GeocodeOutcome>;
    async fn put(&self, key: &str, outcome: GeocodeOutcome);
}

/// Process-lifetime cache. Entries are never evicted.
#[derive(Default)]
pub struct MemoryGeocodeCache {
    entries: Mutex<HashMap<String, GeocodeOutcome>>,
}

impl MemoryGeocodeCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl GeocodeCache for MemoryGeocodeCache {
    async fn get(&self, key: &str) -> Option<GeocodeOutcome> {
        self.entries.lock().ok()?.get(key).cloned()
    }

    async fn put(&self, key: &str, outcome: GeocodeOutcome) {
        if let Ok(mut entries) = self.entries.lock() {
            entries.insert(key.to_string(), outcome);
        }
    }
}

// ---------------------------------------------------------------------------
// Corrections
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy)]
struct BoundingBox {
    min_lat: f64,
    max_lat: f64,
    min_lng: f64,
    max_lng: f64,
}

impl BoundingBox {
    fn contains(&self, point: &GeoPoint) -> bool {
        (self.min_lat..=self.max_lat).contains(&point.lat)
            && (self.min_lng..=self.max_lng).contains(&point.lng)
    }
}

/// A place name the geocoder is known to confuse with a homonym elsewhere.
struct Correction {
    name: &'static str,
    country: &'static str,
    expected: BoundingBox,
    fallback: GeoPoint,
}

const CORRECTIONS: &[Correction] = &[
    Correction {
        name: "delhi",
        country: "India",
        expected: BoundingBox {
            min_lat: 6.5,
            max_lat: 35.7,
            min_lng: 68.1,
            max_lng: 97.4,
        },
        fallback: GeoPoint {
            lat: 28.6139,
            lng: 77.2090,
        },
    },
    Correction {
        name: "lombok",
        country: "Indonesia",
        expected: BoundingBox {
            min_lat: -9.2,
            max_lat: -8.0,
            min_lng: 115.7,
            max_lng: 116.8,
        },
        fallback: GeoPoint {
            lat: -8.6500,
            lng: 116.3249,
        },
    },
];

fn correction_for(place: &str, country: Option<&str>) -> Option<&'static Correction> {
    let place = place.trim().to_lowercase();
    let country = country.and_then(resolve_country)?;
    CORRECTIONS.iter().find(|c| {
        c.country == country && (place == c.name || place.starts_with(&format!("{}, ", c.name)))
    })
}

// ---------------------------------------------------------------------------
// Normalizer
// ---------------------------------------------------------------------------

/// Location hint as extracted from content.
#[derive(Debug, Clone, Copy, Default)]
pub struct LocationQuery<'a> {
    pub specific_location: Option<&'a str>,
    pub city: Option<&'a str>,
    pub country: Option<&'a str>,
}

/// Query text: the most specific hint, with the country appended unless it
/// is already mentioned.
pub fn build_query(hint: &str, country: Option<&str>) -> String {
    let hint = hint.trim();
    match country.map(str::trim).filter(|c| !c.is_empty()) {
        Some(country) if hint.is_empty() => country.to_string(),
        Some(country) if !hint.to_lowercase().contains(&country.to_lowercase()) => {
            format!("{hint}, {country}")
        }
        _ => hint.to_string(),
    }
}

pub fn cache_key(query: &str, code: Option<&str>) -> String {
    let collapsed = query
        .to_lowercase()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ");
    format!("{collapsed}|{}", code.unwrap_or("").to_lowercase())
}

#[derive(Clone)]
pub struct GeocodeNormalizer {
    geocoder: Arc<dyn Geocoder>,
    cache: Arc<dyn GeocodeCache>,
}

impl GeocodeNormalizer {
    pub fn new(geocoder: Arc<dyn Geocoder>, cache: Arc<dyn GeocodeCache>) -> Self {
        Self { geocoder, cache }
    }

    pub fn with_memory_cache(geocoder: Arc<dyn Geocoder>) -> Self {
        Self::new(geocoder, Arc::new(MemoryGeocodeCache::new()))
    }

    /// Resolve a hint. Errors are only returned for transient geocoder
    /// failures and refused credentials; a hint with nothing usable, or one
    /// the geocoder refuses as a query, is `NotFound`.
    pub async fn resolve(
        &self,
        location: LocationQuery<'_>,
    ) -> Result<GeocodeOutcome, GeocodeError> {
        let hint = location
            .specific_location
            .or(location.city)
            .map(str::trim)
            .filter(|h| !h.is_empty())
            .unwrap_or("");
        let query = build_query(hint, location.country);
        if query.is_empty() {
            return Ok(GeocodeOutcome::NotFound);
        }

        let code = location.country.and_then(country_code);
        let key = cache_key(&query, code);
        if let Some(cached) = self.cache.get(&key).await {
            debug!(query = %query, "Geocode cache hit");
            return Ok(cached);
        }

        let candidate = match self.geocoder.forward(&query, code).await {
            Ok(candidate) => candidate,
            Err(GeocodeError::Rejected { status, message }) => {
                warn!(query = %query, status, message = %message, "Geocoder refused query");
                None
            }
            Err(e) => return Err(e),
        };
        let outcome = self.correct(location, code, candidate);
        self.cache.put(&key, outcome.clone()).await;
        Ok(outcome)
    }

    fn correct(
        &self,
        location: LocationQuery<'_>,
        code: Option<&str>,
        candidate: Option<GeocodeCandidate>,
    ) -> GeocodeOutcome {
        let correction = location
            .city
            .or(location.specific_location)
            .and_then(|place| correction_for(place, location.country));

        let canonical_country = |candidate: &GeocodeCandidate| {
            candidate
                .country
                .as_deref()
                .and_then(resolve_country)
                .or_else(|| code.and_then(canonical_for_code))
                .map(str::to_string)
        };

        match (candidate, correction) {
            (Some(candidate), Some(correction))
                if !correction.expected.contains(&candidate.point) =>
            {
                warn!(
                    place = correction.name,
                    lat = candidate.point.lat,
                    lng = candidate.point.lng,
                    "Geocoder returned a homonym, using known coordinates"
                );
                corrected(correction)
            }
            (Some(candidate), _) if candidate.point.is_valid() => {
                GeocodeOutcome::Resolved(ResolvedLocation {
                    point: candidate.point,
                    country: canonical_country(&candidate),
                    city: candidate.city.clone(),
                })
            }
            (_, Some(correction)) => {
                info!(place = correction.name, "Geocoder found nothing, using known coordinates");
                corrected(correction)
            }
            _ => GeocodeOutcome::NotFound,
        }
    }
}

fn corrected(correction: &Correction) -> GeocodeOutcome {
    let mut city = correction.name.to_string();
    if let Some(first) = city.get_mut(0..1) {
        first.make_ascii_uppercase();
    }
    GeocodeOutcome::Resolved(ResolvedLocation {
        point: correction.fallback,
        country: Some(correction.country.to_string()),
        city: Some(city),
    })
}
