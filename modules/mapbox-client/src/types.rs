use serde::Deserialize;

/// Feature types accepted by the `types` filter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaceType {
    Country,
    Region,
    District,
    Place,
    Locality,
    Neighborhood,
    Address,
    Poi,
}

impl PlaceType {
    pub fn as_str(&self) -> &'static str {
        match self {
            PlaceType::Country => "country",
            PlaceType::Region => "region",
            PlaceType::District => "district",
            PlaceType::Place => "place",
            PlaceType::Locality => "locality",
            PlaceType::Neighborhood => "neighborhood",
            PlaceType::Address => "address",
            PlaceType::Poi => "poi",
        }
    }
}

/// Parameters for a forward geocode.
#[derive(Debug, Clone)]
pub struct ForwardQuery {
    pub text: String,
    /// ISO 3166-1 alpha-2, lower case.
    pub country: Option<String>,
    pub types: Vec<PlaceType>,
    pub limit: u8,
}

impl ForwardQuery {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            country: None,
            types: Vec::new(),
            limit: 1,
        }
    }

    pub fn country(mut self, code: impl Into<String>) -> Self {
        self.country = Some(code.into().to_lowercase());
        self
    }

    pub fn types(mut self, types: &[PlaceType]) -> Self {
        self.types = types.to_vec();
        self
    }

    pub fn limit(mut self, limit: u8) -> Self {
        self.limit = limit.clamp(1, 10);
        self
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct FeatureCollection {
    #[serde(default)]
    pub features: Vec<Feature>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Feature {
    pub geometry: Geometry,
    pub properties: FeatureProperties,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Geometry {
    /// `[lng, lat]`
    pub coordinates: [f64; 2],
}

#[derive(Debug, Clone, Deserialize)]
pub struct FeatureProperties {
    pub feature_type: Option<String>,
    pub name: Option<String>,
    pub full_address: Option<String>,
    pub context: Option<Context>,
}

/// The hierarchy a feature sits in. Each level is present only when it
/// applies (a country feature has no `place`).
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Context {
    pub country: Option<CountryContext>,
    pub region: Option<ContextEntry>,
    pub district: Option<ContextEntry>,
    pub place: Option<ContextEntry>,
    pub locality: Option<ContextEntry>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CountryContext {
    pub name: String,
    pub country_code: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ContextEntry {
    pub name: String,
}

impl Feature {
    pub fn lat(&self) -> f64 {
        self.geometry.coordinates[1]
    }

    pub fn lng(&self) -> f64 {
        self.geometry.coordinates[0]
    }

    /// Country name from the context, or the feature itself when it is a
    /// country.
    pub fn country_name(&self) -> Option<&str> {
        let ctx = self.properties.context.as_ref();
        ctx.and_then(|c| c.country.as_ref())
            .map(|c| c.name.as_str())
            .or_else(|| match self.properties.feature_type.as_deref() {
                Some("country") => self.properties.name.as_deref(),
                _ => None,
            })
    }

    /// City-level name: the place, else the locality, else the feature's own
    /// name when it is itself a place or locality.
    pub fn city_name(&self) -> Option<&str> {
        let ctx = self.properties.context.as_ref();
        ctx.and_then(|c| c.place.as_ref().or(c.locality.as_ref()))
            .map(|e| e.name.as_str())
            .or_else(|| match self.properties.feature_type.as_deref() {
                Some("place") | Some("locality") => self.properties.name.as_deref(),
                _ => None,
            })
    }
}
