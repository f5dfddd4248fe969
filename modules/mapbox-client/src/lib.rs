pub mod error;
pub mod types;

pub use error::{MapboxError, Result};
pub use types::{Context, Feature, FeatureCollection, ForwardQuery, PlaceType};

use reqwest::StatusCode;
use tracing::debug;

const BASE_URL: &str = "https://api.mapbox.com/search/geocode/v6";

pub struct MapboxClient {
    client: reqwest::Client,
    access_token: String,
    base_url: String,
}

impl MapboxClient {
    pub fn new(access_token: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            access_token: access_token.into(),
            base_url: BASE_URL.to_string(),
        }
    }

    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into().trim_end_matches('/').to_string();
        self
    }

    fn forward_url(&self, query: &ForwardQuery) -> Result<url::Url> {
        let mut url = url::Url::parse(&format!("{}/forward", self.base_url))
            .map_err(|e| MapboxError::Parse(e.to_string()))?;
        {
            let mut params = url.query_pairs_mut();
            params.append_pair("q", &query.text);
            params.append_pair("limit", &query.limit.to_string());
            if let Some(ref country) = query.country {
                params.append_pair("country", country);
            }
            if !query.types.is_empty() {
                let types: Vec<&str> = query.types.iter().map(PlaceType::as_str).collect();
                params.append_pair("types", &types.join(","));
            }
            params.append_pair("access_token", &self.access_token);
        }
        Ok(url)
    }

    /// Forward geocode. Features come back ranked best-first.
    pub async fn forward(&self, query: &ForwardQuery) -> Result<Vec<Feature>> {
        debug!(q = %query.text, country = ?query.country, "Mapbox forward geocode");

        let url = self.forward_url(query)?;
        let resp = self.client.get(url).send().await?;

        let status = resp.status();
        if status == StatusCode::TOO_MANY_REQUESTS {
            return Err(MapboxError::RateLimited);
        }
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(MapboxError::Api {
                status: status.as_u16(),
                message: body,
            });
        }

        let text = resp.text().await?;
        let collection: FeatureCollection = serde_json::from_str(&text)?;
        Ok(collection.features)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn forward_url_carries_filters() {
        let client = MapboxClient::new("pk.test");
        let query = ForwardQuery::new("Bangkok, Thailand")
            .country("TH")
            .types(&[PlaceType::Place, PlaceType::Locality]);
        let url = client.forward_url(&query).unwrap();
        let pairs: Vec<(String, String)> = url.query_pairs().into_owned().collect();

        assert!(pairs.contains(&("q".into(), "Bangkok, Thailand".into())));
        assert!(pairs.contains(&("country".into(), "th".into())));
        assert!(pairs.contains(&("types".into(), "place,locality".into())));
        assert!(pairs.contains(&("limit".into(), "1".into())));
        assert!(url.as_str().starts_with("https://api.mapbox.com/search/geocode/v6/forward?"));
    }
}
