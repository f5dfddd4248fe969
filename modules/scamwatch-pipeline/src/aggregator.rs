//! Keys incidents to a stable (country, city) spelling before they reach a
//! location rollup.

use scamwatch_common::countries::resolve_country;
use scamwatch_common::{GeoPoint, IncidentContribution, ScamCategory};

use crate::geocode::ResolvedLocation;

/// Canonical country: the geocoder's name when it has one, else the alias
/// table, else the trimmed hint.
pub fn canonical_country(
    hint: Option<&str>,
    resolved: Option<&ResolvedLocation>,
) -> Option<String> {
    let canonical = |name: &str| {
        resolve_country(name)
            .map(str::to_string)
            .unwrap_or_else(|| name.to_string())
    };
    resolved
        .and_then(|r| r.country.as_deref())
        .map(canonical)
        .or_else(|| {
            let hint = hint.map(str::trim).filter(|h| !h.is_empty())?;
            Some(canonical(hint))
        })
}

/// Canonical city: the geocoder's name when it has one, else the hint.
pub fn canonical_city(hint: Option<&str>, resolved: Option<&ResolvedLocation>) -> Option<String> {
    resolved
        .and_then(|r| r.city.clone())
        .or_else(|| hint.map(str::trim).filter(|h| !h.is_empty()).map(str::to_string))
}

/// Contribution for one incident, or `None` when there is no country to
/// key it by.
pub fn contribution(
    category: ScamCategory,
    country_hint: Option<&str>,
    city_hint: Option<&str>,
    loss_amount: Option<f64>,
    resolved: Option<&ResolvedLocation>,
) -> Option<IncidentContribution> {
    let country = canonical_country(country_hint, resolved)?;
    Some(IncidentContribution {
        country,
        city: canonical_city(city_hint, resolved),
        category,
        loss_amount: loss_amount.filter(|a| a.is_finite() && *a > 0.0),
        coordinates: resolved.map(|r| r.point).filter(GeoPoint::is_valid),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn resolved(country: Option<&str>, city: Option<&str>) -> ResolvedLocation {
        ResolvedLocation {
            point: GeoPoint::new(13.7563, 100.5018),
            country: country.map(str::to_string),
            city: city.map(str::to_string),
        }
    }

    #[test]
    fn geocoder_names_win() {
        let location = resolved(Some("Thailand"), Some("Bangkok"));
        let c = contribution(
            ScamCategory::Taxi,
            Some("Kingdom of Thailand"),
            Some("BKK"),
            Some(40.0),
            Some(&location),
        )
        .unwrap();
        assert_eq!(c.country, "Thailand");
        assert_eq!(c.city.as_deref(), Some("Bangkok"));
        assert!(c.coordinates.is_some());
    }

    #[test]
    fn colloquial_hint_is_canonicalised_without_geocoder() {
        let c = contribution(ScamCategory::Tour, Some("siam"), Some(" Chiang Mai "), None, None)
            .unwrap();
        assert_eq!(c.country, "Thailand");
        assert_eq!(c.city.as_deref(), Some("Chiang Mai"));
        assert!(c.coordinates.is_none());
    }

    #[test]
    fn no_country_means_no_contribution() {
        assert!(contribution(ScamCategory::Other, None, Some("Paris"), None, None).is_none());
        assert!(contribution(ScamCategory::Other, Some("  "), None, None, None).is_none());
    }
}
