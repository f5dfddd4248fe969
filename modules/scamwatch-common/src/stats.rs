//! Per-location rollups and the arithmetic that maintains them.
//!
//! Every mutation goes through [`LocationStat::record`], whether the store
//! is Postgres or in-memory, so both agree on eviction order and averaging.

use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ScamwatchError;
use crate::types::{GeoPoint, ScamCategory};

/// Maximum entries kept in a location's top-category list.
pub const TOP_CATEGORY_LIMIT: usize = 5;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryCount {
    pub category: ScamCategory,
    pub count: i64,
}

/// How a new loss amount is folded into a location's average.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LossAveraging {
    /// `avg + (new - avg) / 2`: recent reports dominate. The first observed
    /// loss seeds the average (`loss_samples == 0`), so earlier incidents
    /// without an amount never pull it toward zero.
    #[default]
    Decayed,
    /// True running mean over every report that carried an amount.
    Mean,
}

impl FromStr for LossAveraging {
    type Err = ScamwatchError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "decayed" => Ok(LossAveraging::Decayed),
            "mean" => Ok(LossAveraging::Mean),
            other => Err(ScamwatchError::unknown("loss averaging policy", other)),
        }
    }
}

/// One incident's contribution to a location rollup.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IncidentContribution {
    pub country: String,
    pub city: Option<String>,
    pub category: ScamCategory,
    pub loss_amount: Option<f64>,
    pub coordinates: Option<GeoPoint>,
}

/// Rollup for one (country, city) pair. `city == None` is the country-level
/// aggregate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocationStat {
    pub country: String,
    pub city: Option<String>,
    pub total_scams: i64,
    pub top_categories: Vec<CategoryCount>,
    pub average_loss: f64,
    pub loss_samples: i64,
    pub coordinates: Option<GeoPoint>,
    pub last_updated: DateTime<Utc>,
}

impl LocationStat {
    pub fn new(country: &str, city: Option<&str>) -> Self {
        Self {
            country: country.to_string(),
            city: city.map(str::to_string),
            total_scams: 0,
            top_categories: Vec::new(),
            average_loss: 0.0,
            loss_samples: 0,
            coordinates: None,
            last_updated: Utc::now(),
        }
    }

    pub fn key(&self) -> (&str, Option<&str>) {
        (&self.country, self.city.as_deref())
    }

    /// Fold one incident into the rollup.
    pub fn record(
        &mut self,
        incident: &IncidentContribution,
        averaging: LossAveraging,
        now: DateTime<Utc>,
    ) {
        self.total_scams += 1;
        self.bump_category(incident.category);

        if let Some(amount) = incident.loss_amount.filter(|a| a.is_finite() && *a > 0.0) {
            self.average_loss = match (averaging, self.loss_samples) {
                (_, 0) => amount,
                (LossAveraging::Decayed, _) => {
                    self.average_loss + (amount - self.average_loss) / 2.0
                }
                (LossAveraging::Mean, n) => {
                    self.average_loss + (amount - self.average_loss) / (n + 1) as f64
                }
            };
            self.loss_samples += 1;
        }

        // First good coordinate wins.
        if self.coordinates.is_none() {
            self.coordinates = incident.coordinates.filter(GeoPoint::is_valid);
        }
        self.last_updated = now;
    }

    fn bump_category(&mut self, category: ScamCategory) {
        match self.top_categories.iter_mut().find(|c| c.category == category) {
            Some(entry) => entry.count += 1,
            None => self.top_categories.push(CategoryCount { category, count: 1 }),
        }
        // Vec::sort_by is stable: ties keep insertion order.
        self.top_categories.sort_by(|a, b| b.count.cmp(&a.count));
        self.top_categories.truncate(TOP_CATEGORY_LIMIT);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn incident(category: ScamCategory, loss: Option<f64>) -> IncidentContribution {
        IncidentContribution {
            country: "Thailand".into(),
            city: Some("Bangkok".into()),
            category,
            loss_amount: loss,
            coordinates: None,
        }
    }

    #[test]
    fn top_categories_stay_bounded_and_sorted() {
        let mut stat = LocationStat::new("Thailand", Some("Bangkok"));
        let now = Utc::now();
        let sequence = [
            ScamCategory::Taxi,
            ScamCategory::Taxi,
            ScamCategory::Taxi,
            ScamCategory::Tour,
            ScamCategory::Tour,
            ScamCategory::Shopping,
            ScamCategory::Restaurant,
            ScamCategory::StreetHustle,
            ScamCategory::Transport,
            ScamCategory::Online,
        ];
        for category in sequence {
            stat.record(&incident(category, None), LossAveraging::Decayed, now);
        }

        assert_eq!(stat.total_scams, 10);
        assert!(stat.top_categories.len() <= TOP_CATEGORY_LIMIT);
        assert!(stat
            .top_categories
            .windows(2)
            .all(|w| w[0].count >= w[1].count));
        let sum: i64 = stat.top_categories.iter().map(|c| c.count).sum();
        assert!(sum <= stat.total_scams);
        assert_eq!(stat.top_categories[0].category, ScamCategory::Taxi);
        assert_eq!(stat.top_categories[0].count, 3);
    }

    #[test]
    fn decayed_average_weights_recent_losses() {
        let mut stat = LocationStat::new("Thailand", None);
        let now = Utc::now();
        stat.record(&incident(ScamCategory::Taxi, Some(100.0)), LossAveraging::Decayed, now);
        assert_eq!(stat.average_loss, 100.0);
        stat.record(&incident(ScamCategory::Taxi, Some(300.0)), LossAveraging::Decayed, now);
        assert_eq!(stat.average_loss, 200.0);
        stat.record(&incident(ScamCategory::Taxi, Some(400.0)), LossAveraging::Decayed, now);
        assert_eq!(stat.average_loss, 300.0);
    }

    #[test]
    fn first_loss_seeds_average_after_lossless_incidents() {
        let mut stat = LocationStat::new("Peru", None);
        let now = Utc::now();
        stat.record(&incident(ScamCategory::Tour, None), LossAveraging::Decayed, now);
        stat.record(&incident(ScamCategory::Tour, None), LossAveraging::Decayed, now);
        stat.record(&incident(ScamCategory::Tour, Some(80.0)), LossAveraging::Decayed, now);
        assert_eq!(stat.average_loss, 80.0);
        assert_eq!(stat.loss_samples, 1);
        assert_eq!(stat.total_scams, 3);
    }

    #[test]
    fn mean_average_is_exact() {
        let mut stat = LocationStat::new("Thailand", None);
        let now = Utc::now();
        for amount in [100.0, 300.0, 400.0] {
            stat.record(&incident(ScamCategory::Taxi, Some(amount)), LossAveraging::Mean, now);
        }
        assert!((stat.average_loss - 800.0 / 3.0).abs() < 1e-9);
        assert_eq!(stat.loss_samples, 3);
    }

    #[test]
    fn missing_or_bogus_loss_leaves_average_unchanged() {
        let mut stat = LocationStat::new("Thailand", None);
        let now = Utc::now();
        stat.record(&incident(ScamCategory::Taxi, Some(50.0)), LossAveraging::Decayed, now);
        stat.record(&incident(ScamCategory::Taxi, None), LossAveraging::Decayed, now);
        stat.record(&incident(ScamCategory::Taxi, Some(-5.0)), LossAveraging::Decayed, now);
        stat.record(&incident(ScamCategory::Taxi, Some(f64::NAN)), LossAveraging::Decayed, now);
        assert_eq!(stat.average_loss, 50.0);
        assert_eq!(stat.total_scams, 4);
    }

    #[test]
    fn first_coordinates_win() {
        let mut stat = LocationStat::new("Thailand", Some("Bangkok"));
        let now = Utc::now();
        let mut first = incident(ScamCategory::Taxi, None);
        first.coordinates = Some(GeoPoint::new(13.75, 100.5));
        let mut second = incident(ScamCategory::Taxi, None);
        second.coordinates = Some(GeoPoint::new(14.0, 101.0));

        stat.record(&incident(ScamCategory::Taxi, None), LossAveraging::Decayed, now);
        assert_eq!(stat.coordinates, None);
        stat.record(&first, LossAveraging::Decayed, now);
        stat.record(&second, LossAveraging::Decayed, now);
        assert_eq!(stat.coordinates, Some(GeoPoint::new(13.75, 100.5)));
    }

    #[test]
    fn policy_parses_case_insensitively() {
        assert_eq!("Mean".parse::<LossAveraging>().unwrap(), LossAveraging::Mean);
        assert_eq!("decayed".parse::<LossAveraging>().unwrap(), LossAveraging::Decayed);
        assert!("median".parse::<LossAveraging>().is_err());
    }
}
