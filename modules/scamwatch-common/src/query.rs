use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ScamwatchError;
use crate::types::ScamCategory;

pub const DEFAULT_PAGE_SIZE: i64 = 50;
pub const MAX_PAGE_SIZE: i64 = 200;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReportSort {
    #[default]
    Recent,
    Score,
    Loss,
}

impl FromStr for ReportSort {
    type Err = ScamwatchError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "recent" => Ok(ReportSort::Recent),
            "score" => Ok(ReportSort::Score),
            "loss" => Ok(ReportSort::Loss),
            _ => Err(ScamwatchError::unknown("sort order", s)),
        }
    }
}

/// Filtered listing over processed reports.
#[derive(Debug, Clone, PartialEq)]
pub struct ReportQuery {
    pub country: Option<String>,
    pub city: Option<String>,
    pub category: Option<ScamCategory>,
    pub incidents_only: bool,
    pub sort: ReportSort,
    pub limit: i64,
    pub offset: i64,
}

impl Default for ReportQuery {
    fn default() -> Self {
        Self {
            country: None,
            city: None,
            category: None,
            incidents_only: true,
            sort: ReportSort::Recent,
            limit: DEFAULT_PAGE_SIZE,
            offset: 0,
        }
    }
}

impl ReportQuery {
    /// Clamp paging to sane bounds.
    pub fn normalized(mut self) -> Self {
        self.limit = self.limit.clamp(1, MAX_PAGE_SIZE);
        self.offset = self.offset.max(0);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NamedCount {
    pub name: String,
    pub count: i64,
}

/// Aggregate counts over the report table.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportSummary {
    pub total_reports: i64,
    pub processed: i64,
    pub unprocessed: i64,
    pub stalled: i64,
    pub incidents: i64,
    pub by_category: Vec<NamedCount>,
    pub by_country: Vec<NamedCount>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn paging_is_clamped() {
        let q = ReportQuery {
            limit: 10_000,
            offset: -4,
            ..Default::default()
        }
        .normalized();
        assert_eq!(q.limit, MAX_PAGE_SIZE);
        assert_eq!(q.offset, 0);
        assert!(q.incidents_only);
    }
}
