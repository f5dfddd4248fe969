//! Secondary incident discovery in reply threads.

use std::sync::LazyLock;

use regex::Regex;

use scamwatch_common::{CommentAnalysis, IncidentContribution};

use crate::aggregator;
use crate::classifier::Classification;

pub const MIN_COMMENT_LENGTH: usize = 80;

/// Comment incidents below this confidence are recorded but not aggregated.
pub const MIN_COMMENT_CONFIDENCE: f32 = 0.6;

static RE_INCIDENT_TERMS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)\b(scam\w*|rip(ped)?[- ]off|overcharg\w*|con(ned)?|fraud\w*|cheat\w*|stole|stolen|theft|thie[fv]\w*|pickpocket\w*|robbed|extort\w*|fake|trick\w*|hustle\w*|tout\w*|paid|pay|charged|money|cash|dollars?|euros?|baht|rupees?|usd|eur)\b",
    )
    .unwrap()
});

static RE_CURRENCY_AMOUNT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[$€£฿₹]\s?\d|\d\s?[$€£฿₹]").unwrap());

/// Cheap pre-filter: long enough and mentions an incident or money.
pub fn worth_classifying(body: &str) -> bool {
    let body = body.trim();
    body.chars().count() >= MIN_COMMENT_LENGTH
        && (RE_INCIDENT_TERMS.is_match(body) || RE_CURRENCY_AMOUNT.is_match(body))
}

/// What to store for a classified comment and whether it feeds a rollup.
#[derive(Debug, Clone, PartialEq)]
pub struct CommentVerdict {
    pub analysis: CommentAnalysis,
    pub contribution: Option<IncidentContribution>,
}

impl CommentVerdict {
    pub fn skipped() -> Self {
        Self {
            analysis: CommentAnalysis::default(),
            contribution: None,
        }
    }
}

pub fn verdict(classification: &Classification) -> CommentVerdict {
    let Some(incident) = classification.incident() else {
        return CommentVerdict::skipped();
    };

    let country = aggregator::canonical_country(incident.location.country.as_deref(), None);
    let analysis = CommentAnalysis {
        is_scam_report: true,
        category: Some(incident.category),
        country: country.clone(),
        city: aggregator::canonical_city(incident.location.city.as_deref(), None),
    };

    let contribution = if incident.confidence >= MIN_COMMENT_CONFIDENCE {
        aggregator::contribution(
            incident.category,
            country.as_deref(),
            incident.location.city.as_deref(),
            incident.loss.as_ref().map(|l| l.amount),
            None,
        )
    } else {
        None
    };

    CommentVerdict {
        analysis,
        contribution,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classifier::{IncidentClassification, LocationHint};
    use scamwatch_common::ScamCategory;

    fn incident(confidence: f32, country: Option<&str>) -> Classification {
        Classification::Incident(IncidentClassification {
            confidence,
            category: ScamCategory::StreetHustle,
            location: LocationHint {
                country: country.map(str::to_string),
                city: Some("Paris".into()),
                specific_location: None,
            },
            loss: None,
            warning_signals: vec![],
            prevention_tips: vec![],
            summary: None,
        })
    }

    #[test]
    fn short_or_irrelevant_comments_are_gated() {
        assert!(!worth_classifying("Got scammed too."));
        assert!(!worth_classifying(
            "We loved the food in Hanoi, the night market was amazing and the people were very friendly to us."
        ));
        assert!(worth_classifying(
            "Same thing happened to me near the Eiffel Tower, a guy tied a bracelet on my wrist and demanded 20 euros."
        ));
        assert!(worth_classifying(
            "The driver refused to use the meter and at the hotel he asked for ฿500 for a ten minute ride from the pier."
        ));
    }

    #[test]
    fn confident_located_incident_contributes() {
        let v = verdict(&incident(0.8, Some("france")));
        assert!(v.analysis.is_scam_report);
        assert_eq!(v.analysis.country.as_deref(), Some("France"));
        let contribution = v.contribution.unwrap();
        assert_eq!(contribution.city.as_deref(), Some("Paris"));
    }

    #[test]
    fn weak_or_unlocated_incident_is_recorded_only() {
        let weak = verdict(&incident(0.4, Some("France")));
        assert!(weak.analysis.is_scam_report);
        assert!(weak.contribution.is_none());

        let unlocated = verdict(&incident(0.9, None));
        assert!(unlocated.contribution.is_none());
    }

    #[test]
    fn degraded_classification_is_not_a_report() {
        let v = verdict(&Classification::Degraded { reason: "timeout".into() });
        assert_eq!(v, CommentVerdict::skipped());
    }
}
