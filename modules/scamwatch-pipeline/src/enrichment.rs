//! Classify -> geocode -> aggregate, one report at a time.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, error, info, warn};
use uuid::Uuid;

use scamwatch_common::{IncidentContribution, ReportEnrichment, ScamReport};
use scamwatch_store::ReportStore;

use crate::aggregator;
use crate::budget::TimeBudget;
use crate::classifier::{Classification, Classifier, IncidentClassification};
use crate::comments::{self, CommentVerdict};
use crate::geocode::{GeocodeError, GeocodeNormalizer, GeocodeOutcome, LocationQuery};

/// How one report attempt ended.
#[derive(Debug, Clone, PartialEq)]
pub enum ReportOutcome {
    Incident { aggregated: bool },
    NotIncident,
    /// Classifier unusable; stored as not-an-incident with zero confidence.
    Degraded,
    /// Transient failure; the report stays unprocessed.
    Retry { attempts: Option<i32> },
    /// Another run completed it first.
    AlreadyProcessed,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct EnrichmentSummary {
    pub selected: usize,
    pub incidents: usize,
    pub aggregated: usize,
    pub not_incidents: usize,
    pub degraded: usize,
    pub retried: usize,
    pub already_processed: usize,
    pub stopped_early: bool,
}

impl EnrichmentSummary {
    fn record(&mut self, outcome: &ReportOutcome) {
        match outcome {
            ReportOutcome::Incident { aggregated } => {
                self.incidents += 1;
                if *aggregated {
                    self.aggregated += 1;
                }
            }
            ReportOutcome::NotIncident => self.not_incidents += 1,
            ReportOutcome::Degraded => self.degraded += 1,
            ReportOutcome::Retry { .. } => self.retried += 1,
            ReportOutcome::AlreadyProcessed => self.already_processed += 1,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct CommentSummary {
    pub examined: usize,
    pub gated_out: usize,
    pub classified: usize,
    pub scam_reports: usize,
    pub aggregated: usize,
    pub failed: usize,
    pub stopped_early: bool,
}

pub struct EnrichmentEngine {
    store: Arc<dyn ReportStore>,
    classifier: Arc<dyn Classifier>,
    geocoder: GeocodeNormalizer,
    max_attempts: i32,
    /// Time one report may need; no new report starts with less left.
    step_reserve: Duration,
}

impl EnrichmentEngine {
    pub fn new(
        store: Arc<dyn ReportStore>,
        classifier: Arc<dyn Classifier>,
        geocoder: GeocodeNormalizer,
        max_attempts: i32,
    ) -> Self {
        Self {
            store,
            classifier,
            geocoder,
            max_attempts,
            step_reserve: Duration::from_secs(30),
        }
    }

    pub fn with_step_reserve(mut self, reserve: Duration) -> Self {
        self.step_reserve = reserve;
        self
    }

    /// Enrich up to `limit` unprocessed reports, oldest first, stopping
    /// cleanly when the budget runs low. A configuration failure aborts the
    /// run before it touches any further report.
    pub async fn process_pending(
        &self,
        limit: i64,
        budget: &TimeBudget,
    ) -> anyhow::Result<EnrichmentSummary> {
        let reports = self.store.unprocessed_reports(limit, self.max_attempts).await?;
        let mut summary = EnrichmentSummary {
            selected: reports.len(),
            ..Default::default()
        };
        info!(selected = reports.len(), "Enriching unprocessed reports");

        for report in &reports {
            if budget.should_stop(self.step_reserve) {
                let done =
                    summary.incidents + summary.not_incidents + summary.degraded + summary.retried;
                warn!(
                    done,
                    selected = summary.selected,
                    "Time budget nearly spent, stopping enrichment"
                );
                summary.stopped_early = true;
                break;
            }
            let outcome = self.process_report(report).await?;
            summary.record(&outcome);
        }

        info!(
            incidents = summary.incidents,
            aggregated = summary.aggregated,
            not_incidents = summary.not_incidents,
            degraded = summary.degraded,
            retried = summary.retried,
            "Enrichment finished"
        );
        Ok(summary)
    }

    /// One enrichment attempt. Transient failures are recorded on the report
    /// itself; only refused geocoder credentials are returned as an error,
    /// and the report is left untouched.
    pub async fn process_report(&self, report: &ScamReport) -> anyhow::Result<ReportOutcome> {
        let classification = self.classifier.classify(&report.post.content()).await;

        let (enrichment, contribution, outcome) = match &classification {
            Classification::Incident(incident) => match self.locate(incident).await {
                Ok((enrichment, contribution)) => {
                    let aggregated = contribution.is_some();
                    (enrichment, contribution, ReportOutcome::Incident { aggregated })
                }
                Err(e) if e.is_configuration() => {
                    error!(report_id = %report.id, error = %e, "Geocoder configuration failure");
                    return Err(anyhow::Error::new(e).context("geocoder configuration"));
                }
                Err(e) => return Ok(self.retry(report.id, &format!("geocode: {e}")).await),
            },
            Classification::NotIncident => {
                (ReportEnrichment::not_incident(), None, ReportOutcome::NotIncident)
            }
            Classification::Degraded { reason } => {
                warn!(report_id = %report.id, reason = %reason, "Classification degraded");
                (ReportEnrichment::not_incident(), None, ReportOutcome::Degraded)
            }
        };

        let outcome = match self
            .store
            .complete_report(report.id, &enrichment, contribution.as_ref())
            .await
        {
            Ok(true) => {
                debug!(report_id = %report.id, outcome = ?outcome, "Report processed");
                outcome
            }
            Ok(false) => {
                debug!(report_id = %report.id, "Report already processed elsewhere");
                ReportOutcome::AlreadyProcessed
            }
            Err(e) => self.retry(report.id, &format!("store: {e}")).await,
        };
        Ok(outcome)
    }

    /// Geocode when there is a country hint and build the rollup
    /// contribution.
    async fn locate(
        &self,
        incident: &IncidentClassification,
    ) -> Result<(ReportEnrichment, Option<IncidentContribution>), GeocodeError> {
        let mut enrichment = incident.to_enrichment();
        let hint = &incident.location;
        if hint.country.is_none() {
            return Ok((enrichment, None));
        }

        let outcome = self
            .geocoder
            .resolve(LocationQuery {
                specific_location: hint.specific_location.as_deref(),
                city: hint.city.as_deref(),
                country: hint.country.as_deref(),
            })
            .await?;
        let resolved = match &outcome {
            GeocodeOutcome::Resolved(location) => Some(location),
            GeocodeOutcome::NotFound => {
                debug!(country = ?hint.country, city = ?hint.city, "Location not found");
                None
            }
        };

        enrichment.location.country =
            aggregator::canonical_country(hint.country.as_deref(), resolved);
        enrichment.location.city = aggregator::canonical_city(hint.city.as_deref(), resolved);
        enrichment.location.coordinates = resolved.map(|r| r.point);

        let contribution = aggregator::contribution(
            incident.category,
            hint.country.as_deref(),
            hint.city.as_deref(),
            incident.loss.as_ref().map(|l| l.amount),
            resolved,
        );
        Ok((enrichment, contribution))
    }

    async fn retry(&self, id: Uuid, error: &str) -> ReportOutcome {
        match self.store.record_processing_error(id, error).await {
            Ok(attempts) => {
                warn!(report_id = %id, attempts = ?attempts, error, "Enrichment attempt failed");
                if attempts.is_some_and(|a| a >= self.max_attempts) {
                    warn!(report_id = %id, "Report reached the attempt cutoff and is now stalled");
                }
                ReportOutcome::Retry { attempts }
            }
            Err(e) => {
                warn!(
                    report_id = %id,
                    error = %e,
                    original = error,
                    "Failed to record processing error"
                );
                ReportOutcome::Retry { attempts: None }
            }
        }
    }

    /// Lazily analyze stored replies for secondary incidents.
    pub async fn analyze_comments(
        &self,
        limit: i64,
        budget: &TimeBudget,
    ) -> anyhow::Result<CommentSummary> {
        let pending = self.store.unanalyzed_comments(limit).await?;
        let mut summary = CommentSummary::default();
        info!(pending = pending.len(), "Analyzing comments");

        for comment in &pending {
            if budget.should_stop(self.step_reserve) {
                warn!(
                    examined = summary.examined,
                    "Time budget nearly spent, stopping comment analysis"
                );
                summary.stopped_early = true;
                break;
            }
            summary.examined += 1;

            let verdict = if comments::worth_classifying(&comment.body) {
                summary.classified += 1;
                comments::verdict(&self.classifier.classify(&comment.body).await)
            } else {
                summary.gated_out += 1;
                CommentVerdict::skipped()
            };

            match self
                .store
                .complete_comment(comment.id, &verdict.analysis, verdict.contribution.as_ref())
                .await
            {
                Ok(true) => {
                    if verdict.analysis.is_scam_report {
                        summary.scam_reports += 1;
                    }
                    if verdict.contribution.is_some() {
                        summary.aggregated += 1;
                    }
                }
                Ok(false) => debug!(comment_id = %comment.id, "Comment already analyzed"),
                Err(e) => {
                    warn!(comment_id = %comment.id, error = %e, "Failed to store comment analysis");
                    summary.failed += 1;
                }
            }
        }

        info!(
            examined = summary.examined,
            gated_out = summary.gated_out,
            scam_reports = summary.scam_reports,
            aggregated = summary.aggregated,
            "Comment analysis finished"
        );
        Ok(summary)
    }
}
