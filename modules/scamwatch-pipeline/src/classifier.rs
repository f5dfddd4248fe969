use async_trait::async_trait;
use schemars::JsonSchema;
use serde::Deserialize;
use tracing::{debug, warn};

use ai_client::{
    extract_json_object, strip_code_blocks, truncate_to_char_boundary, OpenAi, StructuredOutput,
};
use scamwatch_common::{MonetaryLoss, ReportEnrichment, ReportLocation, ScamCategory};

/// Content sent to the model is capped at this many bytes.
pub const MAX_CONTENT_BYTES: usize = 8000;

/// Below this the model's "yes" is treated as a "no".
pub const MIN_INCIDENT_CONFIDENCE: f32 = 0.1;

const SYSTEM_PROMPT: &str = r#"You analyse posts written by travellers and decide whether they describe a scam, fraud or theft targeting a tourist.

Return a single JSON object with exactly these fields:
- is_incident: true only if the text describes a concrete scam, fraud or theft that happened to the author or someone they know. General advice, questions and warnings without an incident are false.
- confidence: number between 0 and 1.
- category: one of taxi, accommodation, tour, shopping, restaurant, street_hustle, currency_exchange, transport, fake_police, card_skimming, online, other.
- country: country where it happened, in English, or null.
- city: city or town where it happened, or null.
- specific_location: landmark, street or venue, or null.
- loss_amount: money lost as a number, or null when not stated.
- currency: ISO 4217 code of the loss (e.g. USD, THB, EUR), or null.
- warning_signals: short phrases a traveller could use to recognise this scam.
- prevention_tips: short, actionable tips to avoid it.
- summary: one or two sentences describing what happened, or null.

Never invent a location or amount that is not supported by the text."#;

// ---------------------------------------------------------------------------
// Outcome types
// ---------------------------------------------------------------------------

/// Location as the model extracted it, before geocoding.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LocationHint {
    pub country: Option<String>,
    pub city: Option<String>,
    pub specific_location: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct IncidentClassification {
    pub confidence: f32,
    pub category: ScamCategory,
    pub location: LocationHint,
    pub loss: Option<MonetaryLoss>,
    pub warning_signals: Vec<String>,
    pub prevention_tips: Vec<String>,
    pub summary: Option<String>,
}

impl IncidentClassification {
    /// Enrichment fields for storage; coordinates are added by the caller
    /// once geocoding has run.
    pub fn to_enrichment(&self) -> ReportEnrichment {
        ReportEnrichment {
            is_incident: true,
            confidence: self.confidence,
            category: Some(self.category),
            loss: self.loss.clone(),
            warning_signals: self.warning_signals.clone(),
            prevention_tips: self.prevention_tips.clone(),
            summary: self.summary.clone(),
            location: ReportLocation {
                country: self.location.country.clone(),
                city: self.location.city.clone(),
                specific_location: self.location.specific_location.clone(),
                coordinates: None,
            },
        }
    }
}

/// Closed set of classification outcomes.
#[derive(Debug, Clone, PartialEq)]
pub enum Classification {
    Incident(IncidentClassification),
    NotIncident,
    /// The model could not be consulted or its answer was unusable. Stored
    /// the same way as `NotIncident`, with zero confidence.
    Degraded { reason: String },
}

impl Classification {
    pub fn is_incident(&self) -> bool {
        matches!(self, Classification::Incident(_))
    }

    pub fn incident(&self) -> Option<&IncidentClassification> {
        match self {
            Classification::Incident(incident) => Some(incident),
            _ => None,
        }
    }
}

#[async_trait]
pub trait Classifier: Send + Sync {
    /// Never fails: unusable answers degrade to [`Classification::Degraded`].
    async fn classify(&self, content: &str) -> Classification;
}

// ---------------------------------------------------------------------------
// Model output contract and repair
// ---------------------------------------------------------------------------

#[derive(Debug, Default, Deserialize, JsonSchema)]
#[serde(default)]
pub struct ModelVerdict {
    pub is_incident: bool,
    pub confidence: f64,
    pub category: Option<String>,
    pub country: Option<String>,
    pub city: Option<String>,
    pub specific_location: Option<String>,
    pub loss_amount: Option<f64>,
    pub currency: Option<String>,
    pub warning_signals: Vec<String>,
    pub prevention_tips: Vec<String>,
    pub summary: Option<String>,
}

/// Parse raw model output, tolerating code fences and surrounding prose.
pub fn parse_verdict(raw: &str) -> Result<ModelVerdict, String> {
    let stripped = strip_code_blocks(raw);
    match serde_json::from_str::<ModelVerdict>(stripped) {
        Ok(verdict) => Ok(verdict),
        Err(first) => {
            let object = extract_json_object(stripped)
                .ok_or_else(|| format!("no JSON object in model output: {first}"))?;
            serde_json::from_str(object).map_err(|e| format!("invalid model output: {e}"))
        }
    }
}

fn clean(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .filter(|v| {
            !matches!(
                v.to_lowercase().as_str(),
                "null" | "none" | "unknown" | "n/a" | "not specified"
            )
        })
}

fn clean_list(values: Vec<String>) -> Vec<String> {
    values
        .into_iter()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .collect()
}

fn normalize_currency(currency: Option<String>) -> String {
    let Some(raw) = clean(currency) else {
        return "USD".to_string();
    };
    match raw.as_str() {
        "$" => return "USD".to_string(),
        "€" => return "EUR".to_string(),
        "£" => return "GBP".to_string(),
        "฿" => return "THB".to_string(),
        "₹" => return "INR".to_string(),
        _ => {}
    }
    let code = raw.to_uppercase();
    if code.len() == 3 && code.chars().all(|c| c.is_ascii_alphabetic()) {
        code
    } else {
        "USD".to_string()
    }
}

/// Turn a model verdict into a classification, repairing what can be
/// repaired.
pub fn repair(verdict: ModelVerdict) -> Classification {
    let confidence = if verdict.confidence.is_finite() {
        verdict.confidence.clamp(0.0, 1.0) as f32
    } else {
        0.0
    };
    if !verdict.is_incident || confidence < MIN_INCIDENT_CONFIDENCE {
        return Classification::NotIncident;
    }

    let category = verdict
        .category
        .as_deref()
        .map(ScamCategory::from_model_output)
        .unwrap_or(ScamCategory::Other);

    let loss = verdict
        .loss_amount
        .filter(|amount| amount.is_finite() && *amount > 0.0)
        .map(|amount| MonetaryLoss {
            amount,
            currency: normalize_currency(verdict.currency),
        });

    Classification::Incident(IncidentClassification {
        confidence,
        category,
        location: LocationHint {
            country: clean(verdict.country),
            city: clean(verdict.city),
            specific_location: clean(verdict.specific_location),
        },
        loss,
        warning_signals: clean_list(verdict.warning_signals),
        prevention_tips: clean_list(verdict.prevention_tips),
        summary: clean(verdict.summary),
    })
}

// ---------------------------------------------------------------------------
// LLM-backed classifier
// ---------------------------------------------------------------------------

/// One model call per piece of content, under the client's timeout.
pub struct LlmClassifier {
    ai: OpenAi,
}

impl LlmClassifier {
    pub fn new(ai: OpenAi) -> Self {
        Self { ai }
    }
}

#[async_trait]
impl Classifier for LlmClassifier {
    async fn classify(&self, content: &str) -> Classification {
        let content = truncate_to_char_boundary(content.trim(), MAX_CONTENT_BYTES);
        if content.is_empty() {
            return Classification::NotIncident;
        }

        let raw = match self
            .ai
            .structured_output(
                SYSTEM_PROMPT,
                content,
                &ModelVerdict::type_name(),
                ModelVerdict::openai_schema(),
            )
            .await
        {
            Ok(raw) => raw,
            Err(e) => {
                warn!(error = %e, "Classification call failed, using safe default");
                return Classification::Degraded {
                    reason: e.to_string(),
                };
            }
        };

        match parse_verdict(&raw) {
            Ok(verdict) => {
                let classification = repair(verdict);
                debug!(incident = classification.is_incident(), "Classified content");
                classification
            }
            Err(reason) => {
                warn!(reason = %reason, "Unusable model output, using safe default");
                Classification::Degraded { reason }
            }
        }
    }
}
