//! # Scoring Handler
//!
//! Turns a validated record into a `RiskAssessment`, and a raw submission into a
//! `ScoringResponse`. The handler is stateless: it holds a shared, read-only model
//! and a threshold, so one `Scorer` can be cloned into, or shared between, any
//! number of worker threads without locking.
//!
//! Per-request failures are values, never panics. `handle` always returns a
//! response; the error arm carries a structured payload the caller can render.

use crate::model::{ModelArtifact, ModelError};
use crate::record::{InputError, ParsedSubmission, RawSubmission, ScreeningRecord};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

/// The categorical label derived from a probability.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RiskLevel {
    #[serde(rename = "High risk")]
    High,
    #[serde(rename = "Low risk")]
    Low,
}

impl RiskLevel {
    /// `probability >= threshold` is high risk. The lower bound is closed.
    pub fn classify(probability: f64, threshold: f64) -> Self {
        if probability >= threshold {
            RiskLevel::High
        } else {
            RiskLevel::Low
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            RiskLevel::High => "High risk",
            RiskLevel::Low => "Low risk",
        }
    }
}

impl fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Probability of the positive class and its label.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RiskScore {
    pub probability: f64,
    pub risk_level: RiskLevel,
}

/// The stable output contract for one screening record.
///
/// Serializes as
/// `{"risk_assessment": {"probability": .., "risk_level": ".."}, "disclaimer": ".."}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskAssessment {
    pub risk_assessment: RiskScore,
    pub disclaimer: String,
}

impl RiskAssessment {
    pub fn probability(&self) -> f64 {
        self.risk_assessment.probability
    }

    pub fn risk_level(&self) -> RiskLevel {
        self.risk_assessment.risk_level
    }
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ScoringError {
    #[error("Invalid input: {0}")]
    InvalidInput(#[from] InputError),
}

impl ScoringError {
    pub fn kind(&self) -> &'static str {
        match self {
            ScoringError::InvalidInput(_) => "InvalidInput",
        }
    }

    /// One-line summary for the log. Names the field, never the submitted value.
    fn log_summary(&self) -> String {
        match self {
            ScoringError::InvalidInput(e) => match e.field() {
                Some(field) => format!("{} on field '{field}': {}", self.kind(), e.reason()),
                None => format!("{}: {}", self.kind(), e.reason()),
            },
        }
    }

    pub fn payload(&self) -> ErrorPayload {
        let field = match self {
            ScoringError::InvalidInput(e) => e.field().map(str::to_string),
        };
        ErrorPayload {
            kind: self.kind().to_string(),
            field,
            message: self.to_string(),
        }
    }
}

/// Structured error returned to the caller in place of an assessment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorPayload {
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,
    pub message: String,
}

/// What the scoring endpoint returns for one submission.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ScoringResponse {
    Assessment(RiskAssessment),
    Error { error: ErrorPayload },
}

impl ScoringResponse {
    pub fn is_error(&self) -> bool {
        matches!(self, ScoringResponse::Error { .. })
    }

    pub fn assessment(&self) -> Option<&RiskAssessment> {
        match self {
            ScoringResponse::Assessment(a) => Some(a),
            ScoringResponse::Error { .. } => None,
        }
    }
}

impl From<Result<RiskAssessment, ScoringError>> for ScoringResponse {
    fn from(result: Result<RiskAssessment, ScoringError>) -> Self {
        match result {
            Ok(assessment) => ScoringResponse::Assessment(assessment),
            Err(e) => ScoringResponse::Error { error: e.payload() },
        }
    }
}

/// The scoring handler. Cheap to clone; the model is shared.
#[derive(Debug, Clone)]
pub struct Scorer {
    model: Arc<ModelArtifact>,
    threshold: f64,
}

impl Scorer {
    /// Uses the threshold stored in the artifact.
    pub fn new(model: Arc<ModelArtifact>) -> Self {
        let threshold = model.config.threshold;
        Self { model, threshold }
    }

    /// Overrides the artifact's threshold.
    pub fn with_threshold(mut self, threshold: f64) -> Result<Self, ModelError> {
        if !(0.0..=1.0).contains(&threshold) {
            return Err(ModelError::InvalidThreshold(threshold));
        }
        self.threshold = threshold;
        Ok(self)
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    /// Scores one validated record.
    pub fn score(&self, record: &ScreeningRecord) -> Result<RiskAssessment, ScoringError> {
        let probability = self.model.predict_proba(record)?;
        Ok(RiskAssessment {
            risk_assessment: RiskScore {
                probability,
                risk_level: RiskLevel::classify(probability, self.threshold),
            },
            disclaimer: self.model.config.disclaimer.clone(),
        })
    }

    /// The endpoint: validates and scores one raw submission. Never fails.
    pub fn handle(&self, raw: &RawSubmission) -> ScoringResponse {
        let result = ScreeningRecord::try_from(raw)
            .map_err(ScoringError::from)
            .and_then(|record| self.score(&record));
        if let Err(e) = &result {
            log_rejection(e);
        }
        ScoringResponse::from(result)
    }

    /// Like `handle`, for a submission whose reading may already have failed.
    pub fn handle_parsed(&self, parsed: &ParsedSubmission) -> ScoringResponse {
        match parsed {
            Ok(raw) => self.handle(raw),
            Err(e) => {
                let e = ScoringError::from(e.clone());
                log_rejection(&e);
                ScoringResponse::Error { error: e.payload() }
            }
        }
    }

    /// Handles many submissions in parallel. Output order equals input order.
    pub fn handle_batch(&self, submissions: &[RawSubmission]) -> Vec<ScoringResponse> {
        submissions.par_iter().map(|raw| self.handle(raw)).collect()
    }

    /// Handles rows read from a batch file. Unreadable rows keep their slot as an
    /// error response.
    pub fn handle_rows(&self, rows: &[ParsedSubmission]) -> Vec<ScoringResponse> {
        rows.par_iter().map(|row| self.handle_parsed(row)).collect()
    }
}

fn log_rejection(e: &ScoringError) {
    log::debug!("Rejected submission: {}", e.log_summary());
}
