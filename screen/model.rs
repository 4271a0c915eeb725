use crate::record::{Cell, InputError, ScreeningRecord};
use crate::schema::{ColumnKind, SchemaVersion};
use crate::types::{Coefficients, DesignVector, LinearPredictor};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs;
use std::io::{BufWriter, Write};
use std::path::Path;
use thiserror::Error;

/// Probability at or above which a record is labelled high risk, unless the artifact
/// or the caller says otherwise.
pub const DEFAULT_THRESHOLD: f64 = 0.7;

/// Disclaimer attached to every assessment unless the artifact overrides it.
pub const DEFAULT_DISCLAIMER: &str = "Not a diagnosis - always consult a clinician.";

// --- Public Data Structures ---
// These structs define the public, human-readable format of the trained model
// when serialized to a TOML file.

/// Defines the link function, connecting the linear predictor to the probability.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LinkFunction {
    /// The logit link of logistic regression.
    /// Maps the real line (-inf, +inf) to probabilities (0, 1).
    Logit,
    /// The linear predictor already is a probability; it is only clamped into [0, 1].
    Identity,
}

/// Identifies the artifact and pins the column layout it was trained on.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArtifactMetadata {
    pub name: String,
    pub schema: SchemaVersion,
}

/// Everything about scoring that is not a fitted coefficient.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoringConfig {
    pub link_function: LinkFunction,
    #[serde(default = "default_threshold")]
    pub threshold: f64,
    #[serde(default = "default_disclaimer")]
    pub disclaimer: String,
}

fn default_threshold() -> f64 {
    DEFAULT_THRESHOLD
}

fn default_disclaimer() -> String {
    DEFAULT_DISCLAIMER.to_string()
}

fn default_scale() -> f64 {
    1.0
}

/// Platt scaling applied to the linear predictor: `eta' = slope * eta + offset`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PlattCalibration {
    pub slope: f64,
    pub offset: f64,
}

/// One level of a categorical column and its coefficient.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategoryLevel {
    pub value: String,
    pub coefficient: f64,
}

/// One column's contribution to the linear predictor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum FeatureTerm {
    /// `coefficient * (value - mean) / scale`
    Numeric {
        column: String,
        coefficient: f64,
        #[serde(default)]
        mean: f64,
        #[serde(default = "default_scale")]
        scale: f64,
    },
    /// One-hot expansion over `levels`. The `reference` level, if any, contributes zero.
    Categorical {
        column: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        reference: Option<String>,
        levels: Vec<CategoryLevel>,
    },
}

impl FeatureTerm {
    pub fn column(&self) -> &str {
        match self {
            FeatureTerm::Numeric { column, .. } | FeatureTerm::Categorical { column, .. } => {
                column
            }
        }
    }

    pub fn kind(&self) -> ColumnKind {
        match self {
            FeatureTerm::Numeric { .. } => ColumnKind::Numeric,
            FeatureTerm::Categorical { .. } => ColumnKind::Categorical,
        }
    }
}

/// The fitted coefficients. `terms` is ordered exactly like the schema's columns.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MappedCoefficients {
    pub intercept: f64,
    pub terms: Vec<FeatureTerm>,
}

/// The top-level, self-contained, trained model artifact.
/// This is the structure that gets saved to and loaded from a file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelArtifact {
    pub metadata: ArtifactMetadata,
    pub config: ScoringConfig,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub calibration: Option<PlattCalibration>,
    pub coefficients: MappedCoefficients,
}

/// Custom error type for model loading, saving and validation.
#[derive(Error, Debug)]
pub enum ModelError {
    #[error("Failed to read or write model file: {0}")]
    IoError(#[from] std::io::Error),
    #[error("Failed to parse TOML model file: {0}")]
    TomlParseError(#[from] toml::de::Error),
    #[error("Failed to serialize model to TOML format: {0}")]
    TomlSerializeError(#[from] toml::ser::Error),
    #[error("The model declares {found} terms, but schema {schema} has {expected} columns.")]
    ColumnCount {
        schema: SchemaVersion,
        found: usize,
        expected: usize,
    },
    #[error(
        "Term {position} is for column '{found}', but schema position {position} is '{expected}'. The model was trained on a different column order."
    )]
    SchemaMismatch {
        position: usize,
        expected: String,
        found: String,
    },
    #[error("Column '{column}' must be a {expected:?} term in this schema.")]
    TermKindMismatch {
        column: String,
        expected: ColumnKind,
    },
    #[error("Model parameter '{0}' is not a finite number.")]
    NonFiniteParameter(String),
    #[error("Scale for column '{column}' must be positive, but found {scale}.")]
    InvalidScale { column: String, scale: f64 },
    #[error("Risk threshold must lie in [0, 1], but found {0}.")]
    InvalidThreshold(f64),
    #[error("Categorical column '{0}' declares no levels.")]
    EmptyVocabulary(String),
    #[error("Categorical column '{column}' declares level '{value}' more than once.")]
    DuplicateLevel { column: String, value: String },
}

impl ModelArtifact {
    /// Loads a trained model from a TOML file and validates it against its schema.
    ///
    /// A model that fails here must never be served: the caller treats every error
    /// as fatal.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ModelError> {
        let path = path.as_ref();
        let toml_string = fs::read_to_string(path)?;
        let model: ModelArtifact = toml::from_str(&toml_string)?;
        model.validate()?;
        log::info!(
            "Loaded model '{}' from {} (schema {}, {} terms, threshold {})",
            model.metadata.name,
            path.display(),
            model.metadata.schema,
            model.coefficients.terms.len(),
            model.config.threshold
        );
        Ok(model)
    }

    /// Saves the trained model to a file in a human-readable TOML format.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), ModelError> {
        let toml_string = toml::to_string_pretty(self)?;
        let mut file = BufWriter::new(fs::File::create(path)?);
        file.write_all(toml_string.as_bytes())?;
        file.flush()?;
        Ok(())
    }

    /// Checks every structural invariant prediction relies on.
    pub fn validate(&self) -> Result<(), ModelError> {
        let schema = self.metadata.schema;
        let columns = schema.columns();
        let terms = &self.coefficients.terms;

        if terms.len() != columns.len() {
            return Err(ModelError::ColumnCount {
                schema,
                found: terms.len(),
                expected: columns.len(),
            });
        }

        for (position, (term, column)) in terms.iter().zip(&columns).enumerate() {
            if term.column() != column.name {
                return Err(ModelError::SchemaMismatch {
                    position,
                    expected: column.name.clone(),
                    found: term.column().to_string(),
                });
            }
            if term.kind() != column.kind() {
                return Err(ModelError::TermKindMismatch {
                    column: column.name.clone(),
                    expected: column.kind(),
                });
            }
        }

        let threshold = self.config.threshold;
        if !(0.0..=1.0).contains(&threshold) {
            return Err(ModelError::InvalidThreshold(threshold));
        }

        require_finite("intercept", self.coefficients.intercept)?;
        if let Some(calibration) = &self.calibration {
            require_finite("calibration.slope", calibration.slope)?;
            require_finite("calibration.offset", calibration.offset)?;
        }

        for term in terms {
            match term {
                FeatureTerm::Numeric {
                    column,
                    coefficient,
                    mean,
                    scale,
                } => {
                    require_finite(column, *coefficient)?;
                    require_finite(&format!("{column}.mean"), *mean)?;
                    require_finite(&format!("{column}.scale"), *scale)?;
                    if *scale <= 0.0 {
                        return Err(ModelError::InvalidScale {
                            column: column.clone(),
                            scale: *scale,
                        });
                    }
                }
                FeatureTerm::Categorical {
                    column,
                    reference,
                    levels,
                } => {
                    if levels.is_empty() && reference.is_none() {
                        return Err(ModelError::EmptyVocabulary(column.clone()));
                    }
                    let mut seen = HashSet::new();
                    for value in reference
                        .iter()
                        .map(String::as_str)
                        .chain(levels.iter().map(|l| l.value.as_str()))
                    {
                        if !seen.insert(value) {
                            return Err(ModelError::DuplicateLevel {
                                column: column.clone(),
                                value: value.to_string(),
                            });
                        }
                    }
                    for level in levels {
                        require_finite(&format!("{column}={}", level.value), level.coefficient)?;
                    }
                }
            }
        }

        Ok(())
    }

    /// The trained vocabulary of a categorical column, reference level first.
    pub fn vocabulary(&self, column: &str) -> Option<Vec<&str>> {
        self.coefficients
            .terms
            .iter()
            .find(|term| term.column() == column)
            .and_then(|term| match term {
                FeatureTerm::Categorical {
                    reference, levels, ..
                } => Some(
                    reference
                        .iter()
                        .map(String::as_str)
                        .chain(levels.iter().map(|l| l.value.as_str()))
                        .collect(),
                ),
                FeatureTerm::Numeric { .. } => None,
            })
    }

    /// Computes the linear predictor for one record, after calibration.
    pub fn linear_predictor(
        &self,
        record: &ScreeningRecord,
    ) -> Result<LinearPredictor, InputError> {
        record.validate()?;
        let x = internal::construct_design_vector(record, self)?;
        let beta = internal::flatten_coefficients(&self.coefficients);
        let eta = beta.linear_predictor(&x).value();

        let eta = match &self.calibration {
            Some(c) => c.slope * eta + c.offset,
            None => eta,
        };
        Ok(LinearPredictor(eta))
    }

    /// Predicts the probability of the positive class for one record.
    ///
    /// Pure and non-iterative: the design vector and the flattened coefficients
    /// are rebuilt from the stored terms in the same canonical order, then
    /// combined with a single dot product and the inverse link.
    pub fn predict_proba(&self, record: &ScreeningRecord) -> Result<f64, InputError> {
        let eta = self.linear_predictor(record)?.value();

        let probability = match self.config.link_function {
            LinkFunction::Logit => {
                // Clamp eta to prevent numerical overflow in exp()
                let eta_clamped = eta.clamp(-700.0, 700.0);
                let p = 1.0 / (1.0 + f64::exp(-eta_clamped));
                p.clamp(1e-8, 1.0 - 1e-8)
            }
            LinkFunction::Identity => eta.clamp(0.0, 1.0),
        };
        Ok(probability)
    }
}

fn require_finite(name: &str, value: f64) -> Result<(), ModelError> {
    if value.is_finite() {
        Ok(())
    } else {
        Err(ModelError::NonFiniteParameter(name.to_string()))
    }
}

/// Internal module for prediction-specific implementation details.
mod internal {
    use super::*;

    /// Constructs the design vector `x` for one record following the canonical order:
    /// intercept, then each term in schema order (numeric value, or one indicator per
    /// declared level). This order is the implicit contract with `flatten_coefficients`.
    pub(super) fn construct_design_vector(
        record: &ScreeningRecord,
        model: &ModelArtifact,
    ) -> Result<DesignVector, InputError> {
        let schema = model.metadata.schema;
        let mut x = vec![1.0];

        for (term, column) in model.coefficients.terms.iter().zip(schema.columns()) {
            match (term, record.cell(&column, schema)) {
                (FeatureTerm::Numeric { mean, scale, .. }, Cell::Numeric(value)) => {
                    x.push((value - mean) / scale);
                }
                (
                    FeatureTerm::Categorical {
                        reference, levels, ..
                    },
                    Cell::Category(token),
                ) => {
                    let is_reference = reference.as_deref() == Some(token);
                    let hit = levels.iter().position(|l| l.value == token);
                    if hit.is_none() && !is_reference {
                        return Err(InputError::UnknownCategory {
                            column: column.name.clone(),
                            value: token.to_string(),
                            known: model
                                .vocabulary(&column.name)
                                .unwrap_or_default()
                                .join(", "),
                        });
                    }
                    x.extend((0..levels.len()).map(|i| if Some(i) == hit { 1.0 } else { 0.0 }));
                }
                // `validate` rejects artifacts whose term kinds disagree with the schema.
                (term, _) => {
                    return Err(InputError::Malformed(format!(
                        "column '{}' has an unexpected value kind",
                        term.column()
                    )));
                }
            }
        }

        Ok(DesignVector::from(x))
    }

    /// Flattens the structured `MappedCoefficients` into a single vector,
    /// following the exact same canonical order used in `construct_design_vector`.
    pub(super) fn flatten_coefficients(coeffs: &MappedCoefficients) -> Coefficients {
        let mut flattened: Vec<f64> = vec![coeffs.intercept];
        for term in &coeffs.terms {
            match term {
                FeatureTerm::Numeric { coefficient, .. } => flattened.push(*coefficient),
                FeatureTerm::Categorical { levels, .. } => {
                    flattened.extend(levels.iter().map(|l| l.coefficient));
                }
            }
        }
        Coefficients::from(flattened)
    }
}
