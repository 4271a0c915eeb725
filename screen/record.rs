//! # Screening Records
//!
//! This module is the only entry point for caller-supplied answers. A submission
//! arrives as a loosely-typed map of column name to value (`RawSubmission`) and is
//! validated, field by field, into a strongly-typed `ScreeningRecord`. Every way a
//! submission can be wrong maps onto one `InputError` variant naming the field, so
//! the caller always gets actionable feedback rather than a silently wrong score.

use crate::schema::{Column, Field, NUM_QUESTIONS, SchemaVersion};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use thiserror::Error;

/// Gender as recorded on the form.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Gender {
    Male,
    Female,
}

/// One subject's validated answers and demographics.
///
/// The record always carries the full field set; which fields reach the model, and in
/// which order, is decided by the `SchemaVersion` of the loaded artifact.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScreeningRecord {
    /// Answers to questions A1..A10. `true` encodes 1.
    pub answers: [bool; NUM_QUESTIONS],
    /// Age in years.
    pub age: f64,
    pub gender: Gender,
    /// Born with jaundice.
    pub jaundice: bool,
    /// A family member has been diagnosed.
    pub family_history: bool,
    pub ethnicity: String,
    pub country: String,
    /// The subject has used a screening app before.
    pub used_app_before: bool,
    /// Who completed the form (e.g. "Self", "Parent").
    pub relation: String,
}

/// A single value as handed to the model.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Cell<'a> {
    Numeric(f64),
    Category(&'a str),
}

/// Every way a submission can fail validation.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum InputError {
    #[error("The submission could not be parsed: {0}")]
    Malformed(String),
    #[error("The required field '{0}' is missing from the submission.")]
    MissingField(String),
    #[error("Screening answer '{field}' must be 0 or 1, but found '{found}'.")]
    InvalidAnswer { field: String, found: String },
    #[error("Field 'age' must be a positive, finite number, but found '{found}'.")]
    InvalidAge { found: String },
    #[error("Field '{field}' must be one of {expected}, but found '{found}'.")]
    InvalidCategory {
        field: String,
        expected: &'static str,
        found: String,
    },
    #[error("Field '{field}' must be yes or no, but found '{found}'.")]
    InvalidBoolean { field: String, found: String },
    #[error("Field '{0}' must be a non-empty string.")]
    EmptyText(String),
    #[error(
        "Value '{value}' for column '{column}' was not present when the model was trained. Known values: {known}."
    )]
    UnknownCategory {
        column: String,
        value: String,
        known: String,
    },
}

impl InputError {
    /// The field or column the error refers to, if any.
    pub fn field(&self) -> Option<&str> {
        match self {
            InputError::Malformed(_) => None,
            InputError::MissingField(field) | InputError::EmptyText(field) => Some(field),
            InputError::InvalidAnswer { field, .. }
            | InputError::InvalidCategory { field, .. }
            | InputError::InvalidBoolean { field, .. } => Some(field),
            InputError::InvalidAge { .. } => Some("age"),
            InputError::UnknownCategory { column, .. } => Some(column),
        }
    }

    /// A short description of what went wrong that never repeats submitted values.
    pub fn reason(&self) -> &'static str {
        match self {
            InputError::Malformed(_) => "malformed submission",
            InputError::MissingField(_) => "missing field",
            InputError::InvalidAnswer { .. } => "answer is not 0 or 1",
            InputError::InvalidAge { .. } => "age is not a positive number",
            InputError::InvalidCategory { .. } => "unrecognized value",
            InputError::InvalidBoolean { .. } => "not a yes/no value",
            InputError::EmptyText(_) => "empty text",
            InputError::UnknownCategory { .. } => "category unseen in training",
        }
    }
}

/// The outcome of reading one submission off the wire or out of a file. A
/// submission that could not even be read is carried as its error so that it
/// still gets a response in its own slot.
pub type ParsedSubmission = Result<RawSubmission, InputError>;

/// A submission exactly as the caller sent it: column name to untyped value.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RawSubmission {
    fields: BTreeMap<String, Value>,
}

impl RawSubmission {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses a JSON object. Anything other than an object is malformed.
    pub fn from_json_str(json: &str) -> Result<Self, InputError> {
        Self::from_json_slice(json.as_bytes())
    }

    /// Parses a JSON object from raw bytes. Invalid UTF-8 is malformed input.
    pub fn from_json_slice(json: &[u8]) -> Result<Self, InputError> {
        let value: Value =
            serde_json::from_slice(json).map_err(|e| InputError::Malformed(e.to_string()))?;
        match value {
            Value::Object(map) => Ok(Self {
                fields: map.into_iter().collect(),
            }),
            other => Err(InputError::Malformed(format!(
                "expected a JSON object, found {}",
                json_type_name(&other)
            ))),
        }
    }

    /// Builds a submission from textual cells, e.g. one row of a TSV file.
    /// Empty cells are treated as absent.
    pub fn from_text_pairs<K, V, I>(pairs: I) -> Self
    where
        K: Into<String>,
        V: AsRef<str>,
        I: IntoIterator<Item = (K, V)>,
    {
        let fields = pairs
            .into_iter()
            .filter(|(_, v)| !v.as_ref().trim().is_empty())
            .map(|(k, v)| (k.into(), Value::String(v.as_ref().trim().to_string())))
            .collect();
        Self { fields }
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) -> &mut Self {
        self.fields.insert(key.into(), value.into());
        self
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Looks up the first alias holding a non-null value, returning the key and value.
    fn lookup<'a>(&'a self, aliases: &[&'a str]) -> Option<(&'a str, &'a Value)> {
        aliases.iter().find_map(|&key| {
            self.fields
                .get(key)
                .filter(|value| !value.is_null())
                .map(|value| (key, value))
        })
    }

    fn require<'a>(&'a self, aliases: &[&'a str]) -> Result<(&'a str, &'a Value), InputError> {
        self.lookup(aliases)
            .ok_or_else(|| InputError::MissingField(aliases[0].to_string()))
    }
}

impl TryFrom<&RawSubmission> for ScreeningRecord {
    type Error = InputError;

    fn try_from(raw: &RawSubmission) -> Result<Self, Self::Error> {
        let mut answers = [false; NUM_QUESTIONS];
        for (i, answer) in answers.iter_mut().enumerate() {
            let short = format!("A{}", i + 1);
            let long = format!("A{}_Score", i + 1);
            let (key, value) = raw.require(&[long.as_str(), short.as_str()])?;
            *answer = parse_answer(key, value)?;
        }

        let (_, age) = raw.require(&["age"])?;
        let (gender_key, gender) = raw.require(&["gender"])?;
        let (jaundice_key, jaundice) = raw.require(&["jaundice"])?;
        let (family_key, family) = raw.require(&["austim", "family_history"])?;
        let (ethnicity_key, ethnicity) = raw.require(&["ethnicity"])?;
        let (country_key, country) = raw.require(&["contry_of_res", "country"])?;
        let (app_key, used_app) = raw.require(&["used_app_before"])?;
        let (relation_key, relation) = raw.require(&["relation"])?;

        let record = ScreeningRecord {
            answers,
            age: parse_age(age)?,
            gender: parse_gender(gender_key, gender)?,
            jaundice: parse_boolean(jaundice_key, jaundice)?,
            family_history: parse_boolean(family_key, family)?,
            ethnicity: parse_text(ethnicity_key, ethnicity)?,
            country: parse_text(country_key, country)?,
            used_app_before: parse_boolean(app_key, used_app)?,
            relation: parse_text(relation_key, relation)?,
        };
        record.validate()?;
        Ok(record)
    }
}

impl ScreeningRecord {
    /// Re-checks the invariants the type system cannot express. Records built
    /// directly in code, rather than through `RawSubmission`, go through this too.
    pub fn validate(&self) -> Result<(), InputError> {
        if !self.age.is_finite() || self.age <= 0.0 {
            return Err(InputError::InvalidAge {
                found: self.age.to_string(),
            });
        }
        for (name, text) in [
            ("ethnicity", &self.ethnicity),
            ("country", &self.country),
            ("relation", &self.relation),
        ] {
            if text.trim().is_empty() {
                return Err(InputError::EmptyText(name.to_string()));
            }
        }
        Ok(())
    }

    /// The value of `column` as the model expects it under `schema`.
    pub fn cell(&self, column: &Column, schema: SchemaVersion) -> Cell<'_> {
        match column.field {
            Field::Answer(i) => Cell::Numeric(if self.answers[i] { 1.0 } else { 0.0 }),
            Field::Age => Cell::Numeric(self.age),
            Field::Gender => Cell::Category(schema.gender_token(self.gender == Gender::Male)),
            Field::Ethnicity => Cell::Category(self.ethnicity.trim()),
            Field::Jaundice => Cell::Category(schema.boolean_token(self.jaundice)),
            Field::FamilyHistory => Cell::Category(schema.boolean_token(self.family_history)),
            Field::Country => Cell::Category(self.country.trim()),
            Field::UsedAppBefore => Cell::Category(schema.boolean_token(self.used_app_before)),
            Field::Relation => Cell::Category(self.relation.trim()),
        }
    }
}

fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

/// Renders a value for an error message without JSON quoting for strings.
fn describe(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn parse_answer(field: &str, value: &Value) -> Result<bool, InputError> {
    let numeric = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    match numeric {
        Some(v) if v == 0.0 => Ok(false),
        Some(v) if v == 1.0 => Ok(true),
        _ => Err(InputError::InvalidAnswer {
            field: field.to_string(),
            found: describe(value),
        }),
    }
}

fn parse_age(value: &Value) -> Result<f64, InputError> {
    let age = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    match age {
        Some(a) if a.is_finite() && a > 0.0 => Ok(a),
        _ => Err(InputError::InvalidAge {
            found: describe(value),
        }),
    }
}

fn parse_gender(field: &str, value: &Value) -> Result<Gender, InputError> {
    let token = value.as_str().map(|s| s.trim().to_ascii_lowercase());
    match token.as_deref() {
        Some("m") | Some("male") => Ok(Gender::Male),
        Some("f") | Some("female") => Ok(Gender::Female),
        _ => Err(InputError::InvalidCategory {
            field: field.to_string(),
            expected: "m, male, f, female",
            found: describe(value),
        }),
    }
}

fn parse_boolean(field: &str, value: &Value) -> Result<bool, InputError> {
    let parsed = match value {
        Value::Bool(b) => Some(*b),
        Value::Number(n) => match n.as_f64() {
            Some(v) if v == 0.0 => Some(false),
            Some(v) if v == 1.0 => Some(true),
            _ => None,
        },
        Value::String(s) => match s.trim().to_ascii_lowercase().as_str() {
            "yes" | "true" | "1" => Some(true),
            "no" | "false" | "0" => Some(false),
            _ => None,
        },
        _ => None,
    };
    parsed.ok_or_else(|| InputError::InvalidBoolean {
        field: field.to_string(),
        found: describe(value),
    })
}

fn parse_text(field: &str, value: &Value) -> Result<String, InputError> {
    match value {
        Value::String(s) if !s.trim().is_empty() => Ok(s.trim().to_string()),
        Value::String(_) => Err(InputError::EmptyText(field.to_string())),
        other => Err(InputError::InvalidCategory {
            field: field.to_string(),
            expected: "a text value",
            found: describe(other),
        }),
    }
}
