#![deny(dead_code)]
#![deny(unused_imports)]

pub mod assess;
pub mod data;
pub mod model;
pub mod record;
pub mod schema;
pub mod types;

pub use assess::{ErrorPayload, RiskAssessment, RiskLevel, Scorer, ScoringError, ScoringResponse};
pub use model::{ModelArtifact, ModelError};
pub use record::{Gender, InputError, ParsedSubmission, RawSubmission, ScreeningRecord};
pub use schema::SchemaVersion;
