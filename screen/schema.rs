//! # Column Schemas
//!
//! The classifier only ever sees an ordered list of named columns. Both the names and
//! the order changed between revisions of the questionnaire, so every model artifact
//! pins the schema it was trained against and the record is laid out through it.
//!
//! - Column names are the training-time names, spelling included (`austim`,
//!   `contry_of_res`).
//! - Each column is either numeric (answers, age) or categorical (everything else).
//!   Categorical columns are encoded as string tokens which the artifact one-hot expands.

use serde::{Deserialize, Serialize};
use std::fmt;

/// The number of binary screening questions on the form.
pub const NUM_QUESTIONS: usize = 10;

/// A pinned, ordered column layout.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SchemaVersion {
    /// `A1..A10, age, gender, ethnicity, country` with `Male`/`Female` gender tokens.
    ///
    /// Only the column layout of the first revision is kept. Submissions still carry
    /// the full field set, so a form that collected just these fields is rejected
    /// with `InputError::MissingField` before a V1 model is consulted.
    V1,
    /// `A1_Score..A10_Score, age, gender, jaundice, austim, contry_of_res,
    /// used_app_before, relation` with `m`/`f` and `yes`/`no` tokens.
    V2,
    /// `V2` with `ethnicity` inserted after `gender`.
    #[default]
    V3,
}

/// Which record field a column draws its value from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Field {
    /// Zero-based question index.
    Answer(usize),
    Age,
    Gender,
    Ethnicity,
    Jaundice,
    FamilyHistory,
    Country,
    UsedAppBefore,
    Relation,
}

/// How a column is handed to the model.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnKind {
    Numeric,
    Categorical,
}

/// One named column of a schema.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Column {
    pub name: String,
    pub field: Field,
}

impl Column {
    fn new(name: impl Into<String>, field: Field) -> Self {
        Self {
            name: name.into(),
            field,
        }
    }

    pub fn kind(&self) -> ColumnKind {
        match self.field {
            Field::Answer(_) | Field::Age => ColumnKind::Numeric,
            _ => ColumnKind::Categorical,
        }
    }
}

impl SchemaVersion {
    /// The exact ordered columns the model was trained on.
    pub fn columns(self) -> Vec<Column> {
        let mut columns: Vec<Column> = (0..NUM_QUESTIONS)
            .map(|i| Column::new(self.answer_column(i), Field::Answer(i)))
            .collect();
        columns.push(Column::new("age", Field::Age));
        columns.push(Column::new("gender", Field::Gender));

        match self {
            SchemaVersion::V1 => {
                columns.push(Column::new("ethnicity", Field::Ethnicity));
                columns.push(Column::new("country", Field::Country));
            }
            SchemaVersion::V2 | SchemaVersion::V3 => {
                if self == SchemaVersion::V3 {
                    columns.push(Column::new("ethnicity", Field::Ethnicity));
                }
                columns.push(Column::new("jaundice", Field::Jaundice));
                columns.push(Column::new("austim", Field::FamilyHistory));
                columns.push(Column::new("contry_of_res", Field::Country));
                columns.push(Column::new("used_app_before", Field::UsedAppBefore));
                columns.push(Column::new("relation", Field::Relation));
            }
        }
        columns
    }

    /// Column name of the `index`-th (zero-based) question.
    pub fn answer_column(self, index: usize) -> String {
        match self {
            SchemaVersion::V1 => format!("A{}", index + 1),
            SchemaVersion::V2 | SchemaVersion::V3 => format!("A{}_Score", index + 1),
        }
    }

    /// Token used for the gender column.
    pub fn gender_token(self, male: bool) -> &'static str {
        match (self, male) {
            (SchemaVersion::V1, true) => "Male",
            (SchemaVersion::V1, false) => "Female",
            (_, true) => "m",
            (_, false) => "f",
        }
    }

    /// Token used for yes/no columns.
    pub fn boolean_token(self, value: bool) -> &'static str {
        if value { "yes" } else { "no" }
    }
}

impl fmt::Display for SchemaVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SchemaVersion::V1 => "V1",
            SchemaVersion::V2 => "V2",
            SchemaVersion::V3 => "V3",
        };
        f.write_str(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(schema: SchemaVersion) -> Vec<String> {
        schema.columns().into_iter().map(|c| c.name).collect()
    }

    #[test]
    fn v1_layout_matches_first_form() {
        let cols = names(SchemaVersion::V1);
        assert_eq!(cols.len(), 14);
        assert_eq!(cols[0], "A1");
        assert_eq!(cols[9], "A10");
        assert_eq!(&cols[10..], ["age", "gender", "ethnicity", "country"]);
    }

    #[test]
    fn v2_layout_uses_training_spellings() {
        let cols = names(SchemaVersion::V2);
        assert_eq!(cols.len(), 17);
        assert_eq!(cols[0], "A1_Score");
        assert_eq!(
            &cols[10..],
            [
                "age",
                "gender",
                "jaundice",
                "austim",
                "contry_of_res",
                "used_app_before",
                "relation"
            ]
        );
    }

    #[test]
    fn v3_inserts_ethnicity_after_gender() {
        let cols = names(SchemaVersion::V3);
        assert_eq!(cols.len(), 18);
        assert_eq!(cols[11], "gender");
        assert_eq!(cols[12], "ethnicity");
        assert_eq!(cols[13], "jaundice");
    }

    #[test]
    fn column_kinds() {
        let cols = SchemaVersion::V3.columns();
        let numeric = cols
            .iter()
            .filter(|c| c.kind() == ColumnKind::Numeric)
            .count();
        assert_eq!(numeric, NUM_QUESTIONS + 1);
    }

    #[test]
    fn tokens_follow_revision() {
        assert_eq!(SchemaVersion::V1.gender_token(true), "Male");
        assert_eq!(SchemaVersion::V3.gender_token(false), "f");
        assert_eq!(SchemaVersion::V2.boolean_token(true), "yes");
    }
}
