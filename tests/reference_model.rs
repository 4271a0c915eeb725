use approx::assert_abs_diff_eq;
use screenrisk::model::{FeatureTerm, ModelArtifact, ModelError};
use screenrisk::{
    Gender, InputError, RawSubmission, RiskLevel, Scorer, ScoringError, ScoringResponse,
    ScreeningRecord,
};
use serde_json::json;
use std::sync::Arc;
use std::thread;

const FIXTURE: &str = concat!(
    env!("CARGO_MANIFEST_DIR"),
    "/tests/fixtures/reference_model.toml"
);

fn reference_scorer() -> Scorer {
    let model = ModelArtifact::load(FIXTURE).expect("reference fixture loads");
    Scorer::new(Arc::new(model))
}

fn sigmoid(eta: f64) -> f64 {
    1.0 / (1.0 + (-eta).exp())
}

/// All answers 0, age 25, female, no jaundice, no family history, "Others",
/// "US", no prior app use, filled in by the subject.
fn reference_record() -> ScreeningRecord {
    ScreeningRecord {
        answers: [false; 10],
        age: 25.0,
        gender: Gender::Female,
        jaundice: false,
        family_history: false,
        ethnicity: "Others".to_string(),
        country: "US".to_string(),
        used_app_before: false,
        relation: "Self".to_string(),
    }
}

fn reference_submission() -> RawSubmission {
    let mut raw = RawSubmission::new();
    for i in 1..=10 {
        raw.insert(format!("A{i}_Score"), 0);
    }
    raw.insert("age", 25)
        .insert("gender", "female")
        .insert("jaundice", false)
        .insert("austim", false)
        .insert("ethnicity", "Others")
        .insert("contry_of_res", "US")
        .insert("used_app_before", false)
        .insert("relation", "Self");
    raw
}

#[test]
fn reference_scenario_is_low_risk() {
    let assessment = reference_scorer().score(&reference_record()).unwrap();

    // eta = -6 + (-0.05) * (25 - 29) / 16, then Platt: 0.94 * eta - 0.03
    let expected = sigmoid(0.94 * (-6.0 + 0.0125) - 0.03);
    assert_abs_diff_eq!(assessment.probability(), expected, epsilon = 1e-12);
    assert!(assessment.probability() < 0.01);
    assert_eq!(assessment.risk_level(), RiskLevel::Low);
    assert_eq!(
        assessment.disclaimer,
        "Not a diagnosis - always consult a clinician."
    );
}

#[test]
fn raw_and_typed_paths_agree() {
    let scorer = reference_scorer();
    let typed = scorer.score(&reference_record()).unwrap();
    let handled = scorer.handle(&reference_submission());
    assert_eq!(handled, ScoringResponse::Assessment(typed));
}

#[test]
fn all_positive_answers_are_high_risk() {
    let mut record = reference_record();
    record.answers = [true; 10];
    let assessment = reference_scorer().score(&record).unwrap();
    assert!(assessment.probability() > 0.99);
    assert_eq!(assessment.risk_level(), RiskLevel::High);
}

#[test]
fn every_answer_pattern_yields_consistent_probability_and_label() {
    let scorer = reference_scorer();
    let demographics = [
        ("Others", "US", "Self", Gender::Female, false),
        ("White-European", "United Kingdom", "Parent", Gender::Male, true),
        ("Asian", "India", "Health care professional", Gender::Female, true),
    ];

    for (ethnicity, country, relation, gender, flag) in demographics {
        for mask in 0u32..(1 << 10) {
            let mut record = reference_record();
            for (i, answer) in record.answers.iter_mut().enumerate() {
                *answer = mask & (1 << i) != 0;
            }
            record.gender = gender;
            record.jaundice = flag;
            record.family_history = flag;
            record.used_app_before = flag;
            record.ethnicity = ethnicity.to_string();
            record.country = country.to_string();
            record.relation = relation.to_string();
            record.age = 4.0 + f64::from(mask % 60);

            let a = scorer.score(&record).unwrap();
            let p = a.probability();
            assert!((0.0..=1.0).contains(&p), "probability {p} out of range");
            let expected = if p >= 0.7 {
                RiskLevel::High
            } else {
                RiskLevel::Low
            };
            assert_eq!(a.risk_level(), expected);
        }
    }
}

#[test]
fn scoring_is_pure_and_byte_identical() {
    let scorer = reference_scorer();
    let raw = reference_submission();
    let first = serde_json::to_string(&scorer.handle(&raw)).unwrap();
    let second = serde_json::to_string(&scorer.handle(&raw)).unwrap();
    assert_eq!(first, second);

    // A second, independently loaded model gives the same bytes too.
    let third = serde_json::to_string(&reference_scorer().handle(&raw)).unwrap();
    assert_eq!(first, third);
}

#[test]
fn out_of_range_answer_is_invalid_input() {
    let mut raw = reference_submission();
    raw.insert("A3_Score", 2);
    let response = serde_json::to_value(reference_scorer().handle(&raw)).unwrap();
    assert_eq!(response["error"]["kind"], "InvalidInput");
    assert_eq!(response["error"]["field"], "A3_Score");
}

#[test]
fn non_numeric_age_is_invalid_input() {
    let mut raw = reference_submission();
    raw.insert("age", "abc");
    let response = serde_json::to_value(reference_scorer().handle(&raw)).unwrap();
    assert_eq!(
        response,
        json!({"error": {
            "kind": "InvalidInput",
            "field": "age",
            "message": "Invalid input: Field 'age' must be a positive, finite number, but found 'abc'."
        }})
    );
}

#[test]
fn unseen_category_is_invalid_input() {
    let scorer = reference_scorer();
    let mut record = reference_record();
    record.ethnicity = "Martian".to_string();
    match scorer.score(&record) {
        Err(ScoringError::InvalidInput(InputError::UnknownCategory { column, value, .. })) => {
            assert_eq!(column, "ethnicity");
            assert_eq!(value, "Martian");
        }
        other => panic!("Expected UnknownCategory, got {other:?}"),
    }

    // Matching is exact: case differences are unseen values too.
    let mut raw = reference_submission();
    raw.insert("relation", "self");
    assert!(scorer.handle(&raw).is_error());
}

#[test]
fn shared_model_scores_identically_across_threads() {
    let scorer = reference_scorer();
    let records: Vec<ScreeningRecord> = (0..10)
        .map(|n| {
            let mut r = reference_record();
            for answer in r.answers.iter_mut().take(n) {
                *answer = true;
            }
            r
        })
        .collect();
    let sequential: Vec<f64> = records
        .iter()
        .map(|r| scorer.score(r).unwrap().probability())
        .collect();

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let scorer = scorer.clone();
            let records = records.clone();
            thread::spawn(move || {
                records
                    .iter()
                    .map(|r| scorer.score(r).unwrap().probability())
                    .collect::<Vec<f64>>()
            })
        })
        .collect();

    for handle in handles {
        assert_eq!(handle.join().unwrap(), sequential);
    }
}

#[test]
fn threshold_can_be_overridden_without_touching_the_model() {
    let scorer = reference_scorer();
    let mut record = reference_record();
    record.answers = [true, true, true, true, true, false, false, false, false, false];
    let p = scorer.score(&record).unwrap().probability();

    let strict = scorer.clone().with_threshold(p).unwrap();
    assert_eq!(strict.score(&record).unwrap().risk_level(), RiskLevel::High);

    let stricter = scorer.clone().with_threshold((p + 0.01).min(1.0)).unwrap();
    assert_eq!(stricter.score(&record).unwrap().risk_level(), RiskLevel::Low);

    assert_eq!(scorer.threshold(), 0.7);
}

#[test]
fn missing_artifact_fails_to_load() {
    let dir = tempfile::tempdir().unwrap();
    let result = ModelArtifact::load(dir.path().join("models").join("calibrated_lr.toml"));
    assert!(matches!(result, Err(ModelError::IoError(_))));
}

#[test]
fn artifact_with_shuffled_columns_fails_to_load() {
    let mut model = ModelArtifact::load(FIXTURE).unwrap();
    model.coefficients.terms.swap(13, 14);
    let file = tempfile::NamedTempFile::new().unwrap();
    model.save(file.path()).unwrap();

    match ModelArtifact::load(file.path()) {
        Err(ModelError::SchemaMismatch {
            position,
            expected,
            found,
        }) => {
            assert_eq!(position, 13);
            assert_eq!(expected, "jaundice");
            assert_eq!(found, "austim");
        }
        other => panic!("Expected SchemaMismatch, got {other:?}"),
    }
}

#[test]
fn fixture_vocabularies_are_exposed() {
    let model = ModelArtifact::load(FIXTURE).unwrap();
    let gender = model.vocabulary("gender").unwrap();
    assert_eq!(gender, vec!["f", "m"]);
    assert!(
        model
            .vocabulary("contry_of_res")
            .unwrap()
            .contains(&"United Kingdom")
    );
    assert!(matches!(
        model.coefficients.terms[10],
        FeatureTerm::Numeric { mean, .. } if mean == 29.0
    ));
}
