//! Extraction accuracy scoring against ground truth.
//!
//! When a batch is seeded with known-good reference data, each job's
//! extracted output is scored field by field. Comparison is exact string
//! equality after trimming whitespace and lowercasing; no fuzzy matching.

use serde_json::Value;

/// Per-field comparison result for one job.
#[derive(Debug, Clone, serde::Serialize)]
pub struct AccuracyReport {
    /// Fraction of ground-truth fields matched, in `0.0..=1.0`.
    pub score: f64,
    pub matched_fields: u32,
    pub total_fields: u32,
    /// Names of ground-truth fields the extraction missed or got wrong.
    pub mismatched_fields: Vec<String>,
}

/// Score extracted data against ground truth.
///
/// Both values must be JSON objects; the ground-truth keys define the field
/// set. Returns `None` when there is nothing to score (non-object inputs or
/// an empty ground truth).
pub fn score_accuracy(extracted: &Value, ground_truth: &Value) -> Option<AccuracyReport> {
    let truth = ground_truth.as_object()?;
    if truth.is_empty() {
        return None;
    }
    let fields = extracted.as_object()?;

    let mut matched = 0u32;
    let mut mismatched = Vec::new();

    for (key, expected) in truth {
        let ok = fields
            .get(key)
            .map(|actual| normalize(actual) == normalize(expected))
            .unwrap_or(false);
        if ok {
            matched += 1;
        } else {
            mismatched.push(key.clone());
        }
    }

    let total = truth.len() as u32;
    Some(AccuracyReport {
        score: f64::from(matched) / f64::from(total),
        matched_fields: matched,
        total_fields: total,
        mismatched_fields: mismatched,
    })
}

/// Canonical string form of a JSON value for comparison.
fn normalize(value: &Value) -> String {
    let s = match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    };
    s.trim().to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn perfect_match_scores_one() {
        let report = score_accuracy(
            &json!({"name": "Acme Corp", "phone": "555-0100"}),
            &json!({"name": "Acme Corp", "phone": "555-0100"}),
        )
        .unwrap();
        assert_eq!(report.score, 1.0);
        assert_eq!(report.matched_fields, 2);
        assert!(report.mismatched_fields.is_empty());
    }

    #[test]
    fn comparison_is_case_insensitive_and_trimmed() {
        let report = score_accuracy(
            &json!({"name": "  ACME corp  "}),
            &json!({"name": "Acme Corp"}),
        )
        .unwrap();
        assert_eq!(report.score, 1.0);
    }

    #[test]
    fn missing_field_counts_as_mismatch() {
        let report = score_accuracy(
            &json!({"name": "Acme Corp"}),
            &json!({"name": "Acme Corp", "phone": "555-0100"}),
        )
        .unwrap();
        assert_eq!(report.matched_fields, 1);
        assert_eq!(report.total_fields, 2);
        assert_eq!(report.mismatched_fields, vec!["phone".to_string()]);
        assert!((report.score - 0.5).abs() < f64::EPSILON);
    }

    #[test]
    fn non_string_values_compare_by_canonical_form() {
        let report = score_accuracy(&json!({"count": 42}), &json!({"count": "42"})).unwrap();
        assert_eq!(report.score, 1.0);
    }

    #[test]
    fn empty_ground_truth_scores_nothing() {
        assert!(score_accuracy(&json!({"a": 1}), &json!({})).is_none());
    }

    #[test]
    fn non_object_inputs_score_nothing() {
        assert!(score_accuracy(&json!("text"), &json!({"a": 1})).is_none());
        assert!(score_accuracy(&json!({"a": 1}), &json!([1, 2])).is_none());
    }

    #[test]
    fn extra_extracted_fields_are_ignored() {
        let report = score_accuracy(
            &json!({"name": "Acme Corp", "bonus": "x"}),
            &json!({"name": "Acme Corp"}),
        )
        .unwrap();
        assert_eq!(report.score, 1.0);
        assert_eq!(report.total_fields, 1);
    }
}
