use proptest::prelude::*;
use sdk::errors::{AssessmentError, AssessmentErrorExt};
use sdk::types::{Completeness, DimensionResult, Report, ScoreLevel, MAX_SCORE, MIN_SCORE};

fn result(id: u8, score: u32) -> DimensionResult {
    DimensionResult {
        dimension_id: id,
        name: format!("dimension {}", id),
        score,
        level: ScoreLevel::from_score(score),
        rationale: "scripted".to_string(),
        rounds_used: 3,
        failed_rounds: 0,
        low_confidence: false,
        clamped: false,
        evidence: Vec::new(),
        confidence: Some(0.8),
    }
}

// Hints are static and never echo the error payload back to the user
proptest! {
    #[test]
    fn test_error_user_hint_completeness(detail in "\\PC{8,40}") {
        let errs = vec![
            AssessmentError::Config(detail.clone()),
            AssessmentError::Persistence(detail.clone()),
            AssessmentError::Persona(detail.clone()),
            AssessmentError::GenerationFailure(detail.clone()),
            AssessmentError::DiagnosisUnavailable(detail.clone()),
            AssessmentError::SessionClosed(detail.clone()),
            AssessmentError::SessionAborted(detail.clone()),
            AssessmentError::GenerationExhausted { attempts: 3, last_error: detail.clone() },
        ];

        for err in errs {
            let hint = err.user_hint();
            prop_assert!(!hint.is_empty());
            prop_assert!(!hint.contains(detail.as_str()));
        }
    }
}

// Aggregate and average always follow the per-dimension scores
proptest! {
    #[test]
    fn test_report_aggregate_is_sum(scores in prop::collection::vec(MIN_SCORE..=MAX_SCORE, 7)) {
        let results: Vec<_> = scores
            .iter()
            .enumerate()
            .map(|(i, s)| result(i as u8 + 1, *s))
            .collect();
        let report = Report::new("s", "U1", results, Completeness::Complete, chrono::Utc::now());

        let expected: u32 = scores.iter().sum();
        prop_assert_eq!(report.aggregate_score, expected);
        prop_assert!((70..=420).contains(&report.aggregate_score));
        prop_assert!((report.average_score - expected as f64 / 7.0).abs() <= 0.05);
        prop_assert_eq!(report.overall_level, Some(ScoreLevel::from_aggregate(expected)));
    }

    #[test]
    fn test_score_level_is_monotone(a in MIN_SCORE..=MAX_SCORE, b in MIN_SCORE..=MAX_SCORE) {
        let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
        prop_assert!(ScoreLevel::from_score(lo) <= ScoreLevel::from_score(hi));
    }
}
