use crate::models::{CheckResult, Grade, RunSummary};

/// Running score of one pipeline run.
#[derive(Debug, Clone, Default)]
pub struct ScoreAccumulator {
    total: u32,
    max: u32,
}

impl ScoreAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, result: &CheckResult) {
        self.total += result.score;
        self.max += result.max_score;
    }

    pub fn summary(&self) -> RunSummary {
        let percentage = if self.max > 0 {
            f64::from(self.total) / f64::from(self.max) * 100.0
        } else {
            0.0
        };
        let percentage = (percentage * 100.0).round() / 100.0;
        RunSummary {
            total: self.total,
            max: self.max,
            percentage,
            grade: Grade::from_percentage(percentage),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::ScoreAccumulator;
    use crate::formatter::format_result;
    use crate::models::Grade;
    use serde_json::json;

    #[test]
    fn grade_boundaries_are_inclusive_lower_bounds() {
        assert_eq!(Grade::from_percentage(92.0), Grade::A);
        assert_eq!(Grade::from_percentage(90.0), Grade::A);
        assert_eq!(Grade::from_percentage(85.0), Grade::B);
        assert_eq!(Grade::from_percentage(80.0), Grade::B);
        assert_eq!(Grade::from_percentage(71.0), Grade::C);
        assert_eq!(Grade::from_percentage(70.0), Grade::C);
        assert_eq!(Grade::from_percentage(69.0), Grade::D);
    }

    #[test]
    fn empty_run_has_zero_percentage() {
        let summary = ScoreAccumulator::new().summary();
        assert_eq!(summary.total, 0);
        assert_eq!(summary.max, 0);
        assert_eq!(summary.percentage, 0.0);
        assert_eq!(summary.grade, Grade::D);
    }

    #[test]
    fn percentage_is_rounded_to_two_decimals() {
        let mut scores = ScoreAccumulator::new();
        scores.add(&format_result("a", "A-1", "a", json!({"status": true}), 5));
        scores.add(&format_result("a", "A-2", "a", json!({"status": false}), 5));
        scores.add(&format_result("a", "A-3", "a", json!({"status": "x"}), 5));
        let summary = scores.summary();
        assert_eq!(summary.total, 5);
        assert_eq!(summary.max, 15);
        assert_eq!(summary.percentage, 33.33);
        assert!(summary.total <= summary.max);
    }
}
