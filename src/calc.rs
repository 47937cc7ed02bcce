use serde::{Deserialize, Serialize};

pub const DEFAULT_PASS_THRESHOLD: f64 = 60.0;

/// Percent weights of the four grade-book components. Valid weights sum to 100.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Weights {
    pub attendance: i64,
    pub midterm: i64,
    #[serde(rename = "final")]
    pub final_exam: i64,
    pub homework: i64,
}

impl Default for Weights {
    fn default() -> Self {
        Self {
            attendance: 10,
            midterm: 30,
            final_exam: 40,
            homework: 20,
        }
    }
}

impl Weights {
    pub fn total(&self) -> i64 {
        self.attendance + self.midterm + self.final_exam + self.homework
    }

    pub fn validate(&self) -> Result<(), String> {
        for (name, w) in [
            ("attendance", self.attendance),
            ("midterm", self.midterm),
            ("final", self.final_exam),
            ("homework", self.homework),
        ] {
            if !(0..=100).contains(&w) {
                return Err(format!("{name} weight must be in 0..=100"));
            }
        }
        if self.total() != 100 {
            return Err(format!("weights must sum to 100, got {}", self.total()));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Components {
    pub attendance: Option<f64>,
    pub midterm: Option<f64>,
    pub final_exam: Option<f64>,
    pub homework: Option<f64>,
}

impl Components {
    pub fn any_entered(&self) -> bool {
        [self.attendance, self.midterm, self.final_exam, self.homework]
            .iter()
            .any(|c| c.map(|v| v > 0.0).unwrap_or(false))
    }
}

pub fn validate_component(name: &str, v: f64) -> Result<(), String> {
    if !v.is_finite() || !(0.0..=100.0).contains(&v) {
        return Err(format!("{name} must be in 0..=100"));
    }
    Ok(())
}

/// Round half up, as the grade book has always displayed totals.
pub fn round_half_up(x: f64) -> i64 {
    (x + 0.5).floor() as i64
}

pub fn round_to(x: f64, places: i32) -> f64 {
    let f = 10f64.powi(places);
    (x * f).round() / f
}

/// Missing components count as zero.
pub fn final_grade(c: &Components, w: &Weights) -> i64 {
    let sum = c.attendance.unwrap_or(0.0) * w.attendance as f64 / 100.0
        + c.midterm.unwrap_or(0.0) * w.midterm as f64 / 100.0
        + c.final_exam.unwrap_or(0.0) * w.final_exam as f64 / 100.0
        + c.homework.unwrap_or(0.0) * w.homework as f64 / 100.0;
    round_half_up(sum)
}

pub fn grade_level(score: i64) -> &'static str {
    match score {
        s if s >= 90 => "A",
        s if s >= 80 => "B",
        s if s >= 70 => "C",
        s if s >= 60 => "D",
        _ => "F",
    }
}

pub fn grade_class(score: Option<f64>) -> Option<&'static str> {
    let s = score?;
    Some(if s >= 90.0 {
        "excellent"
    } else if s >= 75.0 {
        "good"
    } else if s >= 60.0 {
        "pass"
    } else {
        "fail"
    })
}

/// Four-point scale: 60 maps to 1.0, 90 and above to 4.0, failing totals to 0.
pub fn gpa(total: i64) -> f64 {
    if total < 60 {
        return 0.0;
    }
    round_to(((total as f64 - 50.0) / 10.0).min(4.0), 1)
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GradeSummary {
    pub count: usize,
    pub average: Option<f64>,
    pub max: Option<i64>,
    pub min: Option<i64>,
    pub pass_count: usize,
    pub pass_rate: Option<f64>,
}

pub fn summary(finals: &[i64], pass_threshold: f64) -> GradeSummary {
    if finals.is_empty() {
        return GradeSummary::default();
    }
    let n = finals.len();
    let sum: i64 = finals.iter().sum();
    let pass_count = finals
        .iter()
        .filter(|g| **g as f64 >= pass_threshold)
        .count();
    GradeSummary {
        count: n,
        average: Some(round_to(sum as f64 / n as f64, 1)),
        max: finals.iter().copied().max(),
        min: finals.iter().copied().min(),
        pass_count,
        pass_rate: Some(round_to(pass_count as f64 * 100.0 / n as f64, 1)),
    }
}

/// Percent of rows with at least one component entered.
pub fn entry_progress(rows: &[Components]) -> i64 {
    if rows.is_empty() {
        return 0;
    }
    let done = rows.iter().filter(|c| c.any_entered()).count();
    round_half_up(done as f64 * 100.0 / rows.len() as f64)
}

#[derive(Debug, Clone, Copy)]
pub struct CreditItem {
    pub credits: f64,
    pub gpa: Option<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreditSummary {
    pub total_credits: f64,
    pub average_gpa: f64,
}

/// Only items with a gpa contribute credits.
pub fn credit_weighted_gpa(items: &[CreditItem]) -> CreditSummary {
    let mut credits = 0.0;
    let mut points = 0.0;
    for it in items {
        let Some(g) = it.gpa else { continue };
        credits += it.credits;
        points += g * it.credits;
    }
    CreditSummary {
        total_credits: credits,
        average_gpa: if credits > 0.0 {
            round_to(points / credits, 2)
        } else {
            0.0
        },
    }
}

#[derive(Debug, Clone, Copy)]
pub struct DetailItem {
    pub weight: f64,
    pub score: Option<f64>,
}

/// Weighted mean of breakdown items; unscored items count as zero.
pub fn detail_weighted_total(items: &[DetailItem]) -> Option<f64> {
    let total_weight: f64 = items.iter().map(|d| d.weight).sum();
    if total_weight <= 0.0 {
        return None;
    }
    let sum: f64 = items
        .iter()
        .map(|d| d.score.unwrap_or(0.0) * d.weight)
        .sum();
    Some(round_to(sum / total_weight, 1))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn comps(a: f64, m: f64, f: f64, h: f64) -> Components {
        Components {
            attendance: Some(a),
            midterm: Some(m),
            final_exam: Some(f),
            homework: Some(h),
        }
    }

    #[test]
    fn default_weights_are_valid() {
        let w = Weights::default();
        assert_eq!(w.total(), 100);
        assert!(w.validate().is_ok());
    }

    #[test]
    fn weights_must_sum_to_hundred() {
        let w = Weights {
            attendance: 10,
            midterm: 30,
            final_exam: 40,
            homework: 10,
        };
        assert!(w.validate().is_err());
        let w = Weights {
            attendance: -10,
            midterm: 30,
            final_exam: 40,
            homework: 40,
        };
        assert!(w.validate().is_err());
    }

    #[test]
    fn final_grade_rounds_half_up() {
        let w = Weights::default();
        // 9.5 + 24.6 + 36 + 17.6 = 87.7
        assert_eq!(final_grade(&comps(95.0, 82.0, 90.0, 88.0), &w), 88);
        // 9 + 24 + 30 + 17.5 = 80.5
        assert_eq!(final_grade(&comps(90.0, 80.0, 75.0, 87.5), &w), 81);
        assert_eq!(final_grade(&Components::default(), &w), 0);
    }

    #[test]
    fn levels_and_classes() {
        assert_eq!(grade_level(90), "A");
        assert_eq!(grade_level(89), "B");
        assert_eq!(grade_level(70), "C");
        assert_eq!(grade_level(60), "D");
        assert_eq!(grade_level(59), "F");
        assert_eq!(grade_class(Some(75.0)), Some("good"));
        assert_eq!(grade_class(Some(74.0)), Some("pass"));
        assert_eq!(grade_class(Some(10.0)), Some("fail"));
        assert_eq!(grade_class(None), None);
    }

    #[test]
    fn gpa_scale() {
        assert_eq!(gpa(88), 3.8);
        assert_eq!(gpa(60), 1.0);
        assert_eq!(gpa(97), 4.0);
        assert_eq!(gpa(59), 0.0);
    }

    #[test]
    fn summary_stats() {
        let s = summary(&[88, 55, 72], DEFAULT_PASS_THRESHOLD);
        assert_eq!(s.count, 3);
        assert_eq!(s.average, Some(71.7));
        assert_eq!(s.max, Some(88));
        assert_eq!(s.min, Some(55));
        assert_eq!(s.pass_count, 2);
        assert_eq!(s.pass_rate, Some(66.7));
        assert_eq!(summary(&[], DEFAULT_PASS_THRESHOLD), GradeSummary::default());
    }

    #[test]
    fn progress_counts_rows_with_any_entry() {
        let rows = [
            comps(0.0, 0.0, 0.0, 0.0),
            comps(0.0, 0.0, 50.0, 0.0),
            Components::default(),
        ];
        assert_eq!(entry_progress(&rows), 33);
        assert_eq!(entry_progress(&[]), 0);
    }

    #[test]
    fn credit_weighting_skips_missing_gpa() {
        let s = credit_weighted_gpa(&[
            CreditItem {
                credits: 4.0,
                gpa: Some(3.8),
            },
            CreditItem {
                credits: 2.0,
                gpa: Some(3.0),
            },
            CreditItem {
                credits: 3.0,
                gpa: None,
            },
        ]);
        assert_eq!(s.total_credits, 6.0);
        assert_eq!(s.average_gpa, 3.53);
    }

    #[test]
    fn detail_total_is_weight_normalized() {
        let items = [
            DetailItem {
                weight: 10.0,
                score: Some(95.0),
            },
            DetailItem {
                weight: 40.0,
                score: Some(90.0),
            },
        ];
        assert_eq!(detail_weighted_total(&items), Some(91.0));
        assert_eq!(detail_weighted_total(&[]), None);
    }
}
