use serde::{Deserialize, Serialize};

/// Raw marks for one subject in one semester. Any component may still be ungraded.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ComponentMarks {
    pub attendance: Option<f64>,
    pub mid1: Option<f64>,
    pub mid2: Option<f64>,
    pub internal: Option<f64>,
    pub end_sem: Option<f64>,
}

/// Share of the subject score carried by each component. Sums to 1.0.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Weights {
    pub attendance: f64,
    pub mid1: f64,
    pub mid2: f64,
    pub internal: f64,
    pub end_sem: f64,
}

pub const DEFAULT_WEIGHTS: Weights = Weights {
    attendance: 0.10,
    mid1: 0.15,
    mid2: 0.15,
    internal: 0.20,
    end_sem: 0.40,
};

impl Default for Weights {
    fn default() -> Self {
        DEFAULT_WEIGHTS
    }
}

pub const ATTENDANCE_MAX: f64 = 100.0;
pub const MID_MAX: f64 = 20.0;
pub const INTERNAL_MAX: f64 = 20.0;
pub const END_SEM_MAX: f64 = 40.0;

pub const PASS_MARK: f64 = 40.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
}

impl RiskLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            RiskLevel::Low => "low",
            RiskLevel::Medium => "medium",
            RiskLevel::High => "high",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "low" => Some(RiskLevel::Low),
            "medium" => Some(RiskLevel::Medium),
            "high" => Some(RiskLevel::High),
            _ => None,
        }
    }
}

impl std::fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Verdict {
    Pass,
    Fail,
}

impl Verdict {
    pub fn as_str(&self) -> &'static str {
        match self {
            Verdict::Pass => "pass",
            Verdict::Fail => "fail",
        }
    }
}

/// Rounds to 2 decimals from the exact binary value, ties to even.
pub fn round2(value: f64) -> f64 {
    format!("{value:.2}").parse().unwrap_or(value)
}

fn percent(raw: Option<f64>, max_value: f64) -> Option<f64> {
    raw.map(|value| value / max_value * 100.0)
}

/// Weighted 0-100 score for a subject.
///
/// Missing attendance has its weight spread over the other components in
/// proportion to their own weights. Any other missing component drops out and
/// the remaining sum is rescaled by the weight actually used. No data at all
/// scores 0.0.
pub fn compute_subject_score(components: &ComponentMarks, weights: Option<&Weights>) -> f64 {
    let weights = weights.copied().unwrap_or_default();

    let mut used = [
        (percent(components.attendance, ATTENDANCE_MAX), weights.attendance),
        (percent(components.mid1, MID_MAX), weights.mid1),
        (percent(components.mid2, MID_MAX), weights.mid2),
        (percent(components.internal, INTERNAL_MAX), weights.internal),
        (percent(components.end_sem, END_SEM_MAX), weights.end_sem),
    ];

    if components.attendance.is_none() {
        let attendance_weight = weights.attendance;
        used[0].1 = 0.0;
        let total_other: f64 = used[1..].iter().map(|(_, weight)| weight).sum();
        if total_other > 0.0 {
            for (_, weight) in used[1..].iter_mut() {
                *weight += *weight / total_other * attendance_weight;
            }
        }
    }

    let mut score = 0.0;
    let mut weight_used = 0.0;
    for (pct, weight) in used {
        if let Some(pct) = pct {
            score += weight * pct;
            weight_used += weight;
        }
    }

    if weight_used > 0.0 && (weight_used - 1.0).abs() > 1e-6 {
        score /= weight_used;
    }

    round2(score)
}

/// Mean of the subject scores, 0.0 when there are none. Check emptiness
/// before treating the result as a real score.
pub fn compute_overall_score(subject_scores: &[f64]) -> f64 {
    if subject_scores.is_empty() {
        return 0.0;
    }
    round2(subject_scores.iter().sum::<f64>() / subject_scores.len() as f64)
}

pub fn map_risk(overall_score: f64) -> RiskLevel {
    if overall_score >= 70.0 {
        RiskLevel::Low
    } else if overall_score >= 50.0 {
        RiskLevel::Medium
    } else {
        RiskLevel::High
    }
}

pub fn compute_grade_and_result(score: Option<f64>) -> (&'static str, Verdict) {
    let Some(score) = score else {
        return ("N/A", Verdict::Fail);
    };

    let grade = match score {
        s if s >= 90.0 => "A+",
        s if s >= 80.0 => "A",
        s if s >= 70.0 => "B",
        s if s >= 60.0 => "C",
        s if s >= 50.0 => "D",
        _ => "F",
    };
    let verdict = if score >= PASS_MARK {
        Verdict::Pass
    } else {
        Verdict::Fail
    };

    (grade, verdict)
}

pub fn generate_feedback(
    student_name: &str,
    overall_score: Option<f64>,
    weak_subjects: &[String],
    attendance: Option<f64>,
) -> String {
    let mut parts: Vec<String> = Vec::new();

    match overall_score {
        None => parts.push("❌ No exam data is available yet for this student.".to_string()),
        Some(score) if score >= 75.0 => parts.push(format!(
            "✅ Excellent performance, {student_name} is doing really well overall."
        )),
        Some(score) if score >= 60.0 => parts.push(format!(
            "⚠️ {student_name} is performing moderately, but there is scope for improvement."
        )),
        Some(_) => parts.push(format!(
            "🔴 {student_name} is at high risk and needs urgent academic support."
        )),
    }

    if !weak_subjects.is_empty() {
        parts.push(format!(
            "⚠️ Weak in: {}. Needs extra practice here.",
            weak_subjects.join(", ")
        ));
    }

    if let Some(attendance) = attendance {
        let line = if attendance >= 75.0 {
            "✅ Good attendance record."
        } else if attendance >= 60.0 {
            "⚠️ Attendance is moderate; better consistency is required."
        } else {
            "🔴 Poor attendance; must improve class participation."
        };
        parts.push(line.to_string());
    }

    parts.join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn full_marks() -> ComponentMarks {
        ComponentMarks {
            attendance: Some(85.0),
            mid1: Some(15.0),
            mid2: Some(18.0),
            internal: Some(16.0),
            end_sem: Some(38.0),
        }
    }

    #[test]
    fn full_components_use_direct_weighted_sum() {
        let score = compute_subject_score(&full_marks(), None);
        assert!((score - 87.25).abs() < 1e-9);
        assert_eq!(map_risk(score), RiskLevel::Low);

        let (grade, verdict) = compute_grade_and_result(Some(score));
        assert_eq!(grade, "A");
        assert_eq!(verdict, Verdict::Pass);
    }

    #[test]
    fn missing_attendance_is_absorbed_by_other_components() {
        let marks = ComponentMarks {
            attendance: None,
            ..full_marks()
        };
        // (11.25 + 13.5 + 16 + 38) / 0.9
        let score = compute_subject_score(&marks, None);
        assert!((score - 87.5).abs() < 1e-9);
    }

    #[test]
    fn missing_exam_component_rescales_by_weight_used() {
        let marks = ComponentMarks {
            end_sem: None,
            ..full_marks()
        };
        // (8.5 + 11.25 + 13.5 + 16) / 0.6
        let score = compute_subject_score(&marks, None);
        assert!((score - 82.08).abs() < 1e-9);
    }

    #[test]
    fn empty_components_score_zero() {
        assert_eq!(compute_subject_score(&ComponentMarks::default(), None), 0.0);
    }

    #[test]
    fn subject_score_is_deterministic() {
        let marks = full_marks();
        let weights = Weights::default();
        assert_eq!(
            compute_subject_score(&marks, Some(&weights)),
            compute_subject_score(&marks, Some(&weights))
        );
    }

    #[test]
    fn custom_weights_override_defaults() {
        let weights = Weights {
            attendance: 0.0,
            mid1: 0.0,
            mid2: 0.0,
            internal: 0.0,
            end_sem: 1.0,
        };
        let score = compute_subject_score(&full_marks(), Some(&weights));
        assert!((score - 95.0).abs() < 1e-9);
    }

    #[test]
    fn raising_one_component_never_lowers_score() {
        let base = full_marks();
        let bump = |marks: &ComponentMarks, field: usize, value: f64| {
            let mut marks = *marks;
            match field {
                0 => marks.attendance = Some(value),
                1 => marks.mid1 = Some(value),
                2 => marks.mid2 = Some(value),
                3 => marks.internal = Some(value),
                _ => marks.end_sem = Some(value),
            }
            marks
        };

        for field in 0..5 {
            let mut previous = f64::MIN;
            for step in 0..=20 {
                let score = compute_subject_score(&bump(&base, field, step as f64), None);
                assert!(score >= previous, "field {field} step {step}");
                previous = score;
            }
        }
    }

    #[test]
    fn overall_score_is_rounded_mean() {
        let overall = compute_overall_score(&[87.25, 60.0, 45.0]);
        assert!((overall - 64.08).abs() < 1e-9);
        assert_eq!(map_risk(overall), RiskLevel::Medium);
    }

    #[test]
    fn rounding_follows_the_stored_binary_value() {
        assert_eq!(compute_overall_score(&[0.12, 0.13]), 0.12);
        assert_eq!(compute_overall_score(&[0.08, 0.09]), 0.08);
        assert_eq!(compute_overall_score(&[100.0, 100.01]), 100.0);
        assert_eq!(round2(2.675), 2.67);
        assert_eq!(round2(-1.005), -1.0);
    }

    #[test]
    fn empty_overall_is_zero_and_callers_check_emptiness() {
        let scores: Vec<f64> = Vec::new();
        let overall = (!scores.is_empty()).then(|| compute_overall_score(&scores));
        assert_eq!(overall, None);
        assert_eq!(compute_overall_score(&scores), 0.0);
        assert_eq!(compute_overall_score(&[0.0, 0.0]), 0.0);
    }

    #[test]
    fn risk_thresholds() {
        assert_eq!(map_risk(70.0), RiskLevel::Low);
        assert_eq!(map_risk(69.99), RiskLevel::Medium);
        assert_eq!(map_risk(50.0), RiskLevel::Medium);
        assert_eq!(map_risk(49.99), RiskLevel::High);
    }

    #[test]
    fn grade_thresholds() {
        assert_eq!(compute_grade_and_result(Some(90.0)).0, "A+");
        assert_eq!(compute_grade_and_result(Some(89.99)).0, "A");
        assert_eq!(compute_grade_and_result(Some(72.0)).0, "B");
        assert_eq!(compute_grade_and_result(Some(61.0)).0, "C");
        assert_eq!(compute_grade_and_result(Some(50.0)).0, "D");
        assert_eq!(compute_grade_and_result(Some(12.0)).0, "F");
        assert_eq!(compute_grade_and_result(Some(40.0)).1, Verdict::Pass);
        assert_eq!(compute_grade_and_result(Some(39.99)).1, Verdict::Fail);
        assert_eq!(compute_grade_and_result(None), ("N/A", Verdict::Fail));
    }

    #[test]
    fn feedback_combines_tiers() {
        let weak = vec!["Maths IV".to_string(), "Physics".to_string()];
        let feedback = generate_feedback("Asha", Some(55.0), &weak, Some(58.0));
        assert!(feedback.starts_with("🔴 Asha is at high risk"));
        assert!(feedback.contains("Weak in: Maths IV, Physics."));
        assert!(feedback.ends_with("Poor attendance; must improve class participation."));
    }

    #[test]
    fn feedback_without_data() {
        let feedback = generate_feedback("Asha", None, &[], None);
        assert_eq!(feedback, "❌ No exam data is available yet for this student.");

        let feedback = generate_feedback("Asha", Some(80.0), &[], Some(90.0));
        assert_eq!(
            feedback,
            "✅ Excellent performance, Asha is doing really well overall. ✅ Good attendance record."
        );

        let feedback = generate_feedback("Asha", Some(65.0), &[], Some(70.0));
        assert!(feedback.contains("performing moderately"));
        assert!(feedback.contains("Attendance is moderate"));
    }

    #[test]
    fn risk_labels_round_trip_through_text() {
        assert_eq!(RiskLevel::parse(" HIGH "), Some(RiskLevel::High));
        assert_eq!(RiskLevel::parse("unknown"), None);
        assert_eq!(RiskLevel::Medium.to_string(), "medium");
    }
}
