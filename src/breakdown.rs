//! Parsing helpers for uploaded mark sheets.

use std::sync::LazyLock;

use regex::Regex;

use crate::scoring::{compute_subject_score, map_risk, ComponentMarks, RiskLevel};

static NUMBER_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[0-9]+(?:\.[0-9]+)?").expect("number pattern"));

static PIN_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^\s*\d{2,}-[A-Za-z0-9]+-\d+\s*$").expect("pin pattern"));

/// What a semester breakdown cell held.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Breakdown {
    /// mid1, mid2, internal and end_sem, in that order.
    Components {
        mid1: f64,
        mid2: f64,
        internal: f64,
        end_sem: f64,
    },
    /// A lone number, read as the subject total.
    Total(f64),
}

impl Breakdown {
    fn from_four(nums: &[f64]) -> Option<Self> {
        match nums {
            [mid1, mid2, internal, end_sem, ..] => Some(Breakdown::Components {
                mid1: *mid1,
                mid2: *mid2,
                internal: *internal,
                end_sem: *end_sem,
            }),
            _ => None,
        }
    }

    /// Fills the exam components of `marks` that are still empty.
    pub fn fill(&self, marks: &mut ComponentMarks) {
        if let Breakdown::Components {
            mid1,
            mid2,
            internal,
            end_sem,
        } = *self
        {
            marks.mid1 = marks.mid1.or(Some(mid1));
            marks.mid2 = marks.mid2.or(Some(mid2));
            marks.internal = marks.internal.or(Some(internal));
            marks.end_sem = marks.end_sem.or(Some(end_sem));
        }
    }
}

/// Reads cells like `18+19+18+38`, `(18 + 19 + 18 + 38.5)` or `18/19/18/38`.
pub fn parse_breakdown_cell(cell: &str) -> Option<Breakdown> {
    let text = cell.trim();
    let compact: String = text
        .chars()
        .filter(|c| !matches!(c, '(' | ')' | ' '))
        .collect();

    if compact.contains(['+', '/']) {
        let parsed: Result<Vec<f64>, _> = compact.split(['+', '/']).map(str::parse).collect();
        if let Ok(nums) = parsed {
            if nums.len() == 4 {
                return Breakdown::from_four(&nums);
            }
        }
    }

    let nums = extract_numbers(text);
    if nums.len() >= 4 {
        return Breakdown::from_four(&nums);
    }
    nums.first().map(|total| Breakdown::Total(*total))
}

/// Unsigned decimal numbers in order of appearance, e.g. `"a 12.5 b 3"` -> `[12.5, 3.0]`.
fn extract_numbers(text: &str) -> Vec<f64> {
    NUMBER_RE
        .find_iter(text)
        .filter_map(|m| m.as_str().parse().ok())
        .collect()
}

/// A mark row ready to store: merged components plus the values derived from them.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScoredMark {
    pub components: ComponentMarks,
    pub total: Option<f64>,
    pub subject_score: f64,
    pub risk: RiskLevel,
}

/// Merges an uploaded row into what is already stored for the same subject.
///
/// Explicit component columns win over the breakdown cell, and both win over
/// stored values, so a mid1 sheet never erases end-semester marks.
pub fn score_upload(
    uploaded: ComponentMarks,
    breakdown: Option<&str>,
    existing: Option<ComponentMarks>,
) -> ScoredMark {
    let mut components = uploaded;
    let mut parsed_total = None;

    match breakdown.and_then(parse_breakdown_cell) {
        Some(Breakdown::Total(total)) => parsed_total = Some(total),
        Some(parts) => parts.fill(&mut components),
        None => {}
    }

    if let Some(existing) = existing {
        components.attendance = components.attendance.or(existing.attendance);
        components.mid1 = components.mid1.or(existing.mid1);
        components.mid2 = components.mid2.or(existing.mid2);
        components.internal = components.internal.or(existing.internal);
        components.end_sem = components.end_sem.or(existing.end_sem);
    }

    let exam_parts = [
        components.mid1,
        components.mid2,
        components.internal,
        components.end_sem,
    ];
    let total = if exam_parts.iter().any(Option::is_some) {
        Some(exam_parts.iter().flatten().sum::<f64>())
    } else {
        parsed_total
    };

    let subject_score = compute_subject_score(&components, None);
    ScoredMark {
        components,
        total,
        subject_score,
        risk: map_risk(subject_score),
    }
}

/// Accepts PINs shaped like `23189-CS-001`, rejecting fragments such as `189`.
pub fn is_pin_valid(pin: &str) -> bool {
    let pin = pin.trim();
    if pin.is_empty() {
        return false;
    }
    if PIN_RE.is_match(pin) {
        return true;
    }
    pin.chars().count() >= 7 && pin.contains('-') && pin.chars().any(|c| c.is_ascii_digit())
}

/// Spreadsheets often carry the college name as a first "student" row.
pub fn is_header_row(name: &str) -> bool {
    name.to_lowercase().contains("polytechnic")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn components(mid1: f64, mid2: f64, internal: f64, end_sem: f64) -> Breakdown {
        Breakdown::Components {
            mid1,
            mid2,
            internal,
            end_sem,
        }
    }

    #[test]
    fn parses_plus_separated_breakdown() {
        assert_eq!(
            parse_breakdown_cell("18+19+18+38"),
            Some(components(18.0, 19.0, 18.0, 38.0))
        );
        assert_eq!(
            parse_breakdown_cell("(18 + 19 + 18 + 38.5)"),
            Some(components(18.0, 19.0, 18.0, 38.5))
        );
        assert_eq!(
            parse_breakdown_cell("12/14/15/30"),
            Some(components(12.0, 14.0, 15.0, 30.0))
        );
    }

    #[test]
    fn falls_back_to_embedded_numbers() {
        assert_eq!(
            parse_breakdown_cell("M1 12, M2 14, Int 15, ES 30 (revised)"),
            Some(components(1.0, 12.0, 2.0, 14.0))
        );
        assert_eq!(
            parse_breakdown_cell("marks: 12 14 15 30"),
            Some(components(12.0, 14.0, 15.0, 30.0))
        );
    }

    #[test]
    fn single_number_is_a_total() {
        assert_eq!(parse_breakdown_cell("87"), Some(Breakdown::Total(87.0)));
        assert_eq!(parse_breakdown_cell("18+19"), Some(Breakdown::Total(18.0)));
        assert_eq!(parse_breakdown_cell("absent"), None);
        assert_eq!(parse_breakdown_cell(""), None);
    }

    #[test]
    fn malformed_separators_fall_back_to_embedded_numbers() {
        assert_eq!(
            parse_breakdown_cell("18++19+18+38"),
            Some(components(18.0, 19.0, 18.0, 38.0))
        );
        assert_eq!(
            parse_breakdown_cell("18 ＋ 19 ＋ 18 ＋ 38"),
            Some(components(18.0, 19.0, 18.0, 38.0))
        );
        assert_eq!(
            parse_breakdown_cell("18.+19+18+38.5."),
            Some(components(18.0, 19.0, 18.0, 38.5))
        );
    }

    #[test]
    fn fill_keeps_existing_components() {
        let mut marks = ComponentMarks {
            mid1: Some(10.0),
            ..ComponentMarks::default()
        };
        components(18.0, 19.0, 18.0, 38.0).fill(&mut marks);
        assert_eq!(marks.mid1, Some(10.0));
        assert_eq!(marks.mid2, Some(19.0));
        assert_eq!(marks.end_sem, Some(38.0));
        assert_eq!(marks.attendance, None);

        let mut empty = ComponentMarks::default();
        Breakdown::Total(80.0).fill(&mut empty);
        assert_eq!(empty, ComponentMarks::default());
    }

    #[test]
    fn pin_validation() {
        assert!(is_pin_valid("23189-CS-001"));
        assert!(is_pin_valid("  23189-cs-001 "));
        assert!(is_pin_valid("A23-CS-X1"));
        assert!(!is_pin_valid("189"));
        assert!(!is_pin_valid(""));
        assert!(!is_pin_valid("ABCDEFGH"));
    }

    #[test]
    fn college_name_rows_are_headers() {
        assert!(is_header_row("Govt. Polytechnic, Hyderabad"));
        assert!(!is_header_row("Kiara Patel"));
    }

    #[test]
    fn upload_merges_with_stored_marks() {
        let stored = ComponentMarks {
            attendance: Some(85.0),
            mid1: Some(15.0),
            ..ComponentMarks::default()
        };
        let uploaded = ComponentMarks {
            mid2: Some(18.0),
            ..ComponentMarks::default()
        };
        let scored = score_upload(uploaded, Some("99+17+16+38"), Some(stored));

        assert_eq!(scored.components.mid1, Some(99.0));
        assert_eq!(scored.components.mid2, Some(18.0));
        assert_eq!(scored.components.internal, Some(16.0));
        assert_eq!(scored.components.attendance, Some(85.0));
        assert_eq!(scored.total, Some(171.0));

        let scored = score_upload(uploaded, None, Some(stored));
        assert_eq!(scored.components.mid1, Some(15.0));
        assert_eq!(scored.total, Some(33.0));
    }

    #[test]
    fn upload_scores_full_sheet() {
        let scored = score_upload(
            ComponentMarks {
                attendance: Some(85.0),
                ..ComponentMarks::default()
            },
            Some("15+18+16+38"),
            None,
        );
        assert_eq!(scored.subject_score, 87.25);
        assert_eq!(scored.risk, RiskLevel::Low);
        assert_eq!(scored.total, Some(87.0));
    }

    #[test]
    fn upload_with_only_a_total() {
        let scored = score_upload(ComponentMarks::default(), Some("64"), None);
        assert_eq!(scored.total, Some(64.0));
        assert_eq!(scored.subject_score, 0.0);
        assert_eq!(scored.risk, RiskLevel::High);
    }
}
