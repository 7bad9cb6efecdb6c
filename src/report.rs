use std::fmt::Write;

use crate::models::{MarkRecord, StudentRecord};
use crate::results::{self, StudentSemester};
use crate::scoring::{generate_feedback, RiskLevel};

pub fn build_report(
    batch: Option<&str>,
    semester: i32,
    students: &[StudentRecord],
    marks: &[MarkRecord],
) -> String {
    let overview = results::batch_overview(students, marks, semester);
    let averages = results::subject_averages(marks, semester);

    let mut scored: Vec<(&StudentRecord, StudentSemester)> = students
        .iter()
        .filter(|student| results::is_listable(student))
        .map(|student| {
            let summary = results::score_semester(
                marks
                    .iter()
                    .filter(|mark| mark.student_id == student.id && mark.semester == semester),
            );
            (student, summary)
        })
        .collect();
    scored.sort_by(|a, b| {
        let a = a.1.overall.unwrap_or(f64::MAX);
        let b = b.1.overall.unwrap_or(f64::MAX);
        a.partial_cmp(&b).unwrap_or(std::cmp::Ordering::Equal)
    });

    let mut output = String::new();
    let batch_label = batch.unwrap_or("all batches");

    let _ = writeln!(output, "# Semester Results Report");
    let _ = writeln!(
        output,
        "Generated for {} (semester {}, {} students)",
        batch_label, semester, overview.total_students
    );
    let _ = writeln!(output);
    let _ = writeln!(output, "## Risk Mix");

    let counts = &overview.risk_counts;
    let _ = writeln!(output, "- low: {}", counts.low);
    let _ = writeln!(output, "- medium: {}", counts.medium);
    let _ = writeln!(output, "- high: {}", counts.high);
    let _ = writeln!(output, "- unknown: {}", counts.unknown);
    match overview.avg_class_performance {
        Some(avg) => {
            let _ = writeln!(output, "Class average {:.2}", avg);
        }
        None => {
            let _ = writeln!(output, "No subject scores recorded for this semester.");
        }
    }
    if let Some(attendance) = overview.avg_attendance {
        let _ = writeln!(output, "Average attendance {:.1}%", attendance);
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Subject Averages");

    if averages.is_empty() {
        let _ = writeln!(output, "No subject totals recorded for this semester.");
    } else {
        for average in averages.iter() {
            let _ = writeln!(
                output,
                "- {} ({}): {:.2} across {} students",
                average.sub_name, average.sub_code, average.average, average.count_students
            );
        }
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Lowest Scoring Students");

    let ranked: Vec<_> = scored
        .iter()
        .filter(|(_, summary)| summary.overall.is_some())
        .collect();
    if ranked.is_empty() {
        let _ = writeln!(output, "No students with scores this semester.");
    } else {
        for (student, summary) in ranked.iter().take(10) {
            let _ = writeln!(
                output,
                "- {} ({}) overall {:.2} [{}] across {} subjects",
                student.name,
                student.pin,
                summary.overall.unwrap_or_default(),
                summary.risk().map_or("unknown", |risk| risk.as_str()),
                summary.details.len()
            );
        }
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## High Risk Feedback");

    let high_risk: Vec<_> = scored
        .iter()
        .filter(|(_, summary)| summary.risk() == Some(RiskLevel::High))
        .collect();
    if high_risk.is_empty() {
        let _ = writeln!(output, "No high risk students this semester.");
    } else {
        for (student, summary) in high_risk {
            let feedback = generate_feedback(
                &student.name,
                summary.overall,
                &summary.weak_subjects(),
                summary.attendance,
            );
            let _ = writeln!(output, "- {}: {}", student.pin, feedback);
        }
    }

    output
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scoring::ComponentMarks;
    use uuid::Uuid;

    fn student(pin: &str, name: &str) -> StudentRecord {
        StudentRecord {
            id: Uuid::new_v4(),
            pin: pin.to_string(),
            name: name.to_string(),
            branch: "CS".to_string(),
            exam_year: 2024,
        }
    }

    fn mark(student: &StudentRecord, score: f64) -> MarkRecord {
        MarkRecord {
            student_id: student.id,
            sub_code: "CS-401".to_string(),
            sub_name: Some("Maths IV".to_string()),
            semester: 4,
            year: 2024,
            components: ComponentMarks::default(),
            total: Some(score),
            subject_score: Some(score),
            risk: None,
        }
    }

    #[test]
    fn report_lists_sections_and_high_risk_feedback() {
        let avery = student("23189-CS-001", "Avery Lee");
        let kiara = student("23189-CS-003", "Kiara Patel");
        let marks = vec![mark(&avery, 88.0), mark(&kiara, 32.0)];

        let report = build_report(Some("CS 2024"), 4, &[avery, kiara], &marks);
        assert!(report.contains("Generated for CS 2024 (semester 4, 2 students)"));
        assert!(report.contains("- high: 1"));
        assert!(report.contains("- Maths IV (CS-401): 60.00 across 2 students"));

        let lowest = report.find("Kiara Patel (23189-CS-003) overall 32.00 [high]");
        let highest = report.find("Avery Lee (23189-CS-001) overall 88.00 [low]");
        assert!(lowest.is_some() && highest.is_some());
        assert!(lowest < highest);

        assert!(report.contains("- 23189-CS-003: 🔴 Kiara Patel is at high risk"));
        assert!(report.contains("Weak in: Maths IV."));
    }

    #[test]
    fn empty_batch_report() {
        let report = build_report(None, 2, &[], &[]);
        assert!(report.contains("Generated for all batches"));
        assert!(report.contains("No subject scores recorded for this semester."));
        assert!(report.contains("No students with scores this semester."));
        assert!(report.contains("No high risk students this semester."));
    }
}
