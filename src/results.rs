use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap};

use clap::ValueEnum;
use uuid::Uuid;

use crate::breakdown::{is_header_row, is_pin_valid};
use crate::models::{
    BatchListing, BatchOverview, BatchRow, MarkRecord, RiskCounts, RiskDistribution,
    RiskPercentages, SemesterSummary, StudentRecord, SubjectAverage, SubjectDetail,
};
use crate::scoring::{
    self, compute_grade_and_result, compute_overall_score, map_risk, round2, RiskLevel,
};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum SortKey {
    #[default]
    Pin,
    Name,
    Risk,
    #[value(alias = "class_avg", alias = "class-avg")]
    Overall,
    Attendance,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum SortOrder {
    #[default]
    Asc,
    Desc,
}

#[derive(Debug, Clone)]
pub struct ListQuery {
    pub semester: Option<i32>,
    pub sort: SortKey,
    pub order: SortOrder,
    pub page: usize,
    pub per_page: usize,
}

impl Default for ListQuery {
    fn default() -> Self {
        Self {
            semester: None,
            sort: SortKey::Pin,
            order: SortOrder::Asc,
            page: 1,
            per_page: 50,
        }
    }
}

/// Scores for one student in one semester.
#[derive(Debug, Clone)]
pub struct StudentSemester {
    pub overall: Option<f64>,
    pub attendance: Option<f64>,
    pub details: Vec<SubjectDetail>,
}

impl StudentSemester {
    pub fn risk(&self) -> Option<RiskLevel> {
        self.overall.map(map_risk)
    }

    pub fn weak_subjects(&self) -> Vec<String> {
        self.details
            .iter()
            .filter(|detail| {
                detail
                    .subject_score
                    .is_some_and(|score| score < scoring::PASS_MARK)
            })
            .map(|detail| {
                if detail.sub_name.is_empty() {
                    detail.sub_code.clone()
                } else {
                    detail.sub_name.clone()
                }
            })
            .collect()
    }
}

/// The stored subject score, or one recomputed from the components.
pub fn subject_score_for(mark: &MarkRecord) -> f64 {
    mark.subject_score
        .unwrap_or_else(|| scoring::compute_subject_score(&mark.components, None))
}

pub fn subject_detail(mark: &MarkRecord) -> SubjectDetail {
    let score = subject_score_for(mark);
    let (grade, verdict) = compute_grade_and_result(Some(score));
    SubjectDetail {
        sub_code: mark.sub_code.clone(),
        sub_name: mark.sub_name.clone().unwrap_or_default(),
        year: mark.year,
        mid1: mark.components.mid1,
        mid2: mark.components.mid2,
        internal: mark.components.internal,
        end_sem: mark.components.end_sem,
        total: mark.total,
        attendance: mark.components.attendance,
        subject_score: Some(score),
        grade,
        result: verdict.as_str(),
        risk: mark.risk,
    }
}

fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        None
    } else {
        Some(values.iter().sum::<f64>() / values.len() as f64)
    }
}

pub fn score_semester<'a>(marks: impl IntoIterator<Item = &'a MarkRecord>) -> StudentSemester {
    let details: Vec<SubjectDetail> = marks.into_iter().map(subject_detail).collect();

    let scores: Vec<f64> = details.iter().filter_map(|d| d.subject_score).collect();
    let overall = (!scores.is_empty()).then(|| compute_overall_score(&scores));

    let attendances: Vec<f64> = details.iter().filter_map(|d| d.attendance).collect();

    StudentSemester {
        overall,
        attendance: mean(&attendances),
        details,
    }
}

pub fn semester_summary(
    student: &StudentRecord,
    semester: i32,
    marks: &[MarkRecord],
) -> SemesterSummary {
    let scored = score_semester(
        marks
            .iter()
            .filter(|mark| mark.student_id == student.id && mark.semester == semester),
    );
    let feedback = scoring::generate_feedback(
        &student.name,
        scored.overall,
        &scored.weak_subjects(),
        scored.attendance,
    );

    SemesterSummary {
        student: student.clone(),
        semester,
        overall_score: scored.overall,
        subject_count: scored.details.len(),
        attendance: scored.attendance,
        subjects: scored.details,
        feedback,
    }
}

/// Every mark of a student keyed by semester, ascending.
pub fn marks_by_semester(marks: &[MarkRecord]) -> BTreeMap<i32, Vec<SubjectDetail>> {
    let mut grouped: BTreeMap<i32, Vec<SubjectDetail>> = BTreeMap::new();
    for mark in marks {
        grouped.entry(mark.semester).or_default().push(subject_detail(mark));
    }
    grouped
}

fn group_by_student(marks: &[MarkRecord], semester: i32) -> HashMap<Uuid, Vec<&MarkRecord>> {
    let mut grouped: HashMap<Uuid, Vec<&MarkRecord>> = HashMap::new();
    for mark in marks.iter().filter(|mark| mark.semester == semester) {
        grouped.entry(mark.student_id).or_default().push(mark);
    }
    grouped
}

fn score_student(grouped: &HashMap<Uuid, Vec<&MarkRecord>>, student: &StudentRecord) -> StudentSemester {
    score_semester(grouped.get(&student.id).into_iter().flatten().copied())
}

/// Drops PIN fragments and the college-name row that mark sheets carry.
pub fn is_listable(student: &StudentRecord) -> bool {
    is_pin_valid(&student.pin) && !is_header_row(&student.name)
}

fn risk_rank(risk: Option<RiskLevel>) -> i8 {
    match risk {
        Some(RiskLevel::High) => 2,
        Some(RiskLevel::Medium) => 1,
        Some(RiskLevel::Low) => 0,
        None => -1,
    }
}

fn cmp_optional(a: Option<f64>, b: Option<f64>) -> Ordering {
    match (a, b) {
        (Some(a), Some(b)) => a.partial_cmp(&b).unwrap_or(Ordering::Equal),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

fn compare_rows(a: &BatchRow, b: &BatchRow, key: SortKey) -> Ordering {
    match key {
        SortKey::Pin => a.pin.cmp(&b.pin),
        SortKey::Name => a.name.to_lowercase().cmp(&b.name.to_lowercase()),
        SortKey::Risk => risk_rank(a.risk).cmp(&risk_rank(b.risk)),
        SortKey::Overall => cmp_optional(a.overall_score, b.overall_score),
        SortKey::Attendance => cmp_optional(a.attendance, b.attendance),
    }
}

pub fn batch_listing(
    students: &[StudentRecord],
    marks: &[MarkRecord],
    query: &ListQuery,
) -> BatchListing {
    let grouped = query
        .semester
        .map(|semester| group_by_student(marks, semester))
        .unwrap_or_default();

    let mut rows: Vec<BatchRow> = students
        .iter()
        .filter(|student| is_listable(student))
        .map(|student| {
            let scored = query.semester.map(|_| score_student(&grouped, student));
            BatchRow {
                pin: student.pin.clone(),
                name: student.name.clone(),
                branch: student.branch.clone(),
                exam_year: student.exam_year,
                attendance: scored.as_ref().and_then(|s| s.attendance),
                overall_score: scored.as_ref().and_then(|s| s.overall),
                subject_count: scored.as_ref().map_or(0, |s| s.details.len()),
                risk: scored.as_ref().and_then(StudentSemester::risk),
            }
        })
        .collect();

    rows.sort_by(|a, b| {
        let ordering = compare_rows(a, b, query.sort);
        match query.order {
            SortOrder::Asc => ordering,
            SortOrder::Desc => ordering.reverse(),
        }
    });

    let overalls: Vec<f64> = rows.iter().filter_map(|row| row.overall_score).collect();
    let class_average = mean(&overalls).map(round2);

    let page = query.page.max(1);
    let per_page = query.per_page.max(1);
    let total = rows.len();
    let items = rows
        .into_iter()
        .skip((page - 1).saturating_mul(per_page))
        .take(per_page)
        .collect();

    BatchListing {
        total,
        page,
        per_page,
        class_average,
        items,
    }
}

pub fn batch_overview(
    students: &[StudentRecord],
    marks: &[MarkRecord],
    semester: i32,
) -> BatchOverview {
    let grouped = group_by_student(marks, semester);
    let mut risk_counts = RiskCounts::default();
    let mut attendances = Vec::new();
    let mut overalls = Vec::new();

    for student in students.iter().filter(|student| is_pin_valid(&student.pin)) {
        let scored = score_student(&grouped, student);
        risk_counts.record(scored.risk());
        overalls.extend(scored.overall);
        attendances.extend(scored.attendance);
    }

    BatchOverview {
        total_students: students.len(),
        risk_counts,
        avg_attendance: mean(&attendances),
        avg_class_performance: mean(&overalls),
    }
}

fn share(count: usize, total: usize) -> f64 {
    if total == 0 {
        0.0
    } else {
        round2(count as f64 / total as f64 * 100.0)
    }
}

pub fn risk_distribution(
    branch: &str,
    year: Option<i32>,
    semester: i32,
    students: &[StudentRecord],
    marks: &[MarkRecord],
) -> RiskDistribution {
    let grouped = group_by_student(marks, semester);
    let mut counts = RiskCounts::default();
    for student in students {
        counts.record(score_student(&grouped, student).risk());
    }

    let total = counts.total();
    let percentages = RiskPercentages {
        low: share(counts.low, total),
        medium: share(counts.medium, total),
        high: share(counts.high, total),
        unknown: share(counts.unknown, total),
    };

    RiskDistribution {
        branch: branch.to_string(),
        year,
        semester,
        total_students: total,
        counts,
        percentages,
    }
}

/// Mean stored total per subject code, ordered by code.
pub fn subject_averages(marks: &[MarkRecord], semester: i32) -> Vec<SubjectAverage> {
    let mut totals: BTreeMap<&str, (f64, usize, Option<&str>)> = BTreeMap::new();

    for mark in marks.iter().filter(|mark| mark.semester == semester) {
        let Some(total) = mark.total else {
            continue;
        };
        let entry = totals
            .entry(mark.sub_code.as_str())
            .or_insert((0.0, 0, None));
        entry.0 += total;
        entry.1 += 1;
        if entry.2.is_none() {
            entry.2 = mark.sub_name.as_deref();
        }
    }

    totals
        .into_iter()
        .map(|(sub_code, (sum, count, sub_name))| SubjectAverage {
            sub_code: sub_code.to_string(),
            sub_name: sub_name.unwrap_or(sub_code).to_string(),
            average: round2(sum / count as f64),
            count_students: count,
        })
        .collect()
}

fn cell(value: Option<f64>) -> String {
    value.map(|v| round2(v).to_string()).unwrap_or_default()
}

pub fn write_export<W: std::io::Write>(
    writer: W,
    students: &[StudentRecord],
    marks: &[MarkRecord],
    semester: Option<i32>,
) -> anyhow::Result<usize> {
    let mut out = csv::Writer::from_writer(writer);
    out.write_record([
        "PIN",
        "Name",
        "Branch",
        "ExamYear",
        "Attendance%",
        "OverallScore",
        "Risk",
    ])?;

    let grouped = semester
        .map(|semester| group_by_student(marks, semester))
        .unwrap_or_default();
    let mut written = 0usize;

    for student in students.iter().filter(|student| is_pin_valid(&student.pin)) {
        let scored = semester.map(|_| score_student(&grouped, student));
        let attendance = scored.as_ref().and_then(|s| s.attendance);
        let overall = scored.as_ref().and_then(|s| s.overall);
        let risk = overall.map(|score| map_risk(score).to_string());

        out.write_record([
            student.pin.clone(),
            student.name.clone(),
            student.branch.clone(),
            student.exam_year.to_string(),
            cell(attendance),
            cell(overall),
            risk.unwrap_or_default(),
        ])?;
        written += 1;
    }

    out.flush()?;
    Ok(written)
}
