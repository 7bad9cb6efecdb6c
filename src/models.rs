use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::scoring::{ComponentMarks, RiskLevel};

#[derive(Debug, Clone, Serialize)]
pub struct StudentRecord {
    #[serde(skip)]
    pub id: Uuid,
    pub pin: String,
    pub name: String,
    pub branch: String,
    pub exam_year: i32,
}

#[derive(Debug, Clone)]
pub struct SubjectRecord {
    pub sub_code: String,
    pub sub_name: String,
    pub branch: String,
    pub year: i32,
    pub semester: i32,
}

#[derive(Debug, Clone)]
pub struct MarkRecord {
    pub student_id: Uuid,
    pub sub_code: String,
    pub sub_name: Option<String>,
    pub semester: i32,
    pub year: i32,
    pub components: ComponentMarks,
    pub total: Option<f64>,
    pub subject_score: Option<f64>,
    pub risk: Option<RiskLevel>,
}

#[derive(Debug, Clone, Serialize)]
pub struct UploadRecord {
    pub id: Uuid,
    pub file_name: String,
    pub original_file_name: String,
    pub exam_type: String,
    pub uploaded_by: String,
    pub uploaded_on: DateTime<Utc>,
    pub note: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SubjectDetail {
    pub sub_code: String,
    pub sub_name: String,
    pub year: i32,
    pub mid1: Option<f64>,
    pub mid2: Option<f64>,
    pub internal: Option<f64>,
    pub end_sem: Option<f64>,
    pub total: Option<f64>,
    pub attendance: Option<f64>,
    pub subject_score: Option<f64>,
    pub grade: &'static str,
    pub result: &'static str,
    pub risk: Option<RiskLevel>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SemesterSummary {
    pub student: StudentRecord,
    pub semester: i32,
    pub overall_score: Option<f64>,
    pub subject_count: usize,
    pub subjects: Vec<SubjectDetail>,
    pub attendance: Option<f64>,
    pub feedback: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct BatchRow {
    pub pin: String,
    pub name: String,
    pub branch: String,
    pub exam_year: i32,
    pub attendance: Option<f64>,
    pub overall_score: Option<f64>,
    pub subject_count: usize,
    pub risk: Option<RiskLevel>,
}

#[derive(Debug, Clone, Serialize)]
pub struct BatchListing {
    pub total: usize,
    pub page: usize,
    pub per_page: usize,
    pub class_average: Option<f64>,
    pub items: Vec<BatchRow>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RiskCounts {
    pub low: usize,
    pub medium: usize,
    pub high: usize,
    pub unknown: usize,
}

impl RiskCounts {
    pub fn record(&mut self, risk: Option<RiskLevel>) {
        match risk {
            Some(RiskLevel::Low) => self.low += 1,
            Some(RiskLevel::Medium) => self.medium += 1,
            Some(RiskLevel::High) => self.high += 1,
            None => self.unknown += 1,
        }
    }

    pub fn total(&self) -> usize {
        self.low + self.medium + self.high + self.unknown
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct BatchOverview {
    pub total_students: usize,
    pub risk_counts: RiskCounts,
    pub avg_attendance: Option<f64>,
    pub avg_class_performance: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RiskPercentages {
    pub low: f64,
    pub medium: f64,
    pub high: f64,
    pub unknown: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct RiskDistribution {
    pub branch: String,
    pub year: Option<i32>,
    pub semester: i32,
    pub total_students: usize,
    pub counts: RiskCounts,
    pub percentages: RiskPercentages,
}

#[derive(Debug, Clone, Serialize)]
pub struct SubjectAverage {
    pub sub_code: String,
    pub sub_name: String,
    pub average: f64,
    pub count_students: usize,
}
