use anyhow::Context;
use sqlx::{PgConnection, PgPool, Row};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::breakdown::{is_header_row, is_pin_valid, score_upload, ScoredMark};
use crate::models::{MarkRecord, StudentRecord, SubjectRecord, UploadRecord};
use crate::scoring::{ComponentMarks, RiskLevel};

pub async fn init_db(pool: &PgPool) -> anyhow::Result<()> {
    sqlx::migrate!("./migrations").run(pool).await?;
    Ok(())
}

#[derive(Debug, Clone, Default)]
pub struct StudentFilter<'a> {
    pub branch: Option<&'a str>,
    pub exam_year: Option<i32>,
    pub q: Option<&'a str>,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ImportSummary {
    pub stored: usize,
    pub skipped: usize,
}

pub async fn seed(pool: &PgPool) -> anyhow::Result<()> {
    let mut tx = pool.begin().await?;

    sqlx::query(
        r#"
        INSERT INTO student_results.institution (id, name)
        VALUES (1, $1)
        ON CONFLICT (id) DO UPDATE SET name = EXCLUDED.name
        "#,
    )
    .bind("Government Polytechnic, Hyderabad")
    .execute(&mut *tx)
    .await?;

    let subjects = vec![
        SubjectRecord {
            sub_code: "CS-401".to_string(),
            sub_name: "Maths IV".to_string(),
            branch: "CS".to_string(),
            year: 2,
            semester: 4,
        },
        SubjectRecord {
            sub_code: "CS-402".to_string(),
            sub_name: "Data Structures".to_string(),
            branch: "CS".to_string(),
            year: 2,
            semester: 4,
        },
        SubjectRecord {
            sub_code: "CS-403".to_string(),
            sub_name: "Computer Networks".to_string(),
            branch: "CS".to_string(),
            year: 2,
            semester: 4,
        },
    ];
    for subject in &subjects {
        upsert_subject(&mut tx, subject).await?;
    }

    let students = vec![
        ("23189-CS-001", "Avery Lee", [85.0, 15.0, 18.0, 16.0, 38.0]),
        ("23189-CS-002", "Jules Moreno", [62.0, 11.0, 12.0, 12.0, 24.0]),
        ("23189-CS-003", "Kiara Patel", [48.0, 6.0, 8.0, 9.0, 12.0]),
    ];

    for (pin, name, [attendance, mid1, mid2, internal, end_sem]) in students {
        let student_id = upsert_student(&mut tx, pin, name, "CS", 2024).await?;
        for (offset, subject) in subjects.iter().enumerate() {
            let drift = offset as f64;
            let components = ComponentMarks {
                attendance: Some(attendance),
                mid1: Some((mid1 - drift).max(0.0)),
                mid2: Some(mid2),
                internal: Some(internal),
                end_sem: Some((end_sem - 2.0 * drift).max(0.0)),
            };
            let scored = score_upload(components, None, None);
            upsert_mark(&mut tx, student_id, &subject.sub_code, 4, 2024, &scored).await?;
        }
    }

    tx.commit().await?;
    info!(subjects = subjects.len(), "seed data inserted");
    Ok(())
}

async fn upsert_subject(conn: &mut PgConnection, subject: &SubjectRecord) -> anyhow::Result<()> {
    sqlx::query(
        r#"
        INSERT INTO student_results.subjects (sub_code, sub_name, branch, year, semester)
        VALUES ($1, $2, $3, $4, $5)
        ON CONFLICT (sub_code) DO UPDATE
        SET sub_name = EXCLUDED.sub_name, branch = EXCLUDED.branch,
            year = EXCLUDED.year, semester = EXCLUDED.semester
        "#,
    )
    .bind(&subject.sub_code)
    .bind(&subject.sub_name)
    .bind(&subject.branch)
    .bind(subject.year)
    .bind(subject.semester)
    .execute(&mut *conn)
    .await?;
    Ok(())
}

async fn upsert_student(
    conn: &mut PgConnection,
    pin: &str,
    name: &str,
    branch: &str,
    exam_year: i32,
) -> anyhow::Result<Uuid> {
    let id: Uuid = sqlx::query(
        r#"
        INSERT INTO student_results.students (id, pin, name, branch, exam_year)
        VALUES ($1, $2, $3, $4, $5)
        ON CONFLICT (pin) DO UPDATE
        SET name = EXCLUDED.name, branch = EXCLUDED.branch, exam_year = EXCLUDED.exam_year
        RETURNING id
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(pin.trim())
    .bind(name.trim())
    .bind(branch)
    .bind(exam_year)
    .fetch_one(&mut *conn)
    .await?
    .get("id");
    Ok(id)
}

async fn fetch_components(
    conn: &mut PgConnection,
    student_id: Uuid,
    sub_code: &str,
    semester: i32,
) -> anyhow::Result<Option<ComponentMarks>> {
    let row = sqlx::query(
        r#"
        SELECT attendance, mid1, mid2, internal, end_sem
        FROM student_results.marks
        WHERE student_id = $1 AND sub_code = $2 AND semester = $3
        "#,
    )
    .bind(student_id)
    .bind(sub_code)
    .bind(semester)
    .fetch_optional(&mut *conn)
    .await?;

    Ok(row.map(|row| ComponentMarks {
        attendance: row.get("attendance"),
        mid1: row.get("mid1"),
        mid2: row.get("mid2"),
        internal: row.get("internal"),
        end_sem: row.get("end_sem"),
    }))
}

async fn upsert_mark(
    conn: &mut PgConnection,
    student_id: Uuid,
    sub_code: &str,
    semester: i32,
    year: i32,
    scored: &ScoredMark,
) -> anyhow::Result<()> {
    sqlx::query(
        r#"
        INSERT INTO student_results.marks
        (id, student_id, sub_code, semester, year, mid1, mid2, internal, end_sem,
         attendance, total, subject_score, risk, updated_on)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, now())
        ON CONFLICT (student_id, sub_code, semester) DO UPDATE
        SET year = EXCLUDED.year, mid1 = EXCLUDED.mid1, mid2 = EXCLUDED.mid2,
            internal = EXCLUDED.internal, end_sem = EXCLUDED.end_sem,
            attendance = EXCLUDED.attendance, total = EXCLUDED.total,
            subject_score = EXCLUDED.subject_score, risk = EXCLUDED.risk,
            updated_on = now()
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(student_id)
    .bind(sub_code)
    .bind(semester)
    .bind(year)
    .bind(scored.components.mid1)
    .bind(scored.components.mid2)
    .bind(scored.components.internal)
    .bind(scored.components.end_sem)
    .bind(scored.components.attendance)
    .bind(scored.total)
    .bind(scored.subject_score)
    .bind(scored.risk.as_str())
    .execute(&mut *conn)
    .await?;
    Ok(())
}

pub async fn import_csv(
    pool: &PgPool,
    csv_path: &std::path::Path,
    exam_type: &str,
    uploaded_by: &str,
    note: Option<&str>,
) -> anyhow::Result<ImportSummary> {
    let reader = csv::Reader::from_path(csv_path)
        .with_context(|| format!("failed to open {}", csv_path.display()))?;
    let sheet = read_mark_sheet(reader)?;

    let mut tx = pool.begin().await?;
    for row in &sheet.rows {
        let sub_name = row
            .sub_name
            .as_deref()
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .unwrap_or(&row.sub_code);
        upsert_subject(
            &mut tx,
            &SubjectRecord {
                sub_code: row.sub_code.clone(),
                sub_name: sub_name.to_string(),
                branch: row.branch.clone(),
                year: row.year,
                semester: row.semester,
            },
        )
        .await?;

        let student_id =
            upsert_student(&mut tx, &row.pin, &row.name, &row.branch, row.exam_year).await?;
        let existing = fetch_components(&mut tx, student_id, &row.sub_code, row.semester).await?;
        let scored = score_upload(row.components(), row.breakdown.as_deref(), existing);
        debug!(pin = %row.pin, sub_code = %row.sub_code, score = scored.subject_score, "scored mark");

        upsert_mark(&mut tx, student_id, &row.sub_code, row.semester, row.year, &scored).await?;
    }

    let file_name = csv_path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| csv_path.display().to_string());
    record_upload(
        &mut tx,
        &file_name,
        &csv_path.display().to_string(),
        exam_type,
        uploaded_by,
        note,
    )
    .await?;
    tx.commit().await?;

    Ok(ImportSummary {
        stored: sheet.rows.len(),
        skipped: sheet.skipped,
    })
}

#[derive(Debug, Clone, serde::Deserialize)]
pub struct SheetRow {
    pub pin: String,
    pub name: String,
    pub branch: String,
    pub exam_year: i32,
    pub sub_code: String,
    #[serde(default)]
    pub sub_name: Option<String>,
    pub semester: i32,
    pub year: i32,
    #[serde(default)]
    pub mid1: Option<f64>,
    #[serde(default)]
    pub mid2: Option<f64>,
    #[serde(default)]
    pub internal: Option<f64>,
    #[serde(default)]
    pub end_sem: Option<f64>,
    #[serde(default)]
    pub attendance: Option<f64>,
    #[serde(default)]
    pub breakdown: Option<String>,
}

impl SheetRow {
    fn components(&self) -> ComponentMarks {
        ComponentMarks {
            attendance: self.attendance,
            mid1: self.mid1,
            mid2: self.mid2,
            internal: self.internal,
            end_sem: self.end_sem,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct MarkSheet {
    pub rows: Vec<SheetRow>,
    pub skipped: usize,
}

/// Reads the whole sheet before anything is written, so a bad row aborts the import.
pub fn read_mark_sheet<R: std::io::Read>(mut reader: csv::Reader<R>) -> anyhow::Result<MarkSheet> {
    let mut sheet = MarkSheet::default();

    for (index, result) in reader.deserialize::<SheetRow>().enumerate() {
        let row = result.with_context(|| format!("invalid row {}", index + 1))?;

        if !is_pin_valid(&row.pin) || is_header_row(&row.name) {
            warn!(pin = %row.pin, name = %row.name, "skipping row without a student PIN");
            sheet.skipped += 1;
            continue;
        }
        sheet.rows.push(row);
    }

    Ok(sheet)
}

async fn record_upload(
    conn: &mut PgConnection,
    file_name: &str,
    original_file_name: &str,
    exam_type: &str,
    uploaded_by: &str,
    note: Option<&str>,
) -> anyhow::Result<()> {
    sqlx::query(
        r#"
        INSERT INTO student_results.uploaded_files
        (id, file_name, original_file_name, exam_type, uploaded_by, note)
        VALUES ($1, $2, $3, $4, $5, $6)
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(file_name)
    .bind(original_file_name)
    .bind(exam_type)
    .bind(uploaded_by)
    .bind(note)
    .execute(&mut *conn)
    .await?;
    Ok(())
}

/// Removes an entry from the upload log. Marks imported from it stay.
pub async fn delete_upload(pool: &PgPool, id: Uuid) -> anyhow::Result<bool> {
    let result = sqlx::query("DELETE FROM student_results.uploaded_files WHERE id = $1")
        .bind(id)
        .execute(pool)
        .await?;
    Ok(result.rows_affected() > 0)
}

pub async fn fetch_uploads(
    pool: &PgPool,
    exam_type: Option<&str>,
    q: Option<&str>,
) -> anyhow::Result<Vec<UploadRecord>> {
    let rows = sqlx::query(
        r#"
        SELECT id, file_name, original_file_name, exam_type, uploaded_by, uploaded_on, note
        FROM student_results.uploaded_files
        WHERE ($1::text IS NULL OR exam_type = $1)
          AND ($2::text IS NULL OR file_name ILIKE $2 OR original_file_name ILIKE $2)
        ORDER BY uploaded_on DESC
        "#,
    )
    .bind(exam_type)
    .bind(q.map(|value| format!("%{value}%")))
    .fetch_all(pool)
    .await?;

    let mut uploads = Vec::new();
    for row in rows {
        uploads.push(UploadRecord {
            id: row.get("id"),
            file_name: row.get("file_name"),
            original_file_name: row.get("original_file_name"),
            exam_type: row.get("exam_type"),
            uploaded_by: row.get("uploaded_by"),
            uploaded_on: row.get("uploaded_on"),
            note: row.get("note"),
        });
    }

    Ok(uploads)
}

fn student_from_row(row: &sqlx::postgres::PgRow) -> StudentRecord {
    StudentRecord {
        id: row.get("id"),
        pin: row.get("pin"),
        name: row.get("name"),
        branch: row.get("branch"),
        exam_year: row.get("exam_year"),
    }
}

pub async fn fetch_student_by_pin(
    pool: &PgPool,
    pin: &str,
) -> anyhow::Result<Option<StudentRecord>> {
    let row = sqlx::query(
        "SELECT id, pin, name, branch, exam_year FROM student_results.students WHERE pin = $1",
    )
    .bind(pin.trim())
    .fetch_optional(pool)
    .await?;

    Ok(row.as_ref().map(student_from_row))
}

pub async fn fetch_students(
    pool: &PgPool,
    filter: &StudentFilter<'_>,
) -> anyhow::Result<Vec<StudentRecord>> {
    let rows = sqlx::query(
        r#"
        SELECT id, pin, name, branch, exam_year
        FROM student_results.students
        WHERE ($1::text IS NULL OR branch = $1)
          AND ($2::int IS NULL OR exam_year = $2)
          AND ($3::text IS NULL OR pin ILIKE $3 OR name ILIKE $3)
        ORDER BY pin
        "#,
    )
    .bind(filter.branch)
    .bind(filter.exam_year)
    .bind(filter.q.map(|value| format!("%{value}%")))
    .fetch_all(pool)
    .await?;

    Ok(rows.iter().map(student_from_row).collect())
}

pub async fn fetch_marks(
    pool: &PgPool,
    student_ids: &[Uuid],
    semester: Option<i32>,
) -> anyhow::Result<Vec<MarkRecord>> {
    if student_ids.is_empty() {
        return Ok(Vec::new());
    }

    let rows = sqlx::query(
        r#"
        SELECT m.student_id, m.sub_code, s.sub_name, m.semester, m.year,
               m.attendance, m.mid1, m.mid2, m.internal, m.end_sem,
               m.total, m.subject_score, m.risk
        FROM student_results.marks m
        LEFT JOIN student_results.subjects s ON s.sub_code = m.sub_code
        WHERE m.student_id = ANY($1)
          AND ($2::int IS NULL OR m.semester = $2)
        ORDER BY m.semester, m.sub_code
        "#,
    )
    .bind(student_ids.to_vec())
    .bind(semester)
    .fetch_all(pool)
    .await?;

    let mut marks = Vec::new();
    for row in rows {
        marks.push(MarkRecord {
            student_id: row.get("student_id"),
            sub_code: row.get("sub_code"),
            sub_name: row.get("sub_name"),
            semester: row.get("semester"),
            year: row.get("year"),
            components: ComponentMarks {
                attendance: row.get("attendance"),
                mid1: row.get("mid1"),
                mid2: row.get("mid2"),
                internal: row.get("internal"),
                end_sem: row.get("end_sem"),
            },
            total: row.get("total"),
            subject_score: row.get("subject_score"),
            risk: row
                .get::<Option<String>, _>("risk")
                .as_deref()
                .and_then(RiskLevel::parse),
        });
    }

    Ok(marks)
}

pub async fn fetch_institution(pool: &PgPool) -> anyhow::Result<Option<String>> {
    let row = sqlx::query("SELECT name FROM student_results.institution ORDER BY id LIMIT 1")
        .fetch_optional(pool)
        .await?;
    Ok(row.map(|row| row.get("name")))
}

#[cfg(test)]
mod tests {
    use super::*;

    const HEADER: &str =
        "pin,name,branch,exam_year,sub_code,sub_name,semester,year,mid1,mid2,internal,end_sem,attendance,breakdown\n";

    fn sheet(body: &str) -> anyhow::Result<MarkSheet> {
        let data = format!("{HEADER}{body}");
        read_mark_sheet(csv::Reader::from_reader(data.as_bytes()))
    }

    #[test]
    fn reads_rows_and_skips_non_students() {
        let sheet = sheet(
            ",Government Polytechnic,CS,2024,,,4,2024,,,,,,\n\
             23189-CS-001,Avery Lee,CS,2024,CS-401,Maths IV,4,2024,15,18,16,38,85,\n\
             23189-CS-002,Jules Moreno,CS,2024,CS-401,,4,2024,,,,,62,11+12+12+24\n\
             189,Fragment,CS,2024,CS-401,Maths IV,4,2024,,,,,,\n",
        )
        .unwrap();

        assert_eq!(sheet.rows.len(), 2);
        assert_eq!(sheet.skipped, 2);
        assert_eq!(sheet.rows[0].components().end_sem, Some(38.0));
        assert_eq!(sheet.rows[1].sub_name, None);
        assert_eq!(sheet.rows[1].breakdown.as_deref(), Some("11+12+12+24"));
        assert_eq!(sheet.rows[1].components().mid1, None);
    }

    #[test]
    fn bad_row_rejects_the_whole_sheet() {
        let err = sheet(
            "23189-CS-001,Avery Lee,CS,2024,CS-401,Maths IV,4,2024,15,18,16,38,85,\n\
             23189-CS-002,Jules Moreno,CS,2024,CS-401,Maths IV,4,2024,11,12,12,24,62,\n\
             23189-CS-003,Kiara Patel,CS,abc,CS-401,Maths IV,4,2024,6,8,9,12,48,\n",
        )
        .unwrap_err();

        assert!(err.to_string().contains("invalid row 3"));
    }
}
