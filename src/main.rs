use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand, ValueEnum};
use serde::Serialize;
use sqlx::postgres::PgPoolOptions;
use tracing::info;
use tracing_subscriber::EnvFilter;

mod breakdown;
mod config;
mod db;
mod models;
mod report;
mod results;
mod scoring;

use db::StudentFilter;
use results::{ListQuery, SortKey, SortOrder};

#[derive(Parser)]
#[command(name = "student-results")]
#[command(about = "Student results tracker: mark sheets, subject scores and risk", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum ExamType {
    Mid1,
    Mid2,
    Semester,
}

impl ExamType {
    fn as_str(&self) -> &'static str {
        match self {
            ExamType::Mid1 => "mid1",
            ExamType::Mid2 => "mid2",
            ExamType::Semester => "semester",
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Create or upgrade the database schema
    InitDb,
    /// Load realistic seed data
    Seed,
    /// Import a mark sheet from a CSV file
    Import {
        #[arg(long)]
        csv: PathBuf,
        #[arg(long, value_enum)]
        exam_type: ExamType,
        #[arg(long, default_value = "faculty")]
        uploaded_by: String,
        #[arg(long)]
        note: Option<String>,
    },
    /// List imported mark sheets
    Uploads {
        #[arg(long, value_enum)]
        exam_type: Option<ExamType>,
        #[arg(long)]
        q: Option<String>,
    },
    /// Remove an entry from the upload log
    UploadsDelete {
        #[arg(long)]
        id: uuid::Uuid,
    },
    /// Show one student's marks, or a semester summary with feedback
    Search {
        #[arg(long)]
        pin: String,
        #[arg(long)]
        semester: Option<i32>,
    },
    /// List students of a batch with scores and risk
    List {
        #[arg(long)]
        branch: Option<String>,
        #[arg(long)]
        year: Option<i32>,
        #[arg(long)]
        semester: Option<i32>,
        #[arg(long)]
        q: Option<String>,
        #[arg(long, value_enum, default_value_t = SortKey::Pin)]
        sort: SortKey,
        #[arg(long, value_enum, default_value_t = SortOrder::Asc)]
        order: SortOrder,
        #[arg(long, default_value_t = 1)]
        page: usize,
        #[arg(long, default_value_t = 50)]
        per_page: usize,
    },
    /// Summarise risk and attendance for a batch
    Overview {
        #[arg(long)]
        branch: String,
        #[arg(long)]
        year: i32,
        #[arg(long)]
        semester: i32,
    },
    /// Risk counts and percentages for a branch
    RiskDistribution {
        #[arg(long)]
        branch: String,
        #[arg(long)]
        year: Option<i32>,
        #[arg(long)]
        semester: i32,
    },
    /// Average subject totals for a batch
    SubjectAverages {
        #[arg(long)]
        branch: String,
        #[arg(long)]
        year: i32,
        #[arg(long)]
        semester: i32,
    },
    /// Export batch scores as CSV
    Export {
        #[arg(long)]
        branch: Option<String>,
        #[arg(long)]
        year: Option<i32>,
        #[arg(long)]
        semester: Option<i32>,
        #[arg(long)]
        q: Option<String>,
        #[arg(long)]
        out: Option<PathBuf>,
    },
    /// Generate a markdown report
    Report {
        #[arg(long)]
        branch: Option<String>,
        #[arg(long)]
        year: Option<i32>,
        #[arg(long)]
        semester: i32,
        #[arg(long, default_value = "report.md")]
        out: PathBuf,
    },
    /// Print the institution name
    Institution,
}

fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn student_ids(students: &[models::StudentRecord]) -> Vec<uuid::Uuid> {
    students.iter().map(|student| student.id).collect()
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let settings = config::Settings::from_env()?;

    let pool = PgPoolOptions::new()
        .max_connections(settings.max_connections)
        .connect(&settings.database_url)
        .await
        .context("failed to connect to Postgres")?;

    match cli.command {
        Commands::InitDb => {
            db::init_db(&pool).await?;
            info!("schema ready");
        }
        Commands::Seed => {
            db::seed(&pool).await?;
        }
        Commands::Import {
            csv,
            exam_type,
            uploaded_by,
            note,
        } => {
            let summary = db::import_csv(
                &pool,
                &csv,
                exam_type.as_str(),
                &uploaded_by,
                note.as_deref(),
            )
            .await?;
            info!(
                stored = summary.stored,
                skipped = summary.skipped,
                file = %csv.display(),
                "mark sheet imported"
            );
        }
        Commands::Uploads { exam_type, q } => {
            let uploads = db::fetch_uploads(
                &pool,
                exam_type.as_ref().map(ExamType::as_str),
                q.as_deref(),
            )
            .await?;
            print_json(&serde_json::json!({ "total": uploads.len(), "items": uploads }))?;
        }
        Commands::UploadsDelete { id } => {
            let deleted = db::delete_upload(&pool, id).await?;
            anyhow::ensure!(deleted, "upload {id} not found");
            print_json(&serde_json::json!({ "success": true, "deleted_id": id }))?;
        }
        Commands::Search { pin, semester } => {
            let student = db::fetch_student_by_pin(&pool, &pin)
                .await?
                .with_context(|| format!("student {pin} not found"))?;
            let marks = db::fetch_marks(&pool, &[student.id], semester).await?;

            match semester {
                Some(semester) => {
                    print_json(&results::semester_summary(&student, semester, &marks))?;
                }
                None => {
                    let grouped = results::marks_by_semester(&marks);
                    print_json(&serde_json::json!({
                        "student": student,
                        "marks_by_semester": grouped,
                    }))?;
                }
            }
        }
        Commands::List {
            branch,
            year,
            semester,
            q,
            sort,
            order,
            page,
            per_page,
        } => {
            let filter = StudentFilter {
                branch: branch.as_deref(),
                exam_year: year,
                q: q.as_deref(),
            };
            let students = db::fetch_students(&pool, &filter).await?;
            let marks = match semester {
                Some(_) => db::fetch_marks(&pool, &student_ids(&students), semester).await?,
                None => Vec::new(),
            };
            let query = ListQuery {
                semester,
                sort,
                order,
                page,
                per_page,
            };
            print_json(&results::batch_listing(&students, &marks, &query))?;
        }
        Commands::Overview {
            branch,
            year,
            semester,
        } => {
            let filter = StudentFilter {
                branch: Some(branch.as_str()),
                exam_year: Some(year),
                q: None,
            };
            let students = db::fetch_students(&pool, &filter).await?;
            let marks = db::fetch_marks(&pool, &student_ids(&students), Some(semester)).await?;
            print_json(&results::batch_overview(&students, &marks, semester))?;
        }
        Commands::RiskDistribution {
            branch,
            year,
            semester,
        } => {
            let filter = StudentFilter {
                branch: Some(branch.as_str()),
                exam_year: year,
                q: None,
            };
            let students = db::fetch_students(&pool, &filter).await?;
            let marks = db::fetch_marks(&pool, &student_ids(&students), Some(semester)).await?;
            print_json(&results::risk_distribution(
                &branch, year, semester, &students, &marks,
            ))?;
        }
        Commands::SubjectAverages {
            branch,
            year,
            semester,
        } => {
            let filter = StudentFilter {
                branch: Some(branch.as_str()),
                exam_year: Some(year),
                q: None,
            };
            let students = db::fetch_students(&pool, &filter).await?;
            let marks = db::fetch_marks(&pool, &student_ids(&students), Some(semester)).await?;
            let items = results::subject_averages(&marks, semester);
            print_json(&serde_json::json!({ "items": items }))?;
        }
        Commands::Export {
            branch,
            year,
            semester,
            q,
            out,
        } => {
            let filter = StudentFilter {
                branch: branch.as_deref(),
                exam_year: year,
                q: q.as_deref(),
            };
            let students = db::fetch_students(&pool, &filter).await?;
            let marks = match semester {
                Some(_) => db::fetch_marks(&pool, &student_ids(&students), semester).await?,
                None => Vec::new(),
            };
            let out = out.unwrap_or_else(|| {
                PathBuf::from(format!(
                    "students_export_{}_{}_{}.csv",
                    branch.as_deref().unwrap_or("all"),
                    year.map_or_else(|| "all".to_string(), |y| y.to_string()),
                    semester.map_or_else(|| "all".to_string(), |s| s.to_string()),
                ))
            });
            let file = std::fs::File::create(&out)
                .with_context(|| format!("failed to create {}", out.display()))?;
            let written = results::write_export(file, &students, &marks, semester)?;
            info!(rows = written, file = %out.display(), "export written");
        }
        Commands::Report {
            branch,
            year,
            semester,
            out,
        } => {
            let filter = StudentFilter {
                branch: branch.as_deref(),
                exam_year: year,
                q: None,
            };
            let students = db::fetch_students(&pool, &filter).await?;
            let marks = db::fetch_marks(&pool, &student_ids(&students), Some(semester)).await?;
            let label = match (&branch, year) {
                (Some(branch), Some(year)) => Some(format!("{branch} {year}")),
                (Some(branch), None) => Some(branch.clone()),
                (None, Some(year)) => Some(year.to_string()),
                (None, None) => None,
            };
            let report = report::build_report(label.as_deref(), semester, &students, &marks);
            std::fs::write(&out, report)?;
            info!(file = %out.display(), "report written");
        }
        Commands::Institution => {
            let name = db::fetch_institution(&pool).await?.unwrap_or_default();
            print_json(&serde_json::json!({ "name": name }))?;
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn uploads_delete_takes_an_upload_id() {
        let id = "6f1c2a7e-0b7d-4a5e-9a43-3f6e2d1c8b90";
        let cli = Cli::try_parse_from(["student-results", "uploads-delete", "--id", id]).unwrap();
        match cli.command {
            Commands::UploadsDelete { id: parsed } => assert_eq!(parsed.to_string(), id),
            _ => panic!("expected uploads-delete"),
        }

        assert!(Cli::try_parse_from(["student-results", "uploads-delete", "--id", "42"]).is_err());
    }
}
