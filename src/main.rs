use std::path::PathBuf;

use anyhow::Context;
use chrono::Utc;
use clap::{ArgGroup, Args, Parser, Subcommand};
use tracing::{info, warn};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};
use uuid::Uuid;

mod advisor;
mod aggregator;
mod config;
mod db;
mod models;
mod report;
mod session;
mod store;

use crate::advisor::HuggingFaceAdvisor;
use crate::aggregator::{GradeBook, SetGradeOutcome};
use crate::models::{Difficulty, GradeType, ReportMeta, Subject, TargetAverage, Transition};
use crate::session::{AppContext, Mode};

#[derive(Parser)]
#[command(name = "grade-tracker")]
#[command(about = "Grade and average tracker for Group Scholar students", long_about = None)]
struct Cli {
    /// Student the command acts for
    #[arg(long, global = true)]
    email: Option<String>,

    /// Where grade entries are read from and written to
    #[arg(long, value_enum, global = true, default_value_t = Mode::Simulation)]
    mode: Mode,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args, Clone, Copy)]
#[command(group(
    ArgGroup::new("target_source")
        .args(["target", "grade_type"])
        .multiple(false)
))]
struct TargetArgs {
    /// Custom target average between 0 and 10
    #[arg(long)]
    target: Option<f64>,
    /// Compare against the latest cohort average of this list
    #[arg(long, value_enum, requires = "transition")]
    grade_type: Option<GradeType>,
    #[arg(long, value_enum)]
    transition: Option<Transition>,
}

impl TargetArgs {
    fn target(&self) -> Option<TargetAverage> {
        match (self.target, self.grade_type, self.transition) {
            (Some(value), _, _) => Some(TargetAverage::Custom(value)),
            (None, Some(grade_type), Some(transition)) => Some(TargetAverage::Historical {
                grade_type,
                transition,
            }),
            _ => None,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Create or upgrade the database schema
    InitDb,
    /// Load realistic seed data
    Seed,
    /// Import subjects from a CSV file
    ImportSubjects {
        #[arg(long)]
        csv: PathBuf,
    },
    /// Import historical cohort averages from a CSV file
    ImportHistory {
        #[arg(long)]
        csv: PathBuf,
    },
    /// List academic years and semesters
    Programs,
    /// Select the study year, semester and rotation
    Profile {
        #[arg(long)]
        year: i32,
        #[arg(long)]
        semester: Option<i32>,
        #[arg(long)]
        rotation: Option<String>,
    },
    /// List subjects with their current grades
    Subjects,
    /// Enter a grade; an empty value clears it
    SetGrade {
        /// Subject name or id
        #[arg(long)]
        subject: String,
        #[arg(long, allow_hyphen_values = true)]
        value: String,
    },
    /// Mark a subject as completed
    Complete {
        #[arg(long)]
        subject: String,
        #[arg(long, default_value_t = false)]
        undo: bool,
    },
    /// Change the difficulty tag of a subject
    Difficulty {
        #[arg(long)]
        subject: String,
        #[arg(long, value_enum)]
        level: Difficulty,
    },
    /// Show computed averages
    Stats,
    /// Rank unfinished subjects and ask for advice
    Recommend {
        #[command(flatten)]
        target: TargetArgs,
        /// Skip the advisory text
        #[arg(long, default_value_t = false)]
        no_advice: bool,
    },
    /// Show historical cohort averages
    History {
        #[arg(long, value_enum, default_value_t = GradeType::Budget)]
        grade_type: GradeType,
        #[arg(long, value_enum, default_value_t = Transition::FirstToSecond)]
        transition: Transition,
    },
    /// Generate a markdown progress report
    Report {
        #[command(flatten)]
        target: TargetArgs,
        #[arg(long, default_value_t = false)]
        no_advice: bool,
        #[arg(long, default_value = "grades.md")]
        out: PathBuf,
    },
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(
            fmt::layer()
                .with_target(true)
                .with_writer(std::io::stderr),
        )
        .with(filter)
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    init_tracing();

    let cli = Cli::parse();
    let config = config::Config::from_env()?;
    let ctx = AppContext::connect(config, cli.mode, cli.email.clone()).await?;

    let result = run(&ctx, cli.command).await;
    ctx.close().await;
    result
}

async fn run(ctx: &AppContext, command: Commands) -> anyhow::Result<()> {
    let pool = &ctx.pool;

    match command {
        Commands::InitDb => {
            db::init_db(pool).await?;
            println!("Schema ready.");
        }
        Commands::Seed => {
            db::seed(pool).await?;
            println!("Seed data inserted.");
        }
        Commands::ImportSubjects { csv } => {
            let imported = db::import_subjects_csv(pool, &csv).await?;
            println!("Imported {imported} subjects from {}.", csv.display());
        }
        Commands::ImportHistory { csv } => {
            let imported = db::import_history_csv(pool, &csv).await?;
            println!("Imported {imported} cohort averages from {}.", csv.display());
        }
        Commands::Programs => {
            println!("Academic years:");
            for year in db::fetch_academic_years(pool).await? {
                println!("- {} {}", year.id, year.name);
            }
            println!("Semesters (years I to III only):");
            for semester in db::fetch_semesters(pool).await? {
                println!("- {} {}", semester.id, semester.name);
            }
        }
        Commands::Profile {
            year,
            semester,
            rotation,
        } => {
            let student = ctx.ensure_student().await?;
            let study_cycle_id = db::resolve_study_cycle(pool, year, semester).await?;
            db::upsert_study_config(
                pool,
                &models::StudyConfig {
                    student_id: student.id,
                    study_cycle_id,
                    rotation: rotation.filter(|r| !r.trim().is_empty()),
                },
            )
            .await?;
            info!(email = %student.email, study_cycle_id, "profile updated");
            println!("Profile saved for {} (study cycle {study_cycle_id}).", student.email);
        }
        Commands::Subjects => {
            let student = ctx.require_student().await?;
            let subjects = ctx.subjects(&student).await?;
            let book = GradeBook::new(ctx.grade_store(&student).load().await?);

            if subjects.is_empty() {
                println!("No subjects configured for this study cycle.");
                return Ok(());
            }

            for subject in &subjects {
                let entry = book.entry(subject.id).copied().unwrap_or_default();
                let grade = if entry.grade > 0.0 {
                    format!("{:.2}", entry.grade)
                } else {
                    "-".to_string()
                };
                println!(
                    "- {} [{}] {} credits, {}, grade {}{}",
                    subject.name,
                    subject.id,
                    subject.credits,
                    subject.effective_difficulty(),
                    grade,
                    if entry.completed { ", completed" } else { "" }
                );
            }
        }
        Commands::SetGrade { subject, value } => {
            let student = ctx.require_student().await?;
            let subjects = ctx.subjects(&student).await?;
            let subject = find_subject(&subjects, &subject)?;
            let store = ctx.grade_store(&student);
            let mut book = GradeBook::new(store.load().await?);

            match book.set_grade(subject.id, &value) {
                SetGradeOutcome::Rejected => {
                    println!("Ignored '{value}': grades must be numbers between 0 and 10.");
                    return Ok(());
                }
                outcome => {
                    if let Some(entry) = book.entry(subject.id) {
                        store.save(subject.id, entry).await?;
                    }
                    match outcome {
                        SetGradeOutcome::Cleared => println!("Cleared grade for {}.", subject.name),
                        _ => println!("Saved grade {value} for {}.", subject.name),
                    }
                }
            }
            print_stats(&book.stats(&subjects));
        }
        Commands::Complete { subject, undo } => {
            let student = ctx.require_student().await?;
            let subjects = ctx.subjects(&student).await?;
            let subject = find_subject(&subjects, &subject)?;
            let store = ctx.grade_store(&student);
            let mut book = GradeBook::new(store.load().await?);

            let entry = book.set_completed(subject.id, !undo);
            store.save(subject.id, &entry).await?;
            if entry.completed && entry.grade == 0.0 {
                warn!(subject = %subject.name, "completed without a grade, counted as 0");
            }
            println!(
                "{} marked {}.",
                subject.name,
                if entry.completed { "completed" } else { "in progress" }
            );
            print_stats(&book.stats(&subjects));
        }
        Commands::Difficulty { subject, level } => {
            let student = ctx.require_student().await?;
            let subjects = ctx.subjects(&student).await?;
            let subject = find_subject(&subjects, &subject)?;

            if ctx.mode == Mode::Simulation {
                println!("Difficulty changes are only saved in real mode.");
                return Ok(());
            }

            if db::update_subject_difficulty(pool, subject.id, level).await? {
                println!("{} is now {}.", subject.name, level);
            } else {
                anyhow::bail!("subject {} no longer exists", subject.name);
            }
        }
        Commands::Stats => {
            let student = ctx.require_student().await?;
            let subjects = ctx.subjects(&student).await?;
            let book = GradeBook::new(ctx.grade_store(&student).load().await?);
            print_stats(&book.stats(&subjects));
        }
        Commands::Recommend { target, no_advice } => {
            let student = ctx.require_student().await?;
            let subjects = ctx.subjects(&student).await?;
            let grades = ctx.grade_store(&student).load().await?;
            let target = resolve_target(ctx, target.target()).await?;
            let recommendation = aggregator::recommend(target, &subjects, &grades);

            println!("Average of entered grades: {:.2}", recommendation.auto_average);
            if let Some(comparison) = recommendation.comparison {
                println!(
                    "Target {:.2} ({:+.2} from current)",
                    comparison.target, comparison.delta
                );
                println!("{}", report::needed_average_line(comparison.needed_average));
            }

            if recommendation.candidates.is_empty() {
                println!("All subjects are completed.");
            } else {
                println!("Priorities:");
                for (rank, candidate) in recommendation.candidates.iter().take(5).enumerate() {
                    println!(
                        "{}. {} ({} credits, {})",
                        rank + 1,
                        candidate.name,
                        candidate.credits,
                        candidate.difficulty
                    );
                }
            }

            if !no_advice {
                let advice = advisor::advice_for(&build_advisor(ctx), &recommendation).await;
                println!();
                println!("{advice}");
            }
        }
        Commands::History {
            grade_type,
            transition,
        } => {
            let history = db::fetch_cohort_history(pool, grade_type, transition).await?;
            print!("{}", report::build_history_summary(grade_type, transition, &history));
        }
        Commands::Report {
            target,
            no_advice,
            out,
        } => {
            let student = ctx.require_student().await?;
            let subjects = ctx.subjects(&student).await?;
            let store = ctx.grade_store(&student);
            let grades = store.load().await?;
            let target = resolve_target(ctx, target.target()).await?;
            let recommendation = aggregator::recommend(target, &subjects, &grades);
            let advice = if no_advice {
                None
            } else {
                Some(advisor::advice_for(&build_advisor(ctx), &recommendation).await)
            };

            let meta = ReportMeta {
                student_email: student.email.clone(),
                generated_on: Utc::now().date_naive(),
                mode_label: store.label(),
            };
            let report = report::build_progress_report(
                &meta,
                &subjects,
                &grades,
                &recommendation,
                advice.as_deref(),
            );
            std::fs::write(&out, report)
                .with_context(|| format!("failed to write {}", out.display()))?;
            println!("Report written to {}.", out.display());
        }
    }

    Ok(())
}

fn find_subject<'a>(subjects: &'a [Subject], key: &str) -> anyhow::Result<&'a Subject> {
    let key = key.trim();
    let by_id = Uuid::parse_str(key).ok();

    subjects
        .iter()
        .find(|s| Some(s.id) == by_id || s.name.eq_ignore_ascii_case(key))
        .with_context(|| format!("no subject '{key}' in this study cycle"))
}

async fn resolve_target(
    ctx: &AppContext,
    target: Option<TargetAverage>,
) -> anyhow::Result<Option<f64>> {
    match target {
        None => Ok(None),
        Some(TargetAverage::Custom(value)) => aggregator::validate_target(value).map(Some),
        Some(TargetAverage::Historical {
            grade_type,
            transition,
        }) => {
            let value = db::latest_cohort_average(&ctx.pool, grade_type, transition).await?;
            if value.is_none() {
                warn!(
                    grade_type = grade_type.as_str(),
                    transition = transition.code(),
                    "no cohort average recorded, comparing without a target"
                );
            }
            Ok(value)
        }
    }
}

fn build_advisor(ctx: &AppContext) -> HuggingFaceAdvisor {
    HuggingFaceAdvisor::new(
        ctx.config.hf_api_base.clone(),
        ctx.config.hf_model.clone(),
        ctx.config.hf_token.clone(),
    )
}

fn print_stats(stats: &models::AverageStats) {
    println!("Current average: {:.2}", stats.current_average);
    println!("Average of entered grades: {:.2}", stats.auto_average);
    println!("Projected average: {:.2}", stats.projected_average);
    println!("Completed: {} credits", stats.completed_credits);
    println!("Remaining: {} credits", stats.remaining_credits);
    println!("Total available: {} credits", stats.total_possible_credits);
}
