use anyhow::Context;
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use tracing::{debug, info};

use crate::config::Config;
use crate::db;
use crate::models::{StudyConfig, Student, Subject};
use crate::store::{GradeStore, JsonFileStore, PgGradeStore};

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum Mode {
    /// Grades kept in a local file
    Simulation,
    /// Grades written to the database
    Real,
}

/// Everything a command needs to act on behalf of one student.
pub struct AppContext {
    pub pool: PgPool,
    pub config: Config,
    pub mode: Mode,
    email: Option<String>,
}

impl AppContext {
    pub async fn connect(config: Config, mode: Mode, email: Option<String>) -> anyhow::Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(5)
            .connect(&config.database_url)
            .await
            .context("failed to connect to Postgres")?;

        debug!(?mode, "database pool ready");
        Ok(Self {
            pool,
            config,
            mode,
            email,
        })
    }

    pub async fn close(self) {
        self.pool.close().await;
        debug!("database pool closed");
    }

    pub async fn require_student(&self) -> anyhow::Result<Student> {
        let email = self
            .email
            .as_deref()
            .context("--email is required for this command")?;
        db::find_student(&self.pool, email)
            .await?
            .with_context(|| format!("no student registered with email {email}"))
    }

    /// Registers the student on first use.
    pub async fn ensure_student(&self) -> anyhow::Result<Student> {
        let email = self
            .email
            .as_deref()
            .context("--email is required for this command")?;
        if let Some(student) = db::find_student(&self.pool, email).await? {
            return Ok(student);
        }
        let student = db::register_student(&self.pool, email).await?;
        info!(email = %student.email, "student registered");
        Ok(student)
    }

    pub async fn study_config(&self, student: &Student) -> anyhow::Result<StudyConfig> {
        db::fetch_study_config(&self.pool, student.id)
            .await?
            .context("profile incomplete: run `profile --year <n>` first")
    }

    pub async fn subjects(&self, student: &Student) -> anyhow::Result<Vec<Subject>> {
        let config = self.study_config(student).await?;
        db::fetch_subjects(&self.pool, config.study_cycle_id).await
    }

    pub fn grade_store(&self, student: &Student) -> Box<dyn GradeStore> {
        match self.mode {
            Mode::Simulation => Box::new(JsonFileStore::new(
                self.config.simulation_store.clone(),
                student.id,
            )),
            Mode::Real => Box::new(PgGradeStore::new(self.pool.clone(), student.id)),
        }
    }
}
