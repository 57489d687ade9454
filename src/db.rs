use anyhow::Context;
use chrono::Utc;
use sqlx::{PgPool, Row};
use tracing::{debug, info};
use uuid::Uuid;

use crate::models::{
    AcademicYear, CohortAverage, Difficulty, GradeEntry, GradeMap, GradeType, Semester, Student,
    StudyConfig, Subject, Transition,
};

/// Years above this one pick a cycle by year alone.
pub const LAST_SEMESTER_YEAR: i32 = 3;

const DEMO_EMAIL: &str = "demo.student@groupscholar.com";

pub async fn init_db(pool: &PgPool) -> anyhow::Result<()> {
    sqlx::migrate!("./migrations").run(pool).await?;
    Ok(())
}

pub fn study_cycle_id(year: i32, semester: Option<i32>) -> i32 {
    year * 10 + semester.unwrap_or(0)
}

pub async fn seed(pool: &PgPool) -> anyhow::Result<()> {
    let years = ["I", "II", "III", "IV", "V", "VI"];
    for (index, name) in years.iter().enumerate() {
        sqlx::query(
            r#"
            INSERT INTO grade_tracker.academic_years (id, year_name)
            VALUES ($1, $2)
            ON CONFLICT (id) DO UPDATE SET year_name = EXCLUDED.year_name
            "#,
        )
        .bind(index as i32 + 1)
        .bind(format!("Year {name}"))
        .execute(pool)
        .await?;
    }

    for (id, name) in [(1, "Semester 1"), (2, "Semester 2")] {
        sqlx::query(
            r#"
            INSERT INTO grade_tracker.semesters (id, semester_name)
            VALUES ($1, $2)
            ON CONFLICT (id) DO UPDATE SET semester_name = EXCLUDED.semester_name
            "#,
        )
        .bind(id)
        .bind(name)
        .execute(pool)
        .await?;
    }

    for year in 1..=6 {
        let semesters: Vec<Option<i32>> = if year <= LAST_SEMESTER_YEAR {
            vec![Some(1), Some(2)]
        } else {
            vec![None]
        };
        for semester in semesters {
            sqlx::query(
                r#"
                INSERT INTO grade_tracker.study_cycles (id, academic_year_id, semester_id)
                VALUES ($1, $2, $3)
                ON CONFLICT (id) DO NOTHING
                "#,
            )
            .bind(study_cycle_id(year, semester))
            .bind(year)
            .bind(semester)
            .execute(pool)
            .await?;
        }
    }

    let subjects = vec![
        (1, Some(1), "Anatomy I", 7.0, Some("hard")),
        (1, Some(1), "Histology", 5.0, None),
        (1, Some(1), "Biophysics", 4.0, Some("medium")),
        (1, Some(1), "Medical Informatics", 3.0, Some("easy")),
        (1, Some(1), "Cell Biology", 5.0, None),
        (1, Some(1), "Physical Education", 1.0, Some("easy")),
        (1, Some(2), "Anatomy II", 7.0, Some("hard")),
        (1, Some(2), "Biochemistry", 6.0, Some("hard")),
        (1, Some(2), "Medical Genetics", 5.0, None),
        (4, None, "Internal Medicine", 12.0, Some("hard")),
        (4, None, "Dermatology", 4.0, None),
    ];

    for (year, semester, name, credits, difficulty) in subjects {
        upsert_subject(pool, study_cycle_id(year, semester), name, credits, difficulty).await?;
    }

    register_student(pool, DEMO_EMAIL).await?;

    let history = vec![
        ("2021", GradeType::Budget, Transition::FirstToSecond, 8.12),
        ("2022", GradeType::Budget, Transition::FirstToSecond, 8.35),
        ("2023", GradeType::Budget, Transition::FirstToSecond, 8.51),
        ("2024", GradeType::Budget, Transition::FirstToSecond, 8.47),
        ("2021", GradeType::Scholarship, Transition::FirstToSecond, 9.21),
        ("2022", GradeType::Scholarship, Transition::FirstToSecond, 9.34),
        ("2023", GradeType::Scholarship, Transition::FirstToSecond, 9.40),
        ("2024", GradeType::Scholarship, Transition::FirstToSecond, 9.38),
        ("2023", GradeType::Budget, Transition::SecondToThird, 8.02),
        ("2024", GradeType::Budget, Transition::SecondToThird, 8.16),
    ];

    for (year, grade_type, transition, average) in history {
        upsert_cohort_average(pool, year, grade_type, transition, Some(average)).await?;
    }

    info!("seed data inserted");
    Ok(())
}

async fn upsert_subject(
    pool: &PgPool,
    study_cycle_id: i32,
    name: &str,
    credits: f64,
    difficulty: Option<&str>,
) -> anyhow::Result<Uuid> {
    let id: Uuid = sqlx::query(
        r#"
        INSERT INTO grade_tracker.subjects (id, study_cycle_id, subject_name, credits, difficulty)
        VALUES ($1, $2, $3, $4, $5)
        ON CONFLICT (study_cycle_id, subject_name) DO UPDATE
        SET credits = EXCLUDED.credits,
            difficulty = COALESCE(EXCLUDED.difficulty, grade_tracker.subjects.difficulty)
        RETURNING id
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(study_cycle_id)
    .bind(name)
    .bind(credits)
    .bind(difficulty)
    .fetch_one(pool)
    .await?
    .get("id");

    Ok(id)
}

async fn upsert_cohort_average(
    pool: &PgPool,
    year: &str,
    grade_type: GradeType,
    transition: Transition,
    average: Option<f64>,
) -> anyhow::Result<u64> {
    let result = sqlx::query(
        r#"
        INSERT INTO grade_tracker.cohort_averages (year, grade_type, transition, average)
        VALUES ($1, $2, $3, $4)
        ON CONFLICT (year, grade_type, transition) DO UPDATE
        SET average = EXCLUDED.average
        "#,
    )
    .bind(year)
    .bind(grade_type.as_str())
    .bind(transition.code())
    .bind(average)
    .execute(pool)
    .await?;

    Ok(result.rows_affected())
}

pub async fn import_subjects_csv(
    pool: &PgPool,
    csv_path: &std::path::Path,
) -> anyhow::Result<usize> {
    #[derive(serde::Deserialize)]
    struct CsvRow {
        year: i32,
        semester: Option<i32>,
        subject_name: String,
        credits: f64,
        difficulty: Option<String>,
    }

    let mut reader = csv::Reader::from_path(csv_path)
        .with_context(|| format!("failed to open {}", csv_path.display()))?;
    let mut imported = 0usize;

    for (line, result) in reader.deserialize::<CsvRow>().enumerate() {
        let row = result?;
        if row.credits <= 0.0 {
            anyhow::bail!("row {}: credits must be positive for {}", line + 1, row.subject_name);
        }

        let difficulty = match row.difficulty.as_deref().map(str::trim) {
            None | Some("") => None,
            Some(value) => Some(value.parse::<Difficulty>()?),
        };
        let semester = if row.year > LAST_SEMESTER_YEAR {
            None
        } else {
            row.semester
        };

        upsert_subject(
            pool,
            study_cycle_id(row.year, semester),
            row.subject_name.trim(),
            row.credits,
            difficulty.as_ref().map(Difficulty::as_str),
        )
        .await?;
        imported += 1;
    }

    Ok(imported)
}

pub async fn import_history_csv(
    pool: &PgPool,
    csv_path: &std::path::Path,
) -> anyhow::Result<usize> {
    #[derive(serde::Deserialize)]
    struct CsvRow {
        year: String,
        grade_type: String,
        transition: String,
        average: Option<f64>,
    }

    let mut reader = csv::Reader::from_path(csv_path)
        .with_context(|| format!("failed to open {}", csv_path.display()))?;
    let mut imported = 0usize;

    for result in reader.deserialize::<CsvRow>() {
        let row = result?;
        let grade_type: GradeType = row.grade_type.parse()?;
        let transition: Transition = row.transition.parse()?;

        if upsert_cohort_average(pool, row.year.trim(), grade_type, transition, row.average).await?
            > 0
        {
            imported += 1;
        }
    }

    Ok(imported)
}

pub async fn fetch_academic_years(pool: &PgPool) -> anyhow::Result<Vec<AcademicYear>> {
    let rows = sqlx::query("SELECT id, year_name FROM grade_tracker.academic_years ORDER BY id")
        .fetch_all(pool)
        .await?;

    Ok(rows
        .into_iter()
        .map(|row| AcademicYear {
            id: row.get("id"),
            name: row.get("year_name"),
        })
        .collect())
}

pub async fn fetch_semesters(pool: &PgPool) -> anyhow::Result<Vec<Semester>> {
    let rows = sqlx::query("SELECT id, semester_name FROM grade_tracker.semesters ORDER BY id")
        .fetch_all(pool)
        .await?;

    Ok(rows
        .into_iter()
        .map(|row| Semester {
            id: row.get("id"),
            name: row.get("semester_name"),
        })
        .collect())
}

pub async fn resolve_study_cycle(
    pool: &PgPool,
    year: i32,
    semester: Option<i32>,
) -> anyhow::Result<i32> {
    let mut query = String::from(
        "SELECT id FROM grade_tracker.study_cycles WHERE academic_year_id = $1",
    );

    let semester = if year > LAST_SEMESTER_YEAR {
        None
    } else {
        Some(semester.context("a semester is required for years I to III")?)
    };

    if semester.is_some() {
        query.push_str(" AND semester_id = $2");
    }
    query.push_str(" ORDER BY id LIMIT 1");

    let mut rows = sqlx::query(&query).bind(year);
    if let Some(value) = semester {
        rows = rows.bind(value);
    }

    let row = rows
        .fetch_optional(pool)
        .await?
        .with_context(|| match semester {
            Some(s) => format!("no study cycle for year {year}, semester {s}"),
            None => format!("no study cycle for year {year}"),
        })?;

    Ok(row.get("id"))
}

pub async fn find_student(pool: &PgPool, email: &str) -> anyhow::Result<Option<Student>> {
    let row = sqlx::query("SELECT id, email FROM grade_tracker.students WHERE email = $1")
        .bind(email.trim().to_lowercase())
        .fetch_optional(pool)
        .await?;

    Ok(row.map(|row| Student {
        id: row.get("id"),
        email: row.get("email"),
    }))
}

pub async fn register_student(pool: &PgPool, email: &str) -> anyhow::Result<Student> {
    let email = email.trim().to_lowercase();
    let id: Uuid = sqlx::query(
        r#"
        INSERT INTO grade_tracker.students (id, email)
        VALUES ($1, $2)
        ON CONFLICT (email) DO UPDATE SET email = EXCLUDED.email
        RETURNING id
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(&email)
    .fetch_one(pool)
    .await?
    .get("id");

    Ok(Student { id, email })
}

pub async fn upsert_study_config(pool: &PgPool, config: &StudyConfig) -> anyhow::Result<()> {
    sqlx::query(
        r#"
        INSERT INTO grade_tracker.study_configs (student_id, study_cycle_id, rotation, updated_at)
        VALUES ($1, $2, $3, $4)
        ON CONFLICT (student_id) DO UPDATE
        SET study_cycle_id = EXCLUDED.study_cycle_id,
            rotation = EXCLUDED.rotation,
            updated_at = EXCLUDED.updated_at
        "#,
    )
    .bind(config.student_id)
    .bind(config.study_cycle_id)
    .bind(config.rotation.as_deref())
    .bind(Utc::now())
    .execute(pool)
    .await?;

    Ok(())
}

pub async fn fetch_study_config(
    pool: &PgPool,
    student_id: Uuid,
) -> anyhow::Result<Option<StudyConfig>> {
    let row = sqlx::query(
        "SELECT student_id, study_cycle_id, rotation FROM grade_tracker.study_configs WHERE student_id = $1",
    )
    .bind(student_id)
    .fetch_optional(pool)
    .await?;

    Ok(row.map(|row| StudyConfig {
        student_id: row.get("student_id"),
        study_cycle_id: row.get("study_cycle_id"),
        rotation: row.get("rotation"),
    }))
}

pub async fn fetch_subjects(pool: &PgPool, study_cycle_id: i32) -> anyhow::Result<Vec<Subject>> {
    let rows = sqlx::query(
        "SELECT id, subject_name, credits, difficulty, study_cycle_id \
         FROM grade_tracker.subjects \
         WHERE study_cycle_id = $1 \
         ORDER BY subject_name",
    )
    .bind(study_cycle_id)
    .fetch_all(pool)
    .await?;

    let mut subjects = Vec::with_capacity(rows.len());
    for row in rows {
        let difficulty: Option<String> = row.get("difficulty");
        subjects.push(Subject {
            id: row.get("id"),
            name: row.get("subject_name"),
            credits: row.get("credits"),
            difficulty: difficulty
                .as_deref()
                .map(str::parse::<Difficulty>)
                .transpose()?,
            study_cycle_id: row.get("study_cycle_id"),
        });
    }

    debug!(study_cycle_id, count = subjects.len(), "subjects loaded");
    Ok(subjects)
}

pub async fn update_subject_difficulty(
    pool: &PgPool,
    subject_id: Uuid,
    difficulty: Difficulty,
) -> anyhow::Result<bool> {
    let result = sqlx::query("UPDATE grade_tracker.subjects SET difficulty = $1 WHERE id = $2")
        .bind(difficulty.as_str())
        .bind(subject_id)
        .execute(pool)
        .await?;

    Ok(result.rows_affected() > 0)
}

pub async fn fetch_grades(pool: &PgPool, student_id: Uuid) -> anyhow::Result<GradeMap> {
    let rows = sqlx::query(
        "SELECT subject_id, grade, completed FROM grade_tracker.grades WHERE student_id = $1",
    )
    .bind(student_id)
    .fetch_all(pool)
    .await?;

    Ok(rows
        .into_iter()
        .map(|row| {
            let subject_id: Uuid = row.get("subject_id");
            (
                subject_id,
                GradeEntry {
                    grade: row.get("grade"),
                    completed: row.get("completed"),
                },
            )
        })
        .collect())
}

pub async fn upsert_grade(
    pool: &PgPool,
    student_id: Uuid,
    subject_id: Uuid,
    entry: &GradeEntry,
) -> anyhow::Result<()> {
    sqlx::query(
        r#"
        INSERT INTO grade_tracker.grades (student_id, subject_id, grade, completed, updated_at)
        VALUES ($1, $2, $3, $4, $5)
        ON CONFLICT (student_id, subject_id) DO UPDATE
        SET grade = EXCLUDED.grade,
            completed = EXCLUDED.completed,
            updated_at = EXCLUDED.updated_at
        "#,
    )
    .bind(student_id)
    .bind(subject_id)
    .bind(entry.grade)
    .bind(entry.completed)
    .bind(Utc::now())
    .execute(pool)
    .await?;

    Ok(())
}

pub async fn fetch_cohort_history(
    pool: &PgPool,
    grade_type: GradeType,
    transition: Transition,
) -> anyhow::Result<Vec<CohortAverage>> {
    let rows = sqlx::query(
        "SELECT year, average FROM grade_tracker.cohort_averages \
         WHERE grade_type = $1 AND transition = $2 \
         ORDER BY year ASC",
    )
    .bind(grade_type.as_str())
    .bind(transition.code())
    .fetch_all(pool)
    .await?;

    Ok(rows
        .into_iter()
        .map(|row| CohortAverage {
            year: row.get("year"),
            average: row.get("average"),
        })
        .collect())
}

/// Most recent cohort value that is actually recorded.
pub async fn latest_cohort_average(
    pool: &PgPool,
    grade_type: GradeType,
    transition: Transition,
) -> anyhow::Result<Option<f64>> {
    let history = fetch_cohort_history(pool, grade_type, transition).await?;
    Ok(history.iter().rev().find_map(|row| row.average))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn study_cycle_ids_are_stable() {
        assert_eq!(study_cycle_id(1, Some(1)), 11);
        assert_eq!(study_cycle_id(3, Some(2)), 32);
        assert_eq!(study_cycle_id(5, None), 50);
    }
}
