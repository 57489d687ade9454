use std::collections::BTreeMap;
use std::path::PathBuf;

use anyhow::Context;
use async_trait::async_trait;
use sqlx::PgPool;
use tracing::info;
use uuid::Uuid;

use crate::db;
use crate::models::{GradeEntry, GradeMap};

/// Where a student's grade entries live.
#[async_trait]
pub trait GradeStore: Send + Sync {
    async fn load(&self) -> anyhow::Result<GradeMap>;
    async fn save(&self, subject_id: Uuid, entry: &GradeEntry) -> anyhow::Result<()>;

    fn label(&self) -> &'static str;
}

/// Every student's simulated entries, sorted so the file stays diffable.
type SimulatedGrades = BTreeMap<Uuid, BTreeMap<Uuid, GradeEntry>>;

/// Simulation mode: entries kept in a local JSON file, never touching the database.
/// The file holds all students, keyed by student id then subject id.
pub struct JsonFileStore {
    path: PathBuf,
    student_id: Uuid,
}

impl JsonFileStore {
    pub fn new(path: impl Into<PathBuf>, student_id: Uuid) -> Self {
        Self {
            path: path.into(),
            student_id,
        }
    }

    async fn read_all(&self) -> anyhow::Result<SimulatedGrades> {
        let content = match tokio::fs::read_to_string(&self.path).await {
            Ok(content) => content,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                return Ok(SimulatedGrades::new())
            }
            Err(err) => {
                return Err(err)
                    .with_context(|| format!("failed to read {}", self.path.display()))
            }
        };

        if content.trim().is_empty() {
            return Ok(SimulatedGrades::new());
        }

        serde_json::from_str(&content)
            .with_context(|| format!("invalid simulated grades in {}", self.path.display()))
    }
}

#[async_trait]
impl GradeStore for JsonFileStore {
    async fn load(&self) -> anyhow::Result<GradeMap> {
        let mut all = self.read_all().await?;
        Ok(all
            .remove(&self.student_id)
            .unwrap_or_default()
            .into_iter()
            .collect())
    }

    async fn save(&self, subject_id: Uuid, entry: &GradeEntry) -> anyhow::Result<()> {
        let mut all = self.read_all().await?;
        all.entry(self.student_id)
            .or_default()
            .insert(subject_id, *entry);

        let json = serde_json::to_string_pretty(&all)?;
        tokio::fs::write(&self.path, json)
            .await
            .with_context(|| format!("failed to write {}", self.path.display()))?;

        info!(
            %subject_id,
            student_id = %self.student_id,
            path = %self.path.display(),
            "simulated grade saved"
        );
        Ok(())
    }

    fn label(&self) -> &'static str {
        "simulation"
    }
}

/// Real mode: entries upserted into the `grades` table.
pub struct PgGradeStore {
    pool: PgPool,
    student_id: Uuid,
}

impl PgGradeStore {
    pub fn new(pool: PgPool, student_id: Uuid) -> Self {
        Self { pool, student_id }
    }
}

#[async_trait]
impl GradeStore for PgGradeStore {
    async fn load(&self) -> anyhow::Result<GradeMap> {
        db::fetch_grades(&self.pool, self.student_id).await
    }

    async fn save(&self, subject_id: Uuid, entry: &GradeEntry) -> anyhow::Result<()> {
        db::upsert_grade(&self.pool, self.student_id, subject_id, entry).await?;
        info!(%subject_id, student_id = %self.student_id, "grade saved");
        Ok(())
    }

    fn label(&self) -> &'static str {
        "real"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn missing_file_loads_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileStore::new(dir.path().join("grades.json"), Uuid::new_v4());

        assert!(store.load().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn saves_merge_into_existing_entries() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileStore::new(dir.path().join("grades.json"), Uuid::new_v4());
        let anatomy = Uuid::new_v4();
        let surgery = Uuid::new_v4();

        store
            .save(anatomy, &GradeEntry { grade: 8.5, completed: true })
            .await
            .unwrap();
        store
            .save(surgery, &GradeEntry { grade: 6.0, completed: false })
            .await
            .unwrap();
        store.save(anatomy, &GradeEntry::CLEARED).await.unwrap();

        let grades = store.load().await.unwrap();
        assert_eq!(grades.len(), 2);
        assert_eq!(grades[&anatomy], GradeEntry::CLEARED);
        assert_eq!(grades[&surgery], GradeEntry { grade: 6.0, completed: false });
    }

    #[tokio::test]
    async fn corrupt_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("grades.json");
        std::fs::write(&path, "{not json").unwrap();

        assert!(JsonFileStore::new(path, Uuid::new_v4()).load().await.is_err());
    }

    #[tokio::test]
    async fn students_do_not_share_simulated_grades() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("grades.json");
        let alice = JsonFileStore::new(&path, Uuid::new_v4());
        let bob = JsonFileStore::new(&path, Uuid::new_v4());
        let anatomy = Uuid::new_v4();

        alice
            .save(anatomy, &GradeEntry { grade: 9.0, completed: true })
            .await
            .unwrap();
        assert!(bob.load().await.unwrap().get(&anatomy).is_none());

        bob.save(anatomy, &GradeEntry { grade: 4.0, completed: false })
            .await
            .unwrap();

        let alice_grades = alice.load().await.unwrap();
        assert_eq!(alice_grades[&anatomy], GradeEntry { grade: 9.0, completed: true });
        let bob_grades = bob.load().await.unwrap();
        assert_eq!(bob_grades[&anatomy], GradeEntry { grade: 4.0, completed: false });
    }
}
