use std::cmp::Ordering;

use tracing::debug;
use uuid::Uuid;

use crate::models::{AverageStats, Difficulty, GradeEntry, GradeMap, Subject};

/// Credit total of a full program year, used for projection.
pub const TOTAL_CREDITS: f64 = 60.0;
pub const MIN_GRADE: f64 = 0.0;
pub const MAX_GRADE: f64 = 10.0;
pub const PASSING_GRADE: f64 = 5.0;

pub fn compute_stats(subjects: &[Subject], grades: &GradeMap) -> AverageStats {
    let mut weighted_sum = 0.0;
    let mut total_credits = 0.0;
    let mut completed_credits = 0.0;
    let mut total_possible_credits = 0.0;
    let mut auto_weighted_sum = 0.0;
    let mut auto_credits = 0.0;

    for subject in subjects {
        total_possible_credits += subject.credits;
        total_credits += subject.credits;

        let Some(entry) = grades.get(&subject.id) else {
            continue;
        };

        if entry.grade > 0.0 {
            auto_weighted_sum += entry.grade * subject.credits;
            auto_credits += subject.credits;
        }

        if entry.completed {
            weighted_sum += entry.grade * subject.credits;
            completed_credits += subject.credits;
        }
    }

    AverageStats {
        current_average: weighted_average(weighted_sum, total_credits),
        auto_average: weighted_average(auto_weighted_sum, auto_credits),
        projected_average: weighted_average(weighted_sum, TOTAL_CREDITS),
        completed_credits,
        remaining_credits: TOTAL_CREDITS - completed_credits,
        total_possible_credits,
    }
}

fn weighted_average(sum: f64, credits: f64) -> f64 {
    if credits == 0.0 {
        0.0
    } else {
        sum / credits
    }
}

/// Parses a grade field. `None` for anything that is not a finite number in range.
pub fn parse_grade(raw: &str) -> Option<f64> {
    let value: f64 = raw.trim().parse().ok()?;
    if value.is_finite() && (MIN_GRADE..=MAX_GRADE).contains(&value) {
        Some(value)
    } else {
        None
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SetGradeOutcome {
    Cleared,
    Updated(f64),
    Rejected,
}

/// Grade entries for one student, edited the way the grade form edits them.
#[derive(Debug, Clone, Default)]
pub struct GradeBook {
    entries: GradeMap,
}

impl GradeBook {
    pub fn new(entries: GradeMap) -> Self {
        Self { entries }
    }

    pub fn entry(&self, subject_id: Uuid) -> Option<&GradeEntry> {
        self.entries.get(&subject_id)
    }

    pub fn set_grade(&mut self, subject_id: Uuid, raw: &str) -> SetGradeOutcome {
        if raw.trim().is_empty() {
            self.entries.insert(subject_id, GradeEntry::CLEARED);
            return SetGradeOutcome::Cleared;
        }

        let Some(grade) = parse_grade(raw) else {
            debug!(%subject_id, raw, "ignoring invalid grade input");
            return SetGradeOutcome::Rejected;
        };

        let completed = self
            .entries
            .get(&subject_id)
            .map(|entry| entry.completed)
            .unwrap_or(false);
        self.entries
            .insert(subject_id, GradeEntry { grade, completed });
        SetGradeOutcome::Updated(grade)
    }

    pub fn set_completed(&mut self, subject_id: Uuid, completed: bool) -> GradeEntry {
        let entry = self.entries.entry(subject_id).or_default();
        entry.completed = completed;
        *entry
    }

    pub fn stats(&self, subjects: &[Subject]) -> AverageStats {
        compute_stats(subjects, &self.entries)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GradeStatus {
    Ungraded,
    Passing,
    Failing,
}

pub fn grade_status(entry: Option<&GradeEntry>) -> GradeStatus {
    match entry.map(|e| e.grade) {
        Some(grade) if grade >= PASSING_GRADE => GradeStatus::Passing,
        Some(grade) if grade > 0.0 => GradeStatus::Failing,
        _ => GradeStatus::Ungraded,
    }
}

/// Per-subject snapshot handed to the advisor.
#[derive(Debug, Clone, PartialEq)]
pub struct SubjectAnalysis {
    pub name: String,
    pub credits: f64,
    pub difficulty: Difficulty,
    pub grade: f64,
    pub completed: bool,
}

pub fn analyze(subjects: &[Subject], grades: &GradeMap) -> Vec<SubjectAnalysis> {
    subjects
        .iter()
        .map(|subject| {
            let entry = grades.get(&subject.id).copied().unwrap_or_default();
            SubjectAnalysis {
                name: subject.name.clone(),
                credits: subject.credits,
                difficulty: subject.effective_difficulty(),
                grade: entry.grade,
                completed: entry.completed,
            }
        })
        .collect()
}

pub fn validate_target(value: f64) -> anyhow::Result<f64> {
    if value.is_finite() && (MIN_GRADE..=MAX_GRADE).contains(&value) {
        Ok(value)
    } else {
        anyhow::bail!("target average must be between {MIN_GRADE} and {MAX_GRADE}, got {value}")
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TargetComparison {
    pub target: f64,
    /// Positive when the auto average is above target.
    pub delta: f64,
    /// Average still needed across the remaining credits; `None` once nothing remains.
    pub needed_average: Option<f64>,
}

pub fn compare_target(stats: &AverageStats, target: f64) -> TargetComparison {
    let completed_sum = stats.projected_average * TOTAL_CREDITS;
    let needed_average = if stats.remaining_credits > 0.0 {
        Some((target * TOTAL_CREDITS - completed_sum) / stats.remaining_credits)
    } else {
        None
    };

    TargetComparison {
        target,
        delta: stats.auto_average - target,
        needed_average,
    }
}

#[derive(Debug, Clone)]
pub struct Recommendation {
    pub auto_average: f64,
    pub comparison: Option<TargetComparison>,
    pub analysis: Vec<SubjectAnalysis>,
    /// Unfinished subjects, highest priority first.
    pub candidates: Vec<SubjectAnalysis>,
}

pub fn recommend(target: Option<f64>, subjects: &[Subject], grades: &GradeMap) -> Recommendation {
    let stats = compute_stats(subjects, grades);
    let analysis = analyze(subjects, grades);

    let mut candidates: Vec<SubjectAnalysis> = analysis
        .iter()
        .filter(|subject| !subject.completed)
        .cloned()
        .collect();
    candidates.sort_by(priority_order);

    Recommendation {
        auto_average: stats.auto_average,
        comparison: target.map(|value| compare_target(&stats, value)),
        analysis,
        candidates,
    }
}

fn priority_order(a: &SubjectAnalysis, b: &SubjectAnalysis) -> Ordering {
    a.grade
        .total_cmp(&b.grade)
        .then_with(|| a.credits.total_cmp(&b.credits))
        .then_with(|| b.difficulty.cmp(&a.difficulty))
        .then_with(|| a.name.cmp(&b.name))
}
