use std::fmt::Write;

use crate::aggregator::{self, GradeStatus, Recommendation};
use crate::models::{CohortAverage, GradeMap, GradeType, ReportMeta, Subject, Transition};

/// Lowest whole grade to show on a cohort chart; 0 when no year has a value.
pub fn chart_floor(history: &[CohortAverage]) -> f64 {
    history
        .iter()
        .filter_map(|row| row.average)
        .filter(|value| value.is_finite())
        .min_by(|a, b| a.total_cmp(b))
        .map(f64::floor)
        .unwrap_or(0.0)
}

pub fn build_history_summary(
    grade_type: GradeType,
    transition: Transition,
    history: &[CohortAverage],
) -> String {
    let mut output = String::new();
    let _ = writeln!(
        output,
        "## Cohort History ({}, {})",
        grade_type.as_str(),
        transition.label()
    );

    if history.is_empty() {
        let _ = writeln!(output, "No grade data available.");
        return output;
    }

    for row in history {
        match row.average {
            Some(value) => {
                let _ = writeln!(output, "- {}: {:.2}", row.year, value);
            }
            None => {
                let _ = writeln!(output, "- {}: n/a", row.year);
            }
        }
    }
    let _ = writeln!(output, "Chart range: {:.0} to 10", chart_floor(history));

    output
}

/// Shared wording for the average still needed to reach a target.
pub fn needed_average_line(needed: Option<f64>) -> String {
    match needed {
        Some(needed) if needed > aggregator::MAX_GRADE => {
            format!("Needed on remaining credits: {needed:.2} (out of reach)")
        }
        Some(needed) => format!("Needed on remaining credits: {:.2}", needed.max(0.0)),
        None => "No credits remaining.".to_string(),
    }
}

fn status_marker(status: GradeStatus) -> &'static str {
    match status {
        GradeStatus::Passing => "pass",
        GradeStatus::Failing => "below 5",
        GradeStatus::Ungraded => "-",
    }
}

pub fn build_progress_report(
    meta: &ReportMeta,
    subjects: &[Subject],
    grades: &GradeMap,
    recommendation: &Recommendation,
    advice: Option<&str>,
) -> String {
    let stats = aggregator::compute_stats(subjects, grades);
    let mut output = String::new();

    let _ = writeln!(output, "# Grade Progress Report");
    let _ = writeln!(
        output,
        "Generated for {} on {} ({} mode)",
        meta.student_email, meta.generated_on, meta.mode_label
    );
    let _ = writeln!(output);
    let _ = writeln!(output, "## Averages");
    let _ = writeln!(output, "- Current average: {:.2}", stats.current_average);
    let _ = writeln!(output, "- Average of entered grades: {:.2}", stats.auto_average);
    let _ = writeln!(output, "- Projected average: {:.2}", stats.projected_average);
    let _ = writeln!(output, "- Completed: {} credits", stats.completed_credits);
    let _ = writeln!(output, "- Remaining: {} credits", stats.remaining_credits);
    let _ = writeln!(output, "- Total available: {} credits", stats.total_possible_credits);

    let _ = writeln!(output);
    let _ = writeln!(output, "## Subjects");

    if subjects.is_empty() {
        let _ = writeln!(output, "No subjects configured for this study cycle.");
    } else {
        let _ = writeln!(output, "| Subject | Credits | Difficulty | Grade | Completed | Status |");
        let _ = writeln!(output, "|---|---|---|---|---|---|");
        for subject in subjects {
            let entry = grades.get(&subject.id);
            let grade = match entry {
                Some(e) if e.grade > 0.0 => format!("{:.2}", e.grade),
                _ => "-".to_string(),
            };
            let completed = if entry.map(|e| e.completed).unwrap_or(false) {
                "yes"
            } else {
                "no"
            };
            let _ = writeln!(
                output,
                "| {} | {} | {} | {} | {} | {} |",
                subject.name,
                subject.credits,
                subject.effective_difficulty(),
                grade,
                completed,
                status_marker(aggregator::grade_status(entry))
            );
        }
    }

    if let Some(comparison) = recommendation.comparison {
        let _ = writeln!(output);
        let _ = writeln!(output, "## Target");
        let _ = writeln!(output, "- Target average: {:.2}", comparison.target);
        let _ = writeln!(output, "- Difference: {:+.2}", comparison.delta);
        let _ = writeln!(output, "- {}", needed_average_line(comparison.needed_average));
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Priorities");

    if recommendation.candidates.is_empty() {
        let _ = writeln!(output, "All subjects are completed.");
    } else {
        for (rank, candidate) in recommendation.candidates.iter().take(5).enumerate() {
            let _ = writeln!(
                output,
                "{}. {} ({} credits, {})",
                rank + 1,
                candidate.name,
                candidate.credits,
                candidate.difficulty
            );
        }
    }

    if let Some(advice) = advice {
        let _ = writeln!(output);
        let _ = writeln!(output, "## Advice");
        for line in advice.lines() {
            let _ = writeln!(output, "{line}");
        }
    }

    output
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{GradeEntry, ReportMeta};
    use chrono::NaiveDate;
    use uuid::Uuid;

    fn row(year: &str, average: Option<f64>) -> CohortAverage {
        CohortAverage {
            year: year.to_string(),
            average,
        }
    }

    fn subject(name: &str, credits: f64) -> Subject {
        Subject {
            id: Uuid::new_v4(),
            name: name.to_string(),
            credits,
            difficulty: None,
            study_cycle_id: 11,
        }
    }

    #[test]
    fn chart_floor_uses_lowest_value() {
        let history = vec![row("2022", Some(8.7)), row("2023", None), row("2024", Some(7.4))];
        assert_eq!(chart_floor(&history), 7.0);
        assert_eq!(chart_floor(&[row("2024", None)]), 0.0);
        assert_eq!(chart_floor(&[]), 0.0);
    }

    #[test]
    fn needed_average_wording() {
        assert_eq!(needed_average_line(Some(6.0)), "Needed on remaining credits: 6.00");
        assert_eq!(needed_average_line(Some(-2.5)), "Needed on remaining credits: 0.00");
        assert_eq!(
            needed_average_line(Some(11.2)),
            "Needed on remaining credits: 11.20 (out of reach)"
        );
        assert_eq!(needed_average_line(None), "No credits remaining.");
    }

    #[test]
    fn history_summary_handles_gaps() {
        let history = vec![row("2023", Some(8.51)), row("2024", None)];
        let summary =
            build_history_summary(GradeType::Budget, Transition::FirstToSecond, &history);

        assert!(summary.contains("Year I to II"));
        assert!(summary.contains("- 2023: 8.51"));
        assert!(summary.contains("- 2024: n/a"));
        assert!(summary.contains("Chart range: 8 to 10"));
    }

    #[test]
    fn progress_report_lists_subjects_and_target() {
        let anatomy = subject("Anatomy", 30.0);
        let surgery = subject("Surgery", 30.0);
        let mut grades = GradeMap::new();
        grades.insert(anatomy.id, GradeEntry { grade: 8.0, completed: true });
        grades.insert(surgery.id, GradeEntry { grade: 4.0, completed: false });
        let subjects = vec![anatomy, surgery];
        let recommendation = aggregator::recommend(Some(7.0), &subjects, &grades);
        let meta = ReportMeta {
            student_email: "demo.student@groupscholar.com".to_string(),
            generated_on: NaiveDate::from_ymd_opt(2026, 3, 1).unwrap(),
            mode_label: "simulation",
        };

        let report =
            build_progress_report(&meta, &subjects, &grades, &recommendation, Some("Study more"));

        assert!(report.contains("Current average: 4.00"));
        assert!(report.contains("Average of entered grades: 6.00"));
        assert!(report.contains("| Anatomy | 30 | hard | 8.00 | yes | pass |"));
        assert!(report.contains("| Surgery | 30 | hard | 4.00 | no | below 5 |"));
        assert!(report.contains("Difference: -1.00"));
        assert!(report.contains("Needed on remaining credits: 6.00"));
        assert!(report.contains("1. Surgery (30 credits, hard)"));
        assert!(report.contains("## Advice\nStudy more"));
    }
}
