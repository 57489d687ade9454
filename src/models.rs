use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, clap::ValueEnum)]
pub enum Difficulty {
    Easy,
    Medium,
    Hard,
}

impl Difficulty {
    /// Fallback tag for subjects that were never labelled.
    pub fn from_credits(credits: f64) -> Self {
        if credits <= 4.0 {
            Difficulty::Easy
        } else if credits <= 8.0 {
            Difficulty::Medium
        } else {
            Difficulty::Hard
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Difficulty::Easy => "easy",
            Difficulty::Medium => "medium",
            Difficulty::Hard => "hard",
        }
    }
}

impl fmt::Display for Difficulty {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Difficulty {
    type Err = anyhow::Error;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "easy" => Ok(Difficulty::Easy),
            "medium" => Ok(Difficulty::Medium),
            "hard" => Ok(Difficulty::Hard),
            other => anyhow::bail!("unknown difficulty '{other}'"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Subject {
    pub id: Uuid,
    pub name: String,
    pub credits: f64,
    pub difficulty: Option<Difficulty>,
    pub study_cycle_id: i32,
}

impl Subject {
    pub fn effective_difficulty(&self) -> Difficulty {
        self.difficulty
            .unwrap_or_else(|| Difficulty::from_credits(self.credits))
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct GradeEntry {
    pub grade: f64,
    pub completed: bool,
}

impl GradeEntry {
    pub const CLEARED: GradeEntry = GradeEntry {
        grade: 0.0,
        completed: false,
    };
}

/// Sparse grade map; a subject with no key has no grade yet.
pub type GradeMap = HashMap<Uuid, GradeEntry>;

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct AverageStats {
    pub current_average: f64,
    pub auto_average: f64,
    pub projected_average: f64,
    pub completed_credits: f64,
    pub remaining_credits: f64,
    pub total_possible_credits: f64,
}

#[derive(Debug, Clone)]
pub struct Student {
    pub id: Uuid,
    pub email: String,
}

#[derive(Debug, Clone)]
pub struct AcademicYear {
    pub id: i32,
    pub name: String,
}

#[derive(Debug, Clone)]
pub struct Semester {
    pub id: i32,
    pub name: String,
}

#[derive(Debug, Clone)]
pub struct StudyConfig {
    pub student_id: Uuid,
    pub study_cycle_id: i32,
    pub rotation: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, clap::ValueEnum)]
pub enum GradeType {
    Budget,
    Scholarship,
}

impl GradeType {
    pub fn as_str(&self) -> &'static str {
        match self {
            GradeType::Budget => "budget",
            GradeType::Scholarship => "scholarship",
        }
    }
}

impl FromStr for GradeType {
    type Err = anyhow::Error;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "budget" => Ok(GradeType::Budget),
            "scholarship" => Ok(GradeType::Scholarship),
            other => anyhow::bail!("unknown grade type '{other}'"),
        }
    }
}

/// Promotion step between two study years.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, clap::ValueEnum)]
pub enum Transition {
    #[value(name = "I-II")]
    FirstToSecond,
    #[value(name = "II-III")]
    SecondToThird,
    #[value(name = "III-IV")]
    ThirdToFourth,
    #[value(name = "IV-V")]
    FourthToFifth,
    #[value(name = "V-VI")]
    FifthToSixth,
}

impl Transition {
    pub fn code(&self) -> &'static str {
        match self {
            Transition::FirstToSecond => "I-II",
            Transition::SecondToThird => "II-III",
            Transition::ThirdToFourth => "III-IV",
            Transition::FourthToFifth => "IV-V",
            Transition::FifthToSixth => "V-VI",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Transition::FirstToSecond => "Year I to II",
            Transition::SecondToThird => "Year II to III",
            Transition::ThirdToFourth => "Year III to IV",
            Transition::FourthToFifth => "Year IV to V",
            Transition::FifthToSixth => "Year V to VI",
        }
    }
}

impl FromStr for Transition {
    type Err = anyhow::Error;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim() {
            "I-II" => Ok(Transition::FirstToSecond),
            "II-III" => Ok(Transition::SecondToThird),
            "III-IV" => Ok(Transition::ThirdToFourth),
            "IV-V" => Ok(Transition::FourthToFifth),
            "V-VI" => Ok(Transition::FifthToSixth),
            other => anyhow::bail!("unknown year transition '{other}'"),
        }
    }
}

/// Minimum admission average published for one cohort year.
#[derive(Debug, Clone)]
pub struct CohortAverage {
    pub year: String,
    pub average: Option<f64>,
}

/// Comparison value for the recommendation step.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TargetAverage {
    Custom(f64),
    Historical {
        grade_type: GradeType,
        transition: Transition,
    },
}

#[derive(Debug, Clone)]
pub struct ReportMeta {
    pub student_email: String,
    pub generated_on: NaiveDate,
    pub mode_label: &'static str,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_difficulty_follows_credit_tiers() {
        assert_eq!(Difficulty::from_credits(1.0), Difficulty::Easy);
        assert_eq!(Difficulty::from_credits(4.0), Difficulty::Easy);
        assert_eq!(Difficulty::from_credits(4.5), Difficulty::Medium);
        assert_eq!(Difficulty::from_credits(8.0), Difficulty::Medium);
        assert_eq!(Difficulty::from_credits(12.0), Difficulty::Hard);
    }

    #[test]
    fn stored_difficulty_wins_over_default() {
        let subject = Subject {
            id: Uuid::new_v4(),
            name: "Ethics".to_string(),
            credits: 12.0,
            difficulty: Some(Difficulty::Easy),
            study_cycle_id: 40,
        };
        assert_eq!(subject.effective_difficulty(), Difficulty::Easy);
    }

    #[test]
    fn labels_parse_back() {
        assert_eq!(" Hard ".parse::<Difficulty>().unwrap(), Difficulty::Hard);
        assert!("extreme".parse::<Difficulty>().is_err());
        assert_eq!("scholarship".parse::<GradeType>().unwrap(), GradeType::Scholarship);
        for transition in [
            Transition::FirstToSecond,
            Transition::SecondToThird,
            Transition::ThirdToFourth,
            Transition::FourthToFifth,
            Transition::FifthToSixth,
        ] {
            assert_eq!(transition.code().parse::<Transition>().unwrap(), transition);
        }
    }

    #[test]
    fn grade_entries_serialize_as_plain_objects() {
        let json = serde_json::to_string(&GradeEntry { grade: 7.5, completed: true }).unwrap();
        assert_eq!(json, r#"{"grade":7.5,"completed":true}"#);
    }
}
