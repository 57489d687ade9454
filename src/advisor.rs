//! Advisory text for unfinished subjects.
//!
//! [`Advisor`] is the seam to whatever produces the wording. [`HuggingFaceAdvisor`]
//! calls a hosted text-generation model. Callers go through [`advise_or_fallback`],
//! which never fails: any [`AdvisorError`] becomes [`FALLBACK_MESSAGE`].

use std::fmt::Write;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::aggregator::{Recommendation, SubjectAnalysis};

pub const FALLBACK_MESSAGE: &str =
    "AI analysis is temporarily unavailable. Please try again later.";

pub const NO_GRADES_HINT: &str = "Enter some grades to get AI analysis.";

pub const DEFAULT_MODEL: &str = "HuggingFaceH4/zephyr-7b-beta";
pub const DEFAULT_API_BASE: &str = "https://api-inference.huggingface.co";

const MAX_RECOMMENDATIONS: usize = 5;

#[derive(Debug, thiserror::Error)]
pub enum AdvisorError {
    #[error("advisor token is not configured")]
    MissingToken,

    #[error("advisor HTTP client unavailable: {0}")]
    Client(String),

    #[error("advisor request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("advisor returned status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("advisor returned no text")]
    EmptyResponse,
}

#[async_trait]
pub trait Advisor: Send + Sync {
    async fn advise(
        &self,
        average: f64,
        subjects: &[SubjectAnalysis],
        target: Option<f64>,
    ) -> Result<String, AdvisorError>;
}

pub async fn advise_or_fallback(
    advisor: &dyn Advisor,
    average: f64,
    subjects: &[SubjectAnalysis],
    target: Option<f64>,
) -> String {
    match advisor.advise(average, subjects, target).await {
        Ok(text) => text,
        Err(err) => {
            warn!(error = %err, "advisor unavailable, using fallback text");
            FALLBACK_MESSAGE.to_string()
        }
    }
}

/// Advisory text for a recommendation; the hint when nothing has been graded yet.
pub async fn advice_for(advisor: &dyn Advisor, recommendation: &Recommendation) -> String {
    if recommendation.auto_average == 0.0 {
        return NO_GRADES_HINT.to_string();
    }

    advise_or_fallback(
        advisor,
        recommendation.auto_average,
        &recommendation.analysis,
        recommendation.comparison.map(|c| c.target),
    )
    .await
}

pub fn build_prompt(average: f64, subjects: &[SubjectAnalysis], target: Option<f64>) -> String {
    let (completed, pending): (Vec<&SubjectAnalysis>, Vec<&SubjectAnalysis>) =
        subjects.iter().partition(|s| s.completed);

    let mut prompt = String::new();
    let _ = writeln!(
        prompt,
        "Analyze academic performance and provide specific advice in English:"
    );
    let _ = writeln!(prompt);
    let _ = writeln!(prompt, "Academic Status:");
    let _ = writeln!(prompt, "- Overall Average: {average:.2}");
    if let Some(target) = target {
        let _ = writeln!(prompt, "- Target Average: {target:.2}");
    }
    let _ = writeln!(prompt, "- Remaining Subjects (incomplete): {}", pending.len());
    let _ = writeln!(prompt, "- Completed Subjects: {}", completed.len());
    let _ = writeln!(prompt);
    let _ = writeln!(prompt, "All Subjects:");

    for subject in completed.iter() {
        let _ = writeln!(prompt, "{}", describe(subject, "COMPLETED"));
    }
    for subject in pending.iter() {
        let _ = writeln!(prompt, "{}", describe(subject, "IN PROGRESS"));
    }

    let _ = writeln!(prompt);
    let _ = writeln!(prompt, "Provide recommendations ONLY for IN PROGRESS subjects.");
    let _ = writeln!(prompt);
    let _ = writeln!(prompt, "Prioritize incomplete subjects based on:");
    let _ = writeln!(prompt, "1. Lower grades");
    let _ = writeln!(prompt, "2. Fewer credit points");
    let _ = writeln!(prompt, "3. Higher difficulty");
    let _ = writeln!(prompt);
    let _ = write!(prompt, "Limit to maximum {MAX_RECOMMENDATIONS} recommendations.");

    prompt
}

fn describe(subject: &SubjectAnalysis, status: &str) -> String {
    let grade = if subject.grade > 0.0 {
        format!("{}", subject.grade)
    } else {
        "not graded".to_string()
    };
    format!(
        "- {}: Grade {} ({} credits, difficulty {}) - {}",
        subject.name, grade, subject.credits, subject.difficulty, status
    )
}

/// Drops surrounding whitespace and blank lines from model output.
pub fn tidy_output(raw: &str) -> String {
    raw.trim()
        .lines()
        .filter(|line| !line.trim().is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

#[derive(Serialize)]
struct GenerationRequest<'a> {
    inputs: &'a str,
    parameters: GenerationParameters,
}

#[derive(Serialize)]
struct GenerationParameters {
    max_new_tokens: u32,
    temperature: f32,
    top_p: f32,
    do_sample: bool,
    return_full_text: bool,
}

impl Default for GenerationParameters {
    fn default() -> Self {
        Self {
            max_new_tokens: 250,
            temperature: 0.7,
            top_p: 0.9,
            do_sample: true,
            return_full_text: false,
        }
    }
}

#[derive(Deserialize)]
struct Generation {
    #[serde(default)]
    generated_text: Option<String>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum GenerationResponse {
    Many(Vec<Generation>),
    One(Generation),
}

impl GenerationResponse {
    fn into_text(self) -> Option<String> {
        match self {
            GenerationResponse::Many(items) => items.into_iter().next()?.generated_text,
            GenerationResponse::One(item) => item.generated_text,
        }
    }
}

pub struct HuggingFaceAdvisor {
    client: Result<reqwest::Client, String>,
    base_url: String,
    model: String,
    token: Option<String>,
}

impl HuggingFaceAdvisor {
    /// A client that fails to build is reported on the first `advise` call.
    pub fn new(base_url: String, model: String, token: Option<String>) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .connect_timeout(Duration::from_secs(10))
            .build()
            .map_err(|err| err.to_string());

        Self::with_client(client, base_url, model, token)
    }

    fn with_client(
        client: Result<reqwest::Client, String>,
        base_url: String,
        model: String,
        token: Option<String>,
    ) -> Self {
        if let Err(err) = &client {
            warn!(error = %err, "advisor HTTP client could not be built");
        }

        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            model,
            token: token.filter(|t| !t.trim().is_empty()),
        }
    }
}

#[async_trait]
impl Advisor for HuggingFaceAdvisor {
    async fn advise(
        &self,
        average: f64,
        subjects: &[SubjectAnalysis],
        target: Option<f64>,
    ) -> Result<String, AdvisorError> {
        let token = self.token.as_deref().ok_or(AdvisorError::MissingToken)?;
        let client = self
            .client
            .as_ref()
            .map_err(|err| AdvisorError::Client(err.clone()))?;
        let prompt = build_prompt(average, subjects, target);
        let url = format!("{}/models/{}", self.base_url, self.model);

        info!(model = %self.model, subjects = subjects.len(), "requesting advisory text");
        debug!(%prompt, "advisor prompt");

        let response = client
            .post(&url)
            .bearer_auth(token)
            .json(&GenerationRequest {
                inputs: &prompt,
                parameters: GenerationParameters::default(),
            })
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(AdvisorError::Status { status, body });
        }

        let advice = response
            .json::<GenerationResponse>()
            .await?
            .into_text()
            .map(|text| tidy_output(&text))
            .unwrap_or_default();

        if advice.is_empty() {
            return Err(AdvisorError::EmptyResponse);
        }

        Ok(advice)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Difficulty;

    struct Canned(Result<&'static str, ()>);

    #[async_trait]
    impl Advisor for Canned {
        async fn advise(
            &self,
            _average: f64,
            _subjects: &[SubjectAnalysis],
            _target: Option<f64>,
        ) -> Result<String, AdvisorError> {
            match self.0 {
                Ok(text) => Ok(text.to_string()),
                Err(()) => Err(AdvisorError::EmptyResponse),
            }
        }
    }

    fn analysis(name: &str, grade: f64, completed: bool) -> SubjectAnalysis {
        SubjectAnalysis {
            name: name.to_string(),
            credits: 5.0,
            difficulty: Difficulty::Medium,
            grade,
            completed,
        }
    }

    #[test]
    fn prompt_lists_completed_before_pending() {
        let subjects = vec![
            analysis("Surgery", 0.0, false),
            analysis("Anatomy", 9.0, true),
        ];
        let prompt = build_prompt(7.456, &subjects, Some(8.0));

        assert!(prompt.contains("Overall Average: 7.46"));
        assert!(prompt.contains("Target Average: 8.00"));
        assert!(prompt.contains("Remaining Subjects (incomplete): 1"));
        let anatomy = prompt.find("- Anatomy: Grade 9 (5 credits, difficulty medium) - COMPLETED");
        let surgery = prompt.find("- Surgery: Grade not graded (5 credits, difficulty medium) - IN PROGRESS");
        assert!(anatomy.unwrap() < surgery.unwrap());
    }

    #[test]
    fn prompt_omits_target_when_absent() {
        let prompt = build_prompt(6.0, &[], None);
        assert!(!prompt.contains("Target Average"));
    }

    #[test]
    fn tidy_output_drops_blank_lines() {
        let raw = "\n  Priority 1: Surgery\n\n   \nPriority 2: Genetics  \n";
        assert_eq!(tidy_output(raw), "Priority 1: Surgery\nPriority 2: Genetics");
    }

    #[test]
    fn parses_both_response_shapes() {
        let many: GenerationResponse =
            serde_json::from_str(r#"[{"generated_text": "focus on surgery"}]"#).unwrap();
        assert_eq!(many.into_text().as_deref(), Some("focus on surgery"));

        let one: GenerationResponse =
            serde_json::from_str(r#"{"generated_text": "study genetics"}"#).unwrap();
        assert_eq!(one.into_text().as_deref(), Some("study genetics"));

        let empty: GenerationResponse = serde_json::from_str("[]").unwrap();
        assert!(empty.into_text().is_none());
    }

    #[tokio::test]
    async fn failures_degrade_to_fallback() {
        let text = advise_or_fallback(&Canned(Err(())), 7.0, &[], None).await;
        assert_eq!(text, FALLBACK_MESSAGE);

        let text = advise_or_fallback(&Canned(Ok("keep going")), 7.0, &[], None).await;
        assert_eq!(text, "keep going");
    }

    #[tokio::test]
    async fn missing_token_falls_back_without_network() {
        let advisor = HuggingFaceAdvisor::new(
            DEFAULT_API_BASE.to_string(),
            DEFAULT_MODEL.to_string(),
            Some("   ".to_string()),
        );

        let err = advisor.advise(7.0, &[], None).await.unwrap_err();
        assert!(matches!(err, AdvisorError::MissingToken));
        assert_eq!(advise_or_fallback(&advisor, 7.0, &[], None).await, FALLBACK_MESSAGE);
    }

    #[tokio::test]
    async fn unbuildable_client_falls_back() {
        let advisor = HuggingFaceAdvisor::with_client(
            Err("no TLS backend".to_string()),
            DEFAULT_API_BASE.to_string(),
            DEFAULT_MODEL.to_string(),
            Some("hf_token".to_string()),
        );

        let err = advisor.advise(7.0, &[], None).await.unwrap_err();
        assert!(matches!(err, AdvisorError::Client(_)));
        assert_eq!(advise_or_fallback(&advisor, 7.0, &[], None).await, FALLBACK_MESSAGE);
    }

    fn recommendation(auto_average: f64) -> Recommendation {
        Recommendation {
            auto_average,
            comparison: None,
            analysis: vec![analysis("Surgery", auto_average, false)],
            candidates: vec![],
        }
    }

    #[tokio::test]
    async fn ungraded_recommendation_returns_hint() {
        let text = advice_for(&Canned(Ok("keep going")), &recommendation(0.0)).await;
        assert_eq!(text, NO_GRADES_HINT);

        let text = advice_for(&Canned(Ok("keep going")), &recommendation(6.5)).await;
        assert_eq!(text, "keep going");

        let text = advice_for(&Canned(Err(())), &recommendation(6.5)).await;
        assert_eq!(text, FALLBACK_MESSAGE);
    }
}
