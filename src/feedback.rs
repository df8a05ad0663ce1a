//! Grading: ask a language model for feedback on a transcript.
//!
//! [`Grader`] builds the prompt, calls a [`FeedbackModel`] and pulls the
//! `N/10` grade out of the reply. [`LlmFeedbackModel`] is the production
//! model; tests substitute a canned one.
//!
//! ## Retry Strategy
//!
//! 429 / 503 responses are transient. Exponential backoff
//! (`retry_backoff_ms * 2^attempt`) with 500 ms base and 3 retries waits
//! 500 ms → 1 s → 2 s before giving up.

use crate::error::FeedbackError;
use crate::prompts::{comparison_prompt, feedback_prompt, GRADER_SYSTEM_PROMPT};
use async_trait::async_trait;
use edgequake_llm::{ChatMessage, CompletionOptions, LLMProvider};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::time::{sleep, Duration};
use tracing::{debug, info, warn};

/// Rendered in place of a grade the model did not state.
pub const NO_GRADE: &str = "N/A";

static RE_GRADE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)Grade[:]*\s*(\d{1,2}/10)").expect("grade pattern is valid"));

/// A text-completion model used for grading.
#[async_trait]
pub trait FeedbackModel: Send + Sync {
    async fn complete(&self, system: &str, prompt: &str) -> Result<String, FeedbackError>;
}

/// Settings for [`LlmFeedbackModel`] and [`Grader`].
#[derive(Debug, Clone)]
pub struct FeedbackConfig {
    /// Default: 0.2.
    pub temperature: f32,
    /// Default: 2048.
    pub max_tokens: usize,
    /// Default: 3.
    pub max_retries: u32,
    /// Base backoff between retries. Default: 500.
    pub retry_backoff_ms: u64,
    /// Overrides [`GRADER_SYSTEM_PROMPT`].
    pub system_prompt: Option<String>,
}

impl Default for FeedbackConfig {
    fn default() -> Self {
        Self {
            temperature: 0.2,
            max_tokens: 2048,
            max_retries: 3,
            retry_backoff_ms: 500,
            system_prompt: None,
        }
    }
}

/// Exponential backoff before retry `attempt` (1-based), saturating at `u64::MAX`.
fn backoff_ms(base_ms: u64, attempt: u32) -> u64 {
    2u64.checked_pow(attempt.saturating_sub(1))
        .map_or(u64::MAX, |factor| base_ms.saturating_mul(factor))
}

/// [`FeedbackModel`] backed by an `edgequake-llm` provider.
pub struct LlmFeedbackModel {
    provider: Arc<dyn LLMProvider>,
    config: FeedbackConfig,
}

impl LlmFeedbackModel {
    pub fn new(provider: Arc<dyn LLMProvider>, config: FeedbackConfig) -> Self {
        Self { provider, config }
    }
}

#[async_trait]
impl FeedbackModel for LlmFeedbackModel {
    async fn complete(&self, system: &str, prompt: &str) -> Result<String, FeedbackError> {
        let messages = vec![ChatMessage::system(system), ChatMessage::user(prompt)];
        let options = CompletionOptions {
            temperature: Some(self.config.temperature),
            max_tokens: Some(self.config.max_tokens),
            ..Default::default()
        };

        let mut last_err: Option<String> = None;

        for attempt in 0..=self.config.max_retries {
            if attempt > 0 {
                let backoff = backoff_ms(self.config.retry_backoff_ms, attempt);
                warn!(
                    "Feedback: retry {}/{} after {}ms",
                    attempt, self.config.max_retries, backoff
                );
                sleep(Duration::from_millis(backoff)).await;
            }

            match self.provider.chat(&messages, Some(&options)).await {
                Ok(response) => {
                    debug!(
                        "Feedback: {} input tokens, {} output tokens",
                        response.prompt_tokens, response.completion_tokens
                    );
                    return Ok(response.content);
                }
                Err(e) => {
                    let err_msg = format!("{}", e);
                    warn!("Feedback: attempt {} failed: {}", attempt + 1, err_msg);
                    last_err = Some(err_msg);
                }
            }
        }

        Err(FeedbackError::ModelFailed {
            retries: self.config.max_retries,
            detail: last_err.unwrap_or_else(|| "Unknown error".to_string()),
        })
    }
}

/// Model feedback plus the grade found in it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Feedback {
    /// Full model reply.
    pub text: String,
    /// `"N/10"` as written by the model, if present.
    pub grade: Option<String>,
}

impl Feedback {
    pub fn from_text(text: String) -> Self {
        let grade = extract_grade(&text);
        Self { text, grade }
    }

    /// The grade, or [`NO_GRADE`].
    pub fn grade_or_na(&self) -> &str {
        self.grade.as_deref().unwrap_or(NO_GRADE)
    }
}

/// Find the first `Grade: N/10` (any case, any number of colons) in `text`.
pub fn extract_grade(text: &str) -> Option<String> {
    RE_GRADE
        .captures(text)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_string())
}

/// Produces graded feedback for transcripts.
pub struct Grader {
    model: Arc<dyn FeedbackModel>,
    system_prompt: String,
}

impl Grader {
    pub fn new(model: Arc<dyn FeedbackModel>) -> Self {
        Self {
            model,
            system_prompt: GRADER_SYSTEM_PROMPT.to_string(),
        }
    }

    /// Grader over an LLM provider using `config`.
    pub fn from_provider(provider: Arc<dyn LLMProvider>, config: FeedbackConfig) -> Self {
        let system_prompt = config
            .system_prompt
            .clone()
            .unwrap_or_else(|| GRADER_SYSTEM_PROMPT.to_string());
        Self {
            model: Arc::new(LlmFeedbackModel::new(provider, config)),
            system_prompt,
        }
    }

    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = prompt.into();
        self
    }

    /// Grade a submission on its own.
    pub async fn feedback(&self, submission: &str) -> Result<Feedback, FeedbackError> {
        require_text("submission", submission)?;
        info!("Requesting feedback ({} chars)", submission.len());
        let text = self
            .model
            .complete(&self.system_prompt, &feedback_prompt(submission))
            .await?;
        Ok(self.finish(text))
    }

    /// Grade `answer` against a question paper or model answer.
    pub async fn compare(&self, reference: &str, answer: &str) -> Result<Feedback, FeedbackError> {
        require_text("question paper", reference)?;
        require_text("answer", answer)?;
        info!(
            "Requesting comparison feedback ({} / {} chars)",
            reference.len(),
            answer.len()
        );
        let text = self
            .model
            .complete(&self.system_prompt, &comparison_prompt(reference, answer))
            .await?;
        Ok(self.finish(text))
    }

    fn finish(&self, text: String) -> Feedback {
        let feedback = Feedback::from_text(text);
        if feedback.grade.is_none() {
            warn!("No grade found in feedback; recording {}", NO_GRADE);
        }
        feedback
    }
}

fn require_text(what: &str, text: &str) -> Result<(), FeedbackError> {
    if text.trim().is_empty() {
        return Err(FeedbackError::EmptySubmission {
            what: what.to_string(),
        });
    }
    Ok(())
}
