//! Automated content classification for debates and proposed options.
//!
//! The two call sites fail in opposite directions when the classifier is
//! unconfigured, unreachable, slow or unparseable: a debate draft is held for
//! human review, a single option is admitted. Each call site names its
//! [`FailSafe`] explicitly.

use serde_json::{Map, Value};
use std::sync::Arc;
use std::time::Duration;

use crate::llm::{extract_json_object, GenerateRequest, LlmError, LlmManager};
use crate::types::DebateStatus;

/// Verdict applied when no usable classification is available
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailSafe {
    /// Admit the content
    Open,
    /// Defer the content to human review
    Closed,
}

pub const DEBATE_FAIL_SAFE: FailSafe = FailSafe::Closed;
pub const OPTION_FAIL_SAFE: FailSafe = FailSafe::Open;

const MAX_TAGS: usize = 5;

const DEBATE_SYSTEM_PROMPT: &str = r#"You are a content analyzer for a public debate platform.
Analyze the debate topic you are given.

Tasks:
1. Moderation: classify it as SAFE, TOXIC, SPAM or INAPPROPRIATE.
   - SAFE: suitable for the general public.
   - TOXIC: hate speech, harassment, violence.
   - SPAM: nonsense, repetitive, ads.
   - INAPPROPRIATE: NSFW, illegal.
2. Categorization: suggest the best fitting category for this debate.
3. Tagging: generate 3-5 relevant, short tags (lowercase, single words or short phrases).

Answer with strict JSON only:
{"moderation": "SAFE" | "TOXIC" | "SPAM" | "INAPPROPRIATE", "category": "Technology", "tags": ["tag1", "tag2", "tag3"]}"#;

const OPTION_SYSTEM_PROMPT: &str = r#"You are a moderator for a public debate platform.
A visitor proposes a new option for an existing debate.

Tasks:
1. Safety: reject hate speech, harassment, NSFW content, nonsense and ads.
2. Relevance: the option must be a sensible answer to the debate question.
   Example: "Apple" is relevant to "Best Smartphone"; "Bananas" is not.

Answer with strict JSON only:
{"moderation": "SAFE" | "TOXIC" | "IRRELEVANT" | "SPAM", "reason": "short explanation shown to the visitor when not SAFE"}"#;

/// A full debate draft
#[derive(Debug, Clone)]
pub struct DebateSubject<'a> {
    pub title: &'a str,
    pub description: Option<&'a str>,
    pub options: &'a [String],
}

/// A single proposed option in the context of its debate
#[derive(Debug, Clone)]
pub struct OptionSubject<'a> {
    pub debate_title: &'a str,
    pub debate_description: Option<&'a str>,
    pub name: &'a str,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DebateVerdict {
    /// `Approved` or `Pending`, never `Rejected`
    pub status: DebateStatus,
    pub predicted_category: Option<String>,
    pub tags: Vec<String>,
    /// True when the fail-safe decided instead of the classifier
    pub fallback: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub enum OptionVerdict {
    Approved { fallback: bool },
    Rejected { reason: Option<String> },
}

impl OptionVerdict {
    pub fn is_approved(&self) -> bool {
        matches!(self, OptionVerdict::Approved { .. })
    }
}

/// Why a classification could not be used
#[derive(Debug, thiserror::Error)]
enum ClassifyError {
    #[error("classifier not configured")]
    Unconfigured,
    #[error(transparent)]
    Llm(#[from] LlmError),
    #[error("no JSON object in classifier answer")]
    NoJson,
    #[error("classifier answer lacks a moderation label")]
    MissingLabel,
}

fn moderation_label(answer: &Map<String, Value>) -> Result<String, ClassifyError> {
    answer
        .get("moderation")
        .and_then(Value::as_str)
        .map(|label| label.trim().to_uppercase())
        .filter(|label| !label.is_empty())
        .ok_or(ClassifyError::MissingLabel)
}

fn lowercase_tags(answer: &Map<String, Value>) -> Vec<String> {
    answer
        .get("tags")
        .and_then(Value::as_array)
        .map(|tags| {
            tags.iter()
                .filter_map(Value::as_str)
                .map(|t| t.trim().to_lowercase())
                .filter(|t| !t.is_empty())
                .take(MAX_TAGS)
                .collect()
        })
        .unwrap_or_default()
}

/// Wraps the external classifier and maps its answers to admit/deny/defer
#[derive(Clone)]
pub struct ModerationGate {
    llm: Option<Arc<LlmManager>>,
    timeout: Duration,
    max_tokens: u32,
}

impl ModerationGate {
    pub fn new(llm: Option<Arc<LlmManager>>, timeout: Duration, max_tokens: u32) -> Self {
        if llm.is_none() {
            tracing::warn!("No classifier configured: debates go to review, options are admitted");
        }
        Self {
            llm,
            timeout,
            max_tokens,
        }
    }

    pub fn is_configured(&self) -> bool {
        self.llm.is_some()
    }

    /// Ask the classifier and return its first JSON object
    async fn ask(&self, system: &str, prompt: String) -> Result<Map<String, Value>, ClassifyError> {
        let llm = self.llm.as_ref().ok_or(ClassifyError::Unconfigured)?;
        let request = GenerateRequest {
            system: system.to_string(),
            prompt,
            max_tokens: Some(self.max_tokens),
            timeout: llm.attempt_timeout(self.timeout),
        };

        // The outer bound covers every provider the manager falls back to
        let response = tokio::time::timeout(self.timeout, llm.generate(request))
            .await
            .map_err(|_| LlmError::Timeout(self.timeout))??;

        extract_json_object(&response.text).ok_or(ClassifyError::NoJson)
    }

    /// Classify a debate draft: SAFE is approved, everything else waits for review
    pub async fn classify_debate(&self, subject: &DebateSubject<'_>) -> DebateVerdict {
        let prompt = format!(
            "Title: {:?}\nDescription: {:?}\nOptions: {}",
            subject.title,
            subject.description.unwrap_or_default(),
            serde_json::to_string(subject.options).unwrap_or_default(),
        );

        let classified = match self.ask(DEBATE_SYSTEM_PROMPT, prompt).await {
            Ok(answer) => moderation_label(&answer).map(|label| (label, answer)),
            Err(e) => Err(e),
        };

        match classified {
            Ok((label, answer)) => {
                let status = if label == "SAFE" {
                    DebateStatus::Approved
                } else {
                    DebateStatus::Pending
                };
                tracing::info!(
                    title = subject.title,
                    label = %label,
                    status = status.as_str(),
                    "Debate classified"
                );
                DebateVerdict {
                    status,
                    predicted_category: answer
                        .get("category")
                        .and_then(Value::as_str)
                        .map(|c| c.trim().to_string())
                        .filter(|c| !c.is_empty()),
                    tags: lowercase_tags(&answer),
                    fallback: false,
                }
            }
            Err(e) => {
                tracing::warn!(title = subject.title, "Debate classification failed: {}", e);
                Self::debate_fallback(DEBATE_FAIL_SAFE)
            }
        }
    }

    fn debate_fallback(fail_safe: FailSafe) -> DebateVerdict {
        DebateVerdict {
            status: match fail_safe {
                FailSafe::Open => DebateStatus::Approved,
                FailSafe::Closed => DebateStatus::Pending,
            },
            predicted_category: None,
            tags: vec![],
            fallback: true,
        }
    }

    /// Classify a proposed option against its debate: SAFE is admitted,
    /// everything else is refused with the classifier's reason
    pub async fn classify_option(&self, subject: &OptionSubject<'_>) -> OptionVerdict {
        let prompt = format!(
            "Debate title: {:?}\nDebate description: {:?}\nProposed option: {:?}",
            subject.debate_title,
            subject.debate_description.unwrap_or_default(),
            subject.name,
        );

        let classified = match self.ask(OPTION_SYSTEM_PROMPT, prompt).await {
            Ok(answer) => moderation_label(&answer).map(|label| (label, answer)),
            Err(e) => Err(e),
        };

        match classified {
            Ok((label, _)) if label == "SAFE" => {
                tracing::info!(option = subject.name, "Option classified SAFE");
                OptionVerdict::Approved { fallback: false }
            }
            Ok((label, answer)) => {
                let reason = answer
                    .get("reason")
                    .and_then(Value::as_str)
                    .map(|r| r.trim().to_string())
                    .filter(|r| !r.is_empty());
                tracing::info!(
                    option = subject.name,
                    label = %label,
                    reason = ?reason,
                    "Option refused by classifier"
                );
                OptionVerdict::Rejected { reason }
            }
            Err(e) => {
                tracing::warn!(option = subject.name, "Option classification failed: {}", e);
                Self::option_fallback(OPTION_FAIL_SAFE)
            }
        }
    }

    fn option_fallback(fail_safe: FailSafe) -> OptionVerdict {
        match fail_safe {
            FailSafe::Open => OptionVerdict::Approved { fallback: true },
            FailSafe::Closed => OptionVerdict::Rejected {
                reason: Some("Option could not be reviewed right now".to_string()),
            },
        }
    }
}
