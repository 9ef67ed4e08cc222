//! Routing decisions of the agent strategy and the heuristics behind them.

use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

use taskroute_core::{ProviderId, Task, TaskKind};

lazy_static! {
    /// First flat JSON object in a model reply
    static ref DECISION_OBJECT: Regex = Regex::new(r"(?s)\{[^{}]*\}").unwrap();
}

/// Token overhead of system prompts
const PROMPT_OVERHEAD_TOKENS: u32 = 200;

/// Expected response size
const RESPONSE_TOKENS: u32 = 500;

/// Estimated difficulty of a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskComplexity {
    Simple,
    Moderate,
    Complex,
    Expert,
}

impl TaskComplexity {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Simple => "simple",
            Self::Moderate => "moderate",
            Self::Complex => "complex",
            Self::Expert => "expert",
        }
    }

    fn parse(text: &str) -> Option<Self> {
        match text.trim().to_ascii_lowercase().as_str() {
            "simple" => Some(Self::Simple),
            "moderate" => Some(Self::Moderate),
            "complex" => Some(Self::Complex),
            "expert" => Some(Self::Expert),
            _ => None,
        }
    }
}

impl fmt::Display for TaskComplexity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where and how a task should run, with the reasoning behind it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RoutingDecision {
    pub provider: ProviderId,
    pub complexity: TaskComplexity,
    pub reasoning: String,
    /// In `[0.0, 1.0]`
    pub confidence: f64,
    pub estimated_tokens: u32,
    pub recommended_model: Option<String>,
    /// Tried in order after `provider`
    pub fallback_options: Vec<ProviderId>,
    pub optimization_notes: Vec<String>,
}

/// Classify a task by content length and kind.
pub fn analyze_complexity(task: &Task) -> TaskComplexity {
    let len = task.content_len();
    let kind = task.kind();

    if len < 500 && matches!(kind, TaskKind::TextGeneration | TaskKind::Embedding) {
        TaskComplexity::Simple
    } else if len < 2000 {
        TaskComplexity::Moderate
    } else if len < 5000 || kind == TaskKind::Vision {
        TaskComplexity::Complex
    } else {
        TaskComplexity::Expert
    }
}

/// Rough token estimate: four characters per token plus prompt and response overhead.
pub fn estimate_tokens(task: &Task) -> u32 {
    let input = u32::try_from(task.content_len() / 4).unwrap_or(u32::MAX);
    input
        .saturating_add(PROMPT_OVERHEAD_TOKENS)
        .saturating_add(RESPONSE_TOKENS)
}

/// Why a model reply could not be turned into a decision.
#[derive(Error, Debug)]
pub enum DecisionParseError {
    #[error("reply is not a JSON object: {0}")]
    InvalidJson(#[from] serde_json::Error),
}

#[derive(Deserialize)]
struct AgentReply {
    provider: Option<String>,
    complexity: Option<String>,
    reasoning: Option<String>,
    confidence: Option<f64>,
    estimated_tokens: Option<u32>,
    recommended_model: Option<String>,
    #[serde(default)]
    optimization_notes: Vec<String>,
}

/// Turn a model reply into a decision.
///
/// The first flat `{...}` object in the reply is parsed, or the whole reply
/// if it contains none. A provider outside `known` is replaced by
/// `base_choice`; missing fields fall back to the heuristics.
pub fn parse_decision(
    reply: &str,
    task: &Task,
    known: &[ProviderId],
    base_choice: &ProviderId,
    default_provider: &ProviderId,
) -> Result<RoutingDecision, DecisionParseError> {
    let json = DECISION_OBJECT
        .find(reply)
        .map_or(reply.trim(), |found| found.as_str());
    let parsed: AgentReply = serde_json::from_str(json)?;

    let mut notes = parsed.optimization_notes;
    let provider = match parsed.provider {
        Some(name) => match known.iter().find(|id| id.as_str().eq_ignore_ascii_case(name.trim())) {
            Some(id) => id.clone(),
            None => {
                notes.push(format!("unknown provider {name}, using base route"));
                base_choice.clone()
            }
        },
        None => base_choice.clone(),
    };

    let complexity = parsed
        .complexity
        .as_deref()
        .and_then(TaskComplexity::parse)
        .unwrap_or_else(|| analyze_complexity(task));

    Ok(RoutingDecision {
        provider,
        complexity,
        reasoning: parsed
            .reasoning
            .unwrap_or_else(|| "No reasoning provided".to_string()),
        confidence: parsed.confidence.unwrap_or(0.8).clamp(0.0, 1.0),
        estimated_tokens: parsed
            .estimated_tokens
            .unwrap_or_else(|| estimate_tokens(task)),
        recommended_model: parsed.recommended_model,
        fallback_options: vec![default_provider.clone()],
        optimization_notes: notes,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn known() -> Vec<ProviderId> {
        vec![ProviderId::azure_openai(), ProviderId::fallback()]
    }

    fn text(len: usize) -> Task {
        Task::new(TaskKind::TextGeneration, "x".repeat(len))
    }

    #[test]
    fn test_complexity_thresholds() {
        assert_eq!(analyze_complexity(&text(499)), TaskComplexity::Simple);
        assert_eq!(analyze_complexity(&text(500)), TaskComplexity::Moderate);
        assert_eq!(analyze_complexity(&text(1999)), TaskComplexity::Moderate);
        assert_eq!(analyze_complexity(&text(2000)), TaskComplexity::Complex);
        assert_eq!(analyze_complexity(&text(5000)), TaskComplexity::Expert);

        let small_vision = Task::new(TaskKind::Vision, "img");
        assert_eq!(analyze_complexity(&small_vision), TaskComplexity::Moderate);

        let large_vision = Task::new(TaskKind::Vision, "x".repeat(8000));
        assert_eq!(analyze_complexity(&large_vision), TaskComplexity::Complex);
    }

    #[test]
    fn test_token_estimate() {
        assert_eq!(estimate_tokens(&text(0)), 700);
        assert_eq!(estimate_tokens(&text(4000)), 1700);
    }

    #[test]
    fn test_parse_embedded_object() {
        let reply = r#"Thought: the task is short.
Final answer: {"provider": "FALLBACK", "complexity": "simple", "reasoning": "short text", "confidence": 0.9, "estimated_tokens": 300}
Done."#;
        let decision = parse_decision(
            reply,
            &text(10),
            &known(),
            &ProviderId::azure_openai(),
            &ProviderId::fallback(),
        )
        .unwrap();

        assert_eq!(decision.provider, ProviderId::fallback());
        assert_eq!(decision.complexity, TaskComplexity::Simple);
        assert_eq!(decision.reasoning, "short text");
        assert_eq!(decision.estimated_tokens, 300);
        assert_eq!(decision.fallback_options, vec![ProviderId::fallback()]);
    }

    #[test]
    fn test_parse_fills_missing_fields() {
        let decision = parse_decision(
            "{}",
            &text(4000),
            &known(),
            &ProviderId::azure_openai(),
            &ProviderId::fallback(),
        )
        .unwrap();

        assert_eq!(decision.provider, ProviderId::azure_openai());
        assert_eq!(decision.complexity, TaskComplexity::Complex);
        assert_eq!(decision.confidence, 0.8);
        assert_eq!(decision.estimated_tokens, 1700);
    }

    #[test]
    fn test_unknown_provider_uses_base_choice() {
        let decision = parse_decision(
            r#"{"provider": "mystery", "confidence": 3.0}"#,
            &text(10),
            &known(),
            &ProviderId::azure_openai(),
            &ProviderId::fallback(),
        )
        .unwrap();

        assert_eq!(decision.provider, ProviderId::azure_openai());
        assert_eq!(decision.confidence, 1.0);
        assert_eq!(decision.optimization_notes.len(), 1);
    }

    #[test]
    fn test_unparsable_reply() {
        let result = parse_decision(
            "I would pick the premium one.",
            &text(10),
            &known(),
            &ProviderId::azure_openai(),
            &ProviderId::fallback(),
        );
        assert!(matches!(result, Err(DecisionParseError::InvalidJson(_))));
    }
}
