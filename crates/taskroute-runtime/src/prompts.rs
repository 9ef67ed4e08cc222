//! Prompts for the agent routing strategy.
//!
//! The system prompt is static so providers with prompt caching reuse it;
//! only the task and provider description change per request.

use serde_json::json;

use taskroute_core::{ProviderProfile, Task};

/// Characters of task content shown to the routing model.
pub const PREVIEW_CHARS: usize = 500;

/// System prompt for routing decisions.
pub const ROUTING_SYSTEM_PROMPT: &str = r#"
You are a routing agent for AI tasks.

Pick the provider best suited to the task you are given.
Weigh task complexity, provider capabilities, measured latency, reliability and cost.
Only choose providers from the list you are given.
Prefer the cheaper provider when it can handle the task well.

## Output Format (JSON)
{
  "provider": "provider name from the list",
  "complexity": "simple" | "moderate" | "complex" | "expert",
  "reasoning": "one or two sentences",
  "confidence": 0.0-1.0,
  "estimated_tokens": integer,
  "recommended_model": "model name or null",
  "optimization_notes": ["short suggestions"]
}

Respond with the JSON object only.
"#;

/// Describe `task` as a JSON document for the routing model.
pub fn task_description(task: &Task) -> String {
    let info = json!({
        "task_type": task.kind().as_str(),
        "priority": task.priority(),
        "content_length": task.content_len(),
        "content_preview": task.content_preview(PREVIEW_CHARS),
        "options": task.options(),
    });
    serde_json::to_string_pretty(&info).unwrap_or_else(|_| info.to_string())
}

/// Describe the available providers, one line each.
pub fn provider_description(
    providers: &[ProviderProfile],
    healthy: impl Fn(&ProviderProfile) -> bool,
) -> String {
    providers
        .iter()
        .map(|p| {
            format!(
                "- {}: max {} tokens, vision={}, embeddings={}, streaming={}, avg {:.0}ms, success {:.0}%, ${:.4}/1k tokens, {}",
                p.name,
                p.max_tokens_per_request,
                p.supports_vision,
                p.supports_embeddings,
                p.supports_streaming,
                p.avg_response_time_ms,
                p.success_rate * 100.0,
                p.cost_per_1k_tokens,
                if healthy(p) { "healthy" } else { "unhealthy" }
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Build the user prompt for one routing decision.
pub fn build_routing_prompt(task: &Task, providers: &str) -> String {
    format!(
        "## Providers\n{providers}\n\n## Task\n{}\n\nReturn your routing decision.",
        task_description(task)
    )
}
