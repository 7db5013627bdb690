//! Structured completions: schema-in-prompt, lenient JSON out.
//!
//! The target shape is described to the model with a JSON schema generated
//! by `schemars`. The reply is never trusted to match it; callers read the
//! returned object field by field through `coordination::normalize`.

use std::time::Duration;

use schemars::JsonSchema;
use serde::Serialize;

use coordination::normalize::extract_json_object;
use coordination::{CompletionRequest, ReasoningClient, StageError};

/// Ask for JSON shaped like `T` and return the first object in the reply.
pub async fn complete_json<T: JsonSchema>(
    client: &dyn ReasoningClient,
    system: &str,
    prompt: &str,
    timeout: Duration,
) -> Result<serde_json::Value, StageError> {
    let request = CompletionRequest::new(schema_instruction::<T>(system)?, prompt);
    let text = client.complete(&request, timeout).await?;
    extract_json_object(&text).ok_or_else(|| {
        let preview: String = text.chars().take(200).collect();
        StageError::Parse(format!("no JSON object in response: {preview}"))
    })
}

/// System prompt with the JSON contract for `T` appended.
pub fn schema_instruction<T: JsonSchema>(system: &str) -> Result<String, StageError> {
    let schema = schemars::schema_for!(T);
    let schema = serde_json::to_string_pretty(&schema)
        .map_err(|e| StageError::Fatal(format!("schema serialization failed: {e}")))?;
    Ok(format!(
        "{}\n\nIMPORTANT: You must respond with ONLY valid JSON that matches this schema:\n{}\n\n\
         Respond with the JSON object only, no markdown code blocks or additional text.",
        system.trim(),
        schema
    )
    .trim()
    .to_string())
}

// ── Response contracts ─────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, JsonSchema)]
pub struct InputValidationReply {
    /// Whether the input is a valid startup idea
    pub is_valid: bool,
    /// If invalid, the reason for rejection
    pub rejection_reason: Option<String>,
    /// If valid but vague, a more specific version
    pub suggested_reframe: Option<String>,
}

#[derive(Debug, Clone, Serialize, JsonSchema)]
pub struct MarketResearchReply {
    /// Estimated TAM/SAM/SOM with sources
    pub market_size_estimate: String,
    /// Market growth rate and trends
    pub growth_rate: String,
    /// Top 3-5 market trends
    pub key_trends: Vec<String>,
    /// Primary target market demographics
    pub target_demographics: Vec<String>,
    /// One of: emerging, growing, mature, declining
    pub market_maturity: String,
    /// URLs or sources used for research
    pub data_sources: Vec<String>,
    /// 2-3 paragraph summary of market findings
    pub summary: String,
}

#[derive(Debug, Clone, Serialize, JsonSchema)]
pub struct CompetitorReply {
    pub name: String,
    pub url: Option<String>,
    pub description: String,
    pub strengths: Vec<String>,
    pub weaknesses: Vec<String>,
    /// Known funding, if any
    pub funding: Option<String>,
}

#[derive(Debug, Clone, Serialize, JsonSchema)]
pub struct CompetitorAnalysisReply {
    pub competitors: Vec<CompetitorReply>,
    /// One of: low, medium, high, oversaturated
    pub market_saturation: String,
    pub differentiation_opportunities: Vec<String>,
    pub barriers_to_entry: Vec<String>,
    /// 2-3 paragraph competitive landscape summary
    pub summary: String,
}

#[derive(Debug, Clone, Serialize, JsonSchema)]
pub struct CritiqueReply {
    /// Viability score from 1 (terrible) to 10 (excellent)
    pub score: u8,
    /// One of: invest, pivot, reject
    pub verdict: String,
    pub reason: String,
    pub key_risks: Vec<String>,
    pub key_opportunities: Vec<String>,
    /// A specific pivot when the score is at or below the threshold
    pub suggested_pivot: Option<String>,
    pub pivot_rationale: Option<String>,
}

#[derive(Debug, Clone, Serialize, JsonSchema)]
pub struct SynthesisReply {
    /// Final consensus score from 1 (reject) to 10 (strong invest)
    pub score: u8,
    /// One of: invest, conditional_invest, reject
    pub verdict: String,
    /// The original idea or a refined pivot based on the debate
    pub final_idea: String,
    pub idea_was_pivoted: bool,
    pub bull_case: String,
    pub bear_case: String,
    pub synthesis: String,
    pub key_risks: Vec<String>,
    pub key_opportunities: Vec<String>,
    pub recommended_next_steps: Vec<String>,
}
