//! Typed records stored in the run state.
//!
//! Each record is the structured output of one stage after boundary
//! normalization. Free-form service text never reaches the router; only
//! these types do.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::schema::StateKey;
use crate::debate::DebateTranscript;
use crate::normalize::{CritiqueVerdict, DebateVerdict, Score};

/// Pass/fail result of the input gate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Validation {
    pub is_valid: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rejection_reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub suggested_reframe: Option<String>,
}

impl Validation {
    pub fn valid() -> Self {
        Self {
            is_valid: true,
            rejection_reason: None,
            suggested_reframe: None,
        }
    }

    pub fn invalid(reason: impl Into<String>) -> Self {
        Self {
            is_valid: false,
            rejection_reason: Some(reason.into()),
            suggested_reframe: None,
        }
    }
}

/// Lifecycle stage of the target market.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum MarketMaturity {
    Emerging,
    #[default]
    Growing,
    Mature,
    Declining,
}

impl MarketMaturity {
    /// Lenient mapping of free text; unknown values read as `Growing`.
    pub fn normalize(raw: Option<&str>) -> Self {
        let lower = raw.unwrap_or_default().trim().to_lowercase();
        if lower.contains("emerg") || lower.contains("nascent") || lower.contains("early") {
            Self::Emerging
        } else if lower.contains("declin") || lower.contains("shrink") {
            Self::Declining
        } else if lower.contains("mature") || lower.contains("saturat") {
            Self::Mature
        } else {
            Self::Growing
        }
    }
}

impl std::fmt::Display for MarketMaturity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Emerging => write!(f, "emerging"),
            Self::Growing => write!(f, "growing"),
            Self::Mature => write!(f, "mature"),
            Self::Declining => write!(f, "declining"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct MarketResearch {
    pub market_size_estimate: String,
    pub growth_rate: String,
    pub key_trends: Vec<String>,
    pub target_demographics: Vec<String>,
    pub market_maturity: MarketMaturity,
    pub data_sources: Vec<String>,
    pub summary: String,
}

/// How crowded the competitive field is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum MarketSaturation {
    Low,
    #[default]
    Medium,
    High,
    Oversaturated,
}

impl MarketSaturation {
    /// Lenient mapping of free text; unknown values read as `Medium`.
    pub fn normalize(raw: Option<&str>) -> Self {
        let lower = raw.unwrap_or_default().trim().to_lowercase();
        if lower.contains("over") {
            Self::Oversaturated
        } else if lower.contains("high") || lower.contains("crowded") {
            Self::High
        } else if lower.contains("low") {
            Self::Low
        } else {
            Self::Medium
        }
    }
}

impl std::fmt::Display for MarketSaturation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Low => write!(f, "low"),
            Self::Medium => write!(f, "medium"),
            Self::High => write!(f, "high"),
            Self::Oversaturated => write!(f, "oversaturated"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct Competitor {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    pub description: String,
    #[serde(default)]
    pub strengths: Vec<String>,
    #[serde(default)]
    pub weaknesses: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub funding: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct CompetitorAnalysis {
    pub competitors: Vec<Competitor>,
    pub market_saturation: MarketSaturation,
    pub differentiation_opportunities: Vec<String>,
    pub barriers_to_entry: Vec<String>,
    pub summary: String,
}

/// Output of the legacy devil's-advocate critic.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Critique {
    pub score: Score,
    pub verdict: CritiqueVerdict,
    pub reason: String,
    #[serde(default)]
    pub key_risks: Vec<String>,
    #[serde(default)]
    pub key_opportunities: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub suggested_pivot: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pivot_rationale: Option<String>,
}

/// Output of the debate stage: the synthesis verdict plus the full transcript.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DebateResult {
    pub score: Score,
    pub verdict: DebateVerdict,
    pub final_idea: String,
    /// Informational only; debate mode never loops back on it.
    pub idea_was_pivoted: bool,
    pub bull_case: String,
    pub bear_case: String,
    pub synthesis: String,
    #[serde(default)]
    pub key_risks: Vec<String>,
    #[serde(default)]
    pub key_opportunities: Vec<String>,
    #[serde(default)]
    pub recommended_next_steps: Vec<String>,
    pub transcript: DebateTranscript,
}

impl DebateResult {
    /// The synthesizer's revised idea, when it proposed one.
    pub fn pivot_suggestion(&self) -> Option<&str> {
        self.idea_was_pivoted.then_some(self.final_idea.as_str())
    }
}

/// One pivot of the legacy loop.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PivotRecord {
    /// 1-based, strictly increasing within a run.
    pub attempt: u32,
    pub prior_idea: String,
    pub revised_idea: String,
    pub triggering_score: Score,
    pub rationale: String,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReportKind {
    InvestmentMemo,
    MarketRealityReport,
}

impl std::fmt::Display for ReportKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvestmentMemo => write!(f, "Investment Memo"),
            Self::MarketRealityReport => write!(f, "Market Reality Report"),
        }
    }
}

/// Final write-up in markdown.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FinalReport {
    pub kind: ReportKind,
    pub markdown: String,
}

/// A single typed field of the run state, tagged by its [`StateKey`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "key", content = "value", rename_all = "snake_case")]
pub enum StateValue {
    Idea(String),
    Validation(Validation),
    MarketResearch(MarketResearch),
    CompetitorAnalysis(CompetitorAnalysis),
    Critique(Critique),
    Debate(DebateResult),
    PivotHistory(Vec<PivotRecord>),
    Score(Score),
    Report(FinalReport),
}

impl StateValue {
    pub fn key(&self) -> StateKey {
        match self {
            StateValue::Idea(_) => StateKey::Idea,
            StateValue::Validation(_) => StateKey::Validation,
            StateValue::MarketResearch(_) => StateKey::MarketResearch,
            StateValue::CompetitorAnalysis(_) => StateKey::CompetitorAnalysis,
            StateValue::Critique(_) => StateKey::Critique,
            StateValue::Debate(_) => StateKey::Debate,
            StateValue::PivotHistory(_) => StateKey::PivotHistory,
            StateValue::Score(_) => StateKey::Score,
            StateValue::Report(_) => StateKey::Report,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_maturity_normalization() {
        assert_eq!(MarketMaturity::normalize(Some("Emerging")), MarketMaturity::Emerging);
        assert_eq!(MarketMaturity::normalize(Some("declining fast")), MarketMaturity::Declining);
        assert_eq!(MarketMaturity::normalize(Some("MATURE")), MarketMaturity::Mature);
        assert_eq!(MarketMaturity::normalize(Some("booming")), MarketMaturity::Growing);
        assert_eq!(MarketMaturity::normalize(None), MarketMaturity::Growing);
    }

    #[test]
    fn test_saturation_normalization() {
        assert_eq!(MarketSaturation::normalize(Some("Oversaturated")), MarketSaturation::Oversaturated);
        assert_eq!(MarketSaturation::normalize(Some("very high")), MarketSaturation::High);
        assert_eq!(MarketSaturation::normalize(Some("low")), MarketSaturation::Low);
        assert_eq!(MarketSaturation::normalize(Some("??")), MarketSaturation::Medium);
    }

    #[test]
    fn test_state_value_tagging() {
        let value = StateValue::Score(Score::clamped(8));
        let json = serde_json::to_value(&value).unwrap();
        assert_eq!(json["key"], "score");
        assert_eq!(json["value"], 8);
        assert_eq!(value.key(), StateKey::Score);
    }

    #[test]
    fn test_out_of_domain_score_fails_to_load() {
        let raw = r#"{"key":"score","value":42}"#;
        assert!(serde_json::from_str::<StateValue>(raw).is_err());
    }

    #[test]
    fn test_pivot_suggestion_only_when_pivoted() {
        let mut result = DebateResult {
            score: Score::clamped(3),
            verdict: DebateVerdict::Reject,
            final_idea: "B2B version".into(),
            idea_was_pivoted: false,
            bull_case: String::new(),
            bear_case: String::new(),
            synthesis: String::new(),
            key_risks: vec![],
            key_opportunities: vec![],
            recommended_next_steps: vec![],
            transcript: DebateTranscript::default(),
        };
        assert_eq!(result.pivot_suggestion(), None);
        result.idea_was_pivoted = true;
        assert_eq!(result.pivot_suggestion(), Some("B2B version"));
    }
}
