//! Boundary validation for structured reasoning-service output.
//!
//! Everything the reasoning service returns is untrusted text. This module
//! turns it into typed values before any stage writes it into state:
//!
//! ```text
//! raw response ──► extract_json_object ──► Score::from_raw / normalize_*
//!                                              │
//!                                              ▼
//!                                     typed stage record
//! ```
//!
//! Scores are clamped into `[1, 10]` here, so the router only ever sees a
//! value from the validated domain.

use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Lowest score the engine accepts.
pub const SCORE_MIN: u8 = 1;
/// Highest score the engine accepts.
pub const SCORE_MAX: u8 = 10;
/// Score used when the service omits the field or sends something unparseable.
pub const DEFAULT_SCORE: u8 = 5;

static SCORE_TEXT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)score[:\s]*(\d+)").expect("SCORE_TEXT_RE regex should compile")
});

/// A score that is not in `[SCORE_MIN, SCORE_MAX]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("score {0} is outside the domain [1, 10]")]
pub struct ScoreError(pub i64);

/// A viability score in `[1, 10]`.
///
/// The field is private: the only ways to build one are the strict
/// [`Score::new`] (which rejects out-of-domain values) and the lenient
/// [`Score::clamped`] / [`Score::from_raw`] used at the service boundary.
/// Deserialization goes through the strict path, so a corrupted checkpoint
/// fails to load instead of feeding an impossible value to the router.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "i64", into = "i64")]
pub struct Score(u8);

impl Score {
    /// Strict constructor.
    pub fn new(value: i64) -> Result<Self, ScoreError> {
        if (SCORE_MIN as i64..=SCORE_MAX as i64).contains(&value) {
            Ok(Self(value as u8))
        } else {
            Err(ScoreError(value))
        }
    }

    /// Clamp any integer into the score domain.
    pub fn clamped(value: i64) -> Self {
        Self(value.clamp(SCORE_MIN as i64, SCORE_MAX as i64) as u8)
    }

    /// Lenient conversion from a raw JSON field.
    ///
    /// Integers and floats are clamped, numeric strings are parsed, anything
    /// else (null, missing, words) becomes [`DEFAULT_SCORE`].
    pub fn from_raw(value: Option<&serde_json::Value>) -> Self {
        match value {
            Some(serde_json::Value::Number(n)) => {
                if let Some(i) = n.as_i64() {
                    Self::clamped(i)
                } else if let Some(f) = n.as_f64() {
                    Self::clamped(f.round() as i64)
                } else {
                    Self(DEFAULT_SCORE)
                }
            }
            Some(serde_json::Value::String(s)) => s
                .trim()
                .parse::<i64>()
                .map(Self::clamped)
                .unwrap_or(Self(DEFAULT_SCORE)),
            _ => Self(DEFAULT_SCORE),
        }
    }

    /// Pull a `score: N` mention out of free text.
    pub fn from_text(text: &str) -> Option<Self> {
        SCORE_TEXT_RE
            .captures(text)
            .and_then(|caps| caps.get(1))
            .and_then(|m| m.as_str().parse::<i64>().ok())
            .map(Self::clamped)
    }

    pub fn get(self) -> u8 {
        self.0
    }

    /// Strictly greater than the threshold.
    pub fn exceeds(self, threshold: u8) -> bool {
        self.0 > threshold
    }
}

impl Default for Score {
    fn default() -> Self {
        Self(DEFAULT_SCORE)
    }
}

impl TryFrom<i64> for Score {
    type Error = ScoreError;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<Score> for i64 {
    fn from(score: Score) -> Self {
        score.0 as i64
    }
}

impl std::fmt::Display for Score {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.0, SCORE_MAX)
    }
}

/// Verdict of the legacy single critic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum CritiqueVerdict {
    Invest,
    #[default]
    Pivot,
    Reject,
}

/// Verdict of the debate synthesizer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum DebateVerdict {
    Invest,
    #[default]
    ConditionalInvest,
    Reject,
}

impl std::fmt::Display for CritiqueVerdict {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Invest => write!(f, "invest"),
            Self::Pivot => write!(f, "pivot"),
            Self::Reject => write!(f, "reject"),
        }
    }
}

impl std::fmt::Display for DebateVerdict {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Invest => write!(f, "invest"),
            Self::ConditionalInvest => write!(f, "conditional_invest"),
            Self::Reject => write!(f, "reject"),
        }
    }
}

fn has_word(text: &str, word: &str) -> bool {
    text.split(|c: char| !c.is_alphanumeric())
        .any(|token| token == word)
}

fn reads_as_reject(lower: &str) -> bool {
    lower.contains("reject") || lower.contains("fail") || has_word(lower, "no")
}

/// Normalize a free-form critique verdict to `invest | pivot | reject`.
pub fn normalize_critique_verdict(raw: Option<&str>) -> CritiqueVerdict {
    let Some(raw) = raw else {
        return CritiqueVerdict::Pivot;
    };
    let lower = raw.trim().to_lowercase();
    if lower.contains("invest") || lower.contains("approve") || lower.contains("proceed") {
        CritiqueVerdict::Invest
    } else if reads_as_reject(&lower) {
        CritiqueVerdict::Reject
    } else {
        CritiqueVerdict::Pivot
    }
}

/// Normalize a free-form synthesis verdict to `invest | conditional_invest | reject`.
pub fn normalize_debate_verdict(raw: Option<&str>) -> DebateVerdict {
    let Some(raw) = raw else {
        return DebateVerdict::ConditionalInvest;
    };
    let lower = raw.trim().to_lowercase();
    if lower.contains("strong") || (lower.contains("invest") && !lower.contains("conditional")) {
        DebateVerdict::Invest
    } else if reads_as_reject(&lower) {
        DebateVerdict::Reject
    } else {
        DebateVerdict::ConditionalInvest
    }
}

/// Strip a surrounding markdown code fence, if any.
pub fn strip_code_fence(text: &str) -> &str {
    let mut body = text.trim();
    if let Some(rest) = body.strip_prefix("```") {
        // Drop the info string (e.g. "json") on the opening line.
        body = match rest.find('\n') {
            Some(idx) => &rest[idx + 1..],
            None => rest,
        };
    }
    if let Some(rest) = body.trim_end().strip_suffix("```") {
        body = rest;
    }
    body.trim()
}

/// Extract the first JSON object from a model response.
///
/// Tries the whole (fence-stripped) body first, then the widest `{ ... }`
/// span. Returns `None` when no object parses.
pub fn extract_json_object(text: &str) -> Option<serde_json::Value> {
    let body = strip_code_fence(text);
    if let Ok(value @ serde_json::Value::Object(_)) = serde_json::from_str::<serde_json::Value>(body) {
        return Some(value);
    }
    let start = body.find('{')?;
    let end = body.rfind('}')?;
    if end <= start {
        return None;
    }
    match serde_json::from_str::<serde_json::Value>(&body[start..=end]) {
        Ok(value @ serde_json::Value::Object(_)) => Some(value),
        _ => None,
    }
}

/// Read a string field, treating empty strings as absent.
pub fn string_field(value: &serde_json::Value, key: &str) -> Option<String> {
    value
        .get(key)
        .and_then(|v| v.as_str())
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

/// Read a list of strings, skipping non-string items.
pub fn string_list(value: &serde_json::Value, key: &str) -> Vec<String> {
    value
        .get(key)
        .and_then(|v| v.as_array())
        .map(|items| {
            items
                .iter()
                .filter_map(|item| item.as_str())
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

/// Read a boolean, accepting `"true"`/`"false"` strings as well.
pub fn bool_field(value: &serde_json::Value, key: &str) -> Option<bool> {
    match value.get(key)? {
        serde_json::Value::Bool(b) => Some(*b),
        serde_json::Value::String(s) => match s.trim().to_lowercase().as_str() {
            "true" | "yes" => Some(true),
            "false" | "no" => Some(false),
            _ => None,
        },
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_score_strict_rejects_out_of_domain() {
        assert!(Score::new(0).is_err());
        assert!(Score::new(11).is_err());
        assert_eq!(Score::new(7).unwrap().get(), 7);
    }

    #[test]
    fn test_score_clamped() {
        assert_eq!(Score::clamped(15).get(), 10);
        assert_eq!(Score::clamped(-3).get(), 1);
        assert_eq!(Score::clamped(8).get(), 8);
    }

    #[test]
    fn test_score_from_raw_variants() {
        assert_eq!(Score::from_raw(Some(&json!(42))).get(), 10);
        assert_eq!(Score::from_raw(Some(&json!(0))).get(), 1);
        assert_eq!(Score::from_raw(Some(&json!("8"))).get(), 8);
        assert_eq!(Score::from_raw(Some(&json!(6.6))).get(), 7);
        assert_eq!(Score::from_raw(Some(&json!("great"))).get(), DEFAULT_SCORE);
        assert_eq!(Score::from_raw(Some(&json!(null))).get(), DEFAULT_SCORE);
        assert_eq!(Score::from_raw(None).get(), DEFAULT_SCORE);
    }

    #[test]
    fn test_score_from_text() {
        assert_eq!(Score::from_text("Final Score: 3 out of 10").unwrap().get(), 3);
        assert_eq!(Score::from_text("score 99").unwrap().get(), 10);
        assert!(Score::from_text("no number here").is_none());
    }

    #[test]
    fn test_score_deserialize_is_strict() {
        let ok: Score = serde_json::from_str("4").unwrap();
        assert_eq!(ok.get(), 4);
        assert!(serde_json::from_str::<Score>("12").is_err());
    }

    #[test]
    fn test_score_exceeds_is_strict() {
        let five = Score::new(5).unwrap();
        assert!(!five.exceeds(5));
        assert!(Score::new(6).unwrap().exceeds(5));
    }

    #[test]
    fn test_normalize_critique_verdict() {
        assert_eq!(normalize_critique_verdict(Some("INVEST")), CritiqueVerdict::Invest);
        assert_eq!(normalize_critique_verdict(Some("proceed carefully")), CritiqueVerdict::Invest);
        assert_eq!(normalize_critique_verdict(Some("Reject")), CritiqueVerdict::Reject);
        assert_eq!(normalize_critique_verdict(Some("no")), CritiqueVerdict::Reject);
        assert_eq!(normalize_critique_verdict(Some("needs a pivot")), CritiqueVerdict::Pivot);
        assert_eq!(normalize_critique_verdict(None), CritiqueVerdict::Pivot);
    }

    #[test]
    fn test_normalize_debate_verdict() {
        assert_eq!(normalize_debate_verdict(Some("strong buy")), DebateVerdict::Invest);
        assert_eq!(normalize_debate_verdict(Some("invest")), DebateVerdict::Invest);
        assert_eq!(
            normalize_debate_verdict(Some("conditional_invest")),
            DebateVerdict::ConditionalInvest
        );
        assert_eq!(normalize_debate_verdict(Some("REJECT")), DebateVerdict::Reject);
        assert_eq!(normalize_debate_verdict(None), DebateVerdict::ConditionalInvest);
    }

    #[test]
    fn test_extract_json_from_fenced_block() {
        let text = "```json\n{\"score\": 7, \"verdict\": \"invest\"}\n```";
        let value = extract_json_object(text).unwrap();
        assert_eq!(value["score"], 7);
    }

    #[test]
    fn test_extract_json_embedded_in_prose() {
        let text = "Here is my verdict: {\"score\": 3} hope that helps";
        let value = extract_json_object(text).unwrap();
        assert_eq!(value["score"], 3);
    }

    #[test]
    fn test_extract_json_none_for_prose() {
        assert!(extract_json_object("I think the score is 4").is_none());
        assert!(extract_json_object("} backwards {").is_none());
    }

    #[test]
    fn test_field_helpers() {
        let value = json!({
            "name": "  Acme ",
            "empty": "",
            "items": ["a", 3, " b "],
            "flag": "true",
        });
        assert_eq!(string_field(&value, "name").as_deref(), Some("Acme"));
        assert_eq!(string_field(&value, "empty"), None);
        assert_eq!(string_list(&value, "items"), vec!["a", "b"]);
        assert_eq!(bool_field(&value, "flag"), Some(true));
        assert_eq!(bool_field(&value, "missing"), None);
    }
}
