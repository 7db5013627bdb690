//! Ordered record of what each role said.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::normalize::Score;

/// Role of a participant in the debate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DebateRole {
    /// Argues for the idea.
    Bull,
    /// Argues against it.
    Bear,
    /// Weighs both sides and issues the verdict.
    Synthesizer,
}

impl DebateRole {
    pub fn label(self) -> &'static str {
        match self {
            Self::Bull => "BULL",
            Self::Bear => "BEAR",
            Self::Synthesizer => "SYNTHESIZER",
        }
    }
}

impl std::fmt::Display for DebateRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Bull => write!(f, "bull"),
            Self::Bear => write!(f, "bear"),
            Self::Synthesizer => write!(f, "synthesizer"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TranscriptEntry {
    pub role: DebateRole,
    /// 1-based; one bull plus one bear turn per round.
    pub round: u32,
    pub utterance: String,
    /// Present on the synthesis entry only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub score: Option<Score>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pivot_suggestion: Option<String>,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct DebateTranscript {
    entries: Vec<TranscriptEntry>,
}

impl DebateTranscript {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_turn(&mut self, role: DebateRole, round: u32, utterance: impl Into<String>) {
        self.entries.push(TranscriptEntry {
            role,
            round,
            utterance: utterance.into(),
            score: None,
            pivot_suggestion: None,
            timestamp: Utc::now(),
        });
    }

    pub fn push_synthesis(
        &mut self,
        round: u32,
        utterance: impl Into<String>,
        score: Score,
        pivot_suggestion: Option<String>,
    ) {
        self.entries.push(TranscriptEntry {
            role: DebateRole::Synthesizer,
            round,
            utterance: utterance.into(),
            score: Some(score),
            pivot_suggestion,
            timestamp: Utc::now(),
        });
    }

    pub fn entries(&self) -> &[TranscriptEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Bull and bear turns, excluding synthesis.
    pub fn argument_turns(&self) -> usize {
        self.entries
            .iter()
            .filter(|e| e.role != DebateRole::Synthesizer)
            .count()
    }

    pub fn synthesis(&self) -> Option<&TranscriptEntry> {
        self.entries
            .last()
            .filter(|e| e.role == DebateRole::Synthesizer)
    }

    /// Strict bull/bear alternation starting with bull, at most `max_turns`
    /// argument turns, then exactly one synthesis entry at the end.
    pub fn is_well_formed(&self, max_turns: u32) -> bool {
        let Some((last, turns)) = self.entries.split_last() else {
            return false;
        };
        if last.role != DebateRole::Synthesizer || last.score.is_none() {
            return false;
        }
        if turns.len() > max_turns as usize {
            return false;
        }
        turns.iter().enumerate().all(|(idx, entry)| {
            let expected = if idx % 2 == 0 {
                DebateRole::Bull
            } else {
                DebateRole::Bear
            };
            entry.role == expected
        })
    }

    /// Plain-text rendering used as prompt context and in reports.
    pub fn render(&self) -> String {
        self.entries
            .iter()
            .map(|e| format!("{} (Round {}):\n{}", e.role.label(), e.round, e.utterance))
            .collect::<Vec<_>>()
            .join("\n\n")
    }

    /// The latest utterance of `role`, if any.
    pub fn last_by(&self, role: DebateRole) -> Option<&TranscriptEntry> {
        self.entries.iter().rev().find(|e| e.role == role)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(turns: u32) -> DebateTranscript {
        let mut t = DebateTranscript::new();
        for turn in 0..turns {
            let role = if turn % 2 == 0 {
                DebateRole::Bull
            } else {
                DebateRole::Bear
            };
            t.push_turn(role, turn / 2 + 1, format!("turn {}", turn + 1));
        }
        t.push_synthesis(turns.div_ceil(2).max(1), "verdict", Score::clamped(6), None);
        t
    }

    #[test]
    fn test_well_formed_transcript() {
        let t = sample(6);
        assert!(t.is_well_formed(6));
        assert_eq!(t.argument_turns(), 6);
        assert_eq!(t.synthesis().unwrap().score, Some(Score::clamped(6)));
    }

    #[test]
    fn test_too_many_turns_is_malformed() {
        assert!(!sample(7).is_well_formed(6));
    }

    #[test]
    fn test_missing_synthesis_is_malformed() {
        let mut t = DebateTranscript::new();
        t.push_turn(DebateRole::Bull, 1, "yes");
        assert!(!t.is_well_formed(6));
        assert!(t.synthesis().is_none());
    }

    #[test]
    fn test_out_of_order_is_malformed() {
        let mut t = DebateTranscript::new();
        t.push_turn(DebateRole::Bear, 1, "no");
        t.push_synthesis(1, "meh", Score::clamped(4), None);
        assert!(!t.is_well_formed(6));
    }

    #[test]
    fn test_render_and_last_by() {
        let t = sample(2);
        let text = t.render();
        assert!(text.contains("BULL (Round 1):\nturn 1"));
        assert!(text.contains("BEAR (Round 1):\nturn 2"));
        assert_eq!(t.last_by(DebateRole::Bear).unwrap().utterance, "turn 2");
    }
}
