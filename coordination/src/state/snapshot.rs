//! Immutable state snapshots and the deltas stages return.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::schema::StateKey;
use super::types::*;
use crate::normalize::Score;

/// Accumulated run state at one point in time.
///
/// Snapshots are never mutated in place: [`StateSnapshot::merge`] returns a
/// new snapshot and leaves `self` untouched.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(into = "Vec<StateValue>", from = "Vec<StateValue>")]
pub struct StateSnapshot {
    fields: BTreeMap<StateKey, StateValue>,
}

impl StateSnapshot {
    /// Initial state of a run: only the idea text.
    pub fn seed(idea: impl Into<String>) -> Self {
        let mut fields = BTreeMap::new();
        fields.insert(StateKey::Idea, StateValue::Idea(idea.into()));
        Self { fields }
    }

    pub fn get(&self, key: StateKey) -> Option<&StateValue> {
        self.fields.get(&key)
    }

    pub fn contains(&self, key: StateKey) -> bool {
        self.fields.contains_key(&key)
    }

    pub fn keys(&self) -> impl Iterator<Item = StateKey> + '_ {
        self.fields.keys().copied()
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn idea(&self) -> Option<&str> {
        match self.get(StateKey::Idea) {
            Some(StateValue::Idea(idea)) => Some(idea),
            _ => None,
        }
    }

    pub fn validation(&self) -> Option<&Validation> {
        match self.get(StateKey::Validation) {
            Some(StateValue::Validation(v)) => Some(v),
            _ => None,
        }
    }

    pub fn market_research(&self) -> Option<&MarketResearch> {
        match self.get(StateKey::MarketResearch) {
            Some(StateValue::MarketResearch(v)) => Some(v),
            _ => None,
        }
    }

    pub fn competitor_analysis(&self) -> Option<&CompetitorAnalysis> {
        match self.get(StateKey::CompetitorAnalysis) {
            Some(StateValue::CompetitorAnalysis(v)) => Some(v),
            _ => None,
        }
    }

    pub fn critique(&self) -> Option<&Critique> {
        match self.get(StateKey::Critique) {
            Some(StateValue::Critique(v)) => Some(v),
            _ => None,
        }
    }

    pub fn debate(&self) -> Option<&DebateResult> {
        match self.get(StateKey::Debate) {
            Some(StateValue::Debate(v)) => Some(v),
            _ => None,
        }
    }

    /// Pivot history; empty when no pivot has happened.
    pub fn pivot_history(&self) -> &[PivotRecord] {
        match self.get(StateKey::PivotHistory) {
            Some(StateValue::PivotHistory(v)) => v,
            _ => &[],
        }
    }

    pub fn score(&self) -> Option<Score> {
        match self.get(StateKey::Score) {
            Some(StateValue::Score(s)) => Some(*s),
            _ => None,
        }
    }

    pub fn report(&self) -> Option<&FinalReport> {
        match self.get(StateKey::Report) {
            Some(StateValue::Report(v)) => Some(v),
            _ => None,
        }
    }

    /// Restrict the snapshot to the declared `reads`.
    pub fn project(&self, reads: &[StateKey]) -> Self {
        let fields = self
            .fields
            .iter()
            .filter(|(key, _)| reads.contains(key))
            .map(|(key, value)| (*key, value.clone()))
            .collect();
        Self { fields }
    }

    /// Produce a new snapshot with `delta` applied.
    ///
    /// Clears are applied first, then sets. Each set replaces the whole value
    /// under its key.
    pub fn merge(&self, delta: &StateDelta) -> Self {
        let mut fields = self.fields.clone();
        for key in &delta.clear {
            fields.remove(key);
        }
        for value in &delta.set {
            fields.insert(value.key(), value.clone());
        }
        Self { fields }
    }
}

impl From<StateSnapshot> for Vec<StateValue> {
    fn from(snapshot: StateSnapshot) -> Self {
        snapshot.fields.into_values().collect()
    }
}

impl From<Vec<StateValue>> for StateSnapshot {
    fn from(values: Vec<StateValue>) -> Self {
        let fields = values.into_iter().map(|v| (v.key(), v)).collect();
        Self { fields }
    }
}

/// Changes a stage (or the orchestrator) applies to a snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct StateDelta {
    #[serde(default)]
    pub set: Vec<StateValue>,
    #[serde(default)]
    pub clear: Vec<StateKey>,
}

impl StateDelta {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(mut self, value: StateValue) -> Self {
        self.set.push(value);
        self
    }

    pub fn clear(mut self, key: StateKey) -> Self {
        self.clear.push(key);
        self
    }

    /// Every key this delta touches, set or cleared.
    pub fn touched_keys(&self) -> impl Iterator<Item = StateKey> + '_ {
        self.set
            .iter()
            .map(StateValue::key)
            .chain(self.clear.iter().copied())
    }

    pub fn is_empty(&self) -> bool {
        self.set.is_empty() && self.clear.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_seed_has_only_idea() {
        let snap = StateSnapshot::seed("Uber for dog walking");
        assert_eq!(snap.len(), 1);
        assert_eq!(snap.idea(), Some("Uber for dog walking"));
        assert!(snap.pivot_history().is_empty());
        assert_eq!(snap.score(), None);
    }

    #[test]
    fn test_merge_overwrites_whole_value_and_keeps_original() {
        let base = StateSnapshot::seed("idea")
            .merge(&StateDelta::new().set(StateValue::Score(Score::clamped(3))));
        let next = base.merge(
            &StateDelta::new()
                .set(StateValue::Score(Score::clamped(8)))
                .set(StateValue::Validation(Validation::valid())),
        );

        assert_eq!(base.score(), Some(Score::clamped(3)));
        assert_eq!(next.score(), Some(Score::clamped(8)));
        assert!(next.validation().unwrap().is_valid);
    }

    #[test]
    fn test_merge_clear_then_set() {
        let base = StateSnapshot::seed("old")
            .merge(&StateDelta::new().set(StateValue::Score(Score::clamped(4))));
        let next = base.merge(
            &StateDelta::new()
                .clear(StateKey::Score)
                .clear(StateKey::Idea)
                .set(StateValue::Idea("new".into())),
        );
        assert_eq!(next.score(), None);
        assert_eq!(next.idea(), Some("new"));
    }

    #[test]
    fn test_project_hides_undeclared_fields() {
        let snap = StateSnapshot::seed("idea").merge(
            &StateDelta::new()
                .set(StateValue::Validation(Validation::valid()))
                .set(StateValue::Score(Score::clamped(9))),
        );
        let projected = snap.project(&[StateKey::Idea]);
        assert_eq!(projected.len(), 1);
        assert!(projected.validation().is_none());
        assert!(projected.score().is_none());
    }

    #[test]
    fn test_serde_roundtrip_preserves_fields() {
        let snap = StateSnapshot::seed("idea")
            .merge(&StateDelta::new().set(StateValue::Validation(Validation::invalid("gibberish"))));
        let json = serde_json::to_string(&snap).unwrap();
        let back: StateSnapshot = serde_json::from_str(&json).unwrap();
        assert_eq!(back, snap);
    }

    #[test]
    fn test_delta_touched_keys() {
        let delta = StateDelta::new()
            .set(StateValue::Score(Score::clamped(2)))
            .clear(StateKey::Critique);
        let keys: Vec<_> = delta.touched_keys().collect();
        assert_eq!(keys, vec![StateKey::Score, StateKey::Critique]);
    }
}
