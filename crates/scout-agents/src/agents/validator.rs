//! Input gate: cheap heuristics first, the reasoning service only for
//! ambiguous input.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;

use coordination::normalize::{bool_field, string_field};
use coordination::state::Validation;
use coordination::{
    EngineConfig, ReasoningClient, Stage, StageError, StageId, StateDelta, StateSnapshot,
    StateValue,
};

use super::require_idea;
use crate::prompts::VALIDATOR_PREAMBLE;
use crate::structured::{complete_json, InputValidationReply};

pub const TOO_SHORT: &str = "Input is too short. Please describe a startup idea.";
pub const GIBBERISH: &str = "Input appears to be gibberish. Please enter a valid startup idea.";
const NOT_AN_IDEA: &str = "Input does not look like a startup idea.";

const BUSINESS_KEYWORDS: &[&str] = &[
    "app", "platform", "service", "tool", "software", "saas", "marketplace", "ai", "automated",
    "solution", "startup", "business", "company", "product", "subscription", "b2b", "b2c", "for",
    "that", "which", "helps", "enables", "allows", "uber", "airbnb", "like", "similar",
    "alternative",
];

/// Outcome of the local checks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Precheck {
    Invalid(&'static str),
    Valid,
    /// Needs the reasoning service.
    Ambiguous,
}

pub fn precheck(idea: &str) -> Precheck {
    let idea = idea.trim();
    if idea.chars().count() < 3 {
        return Precheck::Invalid(TOO_SHORT);
    }
    if is_obvious_gibberish(idea) {
        return Precheck::Invalid(GIBBERISH);
    }
    if idea.split_whitespace().count() >= 5 && looks_like_business_idea(idea) {
        return Precheck::Valid;
    }
    Precheck::Ambiguous
}

fn is_obvious_gibberish(text: &str) -> bool {
    let clean: Vec<char> = text
        .to_lowercase()
        .chars()
        .filter(|c| !c.is_whitespace())
        .collect();
    let len = clean.len();

    let mut distinct = clean.clone();
    distinct.sort_unstable();
    distinct.dedup();
    if distinct.len() <= 2 && len > 3 {
        return true;
    }
    if len > 5 && !clean.iter().any(|c| "aeiou".contains(*c)) {
        return true;
    }
    let alpha = clean.iter().filter(|c| c.is_alphabetic()).count();
    len > 3 && (alpha as f64) / (len as f64) < 0.5
}

fn looks_like_business_idea(text: &str) -> bool {
    let lower = text.to_lowercase();
    BUSINESS_KEYWORDS.iter().any(|kw| lower.contains(kw))
}

pub struct InputValidator {
    client: Arc<dyn ReasoningClient>,
}

impl InputValidator {
    pub fn new(client: Arc<dyn ReasoningClient>) -> Self {
        Self { client }
    }

    async fn ask(&self, idea: &str, config: &EngineConfig) -> Result<Validation, StageError> {
        let prompt = format!(
            "Analyze this input and determine if it's a valid startup/business idea:\n\n\
             INPUT: \"{idea}\"\n\n\
             Respond with:\n\
             1. is_valid: true or false\n\
             2. rejection_reason: if invalid, explain why (short and helpful)\n\
             3. suggested_reframe: if valid but vague, a more specific version\n\n\
             Examples:\n\
             - \"asdfasdf\" -> is_valid: false, rejection_reason: \"This appears to be random text, not a business idea\"\n\
             - \"Uber\" -> is_valid: true, suggested_reframe: \"Uber-like service for [specific industry]\"\n\
             - \"AI tool for lawyers\" -> is_valid: true\n\
             - \"what is machine learning\" -> is_valid: false, rejection_reason: \"This is a question, not a business idea\""
        );
        let reply = complete_json::<InputValidationReply>(
            self.client.as_ref(),
            VALIDATOR_PREAMBLE,
            &prompt,
            config.agent_timeout(),
        )
        .await?;

        let is_valid = bool_field(&reply, "is_valid").unwrap_or(true);
        Ok(Validation {
            is_valid,
            rejection_reason: if is_valid {
                None
            } else {
                Some(string_field(&reply, "rejection_reason").unwrap_or_else(|| NOT_AN_IDEA.into()))
            },
            suggested_reframe: string_field(&reply, "suggested_reframe"),
        })
    }
}

#[async_trait]
impl Stage for InputValidator {
    async fn execute(
        &self,
        input: &StateSnapshot,
        config: &EngineConfig,
    ) -> Result<StateDelta, StageError> {
        let idea = require_idea(StageId::ValidateInput, input)?;
        let validation = match precheck(&idea) {
            Precheck::Invalid(reason) => Validation::invalid(reason),
            Precheck::Valid => Validation::valid(),
            Precheck::Ambiguous => self.ask(&idea, config).await?,
        };
        debug!(valid = validation.is_valid, "Input validated");
        Ok(StateDelta::new().set(StateValue::Validation(validation)))
    }
}
