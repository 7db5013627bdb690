//! Engine configuration.
//!
//! ## Precedence (highest to lowest)
//!
//! 1. Environment variable overrides (`SCOUT_*`)
//! 2. Values from a TOML file
//! 3. Built-in defaults
//!
//! | Option                       | Env override                         | Default  |
//! |------------------------------|--------------------------------------|----------|
//! | `mode`                       | `SCOUT_MODE`                         | debate   |
//! | `pass_threshold`             | `SCOUT_PASS_THRESHOLD`               | 5        |
//! | `pivot_threshold`            | `SCOUT_PIVOT_THRESHOLD`              | 5        |
//! | `max_pivot_attempts`         | `SCOUT_MAX_PIVOT_ATTEMPTS`           | 3        |
//! | `debate_max_rounds`          | `SCOUT_DEBATE_MAX_ROUNDS`            | 6        |
//! | `agent_timeout_seconds`      | `SCOUT_AGENT_TIMEOUT_SECONDS`        | 60       |
//! | `reasoning_calls_per_minute` | `SCOUT_REASONING_CALLS_PER_MINUTE`   | 25       |
//! | `max_stage_invocations`      | `SCOUT_MAX_STAGE_INVOCATIONS`        | derived  |

use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::normalize::{SCORE_MAX, SCORE_MIN};
use crate::resilience::RetryPolicy;
use crate::stages::StageId;

/// Environment variable naming a TOML config file.
pub const ENV_CONFIG_PATH: &str = "SCOUT_CONFIG";

const ENV_MODE: &str = "SCOUT_MODE";
const ENV_PASS_THRESHOLD: &str = "SCOUT_PASS_THRESHOLD";
const ENV_PIVOT_THRESHOLD: &str = "SCOUT_PIVOT_THRESHOLD";
const ENV_MAX_PIVOT_ATTEMPTS: &str = "SCOUT_MAX_PIVOT_ATTEMPTS";
const ENV_DEBATE_MAX_ROUNDS: &str = "SCOUT_DEBATE_MAX_ROUNDS";
const ENV_AGENT_TIMEOUT_SECONDS: &str = "SCOUT_AGENT_TIMEOUT_SECONDS";
const ENV_CALLS_PER_MINUTE: &str = "SCOUT_REASONING_CALLS_PER_MINUTE";
const ENV_MAX_STAGE_INVOCATIONS: &str = "SCOUT_MAX_STAGE_INVOCATIONS";

/// Extra invocations tolerated above the structural bound before the
/// orchestrator declares a runaway loop.
const STAGE_INVOCATION_SLACK: u32 = 2;

/// Which routing strategy drives a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ControlMode {
    /// Single pass ending in a Bull/Bear/Synthesizer debate.
    #[default]
    Debate,
    /// Single critic with a bounded pivot-and-retry loop.
    LegacyPivot,
}

impl std::fmt::Display for ControlMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Debate => write!(f, "debate"),
            Self::LegacyPivot => write!(f, "legacy_pivot"),
        }
    }
}

impl FromStr for ControlMode {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "debate" => Ok(Self::Debate),
            "legacy_pivot" | "legacy-pivot" | "legacy" | "pivot" => Ok(Self::LegacyPivot),
            other => Err(ConfigError::Invalid {
                field: "mode",
                reason: format!("unknown mode '{}'", other),
            }),
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid value for {field}: {reason}")]
    Invalid { field: &'static str, reason: String },
}

/// Routing parameters frozen into a run when it is created.
///
/// Resuming a run routes with these values even if the process
/// configuration changed in between.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoutingPolicy {
    pub mode: ControlMode,
    pub pass_threshold: u8,
    pub pivot_threshold: u8,
    pub max_pivot_attempts: u32,
    /// Bull plus bear turns before the synthesis turn.
    #[serde(default = "default_debate_max_rounds")]
    pub debate_max_rounds: u32,
}

fn default_debate_max_rounds() -> u32 {
    EngineConfig::default().debate_max_rounds
}

impl RoutingPolicy {
    /// Upper bound on stage invocations this policy can structurally need.
    ///
    /// Debate: validate, research, competitors, debate, write.
    /// Legacy: validate + (research, competitors, critique) per attempt + write.
    pub fn structural_stage_bound(&self) -> u32 {
        match self.mode {
            ControlMode::Debate => 5,
            ControlMode::LegacyPivot => {
                2 + 3 * self.max_pivot_attempts.saturating_add(1)
            }
        }
    }
}

/// Configuration consumed by the orchestration core and handed to stages.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub mode: ControlMode,
    /// Debate mode accepts when the final score is strictly above this.
    pub pass_threshold: u8,
    /// Legacy mode accepts when the critique score is strictly above this.
    pub pivot_threshold: u8,
    pub max_pivot_attempts: u32,
    /// Cap on bull/bear turns before the synthesis turn.
    pub debate_max_rounds: u32,
    /// Bound on one reasoning-service call; stage timeouts are derived from it.
    pub agent_timeout_seconds: u64,
    pub reasoning_calls_per_minute: u32,
    /// Overrides the derived invocation ceiling when set.
    pub max_stage_invocations: Option<u32>,
    /// Retries after the first attempt for retriable stage failures.
    pub stage_max_retries: u32,
    pub retry_base_delay_ms: u64,
    pub retry_max_delay_ms: u64,
    pub search_num_results: usize,
    pub scrape_timeout_seconds: u64,
    pub max_competitors_to_scrape: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            mode: ControlMode::Debate,
            pass_threshold: 5,
            pivot_threshold: 5,
            max_pivot_attempts: 3,
            debate_max_rounds: 6,
            agent_timeout_seconds: 60,
            reasoning_calls_per_minute: 25,
            max_stage_invocations: None,
            stage_max_retries: 2,
            retry_base_delay_ms: 2_000,
            retry_max_delay_ms: 30_000,
            search_num_results: 10,
            scrape_timeout_seconds: 30,
            max_competitors_to_scrape: 5,
        }
    }
}

impl EngineConfig {
    /// Parse a TOML document on top of the defaults.
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(content)?)
    }

    /// Read a TOML file on top of the defaults.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_toml_str(&content)
    }

    /// Full load: defaults, then the file (explicit path or `SCOUT_CONFIG`),
    /// then environment overrides, then validation.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let env_path = std::env::var(ENV_CONFIG_PATH).ok();
        let mut config = match path.map(Path::to_path_buf).or(env_path.map(Into::into)) {
            Some(p) => Self::from_file(&p)?,
            None => Self::default(),
        };
        config.apply_overrides(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Apply `SCOUT_*` overrides from an arbitrary lookup.
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = lookup(ENV_MODE) {
            self.mode = v.parse()?;
        }
        if let Some(v) = lookup(ENV_PASS_THRESHOLD) {
            self.pass_threshold = parse_field("pass_threshold", &v)?;
        }
        if let Some(v) = lookup(ENV_PIVOT_THRESHOLD) {
            self.pivot_threshold = parse_field("pivot_threshold", &v)?;
        }
        if let Some(v) = lookup(ENV_MAX_PIVOT_ATTEMPTS) {
            self.max_pivot_attempts = parse_field("max_pivot_attempts", &v)?;
        }
        if let Some(v) = lookup(ENV_DEBATE_MAX_ROUNDS) {
            self.debate_max_rounds = parse_field("debate_max_rounds", &v)?;
        }
        if let Some(v) = lookup(ENV_AGENT_TIMEOUT_SECONDS) {
            self.agent_timeout_seconds = parse_field("agent_timeout_seconds", &v)?;
        }
        if let Some(v) = lookup(ENV_CALLS_PER_MINUTE) {
            self.reasoning_calls_per_minute = parse_field("reasoning_calls_per_minute", &v)?;
        }
        if let Some(v) = lookup(ENV_MAX_STAGE_INVOCATIONS) {
            self.max_stage_invocations = Some(parse_field("max_stage_invocations", &v)?);
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        for (field, value) in [
            ("pass_threshold", self.pass_threshold),
            ("pivot_threshold", self.pivot_threshold),
        ] {
            if !(SCORE_MIN..=SCORE_MAX).contains(&value) {
                return Err(ConfigError::Invalid {
                    field,
                    reason: format!("{} is outside [{}, {}]", value, SCORE_MIN, SCORE_MAX),
                });
            }
        }
        if self.debate_max_rounds == 0 {
            return Err(ConfigError::Invalid {
                field: "debate_max_rounds",
                reason: "must be at least 1".into(),
            });
        }
        if self.agent_timeout_seconds == 0 {
            return Err(ConfigError::Invalid {
                field: "agent_timeout_seconds",
                reason: "must be at least 1".into(),
            });
        }
        if self.reasoning_calls_per_minute == 0 {
            return Err(ConfigError::Invalid {
                field: "reasoning_calls_per_minute",
                reason: "must be at least 1".into(),
            });
        }
        if self.retry_base_delay_ms > self.retry_max_delay_ms {
            return Err(ConfigError::Invalid {
                field: "retry_base_delay_ms",
                reason: "must not exceed retry_max_delay_ms".into(),
            });
        }
        if self.max_stage_invocations == Some(0) {
            return Err(ConfigError::Invalid {
                field: "max_stage_invocations",
                reason: "must be at least 1".into(),
            });
        }
        Ok(())
    }

    pub fn agent_timeout(&self) -> Duration {
        Duration::from_secs(self.agent_timeout_seconds)
    }

    pub fn scrape_timeout(&self) -> Duration {
        Duration::from_secs(self.scrape_timeout_seconds)
    }

    /// Bound on one attempt of `stage`: one agent timeout per service call it
    /// can make plus one scrape timeout per concurrent web phase.
    pub fn stage_timeout(&self, stage: StageId) -> Duration {
        let (calls, web_phases) = match stage {
            StageId::Debate => (self.debate_max_rounds.saturating_add(1), 0),
            StageId::MarketResearch => (1, 1),
            StageId::CompetitorAnalysis => (1, 2),
            StageId::ValidateInput | StageId::Critique | StageId::WriteReport => (1, 0),
        };
        self.agent_timeout() * calls + self.scrape_timeout() * web_phases
    }

    pub fn routing_policy(&self) -> RoutingPolicy {
        RoutingPolicy {
            mode: self.mode,
            pass_threshold: self.pass_threshold,
            pivot_threshold: self.pivot_threshold,
            max_pivot_attempts: self.max_pivot_attempts,
            debate_max_rounds: self.debate_max_rounds,
        }
    }

    /// This configuration with the routing fields replaced by a run's frozen
    /// policy. Stages of that run see the same thresholds the router uses.
    pub fn with_policy(&self, policy: &RoutingPolicy) -> EngineConfig {
        EngineConfig {
            mode: policy.mode,
            pass_threshold: policy.pass_threshold,
            pivot_threshold: policy.pivot_threshold,
            max_pivot_attempts: policy.max_pivot_attempts,
            debate_max_rounds: policy.debate_max_rounds,
            ..self.clone()
        }
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_retries: self.stage_max_retries,
            base_delay: Duration::from_millis(self.retry_base_delay_ms),
            max_delay: Duration::from_millis(self.retry_max_delay_ms),
        }
    }

    /// Hard ceiling on successful stage invocations for a run routed by `policy`.
    pub fn stage_invocation_ceiling(&self, policy: &RoutingPolicy) -> u32 {
        self.max_stage_invocations
            .unwrap_or_else(|| policy.structural_stage_bound() + STAGE_INVOCATION_SLACK)
    }
}

fn parse_field<T: FromStr>(field: &'static str, raw: &str) -> Result<T, ConfigError> {
    raw.trim().parse().map_err(|_| ConfigError::Invalid {
        field,
        reason: format!("cannot parse '{}'", raw),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_defaults_are_valid() {
        let config = EngineConfig::default();
        config.validate().unwrap();
        assert_eq!(config.mode, ControlMode::Debate);
        assert_eq!(config.pass_threshold, 5);
        assert_eq!(config.max_pivot_attempts, 3);
        assert_eq!(config.debate_max_rounds, 6);
        assert_eq!(config.agent_timeout(), Duration::from_secs(60));
    }

    #[test]
    fn test_toml_partial_override() {
        let config = EngineConfig::from_toml_str(
            r#"
mode = "legacy_pivot"
pivot_threshold = 6
max_pivot_attempts = 1
"#,
        )
        .unwrap();
        assert_eq!(config.mode, ControlMode::LegacyPivot);
        assert_eq!(config.pivot_threshold, 6);
        assert_eq!(config.max_pivot_attempts, 1);
        // Untouched fields keep their defaults.
        assert_eq!(config.pass_threshold, 5);
    }

    #[test]
    fn test_toml_rejects_unknown_mode() {
        assert!(EngineConfig::from_toml_str("mode = \"chaos\"").is_err());
    }

    #[test]
    fn test_env_overrides_take_precedence() {
        let env: HashMap<&str, &str> = [
            ("SCOUT_MODE", "legacy-pivot"),
            ("SCOUT_PASS_THRESHOLD", "7"),
            ("SCOUT_MAX_STAGE_INVOCATIONS", "40"),
        ]
        .into_iter()
        .collect();

        let mut config = EngineConfig::default();
        config
            .apply_overrides(|key| env.get(key).map(|v| v.to_string()))
            .unwrap();

        assert_eq!(config.mode, ControlMode::LegacyPivot);
        assert_eq!(config.pass_threshold, 7);
        assert_eq!(config.max_stage_invocations, Some(40));
    }

    #[test]
    fn test_env_override_parse_error() {
        let mut config = EngineConfig::default();
        let err = config
            .apply_overrides(|key| (key == "SCOUT_DEBATE_MAX_ROUNDS").then(|| "many".to_string()))
            .unwrap_err();
        assert!(err.to_string().contains("debate_max_rounds"));
    }

    #[test]
    fn test_validate_rejects_out_of_domain() {
        let config = EngineConfig {
            pass_threshold: 11,
            ..Default::default()
        };
        assert!(config.validate().is_err());

        let config = EngineConfig {
            debate_max_rounds: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());

        let config = EngineConfig {
            reasoning_calls_per_minute: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_invocation_ceiling() {
        let config = EngineConfig {
            mode: ControlMode::LegacyPivot,
            max_pivot_attempts: 3,
            ..Default::default()
        };
        let policy = config.routing_policy();
        // validate + 4 passes of 3 stages + write
        assert_eq!(policy.structural_stage_bound(), 14);
        assert_eq!(config.stage_invocation_ceiling(&policy), 16);

        let debate = EngineConfig::default().routing_policy();
        assert_eq!(debate.structural_stage_bound(), 5);

        let pinned = EngineConfig {
            max_stage_invocations: Some(3),
            ..Default::default()
        };
        assert_eq!(pinned.stage_invocation_ceiling(&debate), 3);
    }

    #[test]
    fn test_mode_display_and_parse() {
        assert_eq!(ControlMode::LegacyPivot.to_string(), "legacy_pivot");
        assert_eq!(
            "legacy_pivot".parse::<ControlMode>().unwrap(),
            ControlMode::LegacyPivot
        );
        assert!("other".parse::<ControlMode>().is_err());
    }

    #[test]
    fn test_with_policy_overlays_frozen_fields() {
        let frozen = EngineConfig {
            pass_threshold: 4,
            debate_max_rounds: 2,
            ..Default::default()
        }
        .routing_policy();
        let current = EngineConfig {
            pass_threshold: 8,
            debate_max_rounds: 6,
            agent_timeout_seconds: 5,
            ..Default::default()
        };

        let effective = current.with_policy(&frozen);
        assert_eq!(effective.pass_threshold, 4);
        assert_eq!(effective.debate_max_rounds, 2);
        assert_eq!(effective.agent_timeout_seconds, 5);
        assert_eq!(effective.routing_policy(), frozen);
        assert_eq!(effective.stage_timeout(StageId::Debate), Duration::from_secs(15));
    }

    #[test]
    fn test_policy_without_rounds_deserializes_with_default() {
        let policy: RoutingPolicy = serde_json::from_str(
            r#"{"mode":"debate","pass_threshold":5,"pivot_threshold":5,"max_pivot_attempts":3}"#,
        )
        .unwrap();
        assert_eq!(policy.debate_max_rounds, 6);
    }

    #[test]
    fn test_stage_timeout_scales_with_calls() {
        let config = EngineConfig {
            agent_timeout_seconds: 10,
            scrape_timeout_seconds: 3,
            debate_max_rounds: 6,
            ..Default::default()
        };
        assert_eq!(config.stage_timeout(StageId::Critique), Duration::from_secs(10));
        assert_eq!(config.stage_timeout(StageId::Debate), Duration::from_secs(70));
        assert_eq!(
            config.stage_timeout(StageId::CompetitorAnalysis),
            Duration::from_secs(16)
        );
    }
}
