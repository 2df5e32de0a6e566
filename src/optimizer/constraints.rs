use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::OptimizeError;
use crate::model::{Channel, SubscriptionTier};

pub const WEEKLY_BUDGET: &str = "weekly_budget";
pub const MIN_HIGH_RISK_PCT: &str = "min_high_risk_pct";
pub const MIN_SEGMENT_COVERAGE_PCT: &str = "min_segment_coverage_pct";
pub const MAX_ACTION_PCT: &str = "max_action_pct";

/// Typed view of the constraint parameters of one run.
///
/// Only `weekly_budget` is mandatory; every other limit is absent unless
/// configured, and absent means unconstrained.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConstraintConfig {
    pub weekly_budget: f64,
    #[serde(default)]
    pub channel_capacity: BTreeMap<Channel, f64>,
    #[serde(default)]
    pub min_high_risk_pct: Option<f64>,
    #[serde(default)]
    pub min_tier_pct: BTreeMap<SubscriptionTier, f64>,
    #[serde(default)]
    pub min_segment_coverage_pct: Option<f64>,
    #[serde(default)]
    pub max_action_pct: Option<f64>,
}

impl ConstraintConfig {
    pub fn new(weekly_budget: f64) -> Self {
        Self {
            weekly_budget,
            channel_capacity: BTreeMap::new(),
            min_high_risk_pct: None,
            min_tier_pct: BTreeMap::new(),
            min_segment_coverage_pct: None,
            max_action_pct: None,
        }
    }

    pub fn with_channel_capacity(mut self, channel: Channel, capacity: f64) -> Self {
        self.channel_capacity.insert(channel, capacity);
        self
    }

    pub fn with_min_high_risk_pct(mut self, fraction: f64) -> Self {
        self.min_high_risk_pct = Some(fraction);
        self
    }

    pub fn with_min_tier_pct(mut self, tier: SubscriptionTier, fraction: f64) -> Self {
        self.min_tier_pct.insert(tier, fraction);
        self
    }

    pub fn with_min_segment_coverage_pct(mut self, fraction: f64) -> Self {
        self.min_segment_coverage_pct = Some(fraction);
        self
    }

    pub fn with_max_action_pct(mut self, fraction: f64) -> Self {
        self.max_action_pct = Some(fraction);
        self
    }

    /// Interpret a flat parameter map.
    ///
    /// Recognised keys: `weekly_budget`, `<channel>_capacity`,
    /// `min_high_risk_pct`, `min_<tier>_pct`, `min_segment_coverage_pct`,
    /// `max_action_pct`. Anything else is ignored.
    pub fn from_params(params: &BTreeMap<String, f64>) -> Result<Self, OptimizeError> {
        let budget = params
            .get(WEEKLY_BUDGET)
            .copied()
            .ok_or_else(|| OptimizeError::parameter(WEEKLY_BUDGET, "required key is missing"))?;
        let mut config = Self::new(budget);

        for (key, value) in params {
            let key = key.as_str();
            match key {
                WEEKLY_BUDGET => {}
                MIN_HIGH_RISK_PCT => config.min_high_risk_pct = Some(*value),
                MIN_SEGMENT_COVERAGE_PCT => config.min_segment_coverage_pct = Some(*value),
                MAX_ACTION_PCT => config.max_action_pct = Some(*value),
                _ => {
                    if let Some(channel) = capacity_channel(key) {
                        config.channel_capacity.insert(channel, *value);
                    } else if let Some(tier) = coverage_tier(key) {
                        config.min_tier_pct.insert(tier, *value);
                    } else {
                        debug!("ignoring unrecognised constraint key `{key}`");
                    }
                }
            }
        }

        config.validate()?;
        Ok(config)
    }

    /// Flat parameter map, the inverse of [`ConstraintConfig::from_params`].
    pub fn to_params(&self) -> BTreeMap<String, f64> {
        let mut out = BTreeMap::new();
        out.insert(WEEKLY_BUDGET.to_string(), self.weekly_budget);
        for (channel, cap) in &self.channel_capacity {
            out.insert(format!("{}_capacity", channel.as_slug()), *cap);
        }
        if let Some(v) = self.min_high_risk_pct {
            out.insert(MIN_HIGH_RISK_PCT.to_string(), v);
        }
        for (tier, v) in &self.min_tier_pct {
            out.insert(format!("min_{}_pct", tier.as_slug()), *v);
        }
        if let Some(v) = self.min_segment_coverage_pct {
            out.insert(MIN_SEGMENT_COVERAGE_PCT.to_string(), v);
        }
        if let Some(v) = self.max_action_pct {
            out.insert(MAX_ACTION_PCT.to_string(), v);
        }
        out
    }

    pub fn validate(&self) -> Result<(), OptimizeError> {
        if !self.weekly_budget.is_finite() || self.weekly_budget < 0.0 {
            return Err(OptimizeError::parameter(
                WEEKLY_BUDGET,
                format!("must be a non-negative number, got {}", self.weekly_budget),
            ));
        }
        for (channel, cap) in &self.channel_capacity {
            if !cap.is_finite() || *cap < 0.0 {
                return Err(OptimizeError::parameter(
                    format!("{}_capacity", channel.as_slug()),
                    format!("must be a non-negative number, got {cap}"),
                ));
            }
        }
        check_fraction(MIN_HIGH_RISK_PCT, self.min_high_risk_pct)?;
        check_fraction(MIN_SEGMENT_COVERAGE_PCT, self.min_segment_coverage_pct)?;
        check_fraction(MAX_ACTION_PCT, self.max_action_pct)?;
        for (tier, v) in &self.min_tier_pct {
            check_fraction(&format!("min_{}_pct", tier.as_slug()), Some(*v))?;
        }
        Ok(())
    }

    /// Coverage fraction that applies to a subscription tier, combining the
    /// tier-specific floor with the blanket segment floor.
    pub fn tier_floor(&self, tier: SubscriptionTier) -> Option<f64> {
        let specific = self.min_tier_pct.get(&tier).copied();
        let blanket = if tier == SubscriptionTier::Unknown {
            None
        } else {
            self.min_segment_coverage_pct
        };
        match (specific, blanket) {
            (Some(a), Some(b)) => Some(a.max(b)),
            (a, b) => a.or(b),
        }
    }
}

/// `floor(fraction * population)`, tolerant of representation error such as
/// `0.7 * 10 = 7.000000000000001` or `0.29 * 100 = 28.999999999999996`.
pub fn required_count(fraction: f64, population: usize) -> usize {
    let raw = fraction * population as f64;
    let rounded = raw.round();
    if (raw - rounded).abs() < 1e-9 {
        rounded as usize
    } else {
        raw.floor() as usize
    }
}

fn capacity_channel(key: &str) -> Option<Channel> {
    let prefix = key.strip_suffix("_capacity")?;
    Channel::ALL.into_iter().find(|c| c.as_slug() == prefix)
}

fn coverage_tier(key: &str) -> Option<SubscriptionTier> {
    let middle = key.strip_prefix("min_")?.strip_suffix("_pct")?;
    SubscriptionTier::KNOWN
        .into_iter()
        .find(|t| t.as_slug() == middle)
}

fn check_fraction(key: &str, value: Option<f64>) -> Result<(), OptimizeError> {
    match value {
        Some(v) if !(0.0..=1.0).contains(&v) => Err(OptimizeError::parameter(
            key,
            format!("fraction must be within [0, 1], got {v}"),
        )),
        _ => Ok(()),
    }
}
