use std::fmt::{Display, Formatter};
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const HIGH_RISK_THRESHOLD: f64 = 0.7;
pub const LOW_RISK_THRESHOLD: f64 = 0.3;
pub const HIGH_VALUE_THRESHOLD: f64 = 300.0;
pub const LOW_VALUE_THRESHOLD: f64 = 150.0;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum SubscriptionTier {
    Free,
    Student,
    Premium,
    Family,
    Unknown,
}

impl SubscriptionTier {
    pub const KNOWN: [SubscriptionTier; 4] = [
        SubscriptionTier::Free,
        SubscriptionTier::Student,
        SubscriptionTier::Premium,
        SubscriptionTier::Family,
    ];

    pub fn as_slug(&self) -> &'static str {
        match self {
            Self::Free => "free",
            Self::Student => "student",
            Self::Premium => "premium",
            Self::Family => "family",
            Self::Unknown => "unknown",
        }
    }
}

impl Display for SubscriptionTier {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let display = match self {
            Self::Free => "Free",
            Self::Student => "Student",
            Self::Premium => "Premium",
            Self::Family => "Family",
            Self::Unknown => "Unknown",
        };
        write!(f, "{display}")
    }
}

#[derive(Debug, Error)]
#[error("unknown subscription tier: {0}")]
pub struct TierParseError(pub String);

impl FromStr for SubscriptionTier {
    type Err = TierParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "free" => Ok(Self::Free),
            "student" => Ok(Self::Student),
            "premium" => Ok(Self::Premium),
            "family" => Ok(Self::Family),
            "unknown" | "" => Ok(Self::Unknown),
            _ => Err(TierParseError(s.to_string())),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum PaymentPlan {
    Monthly,
    Yearly,
}

impl Display for PaymentPlan {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Monthly => write!(f, "Monthly"),
            Self::Yearly => write!(f, "Yearly"),
        }
    }
}

#[derive(Debug, Error)]
#[error("unknown payment plan: {0}")]
pub struct PaymentPlanParseError(pub String);

impl FromStr for PaymentPlan {
    type Err = PaymentPlanParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "monthly" => Ok(Self::Monthly),
            "yearly" | "annual" => Ok(Self::Yearly),
            _ => Err(PaymentPlanParseError(s.to_string())),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum Channel {
    None,
    Email,
    InApp,
    Call,
}

impl Channel {
    pub const ALL: [Channel; 4] = [Channel::None, Channel::Email, Channel::InApp, Channel::Call];

    pub fn as_slug(&self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Email => "email",
            Self::InApp => "in_app",
            Self::Call => "call",
        }
    }
}

impl Display for Channel {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_slug())
    }
}

#[derive(Debug, Error)]
#[error("unknown channel: {0}")]
pub struct ChannelParseError(pub String);

impl FromStr for Channel {
    type Err = ChannelParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_lowercase().replace('-', "_");
        match normalized.as_str() {
            "none" => Ok(Self::None),
            "email" => Ok(Self::Email),
            "in_app" | "inapp" | "push" => Ok(Self::InApp),
            "call" | "phone" => Ok(Self::Call),
            _ => Err(ChannelParseError(s.to_string())),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum RiskTier {
    Low,
    Medium,
    High,
}

impl RiskTier {
    pub fn classify(churn_probability: f64) -> Self {
        if churn_probability > HIGH_RISK_THRESHOLD {
            Self::High
        } else if churn_probability > LOW_RISK_THRESHOLD {
            Self::Medium
        } else {
            Self::Low
        }
    }
}

impl Display for RiskTier {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Low => write!(f, "low_risk"),
            Self::Medium => write!(f, "medium_risk"),
            Self::High => write!(f, "high_risk"),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum ValueTier {
    Low,
    Medium,
    High,
}

impl ValueTier {
    pub fn classify(lifetime_value: f64) -> Self {
        if lifetime_value > HIGH_VALUE_THRESHOLD {
            Self::High
        } else if lifetime_value > LOW_VALUE_THRESHOLD {
            Self::Medium
        } else {
            Self::Low
        }
    }
}

impl Display for ValueTier {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Low => write!(f, "low_value"),
            Self::Medium => write!(f, "medium_value"),
            Self::High => write!(f, "high_value"),
        }
    }
}

/// A customer as seen by one optimization run.
///
/// Risk and value tiers are derived in [`Customer::new`] and cannot drift
/// from `churn_probability` / `lifetime_value` afterwards: the fields are
/// private and there are no setters.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct Customer {
    id: String,
    churn_probability: f64,
    lifetime_value: f64,
    subscription: SubscriptionTier,
    payment_plan: Option<PaymentPlan>,
    risk_tier: RiskTier,
    value_tier: ValueTier,
}

impl Customer {
    pub fn new(
        id: impl Into<String>,
        churn_probability: f64,
        lifetime_value: f64,
        subscription: SubscriptionTier,
        payment_plan: Option<PaymentPlan>,
    ) -> Self {
        Self {
            id: id.into(),
            churn_probability,
            lifetime_value,
            subscription,
            payment_plan,
            risk_tier: RiskTier::classify(churn_probability),
            value_tier: ValueTier::classify(lifetime_value),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn churn_probability(&self) -> f64 {
        self.churn_probability
    }

    pub fn lifetime_value(&self) -> f64 {
        self.lifetime_value
    }

    pub fn subscription(&self) -> SubscriptionTier {
        self.subscription
    }

    pub fn payment_plan(&self) -> Option<PaymentPlan> {
        self.payment_plan
    }

    pub fn risk_tier(&self) -> RiskTier {
        self.risk_tier
    }

    pub fn value_tier(&self) -> ValueTier {
        self.value_tier
    }

    pub fn is_high_value(&self) -> bool {
        self.value_tier == ValueTier::High
    }

    /// Churn-weighted value at stake, `p * v`.
    pub fn at_risk_value(&self) -> f64 {
        self.churn_probability * self.lifetime_value
    }
}

/// Which customers an action may be offered to.
///
/// Rules arrive as free text in action tables; anything that is not `all`,
/// a known subscription tier or `high_value` parses to `Unmatched` and is
/// eligible for nobody.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum EligibilityRule {
    All,
    Tier(SubscriptionTier),
    HighValue,
    Unmatched(String),
}

impl EligibilityRule {
    /// Rules compare the exact string: `"premium"` is not `"Premium"`.
    pub fn parse(raw: &str) -> Self {
        if raw == "all" {
            return Self::All;
        }
        if let Some(tier) = SubscriptionTier::KNOWN
            .into_iter()
            .find(|tier| tier.to_string() == raw)
        {
            return Self::Tier(tier);
        }
        if raw == "high_value" {
            return Self::HighValue;
        }
        Self::Unmatched(raw.to_string())
    }

    pub fn admits(&self, customer: &Customer) -> bool {
        match self {
            Self::All => true,
            Self::Tier(tier) => customer.subscription() == *tier,
            Self::HighValue => customer.is_high_value(),
            Self::Unmatched(_) => false,
        }
    }
}

impl Display for EligibilityRule {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::All => write!(f, "all"),
            Self::Tier(tier) => write!(f, "{tier}"),
            Self::HighValue => write!(f, "high_value"),
            Self::Unmatched(raw) => write!(f, "{raw}"),
        }
    }
}

impl Serialize for EligibilityRule {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for EligibilityRule {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Ok(Self::parse(&raw))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Action {
    pub id: u32,
    pub name: String,
    pub channel: Channel,
    pub cost: f64,
    pub uplift: f64,
    pub eligibility: EligibilityRule,
    #[serde(default)]
    pub description: String,
}

impl Action {
    /// The no-op choice: free and without effect.
    pub fn is_default(&self) -> bool {
        self.cost == 0.0 && self.uplift == 0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn customer(tier: SubscriptionTier, value: f64) -> Customer {
        Customer::new("c1", 0.5, value, tier, None)
    }

    #[test]
    fn risk_tiers_follow_fixed_thresholds() {
        assert_eq!(RiskTier::classify(0.0), RiskTier::Low);
        assert_eq!(RiskTier::classify(0.3), RiskTier::Low);
        assert_eq!(RiskTier::classify(0.31), RiskTier::Medium);
        assert_eq!(RiskTier::classify(0.7), RiskTier::Medium);
        assert_eq!(RiskTier::classify(0.72), RiskTier::High);
    }

    #[test]
    fn value_tiers_drive_high_value_flag() {
        assert!(!customer(SubscriptionTier::Free, 150.0).is_high_value());
        assert_eq!(
            customer(SubscriptionTier::Free, 240.0).value_tier(),
            ValueTier::Medium
        );
        assert!(customer(SubscriptionTier::Free, 301.0).is_high_value());
    }

    #[test]
    fn rules_parse_in_precedence_order() {
        assert_eq!(EligibilityRule::parse("all"), EligibilityRule::All);
        assert_eq!(
            EligibilityRule::parse("Premium"),
            EligibilityRule::Tier(SubscriptionTier::Premium)
        );
        assert_eq!(EligibilityRule::parse("high_value"), EligibilityRule::HighValue);
        assert_eq!(
            EligibilityRule::parse("Platinum"),
            EligibilityRule::Unmatched("Platinum".to_string())
        );
        assert_eq!(
            EligibilityRule::parse("unknown"),
            EligibilityRule::Unmatched("unknown".to_string())
        );
    }

    #[test]
    fn rules_are_case_sensitive() {
        assert_eq!(
            EligibilityRule::parse("premium"),
            EligibilityRule::Unmatched("premium".to_string())
        );
        assert_eq!(
            EligibilityRule::parse("ALL"),
            EligibilityRule::Unmatched("ALL".to_string())
        );
        assert!(!EligibilityRule::parse("premium")
            .admits(&customer(SubscriptionTier::Premium, 900.0)));
        assert!(EligibilityRule::parse("Premium")
            .admits(&customer(SubscriptionTier::Premium, 900.0)));
    }

    #[test]
    fn unmatched_rule_admits_nobody() {
        let rule = EligibilityRule::parse("Platinum");
        assert!(!rule.admits(&customer(SubscriptionTier::Premium, 900.0)));
        assert!(!rule.admits(&customer(SubscriptionTier::Unknown, 10.0)));
    }

    #[test]
    fn tier_rule_requires_exact_tier() {
        let rule = EligibilityRule::Tier(SubscriptionTier::Free);
        assert!(rule.admits(&customer(SubscriptionTier::Free, 10.0)));
        assert!(!rule.admits(&customer(SubscriptionTier::Student, 10.0)));
    }

    #[test]
    fn channel_aliases() {
        assert_eq!("push".parse::<Channel>().ok(), Some(Channel::InApp));
        assert_eq!("in-app".parse::<Channel>().ok(), Some(Channel::InApp));
        assert!("fax".parse::<Channel>().is_err());
    }
}
