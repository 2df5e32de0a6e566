use crate::data::CustomerRecord;
use crate::model::{PaymentPlan, SubscriptionTier};

const CLV_HORIZON_YEARS: f64 = 2.0;
const DEFAULT_ENGAGEMENT: f64 = 0.5;

/// Annual revenue proxy per subscription tier.
pub fn base_annual_value(tier: SubscriptionTier) -> f64 {
    match tier {
        SubscriptionTier::Free => 100.0,
        SubscriptionTier::Student => 120.0,
        SubscriptionTier::Premium => 240.0,
        SubscriptionTier::Family => 360.0,
        SubscriptionTier::Unknown => 150.0,
    }
}

pub fn payment_multiplier(plan: Option<PaymentPlan>) -> f64 {
    match plan {
        Some(PaymentPlan::Yearly) => 1.3,
        Some(PaymentPlan::Monthly) | None => 1.0,
    }
}

/// Two-year lifetime value proxy for customers without a measured value.
pub fn estimate_clv(
    tier: SubscriptionTier,
    plan: Option<PaymentPlan>,
    engagement: f64,
) -> f64 {
    base_annual_value(tier) * payment_multiplier(plan) * (1.0 + engagement) * CLV_HORIZON_YEARS
}

/// Table-wide maxima used to normalise listening activity into `[0, 1]`.
#[derive(Debug, Clone, Copy, Default)]
pub struct EngagementScale {
    max_hours: f64,
    max_songs: f64,
}

impl EngagementScale {
    pub fn from_records(records: &[CustomerRecord]) -> Self {
        let max_of = |values: &mut dyn Iterator<Item = f64>| {
            values.filter(|v| v.is_finite()).fold(0.0_f64, f64::max)
        };
        Self {
            max_hours: max_of(&mut records.iter().filter_map(|r| r.weekly_hours)),
            max_songs: max_of(&mut records.iter().filter_map(|r| r.weekly_songs_played)),
        }
    }

    pub fn score(&self, hours: Option<f64>, songs: Option<f64>) -> f64 {
        match (hours, songs) {
            (Some(h), Some(s)) if self.max_hours > 0.0 && self.max_songs > 0.0 => {
                (h / self.max_hours) * 0.5 + (s / self.max_songs) * 0.5
            }
            _ => DEFAULT_ENGAGEMENT,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn yearly_family_subscriber_is_worth_most() {
        let family = estimate_clv(SubscriptionTier::Family, Some(PaymentPlan::Yearly), 1.0);
        let free = estimate_clv(SubscriptionTier::Free, Some(PaymentPlan::Monthly), 0.0);
        assert!((family - 360.0 * 1.3 * 2.0 * 2.0).abs() < 1e-9);
        assert!((free - 200.0).abs() < 1e-9);
    }

    #[test]
    fn engagement_is_normalised_by_table_maxima() {
        let records = vec![
            CustomerRecord {
                customer_id: "a".to_string(),
                weekly_hours: Some(10.0),
                weekly_songs_played: Some(200.0),
                ..CustomerRecord::default()
            },
            CustomerRecord {
                customer_id: "b".to_string(),
                weekly_hours: Some(5.0),
                weekly_songs_played: Some(50.0),
                ..CustomerRecord::default()
            },
        ];
        let scale = EngagementScale::from_records(&records);
        assert!((scale.score(Some(10.0), Some(200.0)) - 1.0).abs() < 1e-9);
        assert!((scale.score(Some(5.0), Some(50.0)) - 0.375).abs() < 1e-9);
        assert!((scale.score(None, Some(50.0)) - DEFAULT_ENGAGEMENT).abs() < 1e-9);
    }
}
