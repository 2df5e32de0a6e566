use rand::distributions::WeightedIndex;
use rand::{rngs::StdRng, Rng, SeedableRng};
use rand_distr::{Beta, Distribution};

use crate::data::clv::{base_annual_value, payment_multiplier};
use crate::data::{build_customers, CustomerRecord};
use crate::error::OptimizeError;
use crate::model::{Customer, PaymentPlan, SubscriptionTier};

pub const DEFAULT_SAMPLE_SEED: u64 = 42;

const TIERS: [(SubscriptionTier, f64); 4] = [
    (SubscriptionTier::Free, 0.25),
    (SubscriptionTier::Student, 0.25),
    (SubscriptionTier::Premium, 0.30),
    (SubscriptionTier::Family, 0.20),
];
const PLANS: [(PaymentPlan, f64); 2] = [(PaymentPlan::Monthly, 0.70), (PaymentPlan::Yearly, 0.30)];
const MAX_ENGAGEMENT_BONUS: f64 = 0.5;

/// Seeded demo population used when no customer file is configured.
///
/// Churn follows `Beta(2, 5)`; tier and payment mix follow typical
/// streaming subscriber shares. Value is the tier's annual revenue scaled
/// by the payment multiplier and a uniform engagement bonus in `[0, 0.5)`.
pub fn sample_customers(count: usize) -> Result<Vec<Customer>, OptimizeError> {
    sample_customers_seeded(count, DEFAULT_SAMPLE_SEED)
}

pub fn sample_customers_seeded(count: usize, seed: u64) -> Result<Vec<Customer>, OptimizeError> {
    let mut rng = StdRng::seed_from_u64(seed);
    let churn = Beta::new(2.0, 5.0)
        .map_err(|e| OptimizeError::input("customer", format!("churn distribution: {e}")))?;
    let tiers = WeightedIndex::new(TIERS.iter().map(|(_, w)| *w))
        .map_err(|e| OptimizeError::input("customer", format!("tier weights: {e}")))?;
    let plans = WeightedIndex::new(PLANS.iter().map(|(_, w)| *w))
        .map_err(|e| OptimizeError::input("customer", format!("payment weights: {e}")))?;

    let records = (0..count)
        .map(|idx| {
            let p: f64 = churn.sample(&mut rng);
            let tier = TIERS[tiers.sample(&mut rng)].0;
            let plan = PLANS[plans.sample(&mut rng)].0;
            let bonus = rng.gen_range(0.0..MAX_ENGAGEMENT_BONUS);
            CustomerRecord {
                customer_id: format!("CUST-{idx:05}"),
                churn_probability: p,
                clv: Some(base_annual_value(tier) * payment_multiplier(Some(plan)) * (1.0 + bonus)),
                subscription_type: Some(tier.to_string()),
                payment_plan: Some(plan.to_string()),
                weekly_hours: None,
                weekly_songs_played: None,
            }
        })
        .collect::<Vec<_>>();
    build_customers(records)
}
