use crate::model::{Action, ActionCatalog, Channel, EligibilityRule, SubscriptionTier};

pub const NO_ACTION_ID: u32 = 0;

/// The retention playbook used when no action table is supplied.
pub fn default_catalog() -> ActionCatalog {
    let actions = vec![
        entry(
            NO_ACTION_ID,
            "No Action",
            Channel::None,
            0.0,
            0.0,
            EligibilityRule::All,
            "Do nothing",
        ),
        entry(
            1,
            "Personalized Email",
            Channel::Email,
            2.0,
            0.08,
            EligibilityRule::All,
            "Automated email with playlist recommendations",
        ),
        entry(
            2,
            "20% Discount Offer",
            Channel::Email,
            20.0,
            0.15,
            EligibilityRule::All,
            "1-month discount for paid tiers",
        ),
        entry(
            3,
            "Premium Trial (Free users)",
            Channel::InApp,
            10.0,
            0.25,
            EligibilityRule::Tier(SubscriptionTier::Free),
            "30-day free Premium trial",
        ),
        entry(
            4,
            "Family Plan Upgrade",
            Channel::Email,
            15.0,
            0.18,
            EligibilityRule::Tier(SubscriptionTier::Premium),
            "Discounted Family plan upgrade",
        ),
        entry(
            5,
            "Retention Specialist Call",
            Channel::Call,
            50.0,
            0.30,
            EligibilityRule::HighValue,
            "Personal outreach from retention team",
        ),
        entry(
            6,
            "VIP Concierge Service",
            Channel::Call,
            100.0,
            0.40,
            EligibilityRule::HighValue,
            "Dedicated account manager + exclusive perks",
        ),
        entry(
            7,
            "Win-Back Email Series",
            Channel::Email,
            30.0,
            0.22,
            EligibilityRule::All,
            "Multi-touch campaign with special offers",
        ),
    ];
    ActionCatalog::builtin(actions)
}

fn entry(
    id: u32,
    name: &str,
    channel: Channel,
    cost: f64,
    uplift: f64,
    eligibility: EligibilityRule,
    description: &str,
) -> Action {
    Action {
        id,
        name: name.to_string(),
        channel,
        cost,
        uplift,
        eligibility,
        description: description.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_catalog_passes_validation() {
        let catalog = default_catalog();
        let revalidated = ActionCatalog::new(catalog.actions().to_vec()).expect("valid catalog");
        assert_eq!(revalidated, catalog);
    }

    #[test]
    fn default_catalog_has_eight_actions_and_a_no_op() {
        let catalog = default_catalog();
        assert_eq!(catalog.len(), 8);
        let no_op = &catalog.actions()[0];
        assert!(no_op.is_default());
        assert_eq!(no_op.id, NO_ACTION_ID);
        assert_eq!(
            catalog
                .actions()
                .iter()
                .filter(|a| a.channel == Channel::Call)
                .count(),
            2
        );
    }
}
