use anyhow::Result;

use crate::model::ActionCatalog;
use crate::optimizer::extract::Assignment;
use crate::optimizer::holdout::TreatmentRow;
use crate::optimizer::sensitivity::SensitivityReport;

const ASSIGNMENT_HEADER: [&str; 13] = [
    "customer_id",
    "subscription_type",
    "risk_tier",
    "value_tier",
    "churn_probability",
    "clv",
    "action_id",
    "action_name",
    "channel",
    "cost",
    "uplift",
    "expected_retained_value",
    "net_value",
];

fn assignment_fields(a: &Assignment) -> Vec<String> {
    vec![
        a.customer_id.clone(),
        a.subscription_type.to_string(),
        a.risk_tier.to_string(),
        a.value_tier.to_string(),
        format!("{:.4}", a.churn_probability),
        format!("{:.2}", a.lifetime_value),
        a.action_id.to_string(),
        a.action_name.clone(),
        a.channel.to_string(),
        format!("{:.2}", a.cost),
        format!("{:.4}", a.uplift),
        format!("{:.4}", a.expected_retained_value),
        format!("{:.4}", a.net_value),
    ]
}

pub fn assignments_to_csv(assignments: &[Assignment]) -> Result<String> {
    let mut writer = csv::Writer::from_writer(vec![]);
    writer.write_record(ASSIGNMENT_HEADER)?;
    for a in assignments {
        writer.write_record(assignment_fields(a))?;
    }
    let data = writer.into_inner()?;
    Ok(String::from_utf8_lossy(&data).to_string())
}

/// Assignments plus the holdout split, ready for campaign execution.
pub fn treatment_plan_to_csv(rows: &[TreatmentRow]) -> Result<String> {
    let mut writer = csv::Writer::from_writer(vec![]);
    let mut header: Vec<&str> = ASSIGNMENT_HEADER.to_vec();
    header.extend(["holdout", "execute_treatment"]);
    writer.write_record(&header)?;
    for row in rows {
        let mut fields = assignment_fields(&row.assignment);
        fields.push(row.holdout.to_string());
        fields.push(row.execute_treatment.to_string());
        writer.write_record(fields)?;
    }
    let data = writer.into_inner()?;
    Ok(String::from_utf8_lossy(&data).to_string())
}

pub fn sensitivity_to_csv(report: &SensitivityReport) -> Result<String> {
    let mut writer = csv::Writer::from_writer(vec![]);
    writer.write_record([
        "budget",
        "status",
        "customers_treated",
        "total_cost",
        "expected_retained_value",
        "net_value",
        "roi_pct",
    ])?;
    for s in &report.scenarios {
        let k = s.kpis.as_ref();
        writer.write_record([
            format!("{:.2}", s.budget),
            format!("{:?}", s.status).to_lowercase(),
            k.map(|k| k.customers_treated.to_string()).unwrap_or_default(),
            k.map(|k| format!("{:.2}", k.total_cost)).unwrap_or_default(),
            k.map(|k| format!("{:.2}", k.expected_retained_value))
                .unwrap_or_default(),
            k.map(|k| format!("{:.2}", k.net_value)).unwrap_or_default(),
            k.map(|k| format!("{:.2}", k.roi_pct)).unwrap_or_default(),
        ])?;
    }
    let data = writer.into_inner()?;
    Ok(String::from_utf8_lossy(&data).to_string())
}

pub fn catalog_to_csv(catalog: &ActionCatalog) -> Result<String> {
    let mut writer = csv::Writer::from_writer(vec![]);
    writer.write_record([
        "action_id",
        "action_name",
        "channel",
        "cost",
        "uplift",
        "eligible_segment",
        "description",
    ])?;
    for a in catalog.actions() {
        writer.write_record([
            a.id.to_string(),
            a.name.clone(),
            a.channel.to_string(),
            a.cost.to_string(),
            a.uplift.to_string(),
            a.eligibility.to_string(),
            a.description.clone(),
        ])?;
    }
    let data = writer.into_inner()?;
    Ok(String::from_utf8_lossy(&data).to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::catalog::default_catalog;
    use crate::data::loader::read_actions;

    #[test]
    fn catalog_csv_reads_back() {
        let catalog = default_catalog();
        let csv = catalog_to_csv(&catalog).expect("csv");
        let parsed = read_actions(csv.as_bytes()).expect("parses");
        assert_eq!(parsed, catalog);
    }

    #[test]
    fn treatment_plan_has_holdout_columns() {
        let csv = treatment_plan_to_csv(&[]).expect("csv");
        let header = csv.lines().next().unwrap_or_default();
        assert!(header.ends_with("holdout,execute_treatment"));
        assert!(header.starts_with("customer_id,"));
    }
}
