use comfy_table::presets::UTF8_FULL;
use comfy_table::{Cell, Color, ContentArrangement, Row, Table};

use crate::model::ActionCatalog;
use crate::optimizer::extract::Assignment;
use crate::optimizer::sensitivity::SensitivityReport;
use crate::optimizer::summary::{GroupSummary, ResourceUsage};
use crate::optimizer::{
    BindingConstraint, ConflictType, ConstraintConflict, RetentionPlan, RunStatus,
};

fn new_table() -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic);
    table
}

pub fn render_kpi_table(plan: &RetentionPlan) -> String {
    let mut table = new_table();
    table.set_header(vec!["Metric", "Value"]);
    let k = &plan.kpis;
    let rows = [
        ("Status", format!("{:?}", plan.status).to_uppercase()),
        ("Customers treated", k.customers_treated.to_string()),
        ("Total spend", format!("${:.2}", k.total_cost)),
        ("Expected retained CLV", format!("${:.2}", k.expected_retained_value)),
        ("Net value", format!("${:.2}", k.net_value)),
        ("Expected churn reduction", format!("{:.1}", k.expected_churn_reduction)),
        ("ROI", format!("{:.1}%", k.roi_pct)),
        (
            "Model",
            format!(
                "{} pairs / {} rows / {} ms",
                plan.model.eligible_pairs, plan.model.rows, plan.solve_millis
            ),
        ),
    ];
    for (label, value) in rows {
        table.add_row(vec![label.to_string(), value]);
    }
    table.to_string()
}

pub fn render_group_table(label: &str, groups: &[GroupSummary]) -> String {
    let mut table = new_table();
    table.set_header(vec![label, "Customers", "Spend", "Retained CLV", "Net Value"]);
    for g in groups {
        table.add_row(vec![
            g.label.clone(),
            g.customers.to_string(),
            format!("${:.2}", g.cost),
            format!("${:.2}", g.retained_value),
            format!("${:.2}", g.net_value),
        ]);
    }
    table.to_string()
}

pub fn render_assignments_table(assignments: &[Assignment]) -> String {
    let mut table = new_table();
    table.set_header(vec![
        "Customer",
        "Tier",
        "Segment",
        "Churn",
        "CLV",
        "Action",
        "Channel",
        "Cost",
        "Net Value",
    ]);
    for a in assignments {
        table.add_row(vec![
            a.customer_id.clone(),
            a.subscription_type.to_string(),
            format!("{}/{}", a.risk_tier, a.value_tier),
            format!("{:.2}", a.churn_probability),
            format!("${:.0}", a.lifetime_value),
            a.action_name.clone(),
            a.channel.to_string(),
            format!("${:.2}", a.cost),
            format!("${:.2}", a.net_value),
        ]);
    }
    table.to_string()
}

pub fn render_binding_table(items: &[BindingConstraint]) -> String {
    let mut table = new_table();
    table.set_header(vec!["Constraint", "Used", "Limit", "Explanation"]);
    for item in items {
        table.add_row(vec![
            item.name.clone(),
            format!("{:.2}", item.activity),
            format!("{:.2}", item.limit),
            item.explanation.clone(),
        ]);
    }
    table.to_string()
}

pub fn render_usage_table(items: &[ResourceUsage]) -> String {
    let mut table = new_table();
    table.set_header(vec!["Resource", "Used", "Limit", "Utilization"]);
    for item in items {
        table.add_row(vec![
            item.resource.clone(),
            format!("{:.2}", item.used),
            format!("{:.2}", item.limit),
            format!("{:.1}%", item.utilization_pct),
        ]);
    }
    table.to_string()
}

pub fn render_conflicts_table(conflicts: &[ConstraintConflict]) -> String {
    let mut table = new_table();
    table.set_header(vec!["Type", "Constraints", "Detail"]);
    for c in conflicts {
        let kind = match c.conflict_type {
            ConflictType::DirectContradiction => Cell::new("CONTRADICTION").fg(Color::Red),
            ConflictType::TensionZone => Cell::new("TENSION").fg(Color::Yellow),
        };
        table.add_row(Row::from(vec![
            kind,
            Cell::new(c.constraints.join(", ")),
            Cell::new(&c.message),
        ]));
    }
    table.to_string()
}

pub fn render_sensitivity_table(report: &SensitivityReport) -> String {
    let mut table = new_table();
    table.set_header(vec![
        "Budget",
        "Status",
        "Treated",
        "Spend",
        "Net Value",
        "ROI",
    ]);
    for s in &report.scenarios {
        let status = format!("{:?}", s.status).to_uppercase();
        let status_cell = match s.status {
            RunStatus::Optimal | RunStatus::OptimalEmpty => Cell::new(status).fg(Color::Green),
            RunStatus::TimedOut => Cell::new(status).fg(Color::Yellow),
            _ => Cell::new(status).fg(Color::Red),
        };
        let dash = || "-".to_string();
        let k = s.kpis.as_ref();
        table.add_row(Row::from(vec![
            Cell::new(format!("${:.0}", s.budget)),
            status_cell,
            Cell::new(k.map(|k| k.customers_treated.to_string()).unwrap_or_else(dash)),
            Cell::new(k.map(|k| format!("${:.2}", k.total_cost)).unwrap_or_else(dash)),
            Cell::new(k.map(|k| format!("${:.2}", k.net_value)).unwrap_or_else(dash)),
            Cell::new(k.map(|k| format!("{:.1}%", k.roi_pct)).unwrap_or_else(dash)),
        ]));
    }

    let mut out = table.to_string();
    if let Some(best) = report.best_net_value_budget {
        out.push_str(&format!("\nHighest net value at budget ${best:.0}"));
    }
    out
}

pub fn render_catalog_table(catalog: &ActionCatalog) -> String {
    let mut table = new_table();
    table.set_header(vec!["ID", "Action", "Channel", "Cost", "Uplift", "Eligible"]);
    for a in catalog.actions() {
        table.add_row(vec![
            a.id.to_string(),
            a.name.clone(),
            a.channel.to_string(),
            format!("${:.2}", a.cost),
            format!("{:.0}%", a.uplift * 100.0),
            a.eligibility.to_string(),
        ]);
    }
    table.to_string()
}
