use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use retention_optimizer::config::{Config, ConfigOverrides};
use retention_optimizer::data::catalog::default_catalog;
use retention_optimizer::data::loader::{load_actions, load_customers};
use retention_optimizer::data::sample::sample_customers;
use retention_optimizer::model::{ActionCatalog, Customer};
use retention_optimizer::optimizer::holdout::plan_treatments;
use retention_optimizer::optimizer::sensitivity::{
    budget_points, run_budget_sensitivity, SensitivityReport,
};
use retention_optimizer::optimizer::session::SolverEnvironment;
use retention_optimizer::optimizer::summary::{
    by_action, by_channel, by_segment, resource_usage, top_assignments,
};
use retention_optimizer::optimizer::{optimize, PlanStatus, RetentionPlan};
use retention_optimizer::output::csv::{
    assignments_to_csv, catalog_to_csv, sensitivity_to_csv, treatment_plan_to_csv,
};
use retention_optimizer::output::json::{render_json, PlanReport};
use retention_optimizer::output::table::{
    render_assignments_table, render_binding_table, render_catalog_table,
    render_conflicts_table, render_group_table, render_kpi_table, render_sensitivity_table,
    render_usage_table,
};
use retention_optimizer::server::run_server;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Clone, Copy, ValueEnum)]
enum OutputFormat {
    Table,
    Json,
    Csv,
}

#[derive(Debug, Parser)]
#[command(
    name = "retention-optimizer",
    about = "Plan churn-retention actions under budget and channel limits"
)]
struct Cli {
    #[arg(short, long)]
    config: Option<PathBuf>,
    #[arg(long)]
    customers: Option<String>,
    #[arg(long)]
    actions: Option<String>,
    #[arg(short, long, value_enum, default_value_t = OutputFormat::Table)]
    output: OutputFormat,
    #[arg(short, long)]
    budget: Option<f64>,
    #[arg(long = "sample-size")]
    sample_size: Option<usize>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    Optimize {
        #[arg(long)]
        top: Option<usize>,
    },
    Export {
        #[arg(long)]
        out: PathBuf,
    },
    Sensitivity {
        #[arg(long)]
        min: f64,
        #[arg(long)]
        max: f64,
        #[arg(long)]
        step: f64,
    },
    Catalog,
    Serve {
        #[arg(long)]
        host: Option<String>,
        #[arg(long)]
        port: Option<u16>,
    },
    Config {
        #[arg(long)]
        init: bool,
        #[arg(long)]
        show: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();
    let cli = Cli::parse();

    let config_path = cli.config.clone().unwrap_or_else(Config::default_path);
    let mut config = Config::load(Some(&config_path))?;
    config.apply_overrides(ConfigOverrides {
        customers_path: cli.customers.clone(),
        actions_path: cli.actions.clone(),
        weekly_budget: cli.budget,
        sample_size: cli.sample_size,
    });

    if matches!(cli.command, Commands::Config { .. }) {
        return handle_config_command(&cli.command, &config, &config_path);
    }
    if let Commands::Serve { host, port } = &cli.command {
        let host = host.clone().unwrap_or_else(|| config.server.host.clone());
        let port = port.unwrap_or(config.server.port);
        let bind = format!("{host}:{port}");
        let addr: SocketAddr = bind
            .parse()
            .map_err(|e| anyhow!("invalid bind address {bind}: {e}"))?;
        return run_server(config, addr).await;
    }

    let catalog = load_catalog(&config)?;
    if matches!(cli.command, Commands::Catalog) {
        return print_catalog(&catalog, cli.output);
    }

    let customers = load_customer_table(&config)?;
    let constraints = config.constraint_config()?;
    let options = config.solve_options()?;
    let env = SolverEnvironment::new(config.solver.max_sessions);

    match &cli.command {
        Commands::Optimize { top } => {
            let plan = optimize(&env, &customers, &catalog, &constraints, &options)?;
            let top = top.unwrap_or(config.report.top_customers);
            print_plan(&plan, top, cli.output)?;
        }
        Commands::Export { out } => {
            let plan = optimize(&env, &customers, &catalog, &constraints, &options)?;
            let rows = plan_treatments(&plan, config.holdout.fraction, config.holdout.seed)?;
            std::fs::write(out, treatment_plan_to_csv(&rows)?)
                .with_context(|| format!("failed writing treatment plan: {}", out.display()))?;
            let held = rows.iter().filter(|r| r.holdout).count();
            info!(
                "wrote {} assignments ({} held out) to {}",
                rows.len(),
                held,
                out.display()
            );
            if plan.status == PlanStatus::OptimalEmpty {
                println!("no customers were worth treating");
            }
        }
        Commands::Sensitivity { min, max, step } => {
            let budgets = budget_points(*min, *max, *step)?;
            let report =
                run_budget_sensitivity(&env, &customers, &catalog, &constraints, &budgets, &options);
            print_sensitivity(&report, cli.output)?;
        }
        Commands::Catalog | Commands::Serve { .. } | Commands::Config { .. } => {}
    }
    Ok(())
}

fn handle_config_command(command: &Commands, config: &Config, path: &Path) -> Result<()> {
    let Commands::Config { init, show } = command else {
        return Ok(());
    };
    if *init {
        Config::write_template(path)?;
        println!("wrote config template to {}", path.display());
    }
    if *show || !*init {
        println!("{}", render_json(config)?);
    }
    Ok(())
}

fn load_catalog(config: &Config) -> Result<ActionCatalog> {
    match config.resolved_actions_path() {
        Some(path) => load_actions(&path),
        None => Ok(default_catalog()),
    }
}

fn load_customer_table(config: &Config) -> Result<Vec<Customer>> {
    match config.resolved_customers_path() {
        Some(path) => load_customers(&path),
        None => {
            warn!(
                "no customer file configured; using {} generated sample customers",
                config.data.sample_size
            );
            Ok(sample_customers(config.data.sample_size)?)
        }
    }
}

fn print_plan(plan: &RetentionPlan, top: usize, format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Table => {
            println!("{}", render_kpi_table(plan));
            match plan.status {
                PlanStatus::TimedOut => {
                    println!("solver time limit reached before a plan was found");
                    return Ok(());
                }
                PlanStatus::OptimalEmpty => {
                    println!("no customers were worth treating");
                }
                PlanStatus::Optimal => {
                    println!("{}", render_group_table("Action", &by_action(&plan.assignments)));
                    println!("{}", render_group_table("Channel", &by_channel(&plan.assignments)));
                    println!("{}", render_group_table("Segment", &by_segment(&plan.assignments)));
                    println!(
                        "{}",
                        render_usage_table(&resource_usage(&plan.assignments, &plan.constraints))
                    );
                    println!(
                        "{}",
                        render_assignments_table(&top_assignments(&plan.assignments, top))
                    );
                }
            }
            if !plan.binding.is_empty() {
                println!("{}", render_binding_table(&plan.binding));
            }
            if !plan.diagnostics.is_empty() {
                println!("{}", render_conflicts_table(&plan.diagnostics));
            }
        }
        OutputFormat::Json => println!("{}", render_json(&PlanReport::new(plan))?),
        OutputFormat::Csv => print!("{}", assignments_to_csv(&plan.assignments)?),
    }
    Ok(())
}

fn print_sensitivity(report: &SensitivityReport, format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Table => println!("{}", render_sensitivity_table(report)),
        OutputFormat::Json => println!("{}", render_json(report)?),
        OutputFormat::Csv => print!("{}", sensitivity_to_csv(report)?),
    }
    Ok(())
}

fn print_catalog(catalog: &ActionCatalog, format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Table => println!("{}", render_catalog_table(catalog)),
        OutputFormat::Json => println!("{}", render_json(catalog)?),
        OutputFormat::Csv => print!("{}", catalog_to_csv(catalog)?),
    }
    Ok(())
}
