use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};

use crate::optimizer::constraints::{ConstraintConfig, WEEKLY_BUDGET};
use crate::optimizer::holdout::{DEFAULT_HOLDOUT_FRACTION, DEFAULT_HOLDOUT_SEED};
use crate::optimizer::{SolveOptions, DEFAULT_BINDING_TOLERANCE};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub data: DataConfig,
    #[serde(default)]
    pub constraints: ConstraintsConfig,
    #[serde(default)]
    pub solver: SolverConfig,
    #[serde(default)]
    pub holdout: HoldoutConfig,
    #[serde(default)]
    pub report: ReportConfig,
    #[serde(default)]
    pub server: ServerConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DataConfig {
    #[serde(default)]
    pub customers_path: Option<String>,
    #[serde(default)]
    pub actions_path: Option<String>,
    /// Size of the generated demo population when no customer file is set.
    #[serde(default = "default_sample_size")]
    pub sample_size: usize,
}

/// Flat constraint parameters, see [`ConstraintConfig::from_params`].
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConstraintsConfig {
    pub params: BTreeMap<String, f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SolverConfig {
    #[serde(default)]
    pub time_limit_secs: Option<f64>,
    #[serde(default = "default_max_sessions")]
    pub max_sessions: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HoldoutConfig {
    #[serde(default = "default_holdout_fraction")]
    pub fraction: f64,
    #[serde(default = "default_holdout_seed")]
    pub seed: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportConfig {
    #[serde(default = "default_top_customers")]
    pub top_customers: usize,
    #[serde(default = "default_binding_tolerance")]
    pub binding_tolerance: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub customers_path: Option<String>,
    pub actions_path: Option<String>,
    pub weekly_budget: Option<f64>,
    pub sample_size: Option<usize>,
}

impl Config {
    pub fn default_path() -> PathBuf {
        let home = dirs::home_dir().unwrap_or_else(|| PathBuf::from("."));
        home.join(".config/retention-optimizer/config.toml")
    }

    pub fn load(path: Option<&Path>) -> Result<Self> {
        let path = path
            .map(|p| p.to_path_buf())
            .unwrap_or_else(Self::default_path);
        if !path.exists() {
            return Ok(Self::default());
        }
        let data = fs::read_to_string(&path)
            .with_context(|| format!("failed reading config: {}", path.display()))?;
        let parsed: Self = toml::from_str(&data)
            .with_context(|| format!("failed parsing TOML config: {}", path.display()))?;
        Ok(parsed)
    }

    pub fn apply_overrides(&mut self, overrides: ConfigOverrides) {
        if let Some(path) = overrides.customers_path {
            self.data.customers_path = Some(path);
        }
        if let Some(path) = overrides.actions_path {
            self.data.actions_path = Some(path);
        }
        if let Some(budget) = overrides.weekly_budget {
            self.constraints
                .params
                .insert(WEEKLY_BUDGET.to_string(), budget);
        }
        if let Some(size) = overrides.sample_size {
            self.data.sample_size = size;
        }
    }

    pub fn write_template(path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).with_context(|| {
                format!("failed creating config directory: {}", parent.display())
            })?;
        }
        fs::write(path, Self::default_template())
            .with_context(|| format!("failed writing config template: {}", path.display()))
    }

    pub fn constraint_config(&self) -> Result<ConstraintConfig> {
        ConstraintConfig::from_params(&self.constraints.params)
            .context("invalid [constraints] section")
    }

    pub fn solve_options(&self) -> Result<SolveOptions> {
        let time_limit = match self.solver.time_limit_secs {
            None => None,
            Some(secs) if secs > 0.0 => Some(
                Duration::try_from_secs_f64(secs)
                    .with_context(|| format!("invalid [solver] time_limit_secs: {secs}"))?,
            ),
            Some(secs) => bail!("invalid [solver] time_limit_secs: {secs} (must be positive)"),
        };
        Ok(SolveOptions {
            time_limit,
            binding_tolerance: self.report.binding_tolerance,
        })
    }

    pub fn resolved_customers_path(&self) -> Option<PathBuf> {
        self.data.customers_path.as_deref().map(expand_tilde)
    }

    pub fn resolved_actions_path(&self) -> Option<PathBuf> {
        self.data.actions_path.as_deref().map(expand_tilde)
    }

    pub fn default_template() -> String {
        let template = r#"[data]
# customers_path = "~/data/customers.csv"
# actions_path = "~/data/actions.csv"
sample_size = 500

[constraints]
weekly_budget = 50000.0
email_capacity = 10000.0
call_capacity = 200.0
min_high_risk_pct = 0.6
# min_premium_pct = 0.4
# min_segment_coverage_pct = 0.15
# max_action_pct = 0.5

[solver]
# time_limit_secs = 60.0
max_sessions = 4

[holdout]
fraction = 0.1
seed = 42

[report]
top_customers = 10
binding_tolerance = 0.01

[server]
host = "127.0.0.1"
port = 8787
"#;
        template.to_string()
    }
}

pub fn expand_tilde(path: &str) -> PathBuf {
    if let Some(stripped) = path.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(stripped);
        }
    }
    PathBuf::from(path)
}

impl Default for DataConfig {
    fn default() -> Self {
        Self {
            customers_path: None,
            actions_path: None,
            sample_size: default_sample_size(),
        }
    }
}

impl Default for ConstraintsConfig {
    fn default() -> Self {
        let mut params = BTreeMap::new();
        params.insert(WEEKLY_BUDGET.to_string(), default_weekly_budget());
        Self { params }
    }
}

impl Default for SolverConfig {
    fn default() -> Self {
        Self {
            time_limit_secs: None,
            max_sessions: default_max_sessions(),
        }
    }
}

impl Default for HoldoutConfig {
    fn default() -> Self {
        Self {
            fraction: default_holdout_fraction(),
            seed: default_holdout_seed(),
        }
    }
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            top_customers: default_top_customers(),
            binding_tolerance: default_binding_tolerance(),
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

fn default_sample_size() -> usize {
    500
}

fn default_weekly_budget() -> f64 {
    50_000.0
}

fn default_max_sessions() -> usize {
    4
}

fn default_holdout_fraction() -> f64 {
    DEFAULT_HOLDOUT_FRACTION
}

fn default_holdout_seed() -> u64 {
    DEFAULT_HOLDOUT_SEED
}

fn default_top_customers() -> usize {
    10
}

fn default_binding_tolerance() -> f64 {
    DEFAULT_BINDING_TOLERANCE
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    8787
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Channel;

    #[test]
    fn template_parses_into_effective_config() {
        let config: Config = toml::from_str(&Config::default_template()).expect("template parses");
        let constraints = config.constraint_config().expect("valid constraints");
        assert_eq!(constraints.weekly_budget, 50_000.0);
        assert_eq!(constraints.channel_capacity.get(&Channel::Call), Some(&200.0));
        assert_eq!(constraints.min_high_risk_pct, Some(0.6));
        assert_eq!(config.server.port, 8787);
        assert_eq!(config.holdout.seed, 42);
    }

    #[test]
    fn missing_sections_default() {
        let config: Config = toml::from_str("[server]\nport = 9000\n").expect("parses");
        assert_eq!(config.server.port, 9000);
        assert_eq!(config.server.host, "127.0.0.1");
        assert_eq!(config.data.sample_size, 500);
        assert!(config.solve_options().expect("valid").time_limit.is_none());
        assert!(config.constraint_config().is_ok());
    }

    #[test]
    fn time_limit_is_validated_not_panicking() {
        let config: Config =
            toml::from_str("[solver]\ntime_limit_secs = 2.5\n").expect("parses");
        assert_eq!(
            config.solve_options().expect("valid").time_limit,
            Some(Duration::from_millis(2_500))
        );

        for bad in [1e30, -1.0, 0.0, f64::NAN, f64::INFINITY] {
            let mut config = Config::default();
            config.solver.time_limit_secs = Some(bad);
            let err = config.solve_options().expect_err("rejected");
            assert!(err.to_string().contains("time_limit_secs"), "{err}");
        }
    }

    #[test]
    fn overrides_replace_file_values() {
        let mut config = Config::default();
        config.apply_overrides(ConfigOverrides {
            customers_path: Some("customers.csv".to_string()),
            weekly_budget: Some(1_234.0),
            ..ConfigOverrides::default()
        });
        assert_eq!(
            config.resolved_customers_path(),
            Some(PathBuf::from("customers.csv"))
        );
        assert_eq!(
            config.constraint_config().expect("valid").weekly_budget,
            1_234.0
        );
    }

    #[test]
    fn load_and_write_template() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("nested/config.toml");
        Config::write_template(&path).expect("writes");
        let loaded = Config::load(Some(&path)).expect("loads");
        assert_eq!(loaded.report.top_customers, 10);

        let missing = Config::load(Some(&dir.path().join("absent.toml"))).expect("defaults");
        assert_eq!(missing.solver.max_sessions, 4);
    }
}
