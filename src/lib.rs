pub mod config;
pub mod data;
pub mod eligibility;
pub mod error;
pub mod model;
pub mod optimizer;
pub mod output;
pub mod server;
