//! Domain logic for crewdesk: configuration, request context and access
//! control, KPI evaluation, and coach-report statistics.
//!
//! Nothing in this crate performs database or network I/O.

pub mod access;
pub mod app_config;
pub mod catalog;
pub mod config;
pub mod dates;
pub mod kpi;
pub mod pagination;
pub mod permissions;
pub mod statistics;

use thiserror::Error;

pub use access::{
    authorize, coach_report_scope, AccessError, Action, Capabilities, CoachReportScope, Identity,
    RequestContext, ResourceOwner, UserType,
};
pub use app_config::{AppConfig, Environment};
pub use catalog::{load_catalog, SeedCatalog};
pub use config::{load_app_config, load_app_config_from_env};
pub use dates::DateRange;
pub use kpi::{
    evaluate_report, expected_value, parse_metric, Expectation, FieldOutcome, GrowthKind,
    KpiDefinition, KpiError, KpiModel, ReportEvaluation, ReportInput, ReportScore, UnscoredReason,
};
pub use pagination::Pagination;
pub use statistics::{
    parse_snapshot, CategoryCount, CategoryTally, Statistics, StatisticsSnapshot,
};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("invalid value for {var}: {reason}")]
    InvalidEnvVar { var: String, reason: String },

    #[error("failed to read seed catalog at {path}: {source}")]
    CatalogIo {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse seed catalog: {0}")]
    CatalogParse(#[from] serde_yaml::Error),

    #[error("seed catalog validation failed: {0}")]
    Validation(String),
}

/// A rejected input value, reported against the offending field.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{field}: {message}")]
pub struct ValidationError {
    pub field: String,
    pub message: String,
}

impl ValidationError {
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}
