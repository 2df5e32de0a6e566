use thiserror::Error;

/// Failures that abort an optimization run.
///
/// Recoverable conditions (empty plans, ROI with zero spend, a wall-clock
/// limit without an incumbent) are not errors; they are reported through
/// [`crate::optimizer::PlanStatus`].
#[derive(Debug, Error)]
pub enum OptimizeError {
    #[error("invalid input in {table} table: {message}")]
    InvalidInput {
        table: &'static str,
        message: String,
    },

    #[error("invalid constraint parameter `{key}`: {message}")]
    InvalidParameter { key: String, message: String },

    #[error("no solver session available ({in_use}/{capacity} in use)")]
    SessionUnavailable { in_use: usize, capacity: usize },

    #[error("model is infeasible{}", format_suspects(.suspects))]
    Infeasible { suspects: Vec<String> },

    #[error("model is unbounded")]
    Unbounded,

    #[error("solver failed during {stage}: {message}")]
    Solver { stage: &'static str, message: String },
}

impl OptimizeError {
    pub fn input(table: &'static str, message: impl Into<String>) -> Self {
        Self::InvalidInput {
            table,
            message: message.into(),
        }
    }

    pub fn parameter(key: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidParameter {
            key: key.into(),
            message: message.into(),
        }
    }

    /// Whether the request itself was malformed, as opposed to well-formed
    /// but unsolvable.
    pub fn is_caller_error(&self) -> bool {
        matches!(
            self,
            Self::InvalidInput { .. } | Self::InvalidParameter { .. }
        )
    }
}

fn format_suspects(suspects: &[String]) -> String {
    if suspects.is_empty() {
        String::new()
    } else {
        format!(" (likely conflict: {})", suspects.join("; "))
    }
}
