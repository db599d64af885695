// SPDX-License-Identifier: AGPL-3.0-only
// Copyright (C) 2024 Jonathan Lee
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License version 3
// as published by the Free Software Foundation.
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.
// See the GNU Affero General Public License for more details.
// You should have received a copy of the GNU Affero General Public License
// along with this program. If not, see https://www.gnu.org/licenses/.

use crate::validation::ValidationReport;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum VizError {
    #[error("Request '{request_id}' not found or expired")]
    RequestNotFound { request_id: String },
    #[error("Chart type '{name}' is not in the catalog")]
    InvalidChartType { name: String },
    #[error("Chart configuration invalid: {0}")]
    Validation(#[from] ValidationReport),
    #[error("Chart '{chart_type}' needs {required} usable columns, table has {available}")]
    InsufficientColumns {
        chart_type: String,
        required: usize,
        available: usize,
    },
    #[error("Data provider failed for table '{table_reference}': {source}")]
    Provider {
        table_reference: String,
        #[source]
        source: ProviderError,
    },
    #[error("Render sink failed for request '{request_id}': {source}")]
    Render {
        request_id: String,
        #[source]
        source: RenderError,
    },
    #[error("Internal computation fault in request '{request_id}': {reason}")]
    Computation { request_id: String, reason: String },
    #[error("Operation '{operation}' not allowed for request '{request_id}' in state {from}")]
    InvalidTransition {
        request_id: String,
        from: String,
        operation: String,
    },
    #[error("Unknown role '{name}'")]
    UnknownRole { name: String },
    #[error("Unknown insight kind '{name}'")]
    UnknownInsightKind { name: String },
    #[error("Registry is at capacity ({limit} active requests)")]
    Capacity { limit: usize },
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
}

#[derive(Error, Debug)]
pub enum ProviderError {
    #[error("Table '{0}' not found")]
    TableNotFound(String),
    #[error("Column '{column}' not found in table '{table}'")]
    ColumnNotFound { table: String, column: String },
    #[error("Backend error: {0}")]
    Backend(String),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Polars error: {0}")]
    Polars(#[from] polars::error::PolarsError),
}

#[derive(Error, Debug)]
pub enum RenderError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to serialise chart: {0}")]
    Serialisation(#[from] serde_json::Error),
    #[error("Failed to read chart data: {0}")]
    Data(#[from] polars::error::PolarsError),
    #[error("Render rejected: {0}")]
    Rejected(String),
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read configuration file '{path}': {source}")]
    ReadFailed {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("Failed to parse YAML configuration: {source}")]
    Parse {
        #[from]
        source: serde_yaml::Error,
    },
    #[error("Configuration field {field} is out of range: {value}")]
    OutOfRange { field: String, value: String },
    #[error("Invalid keyword pattern '{pattern}': {source}")]
    InvalidPattern {
        pattern: String,
        #[source]
        source: regex::Error,
    },
    #[error("Duplicate chart type in catalog: '{name}'")]
    DuplicateChartType { name: String },
}

pub type VizResult<T> = std::result::Result<T, VizError>;
pub type ProviderResult<T> = std::result::Result<T, ProviderError>;
pub type RenderResult<T> = std::result::Result<T, RenderError>;
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

impl VizError {
    pub(crate) fn not_found(request_id: &str) -> Self {
        VizError::RequestNotFound {
            request_id: request_id.to_string(),
        }
    }

    pub(crate) fn transition(request_id: &str, from: impl ToString, operation: &str) -> Self {
        VizError::InvalidTransition {
            request_id: request_id.to_string(),
            from: from.to_string(),
            operation: operation.to_string(),
        }
    }

    /// Errors the caller can fix by issuing another call on the same request.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            VizError::Validation(_)
                | VizError::InvalidChartType { .. }
                | VizError::InsufficientColumns { .. }
                | VizError::UnknownRole { .. }
                | VizError::UnknownInsightKind { .. }
        )
    }

    pub fn category(&self) -> &'static str {
        match self {
            VizError::RequestNotFound { .. } => "Request",
            VizError::InvalidChartType { .. } | VizError::InsufficientColumns { .. } => "Chart",
            VizError::Validation(_) | VizError::UnknownRole { .. } => "Validation",
            VizError::UnknownInsightKind { .. } => "Insight",
            VizError::Provider { .. } => "Provider",
            VizError::Render { .. } => "Render",
            VizError::Computation { .. } => "Computation",
            VizError::InvalidTransition { .. } | VizError::Capacity { .. } => "Lifecycle",
            VizError::Config(_) => "Configuration",
        }
    }

    pub fn severity(&self) -> ErrorSeverity {
        match self {
            VizError::Validation(_) | VizError::InsufficientColumns { .. } => {
                ErrorSeverity::Warning
            }
            VizError::RequestNotFound { .. } => ErrorSeverity::Info,
            VizError::Computation { .. } => ErrorSeverity::Critical,
            _ => ErrorSeverity::Error,
        }
    }

    pub fn suggestions(&self) -> Vec<String> {
        match self {
            VizError::RequestNotFound { .. } => vec![
                "Start a new request with create_visualization".to_string(),
                "Requests expire after a period without calls".to_string(),
            ],
            VizError::InvalidChartType { .. } => vec![
                "Use one of: bar, line, scatter, pie, histogram, box, heatmap, area".to_string(),
            ],
            VizError::Validation(report) => report
                .issues
                .iter()
                .map(|issue| issue.message.clone())
                .collect(),
            VizError::InsufficientColumns { .. } => vec![
                "Pick a chart type with fewer required roles".to_string(),
                "Choose a table with more usable columns".to_string(),
            ],
            VizError::Provider { .. } => vec![
                "Check the table reference".to_string(),
                "Retry by creating a fresh request".to_string(),
            ],
            VizError::InvalidTransition { .. } => vec![
                "Check the request status with get_status".to_string(),
                "Call reconfigure before changing a validated request".to_string(),
            ],
            _ => vec!["Check the error message for specific guidance".to_string()],
        }
    }

    pub fn user_message(&self) -> String {
        match self {
            VizError::RequestNotFound { request_id } => format!(
                "Request '{request_id}' was not found. Please start a new visualization request."
            ),
            VizError::Validation(report) => {
                let mut message = format!(
                    "The {} chart configuration has {} problem(s):",
                    report.chart_type,
                    report.issues.len()
                );
                for issue in &report.issues {
                    message.push_str(&format!("\n  - {}", issue.message));
                }
                message
            }
            _ => self.to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ErrorSeverity {
    Info,
    Warning,
    Error,
    Critical,
}

impl ErrorSeverity {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorSeverity::Info => "INFO",
            ErrorSeverity::Warning => "WARNING",
            ErrorSeverity::Error => "ERROR",
            ErrorSeverity::Critical => "CRITICAL",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_provider_error_keeps_table_context() {
        let err = VizError::Provider {
            table_reference: "sales".to_string(),
            source: ProviderError::TableNotFound("sales".to_string()),
        };
        assert!(err.to_string().contains("'sales'"));
        assert_eq!(err.category(), "Provider");
        assert!(!err.is_recoverable());
    }

    #[test]
    fn test_severity_ordering() {
        assert!(ErrorSeverity::Critical > ErrorSeverity::Warning);
        let err = VizError::Computation {
            request_id: "req_1".to_string(),
            reason: "corrupted".to_string(),
        };
        assert_eq!(err.severity(), ErrorSeverity::Critical);
    }
}
