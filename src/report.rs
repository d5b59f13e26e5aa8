//! Diagnostics reporting
//!
//! Library components never terminate the process. Soft failures are handed
//! to a [`Reporter`]; fatal ones are returned as
//! [`NoormError`](crate::error::NoormError) and turned into an exit code by
//! the binary.

use std::cell::RefCell;
use std::error::Error;
use std::fmt;

use tracing::{error, warn};

/// Non-fatal problems found while resolving config or generating code
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Warning {
    UnknownSchema {
        schema: String,
    },
    UnknownTable {
        schema: String,
        table: String,
    },
    UnknownColumn {
        schema: String,
        table: String,
        column: String,
    },
    /// A `created_at`/`updated_at` column could not default to readonly
    ReadonlyTimeColumnSkipped {
        schema: String,
        table: String,
        column: String,
    },
    /// No safe mapping exists, the column is typed as `any`
    UntypedColumn {
        schema: String,
        table: String,
        column: String,
        type_name: String,
    },
    /// The inner type of a domain has no safe mapping
    UntypedDomain {
        schema: String,
        domain: String,
        type_name: String,
    },
    DuplicateIndexAccessor {
        schema: String,
        table: String,
        index: String,
        accessor: String,
    },
}

impl fmt::Display for Warning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnknownSchema { schema } => write!(
                f,
                "Provided database_schema_config schema '{schema}' does not exist in the database"
            ),
            Self::UnknownTable { schema, table } => write!(
                f,
                "Provided database_schema_config table '{table}' does not exist in the schema '{schema}'"
            ),
            Self::UnknownColumn {
                schema,
                table,
                column,
            } => write!(
                f,
                "Provided database_schema_config column '{column}' does not exist in the table '{schema}.{table}'"
            ),
            Self::ReadonlyTimeColumnSkipped {
                schema,
                table,
                column,
            } => write!(
                f,
                "Column '{schema}.{table}.{column}' is not nullable and has no default, it will not be readonly"
            ),
            Self::UntypedColumn {
                schema,
                table,
                column,
                type_name,
            } => write!(
                f,
                "Could not map column '{schema}.{table}.{column}' of type '{type_name}', defaulting to 'any'"
            ),
            Self::UntypedDomain {
                schema,
                domain,
                type_name,
            } => write!(
                f,
                "Could not map domain '{schema}.{domain}' over type '{type_name}', defaulting to 'any'"
            ),
            Self::DuplicateIndexAccessor {
                schema,
                table,
                index,
                accessor,
            } => write!(
                f,
                "Index '{index}' on '{schema}.{table}' would duplicate accessor '{accessor}', skipping"
            ),
        }
    }
}

/// Sink for diagnostics raised during a run
pub trait Reporter {
    fn warn(&self, warning: Warning);

    /// A fatal error, reported once by the driver before it exits
    fn error(&self, error: &dyn Error);
}

/// Forwards diagnostics to `tracing`
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingReporter;

impl Reporter for TracingReporter {
    fn warn(&self, warning: Warning) {
        warn!("{}", warning);
    }

    fn error(&self, err: &dyn Error) {
        error!("{}", error_chain(err));
    }
}

/// Keeps diagnostics in memory
#[derive(Debug, Default)]
pub struct MemoryReporter {
    warnings: RefCell<Vec<Warning>>,
    errors: RefCell<Vec<String>>,
}

impl MemoryReporter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn warnings(&self) -> Vec<Warning> {
        self.warnings.borrow().clone()
    }

    pub fn errors(&self) -> Vec<String> {
        self.errors.borrow().clone()
    }
}

impl Reporter for MemoryReporter {
    fn warn(&self, warning: Warning) {
        self.warnings.borrow_mut().push(warning);
    }

    fn error(&self, err: &dyn Error) {
        self.errors.borrow_mut().push(error_chain(err));
    }
}

/// `outer: cause: root cause`
fn error_chain(err: &dyn Error) -> String {
    let mut message = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        message.push_str(": ");
        message.push_str(&cause.to_string());
        source = cause.source();
    }
    message
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::NoormError;

    #[test]
    fn test_memory_reporter_records_in_order() {
        let reporter = MemoryReporter::new();
        reporter.warn(Warning::UnknownSchema {
            schema: "audit".to_string(),
        });
        reporter.warn(Warning::UnknownTable {
            schema: "public".to_string(),
            table: "walruses".to_string(),
        });

        let warnings = reporter.warnings();
        assert_eq!(warnings.len(), 2);
        assert!(matches!(warnings[0], Warning::UnknownSchema { .. }));
        assert!(warnings[1].to_string().contains("walruses"));
    }

    #[test]
    fn test_memory_reporter_errors_include_causes() {
        let reporter = MemoryReporter::new();
        reporter.error(&NoormError::Config("bad".to_string()));

        let wrapped = anyhow::Error::new(NoormError::Config("bad".to_string()))
            .context("Failed to load configuration");
        reporter.error(wrapped.as_ref());

        assert_eq!(
            reporter.errors(),
            vec![
                "Configuration error: bad".to_string(),
                "Failed to load configuration: Configuration error: bad".to_string(),
            ]
        );
    }
}
