//! Database introspection
//!
//! This module provides functionality for extracting schema information
//! from databases. Each supported database has its own feature-gated submodule.

use crate::error::NoormError;
use crate::schema::SchemaMetadata;

/// Filters to apply during introspection
#[derive(Debug, Default, Clone)]
pub struct SchemaFilter {
    /// Only include these schemas (if Some)
    pub include: Option<Vec<String>>,
    /// Exclude these schemas
    pub exclude: Option<Vec<String>>,
}

impl SchemaFilter {
    /// Check if a schema should be extracted
    ///
    /// System schemas are never extracted.
    pub fn should_include(&self, schema_name: &str) -> bool {
        if is_system_schema(schema_name) {
            return false;
        }

        if let Some(include) = &self.include {
            if !include.iter().any(|s| s == schema_name) {
                return false;
            }
        }

        if let Some(exclude) = &self.exclude {
            if exclude.iter().any(|s| s == schema_name) {
                return false;
            }
        }

        true
    }
}

fn is_system_schema(schema_name: &str) -> bool {
    schema_name.starts_with("pg_") || schema_name == "information_schema"
}

/// Trait for database introspection implementations
pub trait Introspector {
    /// Extract every schema accepted by `filter`
    fn introspect(&mut self, filter: &SchemaFilter) -> Result<SchemaMetadata, NoormError>;
}

// Feature-gated database implementations
#[cfg(feature = "postgres")]
mod postgres;

#[cfg(feature = "postgres")]
pub use postgres::PostgresIntrospector;
