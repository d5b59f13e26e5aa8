//! Code generation
//!
//! This module turns the introspected schema and the resolved config into
//! generated files. Building (what to generate) is kept apart from
//! rendering (how it is spelled) behind the [`CodeGenerator`] trait.

use std::path::PathBuf;

use tracing::{debug, info};

use crate::config::resolve::{Ignorable, ResolvedConfig};
use crate::error::NoormError;
use crate::report::Reporter;
use crate::schema::SchemaMetadata;

pub mod catalog;
pub mod table;
pub mod types;
pub mod typescript;

pub use catalog::{build_catalogs, CatalogKind, CatalogModule};
pub use table::{build_table, TableModule};
pub use types::{classify, TypeDescriptor, TypeMapper};
pub use typescript::TypeScriptGenerator;

/// A file to write, relative to the output directory
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneratedFile {
    pub path: PathBuf,
    pub contents: String,
}

impl GeneratedFile {
    pub fn new(path: impl Into<PathBuf>, contents: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            contents: contents.into(),
        }
    }
}

/// The barrel of one generated schema
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchemaIndex {
    pub schema_name: String,
    pub catalogs: Vec<CatalogKind>,
    pub tables: Vec<String>,
}

/// Trait for language-specific code generators
pub trait CodeGenerator {
    /// Modules shared by every schema
    fn render_shared(&self) -> Result<Vec<GeneratedFile>, NoormError>;

    fn render_catalog(&self, catalog: &CatalogModule) -> Result<Vec<GeneratedFile>, NoormError>;

    fn render_table(&self, module: &TableModule) -> Result<Vec<GeneratedFile>, NoormError>;

    fn render_schema_index(&self, index: &SchemaIndex) -> Result<Vec<GeneratedFile>, NoormError>;
}

/// Generate every file for a run
///
/// Nothing is written here. Files come back sorted by path so repeated runs
/// over the same input produce the same list.
pub fn generate(
    metadata: &SchemaMetadata,
    config: &ResolvedConfig,
    generator: &dyn CodeGenerator,
    reporter: &dyn Reporter,
) -> Result<Vec<GeneratedFile>, NoormError> {
    let included_schemas: Vec<_> = metadata
        .schemas
        .iter()
        .filter_map(|schema| match config.schema(&schema.name) {
            Some(Ignorable::Included(schema_config)) => Some((schema, schema_config)),
            _ => {
                debug!(schema = ?schema.name, "Skipping ignored schema");
                None
            }
        })
        .collect();

    let included_tables: Vec<(String, String)> = included_schemas
        .iter()
        .flat_map(|(schema, schema_config)| {
            schema
                .tables
                .iter()
                .filter(|table| {
                    matches!(schema_config.table(&table.name), Some(Ignorable::Included(_)))
                })
                .map(|table| (schema.name.clone(), table.name.clone()))
        })
        .collect();

    // foreign keys must not point at columns left out of a row module
    let mut ignored_columns = Vec::new();
    for (schema, schema_config) in &included_schemas {
        for table in &schema.tables {
            if let Some(Ignorable::Included(table_config)) = schema_config.table(&table.name) {
                for column in &table_config.ignored_columns {
                    ignored_columns.push((schema.name.clone(), table.name.clone(), column.clone()));
                }
            }
        }
    }

    let mapper = TypeMapper::new(metadata)
        .with_generated(
            included_schemas
                .iter()
                .map(|(schema, _)| schema.name.clone()),
            included_tables,
        )
        .with_ignored_columns(ignored_columns);

    let mut files = generator.render_shared()?;
    let mut table_count = 0;

    for (schema, schema_config) in &included_schemas {
        let catalogs = build_catalogs(schema, reporter);
        for catalog in &catalogs {
            files.extend(generator.render_catalog(catalog)?);
        }

        let mut tables = Vec::new();
        for table in &schema.tables {
            let Some(Ignorable::Included(table_config)) = schema_config.table(&table.name) else {
                debug!(schema = ?schema.name, table = ?table.name, "Skipping ignored table");
                continue;
            };

            let module = build_table(table, table_config, &mapper, reporter)?;
            files.extend(generator.render_table(&module)?);
            tables.push(table.name.clone());
        }

        table_count += tables.len();
        files.extend(generator.render_schema_index(&SchemaIndex {
            schema_name: schema.name.clone(),
            catalogs: catalogs.iter().map(|catalog| catalog.kind).collect(),
            tables,
        })?);
    }

    files.sort_by(|a, b| a.path.cmp(&b.path));

    info!(
        schemas = included_schemas.len(),
        tables = table_count,
        files = files.len(),
        "Code generation complete"
    );

    Ok(files)
}
