//! Config resolution
//!
//! Validates the user's override tree against the live schema. Entries that
//! name missing schemas, tables or columns are dropped with a warning; every
//! live schema and table ends up with a resolved entry so lookups during
//! generation are total.

use std::collections::{BTreeMap, BTreeSet};

use tracing::{debug, trace};

use super::{DatabaseConfig, SchemaConfig, TableConfig};
use crate::error::NoormError;
use crate::report::{Reporter, Warning};
use crate::schema::{Schema, SchemaMetadata, Table};

/// Audit columns that default to readonly
pub const TIME_COLUMNS: [&str; 2] = ["created_at", "updated_at"];

/// Either excluded from generation or carrying a config
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Ignorable<T> {
    Ignored,
    Included(T),
}

impl<T> Ignorable<T> {
    pub fn included(&self) -> Option<&T> {
        match self {
            Self::Ignored => None,
            Self::Included(value) => Some(value),
        }
    }

    pub fn is_ignored(&self) -> bool {
        matches!(self, Self::Ignored)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResolvedConfig {
    pub schemas: BTreeMap<String, Ignorable<ResolvedSchemaConfig>>,
}

impl ResolvedConfig {
    pub fn schema(&self, name: &str) -> Option<&Ignorable<ResolvedSchemaConfig>> {
        self.schemas.get(name)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResolvedSchemaConfig {
    pub tables: BTreeMap<String, Ignorable<ResolvedTableConfig>>,
}

impl ResolvedSchemaConfig {
    pub fn table(&self, name: &str) -> Option<&Ignorable<ResolvedTableConfig>> {
        self.tables.get(name)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResolvedTableConfig {
    pub ignored_columns: BTreeSet<String>,
    pub readonly_columns: BTreeSet<String>,
}

impl ResolvedTableConfig {
    pub fn is_ignored(&self, column: &str) -> bool {
        self.ignored_columns.contains(column)
    }

    pub fn is_readonly(&self, column: &str) -> bool {
        self.readonly_columns.contains(column)
    }
}

/// Resolve the user config against the extracted schema
pub fn resolve(
    config: Option<&DatabaseConfig>,
    metadata: &SchemaMetadata,
    reporter: &dyn Reporter,
) -> Result<ResolvedConfig, NoormError> {
    let empty = DatabaseConfig::default();
    let config = config.unwrap_or(&empty);

    for name in config.schema_configs.keys() {
        if metadata.schema(name).is_none() {
            reporter.warn(Warning::UnknownSchema {
                schema: name.clone(),
            });
        }
    }

    let mut schemas = BTreeMap::new();
    for schema in &metadata.schemas {
        let resolved = match config.schema_configs.get(&schema.name) {
            Some(schema_config) => resolve_schema(schema_config, schema, reporter)?,
            None => resolve_schema(&SchemaConfig::default(), schema, reporter)?,
        };
        schemas.insert(schema.name.clone(), resolved);
    }

    debug!(schemas = schemas.len(), "Configuration resolved");
    Ok(ResolvedConfig { schemas })
}

fn resolve_schema(
    config: &SchemaConfig,
    schema: &Schema,
    reporter: &dyn Reporter,
) -> Result<Ignorable<ResolvedSchemaConfig>, NoormError> {
    if config.ignore {
        debug!(schema = ?schema.name, "Schema is ignored");
        return Ok(Ignorable::Ignored);
    }

    for name in config.table_configs.keys() {
        if schema.table(name).is_none() {
            reporter.warn(Warning::UnknownTable {
                schema: schema.name.clone(),
                table: name.clone(),
            });
        }
    }

    let default_table = TableConfig::default();
    let mut tables = BTreeMap::new();
    for table in &schema.tables {
        let table_config = config.table_configs.get(&table.name).unwrap_or(&default_table);
        tables.insert(table.name.clone(), resolve_table(table_config, table, reporter)?);
    }

    Ok(Ignorable::Included(ResolvedSchemaConfig { tables }))
}

fn resolve_table(
    config: &TableConfig,
    table: &Table,
    reporter: &dyn Reporter,
) -> Result<Ignorable<ResolvedTableConfig>, NoormError> {
    if config.ignore {
        debug!(schema = ?table.schema_name, table = ?table.name, "Table is ignored");
        return Ok(Ignorable::Ignored);
    }

    let mut resolved = ResolvedTableConfig::default();

    for (name, column_config) in &config.column_configs {
        let Some(column) = table.column(name) else {
            reporter.warn(Warning::UnknownColumn {
                schema: table.schema_name.clone(),
                table: table.name.clone(),
                column: name.clone(),
            });
            continue;
        };

        let ignored = column_config.is_ignored();
        let readonly = column_config.is_readonly();

        if (ignored || readonly) && !column.is_omittable() {
            return Err(NoormError::InvalidIgnoredColumn {
                schema: table.schema_name.clone(),
                table: table.name.clone(),
                column: column.name.clone(),
            });
        }

        if ignored && column.is_primary_key {
            return Err(NoormError::IgnoredPrimaryKey {
                schema: table.schema_name.clone(),
                table: table.name.clone(),
                column: column.name.clone(),
            });
        }

        if ignored {
            resolved.ignored_columns.insert(column.name.clone());
        } else if readonly {
            resolved.readonly_columns.insert(column.name.clone());
        }
    }

    if config.readonly_time_columns.unwrap_or(true) {
        for name in TIME_COLUMNS {
            let Some(column) = table.column(name) else {
                continue;
            };

            // explicit column config wins over the convention
            if config.column_configs.contains_key(name) {
                continue;
            }

            if column.is_omittable() {
                trace!(table = ?table.name, column = ?name, "Time column defaults to readonly");
                resolved.readonly_columns.insert(column.name.clone());
            } else {
                reporter.warn(Warning::ReadonlyTimeColumnSkipped {
                    schema: table.schema_name.clone(),
                    table: table.name.clone(),
                    column: column.name.clone(),
                });
            }
        }
    }

    Ok(Ignorable::Included(resolved))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ColumnConfig, NoormConfig};
    use crate::report::MemoryReporter;
    use crate::schema::Column;

    fn penguins() -> Table {
        Table::new("public", "penguins")
            .with_column(Column::base("id", "int4").primary_key().with_default())
            .with_column(Column::base("name", "text"))
            .with_column(Column::base("nickname", "text").nullable())
            .with_column(Column::base("created_at", "timestamptz").with_default())
            .with_column(Column::base("updated_at", "timestamptz").with_default())
    }

    fn metadata(tables: Vec<Table>) -> SchemaMetadata {
        let mut schema = Schema::new("public");
        schema.tables = tables;
        SchemaMetadata {
            schemas: vec![schema],
        }
    }

    fn database_config(toml: &str) -> DatabaseConfig {
        NoormConfig::from_toml_str(toml)
            .unwrap()
            .database_schema_config
            .unwrap()
    }

    fn table_config<'a>(resolved: &'a ResolvedConfig, table: &str) -> &'a ResolvedTableConfig {
        resolved
            .schema("public")
            .and_then(Ignorable::included)
            .and_then(|schema| schema.table(table))
            .and_then(Ignorable::included)
            .unwrap()
    }

    #[test]
    fn test_defaults_without_user_config() {
        let reporter = MemoryReporter::new();
        let resolved = resolve(None, &metadata(vec![penguins()]), &reporter).unwrap();

        let table = table_config(&resolved, "penguins");
        assert!(table.ignored_columns.is_empty());
        assert!(table.is_readonly("created_at"));
        assert!(table.is_readonly("updated_at"));
        assert!(!table.is_readonly("name"));
        assert!(reporter.warnings().is_empty());
    }

    #[test]
    fn test_unknown_entities_are_dropped_with_warnings() {
        let config = database_config(
            r#"
            [database_schema_config.schema_configs.audit.table_configs.logs]
            ignore = true

            [database_schema_config.schema_configs.public.table_configs.walruses]
            ignore = true

            [database_schema_config.schema_configs.public.table_configs.penguins.column_configs]
            beak_length = { ignore = true }
            "#,
        );

        let reporter = MemoryReporter::new();
        let resolved = resolve(Some(&config), &metadata(vec![penguins()]), &reporter).unwrap();

        assert!(resolved.schema("audit").is_none());
        let public = resolved.schema("public").and_then(Ignorable::included).unwrap();
        assert!(public.table("walruses").is_none());
        assert!(table_config(&resolved, "penguins").ignored_columns.is_empty());

        assert_eq!(
            reporter.warnings(),
            vec![
                Warning::UnknownSchema {
                    schema: "audit".to_string()
                },
                Warning::UnknownTable {
                    schema: "public".to_string(),
                    table: "walruses".to_string()
                },
                Warning::UnknownColumn {
                    schema: "public".to_string(),
                    table: "penguins".to_string(),
                    column: "beak_length".to_string()
                },
            ]
        );
    }

    #[test]
    fn test_ignore_short_circuits() {
        let config = database_config(
            r#"
            [database_schema_config.schema_configs.public.table_configs.penguins]
            ignore = true

            [database_schema_config.schema_configs.public.table_configs.penguins.column_configs]
            name = { ignore = true }
            "#,
        );

        let reporter = MemoryReporter::new();
        // `name` is NOT NULL without default, but the table is ignored first
        let resolved = resolve(Some(&config), &metadata(vec![penguins()]), &reporter).unwrap();

        let public = resolved.schema("public").and_then(Ignorable::included).unwrap();
        assert!(public.table("penguins").unwrap().is_ignored());
    }

    #[test]
    fn test_ignored_schema() {
        let config = database_config(
            r#"
            [database_schema_config.schema_configs.public]
            ignore = true
            "#,
        );

        let resolved = resolve(Some(&config), &metadata(vec![penguins()]), &MemoryReporter::new())
            .unwrap();
        assert_eq!(resolved.schema("public"), Some(&Ignorable::Ignored));
    }

    #[test]
    fn test_ignore_required_column_fails() {
        let config = database_config(
            r#"
            [database_schema_config.schema_configs.public.table_configs.penguins.column_configs]
            name = { ignore = true }
            "#,
        );

        let err = resolve(Some(&config), &metadata(vec![penguins()]), &MemoryReporter::new())
            .unwrap_err();
        assert!(matches!(
            err,
            NoormError::InvalidIgnoredColumn { ref column, .. } if column == "name"
        ));
        assert!(err.to_string().contains("public.penguins.name"));
    }

    #[test]
    fn test_readonly_required_column_fails() {
        let config = database_config(
            r#"
            [database_schema_config.schema_configs.public.table_configs.penguins.column_configs]
            name = { readonly = true }
            "#,
        );

        let result = resolve(Some(&config), &metadata(vec![penguins()]), &MemoryReporter::new());
        assert!(matches!(result, Err(NoormError::InvalidIgnoredColumn { .. })));
    }

    #[test]
    fn test_ignore_primary_key_fails() {
        let config = database_config(
            r#"
            [database_schema_config.schema_configs.public.table_configs.penguins.column_configs]
            id = { ignore = true }
            "#,
        );

        let result = resolve(Some(&config), &metadata(vec![penguins()]), &MemoryReporter::new());
        assert!(matches!(result, Err(NoormError::IgnoredPrimaryKey { .. })));
    }

    #[test]
    fn test_ignore_and_readonly_nullable_columns() {
        let config = database_config(
            r#"
            [database_schema_config.schema_configs.public.table_configs.penguins.column_configs]
            nickname = { ignore = true }
            "#,
        );

        let resolved =
            resolve(Some(&config), &metadata(vec![penguins()]), &MemoryReporter::new()).unwrap();
        let table = table_config(&resolved, "penguins");
        assert!(table.is_ignored("nickname"));
        assert!(!table.is_readonly("nickname"));
    }

    #[test]
    fn test_readonly_time_columns_opt_out() {
        let config = database_config(
            r#"
            [database_schema_config.schema_configs.public.table_configs.penguins]
            readonly_time_columns = false
            "#,
        );

        let resolved =
            resolve(Some(&config), &metadata(vec![penguins()]), &MemoryReporter::new()).unwrap();
        assert!(table_config(&resolved, "penguins").readonly_columns.is_empty());
    }

    #[test]
    fn test_explicit_column_config_beats_time_convention() {
        let mut config = DatabaseConfig::default();
        let mut table = TableConfig::default();
        table.column_configs.insert(
            "updated_at".to_string(),
            ColumnConfig {
                ignore: None,
                readonly: Some(false),
            },
        );
        let mut schema = SchemaConfig::default();
        schema.table_configs.insert("penguins".to_string(), table);
        config.schema_configs.insert("public".to_string(), schema);

        let resolved =
            resolve(Some(&config), &metadata(vec![penguins()]), &MemoryReporter::new()).unwrap();
        let table = table_config(&resolved, "penguins");
        assert!(table.is_readonly("created_at"));
        assert!(!table.is_readonly("updated_at"));
    }

    #[test]
    fn test_required_time_column_is_not_defaulted_to_readonly() {
        let table = Table::new("public", "events")
            .with_column(Column::base("id", "int4").primary_key().with_default())
            .with_column(Column::base("created_at", "timestamptz"));

        let reporter = MemoryReporter::new();
        let resolved = resolve(None, &metadata(vec![table]), &reporter).unwrap();

        assert!(!table_config(&resolved, "events").is_readonly("created_at"));
        assert!(matches!(
            reporter.warnings()[0],
            Warning::ReadonlyTimeColumnSkipped { .. }
        ));
    }
}
