//! Table/model builder
//!
//! Builds the language neutral description of the two modules generated per
//! table: the row module (validation schema and SQL fragments) and the CRUD
//! module (bulk operations and index accessors).

use std::collections::{BTreeSet, HashSet};

use tracing::{debug, trace};

use crate::codegen::types::{accessor_fragment, member, ModuleRef, TypeDescriptor, TypeMapper};
use crate::config::resolve::ResolvedTableConfig;
use crate::error::NoormError;
use crate::report::{Reporter, Warning};
use crate::schema::{Index, Table};

/// Everything generated for one table
#[derive(Debug, Clone)]
pub struct TableModule {
    pub schema_name: String,
    pub table_name: String,
    pub row: RowModule,
    pub crud: CrudModule,
}

/// `table.ts`: the row schema and SQL fragments
#[derive(Debug, Clone)]
pub struct RowModule {
    pub imports: Vec<ModuleRef>,
    pub fields: Vec<ColumnBinding>,
    pub primary_key: String,
}

/// `model.ts`: bulk CRUD and index accessors
#[derive(Debug, Clone)]
pub struct CrudModule {
    pub imports: Vec<ModuleRef>,
    pub primary_key: ColumnBinding,
    /// Declared scalar type of the key, accepted by `find`/`findMany`
    pub find_type: String,
    pub create_columns: Vec<ColumnBinding>,
    pub update_columns: Vec<ColumnBinding>,
    pub accessors: Vec<IndexAccessor>,
}

impl CrudModule {
    pub fn has_updates(&self) -> bool {
        !self.update_columns.is_empty()
    }
}

/// A column together with its mapped type
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnBinding {
    pub name: String,
    pub descriptor: TypeDescriptor,
}

impl ColumnBinding {
    /// Serializer expression for this column read off `receiver`
    pub fn serialize(&self, receiver: &str) -> String {
        self.descriptor.serialize(&member(receiver, &self.name))
    }

    /// Element type of an array of this column's values
    pub fn list_type(&self) -> String {
        let target = &self.descriptor.target_type;
        if target.contains(' ') {
            format!("({target})[]")
        } else {
            format!("{target}[]")
        }
    }
}

/// Lookup functions derived from one index
#[derive(Debug, Clone)]
pub struct IndexAccessor {
    pub index_name: String,
    /// Pascal case column names joined with `And`
    pub name: String,
    pub columns: Vec<ColumnBinding>,
    pub unique: bool,
    /// Emit `getManyBy<Name>Map`, only for single foreign key columns
    pub grouping_map: bool,
}

impl IndexAccessor {
    pub fn is_single(&self) -> bool {
        self.columns.len() == 1
    }
}

/// Build the modules of one table
pub fn build_table(
    table: &Table,
    config: &ResolvedTableConfig,
    mapper: &TypeMapper,
    reporter: &dyn Reporter,
) -> Result<TableModule, NoormError> {
    debug!(schema = ?table.schema_name, table = ?table.name, "Building table");

    let primary_key = table.primary_key()?;

    let mut fields = Vec::new();
    for column in &table.columns {
        if config.is_ignored(&column.name) {
            trace!(column = ?column.name, "Skipping ignored column");
            continue;
        }

        let descriptor = mapper.map_type(table, column)?;
        if descriptor.untyped {
            reporter.warn(Warning::UntypedColumn {
                schema: table.schema_name.clone(),
                table: table.name.clone(),
                column: column.name.clone(),
                type_name: column.type_name.full_name(),
            });
        }

        fields.push(ColumnBinding {
            name: column.name.clone(),
            descriptor,
        });
    }

    let key = fields
        .iter()
        .find(|field| field.name == primary_key.name)
        .cloned()
        .ok_or_else(|| NoormError::IgnoredPrimaryKey {
            schema: table.schema_name.clone(),
            table: table.name.clone(),
            column: primary_key.name.clone(),
        })?;

    let create_columns: Vec<ColumnBinding> = fields
        .iter()
        .filter(|field| {
            if field.name == key.name {
                !primary_key.has_default
            } else {
                !config.is_readonly(&field.name)
            }
        })
        .cloned()
        .collect();

    let update_columns: Vec<ColumnBinding> = fields
        .iter()
        .filter(|field| field.name != key.name && !config.is_readonly(&field.name))
        .cloned()
        .collect();

    let accessors = build_accessors(table, config, &fields, reporter)?;

    let row_imports: BTreeSet<ModuleRef> = fields
        .iter()
        .filter_map(|field| field.descriptor.module.clone())
        .collect();

    let mut crud_imports: BTreeSet<ModuleRef> = create_columns
        .iter()
        .chain(update_columns.iter())
        .chain(accessors.iter().flat_map(|accessor| accessor.columns.iter()))
        .chain(std::iter::once(&key))
        .flat_map(|binding| binding.descriptor.target_modules())
        .collect();
    if let Some(module) = &key.descriptor.module {
        crud_imports.insert(module.clone());
    }

    debug!(
        table = ?table.name,
        fields = fields.len(),
        creates = create_columns.len(),
        updates = update_columns.len(),
        accessors = accessors.len(),
        "Table built"
    );

    Ok(TableModule {
        schema_name: table.schema_name.clone(),
        table_name: table.name.clone(),
        row: RowModule {
            imports: row_imports.into_iter().collect(),
            primary_key: key.name.clone(),
            fields,
        },
        crud: CrudModule {
            imports: crud_imports.into_iter().collect(),
            find_type: key.descriptor.scalar_type.clone(),
            primary_key: key,
            create_columns,
            update_columns,
            accessors,
        },
    })
}

fn build_accessors(
    table: &Table,
    config: &ResolvedTableConfig,
    fields: &[ColumnBinding],
    reporter: &dyn Reporter,
) -> Result<Vec<IndexAccessor>, NoormError> {
    // unique indices claim accessor names first
    let mut indices: Vec<&Index> = table.indices.iter().collect();
    indices.sort_by_key(|index| !index.is_unique);

    let mut seen = HashSet::new();
    let mut accessors = Vec::new();

    for index in indices {
        if !index.is_eligible() {
            trace!(index = ?index.name, "Skipping primary, functional or partial index");
            continue;
        }

        let Some(columns) = index_columns(table, config, fields, index)? else {
            debug!(index = ?index.name, "Index covers an ignored column, skipping");
            continue;
        };

        let name = columns
            .iter()
            .map(|column| accessor_fragment(&column.name))
            .collect::<Vec<_>>()
            .join("And");

        if !seen.insert(name.clone()) {
            reporter.warn(Warning::DuplicateIndexAccessor {
                schema: table.schema_name.clone(),
                table: table.name.clone(),
                index: index.name.clone(),
                accessor: name,
            });
            continue;
        }

        let grouping_map = columns.len() == 1 && columns[0].descriptor.reference.is_some();

        accessors.push(IndexAccessor {
            index_name: index.name.clone(),
            name,
            columns,
            unique: index.is_unique,
            grouping_map,
        });
    }

    Ok(accessors)
}

/// Bindings of an index's columns, `None` when one of them is ignored
fn index_columns(
    table: &Table,
    config: &ResolvedTableConfig,
    fields: &[ColumnBinding],
    index: &Index,
) -> Result<Option<Vec<ColumnBinding>>, NoormError> {
    let mut columns = Vec::with_capacity(index.columns.len());

    for index_column in &index.columns {
        let name = index_column.name.as_deref().unwrap_or(&index_column.definition);

        if table.column(name).is_none() {
            return Err(NoormError::MissingIndexColumn {
                schema: table.schema_name.clone(),
                table: table.name.clone(),
                index: index.name.clone(),
                column: name.to_string(),
            });
        }

        if config.is_ignored(name) {
            return Ok(None);
        }

        match fields.iter().find(|field| field.name == name) {
            Some(field) => columns.push(field.clone()),
            None => return Ok(None),
        }
    }

    Ok(Some(columns))
}
