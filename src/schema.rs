//! Schema data structures
//!
//! These types represent database schema information and form the contract
//! between introspection (produces) and code generation (consumes).

use crate::error::NoormError;

/// Everything extracted from the database for one generation run
#[derive(Debug, Clone, Default)]
pub struct SchemaMetadata {
    pub schemas: Vec<Schema>,
}

impl SchemaMetadata {
    pub fn schema(&self, name: &str) -> Option<&Schema> {
        self.schemas.iter().find(|s| s.name == name)
    }
}

/// A database schema (namespace)
#[derive(Debug, Clone, Default)]
pub struct Schema {
    pub name: String,
    pub tables: Vec<Table>,
    pub enums: Vec<EnumType>,
    pub domains: Vec<DomainType>,
    pub ranges: Vec<RangeType>,
}

impl Schema {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn table(&self, name: &str) -> Option<&Table> {
        self.tables.iter().find(|t| t.name == name)
    }
}

/// Database table
#[derive(Debug, Clone)]
pub struct Table {
    pub name: String,
    pub schema_name: String,
    pub columns: Vec<Column>,
    pub indices: Vec<Index>,
}

impl Table {
    pub fn new(schema_name: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            schema_name: schema_name.into(),
            columns: Vec::new(),
            indices: Vec::new(),
        }
    }

    pub fn with_column(mut self, column: Column) -> Self {
        self.columns.push(column);
        self
    }

    pub fn with_index(mut self, index: Index) -> Self {
        self.indices.push(index);
        self
    }

    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|col| col.name == name)
    }

    /// The table's primary key column
    ///
    /// Only single column keys are supported.
    pub fn primary_key(&self) -> Result<&Column, NoormError> {
        let keys: Vec<&Column> = self.columns.iter().filter(|col| col.is_primary_key).collect();

        match keys.as_slice() {
            [key] => Ok(key),
            [] => Err(NoormError::MissingPrimaryKey {
                schema: self.schema_name.clone(),
                table: self.name.clone(),
            }),
            _ => Err(NoormError::CompositePrimaryKey {
                schema: self.schema_name.clone(),
                table: self.name.clone(),
                columns: keys
                    .iter()
                    .map(|col| col.name.as_str())
                    .collect::<Vec<_>>()
                    .join(", "),
            }),
        }
    }
}

/// The kind of a column's type as tagged by the extractor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TypeKind {
    Base,
    Enum,
    Domain,
    Range,
    Composite,
}

/// A schema qualified type name, e.g. `pg_catalog.int4`
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TypeName {
    pub schema: String,
    pub name: String,
}

impl TypeName {
    pub fn new(schema: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            schema: schema.into(),
            name: name.into(),
        }
    }

    /// Shorthand for a built-in type
    pub fn catalog(name: impl Into<String>) -> Self {
        Self::new(PG_CATALOG, name)
    }

    pub fn full_name(&self) -> String {
        format!("{}.{}", self.schema, self.name)
    }

    pub fn is_builtin(&self) -> bool {
        self.schema == PG_CATALOG
    }
}

pub const PG_CATALOG: &str = "pg_catalog";

/// A table column
#[derive(Debug, Clone)]
pub struct Column {
    pub name: String,
    pub type_kind: TypeKind,
    pub type_name: TypeName,
    pub is_nullable: bool,
    pub is_primary_key: bool,
    /// Column has a server-side default (DEFAULT value, serial, identity, generated)
    pub has_default: bool,
    /// Foreign keys on this column, in declaration order
    pub references: Vec<ColumnReference>,
}

impl Column {
    pub fn new(name: impl Into<String>, type_kind: TypeKind, type_name: TypeName) -> Self {
        Self {
            name: name.into(),
            type_kind,
            type_name,
            is_nullable: false,
            is_primary_key: false,
            has_default: false,
            references: Vec::new(),
        }
    }

    /// A column of a built-in base type
    pub fn base(name: impl Into<String>, type_name: &str) -> Self {
        Self::new(name, TypeKind::Base, TypeName::catalog(type_name))
    }

    pub fn nullable(mut self) -> Self {
        self.is_nullable = true;
        self
    }

    pub fn primary_key(mut self) -> Self {
        self.is_primary_key = true;
        self
    }

    pub fn with_default(mut self) -> Self {
        self.has_default = true;
        self
    }

    pub fn with_reference(mut self, reference: ColumnReference) -> Self {
        self.references.push(reference);
        self
    }

    /// The honored foreign key of this column.
    ///
    /// Postgres allows several foreign key constraints on one column; only the
    /// first declared one is used for typing.
    pub fn reference(&self) -> Option<&ColumnReference> {
        self.references.first()
    }

    /// Whether the column can be left out of an insert
    pub fn is_omittable(&self) -> bool {
        self.is_nullable || self.has_default
    }
}

/// The primary key a foreign key column points at
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnReference {
    pub schema_name: String,
    pub table_name: String,
    pub column_name: String,
}

impl ColumnReference {
    pub fn new(
        schema_name: impl Into<String>,
        table_name: impl Into<String>,
        column_name: impl Into<String>,
    ) -> Self {
        Self {
            schema_name: schema_name.into(),
            table_name: table_name.into(),
            column_name: column_name.into(),
        }
    }
}

/// A table index
#[derive(Debug, Clone)]
pub struct Index {
    pub name: String,
    pub columns: Vec<IndexColumn>,
    pub is_unique: bool,
    pub is_primary: bool,
}

impl Index {
    /// A plain index over the named columns
    pub fn on(name: impl Into<String>, columns: &[&str]) -> Self {
        Self {
            name: name.into(),
            columns: columns.iter().map(|c| IndexColumn::named(*c)).collect(),
            is_unique: false,
            is_primary: false,
        }
    }

    pub fn unique(mut self) -> Self {
        self.is_unique = true;
        self
    }

    pub fn primary(mut self) -> Self {
        self.is_primary = true;
        self.is_unique = true;
        self
    }

    /// Accessors are only generated for non-primary indices over bare
    /// columns without a partial index predicate.
    pub fn is_eligible(&self) -> bool {
        !self.is_primary
            && self
                .columns
                .iter()
                .all(|col| col.name.is_some() && col.predicate.is_none())
    }
}

/// One key of an index
#[derive(Debug, Clone)]
pub struct IndexColumn {
    /// `None` for expression keys such as `lower(email)`
    pub name: Option<String>,
    pub definition: String,
    pub predicate: Option<String>,
}

impl IndexColumn {
    pub fn named(name: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            definition: name.clone(),
            name: Some(name),
            predicate: None,
        }
    }

    pub fn expression(definition: impl Into<String>) -> Self {
        Self {
            name: None,
            definition: definition.into(),
            predicate: None,
        }
    }

    pub fn with_predicate(mut self, predicate: impl Into<String>) -> Self {
        self.predicate = Some(predicate.into());
        self
    }
}

/// A custom enum type defined in the database
#[derive(Debug, Clone)]
pub struct EnumType {
    pub name: String,
    pub values: Vec<String>,
}

/// A domain over another type
#[derive(Debug, Clone)]
pub struct DomainType {
    pub name: String,
    pub inner_type: TypeName,
}

/// A user defined range type
#[derive(Debug, Clone)]
pub struct RangeType {
    pub name: String,
    pub subtype: TypeName,
}

/// Convert snake_case to PascalCase
///
/// This is a shared utility used by code generators for all target languages.
pub fn to_pascal_case(s: &str) -> String {
    s.split('_')
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                None => String::new(),
                Some(first) => {
                    let first_upper = first.to_uppercase().to_string();
                    first_upper + chars.as_str()
                }
            }
        })
        .collect()
}

/// Convert snake_case to camelCase
pub fn to_camel_case(s: &str) -> String {
    let pascal = to_pascal_case(s);
    let mut chars = pascal.chars();
    match chars.next() {
        None => String::new(),
        Some(first) => first.to_lowercase().to_string() + chars.as_str(),
    }
}
