//! Column classification and type mapping
//!
//! Turns a column's database type into the expressions the TypeScript
//! output needs: the zod schema, the static type, the element type name used
//! in `sql.unnest`/`sql.array` and the expression that serializes a value
//! into a bulk tuple.

use std::collections::{HashMap, HashSet};

use crate::codegen::catalog::quote;
use crate::error::NoormError;
use crate::schema::{
    to_camel_case, to_pascal_case, Column, ColumnReference, SchemaMetadata, Table, TypeKind,
    TypeName, PG_CATALOG,
};

/// Built-in range types exposed through the shared postgres module
pub const BUILTIN_RANGES: [&str; 6] = [
    "int4range",
    "int8range",
    "numrange",
    "tsrange",
    "tstzrange",
    "daterange",
];

/// How a value is turned into something slonik can put in a tuple
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Serializer {
    Identity,
    IsoString,
    Json,
    Interval,
    Range,
}

impl Serializer {
    /// Serializer expression applied to `value`
    pub fn apply(&self, value: &str, nullable: bool) -> String {
        let expression = match self {
            Self::Identity => return value.to_string(),
            Self::IsoString => format!("{value}.toISOString()"),
            Self::Json => format!("JSON.stringify({value})"),
            Self::Interval => format!("{value}.toPostgres()"),
            Self::Range => format!("{value}.toPostgres(Postgres.Serializers.range)"),
        };

        if nullable {
            format!("{value} === null ? null : {expression}")
        } else {
            expression
        }
    }
}

/// A generated module another module imports from
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ModuleRef {
    Postgres,
    Enums { schema: String },
    Domains { schema: String },
    Ranges { schema: String },
    Table { schema: String, table: String },
}

impl ModuleRef {
    /// Name the module is bound to inside a table module of `from_schema`
    pub fn alias(&self, from_schema: &str) -> String {
        match self {
            Self::Postgres => "Postgres".to_string(),
            Self::Enums { schema } => catalog_alias(schema, from_schema, "Enums"),
            Self::Domains { schema } => catalog_alias(schema, from_schema, "Domains"),
            Self::Ranges { schema } => catalog_alias(schema, from_schema, "Ranges"),
            Self::Table { schema, table } if schema == from_schema => {
                format!("{}Row", to_pascal_case(table))
            }
            Self::Table { schema, table } => {
                format!("{}{}Row", to_pascal_case(schema), to_pascal_case(table))
            }
        }
    }

    /// Import path relative to `<schema>/tables/<table>/`
    pub fn path(&self, from_schema: &str) -> String {
        match self {
            Self::Postgres => "../../../postgres".to_string(),
            Self::Enums { schema } => catalog_path(schema, from_schema, "enums"),
            Self::Domains { schema } => catalog_path(schema, from_schema, "domains"),
            Self::Ranges { schema } => catalog_path(schema, from_schema, "ranges"),
            Self::Table { schema, table } if schema == from_schema => {
                format!("../{table}/table")
            }
            Self::Table { schema, table } => format!("../../../{schema}/tables/{table}/table"),
        }
    }

    /// The full import statement
    pub fn import_statement(&self, from_schema: &str) -> String {
        let alias = self.alias(from_schema);
        let path = self.path(from_schema);
        match self {
            Self::Table { .. } => format!("import {{ type Row as {alias} }} from \"{path}\";"),
            _ => format!("import * as {alias} from \"{path}\";"),
        }
    }
}

fn catalog_alias(schema: &str, from_schema: &str, kind: &str) -> String {
    if schema == from_schema {
        kind.to_string()
    } else {
        format!("{}{}", to_pascal_case(schema), kind)
    }
}

fn catalog_path(schema: &str, from_schema: &str, kind: &str) -> String {
    if schema == from_schema {
        format!("../../{kind}")
    } else {
        format!("../../../{schema}/{kind}")
    }
}

/// Everything the generator needs to know about one column's type
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypeDescriptor {
    /// zod expression, branded and widened as needed
    pub validation: String,
    /// TypeScript type used in Create/Update shapes and accessor args
    pub target_type: String,
    /// Unbranded, non-null TypeScript type
    pub scalar_type: String,
    /// Element type name for `sql.unnest`/`sql.array`
    pub array_type: String,
    pub serializer: Serializer,
    pub nullable: bool,
    pub primary_key: bool,
    /// No safe mapping was found, typed as `any`
    pub untyped: bool,
    /// Module the validation expression comes from
    pub module: Option<ModuleRef>,
    /// Table module of the honored foreign key
    pub reference: Option<ModuleRef>,
}

impl TypeDescriptor {
    /// Serializer expression for `value`
    pub fn serialize(&self, value: &str) -> String {
        self.serializer.apply(value, self.nullable)
    }

    /// Modules the target type and serializer expression need in a CRUD module
    pub fn target_modules(&self) -> Vec<ModuleRef> {
        let mut modules = Vec::new();
        if !self.primary_key {
            match (&self.reference, &self.module) {
                (Some(reference), _) => modules.push(reference.clone()),
                (None, Some(module)) => modules.push(module.clone()),
                (None, None) => {}
            }
        }
        if self.serializer == Serializer::Range && !modules.contains(&ModuleRef::Postgres) {
            modules.push(ModuleRef::Postgres);
        }
        modules
    }
}

/// The base (unbranded, non-null) mapping of a type
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BaseMapping {
    pub validation: String,
    pub target_type: String,
    pub serializer: Serializer,
    pub module: Option<ModuleRef>,
    pub untyped: bool,
}

impl BaseMapping {
    fn simple(validation: &str, target_type: &str) -> Self {
        Self {
            validation: validation.to_string(),
            target_type: target_type.to_string(),
            serializer: Serializer::Identity,
            module: None,
            untyped: false,
        }
    }

    fn postgres(validation: &str, target_type: &str, serializer: Serializer) -> Self {
        Self {
            validation: validation.to_string(),
            target_type: target_type.to_string(),
            serializer,
            module: Some(ModuleRef::Postgres),
            untyped: false,
        }
    }

    fn any() -> Self {
        Self {
            untyped: true,
            ..Self::simple("z.any()", "any")
        }
    }
}

/// Map a built-in `pg_catalog` type
///
/// Unknown and geometric types fall back to `any` with `untyped` set.
pub fn map_builtin(type_name: &TypeName) -> BaseMapping {
    if !type_name.is_builtin() {
        return BaseMapping::any();
    }

    let name = type_name.name.as_str();
    if BUILTIN_RANGES.contains(&name) {
        return BaseMapping::postgres(
            &format!("Postgres.Schemas.{name}"),
            &format!("Postgres.Types.{}", to_pascal_case(name)),
            Serializer::Range,
        );
    }

    match name {
        "int2" | "int4" | "float4" | "float8" | "numeric" => {
            BaseMapping::simple("z.number()", "number")
        }
        "int8" => BaseMapping::simple("z.bigint()", "bigint"),
        "text" | "varchar" | "bpchar" | "char" | "name" | "uuid" => {
            BaseMapping::simple("z.string()", "string")
        }
        "bool" => BaseMapping::simple("z.boolean()", "boolean"),
        "timestamp" | "timestamptz" => BaseMapping {
            serializer: Serializer::IsoString,
            ..BaseMapping::simple("z.date()", "Date")
        },
        "date" | "time" | "timetz" => BaseMapping::simple("z.string()", "string"),
        "interval" => BaseMapping::postgres(
            "Postgres.Schemas.interval",
            "Postgres.Types.Interval",
            Serializer::Interval,
        ),
        "json" | "jsonb" => {
            BaseMapping::postgres("Postgres.Schemas.json", "Postgres.Types.Json", Serializer::Json)
        }
        "bytea" => BaseMapping::simple("z.instanceof(Buffer)", "Buffer"),
        "bit" | "varbit" | "money" | "inet" | "cidr" | "macaddr" | "macaddr8" | "tsquery"
        | "tsvector" | "xml" | "pg_lsn" | "pg_snapshot" => {
            BaseMapping::simple("z.string()", "string")
        }
        // point, line, lseg, box, path, polygon, circle and anything unknown
        _ => BaseMapping::any(),
    }
}

/// Resolve the kind of a column's type
///
/// Built-in range types are always treated as ranges, whatever the
/// extractor tagged them as.
pub fn classify(column: &Column) -> TypeKind {
    let type_name = &column.type_name;
    if type_name.is_builtin() && BUILTIN_RANGES.contains(&type_name.name.as_str()) {
        return TypeKind::Range;
    }
    column.type_kind
}

/// Maps columns using the user types defined across all schemas
#[derive(Debug, Clone, Default)]
pub struct TypeMapper {
    domains: HashMap<TypeName, TypeName>,
    generated: Option<GeneratedModules>,
    ignored_columns: HashSet<ColumnKey>,
}

/// Schemas and tables that get modules in this run
#[derive(Debug, Clone, Default)]
struct GeneratedModules {
    schemas: HashSet<String>,
    tables: HashSet<(String, String)>,
}

/// `(schema, table, column)` of a column left out of its row module
type ColumnKey = (String, String, String);

impl TypeMapper {
    pub fn new(metadata: &SchemaMetadata) -> Self {
        let domains = metadata
            .schemas
            .iter()
            .flat_map(|schema| {
                schema
                    .domains
                    .iter()
                    .map(|domain| {
                        (
                            TypeName::new(&schema.name, &domain.name),
                            domain.inner_type.clone(),
                        )
                    })
            })
            .collect();

        Self {
            domains,
            generated: None,
            ignored_columns: HashSet::new(),
        }
    }

    /// Only point at modules that are generated
    ///
    /// User types from other schemas fall back to `any`; foreign keys to
    /// skipped tables lose their branding.
    pub fn with_generated<S, T>(mut self, schemas: S, tables: T) -> Self
    where
        S: IntoIterator<Item = String>,
        T: IntoIterator<Item = (String, String)>,
    {
        self.generated = Some(GeneratedModules {
            schemas: schemas.into_iter().collect(),
            tables: tables.into_iter().collect(),
        });
        self
    }

    /// Columns missing from their table's row; foreign keys to them lose
    /// their branding.
    pub fn with_ignored_columns<C>(mut self, columns: C) -> Self
    where
        C: IntoIterator<Item = ColumnKey>,
    {
        self.ignored_columns = columns.into_iter().collect();
        self
    }

    fn schema_generated(&self, schema: &str) -> bool {
        self.generated
            .as_ref()
            .map_or(true, |generated| generated.schemas.contains(schema))
    }

    fn table_generated(&self, schema: &str, table: &str) -> bool {
        self.generated.as_ref().map_or(true, |generated| {
            generated
                .tables
                .contains(&(schema.to_string(), table.to_string()))
        })
    }

    fn reference_generated(&self, fk: &ColumnReference) -> bool {
        self.table_generated(&fk.schema_name, &fk.table_name)
            && !self.ignored_columns.contains(&(
                fk.schema_name.clone(),
                fk.table_name.clone(),
                fk.column_name.clone(),
            ))
    }

    /// Derive the type descriptor of `column` in `table`
    pub fn map_type(&self, table: &Table, column: &Column) -> Result<TypeDescriptor, NoormError> {
        let kind = classify(column);
        let base = self.map_base(table, column, kind)?;
        let array_type = array_type(&table.schema_name, &column.type_name);

        let mut validation = base.validation.clone();
        let mut target_type = base.target_type.clone();
        let mut reference = None;

        if column.is_primary_key {
            validation = format!(
                "{}.brand<\"{}.{}.{}\">()",
                validation, table.schema_name, table.name, column.name
            );
            target_type = "Id".to_string();
        } else if let Some(fk) = column
            .reference()
            .filter(|fk| self.reference_generated(fk))
        {
            validation = format!(
                "{}.brand<\"{}.{}.{}\">()",
                validation, fk.schema_name, fk.table_name, fk.column_name
            );
            let module = ModuleRef::Table {
                schema: fk.schema_name.clone(),
                table: fk.table_name.clone(),
            };
            target_type = format!("{}[\"{}\"]", module.alias(&table.schema_name), fk.column_name);
            reference = Some(module);
        }

        if column.is_nullable {
            validation = format!("{validation}.nullable()");
            target_type = format!("{target_type} | null");
        }

        Ok(TypeDescriptor {
            validation,
            target_type,
            scalar_type: base.target_type,
            array_type,
            serializer: base.serializer,
            nullable: column.is_nullable,
            primary_key: column.is_primary_key,
            untyped: base.untyped,
            module: base.module,
            reference,
        })
    }

    fn map_base(
        &self,
        table: &Table,
        column: &Column,
        kind: TypeKind,
    ) -> Result<BaseMapping, NoormError> {
        let type_name = &column.type_name;
        let camel = to_camel_case(&type_name.name);
        let pascal = to_pascal_case(&type_name.name);

        let mapping = match kind {
            TypeKind::Base => map_builtin(type_name),
            TypeKind::Range if type_name.is_builtin() => map_builtin(type_name),
            TypeKind::Enum | TypeKind::Domain | TypeKind::Range
                if !self.schema_generated(&type_name.schema) =>
            {
                BaseMapping::any()
            }
            TypeKind::Enum => BaseMapping {
                validation: format!("{}.Schemas.{camel}", self.alias(table, "Enums", type_name)),
                target_type: format!("{}.Types.{pascal}", self.alias(table, "Enums", type_name)),
                serializer: Serializer::Identity,
                module: Some(ModuleRef::Enums {
                    schema: type_name.schema.clone(),
                }),
                untyped: false,
            },
            TypeKind::Domain => BaseMapping {
                validation: format!("{}.Schemas.{camel}", self.alias(table, "Domains", type_name)),
                target_type: format!("{}.Types.{pascal}", self.alias(table, "Domains", type_name)),
                serializer: self.domain_serializer(type_name),
                module: Some(ModuleRef::Domains {
                    schema: type_name.schema.clone(),
                }),
                untyped: false,
            },
            TypeKind::Range => BaseMapping {
                validation: format!("{}.Schemas.{camel}", self.alias(table, "Ranges", type_name)),
                target_type: format!("{}.Types.{pascal}", self.alias(table, "Ranges", type_name)),
                serializer: Serializer::Identity,
                module: Some(ModuleRef::Ranges {
                    schema: type_name.schema.clone(),
                }),
                untyped: false,
            },
            TypeKind::Composite => {
                return Err(NoormError::UnsupportedCompositeType {
                    schema: table.schema_name.clone(),
                    table: table.name.clone(),
                    column: column.name.clone(),
                    type_name: type_name.full_name(),
                })
            }
        };

        Ok(mapping)
    }

    fn alias(&self, table: &Table, kind: &str, type_name: &TypeName) -> String {
        catalog_alias(&type_name.schema, &table.schema_name, kind)
    }

    /// Domains serialize like the type they wrap
    fn domain_serializer(&self, type_name: &TypeName) -> Serializer {
        match self.domains.get(type_name) {
            Some(inner) if inner.is_builtin() => match map_builtin(inner).serializer {
                // built-in ranges are reached through the shared module only
                Serializer::Range => Serializer::Identity,
                serializer => serializer,
            },
            _ => Serializer::Identity,
        }
    }
}

/// Element type name for bulk parameters
///
/// Built-in names lose their `pg_catalog.` prefix, user types in the table's
/// own schema are referenced by bare name.
pub fn array_type(table_schema: &str, type_name: &TypeName) -> String {
    if type_name.schema == PG_CATALOG || type_name.schema == table_schema {
        type_name.name.clone()
    } else {
        type_name.full_name()
    }
}

/// Keywords that must be quoted when used as a column name in SQL text
const SQL_RESERVED: &[&str] = &[
    "all", "and", "any", "array", "as", "asc", "both", "case", "cast", "check", "collate",
    "column", "constraint", "create", "current_date", "current_time", "current_user", "default",
    "desc", "distinct", "do", "else", "end", "except", "false", "fetch", "for", "foreign", "from",
    "grant", "group", "having", "in", "into", "is", "join", "leading", "limit", "not", "null",
    "offset", "on", "only", "or", "order", "primary", "references", "returning", "select",
    "table", "then", "to", "true", "union", "unique", "user", "using", "when", "where", "with",
];

fn is_js_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' || c == '$' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '$')
}

/// Object key for a column, quoted when it is not a plain identifier
pub fn property_key(name: &str) -> String {
    if is_js_identifier(name) {
        name.to_string()
    } else {
        quote(name)
    }
}

/// Property access of `name` on `receiver`
pub fn member(receiver: &str, name: &str) -> String {
    if is_js_identifier(name) {
        format!("{receiver}.{name}")
    } else {
        format!("{receiver}[{}]", property_key(name))
    }
}

/// Names a column's local binding cannot take inside a generated function
const RESERVED_LOCALS: &[&str] = &[
    "await", "break", "case", "catch", "class", "columns", "connection", "const", "continue",
    "debugger", "default", "delete", "do", "else", "enum", "export", "extends", "false",
    "finally", "for", "function", "if", "implements", "import", "in", "instanceof", "interface",
    "let", "new", "null", "package", "private", "protected", "public", "result", "return",
    "static", "super", "switch", "this", "throw", "true", "try", "typeof", "var", "void",
    "while", "with", "yield",
];

/// A column name with every non identifier character replaced by `_`
fn identifier_chars(name: &str) -> String {
    name.chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '_' { c } else { '_' })
        .collect()
}

/// Local variable holding a column's value in accessor functions
pub fn local_identifier(name: &str) -> String {
    let mut local = identifier_chars(name);
    if local.is_empty()
        || local.starts_with(|c: char| c.is_ascii_digit())
        || RESERVED_LOCALS.contains(&local.as_str())
    {
        local.insert(0, '_');
    }
    local
}

/// Destructuring entry binding a column's key to its local
///
/// Shorthand when the key already is the local name.
pub fn binding(name: &str) -> String {
    let key = property_key(name);
    let local = local_identifier(name);
    if key == local {
        local
    } else {
        format!("{key}: {local}")
    }
}

/// PascalCase fragment of an accessor function name
pub fn accessor_fragment(name: &str) -> String {
    to_pascal_case(&identifier_chars(name))
}

/// Column name as it appears in SQL text
pub fn sql_identifier(name: &str) -> String {
    let plain = name
        .chars()
        .next()
        .is_some_and(|c| c.is_ascii_lowercase() || c == '_')
        && name
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_');

    if plain && !SQL_RESERVED.contains(&name) {
        name.to_string()
    } else {
        format!("\"{}\"", name.replace('"', "\"\""))
    }
}
