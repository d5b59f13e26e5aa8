use postgres::Client;
use tracing::{debug, error, info, trace};

use super::{Introspector, SchemaFilter};
use crate::error::NoormError;
use crate::schema::{
    Column, ColumnReference, DomainType, EnumType, Index, IndexColumn, RangeType, Schema,
    SchemaMetadata, Table, TypeKind, TypeName,
};

/// PostgreSQL introspector
pub struct PostgresIntrospector<'a> {
    client: &'a mut Client,
}

impl<'a> PostgresIntrospector<'a> {
    pub fn new(client: &'a mut Client) -> Self {
        Self { client }
    }
}

impl Introspector for PostgresIntrospector<'_> {
    fn introspect(&mut self, filter: &SchemaFilter) -> Result<SchemaMetadata, NoormError> {
        info!("Starting schema introspection");

        let schema_names: Vec<String> = query_schemas(self.client)?
            .into_iter()
            .filter(|name| filter.should_include(name))
            .collect();
        debug!(schemas = ?schema_names, "Schemas after filtering");

        let mut schemas = Vec::with_capacity(schema_names.len());
        for schema_name in schema_names {
            schemas.push(introspect_schema(self.client, &schema_name)?);
        }

        info!(schemas = ?schemas.len(), "Schema introspection complete");
        Ok(SchemaMetadata { schemas })
    }
}

fn introspect_schema(client: &mut Client, schema_name: &str) -> Result<Schema, NoormError> {
    debug!(schema = ?schema_name, "Introspecting schema");

    let enums = query_enums(client, schema_name)?;
    let domains = query_domains(client, schema_name)?;
    let ranges = query_ranges(client, schema_name)?;

    let table_names = query_tables(client, schema_name)?;
    let mut tables = Vec::with_capacity(table_names.len());
    for table_name in table_names {
        debug!(table = ?table_name, "Introspecting table");

        let mut table = Table::new(schema_name, &table_name);
        table.columns = query_columns(client, schema_name, &table_name)?;
        trace!(table = ?table_name, columns = ?table.columns.len(), "Found columns");

        for (column_name, reference) in query_foreign_keys(client, schema_name, &table_name)? {
            if let Some(column) = table.columns.iter_mut().find(|c| c.name == column_name) {
                column.references.push(reference);
            }
        }

        table.indices = query_indices(client, schema_name, &table_name)?;
        trace!(table = ?table_name, indices = ?table.indices.len(), "Found indices");

        tables.push(table);
    }

    info!(
        schema = ?schema_name,
        tables = ?tables.len(),
        enums = ?enums.len(),
        domains = ?domains.len(),
        ranges = ?ranges.len(),
        "Schema introspected"
    );

    Ok(Schema {
        name: schema_name.to_string(),
        tables,
        enums,
        domains,
        ranges,
    })
}

fn introspection_error(schema_name: &str, what: &str, e: postgres::Error) -> NoormError {
    error!(schema = ?schema_name, error = ?e, "Failed to query {}", what);
    NoormError::Introspection {
        schema: schema_name.to_string(),
        message: format!("Failed to query {}: {}", what, e),
    }
}

/// Query all schema names
fn query_schemas(client: &mut Client) -> Result<Vec<String>, NoormError> {
    trace!("Querying schemas");

    let sql = r#"
        SELECT n.nspname AS schema_name
        FROM pg_namespace n
        ORDER BY n.nspname
    "#;

    let rows = client
        .query(sql, &[])
        .map_err(|e| introspection_error("*", "schemas", e))?;

    Ok(rows.iter().map(|row| row.get("schema_name")).collect())
}

/// Query all table names in a schema, including partitioned tables
fn query_tables(client: &mut Client, schema_name: &str) -> Result<Vec<String>, NoormError> {
    trace!(schema = ?schema_name, "Querying tables");

    let sql = r#"
        SELECT c.relname AS table_name
        FROM pg_class c
        JOIN pg_namespace n ON n.oid = c.relnamespace
        WHERE c.relkind IN ('r', 'p')
            AND NOT c.relispartition
            AND n.nspname = $1
        ORDER BY c.relname
    "#;

    let rows = client
        .query(sql, &[&schema_name])
        .map_err(|e| introspection_error(schema_name, "tables", e))?;

    let tables = rows.iter().map(|row| row.get("table_name")).collect();
    trace!(tables = ?tables, "Tables found");
    Ok(tables)
}

/// Query all columns for a table
fn query_columns(
    client: &mut Client,
    schema_name: &str,
    table_name: &str,
) -> Result<Vec<Column>, NoormError> {
    trace!(schema = ?schema_name, table = ?table_name, "Querying columns");

    let sql = r#"
        SELECT
            a.attname AS column_name,
            tn.nspname AS type_schema,
            t.typname AS type_name,
            t.typtype::text AS type_kind,
            NOT a.attnotnull AS is_nullable,
            (a.atthasdef OR a.attidentity <> '' OR a.attgenerated <> '') AS has_default,
            EXISTS (
                SELECT 1
                FROM pg_constraint con
                WHERE con.conrelid = c.oid
                    AND con.contype = 'p'
                    AND a.attnum = ANY(con.conkey)
            ) AS is_primary_key
        FROM pg_attribute a
        JOIN pg_class c ON c.oid = a.attrelid
        JOIN pg_namespace n ON n.oid = c.relnamespace
        JOIN pg_type t ON t.oid = a.atttypid
        JOIN pg_namespace tn ON tn.oid = t.typnamespace
        WHERE c.relname = $1
            AND n.nspname = $2
            AND a.attnum > 0
            AND NOT a.attisdropped
        ORDER BY a.attnum
    "#;

    let rows = client
        .query(sql, &[&table_name, &schema_name])
        .map_err(|e| introspection_error(schema_name, "columns", e))?;

    let mut columns = Vec::with_capacity(rows.len());
    for row in rows {
        let column_name: String = row.get("column_name");
        let type_schema: String = row.get("type_schema");
        let type_name: String = row.get("type_name");
        let type_kind: String = row.get("type_kind");

        let mut column = Column::new(
            column_name,
            parse_type_kind(&type_kind),
            TypeName::new(type_schema, type_name),
        );
        column.is_nullable = row.get("is_nullable");
        column.has_default = row.get("has_default");
        column.is_primary_key = row.get("is_primary_key");

        trace!(
            column = ?column.name,
            type_name = ?column.type_name.full_name(),
            kind = ?column.type_kind,
            is_nullable = ?column.is_nullable,
            has_default = ?column.has_default,
            "Parsed column"
        );

        columns.push(column);
    }

    Ok(columns)
}

/// Query single column foreign keys, in declaration order
fn query_foreign_keys(
    client: &mut Client,
    schema_name: &str,
    table_name: &str,
) -> Result<Vec<(String, ColumnReference)>, NoormError> {
    trace!(schema = ?schema_name, table = ?table_name, "Querying foreign keys");

    let sql = r#"
        SELECT
            a.attname AS column_name,
            fn.nspname AS foreign_schema,
            fc.relname AS foreign_table,
            fa.attname AS foreign_column
        FROM pg_constraint con
        JOIN pg_class c ON c.oid = con.conrelid
        JOIN pg_namespace n ON n.oid = c.relnamespace
        JOIN pg_attribute a ON a.attrelid = c.oid AND a.attnum = con.conkey[1]
        JOIN pg_class fc ON fc.oid = con.confrelid
        JOIN pg_namespace fn ON fn.oid = fc.relnamespace
        JOIN pg_attribute fa ON fa.attrelid = fc.oid AND fa.attnum = con.confkey[1]
        WHERE con.contype = 'f'
            AND array_length(con.conkey, 1) = 1
            AND c.relname = $1
            AND n.nspname = $2
        ORDER BY con.oid
    "#;

    let rows = client
        .query(sql, &[&table_name, &schema_name])
        .map_err(|e| introspection_error(schema_name, "foreign keys", e))?;

    Ok(rows
        .iter()
        .map(|row| {
            let column: String = row.get("column_name");
            let reference = ColumnReference::new(
                row.get::<_, String>("foreign_schema"),
                row.get::<_, String>("foreign_table"),
                row.get::<_, String>("foreign_column"),
            );
            (column, reference)
        })
        .collect())
}

/// Query indices with one row per key column
fn query_indices(
    client: &mut Client,
    schema_name: &str,
    table_name: &str,
) -> Result<Vec<Index>, NoormError> {
    trace!(schema = ?schema_name, table = ?table_name, "Querying indices");

    let sql = r#"
        SELECT
            i.relname AS index_name,
            ix.indisunique AS is_unique,
            ix.indisprimary AS is_primary,
            a.attname AS column_name,
            pg_get_indexdef(ix.indexrelid, k.ord::int, true) AS definition,
            pg_get_expr(ix.indpred, ix.indrelid) AS predicate
        FROM pg_index ix
        JOIN pg_class i ON i.oid = ix.indexrelid
        JOIN pg_class c ON c.oid = ix.indrelid
        JOIN pg_namespace n ON n.oid = c.relnamespace
        CROSS JOIN LATERAL unnest(ix.indkey::int2[]) WITH ORDINALITY AS k(attnum, ord)
        LEFT JOIN pg_attribute a ON a.attrelid = c.oid AND a.attnum = k.attnum AND k.attnum > 0
        WHERE c.relname = $1
            AND n.nspname = $2
            AND k.ord <= ix.indnkeyatts
        ORDER BY i.relname, k.ord
    "#;

    let rows = client
        .query(sql, &[&table_name, &schema_name])
        .map_err(|e| introspection_error(schema_name, "indices", e))?;

    let mut indices: Vec<Index> = Vec::new();
    for row in rows {
        let index_name: String = row.get("index_name");
        let column_name: Option<String> = row.get("column_name");
        let definition: String = row.get("definition");
        let predicate: Option<String> = row.get("predicate");

        let column = IndexColumn {
            name: column_name,
            definition,
            predicate,
        };

        // Group key columns by index
        if let Some(existing) = indices.iter_mut().find(|i| i.name == index_name) {
            existing.columns.push(column);
        } else {
            trace!(index = ?index_name, "Found new index");
            indices.push(Index {
                name: index_name,
                columns: vec![column],
                is_unique: row.get("is_unique"),
                is_primary: row.get("is_primary"),
            });
        }
    }

    Ok(indices)
}

/// Query all enum types in a schema
fn query_enums(client: &mut Client, schema_name: &str) -> Result<Vec<EnumType>, NoormError> {
    trace!(schema = ?schema_name, "Querying enum types");

    let sql = r#"
        SELECT
            t.typname AS enum_name,
            e.enumlabel AS enum_value
        FROM pg_type t
        JOIN pg_enum e ON e.enumtypid = t.oid
        JOIN pg_namespace n ON n.oid = t.typnamespace
        WHERE n.nspname = $1
        ORDER BY t.typname, e.enumsortorder
    "#;

    let rows = client
        .query(sql, &[&schema_name])
        .map_err(|e| introspection_error(schema_name, "enums", e))?;

    // Group enum values by enum name
    let mut enums: Vec<EnumType> = Vec::new();
    for row in rows {
        let enum_name: String = row.get("enum_name");
        let enum_value: String = row.get("enum_value");

        if let Some(existing) = enums.iter_mut().find(|e| e.name == enum_name) {
            existing.values.push(enum_value);
        } else {
            trace!(enum_name = ?enum_name, "Found new enum type");
            enums.push(EnumType {
                name: enum_name,
                values: vec![enum_value],
            });
        }
    }

    Ok(enums)
}

/// Query all domains in a schema with the type they wrap
fn query_domains(client: &mut Client, schema_name: &str) -> Result<Vec<DomainType>, NoormError> {
    trace!(schema = ?schema_name, "Querying domains");

    let sql = r#"
        SELECT
            t.typname AS domain_name,
            bn.nspname AS inner_schema,
            b.typname AS inner_name
        FROM pg_type t
        JOIN pg_namespace n ON n.oid = t.typnamespace
        JOIN pg_type b ON b.oid = t.typbasetype
        JOIN pg_namespace bn ON bn.oid = b.typnamespace
        WHERE t.typtype = 'd'
            AND n.nspname = $1
        ORDER BY t.typname
    "#;

    let rows = client
        .query(sql, &[&schema_name])
        .map_err(|e| introspection_error(schema_name, "domains", e))?;

    Ok(rows
        .iter()
        .map(|row| DomainType {
            name: row.get("domain_name"),
            inner_type: TypeName::new(
                row.get::<_, String>("inner_schema"),
                row.get::<_, String>("inner_name"),
            ),
        })
        .collect())
}

/// Query all user range types in a schema
fn query_ranges(client: &mut Client, schema_name: &str) -> Result<Vec<RangeType>, NoormError> {
    trace!(schema = ?schema_name, "Querying ranges");

    let sql = r#"
        SELECT
            t.typname AS range_name,
            sn.nspname AS subtype_schema,
            s.typname AS subtype_name
        FROM pg_range r
        JOIN pg_type t ON t.oid = r.rngtypid
        JOIN pg_namespace n ON n.oid = t.typnamespace
        JOIN pg_type s ON s.oid = r.rngsubtype
        JOIN pg_namespace sn ON sn.oid = s.typnamespace
        WHERE n.nspname = $1
        ORDER BY t.typname
    "#;

    let rows = client
        .query(sql, &[&schema_name])
        .map_err(|e| introspection_error(schema_name, "ranges", e))?;

    Ok(rows
        .iter()
        .map(|row| RangeType {
            name: row.get("range_name"),
            subtype: TypeName::new(
                row.get::<_, String>("subtype_schema"),
                row.get::<_, String>("subtype_name"),
            ),
        })
        .collect())
}

/// Map `pg_type.typtype` to a type kind
///
/// Multiranges and pseudo types are treated as base types and end up
/// untyped.
fn parse_type_kind(typtype: &str) -> TypeKind {
    match typtype {
        "e" => TypeKind::Enum,
        "d" => TypeKind::Domain,
        "r" => TypeKind::Range,
        "c" => TypeKind::Composite,
        _ => TypeKind::Base,
    }
}
