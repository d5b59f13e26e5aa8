//! TypeScript code generator
//!
//! Renders the built modules as zod + slonik TypeScript.

use std::path::PathBuf;

use minijinja::{context, Environment, Value};
use tracing::{debug, trace};

use crate::codegen::catalog::{quote, CatalogModule};
use crate::codegen::table::{ColumnBinding, IndexAccessor, TableModule};
use crate::codegen::types::{
    binding, local_identifier, member, property_key, sql_identifier, BUILTIN_RANGES,
};
use crate::codegen::{CodeGenerator, GeneratedFile, SchemaIndex};
use crate::error::NoormError;
use crate::schema::to_pascal_case;

/// TypeScript code generator
pub struct TypeScriptGenerator {
    env: Environment<'static>,
}

impl TypeScriptGenerator {
    pub fn new() -> Self {
        let mut env = Environment::new();
        env.set_trim_blocks(true);
        env.set_lstrip_blocks(true);
        env.set_keep_trailing_newline(true);

        // Register templates
        env.add_template("postgres.ts", include_str!("templates/postgres.ts.jinja"))
            .expect("Failed to load postgres template");
        env.add_template(
            "type-parsers.ts",
            include_str!("templates/type_parsers.ts.jinja"),
        )
        .expect("Failed to load type parsers template");
        env.add_template("table.ts", include_str!("templates/table.ts.jinja"))
            .expect("Failed to load table template");
        env.add_template("model.ts", include_str!("templates/model.ts.jinja"))
            .expect("Failed to load model template");
        env.add_template("table_index.ts", include_str!("templates/table_index.ts.jinja"))
            .expect("Failed to load table index template");
        env.add_template("tables_index.ts", include_str!("templates/tables_index.ts.jinja"))
            .expect("Failed to load tables index template");
        env.add_template("schema_index.ts", include_str!("templates/schema_index.ts.jinja"))
            .expect("Failed to load schema index template");
        env.add_template(
            "catalog_schemas.ts",
            include_str!("templates/catalog_schemas.ts.jinja"),
        )
        .expect("Failed to load catalog schemas template");
        env.add_template(
            "catalog_types.ts",
            include_str!("templates/catalog_types.ts.jinja"),
        )
        .expect("Failed to load catalog types template");
        env.add_template(
            "catalog_index.ts",
            include_str!("templates/catalog_index.ts.jinja"),
        )
        .expect("Failed to load catalog index template");

        Self { env }
    }

    fn render(&self, name: &str, scope: &str, ctx: Value) -> Result<String, NoormError> {
        let template = self.env.get_template(name).map_err(|e| NoormError::CodeGen {
            table: scope.to_string(),
            message: format!("Template error: {}", e),
        })?;

        template.render(ctx).map_err(|e| NoormError::CodeGen {
            table: scope.to_string(),
            message: format!("Render error: {}", e),
        })
    }

    fn build_table_context(&self, module: &TableModule) -> Value {
        let schema = &module.schema_name;

        context! {
            imports => module.row.imports.iter().map(|m| m.import_statement(schema)).collect::<Vec<_>>(),
            fields => module.row.fields.iter().map(|field| context! {
                key => property_key(&field.name),
                validation => &field.descriptor.validation,
            }).collect::<Vec<_>>(),
            primary_key => quote(&module.row.primary_key),
            schema_literal => quote(schema),
            table_literal => quote(&module.table_name),
        }
    }

    fn build_model_context(&self, module: &TableModule) -> Value {
        let schema = &module.schema_name;
        let crud = &module.crud;

        // updates bind the key first
        let update_bindings: Vec<&ColumnBinding> = std::iter::once(&crud.primary_key)
            .chain(crud.update_columns.iter())
            .collect();

        context! {
            imports => crud.imports.iter().map(|m| m.import_statement(schema)).collect::<Vec<_>>(),
            key => column_context(&crud.primary_key),
            find_type => &crud.find_type,
            create => crud.create_columns.iter().map(column_context).collect::<Vec<_>>(),
            create_list => sql_list(crud.create_columns.iter()),
            create_types => type_list(crud.create_columns.iter()),
            update => crud.update_columns.iter().map(column_context).collect::<Vec<_>>(),
            update_list => sql_list(update_bindings.iter().copied()),
            update_types => type_list(update_bindings.iter().copied()),
            accessors => crud.accessors.iter().map(accessor_context).collect::<Vec<_>>(),
        }
    }
}

impl Default for TypeScriptGenerator {
    fn default() -> Self {
        Self::new()
    }
}

fn column_context(column: &ColumnBinding) -> Value {
    let descriptor = &column.descriptor;
    context! {
        name => &column.name,
        key => property_key(&column.name),
        local => local_identifier(&column.name),
        binding => binding(&column.name),
        sql => sql_identifier(&column.name),
        target_type => &descriptor.target_type,
        list_type => column.list_type(),
        array_type => &descriptor.array_type,
        shape_value => column.serialize("shape"),
        row_value => column.serialize("newRow"),
        col_value => column.serialize("col"),
        value => descriptor.serialize("col"),
        row_member => member("row", &column.name),
    }
}

fn accessor_context(accessor: &IndexAccessor) -> Value {
    let return_type = if accessor.unique {
        "Row | null"
    } else {
        "readonly Row[]"
    };

    context! {
        name => &accessor.name,
        single => accessor.is_single(),
        unique => accessor.unique,
        grouping_map => accessor.grouping_map,
        return_type => return_type,
        columns => accessor.columns.iter().map(column_context).collect::<Vec<_>>(),
        list => sql_list(accessor.columns.iter()),
        types => type_list(accessor.columns.iter()),
    }
}

/// `a, b, c` as used in `SELECT` and `AS input(...)`
fn sql_list<'a>(columns: impl Iterator<Item = &'a ColumnBinding>) -> String {
    columns
        .map(|column| sql_identifier(&column.name))
        .collect::<Vec<_>>()
        .join(", ")
}

/// `"int4", "text"` as passed to `sql.unnest`
fn type_list<'a>(columns: impl Iterator<Item = &'a ColumnBinding>) -> String {
    columns
        .map(|column| quote(&column.descriptor.array_type))
        .collect::<Vec<_>>()
        .join(", ")
}

/// Element type and bound checks of a built-in range
fn range_context(name: &str) -> Value {
    let (element, check) = match name {
        "int4range" | "numrange" => ("number", "typeof val.{} === \"number\""),
        "tsrange" | "tstzrange" => ("Date", "val.{} instanceof Date"),
        // int8range and daterange bounds stay strings
        _ => ("string", "typeof val.{} === \"string\""),
    };

    context! {
        name => name,
        type_name => to_pascal_case(name),
        element => element,
        check_lower => check.replace("{}", "lower"),
        check_upper => check.replace("{}", "upper"),
    }
}

impl CodeGenerator for TypeScriptGenerator {
    fn render_shared(&self) -> Result<Vec<GeneratedFile>, NoormError> {
        let postgres = self.render(
            "postgres.ts",
            "postgres",
            context! {
                ranges => BUILTIN_RANGES.iter().map(|name| range_context(name)).collect::<Vec<_>>(),
            },
        )?;
        let parsers = self.render("type-parsers.ts", "slonik", context! {})?;

        Ok(vec![
            GeneratedFile::new("postgres.ts", postgres),
            GeneratedFile::new(PathBuf::from("slonik").join("type-parsers.ts"), parsers),
        ])
    }

    fn render_catalog(&self, catalog: &CatalogModule) -> Result<Vec<GeneratedFile>, NoormError> {
        let dir = PathBuf::from(&catalog.schema).join(catalog.kind.directory());
        let scope = format!("{}.{}", catalog.schema, catalog.kind.directory());
        trace!(catalog = ?scope, entries = catalog.entries.len(), "Rendering catalog");

        let entries: Vec<Value> = catalog
            .entries
            .iter()
            .map(|entry| {
                context! {
                    schema_name => &entry.schema_name,
                    type_name => &entry.type_name,
                    validation => &entry.validation,
                }
            })
            .collect();

        let ctx = context! {
            postgres => !catalog.imports.is_empty(),
            entries => entries,
        };

        Ok(vec![
            GeneratedFile::new(
                dir.join("schemas.ts"),
                self.render("catalog_schemas.ts", &scope, ctx.clone())?,
            ),
            GeneratedFile::new(
                dir.join("types.ts"),
                self.render("catalog_types.ts", &scope, ctx)?,
            ),
            GeneratedFile::new(
                dir.join("index.ts"),
                self.render("catalog_index.ts", &scope, context! {})?,
            ),
        ])
    }

    fn render_table(&self, module: &TableModule) -> Result<Vec<GeneratedFile>, NoormError> {
        let dir = PathBuf::from(&module.schema_name)
            .join("tables")
            .join(&module.table_name);
        let scope = format!("{}.{}", module.schema_name, module.table_name);

        let table = self.render("table.ts", &scope, self.build_table_context(module))?;
        let model = self.render("model.ts", &scope, self.build_model_context(module))?;
        let index = self.render("table_index.ts", &scope, context! {})?;

        debug!(table = ?scope, path = ?dir, "Rendered table");

        Ok(vec![
            GeneratedFile::new(dir.join("table.ts"), table),
            GeneratedFile::new(dir.join("model.ts"), model),
            GeneratedFile::new(dir.join("index.ts"), index),
        ])
    }

    fn render_schema_index(&self, index: &SchemaIndex) -> Result<Vec<GeneratedFile>, NoormError> {
        let dir = PathBuf::from(&index.schema_name);
        let mut files = Vec::new();

        if !index.tables.is_empty() {
            let tables: Vec<Value> = index
                .tables
                .iter()
                .map(|table| {
                    context! {
                        name => table,
                        namespace => to_pascal_case(table),
                    }
                })
                .collect();

            files.push(GeneratedFile::new(
                dir.join("tables").join("index.ts"),
                self.render("tables_index.ts", &index.schema_name, context! { tables => tables })?,
            ));
        }

        let catalogs: Vec<Value> = index
            .catalogs
            .iter()
            .map(|kind| {
                context! {
                    namespace => kind.namespace(),
                    directory => kind.directory(),
                }
            })
            .collect();

        files.push(GeneratedFile::new(
            dir.join("index.ts"),
            self.render(
                "schema_index.ts",
                &index.schema_name,
                context! {
                    catalogs => catalogs,
                    has_tables => !index.tables.is_empty(),
                },
            )?,
        ));

        Ok(files)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codegen::build_table;
    use crate::codegen::catalog::build_catalogs;
    use crate::codegen::types::TypeMapper;
    use crate::config::resolve::ResolvedTableConfig;
    use crate::report::MemoryReporter;
    use crate::schema::{Column, ColumnReference, EnumType, Index, Schema, Table, TypeKind, TypeName};

    fn penguins() -> Table {
        Table::new("public", "penguins")
            .with_column(Column::base("id", "int4").primary_key().with_default())
            .with_column(Column::base("name", "text"))
            .with_column(Column::base("species", "text"))
            .with_column(Column::base("waddle_speed_kph", "numeric"))
            .with_column(Column::base("favourite_snack", "text").nullable())
            .with_column(Column::base("date_of_birth", "timestamptz"))
            .with_index(Index::on("penguins_pkey", &["id"]).primary())
            .with_index(Index::on("penguins_species_dob_idx", &["species", "date_of_birth"]))
            .with_index(Index::on("penguins_name_key", &["name"]).unique())
    }

    fn flight_attempts() -> Table {
        Table::new("public", "flight_attempts")
            .with_column(Column::base("id", "int4").primary_key().with_default())
            .with_column(
                Column::base("penguin", "int4")
                    .with_reference(ColumnReference::new("public", "penguins", "id")),
            )
            .with_column(Column::base("method", "text"))
            .with_column(Column::base("attempted_at", "timestamptz"))
            .with_index(Index::on("flight_attempts_penguin_idx", &["penguin"]))
    }

    fn render(table: &Table) -> (String, String) {
        let module = build_table(
            table,
            &ResolvedTableConfig::default(),
            &TypeMapper::default(),
            &MemoryReporter::new(),
        )
        .unwrap();
        let files = TypeScriptGenerator::new().render_table(&module).unwrap();
        (files[0].contents.clone(), files[1].contents.clone())
    }

    #[test]
    fn test_table_module() {
        let (table, _) = render(&penguins());

        assert!(table.starts_with("import { z } from \"zod\";\nimport { type ListSqlToken, sql } from \"slonik\";\n\n"));
        assert!(table.contains(
            "export const row = z.object({\n  id: z.number().brand<\"public.penguins.id\">(),\n  name: z.string(),\n"
        ));
        assert!(table.contains("  favourite_snack: z.string().nullable(),\n"));
        assert!(table.contains("export type Id = Row[\"id\"];"));
        assert!(table.contains("sql.identifier([\"public\", \"penguins\"])"));
        assert!(table.ends_with("}\n"));
    }

    #[test]
    fn test_model_create_many() {
        let (_, model) = render(&penguins());

        assert!(model.contains(
            "  const tuples = shapes.map((shape) => [\n    shape.name,\n    shape.species,\n    shape.waddle_speed_kph,\n    shape.favourite_snack,\n    shape.date_of_birth.toISOString(),\n  ]);"
        ));
        assert!(model.contains(
            "    INSERT INTO ${tableFragment} (\n      name,\n      species,\n      waddle_speed_kph,\n      favourite_snack,\n      date_of_birth\n    )\n"
        ));
        assert!(model.contains(
            "FROM ${sql.unnest(tuples, [\"text\", \"text\", \"numeric\", \"text\", \"timestamptz\"])}"
        ));
        assert!(model.contains("RETURNING ${columnsFragment}`;\n\n  return connection.any(query);"));
    }

    #[test]
    fn test_model_crud() {
        let (_, model) = render(&penguins());

        assert!(model.contains("WHERE id = ANY(${sql.array(ids, \"int4\")})"));
        assert!(model.contains("export type FindManyArgs = BaseArgs & { ids: number[] };"));
        assert!(model.contains("return getMany({ connection, ids: ids as Id[] });"));
        assert!(model.contains("} & { id: Id };"));
        assert!(model.contains(
            "      favourite_snack = input.favourite_snack,\n      date_of_birth = input.date_of_birth\n"
        ));
        assert!(model.contains(
            "AS input(id, name, species, waddle_speed_kph, favourite_snack, date_of_birth)"
        ));
        assert!(model.contains("WHERE t.id = input.id\n    RETURNING ${aliasColumns(\"t\")}`;"));
        assert!(model.contains("export { _delete as delete };"));
    }

    #[test]
    fn test_model_index_accessors() {
        let (_, model) = render(&penguins());

        assert!(model.contains("export async function getByName({"));
        assert!(model.contains("}: GetByNameArgs): Promise<Row | null> {"));
        assert!(model.contains("WHERE name = ANY(${sql.array(list, \"text\")})"));

        assert!(model.contains("export type GetManyBySpeciesAndDateOfBirthArgs = BaseArgs & {"));
        assert!(model.contains(
            "  const tuples = columns.map((col) => [\n    col.species,\n    col.date_of_birth.toISOString(),\n  ]);"
        ));
        assert!(model.contains(
            "JOIN ${sql.unnest(tuples, [\"text\", \"timestamptz\"])} AS input(species, date_of_birth)\n      ON  input.species = t.species\n      AND input.date_of_birth = t.date_of_birth`;"
        ));
        assert!(model.contains("}: GetBySpeciesAndDateOfBirthArgs): Promise<readonly Row[]> {"));
        assert!(!model.contains("getManyByNameMap"));
    }

    #[test]
    fn test_model_accessors_on_quoted_columns() {
        let table = penguins()
            .with_column(Column::base("beak length", "numeric"))
            .with_column(Column::base("default", "bool"))
            .with_index(Index::on("penguins_beak_idx", &["beak length"]))
            .with_index(Index::on("penguins_default_idx", &["default", "name"]));
        let (_, model) = render(&table);

        assert!(model.contains(
            "export async function getByBeakLength({\n  connection,\n  \"beak length\": beak_length,\n}: GetByBeakLengthArgs): Promise<readonly Row[]> {\n  const result = await getManyByBeakLength({ connection, columns: [beak_length] });\n"
        ));
        assert!(model.contains("WHERE \"beak length\" = ANY(${sql.array(list, \"numeric\")})"));

        assert!(model.contains(
            "export async function getByDefaultAndName({\n  connection,\n  default: _default,\n  name,\n}: GetByDefaultAndNameArgs)"
        ));
        assert!(model.contains("      {\n        default: _default,\n        name,\n      },\n"));
        assert!(model.contains("      ON  input.\"default\" = t.\"default\"\n"));

        assert!(!model.contains("beak length,"));
        assert!(!model.contains("  default,\n"));
    }

    #[test]
    fn test_model_grouping_map_and_reference_import() {
        let (table, model) = render(&flight_attempts());

        assert!(table.contains("  penguin: z.number().brand<\"public.penguins.id\">(),\n"));
        assert!(model.contains("import { type Row as PenguinsRow } from \"../penguins/table\";\n"));
        assert!(model.contains("  penguin: PenguinsRow[\"id\"];\n"));
        assert!(model.contains("columns: PenguinsRow[\"id\"][];"));
        assert!(model.contains(
            "}: GetManyByPenguinArgs): Promise<Map<PenguinsRow[\"id\"], Row[]>> {"
        ));
        assert!(model.contains("columns.map((key) => [key, []]),"));
        assert!(model.contains("const existing = map.get(row.penguin) ?? [];"));
    }

    #[test]
    fn test_model_without_updatable_columns() {
        let table = Table::new("public", "tickets")
            .with_column(Column::base("id", "int8").primary_key().with_default());
        let (_, model) = render(&table);

        assert!(model.contains("export type Create = Record<string, never>;"));
        assert!(model.contains("SELECT FROM generate_series(1, ${shapes.length})"));
        assert!(!model.contains("updateMany"));
        assert!(model.contains("export type FindManyArgs = BaseArgs & { ids: bigint[] };"));
    }

    #[test]
    fn test_user_types_import_catalogs() {
        let table = penguins().with_column(Column::new(
            "mood",
            TypeKind::Enum,
            TypeName::new("public", "mood"),
        ));
        let (table, model) = render(&table);

        assert!(table.contains("import * as Enums from \"../../enums\";\n"));
        assert!(table.contains("  mood: Enums.Schemas.mood,\n"));
        assert!(model.contains("import * as Enums from \"../../enums\";\n"));
        assert!(model.contains("  mood: Enums.Types.Mood;\n"));
    }

    #[test]
    fn test_shared_modules() {
        let files = TypeScriptGenerator::new().render_shared().unwrap();
        assert_eq!(files[0].path, PathBuf::from("postgres.ts"));
        assert_eq!(files[1].path, PathBuf::from("slonik/type-parsers.ts"));

        let postgres = &files[0].contents;
        assert!(postgres.contains("export namespace Schemas {"));
        assert!(postgres.contains("export const tstzrange = z.custom<Range<Date>>("));
        assert!(postgres.contains("(typeof val.lower === \"number\" || typeof val.upper === \"number\")"));
        assert!(postgres.contains("export type Daterange = z.infer<typeof Schemas.daterange>;"));
        assert!(postgres.contains("export namespace Serializers {"));

        assert!(files[1].contents.contains("export const requiredTypeParsers"));
        assert!(files[1].contents.contains("name: \"int8\""));
    }

    #[test]
    fn test_catalog_modules() {
        let mut schema = Schema::new("public");
        schema.enums.push(EnumType {
            name: "my_enum".to_string(),
            values: vec!["a_value".to_string(), "another_value".to_string()],
        });

        let catalogs = build_catalogs(&schema, &MemoryReporter::new());
        let files = TypeScriptGenerator::new().render_catalog(&catalogs[0]).unwrap();

        assert_eq!(files[0].path, PathBuf::from("public/enums/schemas.ts"));
        assert_eq!(
            files[0].contents,
            "import { z } from \"zod\";\n\nexport const myEnum = z.union([\n  z.literal(\"a_value\"),\n  z.literal(\"another_value\"),\n]);\n"
        );
        assert_eq!(
            files[1].contents,
            "import { z } from \"zod\";\nimport * as Schemas from \"./schemas\";\n\nexport type MyEnum = z.infer<typeof Schemas.myEnum>;\n"
        );
        assert_eq!(
            files[2].contents,
            "export * as Schemas from \"./schemas\";\nexport * as Types from \"./types\";\n"
        );
    }

    #[test]
    fn test_schema_index() {
        let files = TypeScriptGenerator::new()
            .render_schema_index(&SchemaIndex {
                schema_name: "public".to_string(),
                catalogs: vec![crate::codegen::CatalogKind::Enums],
                tables: vec!["flight_attempts".to_string(), "penguins".to_string()],
            })
            .unwrap();

        assert_eq!(files[0].path, PathBuf::from("public/tables/index.ts"));
        assert_eq!(
            files[0].contents,
            "export * as FlightAttempts from \"./flight_attempts\";\nexport * as Penguins from \"./penguins\";\n"
        );
        assert_eq!(
            files[1].contents,
            "export * as Enums from \"./enums\";\nexport * as Tables from \"./tables\";\n"
        );
    }
}
