//! Enum, domain and range modules
//!
//! Each schema gets one catalog module per kind of user type it defines.
//! Empty catalogs produce no module.

use tracing::debug;

use crate::codegen::types::{map_builtin, ModuleRef};
use crate::report::{Reporter, Warning};
use crate::schema::{to_camel_case, to_pascal_case, DomainType, EnumType, RangeType, Schema};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum CatalogKind {
    Enums,
    Domains,
    Ranges,
}

impl CatalogKind {
    /// Directory under the schema directory
    pub fn directory(&self) -> &'static str {
        match self {
            Self::Enums => "enums",
            Self::Domains => "domains",
            Self::Ranges => "ranges",
        }
    }

    /// Namespace the catalog is exported as from the schema barrel
    pub fn namespace(&self) -> &'static str {
        match self {
            Self::Enums => "Enums",
            Self::Domains => "Domains",
            Self::Ranges => "Ranges",
        }
    }
}

/// One exported schema/type pair
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CatalogEntry {
    /// camelCase name of the zod schema
    pub schema_name: String,
    /// PascalCase name of the inferred type
    pub type_name: String,
    pub validation: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CatalogModule {
    pub schema: String,
    pub kind: CatalogKind,
    /// Only `Postgres` today, for domains over json, interval or built-in ranges
    pub imports: Vec<ModuleRef>,
    pub entries: Vec<CatalogEntry>,
}

/// Build the non-empty catalog modules of a schema
pub fn build_catalogs(schema: &Schema, reporter: &dyn Reporter) -> Vec<CatalogModule> {
    let mut catalogs = Vec::new();

    if !schema.enums.is_empty() {
        catalogs.push(CatalogModule {
            schema: schema.name.clone(),
            kind: CatalogKind::Enums,
            imports: Vec::new(),
            entries: schema.enums.iter().map(enum_entry).collect(),
        });
    }

    if !schema.domains.is_empty() {
        let entries: Vec<(CatalogEntry, bool)> = schema
            .domains
            .iter()
            .map(|domain| domain_entry(&schema.name, domain, reporter))
            .collect();

        let imports = if entries.iter().any(|(_, postgres)| *postgres) {
            vec![ModuleRef::Postgres]
        } else {
            Vec::new()
        };

        catalogs.push(CatalogModule {
            schema: schema.name.clone(),
            kind: CatalogKind::Domains,
            imports,
            entries: entries.into_iter().map(|(entry, _)| entry).collect(),
        });
    }

    if !schema.ranges.is_empty() {
        catalogs.push(CatalogModule {
            schema: schema.name.clone(),
            kind: CatalogKind::Ranges,
            imports: Vec::new(),
            entries: schema
                .ranges
                .iter()
                .map(|range| range_entry(&schema.name, range))
                .collect(),
        });
    }

    debug!(schema = ?schema.name, catalogs = catalogs.len(), "Catalogs built");
    catalogs
}

fn entry(name: &str, validation: String) -> CatalogEntry {
    CatalogEntry {
        schema_name: to_camel_case(name),
        type_name: to_pascal_case(name),
        validation,
    }
}

fn enum_entry(enum_type: &EnumType) -> CatalogEntry {
    let literals: Vec<String> = enum_type
        .values
        .iter()
        .map(|value| format!("z.literal({})", quote(value)))
        .collect();

    // z.union needs at least two members
    let validation = match literals.len() {
        0 => "z.never()".to_string(),
        1 => literals[0].clone(),
        _ => format!("z.union([\n  {},\n])", literals.join(",\n  ")),
    };

    entry(&enum_type.name, validation)
}

/// Domain entry, and whether it needs the shared postgres module
fn domain_entry(schema: &str, domain: &DomainType, reporter: &dyn Reporter) -> (CatalogEntry, bool) {
    let inner = map_builtin(&domain.inner_type);
    if inner.untyped {
        reporter.warn(Warning::UntypedDomain {
            schema: schema.to_string(),
            domain: domain.name.clone(),
            type_name: domain.inner_type.full_name(),
        });
    }

    let validation = format!(
        "{}.brand<\"{}.domains.{}\">()",
        inner.validation, schema, domain.name
    );
    let postgres = inner.module == Some(ModuleRef::Postgres);
    (entry(&domain.name, validation), postgres)
}

fn range_entry(schema: &str, range: &RangeType) -> CatalogEntry {
    entry(
        &range.name,
        format!("z.string().brand<\"{}.ranges.{}\">()", schema, range.name),
    )
}

/// A double quoted TypeScript string literal
pub fn quote(value: &str) -> String {
    let mut quoted = String::with_capacity(value.len() + 2);
    quoted.push('"');
    for c in value.chars() {
        match c {
            '"' => quoted.push_str("\\\""),
            '\\' => quoted.push_str("\\\\"),
            '\n' => quoted.push_str("\\n"),
            '\r' => quoted.push_str("\\r"),
            '\t' => quoted.push_str("\\t"),
            c => quoted.push(c),
        }
    }
    quoted.push('"');
    quoted
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::report::MemoryReporter;
    use crate::schema::TypeName;

    fn schema() -> Schema {
        let mut schema = Schema::new("public");
        schema.enums.push(EnumType {
            name: "my_enum".to_string(),
            values: vec!["a_value".to_string(), "another_value".to_string()],
        });
        schema.domains.push(DomainType {
            name: "text_short".to_string(),
            inner_type: TypeName::catalog("text"),
        });
        schema.ranges.push(RangeType {
            name: "float_range".to_string(),
            subtype: TypeName::catalog("float8"),
        });
        schema
    }

    #[test]
    fn test_catalogs_for_each_kind() {
        let catalogs = build_catalogs(&schema(), &MemoryReporter::new());
        let kinds: Vec<_> = catalogs.iter().map(|c| c.kind).collect();
        assert_eq!(
            kinds,
            vec![CatalogKind::Enums, CatalogKind::Domains, CatalogKind::Ranges]
        );

        let enums = &catalogs[0].entries[0];
        assert_eq!(enums.schema_name, "myEnum");
        assert_eq!(enums.type_name, "MyEnum");
        assert_eq!(
            enums.validation,
            "z.union([\n  z.literal(\"a_value\"),\n  z.literal(\"another_value\"),\n])"
        );

        assert_eq!(
            catalogs[1].entries[0].validation,
            "z.string().brand<\"public.domains.text_short\">()"
        );
        assert_eq!(
            catalogs[2].entries[0].validation,
            "z.string().brand<\"public.ranges.float_range\">()"
        );
    }

    #[test]
    fn test_empty_schema_has_no_catalogs() {
        let catalogs = build_catalogs(&Schema::new("public"), &MemoryReporter::new());
        assert!(catalogs.is_empty());
    }

    #[test]
    fn test_single_value_enum() {
        let entry = enum_entry(&EnumType {
            name: "only".to_string(),
            values: vec!["one".to_string()],
        });
        assert_eq!(entry.validation, "z.literal(\"one\")");
    }

    #[test]
    fn test_domain_over_json_imports_postgres() {
        let mut schema = Schema::new("public");
        schema.domains.push(DomainType {
            name: "settings".to_string(),
            inner_type: TypeName::catalog("jsonb"),
        });

        let catalogs = build_catalogs(&schema, &MemoryReporter::new());
        assert_eq!(catalogs[0].imports, vec![ModuleRef::Postgres]);
        assert_eq!(
            catalogs[0].entries[0].validation,
            "Postgres.Schemas.json.brand<\"public.domains.settings\">()"
        );
    }

    #[test]
    fn test_untyped_domain_warns() {
        let mut schema = Schema::new("public");
        schema.domains.push(DomainType {
            name: "spot".to_string(),
            inner_type: TypeName::catalog("point"),
        });

        let reporter = MemoryReporter::new();
        let catalogs = build_catalogs(&schema, &reporter);
        assert_eq!(
            catalogs[0].entries[0].validation,
            "z.any().brand<\"public.domains.spot\">()"
        );
        assert!(matches!(reporter.warnings()[0], Warning::UntypedDomain { .. }));
    }

    #[test]
    fn test_quote_escapes() {
        assert_eq!(quote("it's \"fine\""), "\"it's \\\"fine\\\"\"");
        assert_eq!(quote("back\\slash"), "\"back\\\\slash\"");
    }
}
