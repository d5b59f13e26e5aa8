//! # noorm
//!
//! Generate typed data access code from database schemas
//!
//! This crate provides a CLI tool and library for introspecting PostgreSQL
//! schemas and generating zod + slonik TypeScript modules: a row descriptor,
//! bulk CRUD operations and index accessors per table.

pub mod codegen;
pub mod commit;
pub mod config;
pub mod error;
pub mod introspect;
pub mod report;
pub mod schema;

pub mod prelude {
    pub use crate::codegen::{generate, CodeGenerator, GeneratedFile, TypeScriptGenerator};
    pub use crate::commit::{commit, CommitSummary, Staging};
    pub use crate::config::resolve::{resolve, Ignorable, ResolvedConfig};
    pub use crate::config::{NoormConfig, Settings};
    pub use crate::error::NoormError;
    pub use crate::introspect::{Introspector, SchemaFilter};
    pub use crate::report::{MemoryReporter, Reporter, TracingReporter, Warning};
    pub use crate::schema::{
        Column, ColumnReference, Index, IndexColumn, Schema, SchemaMetadata, Table, TypeKind,
        TypeName,
    };
}

#[cfg(feature = "postgres")]
pub use introspect::PostgresIntrospector;
