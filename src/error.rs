use thiserror::Error;

/// noorm errors
#[derive(Error, Debug)]
pub enum NoormError {
    #[error("Failed to connect to database: {0}")]
    Connection(String),

    #[error("Failed to introspect schema '{schema}': {message}")]
    Introspection { schema: String, message: String },

    #[error(
        "Cannot ignore or set column as readonly when column is not nullable and has no default. Column '{schema}.{table}.{column}'"
    )]
    InvalidIgnoredColumn {
        schema: String,
        table: String,
        column: String,
    },

    #[error("Cannot ignore primary key column '{schema}.{table}.{column}'")]
    IgnoredPrimaryKey {
        schema: String,
        table: String,
        column: String,
    },

    #[error("Table '{schema}.{table}' has no primary key")]
    MissingPrimaryKey { schema: String, table: String },

    #[error(
        "Table '{schema}.{table}' has a composite primary key ({columns}), only single column primary keys are supported. Ignore the table to continue"
    )]
    CompositePrimaryKey {
        schema: String,
        table: String,
        columns: String,
    },

    #[error(
        "Column '{schema}.{table}.{column}' has composite type '{type_name}', composite types are not supported. Ignore the column or table to continue"
    )]
    UnsupportedCompositeType {
        schema: String,
        table: String,
        column: String,
        type_name: String,
    },

    #[error("Could not find column '{column}' of index '{index}' on table '{schema}.{table}'")]
    MissingIndexColumn {
        schema: String,
        table: String,
        index: String,
        column: String,
    },

    #[error("Code generation failed for '{table}': {message}")]
    CodeGen { table: String, message: String },

    #[error("Failed to write output: {0}")]
    Output(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(String),
}
