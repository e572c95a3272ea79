/// ParseError is the failure taxonomy of schema construction and validation.
/// Every fallible operation on builders, expressions and the finalized score
/// reports one of these; the updater wraps them unchanged.
#[derive(thiserror::Error, Debug)]
pub enum ParseError {
    #[error("{name:?} is not a legal identifier: {detail}")]
    BadIdentifier { name: String, detail: String },

    #[error("malformed version string {input:?}: {detail}")]
    MalformedVersion { input: String, detail: String },

    #[error("field reference {field} cannot be resolved against the FROM clause")]
    UnresolvedField { field: String },

    #[error("field reference {field} is ambiguous")]
    AmbiguousField { field: String },

    #[error("type mismatch: {detail}")]
    TypeMismatch { detail: String },

    #[error("table {table} already has a column named {column}")]
    DuplicateColumn { table: String, column: String },

    #[error("table {table} has no column named {column}")]
    UnknownColumn { table: String, column: String },

    #[error("table {table} has no primary key")]
    MissingPk { table: String },

    #[error(
        "foreign key of table {table} must reference the primary key of {referenced_table}, in order"
    )]
    FkReferencedColumnsNotPk {
        table: String,
        referenced_table: String,
    },

    #[error("cyclic reference between grains, starting from grain {grain}")]
    CyclicGrainDependency { grain: String },

    #[error("illegal state: {detail}")]
    IllegalState { detail: String },

    #[error("grain {grain} is not defined in the score")]
    UnknownGrain { grain: String },

    #[error("grain {grain} has no element named {element}")]
    UnknownElement { grain: String, element: String },

    #[error("grain {grain} already has an element named {element}")]
    DuplicateElement { grain: String, element: String },

    #[error("malformed expression: {detail}")]
    MalformedExpression { detail: String },
}

pub type Result<T> = std::result::Result<T, ParseError>;
