use crate::error::{ParseError, Result};
use crate::expr::ExprType;
use crate::names::Identifier;

/// Declared width of a string column.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum StringLength {
    Chars(u32),
    Max,
}

/// Default of a datetime column: either a `'YYYYMMDD'` literal or the
/// current timestamp at insert time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DateTimeDefault {
    Literal(String),
    GetDate,
}

/// The six CelestaSQL column variants with their per-variant payload.
#[derive(Debug, Clone, PartialEq)]
pub enum ColumnKind {
    Int { identity: bool, default: Option<i32> },
    Floating { default: Option<f64> },
    Text { length: StringLength, default: Option<String> },
    // The default is a hex lexeme, e.g. `0xFFAAFFAAFF`.
    Binary { default: Option<String> },
    Bool { default: Option<bool> },
    DateTime { default: Option<DateTimeDefault> },
}

/// A column of a table or materialized view. Nullable unless `not_null()`
/// was applied; at most one identity column may exist per table, enforced by
/// the table builder.
#[derive(Debug, Clone, PartialEq)]
pub struct Column {
    name: Identifier,
    nullable: bool,
    kind: ColumnKind,
}

impl Column {
    pub fn new(name: &str, kind: ColumnKind) -> Result<Self> {
        if let ColumnKind::Int {
            identity: true,
            default: Some(_),
        } = kind
        {
            return Err(ParseError::IllegalState {
                detail: format!("identity column {} cannot have an explicit default", name),
            });
        }
        Ok(Self {
            name: Identifier::new(name)?,
            nullable: true,
            kind,
        })
    }

    pub fn not_null(mut self) -> Self {
        self.nullable = false;
        self
    }

    pub fn name(&self) -> &Identifier {
        &self.name
    }

    pub fn nullable(&self) -> bool {
        self.nullable
    }

    pub fn kind(&self) -> &ColumnKind {
        &self.kind
    }

    pub fn is_identity(&self) -> bool {
        matches!(self.kind, ColumnKind::Int { identity: true, .. })
    }

    /// The expression type this column contributes to a view: numeric for
    /// integers and floats, TEXT for strings, BIT for booleans, DATE for
    /// datetimes, BLOB for binaries.
    pub fn expr_type(&self) -> ExprType {
        match self.kind {
            ColumnKind::Int { .. } | ColumnKind::Floating { .. } => ExprType::Numeric,
            ColumnKind::Text { .. } => ExprType::Text,
            ColumnKind::Binary { .. } => ExprType::Blob,
            ColumnKind::Bool { .. } => ExprType::Bit,
            ColumnKind::DateTime { .. } => ExprType::Date,
        }
    }

    /// Canonical rendering of the declared default, `None` when the column
    /// has no default. Dialect adaptors normalize database-reported defaults
    /// to this exact spelling before comparing.
    pub fn default_text(&self) -> Option<String> {
        match &self.kind {
            ColumnKind::Int { default, .. } => default.map(|v| v.to_string()),
            ColumnKind::Floating { default } => default.map(|v| v.to_string()),
            ColumnKind::Text { default, .. } => default.as_ref().map(|v| format!("'{}'", v)),
            ColumnKind::Binary { default } => default.clone(),
            ColumnKind::Bool { default } => {
                default.map(|v| (if v { "TRUE" } else { "FALSE" }).to_string())
            }
            ColumnKind::DateTime { default } => default.as_ref().map(|v| match v {
                DateTimeDefault::Literal(d) => format!("'{}'", d),
                DateTimeDefault::GetDate => "GETDATE()".to_string(),
            }),
        }
    }
}
