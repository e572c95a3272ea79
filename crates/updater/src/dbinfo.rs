//! What the database actually contains, as reported by the dialect adaptor.
//! Each DTO carries already-normalized text (the adaptor canonicalizes
//! dialect spellings of defaults before handing the DTO over), and its
//! `reflects` predicate is the sole oracle of "no DDL needed".

use score::{
    Column, ColumnKind, FkRule, ForeignKey, GrainElement, Index, SequenceDef, StringLength,
    TableElement,
};

/// Discriminant of a column's physical type, dialect-mapped back to the
/// CelestaSQL column kinds.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum DbColumnType {
    Int,
    Real,
    Text,
    Binary,
    Bit,
    DateTime,
}

impl DbColumnType {
    pub fn of(column: &Column) -> DbColumnType {
        match column.kind() {
            ColumnKind::Int { .. } => DbColumnType::Int,
            ColumnKind::Floating { .. } => DbColumnType::Real,
            ColumnKind::Text { .. } => DbColumnType::Text,
            ColumnKind::Binary { .. } => DbColumnType::Binary,
            ColumnKind::Bool { .. } => DbColumnType::Bit,
            ColumnKind::DateTime { .. } => DbColumnType::DateTime,
        }
    }
}

/// Shape of one live column.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DbColumnInfo {
    pub name: String,
    pub col_type: DbColumnType,
    pub nullable: bool,
    pub identity: bool,
    /// For text columns: declared width, or `max` when unbounded.
    pub length: u32,
    pub max: bool,
    /// Canonical default text; empty when the column has no default.
    pub default_value: String,
}

impl DbColumnInfo {
    pub fn reflects(&self, column: &Column) -> bool {
        if self.name != column.name().as_str()
            || self.col_type != DbColumnType::of(column)
            || self.nullable != column.nullable()
            || self.identity != column.is_identity()
        {
            return false;
        }
        if let ColumnKind::Text { length, .. } = column.kind() {
            match length {
                StringLength::Max if !self.max => return false,
                StringLength::Chars(n) if self.max || self.length != *n => return false,
                _ => (),
            }
        }
        self.default_value == column.default_text().unwrap_or_default()
    }
}

/// Shape of one live primary key. An empty column list means the table has
/// no primary key.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct DbPkInfo {
    pub name: String,
    pub column_names: Vec<String>,
}

impl DbPkInfo {
    pub fn is_empty(&self) -> bool {
        self.column_names.is_empty()
    }

    pub fn reflects(&self, table: &dyn TableElement) -> bool {
        !self.is_empty()
            && self.name == table.pk_constraint_name()
            && self.column_names == table.pk_column_names()
    }
}

/// Shape of one live foreign key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DbFkInfo {
    pub table_name: String,
    pub name: String,
    pub column_names: Vec<String>,
    pub ref_grain: String,
    pub ref_table: String,
    pub update_rule: FkRule,
    pub delete_rule: FkRule,
}

impl DbFkInfo {
    pub fn reflects(&self, fk: &ForeignKey) -> bool {
        self.name == fk.name().as_str()
            && self.column_names == fk.columns()
            && self.ref_grain == fk.referenced_grain().as_str()
            && self.ref_table == fk.referenced_table().as_str()
            && self.update_rule == fk.on_update()
            && self.delete_rule == fk.on_delete()
    }
}

/// Shape of one live index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DbIndexInfo {
    pub table_name: String,
    pub index_name: String,
    pub column_names: Vec<String>,
}

impl DbIndexInfo {
    pub fn reflects(&self, index: &Index) -> bool {
        self.index_name == index.name().as_str()
            && self.table_name == index.table_name().as_str()
            && self.column_names == index.columns()
    }
}

/// Shape of one live sequence. The start value is deliberately absent: it
/// cannot be altered in place and is only meaningful at creation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DbSequenceInfo {
    pub increment_by: i64,
    pub min_value: i64,
    pub max_value: i64,
    pub cycle: bool,
}

impl DbSequenceInfo {
    pub fn reflects(&self, sequence: &SequenceDef) -> bool {
        self.increment_by == sequence.increment_by()
            && self.min_value == sequence.min_value()
            && self.max_value == sequence.max_value()
            && self.cycle == sequence.cycle()
    }
}
