use crate::error::{ParseError, Result};
use crate::names::Identifier;
use crate::table::TableBuilder;

/// Referential action on update/delete of a referenced row.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum FkRule {
    NoAction,
    Cascade,
    SetNull,
}

/// A resolved foreign key of a table. The referenced table is kept as a
/// `(grain, table)` name pair; `ScoreBuilder::build` has already verified
/// that the referenced columns are exactly that table's primary key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ForeignKey {
    pub(crate) name: Identifier,
    pub(crate) columns: Vec<String>,
    pub(crate) referenced_grain: Identifier,
    pub(crate) referenced_table: Identifier,
    pub(crate) referenced_columns: Vec<String>,
    pub(crate) on_update: FkRule,
    pub(crate) on_delete: FkRule,
}

impl ForeignKey {
    pub fn name(&self) -> &Identifier {
        &self.name
    }

    /// Local column names, in declaration order.
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn referenced_grain(&self) -> &Identifier {
        &self.referenced_grain
    }

    pub fn referenced_table(&self) -> &Identifier {
        &self.referenced_table
    }

    pub fn referenced_columns(&self) -> &[String] {
        &self.referenced_columns
    }

    pub fn on_update(&self) -> FkRule {
        self.on_update
    }

    pub fn on_delete(&self) -> FkRule {
        self.on_delete
    }
}

/// A foreign key registered with its parent table but not yet resolved
/// against the referenced table. Resolution happens once, when the score is
/// built.
#[derive(Debug, Clone)]
pub(crate) struct PendingFk {
    pub name: Identifier,
    pub columns: Vec<String>,
    pub referenced_grain: Identifier,
    pub referenced_table: Identifier,
    pub referenced_columns: Vec<String>,
    pub on_update: FkRule,
    pub on_delete: FkRule,
}

/// Builds one foreign key: collect local columns (validated against the
/// parent as they are added), then `set_referenced_table` to register the
/// key with the parent. The referenced table stays unresolved until the
/// score is built.
#[derive(Debug)]
pub struct ForeignKeyBuilder {
    name: Identifier,
    columns: Vec<String>,
    referenced_columns: Vec<String>,
    on_update: FkRule,
    on_delete: FkRule,
}

impl ForeignKeyBuilder {
    pub fn new(name: &str) -> Result<Self> {
        Ok(Self {
            name: Identifier::new(name)?,
            columns: Vec::new(),
            referenced_columns: Vec::new(),
            on_update: FkRule::NoAction,
            on_delete: FkRule::NoAction,
        })
    }

    /// Append a local column by name. The column must exist on the parent
    /// table and may appear only once.
    pub fn add_column(&mut self, parent: &TableBuilder, column: &str) -> Result<()> {
        if parent.column(column).is_none() {
            return Err(ParseError::UnknownColumn {
                table: parent.name().to_string(),
                column: column.to_string(),
            });
        }
        if self.columns.iter().any(|c| c == column) {
            return Err(ParseError::DuplicateColumn {
                table: parent.name().to_string(),
                column: column.to_string(),
            });
        }
        self.columns.push(column.to_string());
        Ok(())
    }

    pub fn add_referenced_column(&mut self, column: &str) -> Result<()> {
        let column = Identifier::new(column)?;
        if self.referenced_columns.iter().any(|c| c == column.as_str()) {
            return Err(ParseError::DuplicateColumn {
                table: "<referenced>".to_string(),
                column: column.to_string(),
            });
        }
        self.referenced_columns.push(column.to_string());
        Ok(())
    }

    pub fn set_rules(&mut self, on_update: FkRule, on_delete: FkRule) {
        self.on_update = on_update;
        self.on_delete = on_delete;
    }

    /// Register this key with its parent table, pointing at
    /// `grain.table`. Consumes the builder; the parent's foreign key set
    /// grows by one, while the referenced table remains unresolved until
    /// the score is built.
    pub fn set_referenced_table(self, parent: &mut TableBuilder, grain: &str, table: &str) -> Result<()> {
        if self.columns.is_empty() {
            return Err(ParseError::IllegalState {
                detail: format!("foreign key {} has no columns", self.name),
            });
        }
        if matches!(self.on_update, FkRule::SetNull) || matches!(self.on_delete, FkRule::SetNull) {
            for column in &self.columns {
                let col = parent.column(column).expect("validated by add_column");
                if !col.nullable() {
                    return Err(ParseError::IllegalState {
                        detail: format!(
                            "foreign key {} uses SET NULL but column {} is not nullable",
                            self.name, column
                        ),
                    });
                }
            }
        }
        parent.push_fk(PendingFk {
            name: self.name,
            columns: self.columns,
            referenced_grain: Identifier::new(grain)?,
            referenced_table: Identifier::new(table)?,
            referenced_columns: self.referenced_columns,
            on_update: self.on_update,
            on_delete: self.on_delete,
        })
    }
}

#[cfg(test)]
mod test {
    use super::{FkRule, ForeignKeyBuilder};
    use crate::column::{Column, ColumnKind};
    use crate::error::ParseError;
    use crate::table::TableBuilder;

    fn parent() -> TableBuilder {
        let mut table = TableBuilder::new("g1", "t1").unwrap();
        table
            .add_column(
                Column::new("id", ColumnKind::Int { identity: false, default: None })
                    .unwrap()
                    .not_null(),
            )
            .unwrap();
        table
            .add_column(Column::new("ref_id", ColumnKind::Int { identity: false, default: None }).unwrap())
            .unwrap();
        table.add_pk_column("id").unwrap();
        table.finalize_pk().unwrap();
        table
    }

    #[test]
    fn test_add_column_rules() {
        let table = parent();
        let mut fk = ForeignKeyBuilder::new("fk_1").unwrap();

        match fk.add_column(&table, "nope").unwrap_err() {
            ParseError::UnknownColumn { column, .. } => assert_eq!(column, "nope"),
            other => panic!("unexpected error {other:?}"),
        }

        fk.add_column(&table, "ref_id").unwrap();
        match fk.add_column(&table, "ref_id").unwrap_err() {
            ParseError::DuplicateColumn { column, .. } => assert_eq!(column, "ref_id"),
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn test_empty_fk_cannot_register() {
        let mut table = parent();
        let fk = ForeignKeyBuilder::new("fk_1").unwrap();
        fk.set_referenced_table(&mut table, "g1", "t2").unwrap_err();
        assert_eq!(table.fk_count(), 0);
    }

    #[test]
    fn test_set_null_requires_nullable_columns() {
        let mut table = parent();
        let mut fk = ForeignKeyBuilder::new("fk_1").unwrap();
        fk.add_column(&table, "id").unwrap();
        fk.set_rules(FkRule::NoAction, FkRule::SetNull);
        fk.set_referenced_table(&mut table, "g1", "t2").unwrap_err();

        let mut fk = ForeignKeyBuilder::new("fk_2").unwrap();
        fk.add_column(&table, "ref_id").unwrap();
        fk.set_rules(FkRule::NoAction, FkRule::SetNull);
        fk.set_referenced_table(&mut table, "g1", "t2").unwrap();
        assert_eq!(table.fk_count(), 1);
    }
}
