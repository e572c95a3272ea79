use crate::column::{Column, ColumnKind, StringLength};
use crate::error::{ParseError, Result};
use crate::fk::{ForeignKey, PendingFk};
use crate::names::Identifier;
use crate::reference::{ElementKind, GrainElement, GrainElementRef, TableElement};
use indexmap::IndexMap;

/// A finalized table: ordered columns, a non-empty primary key, resolved
/// foreign keys. Structurally immutable; all mutation happens on
/// [`TableBuilder`] before the score is built.
#[derive(Debug, Clone, PartialEq)]
pub struct Table {
    grain_name: Identifier,
    name: Identifier,
    columns: IndexMap<String, Column>,
    pk: Vec<String>,
    foreign_keys: Vec<ForeignKey>,
    autoupdate: bool,
    versioned: bool,
}

impl Table {
    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.get(name)
    }

    pub fn foreign_keys(&self) -> &[ForeignKey] {
        &self.foreign_keys
    }

    /// Whether the updater may touch this table's DDL.
    pub fn autoupdate(&self) -> bool {
        self.autoupdate
    }

    /// Whether the table carries a `recversion` column and versioning
    /// trigger for optimistic locking.
    pub fn versioned(&self) -> bool {
        self.versioned
    }

    pub fn in_pk(&self, column: &str) -> bool {
        self.pk.iter().any(|c| c == column)
    }
}

impl GrainElement for Table {
    fn grain_name(&self) -> &Identifier {
        &self.grain_name
    }

    fn name(&self) -> &Identifier {
        &self.name
    }

    fn kind(&self) -> ElementKind {
        ElementKind::Table
    }

    fn references(&self) -> Vec<GrainElementRef> {
        self.foreign_keys
            .iter()
            .map(|fk| GrainElementRef {
                grain_name: fk.referenced_grain().clone(),
                element_name: fk.referenced_table().clone(),
                kind: ElementKind::Table,
            })
            .collect()
    }
}

impl TableElement for Table {
    fn columns(&self) -> &IndexMap<String, Column> {
        &self.columns
    }

    fn pk_column_names(&self) -> &[String] {
        &self.pk
    }

    fn versioned(&self) -> bool {
        self.versioned
    }
}

/// Table under construction. Columns and primary key parts accumulate until
/// `finalize_pk`, which fences off structural mutation; foreign keys are
/// registered through [`crate::ForeignKeyBuilder::set_referenced_table`] and
/// resolved when the score is built.
#[derive(Debug)]
pub struct TableBuilder {
    grain_name: Identifier,
    name: Identifier,
    columns: IndexMap<String, Column>,
    pk: Vec<String>,
    pk_finalized: bool,
    pending_fks: Vec<PendingFk>,
    autoupdate: bool,
    versioned: bool,
}

impl TableBuilder {
    pub fn new(grain_name: &str, name: &str) -> Result<Self> {
        Ok(Self {
            grain_name: Identifier::new(grain_name)?,
            name: Identifier::new(name)?,
            columns: IndexMap::new(),
            pk: Vec::new(),
            pk_finalized: false,
            pending_fks: Vec::new(),
            autoupdate: true,
            versioned: false,
        })
    }

    pub fn name(&self) -> &Identifier {
        &self.name
    }

    pub(crate) fn grain_name(&self) -> &Identifier {
        &self.grain_name
    }

    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.get(name)
    }

    pub fn set_autoupdate(&mut self, autoupdate: bool) {
        self.autoupdate = autoupdate;
    }

    pub fn set_versioned(&mut self, versioned: bool) {
        self.versioned = versioned;
    }

    pub fn add_column(&mut self, column: Column) -> Result<()> {
        self.check_not_finalized()?;
        if column.is_identity() && self.columns.values().any(Column::is_identity) {
            return Err(ParseError::IllegalState {
                detail: format!("table {} already has an identity column", self.name),
            });
        }
        let name = column.name().to_string();
        if self.columns.contains_key(&name) {
            return Err(ParseError::DuplicateColumn {
                table: self.name.to_string(),
                column: name,
            });
        }
        self.columns.insert(name, column);
        Ok(())
    }

    /// Append a column to the primary key. The column must already exist,
    /// be non-nullable, and be of a kind a key can be built over.
    pub fn add_pk_column(&mut self, name: &str) -> Result<()> {
        self.check_not_finalized()?;
        let column = self
            .columns
            .get(name)
            .ok_or_else(|| ParseError::UnknownColumn {
                table: self.name.to_string(),
                column: name.to_string(),
            })?;
        if column.nullable() {
            return Err(ParseError::IllegalState {
                detail: format!(
                    "column {} of table {} is nullable and cannot be part of the primary key",
                    name, self.name
                ),
            });
        }
        match column.kind() {
            ColumnKind::Binary { .. } => {
                return Err(ParseError::IllegalState {
                    detail: format!(
                        "binary column {} of table {} cannot be part of the primary key",
                        name, self.name
                    ),
                })
            }
            ColumnKind::Text {
                length: StringLength::Max,
                ..
            } => {
                return Err(ParseError::IllegalState {
                    detail: format!(
                        "text(max) column {} of table {} cannot be part of the primary key",
                        name, self.name
                    ),
                })
            }
            _ => (),
        }
        if self.pk.iter().any(|c| c == name) {
            return Err(ParseError::DuplicateColumn {
                table: self.name.to_string(),
                column: name.to_string(),
            });
        }
        self.pk.push(name.to_string());
        Ok(())
    }

    /// Close the primary key. Must be called exactly once per table, after
    /// which structural mutation fails.
    pub fn finalize_pk(&mut self) -> Result<()> {
        if self.pk_finalized {
            return Err(ParseError::IllegalState {
                detail: format!("primary key of table {} is already finalized", self.name),
            });
        }
        if self.pk.is_empty() {
            return Err(ParseError::MissingPk {
                table: self.name.to_string(),
            });
        }
        self.pk_finalized = true;
        Ok(())
    }

    pub(crate) fn push_fk(&mut self, fk: PendingFk) -> Result<()> {
        if self.pending_fks.iter().any(|existing| existing.name == fk.name) {
            return Err(ParseError::IllegalState {
                detail: format!(
                    "table {} already has a foreign key named {}",
                    self.name, fk.name
                ),
            });
        }
        self.pending_fks.push(fk);
        Ok(())
    }

    /// Number of foreign keys registered so far, resolved or not.
    pub fn fk_count(&self) -> usize {
        self.pending_fks.len()
    }

    fn check_not_finalized(&self) -> Result<()> {
        if self.pk_finalized {
            return Err(ParseError::IllegalState {
                detail: format!(
                    "table {} is finalized and cannot be structurally modified",
                    self.name
                ),
            });
        }
        Ok(())
    }

    /// Freeze into a table with still-pending foreign keys; the score
    /// builder resolves them against the full grain set.
    pub(crate) fn freeze(self) -> Result<(Table, Vec<PendingFk>)> {
        if !self.pk_finalized {
            return Err(ParseError::MissingPk {
                table: self.name.to_string(),
            });
        }
        Ok((
            Table {
                grain_name: self.grain_name,
                name: self.name,
                columns: self.columns,
                pk: self.pk,
                foreign_keys: Vec::new(),
                autoupdate: self.autoupdate,
                versioned: self.versioned,
            },
            self.pending_fks,
        ))
    }

    pub(crate) fn attach_fk(table: &mut Table, fk: ForeignKey) {
        table.foreign_keys.push(fk);
    }

    #[cfg(test)]
    pub(crate) fn build_for_test(self) -> Table {
        let (table, _) = self.freeze().unwrap();
        table
    }
}
