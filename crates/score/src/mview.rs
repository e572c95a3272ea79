use crate::column::{Column, ColumnKind};
use crate::error::{ParseError, Result};
use crate::names::Identifier;
use crate::reference::{ElementKind, GrainElement, GrainElementRef, TableElement};
use crate::table::Table;
use indexmap::IndexMap;
use itertools::Itertools;

/// Source of one materialized view column: a grouping column of the source
/// table, a SUM over a numeric column, or a row COUNT.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MvColumnSource {
    Field(Identifier),
    Sum(Identifier),
    Count,
}

/// A materialized view: an aggregate over a single same-grain source table,
/// physically a table maintained by triggers on the source. The grouping
/// columns form its primary key. Freshness is tracked by a checksum over
/// the canonical definition, embedded as a marker comment in the source
/// table's POST_INSERT trigger.
#[derive(Debug, Clone, PartialEq)]
pub struct MaterializedView {
    grain_name: Identifier,
    name: Identifier,
    ref_table: Identifier,
    sources: Vec<(String, MvColumnSource)>,
    columns: IndexMap<String, Column>,
    group_by: Vec<String>,
    checksum: u32,
}

impl MaterializedView {
    /// The same-grain table this view aggregates.
    pub fn ref_table(&self) -> &Identifier {
        &self.ref_table
    }

    /// Select list in declaration order: result column name and its source.
    pub fn sources(&self) -> &[(String, MvColumnSource)] {
        &self.sources
    }

    /// CRC-32 over the canonical definition; stored in the trigger marker.
    pub fn checksum(&self) -> u32 {
        self.checksum
    }

    /// Canonical CelestaSQL of the defining query.
    pub fn csql(&self) -> String {
        let select = self
            .sources
            .iter()
            .map(|(alias, source)| match source {
                MvColumnSource::Field(column) => format!("{} AS {}", column, alias),
                MvColumnSource::Sum(column) => format!("SUM({}) AS {}", column, alias),
                MvColumnSource::Count => format!("COUNT(*) AS {}", alias),
            })
            .join(", ");
        format!(
            "SELECT {} FROM {}.{} GROUP BY {}",
            select,
            self.grain_name,
            self.ref_table,
            self.group_by.iter().join(", ")
        )
    }
}

impl GrainElement for MaterializedView {
    fn grain_name(&self) -> &Identifier {
        &self.grain_name
    }

    fn name(&self) -> &Identifier {
        &self.name
    }

    fn kind(&self) -> ElementKind {
        ElementKind::MaterializedView
    }

    fn references(&self) -> Vec<GrainElementRef> {
        vec![GrainElementRef {
            grain_name: self.grain_name.clone(),
            element_name: self.ref_table.clone(),
            kind: ElementKind::Table,
        }]
    }
}

impl TableElement for MaterializedView {
    fn columns(&self) -> &IndexMap<String, Column> {
        &self.columns
    }

    fn pk_column_names(&self) -> &[String] {
        &self.group_by
    }
}

#[derive(Debug)]
pub struct MaterializedViewBuilder {
    grain_name: Identifier,
    name: Identifier,
    ref_table: Identifier,
    columns: Vec<(Identifier, MvColumnSource, bool)>,
}

impl MaterializedViewBuilder {
    pub fn new(grain_name: &str, name: &str, ref_table: &str) -> Result<Self> {
        Ok(Self {
            grain_name: Identifier::new(grain_name)?,
            name: Identifier::new(name)?,
            ref_table: Identifier::new(ref_table)?,
            columns: Vec::new(),
        })
    }

    pub fn name(&self) -> &Identifier {
        &self.name
    }

    pub(crate) fn grain_name(&self) -> &Identifier {
        &self.grain_name
    }

    pub fn ref_table(&self) -> &Identifier {
        &self.ref_table
    }

    /// Add a grouping column, carried over from the source table by name.
    pub fn add_group_by_column(&mut self, alias: &str, source_column: &str) -> Result<()> {
        let source = MvColumnSource::Field(Identifier::new(source_column)?);
        self.push_column(alias, source, true)
    }

    pub fn add_sum_column(&mut self, alias: &str, source_column: &str) -> Result<()> {
        let source = MvColumnSource::Sum(Identifier::new(source_column)?);
        self.push_column(alias, source, false)
    }

    pub fn add_count_column(&mut self, alias: &str) -> Result<()> {
        self.push_column(alias, MvColumnSource::Count, false)
    }

    fn push_column(&mut self, alias: &str, source: MvColumnSource, group_by: bool) -> Result<()> {
        let alias = Identifier::new(alias)?;
        if self.columns.iter().any(|(existing, _, _)| *existing == alias) {
            return Err(ParseError::DuplicateColumn {
                table: self.name.to_string(),
                column: alias.to_string(),
            });
        }
        self.columns.push((alias, source, group_by));
        Ok(())
    }

    /// Derive the concrete column set from the frozen source table.
    pub(crate) fn resolve(self, source: &Table) -> Result<MaterializedView> {
        let mut columns = IndexMap::new();
        let mut sources = Vec::with_capacity(self.columns.len());
        let mut group_by = Vec::new();

        for (alias, column_source, is_group_by) in self.columns {
            let column = match &column_source {
                MvColumnSource::Field(source_column) => {
                    let src = source.column(source_column).ok_or_else(|| {
                        ParseError::UnknownColumn {
                            table: source.name().to_string(),
                            column: source_column.to_string(),
                        }
                    })?;
                    if is_group_by && src.nullable() {
                        return Err(ParseError::IllegalState {
                            detail: format!(
                                "materialized view {} groups by nullable column {}",
                                self.name, source_column
                            ),
                        });
                    }
                    // Identity is a property of the source table, not of the
                    // aggregate copy.
                    let kind = match src.kind().clone() {
                        ColumnKind::Int { default, .. } => ColumnKind::Int {
                            identity: false,
                            default,
                        },
                        other => other,
                    };
                    let column = Column::new(&alias, kind)?;
                    if src.nullable() { column } else { column.not_null() }
                }
                MvColumnSource::Sum(source_column) => {
                    let src = source.column(source_column).ok_or_else(|| {
                        ParseError::UnknownColumn {
                            table: source.name().to_string(),
                            column: source_column.to_string(),
                        }
                    })?;
                    match src.kind() {
                        ColumnKind::Int { .. } => Column::new(
                            &alias,
                            ColumnKind::Int {
                                identity: false,
                                default: None,
                            },
                        )?
                        .not_null(),
                        ColumnKind::Floating { .. } => {
                            Column::new(&alias, ColumnKind::Floating { default: None })?.not_null()
                        }
                        _ => {
                            return Err(ParseError::TypeMismatch {
                                detail: format!(
                                    "materialized view {}: SUM requires a numeric column, {} is not",
                                    self.name, source_column
                                ),
                            })
                        }
                    }
                }
                MvColumnSource::Count => Column::new(
                    &alias,
                    ColumnKind::Int {
                        identity: false,
                        default: None,
                    },
                )?
                .not_null(),
            };

            if is_group_by {
                group_by.push(alias.to_string());
            }
            sources.push((alias.to_string(), column_source));
            columns.insert(alias.to_string(), column);
        }

        if group_by.is_empty() {
            return Err(ParseError::MissingPk {
                table: self.name.to_string(),
            });
        }

        let mut view = MaterializedView {
            grain_name: self.grain_name,
            name: self.name,
            ref_table: self.ref_table,
            sources,
            columns,
            group_by,
            checksum: 0,
        };
        view.checksum = crc32fast::hash(view.csql().as_bytes());
        Ok(view)
    }
}
