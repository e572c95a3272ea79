use crate::error::{ParseError, Result};
use crate::expr::{Expr, ExprType, FromTarget};
use crate::names::Identifier;
use crate::reference::{ElementKind, GrainElement, GrainElementRef};
use crate::table::Table;
use indexmap::IndexMap;
use itertools::Itertools;

/// One FROM clause entry of a view: a table of some grain under an alias.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FromTable {
    pub grain_name: Identifier,
    pub table_name: Identifier,
    pub alias: Identifier,
}

/// A finalized view: a select list of typed expressions over a FROM clause,
/// with an optional WHERE predicate. All field references are resolved and
/// type-checked.
#[derive(Debug, Clone, PartialEq)]
pub struct View {
    grain_name: Identifier,
    name: Identifier,
    from: Vec<FromTable>,
    columns: IndexMap<String, Expr>,
    where_clause: Option<Expr>,
}

impl View {
    pub fn from_tables(&self) -> &[FromTable] {
        &self.from
    }

    pub fn columns(&self) -> &IndexMap<String, Expr> {
        &self.columns
    }

    pub fn column_type(&self, name: &str) -> Option<ExprType> {
        self.columns.get(name).map(Expr::expr_type)
    }

    pub fn where_clause(&self) -> Option<&Expr> {
        self.where_clause.as_ref()
    }

    /// Canonical CelestaSQL of the whole query; feeds dialect DDL and the
    /// grain checksum.
    pub fn csql(&self) -> String {
        render_query(&self.columns, &self.from, self.where_clause.as_ref())
    }
}

impl GrainElement for View {
    fn grain_name(&self) -> &Identifier {
        &self.grain_name
    }

    fn name(&self) -> &Identifier {
        &self.name
    }

    fn kind(&self) -> ElementKind {
        ElementKind::View
    }

    fn references(&self) -> Vec<GrainElementRef> {
        from_references(&self.from)
    }
}

/// A view taking typed parameters, recreated on every upgrade like a plain
/// view. Parameters are declared here; their use sites live inside the
/// dialect rendering, which is out of this crate's scope.
#[derive(Debug, Clone, PartialEq)]
pub struct ParameterizedView {
    grain_name: Identifier,
    name: Identifier,
    parameters: IndexMap<String, ExprType>,
    from: Vec<FromTable>,
    columns: IndexMap<String, Expr>,
    where_clause: Option<Expr>,
}

impl ParameterizedView {
    pub fn parameters(&self) -> &IndexMap<String, ExprType> {
        &self.parameters
    }

    pub fn from_tables(&self) -> &[FromTable] {
        &self.from
    }

    pub fn columns(&self) -> &IndexMap<String, Expr> {
        &self.columns
    }

    pub fn where_clause(&self) -> Option<&Expr> {
        self.where_clause.as_ref()
    }

    pub fn csql(&self) -> String {
        render_query(&self.columns, &self.from, self.where_clause.as_ref())
    }
}

impl GrainElement for ParameterizedView {
    fn grain_name(&self) -> &Identifier {
        &self.grain_name
    }

    fn name(&self) -> &Identifier {
        &self.name
    }

    fn kind(&self) -> ElementKind {
        ElementKind::ParameterizedView
    }

    fn references(&self) -> Vec<GrainElementRef> {
        from_references(&self.from)
    }
}

fn from_references(from: &[FromTable]) -> Vec<GrainElementRef> {
    from.iter()
        .map(|entry| GrainElementRef {
            grain_name: entry.grain_name.clone(),
            element_name: entry.table_name.clone(),
            kind: ElementKind::Table,
        })
        .collect()
}

fn render_query(
    columns: &IndexMap<String, Expr>,
    from: &[FromTable],
    where_clause: Option<&Expr>,
) -> String {
    let select = columns
        .iter()
        .map(|(alias, expr)| format!("{} AS {}", expr.csql(), alias))
        .join(", ");
    let from = from
        .iter()
        .map(|entry| {
            if entry.alias == entry.table_name {
                format!("{}.{}", entry.grain_name, entry.table_name)
            } else {
                format!("{}.{} AS {}", entry.grain_name, entry.table_name, entry.alias)
            }
        })
        .join(", ");
    match where_clause {
        Some(cond) => format!("SELECT {} FROM {} WHERE {}", select, from, cond.csql()),
        None => format!("SELECT {} FROM {}", select, from),
    }
}

/// View under construction: FROM entries, select list and WHERE accumulate;
/// resolution against the frozen tables happens when the score is built.
#[derive(Debug)]
pub struct ViewBuilder {
    grain_name: Identifier,
    name: Identifier,
    parameters: IndexMap<String, ExprType>,
    parameterized: bool,
    from: Vec<FromTable>,
    columns: Vec<(Identifier, Expr)>,
    where_clause: Option<Expr>,
}

impl ViewBuilder {
    pub fn new(grain_name: &str, name: &str) -> Result<Self> {
        Ok(Self {
            grain_name: Identifier::new(grain_name)?,
            name: Identifier::new(name)?,
            parameters: IndexMap::new(),
            parameterized: false,
            from: Vec::new(),
            columns: Vec::new(),
            where_clause: None,
        })
    }

    pub fn parameterized(grain_name: &str, name: &str) -> Result<Self> {
        let mut builder = Self::new(grain_name, name)?;
        builder.parameterized = true;
        Ok(builder)
    }

    pub fn name(&self) -> &Identifier {
        &self.name
    }

    pub(crate) fn grain_name(&self) -> &Identifier {
        &self.grain_name
    }

    pub fn add_parameter(&mut self, name: &str, param_type: ExprType) -> Result<()> {
        let name = Identifier::new(name)?;
        if !self.parameterized {
            return Err(ParseError::IllegalState {
                detail: format!("view {} does not take parameters", self.name),
            });
        }
        if self.parameters.insert(name.to_string(), param_type).is_some() {
            return Err(ParseError::IllegalState {
                detail: format!("view {} already has a parameter {}", self.name, name),
            });
        }
        Ok(())
    }

    /// Bring `grain.table` into scope. The grain defaults to the view's own
    /// grain and the alias to the table name.
    pub fn add_from(&mut self, grain: Option<&str>, table: &str, alias: Option<&str>) -> Result<()> {
        let table_name = Identifier::new(table)?;
        let alias = match alias {
            Some(alias) => Identifier::new(alias)?,
            None => table_name.clone(),
        };
        if self.from.iter().any(|entry| entry.alias == alias) {
            return Err(ParseError::IllegalState {
                detail: format!("view {}: duplicate FROM alias {}", self.name, alias),
            });
        }
        self.from.push(FromTable {
            grain_name: match grain {
                Some(grain) => Identifier::new(grain)?,
                None => self.grain_name.clone(),
            },
            table_name,
            alias,
        });
        Ok(())
    }

    pub fn add_column(&mut self, alias: &str, expr: Expr) -> Result<()> {
        let alias = Identifier::new(alias)?;
        if self.columns.iter().any(|(existing, _)| *existing == alias) {
            return Err(ParseError::DuplicateColumn {
                table: self.name.to_string(),
                column: alias.to_string(),
            });
        }
        self.columns.push((alias, expr));
        Ok(())
    }

    pub fn set_where(&mut self, cond: Expr) {
        self.where_clause = Some(cond);
    }

    /// Resolve and type-check against the frozen tables of the score.
    pub(crate) fn resolve<'a>(
        self,
        lookup: &dyn Fn(&str, &str) -> Option<&'a Table>,
    ) -> Result<(Option<View>, Option<ParameterizedView>)> {
        if self.columns.is_empty() {
            return Err(ParseError::IllegalState {
                detail: format!("view {} has no columns", self.name),
            });
        }
        let mut tables = Vec::with_capacity(self.from.len());
        for entry in &self.from {
            let table = lookup(entry.grain_name.as_str(), entry.table_name.as_str()).ok_or_else(|| {
                ParseError::UnknownElement {
                    grain: entry.grain_name.to_string(),
                    element: entry.table_name.to_string(),
                }
            })?;
            tables.push((entry.alias.clone(), table));
        }
        let targets: Vec<FromTarget> = tables
            .iter()
            .map(|(alias, table)| FromTarget {
                alias: alias.as_str(),
                table: *table,
            })
            .collect();

        let mut columns = IndexMap::new();
        for (alias, mut expr) in self.columns {
            expr.resolve_field_refs(&targets)?;
            expr.validate_types()?;
            columns.insert(alias.to_string(), expr);
        }
        let where_clause = match self.where_clause {
            Some(mut cond) => {
                cond.resolve_field_refs(&targets)?;
                cond.validate_types()?;
                if cond.expr_type() != ExprType::Logic {
                    return Err(ParseError::TypeMismatch {
                        detail: format!(
                            "WHERE clause of view {} must be a condition, found {}",
                            self.name,
                            cond.expr_type()
                        ),
                    });
                }
                Some(cond)
            }
            None => None,
        };

        if self.parameterized {
            Ok((
                None,
                Some(ParameterizedView {
                    grain_name: self.grain_name,
                    name: self.name,
                    parameters: self.parameters,
                    from: self.from,
                    columns,
                    where_clause,
                }),
            ))
        } else {
            Ok((
                Some(View {
                    grain_name: self.grain_name,
                    name: self.name,
                    from: self.from,
                    columns,
                    where_clause,
                }),
                None,
            ))
        }
    }
}
