use crate::error::{ParseError, Result};
use crate::names::Identifier;
use crate::reference::{ElementKind, GrainElement, GrainElementRef};

/// An index over the columns of one table of the same grain. Column
/// existence is verified when the score is built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Index {
    pub(crate) grain_name: Identifier,
    pub(crate) name: Identifier,
    pub(crate) table_name: Identifier,
    pub(crate) columns: Vec<String>,
}

impl Index {
    pub fn new(grain_name: &str, name: &str, table_name: &str, columns: &[&str]) -> Result<Self> {
        if columns.is_empty() {
            return Err(ParseError::IllegalState {
                detail: format!("index {} has no columns", name),
            });
        }
        let mut column_names = Vec::with_capacity(columns.len());
        for column in columns {
            let column = Identifier::new(*column)?;
            if column_names.iter().any(|c| c == column.as_str()) {
                return Err(ParseError::DuplicateColumn {
                    table: table_name.to_string(),
                    column: column.to_string(),
                });
            }
            column_names.push(column.to_string());
        }
        Ok(Self {
            grain_name: Identifier::new(grain_name)?,
            name: Identifier::new(name)?,
            table_name: Identifier::new(table_name)?,
            columns: column_names,
        })
    }

    pub fn table_name(&self) -> &Identifier {
        &self.table_name
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }
}

impl GrainElement for Index {
    fn grain_name(&self) -> &Identifier {
        &self.grain_name
    }

    fn name(&self) -> &Identifier {
        &self.name
    }

    fn kind(&self) -> ElementKind {
        ElementKind::Index
    }

    fn references(&self) -> Vec<GrainElementRef> {
        vec![GrainElementRef {
            grain_name: self.grain_name.clone(),
            element_name: self.table_name.clone(),
            kind: ElementKind::Table,
        }]
    }
}
