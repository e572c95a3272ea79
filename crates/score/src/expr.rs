use crate::error::{ParseError, Result};
use crate::names::Identifier;
use crate::reference::GrainElement;
use crate::table::Table;
use itertools::Itertools;
use std::fmt;

/// Type of a CelestaSQL expression. Columns map into these: integer and
/// floating columns are NUMERIC, string columns TEXT, boolean BIT, datetime
/// DATE, binary BLOB. Predicates are LOGIC. A field reference is UNDEFINED
/// until resolved.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ExprType {
    Logic,
    Numeric,
    Text,
    Date,
    Bit,
    Blob,
    Undefined,
}

impl ExprType {
    /// Types that admit ordering comparisons and BETWEEN/IN.
    fn is_comparable(self) -> bool {
        matches!(self, ExprType::Date | ExprType::Numeric | ExprType::Text)
    }
}

impl fmt::Display for ExprType {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(match self {
            ExprType::Logic => "LOGIC",
            ExprType::Numeric => "NUMERIC",
            ExprType::Text => "TEXT",
            ExprType::Date => "DATE",
            ExprType::Bit => "BIT",
            ExprType::Blob => "BLOB",
            ExprType::Undefined => "UNDEFINED",
        })
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Relation {
    Gt,
    Ls,
    GtEq,
    LsEq,
    NtEq,
    Eq,
    Like,
}

impl Relation {
    fn csql(self) -> &'static str {
        match self {
            Relation::Gt => " > ",
            Relation::Ls => " < ",
            Relation::GtEq => " >= ",
            Relation::LsEq => " <= ",
            Relation::NtEq => " <> ",
            Relation::Eq => " = ",
            Relation::Like => " LIKE ",
        }
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum LogicalOp {
    And,
    Or,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum TermOp {
    Plus,
    Minus,
    Times,
    Over,
    Concat,
}

impl TermOp {
    fn csql(self) -> &'static str {
        match self {
            TermOp::Plus => " + ",
            TermOp::Minus => " - ",
            TermOp::Times => " * ",
            TermOp::Over => " / ",
            TermOp::Concat => " || ",
        }
    }
}

/// A reference to a column, optionally qualified by table (or alias) and
/// grain. Until [`Expr::resolve_field_refs`] runs its type is UNDEFINED.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldRef {
    grain_name: Option<Identifier>,
    table_or_alias: Option<Identifier>,
    column_name: Identifier,
    resolved: Option<ExprType>,
}

impl FieldRef {
    pub fn column_name(&self) -> &Identifier {
        &self.column_name
    }

    fn csql(&self) -> String {
        let mut out = String::new();
        if let Some(grain) = &self.grain_name {
            out.push_str(grain);
            out.push('.');
        }
        if let Some(table) = &self.table_or_alias {
            out.push_str(table);
            out.push('.');
        }
        out.push_str(&self.column_name);
        out
    }
}

/// A table brought into scope by a FROM clause, against which field
/// references resolve. The alias defaults to the table name.
#[derive(Copy, Clone)]
pub struct FromTarget<'a> {
    pub alias: &'a str,
    pub table: &'a Table,
}

/// The CelestaSQL expression tree. Nodes own their children; construction
/// rejects structurally broken shapes (see the constructors), and
/// [`Expr::validate_types`] enforces the full typing rules after field
/// resolution.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Parenthesized(Box<Expr>),
    Relop {
        op: Relation,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    In {
        term: Box<Expr>,
        operands: Vec<Expr>,
    },
    Between {
        term: Box<Expr>,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    IsNull(Box<Expr>),
    Not(Box<Expr>),
    Logical {
        op: LogicalOp,
        operands: Vec<Expr>,
    },
    Term {
        op: TermOp,
        operands: Vec<Expr>,
    },
    UnaryMinus(Box<Expr>),
    NumericLiteral(String),
    TextLiteral(String),
    FieldRef(FieldRef),
}

impl Expr {
    pub fn parenthesized(inner: Expr) -> Expr {
        Expr::Parenthesized(Box::new(inner))
    }

    pub fn relop(op: Relation, left: Expr, right: Expr) -> Expr {
        Expr::Relop {
            op,
            left: Box::new(left),
            right: Box::new(right),
        }
    }

    pub fn in_list(term: Expr, operands: Vec<Expr>) -> Result<Expr> {
        if operands.is_empty() {
            return Err(ParseError::MalformedExpression {
                detail: "IN requires at least one operand".to_string(),
            });
        }
        Ok(Expr::In {
            term: Box::new(term),
            operands,
        })
    }

    pub fn between(term: Expr, left: Expr, right: Expr) -> Expr {
        Expr::Between {
            term: Box::new(term),
            left: Box::new(left),
            right: Box::new(right),
        }
    }

    pub fn is_null(operand: Expr) -> Result<Expr> {
        if operand.expr_type() == ExprType::Logic {
            return Err(ParseError::TypeMismatch {
                detail: "IS NULL cannot be applied to a logical condition".to_string(),
            });
        }
        Ok(Expr::IsNull(Box::new(operand)))
    }

    pub fn not(operand: Expr) -> Result<Expr> {
        match operand.expr_type() {
            ExprType::Logic | ExprType::Undefined => Ok(Expr::Not(Box::new(operand))),
            t => Err(ParseError::TypeMismatch {
                detail: format!("NOT requires a logical operand, found {}", t),
            }),
        }
    }

    pub fn logical(op: LogicalOp, operands: Vec<Expr>) -> Result<Expr> {
        if operands.is_empty() {
            return Err(ParseError::MalformedExpression {
                detail: "logical operator requires at least one operand".to_string(),
            });
        }
        for operand in &operands {
            match operand.expr_type() {
                ExprType::Logic | ExprType::Undefined => (),
                t => {
                    return Err(ParseError::TypeMismatch {
                        detail: format!("logical operator requires logical operands, found {}", t),
                    })
                }
            }
        }
        Ok(Expr::Logical { op, operands })
    }

    pub fn term(op: TermOp, operands: Vec<Expr>) -> Result<Expr> {
        if operands.is_empty() {
            return Err(ParseError::MalformedExpression {
                detail: "arithmetic operator requires at least one operand".to_string(),
            });
        }
        Ok(Expr::Term { op, operands })
    }

    pub fn unary_minus(operand: Expr) -> Expr {
        Expr::UnaryMinus(Box::new(operand))
    }

    pub fn numeric_literal(lexeme: impl Into<String>) -> Result<Expr> {
        let lexeme = lexeme.into();
        if lexeme.parse::<f64>().is_err() {
            return Err(ParseError::MalformedExpression {
                detail: format!("{:?} is not a numeric literal", lexeme),
            });
        }
        Ok(Expr::NumericLiteral(lexeme))
    }

    /// The lexeme includes the surrounding single quotes, so that text inside
    /// the literal round-trips byte for byte.
    pub fn text_literal(lexeme: impl Into<String>) -> Result<Expr> {
        let lexeme = lexeme.into();
        if lexeme.len() < 2 || !lexeme.starts_with('\'') || !lexeme.ends_with('\'') {
            return Err(ParseError::MalformedExpression {
                detail: format!("{:?} is not a quoted text literal", lexeme),
            });
        }
        Ok(Expr::TextLiteral(lexeme))
    }

    pub fn field(
        grain_name: Option<Identifier>,
        table_or_alias: Option<Identifier>,
        column_name: Identifier,
    ) -> Result<Expr> {
        if grain_name.is_some() && table_or_alias.is_none() {
            return Err(ParseError::MalformedExpression {
                detail: "a grain-qualified field reference requires a table name".to_string(),
            });
        }
        Ok(Expr::FieldRef(FieldRef {
            grain_name,
            table_or_alias,
            column_name,
            resolved: None,
        }))
    }

    /// Shorthand for an unqualified column reference.
    pub fn column(name: &str) -> Result<Expr> {
        Ok(Expr::field(None, None, Identifier::new(name)?).expect("no qualifier"))
    }

    /// The type of this node. Logical connectives and predicates are LOGIC;
    /// arithmetic is NUMERIC except CONCAT, which is TEXT; a field reference
    /// reports UNDEFINED until resolved.
    pub fn expr_type(&self) -> ExprType {
        match self {
            Expr::Parenthesized(inner) => inner.expr_type(),
            Expr::Relop { .. }
            | Expr::In { .. }
            | Expr::Between { .. }
            | Expr::IsNull(_)
            | Expr::Not(_)
            | Expr::Logical { .. } => ExprType::Logic,
            Expr::Term { op, .. } => match op {
                TermOp::Concat => ExprType::Text,
                _ => ExprType::Numeric,
            },
            Expr::UnaryMinus(_) => ExprType::Numeric,
            Expr::NumericLiteral(_) => ExprType::Numeric,
            Expr::TextLiteral(_) => ExprType::Text,
            Expr::FieldRef(field) => field.resolved.unwrap_or(ExprType::Undefined),
        }
    }

    /// Pre-order traversal. This replaces a visitor hierarchy: dispatch on
    /// the node inside `f` with a match.
    pub fn walk(&self, f: &mut impl FnMut(&Expr)) {
        f(self);
        match self {
            Expr::Parenthesized(inner)
            | Expr::IsNull(inner)
            | Expr::Not(inner)
            | Expr::UnaryMinus(inner) => inner.walk(f),
            Expr::Relop { left, right, .. } => {
                left.walk(f);
                right.walk(f);
            }
            Expr::In { term, operands } => {
                term.walk(f);
                for operand in operands {
                    operand.walk(f);
                }
            }
            Expr::Between { term, left, right } => {
                term.walk(f);
                left.walk(f);
                right.walk(f);
            }
            Expr::Logical { operands, .. } | Expr::Term { operands, .. } => {
                for operand in operands {
                    operand.walk(f);
                }
            }
            Expr::NumericLiteral(_) | Expr::TextLiteral(_) | Expr::FieldRef(_) => (),
        }
    }

    fn walk_fields_mut(&mut self, f: &mut impl FnMut(&mut FieldRef) -> Result<()>) -> Result<()> {
        match self {
            Expr::Parenthesized(inner)
            | Expr::IsNull(inner)
            | Expr::Not(inner)
            | Expr::UnaryMinus(inner) => inner.walk_fields_mut(f),
            Expr::Relop { left, right, .. } => {
                left.walk_fields_mut(f)?;
                right.walk_fields_mut(f)
            }
            Expr::In { term, operands } => {
                term.walk_fields_mut(f)?;
                for operand in operands {
                    operand.walk_fields_mut(f)?;
                }
                Ok(())
            }
            Expr::Between { term, left, right } => {
                term.walk_fields_mut(f)?;
                left.walk_fields_mut(f)?;
                right.walk_fields_mut(f)
            }
            Expr::Logical { operands, .. } | Expr::Term { operands, .. } => {
                for operand in operands {
                    operand.walk_fields_mut(f)?;
                }
                Ok(())
            }
            Expr::NumericLiteral(_) | Expr::TextLiteral(_) => Ok(()),
            Expr::FieldRef(field) => f(field),
        }
    }

    /// Resolve every field reference against the FROM targets:
    ///
    /// - grain and table both given: the target's table must match both
    ///   names exactly;
    /// - table (or alias) only: match the target's alias;
    /// - bare column: exactly one target table may contain the column.
    ///
    /// Zero candidates is an unresolved reference, more than one ambiguous.
    pub fn resolve_field_refs(&mut self, targets: &[FromTarget<'_>]) -> Result<()> {
        self.walk_fields_mut(&mut |field| {
            let candidates: Vec<&Table> = match (&field.grain_name, &field.table_or_alias) {
                (Some(grain), Some(table)) => targets
                    .iter()
                    .filter(|t| t.table.grain_name() == grain && t.table.name() == table)
                    .filter(|t| t.table.column(&field.column_name).is_some())
                    .map(|t| t.table)
                    .collect(),
                (None, Some(alias)) => targets
                    .iter()
                    .filter(|t| t.alias == alias.as_str())
                    .filter(|t| t.table.column(&field.column_name).is_some())
                    .map(|t| t.table)
                    .collect(),
                (None, None) => targets
                    .iter()
                    .filter(|t| t.table.column(&field.column_name).is_some())
                    .map(|t| t.table)
                    .collect(),
                (Some(_), None) => unreachable!("rejected at construction"),
            };

            match candidates.as_slice() {
                [] => Err(ParseError::UnresolvedField {
                    field: field.csql(),
                }),
                [table] => {
                    let column = table.column(&field.column_name).expect("candidate filter");
                    field.resolved = Some(column.expr_type());
                    Ok(())
                }
                _ => Err(ParseError::AmbiguousField {
                    field: field.csql(),
                }),
            }
        })
    }

    /// Enforce the typing invariants bottom-up. Field references must have
    /// been resolved first.
    pub fn validate_types(&self) -> Result<()> {
        let mismatch = |detail: String| Err(ParseError::TypeMismatch { detail });

        match self {
            Expr::Parenthesized(inner) => inner.validate_types(),
            Expr::Relop { op, left, right } => {
                left.validate_types()?;
                right.validate_types()?;
                let (lt, rt) = (left.expr_type(), right.expr_type());
                if *op == Relation::Like {
                    if lt != ExprType::Text || rt != ExprType::Text {
                        return mismatch(format!("LIKE requires TEXT operands, found {} and {}", lt, rt));
                    }
                } else if lt != rt || !lt.is_comparable() {
                    return mismatch(format!("cannot compare {} with {}", lt, rt));
                }
                Ok(())
            }
            Expr::In { term, operands } => {
                term.validate_types()?;
                let t = term.expr_type();
                if !t.is_comparable() {
                    return mismatch(format!("IN cannot be applied to {}", t));
                }
                for operand in operands {
                    operand.validate_types()?;
                    if operand.expr_type() != t {
                        return mismatch(format!(
                            "IN list mixes {} with {}",
                            t,
                            operand.expr_type()
                        ));
                    }
                }
                Ok(())
            }
            Expr::Between { term, left, right } => {
                term.validate_types()?;
                left.validate_types()?;
                right.validate_types()?;
                let t = term.expr_type();
                if !t.is_comparable() {
                    return mismatch(format!("BETWEEN cannot be applied to {}", t));
                }
                if left.expr_type() != t || right.expr_type() != t {
                    return mismatch(format!(
                        "BETWEEN bounds must be {}, found {} and {}",
                        t,
                        left.expr_type(),
                        right.expr_type()
                    ));
                }
                Ok(())
            }
            Expr::IsNull(operand) => {
                operand.validate_types()?;
                match operand.expr_type() {
                    ExprType::Logic => {
                        mismatch("IS NULL cannot be applied to a logical condition".to_string())
                    }
                    _ => Ok(()),
                }
            }
            Expr::Not(operand) => {
                operand.validate_types()?;
                match operand.expr_type() {
                    ExprType::Logic => Ok(()),
                    t => mismatch(format!("NOT requires a logical operand, found {}", t)),
                }
            }
            Expr::Logical { operands, .. } => {
                for operand in operands {
                    operand.validate_types()?;
                    if operand.expr_type() != ExprType::Logic {
                        return mismatch(format!(
                            "logical operator requires logical operands, found {}",
                            operand.expr_type()
                        ));
                    }
                }
                Ok(())
            }
            Expr::Term { op, operands } => {
                let expect = match op {
                    TermOp::Concat => ExprType::Text,
                    _ => ExprType::Numeric,
                };
                for operand in operands {
                    operand.validate_types()?;
                    if operand.expr_type() != expect {
                        return mismatch(format!(
                            "operator {:?} requires {} operands, found {}",
                            op,
                            expect,
                            operand.expr_type()
                        ));
                    }
                }
                Ok(())
            }
            Expr::UnaryMinus(operand) => {
                operand.validate_types()?;
                match operand.expr_type() {
                    ExprType::Numeric => Ok(()),
                    t => mismatch(format!("unary minus requires NUMERIC, found {}", t)),
                }
            }
            Expr::NumericLiteral(_) | Expr::TextLiteral(_) => Ok(()),
            Expr::FieldRef(field) => match field.resolved {
                Some(t) if t != ExprType::Undefined => Ok(()),
                _ => Err(ParseError::UnresolvedField {
                    field: field.csql(),
                }),
            },
        }
    }

    /// The canonical CelestaSQL rendering. Operators are spaced exactly
    /// `" op "`, IN lists are comma-space separated, parentheses are
    /// preserved. The grain checksum is computed over this text, so it must
    /// stay byte-stable.
    pub fn csql(&self) -> String {
        match self {
            Expr::Parenthesized(inner) => format!("({})", inner.csql()),
            Expr::Relop { op, left, right } => {
                format!("{}{}{}", left.csql(), op.csql(), right.csql())
            }
            Expr::In { term, operands } => format!(
                "{} IN ({})",
                term.csql(),
                operands.iter().map(Expr::csql).join(", ")
            ),
            Expr::Between { term, left, right } => {
                format!("{} BETWEEN {} AND {}", term.csql(), left.csql(), right.csql())
            }
            Expr::IsNull(operand) => format!("{} IS NULL", operand.csql()),
            Expr::Not(operand) => format!("NOT {}", operand.csql()),
            Expr::Logical { op, operands } => operands
                .iter()
                .map(Expr::csql)
                .join(match op {
                    LogicalOp::And => " AND ",
                    LogicalOp::Or => " OR ",
                }),
            Expr::Term { op, operands } => operands.iter().map(Expr::csql).join(op.csql()),
            Expr::UnaryMinus(operand) => format!("-{}", operand.csql()),
            Expr::NumericLiteral(lexeme) | Expr::TextLiteral(lexeme) => lexeme.clone(),
            Expr::FieldRef(field) => field.csql(),
        }
    }
}
