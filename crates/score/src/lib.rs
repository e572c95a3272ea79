mod column;
mod error;
mod expr;
mod fk;
mod grain;
mod index;
mod mview;
mod names;
mod reference;
mod score;
mod sequence;
mod table;
mod version;
mod view;

pub use column::{Column, ColumnKind, DateTimeDefault, StringLength};
pub use error::{ParseError, Result};
pub use expr::{Expr, ExprType, FieldRef, FromTarget, LogicalOp, Relation, TermOp};
pub use fk::{FkRule, ForeignKey, ForeignKeyBuilder};
pub use grain::{Grain, GrainBuilder};
pub use index::Index;
pub use mview::{MaterializedView, MaterializedViewBuilder, MvColumnSource};
pub use names::{Identifier, MAX_IDENTIFIER_LENGTH};
pub use reference::{ElementKind, GrainElement, GrainElementRef, TableElement};
pub use score::{Score, ScoreBuilder, SYSTEM_GRAIN_NAME};
pub use sequence::SequenceDef;
pub use table::{Table, TableBuilder};
pub use version::{ComparisonState, VersionString};
pub use view::{FromTable, ParameterizedView, View, ViewBuilder};
