use crate::column::Column;
use crate::names::Identifier;
use indexmap::IndexMap;

#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ElementKind {
    Table,
    Index,
    View,
    ParameterizedView,
    MaterializedView,
    Sequence,
}

/// An outgoing edge from one grain element to another, kept as names and
/// resolved on demand through the owning score. This is how elements refer
/// to each other without owning cycles.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct GrainElementRef {
    pub grain_name: Identifier,
    pub element_name: Identifier,
    pub kind: ElementKind,
}

/// Common surface of everything a grain owns.
pub trait GrainElement {
    fn grain_name(&self) -> &Identifier;
    fn name(&self) -> &Identifier;
    fn kind(&self) -> ElementKind;
    /// Outgoing references of this element. Drives both inter-grain
    /// dependency ordering and the intra-phase element ordering of the
    /// updater.
    fn references(&self) -> Vec<GrainElementRef>;
}

/// Anything the updater can issue CREATE TABLE for: real tables and
/// materialized views. Exposes just enough shape for column-level DDL.
pub trait TableElement: GrainElement {
    fn columns(&self) -> &IndexMap<String, Column>;
    /// Ordered primary key column names; non-empty on any finalized element.
    fn pk_column_names(&self) -> &[String];
    fn pk_constraint_name(&self) -> String {
        format!("pk_{}", self.name())
    }
    /// Whether the element carries a `recversion` column and versioning
    /// trigger. Never true for materialized views.
    fn versioned(&self) -> bool {
        false
    }
}
