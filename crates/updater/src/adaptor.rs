//! The capability contract between the updater and a dialect adaptor. The
//! updater decides *what* to do and in which order; the adaptor renders and
//! executes the dialect DDL. Blocking I/O happens only inside these calls.

use crate::dbinfo::{DbColumnInfo, DbFkInfo, DbIndexInfo, DbPkInfo, DbSequenceInfo};
use score::{
    Column, ForeignKey, Grain, Index, MaterializedView, ParameterizedView, SequenceDef, Table,
    TableElement, View,
};
use std::collections::{BTreeMap, BTreeSet};

/// Hands out connections and controls their transactions. Catalog status
/// rows are written on a dedicated connection so they survive a rollback of
/// the grain's DDL transaction.
pub trait ConnectionPool {
    type Conn;

    fn get(&self) -> anyhow::Result<Self::Conn>;
    fn commit(&self, conn: &mut Self::Conn) -> anyhow::Result<()>;
    fn rollback(&self, conn: &mut Self::Conn) -> anyhow::Result<()>;
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum TriggerType {
    PostInsert,
    PostUpdate,
    PostDelete,
}

/// Identifies one trigger on one table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TriggerQuery {
    pub schema: String,
    pub table_name: String,
    pub name: String,
    pub trigger_type: TriggerType,
}

/// Everything the updater requires of a database dialect.
///
/// Introspection methods return the [`crate::dbinfo`] DTOs with canonical
/// (dialect-neutral) text, so that `reflects` comparisons stay meaningful
/// across backends.
pub trait DbAdaptor {
    type Conn;

    // Schema-level.
    fn table_exists(&self, conn: &mut Self::Conn, grain: &str, table: &str)
        -> anyhow::Result<bool>;
    fn user_tables_exist(&self, conn: &mut Self::Conn) -> anyhow::Result<bool>;
    fn create_schema_if_not_exists(&self, conn: &mut Self::Conn, name: &str)
        -> anyhow::Result<()>;
    /// One-off dialect objects accompanying the system schema (helper
    /// procedures and the like).
    fn create_sys_objects(&self, conn: &mut Self::Conn, sys_schema: &str) -> anyhow::Result<()>;

    // Tables and columns.
    fn create_table(&self, conn: &mut Self::Conn, table: &dyn TableElement) -> anyhow::Result<()>;
    fn drop_table(&self, conn: &mut Self::Conn, element: &dyn TableElement) -> anyhow::Result<()>;
    fn get_columns(
        &self,
        conn: &mut Self::Conn,
        table: &dyn TableElement,
    ) -> anyhow::Result<BTreeSet<String>>;
    fn create_column(
        &self,
        conn: &mut Self::Conn,
        table: &dyn TableElement,
        column: &Column,
    ) -> anyhow::Result<()>;
    fn update_column(
        &self,
        conn: &mut Self::Conn,
        table: &dyn TableElement,
        column: &Column,
        db_info: &DbColumnInfo,
    ) -> anyhow::Result<()>;
    fn get_column_info(
        &self,
        conn: &mut Self::Conn,
        table: &dyn TableElement,
        column: &str,
    ) -> anyhow::Result<Option<DbColumnInfo>>;
    /// Align the identity/sequence machinery backing an auto-incremented
    /// column after the table was created or altered.
    fn manage_auto_increment(
        &self,
        conn: &mut Self::Conn,
        table: &dyn TableElement,
    ) -> anyhow::Result<()>;

    // Keys.
    fn get_pk_info(&self, conn: &mut Self::Conn, table: &dyn TableElement)
        -> anyhow::Result<DbPkInfo>;
    fn create_pk(&self, conn: &mut Self::Conn, table: &dyn TableElement) -> anyhow::Result<()>;
    fn drop_pk(
        &self,
        conn: &mut Self::Conn,
        table: &dyn TableElement,
        pk_name: &str,
    ) -> anyhow::Result<()>;
    fn get_fk_info(&self, conn: &mut Self::Conn, grain: &Grain) -> anyhow::Result<Vec<DbFkInfo>>;
    fn create_fk(
        &self,
        conn: &mut Self::Conn,
        table: &Table,
        fk: &ForeignKey,
    ) -> anyhow::Result<()>;
    fn drop_fk(
        &self,
        conn: &mut Self::Conn,
        grain: &str,
        table: &str,
        fk_name: &str,
    ) -> anyhow::Result<()>;

    // Indices.
    fn get_indices(
        &self,
        conn: &mut Self::Conn,
        grain: &Grain,
    ) -> anyhow::Result<BTreeMap<String, DbIndexInfo>>;
    fn create_index(&self, conn: &mut Self::Conn, index: &Index) -> anyhow::Result<()>;
    fn drop_index(&self, conn: &mut Self::Conn, grain: &str, index_name: &str)
        -> anyhow::Result<()>;

    // Sequences.
    fn sequence_exists(&self, conn: &mut Self::Conn, grain: &str, name: &str)
        -> anyhow::Result<bool>;
    fn get_sequence_info(
        &self,
        conn: &mut Self::Conn,
        sequence: &SequenceDef,
    ) -> anyhow::Result<DbSequenceInfo>;
    fn create_sequence(&self, conn: &mut Self::Conn, sequence: &SequenceDef)
        -> anyhow::Result<()>;
    fn alter_sequence(&self, conn: &mut Self::Conn, sequence: &SequenceDef) -> anyhow::Result<()>;

    // Views.
    fn get_view_list(&self, conn: &mut Self::Conn, grain: &Grain) -> anyhow::Result<Vec<String>>;
    fn create_view(&self, conn: &mut Self::Conn, view: &View) -> anyhow::Result<()>;
    fn drop_view(&self, conn: &mut Self::Conn, grain: &str, name: &str) -> anyhow::Result<()>;
    fn get_parameterized_view_list(
        &self,
        conn: &mut Self::Conn,
        grain: &Grain,
    ) -> anyhow::Result<Vec<String>>;
    fn create_parameterized_view(
        &self,
        conn: &mut Self::Conn,
        view: &ParameterizedView,
    ) -> anyhow::Result<()>;
    fn drop_parameterized_view(
        &self,
        conn: &mut Self::Conn,
        grain: &str,
        name: &str,
    ) -> anyhow::Result<()>;

    // Materialized views and their triggers.
    fn get_trigger_body(
        &self,
        conn: &mut Self::Conn,
        query: &TriggerQuery,
    ) -> anyhow::Result<Option<String>>;
    fn drop_table_triggers_for_materialized_views(
        &self,
        conn: &mut Self::Conn,
        table: &Table,
    ) -> anyhow::Result<()>;
    fn create_table_triggers_for_materialized_views(
        &self,
        conn: &mut Self::Conn,
        table: &Table,
        views: &[&MaterializedView],
    ) -> anyhow::Result<()>;
    /// Create or refresh the trigger maintaining `recversion` on a
    /// versioned table; drop it when the table is not versioned.
    fn update_versioning_trigger(
        &self,
        conn: &mut Self::Conn,
        table: &Table,
    ) -> anyhow::Result<()>;
    /// Seed a freshly created materialized view table by running its
    /// defining query against the source table.
    fn init_data_for_materialized_view(
        &self,
        conn: &mut Self::Conn,
        view: &MaterializedView,
    ) -> anyhow::Result<()>;
}
