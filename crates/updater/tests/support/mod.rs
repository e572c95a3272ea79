//! An in-memory database standing in for a dialect adaptor: DDL calls
//! mutate plain maps and append to an operation log, introspection reads
//! them back, and the catalog traits write through to durable state the way
//! real status rows survive a DDL rollback.

use score::{
    Column, ColumnKind, ForeignKey, Grain, GrainElement, Index, MaterializedView,
    ParameterizedView, SequenceDef, StringLength, Table, TableElement, View,
};
use std::cell::RefCell;
use std::collections::{BTreeMap, BTreeSet};
use std::rc::Rc;
use syscat::{GrainRow, GrainsCatalog, TableRow, TablesCatalog};
use updater::{
    mv_checksum_marker, mv_trigger_name, ConnectionPool, DbAdaptor, DbColumnInfo, DbColumnType,
    DbFkInfo, DbIndexInfo, DbPkInfo, DbSequenceInfo, TriggerQuery, TriggerType, RECVERSION,
};

#[derive(Debug, Clone, Default)]
pub struct FakeTable {
    pub columns: BTreeMap<String, DbColumnInfo>,
    pub pk: DbPkInfo,
}

/// Everything a DDL transaction can touch; snapshotted per connection so
/// rollback restores it.
#[derive(Debug, Clone, Default)]
pub struct DdlState {
    pub schemas: BTreeSet<String>,
    pub tables: BTreeMap<(String, String), FakeTable>,
    pub indices: BTreeMap<(String, String), DbIndexInfo>,
    pub sequences: BTreeMap<(String, String), DbSequenceInfo>,
    pub views: BTreeSet<(String, String)>,
    pub parameterized_views: BTreeSet<(String, String)>,
    /// (grain, table, trigger name) -> body.
    pub triggers: BTreeMap<(String, String, String), String>,
    pub fks: Vec<(String, DbFkInfo)>,
}

/// Catalog rows live outside the DDL snapshot: status writes are committed
/// on their own connection and survive a rollback.
#[derive(Debug, Clone, Default)]
pub struct CatalogState {
    pub grains: BTreeMap<String, GrainRow>,
    pub tables: BTreeMap<(String, String), TableRow>,
}

#[derive(Debug, Default)]
pub struct SharedState {
    pub ddl: DdlState,
    pub catalog: CatalogState,
    pub log: Vec<String>,
    /// Every (grain id, state code) written, in order.
    pub state_history: Vec<(String, i32)>,
}

#[derive(Clone, Default)]
pub struct FakeDb {
    state: Rc<RefCell<SharedState>>,
    /// When set, any DDL touching this `grain.table` fails.
    fail_on_table: Rc<RefCell<Option<String>>>,
}

pub struct FakeConn {
    snapshot: DdlState,
}

impl FakeDb {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_on_table(&self, qualified: &str) {
        *self.fail_on_table.borrow_mut() = Some(qualified.to_string());
    }

    pub fn with_state<R>(&self, f: impl FnOnce(&mut SharedState) -> R) -> R {
        f(&mut self.state.borrow_mut())
    }

    pub fn log(&self) -> Vec<String> {
        self.state.borrow().log.clone()
    }

    pub fn grain_row(&self, id: &str) -> Option<GrainRow> {
        self.state.borrow().catalog.grains.get(id).cloned()
    }

    pub fn states_of(&self, id: &str) -> Vec<i32> {
        self.state
            .borrow()
            .state_history
            .iter()
            .filter(|(grain, _)| grain == id)
            .map(|(_, state)| *state)
            .collect()
    }

    fn push_log(&self, entry: String) {
        self.state.borrow_mut().log.push(entry);
    }

    fn check_fail(&self, grain: &str, table: &str) -> anyhow::Result<()> {
        if let Some(target) = self.fail_on_table.borrow().as_deref() {
            if target == format!("{}.{}", grain, table) {
                anyhow::bail!("injected failure on {}", target);
            }
        }
        Ok(())
    }
}

/// The canonical introspection image of a model column, exactly what a
/// well-behaved dialect adaptor reports back after DDL.
pub fn mirror_column(column: &Column) -> DbColumnInfo {
    let (length, max) = match column.kind() {
        ColumnKind::Text { length: StringLength::Chars(n), .. } => (*n, false),
        ColumnKind::Text { length: StringLength::Max, .. } => (0, true),
        _ => (0, false),
    };
    DbColumnInfo {
        name: column.name().to_string(),
        col_type: DbColumnType::of(column),
        nullable: column.nullable(),
        identity: column.is_identity(),
        length,
        max,
        default_value: column.default_text().unwrap_or_default(),
    }
}

fn mirror_table(element: &dyn TableElement) -> FakeTable {
    let mut table = FakeTable {
        columns: element
            .columns()
            .values()
            .map(|column| (column.name().to_string(), mirror_column(column)))
            .collect(),
        pk: DbPkInfo {
            name: element.pk_constraint_name(),
            column_names: element.pk_column_names().to_vec(),
        },
    };
    if element.versioned() {
        table.columns.insert(
            RECVERSION.to_string(),
            DbColumnInfo {
                name: RECVERSION.to_string(),
                col_type: DbColumnType::Int,
                nullable: false,
                identity: false,
                length: 0,
                max: false,
                default_value: "1".to_string(),
            },
        );
    }
    table
}

pub fn mirror_fk(table: &Table, fk: &ForeignKey) -> DbFkInfo {
    DbFkInfo {
        table_name: table.name().to_string(),
        name: fk.name().to_string(),
        column_names: fk.columns().to_vec(),
        ref_grain: fk.referenced_grain().to_string(),
        ref_table: fk.referenced_table().to_string(),
        update_rule: fk.on_update(),
        delete_rule: fk.on_delete(),
    }
}

impl ConnectionPool for FakeDb {
    type Conn = FakeConn;

    fn get(&self) -> anyhow::Result<FakeConn> {
        let snapshot = self.state.borrow().ddl.clone();
        Ok(FakeConn { snapshot })
    }

    fn commit(&self, conn: &mut FakeConn) -> anyhow::Result<()> {
        conn.snapshot = self.state.borrow().ddl.clone();
        Ok(())
    }

    fn rollback(&self, conn: &mut FakeConn) -> anyhow::Result<()> {
        self.state.borrow_mut().ddl = conn.snapshot.clone();
        Ok(())
    }
}

impl DbAdaptor for FakeDb {
    type Conn = FakeConn;

    fn table_exists(&self, _: &mut FakeConn, grain: &str, table: &str) -> anyhow::Result<bool> {
        Ok(self
            .state
            .borrow()
            .ddl
            .tables
            .contains_key(&(grain.to_string(), table.to_string())))
    }

    fn user_tables_exist(&self, _: &mut FakeConn) -> anyhow::Result<bool> {
        Ok(self
            .state
            .borrow()
            .ddl
            .tables
            .keys()
            .any(|(grain, _)| grain != score::SYSTEM_GRAIN_NAME))
    }

    fn create_schema_if_not_exists(&self, _: &mut FakeConn, name: &str) -> anyhow::Result<()> {
        let created = self.state.borrow_mut().ddl.schemas.insert(name.to_string());
        if created {
            self.push_log(format!("create schema {}", name));
        }
        Ok(())
    }

    fn create_sys_objects(&self, _: &mut FakeConn, sys_schema: &str) -> anyhow::Result<()> {
        self.push_log(format!("create sys objects {}", sys_schema));
        Ok(())
    }

    fn create_table(&self, _: &mut FakeConn, element: &dyn TableElement) -> anyhow::Result<()> {
        self.check_fail(element.grain_name(), element.name())?;
        let key = (element.grain_name().to_string(), element.name().to_string());
        self.state
            .borrow_mut()
            .ddl
            .tables
            .insert(key, mirror_table(element));
        self.push_log(format!(
            "create table {}.{}",
            element.grain_name(),
            element.name()
        ));
        Ok(())
    }

    fn drop_table(&self, _: &mut FakeConn, element: &dyn TableElement) -> anyhow::Result<()> {
        let key = (element.grain_name().to_string(), element.name().to_string());
        self.state.borrow_mut().ddl.tables.remove(&key);
        self.push_log(format!(
            "drop table {}.{}",
            element.grain_name(),
            element.name()
        ));
        Ok(())
    }

    fn get_columns(
        &self,
        _: &mut FakeConn,
        table: &dyn TableElement,
    ) -> anyhow::Result<BTreeSet<String>> {
        let key = (table.grain_name().to_string(), table.name().to_string());
        Ok(self
            .state
            .borrow()
            .ddl
            .tables
            .get(&key)
            .map(|t| t.columns.keys().cloned().collect())
            .unwrap_or_default())
    }

    fn create_column(
        &self,
        _: &mut FakeConn,
        table: &dyn TableElement,
        column: &Column,
    ) -> anyhow::Result<()> {
        let key = (table.grain_name().to_string(), table.name().to_string());
        self.state
            .borrow_mut()
            .ddl
            .tables
            .get_mut(&key)
            .expect("table exists")
            .columns
            .insert(column.name().to_string(), mirror_column(column));
        self.push_log(format!(
            "create column {}.{}.{}",
            table.grain_name(),
            table.name(),
            column.name()
        ));
        Ok(())
    }

    fn update_column(
        &self,
        _: &mut FakeConn,
        table: &dyn TableElement,
        column: &Column,
        _db_info: &DbColumnInfo,
    ) -> anyhow::Result<()> {
        let key = (table.grain_name().to_string(), table.name().to_string());
        self.state
            .borrow_mut()
            .ddl
            .tables
            .get_mut(&key)
            .expect("table exists")
            .columns
            .insert(column.name().to_string(), mirror_column(column));
        self.push_log(format!(
            "alter column {}.{}.{}",
            table.grain_name(),
            table.name(),
            column.name()
        ));
        Ok(())
    }

    fn get_column_info(
        &self,
        _: &mut FakeConn,
        table: &dyn TableElement,
        column: &str,
    ) -> anyhow::Result<Option<DbColumnInfo>> {
        let key = (table.grain_name().to_string(), table.name().to_string());
        Ok(self
            .state
            .borrow()
            .ddl
            .tables
            .get(&key)
            .and_then(|t| t.columns.get(column).cloned()))
    }

    fn manage_auto_increment(
        &self,
        _: &mut FakeConn,
        table: &dyn TableElement,
    ) -> anyhow::Result<()> {
        self.push_log(format!(
            "manage auto increment {}.{}",
            table.grain_name(),
            table.name()
        ));
        Ok(())
    }

    fn get_pk_info(&self, _: &mut FakeConn, table: &dyn TableElement) -> anyhow::Result<DbPkInfo> {
        let key = (table.grain_name().to_string(), table.name().to_string());
        Ok(self
            .state
            .borrow()
            .ddl
            .tables
            .get(&key)
            .map(|t| t.pk.clone())
            .unwrap_or_default())
    }

    fn create_pk(&self, _: &mut FakeConn, table: &dyn TableElement) -> anyhow::Result<()> {
        let key = (table.grain_name().to_string(), table.name().to_string());
        let pk = DbPkInfo {
            name: table.pk_constraint_name(),
            column_names: table.pk_column_names().to_vec(),
        };
        self.state
            .borrow_mut()
            .ddl
            .tables
            .get_mut(&key)
            .expect("table exists")
            .pk = pk;
        self.push_log(format!("create pk {}.{}", table.grain_name(), table.name()));
        Ok(())
    }

    fn drop_pk(
        &self,
        _: &mut FakeConn,
        table: &dyn TableElement,
        _pk_name: &str,
    ) -> anyhow::Result<()> {
        let key = (table.grain_name().to_string(), table.name().to_string());
        self.state
            .borrow_mut()
            .ddl
            .tables
            .get_mut(&key)
            .expect("table exists")
            .pk = DbPkInfo::default();
        self.push_log(format!("drop pk {}.{}", table.grain_name(), table.name()));
        Ok(())
    }

    fn get_fk_info(&self, _: &mut FakeConn, grain: &Grain) -> anyhow::Result<Vec<DbFkInfo>> {
        Ok(self
            .state
            .borrow()
            .ddl
            .fks
            .iter()
            .filter(|(g, _)| g == grain.name().as_str())
            .map(|(_, info)| info.clone())
            .collect())
    }

    fn create_fk(&self, _: &mut FakeConn, table: &Table, fk: &ForeignKey) -> anyhow::Result<()> {
        let info = mirror_fk(table, fk);
        self.push_log(format!(
            "create fk {}.{}.{}",
            table.grain_name(),
            table.name(),
            fk.name()
        ));
        self.state
            .borrow_mut()
            .ddl
            .fks
            .push((table.grain_name().to_string(), info));
        Ok(())
    }

    fn drop_fk(
        &self,
        _: &mut FakeConn,
        grain: &str,
        table: &str,
        fk_name: &str,
    ) -> anyhow::Result<()> {
        self.state
            .borrow_mut()
            .ddl
            .fks
            .retain(|(g, info)| !(g == grain && info.table_name == table && info.name == fk_name));
        self.push_log(format!("drop fk {}.{}.{}", grain, table, fk_name));
        Ok(())
    }

    fn get_indices(
        &self,
        _: &mut FakeConn,
        grain: &Grain,
    ) -> anyhow::Result<BTreeMap<String, DbIndexInfo>> {
        Ok(self
            .state
            .borrow()
            .ddl
            .indices
            .iter()
            .filter(|((g, _), _)| g == grain.name().as_str())
            .map(|((_, name), info)| (name.clone(), info.clone()))
            .collect())
    }

    fn create_index(&self, _: &mut FakeConn, index: &Index) -> anyhow::Result<()> {
        let key = (index.grain_name().to_string(), index.name().to_string());
        let info = DbIndexInfo {
            table_name: index.table_name().to_string(),
            index_name: index.name().to_string(),
            column_names: index.columns().to_vec(),
        };
        self.state.borrow_mut().ddl.indices.insert(key, info);
        self.push_log(format!(
            "create index {}.{}",
            index.grain_name(),
            index.name()
        ));
        Ok(())
    }

    fn drop_index(&self, _: &mut FakeConn, grain: &str, index_name: &str) -> anyhow::Result<()> {
        self.state
            .borrow_mut()
            .ddl
            .indices
            .remove(&(grain.to_string(), index_name.to_string()));
        self.push_log(format!("drop index {}.{}", grain, index_name));
        Ok(())
    }

    fn sequence_exists(&self, _: &mut FakeConn, grain: &str, name: &str) -> anyhow::Result<bool> {
        Ok(self
            .state
            .borrow()
            .ddl
            .sequences
            .contains_key(&(grain.to_string(), name.to_string())))
    }

    fn get_sequence_info(
        &self,
        _: &mut FakeConn,
        sequence: &SequenceDef,
    ) -> anyhow::Result<DbSequenceInfo> {
        let key = (
            sequence.grain_name().to_string(),
            sequence.name().to_string(),
        );
        Ok(self
            .state
            .borrow()
            .ddl
            .sequences
            .get(&key)
            .cloned()
            .expect("sequence exists"))
    }

    fn create_sequence(&self, _: &mut FakeConn, sequence: &SequenceDef) -> anyhow::Result<()> {
        let key = (
            sequence.grain_name().to_string(),
            sequence.name().to_string(),
        );
        let info = DbSequenceInfo {
            increment_by: sequence.increment_by(),
            min_value: sequence.min_value(),
            max_value: sequence.max_value(),
            cycle: sequence.cycle(),
        };
        self.state.borrow_mut().ddl.sequences.insert(key, info);
        self.push_log(format!(
            "create sequence {}.{}",
            sequence.grain_name(),
            sequence.name()
        ));
        Ok(())
    }

    fn alter_sequence(&self, _: &mut FakeConn, sequence: &SequenceDef) -> anyhow::Result<()> {
        let key = (
            sequence.grain_name().to_string(),
            sequence.name().to_string(),
        );
        let info = DbSequenceInfo {
            increment_by: sequence.increment_by(),
            min_value: sequence.min_value(),
            max_value: sequence.max_value(),
            cycle: sequence.cycle(),
        };
        self.state.borrow_mut().ddl.sequences.insert(key, info);
        self.push_log(format!(
            "alter sequence {}.{}",
            sequence.grain_name(),
            sequence.name()
        ));
        Ok(())
    }

    fn get_view_list(&self, _: &mut FakeConn, grain: &Grain) -> anyhow::Result<Vec<String>> {
        Ok(self
            .state
            .borrow()
            .ddl
            .views
            .iter()
            .filter(|(g, _)| g == grain.name().as_str())
            .map(|(_, name)| name.clone())
            .collect())
    }

    fn create_view(&self, _: &mut FakeConn, view: &View) -> anyhow::Result<()> {
        let key = (view.grain_name().to_string(), view.name().to_string());
        self.state.borrow_mut().ddl.views.insert(key);
        self.push_log(format!("create view {}.{}", view.grain_name(), view.name()));
        Ok(())
    }

    fn drop_view(&self, _: &mut FakeConn, grain: &str, name: &str) -> anyhow::Result<()> {
        self.state
            .borrow_mut()
            .ddl
            .views
            .remove(&(grain.to_string(), name.to_string()));
        self.push_log(format!("drop view {}.{}", grain, name));
        Ok(())
    }

    fn get_parameterized_view_list(
        &self,
        _: &mut FakeConn,
        grain: &Grain,
    ) -> anyhow::Result<Vec<String>> {
        Ok(self
            .state
            .borrow()
            .ddl
            .parameterized_views
            .iter()
            .filter(|(g, _)| g == grain.name().as_str())
            .map(|(_, name)| name.clone())
            .collect())
    }

    fn create_parameterized_view(
        &self,
        _: &mut FakeConn,
        view: &ParameterizedView,
    ) -> anyhow::Result<()> {
        let key = (view.grain_name().to_string(), view.name().to_string());
        self.state.borrow_mut().ddl.parameterized_views.insert(key);
        self.push_log(format!(
            "create parameterized view {}.{}",
            view.grain_name(),
            view.name()
        ));
        Ok(())
    }

    fn drop_parameterized_view(
        &self,
        _: &mut FakeConn,
        grain: &str,
        name: &str,
    ) -> anyhow::Result<()> {
        self.state
            .borrow_mut()
            .ddl
            .parameterized_views
            .remove(&(grain.to_string(), name.to_string()));
        self.push_log(format!("drop parameterized view {}.{}", grain, name));
        Ok(())
    }

    fn get_trigger_body(
        &self,
        _: &mut FakeConn,
        query: &TriggerQuery,
    ) -> anyhow::Result<Option<String>> {
        Ok(self
            .state
            .borrow()
            .ddl
            .triggers
            .get(&(
                query.schema.clone(),
                query.table_name.clone(),
                query.name.clone(),
            ))
            .cloned())
    }

    fn drop_table_triggers_for_materialized_views(
        &self,
        _: &mut FakeConn,
        table: &Table,
    ) -> anyhow::Result<()> {
        let grain = table.grain_name().to_string();
        let name = table.name().to_string();
        let mut state = self.state.borrow_mut();
        let before = state.ddl.triggers.len();
        state
            .ddl
            .triggers
            .retain(|(g, t, trigger), _| !(g == &grain && t == &name && trigger != &versioning_trigger_name(&name)));
        let dropped = before != state.ddl.triggers.len();
        drop(state);
        if dropped {
            self.push_log(format!("drop mv triggers {}.{}", grain, name));
        }
        Ok(())
    }

    fn create_table_triggers_for_materialized_views(
        &self,
        _: &mut FakeConn,
        table: &Table,
        views: &[&MaterializedView],
    ) -> anyhow::Result<()> {
        let grain = table.grain_name().to_string();
        let name = table.name().to_string();
        for view in views {
            for trigger_type in [
                TriggerType::PostInsert,
                TriggerType::PostUpdate,
                TriggerType::PostDelete,
            ] {
                let body = format!(
                    "refresh {} /*{}*/",
                    view.name(),
                    mv_checksum_marker(view.checksum())
                );
                self.state.borrow_mut().ddl.triggers.insert(
                    (grain.clone(), name.clone(), mv_trigger_name(view, trigger_type)),
                    body,
                );
            }
        }
        self.push_log(format!("create mv triggers {}.{}", grain, name));
        Ok(())
    }

    fn update_versioning_trigger(&self, _: &mut FakeConn, table: &Table) -> anyhow::Result<()> {
        let grain = table.grain_name().to_string();
        let name = table.name().to_string();
        let key = (grain.clone(), name.clone(), versioning_trigger_name(&name));
        let mut state = self.state.borrow_mut();
        let changed = if table.versioned() {
            state
                .ddl
                .triggers
                .insert(key, "recversion check".to_string())
                .is_none()
        } else {
            state.ddl.triggers.remove(&key).is_some()
        };
        drop(state);
        if changed {
            self.push_log(format!("update versioning trigger {}.{}", grain, name));
        }
        Ok(())
    }

    fn init_data_for_materialized_view(
        &self,
        _: &mut FakeConn,
        view: &MaterializedView,
    ) -> anyhow::Result<()> {
        self.push_log(format!(
            "init mv data {}.{}",
            view.grain_name(),
            view.name()
        ));
        Ok(())
    }
}

fn versioning_trigger_name(table: &str) -> String {
    format!("{}_version_check", table)
}

impl GrainsCatalog<FakeConn> for FakeDb {
    fn read_all(&self, _: &mut FakeConn) -> anyhow::Result<Vec<GrainRow>> {
        Ok(self.state.borrow().catalog.grains.values().cloned().collect())
    }

    fn find(&self, _: &mut FakeConn, id: &str) -> anyhow::Result<Option<GrainRow>> {
        Ok(self.state.borrow().catalog.grains.get(id).cloned())
    }

    fn insert(&self, _: &mut FakeConn, row: &GrainRow) -> anyhow::Result<()> {
        let mut state = self.state.borrow_mut();
        if state.catalog.grains.contains_key(&row.id) {
            anyhow::bail!("grain row {} already exists", row.id);
        }
        state.state_history.push((row.id.clone(), row.state.code()));
        state.catalog.grains.insert(row.id.clone(), row.clone());
        Ok(())
    }

    fn update(&self, _: &mut FakeConn, row: &GrainRow) -> anyhow::Result<()> {
        let mut state = self.state.borrow_mut();
        if !state.catalog.grains.contains_key(&row.id) {
            anyhow::bail!("grain row {} does not exist", row.id);
        }
        state.state_history.push((row.id.clone(), row.state.code()));
        state.catalog.grains.insert(row.id.clone(), row.clone());
        Ok(())
    }
}

impl TablesCatalog<FakeConn> for FakeDb {
    fn read_grain(&self, _: &mut FakeConn, grainid: &str) -> anyhow::Result<Vec<TableRow>> {
        Ok(self
            .state
            .borrow()
            .catalog
            .tables
            .iter()
            .filter(|((g, _), _)| g == grainid)
            .map(|(_, row)| row.clone())
            .collect())
    }

    fn upsert(&self, _: &mut FakeConn, row: &TableRow) -> anyhow::Result<()> {
        self.state
            .borrow_mut()
            .catalog
            .tables
            .insert((row.grainid.clone(), row.tablename.clone()), row.clone());
        Ok(())
    }

    fn mark_orphaned(
        &self,
        _: &mut FakeConn,
        grainid: &str,
        tablename: &str,
    ) -> anyhow::Result<()> {
        let mut state = self.state.borrow_mut();
        if let Some(row) = state
            .catalog
            .tables
            .get_mut(&(grainid.to_string(), tablename.to_string()))
        {
            row.orphaned = true;
        }
        Ok(())
    }
}
