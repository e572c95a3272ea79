use crate::adaptor::{ConnectionPool, DbAdaptor, TriggerQuery, TriggerType};
use crate::dbinfo::DbFkInfo;
use crate::error::{Result, UpdateError};
use crate::sorter::sort_elements;
use lazy_static::lazy_static;
use score::{
    Column, ColumnKind, ComparisonState, Grain, GrainElement, MaterializedView, Score, Table,
    TableElement, VersionString, SYSTEM_GRAIN_NAME,
};
use std::collections::{BTreeMap, HashMap, HashSet};
use syscat::{
    GrainRow, GrainState, GrainsCatalog, TableRow, TableType, TablesCatalog, GRAINS_TABLE,
};

/// Name of the optimistic-locking column maintained on versioned tables.
pub const RECVERSION: &str = "recversion";

/// Marker embedded in the POST_INSERT trigger body of a materialized view's
/// source table; its presence with the current checksum means the view is
/// fresh.
pub const MV_CHECKSUM_MARKER: &str = "MATERIALIZED VIEW CHECKSUM";

pub fn mv_checksum_marker(checksum: u32) -> String {
    format!("{} {:08X}", MV_CHECKSUM_MARKER, checksum)
}

/// Name of the trigger maintaining one materialized view on its source
/// table.
pub fn mv_trigger_name(view: &MaterializedView, trigger_type: TriggerType) -> String {
    let suffix = match trigger_type {
        TriggerType::PostInsert => "insert",
        TriggerType::PostUpdate => "update",
        TriggerType::PostDelete => "delete",
    };
    format!("{}_{}", view.name(), suffix)
}

lazy_static! {
    static ref RECVERSION_COLUMN: Column = Column::new(
        RECVERSION,
        ColumnKind::Int {
            identity: false,
            default: Some(1),
        },
    )
    .expect("static column")
    .not_null();
}

/// The dependency-ordered schema updater: compares the declared score to
/// the introspected database and issues DDL through the adaptor, keeping
/// per-grain status in `celesta.grains`.
///
/// One DDL transaction per grain; status rows travel through a dedicated
/// system connection so they survive a rollback of the grain's DDL.
pub struct DbUpdater<'a, A, P, C>
where
    A: DbAdaptor,
    P: ConnectionPool<Conn = A::Conn>,
    C: GrainsCatalog<A::Conn> + TablesCatalog<A::Conn>,
{
    adaptor: &'a A,
    pool: &'a P,
    score: &'a Score,
    catalog: &'a C,
    force_dd_initialize: bool,
    grain_meta_hook: Option<Box<dyn Fn(&mut A::Conn, &Grain) -> anyhow::Result<()> + 'a>>,
}

impl<'a, A, P, C> DbUpdater<'a, A, P, C>
where
    A: DbAdaptor,
    P: ConnectionPool<Conn = A::Conn>,
    C: GrainsCatalog<A::Conn> + TablesCatalog<A::Conn>,
{
    pub fn new(
        adaptor: &'a A,
        pool: &'a P,
        score: &'a Score,
        catalog: &'a C,
        force_dd_initialize: bool,
    ) -> Self {
        Self {
            adaptor,
            pool,
            score,
            catalog,
            force_dd_initialize,
            grain_meta_hook: None,
        }
    }

    /// Install a hook run at the end of every successful grain upgrade,
    /// still inside its DDL transaction. This is where a host plugs in its
    /// data-access generator; the updater treats it as opaque.
    pub fn with_grain_meta_hook(
        mut self,
        hook: impl Fn(&mut A::Conn, &Grain) -> anyhow::Result<()> + 'a,
    ) -> Self {
        self.grain_meta_hook = Some(Box::new(hook));
        self
    }

    /// Ensure the system schema exists and is current, touching nothing
    /// else.
    pub fn update_system_schema(&self) -> Result<()> {
        self.update(true)
    }

    /// Bring the whole database in line with the declared score.
    pub fn update_db(&self) -> Result<()> {
        self.update(false)
    }

    fn update(&self, system_only: bool) -> Result<()> {
        let system = self.score.system_grain().ok_or(UpdateError::NoSystemGrain)?;
        let mut sys_conn = self.pool.get().map_err(UpdateError::Ddl)?;

        if !self
            .adaptor
            .table_exists(&mut sys_conn, SYSTEM_GRAIN_NAME, GRAINS_TABLE)
            .map_err(UpdateError::Ddl)?
        {
            if self
                .adaptor
                .user_tables_exist(&mut sys_conn)
                .map_err(UpdateError::Ddl)?
                && !self.force_dd_initialize
            {
                return Err(UpdateError::NonEmptyDb);
            }
            self.bootstrap_system_grain(&mut sys_conn, system)?;
        }

        // Snapshot the catalog. A row left in UPGRADING by a crashed process
        // is resumed exactly like RECOVER.
        let mut db_rows: HashMap<String, GrainRow> = HashMap::new();
        for mut row in self
            .catalog
            .read_all(&mut sys_conn)
            .map_err(UpdateError::Ddl)?
        {
            if row.state == GrainState::Upgrading {
                row.state = GrainState::Recover;
            }
            match row.state {
                GrainState::Ready | GrainState::Recover | GrainState::Lock => (),
                other => {
                    return Err(UpdateError::UnexpectedState {
                        grain: row.id.clone(),
                        state: other.code(),
                    })
                }
            }
            db_rows.insert(row.id.clone(), row);
        }

        let grains: Vec<&Grain> = if system_only {
            vec![system]
        } else {
            self.score.grains_by_dependency_order()
        };

        let mut failed: Vec<String> = Vec::new();
        for grain in grains {
            let row = match db_rows.get(grain.name().as_str()) {
                Some(row) => row.clone(),
                None => {
                    let row = GrainRow::for_grain(grain, GrainState::Recover, "");
                    self.catalog
                        .insert(&mut sys_conn, &row)
                        .map_err(UpdateError::Ddl)?;
                    self.pool.commit(&mut sys_conn).map_err(UpdateError::Ddl)?;
                    row
                }
            };

            if !self.need_to_upgrade(grain, &row)? {
                tracing::debug!(grain = %grain.name(), "grain is up to date");
                continue;
            }

            if let Err(error) = self.upgrade_grain(&mut sys_conn, grain) {
                tracing::warn!(grain = %grain.name(), %error, "grain upgrade failed");
                let message = format!(
                    "{}/{}/{}: {}",
                    grain.version(),
                    grain.length(),
                    grain.checksum_hex(),
                    error
                );
                let row = GrainRow::for_grain(grain, GrainState::Error, message);
                self.catalog
                    .update(&mut sys_conn, &row)
                    .map_err(UpdateError::Ddl)?;
                self.pool.commit(&mut sys_conn).map_err(UpdateError::Ddl)?;
                failed.push(grain.name().to_string());
            }
        }

        if !failed.is_empty() {
            return Err(UpdateError::GrainsFailed { grains: failed });
        }
        Ok(())
    }

    /// The grains table itself is missing: create the system schema, its
    /// catalog table and helper objects, register the system grain in
    /// RECOVER, then run a regular single-grain upgrade on it.
    fn bootstrap_system_grain(&self, sys_conn: &mut A::Conn, system: &Grain) -> Result<()> {
        tracing::info!("initializing system schema");
        self.adaptor
            .create_schema_if_not_exists(sys_conn, SYSTEM_GRAIN_NAME)
            .map_err(UpdateError::Ddl)?;
        let grains_table = system
            .table(GRAINS_TABLE)
            .ok_or(UpdateError::NoSystemGrain)?;
        self.adaptor
            .create_table(sys_conn, grains_table)
            .map_err(UpdateError::Ddl)?;
        self.adaptor
            .create_sys_objects(sys_conn, SYSTEM_GRAIN_NAME)
            .map_err(UpdateError::Ddl)?;
        let row = GrainRow::for_grain(system, GrainState::Recover, "");
        self.catalog
            .insert(sys_conn, &row)
            .map_err(UpdateError::Ddl)?;
        self.pool.commit(sys_conn).map_err(UpdateError::Ddl)?;
        self.upgrade_grain(sys_conn, system)
    }

    fn need_to_upgrade(&self, grain: &Grain, row: &GrainRow) -> Result<bool> {
        if row.state == GrainState::Lock {
            tracing::debug!(grain = %grain.name(), "grain is locked, skipping");
            return Ok(false);
        }
        if !grain.autoupdate() {
            tracing::debug!(grain = %grain.name(), "grain has autoupdate off, skipping");
            return Ok(false);
        }
        if row.state == GrainState::Recover {
            return Ok(true);
        }
        let db_version = VersionString::parse(&row.version)?;
        match grain.version().compare(&db_version) {
            ComparisonState::Lower => Err(UpdateError::VersionDowngrade {
                grain: grain.name().to_string(),
                declared: grain.version().to_string(),
                db: row.version.clone(),
            }),
            ComparisonState::Inconsistent => Err(UpdateError::VersionInconsistent {
                grain: grain.name().to_string(),
                declared: grain.version().to_string(),
                db: row.version.clone(),
            }),
            ComparisonState::Greater => Ok(true),
            ComparisonState::Equals => Ok(grain.length() as i32 != row.length
                || grain.checksum_hex() != row.checksum),
        }
    }

    /// One grain: UPGRADING is committed first, then the DDL runs in its own
    /// transaction; on success the row turns READY and the tables registry
    /// is synchronized, on failure the DDL is rolled back and the error
    /// propagates for the caller to record.
    fn upgrade_grain(&self, sys_conn: &mut A::Conn, grain: &Grain) -> Result<()> {
        tracing::info!(grain = %grain.name(), order = grain.dependency_order(), "upgrading grain");
        let row = GrainRow::for_grain(grain, GrainState::Upgrading, "");
        self.catalog
            .update(sys_conn, &row)
            .map_err(UpdateError::Ddl)?;
        self.pool.commit(sys_conn).map_err(UpdateError::Ddl)?;

        let mut conn = self.pool.get().map_err(UpdateError::Ddl)?;
        match self.upgrade_schema(&mut conn, grain) {
            Ok(()) => {
                self.pool.commit(&mut conn).map_err(UpdateError::Ddl)?;
                let row = GrainRow::for_grain(grain, GrainState::Ready, "");
                self.catalog
                    .update(sys_conn, &row)
                    .map_err(UpdateError::Ddl)?;
                self.sync_tables_registry(sys_conn, grain)
                    .map_err(UpdateError::Ddl)?;
                self.pool.commit(sys_conn).map_err(UpdateError::Ddl)?;
                tracing::info!(grain = %grain.name(), "grain is ready");
                Ok(())
            }
            Err(error) => {
                if let Err(rollback_error) = self.pool.rollback(&mut conn) {
                    tracing::warn!(grain = %grain.name(), %rollback_error, "rollback failed");
                }
                Err(UpdateError::Ddl(error))
            }
        }
    }

    /// Phases 1-13 of one grain's upgrade, inside one DDL transaction.
    fn upgrade_schema(&self, conn: &mut A::Conn, grain: &Grain) -> anyhow::Result<()> {
        let adaptor = self.adaptor;

        // 1. Schema.
        adaptor.create_schema_if_not_exists(conn, grain.name())?;

        // 2-3. All views are dropped up front and recreated at the end, so
        // column changes never have to reason about dependent views.
        for view in adaptor.get_view_list(conn, grain)? {
            adaptor.drop_view(conn, grain.name(), &view)?;
        }
        for view in adaptor.get_parameterized_view_list(conn, grain)? {
            adaptor.drop_parameterized_view(conn, grain.name(), &view)?;
        }

        // Columns the diff will alter; indices touching them must go first.
        let mut columns_to_alter: HashSet<(String, String)> = HashSet::new();
        for table in grain.tables().values().filter(|t| t.autoupdate()) {
            if !adaptor.table_exists(conn, grain.name(), table.name())? {
                continue;
            }
            for column in table.columns().values() {
                if let Some(info) = adaptor.get_column_info(conn, table, column.name())? {
                    if !info.reflects(column) {
                        columns_to_alter
                            .insert((table.name().to_string(), column.name().to_string()));
                    }
                }
            }
        }

        // 4. Orphaned indices: gone from the model, out of shape, or in the
        // way of a column alteration.
        let db_indices = adaptor.get_indices(conn, grain)?;
        let mut dropped_indices: HashSet<String> = HashSet::new();
        for (name, info) in &db_indices {
            let drop = match grain.index(name) {
                None => true,
                Some(index) => {
                    !info.reflects(index)
                        || info.column_names.iter().any(|column| {
                            columns_to_alter
                                .contains(&(info.table_name.clone(), column.clone()))
                        })
                }
            };
            if drop {
                adaptor.drop_index(conn, grain.name(), name)?;
                dropped_indices.insert(name.clone());
            }
        }

        // 5. Orphaned foreign keys; what survives is the working list the
        // table diff and phase 9 consult.
        let mut db_fks: Vec<DbFkInfo> = Vec::new();
        for fk_info in adaptor.get_fk_info(conn, grain)? {
            let model_fk = grain.table(&fk_info.table_name).and_then(|table| {
                table
                    .foreign_keys()
                    .iter()
                    .find(|fk| fk.name() == fk_info.name.as_str())
            });
            match model_fk {
                Some(fk) if fk_info.reflects(fk) => db_fks.push(fk_info),
                _ => adaptor.drop_fk(conn, grain.name(), &fk_info.table_name, &fk_info.name)?,
            }
        }

        // 6. Sequences.
        for sequence in grain.sequences().values() {
            if !adaptor.sequence_exists(conn, grain.name(), sequence.name())? {
                adaptor.create_sequence(conn, sequence)?;
            } else if !adaptor.get_sequence_info(conn, sequence)?.reflects(sequence) {
                adaptor.alter_sequence(conn, sequence)?;
            }
        }

        // 7. Tables, referenced ones first.
        let sorted_tables: Vec<&Table> = sort_elements(grain.tables().values().collect());
        let mut modified_tables: HashSet<String> = HashSet::new();
        for table in &sorted_tables {
            if !table.autoupdate() {
                continue;
            }
            if !adaptor.table_exists(conn, grain.name(), table.name())? {
                adaptor.create_table(conn, *table)?;
                modified_tables.insert(table.name().to_string());
            } else if self.update_table(conn, grain, table, &mut db_fks)? {
                modified_tables.insert(table.name().to_string());
            }
            if modified_tables.contains(table.name().as_str()) {
                adaptor.manage_auto_increment(conn, *table)?;
            }
            adaptor.update_versioning_trigger(conn, table)?;
        }

        // 8. Indices: everything dropped or absent is (re)created; whatever
        // survived phase 4 already reflects the model.
        for index in grain.indices().values() {
            let survives = db_indices.contains_key(index.name().as_str())
                && !dropped_indices.contains(index.name().as_str());
            if !survives {
                adaptor.create_index(conn, index)?;
            }
        }

        // 9. Foreign keys missing from the surviving list.
        for table in &sorted_tables {
            for fk in table.foreign_keys() {
                let in_db = db_fks.iter().any(|info| {
                    info.table_name == table.name().as_str() && info.name == fk.name().as_str()
                });
                if !in_db {
                    adaptor.create_fk(conn, table, fk)?;
                }
            }
        }

        // 10. Views, dependency order among themselves.
        for view in sort_elements(grain.views().values().collect()) {
            adaptor.create_view(conn, view)?;
        }
        for view in grain.parameterized_views().values() {
            adaptor.create_parameterized_view(conn, view)?;
        }

        // 11. Materialized views.
        for view in grain.materialized_views().values() {
            self.update_materialized_view(conn, grain, view, &modified_tables)?;
        }

        // 12. Triggers keeping materialized views current.
        for table in grain.tables().values() {
            adaptor.drop_table_triggers_for_materialized_views(conn, table)?;
            let views = grain.materialized_views_of(table.name());
            if !views.is_empty() {
                adaptor.create_table_triggers_for_materialized_views(conn, table, &views)?;
            }
        }

        // 13. Host hook.
        if let Some(hook) = &self.grain_meta_hook {
            hook(conn, grain)?;
        }
        Ok(())
    }

    /// Column diff of one existing table. Returns whether anything changed.
    fn update_table(
        &self,
        conn: &mut A::Conn,
        grain: &Grain,
        table: &Table,
        db_fks: &mut Vec<DbFkInfo>,
    ) -> anyhow::Result<bool> {
        let adaptor = self.adaptor;
        let db_columns = adaptor.get_columns(conn, table)?;
        let db_pk = adaptor.get_pk_info(conn, table)?;
        let mut pk_dropped = db_pk.is_empty();
        let mut modified = false;

        for column in table.columns().values() {
            if !db_columns.contains(column.name().as_str()) {
                adaptor.create_column(conn, table, column)?;
                modified = true;
                continue;
            }
            let info = adaptor
                .get_column_info(conn, table, column.name())?
                .ok_or_else(|| {
                    anyhow::anyhow!(
                        "column {}.{} exists but cannot be described",
                        table.name(),
                        column.name()
                    )
                })?;
            if info.reflects(column) {
                continue;
            }
            // Altering a key column: inbound foreign keys and the key itself
            // must be out of the way first.
            if table.in_pk(column.name()) && !pk_dropped {
                self.drop_referencing_fks(conn, grain, table, db_fks)?;
                adaptor.drop_pk(conn, table, &db_pk.name)?;
                pk_dropped = true;
            }
            adaptor.update_column(conn, table, column, &info)?;
            modified = true;
        }

        if table.versioned() && !db_columns.contains(RECVERSION) {
            adaptor.create_column(conn, table, &RECVERSION_COLUMN)?;
            modified = true;
        }

        // The key is recreated whenever it is missing or out of shape, even
        // if no column was touched.
        if !pk_dropped && !db_pk.reflects(table) {
            self.drop_referencing_fks(conn, grain, table, db_fks)?;
            adaptor.drop_pk(conn, table, &db_pk.name)?;
            pk_dropped = true;
        }
        if pk_dropped {
            adaptor.create_pk(conn, table)?;
        }
        Ok(modified)
    }

    fn drop_referencing_fks(
        &self,
        conn: &mut A::Conn,
        grain: &Grain,
        table: &Table,
        db_fks: &mut Vec<DbFkInfo>,
    ) -> anyhow::Result<()> {
        let mut remaining = Vec::with_capacity(db_fks.len());
        for info in db_fks.drain(..) {
            if info.ref_grain == grain.name().as_str() && info.ref_table == table.name().as_str() {
                self.adaptor
                    .drop_fk(conn, grain.name(), &info.table_name, &info.name)?;
            } else {
                remaining.push(info);
            }
        }
        *db_fks = remaining;
        Ok(())
    }

    /// A materialized view is rebuilt unless it exists, its source table was
    /// untouched this run, and the source's POST_INSERT trigger still
    /// carries the matching checksum marker.
    fn update_materialized_view(
        &self,
        conn: &mut A::Conn,
        grain: &Grain,
        view: &MaterializedView,
        modified_tables: &HashSet<String>,
    ) -> anyhow::Result<()> {
        let exists = self
            .adaptor
            .table_exists(conn, grain.name(), view.name())?;
        if exists && !modified_tables.contains(view.ref_table().as_str()) {
            let query = TriggerQuery {
                schema: grain.name().to_string(),
                table_name: view.ref_table().to_string(),
                name: mv_trigger_name(view, TriggerType::PostInsert),
                trigger_type: TriggerType::PostInsert,
            };
            if let Some(body) = self.adaptor.get_trigger_body(conn, &query)? {
                if body.contains(&mv_checksum_marker(view.checksum())) {
                    tracing::debug!(view = %view.name(), "materialized view is fresh");
                    return Ok(());
                }
            }
        }
        if exists {
            self.adaptor.drop_table(conn, view)?;
        }
        self.adaptor.create_table(conn, view)?;
        self.adaptor.init_data_for_materialized_view(conn, view)?;
        Ok(())
    }

    /// Keep `celesta.tables` in step with the grain: declared elements are
    /// upserted non-orphaned, rows whose element disappeared are kept but
    /// flagged.
    fn sync_tables_registry(&self, sys_conn: &mut A::Conn, grain: &Grain) -> anyhow::Result<()> {
        let mut declared: BTreeMap<&str, TableType> = BTreeMap::new();
        declared.extend(grain.tables().keys().map(|n| (n.as_str(), TableType::Table)));
        declared.extend(grain.views().keys().map(|n| (n.as_str(), TableType::View)));
        declared.extend(
            grain
                .parameterized_views()
                .keys()
                .map(|n| (n.as_str(), TableType::Function)),
        );
        declared.extend(
            grain
                .materialized_views()
                .keys()
                .map(|n| (n.as_str(), TableType::MaterializedView)),
        );

        for (name, tabletype) in &declared {
            self.catalog.upsert(
                sys_conn,
                &TableRow {
                    grainid: grain.name().to_string(),
                    tablename: name.to_string(),
                    tabletype: *tabletype,
                    orphaned: false,
                },
            )?;
        }
        for row in self.catalog.read_grain(sys_conn, grain.name())? {
            if !row.orphaned && !declared.contains_key(row.tablename.as_str()) {
                self.catalog
                    .mark_orphaned(sys_conn, grain.name(), &row.tablename)?;
            }
        }
        Ok(())
    }
}
