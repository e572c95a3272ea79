//! The system catalog contract: typed access to the `celesta.grains` and
//! `celesta.tables` rows the updater keeps its bookkeeping in, plus the
//! programmatic definition of the `celesta` grain itself.

use chrono::{DateTime, Utc};
use score::{
    Column, ColumnKind, DateTimeDefault, Grain, GrainBuilder, ScoreBuilder, StringLength,
    TableBuilder, SYSTEM_GRAIN_NAME,
};

/// The CelestaSQL source the system grain is accounted under. `length` and
/// `checksum` of the `celesta` row are computed over this text; the model
/// itself is built in [`system_grain`].
pub const SYSTEM_GRAIN_SOURCE: &str = include_str!("celesta.sql");

pub const SYSTEM_GRAIN_VERSION: &str = "core 1.0";

pub const GRAINS_TABLE: &str = "grains";
pub const TABLES_TABLE: &str = "tables";

/// Upgrade state of a grain, as stored in `celesta.grains.state`.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum GrainState {
    /// Schema matches the recorded version/checksum; upgrade only on change.
    Ready = 0,
    /// An upgrade is in flight, or was cut short by a process crash.
    Upgrading = 1,
    /// The last upgrade failed; `message` carries the diagnostic.
    Error = 2,
    /// The physical schema is presumed dirty; upgrade unconditionally.
    Recover = 3,
    /// Do not touch this grain.
    Lock = 4,
}

#[derive(thiserror::Error, Debug)]
#[error("{0} is not a grain state code")]
pub struct UnknownStateCode(pub i32);

impl GrainState {
    pub fn code(self) -> i32 {
        self as i32
    }

    pub fn from_code(code: i32) -> Result<Self, UnknownStateCode> {
        match code {
            0 => Ok(GrainState::Ready),
            1 => Ok(GrainState::Upgrading),
            2 => Ok(GrainState::Error),
            3 => Ok(GrainState::Recover),
            4 => Ok(GrainState::Lock),
            other => Err(UnknownStateCode(other)),
        }
    }
}

/// One row of `celesta.grains`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GrainRow {
    pub id: String,
    pub version: String,
    pub length: i32,
    /// Uppercase 8-hex-digit CRC-32 of the grain source.
    pub checksum: String,
    pub state: GrainState,
    pub lastmodified: DateTime<Utc>,
    pub message: String,
}

impl GrainRow {
    /// A fresh row for a declared grain, stamped now.
    pub fn for_grain(grain: &Grain, state: GrainState, message: impl Into<String>) -> Self {
        GrainRow {
            id: grain.name().to_string(),
            version: grain.version().to_string(),
            length: grain.length() as i32,
            checksum: grain.checksum_hex(),
            state,
            lastmodified: Utc::now(),
            message: message.into(),
        }
    }
}

/// Kind tag of a `celesta.tables` row. Parameterized views surface as
/// functions in every dialect, hence the `F` code.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum TableType {
    Table,
    View,
    MaterializedView,
    Function,
}

impl TableType {
    pub fn as_str(self) -> &'static str {
        // These codes are what the `tabletype` column physically stores.
        match self {
            TableType::Table => "T",
            TableType::View => "V",
            TableType::MaterializedView => "MV",
            TableType::Function => "F",
        }
    }
}

impl std::str::FromStr for TableType {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "T" => Ok(TableType::Table),
            "V" => Ok(TableType::View),
            "MV" => Ok(TableType::MaterializedView),
            "F" => Ok(TableType::Function),
            other => anyhow::bail!("{:?} is not a table type code", other),
        }
    }
}

/// One row of `celesta.tables`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableRow {
    pub grainid: String,
    pub tablename: String,
    pub tabletype: TableType,
    pub orphaned: bool,
}

/// Typed access to `celesta.grains`. Writes become visible to other
/// connections only after the owning connection is committed through the
/// pool.
pub trait GrainsCatalog<Conn> {
    fn read_all(&self, conn: &mut Conn) -> anyhow::Result<Vec<GrainRow>>;
    fn find(&self, conn: &mut Conn, id: &str) -> anyhow::Result<Option<GrainRow>>;
    fn insert(&self, conn: &mut Conn, row: &GrainRow) -> anyhow::Result<()>;
    fn update(&self, conn: &mut Conn, row: &GrainRow) -> anyhow::Result<()>;
}

/// Typed access to `celesta.tables`.
pub trait TablesCatalog<Conn> {
    fn read_grain(&self, conn: &mut Conn, grainid: &str) -> anyhow::Result<Vec<TableRow>>;
    fn upsert(&self, conn: &mut Conn, row: &TableRow) -> anyhow::Result<()>;
    fn mark_orphaned(&self, conn: &mut Conn, grainid: &str, tablename: &str)
        -> anyhow::Result<()>;
}

/// Declare the `celesta` grain into a score under construction: the
/// `grains` and `tables` tables, neither of them versioned.
pub fn system_grain(builder: &mut ScoreBuilder) -> score::Result<()> {
    let mut grain = GrainBuilder::new(SYSTEM_GRAIN_NAME)?;
    grain.set_version(SYSTEM_GRAIN_VERSION)?;
    grain.set_source(SYSTEM_GRAIN_SOURCE);

    let mut grains = TableBuilder::new(SYSTEM_GRAIN_NAME, GRAINS_TABLE)?;
    grains.add_column(text_column("id", 30)?.not_null())?;
    grains.add_column(text_column("version", 100)?.not_null())?;
    grains.add_column(
        Column::new(
            "length",
            ColumnKind::Int {
                identity: false,
                default: None,
            },
        )?
        .not_null(),
    )?;
    grains.add_column(text_column("checksum", 8)?.not_null())?;
    grains.add_column(
        Column::new(
            "state",
            ColumnKind::Int {
                identity: false,
                default: Some(GrainState::Recover.code()),
            },
        )?
        .not_null(),
    )?;
    grains.add_column(
        Column::new(
            "lastmodified",
            ColumnKind::DateTime {
                default: Some(DateTimeDefault::GetDate),
            },
        )?
        .not_null(),
    )?;
    grains.add_column(Column::new(
        "message",
        ColumnKind::Text {
            length: StringLength::Max,
            default: None,
        },
    )?)?;
    grains.add_pk_column("id")?;
    grains.finalize_pk()?;
    grain.add_table(grains)?;

    let mut tables = TableBuilder::new(SYSTEM_GRAIN_NAME, TABLES_TABLE)?;
    tables.add_column(text_column("grainid", 30)?.not_null())?;
    tables.add_column(text_column("tablename", 30)?.not_null())?;
    tables.add_column(
        Column::new(
            "tabletype",
            ColumnKind::Text {
                length: StringLength::Chars(2),
                default: Some("T".to_string()),
            },
        )?
        .not_null(),
    )?;
    tables.add_column(
        Column::new(
            "orphaned",
            ColumnKind::Bool {
                default: Some(false),
            },
        )?
        .not_null(),
    )?;
    tables.add_pk_column("grainid")?;
    tables.add_pk_column("tablename")?;
    tables.finalize_pk()?;
    grain.add_table(tables)?;

    builder.add_grain(grain)
}

fn text_column(name: &str, length: u32) -> score::Result<Column> {
    Column::new(
        name,
        ColumnKind::Text {
            length: StringLength::Chars(length),
            default: None,
        },
    )
}
