//! The dependency-ordered schema updater: turns a finalized [`score::Score`]
//! into DDL against a live database through a dialect adaptor, tracking
//! per-grain upgrade state in the system catalog.

mod adaptor;
mod dbinfo;
mod error;
mod sorter;
mod updater;

pub use adaptor::{ConnectionPool, DbAdaptor, TriggerQuery, TriggerType};
pub use dbinfo::{DbColumnInfo, DbColumnType, DbFkInfo, DbIndexInfo, DbPkInfo, DbSequenceInfo};
pub use error::{Result, UpdateError};
pub use sorter::sort_elements;
pub use updater::{
    mv_checksum_marker, mv_trigger_name, DbUpdater, MV_CHECKSUM_MARKER, RECVERSION,
};
