/// Failures of the upgrade run. Schema-time errors ([`score::ParseError`])
/// and version conflicts abort the whole run before any DDL; a DDL failure
/// inside one grain's transaction turns that grain ERROR and the run
/// continues, surfacing [`UpdateError::GrainsFailed`] at the end.
#[derive(thiserror::Error, Debug)]
pub enum UpdateError {
    #[error(
        "the database contains user tables but no grains catalog; \
         refusing to initialize it (set force_dd_initialize to override)"
    )]
    NonEmptyDb,

    #[error("grain {grain} is in unexpected state {state}")]
    UnexpectedState { grain: String, state: i32 },

    #[error("grain {grain}: cannot downgrade from database version {db} to {declared}")]
    VersionDowngrade {
        grain: String,
        declared: String,
        db: String,
    },

    #[error("grain {grain}: declared version {declared} is inconsistent with database version {db}")]
    VersionInconsistent {
        grain: String,
        declared: String,
        db: String,
    },

    #[error("the score declares no system grain")]
    NoSystemGrain,

    #[error(transparent)]
    Parse(#[from] score::ParseError),

    #[error("DDL failed: {0}")]
    Ddl(anyhow::Error),

    #[error("failed to upgrade grains: {}", .grains.join(", "))]
    GrainsFailed { grains: Vec<String> },
}

pub type Result<T> = std::result::Result<T, UpdateError>;
