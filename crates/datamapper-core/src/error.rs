use thiserror::Error;

use crate::ingest::{ParseError, PersistError};
use crate::resolve::AmbiguousNameError;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Parse error: {0}")]
    Parse(#[from] ParseError),

    #[error(transparent)]
    AmbiguousName(#[from] AmbiguousNameError),

    #[error(transparent)]
    Persist(#[from] PersistError),

    #[error("No source to import")]
    NoSource,
}

pub type Result<T> = std::result::Result<T, Error>;
