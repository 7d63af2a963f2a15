use crate::nat::Bucket;
use std::io;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("config error: {0}")]
    Config(String),

    #[error("translation id space exhausted for {0}")]
    IdExhausted(Bucket),

    #[error("mapping conflict: {0}")]
    Conflict(String),

    #[error("nat table is disposed")]
    Disposed,
}

pub type Result<T> = std::result::Result<T, Error>;
