//! Crate error type.

use std::{io, path::PathBuf};

use thiserror::Error;

/// Failures at the edges of the crate. Ledger, journey and verification
/// operations are total and never produce one of these.
#[derive(Debug, Error)]
pub enum Error {
    #[error("failed to read config file '{}'", path.display())]
    ConfigRead {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("invalid config file '{}': {source}", path.display())]
    ConfigParse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error("setting '{field}' must not be empty")]
    EmptySetting { field: &'static str },
    #[error("failed to render QR code: {0}")]
    QrRender(#[from] qrcode::types::QrError),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
