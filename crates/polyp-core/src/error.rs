//! Error types shared by the polyp crates.

use thiserror::Error;

/// Parsing errors for values carried in service metadata.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    #[error("Unknown sample format: {0}")]
    UnknownSampleFormat(String),
}
