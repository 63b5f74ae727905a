//! Error types for the discovery browser.

use thiserror::Error;

/// A TXT record that cannot be opened as a sequence of entries.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TxtError {
    #[error("TXT entry at offset {offset} claims {len} bytes, only {remaining} left")]
    Truncated {
        offset: usize,
        len: usize,
        remaining: usize,
    },

    #[error("TXT entry at offset {offset} has an empty key")]
    EmptyKey { offset: usize },

    #[error("TXT entry at offset {offset} has a key that is not UTF-8")]
    InvalidKey { offset: usize },

    #[error("TXT entry is {0} bytes, the limit is 255")]
    EntryTooLong(usize),
}

/// Reasons a single resolution is abandoned.
///
/// These never reach the browse callback; the affected service is simply
/// not reported.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AssembleError {
    #[error("Malformed TXT record: {0}")]
    Txt(#[from] TxtError),

    #[error("Invalid cookie: {0}")]
    InvalidCookie(String),

    #[error("Invalid channel count: {0}")]
    InvalidChannels(String),

    #[error("Invalid sample rate: {0}")]
    InvalidRate(String),

    #[error("Unknown sample format: {0}")]
    UnknownFormat(String),

    #[error("No device entry for a sink or source")]
    MissingDevice,
}

/// Failures reported by a discovery session.
#[derive(Error, Debug)]
pub enum SessionError {
    #[error("mDNS daemon error: {0}")]
    Daemon(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("Discovery session closed")]
    Closed,
}

/// Failures while constructing a browser.
#[derive(Error, Debug)]
pub enum BrowserError {
    #[error("Failed to initialize discovery session: {0}")]
    SessionInit(#[source] SessionError),

    #[error("Failed to browse for {service_type}: {source}")]
    Browse {
        service_type: &'static str,
        #[source]
        source: SessionError,
    },
}

pub type Result<T> = std::result::Result<T, BrowserError>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error as StdError;

    #[test]
    fn txt_error_converts_into_assemble_error() {
        let err: AssembleError = TxtError::EmptyKey { offset: 3 }.into();
        assert!(matches!(err, AssembleError::Txt(TxtError::EmptyKey { offset: 3 })));
        assert!(err.to_string().contains("offset 3"));
    }

    #[test]
    fn browser_error_keeps_source_chain() {
        let err = BrowserError::Browse {
            service_type: "_polypaudio-sink._tcp.",
            source: SessionError::Daemon("socket closed".to_string()),
        };
        assert!(err.to_string().contains("_polypaudio-sink._tcp."));
        assert!(err.source().is_some());

        let io = std::io::Error::new(std::io::ErrorKind::Other, "boom");
        let err = BrowserError::SessionInit(io.into());
        assert!(err.source().is_some());
    }
}
