//! Crate & format level errors.
//!
//! This module provides the top-level error types for metalog.
//!
//! # Error Hierarchy
//!
//! The crate uses a two-layer error hierarchy:
//!
//! ## Format Layer (`crate::error`)
//!
//! - [`Error`]: I/O, batch/record decoding and configuration errors
//!
//! ## Cluster Layer (`crate::cluster::error`)
//!
//! - [`ClusterError`]: controller recovery and replication errors
//! - Includes append/commit failures, unsupported and unrecognized
//!   metadata records
//!
//! ## Conversion
//!
//! [`Error`] can be converted to [`ClusterError`] via a `From` impl, so
//! decode failures surfacing from the streaming pipeline propagate through
//! controller recovery with `?`.
//!
//! [`ClusterError`]: crate::cluster::ClusterError

use bytes::Bytes;
use std::{io, result};
use thiserror::Error as ThisError;

pub type Result<T> = result::Result<T, Error>;

/// Format and I/O level errors.
///
/// These are low-level errors that occur during:
/// - Segment byte stream reads
/// - Batch and record decoding
/// - Configuration loading
///
/// For controller recovery and replication errors, see
/// [`crate::cluster::ClusterError`].
#[derive(Clone, Debug, ThisError)]
pub enum Error {
    /// An error in the underlying byte source.
    #[error("IO error: {0:?}")]
    IoError(io::ErrorKind),

    /// Could not decode the data.
    #[error("Parsing error: invalid data ({} bytes)", .0.len())]
    ParsingError(Bytes),

    /// The byte stream ended in the middle of a batch or record.
    #[error("Truncated data: {0}")]
    TruncatedData(String),

    /// A checksum mismatch was detected while decoding a batch.
    #[error("CRC mismatch: stored {stored:#010x}, computed {computed:#010x}")]
    CrcMismatch { stored: u32, computed: u32 },

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),
}

impl PartialEq for Error {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Error::IoError(a), Error::IoError(b)) => a == b,
            (Error::ParsingError(a), Error::ParsingError(b)) => a == b,
            (Error::TruncatedData(a), Error::TruncatedData(b)) => a == b,
            (
                Error::CrcMismatch {
                    stored: a,
                    computed: b,
                },
                Error::CrcMismatch {
                    stored: c,
                    computed: d,
                },
            ) => a == c && b == d,
            (Error::Config(a), Error::Config(b)) => a == b,
            _ => false,
        }
    }
}

impl Eq for Error {}

impl From<io::Error> for Error {
    fn from(e: io::Error) -> Self {
        Error::IoError(e.kind())
    }
}
