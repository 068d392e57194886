use std::{
    num::ParseIntError,
    process::{ExitCode, Termination},
};

#[derive(thiserror::Error, Debug, Clone)]
pub enum AppError {
    #[error("no junctions left after loading and region filtering")]
    NoJunctions,
}

impl Termination for AppError {
    fn report(self) -> ExitCode {
        match self {
            AppError::NoJunctions => ExitCode::from(1),
        }
    }
}

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum ArgError {
    #[error("Invalid format in region: {0:?}")]
    RegionInvalidFormat(String),
    #[error("Invalid integer coordinates in region")]
    RegionInvalidInts(#[from] ParseIntError),
}

/// Problems with constructing or slicing sequences.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum SequenceError {
    #[error("bases and qualities differ in length ({bases} vs. {quals})")]
    LengthMismatch { bases: usize, quals: usize },
    #[error("invalid base {0:?}")]
    InvalidBase(char),
}

/// Problems when merging two sequences into a consensus.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum MergeError {
    #[error("cannot merge empty sequence")]
    EmptySequence,
    #[error("offset {offset} leaves a gap after sequence of length {len}")]
    NoOverlap { offset: usize, len: usize },
}

/// Problems with assembly construction.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum AssemblyError {
    #[error("read {read} at offset {offset} with length {read_len} exceeds assembly of length {len}")]
    SupportOutOfBounds {
        read: String,
        offset: usize,
        read_len: usize,
        len: usize,
    },
    #[error(transparent)]
    Merge(#[from] MergeError),
    #[error(transparent)]
    Sequence(#[from] SequenceError),
}

/// Invalid configuration values.
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
    #[error("configuration value {name} must be positive")]
    NotPositive { name: &'static str },
    #[error("configuration value {name} must be within [0, 1], was {value}")]
    NotFraction { name: &'static str, value: f64 },
}

/// Alignment blocks not describing the assembly they belong to.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum CallError {
    #[error("alignment block ending at {seq_end} exceeds assembly of length {len}")]
    BlockOutOfBounds { seq_end: usize, len: usize },
    #[error("alignment block starting at {seq_start} overlaps its predecessor ending at {prev_end}")]
    BlocksUnordered { seq_start: usize, prev_end: usize },
    #[error("mapped alignment block starting at {seq_start} is empty")]
    EmptyMappedBlock { seq_start: usize },
}
