//! Engine error types

use thiserror::Error;

/// Errors surfaced by the proof-of-work engine
#[derive(Debug, Error)]
pub enum PowError {
    /// A dump file carried the wrong magic header
    #[error("invalid dump magic")]
    InvalidDumpMagic,

    /// Filesystem trouble while mapping or generating a dump
    #[error("dump io: {0}")]
    Io(#[from] std::io::Error),

    /// The header declares a zero or missing difficulty
    #[error("invalid difficulty")]
    InvalidDifficulty,

    /// The mix digest does not match the recomputed hashimoto mix
    #[error("invalid mix digest")]
    InvalidMixDigest,

    /// The proof-of-work result does not meet the difficulty target
    #[error("invalid proof-of-work")]
    InvalidPow,
}

/// Result type for engine operations
pub type PowResult<T> = Result<T, PowError>;
