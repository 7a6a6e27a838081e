//! Shared error taxonomy for the intset, sds, and dict primitives.
//!
//! Fatal invariant violations (fingerprint mismatch on unsafe iteration,
//! `incr_len` past the free budget) are not part of this enum -- they are
//! not recoverable and are raised as assertions instead, matching the
//! contract-violation paths elsewhere in this crate family.

use thiserror::Error;

/// Soft, recoverable failures surfaced by the data structures in this crate.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum KvError {
    /// The backing allocator refused to grow the buffer.
    #[error("allocation failed")]
    Alloc,

    /// `Dict::insert` was called with a key that is already present.
    #[error("duplicate key")]
    Duplicate,

    /// `Sds::cat_fmt` encountered a directive it does not recognize.
    #[error("unknown format directive '%{directive}'")]
    Format {
        /// The unrecognized directive character.
        directive: char,
    },

    /// `Sds::split_args` reached end of input inside an open quote.
    #[error("unterminated quote")]
    Unterminated,

    /// `Sds::split_args` found a non-whitespace byte immediately after a closing quote.
    #[error("trailing garbage after closing quote")]
    TrailingGarbage,

    /// `Sds::split` was called with an empty separator.
    #[error("empty separator")]
    EmptySeparator,
}

/// Convenience alias used throughout this crate.
pub type Result<T> = std::result::Result<T, KvError>;
