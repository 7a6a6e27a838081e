//! Single-threaded, in-memory data structure primitives: a sorted integer
//! set with adaptive element width, a binary-safe growable string, and an
//! incrementally-rehashing hash table.
//!
//! This crate does not persist anything to disk, does not coordinate
//! access across threads, and does not speak any wire protocol -- it is a
//! library of primitives meant to be embedded by something else that
//! provides those concerns.

#![deny(unsafe_code)]

pub mod config;
pub mod dict;
pub mod error;
pub mod intset;
pub mod sds;

pub use config::{DictConfig, SdsConfig};
pub use dict::{CaseInsensitivePolicy, Dict, DictPolicy, StdPolicy};
pub use error::{KvError, Result};
pub use intset::{Encoding, IntSet};
pub use sds::{FmtArg, Sds};
