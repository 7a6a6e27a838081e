//! Sorted set of signed 64-bit integers, packed at the smallest width that
//! fits every stored element.
//!
//! Physically this is a header (`encoding`, `length`) followed by `length`
//! little-endian elements of `encoding` bytes each, stored in strictly
//! ascending order with no duplicates. The encoding only ever widens: once
//! a 32-bit value forces an upgrade from 16 to 32 bits, later removing that
//! value does not shrink the set back down to 16-bit elements.

use crate::error::{KvError, Result};
use rand::Rng;

/// Element width used by the packed backing buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Encoding {
    I16,
    I32,
    I64,
}

impl Encoding {
    fn width(self) -> usize {
        match self {
            Encoding::I16 => 2,
            Encoding::I32 => 4,
            Encoding::I64 => 8,
        }
    }

    /// Smallest encoding able to hold `v`.
    fn for_value(v: i64) -> Encoding {
        if v >= i16::MIN as i64 && v <= i16::MAX as i64 {
            Encoding::I16
        } else if v >= i32::MIN as i64 && v <= i32::MAX as i64 {
            Encoding::I32
        } else {
            Encoding::I64
        }
    }
}

/// A sorted, duplicate-free set of `i64` values with adaptive element width.
#[derive(Debug, Clone)]
pub struct IntSet {
    encoding: Encoding,
    data: Vec<u8>,
}

impl Default for IntSet {
    fn default() -> Self {
        Self::new()
    }
}

impl IntSet {
    /// Creates an empty set with the narrowest encoding.
    pub fn new() -> Self {
        Self {
            encoding: Encoding::I16,
            data: Vec::new(),
        }
    }

    /// Number of elements currently stored.
    pub fn len(&self) -> usize {
        self.data.len() / self.encoding.width()
    }

    /// True when the set holds no elements.
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Total size in bytes of the packed element buffer (excludes the
    /// `encoding`/`length` header, which in this port is represented by
    /// the `Encoding` field and `Vec::len`, not inline bytes).
    pub fn byte_size(&self) -> usize {
        self.data.len()
    }

    /// Current packed element width in bytes (2, 4, or 8).
    pub fn encoding(&self) -> Encoding {
        self.encoding
    }

    fn get_at(&self, pos: usize) -> i64 {
        let w = self.encoding.width();
        let off = pos * w;
        match self.encoding {
            Encoding::I16 => i16::from_le_bytes(self.data[off..off + 2].try_into().unwrap()) as i64,
            Encoding::I32 => i32::from_le_bytes(self.data[off..off + 4].try_into().unwrap()) as i64,
            Encoding::I64 => i64::from_le_bytes(self.data[off..off + 8].try_into().unwrap()),
        }
    }

    /// Returns the element at `pos`, or `None` if out of range.
    pub fn get(&self, pos: usize) -> Option<i64> {
        if pos >= self.len() {
            None
        } else {
            Some(self.get_at(pos))
        }
    }

    fn write_at(buf: &mut [u8], pos: usize, encoding: Encoding, v: i64) {
        let w = encoding.width();
        let off = pos * w;
        match encoding {
            Encoding::I16 => buf[off..off + 2].copy_from_slice(&(v as i16).to_le_bytes()),
            Encoding::I32 => buf[off..off + 4].copy_from_slice(&(v as i32).to_le_bytes()),
            Encoding::I64 => buf[off..off + 8].copy_from_slice(&v.to_le_bytes()),
        }
    }

    /// Binary search with the fast paths the distilled spec calls out
    /// explicitly: empty set, `v` past the last element, `v` before the
    /// first. Returns `Ok(pos)` on a hit, `Err(insertion_pos)` otherwise.
    fn search(&self, v: i64) -> std::result::Result<usize, usize> {
        let len = self.len();
        if len == 0 {
            return Err(0);
        }
        let last = self.get_at(len - 1);
        if v > last {
            return Err(len);
        }
        let first = self.get_at(0);
        if v < first {
            return Err(0);
        }

        let mut min = 0usize;
        let mut max = len - 1;
        while min <= max {
            let mid = min + (max - min) / 2;
            let cur = self.get_at(mid);
            if cur == v {
                return Ok(mid);
            } else if cur < v {
                min = mid + 1;
            } else {
                if mid == 0 {
                    break;
                }
                max = mid - 1;
            }
        }
        Err(min)
    }

    /// True if `v` is present.
    pub fn contains(&self, v: i64) -> bool {
        if Encoding::for_value(v) > self.encoding {
            return false;
        }
        self.search(v).is_ok()
    }

    /// Upgrades the backing buffer to `new_encoding`, re-encoding every
    /// existing element, then places `v` at the front (if `v < 0`, since
    /// a negative value forcing an upgrade is necessarily below the
    /// current minimum) or the back (otherwise). Fallible core: reports
    /// `Err(KvError::Alloc)` rather than aborting if the new buffer cannot
    /// be allocated.
    fn try_upgrade_and_add(&mut self, new_encoding: Encoding, v: i64) -> Result<()> {
        let len = self.len();
        let new_w = new_encoding.width();
        let mut new_data = Self::try_zeroed(new_w * (len + 1))?;

        let prepend = v < 0;
        let dst_offset = if prepend { 1 } else { 0 };
        for i in 0..len {
            let val = self.get_at(i);
            Self::write_at(&mut new_data, i + dst_offset, new_encoding, val);
        }
        let insert_pos = if prepend { 0 } else { len };
        Self::write_at(&mut new_data, insert_pos, new_encoding, v);

        tracing::trace!(
            target: "kvprim::intset",
            from = ?self.encoding,
            to = ?new_encoding,
            len = len + 1,
            "encoding upgrade"
        );

        self.encoding = new_encoding;
        self.data = new_data;
        Ok(())
    }

    /// Allocates `n` zeroed bytes via `try_reserve_exact`, reporting
    /// `Err(KvError::Alloc)` instead of aborting on failure.
    fn try_zeroed(n: usize) -> Result<Vec<u8>> {
        let mut buf = Vec::new();
        buf.try_reserve_exact(n).map_err(|_| KvError::Alloc)?;
        buf.resize(n, 0);
        Ok(buf)
    }

    /// Fallible core of [`IntSet::add`]. Reports `Err(KvError::Alloc)`
    /// instead of aborting when the backing buffer cannot grow.
    pub fn try_add(&mut self, v: i64) -> Result<bool> {
        let needed = Encoding::for_value(v);
        if needed > self.encoding {
            self.try_upgrade_and_add(needed, v)?;
            return Ok(true);
        }

        match self.search(v) {
            Ok(_) => Ok(false),
            Err(pos) => {
                let w = self.encoding.width();
                let old_len = self.len();
                self.data.try_reserve(w).map_err(|_| KvError::Alloc)?;
                self.data.resize(self.data.len() + w, 0);
                let tail_start = pos * w;
                self.data.copy_within(tail_start..old_len * w, tail_start + w);
                Self::write_at(&mut self.data, pos, self.encoding, v);
                Ok(true)
            }
        }
    }

    /// Inserts `v` if not already present. Returns whether an insertion
    /// actually happened. Infallible convenience wrapper over
    /// [`IntSet::try_add`] for the common case where allocation failure is
    /// not expected to be recovered from.
    pub fn add(&mut self, v: i64) -> bool {
        self.try_add(v).expect("intset: allocation failed")
    }

    /// Removes `v` if present. Returns whether it was actually removed.
    /// Never downgrades the encoding, even if this was the only element
    /// requiring the wider width.
    pub fn remove(&mut self, v: i64) -> bool {
        if Encoding::for_value(v) > self.encoding {
            return false;
        }
        match self.search(v) {
            Err(_) => false,
            Ok(pos) => {
                let w = self.encoding.width();
                let len = self.len();
                self.data.copy_within((pos + 1) * w..len * w, pos * w);
                self.data.truncate((len - 1) * w);
                true
            }
        }
    }

    /// Returns a uniformly random element, or `None` if the set is empty.
    pub fn random(&self, rng: &mut impl Rng) -> Option<i64> {
        let len = self.len();
        if len == 0 {
            return None;
        }
        Some(self.get_at(rng.gen_range(0..len)))
    }

    /// Iterates elements in ascending order.
    pub fn iter(&self) -> impl Iterator<Item = i64> + '_ {
        (0..self.len()).map(move |i| self.get_at(i))
    }
}

impl FromIterator<i64> for IntSet {
    fn from_iter<T: IntoIterator<Item = i64>>(iter: T) -> Self {
        let mut set = IntSet::new();
        for v in iter {
            set.add(v);
        }
        set
    }
}
